use http::StatusCode;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
/// Errors generated while reading and parsing the body of a request.
pub enum BodyParseError {
    /// The request declared a JSON body, but the body was not valid JSON.
    #[error("the body of the request is not valid JSON")]
    InvalidJson(#[source] serde_json::Error),
    /// The underlying connection failed while the body was being read.
    #[error("could not read the body of the request")]
    StreamFailure(#[source] std::io::Error),
    /// The body was larger than the configured limit, and was cut off.
    #[error("the body of the request exceeded {limit} bytes")]
    TooLarge {
        /// The limit that was exceeded.
        limit: u64,
    },
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
/// Errors generated while dispatching a request, or while setting up the
/// router.
///
/// Everything that goes wrong during a request ends up as one of these at the
/// dispatcher boundary, where it is logged and converted into a JSON error
/// response (see [`DispatchError::status`]).
pub enum DispatchError {
    #[error("could not parse the given string ({:?}) as an address", .0)]
    /// Generated when attempting to parse an address (during
    /// [`crate::Router::listen`]), but the address was invalid.
    InvalidAddress(String),
    #[error("could not serve server")]
    /// Generated when attempting to bind and listen using hyper, but it failed
    /// for some underlying reason.
    HyperServer(#[source] hyper::Error),
    /// The request body could not be read or parsed.
    #[error("could not parse the body of the request")]
    BodyParse(#[from] BodyParseError),
    /// A middleware aborted the pipeline with an error.
    #[error("middleware aborted the request")]
    Middleware(#[source] anyhow::Error),
    /// No route matched the method and path of the request.
    #[error("cannot {method} {path}")]
    NotFound {
        /// The method of the request.
        method: http::Method,
        /// The path of the request.
        path: String,
    },
    /// The route handler returned an error, or panicked.
    #[error("the route handler failed")]
    Handler(#[source] anyhow::Error),
    /// The response was already completed; the attempted write was skipped.
    #[error("the response has already been sent")]
    ResponseAlreadySent,
    /// A value handed to the response could not be serialized.
    #[error("could not serialize the response body")]
    Serialization(#[source] serde_json::Error),
    /// A header name or value handed to the response was invalid.
    #[error("could not set a response header")]
    InvalidHeader(#[source] http::Error),
    /// Walking the routes directory failed.
    #[error("could not discover routes under {path:?}")]
    Discovery {
        /// The path that could not be read.
        path: std::path::PathBuf,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },
}

impl DispatchError {
    /// The status code the dispatcher responds with for this error.
    ///
    /// # Examples
    /// ```rust
    /// # use noheadache::*;
    /// let error = DispatchError::NotFound {
    ///     method: http::Method::GET,
    ///     path: "/nope".into(),
    /// };
    /// assert_eq!(error.status(), http::StatusCode::NOT_FOUND);
    /// ```
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The client-facing message for this error.  Internal failures are
    /// reported generically; the details only go to the log.
    pub(crate) fn public_message(&self) -> String {
        match self {
            DispatchError::NotFound { method, path } => format!("Cannot {method} {path}"),
            _ => "Internal Server Error".to_string(),
        }
    }

    /// A hint for the client on how to resolve the error, if one exists.
    pub(crate) fn suggestion(&self) -> Option<String> {
        match self {
            DispatchError::NotFound { method, path } => Some(format!(
                "No route is registered for {} {}. Add a route module for it under \
                 the routes directory, or register it directly (e.g. \
                 `http.{}(\"{}\", handler)`).",
                method,
                path,
                method.as_str().to_ascii_lowercase(),
                path
            )),
            _ => None,
        }
    }
}

#[derive(Debug, serde::Serialize)]
/// The JSON body of every error response.
pub(crate) struct ErrorBody {
    error: String,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<String>,
}

impl ErrorBody {
    pub(crate) fn new(error: impl Into<String>, suggestion: Option<String>) -> Self {
        ErrorBody {
            error: error.into(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            suggestion,
        }
    }
}

impl From<&DispatchError> for ErrorBody {
    fn from(error: &DispatchError) -> Self {
        ErrorBody::new(error.public_message(), error.suggestion())
    }
}
