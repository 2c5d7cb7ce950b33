use std::pin::Pin;

use super::{Flow, Middleware};
use crate::error::DispatchError;
use crate::{Request, Response};
use http::header;

#[derive(Debug, Clone)]
/// A middleware that stages CORS headers on every response, and answers
/// preflight (`OPTIONS`) requests itself with an empty `200`.
///
/// # Examples
/// ```rust
/// let mut http = noheadache::http();
/// http.with(
///     noheadache::middleware::CorsMiddleware::new()
///         .origin("https://example.com")
///         .credentials(true),
/// );
/// ```
pub struct CorsMiddleware {
    origin: String,
    methods: String,
    allowed_headers: String,
    credentials: bool,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        CorsMiddleware {
            origin: "*".to_string(),
            methods: "GET,HEAD,PUT,PATCH,POST,DELETE".to_string(),
            allowed_headers: "Content-Type,Authorization".to_string(),
            credentials: false,
        }
    }
}

impl CorsMiddleware {
    #[must_use]
    /// Creates a CORS middleware that allows any origin.
    pub fn new() -> Self {
        CorsMiddleware::default()
    }

    #[must_use]
    /// The value of `Access-Control-Allow-Origin`.
    pub fn origin<S: Into<String>>(mut self, origin: S) -> Self {
        self.origin = origin.into();
        self
    }

    #[must_use]
    /// The value of `Access-Control-Allow-Methods`.
    pub fn methods<S: Into<String>>(mut self, methods: S) -> Self {
        self.methods = methods.into();
        self
    }

    #[must_use]
    /// The value of `Access-Control-Allow-Headers`.
    pub fn allowed_headers<S: Into<String>>(mut self, headers: S) -> Self {
        self.allowed_headers = headers.into();
        self
    }

    #[must_use]
    /// Whether to send `Access-Control-Allow-Credentials: true`.
    pub fn credentials(mut self, credentials: bool) -> Self {
        self.credentials = credentials;
        self
    }

    fn stage(&self, response: &mut Response) -> Result<(), DispatchError> {
        response
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.origin.as_str())?
            .header(header::ACCESS_CONTROL_ALLOW_METHODS, self.methods.as_str())?
            .header(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                self.allowed_headers.as_str(),
            )?;
        if self.credentials {
            response.header(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true")?;
        }
        Ok(())
    }
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn apply(self: Pin<&Self>, request: &mut Request, response: &mut Response) -> Flow {
        if let Err(error) = self.stage(response) {
            return Flow::abort(error);
        }

        if request.method() == http::Method::OPTIONS {
            response.set_status(http::StatusCode::OK).end();
            return Flow::Completed;
        }

        Flow::Continue
    }
}
