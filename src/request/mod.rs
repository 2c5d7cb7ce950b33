mod params;
mod query;

pub use self::params::Params;
pub use self::query::{Query, QueryValue};
use crate::error::BodyParseError;
use crate::payload::{carries_body, parse_payload, Payload};
use std::str::FromStr;

#[derive(Debug, Clone, Copy)]
/// The address of the peer on the other end of the connection.  Inserted
/// into the request extensions by the hyper service.
pub(crate) struct PeerAddress(pub(crate) std::net::SocketAddr);

#[derive(Debug)]
/// Represents an HTTP request, as seen by middleware and route handlers.
///
/// By the time a request reaches middleware, its URL has been split into a
/// decoded pathname and a [`Query`] mapping, and its body (for `POST`, `PUT`
/// and `PATCH`) has been buffered and parsed into a [`Payload`].  The path
/// parameters are bound just before the route handler runs.
///
/// The request also contains an "extensions" type map, which middleware can
/// use to hand state to the handlers behind it.
///
/// # Examples
/// ```rust
/// # use noheadache::*;
/// async fn show(request: Request, mut response: Response) -> Result<(), anyhow::Error> {
///     let id = request.param("id").unwrap_or("nobody");
///     let include = request.query().get("include");
///     response.json(&serde_json::json!({ "id": id, "include": include }))?;
///     Ok(())
/// }
/// ```
pub struct Request {
    head: http::request::Parts,
    pathname: String,
    query: Query,
    payload: Payload,
    params: Params,
}

impl Request {
    /// Splits the URL and, for body-bearing methods, buffers and parses the
    /// body.
    pub(crate) async fn receive(
        request: http::Request<hyper::Body>,
        limit: u64,
    ) -> Result<Self, BodyParseError> {
        let (head, body) = request.into_parts();
        let payload = if carries_body(&head.method) {
            let content_type = head
                .headers
                .get(http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            parse_payload(body, content_type, limit).await?
        } else {
            Payload::Empty
        };

        Ok(Self::from_parts(head, payload))
    }

    fn from_parts(head: http::request::Parts, payload: Payload) -> Self {
        let pathname = percent_encoding::percent_decode_str(head.uri.path())
            .decode_utf8_lossy()
            .into_owned();
        let query = head.uri.query().map(Query::parse).unwrap_or_default();

        Request {
            head,
            pathname,
            query,
            payload,
            params: Params::default(),
        }
    }

    pub(crate) fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Returns a reference to the associated URI.
    ///
    /// # Examples
    /// ```rust
    /// # use noheadache::*;
    /// let request = Request::from(http::Request::get("/a%20b?c=d").body(Payload::Empty)?);
    /// assert_eq!(request.uri(), "/a%20b?c=d");
    /// # Ok::<(), http::Error>(())
    /// ```
    #[inline]
    pub fn uri(&self) -> &http::Uri {
        &self.head.uri
    }

    /// Returns a reference to the associated HTTP method.
    #[inline]
    pub fn method(&self) -> &http::Method {
        &self.head.method
    }

    /// Returns the raw (still encoded) path of the request.
    #[inline]
    pub fn path(&self) -> &str {
        self.head.uri.path()
    }

    /// Returns the percent-decoded path of the request.
    ///
    /// # Examples
    /// ```rust
    /// # use noheadache::*;
    /// let request = Request::from(http::Request::get("/a%20b?c=d").body(Payload::Empty)?);
    /// assert_eq!(request.pathname(), "/a b");
    /// # Ok::<(), http::Error>(())
    /// ```
    #[inline]
    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    /// Returns a reference to the associated header field map.
    #[inline]
    pub fn headers(&self) -> &http::HeaderMap {
        &self.head.headers
    }

    /// Returns the value of the given header, if it is present and is
    /// visible ASCII.
    pub fn header<K: http::header::AsHeaderName>(&self, key: K) -> Option<&str> {
        self.head.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// Returns a reference to the associated extensions.
    #[inline]
    pub fn extensions(&self) -> &http::Extensions {
        &self.head.extensions
    }

    /// Returns a mutable reference to the associated extensions.
    #[inline]
    pub fn extensions_mut(&mut self) -> &mut http::Extensions {
        &mut self.head.extensions
    }

    /// Retrieves a specific extension from the extensions map.
    ///
    /// # Examples
    /// ```rust
    /// # use noheadache::*;
    /// let mut request = Request::from(http::Request::get("/").body(Payload::Empty)?);
    /// assert_eq!(request.ext::<u32>(), None);
    /// request.set_ext(123u32);
    /// assert_eq!(request.ext::<u32>(), Some(&123u32));
    /// # Ok::<(), http::Error>(())
    /// ```
    pub fn ext<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions().get::<T>()
    }

    /// Sets the value of the specific extension in the extensions map.
    pub fn set_ext<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        self.extensions_mut().insert(value);
        self
    }

    /// Returns the parsed query string.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Parses the query string from the request into the provided type.  If
    /// there is no query string, or it cannot be parsed into the given type,
    /// then `None` is returned.
    ///
    /// # Examples
    /// ```rust
    /// # use noheadache::*;
    /// let request = Request::from(http::Request::get("/users?id=1").body(Payload::Empty)?);
    /// #[derive(serde::Deserialize)]
    /// struct User { id: u32 }
    /// let user: User = request.query_as().unwrap();
    /// assert_eq!(user.id, 1);
    /// # Ok::<(), http::Error>(())
    /// ```
    pub fn query_as<'q, S: serde::Deserialize<'q>>(&'q self) -> Option<S> {
        self.uri()
            .query()
            .and_then(|s| serde_qs::from_str::<S>(s).ok())
    }

    /// Returns the parsed body.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Takes the parsed body, leaving [`Payload::Empty`] behind.
    pub fn take_payload(&mut self) -> Payload {
        std::mem::take(&mut self.payload)
    }

    /// Deserializes the parsed body into the given type.
    ///
    /// # Errors
    /// See [`Payload::deserialize`].
    pub fn json_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, anyhow::Error> {
        self.payload.deserialize()
    }

    /// Returns the path parameters bound by the matched route.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Retrieves a path parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Retrieves a path parameter by name, then attempts to parse it.
    pub fn param_as<I: FromStr>(&self, name: &str) -> Option<I> {
        self.param(name).and_then(|s| s.parse().ok())
    }

    /// Attempts to load the peer address of the request.  This is only
    /// available if the request came in through [`crate::Router::listen`].
    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        Some(self.ext::<PeerAddress>()?.0)
    }
}

impl From<http::Request<Payload>> for Request {
    fn from(request: http::Request<Payload>) -> Self {
        let (head, payload) = request.into_parts();
        Request::from_parts(head, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receive_splits_url_and_parses_body() {
        let request = http::Request::post("/users/a%20b?include=profile&tag=1&tag=2")
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(hyper::Body::from(r#"{"name":"x"}"#))
            .unwrap();
        let request = Request::receive(request, 512).await.unwrap();
        assert_eq!(request.pathname(), "/users/a b");
        assert_eq!(request.path(), "/users/a%20b");
        assert_eq!(request.query().get("include"), Some("profile"));
        assert_eq!(request.query().get_all("tag"), vec!["1", "2"]);
        assert_eq!(
            request.payload().as_json(),
            Some(&serde_json::json!({ "name": "x" }))
        );
    }

    #[tokio::test]
    async fn test_receive_ignores_bodies_of_other_methods() {
        let request = http::Request::get("/")
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(hyper::Body::from("{not json"))
            .unwrap();
        let request = Request::receive(request, 512).await.unwrap();
        assert!(request.payload().is_empty());
    }

    #[test]
    fn test_params_are_typed() {
        let mut request = Request::from(http::Request::get("/users/42").body(Payload::Empty).unwrap());
        let mut params = Params::default();
        params.insert("id".into(), "42".into());
        request.set_params(params);
        assert_eq!(request.param("id"), Some("42"));
        assert_eq!(request.param_as::<u32>("id"), Some(42));
        assert_eq!(request.param_as::<u32>("missing"), None);
    }
}
