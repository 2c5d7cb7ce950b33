use super::{Pattern, RouteTable};
use crate::Endpoint;
use std::pin::Pin;

pub(crate) struct Route {
    method: http::Method,
    pub(crate) pattern: Pattern,
    endpoint: Pin<Box<dyn Endpoint>>,
}

impl Route {
    pub(crate) fn new(
        method: http::Method,
        pattern: &str,
        endpoint: Pin<Box<dyn Endpoint>>,
    ) -> Self {
        Route {
            method,
            pattern: Pattern::new(pattern),
            endpoint,
        }
    }

    /// Get a reference to the route's method.
    pub(crate) fn method(&self) -> &http::Method {
        &self.method
    }

    /// The normalized pattern of the route.
    pub(crate) fn path(&self) -> &str {
        self.pattern.normalized()
    }

    /// Get a reference to the route's endpoint.
    pub(crate) fn endpoint(&self) -> Pin<&dyn Endpoint> {
        self.endpoint.as_ref()
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path())
            .field("method", &self.method)
            .field("endpoint", &&*self.endpoint)
            .finish_non_exhaustive()
    }
}

/// A description of a path in the router.
///
/// This is generated when you call [`crate::Router::at`], and it contains the
/// passed prefix from that function.  Here, you can specify the behavior to
/// perform at that prefix - the [`Endpoint`]s to perform on each method of
/// that Path.  Every registration goes through the same table as
/// [`crate::Router::register`]; registering the same method and pattern again
/// replaces the earlier endpoint.
///
/// Any segment of the path that starts with a `:` is a parameter; it matches
/// any single segment of the request path, and the handler can read it with
/// [`crate::Request::param`].
///
/// # Examples
/// ```rust
/// # use noheadache::*;
/// # #[tokio::main] async fn main() -> Result<(), anyhow::Error> {
/// let endpoint = || noheadache::endpoints::simple(|response| {
///     response.status(204).end();
/// });
/// let mut http = noheadache::http();
/// http.at("/") // this is the Path instance.
///     .get(endpoint());
/// http.at("/users/:id")
///     .get(endpoint())
///     .post(endpoint());
///
/// let response = http.handle(http::Request::get("/users/1").body(Body::empty())?).await;
/// assert_eq!(response.status(), http::StatusCode::NO_CONTENT);
/// let response = http.handle(http::Request::get("/users/1/posts").body(Body::empty())?).await;
/// assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Path<'a> {
    prefix: String,
    table: &'a mut RouteTable,
}

macro_rules! method {
    ($($(#[$m:meta])* $v:vis fn $n:ident = $meth:expr;)+) => {
        $(
            $(#[$m])* $v fn $n<E: Endpoint>(&mut self, endpoint: E) -> &mut Self {
                self.method($meth, endpoint)
            }
        )+
    };
}

impl<'a> Path<'a> {
    pub(super) fn new(prefix: impl Into<String>, table: &'a mut RouteTable) -> Self {
        Path {
            prefix: prefix.into(),
            table,
        }
    }

    /// This appends to the prefix, creating a new [`Path`] from the
    /// current one and the given supplemental prefix.
    ///
    /// # Example
    /// ```rust
    /// # use noheadache::endpoints::simple;
    /// # let mut http = noheadache::http();
    /// # let user_index = simple(|r| { r.end(); });
    /// # let user_show = simple(|r| { r.end(); });
    /// # let user_update = simple(|r| { r.end(); });
    /// # let user_destroy = simple(|r| { r.end(); });
    /// let mut base = http.at("/user");
    /// base.get(user_index);
    /// base.at("/:id")
    ///     .get(user_show)
    ///     .put(user_update)
    ///     .delete(user_destroy);
    /// ```
    pub fn at<P: AsRef<str>>(&mut self, path: P) -> Path<'_> {
        Path::new(super::join_paths(&self.prefix, path.as_ref()), self.table)
    }

    /// This appends to the prefix, creating a new [`Path`] from the
    /// current one and the given supplemental prefix.
    ///
    /// The created [`Path`] is then yielded to the given closure, which can
    /// be used to add routes to it; the current [`Path`] is then returned.
    ///
    /// # Example
    /// ```rust
    /// # use noheadache::endpoints::simple;
    /// # let mut http = noheadache::http();
    /// # let user_index = simple(|r| { r.end(); });
    /// # let user_show = simple(|r| { r.end(); });
    /// # let user_update = simple(|r| { r.end(); });
    /// http.under("/user", |base| {
    ///     base.get(user_index)
    ///         .under("/:id", |user| {
    ///             user.get(user_show).patch(user_update);
    ///         });
    /// });
    /// ```
    pub fn under<P: AsRef<str>, F: FnOnce(&mut Path<'_>)>(&mut self, path: P, f: F) -> &mut Self {
        let mut base = self.at(path);
        f(&mut base);
        self
    }

    /// Creates an endpoint with the specified method at the current prefix.
    pub fn method<E: Endpoint>(&mut self, method: http::Method, endpoint: E) -> &mut Self {
        self.table
            .insert(Route::new(method, &self.prefix, Box::pin(endpoint)));
        self
    }

    method![
        /// Creates a GET endpoint at the current prefix.
        pub fn get = http::Method::GET;
        /// Creates a POST endpoint at the current prefix.
        pub fn post = http::Method::POST;
        /// Creates a PUT endpoint at the current prefix.
        pub fn put = http::Method::PUT;
        /// Creates a PATCH endpoint at the current prefix.
        pub fn patch = http::Method::PATCH;
        /// Creates a DELETE endpoint at the current prefix.
        pub fn delete = http::Method::DELETE;
        /// Creates a HEAD endpoint at the current prefix.
        pub fn head = http::Method::HEAD;
        /// Creates an OPTIONS endpoint at the current prefix.
        pub fn options = http::Method::OPTIONS;
    ];
}
