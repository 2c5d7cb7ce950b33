mod dispatch;
mod pattern;
mod route;
mod service;
mod table;

pub use self::pattern::match_path;
pub(crate) use self::pattern::Pattern;
pub use self::route::Path;
pub(crate) use self::route::Route;
pub(crate) use self::table::RouteTable;
use crate::data::DEFAULT_BODY_LIMIT;
use crate::discovery::RouteManifest;
use crate::endpoint::Endpoint;
use crate::middleware::{Middleware, Pipeline};
use std::sync::Arc;
use tokio::sync::watch;

/// An HTTP router.
///
/// This contains the middleware pipeline, and a table of routes mapping a
/// method and a path pattern to the [`Endpoint`] that handles them.  All
/// patterns are based off of the root, `/`.  A pattern segment starting with
/// `:` is a parameter, matching any single segment of the request path.
///
/// Registering the same method and pattern twice replaces the earlier
/// endpoint; the last registration wins.  When looking up a request, a static
/// route registered under exactly the request's path is picked first.
/// Otherwise, the routes are tried in the order they were registered, and the
/// first whose pattern matches wins.  So, assuming that you have the
/// following routes defined:
///
/// ```text
/// // ...
/// GET /users/:id -> endpoint_user_id
/// GET /users/:name -> endpoint_user_name
/// GET /users/me -> endpoint_user_me
/// // ...
/// ```
///
/// Then `/users/me` always runs `endpoint_user_me`, as it is static, and
/// `/users/42` always runs `endpoint_user_id`, as it was registered before
/// the other parameter route.
///
/// # Examples
/// ```rust
/// # use noheadache::*;
/// # #[tokio::main] async fn main() -> Result<(), anyhow::Error> {
/// async fn show(request: Request, mut response: Response) -> Result<(), anyhow::Error> {
///     let id = request.param("id").unwrap_or_default();
///     response.json(&serde_json::json!({ "id": id }))?;
///     Ok(())
/// }
///
/// let mut http = noheadache::http();
/// http.with(noheadache::middleware::TraceMiddleware::new())
///     .get("/users/:id", show);
///
/// let response = http.handle(http::Request::get("/users/42").body(Body::empty())?).await;
/// assert_eq!(response.status(), http::StatusCode::OK);
/// # Ok(())
/// # }
/// ```
pub struct Router {
    table: RouteTable,
    middleware: Pipeline,
    body_limit: u64,
    terminate: Option<watch::Receiver<bool>>,
}

impl Default for Router {
    fn default() -> Self {
        Router {
            table: RouteTable::default(),
            middleware: Pipeline::default(),
            body_limit: DEFAULT_BODY_LIMIT,
            terminate: None,
        }
    }
}

macro_rules! method {
    ($($(#[$m:meta])* $v:vis fn $n:ident = $meth:expr;)+) => {
        $(
            $(#[$m])* $v fn $n<E: Endpoint>(&mut self, pattern: &str, endpoint: E) -> &mut Self {
                self.register($meth, pattern, endpoint)
            }
        )+
    };
}

impl Router {
    /// Registers the endpoint for the method and pattern.  If an endpoint is
    /// already registered for them, it is replaced.
    ///
    /// # Examples
    /// ```rust
    /// # use noheadache::*;
    /// let mut http = noheadache::http();
    /// http.register(http::Method::GET, "/health", endpoints::simple(|response| {
    ///     response.status(204).end();
    /// }));
    /// ```
    pub fn register<E: Endpoint>(
        &mut self,
        method: http::Method,
        pattern: &str,
        endpoint: E,
    ) -> &mut Self {
        self.table
            .insert(Route::new(method, pattern, Box::pin(endpoint)));
        self
    }

    method![
        /// Registers a GET endpoint for the pattern.
        pub fn get = http::Method::GET;
        /// Registers a POST endpoint for the pattern.
        pub fn post = http::Method::POST;
        /// Registers a PUT endpoint for the pattern.
        pub fn put = http::Method::PUT;
        /// Registers a PATCH endpoint for the pattern.
        pub fn patch = http::Method::PATCH;
        /// Registers a DELETE endpoint for the pattern.
        pub fn delete = http::Method::DELETE;
    ];

    /// Creates a [`Path`] at the provided prefix.  See [`Path::at`] for more.
    pub fn at<P: AsRef<str>>(&mut self, prefix: P) -> Path<'_> {
        Path::new(join_paths("", prefix.as_ref()), &mut self.table)
    }

    /// Creates a [`Path`] at the provided prefix, and executes the provided
    /// closure with it.  See [`Path::under`] for more.
    pub fn under<P: AsRef<str>, F: FnOnce(&mut Path<'_>)>(
        &mut self,
        prefix: P,
        build: F,
    ) -> &mut Self {
        let mut path = Path::new(join_paths("", prefix.as_ref()), &mut self.table);
        build(&mut path);
        self
    }

    /// Appends middleware to the router.  Each middleware is executed in the
    /// order that it is appended to the router (i.e., the first middleware
    /// inserted executes first).
    ///
    /// # Examples
    /// ```rust
    /// let mut http = noheadache::http();
    /// http.with(noheadache::middleware::TraceMiddleware::new())
    ///     .with(noheadache::middleware::CorsMiddleware::new());
    /// ```
    pub fn with<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Sets the maximum number of bytes of a request body that are buffered.
    /// Requests with larger bodies fail with a `500`.  Defaults to
    /// 3,000,000 bytes.
    pub fn body_limit(&mut self, limit: u64) -> &mut Self {
        self.body_limit = limit;
        self
    }

    /// Registers every route in the manifest, logging each registration.
    ///
    /// # Examples
    /// ```rust
    /// # use noheadache::*;
    /// use noheadache::discovery::{MethodMap, RouteManifest};
    ///
    /// let mut manifest = RouteManifest::default();
    /// let mut methods = MethodMap::default();
    /// methods.get(endpoints::simple(|response| {
    ///     response.text("hi")?;
    ///     Ok::<_, DispatchError>(())
    /// }));
    /// manifest.insert("/hello", methods);
    ///
    /// let mut http = noheadache::http();
    /// http.mount(manifest);
    /// ```
    pub fn mount(&mut self, manifest: RouteManifest) -> &mut Self {
        for (path, methods) in manifest {
            for (method, endpoint) in methods {
                log::info!("registered {} {}", method, path);
                self.table.insert(Route::new(method, &path, endpoint));
            }
        }
        self
    }

    /// A channel to handle the termination signal.  By default, the router does
    /// not terminate, at least not gracefully, even in the face of
    /// SIGINT/SIGTERM.  This allows you to signal to the router when it should
    /// terminate, and it will gracefully shut down, letting all current
    /// requests finish before exiting.  Note that the return type is not
    /// `Clone`, and dropping the sender will not terminate the router.
    ///
    /// Note this only applies to the router when listening, and not when
    /// handling a single request.
    pub fn termination_signal(&mut self) -> watch::Sender<bool> {
        let (tx, rx) = watch::channel(false);
        self.terminate = Some(rx);
        tx
    }

    pub(crate) fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.table.iter()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.table)
            .field("middleware", &self.middleware)
            .field("body_limit", &self.body_limit)
            .finish_non_exhaustive()
    }
}

// Base *MUST* be either `""` or start with `"/"`.
fn join_paths(base: &str, extend: &str) -> String {
    let mut buffer = String::with_capacity(base.len() + extend.len());
    buffer.push_str(base);

    match (base.ends_with('/'), extend.starts_with('/')) {
        (true, true) => {
            buffer.push_str(&extend[1..]);
        }
        (false, true) | (true, false) => {
            buffer.push_str(extend);
        }
        (false, false) => {
            buffer.push('/');
            buffer.push_str(extend);
        }
    }

    buffer.shrink_to_fit();
    buffer
}
