//! Pre-defined endpoints.
//!
//! These adapt plain closures into [`Endpoint`]s, for handlers that do not
//! need to await anything.  Their use should be as simple as this:
//!
//! ```rust
//! # use noheadache::*;
//! let mut http = noheadache::http();
//! http.get("/home", noheadache::endpoints::simple(|response| {
//!     response.text("hello, there!")?;
//!     Ok::<_, DispatchError>(())
//! }));
//! ```

mod sync;

use crate::endpoint::IntoOutcome;
use crate::{Endpoint, Request, Response};

/// Creates an endpoint that synchronously completes the response.
///
/// This does not spawn a blocking task; so any endpoint that uses this should
/// not block the task in its processing.  This is useful for endpoints that
/// quickly generate a response, or otherwise do not use futures.
///
/// # Examples
///
/// ```rust
/// let mut http = noheadache::http();
/// http.get("/users/:id", noheadache::endpoints::sync(|request, response| {
///     let id = request.param("id").unwrap_or_default();
///     response.json(&serde_json::json!({ "id": id }))?;
///     Ok::<_, noheadache::DispatchError>(())
/// }));
/// ```
pub fn sync<F, Res>(func: F) -> impl Endpoint
where
    F: Fn(Request, &mut Response) -> Res + Send + Sync + 'static,
    Res: IntoOutcome + Send + 'static,
{
    self::sync::SyncEndpoint(func)
}

/// Creates an endpoint that completes the response regardless of the
/// request.
///
/// # Examples
///
/// ```rust
/// let mut http = noheadache::http();
/// http.get("/teapot", noheadache::endpoints::simple(|response| {
///     response.status(418).end();
/// }));
/// ```
pub fn simple<F, Res>(func: F) -> impl Endpoint
where
    F: Fn(&mut Response) -> Res + Send + Sync + 'static,
    Res: IntoOutcome + Send + 'static,
{
    sync::<_, Res>(move |_, response| func(response))
}
