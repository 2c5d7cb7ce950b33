//! Request middleware.
//!
//! Middleware runs, in the order it was added to the router, before the
//! request is routed.  Each one sees the parsed request and the response,
//! and decides how the request proceeds by returning a [`Flow`]:
//!
//! ```rust
//! # use noheadache::*;
//! use noheadache::middleware::{self, Flow};
//!
//! let mut http = noheadache::http();
//! http.with(middleware::TraceMiddleware::new())
//!     .with(middleware::from_fn(|request, response| {
//!         if request.header("authorization").is_none() {
//!             response.status(401).end();
//!             return Flow::Completed;
//!         }
//!         Flow::Continue
//!     }));
//! ```

mod cors;
mod trace;

pub use self::cors::CorsMiddleware;
pub use self::trace::TraceMiddleware;
use crate::error::DispatchError;
use crate::{Request, Response};
use std::fmt::Debug;
use std::pin::Pin;

#[derive(Debug)]
#[must_use]
/// How the request proceeds after a middleware has run.
pub enum Flow {
    /// Run the next middleware, or route the request if this was the last.
    Continue,
    /// Stop here, and respond with an error.  Neither the remaining
    /// middleware nor the route handler run.
    Abort(anyhow::Error),
    /// The middleware completed the response itself.  Neither the remaining
    /// middleware nor the route handler run.
    Completed,
}

impl Flow {
    /// Aborts with the given error.
    pub fn abort<E: Into<anyhow::Error>>(error: E) -> Self {
        Flow::Abort(error.into())
    }
}

#[async_trait]
/// A request interceptor.
///
/// This sits between the parsed request and the route handler.  A typical
/// middleware inspects or modifies the request (e.g. inserting extensions
/// for the handler), stages headers on the response, and then returns
/// [`Flow::Continue`].  It may also complete the response itself and
/// return [`Flow::Completed`], or fail with [`Flow::Abort`].
///
/// Whatever a middleware returns, once the response has been sent the
/// pipeline stops; nothing after it runs.
pub trait Middleware: Debug + Send + Sync + 'static {
    #[must_use]
    /// Handles the given request.
    async fn apply(self: Pin<&Self>, request: &mut Request, response: &mut Response) -> Flow;
}

/// Creates a middleware from a synchronous closure.
///
/// # Examples
/// ```rust
/// # use noheadache::*;
/// use noheadache::middleware::{from_fn, Flow};
///
/// let stamp = from_fn(|_, response| match response.header("X-Powered-By", "noheadache") {
///     Ok(_) => Flow::Continue,
///     Err(e) => Flow::abort(e),
/// });
/// let mut http = noheadache::http();
/// http.with(stamp);
/// ```
pub fn from_fn<F>(func: F) -> FnMiddleware<F>
where
    F: Fn(&mut Request, &mut Response) -> Flow + Send + Sync + 'static,
{
    FnMiddleware(func)
}

/// A middleware backed by a closure.  See [`from_fn`].
pub struct FnMiddleware<F>(F);

impl<F> Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FnMiddleware")
            .field(&std::any::type_name::<F>())
            .finish()
    }
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut Request, &mut Response) -> Flow + Send + Sync + 'static,
{
    async fn apply(self: Pin<&Self>, request: &mut Request, response: &mut Response) -> Flow {
        let f = &self.0;
        f(request, response)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What the pipeline left for the dispatcher to do.
pub(crate) enum Progress {
    /// Every middleware continued; route the request.
    Proceed,
    /// The response was completed by a middleware.
    Completed,
}

#[derive(Debug, Default)]
/// The ordered middleware of a router.
pub(crate) struct Pipeline(Vec<Pin<Box<dyn Middleware>>>);

impl Pipeline {
    pub(crate) fn push<M: Middleware>(&mut self, middleware: M) {
        self.0.push(Box::pin(middleware));
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    /// Runs every middleware in order, one at a time, stopping at the first
    /// that aborts or completes the response.
    pub(crate) async fn run(
        &self,
        request: &mut Request,
        response: &mut Response,
    ) -> Result<Progress, DispatchError> {
        for (index, middleware) in self.0.iter().enumerate() {
            let flow = middleware.as_ref().apply(request, response).await;
            log::trace!("middleware[{}] {:?} -> {:?}", index, middleware, flow);

            match flow {
                Flow::Abort(error) => return Err(DispatchError::Middleware(error)),
                Flow::Completed => return Ok(Progress::Completed),
                Flow::Continue if response.is_sent() => {
                    log::debug!(
                        "middleware[{}] sent the response but continued; stopping",
                        index
                    );
                    return Ok(Progress::Completed);
                }
                Flow::Continue => {}
            }
        }

        Ok(Progress::Proceed)
    }
}
