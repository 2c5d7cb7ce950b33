use super::Router;
use crate::error::{DispatchError, ErrorBody};
use crate::middleware::Progress;
use crate::response::{Outlet, OutletReceiver};
use crate::{Request, Response};
use futures::FutureExt;
use http::header::{self, HeaderValue};
use http::StatusCode;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Where a request is in its lifecycle.
enum Stage {
    Received,
    Parsed,
    MiddlewareRunning,
    Routing,
    Handling,
    Completed,
    Errored,
    Aborted,
}

/// Logs the stages of one request.
struct Trail {
    method: http::Method,
    path: String,
}

impl Trail {
    fn new(request: &http::Request<hyper::Body>) -> Self {
        Trail {
            method: request.method().clone(),
            path: request.uri().path().to_owned(),
        }
    }

    fn enter(&self, stage: Stage) {
        log::trace!("{} {}: {:?}", self.method, self.path, stage);
    }
}

impl Router {
    /// Handles a one-off request to the router, without binding a socket.
    ///
    /// This runs the request through the whole lifecycle (body parsing,
    /// middleware, routing, and the handler), and returns the response that
    /// would have been sent to the client.  Nothing here fails; errors are
    /// turned into JSON error responses.
    ///
    /// # Examples
    /// ```rust
    /// # use noheadache::*;
    /// # #[tokio::main] async fn main() -> Result<(), anyhow::Error> {
    /// let http = noheadache::http();
    /// let response = http.handle(http::Request::get("/nowhere").body(Body::empty())?).await;
    /// assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn handle(
        &self,
        request: http::Request<hyper::Body>,
    ) -> http::Response<hyper::Body> {
        let (outlet, receiver) = Outlet::channel();
        self.dispatch(request, outlet).await;
        receive(receiver).await
    }

    /// Runs the request through its lifecycle, completing the response on the
    /// outlet exactly once.
    pub(crate) async fn dispatch(
        &self,
        request: http::Request<hyper::Body>,
        outlet: Arc<Outlet>,
    ) {
        let trail = Trail::new(&request);
        trail.enter(Stage::Received);

        let result = AssertUnwindSafe(self.process(request, &outlet, &trail))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(DispatchError::Handler(panicked(&*panic))))
            .and_then(|()| match outlet.take_failure() {
                Some(error) => Err(DispatchError::Handler(error)),
                None => Ok(()),
            });

        match result {
            Ok(()) => {
                trail.enter(Stage::Completed);
                finalize(&outlet);
            }
            Err(error) => {
                trail.enter(Stage::Errored);
                fail(&outlet, error, &trail);
            }
        }

        if outlet.is_disconnected() {
            trail.enter(Stage::Aborted);
        }
    }

    async fn process(
        &self,
        request: http::Request<hyper::Body>,
        outlet: &Arc<Outlet>,
        trail: &Trail,
    ) -> Result<(), DispatchError> {
        let mut request = Request::receive(request, self.body_limit).await?;
        trail.enter(Stage::Parsed);

        let mut response = Response::new(outlet.clone());
        trail.enter(Stage::MiddlewareRunning);
        if self.middleware.run(&mut request, &mut response).await? == Progress::Completed {
            return Ok(());
        }

        trail.enter(Stage::Routing);
        let (route, params) = self
            .table
            .lookup(request.method(), request.path())
            .ok_or_else(|| DispatchError::NotFound {
                method: request.method().clone(),
                path: request.pathname().to_owned(),
            })?;
        log::trace!("{} {} --> {:?}", request.method(), request.uri(), route);
        request.set_params(params);

        trail.enter(Stage::Handling);
        route
            .endpoint()
            .apply(request, response)
            .await
            .map_err(DispatchError::Handler)
    }
}

/// Completes a response nothing completed, with whatever status and headers
/// were staged on it.
fn finalize(outlet: &Outlet) {
    let (status, headers) = match outlet.take_staged() {
        Some(staged) => staged,
        None => return,
    };
    log::debug!("response left open; completing it with {}", status);
    let mut response = http::Response::new(hyper::Body::empty());
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    outlet.deliver(response);
}

/// Logs the error, and responds with its JSON error body if the response
/// has not been sent yet.
fn fail(outlet: &Outlet, error: DispatchError, trail: &Trail) {
    let status = error.status();
    let body = ErrorBody::from(&error);
    log::error!(
        "{} {}: {:#}",
        trail.method,
        trail.path,
        anyhow::Error::from(error)
    );

    let (_, mut headers) = match outlet.take_staged() {
        Some(staged) => staged,
        None => {
            log::warn!("response already sent; not writing the error response");
            return;
        }
    };

    let body = match serde_json::to_vec(&body) {
        Ok(body) => body,
        Err(e) => {
            log::error!("could not serialize the error body: {}", e);
            Vec::new()
        }
    };
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    let mut response = http::Response::new(hyper::Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    outlet.deliver(response);
}

fn panicked(panic: &(dyn Any + Send)) -> anyhow::Error {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "(unknown panic)".to_owned());
    anyhow::anyhow!("panicked: {}", message)
}

/// Waits for the completed response.  The dispatcher always completes it, so
/// a dropped sender only happens if dispatch itself was torn down.
pub(crate) async fn receive(receiver: OutletReceiver) -> http::Response<hyper::Body> {
    match receiver.await {
        Ok(response) => response,
        Err(_) => {
            log::error!("request dropped without a response");
            let mut response = http::Response::new(hyper::Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}
