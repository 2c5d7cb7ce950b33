use std::pin::Pin;
use std::time::Instant;

use super::{Flow, Middleware};
use crate::{Request, Response};

#[derive(Default, Debug, Clone)]
/// A middleware for tracing HTTP requests.
///
/// This logs (using `log`) each request as it arrives, and again once its
/// response has been handed to the client, along with the final status and
/// how long the request took.  The default log level is `info`.
pub struct TraceMiddleware {
    _v: (),
}

impl TraceMiddleware {
    #[must_use]
    /// Creates a new trace middleware.  This is provided as an alternative
    /// to `Default`.
    pub fn new() -> Self {
        TraceMiddleware::default()
    }
}

#[async_trait]
impl Middleware for TraceMiddleware {
    async fn apply(self: Pin<&Self>, request: &mut Request, response: &mut Response) -> Flow {
        let method = request.method().clone();
        let path = request.uri().to_string();
        log::info!("--> {} {}", method, path);
        let start = Instant::now();

        response.on_finish(move |status| {
            log::info!(
                "<-- {} {}: {} (in {}ms)",
                method,
                path,
                status,
                start.elapsed().as_millis()
            );
        });

        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;
    use crate::response::tests::pending;

    #[tokio::test]
    async fn test_continues_and_stays_out_of_the_response() {
        let mut request =
            Request::from(http::Request::get("/users/1?x=y").body(Payload::Empty).unwrap());
        let (mut response, rx) = pending();
        let middleware = Box::pin(TraceMiddleware::new());

        let flow = middleware.as_ref().apply(&mut request, &mut response).await;
        assert!(matches!(flow, Flow::Continue));
        assert!(!response.is_sent());

        response.status(204).end();
        assert_eq!(rx.await.unwrap().status(), 204);
    }
}
