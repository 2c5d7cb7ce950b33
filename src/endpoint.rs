use crate::request::Request;
use crate::response::Response;
use std::future::Future;
use std::pin::Pin;

#[async_trait]
/// An HTTP route handler.
///
/// This is automatically implemented for
/// `Fn(Request, Response) -> impl Future<Output = impl IntoOutcome>` types,
/// but it may be useful to implement this yourself.  A handler receives the
/// request (with its path parameters bound) and the response it should
/// complete.  If it returns an error before completing the response, the
/// dispatcher responds with a 500; if it returns without completing the
/// response at all, the dispatcher completes it with whatever status was set
/// and no body.
pub trait Endpoint: Send + Sync + 'static {
    #[must_use]
    /// Handles the request, completing the response.
    async fn apply(self: Pin<&Self>, request: Request, response: Response)
        -> Result<(), anyhow::Error>;

    #[doc(hidden)]
    fn describe(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", std::any::type_name::<Self>())
    }
}

impl std::fmt::Debug for dyn Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.describe(f)
    }
}

#[async_trait]
impl<Res, F, Fut> Endpoint for F
where
    F: Fn(Request, Response) -> Fut + Sync + Send + 'static,
    Fut: Future<Output = Res> + Send + 'static,
    Res: IntoOutcome + Send + 'static,
{
    async fn apply(
        self: Pin<&Self>,
        request: Request,
        response: Response,
    ) -> Result<(), anyhow::Error> {
        self(request, response).await.into_outcome()
    }
}

/// Converts the result of a handler into its outcome.
///
/// This uses `anyhow::Error` as the error type so that handlers can use `?`
/// on any error they come across.  It is implemented for `()` (a handler that
/// cannot fail), and for any `Result` whose error converts into
/// `anyhow::Error`.
pub trait IntoOutcome {
    /// Converts the current type into an outcome.
    ///
    /// # Errors
    /// Returns the handler's error, if it failed.
    fn into_outcome(self) -> Result<(), anyhow::Error>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

impl<R, E> IntoOutcome for Result<R, E>
where
    R: IntoOutcome,
    E: Into<anyhow::Error>,
{
    fn into_outcome(self) -> Result<(), anyhow::Error> {
        self.map_err(Into::into).and_then(IntoOutcome::into_outcome)
    }
}

impl IntoOutcome for std::convert::Infallible {
    fn into_outcome(self) -> Result<(), anyhow::Error> {
        match self {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcomes() {
        assert!(().into_outcome().is_ok());
        assert!(Ok::<(), std::io::Error>(()).into_outcome().is_ok());
        assert!(Err::<(), _>(anyhow::anyhow!("nope")).into_outcome().is_err());
        assert!(Ok::<_, anyhow::Error>(Err::<(), _>(std::fmt::Error))
            .into_outcome()
            .is_err());
    }
}
