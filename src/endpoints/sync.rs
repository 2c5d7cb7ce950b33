use std::pin::Pin;

use crate::endpoint::{Endpoint, IntoOutcome};
use crate::request::Request;
use crate::response::Response;
use anyhow::Error;

pub(crate) struct SyncEndpoint<F>(pub(crate) F);

#[async_trait]
impl<F, Res> Endpoint for SyncEndpoint<F>
where
    F: Fn(Request, &mut Response) -> Res + Send + Sync + 'static,
    Res: IntoOutcome + Send + 'static,
{
    async fn apply(self: Pin<&Self>, request: Request, mut response: Response) -> Result<(), Error> {
        let f = &self.0;
        f(request, &mut response).into_outcome()
    }
}
