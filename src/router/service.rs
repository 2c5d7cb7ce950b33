use super::dispatch::receive;
use super::Router;
use crate::error::DispatchError;
use crate::request::PeerAddress;
use crate::response::Outlet;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

impl Router {
    /// Creates a listen server on the specified address.
    ///
    /// # Errors
    /// This can fail if the socket address is invalid, or if the socket is
    /// already in use.
    ///
    /// # Examples
    /// ```rust,no_run
    /// # use noheadache::*;
    /// # #[tokio::main] async fn main() -> Result<(), anyhow::Error> {
    /// let mut http = noheadache::http();
    /// http.get("/", endpoints::simple(|response| {
    ///     response.text("hello, world!")?;
    ///     Ok::<_, DispatchError>(())
    /// }));
    /// http.listen("0.0.0.0:8080").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn listen(self, address: &str) -> Result<(), DispatchError> {
        self.listen_with(address, |_| {}).await
    }

    /// Creates a listen server on the specified address, calling `on_ready`
    /// with the bound address once the socket is listening.  Binding to port
    /// `0` picks a free port; `on_ready` is how to find out which.
    ///
    /// Each request is dispatched on its own task.  If a
    /// [`Router::termination_signal`] was set up, the server stops accepting
    /// connections once it fires, and returns after the in-flight requests
    /// complete.
    ///
    /// # Errors
    /// This can fail if the socket address is invalid, or if the socket is
    /// already in use.
    ///
    /// # Examples
    /// ```rust,no_run
    /// # #[tokio::main] async fn main() -> Result<(), anyhow::Error> {
    /// let http = noheadache::http();
    /// http.listen_with("127.0.0.1:3000", |address| {
    ///     println!("listening on {}", address);
    /// })
    /// .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn listen_with<F>(
        mut self,
        address: &str,
        on_ready: F,
    ) -> Result<(), DispatchError>
    where
        F: FnOnce(SocketAddr),
    {
        let address: SocketAddr = address
            .parse()
            .map_err(|_| DispatchError::InvalidAddress(address.to_owned()))?;

        log::info!("listen({})", address);
        log::debug!(
            "{} routes, {} middleware",
            self.table.len(),
            self.middleware.len()
        );

        if log::log_enabled!(log::Level::Trace) {
            for route in self.routes() {
                log::trace!("route: {} {} ({:?})", route.method(), route.path(), route);
            }
        }

        let termination = self.terminate.take();
        let termination = async {
            match termination {
                Some(mut tx) => loop {
                    if *tx.borrow() {
                        break;
                    }
                    match tx.changed().await {
                        Ok(_) => continue,
                        Err(_) => futures::future::pending().await,
                    }
                },
                None => futures::future::pending().await,
            }
        };

        let this = Arc::pin(self);

        let server = hyper::server::Server::try_bind(&address)
            .map_err(DispatchError::HyperServer)?
            .serve(hyper::service::make_service_fn(
                |v: &hyper::server::conn::AddrStream| {
                    let router = this.clone();
                    let service = RouterService(router, v.remote_addr());
                    async move { Ok::<_, std::convert::Infallible>(service) }
                },
            ));

        on_ready(server.local_addr());

        server
            .with_graceful_shutdown(termination)
            .await
            .map_err(DispatchError::HyperServer)?;

        log::info!("stopped listening on {}", address);
        Ok(())
    }
}

#[derive(Clone)]
struct RouterService(Pin<Arc<Router>>, SocketAddr);

type RouterFuture<R, E> = Pin<Box<dyn Future<Output = Result<R, E>> + Send + 'static>>;

impl tower::Service<hyper::Request<hyper::Body>> for RouterService {
    type Response = hyper::Response<hyper::Body>;
    type Error = std::convert::Infallible;
    type Future = RouterFuture<Self::Response, Self::Error>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut request: hyper::Request<hyper::Body>) -> Self::Future {
        let this = (self.0).clone();
        request.extensions_mut().insert(PeerAddress(self.1));
        let (outlet, receiver) = Outlet::channel();

        // The response can be handed over before the handler is done, so the
        // dispatch runs on its own task while this future waits for it.
        tokio::spawn(async move { this.as_ref().dispatch(request, outlet).await });

        Box::pin(async move { Ok(receive(receiver).await) })
    }
}
