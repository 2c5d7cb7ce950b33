use crate::error::{DispatchError, ErrorBody};
use futures::TryStreamExt;
use http::header::{self, HeaderMap, HeaderValue};
use http::StatusCode;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;

type FinishHook = Box<dyn FnOnce(StatusCode) + Send + 'static>;

/// What happened when a finished response was handed to the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// The response is on its way to the client.
    Delivered,
    /// A response was already handed over; nothing was written.
    AlreadySent,
    /// The client went away before the response could be handed over.
    Disconnected,
}

/// The outbound channel for a single request.
///
/// Exactly one response can ever pass through it.  The dispatcher and the
/// [`Response`] handed to middleware and handlers share it, so whichever
/// completes the response first wins, and everyone else can see that it has
/// been sent.
pub(crate) struct Outlet {
    state: Mutex<OutletState>,
}

struct OutletState {
    sender: Option<oneshot::Sender<http::Response<hyper::Body>>>,
    hooks: Vec<FinishHook>,
    sent: Option<StatusCode>,
    staged: Option<(StatusCode, HeaderMap)>,
    failure: Option<anyhow::Error>,
    disconnected: bool,
}

pub(crate) type OutletReceiver = oneshot::Receiver<http::Response<hyper::Body>>;

impl Outlet {
    pub(crate) fn channel() -> (Arc<Outlet>, OutletReceiver) {
        let (tx, rx) = oneshot::channel();
        let outlet = Outlet {
            state: Mutex::new(OutletState {
                sender: Some(tx),
                hooks: vec![],
                sent: None,
                staged: None,
                failure: None,
                disconnected: false,
            }),
        };
        (Arc::new(outlet), rx)
    }

    pub(crate) fn is_sent(&self) -> bool {
        self.state.lock().sent.is_some()
    }

    pub(crate) fn deliver(&self, response: http::Response<hyper::Body>) -> Delivery {
        let status = response.status();
        let (sender, hooks) = {
            let mut state = self.state.lock();
            match state.sender.take() {
                Some(sender) => {
                    state.sent = Some(status);
                    (sender, std::mem::take(&mut state.hooks))
                }
                None => return Delivery::AlreadySent,
            }
        };

        let delivery = match sender.send(response) {
            Ok(()) => Delivery::Delivered,
            Err(_) => {
                self.state.lock().disconnected = true;
                Delivery::Disconnected
            }
        };

        for hook in hooks {
            hook(status);
        }

        delivery
    }

    /// Keeps the status and headers a dropped [`Response`] had staged, so
    /// the dispatcher can still complete the response with them.
    fn stage(&self, status: StatusCode, headers: HeaderMap) {
        let mut state = self.state.lock();
        if state.sent.is_none() {
            state.staged = Some((status, headers));
        }
    }

    /// The status and headers to complete the response with, if it has not
    /// been sent yet.  Falls back to a bare `200` if nothing was staged.
    pub(crate) fn take_staged(&self) -> Option<(StatusCode, HeaderMap)> {
        let mut state = self.state.lock();
        if state.sent.is_some() {
            return None;
        }
        Some(
            state
                .staged
                .take()
                .unwrap_or_else(|| (StatusCode::OK, HeaderMap::new())),
        )
    }

    /// Whether a response was handed over after the client went away.
    pub(crate) fn is_disconnected(&self) -> bool {
        self.state.lock().disconnected
    }

    /// Remembers that completing the response failed, in case whoever
    /// attempted it drops the error.
    fn record_failure(&self, error: anyhow::Error) {
        let mut state = self.state.lock();
        if state.sent.is_none() {
            state.failure = Some(error);
        }
    }

    /// The recorded failure, if the response was never sent after it.
    pub(crate) fn take_failure(&self) -> Option<anyhow::Error> {
        let mut state = self.state.lock();
        if state.sent.is_some() {
            return None;
        }
        state.failure.take()
    }

    fn on_finish(&self, hook: FinishHook) {
        let sent = {
            let mut state = self.state.lock();
            match state.sent {
                Some(status) => status,
                None => {
                    state.hooks.push(hook);
                    return;
                }
            }
        };
        hook(sent);
    }
}

impl std::fmt::Debug for Outlet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Outlet")
            .field("sent", &state.sent)
            .field("failed", &state.failure.is_some())
            .field("disconnected", &state.disconnected)
            .field("hooks", &state.hooks.len())
            .finish()
    }
}

#[derive(Debug)]
/// The response side of a request.
///
/// This wraps the outbound channel of a single request.  The status and
/// headers are staged on it until one of the completing operations
/// ([`Response::json`], [`Response::send`], [`Response::text`],
/// [`Response::redirect`], [`Response::send_file`], [`Response::end`]) hands
/// the response to the client.  A response can only be completed once; every
/// operation checks first, and anything attempted after completion is
/// skipped (and logged).
///
/// Every operation returns the response again so calls can be chained.
///
/// # Examples
/// ```rust
/// # use noheadache::*;
/// async fn create(request: Request, mut response: Response) -> Result<(), anyhow::Error> {
///     let name = request.payload().form_value("name").unwrap_or("anonymous");
///     response
///         .status(201)
///         .header("X-Created-By", "noheadache")?
///         .json(&serde_json::json!({ "name": name }))?;
///     Ok(())
/// }
/// ```
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    outlet: Arc<Outlet>,
}

impl Response {
    pub(crate) fn new(outlet: Arc<Outlet>) -> Self {
        Response {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            outlet,
        }
    }

    /// Whether the response has already been handed to the client.
    pub fn is_sent(&self) -> bool {
        self.outlet.is_sent()
    }

    /// Sets the status code.  Nothing is written until the response is
    /// completed.  Codes outside of `100..=999` are ignored.
    ///
    /// # Examples
    /// ```rust
    /// # use noheadache::*;
    /// async fn gone(_: Request, mut response: Response) -> Result<(), anyhow::Error> {
    ///     response.status(410).text("gone")?;
    ///     Ok(())
    /// }
    /// ```
    pub fn status(&mut self, code: u16) -> &mut Self {
        match StatusCode::from_u16(code) {
            Ok(status) => self.set_status(status),
            Err(_) => {
                log::warn!("response.status: ignoring invalid status code {}", code);
                self
            }
        }
    }

    /// Sets the status code from a [`StatusCode`].
    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        if self.is_sent() {
            log::warn!("response.status: response already sent, ignoring {}", status);
        } else {
            self.status = status;
        }
        self
    }

    /// The status code that the response will be (or was) completed with.
    pub fn current_status(&self) -> StatusCode {
        self.status
    }

    /// Returns a reference to the staged headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Sets a header, replacing any previous values of it.
    ///
    /// # Errors
    /// Fails if the value cannot be converted into a header value.
    pub fn header<K, V>(&mut self, key: K, value: V) -> Result<&mut Self, DispatchError>
    where
        K: header::IntoHeaderName,
        V: TryInto<HeaderValue>,
        http::Error: From<<V as TryInto<HeaderValue>>::Error>,
    {
        let value = value
            .try_into()
            .map_err(|e| DispatchError::InvalidHeader(e.into()))?;
        if self.is_sent() {
            log::warn!("response.header: response already sent, ignoring header");
        } else {
            self.headers.insert(key, value);
        }
        Ok(self)
    }

    /// Registers a hook that runs with the final status code once the
    /// response has been handed to the client.  If it already has been, the
    /// hook runs immediately.
    pub fn on_finish<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnOnce(StatusCode) + Send + 'static,
    {
        self.outlet.on_finish(Box::new(hook));
        self
    }

    /// Serializes the value as JSON, sets `Content-Type: application/json`,
    /// and completes the response.
    ///
    /// # Errors
    /// Fails if the value cannot be serialized.  The response is left open,
    /// and the failure is remembered: unless something else completes the
    /// response, the dispatcher responds with a 500 even if the error is
    /// dropped.
    pub fn json<V: serde::Serialize + ?Sized>(
        &mut self,
        value: &V,
    ) -> Result<&mut Self, DispatchError> {
        if self.skip_if_sent("json") {
            return Ok(self);
        }
        let body = match serde_json::to_vec(value) {
            Ok(body) => body,
            Err(e) => return Err(self.serialization_failed(e)),
        };
        self.complete_with("application/json", body.into())
    }

    /// Completes the response with the value.  Strings are written as
    /// `text/plain`; anything else is written as JSON.
    ///
    /// # Errors
    /// Fails if the value cannot be serialized.
    ///
    /// # Examples
    /// ```rust
    /// # use noheadache::*;
    /// async fn hello(_: Request, mut response: Response) -> Result<(), anyhow::Error> {
    ///     response.send("hello, world")?; // text/plain
    ///     Ok(())
    /// }
    ///
    /// async fn numbers(_: Request, mut response: Response) -> Result<(), anyhow::Error> {
    ///     response.send(&[1, 2, 3])?; // application/json
    ///     Ok(())
    /// }
    /// ```
    pub fn send<V: serde::Serialize + ?Sized>(
        &mut self,
        value: &V,
    ) -> Result<&mut Self, DispatchError> {
        if self.skip_if_sent("send") {
            return Ok(self);
        }
        match serde_json::to_value(value) {
            Ok(serde_json::Value::String(text)) => self.text(text),
            Ok(other) => self.json(&other),
            Err(e) => Err(self.serialization_failed(e)),
        }
    }

    /// Writes the text as `text/plain; charset=utf-8` and completes the
    /// response.
    ///
    /// # Errors
    /// This currently never fails; it returns a result to chain like the
    /// other completing operations.
    pub fn text<T: Into<String>>(&mut self, body: T) -> Result<&mut Self, DispatchError> {
        if self.skip_if_sent("text") {
            return Ok(self);
        }
        self.complete_with("text/plain; charset=utf-8", body.into().into())
    }

    /// Redirects to the location with a 302.
    ///
    /// # Errors
    /// Fails if the location is not a valid header value.
    pub fn redirect(&mut self, location: &str) -> Result<&mut Self, DispatchError> {
        self.redirect_with(StatusCode::FOUND, location)
    }

    /// Redirects to the location with the given status, with no body.
    ///
    /// # Errors
    /// Fails if the location is not a valid header value.
    pub fn redirect_with(
        &mut self,
        status: StatusCode,
        location: &str,
    ) -> Result<&mut Self, DispatchError> {
        if self.skip_if_sent("redirect") {
            return Ok(self);
        }
        self.header(header::LOCATION, location)?;
        self.status = status;
        self.complete(hyper::Body::empty())
    }

    /// Completes the response with the staged status and headers, and no
    /// body.
    pub fn end(&mut self) -> &mut Self {
        if !self.skip_if_sent("end") {
            // Completing with an empty body cannot fail.
            let _ = self.complete(hyper::Body::empty());
        }
        self
    }

    /// Streams the file at the path to the client, with the given content
    /// type.
    ///
    /// If the file cannot be opened (or is not a file), this responds with a
    /// 404 instead.  If reading fails after the response has started, the
    /// status can no longer change; the body is cut off, which terminates the
    /// response on the connection.  The file is closed when the stream is
    /// dropped.
    ///
    /// # Errors
    /// Fails if the content type is not a valid header value.
    pub async fn send_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        content_type: &str,
    ) -> Result<&mut Self, DispatchError> {
        if self.skip_if_sent("send_file") {
            return Ok(self);
        }
        let path = path.as_ref();
        let content_type =
            HeaderValue::try_from(content_type).map_err(|e| DispatchError::InvalidHeader(e.into()))?;

        let file = match open_file(path).await {
            Ok(file) => file,
            Err(e) => {
                log::debug!("response.send_file({:?}): {}", path, e);
                self.status = StatusCode::NOT_FOUND;
                return self.json(&ErrorBody::new("File not found", None));
            }
        };

        self.stream_from(file, content_type, path.display().to_string())
    }

    /// Completes the response with the contents of the reader.  A read
    /// failure cuts the body off; the status has already gone out.
    fn stream_from<R>(
        &mut self,
        reader: R,
        content_type: HeaderValue,
        source: String,
    ) -> Result<&mut Self, DispatchError>
    where
        R: AsyncRead + Send + 'static,
    {
        let stream = ReaderStream::new(reader).inspect_err(move |e| {
            log::error!("response.send_file({}): read failed mid-stream: {}", source, e);
        });
        self.headers.insert(header::CONTENT_TYPE, content_type);
        self.complete(hyper::Body::wrap_stream(stream))
    }

    /// Like [`Response::send_file`], but guesses the content type from the
    /// extension, defaulting to `application/octet-stream`.
    ///
    /// # Errors
    /// See [`Response::send_file`].
    pub async fn send_file_guess<P: AsRef<Path>>(
        &mut self,
        path: P,
    ) -> Result<&mut Self, DispatchError> {
        let mime = mime_guess::MimeGuess::from_path(path.as_ref()).first_or_octet_stream();
        self.send_file(path, mime.as_ref()).await
    }

    fn serialization_failed(&self, error: serde_json::Error) -> DispatchError {
        self.outlet
            .record_failure(anyhow::anyhow!("could not serialize the response body: {}", error));
        DispatchError::Serialization(error)
    }

    fn skip_if_sent(&self, operation: &str) -> bool {
        let sent = self.is_sent();
        if sent {
            log::warn!(
                "response.{}: {}; skipping",
                operation,
                DispatchError::ResponseAlreadySent
            );
        }
        sent
    }

    fn complete_with(
        &mut self,
        content_type: &'static str,
        body: hyper::Body,
    ) -> Result<&mut Self, DispatchError> {
        self.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.complete(body)
    }

    fn complete(&mut self, body: hyper::Body) -> Result<&mut Self, DispatchError> {
        let mut response = http::Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = std::mem::take(&mut self.headers);

        match self.outlet.deliver(response) {
            Delivery::Delivered => {}
            Delivery::Disconnected => {
                log::debug!("response: client went away before the response was sent");
            }
            Delivery::AlreadySent => {
                log::warn!("response: {}; skipping", DispatchError::ResponseAlreadySent);
            }
        }
        Ok(self)
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        if !self.is_sent() {
            self.outlet.stage(self.status, std::mem::take(&mut self.headers));
        }
    }
}

async fn open_file(path: &Path) -> Result<tokio::fs::File, std::io::Error> {
    let file = tokio::fs::File::open(path).await?;
    if file.metadata().await?.is_file() {
        Ok(file)
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not a regular file",
        ))
    }
}
