use futures::stream::MapErr;
use futures::TryStreamExt;
use tokio::io::{AsyncReadExt, Take};
use tokio_util::io::StreamReader;

use crate::error::BodyParseError;

/// The default limit on the number of bytes buffered from a request body.
pub(crate) const DEFAULT_BODY_LIMIT: u64 = 3_000_000;

/// The data stream of a body.
///
/// The body is always buffered to completion before it is handed off, and
/// there is always an implicit limit to how much is buffered; reading one
/// byte past the limit is how we know the body was cut off.
#[must_use = "this consumes the body of the request regardless of whether it is used"]
pub(crate) struct DataStream {
    stream: Take<StreamReader<HttpStream, hyper::body::Bytes>>,
    limit: u64,
}

type HttpStream = MapErr<hyper::Body, fn(hyper::Error) -> std::io::Error>;

impl DataStream {
    /// Create a new data stream from a hyper body.
    pub(crate) fn new(body: hyper::Body, limit: u64) -> Self {
        Self {
            stream: StreamReader::new(body.map_err(map_hyper_error as fn(_) -> _))
                .take(limit.saturating_add(1)),
            limit,
        }
    }

    /// Reads the whole stream into a byte buffer.
    ///
    /// # Errors
    /// Fails with [`BodyParseError::StreamFailure`] if the connection fails
    /// mid-read, and with [`BodyParseError::TooLarge`] if the body does not
    /// fit in the limit.
    pub(crate) async fn into_bytes(mut self) -> Result<Vec<u8>, BodyParseError> {
        let mut buf = Vec::new();
        self.stream
            .read_to_end(&mut buf)
            .await
            .map_err(BodyParseError::StreamFailure)?;

        if buf.len() as u64 > self.limit {
            Err(BodyParseError::TooLarge { limit: self.limit })
        } else {
            Ok(buf)
        }
    }
}

impl std::fmt::Debug for DataStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStream")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

fn map_hyper_error(e: hyper::Error) -> std::io::Error {
    if e.is_closed() || e.is_incomplete_message() || e.is_canceled() {
        std::io::Error::new(std::io::ErrorKind::UnexpectedEof, e)
    } else {
        std::io::Error::new(std::io::ErrorKind::Other, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_whole_body() {
        let stream = DataStream::new(hyper::Body::from("hello, world"), 512);
        let bytes = stream.into_bytes().await.unwrap();
        assert_eq!(&bytes[..], b"hello, world");
    }

    #[tokio::test]
    async fn test_body_at_limit_is_accepted() {
        let stream = DataStream::new(hyper::Body::from("12345"), 5);
        assert_eq!(stream.into_bytes().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_body_over_limit_is_rejected() {
        let stream = DataStream::new(hyper::Body::from("123456"), 5);
        let error = stream.into_bytes().await.unwrap_err();
        assert!(matches!(error, BodyParseError::TooLarge { limit: 5 }));
    }

    #[tokio::test]
    async fn test_broken_stream_is_a_stream_failure() {
        let (mut sender, body) = hyper::Body::channel();
        sender.send_data("partial".into()).await.unwrap();
        sender.abort();
        let error = DataStream::new(body, 512).into_bytes().await.unwrap_err();
        assert!(matches!(error, BodyParseError::StreamFailure(_)));
    }
}
