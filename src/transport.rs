use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::CONNECTION;
use reqwest::Client;
use serde::Deserialize;

use crate::auth::StreamAuth;
use crate::retry::with_timeout;
use crate::stream::{HttpMethod, StreamClientError, StreamConfig, StreamRequest};

const ERROR_BODY_SNIPPET_LEN: usize = 220;

/// Response body chunks as they arrive from the server.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamClientError>> + Send>>;

/// Kept-open response returned by a [`StreamTransport`].
pub struct StreamResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl StreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Opens one streaming HTTP request.
///
/// Errors returned here mean no status line was received and are retried
/// with network-class backoff. Non-success statuses are returned as a
/// normal [`StreamResponse`].
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open_stream(&self, request: &StreamRequest)
        -> Result<StreamResponse, StreamClientError>;
}

/// [`StreamTransport`] backed by `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    auth: Arc<dyn StreamAuth>,
}

impl HttpTransport {
    pub fn new(config: &StreamConfig, auth: Arc<dyn StreamAuth>) -> Result<Self, StreamClientError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(StreamClientError::Transport)?;
        Ok(Self { http, auth })
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StreamTransport for HttpTransport {
    async fn open_stream(
        &self,
        request: &StreamRequest,
    ) -> Result<StreamResponse, StreamClientError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(&request.url).query(&request.params),
            HttpMethod::Post => self.http.post(&request.url).form(&request.params),
        };
        builder = builder.header(CONNECTION, "close");
        for (name, value) in self.auth.headers(request)? {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(StreamClientError::Transport)?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(StreamClientError::Transport));

        Ok(StreamResponse {
            status,
            body: Box::pin(body),
        })
    }
}

/// Reads at most the first chunk of an error response and summarizes it.
pub(crate) async fn read_error_body(body: &mut ByteStream, timeout: Duration) -> String {
    match with_timeout(timeout, body.next()).await {
        Ok(Some(Ok(chunk))) => summarize_error_body(&String::from_utf8_lossy(&chunk)),
        _ => String::new(),
    }
}

pub(crate) fn summarize_error_body(body: &str) -> String {
    #[derive(Debug, Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.error.or(parsed.message).or(parsed.reason) {
            return message;
        }
    }

    body.trim().chars().take(ERROR_BODY_SNIPPET_LEN).collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use futures_util::stream;

    use super::{read_error_body, summarize_error_body, ByteStream, StreamResponse};
    use crate::stream::StreamClientError;

    type Chunk = Result<Bytes, StreamClientError>;

    #[test]
    fn error_body_prefers_structured_message() {
        assert_eq!(summarize_error_body(r#"{"error":"rate limited"}"#), "rate limited");
        assert_eq!(summarize_error_body(r#"{"reason":"maintenance"}"#), "maintenance");
        let long = "x".repeat(500);
        assert_eq!(summarize_error_body(&long).len(), 220);
    }

    #[test]
    fn only_first_chunk_of_error_body_is_read() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");

        runtime.block_on(async {
            let mut body: ByteStream = Box::pin(stream::iter(vec![
                Chunk::Ok(Bytes::from_static(b"Unauthorized\n")),
                Ok(Bytes::from_static(b"ignored")),
            ]));
            let summary = read_error_body(&mut body, Duration::from_millis(50)).await;
            assert_eq!(summary, "Unauthorized");

            let mut silent: ByteStream = Box::pin(stream::pending::<Chunk>());
            let summary = read_error_body(&mut silent, Duration::from_millis(5)).await;
            assert!(summary.is_empty());
        });
    }

    #[test]
    fn success_covers_2xx_only() {
        let response = |status| StreamResponse {
            status,
            body: Box::pin(stream::empty::<Chunk>()),
        };
        assert!(response(200).is_success());
        assert!(response(204).is_success());
        assert!(!response(304).is_success());
        assert!(!response(420).is_success());
    }
}
