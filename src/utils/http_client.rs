//! Byte-stream HTTP client used by the playlist and guide fetchers
//!
//! The ingestion code only needs "GET this URL and hand me the body as it
//! arrives", so that is the whole trait. Tests substitute their own
//! implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use reqwest::header::{CONTENT_ENCODING, USER_AGENT};
use tracing::debug;

use crate::errors::{IngestError, NetworkError};
use crate::utils::url::UrlUtils;

/// Connect and per-read timeouts for one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub read: Duration,
}

/// Incremental body with the headers the fetchers care about
pub struct ByteResponse {
    /// Declared body length, if the server sent one
    pub content_length: Option<u64>,
    /// Raw `Content-Encoding` header value
    pub content_encoding: Option<String>,
    pub body: BoxStream<'static, Result<Bytes, NetworkError>>,
}

impl std::fmt::Debug for ByteResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteResponse")
            .field("content_length", &self.content_length)
            .field("content_encoding", &self.content_encoding)
            .finish_non_exhaustive()
    }
}

impl ByteResponse {
    /// Build a response from an in-memory body, split into the given chunks
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
    {
        let chunks: Vec<Bytes> = chunks.into_iter().collect();
        let length = chunks.iter().map(|c| c.len() as u64).sum();
        Self {
            content_length: Some(length),
            content_encoding: None,
            body: futures::stream::iter(chunks.into_iter().map(Ok)).boxed(),
        }
    }

    /// Drain the body into memory, failing once `limit` bytes are exceeded
    pub async fn collect(self, limit: usize, url: &str) -> Result<Bytes, NetworkError> {
        let url = UrlUtils::obfuscate_credentials(url);
        self.body
            .try_fold(BytesMut::new(), |mut acc, chunk| {
                let url = url.clone();
                async move {
                    if acc.len() + chunk.len() > limit {
                        return Err(NetworkError::Transfer {
                            url,
                            message: format!("response larger than {limit} bytes"),
                        });
                    }
                    acc.extend_from_slice(&chunk);
                    Ok(acc)
                }
            })
            .await
            .map(BytesMut::freeze)
    }
}

/// GET returning an incremental body
#[async_trait]
pub trait ByteStreamClient: Send + Sync {
    /// Start a GET request. Non-2xx statuses are errors.
    async fn get_stream(&self, url: &str) -> Result<ByteResponse, NetworkError>;
}

/// reqwest implementation of [`ByteStreamClient`]
///
/// Uses a connect timeout plus a per-read timeout rather than a total
/// request timeout, so large playlists can take as long as they need while a
/// stalled server is still detected.
#[derive(Debug, Clone)]
pub struct ReqwestByteClient {
    client: Client,
    user_agent: String,
}

impl ReqwestByteClient {
    pub fn new(timeouts: HttpTimeouts, user_agent: impl Into<String>) -> Result<Self, IngestError> {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read)
            .build()
            .map_err(|e| IngestError::configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            user_agent: user_agent.into(),
        })
    }
}

#[async_trait]
impl ByteStreamClient for ReqwestByteClient {
    async fn get_stream(&self, url: &str) -> Result<ByteResponse, NetworkError> {
        debug!("Requesting {}", UrlUtils::obfuscate_credentials(url));

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(&e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Server {
                status: status.as_u16(),
                url: UrlUtils::obfuscate_credentials(url),
            });
        }

        let content_length = response.content_length();
        let content_encoding = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        debug!(
            "Response {} for {} (length: {:?}, encoding: {:?})",
            status.as_u16(),
            UrlUtils::obfuscate_credentials(url),
            content_length,
            content_encoding
        );

        let url = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| NetworkError::from_reqwest(&e, &url)))
            .boxed();

        Ok(ByteResponse {
            content_length,
            content_encoding,
            body,
        })
    }
}
