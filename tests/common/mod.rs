//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use playlist_ingest::cache::TEMP_PREFIX;
use playlist_ingest::errors::NetworkError;
use playlist_ingest::utils::http_client::{ByteResponse, ByteStreamClient};
use tokio::sync::mpsc;

pub const PLAYLIST_URL: &str = "http://provider.example.com/get.php?username=u&password=p&type=m3u_plus";

/// Canned response for one request
pub enum FakeResponse {
    Body {
        chunks: Vec<Bytes>,
        content_length: Option<u64>,
        content_encoding: Option<String>,
    },
    /// Sends the chunks, then fails the body stream
    FailAfter {
        chunks: Vec<Bytes>,
        error: NetworkError,
    },
    /// Body fed by the test through a channel
    Streamed {
        receiver: mpsc::UnboundedReceiver<Result<Bytes, NetworkError>>,
        content_length: Option<u64>,
    },
    Error(NetworkError),
}

impl FakeResponse {
    /// Body split into chunks of `chunk_size` bytes
    pub fn body(data: impl AsRef<[u8]>, chunk_size: usize) -> Self {
        let data = data.as_ref();
        Self::Body {
            chunks: chunked(data, chunk_size),
            content_length: Some(data.len() as u64),
            content_encoding: None,
        }
    }

    pub fn fail_after(data: impl AsRef<[u8]>, chunk_size: usize) -> Self {
        Self::FailAfter {
            chunks: chunked(data.as_ref(), chunk_size),
            error: NetworkError::Transfer {
                url: PLAYLIST_URL.to_string(),
                message: "connection reset".to_string(),
            },
        }
    }

    /// A body the test drives by hand
    pub fn streamed(
        content_length: Option<u64>,
    ) -> (Self, mpsc::UnboundedSender<Result<Bytes, NetworkError>>) {
        let (tx, receiver) = mpsc::unbounded_channel();
        (
            Self::Streamed {
                receiver,
                content_length,
            },
            tx,
        )
    }
}

pub fn chunked(data: &[u8], chunk_size: usize) -> Vec<Bytes> {
    data.chunks(chunk_size.max(1))
        .map(Bytes::copy_from_slice)
        .collect()
}

/// `ByteStreamClient` answering from per-URL queues of canned responses
#[derive(Default)]
pub struct FakeClient {
    responses: Mutex<HashMap<String, VecDeque<FakeResponse>>>,
    calls: AtomicUsize,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: &str, response: FakeResponse) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ByteStreamClient for FakeClient {
    async fn get_stream(&self, url: &str) -> Result<ByteResponse, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .responses
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front);

        match next {
            Some(FakeResponse::Body {
                chunks,
                content_length,
                content_encoding,
            }) => Ok(ByteResponse {
                content_length,
                content_encoding,
                body: stream::iter(chunks.into_iter().map(Ok)).boxed(),
            }),
            Some(FakeResponse::FailAfter { chunks, error }) => {
                let items = chunks
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(error)));
                Ok(ByteResponse {
                    content_length: None,
                    content_encoding: None,
                    body: stream::iter(items).boxed(),
                })
            }
            Some(FakeResponse::Streamed {
                receiver,
                content_length,
            }) => Ok(ByteResponse {
                content_length,
                content_encoding: None,
                body: stream::unfold(receiver, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                })
                .boxed(),
            }),
            Some(FakeResponse::Error(error)) => Err(error),
            None => Err(NetworkError::Unreachable {
                url: url.to_string(),
                message: "no canned response".to_string(),
            }),
        }
    }
}

/// Build an M3U playlist with `count` live channels
pub fn playlist(count: usize) -> String {
    let mut out = String::from("#EXTM3U x-tvg-url=\"http://provider.example.com/epg.xml.gz\"\n");
    for i in 0..count {
        out.push_str(&format!(
            "#EXTINF:-1 tvg-id=\"ch{i}\" tvg-name=\"Channel {i}\" group-title=\"Group {}\",Channel {i}\n",
            i % 10
        ));
        out.push_str(&format!("http://provider.example.com/live/u/p/{i}.m3u8\n"));
    }
    out
}

/// Names of leftover cache temp files in `dir`
pub fn temp_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with(TEMP_PREFIX))
                .collect()
        })
        .unwrap_or_default()
}
