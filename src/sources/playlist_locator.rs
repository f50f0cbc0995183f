use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::{IngestError, IngestResult};
use crate::utils::http_client::ByteStreamClient;
use crate::utils::url::UrlUtils;

/// Upper bound on the device info document
const MAX_DEVICE_INFO_BYTES: usize = 256 * 1024;

/// Resolves the URL of the playlist to download
#[async_trait]
pub trait PlaylistLocator: Send + Sync {
    /// Return the playlist URL. `force_refresh` asks implementations that
    /// remember a previous answer to look it up again.
    async fn playlist_url(&self, force_refresh: bool) -> IngestResult<String>;
}

/// A fixed playlist URL
#[derive(Debug, Clone)]
pub struct StaticPlaylistLocator {
    url: String,
}

impl StaticPlaylistLocator {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl PlaylistLocator for StaticPlaylistLocator {
    async fn playlist_url(&self, _force_refresh: bool) -> IngestResult<String> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(IngestError::locator("No playlist URL configured"));
        }
        Ok(url.to_string())
    }
}

/// Device record returned by the provisioning backend
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub m3u_url: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub device_name: Option<String>,
}

fn default_active() -> bool {
    true
}

/// Looks up the playlist assigned to a device
///
/// Calls `GET {backend}/api/devices/{device_id}/info/`. The answer is kept
/// until a forced refresh.
pub struct DeviceBackendLocator {
    client: Arc<dyn ByteStreamClient>,
    backend_url: String,
    device_id: String,
    resolved: Mutex<Option<String>>,
}

impl DeviceBackendLocator {
    pub fn new(
        client: Arc<dyn ByteStreamClient>,
        backend_url: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            backend_url: backend_url.into(),
            device_id: device_id.into(),
            resolved: Mutex::new(None),
        }
    }

    /// URL of the device info endpoint; the device id is percent-encoded
    pub fn info_url(&self) -> IngestResult<String> {
        let path = format!(
            "api/devices/{}/info/",
            urlencoding::encode(self.device_id.trim())
        );
        UrlUtils::join(&self.backend_url, &path)
            .map_err(|e| IngestError::locator(format!("Invalid backend URL: {e}")))
    }

    /// Fetch the device record from the backend
    pub async fn fetch_device_info(&self) -> IngestResult<DeviceInfo> {
        if self.device_id.trim().is_empty() {
            return Err(IngestError::locator("No device id configured"));
        }

        let url = self.info_url()?;
        debug!("Resolving playlist via {}", UrlUtils::obfuscate_credentials(&url));

        let response = self.client.get_stream(&url).await?;
        let body = response.collect(MAX_DEVICE_INFO_BYTES, &url).await?;

        serde_json::from_slice(&body)
            .map_err(|e| IngestError::locator(format!("Malformed device info: {e}")))
    }
}

#[async_trait]
impl PlaylistLocator for DeviceBackendLocator {
    async fn playlist_url(&self, force_refresh: bool) -> IngestResult<String> {
        let mut resolved = self.resolved.lock().await;
        if !force_refresh && let Some(url) = resolved.as_ref() {
            return Ok(url.clone());
        }

        let info = self.fetch_device_info().await?;
        if !info.is_active {
            return Err(IngestError::locator("Device is not active"));
        }
        let url = info.m3u_url.trim();
        if url.is_empty() {
            return Err(IngestError::locator("M3U URL not set for this device"));
        }

        info!(
            "Backend assigned playlist {}",
            UrlUtils::obfuscate_credentials(url)
        );
        *resolved = Some(url.to_string());
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::NetworkError;
    use crate::utils::http_client::ByteResponse;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct JsonClient {
        body: &'static str,
        calls: AtomicUsize,
        last_url: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl ByteStreamClient for JsonClient {
        async fn get_stream(&self, url: &str) -> Result<ByteResponse, NetworkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_url.lock().unwrap() = Some(url.to_string());
            Ok(ByteResponse::from_chunks(vec![Bytes::from_static(
                self.body.as_bytes(),
            )]))
        }
    }

    fn client(body: &'static str) -> Arc<JsonClient> {
        Arc::new(JsonClient {
            body,
            calls: AtomicUsize::new(0),
            last_url: std::sync::Mutex::new(None),
        })
    }

    #[tokio::test]
    async fn test_static_locator() {
        let locator = StaticPlaylistLocator::new(" http://x/list.m3u ");
        assert_eq!(locator.playlist_url(true).await.unwrap(), "http://x/list.m3u");
        assert!(StaticPlaylistLocator::new("").playlist_url(false).await.is_err());
    }

    #[tokio::test]
    async fn test_device_locator_resolves_and_remembers() {
        let fake = client(r#"{"mac_address":"aa","m3u_url":"http://x/get.php?u=1","is_active":true}"#);
        let locator = DeviceBackendLocator::new(fake.clone(), "https://backend.example.com", "AA:BB:CC");

        assert_eq!(locator.playlist_url(false).await.unwrap(), "http://x/get.php?u=1");
        assert_eq!(locator.playlist_url(false).await.unwrap(), "http://x/get.php?u=1");
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);

        locator.playlist_url(true).await.unwrap();
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            fake.last_url.lock().unwrap().as_deref(),
            Some("https://backend.example.com/api/devices/AA%3ABB%3ACC/info/")
        );
    }

    #[tokio::test]
    async fn test_device_locator_rejects_inactive_or_blank() {
        let inactive = DeviceBackendLocator::new(
            client(r#"{"m3u_url":"http://x/list.m3u","is_active":false}"#),
            "https://backend.example.com",
            "dev",
        );
        assert!(matches!(
            inactive.playlist_url(false).await,
            Err(IngestError::Locator { .. })
        ));

        let blank = DeviceBackendLocator::new(
            client(r#"{"m3u_url":"  ","is_active":true}"#),
            "https://backend.example.com",
            "dev",
        );
        assert!(blank.playlist_url(false).await.is_err());

        let garbage = DeviceBackendLocator::new(client("<html>"), "https://backend.example.com", "dev");
        assert!(garbage.playlist_url(false).await.is_err());
    }
}
