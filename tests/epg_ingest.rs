mod common;

use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use common::{FakeClient, FakeResponse, PLAYLIST_URL, playlist};
use flate2::Compression;
use flate2::write::GzEncoder;
use playlist_ingest::cache::PlaylistCache;
use playlist_ingest::errors::EpgError;
use playlist_ingest::ingestor::{EpgIngestor, EventSender, IngestionOrchestrator, ParserOptions};
use playlist_ingest::service::IngestionService;
use playlist_ingest::sources::StaticPlaylistLocator;
use tempfile::TempDir;

const GUIDE_URL: &str = "http://provider.example.com/epg.xml.gz";

const GUIDE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv generator-info-name="test">
  <channel id="ch1"><display-name>Channel 1</display-name></channel>
  <programme start="20240101120000 +0000" stop="20240101130000 +0000" channel="ch1">
    <title lang="en">News &amp; Weather</title>
    <desc>Headlines</desc>
  </programme>
  <programme start="20240101133000 +0100" stop="20240101150000 +0100" channel="ch1">
    <title>Afternoon</title>
  </programme>
  <programme start="20240101100000 +0000" stop="20240101110000 +0000" channel="ch2">
    <title>Morning</title>
  </programme>
  <programme start="not a time" stop="20240101110000 +0000" channel="ch2">
    <title>Broken</title>
  </programme>
</tv>
"#;

const NEWER_GUIDE: &str = r#"<tv>
  <programme start="20240101120000 +0000" stop="20240101140000 +0000" channel="ch9">
    <title>Newer</title>
  </programme>
</tv>
"#;

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn noon() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap()
}

#[tokio::test]
async fn test_gzip_guide_is_streamed_and_indexed() {
    let client = Arc::new(FakeClient::new());
    client.push(GUIDE_URL, FakeResponse::body(gzip(GUIDE.as_bytes()), 7));
    let ingestor = EpgIngestor::new(client);

    assert!(!ingestor.is_loaded());
    assert!(ingestor.refresh(GUIDE_URL).await);
    assert!(ingestor.is_loaded());

    let index = ingestor.index();
    assert_eq!(index.program_count(), 3);
    assert_eq!(index.channel_count(), 2);

    let programs = ingestor.programs_for_at(Some("ch1"), None, noon());
    let titles: Vec<&str> = programs.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec!["News & Weather", "Afternoon"]);
    assert_eq!(programs[0].description.as_deref(), Some("Headlines"));
    // +0100 offsets are normalised to UTC
    assert_eq!(
        programs[1].start,
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap()
    );
}

#[tokio::test]
async fn test_declared_gzip_with_plain_body() {
    let client = Arc::new(FakeClient::new());
    client.push(GUIDE_URL, FakeResponse::body(GUIDE, 32));
    let ingestor = EpgIngestor::new(client);

    let index = ingestor.fetch_and_index(GUIDE_URL).await.unwrap();
    assert_eq!(index.program_count(), 3);
    assert!(!ingestor.is_loaded(), "fetch_and_index does not publish");
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_index() {
    let client = Arc::new(FakeClient::new());
    client.push(GUIDE_URL, FakeResponse::body(GUIDE, 1024));
    client.push(GUIDE_URL, FakeResponse::body("<tv><programme channel=\"x\"></tv>", 8));
    let ingestor = EpgIngestor::new(Arc::clone(&client) as _);

    assert!(ingestor.refresh(GUIDE_URL).await);
    assert!(!ingestor.refresh(GUIDE_URL).await);
    // Nothing queued any more, so this one fails at the network
    assert!(!ingestor.refresh(GUIDE_URL).await);

    assert_eq!(ingestor.index().program_count(), 3);
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn test_older_refresh_finishing_last_is_dropped() {
    let client = Arc::new(FakeClient::new());
    let (slow, tx) = FakeResponse::streamed(None);
    client.push(GUIDE_URL, slow);
    client.push(GUIDE_URL, FakeResponse::body(NEWER_GUIDE, 16));
    let ingestor = Arc::new(EpgIngestor::new(Arc::clone(&client) as _));

    let older = tokio::spawn({
        let ingestor = Arc::clone(&ingestor);
        async move { ingestor.refresh(GUIDE_URL).await }
    });
    while client.calls() < 1 {
        tokio::task::yield_now().await;
    }

    assert!(ingestor.refresh(GUIDE_URL).await);
    assert_eq!(ingestor.index().program_count(), 1);

    tx.send(Ok(Bytes::from(GUIDE))).unwrap();
    drop(tx);
    assert!(!older.await.unwrap());

    let index = ingestor.index();
    assert_eq!(index.program_count(), 1);
    assert!(index.channel_programs("ch9").is_some());
    assert!(index.channel_programs("ch1").is_none());
}

#[tokio::test]
async fn test_unsupported_compression_is_reported() {
    let client = Arc::new(FakeClient::new());
    // zstd frame magic followed by junk
    let mut body = vec![0x28, 0xB5, 0x2F, 0xFD];
    body.extend_from_slice(&[0u8; 64]);
    client.push(GUIDE_URL, FakeResponse::body(body, 16));
    let ingestor = EpgIngestor::new(client);

    let error = ingestor.fetch_and_index(GUIDE_URL).await.unwrap_err();
    assert!(matches!(error, EpgError::UnsupportedCompression { .. }));
}

#[tokio::test]
async fn test_service_refreshes_guide_after_load() {
    let dir = TempDir::new().unwrap();
    let playlist_client = Arc::new(FakeClient::new());
    playlist_client.push(PLAYLIST_URL, FakeResponse::body(playlist(2), 512));
    let guide_client = Arc::new(FakeClient::new());
    guide_client.push(GUIDE_URL, FakeResponse::body(gzip(GUIDE.as_bytes()), 64));

    let orchestrator = Arc::new(IngestionOrchestrator::new(
        ParserOptions::default(),
        Arc::new(StaticPlaylistLocator::new(PLAYLIST_URL)),
        playlist_client,
        PlaylistCache::new(dir.path().join("playlist_cache.m3u"), None),
    ));
    let service = IngestionService::new(orchestrator, Arc::new(EpgIngestor::new(guide_client)));

    let channels = service.spawn_load(false).join().await.unwrap();
    assert_eq!(channels.len(), 2);

    // The playlist header names the guide, and the load task waits for it
    let channel = &channels[1];
    assert_eq!(channel.tvg_id(), Some("ch1"));
    let programs = service.programs_for_at(channel.tvg_id(), Some(channel.tvg_name()), noon());
    assert_eq!(programs.len(), 2);
}

#[tokio::test]
async fn test_service_with_guide_disabled() {
    let dir = TempDir::new().unwrap();
    let playlist_client = Arc::new(FakeClient::new());
    playlist_client.push(PLAYLIST_URL, FakeResponse::body(playlist(2), 512));
    let guide_client = Arc::new(FakeClient::new());

    let orchestrator = Arc::new(IngestionOrchestrator::new(
        ParserOptions::default(),
        Arc::new(StaticPlaylistLocator::new(PLAYLIST_URL)),
        playlist_client,
        PlaylistCache::new(dir.path().join("playlist_cache.m3u"), None),
    ));
    let service = IngestionService::new(
        orchestrator,
        Arc::new(EpgIngestor::new(Arc::clone(&guide_client) as _)),
    )
    .with_epg_enabled(false);

    service.load(false, EventSender::disabled()).await.unwrap();
    assert!(service.spawn_epg_refresh().is_none());
    assert_eq!(guide_client.calls(), 0);
    assert!(!service.epg().is_loaded());
}
