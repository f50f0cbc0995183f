//! Playlist load orchestration
//!
//! Decides between the durable cache and the network, tees network bodies
//! into both the cache writer and the parser, and keeps the last list that
//! loaded successfully. Loads are single flight: starting one cancels the
//! previous load, and the writer mutex keeps a cancelled load and its
//! successor from targeting the cache file at the same time.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::PlaylistCache;
use crate::config::Config;
use crate::errors::{IngestError, IngestResult};
use crate::ingestor::events::{EventReceiver, EventSender};
use crate::ingestor::m3u_parser::{ParsedPlaylist, ParserOptions, StreamingPlaylistParser};
use crate::ingestor::state_manager::{IngestionStateManager, LoadTicket};
use crate::models::{ChannelList, LoadState};
use crate::sources::{DeviceBackendLocator, PlaylistLocator, StaticPlaylistLocator};
use crate::utils::http_client::{ByteStreamClient, HttpTimeouts, ReqwestByteClient};
use crate::utils::url::UrlUtils;

/// Details remembered from the most recent successful parse
#[derive(Debug, Default)]
struct PlaylistMeta {
    playlist_url: Option<String>,
    header_epg_url: Option<String>,
}

/// A load running on its own task
#[derive(Debug)]
pub struct LoadHandle {
    pub events: EventReceiver,
    pub task: JoinHandle<IngestResult<ChannelList>>,
}

impl LoadHandle {
    /// Wait for the load to finish
    pub async fn join(self) -> IngestResult<ChannelList> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(IngestError::Cancelled),
            Err(e) => Err(IngestError::Io {
                operation: "playlist load task".to_string(),
                message: e.to_string(),
            }),
        }
    }
}

pub struct IngestionOrchestrator {
    parser_options: ParserOptions,
    configured_epg_url: Option<String>,
    locator: Arc<dyn PlaylistLocator>,
    client: Arc<dyn ByteStreamClient>,
    cache: PlaylistCache,
    state: IngestionStateManager,
    write_lock: tokio::sync::Mutex<()>,
    last_good: RwLock<Option<ChannelList>>,
    meta: Mutex<PlaylistMeta>,
}

impl IngestionOrchestrator {
    pub fn new(
        parser_options: ParserOptions,
        locator: Arc<dyn PlaylistLocator>,
        client: Arc<dyn ByteStreamClient>,
        cache: PlaylistCache,
    ) -> Self {
        Self {
            parser_options,
            configured_epg_url: None,
            locator,
            client,
            cache,
            state: IngestionStateManager::new(),
            write_lock: tokio::sync::Mutex::new(()),
            last_good: RwLock::new(None),
            meta: Mutex::new(PlaylistMeta::default()),
        }
    }

    /// Prefer this guide URL over anything found in or derived from the playlist
    pub fn with_epg_url(mut self, epg_url: Option<String>) -> Self {
        self.configured_epg_url = epg_url.filter(|url| !url.trim().is_empty());
        self
    }

    /// Build from configuration and sweep temp files left by a crashed run
    pub async fn from_config(config: &Config) -> IngestResult<Self> {
        let client: Arc<dyn ByteStreamClient> = Arc::new(ReqwestByteClient::new(
            HttpTimeouts {
                connect: config.playlist.connect_timeout,
                read: config.playlist.read_timeout,
            },
            config.playlist.user_agent.clone(),
        )?);

        let locator: Arc<dyn PlaylistLocator> = match (
            config.playlist.url.as_deref(),
            config.playlist.backend_url.as_deref(),
            config.playlist.device_id.as_deref(),
        ) {
            (Some(url), _, _) if !url.trim().is_empty() => Arc::new(StaticPlaylistLocator::new(url)),
            (_, Some(backend), Some(device)) => Arc::new(DeviceBackendLocator::new(
                Arc::clone(&client),
                backend,
                device,
            )),
            _ => {
                return Err(IngestError::configuration(
                    "either playlist.url or playlist.backend_url with playlist.device_id is required",
                ));
            }
        };

        let cache = PlaylistCache::new(
            config.storage.cache_file.clone(),
            config.storage.temp_dir.clone(),
        );
        if let Err(e) = cache.sweep_stale_temp_files().await {
            warn!("Could not sweep stale playlist temp files: {}", e);
        }

        Ok(Self::new(config.parser.clone(), locator, client, cache)
            .with_epg_url(config.epg.url.clone()))
    }

    pub fn cache(&self) -> &PlaylistCache {
        &self.cache
    }

    /// Load channels on the current task
    ///
    /// Cancels any load already running. Events are delivered through
    /// `events`; pass [`EventSender::disabled`] when nobody listens.
    pub async fn load_channels(
        &self,
        force_refresh: bool,
        events: EventSender,
    ) -> IngestResult<ChannelList> {
        let ticket = self.state.begin_load();
        self.run_load(ticket, force_refresh, events).await
    }

    /// Load channels on a background task
    ///
    /// The previous load is cancelled before this returns.
    pub fn spawn_load(self: &Arc<Self>, force_refresh: bool) -> LoadHandle {
        let ticket = self.state.begin_load();
        let (events, receiver) = EventSender::channel();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.run_load(ticket, force_refresh, events).await });
        LoadHandle {
            events: receiver,
            task,
        }
    }

    /// Cancel the running load, if any
    pub fn cancel(&self) {
        self.state.cancel_current();
    }

    /// The most recent list that loaded successfully
    pub fn last_known_channels(&self) -> Option<ChannelList> {
        self.last_good
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn state(&self) -> LoadState {
        self.state.current_state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }

    /// Guide URL for the current playlist
    ///
    /// Configured URL first, then the playlist header, then a URL derived
    /// from the playlist location.
    pub async fn epg_url(&self) -> Option<String> {
        if let Some(url) = &self.configured_epg_url {
            return Some(url.clone());
        }

        let (header, playlist_url) = {
            let meta = self.meta.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            (meta.header_epg_url.clone(), meta.playlist_url.clone())
        };
        if header.is_some() {
            return header;
        }

        let playlist_url = match playlist_url {
            Some(url) => url,
            None => self.locator.playlist_url(false).await.ok()?,
        };
        UrlUtils::derive_epg_url(&playlist_url)
    }

    async fn run_load(
        &self,
        ticket: LoadTicket,
        force_refresh: bool,
        events: EventSender,
    ) -> IngestResult<ChannelList> {
        let started = Instant::now();
        let result = self.load_inner(&ticket, force_refresh, &events).await;

        match &result {
            Ok(channels) => {
                {
                    let mut last_good = self
                        .last_good
                        .write()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    *last_good = Some(Arc::clone(channels));
                }
                self.state.set_state(
                    &ticket,
                    LoadState::Ready {
                        channels: Arc::clone(channels),
                    },
                );
                info!(
                    "Loaded {} channels in {:?} (generation {})",
                    channels.len(),
                    started.elapsed(),
                    ticket.generation()
                );
                events.complete(Arc::clone(channels));
            }
            Err(error) => {
                if error.is_cancelled() {
                    debug!("Load generation {} cancelled", ticket.generation());
                } else {
                    warn!("Playlist load failed: {}", error);
                }
                self.state.set_state(
                    &ticket,
                    LoadState::Failed {
                        error: error.clone(),
                    },
                );
                events.failed(error.clone());
            }
        }

        result
    }

    async fn load_inner(
        &self,
        ticket: &LoadTicket,
        force_refresh: bool,
        events: &EventSender,
    ) -> IngestResult<ChannelList> {
        let _writer = tokio::select! {
            biased;
            _ = ticket.token().cancelled() => return Err(IngestError::Cancelled),
            guard = self.write_lock.lock() => guard,
        };

        if force_refresh {
            debug!("Forced refresh, dropping playlist cache");
            self.cache.invalidate().await?;
        } else if let Some(len) = self.cache.cached_len().await
            && len > 0
        {
            self.state.set_state(ticket, LoadState::LoadingFromCache);
            match self.load_from_cache(ticket, len, events).await {
                Ok(channels) => return Ok(channels),
                Err(IngestError::Cancelled) => return Err(IngestError::Cancelled),
                Err(reason) => {
                    warn!("Playlist cache unusable, deleting it: {}", reason);
                    if let Err(e) = self.cache.invalidate().await {
                        warn!("{}", e);
                    }
                }
            }
        }

        self.load_from_network(ticket, force_refresh, events).await
    }

    async fn load_from_cache(
        &self,
        ticket: &LoadTicket,
        len: u64,
        events: &EventSender,
    ) -> IngestResult<ChannelList> {
        debug!("Reading playlist cache {} ({} bytes)", self.cache.path().display(), len);

        let file = self.cache.open().await?;
        let mut parser = StreamingPlaylistParser::new(len, self.parser_options.clone(), events.clone());

        tokio::select! {
            biased;
            _ = ticket.token().cancelled() => return Err(IngestError::Cancelled),
            read = parser.consume(file) => read?,
        }

        let parsed = parser.finish();
        if parsed.channels.is_empty() {
            return Err(IngestError::cache("cached playlist contained no channels"));
        }

        info!("Loaded {} channels from cache", parsed.channels.len());
        Ok(self.accept(parsed, None))
    }

    async fn load_from_network(
        &self,
        ticket: &LoadTicket,
        force_refresh: bool,
        events: &EventSender,
    ) -> IngestResult<ChannelList> {
        self.state.set_state(ticket, LoadState::FetchingNetwork);

        let url = tokio::select! {
            biased;
            _ = ticket.token().cancelled() => return Err(IngestError::Cancelled),
            url = self.locator.playlist_url(force_refresh) => url?,
        };
        let masked = UrlUtils::obfuscate_credentials(&url);
        info!("Downloading playlist from {}", masked);

        let response = tokio::select! {
            biased;
            _ = ticket.token().cancelled() => return Err(IngestError::Cancelled),
            response = self.client.get_stream(&url) => response?,
        };
        let total = response.content_length.unwrap_or(0);
        let mut body = response.body;

        let mut writer = self.cache.begin_write().await?;
        self.state.set_state(ticket, LoadState::TeeWriting);
        let mut parser = StreamingPlaylistParser::new(total, self.parser_options.clone(), events.clone());

        loop {
            let next = tokio::select! {
                biased;
                _ = ticket.token().cancelled() => {
                    writer.abort();
                    return Err(IngestError::Cancelled);
                }
                next = body.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    writer.write_chunk(&chunk).await?;
                    parser.feed(&chunk);
                }
                Some(Err(e)) => {
                    writer.abort();
                    return Err(e.into());
                }
                None => break,
            }
        }

        if ticket.is_cancelled() {
            writer.abort();
            return Err(IngestError::Cancelled);
        }

        let parsed = parser.finish();
        if parsed.channels.is_empty() {
            writer.abort();
            return Err(IngestError::EmptyPlaylist);
        }

        writer.commit().await?;
        debug!("Downloaded {} bytes from {}", parsed.bytes, masked);
        Ok(self.accept(parsed, Some(url)))
    }

    fn accept(&self, parsed: ParsedPlaylist, playlist_url: Option<String>) -> ChannelList {
        if parsed.skipped_urls > 0 {
            debug!("Skipped {} URL lines without metadata", parsed.skipped_urls);
        }
        if parsed.malformed_lines > 0 {
            warn!("Dropped {} overlong playlist lines", parsed.malformed_lines);
        }

        let mut meta = self.meta.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        meta.header_epg_url = parsed.epg_url;
        if playlist_url.is_some() {
            meta.playlist_url = playlist_url;
        }
        drop(meta);

        Arc::new(parsed.channels)
    }
}
