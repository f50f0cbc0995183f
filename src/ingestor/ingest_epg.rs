//! XMLTV guide ingestion
//!
//! The guide is downloaded with its own client, optionally gunzipped and
//! parsed on a blocking thread that reads the async body through
//! `SyncIoBridge`. Each fetch builds a fresh [`EpgIndex`] which is swapped in
//! only once it is complete; a failed fetch leaves the previous index in
//! place. Fetches are numbered when they start, and an index older than the
//! published one is dropped.

use std::collections::HashMap;
use std::io::{self, BufReader};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::{debug, info, warn};

use crate::errors::{EpgError, EpgResult};
use crate::models::EpgProgram;
use crate::utils::decompression::DecompressionService;
use crate::utils::http_client::ByteStreamClient;
use crate::utils::url::UrlUtils;
use crate::utils::xmltv_parser::parse_xmltv_programs;

/// Programmes grouped by XMLTV channel id, each list in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpgIndex {
    programs: HashMap<String, Vec<EpgProgram>>,
    program_count: usize,
}

impl EpgIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, program: EpgProgram) {
        self.programs
            .entry(program.channel_id.clone())
            .or_default()
            .push(program);
        self.program_count += 1;
    }

    pub fn channel_count(&self) -> usize {
        self.programs.len()
    }

    pub fn program_count(&self) -> usize {
        self.program_count
    }

    pub fn is_empty(&self) -> bool {
        self.program_count == 0
    }

    /// All programmes of one channel id, unfiltered
    pub fn channel_programs(&self, channel_id: &str) -> Option<&[EpgProgram]> {
        self.programs.get(channel_id).map(Vec::as_slice)
    }

    /// Upcoming and current programmes for a channel, ordered by start
    ///
    /// `tvg_id` is tried first; only when no channel has that id is
    /// `tvg_name` used as an id. Programmes that ended at or before `now`
    /// are left out.
    pub fn programs_for_at(
        &self,
        tvg_id: Option<&str>,
        tvg_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<EpgProgram> {
        let by_id = tvg_id
            .filter(|id| !id.is_empty())
            .and_then(|id| self.programs.get(id));
        let list = by_id.or_else(|| {
            tvg_name
                .filter(|name| !name.is_empty())
                .and_then(|name| self.programs.get(name))
        });

        let Some(list) = list else {
            return Vec::new();
        };

        let mut upcoming: Vec<EpgProgram> = list
            .iter()
            .filter(|program| program.stop > now)
            .cloned()
            .collect();
        upcoming.sort_by_key(|program| program.start);
        upcoming
    }
}

#[derive(Debug, Default)]
struct PublishedIndex {
    generation: u64,
    index: Option<Arc<EpgIndex>>,
}

/// Downloads guides and serves lookups from the latest complete index
pub struct EpgIngestor {
    client: Arc<dyn ByteStreamClient>,
    generation: AtomicU64,
    store: RwLock<PublishedIndex>,
}

impl EpgIngestor {
    pub fn new(client: Arc<dyn ByteStreamClient>) -> Self {
        Self {
            client,
            generation: AtomicU64::new(0),
            store: RwLock::new(PublishedIndex::default()),
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Download and parse a guide without touching the published index
    pub async fn fetch_and_index(&self, url: &str) -> EpgResult<EpgIndex> {
        let masked = UrlUtils::obfuscate_credentials(url);
        let started = Instant::now();

        let response = self.client.get_stream(url).await?;
        let declared_gzip =
            DecompressionService::declares_gzip(url, response.content_encoding.as_deref());
        debug!(
            "Guide response for {} (length: {:?}, gzip declared: {})",
            masked, response.content_length, declared_gzip
        );

        let body = StreamReader::new(response.body.map_err(io::Error::other));
        let bridge = SyncIoBridge::new(body);

        let (index, summary) = tokio::task::spawn_blocking(move || {
            let decoded = DecompressionService::open_reader(BufReader::new(bridge), declared_gzip)?;
            let mut index = EpgIndex::new();
            let summary = parse_xmltv_programs(BufReader::new(decoded), |program| {
                index.insert(program)
            })?;
            Ok::<_, EpgError>((index, summary))
        })
        .await
        .map_err(|e| EpgError::Io {
            message: format!("guide parser task failed: {e}"),
        })??;

        info!(
            "Indexed {} programmes for {} channels from {} in {:?} ({} dropped)",
            index.program_count(),
            index.channel_count(),
            masked,
            started.elapsed(),
            summary.dropped
        );
        Ok(index)
    }

    /// Fetch a guide and publish it; failures keep the previous index
    ///
    /// Returns false when the fetch failed or a refresh started later has
    /// already published its index.
    pub async fn refresh(&self, url: &str) -> bool {
        let generation = self.next_generation();
        match self.fetch_and_index(url).await {
            Ok(index) => self.publish_generation(generation, index),
            Err(e) => {
                warn!(
                    "Guide refresh from {} failed, keeping previous index: {}",
                    UrlUtils::obfuscate_credentials(url),
                    e
                );
                false
            }
        }
    }

    /// Replace the published index
    pub fn publish(&self, index: EpgIndex) {
        let generation = self.next_generation();
        self.publish_generation(generation, index);
    }

    fn publish_generation(&self, generation: u64, index: EpgIndex) -> bool {
        let mut store = self
            .store
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if generation < store.generation {
            debug!(
                "Dropping guide generation {}, generation {} is already published",
                generation, store.generation
            );
            return false;
        }
        store.generation = generation;
        store.index = Some(Arc::new(index));
        true
    }

    /// Whether any guide has been published
    pub fn is_loaded(&self) -> bool {
        self.store
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .index
            .is_some()
    }

    /// Snapshot of the published index, empty before the first refresh
    pub fn index(&self) -> Arc<EpgIndex> {
        self.store
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .index
            .clone()
            .unwrap_or_default()
    }

    pub fn programs_for(&self, tvg_id: Option<&str>, tvg_name: Option<&str>) -> Vec<EpgProgram> {
        self.programs_for_at(tvg_id, tvg_name, Utc::now())
    }

    pub fn programs_for_at(
        &self,
        tvg_id: Option<&str>,
        tvg_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<EpgProgram> {
        self.index().programs_for_at(tvg_id, tvg_name, now)
    }
}
