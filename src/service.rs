//! Channel loading paired with guide refresh
//!
//! [`IngestionService`] is the entry point most applications want: every
//! successful channel load kicks off a guide refresh in the background, and
//! guide lookups are answered from whatever index is current.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;
use crate::errors::{IngestError, IngestResult};
use crate::ingestor::events::EventSender;
use crate::ingestor::ingest_epg::EpgIngestor;
use crate::ingestor::orchestrator::{IngestionOrchestrator, LoadHandle};
use crate::models::{ChannelList, EpgProgram};
use crate::utils::http_client::{ByteStreamClient, HttpTimeouts, ReqwestByteClient};

pub struct IngestionService {
    orchestrator: Arc<IngestionOrchestrator>,
    epg: Arc<EpgIngestor>,
    epg_enabled: bool,
}

impl IngestionService {
    pub fn new(orchestrator: Arc<IngestionOrchestrator>, epg: Arc<EpgIngestor>) -> Self {
        Self {
            orchestrator,
            epg,
            epg_enabled: true,
        }
    }

    /// Turn automatic guide refresh after loads on or off
    pub fn with_epg_enabled(mut self, enabled: bool) -> Self {
        self.epg_enabled = enabled;
        self
    }

    pub async fn from_config(config: &Config) -> IngestResult<Self> {
        let orchestrator = Arc::new(IngestionOrchestrator::from_config(config).await?);
        let epg_client: Arc<dyn ByteStreamClient> = Arc::new(ReqwestByteClient::new(
            HttpTimeouts {
                connect: config.epg.connect_timeout,
                read: config.epg.read_timeout,
            },
            config.epg.user_agent.clone(),
        )?);

        Ok(Self::new(orchestrator, Arc::new(EpgIngestor::new(epg_client)))
            .with_epg_enabled(config.epg.enabled))
    }

    pub fn orchestrator(&self) -> &Arc<IngestionOrchestrator> {
        &self.orchestrator
    }

    pub fn epg(&self) -> &Arc<EpgIngestor> {
        &self.epg
    }

    /// Load channels and, on success, refresh the guide in the background
    pub async fn load(&self, force_refresh: bool, events: EventSender) -> IngestResult<ChannelList> {
        let channels = self.orchestrator.load_channels(force_refresh, events).await?;
        self.spawn_epg_refresh();
        Ok(channels)
    }

    /// Background variant of [`IngestionService::load`]
    pub fn spawn_load(&self, force_refresh: bool) -> LoadHandle {
        let LoadHandle { events, task } = self.orchestrator.spawn_load(force_refresh);
        let orchestrator = Arc::clone(&self.orchestrator);
        let epg = Arc::clone(&self.epg);
        let epg_enabled = self.epg_enabled;

        let task = tokio::spawn(async move {
            let channels = match task.await {
                Ok(result) => result?,
                Err(e) => {
                    return Err(IngestError::Io {
                        operation: "playlist load task".to_string(),
                        message: e.to_string(),
                    });
                }
            };
            if epg_enabled {
                refresh_guide(orchestrator, epg).await;
            }
            Ok(channels)
        });

        LoadHandle { events, task }
    }

    /// Start a guide refresh for the current playlist
    ///
    /// Returns `None` when guide refresh is disabled.
    pub fn spawn_epg_refresh(&self) -> Option<JoinHandle<bool>> {
        if !self.epg_enabled {
            return None;
        }
        let orchestrator = Arc::clone(&self.orchestrator);
        let epg = Arc::clone(&self.epg);
        Some(tokio::spawn(refresh_guide(orchestrator, epg)))
    }

    pub fn programs_for(&self, tvg_id: Option<&str>, tvg_name: Option<&str>) -> Vec<EpgProgram> {
        self.epg.programs_for(tvg_id, tvg_name)
    }

    pub fn programs_for_at(
        &self,
        tvg_id: Option<&str>,
        tvg_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<EpgProgram> {
        self.epg.programs_for_at(tvg_id, tvg_name, now)
    }
}

async fn refresh_guide(orchestrator: Arc<IngestionOrchestrator>, epg: Arc<EpgIngestor>) -> bool {
    match orchestrator.epg_url().await {
        Some(url) => {
            let refreshed = epg.refresh(&url).await;
            if refreshed {
                info!("Program guide refreshed");
            }
            refreshed
        }
        None => {
            debug!("No guide URL known for this playlist, skipping guide refresh");
            false
        }
    }
}
