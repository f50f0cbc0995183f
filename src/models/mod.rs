//! Data models for channels, guide entries and load state
//!
//! Channels are immutable once built: the category is computed exactly once
//! from the url, group and name, and fields are only readable through
//! accessors.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classification::classify;
use crate::errors::IngestError;

/// Shared, immutable result of one playlist load
pub type ChannelList = Arc<Vec<Channel>>;

/// Content category assigned to every channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelCategory {
    LiveTv,
    Movies,
    Series,
    Adult,
    Other,
}

impl ChannelCategory {
    /// Human readable label
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::LiveTv => "Live TV",
            Self::Movies => "Movies",
            Self::Series => "Series",
            Self::Adult => "Adult",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for ChannelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Metadata captured from an `#EXTINF` line, before a URL is known
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMetadata {
    pub name: String,
    pub logo: Option<String>,
    pub group: Option<Arc<str>>,
    pub tvg_id: Option<String>,
    pub tvg_name: Option<String>,
    pub tvg_logo: Option<String>,
    pub tvg_shift: Option<String>,
    pub radio: bool,
    pub catchup: Option<String>,
    pub catchup_days: Option<String>,
    pub catchup_source: Option<String>,
}

/// One playable entry of a playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    name: String,
    url: String,
    logo: Option<String>,
    group: Option<Arc<str>>,
    tvg_id: Option<String>,
    tvg_name: String,
    tvg_logo: Option<String>,
    tvg_shift: Option<String>,
    radio: bool,
    catchup: Option<String>,
    catchup_days: Option<String>,
    catchup_source: Option<String>,
    category: ChannelCategory,
}

impl Channel {
    /// Build a channel from its metadata and stream URL
    ///
    /// Returns `None` for a blank URL. `tvg_name` falls back to the display
    /// name and a blank `tvg_id` is treated as absent.
    pub fn new(metadata: ChannelMetadata, url: impl Into<String>) -> Option<Self> {
        let url = url.into().trim().to_string();
        if url.is_empty() {
            return None;
        }

        let ChannelMetadata {
            name,
            logo,
            group,
            tvg_id,
            tvg_name,
            tvg_logo,
            tvg_shift,
            radio,
            catchup,
            catchup_days,
            catchup_source,
        } = metadata;

        let tvg_name = tvg_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| name.clone());
        let tvg_id = tvg_id.filter(|id| !id.trim().is_empty());
        let category = classify(&url, group.as_deref(), &name);

        Some(Self {
            name,
            url,
            logo,
            group,
            tvg_id,
            tvg_name,
            tvg_logo,
            tvg_shift,
            radio,
            catchup,
            catchup_days,
            catchup_source,
            category,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Logo from `tvg-logo`, falling back to `logo`
    pub fn logo(&self) -> Option<&str> {
        self.tvg_logo.as_deref().or(self.logo.as_deref())
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Interned group title, shared by every channel of the same group
    pub fn group_arc(&self) -> Option<&Arc<str>> {
        self.group.as_ref()
    }

    pub fn tvg_id(&self) -> Option<&str> {
        self.tvg_id.as_deref()
    }

    pub fn tvg_name(&self) -> &str {
        &self.tvg_name
    }

    pub fn tvg_logo(&self) -> Option<&str> {
        self.tvg_logo.as_deref()
    }

    pub fn tvg_shift(&self) -> Option<&str> {
        self.tvg_shift.as_deref()
    }

    pub fn is_radio(&self) -> bool {
        self.radio
    }

    pub fn catchup(&self) -> Option<&str> {
        self.catchup.as_deref()
    }

    pub fn catchup_days(&self) -> Option<&str> {
        self.catchup_days.as_deref()
    }

    pub fn catchup_source(&self) -> Option<&str> {
        self.catchup_source.as_deref()
    }

    pub fn category(&self) -> ChannelCategory {
        self.category
    }
}

/// One XMLTV programme
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpgProgram {
    pub channel_id: String,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
}

impl EpgProgram {
    /// Whether the programme is on air at `now`
    pub fn is_current_at(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.stop
    }
}

/// Events delivered to the single subscriber of one load
#[derive(Debug, Clone)]
pub enum IngestionEvent {
    /// Fraction of the input consumed, in `[0.0, 1.0]`
    Progress(f32),
    /// Channels parsed so far
    Partial(ChannelList),
    /// Final list of the load
    Complete(ChannelList),
    Failed(IngestError),
}

/// Observable state of the orchestrator
#[derive(Debug, Clone, Default)]
pub enum LoadState {
    #[default]
    Idle,
    LoadingFromCache,
    FetchingNetwork,
    TeeWriting,
    Ready {
        channels: ChannelList,
    },
    Failed {
        error: IngestError,
    },
}
