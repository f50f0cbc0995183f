//! Playlist ingestion engine
//!
//! Streams extended-M3U channel lists into typed [`models::Channel`] records,
//! classifies every channel, indexes XMLTV program guides and keeps a
//! crash-safe local copy of the last good playlist.

pub mod cache;
pub mod classification;
pub mod config;
pub mod errors;
pub mod ingestor;
pub mod models;
pub mod observability;
pub mod service;
pub mod sources;
pub mod utils;

pub use classification::classify;
pub use errors::{EpgError, IngestError, NetworkError};
pub use ingestor::{EpgIngestor, EventSender, IngestionOrchestrator};
pub use models::{Channel, ChannelCategory, ChannelList, EpgProgram, IngestionEvent, LoadState};
pub use service::IngestionService;
