pub mod events;
pub mod ingest_epg;
pub mod m3u_parser;
pub mod orchestrator;
pub mod state_manager;

pub use events::{EventReceiver, EventSender};
pub use ingest_epg::{EpgIndex, EpgIngestor};
pub use m3u_parser::{ParsedPlaylist, ParserOptions, StreamingPlaylistParser, parse_stream};
pub use orchestrator::{IngestionOrchestrator, LoadHandle};
pub use state_manager::{IngestionStateManager, LoadTicket};
