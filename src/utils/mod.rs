//! Utility modules for the playlist-ingest crate
//!
//! This module contains reusable utilities that can be used
//! across different parts of the system.

pub mod decompression;
pub mod http_client;
pub mod time;
pub mod url;
pub mod xmltv_parser;

// Re-export commonly used types for convenience
pub use decompression::{CompressionFormat, DecompressionService};
pub use http_client::{ByteResponse, ByteStreamClient, HttpTimeouts, ReqwestByteClient};
pub use self::url::UrlUtils;
