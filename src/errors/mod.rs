//! Centralized error handling for playlist ingestion
//!
//! Every I/O-origin failure is converted into one of the enums in [`types`] at
//! the component boundary, so callers only ever see result values.
//!
//! # Error Categories
//!
//! - **Network Errors**: timeouts, unreachable hosts, non-2xx responses
//! - **Ingest Errors**: playlist load failures surfaced to the UI collaborator
//! - **EPG Errors**: program guide failures, always non-fatal to browsing
//!
//! # Usage
//!
//! ```rust
//! use playlist_ingest::errors::{IngestError, IngestResult};
//!
//! fn example_function() -> IngestResult<usize> {
//!     Err(IngestError::EmptyPlaylist)
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for playlist load results
pub type IngestResult<T> = Result<T, IngestError>;

/// Convenience type alias for program guide results
pub type EpgResult<T> = Result<T, EpgError>;
