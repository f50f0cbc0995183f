//! Playlist sources
//!
//! A [`PlaylistLocator`] answers one question: which URL should the next
//! load download? Two implementations are provided:
//!
//! - [`StaticPlaylistLocator`] for a URL taken from configuration
//! - [`DeviceBackendLocator`] which asks a provisioning backend for the URL
//!   assigned to a device
//!
//! # Usage
//!
//! ```rust
//! use playlist_ingest::sources::{PlaylistLocator, StaticPlaylistLocator};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let locator = StaticPlaylistLocator::new("http://example.com/list.m3u");
//!     let url = locator.playlist_url(false).await?;
//!     assert_eq!(url, "http://example.com/list.m3u");
//!     Ok(())
//! }
//! ```

pub mod playlist_locator;

pub use playlist_locator::*;
