//! Durable playlist cache
//!
//! Exactly one cache file holds the raw text of the last playlist that
//! downloaded and parsed successfully. New downloads are written to a
//! `NamedTempFile` next to it and only become the cache through an atomic
//! rename, so a crash at any point leaves either the old file or the new one,
//! never a truncated mix. Dropping a [`CacheWriter`] without committing
//! deletes its temp file.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, PersistError};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::errors::{IngestError, IngestResult};

/// File name prefix of in-flight cache writes
pub const TEMP_PREFIX: &str = ".playlist-cache-";

/// Location of the cache file and its temp files
#[derive(Debug, Clone)]
pub struct PlaylistCache {
    path: PathBuf,
    temp_dir: PathBuf,
}

impl PlaylistCache {
    /// Create a cache at `path`. Temp files go to `temp_dir`, or next to the
    /// cache file when `None`.
    pub fn new(path: impl Into<PathBuf>, temp_dir: Option<PathBuf>) -> Self {
        let path = path.into();
        let temp_dir = temp_dir.unwrap_or_else(|| parent_dir(&path));
        Self { path, temp_dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the cache file, `None` when it does not exist
    pub async fn cached_len(&self) -> Option<u64> {
        tokio::fs::metadata(&self.path)
            .await
            .ok()
            .filter(|meta| meta.is_file())
            .map(|meta| meta.len())
    }

    /// Open the cache file for reading
    pub async fn open(&self) -> IngestResult<File> {
        File::open(&self.path)
            .await
            .map_err(|e| IngestError::io("opening playlist cache", &e))
    }

    /// Delete the cache file; a missing file is not an error
    pub async fn invalidate(&self) -> IngestResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Removed playlist cache {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IngestError::cache(format!(
                "Failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }

    /// Start writing a replacement for the cache file
    pub async fn begin_write(&self) -> IngestResult<CacheWriter> {
        for dir in [parent_dir(&self.path), self.temp_dir.clone()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| IngestError::io(format!("creating {}", dir.display()), &e))?;
        }

        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.temp_dir)
            .map_err(|e| IngestError::io("creating cache temp file", &e))?;
        let handle = temp
            .reopen()
            .map_err(|e| IngestError::io("opening cache temp file", &e))?;

        debug!("Writing playlist cache to {}", temp.path().display());

        Ok(CacheWriter {
            temp,
            file: File::from_std(handle),
            target: self.path.clone(),
            written: 0,
        })
    }

    /// Remove temp files left behind by a crashed process
    ///
    /// Must not run while a load is writing, or its temp file goes too.
    pub async fn sweep_stale_temp_files(&self) -> IngestResult<usize> {
        let mut dirs = vec![self.temp_dir.clone()];
        let cache_dir = parent_dir(&self.path);
        if cache_dir != self.temp_dir {
            dirs.push(cache_dir);
        }

        let mut removed = 0;
        for dir in dirs {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(IngestError::io(format!("listing {}", dir.display()), &e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| IngestError::io(format!("listing {}", dir.display()), &e))?
            {
                let name = entry.file_name();
                if !name.to_string_lossy().starts_with(TEMP_PREFIX) {
                    continue;
                }
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Could not remove stale temp file {}: {e}", entry.path().display()),
                }
            }
        }

        if removed > 0 {
            info!("Removed {} stale playlist temp files", removed);
        }
        Ok(removed)
    }
}

/// An in-flight replacement of the cache file
#[derive(Debug)]
pub struct CacheWriter {
    temp: NamedTempFile,
    file: File,
    target: PathBuf,
    written: u64,
}

impl CacheWriter {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> IngestResult<()> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| IngestError::io("writing cache temp file", &e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush, sync and atomically move the temp file over the cache file
    pub async fn commit(self) -> IngestResult<u64> {
        let CacheWriter {
            temp,
            mut file,
            target,
            written,
        } = self;

        file.flush()
            .await
            .map_err(|e| IngestError::io("flushing cache temp file", &e))?;
        file.sync_all()
            .await
            .map_err(|e| IngestError::io("syncing cache temp file", &e))?;
        drop(file);

        let persist_target = target.clone();
        tokio::task::spawn_blocking(move || persist_temp(temp, &persist_target))
            .await
            .map_err(|e| IngestError::cache(format!("cache commit task failed: {e}")))??;

        info!(
            "Committed playlist cache {} ({} bytes)",
            target.display(),
            written
        );
        Ok(written)
    }

    /// Discard the temp file
    pub fn abort(self) {
        debug!("Discarding cache temp file {}", self.temp.path().display());
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn persist_temp(temp: NamedTempFile, target: &Path) -> IngestResult<()> {
    match temp.persist(target) {
        Ok(_) => Ok(()),
        Err(PersistError { error, file }) if error.kind() == io::ErrorKind::CrossesDevices => {
            debug!("Temp dir is on another device, copying next to the cache file");
            copy_then_persist(&file, target)
            // `file` drops here, deleting the original temp file
        }
        Err(PersistError { error, .. }) => Err(IngestError::cache(format!(
            "Failed to replace {}: {error}",
            target.display()
        ))),
    }
}

fn copy_then_persist(source: &NamedTempFile, target: &Path) -> IngestResult<()> {
    let mut sibling = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(parent_dir(target))
        .map_err(|e| IngestError::io("creating sibling temp file", &e))?;
    let mut reader = source
        .reopen()
        .map_err(|e| IngestError::io("reopening cache temp file", &e))?;

    io::copy(&mut reader, sibling.as_file_mut())
        .map_err(|e| IngestError::io("copying cache temp file", &e))?;
    sibling
        .as_file()
        .sync_all()
        .map_err(|e| IngestError::io("syncing sibling temp file", &e))?;

    sibling.persist(target).map_err(|e| {
        IngestError::cache(format!("Failed to replace {}: {}", target.display(), e.error))
    })?;
    Ok(())
}
