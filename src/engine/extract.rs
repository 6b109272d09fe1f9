use std::path::{Path, PathBuf};

use tokio::fs::{DirBuilder, OpenOptions};
use tokio::io::BufWriter;
use tracing::{debug, trace};

use crate::error::Error;
use crate::io::LocalFileReader;
use crate::zip::{ZipError, ZipFileEntry, ZipReader};

use super::handle::{Notifier, OperationHandle, operation};
use super::sanitize::{resolve_root, safe_join};

/// Mode for extracted files whose entry carries no unix permissions.
#[cfg(unix)]
const DEFAULT_FILE_MODE: u32 = 0o644;

/// Extract every entry of `source` below `destination`, creating it if
/// needed. Directories are created with `dir_mode`; files get the
/// permission bits stored in their entry.
///
/// `expected_entries` sizes both notification streams, usually from
/// [`inspect`](super::inspect). Entries are processed in archive order, one
/// progress notification each. An entry whose name would land outside
/// `destination` is reported as [`Error::PathTraversal`] and skipped.
/// Cancellation is checked before each entry; files already written stay.
///
/// Must be called from within a Tokio runtime.
pub fn extract_archive(
    source: impl Into<PathBuf>,
    destination: impl Into<PathBuf>,
    expected_entries: usize,
    dir_mode: u32,
) -> OperationHandle {
    let (handle, notifier) = operation(expected_entries);
    tokio::spawn(run(source.into(), destination.into(), dir_mode, notifier));
    handle
}

async fn run(source: PathBuf, destination: PathBuf, dir_mode: u32, mut notifier: Notifier) {
    debug!(archive = %source.display(), destination = %destination.display(), "extracting archive");

    let reader = match ZipReader::open(&source) {
        Ok(reader) => reader,
        Err(e) => {
            let _ = notifier.error(Error::open(&source, e)).await;
            return;
        }
    };
    let entries = match reader.entries().await {
        Ok(entries) => entries,
        Err(e) => {
            let _ = notifier.error(Error::open(&source, e)).await;
            return;
        }
    };
    let root = match resolve_root(&destination) {
        Ok(root) => root,
        Err(e) => {
            let _ = notifier.error(Error::open(&destination, e)).await;
            return;
        }
    };
    if let Err(e) = create_dirs(&root, dir_mode).await {
        let _ = notifier.error(Error::open(&root, e)).await;
        return;
    }

    for entry in &entries {
        if notifier.cancel_requested() {
            debug!(archive = %source.display(), "cancellation requested");
            let _ = notifier.error(Error::Cancelled).await;
            return;
        }

        let target = match safe_join(&root, &entry.file_name) {
            Ok(target) => target,
            Err(err) => {
                debug!(entry = %entry.file_name, "rejected entry outside destination");
                if notifier.error(err).await.is_err() {
                    return;
                }
                continue;
            }
        };

        let outcome = extract_entry(&reader, entry, &target, dir_mode).await;
        trace!(entry = %entry.file_name, ok = outcome.is_ok(), "entry done");
        if notifier.progress(target.clone()).await.is_err() {
            return;
        }
        if let Err(e) = outcome {
            if notifier.error(Error::transfer(target, e)).await.is_err() {
                return;
            }
        }
    }

    debug!(archive = %source.display(), entries = entries.len(), "extraction finished");
}

async fn extract_entry(
    reader: &ZipReader<LocalFileReader>,
    entry: &ZipFileEntry,
    target: &Path,
    dir_mode: u32,
) -> Result<(), ZipError> {
    if entry.is_directory {
        create_dirs(target, dir_mode).await?;
        return Ok(());
    }

    if let Some(parent) = target.parent() {
        create_dirs(parent, dir_mode).await?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(entry.unix_mode().map_or(DEFAULT_FILE_MODE, |mode| mode & 0o777));

    let file = options.open(target).await?;
    let mut out = BufWriter::new(file);
    reader.copy_entry(entry, &mut out).await?;
    Ok(())
}

async fn create_dirs(path: &Path, mode: u32) -> std::io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path).await
}
