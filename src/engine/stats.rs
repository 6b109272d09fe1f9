use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::zip::ZipReader;

/// Snapshot of an existing archive, taken by a full scan of its central
/// directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Files plus directories
    pub entry_count: usize,
    pub file_count: usize,
    pub dir_count: usize,
    pub compressed_bytes: u64,
    pub uncompressed_bytes: u64,
}

/// Count the entries of the archive at `source`.
///
/// Callers use `entry_count` as the `expected_entries` of
/// [`extract_archive`](super::extract_archive) so the worker never waits
/// on a full stream while the caller drains it.
pub async fn inspect(source: impl AsRef<Path>) -> Result<ArchiveStats> {
    let source = source.as_ref();
    let reader = ZipReader::open(source).map_err(|e| Error::open(source, e))?;
    let entries = reader.entries().await.map_err(|e| Error::open(source, e))?;

    let stats = entries
        .iter()
        .fold(ArchiveStats::default(), |mut stats, entry| {
            stats.entry_count += 1;
            if entry.is_directory {
                stats.dir_count += 1;
            } else {
                stats.file_count += 1;
            }
            stats.compressed_bytes += entry.compressed_size;
            stats.uncompressed_bytes += entry.uncompressed_size;
            stats
        });

    debug!(archive = %source.display(), entries = stats.entry_count, "inspected archive");
    Ok(stats)
}
