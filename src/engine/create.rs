use std::fs::Metadata;
use std::io;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncWrite, BufWriter};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::zip::{CompressionMethod, EntryHeader, ZipError, ZipWriter};

use super::handle::{Notifier, OperationHandle, operation};
use super::sanitize::normalize_path;

/// Options for [`create_archive`].
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Prefixes stripped from absolute paths to form entry names, tried in
    /// order; the first one that matches wins.
    pub trim_prefixes: Vec<String>,
    pub method: CompressionMethod,
    pub level: u32,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            trim_prefixes: Vec::new(),
            method: CompressionMethod::Deflate,
            level: 6,
        }
    }
}

impl CreateOptions {
    pub fn trim_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trim_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn trim_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.trim_prefixes.push(prefix.into());
        self
    }

    pub fn method(mut self, method: CompressionMethod) -> Self {
        self.method = method;
        self
    }

    pub fn level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }
}

/// Create a ZIP archive at `destination` from every file and directory
/// under each of `roots`.
///
/// The work runs on a spawned Tokio task, so this must be called from
/// within a runtime. The progress stream gets one notification per root
/// path once its walk is done; the error stream gets at most one
/// [`Error::Walk`] per root path. Cancellation is checked before each root
/// path, and the archive is finalized either way.
pub fn create_archive<I, P>(
    destination: impl Into<PathBuf>,
    roots: I,
    options: CreateOptions,
) -> OperationHandle
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let destination = destination.into();
    let roots: Vec<PathBuf> = roots.into_iter().map(Into::into).collect();
    let (handle, notifier) = operation(roots.len());
    tokio::spawn(run(destination, roots, options, notifier));
    handle
}

async fn run(
    destination: PathBuf,
    roots: Vec<PathBuf>,
    options: CreateOptions,
    mut notifier: Notifier,
) {
    debug!(archive = %destination.display(), roots = roots.len(), "creating archive");

    let file = match File::create(&destination).await {
        Ok(file) => file,
        Err(e) => {
            let _ = notifier.error(Error::open(&destination, e)).await;
            return;
        }
    };
    // The destination may sit below one of the roots.
    let archive_id = file
        .metadata()
        .await
        .ok()
        .and_then(|metadata| file_id(&destination, &metadata));
    let mut writer = ZipWriter::new(BufWriter::new(file)).with_level(options.level);

    let mut cancelled = false;
    for root in roots {
        if notifier.cancel_requested() {
            debug!(archive = %destination.display(), "cancellation requested");
            cancelled = true;
            break;
        }

        let outcome = add_root(&mut writer, &root, &options, archive_id.as_ref()).await;
        trace!(root = %root.display(), ok = outcome.is_ok(), "root path done");
        if notifier.progress(root).await.is_err() {
            break;
        }
        if let Err(err) = outcome {
            if notifier.error(err).await.is_err() {
                break;
            }
        }
    }

    let entries = writer.len();
    match writer.finish().await {
        Ok(_) => debug!(archive = %destination.display(), entries, "archive finalized"),
        Err(e) => {
            let _ = notifier.error(Error::transfer(&destination, e)).await;
        }
    }
    if cancelled {
        let _ = notifier.error(Error::Cancelled).await;
    }
}

/// Walk one root path depth-first and add every node. A failing node is
/// skipped; the failures are folded into one [`Error::Walk`].
async fn add_root<W>(
    writer: &mut ZipWriter<W>,
    root: &Path,
    options: &CreateOptions,
    archive_id: Option<&FileId>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut failed = 0;
    let mut first = None;

    for node in walk(root.to_path_buf(), archive_id.cloned()).await {
        let result = match node {
            Ok(node) => add_node(writer, node, options).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            trace!(root = %root.display(), error = %err, "node skipped");
            failed += 1;
            first.get_or_insert(err);
        }
    }

    match first {
        None => Ok(()),
        Some(first) => Err(Error::Walk {
            root: root.to_path_buf(),
            failed,
            first: Box::new(first),
        }),
    }
}

struct Node {
    path: PathBuf,
    metadata: Metadata,
}

/// Identity of a file, independent of how its path is spelled: device and
/// inode on unix, the canonical path elsewhere.
#[cfg(unix)]
type FileId = (u64, u64);
#[cfg(not(unix))]
type FileId = PathBuf;

#[cfg(unix)]
fn file_id(_path: &Path, metadata: &Metadata) -> Option<FileId> {
    use std::os::unix::fs::MetadataExt;
    Some((metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
fn file_id(path: &Path, _metadata: &Metadata) -> Option<FileId> {
    std::fs::canonicalize(path).ok()
}

/// List `root` and everything below it, parents before children, siblings
/// by name. Symlinks are not descended into; their target's metadata
/// decides how they are stored. The file identified by `skip` is left out
/// without counting as a failure.
async fn walk(root: PathBuf, skip: Option<FileId>) -> Vec<Result<Node>> {
    let walk_root = root.clone();
    let listed = tokio::task::spawn_blocking(move || {
        WalkDir::new(&walk_root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| {
                let node = entry
                    .map_err(|e| {
                        let path = e.path().map_or_else(|| walk_root.clone(), Path::to_path_buf);
                        Error::transfer(path, io::Error::from(e))
                    })
                    .and_then(|entry| {
                        let metadata = if entry.path_is_symlink() {
                            std::fs::metadata(entry.path())
                        } else {
                            entry.metadata().map_err(io::Error::from)
                        }
                        .map_err(|e| Error::transfer(entry.path(), e))?;
                        Ok(Node {
                            path: entry.into_path(),
                            metadata,
                        })
                    });

                if let (Ok(node), Some(skip)) = (&node, &skip)
                    && node.metadata.is_file()
                    && file_id(&node.path, &node.metadata).as_ref() == Some(skip)
                {
                    debug!(path = %node.path.display(), "skipping the archive being written");
                    return None;
                }
                Some(node)
            })
            .collect::<Vec<_>>()
    })
    .await;

    listed.unwrap_or_else(|e| vec![Err(Error::transfer(root, io::Error::other(e)))])
}

async fn add_node<W>(
    writer: &mut ZipWriter<W>,
    node: Node,
    options: &CreateOptions,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let name = archive_name(&node.path, &options.trim_prefixes);
    let header = EntryHeader::from_metadata(name, &node.metadata).with_method(options.method);
    trace!(entry = %header.name, "adding entry");

    if node.metadata.is_dir() {
        return writer
            .add_directory(header)
            .await
            .map_err(|e| Error::transfer(&node.path, e));
    }
    if !node.metadata.is_file() {
        return Err(Error::transfer(
            &node.path,
            ZipError::Unsupported("not a regular file".to_string()),
        ));
    }

    let mut file = File::open(&node.path)
        .await
        .map_err(|e| Error::transfer(&node.path, e))?;
    writer
        .add_file(header, &mut file)
        .await
        .map(drop)
        .map_err(|e| Error::transfer(&node.path, e))
}

/// Entry name for a filesystem path: the absolute path with the first
/// matching trim prefix removed, or with just its leading separator removed
/// when no prefix matches. A prefix only matches if something is left
/// after it. Separators become `/`.
pub fn archive_name(path: &Path, trim_prefixes: &[String]) -> String {
    let absolute = std::path::absolute(path)
        .map(|p| normalize_path(&p))
        .unwrap_or_else(|_| path.to_path_buf());
    let full = absolute.to_string_lossy();

    let name = trim_prefixes
        .iter()
        .find_map(|prefix| {
            full.strip_prefix(prefix.as_str())
                .map(trim_separators)
                .filter(|rest| !rest.is_empty())
        })
        .unwrap_or_else(|| trim_separators(&full));

    if MAIN_SEPARATOR == '/' {
        name.to_string()
    } else {
        name.replace(MAIN_SEPARATOR, "/")
    }
}

fn trim_separators(name: &str) -> &str {
    name.trim_start_matches(['/', MAIN_SEPARATOR])
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn prefixes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_prefixes_strips_leading_separator() {
        assert_eq!(archive_name(Path::new("/tmp/data/a.txt"), &[]), "tmp/data/a.txt");
    }

    #[test]
    fn first_matching_prefix_wins() {
        let path = Path::new("/srv/app/logs/today.log");
        assert_eq!(
            archive_name(path, &prefixes(&["/srv/app", "/srv/app/logs"])),
            "logs/today.log"
        );
        assert_eq!(
            archive_name(path, &prefixes(&["/srv/app/logs", "/srv/app"])),
            "today.log"
        );
    }

    #[test]
    fn unmatched_prefixes_fall_back() {
        let path = Path::new("/srv/app/a.txt");
        assert_eq!(archive_name(path, &prefixes(&["/home", "/var"])), "srv/app/a.txt");
    }

    #[test]
    fn prefix_consuming_whole_path_does_not_match() {
        let path = Path::new("/srv/app");
        assert_eq!(archive_name(path, &prefixes(&["/srv/app", "/srv"])), "app");
        assert_eq!(archive_name(path, &prefixes(&["/srv/app/"])), "srv/app");
    }

    #[test]
    fn relative_paths_are_made_absolute_first() {
        let cwd = std::env::current_dir().unwrap();
        let expected = cwd.join("x.txt");
        let expected = expected.to_string_lossy();
        assert_eq!(archive_name(Path::new("./x.txt"), &[]), expected.trim_start_matches('/'));
    }

    #[test]
    fn prefix_match_is_textual() {
        // "/srv/ap" is a textual prefix of "/srv/app" even though it is not
        // a path component.
        let path = Path::new("/srv/app/a.txt");
        assert_eq!(archive_name(path, &prefixes(&["/srv/ap"])), "p/a.txt");
    }
}
