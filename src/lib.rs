//! # zipline
//!
//! Asynchronous creation and extraction of ZIP archives with cooperative
//! cancellation, streamed progress and zip-slip protection.
//!
//! Each operation runs on its own Tokio task and hands back an
//! [`OperationHandle`]: a single-use cancel signal plus a progress stream
//! and an error stream. The operation is over when both streams are
//! closed. Failures on one root path or one entry are reported and
//! processing moves on; only failing to open the archive and cancellation
//! stop the whole operation.
//!
//! ## Features
//!
//! - Create archives from any number of files and directory trees
//! - Entry names from absolute paths, with an ordered list of prefixes to trim
//! - Extract with per-entry path-traversal checks
//! - STORED and DEFLATE entries, unix permission bits preserved
//! - Pre-scan an archive with [`inspect`] to size the notification streams
//!
//! ## Example
//!
//! ```no_run
//! use zipline::{CreateOptions, Event, create_archive, extract_archive, inspect};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let options = CreateOptions::default().trim_prefix("/home/me");
//!     let report = create_archive("backup.zip", ["/home/me/notes"], options)
//!         .wait()
//!         .await;
//!     for err in &report.errors {
//!         eprintln!("{err}");
//!     }
//!
//!     let stats = inspect("backup.zip").await?;
//!     let mut handle = extract_archive("backup.zip", "restore", stats.entry_count, 0o755);
//!     while let Some(event) = handle.next_event().await {
//!         match event {
//!             Event::Progress(path) => println!("  inflating: {}", path.display()),
//!             Event::Error(err) => eprintln!("error: {err}"),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod engine;
pub mod error;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use engine::{
    ArchiveStats, Canceller, CreateOptions, Event, OperationHandle, Report, create_archive,
    extract_archive, inspect,
};
pub use error::{Error, Result};
pub use io::{LocalFileReader, ReadAt};
pub use zip::{ZipReader, ZipWriter};
