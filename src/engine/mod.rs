//! The concurrent archive engine.
//!
//! [`create_archive`] and [`extract_archive`] each spawn one worker task and
//! return an [`OperationHandle`] right away. The worker processes entries
//! strictly one at a time and talks to the caller only through the handle:
//!
//! - a single-use cancel signal, polled by the worker between root paths
//!   (create) or entries (extract), never in the middle of one;
//! - a bounded progress stream of processed paths;
//! - a bounded error stream.
//!
//! Both streams close when the worker ends for any reason. That joint close
//! is the only completion signal.
//! If the caller stops draining, the worker blocks once a stream is full.

mod create;
mod extract;
mod handle;
mod sanitize;
mod stats;

pub use create::{CreateOptions, archive_name, create_archive};
pub use extract::extract_archive;
pub use handle::{Canceller, Event, OperationHandle, Report};
pub use sanitize::{resolve_root, safe_join};
pub use stats::{ArchiveStats, inspect};
