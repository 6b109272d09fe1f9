//! Main entry point for the zipline CLI application.
//!
//! Creates, extracts and inspects ZIP archives. Progress is printed as the
//! engine reports it; Ctrl-C or `--timeout` fire the operation's cancel
//! signal.

use anyhow::{Result, bail};
use clap::Parser;
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use zipline::cli::{Command, CreateArgs, ExtractArgs, InspectArgs};
use zipline::zip::CompressionMethod;
use zipline::{
    Cli, CreateOptions, Event, OperationHandle, ZipReader, create_archive, extract_archive,
    inspect,
};

/// Application entry point.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let failures = match &cli.command {
        Command::Create(args) => create(&cli, args).await,
        Command::Extract(args) => extract(&cli, args).await,
        Command::Inspect(args) => {
            inspect_archive(args).await?;
            0
        }
    };

    if failures > 0 {
        bail!("{failures} error(s) reported");
    }
    Ok(())
}

async fn create(cli: &Cli, args: &CreateArgs) -> usize {
    let method = if args.store {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflate
    };
    let options = CreateOptions::default()
        .trim_prefixes(args.trim.iter().cloned())
        .method(method)
        .level(args.level);

    let handle = create_archive(&args.archive, &args.paths, options);
    drain(cli, handle, "adding").await
}

async fn extract(cli: &Cli, args: &ExtractArgs) -> usize {
    // Size the streams from a pre-scan. If it fails, extraction reports the
    // same open failure on its error stream.
    let expected = match inspect(&args.archive).await {
        Ok(stats) => stats.entry_count,
        Err(e) => {
            warn!(error = %e, "pre-scan failed");
            0
        }
    };

    let handle = extract_archive(&args.archive, &args.extract_dir, expected, args.dir_mode);
    drain(cli, handle, "inflating").await
}

/// Print notifications until both streams close. Returns the number of
/// errors reported.
async fn drain(cli: &Cli, mut handle: OperationHandle, verb: &str) -> usize {
    if let Some(canceller) = handle.canceller() {
        let timeout = cli.timeout.map(Duration::from_secs);
        tokio::spawn(async move {
            let interrupt = || async {
                let _ = tokio::signal::ctrl_c().await;
            };
            let cancel = move || {
                canceller.cancel();
            };
            watch_interrupts(cancel, timeout, interrupt).await;
            eprintln!("interrupted again, exiting");
            std::process::exit(130);
        });
    }

    let mut failures = 0;
    while let Some(event) = handle.next_event().await {
        match event {
            Event::Progress(path) => {
                if !cli.is_quiet() {
                    println!("  {verb}: {}", path.display());
                }
            }
            Event::Error(err) => {
                failures += 1;
                if !cli.is_very_quiet() {
                    eprintln!("error: {err}");
                }
            }
        }
    }
    failures
}

/// Fire `cancel` on the first interrupt or once `timeout` elapses, then
/// return on the next interrupt.
async fn watch_interrupts<F, Fut>(
    cancel: impl FnOnce(),
    timeout: Option<Duration>,
    mut interrupt: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = interrupt() => {}
        _ = deadline => {}
    }
    cancel();
    interrupt().await;
}

/// Print archive statistics, and with `-l`/`-v` its entries.
///
/// Supports two listing formats:
/// - Simple format (`-l`): Just entry names, one per line
/// - Verbose format (`-v`): Table with size, compression ratio, and timestamps
async fn inspect_archive(args: &InspectArgs) -> Result<()> {
    let stats = inspect(&args.archive).await?;

    if args.list || args.verbose {
        let reader = ZipReader::open(Path::new(&args.archive))?;
        let entries = reader.entries().await?;

        if args.verbose {
            println!(
                "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
                "Length", "Size", "Cmpr", "Date", "Time"
            );
            println!("{}", "-".repeat(70));
        }

        for entry in &entries {
            if args.verbose {
                let (year, month, day) = entry.mod_date();
                let (hour, minute, _second) = entry.mod_time();
                println!(
                    "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
                    entry.uncompressed_size,
                    entry.compressed_size,
                    ratio(entry.compressed_size, entry.uncompressed_size),
                    year,
                    month,
                    day,
                    hour,
                    minute,
                    entry.file_name
                );
            } else {
                println!("{}", entry.file_name);
            }
        }

        if args.verbose {
            println!("{}", "-".repeat(70));
            println!(
                "{:>10}  {:>10}  {}",
                stats.uncompressed_bytes,
                stats.compressed_bytes,
                ratio(stats.compressed_bytes, stats.uncompressed_bytes)
            );
        }
    }

    println!(
        "{} entries ({} files, {} directories), {} uncompressed",
        stats.entry_count,
        stats.file_count,
        stats.dir_count,
        format_size(stats.uncompressed_bytes)
    );
    Ok(())
}

/// Space saved as a right-aligned percentage.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// Format a byte size into a human-readable string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// assert_eq!(format_size(1048576), "1.00 MB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    type Interrupt = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;

    fn interrupts(notify: &Arc<Notify>) -> impl FnMut() -> Interrupt + Send + 'static {
        let notify = notify.clone();
        move || {
            let notify = notify.clone();
            Box::pin(async move { notify.notified().await })
        }
    }

    #[tokio::test]
    async fn first_interrupt_cancels_second_exits() {
        let notify = Arc::new(Notify::new());
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let watcher = tokio::spawn(watch_interrupts(
            move || flag.store(true, Ordering::SeqCst),
            None,
            interrupts(&notify),
        ));

        notify.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cancelled.load(Ordering::SeqCst));
        assert!(!watcher.is_finished());

        notify.notify_one();
        tokio::time::timeout(Duration::from_secs(5), watcher)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn timeout_cancels_without_an_interrupt() {
        let notify = Arc::new(Notify::new());
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let watcher = tokio::spawn(watch_interrupts(
            move || flag.store(true, Ordering::SeqCst),
            Some(Duration::from_millis(10)),
            interrupts(&notify),
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(cancelled.load(Ordering::SeqCst));
        assert!(!watcher.is_finished());
        watcher.abort();
    }

    #[test]
    fn ratio_is_space_saved() {
        assert_eq!(ratio(25, 100), "  75%");
        assert_eq!(ratio(0, 0), "  0%");
        assert_eq!(format_size(1536), "1.50 KB");
    }
}
