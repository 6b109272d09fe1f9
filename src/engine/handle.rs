use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};

use crate::error::Error;

/// Something the worker reported.
#[derive(Debug)]
pub enum Event {
    Progress(PathBuf),
    Error(Error),
}

/// Everything an operation reported, drained to completion.
#[derive(Debug, Default)]
pub struct Report {
    pub processed: Vec<PathBuf>,
    pub errors: Vec<Error>,
}

impl Report {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn was_cancelled(&self) -> bool {
        self.errors.iter().any(|e| matches!(e, Error::Cancelled))
    }
}

/// Single-use cancel signal detached from its [`OperationHandle`].
#[derive(Debug)]
pub struct Canceller(oneshot::Sender<()>);

impl Canceller {
    /// Request cancellation. Returns false if the worker has already
    /// finished.
    pub fn cancel(self) -> bool {
        self.0.send(()).is_ok()
    }
}

/// Caller side of one create or extract operation.
///
/// The operation is complete when both the progress stream and the error
/// stream are closed; [`next_event`](Self::next_event) returning `None` is
/// that signal. An empty operation closes both streams without sending
/// anything.
#[derive(Debug)]
pub struct OperationHandle {
    cancel: Option<oneshot::Sender<()>>,
    progress: mpsc::Receiver<PathBuf>,
    errors: mpsc::Receiver<Error>,
    progress_closed: bool,
    errors_closed: bool,
}

impl OperationHandle {
    /// Request cancellation. Only the first call can succeed; the worker
    /// notices at its next checkpoint.
    pub fn cancel(&mut self) -> bool {
        self.cancel.take().is_some_and(|tx| tx.send(()).is_ok())
    }

    /// Take the cancel signal out, e.g. to race it against a timer on
    /// another task. `None` if it was already used or taken.
    pub fn canceller(&mut self) -> Option<Canceller> {
        self.cancel.take().map(Canceller)
    }

    /// Next processed path; `None` once the progress stream is closed.
    pub async fn next_progress(&mut self) -> Option<PathBuf> {
        let item = self.progress.recv().await;
        self.progress_closed |= item.is_none();
        item
    }

    /// Next error; `None` once the error stream is closed.
    pub async fn next_error(&mut self) -> Option<Error> {
        let item = self.errors.recv().await;
        self.errors_closed |= item.is_none();
        item
    }

    /// Next notification from either stream, `None` once both are closed.
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            if self.progress_closed && self.errors_closed {
                return None;
            }
            tokio::select! {
                item = self.progress.recv(), if !self.progress_closed => match item {
                    Some(path) => return Some(Event::Progress(path)),
                    None => self.progress_closed = true,
                },
                item = self.errors.recv(), if !self.errors_closed => match item {
                    Some(err) => return Some(Event::Error(err)),
                    None => self.errors_closed = true,
                },
            }
        }
    }

    /// Drain both streams until they close.
    pub async fn wait(mut self) -> Report {
        let mut report = Report::default();
        while let Some(event) = self.next_event().await {
            match event {
                Event::Progress(path) => report.processed.push(path),
                Event::Error(err) => report.errors.push(err),
            }
        }
        report
    }

    /// Split into the raw cancel sender and the two receivers. The worker
    /// keeps going while either receiver is alive.
    pub fn into_parts(
        self,
    ) -> (
        Option<Canceller>,
        mpsc::Receiver<PathBuf>,
        mpsc::Receiver<Error>,
    ) {
        (self.cancel.map(Canceller), self.progress, self.errors)
    }
}

/// The worker's side: polls the cancel signal and feeds both streams.
/// Dropping it closes both streams.
pub(crate) struct Notifier {
    cancel: oneshot::Receiver<()>,
    progress: mpsc::Sender<PathBuf>,
    errors: mpsc::Sender<Error>,
}

/// Both receivers are gone; there is no one left to report to.
#[derive(Debug)]
pub(crate) struct Detached;

impl Notifier {
    /// Non-blocking poll of the cancel signal. A sender dropped without
    /// firing does not count.
    pub(crate) fn cancel_requested(&mut self) -> bool {
        self.cancel.try_recv().is_ok()
    }

    /// Report a processed path. A caller that dropped only the progress
    /// stream still gets the work done; `Detached` means both are gone.
    pub(crate) async fn progress(&self, path: PathBuf) -> Result<(), Detached> {
        if self.progress.send(path).await.is_err() && self.errors.is_closed() {
            return Err(Detached);
        }
        Ok(())
    }

    /// Report an error, with the same detach rule as [`progress`](Self::progress).
    pub(crate) async fn error(&self, err: Error) -> Result<(), Detached> {
        if self.errors.send(err).await.is_err() && self.progress.is_closed() {
            return Err(Detached);
        }
        Ok(())
    }
}

/// Both ends of a new operation. Capacity is clamped to at least one.
pub(crate) fn operation(capacity: usize) -> (OperationHandle, Notifier) {
    let capacity = capacity.max(1);
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let (progress_tx, progress_rx) = mpsc::channel(capacity);
    let (errors_tx, errors_rx) = mpsc::channel(capacity);

    let handle = OperationHandle {
        cancel: Some(cancel_tx),
        progress: progress_rx,
        errors: errors_rx,
        progress_closed: false,
        errors_closed: false,
    };
    let notifier = Notifier {
        cancel: cancel_rx,
        progress: progress_tx,
        errors: errors_tx,
    };
    (handle, notifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn both_streams_must_close() {
        let (handle, notifier) = operation(0);
        notifier.progress(PathBuf::from("a")).await.unwrap();
        notifier.error(Error::Cancelled).await.unwrap();
        drop(notifier);

        let report = handle.wait().await;
        assert_eq!(report.processed, [PathBuf::from("a")]);
        assert!(report.was_cancelled());
    }

    #[tokio::test]
    async fn cancel_is_single_use() {
        let (mut handle, mut notifier) = operation(1);
        assert!(!notifier.cancel_requested());
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(notifier.cancel_requested());
    }

    #[tokio::test]
    async fn dropped_canceller_is_not_a_cancel() {
        let (mut handle, mut notifier) = operation(1);
        drop(handle.canceller());
        assert!(!notifier.cancel_requested());
    }

    #[tokio::test]
    async fn dropping_one_stream_does_not_detach() {
        let (handle, notifier) = operation(1);
        let (_canceller, progress, mut errors) = handle.into_parts();
        drop(progress);

        assert!(notifier.progress(PathBuf::from("a")).await.is_ok());
        notifier.error(Error::Cancelled).await.unwrap();
        assert!(matches!(errors.recv().await, Some(Error::Cancelled)));

        drop(errors);
        assert!(notifier.progress(PathBuf::from("b")).await.is_err());
        assert!(notifier.error(Error::Cancelled).await.is_err());
    }

    #[tokio::test]
    async fn dropped_handle_detaches_worker() {
        let (handle, notifier) = operation(1);
        drop(handle);
        assert!(notifier.progress(PathBuf::from("x")).await.is_err());
    }
}
