//! Per-image run: upload, then download, reported as a stream of [`JobState`]s.

use crate::client::{CompressionService, ProgressFn};
use crate::error::CompressionError;
use crate::job::JobState;
use futures::Stream;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{AbortHandle, JoinHandle};

/// Starts image runs against a [`CompressionService`].
#[derive(Clone)]
pub struct ImagePipeline {
    service: Arc<dyn CompressionService>,
}

impl ImagePipeline {
    pub fn new(service: Arc<dyn CompressionService>) -> Self {
        Self { service }
    }

    /// Starts one run for `source` and returns its event sequence.
    ///
    /// `Waiting` is queued before anything else happens. Must be called from
    /// within a Tokio runtime.
    pub fn process(&self, source: &Path) -> JobEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(JobState::Waiting);

        let task = tokio::spawn(drive(
            Arc::clone(&self.service),
            source.to_path_buf(),
            tx,
        ));
        JobEvents { rx, task }
    }
}

/// Finite, single-consumer sequence of state transitions for one run.
///
/// Dropping it, or calling [`JobEvents::cancel`], aborts any request still in
/// flight; the sequence then ends without a terminal event.
pub struct JobEvents {
    rx: UnboundedReceiver<JobState>,
    task: JoinHandle<()>,
}

impl JobEvents {
    pub async fn next_state(&mut self) -> Option<JobState> {
        self.rx.recv().await
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Handle that cancels this run from elsewhere.
    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }
}

impl Stream for JobEvents {
    type Item = JobState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<JobState>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for JobEvents {
    fn drop(&mut self) {
        self.task.abort();
        // Later sends fail and clean up after themselves; results already
        // queued would otherwise leave their temp file behind.
        self.rx.close();
        while let Ok(state) = self.rx.try_recv() {
            if let JobState::Finished(temp) = state {
                discard_temp(&temp);
            }
        }
    }
}

fn discard_temp(temp: &Path) {
    if let Err(e) = std::fs::remove_file(temp) {
        tracing::debug!(path = %temp.display(), error = %e, "could not remove unclaimed download");
    }
}

/// Forwards progress for one phase, keeping it in [0, 1] and non-decreasing.
struct PhaseProgress {
    tx: UnboundedSender<JobState>,
    phase: fn(f64) -> JobState,
    last: Mutex<Option<f64>>,
}

impl PhaseProgress {
    fn new(tx: UnboundedSender<JobState>, phase: fn(f64) -> JobState, start: Option<f64>) -> Arc<Self> {
        Arc::new(Self {
            tx,
            phase,
            last: Mutex::new(start),
        })
    }

    fn tick(&self, fraction: f64) {
        if fraction.is_nan() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        let mut last = self.last.lock();
        if last.map_or(true, |prev| fraction > prev) {
            *last = Some(fraction);
            let _ = self.tx.send((self.phase)(fraction));
        }
    }

    fn callback(self: &Arc<Self>) -> ProgressFn {
        let this = Arc::clone(self);
        Arc::new(move |fraction| this.tick(fraction))
    }
}

async fn drive(service: Arc<dyn CompressionService>, source: PathBuf, tx: UnboundedSender<JobState>) {
    if !source.is_file() {
        tracing::debug!(path = %source.display(), "source missing, skipping upload");
        let _ = tx.send(JobState::error(CompressionError::SourceMissing(source)));
        return;
    }

    let upload = PhaseProgress::new(tx.clone(), JobState::Uploading, None);
    let redirect = match service.upload(&source, upload.callback()).await {
        Ok(redirect) => redirect,
        Err(err) => {
            tracing::debug!(path = %source.display(), error = %err, "upload failed");
            let _ = tx.send(JobState::error(err));
            return;
        }
    };
    upload.tick(1.0);

    let _ = tx.send(JobState::Downloading(0.0));
    let download = PhaseProgress::new(tx.clone(), JobState::Downloading, Some(0.0));
    let temp = match service.download(&redirect, download.callback()).await {
        Ok(temp) => temp,
        Err(err) => {
            tracing::debug!(path = %source.display(), error = %err, "download failed");
            let _ = tx.send(JobState::error(err));
            return;
        }
    };

    // The consumer owns the file from here on.
    match temp.keep() {
        Ok(location) => {
            if let Err(SendError(JobState::Finished(location))) = tx.send(JobState::Finished(location)) {
                discard_temp(&location);
            }
        }
        Err(err) => {
            let _ = tx.send(JobState::error(CompressionError::Io(err.error)));
        }
    }
}
