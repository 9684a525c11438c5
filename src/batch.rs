use crate::client::CompressionService;
use crate::error::CompressionError;
use crate::job::{ImageJob, JobHandle, JobState};
use crate::pipeline::ImagePipeline;
use crate::placement::{place, PlacementPolicy};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{AbortHandle, JoinSet};

/// Called with a snapshot of the job after every published state.
pub type JobObserver = Arc<dyn Fn(&ImageJob) + Send + Sync>;

/// Totals for one `run_batch` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub finished: usize,
    pub failed: usize,
    /// Original bytes of the finished jobs.
    pub total_original: u64,
    /// Optimized bytes of the finished jobs.
    pub total_optimized: u64,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.finished + self.failed
    }

    pub fn compression_ratio(&self) -> f64 {
        crate::utils::calculate_compression_ratio(self.total_original, self.total_optimized)
    }
}

/// Runs every job of a batch concurrently and places the results.
#[derive(Clone)]
pub struct BatchRunner {
    pipeline: ImagePipeline,
    policy: PlacementPolicy,
    observer: Option<JobObserver>,
    active_batches: Arc<AtomicUsize>,
    next_run: Arc<AtomicU64>,
    /// In-flight runs per source; overlapping batches may run the same job.
    running: Arc<Mutex<HashMap<PathBuf, Vec<(u64, AbortHandle)>>>>,
}

impl BatchRunner {
    pub fn new(service: Arc<dyn CompressionService>, policy: PlacementPolicy) -> Self {
        Self {
            pipeline: ImagePipeline::new(service),
            policy,
            observer: None,
            active_batches: Arc::new(AtomicUsize::new(0)),
            next_run: Arc::new(AtomicU64::new(0)),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_observer(mut self, observer: JobObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn policy(&self) -> &PlacementPolicy {
        &self.policy
    }

    /// True while any batch started through this runner (or a clone) is still running.
    pub fn is_processing(&self) -> bool {
        self.active_batches.load(Ordering::SeqCst) > 0
    }

    /// Aborts every in-flight run for `source`. Returns false if none is running.
    pub fn cancel(&self, source: &Path) -> bool {
        match self.running.lock().get(source) {
            Some(runs) if !runs.is_empty() => {
                for (_, handle) in runs {
                    handle.abort();
                }
                true
            }
            _ => false,
        }
    }

    /// Runs all `jobs` at once and returns when each has reached a terminal state.
    pub async fn run_batch(&self, jobs: &[JobHandle]) -> BatchSummary {
        let start_time = Instant::now();
        let _processing = ProcessingGuard::enter(&self.active_batches);
        tracing::debug!(jobs = jobs.len(), "starting batch");

        let mut tasks = JoinSet::new();
        for job in jobs {
            let runner = self.clone();
            let job = Arc::clone(job);
            tasks.spawn(async move { runner.run_job(job).await });
        }

        let mut summary = BatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(JobOutcome::Finished { original, optimized }) => {
                    summary.finished += 1;
                    summary.total_original += original;
                    summary.total_optimized += optimized;
                }
                Ok(JobOutcome::Failed) => summary.failed += 1,
                Err(e) => {
                    tracing::error!(error = %e, "job task panicked");
                    summary.failed += 1;
                }
            }
        }

        summary.elapsed = start_time.elapsed();
        tracing::debug!(
            finished = summary.finished,
            failed = summary.failed,
            "batch complete"
        );
        summary
    }

    async fn run_job(&self, job: JobHandle) -> JobOutcome {
        let source = {
            let mut job = job.lock();
            job.reset();
            job.source_path().to_path_buf()
        };

        let mut events = self.pipeline.process(&source);
        let _registration = self.register(&source, events.abort_handle());

        let mut outcome = None;
        while let Some(state) = events.next_state().await {
            match state {
                JobState::Finished(temp) => {
                    outcome = Some(self.finish_job(&job, &source, temp).await);
                }
                JobState::Error(err) => {
                    self.publish(&job, |job| job.fail(err));
                    outcome = Some(JobOutcome::Failed);
                }
                state => self.publish(&job, |job| job.advance(state)),
            }
        }

        match outcome {
            Some(outcome) => outcome,
            None => {
                // The run was aborted before a terminal event.
                self.publish(&job, |job| job.fail(Arc::new(CompressionError::Cancelled)));
                JobOutcome::Failed
            }
        }
    }

    async fn finish_job(&self, job: &JobHandle, source: &Path, temp: PathBuf) -> JobOutcome {
        let policy = self.policy.clone();
        let source = source.to_path_buf();
        let placed = tokio::task::spawn_blocking(move || {
            let result = place(&temp, &source, &policy).and_then(|final_path| {
                let size = std::fs::metadata(&final_path)?.len();
                Ok((final_path, size))
            });
            if result.is_err() && temp.exists() {
                if let Err(e) = std::fs::remove_file(&temp) {
                    tracing::debug!(path = %temp.display(), error = %e, "could not remove download");
                }
            }
            result
        })
        .await;

        let placed = match placed {
            Ok(result) => result,
            Err(join_err) => Err(CompressionError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                join_err.to_string(),
            ))),
        };

        match placed {
            Ok((final_path, size)) => {
                let original = job.lock().original_size();
                self.publish(job, |job| job.complete(final_path, size));
                JobOutcome::Finished {
                    original,
                    optimized: size,
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "placement failed");
                self.publish(job, |job| job.fail(Arc::new(err)));
                JobOutcome::Failed
            }
        }
    }

    fn register(&self, source: &Path, handle: AbortHandle) -> RunRegistration<'_> {
        let id = self.next_run.fetch_add(1, Ordering::Relaxed);
        self.running
            .lock()
            .entry(source.to_path_buf())
            .or_default()
            .push((id, handle));
        RunRegistration {
            runner: self,
            source: source.to_path_buf(),
            id,
        }
    }

    fn publish(&self, job: &JobHandle, update: impl FnOnce(&mut ImageJob)) {
        let snapshot = {
            let mut job = job.lock();
            update(&mut job);
            self.observer.as_ref().map(|_| job.clone())
        };
        if let (Some(observer), Some(snapshot)) = (&self.observer, snapshot) {
            observer(&snapshot);
        }
    }
}

enum JobOutcome {
    Finished { original: u64, optimized: u64 },
    Failed,
}

/// Removes one run from the cancel registry when it ends, however it ends.
struct RunRegistration<'a> {
    runner: &'a BatchRunner,
    source: PathBuf,
    id: u64,
}

impl Drop for RunRegistration<'_> {
    fn drop(&mut self) {
        let mut running = self.runner.running.lock();
        if let Some(runs) = running.get_mut(&self.source) {
            runs.retain(|(id, _)| *id != self.id);
            if runs.is_empty() {
                running.remove(&self.source);
            }
        }
    }
}

/// Keeps the processing flag raised for the lifetime of one batch.
struct ProcessingGuard<'a>(&'a AtomicUsize);

impl<'a> ProcessingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
