use crate::error::{CompressionError, Result};
use parking_lot::Mutex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Protocol state of one image.
///
/// `Finished` carries the temporary download location when emitted by the
/// pipeline and the final placed path once stored on an [`ImageJob`].
#[derive(Debug, Clone)]
pub enum JobState {
    None,
    Waiting,
    Uploading(f64),
    Downloading(f64),
    Finished(PathBuf),
    Error(Arc<CompressionError>),
}

impl JobState {
    pub fn error(err: CompressionError) -> Self {
        JobState::Error(Arc::new(err))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished(_) | JobState::Error(_))
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            JobState::Waiting | JobState::Uploading(_) | JobState::Downloading(_)
        )
    }

    /// Progress within the current phase, if the state has one.
    pub fn progress(&self) -> Option<f64> {
        match self {
            JobState::Uploading(p) | JobState::Downloading(p) => Some(*p),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobState::None => "pending",
            JobState::Waiting => "waiting",
            JobState::Uploading(_) => "uploading",
            JobState::Downloading(_) => "downloading",
            JobState::Finished(_) => "finished",
            JobState::Error(_) => "error",
        }
    }

    /// Position in the `none → waiting → uploading → downloading → terminal` order.
    pub fn order_value(&self) -> u8 {
        match self {
            JobState::None => 0,
            JobState::Waiting => 1,
            JobState::Uploading(_) => 2,
            JobState::Downloading(_) => 3,
            JobState::Finished(_) | JobState::Error(_) => 4,
        }
    }
}

impl PartialEq for JobState {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JobState::None, JobState::None) | (JobState::Waiting, JobState::Waiting) => true,
            (JobState::Uploading(a), JobState::Uploading(b))
            | (JobState::Downloading(a), JobState::Downloading(b)) => a == b,
            (JobState::Finished(a), JobState::Finished(b)) => a == b,
            (JobState::Error(a), JobState::Error(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Uploading(p) | JobState::Downloading(p) => {
                write!(f, "{} {:.0}%", self.label(), p * 100.0)
            }
            JobState::Error(err) => write!(f, "error: {}", err),
            _ => write!(f, "{}", self.label()),
        }
    }
}

/// One submitted image, identified by its canonical source path.
#[derive(Debug, Clone)]
pub struct ImageJob {
    source_path: PathBuf,
    original_size: u64,
    optimized_size: Option<u64>,
    state: JobState,
    final_path: Option<PathBuf>,
}

pub type JobHandle = Arc<Mutex<ImageJob>>;

impl ImageJob {
    /// Canonicalises `path` and captures its current size.
    pub fn new(path: &Path) -> Result<Self> {
        let source_path = path
            .canonicalize()
            .map_err(|_| CompressionError::SourceMissing(path.to_path_buf()))?;
        let original_size = fs::metadata(&source_path)?.len();
        Ok(Self::with_size(source_path, original_size))
    }

    pub fn with_size(source_path: PathBuf, original_size: u64) -> Self {
        Self {
            source_path,
            original_size,
            optimized_size: None,
            state: JobState::None,
            final_path: None,
        }
    }

    pub fn into_handle(self) -> JobHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn original_size(&self) -> u64 {
        self.original_size
    }

    pub fn optimized_size(&self) -> Option<u64> {
        self.optimized_size
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn final_path(&self) -> Option<&Path> {
        self.final_path.as_deref()
    }

    pub fn same_source(&self, other: &ImageJob) -> bool {
        self.source_path == other.source_path
    }

    /// Jobs that were never run or whose last run failed.
    pub fn needs_processing(&self) -> bool {
        matches!(self.state, JobState::None | JobState::Error(_))
    }

    /// Fraction of the original size removed, once finished.
    pub fn savings_ratio(&self) -> Option<f64> {
        let optimized = self.optimized_size?;
        if self.original_size == 0 {
            return Some(0.0);
        }
        Some((self.original_size as f64 - optimized as f64) / self.original_size as f64)
    }

    /// Clears the results of a previous run so the job can be submitted again.
    pub fn reset(&mut self) {
        self.state = JobState::None;
        self.optimized_size = None;
        self.final_path = None;
    }

    /// Records a non-terminal pipeline state.
    pub(crate) fn advance(&mut self, state: JobState) {
        debug_assert!(!state.is_terminal());
        self.state = state;
    }

    pub(crate) fn complete(&mut self, final_path: PathBuf, optimized_size: u64) {
        self.optimized_size = Some(optimized_size);
        self.final_path = Some(final_path.clone());
        self.state = JobState::Finished(final_path);
    }

    pub(crate) fn fail(&mut self, err: Arc<CompressionError>) {
        self.optimized_size = None;
        self.final_path = None;
        self.state = JobState::Error(err);
    }
}
