pub mod batch;
pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod job;
pub mod logger;
pub mod pipeline;
pub mod placement;
pub mod progress;
pub mod quota;
pub mod utils;

pub use batch::{BatchRunner, BatchSummary, JobObserver};
pub use client::{CompressionService, ProgressFn, Redirect, TinifyClient};
pub use config::{Settings, SettingsStore};
pub use error::{CompressionError, Result};
pub use job::{ImageJob, JobHandle, JobState};
pub use pipeline::{ImagePipeline, JobEvents};
pub use placement::{place, PlacementPolicy};
pub use quota::QuotaTracker;
pub use utils::{collect_image_files, format_file_size, is_image_file};
