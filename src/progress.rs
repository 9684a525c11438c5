//! Terminal rendering of per-image progress for the CLI.

use crate::batch::JobObserver;
use crate::constants::PROGRESS_BAR_TEMPLATE;
use crate::job::{ImageJob, JobHandle, JobState};
use crate::utils::format_file_size;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

// Upload fills the first half of a bar, download the second.
const PHASE_LENGTH: u64 = 100;

pub struct BatchProgress {
    _multi: MultiProgress,
    bars: HashMap<PathBuf, ProgressBar>,
}

impl BatchProgress {
    pub fn new(jobs: &[JobHandle], hidden: bool) -> Arc<Self> {
        let multi = if hidden {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        let style = ProgressStyle::with_template(PROGRESS_BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        let bars = jobs
            .iter()
            .map(|job| {
                let job = job.lock();
                let bar = multi.add(ProgressBar::new(PHASE_LENGTH * 2));
                bar.set_style(style.clone());
                bar.set_prefix(JobState::None.label());
                bar.set_message(job.file_name());
                (job.source_path().to_path_buf(), bar)
            })
            .collect();

        Arc::new(Self { _multi: multi, bars })
    }

    pub fn observer(self: &Arc<Self>) -> JobObserver {
        let this = Arc::clone(self);
        Arc::new(move |job: &ImageJob| this.update(job))
    }

    fn update(&self, job: &ImageJob) {
        let Some(bar) = self.bars.get(job.source_path()) else {
            return;
        };

        let state = job.state();
        bar.set_prefix(state.label());
        match state {
            JobState::None | JobState::Waiting => bar.set_position(0),
            JobState::Uploading(p) => bar.set_position((p * PHASE_LENGTH as f64) as u64),
            JobState::Downloading(p) => {
                bar.set_position(PHASE_LENGTH + (p * PHASE_LENGTH as f64) as u64)
            }
            JobState::Finished(_) => {
                let optimized = job.optimized_size().unwrap_or_default();
                let saved = job.savings_ratio().unwrap_or_default() * 100.0;
                bar.finish_with_message(format!(
                    "{} {} -> {} (-{:.1}%)",
                    job.file_name(),
                    format_file_size(job.original_size()),
                    format_file_size(optimized),
                    saved
                ));
            }
            JobState::Error(err) => {
                bar.abandon_with_message(format!("{}: {}", job.file_name(), err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_tracks_job_states() {
        let mut job = ImageJob::with_size(PathBuf::from("/img/a.png"), 2048);
        let handle = job.clone().into_handle();
        let progress = BatchProgress::new(&[handle], true);
        let observer = progress.observer();
        let bar = progress.bars.get(&PathBuf::from("/img/a.png")).unwrap().clone();

        job.advance(JobState::Uploading(0.5));
        observer(&job);
        assert_eq!(bar.position(), 50);

        job.advance(JobState::Downloading(0.25));
        observer(&job);
        assert_eq!(bar.position(), 125);

        job.complete(PathBuf::from("/img/a.png"), 1024);
        observer(&job);
        assert!(bar.is_finished());
    }

    #[test]
    fn test_unknown_job_is_ignored() {
        let progress = BatchProgress::new(&[], true);
        let job = ImageJob::with_size(PathBuf::from("/img/other.png"), 1);
        progress.observer()(&job);
    }
}
