#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use img_tinify::{CompressionError, CompressionService, ProgressFn, QuotaTracker, Redirect, Result};
use reqwest::Url;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Notify;

/// Scripted stand-in for the compression API.
///
/// Uploads report `upload_ticks`, downloads report `download_ticks` and write
/// `payload` into a temp file. Files whose name matches `stall_download` block
/// in download until the run is cancelled.
pub struct FakeService {
    pub uploads: AtomicUsize,
    pub downloads: AtomicUsize,
    pub upload_ticks: Vec<f64>,
    pub download_ticks: Vec<f64>,
    pub payload: Vec<u8>,
    pub fail_upload_for: Option<String>,
    pub stall_download: Option<String>,
    pub download_started: Arc<Notify>,
    pub quota: Arc<QuotaTracker>,
    pub produced: Mutex<Vec<PathBuf>>,
    next_count: AtomicU64,
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            uploads: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
            upload_ticks: vec![0.25, 0.5, 1.0],
            download_ticks: vec![0.5, 1.0],
            payload: b"optimized".to_vec(),
            fail_upload_for: None,
            stall_download: None,
            download_started: Arc::new(Notify::new()),
            quota: Arc::new(QuotaTracker::new()),
            produced: Mutex::new(Vec::new()),
            next_count: AtomicU64::new(1),
        }
    }

    pub fn with_ticks(mut self, upload: Vec<f64>, download: Vec<f64>) -> Self {
        self.upload_ticks = upload;
        self.download_ticks = download;
        self
    }

    pub fn failing_upload_for(mut self, name: &str) -> Self {
        self.fail_upload_for = Some(name.to_string());
        self
    }

    pub fn stalling_download_for(mut self, name: &str) -> Self {
        self.stall_download = Some(name.to_string());
        self
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompressionService for FakeService {
    async fn upload(&self, source: &Path, on_progress: ProgressFn) -> Result<Redirect> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        for tick in &self.upload_ticks {
            on_progress(*tick);
            tokio::task::yield_now().await;
        }

        if self.fail_upload_for.as_deref() == Some(name.as_str()) {
            return Err(CompressionError::Api {
                status: 415,
                error: "BadSignature".to_string(),
                message: "Does not appear to be a PNG or JPEG file".to_string(),
            });
        }

        let count = self.next_count.fetch_add(1, Ordering::SeqCst);
        self.quota.record(count);
        Ok(Redirect {
            location: Url::parse(&format!("https://api.tinify.com/output/{}", name)).unwrap(),
            compression_count: Some(count),
        })
    }

    async fn download(&self, redirect: &Redirect, on_progress: ProgressFn) -> Result<tempfile::TempPath> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let name = redirect
            .location
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string();

        let mut temp = tempfile::NamedTempFile::new()?;
        temp.write_all(&self.payload)?;
        let temp_path = temp.into_temp_path();
        self.produced.lock().push(temp_path.to_path_buf());

        if self.stall_download.as_deref() == Some(name.as_str()) {
            on_progress(0.1);
            self.download_started.notify_one();
            std::future::pending::<()>().await;
        }

        for tick in &self.download_ticks {
            on_progress(*tick);
            tokio::task::yield_now().await;
        }
        Ok(temp_path)
    }
}

pub fn create_temp_directory() -> TempDir {
    TempDir::new().unwrap()
}

pub fn create_image(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    File::create(&path).unwrap().write_all(contents).unwrap();
    path
}

pub fn create_test_image_files(dir: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| create_image(dir, &format!("image{}.png", i), b"original image data"))
        .collect()
}

pub fn create_test_output_directory(temp_dir: &Path) -> PathBuf {
    let output_dir = temp_dir.join("output");
    std::fs::create_dir(&output_dir).unwrap();
    output_dir
}
