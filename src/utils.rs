//! Utility functions for common operations
//!
//! Local enumeration of submitted images and the number formatting shared
//! by the batch summary and the progress display.

use crate::constants::SUPPORTED_IMAGE_EXTENSIONS;
use crate::error::{CompressionError, Result};
use glob::glob;
use image::ImageFormat;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Check if a file path has a supported image extension
///
/// # Arguments
/// * `path` - The file path to check
///
/// # Returns
/// * `true` if the extension is png, jpg/jpeg or webp (any case), `false` otherwise
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext_lower = ext.to_lowercase();
            SUPPORTED_IMAGE_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Sniff the leading bytes of a file for a format the API accepts
///
/// # Returns
/// * `Some(format)` for PNG, JPEG and WebP content, `None` otherwise or on read errors
pub fn detect_image_format(path: &Path) -> Option<ImageFormat> {
    let mut header = [0u8; 16];
    let mut file = File::open(path).ok()?;
    let read = file.read(&mut header).ok()?;
    match image::guess_format(&header[..read]).ok()? {
        format @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP) => Some(format),
        _ => None,
    }
}

fn is_supported_image(path: &Path) -> bool {
    path.is_file() && (is_image_file(path) || detect_image_format(path).is_some())
}

/// Collect supported images from files, directories or glob patterns
///
/// Results are canonical paths, sorted and without duplicates, so the same
/// image dropped twice becomes one job.
pub fn collect_image_files(inputs: &[String], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut image_files = Vec::new();

    for input in inputs {
        let input_path = Path::new(input);

        if input_path.is_file() {
            if is_supported_image(input_path) {
                image_files.push(canonical(input_path)?);
            } else {
                tracing::warn!(path = %input_path.display(), "skipping unsupported file");
            }
        } else if input_path.is_dir() {
            let walker = if recursive {
                WalkDir::new(input_path).into_iter()
            } else {
                WalkDir::new(input_path).max_depth(1).into_iter()
            };

            for entry in walker.filter_entry(|e| {
                e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.')
            }) {
                let entry = entry?;
                if is_supported_image(entry.path()) {
                    image_files.push(canonical(entry.path())?);
                }
            }
        } else if let Ok(glob_pattern) = glob(input) {
            for entry in glob_pattern.flatten() {
                if is_supported_image(&entry) {
                    image_files.push(canonical(&entry)?);
                }
            }
        } else {
            return Err(CompressionError::NoImageFilesFound(input.to_string()));
        }
    }

    image_files.sort();
    image_files.dedup();
    Ok(image_files)
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .map_err(|_| CompressionError::SourceMissing(path.to_path_buf()))
}

/// Format file size in human-readable format
///
/// # Arguments
/// * `bytes` - Size in bytes
///
/// # Returns
/// * Human-readable size string (e.g., "1.2 MB", "512 B")
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Calculate compression ratio as a percentage
///
/// # Returns
/// * Percentage saved (positive means reduction, negative means increase)
pub fn calculate_compression_ratio(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    ((original_size as f64 - compressed_size as f64) / original_size as f64) * 100.0
}
