pub const API_ENDPOINT: &str = "https://api.tinify.com/shrink";
pub const API_USER: &str = "api";
pub const API_KEY_ENV: &str = "TINIFY_API_KEY";

pub const COMPRESSION_COUNT_HEADER: &str = "compression-count";

pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

pub const TEMP_FILE_PREFIX: &str = "img-tinify-";
pub const BACKUP_EXTENSION: &str = "bak";

/// Upper bound for the " (n)" suffix search in directory placement.
pub const MAX_COLLISION_ATTEMPTS: u32 = 10_000;

pub const SETTINGS_DIR_NAME: &str = "img-tinify";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

pub const PROGRESS_BAR_TEMPLATE: &str =
    "{prefix:>12.bold} [{bar:30.cyan/blue}] {percent:>3}% {wide_msg}";

// Common output message prefixes
pub const ORIGINAL_SIZE_PREFIX: &str = "📊 Original size:";
pub const COMPRESSED_SIZE_PREFIX: &str = "📈 Optimized size:";
pub const COMPRESSION_RATIO_PREFIX: &str = "🎯 Saved:";
pub const SUCCESS_PREFIX: &str = "✅";
pub const ERROR_PREFIX: &str = "❌";
pub const INFO_PREFIX: &str = "📋";
