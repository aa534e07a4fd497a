//! Worker configuration from the environment
//!
//! The worker takes no CLI flags; everything comes from environment
//! variables the way the surrounding deployment passes them in.

use menu_ocr_queue::QueueConfig;
use menu_ocr_recognition::RecognizerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

/// Worker process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Root directory task file paths are resolved under
    pub shared_root: PathBuf,

    /// Band height for oversized images, in pixels
    pub segment_height: u32,

    /// Vertical overlap between consecutive bands, in pixels
    pub segment_overlap: u32,

    /// Age after which another worker may reclaim a processing task
    pub stale_timeout: Duration,

    /// Wait between loop iterations when the queue is drained
    pub idle_wait: Duration,

    /// Wait after a loop-level storage error before retrying
    pub error_backoff: Duration,

    /// Job table connection settings
    pub queue: QueueConfig,

    /// Recognition engine settings
    pub recognizer: RecognizerConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let mut recognizer = RecognizerConfig::default();
        if let Ok(language) = std::env::var("OCR_LANGUAGE") {
            recognizer.language = language;
        }

        Self {
            shared_root: std::env::var("OCR_SHARED_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/app/shared")),
            segment_height: env_u32("OCR_SEGMENT_HEIGHT", 1024),
            segment_overlap: env_u32("OCR_SEGMENT_OVERLAP", 200),
            stale_timeout: env_secs("OCR_STALE_TIMEOUT_SECS", 300),
            idle_wait: env_secs("OCR_IDLE_WAIT_SECS", 1),
            error_backoff: env_secs("OCR_ERROR_BACKOFF_SECS", 5),
            queue: QueueConfig::default(),
            recognizer,
        }
    }
}
