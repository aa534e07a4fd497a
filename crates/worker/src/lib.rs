//! Menu OCR queue worker
//!
//! Drives the claim → read → recognize → assemble → finalize cycle against
//! the shared job table, forever. The loop has two stable states, idle and
//! processing, and no terminal state; only the hosting supervisor ever
//! stops the process.
//!
//! Two error tiers keep it alive:
//! - task-level failures (unreadable image, recognition error) are
//!   persisted onto the task as a failed status and the loop moves on;
//! - loop-level failures (claim or finalize against the database) are
//!   logged and retried after a longer backoff.

pub mod config;

pub use config::WorkerConfig;

use image::imageops;
use menu_ocr_common::{RecognizedLine, TaskError};
use menu_ocr_queue::{QueueResult, TaskQueue};
use menu_ocr_recognition::TextRecognizer;
use menu_ocr_tiling::{assemble, compute_segments, needs_segmentation, BandOutput, Segment};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The worker loop
pub struct Worker {
    config: WorkerConfig,
    recognizer: Arc<dyn TextRecognizer>,
}

impl Worker {
    /// Create a worker around an already-initialized recognizer.
    ///
    /// The recognizer is constructed once at process start and shared
    /// read-only across iterations; it holds no per-task state.
    pub fn new(mut config: WorkerConfig, recognizer: Arc<dyn TextRecognizer>) -> Self {
        if config.segment_overlap >= config.segment_height {
            warn!(
                "segment overlap {} >= segment height {}, clamping",
                config.segment_overlap, config.segment_height
            );
            config.segment_overlap = config.segment_height / 2;
        }

        Self { config, recognizer }
    }

    /// Run the claim loop until the process is killed.
    pub async fn run(&self) {
        info!(
            "starting queue processing (shared root: {})",
            self.config.shared_root.display()
        );

        loop {
            match self.run_iteration().await {
                Ok(()) => tokio::time::sleep(self.config.idle_wait).await,
                Err(e) => {
                    tracing::error!("error in main loop: {}", e);
                    tokio::time::sleep(self.config.error_backoff).await;
                }
            }
        }
    }

    /// One loop iteration: a fresh scope-bound storage session, at most one
    /// task. The session drops on every exit path, including errors.
    async fn run_iteration(&self) -> QueueResult<()> {
        let queue = TaskQueue::connect(&self.config.queue).await?;

        let Some(task) = queue.claim_next(self.config.stale_timeout).await? else {
            debug!("no eligible task");
            return Ok(());
        };

        info!("processing task {} for file {}", task.id, task.file_path);

        match self.process_task(&task.file_path).await {
            Ok(lines) => {
                queue.complete(task.id, &lines).await?;
                info!("successfully processed task {}", task.id);
            }
            Err(e) => {
                warn!("failed to process task {}: {}", task.id, e);
                queue.fail(task.id, &e.to_string()).await?;
            }
        }

        Ok(())
    }

    /// Read, segment, recognize, and assemble one task's image.
    ///
    /// Image decode and recognition are CPU-bound, so the whole task body
    /// runs on the blocking pool.
    pub async fn process_task(&self, file_path: &str) -> Result<Vec<RecognizedLine>, TaskError> {
        let full_path = self.config.shared_root.join(file_path);
        let recognizer = Arc::clone(&self.recognizer);
        let segment_height = self.config.segment_height;
        let overlap = self.config.segment_overlap;

        tokio::task::spawn_blocking(move || {
            recognize_file(&full_path, recognizer.as_ref(), segment_height, overlap)
        })
        .await
        .map_err(|e| TaskError::Recognition(format!("task join error: {e}")))?
    }
}

fn recognize_file(
    path: &Path,
    recognizer: &dyn TextRecognizer,
    segment_height: u32,
    overlap: u32,
) -> Result<Vec<RecognizedLine>, TaskError> {
    let img = image::open(path)
        .map_err(|e| TaskError::image_read(path.display().to_string(), &e))?
        .to_rgb8();
    let (width, height) = img.dimensions();

    let bands = if needs_segmentation(height, segment_height) {
        let segments = compute_segments(height, segment_height, overlap);
        info!(
            "image {}x{} split into {} bands",
            width,
            height,
            segments.len()
        );

        let mut outputs = Vec::with_capacity(segments.len());
        for segment in segments {
            let band = imageops::crop_imm(&img, 0, segment.start_y, width, segment.height())
                .to_image();
            let lines = recognizer
                .recognize(&band)
                .map_err(|e| TaskError::Recognition(e.to_string()))?;
            debug!("band {}: {} lines", segment.index, lines.len());
            outputs.push(BandOutput { segment, lines });
        }
        outputs
    } else {
        let lines = recognizer
            .recognize(&img)
            .map_err(|e| TaskError::Recognition(e.to_string()))?;
        vec![BandOutput {
            segment: Segment::whole_image(height),
            lines,
        }]
    };

    Ok(assemble(bands))
}
