//! Text recognition boundary
//!
//! The queue worker treats text recognition as an external capability: a
//! function from a raster region to a set of recognized lines, with
//! coordinates in that region's own pixel space (origin at the region's
//! top-left corner). This module defines that boundary as the
//! [`TextRecognizer`] trait and provides the production implementation on
//! top of Tesseract 5.x via leptess.
//!
//! # Example
//! ```no_run
//! use menu_ocr_recognition::{RecognizerConfig, TesseractRecognizer, TextRecognizer};
//! use image::RgbImage;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let recognizer = TesseractRecognizer::new(RecognizerConfig::default())?;
//! let img = RgbImage::new(640, 480);
//! for line in recognizer.recognize(&img)? {
//!     println!("{} ({:?})", line.text, line.confidence);
//! }
//! # Ok(())
//! # }
//! ```

use image::RgbImage;
use leptess::{LepTess, Variable};
use menu_ocr_common::{quad_from_rect, RecognizedLine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during text recognition
#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("Failed to initialize Tesseract: {0}")]
    Init(String),

    #[error("Failed to run recognition: {0}")]
    Recognition(String),

    #[error("Invalid region dimensions: {0}")]
    InvalidRegion(String),
}

/// Configuration for the Tesseract recognizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// Tesseract language codes (e.g., "eng", "eng+fra")
    pub language: String,
    /// Minimum confidence threshold (0-100); 0 keeps every line
    pub min_confidence: i32,
    /// Page segmentation mode (see Tesseract PSM)
    pub page_segmentation_mode: u32,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            min_confidence: 0,
            page_segmentation_mode: 3, // PSM_AUTO (fully automatic)
        }
    }
}

/// The external recognition capability.
///
/// Implementations return an unordered collection of recognized lines with
/// pixel coordinates local to the region they were handed. No retry is
/// expected inside an implementation; recovery happens at the worker level
/// through task reclaim.
pub trait TextRecognizer: Send + Sync {
    /// Recognize text in one raster region.
    fn recognize(&self, region: &RgbImage) -> Result<Vec<RecognizedLine>, RecognitionError>;
}

/// Tesseract-backed recognizer
///
/// Holds only immutable configuration, so one instance can be constructed
/// at process start and shared read-only across the worker's iterations.
pub struct TesseractRecognizer {
    config: RecognizerConfig,
}

impl TesseractRecognizer {
    /// Create a new recognizer, verifying Tesseract can initialize with the
    /// configured language.
    pub fn new(config: RecognizerConfig) -> Result<Self, RecognitionError> {
        let _test_init = LepTess::new(None, &config.language).map_err(|e| {
            RecognitionError::Init(format!(
                "Failed to initialize Tesseract with language '{}': {}. \
                 Make sure language data is installed (e.g., 'apt install tesseract-ocr-eng')",
                config.language, e
            ))
        })?;

        Ok(Self { config })
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, region: &RgbImage) -> Result<Vec<RecognizedLine>, RecognitionError> {
        let (width, height) = region.dimensions();

        if width == 0 || height == 0 {
            return Err(RecognitionError::InvalidRegion(format!(
                "Region dimensions must be non-zero (got {}x{})",
                width, height
            )));
        }

        // LepTess is not Sync, so each call gets its own instance
        let mut lt = LepTess::new(None, &self.config.language)
            .map_err(|e| RecognitionError::Init(format!("Failed to initialize Tesseract: {}", e)))?;

        lt.set_variable(
            Variable::TesseditPagesegMode,
            &self.config.page_segmentation_mode.to_string(),
        )
        .map_err(|e| RecognitionError::Init(format!("Failed to set PSM: {}", e)))?;

        // Encode to PNG in memory (leptess expects encoded image data)
        let mut png_buf = std::io::Cursor::new(Vec::new());
        region
            .write_to(&mut png_buf, image::ImageFormat::Png)
            .map_err(|e| {
                RecognitionError::Recognition(format!("Failed to encode region to PNG: {}", e))
            })?;

        lt.set_image_from_mem(png_buf.get_ref()).map_err(|e| {
            RecognitionError::Recognition(format!("Failed to set image from memory: {}", e))
        })?;

        // Line-level boxes; None means no text was found (e.g., blank region)
        let boxes = match lt.get_component_boxes(leptess::capi::TessPageIteratorLevel_RIL_TEXTLINE, true)
        {
            Some(boxes) => boxes,
            None => return Ok(Vec::new()),
        };

        let mut lines = Vec::new();

        for bbox in &boxes {
            let geom = bbox.get_geometry();

            lt.set_rectangle(geom.x, geom.y, geom.w, geom.h);

            let text = lt.get_utf8_text().unwrap_or_default().trim().to_string();
            if text.is_empty() {
                continue;
            }

            // mean_text_conf is 0-100
            let confidence = lt.mean_text_conf();
            if confidence < self.config.min_confidence {
                continue;
            }

            debug!(
                "recognized '{}' at ({}, {}) {}x{} conf {}%",
                text, geom.x, geom.y, geom.w, geom.h, confidence
            );

            lines.push(RecognizedLine {
                text,
                confidence: Some(confidence as f32 / 100.0),
                coordinates: quad_from_rect(
                    geom.x as f32,
                    geom.y as f32,
                    geom.w as f32,
                    geom.h as f32,
                ),
            });
        }

        Ok(lines)
    }
}
