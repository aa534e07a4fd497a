/// Common types for the menu OCR queue worker
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A quadrilateral in pixel space: four `[x, y]` corners ordered
/// top-left, top-right, bottom-right, bottom-left.
pub type Quad = [[f32; 2]; 4];

/// Build an axis-aligned quadrilateral from a rectangle.
#[must_use]
pub fn quad_from_rect(x: f32, y: f32, width: f32, height: f32) -> Quad {
    [
        [x, y],
        [x + width, y],
        [x + width, y + height],
        [x, y + height],
    ]
}

/// A single recognized line of text with its position in the image.
///
/// Coordinates are pixel positions in the coordinate space of whatever
/// image the recognizer was handed. After assembly they are always in the
/// space of the original, un-segmented image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedLine {
    /// Recognized text content
    pub text: String,
    /// Recognition confidence (0.0-1.0), when the engine reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Quadrilateral around the line, pixel coordinates
    pub coordinates: Quad,
}

impl RecognizedLine {
    /// Smallest y among the four corners (the top edge of the line).
    #[must_use]
    pub fn min_y(&self) -> f32 {
        self.coordinates
            .iter()
            .map(|p| p[1])
            .fold(f32::INFINITY, f32::min)
    }

    /// Smallest x among the four corners.
    #[must_use]
    pub fn min_x(&self) -> f32 {
        self.coordinates
            .iter()
            .map(|p| p[0])
            .fold(f32::INFINITY, f32::min)
    }

    /// Shift the line vertically by `dy` pixels. Horizontal positions are
    /// untouched.
    pub fn translate_y(&mut self, dy: f32) {
        for point in &mut self.coordinates {
            point[1] += dy;
        }
    }
}

/// Task-level processing errors
///
/// These never escape the per-task handling block: the worker converts
/// them into a persisted failed status and keeps running.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("failed to read image '{path}': {reason}")]
    ImageRead { path: String, reason: String },

    #[error("text recognition failed: {0}")]
    Recognition(String),
}

impl TaskError {
    /// Wrap an image decode failure for `path`.
    pub fn image_read(path: impl Into<String>, err: &image::ImageError) -> Self {
        TaskError::ImageRead {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str, quad: Quad) -> RecognizedLine {
        RecognizedLine {
            text: text.to_string(),
            confidence: Some(0.9),
            coordinates: quad,
        }
    }

    #[test]
    fn test_quad_from_rect() {
        let quad = quad_from_rect(10.0, 20.0, 100.0, 30.0);
        assert_eq!(quad[0], [10.0, 20.0]);
        assert_eq!(quad[1], [110.0, 20.0]);
        assert_eq!(quad[2], [110.0, 50.0]);
        assert_eq!(quad[3], [10.0, 50.0]);
    }

    #[test]
    fn test_min_coordinates() {
        let l = line("x", [[30.0, 12.0], [90.0, 14.0], [91.0, 40.0], [29.0, 38.0]]);
        assert_eq!(l.min_y(), 12.0);
        assert_eq!(l.min_x(), 29.0);
    }

    #[test]
    fn test_translate_y() {
        let mut l = line("x", quad_from_rect(5.0, 50.0, 20.0, 10.0));
        l.translate_y(800.0);
        assert_eq!(l.min_y(), 850.0);
        assert_eq!(l.min_x(), 5.0);
        assert_eq!(l.coordinates[2], [25.0, 860.0]);
    }

    #[test]
    fn test_serialization_with_confidence() {
        let l = line("Margherita", quad_from_rect(0.0, 0.0, 10.0, 10.0));
        let json = serde_json::to_value(&l).expect("serialize");
        assert_eq!(json["text"], "Margherita");
        assert!((json["confidence"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert_eq!(json["coordinates"][2][0], 10.0);
    }

    #[test]
    fn test_serialization_omits_missing_confidence() {
        let l = RecognizedLine {
            text: "Caprese".to_string(),
            confidence: None,
            coordinates: quad_from_rect(0.0, 0.0, 10.0, 10.0),
        };
        let json = serde_json::to_value(&l).expect("serialize");
        assert!(json.get("confidence").is_none());

        let back: RecognizedLine = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, l);
    }
}
