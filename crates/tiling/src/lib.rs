//! Band tiling for oversized images
//!
//! Very tall images (think photographed multi-page menus) overflow what the
//! recognition engine handles well in one pass. This module splits such an
//! image into overlapping horizontal bands and stitches the per-band
//! recognition output back into one document in original-image coordinates.
//!
//! # Example
//! ```
//! use menu_ocr_tiling::{compute_segments, needs_segmentation};
//!
//! assert!(needs_segmentation(3000, 1024));
//! let segments = compute_segments(3000, 1024, 200);
//! assert_eq!(segments.len(), 4);
//! assert_eq!(segments.last().unwrap().end_y, 3000);
//! ```

use menu_ocr_common::RecognizedLine;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A horizontal band of the source image: the half-open pixel range
/// `[start_y, end_y)`. Consecutive bands overlap by the configured amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Position of the band in top-to-bottom order
    pub index: usize,
    /// First row of the band (inclusive)
    pub start_y: u32,
    /// One past the last row of the band
    pub end_y: u32,
}

impl Segment {
    /// Band height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.end_y - self.start_y
    }

    /// A single band spanning the whole image, for the unsegmented path.
    #[must_use]
    pub fn whole_image(height: u32) -> Self {
        Segment {
            index: 0,
            start_y: 0,
            end_y: height,
        }
    }
}

/// Recognition output for one band, still in band-local coordinates.
#[derive(Debug, Clone)]
pub struct BandOutput {
    pub segment: Segment,
    pub lines: Vec<RecognizedLine>,
}

/// Whether an image is tall enough to be recognized in bands.
///
/// Images at or below twice the band height go through the recognizer in
/// one piece.
#[must_use]
pub fn needs_segmentation(height: u32, segment_height: u32) -> bool {
    height > 2 * segment_height
}

/// Compute the overlapping bands covering `[0, height)`.
///
/// Band `i` starts at `i * (segment_height - overlap)` and runs for
/// `segment_height` rows, clamped to the image. The final band is shifted
/// up so that it still spans a full `segment_height` ending exactly at the
/// bottom edge; it may therefore overlap its predecessor by more than
/// `overlap`.
///
/// Callers must ensure `0 < overlap < segment_height < height`.
#[must_use]
pub fn compute_segments(height: u32, segment_height: u32, overlap: u32) -> Vec<Segment> {
    debug_assert!(overlap > 0 && overlap < segment_height && segment_height < height);

    let step = segment_height - overlap;
    let count = (height - overlap).div_ceil(step);

    let mut segments = Vec::with_capacity(count as usize);
    for index in 0..count {
        let mut start_y = index * step;
        let end_y = (start_y + segment_height).min(height);
        if index == count - 1 {
            // Full-height final band, anchored to the bottom edge
            start_y = end_y.saturating_sub(segment_height);
        }
        segments.push(Segment {
            index: index as usize,
            start_y,
            end_y,
        });
    }

    debug!(
        height,
        segment_height,
        overlap,
        bands = segments.len(),
        "computed image bands"
    );

    segments
}

/// Merge per-band recognition output into one globally ordered document.
///
/// Every line's vertical coordinates are translated by its band's
/// `start_y`, moving them into original-image space; horizontal
/// coordinates are untouched since bands only ever split the vertical
/// axis. The merged lines are ordered by the top edge of each line
/// (minimum y), with ties broken by band index and then by minimum x.
///
/// A physical line falling inside the overlap strip between two adjacent
/// bands is emitted once per band, at nearly identical positions. Callers
/// get duplicates, not a deduplicated set.
#[must_use]
pub fn assemble(bands: Vec<BandOutput>) -> Vec<RecognizedLine> {
    let mut keyed: Vec<(f32, usize, f32, RecognizedLine)> = Vec::new();

    for band in bands {
        let dy = band.segment.start_y as f32;
        for mut line in band.lines {
            line.translate_y(dy);
            keyed.push((line.min_y(), band.segment.index, line.min_x(), line));
        }
    }

    keyed.sort_by(|a, b| {
        a.0.total_cmp(&b.0)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.total_cmp(&b.2))
    });

    keyed.into_iter().map(|(_, _, _, line)| line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use menu_ocr_common::quad_from_rect;

    fn line_at(text: &str, x: f32, y: f32) -> RecognizedLine {
        RecognizedLine {
            text: text.to_string(),
            confidence: Some(0.8),
            coordinates: quad_from_rect(x, y, 100.0, 20.0),
        }
    }

    fn assert_covering(height: u32, segment_height: u32, overlap: u32) {
        let segments = compute_segments(height, segment_height, overlap);
        assert!(!segments.is_empty());
        assert_eq!(segments[0].start_y, 0);
        assert_eq!(segments.last().unwrap().end_y, height);

        for (i, seg) in segments.iter().enumerate() {
            assert_eq!(seg.index, i);
            assert!(seg.height() <= segment_height, "band taller than limit");
            if i + 1 < segments.len() {
                let next = &segments[i + 1];
                assert!(next.start_y < seg.end_y, "gap between bands {i} and {}", i + 1);
            }
            if i > 0 && i + 1 < segments.len() {
                // Interior bands overlap their predecessor by exactly `overlap`
                assert_eq!(segments[i - 1].end_y - seg.start_y, overlap);
            }
        }

        // The shifted final band may overlap by more, never less
        if segments.len() >= 2 {
            let last = segments.last().unwrap();
            let prev = &segments[segments.len() - 2];
            assert!(prev.end_y - last.start_y >= overlap);
        }
    }

    #[test]
    fn test_band_coverage_various_shapes() {
        assert_covering(3000, 1024, 200);
        assert_covering(2100, 1024, 200);
        assert_covering(2049, 1024, 200);
        assert_covering(10_000, 1024, 200);
        assert_covering(5000, 800, 100);
        assert_covering(901, 300, 50);
    }

    #[test]
    fn test_reference_band_layout() {
        // H=3000, S=1024, O=200: 4 bands, last ending exactly at the bottom
        let segments = compute_segments(3000, 1024, 200);
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0], Segment { index: 0, start_y: 0, end_y: 1024 });
        assert_eq!(segments[1], Segment { index: 1, start_y: 824, end_y: 1848 });
        assert_eq!(segments[2], Segment { index: 2, start_y: 1648, end_y: 2672 });
        assert_eq!(segments[3], Segment { index: 3, start_y: 1976, end_y: 3000 });
        assert_eq!(segments[3].height(), 1024);
    }

    #[test]
    fn test_final_band_never_starts_negative() {
        // Tall enough to segment, short enough that the shift clamps at 0
        let segments = compute_segments(2100, 1024, 200);
        assert!(segments.last().unwrap().start_y < segments.last().unwrap().end_y);
        for seg in &segments {
            assert!(seg.end_y <= 2100);
        }
    }

    #[test]
    fn test_needs_segmentation_rule() {
        assert!(!needs_segmentation(1000, 1024));
        assert!(!needs_segmentation(2048, 1024));
        assert!(needs_segmentation(2049, 1024));
        assert!(needs_segmentation(3000, 1024));
    }

    #[test]
    fn test_whole_image_segment() {
        let seg = Segment::whole_image(720);
        assert_eq!(seg.index, 0);
        assert_eq!(seg.start_y, 0);
        assert_eq!(seg.height(), 720);
    }

    #[test]
    fn test_assemble_translates_vertical_only() {
        let segment = Segment { index: 1, start_y: 800, end_y: 1824 };
        let assembled = assemble(vec![BandOutput {
            segment,
            lines: vec![line_at("Bruschetta", 40.0, 50.0)],
        }]);

        assert_eq!(assembled.len(), 1);
        assert_eq!(assembled[0].min_y(), 850.0);
        assert_eq!(assembled[0].min_x(), 40.0);
        assert_eq!(assembled[0].confidence, Some(0.8));
    }

    #[test]
    fn test_assemble_orders_by_top_edge_across_bands() {
        let bands = vec![
            BandOutput {
                segment: Segment { index: 0, start_y: 0, end_y: 1024 },
                lines: vec![line_at("third", 10.0, 900.0), line_at("first", 10.0, 100.0)],
            },
            BandOutput {
                segment: Segment { index: 1, start_y: 824, end_y: 1848 },
                lines: vec![line_at("fourth", 10.0, 200.0), line_at("second", 10.0, 20.0)],
            },
        ];

        let assembled = assemble(bands);
        let texts: Vec<&str> = assembled.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third", "fourth"]);

        let mut last_y = f32::NEG_INFINITY;
        for l in &assembled {
            assert!(l.min_y() >= last_y);
            last_y = l.min_y();
        }
    }

    #[test]
    fn test_assemble_tie_breaks_by_band_then_x() {
        let bands = vec![
            BandOutput {
                segment: Segment { index: 1, start_y: 0, end_y: 100 },
                lines: vec![line_at("later-band", 5.0, 50.0)],
            },
            BandOutput {
                segment: Segment { index: 0, start_y: 0, end_y: 100 },
                lines: vec![
                    line_at("right", 200.0, 50.0),
                    line_at("left", 10.0, 50.0),
                ],
            },
        ];

        let assembled = assemble(bands);
        let texts: Vec<&str> = assembled.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["left", "right", "later-band"]);
    }

    #[test]
    fn test_assemble_preserves_overlap_duplicates() {
        // The same physical line seen by two adjacent bands stays duplicated
        let bands = vec![
            BandOutput {
                segment: Segment { index: 0, start_y: 0, end_y: 1024 },
                lines: vec![line_at("Tiramisu", 12.0, 900.0)],
            },
            BandOutput {
                segment: Segment { index: 1, start_y: 824, end_y: 1848 },
                lines: vec![line_at("Tiramisu", 12.0, 76.0)],
            },
        ];

        let assembled = assemble(bands);
        assert_eq!(assembled.len(), 2);
        assert_eq!(assembled[0].text, "Tiramisu");
        assert_eq!(assembled[1].text, "Tiramisu");
        assert_eq!(assembled[0].min_y(), assembled[1].min_y());
    }

    #[test]
    fn test_assemble_single_band_is_identity() {
        let lines = vec![line_at("a", 0.0, 10.0), line_at("b", 0.0, 40.0)];
        let assembled = assemble(vec![BandOutput {
            segment: Segment::whole_image(500),
            lines: lines.clone(),
        }]);
        assert_eq!(assembled, lines);
    }
}
