//! Edge-density analyzer.

use image::{imageops, GrayImage};
use imageproc::edges::canny;

use super::BandPosition;
use crate::config::EdgeDensityConfig;

/// Copy of `gray` with its outermost rows and columns repeated once.
///
/// Canny leaves the image border empty; padding keeps the band's first and
/// last rows measurable.
fn pad_replicate(gray: &GrayImage) -> GrayImage {
    let (w, h) = gray.dimensions();
    GrayImage::from_fn(w + 2, h + 2, |x, y| {
        let sx = x.saturating_sub(1).min(w - 1);
        let sy = y.saturating_sub(1).min(h - 1);
        *gray.get_pixel(sx, sy)
    })
}

/// Canny edge map of `gray`, same size as the input.
///
/// `canny` smooths with its own fixed Gaussian (sigma 1.4) first, so the band
/// is passed in unblurred. Thresholds must satisfy `low <= high`, which
/// [`PipelineConfig::validate`](crate::PipelineConfig::validate) enforces.
fn edge_map(gray: &GrayImage, config: &EdgeDensityConfig) -> GrayImage {
    let (w, h) = gray.dimensions();
    let padded = pad_replicate(gray);
    let edges = canny(&padded, config.canny_low, config.canny_high);
    imageops::crop_imm(&edges, 1, 1, w, h).to_image()
}

/// Summed edge intensity of row `y` per pixel of width.
#[allow(clippy::cast_precision_loss)]
fn row_density(edges: &GrayImage, y: u32) -> f32 {
    let sum: u64 = (0..edges.width())
        .map(|x| u64::from(edges.get_pixel(x, y)[0]))
        .sum();
    sum as f32 / edges.width() as f32
}

/// Offset of the first nearly edge-free row, scanning from the outer edge.
///
/// Dense watermark texture gives way to blank space at the boundary. Reports 0
/// when every row is busy.
#[must_use]
pub fn edge_boundary(gray: &GrayImage, position: BandPosition, config: &EdgeDensityConfig) -> u32 {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return 0;
    }
    let edges = edge_map(gray, config);
    position
        .scan_rows(h)
        .find(|&y| row_density(&edges, y) < config.max_row_density)
        .map_or(0, |y| position.offset(y, h))
}
