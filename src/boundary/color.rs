//! Color-uniformity analyzer.

use image::RgbImage;

use super::BandPosition;
use crate::config::ColorUniformityConfig;

/// Channel-averaged mean and standard deviation of one row.
#[allow(clippy::cast_possible_truncation)]
fn row_stats(region: &RgbImage, y: u32) -> (f32, f32) {
    let n = f64::from(region.width());
    let mut sum = [0.0_f64; 3];
    let mut sq = [0.0_f64; 3];
    for x in 0..region.width() {
        let px = region.get_pixel(x, y);
        for ((s, q), &v) in sum.iter_mut().zip(sq.iter_mut()).zip(px.0.iter()) {
            let v = f64::from(v);
            *s += v;
            *q += v * v;
        }
    }

    let (mean, stddev) = sum
        .iter()
        .zip(&sq)
        .fold((0.0_f64, 0.0_f64), |(mean, stddev), (s, q)| {
            let m = s / n;
            (mean + m, stddev + (q / n - m * m).max(0.0).sqrt())
        });
    ((mean / 3.0) as f32, (stddev / 3.0) as f32)
}

/// Offset of the first row that is neither watermark background nor light.
///
/// A row is background when it is both uniform and nearly white. The scan
/// stops at the first non-background row whose brightness drops below
/// `max_content_brightness`, which is where panel artwork starts. Reports 0
/// when no such row exists.
#[must_use]
pub fn color_boundary(
    region: &RgbImage,
    position: BandPosition,
    config: &ColorUniformityConfig,
) -> u32 {
    let (w, h) = region.dimensions();
    if w == 0 || h == 0 {
        return 0;
    }
    position
        .scan_rows(h)
        .find(|&y| {
            let (mean, stddev) = row_stats(region, y);
            let background =
                stddev < config.max_row_stddev && mean > config.min_background_brightness;
            !background && mean < config.max_content_brightness
        })
        .map_or(0, |y| position.offset(y, h))
}
