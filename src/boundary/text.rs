//! Text-density analyzer.

use image::{GrayImage, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};
use imageproc::region_labelling::{connected_components, Connectivity};

use super::BandPosition;
use crate::config::TextDensityConfig;

/// Inclusive bounding box of a labelled component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl Bounds {
    fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    fn contains(&self, other: &Bounds) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }
}

/// Boxes not enclosed by another box in `boxes`; of identical boxes the first is kept.
///
/// A glyph's counter or text inside a frame labels as its own component
/// but is one region on the page.
fn outermost(boxes: &[Bounds]) -> Vec<Bounds> {
    boxes
        .iter()
        .enumerate()
        .filter(|&(i, b)| {
            !boxes
                .iter()
                .enumerate()
                .any(|(j, o)| j != i && o.contains(b) && (o != b || j < i))
        })
        .map(|(_, b)| *b)
        .collect()
}

/// 3x3 morphological gradient: dilation minus erosion.
fn morphological_gradient(gray: &GrayImage) -> GrayImage {
    let dilated = dilate(gray, Norm::LInf, 1);
    let eroded = erode(gray, Norm::LInf, 1);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([dilated.get_pixel(x, y)[0] - eroded.get_pixel(x, y)[0]])
    })
}

/// Bounding boxes of the 8-connected foreground components of a binary image.
fn component_bounds(binary: &GrayImage) -> Vec<Bounds> {
    let labels = connected_components(binary, Connectivity::Eight, Luma([0u8]));
    let mut bounds: Vec<Option<Bounds>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        if bounds.len() < label {
            bounds.resize(label, None);
        }
        let slot = &mut bounds[label - 1];
        *slot = Some(match *slot {
            None => Bounds {
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
            },
            Some(b) => Bounds {
                min_x: b.min_x.min(x),
                min_y: b.min_y.min(y),
                max_x: b.max_x.max(x),
                max_y: b.max_y.max(y),
            },
        });
    }
    bounds.into_iter().flatten().collect()
}

/// Extent of text-like blobs measured from the band's outer edge.
///
/// The gradient is binarized with Otsu's level and labelled; components wider
/// than `min_width` and taller than `min_height` count as text, except those
/// nested inside another such component. Fewer than `min_regions` of them
/// reports 0, otherwise the offset of the blob reaching furthest inward.
#[must_use]
pub fn text_boundary(gray: &GrayImage, position: BandPosition, config: &TextDensityConfig) -> u32 {
    let gradient = morphological_gradient(gray);
    let binary = threshold(&gradient, otsu_level(&gradient), ThresholdType::Binary);

    let candidates: Vec<Bounds> = component_bounds(&binary)
        .into_iter()
        .filter(|b| b.width() > config.min_width && b.height() > config.min_height)
        .collect();
    let text = outermost(&candidates);
    if text.len() < config.min_regions {
        return 0;
    }

    match position {
        BandPosition::Top => text.iter().map(|b| b.max_y + 1).max().unwrap_or(0),
        BandPosition::Bottom => text
            .iter()
            .map(|b| b.min_y)
            .min()
            .map_or(0, |y| gray.height() - y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// White band with black `w` x `h` blocks at the given top-left corners.
    fn blocks(width: u32, height: u32, corners: &[(u32, u32)], w: u32, h: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(width, height, Luma([255]));
        for &(x0, y0) in corners {
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        img
    }

    fn row_of_blocks(count: u32, y: u32) -> Vec<(u32, u32)> {
        (0..count).map(|i| (20 + i * 120, y)).collect()
    }

    /// `count` hollow 100x40 frames (2px stroke) at row 20, each holding a 76x20 block.
    fn framed_blocks(count: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(800, 300, Luma([255]));
        for (x0, y0) in row_of_blocks(count, 20) {
            for y in y0..y0 + 40 {
                for x in x0..x0 + 100 {
                    let stroke = x < x0 + 2 || x >= x0 + 98 || y < y0 + 2 || y >= y0 + 38;
                    let inner = (x0 + 10..x0 + 86).contains(&x) && (y0 + 8..y0 + 28).contains(&y);
                    if stroke || inner {
                        img.put_pixel(x, y, Luma([0]));
                    }
                }
            }
        }
        img
    }

    #[test]
    fn many_text_blocks_report_their_lowest_edge() {
        let gray = blocks(800, 300, &row_of_blocks(6, 20), 80, 30);
        let cfg = TextDensityConfig::default();
        let offset = text_boundary(&gray, BandPosition::Top, &cfg);
        // gradient ring extends one pixel past the block
        assert!((50..=52).contains(&offset), "offset {offset}");
    }

    #[test]
    fn bottom_band_reports_distance_from_last_row() {
        let gray = blocks(800, 300, &row_of_blocks(6, 250), 80, 30);
        let cfg = TextDensityConfig::default();
        let offset = text_boundary(&gray, BandPosition::Bottom, &cfg);
        assert!((50..=52).contains(&offset), "offset {offset}");
    }

    #[test]
    fn too_few_blocks_report_nothing() {
        let gray = blocks(800, 300, &row_of_blocks(4, 20), 80, 30);
        assert_eq!(
            text_boundary(&gray, BandPosition::Top, &TextDensityConfig::default()),
            0
        );
    }

    #[test]
    fn small_marks_are_not_text() {
        let gray = blocks(800, 300, &row_of_blocks(6, 20), 40, 10);
        assert_eq!(
            text_boundary(&gray, BandPosition::Top, &TextDensityConfig::default()),
            0
        );
    }

    #[test]
    fn looser_region_count_accepts_fewer_blocks() {
        let gray = blocks(800, 300, &row_of_blocks(3, 20), 80, 30);
        let cfg = TextDensityConfig {
            min_regions: 3,
            ..TextDensityConfig::default()
        };
        assert!(text_boundary(&gray, BandPosition::Top, &cfg) > 0);
    }

    #[test]
    fn framed_text_counts_once() {
        let cfg = TextDensityConfig::default();
        // three frames plus their contents would make six regions
        assert_eq!(text_boundary(&framed_blocks(3), BandPosition::Top, &cfg), 0);

        let offset = text_boundary(&framed_blocks(5), BandPosition::Top, &cfg);
        assert!((59..=62).contains(&offset), "offset {offset}");
    }

    #[test]
    fn outermost_drops_enclosed_and_duplicate_boxes() {
        let b = |min_x, min_y, max_x, max_y| Bounds {
            min_x,
            min_y,
            max_x,
            max_y,
        };
        let boxes = [b(0, 0, 100, 40), b(10, 8, 80, 30), b(200, 0, 260, 40), b(200, 0, 260, 40)];
        assert_eq!(outermost(&boxes), vec![b(0, 0, 100, 40), b(200, 0, 260, 40)]);
    }

    #[test]
    fn blank_band_reports_nothing() {
        let gray = GrayImage::from_pixel(200, 100, Luma([255]));
        assert_eq!(
            text_boundary(&gray, BandPosition::Top, &TextDensityConfig::default()),
            0
        );
    }
}
