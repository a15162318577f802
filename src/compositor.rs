//! Vertical stitching of panel images and slicing into output sections.
//!
//! All images are scaled to one width and stacked into a single tall
//! [`Strip`]. The strip is then cut into [`Section`]s no taller than the
//! target height, preferably along flat rows (gutters between panels) so
//! that cuts do not run through artwork or speech bubbles.

use image::imageops::{self, FilterType};
use image::{Pixel, RgbImage};
use log::{debug, info, warn};

use crate::config::{SeamConfig, SlicePolicy};

/// The tall buffer formed by stacking resized images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strip {
    image: RgbImage,
}

impl Strip {
    /// Strip width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Strip height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Whether the strip holds no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Borrow the strip pixels.
    #[must_use]
    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }

    /// Take the strip pixels.
    #[must_use]
    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// One output image cut from a strip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Row of the strip where this section starts.
    pub offset: u32,
    /// Section pixels.
    pub image: RgbImage,
}

impl Section {
    /// Section height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Height of a `width` x `height` image scaled to `target_width`, at least 1.
///
/// Saturates at `u32::MAX` for extreme upscales.
#[must_use]
pub fn resized_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == target_width {
        return height;
    }
    let scaled = u64::from(height) * u64::from(target_width) / u64::from(width);
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}

/// Resized height of each `(width, height)` at `target_width`, and the strip total.
///
/// An entry is `None` when adding it would overflow the strip height.
fn stacked_heights(sizes: &[(u32, u32)], target_width: u32) -> (Vec<Option<u32>>, u32) {
    let mut total = 0u32;
    let heights = sizes
        .iter()
        .map(|&(w, h)| {
            let height = resized_height(w, h, target_width);
            let next = total.checked_add(height)?;
            total = next;
            Some(height)
        })
        .collect();
    (heights, total)
}

/// Stack `images` top to bottom at a common width.
///
/// `target_width` of 0 uses the widest input. Zero-sized images are skipped.
#[must_use]
pub fn compose(images: Vec<RgbImage>, target_width: u32) -> Strip {
    compose_with(images, target_width, |_, _| {})
}

/// [`compose`], calling `on_copied(done, total)` after each image lands in the strip.
///
/// Each source image is released as soon as it has been copied.
#[must_use]
pub fn compose_with<F>(images: Vec<RgbImage>, target_width: u32, mut on_copied: F) -> Strip
where
    F: FnMut(usize, usize),
{
    let images: Vec<RgbImage> = images
        .into_iter()
        .filter(|img| {
            let keep = img.width() > 0 && img.height() > 0;
            if !keep {
                warn!("Skipping empty {}x{} image", img.width(), img.height());
            }
            keep
        })
        .collect();

    let width = if target_width == 0 {
        images.iter().map(RgbImage::width).max().unwrap_or(0)
    } else {
        target_width
    };
    if images.is_empty() || width == 0 {
        return Strip {
            image: RgbImage::new(0, 0),
        };
    }

    let sizes: Vec<(u32, u32)> = images.iter().map(RgbImage::dimensions).collect();
    let (heights, total) = stacked_heights(&sizes, width);
    let images: Vec<(RgbImage, u32)> = images
        .into_iter()
        .zip(heights)
        .filter_map(|(img, height)| {
            if height.is_none() {
                warn!(
                    "Skipping {}x{} image, strip would exceed {} rows",
                    img.width(),
                    img.height(),
                    u32::MAX
                );
            }
            height.map(|h| (img, h))
        })
        .collect();
    info!(
        "Combining {} images into a {width}x{total} strip",
        images.len()
    );

    let count = images.len();
    let mut strip = RgbImage::new(width, total);
    let mut y = 0u32;
    for (i, (img, height)) in images.into_iter().enumerate() {
        if img.width() == width {
            imageops::replace(&mut strip, &img, 0, i64::from(y));
        } else {
            let resized = imageops::resize(&img, width, height, FilterType::Lanczos3);
            drop(img);
            imageops::replace(&mut strip, &resized, 0, i64::from(y));
        }
        y += height;
        on_copied(i + 1, count);
    }

    Strip { image: strip }
}

/// Whether every horizontally adjacent luminance pair in row `y` is within tolerance.
///
/// `ignorable_pixels` columns are skipped at each edge, unless the image is too
/// narrow to leave a pair between them; then the whole row is compared.
fn is_flat_row(image: &RgbImage, y: u32, seam: &SeamConfig) -> bool {
    let tolerance = seam.pixel_tolerance();
    let width = image.width();
    let ignored = if width > seam.ignorable_pixels.saturating_mul(2).saturating_add(1) {
        seam.ignorable_pixels
    } else {
        0
    };
    let start = ignored + 1;
    let end = width - ignored;
    let luma = |x: u32| i16::from(image.get_pixel(x, y).to_luma()[0]);
    (start..end).all(|x| (luma(x) - luma(x - 1)).abs() <= tolerance)
}

/// Flat row at or above `fixed`, searching upward no further than the window.
fn find_seam(
    image: &RgbImage,
    previous: u32,
    fixed: u32,
    target_height: u32,
    seam: &SeamConfig,
) -> Option<u32> {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let window = (target_height as f32 * seam.window_ratio) as u32;
    let lowest = fixed.saturating_sub(window).max(previous + 1);
    let mut row = fixed;
    while row >= lowest {
        if is_flat_row(image, row, seam) {
            return Some(row);
        }
        row = row.checked_sub(seam.scan_step)?;
    }
    None
}

/// Row offsets where the strip is cut, including 0 and the strip height.
///
/// Consecutive offsets are never more than `target_height` apart.
#[must_use]
pub fn cut_points(image: &RgbImage, target_height: u32, policy: SlicePolicy) -> Vec<u32> {
    let height = image.height();
    if height == 0 {
        return Vec::new();
    }
    let mut cuts = vec![0];
    if target_height > 0 {
        let mut last = 0;
        while height - last > target_height {
            let fixed = last + target_height;
            let cut = match policy {
                SlicePolicy::Fixed => fixed,
                SlicePolicy::Seam(seam) => {
                    find_seam(image, last, fixed, target_height, &seam).unwrap_or_else(|| {
                        debug!("No flat row near {fixed}, cutting at the fixed offset");
                        fixed
                    })
                }
            };
            cuts.push(cut);
            last = cut;
        }
    }
    cuts.push(height);
    cuts
}

/// Cut the strip into sections of at most `target_height` rows, top to bottom.
///
/// `target_height` of 0 yields the whole strip as one section; an empty strip
/// yields no sections.
#[must_use]
pub fn slice(strip: Strip, target_height: u32, policy: SlicePolicy) -> Vec<Section> {
    if strip.is_empty() {
        return Vec::new();
    }
    let image = strip.into_image();
    let cuts = cut_points(&image, target_height, policy);
    if cuts.len() == 2 {
        return vec![Section { offset: 0, image }];
    }

    let width = image.width();
    let sections: Vec<Section> = cuts
        .windows(2)
        .map(|pair| Section {
            offset: pair[0],
            image: imageops::crop_imm(&image, 0, pair[0], width, pair[1] - pair[0]).to_image(),
        })
        .collect();
    info!("Sliced {}px strip into {} sections", image.height(), sections.len());
    sections
}
