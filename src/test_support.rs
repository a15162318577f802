//! Synthetic images shared by the unit tests.

use image::{Rgb, RgbImage};

/// Deterministic per-pixel noise in `0..=255`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn noise(x: u32, y: u32, seed: u32) -> u8 {
    let mut v = x.wrapping_mul(0x9E37_79B9) ^ y.wrapping_mul(0x85EB_CA6B) ^ seed.wrapping_mul(0xC2B2_AE35);
    v ^= v >> 15;
    v = v.wrapping_mul(0x2C1B_3C6D);
    v ^= v >> 12;
    (v & 0xff) as u8
}

/// Gray noise image: busy texture with no structure.
pub(crate) fn noise_image(width: u32, height: u32, seed: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let v = noise(x, y, seed);
        Rgb([v, v, v])
    })
}

/// Solid color image.
pub(crate) fn solid(width: u32, height: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([value, value, value]))
}

/// Copy `patch` into `target` with its top-left corner at `(x, y)`.
pub(crate) fn paste(target: &mut RgbImage, patch: &RgbImage, x: u32, y: u32) {
    image::imageops::replace(target, patch, i64::from(x), i64::from(y));
}
