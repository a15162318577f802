//! Template search in the top and bottom bands of an image.
//!
//! Each template is slid over a band a little taller than itself using
//! zero-mean normalized cross-correlation on luminance. Any accepted match
//! pushes the trim outward; the largest trim implied by any template wins.

use image::RgbImage;
use log::debug;

use crate::config::MatchConfig;
use crate::templates::Template;

/// Flat windows below this variance never match.
const MIN_VARIANCE: f64 = 1e-6;

/// Rows to remove at each end of an image, as implied by template matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateMatch {
    /// Rows to remove from the top.
    pub top: u32,
    /// Rows to remove from the bottom.
    pub bottom: u32,
}

impl TemplateMatch {
    /// Whether no template matched at either end.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.top == 0 && self.bottom == 0
    }
}

/// Best correlation of a template inside a search band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Correlation in `[-1, 1]`.
    pub score: f32,
    /// Column of the template's left edge.
    pub x: u32,
    /// Row of the template's top edge, relative to the band.
    pub y: u32,
}

/// Row-major luminance plane in `[0, 255]`.
struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    /// Luminance of rows `y0..y0 + rows`: `0.299*R + 0.587*G + 0.114*B`.
    fn luminance(img: &RgbImage, y0: u32, rows: u32) -> Self {
        let mut data = Vec::with_capacity((img.width() * rows) as usize);
        for y in y0..y0 + rows {
            for x in 0..img.width() {
                let px = img.get_pixel(x, y);
                data.push(
                    0.299 * f32::from(px[0]) + 0.587 * f32::from(px[1]) + 0.114 * f32::from(px[2]),
                );
            }
        }
        Self {
            width: img.width() as usize,
            height: rows as usize,
            data,
        }
    }
}

/// Summed-area tables of values and squared values.
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(plane: &Plane) -> Self {
        let stride = plane.width + 1;
        let mut sum = vec![0.0_f64; stride * (plane.height + 1)];
        let mut sq = vec![0.0_f64; stride * (plane.height + 1)];
        for y in 0..plane.height {
            let mut row_sum = 0.0_f64;
            let mut row_sq = 0.0_f64;
            for x in 0..plane.width {
                let v = f64::from(plane.data[y * plane.width + x]);
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sq[idx] = sq[idx - stride] + row_sq;
            }
        }
        Self { stride, sum, sq }
    }

    /// Sum and sum of squares over the `w` x `h` window at `(x, y)`.
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let a = y * self.stride + x;
        let b = y * self.stride + x + w;
        let c = (y + h) * self.stride + x;
        let d = (y + h) * self.stride + x + w;
        (
            self.sum[d] - self.sum[b] - self.sum[c] + self.sum[a],
            self.sq[d] - self.sq[b] - self.sq[c] + self.sq[a],
        )
    }
}

/// Zero-mean template with its energy.
struct Kernel {
    width: usize,
    height: usize,
    data: Vec<f32>,
    energy: f64,
}

impl Kernel {
    /// `None` for a flat template, which cannot correlate with anything.
    fn new(template: &RgbImage) -> Option<Self> {
        let plane = Plane::luminance(template, 0, template.height());
        #[allow(clippy::cast_precision_loss)]
        let n = plane.data.len() as f32;
        let mean = plane.data.iter().sum::<f32>() / n;
        let data: Vec<f32> = plane.data.iter().map(|v| v - mean).collect();
        let energy = data.iter().map(|v| f64::from(v * v)).sum::<f64>();
        (energy > MIN_VARIANCE).then_some(Self {
            width: plane.width,
            height: plane.height,
            data,
            energy,
        })
    }
}

/// Correlation of `kernel` with the window at `(x, y)` whose variance term is `variance`.
#[allow(clippy::cast_possible_truncation)]
fn correlation(plane: &Plane, x: usize, y: usize, kernel: &Kernel, variance: f64) -> f32 {
    let mut numerator = 0.0_f32;
    for ky in 0..kernel.height {
        let row = (y + ky) * plane.width + x;
        let image_row = &plane.data[row..row + kernel.width];
        let kernel_row = &kernel.data[ky * kernel.width..(ky + 1) * kernel.width];
        numerator += image_row
            .iter()
            .zip(kernel_row)
            .map(|(i, k)| i * k)
            .sum::<f32>();
    }
    (f64::from(numerator) / (variance * kernel.energy).sqrt()) as f32
}

/// Highest correlation of `kernel` over rows `y_start..y_start + rows` of `plane`.
fn best_match(
    plane: &Plane,
    integral: &Integral,
    y_start: usize,
    rows: usize,
    kernel: &Kernel,
) -> Option<Peak> {
    if rows < kernel.height || plane.width < kernel.width {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = (kernel.width * kernel.height) as f64;
    let mut best: Option<Peak> = None;

    for y in 0..=rows - kernel.height {
        for x in 0..=plane.width - kernel.width {
            let (sum, sq) = integral.window(x, y_start + y, kernel.width, kernel.height);
            let variance = sq - sum * sum / n;
            let score = if variance <= MIN_VARIANCE {
                0.0
            } else {
                correlation(plane, x, y_start + y, kernel, variance)
            };

            if best.is_none_or(|b| score > b.score) {
                #[allow(clippy::cast_possible_truncation)]
                {
                    best = Some(Peak {
                        score,
                        x: x as u32,
                        y: y as u32,
                    });
                }
            }
        }
    }
    best
}

/// Searches stored templates against the top and bottom bands of an image.
#[derive(Debug, Clone)]
pub struct TemplateMatcher {
    threshold: f32,
    band_padding: u32,
}

impl TemplateMatcher {
    /// Matcher using the configured correlation threshold and band padding.
    #[must_use]
    pub fn new(config: &MatchConfig) -> Self {
        Self {
            threshold: config.threshold,
            band_padding: config.band_padding,
        }
    }

    /// Find the trims implied by every template that matches.
    ///
    /// Templates larger than the image, or too tall for the search band, are
    /// skipped. The band searched is `min(template_height + padding, height / 3)`
    /// rows at each end.
    #[must_use]
    pub fn find<'a, I>(&self, image: &RgbImage, templates: I) -> TemplateMatch
    where
        I: IntoIterator<Item = &'a Template>,
    {
        let (width, height) = image.dimensions();
        let third = height / 3;
        let mut result = TemplateMatch::default();
        if third == 0 {
            return result;
        }

        let top_plane = Plane::luminance(image, 0, third);
        let top_integral = Integral::new(&top_plane);
        let bottom_plane = Plane::luminance(image, height - third, third);
        let bottom_integral = Integral::new(&bottom_plane);

        for template in templates {
            let (t_w, t_h) = (template.width(), template.height());
            if t_w > width || t_h > height {
                debug!(
                    "Template {} ({t_w}x{t_h}) larger than image ({width}x{height}), skipped",
                    template.name()
                );
                continue;
            }
            let band = (t_h + self.band_padding).min(third);
            if band < t_h {
                continue;
            }
            let Some(kernel) = Kernel::new(template.image()) else {
                debug!("Template {} is flat, skipped", template.name());
                continue;
            };

            if let Some(peak) = best_match(&top_plane, &top_integral, 0, band as usize, &kernel) {
                debug!(
                    "Template {} top peak {:.3} at y={}",
                    template.name(),
                    peak.score,
                    peak.y
                );
                if peak.score >= self.threshold {
                    result.top = result.top.max(peak.y + t_h);
                }
            }

            let bottom_start = (third - band) as usize;
            if let Some(peak) =
                best_match(&bottom_plane, &bottom_integral, bottom_start, band as usize, &kernel)
            {
                debug!(
                    "Template {} bottom peak {:.3} at y={}",
                    template.name(),
                    peak.score,
                    peak.y
                );
                if peak.score >= self.threshold {
                    result.bottom = result.bottom.max(band - peak.y);
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{noise_image, paste, solid};

    fn matcher() -> TemplateMatcher {
        TemplateMatcher::new(&MatchConfig::default())
    }

    #[test]
    fn exact_banner_at_top_trims_to_its_bottom_edge() {
        let banner = noise_image(300, 60, 7);
        let mut img = noise_image(340, 2000, 1);
        paste(&mut img, &banner, 20, 0);

        let template = Template::new("banner.png", banner);
        let found = matcher().find(&img, [&template]);
        assert_eq!(found.top, 60);
        assert_eq!(found.bottom, 0);
    }

    #[test]
    fn banner_near_bottom_trims_from_its_top_edge() {
        let banner = noise_image(300, 60, 7);
        let mut img = noise_image(330, 900, 2);
        paste(&mut img, &banner, 20, 900 - 70);

        let template = Template::new("banner.png", banner);
        let found = matcher().find(&img, [&template]);
        assert_eq!(found.top, 0);
        assert_eq!(found.bottom, 70);
    }

    #[test]
    fn noisy_banner_still_matches() {
        let banner = noise_image(200, 40, 11);
        let mut img = noise_image(240, 1200, 3);
        paste(&mut img, &banner, 0, 10);
        for y in 10..50 {
            for x in (0..200).step_by(7) {
                img.get_pixel_mut(x, y).0 = [128, 128, 128];
            }
        }

        let template = Template::new("banner.png", banner);
        let found = matcher().find(&img, [&template]);
        assert_eq!(found.top, 50);
    }

    #[test]
    fn unrelated_content_does_not_match() {
        let template = Template::new("banner.png", noise_image(200, 40, 11));
        let img = noise_image(240, 1200, 4);
        assert!(matcher().find(&img, [&template]).is_empty());
    }

    #[test]
    fn oversized_and_flat_templates_are_skipped() {
        let img = noise_image(200, 600, 5);
        let wide = Template::new("wide.png", noise_image(400, 20, 1));
        let tall = Template::new("tall.png", noise_image(50, 700, 1));
        let flat = Template::new("flat.png", solid(100, 30, 255));
        let found = matcher().find(&img, [&wide, &tall, &flat]);
        assert!(found.is_empty());
    }

    #[test]
    fn largest_trim_wins_across_templates() {
        let short = noise_image(100, 30, 21);
        let long = noise_image(100, 45, 22);
        let mut img = noise_image(260, 1500, 6);
        paste(&mut img, &short, 0, 0);
        paste(&mut img, &long, 150, 20);

        let a = Template::new("short.png", short);
        let b = Template::new("long.png", long);
        let found = matcher().find(&img, [&a, &b]);
        assert_eq!(found.top, 65);
    }

    #[test]
    fn tiny_image_yields_no_match() {
        let img = noise_image(10, 2, 1);
        let template = Template::new("t.png", noise_image(5, 1, 2));
        assert!(matcher().find(&img, [&template]).is_empty());
    }
}
