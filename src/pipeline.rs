//! End-to-end run: trim every image, stack them, cut the strip into sections.

use image::RgbImage;
use log::info;

use crate::compositor::{self, Section};
use crate::config::{PipelineConfig, StitchConfig};
use crate::error::Result;
use crate::progress::ProgressSink;
use crate::templates::TemplateStore;
use crate::trimmer::WatermarkTrimmer;

const TRIM_START: f32 = 10.0;
const TRIM_END: f32 = 50.0;
const DIMENSIONS: f32 = 55.0;
const COMPOSE_START: f32 = 60.0;
const COMPOSE_END: f32 = 75.0;
const SLICING: f32 = 85.0;
const COMPLETE: f32 = 100.0;

/// Percentage `done / total` of the way from `start` to `end`.
#[allow(clippy::cast_precision_loss)]
fn span(start: f32, end: f32, done: usize, total: usize) -> f32 {
    if total == 0 {
        return end;
    }
    start + (end - start) * done as f32 / total as f32
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct StitchOutput {
    /// Output sections, top to bottom.
    pub sections: Vec<Section>,
    /// How many input images had a watermark band removed.
    pub trimmed: usize,
}

/// Trimmer and compositor configured for one batch of images.
pub struct StitchPipeline {
    trimmer: Option<WatermarkTrimmer>,
    stitch: StitchConfig,
}

impl StitchPipeline {
    /// Pipeline that trims with templates from `store` before stitching.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) when
    /// `config` fails validation.
    pub fn new(config: &PipelineConfig, store: TemplateStore) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            trimmer: Some(WatermarkTrimmer::new(config, store)),
            stitch: config.stitch.clone(),
        })
    }

    /// Pipeline that stitches images as given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) when
    /// `config` fails validation.
    pub fn without_trimming(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            trimmer: None,
            stitch: config.stitch.clone(),
        })
    }

    /// Trim every image independently, keeping input order.
    ///
    /// Returns the images and how many of them were cropped. Reports progress
    /// from 10% to 50%.
    #[must_use]
    pub fn trim_all(
        &self,
        images: Vec<RgbImage>,
        progress: &dyn ProgressSink,
    ) -> (Vec<RgbImage>, usize) {
        let Some(trimmer) = &self.trimmer else {
            progress.update(TRIM_END, "Watermark trimming disabled");
            return (images, 0);
        };
        let total = images.len();
        progress.update(TRIM_START, &format!("Trimming {total} images"));

        #[cfg(feature = "parallel")]
        let results: Vec<(RgbImage, bool)> = {
            use rayon::prelude::*;
            use std::sync::atomic::{AtomicUsize, Ordering};

            let done = AtomicUsize::new(0);
            images
                .into_par_iter()
                .map(|image| {
                    let (image, report) = trimmer.trim_with_report(image);
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    progress.update(
                        span(TRIM_START, TRIM_END, n, total),
                        &format!("Trimmed image {n}/{total}"),
                    );
                    (image, report.trimmed())
                })
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let results: Vec<(RgbImage, bool)> = images
            .into_iter()
            .enumerate()
            .map(|(i, image)| {
                let (image, report) = trimmer.trim_with_report(image);
                progress.update(
                    span(TRIM_START, TRIM_END, i + 1, total),
                    &format!("Trimmed image {}/{total}", i + 1),
                );
                (image, report.trimmed())
            })
            .collect();

        let trimmed = results.iter().filter(|(_, t)| *t).count();
        info!("Trimmed watermark bands from {trimmed} of {total} images");
        (results.into_iter().map(|(image, _)| image).collect(), trimmed)
    }

    /// Trim, stitch and slice `images` in order.
    ///
    /// An empty input yields no sections.
    #[must_use]
    pub fn run(&self, images: Vec<RgbImage>, progress: &dyn ProgressSink) -> StitchOutput {
        let (images, trimmed) = self.trim_all(images, progress);

        let width = if self.stitch.target_width == 0 {
            images.iter().map(RgbImage::width).max().unwrap_or(0)
        } else {
            self.stitch.target_width
        };
        progress.update(DIMENSIONS, &format!("Output width {width}px"));

        let strip = compositor::compose_with(images, width, |done, total| {
            progress.update(
                span(COMPOSE_START, COMPOSE_END, done, total),
                &format!("Combined image {done}/{total}"),
            );
        });

        progress.update(SLICING, "Slicing strip");
        let sections = compositor::slice(strip, self.stitch.target_height, self.stitch.slicing);

        progress.update(COMPLETE, &format!("Produced {} sections", sections.len()));
        StitchOutput { sections, trimmed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlicePolicy;
    use crate::test_support::{noise_image, solid};
    use std::sync::Mutex;

    fn fixed_config(height: u32) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.stitch.target_height = height;
        config.stitch.slicing = SlicePolicy::Fixed;
        config
    }

    #[test]
    fn span_interpolates() {
        assert!((span(10.0, 50.0, 1, 4) - 20.0).abs() < 1e-4);
        assert!((span(10.0, 50.0, 0, 0) - 50.0).abs() < 1e-4);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.trim.template_min_retention = 1.5;
        assert!(StitchPipeline::without_trimming(&config).is_err());
    }

    #[test]
    fn stitches_without_trimming() {
        let pipeline = StitchPipeline::without_trimming(&fixed_config(1500)).unwrap();
        let images = vec![solid(800, 1000, 10), solid(750, 1200, 20), solid(820, 800, 30)];
        let out = pipeline.run(images, &crate::progress::NoProgress);
        let heights: Vec<u32> = out.sections.iter().map(Section::height).collect();
        assert_eq!(heights.iter().sum::<u32>(), 1025 + 1312 + 800);
        assert!(heights.iter().all(|&h| h <= 1500));
        assert!(out.sections.iter().all(|s| s.image.width() == 820));
        assert_eq!(out.trimmed, 0);
    }

    #[test]
    fn explicit_width_is_used() {
        let mut config = fixed_config(1500);
        config.stitch.target_width = 800;
        let pipeline = StitchPipeline::without_trimming(&config).unwrap();
        let images = vec![solid(800, 1000, 10), solid(750, 1200, 20), solid(820, 800, 30)];
        let out = pipeline.run(images, &crate::progress::NoProgress);
        let heights: Vec<u32> = out.sections.iter().map(Section::height).collect();
        assert_eq!(heights, vec![1500, 1500, 60]);
    }

    #[test]
    fn empty_input_produces_nothing() {
        let pipeline = StitchPipeline::new(&PipelineConfig::default(), TemplateStore::empty()).unwrap();
        let out = pipeline.run(Vec::new(), &crate::progress::NoProgress);
        assert!(out.sections.is_empty());
    }

    #[test]
    fn progress_reaches_every_milestone() {
        let seen = Mutex::new(Vec::new());
        let sink = |p: f32, _: &str| seen.lock().unwrap().push(p);
        let pipeline = StitchPipeline::new(&fixed_config(0), TemplateStore::empty()).unwrap();
        let images = vec![noise_image(60, 100, 1), noise_image(60, 100, 2)];
        let out = pipeline.run(images, &sink);
        assert_eq!(out.sections.len(), 1);

        let mut seen = seen.into_inner().unwrap();
        for milestone in [TRIM_START, TRIM_END, DIMENSIONS, COMPOSE_END, SLICING, COMPLETE] {
            assert!(
                seen.iter().any(|&p| (p - milestone).abs() < 1e-4),
                "missing {milestone}% in {seen:?}"
            );
        }
        assert!((seen.pop().unwrap() - COMPLETE).abs() < 1e-4);
    }
}
