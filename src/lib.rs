//! Trim scraped watermark bands from comic panels and stitch them into strips.
//!
//! Panels downloaded from aggregator sites often carry a site banner across
//! the top or bottom edge. This crate removes those bands, stacks the cleaned
//! panels at one common width and cuts the result into sections of a bounded
//! height, preferring cuts along blank gutters between panels.
//!
//! # Quick Start
//!
//! ```no_run
//! use comic_stitch::{io, NoProgress, PipelineConfig, StitchPipeline, TemplateStore};
//! use std::path::Path;
//!
//! let config = PipelineConfig::default();
//! let store = TemplateStore::load(Some(Path::new("assets")), &config.matching);
//! let pipeline = StitchPipeline::new(&config, store)?;
//!
//! let images = io::load_images(Path::new("chapter-01"))?;
//! let output = pipeline.run(images, &NoProgress);
//! io::save_sections(&output.sections, Path::new("chapter-01[Stitched]"), io::OutputFormat::Jpg, 90)?;
//! # Ok::<(), comic_stitch::Error>(())
//! ```
//!
//! # Trimming
//!
//! Each image first goes through template matching against known banners
//! (image files plus text rendered at the image's width). When no template
//! matches, three pattern analyzers (text density, edge density and color
//! uniformity) vote on where a banner ends; all three must agree. Crops that
//! would remove too much of the image are refused, so an unrecognized image
//! passes through untouched.
//!
//! ```no_run
//! use comic_stitch::{PipelineConfig, TemplateStore, WatermarkTrimmer};
//!
//! let trimmer = WatermarkTrimmer::new(&PipelineConfig::default(), TemplateStore::empty());
//! let img = image::open("page.png").unwrap().to_rgb8();
//! let (cleaned, report) = trimmer.trim_with_report(img);
//! println!("trimmed: {}, now {}px tall", report.trimmed(), cleaned.height());
//! ```

#![deny(missing_docs)]

pub mod boundary;
pub mod compositor;
pub mod config;
pub mod error;
pub mod io;
pub mod matcher;
pub mod pipeline;
pub mod progress;
pub mod templates;
pub mod trimmer;

#[cfg(test)]
mod test_support;

pub use boundary::{BandPosition, BoundaryDetector, BoundaryVerdict, Confidence};
pub use compositor::{compose, slice, Section, Strip};
pub use config::{
    BoundaryConfig, MatchConfig, PipelineConfig, SeamConfig, SlicePolicy, StitchConfig,
    TrimConfig,
};
pub use error::{Error, Result};
pub use matcher::{TemplateMatch, TemplateMatcher};
pub use pipeline::{StitchOutput, StitchPipeline};
pub use progress::{LogProgress, NoProgress, ProgressSink};
pub use templates::{FontResolver, GlyphRenderer, Template, TemplateStore};
pub use trimmer::{Detection, TrimDecision, TrimReport, TrimStrategy, TrustTier, WatermarkTrimmer};
