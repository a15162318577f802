//! Tunable thresholds for trimming and stitching.
//!
//! Every knob lives in one immutable [`PipelineConfig`] that is handed to each
//! component at construction. The defaults are the strictest values observed
//! in production use; they are meant to be recalibrated against a labelled
//! corpus rather than treated as final.

use crate::error::{Error, Result};

/// Template matching parameters.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Minimum peak correlation (`TM_CCOEFF_NORMED`) for a match.
    pub threshold: f32,
    /// Extra rows searched beyond the template height in each band.
    pub band_padding: u32,
    /// Texts rendered into synthetic templates for every image width.
    pub synthetic_texts: Vec<String>,
    /// Height of the synthetic template canvas.
    pub synthetic_height: u32,
    /// Font size used when rendering synthetic templates.
    pub font_size: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            band_padding: 50,
            synthetic_texts: vec!["包子漫画".to_string(), "baozi".to_string()],
            synthetic_height: 80,
            font_size: 36.0,
        }
    }
}

/// Text-density analyzer parameters.
#[derive(Debug, Clone)]
pub struct TextDensityConfig {
    /// Components must be wider than this to count as text.
    pub min_width: u32,
    /// Components must be taller than this to count as text.
    pub min_height: u32,
    /// Number of qualifying components needed before a boundary is reported.
    pub min_regions: usize,
    /// A reported boundary votes only when it exceeds this many pixels.
    pub vote_min_px: u32,
}

impl Default for TextDensityConfig {
    fn default() -> Self {
        Self {
            min_width: 50,
            min_height: 15,
            min_regions: 5,
            vote_min_px: 100,
        }
    }
}

/// Edge-density analyzer parameters.
#[derive(Debug, Clone)]
pub struct EdgeDensityConfig {
    /// Canny hysteresis low threshold. Must not exceed `canny_high`.
    pub canny_low: f32,
    /// Canny hysteresis high threshold.
    pub canny_high: f32,
    /// A row is blank when its summed edge intensity per pixel of width is below this.
    pub max_row_density: f32,
    /// A reported boundary votes only when it exceeds this many pixels.
    pub vote_min_px: u32,
}

impl Default for EdgeDensityConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            max_row_density: 2.0,
            vote_min_px: 100,
        }
    }
}

/// Color-uniformity analyzer parameters.
#[derive(Debug, Clone)]
pub struct ColorUniformityConfig {
    /// Rows with a mean channel stddev below this are uniform.
    pub max_row_stddev: f32,
    /// Uniform rows brighter than this look like watermark background.
    pub min_background_brightness: f32,
    /// The scan stops at a non-background row darker than this.
    pub max_content_brightness: f32,
    /// A reported boundary votes only when it exceeds this many pixels.
    pub vote_min_px: u32,
}

impl Default for ColorUniformityConfig {
    fn default() -> Self {
        Self {
            max_row_stddev: 2.0,
            min_background_brightness: 250.0,
            max_content_brightness: 150.0,
            vote_min_px: 100,
        }
    }
}

/// Pattern-based boundary detector parameters.
#[derive(Debug, Clone)]
pub struct BoundaryConfig {
    /// Fraction of image height analysed at the top and at the bottom.
    pub band_ratio: f32,
    /// Text-density analyzer.
    pub text: TextDensityConfig,
    /// Edge-density analyzer.
    pub edge: EdgeDensityConfig,
    /// Color-uniformity analyzer.
    pub color: ColorUniformityConfig,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            band_ratio: 0.2,
            text: TextDensityConfig::default(),
            edge: EdgeDensityConfig::default(),
            color: ColorUniformityConfig::default(),
        }
    }
}

/// Crop acceptance rules for the two trust tiers.
#[derive(Debug, Clone)]
pub struct TrimConfig {
    /// Retained fraction required for a template-matched crop.
    pub template_min_retention: f32,
    /// Retained fraction required for a pattern-detected crop.
    pub pattern_min_retention: f32,
    /// Hard ceiling on a pattern trim per side, as a fraction of height.
    pub pattern_cap_ratio: f32,
    /// A pattern trim must remove more than this many pixels on its side.
    pub pattern_min_px: u32,
    /// Analyzer votes required on a side before a pattern trim is trusted.
    pub required_votes: u8,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            template_min_retention: 0.6,
            pattern_min_retention: 0.9,
            pattern_cap_ratio: 0.15,
            pattern_min_px: 80,
            required_votes: 3,
        }
    }
}

/// Low-activity seam search used when cutting the strip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeamConfig {
    /// Rows skipped between candidate cut rows.
    pub scan_step: u32,
    /// Percentage in `0..=100`; higher means neighbouring pixels must be closer.
    pub sensitivity: u8,
    /// Columns ignored at each horizontal edge of a candidate row.
    pub ignorable_pixels: u32,
    /// How far above the fixed cut the search may go, as a fraction of the section height.
    pub window_ratio: f32,
}

impl Default for SeamConfig {
    fn default() -> Self {
        Self {
            scan_step: 5,
            sensitivity: 90,
            ignorable_pixels: 5,
            window_ratio: 0.4,
        }
    }
}

impl SeamConfig {
    /// Largest luminance step between neighbouring pixels that still counts as flat.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // at most 255
    pub fn pixel_tolerance(&self) -> i16 {
        (255.0 * (1.0 - f32::from(self.sensitivity) / 100.0)) as i16
    }
}

/// How the strip is partitioned into sections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlicePolicy {
    /// Cut at exact multiples of the target height.
    Fixed,
    /// Prefer a nearby flat row, falling back to the fixed offset.
    Seam(SeamConfig),
}

impl Default for SlicePolicy {
    fn default() -> Self {
        Self::Seam(SeamConfig::default())
    }
}

/// Output geometry of the stitched strip.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchConfig {
    /// Width every image is resized to; `0` means the widest input.
    pub target_width: u32,
    /// Maximum section height; `0` emits the whole strip as one section.
    pub target_height: u32,
    /// Cut placement strategy.
    pub slicing: SlicePolicy,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            target_width: 0,
            target_height: 12_000,
            slicing: SlicePolicy::default(),
        }
    }
}

/// Complete, immutable configuration for a trim-and-stitch run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Template matching.
    pub matching: MatchConfig,
    /// Pattern-based boundary detection.
    pub boundary: BoundaryConfig,
    /// Crop acceptance.
    pub trim: TrimConfig,
    /// Compositing and slicing.
    pub stitch: StitchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            matching: MatchConfig::default(),
            boundary: BoundaryConfig::default(),
            trim: TrimConfig::default(),
            stitch: StitchConfig::default(),
        }
    }
}

fn check_ratio(name: &str, value: f32) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} must be in (0, 1], got {value}"
        )))
    }
}

impl PipelineConfig {
    /// Check that every ratio and count is within its meaningful range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        check_ratio("matching.threshold", self.matching.threshold)?;
        check_ratio("boundary.band_ratio", self.boundary.band_ratio)?;
        check_ratio("trim.template_min_retention", self.trim.template_min_retention)?;
        check_ratio("trim.pattern_min_retention", self.trim.pattern_min_retention)?;
        check_ratio("trim.pattern_cap_ratio", self.trim.pattern_cap_ratio)?;

        if self.matching.synthetic_height == 0 {
            return Err(Error::InvalidConfig(
                "matching.synthetic_height must be positive".to_string(),
            ));
        }
        let edge = &self.boundary.edge;
        if edge.canny_low < 0.0 || edge.canny_high < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "boundary.edge canny thresholds must be non-negative, got {} and {}",
                edge.canny_low, edge.canny_high
            )));
        }
        if edge.canny_low > edge.canny_high {
            return Err(Error::InvalidConfig(format!(
                "boundary.edge.canny_low ({}) must not exceed canny_high ({})",
                edge.canny_low, edge.canny_high
            )));
        }
        if self.trim.required_votes > 3 {
            return Err(Error::InvalidConfig(format!(
                "trim.required_votes must be at most 3, got {}",
                self.trim.required_votes
            )));
        }
        if let SlicePolicy::Seam(seam) = self.stitch.slicing {
            if seam.scan_step == 0 {
                return Err(Error::InvalidConfig(
                    "seam scan_step must be positive".to_string(),
                ));
            }
            if seam.sensitivity > 100 {
                return Err(Error::InvalidConfig(format!(
                    "seam sensitivity must be <= 100, got {}",
                    seam.sensitivity
                )));
            }
            check_ratio("seam window_ratio", seam.window_ratio)?;
        }
        Ok(())
    }
}
