//! Pattern-based watermark boundary detection.
//!
//! Used when no known template matches. Three independent analyzers look at
//! a band at the top or bottom of the image, each scanning from the outer
//! edge inward:
//! 1. **Text density**: clusters of text-sized blobs in the morphological gradient
//! 2. **Edge density**: the first row with (almost) no Canny edges
//! 3. **Color uniformity**: the first dark, non-background row
//!
//! Each analyzer has two thresholds: one to produce a value at all, and a
//! stricter one to count that value as a vote. The band's trim is the median
//! of the voting values and its confidence is the number of votes.

mod color;
mod edge;
mod text;

use image::{imageops, RgbImage};
use log::debug;

use crate::config::BoundaryConfig;

pub use color::color_boundary;
pub use edge::edge_boundary;
pub use text::text_boundary;

/// Which end of the image a band was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandPosition {
    /// Band starts at the first row; scanning goes downward.
    Top,
    /// Band ends at the last row; scanning goes upward.
    Bottom,
}

impl BandPosition {
    /// Offset measured from this band's outer edge to row `y`.
    ///
    /// For the bottom band the boundary row itself is included.
    pub(crate) fn offset(self, y: u32, height: u32) -> u32 {
        match self {
            Self::Top => y,
            Self::Bottom => height - y,
        }
    }

    /// Rows of a band of `height` in scan order, outer edge first.
    pub(crate) fn scan_rows(self, height: u32) -> Box<dyn Iterator<Item = u32>> {
        match self {
            Self::Top => Box::new(0..height),
            Self::Bottom => Box::new((0..height).rev()),
        }
    }
}

/// Number of analyzers that agree on a boundary, in `0..=3`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Confidence(u8);

impl Confidence {
    /// All analyzers agree.
    pub const UNANIMOUS: Self = Self(3);

    /// Confidence from a vote count, clamped to three.
    #[must_use]
    pub fn new(votes: u8) -> Self {
        Self(votes.min(3))
    }

    /// Number of votes.
    #[must_use]
    pub fn votes(self) -> u8 {
        self.0
    }
}

/// Raw per-analyzer boundary offsets, before vote gating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundarySignals {
    /// Text-density offset.
    pub text: u32,
    /// Edge-density offset.
    pub edge: u32,
    /// Color-uniformity offset.
    pub color: u32,
}

/// Aggregated result for one band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundaryVerdict {
    /// Median of the voting offsets, or 0 when nothing voted.
    pub trim_px: u32,
    /// How many analyzers voted.
    pub confidence: Confidence,
    /// The raw analyzer outputs.
    pub signals: BoundarySignals,
}

/// Median of the values; for an even count, the floor of the two middle values' mean.
#[allow(clippy::cast_possible_truncation)] // mean of two u32 fits in u32
fn median(values: &mut [u32]) -> u32 {
    if values.is_empty() {
        return 0;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        ((u64::from(values[mid - 1]) + u64::from(values[mid])) / 2) as u32
    }
}

/// Turn analyzer outputs into a verdict using each analyzer's vote threshold.
#[must_use]
pub fn aggregate(signals: BoundarySignals, config: &BoundaryConfig) -> BoundaryVerdict {
    let gated = [
        (signals.text, config.text.vote_min_px),
        (signals.edge, config.edge.vote_min_px),
        (signals.color, config.color.vote_min_px),
    ];
    let mut votes: Vec<u32> = gated
        .iter()
        .filter(|(value, gate)| value > gate)
        .map(|(value, _)| *value)
        .collect();

    // at most three votes
    #[allow(clippy::cast_possible_truncation)]
    let confidence = Confidence(votes.len() as u8);
    BoundaryVerdict {
        trim_px: median(&mut votes),
        confidence,
        signals,
    }
}

/// Runs the three analyzers over top and bottom bands.
#[derive(Debug, Clone)]
pub struct BoundaryDetector {
    config: BoundaryConfig,
}

impl BoundaryDetector {
    /// Detector with the given thresholds.
    #[must_use]
    pub fn new(config: BoundaryConfig) -> Self {
        Self { config }
    }

    /// Analyse one band taken from the given end of an image.
    #[must_use]
    pub fn detect(&self, region: &RgbImage, position: BandPosition) -> BoundaryVerdict {
        if region.width() == 0 || region.height() == 0 {
            return BoundaryVerdict::default();
        }
        let gray = imageops::grayscale(region);
        let signals = BoundarySignals {
            text: text_boundary(&gray, position, &self.config.text),
            edge: edge_boundary(&gray, position, &self.config.edge),
            color: color_boundary(region, position, &self.config.color),
        };
        let verdict = aggregate(signals, &self.config);
        debug!(
            "{position:?} band {}px: text={} edge={} color={} -> trim={} votes={}",
            region.height(),
            signals.text,
            signals.edge,
            signals.color,
            verdict.trim_px,
            verdict.confidence.votes()
        );
        verdict
    }

    /// Analyse the top and bottom bands of `image`, each `band_ratio` of its height.
    #[must_use]
    pub fn detect_bands(&self, image: &RgbImage) -> (BoundaryVerdict, BoundaryVerdict) {
        let (width, height) = image.dimensions();
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let band = (height as f32 * self.config.band_ratio) as u32;
        if band == 0 || width == 0 {
            return (BoundaryVerdict::default(), BoundaryVerdict::default());
        }

        let top = imageops::crop_imm(image, 0, 0, width, band).to_image();
        let bottom = imageops::crop_imm(image, 0, height - band, width, band).to_image();
        (
            self.detect(&top, BandPosition::Top),
            self.detect(&bottom, BandPosition::Bottom),
        )
    }
}
