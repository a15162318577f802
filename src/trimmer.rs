//! Watermark trimming with two trust tiers.
//!
//! Detection strategies are tried in order. Each either proposes a
//! [`TrimDecision`] tagged with its [`TrustTier`] or reports no match. The
//! first proposal that keeps enough of the image for its tier is applied;
//! anything else leaves the image untouched. Trimming never fails.

use image::{imageops, RgbImage};
use log::{debug, info};

use crate::boundary::{BoundaryDetector, BoundaryVerdict};
use crate::config::{PipelineConfig, TrimConfig};
use crate::matcher::TemplateMatcher;
use crate::templates::TemplateStore;

/// Slack for float rounding in the retention check.
const RETENTION_EPSILON: f64 = 1e-3;

/// How much a detection method is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustTier {
    /// A known watermark was located precisely.
    Template,
    /// Heuristic agreement between pixel analyzers.
    Pattern,
}

impl TrustTier {
    /// Fraction of the original height a crop from this tier must keep.
    #[must_use]
    pub fn min_retention(self, config: &TrimConfig) -> f32 {
        match self {
            Self::Template => config.template_min_retention,
            Self::Pattern => config.pattern_min_retention,
        }
    }
}

/// Rows to remove from each end of an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimDecision {
    /// Rows removed from the top.
    pub top: u32,
    /// Rows removed from the bottom.
    pub bottom: u32,
}

impl TrimDecision {
    /// Whether nothing would be removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.top == 0 && self.bottom == 0
    }

    /// Rows left after cropping an image of `height`, or `None` if nothing remains.
    #[must_use]
    pub fn retained(&self, height: u32) -> Option<u32> {
        height
            .checked_sub(self.top)
            .and_then(|rest| rest.checked_sub(self.bottom))
            .filter(|&rest| rest > 0)
    }

    /// Whether the crop keeps at least `ratio` of `height`.
    #[must_use]
    pub fn keeps_at_least(&self, height: u32, ratio: f32) -> bool {
        self.retained(height).is_some_and(|rest| {
            f64::from(rest) + RETENTION_EPSILON >= f64::from(height) * f64::from(ratio)
        })
    }
}

/// Outcome of one detection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// A watermark boundary was found.
    Matched {
        /// Proposed crop.
        decision: TrimDecision,
        /// Trust tier whose retention floor applies.
        tier: TrustTier,
    },
    /// Nothing found.
    NoMatch,
}

/// One way of locating watermark bands.
pub trait TrimStrategy: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// Inspect `image` and propose a crop.
    fn detect(&self, image: &RgbImage) -> Detection;
}

/// Template matching against known watermark banners.
pub struct TemplateStrategy {
    matcher: TemplateMatcher,
    store: TemplateStore,
}

impl TemplateStrategy {
    /// Strategy searching the templates held by `store`.
    #[must_use]
    pub fn new(matcher: TemplateMatcher, store: TemplateStore) -> Self {
        Self { matcher, store }
    }
}

impl TrimStrategy for TemplateStrategy {
    fn name(&self) -> &'static str {
        "template"
    }

    fn detect(&self, image: &RgbImage) -> Detection {
        if self.store.is_empty() {
            return Detection::NoMatch;
        }
        let synthetic = self.store.synthesize_for_width(image.width());
        let found = self
            .matcher
            .find(image, self.store.file_templates().iter().chain(&synthetic));
        if found.is_empty() {
            return Detection::NoMatch;
        }
        Detection::Matched {
            decision: TrimDecision {
                top: found.top,
                bottom: found.bottom,
            },
            tier: TrustTier::Template,
        }
    }
}

/// Pixel-pattern analysis, trusted only on unanimous agreement.
pub struct PatternStrategy {
    detector: BoundaryDetector,
    config: TrimConfig,
}

impl PatternStrategy {
    /// Strategy using `detector` and the pattern gates from `config`.
    #[must_use]
    pub fn new(detector: BoundaryDetector, config: TrimConfig) -> Self {
        Self { detector, config }
    }

    /// Apply the per-side cap, pixel floor and vote requirement.
    ///
    /// A side is cropped only when its capped trim exceeds the pixel floor and
    /// enough analyzers voted for it.
    #[must_use]
    pub fn decide(
        &self,
        height: u32,
        top: &BoundaryVerdict,
        bottom: &BoundaryVerdict,
    ) -> TrimDecision {
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let cap = (height as f32 * self.config.pattern_cap_ratio) as u32;
        let side = |verdict: &BoundaryVerdict| {
            let px = verdict.trim_px.min(cap);
            if px > self.config.pattern_min_px
                && verdict.confidence.votes() >= self.config.required_votes
            {
                px
            } else {
                0
            }
        };
        TrimDecision {
            top: side(top),
            bottom: side(bottom),
        }
    }
}

impl TrimStrategy for PatternStrategy {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn detect(&self, image: &RgbImage) -> Detection {
        let (top, bottom) = self.detector.detect_bands(image);
        let decision = self.decide(image.height(), &top, &bottom);
        if decision.is_empty() {
            debug!(
                "No unanimous pattern boundary: top={}px ({} votes), bottom={}px ({} votes)",
                top.trim_px,
                top.confidence.votes(),
                bottom.trim_px,
                bottom.confidence.votes()
            );
            return Detection::NoMatch;
        }
        Detection::Matched {
            decision,
            tier: TrustTier::Pattern,
        }
    }
}

/// A crop that was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedTrim {
    /// Strategy that proposed it.
    pub strategy: &'static str,
    /// Tier it was accepted under.
    pub tier: TrustTier,
    /// Rows removed.
    pub decision: TrimDecision,
}

/// A crop that was proposed but would have removed too much.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectedTrim {
    /// Strategy that proposed it.
    pub strategy: &'static str,
    /// The proposal.
    pub decision: TrimDecision,
    /// Rows the proposal would have kept.
    pub retained: u32,
}

/// What happened to one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrimReport {
    /// The crop applied, if any.
    pub applied: Option<AppliedTrim>,
    /// Proposals discarded for insufficient retention, in strategy order.
    pub rejected: Vec<RejectedTrim>,
}

impl TrimReport {
    /// Whether the image was cropped.
    #[must_use]
    pub fn trimmed(&self) -> bool {
        self.applied.is_some()
    }
}

/// Removes watermark bands from the ends of panel images.
pub struct WatermarkTrimmer {
    strategies: Vec<Box<dyn TrimStrategy>>,
    config: TrimConfig,
}

impl WatermarkTrimmer {
    /// Template matching first, then pattern detection.
    #[must_use]
    pub fn new(config: &PipelineConfig, store: TemplateStore) -> Self {
        let strategies: Vec<Box<dyn TrimStrategy>> = vec![
            Box::new(TemplateStrategy::new(
                TemplateMatcher::new(&config.matching),
                store,
            )),
            Box::new(PatternStrategy::new(
                BoundaryDetector::new(config.boundary.clone()),
                config.trim.clone(),
            )),
        ];
        Self::with_strategies(config.trim.clone(), strategies)
    }

    /// Custom strategy list, tried in order.
    #[must_use]
    pub fn with_strategies(config: TrimConfig, strategies: Vec<Box<dyn TrimStrategy>>) -> Self {
        Self { strategies, config }
    }

    /// Trim `image`, returning it unchanged when no crop is accepted.
    #[must_use]
    pub fn trim(&self, image: RgbImage) -> RgbImage {
        self.trim_with_report(image).0
    }

    /// Trim `image` and describe what was decided.
    #[must_use]
    pub fn trim_with_report(&self, image: RgbImage) -> (RgbImage, TrimReport) {
        let (width, height) = image.dimensions();
        let mut report = TrimReport::default();

        for strategy in &self.strategies {
            let Detection::Matched { decision, tier } = strategy.detect(&image) else {
                continue;
            };

            let floor = tier.min_retention(&self.config);
            match decision.retained(height) {
                Some(retained) if decision.keeps_at_least(height, floor) => {
                    info!(
                        "{} watermark trimmed: top={}px, bottom={}px ({height} -> {retained})",
                        strategy.name(),
                        decision.top,
                        decision.bottom
                    );
                    let cropped =
                        imageops::crop_imm(&image, 0, decision.top, width, retained).to_image();
                    report.applied = Some(AppliedTrim {
                        strategy: strategy.name(),
                        tier,
                        decision,
                    });
                    return (cropped, report);
                }
                retained => {
                    let retained = retained.unwrap_or(0);
                    info!(
                        "{} watermark found but trimming would keep only {retained} of {height} rows, skipped",
                        strategy.name()
                    );
                    report.rejected.push(RejectedTrim {
                        strategy: strategy.name(),
                        decision,
                        retained,
                    });
                }
            }
        }

        (image, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::Confidence;
    use crate::config::MatchConfig;
    use crate::templates::{FontResolver, Template};
    use crate::test_support::{noise_image, paste};

    struct Fixed(Detection);

    impl TrimStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&self, _image: &RgbImage) -> Detection {
            self.0
        }
    }

    fn matched(top: u32, bottom: u32, tier: TrustTier) -> Detection {
        Detection::Matched {
            decision: TrimDecision { top, bottom },
            tier,
        }
    }

    fn fixed_trimmer(detections: &[Detection]) -> WatermarkTrimmer {
        WatermarkTrimmer::with_strategies(
            TrimConfig::default(),
            detections
                .iter()
                .map(|d| Box::new(Fixed(*d)) as Box<dyn TrimStrategy>)
                .collect(),
        )
    }

    fn verdict(trim_px: u32, votes: u8) -> BoundaryVerdict {
        BoundaryVerdict {
            trim_px,
            confidence: Confidence::new(votes),
            ..BoundaryVerdict::default()
        }
    }

    fn banner_store(banner: RgbImage) -> TemplateStore {
        let config = MatchConfig {
            synthetic_texts: Vec::new(),
            ..MatchConfig::default()
        };
        TemplateStore::new(
            vec![Template::new("banner.png", banner)],
            &config,
            &FontResolver::new(Vec::new(), config.font_size),
        )
    }

    #[test]
    fn retained_rows_and_floor() {
        let d = TrimDecision { top: 60, bottom: 0 };
        assert_eq!(d.retained(2000), Some(1940));
        assert!(d.keeps_at_least(2000, 0.6));
        assert!(!TrimDecision { top: 500, bottom: 500 }.keeps_at_least(1000, 0.1));
        assert_eq!(TrimDecision { top: 600, bottom: 500 }.retained(1000), None);
        assert!(TrimDecision { top: 400, bottom: 0 }.keeps_at_least(1000, 0.6));
    }

    #[test]
    fn no_detection_returns_image_unchanged() {
        let trimmer = fixed_trimmer(&[Detection::NoMatch, Detection::NoMatch]);
        let img = noise_image(50, 200, 1);
        let (out, report) = trimmer.trim_with_report(img.clone());
        assert_eq!(out, img);
        assert!(!report.trimmed());
        assert!(report.rejected.is_empty());
    }

    #[test]
    fn template_tier_accepts_sixty_percent_retention() {
        let trimmer = fixed_trimmer(&[matched(300, 100, TrustTier::Template)]);
        let (out, report) = trimmer.trim_with_report(noise_image(20, 1000, 2));
        assert_eq!(out.height(), 600);
        assert_eq!(report.applied.map(|a| a.tier), Some(TrustTier::Template));
    }

    #[test]
    fn pattern_tier_requires_ninety_percent_retention() {
        let trimmer = fixed_trimmer(&[matched(150, 0, TrustTier::Pattern)]);
        let img = noise_image(20, 1000, 3);
        let (out, report) = trimmer.trim_with_report(img.clone());
        assert_eq!(out, img);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].retained, 850);

        let trimmer = fixed_trimmer(&[matched(100, 0, TrustTier::Pattern)]);
        let out = trimmer.trim(img.clone());
        assert_eq!(out.height(), 900);
        assert_eq!(out.get_pixel(5, 0), img.get_pixel(5, 100));
    }

    #[test]
    fn rejected_template_falls_through_to_next_strategy() {
        let trimmer = fixed_trimmer(&[
            matched(300, 300, TrustTier::Template),
            matched(0, 90, TrustTier::Pattern),
        ]);
        let (out, report) = trimmer.trim_with_report(noise_image(20, 1000, 4));
        assert_eq!(out.height(), 910);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.applied.map(|a| a.tier), Some(TrustTier::Pattern));
    }

    #[test]
    fn first_accepted_strategy_wins() {
        let trimmer = fixed_trimmer(&[
            matched(10, 0, TrustTier::Template),
            matched(50, 50, TrustTier::Pattern),
        ]);
        assert_eq!(trimmer.trim(noise_image(20, 1000, 5)).height(), 990);
    }

    #[test]
    fn pattern_needs_unanimous_votes() {
        let strategy = PatternStrategy::new(
            BoundaryDetector::new(crate::config::BoundaryConfig::default()),
            TrimConfig::default(),
        );
        let none = verdict(0, 0);
        assert!(strategy.decide(2000, &verdict(250, 2), &none).is_empty());
        assert_eq!(strategy.decide(2000, &verdict(250, 3), &none).top, 250);
    }

    #[test]
    fn pattern_trim_must_exceed_pixel_floor() {
        let strategy = PatternStrategy::new(
            BoundaryDetector::new(crate::config::BoundaryConfig::default()),
            TrimConfig::default(),
        );
        let none = verdict(0, 0);
        assert!(strategy.decide(2000, &verdict(80, 3), &none).is_empty());
        assert_eq!(strategy.decide(2000, &none, &verdict(81, 3)).bottom, 81);
    }

    #[test]
    fn pattern_trim_is_capped_per_side() {
        let strategy = PatternStrategy::new(
            BoundaryDetector::new(crate::config::BoundaryConfig::default()),
            TrimConfig::default(),
        );
        let d = strategy.decide(2000, &verdict(500, 3), &verdict(120, 2));
        assert_eq!(d, TrimDecision { top: 300, bottom: 0 });
    }

    #[test]
    fn template_banner_is_trimmed_and_trim_is_idempotent() {
        let banner = noise_image(300, 60, 7);
        let mut img = noise_image(340, 2000, 8);
        paste(&mut img, &banner, 20, 0);

        let trimmer = WatermarkTrimmer::new(&PipelineConfig::default(), banner_store(banner));
        let (once, report) = trimmer.trim_with_report(img);
        assert_eq!(once.height(), 1940);
        assert_eq!(
            report.applied.map(|a| a.decision),
            Some(TrimDecision { top: 60, bottom: 0 })
        );

        let (twice, report) = trimmer.trim_with_report(once.clone());
        assert_eq!(twice, once);
        assert!(!report.trimmed());
    }

    #[test]
    fn template_trim_removing_too_much_is_discarded() {
        let banner = noise_image(100, 90, 12);
        let mut img = noise_image(120, 300, 13);
        paste(&mut img, &banner, 0, 0);
        paste(&mut img, &banner, 0, 210);

        let trimmer = WatermarkTrimmer::new(&PipelineConfig::default(), banner_store(banner));
        let (out, report) = trimmer.trim_with_report(img.clone());
        assert_eq!(out, img);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].decision, TrimDecision { top: 90, bottom: 90 });
    }
}
