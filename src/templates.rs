//! Reference watermark templates.
//!
//! Templates come from two places: image files in a directory (exact crops of
//! known watermark banners) and text rendered on the fly for the width of the
//! image being checked. Rendering goes through a [`GlyphRenderer`] picked by
//! [`FontResolver`]; when no font can draw the text a plain rectangle marker
//! is used instead so matching still has something to work with.

use std::fmt;
use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use log::{debug, info, warn};

use crate::config::MatchConfig;
use crate::error::{Error, Result};
use crate::io::is_supported_image;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// A named reference raster used for read-only matching.
#[derive(Clone)]
pub struct Template {
    name: String,
    image: RgbImage,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .finish()
    }
}

impl Template {
    /// Wrap an already decoded image.
    #[must_use]
    pub fn new(name: impl Into<String>, image: RgbImage) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }

    /// Decode a template from an image file, named after the file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateDecode`] if the file cannot be read or decoded.
    pub fn from_file(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .map_err(|source| Error::TemplateDecode {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgb8();
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |f| f.to_string_lossy().to_string());
        Ok(Self::new(name, image))
    }

    /// Template name (file name or `synthetic_<text>`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Template pixels.
    #[must_use]
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Template width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Template height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Load every supported image in `dir` as a template.
///
/// Files that fail to decode are skipped with a warning. A missing or
/// unreadable directory yields no templates. Order follows the directory
/// listing.
#[must_use]
pub fn load_templates(dir: &Path) -> Vec<Template> {
    let entries = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            warn!("Template directory {} not readable: {e}", dir.display());
            return Vec::new();
        }
    };

    let templates: Vec<Template> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_supported_image(path))
        .filter_map(|path| match Template::from_file(&path) {
            Ok(template) => {
                debug!(
                    "Loaded watermark template {} ({}x{})",
                    template.name(),
                    template.width(),
                    template.height()
                );
                Some(template)
            }
            Err(e) => {
                warn!("Skipping template: {e}");
                None
            }
        })
        .collect();

    info!(
        "Loaded {} watermark template(s) from {}",
        templates.len(),
        dir.display()
    );
    templates
}

/// Something that can measure and draw a line of text.
pub trait GlyphRenderer: Send + Sync {
    /// Whether every visible character of `text` has a real glyph.
    fn covers(&self, text: &str) -> bool;

    /// Pixel size of `text` when drawn.
    fn measure(&self, text: &str) -> (u32, u32);

    /// Draw `text` in black with its top-left corner at `(x, y)`.
    fn draw(&self, canvas: &mut RgbImage, x: i32, y: i32, text: &str);
}

/// A TrueType/OpenType font drawn with `imageproc`.
pub struct FontGlyphs {
    font: FontVec,
    scale: PxScale,
    source: PathBuf,
}

impl FontGlyphs {
    /// Parse the first face of a font or font collection file.
    #[must_use]
    pub fn from_file(path: &Path, size: f32) -> Option<Self> {
        let data = std::fs::read(path).ok()?;
        let font = FontVec::try_from_vec_and_index(data, 0).ok()?;
        Some(Self {
            font,
            scale: PxScale::from(size),
            source: path.to_path_buf(),
        })
    }

    /// File the font was loaded from.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl GlyphRenderer for FontGlyphs {
    fn covers(&self, text: &str) -> bool {
        text.chars()
            .filter(|c| !c.is_whitespace())
            .all(|c| self.font.glyph_id(c).0 != 0)
    }

    fn measure(&self, text: &str) -> (u32, u32) {
        text_size(self.scale, &self.font, text)
    }

    fn draw(&self, canvas: &mut RgbImage, x: i32, y: i32, text: &str) {
        draw_text_mut(canvas, BLACK, x, y, self.scale, &self.font, text);
    }
}

/// Probes an ordered list of font files for one that can render a text.
#[derive(Debug, Clone)]
pub struct FontResolver {
    candidates: Vec<PathBuf>,
    size: f32,
}

const SYSTEM_FONTS: &[&str] = &[
    // CJK-capable faces first
    "C:/Windows/Fonts/msyh.ttc",
    "C:/Windows/Fonts/simsun.ttc",
    "C:/Windows/Fonts/simhei.ttf",
    "/System/Library/Fonts/PingFang.ttc",
    "/System/Library/Fonts/STHeiti Medium.ttc",
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
    // Latin-only fallbacks
    "C:/Windows/Fonts/arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
];

impl Default for FontResolver {
    fn default() -> Self {
        Self::new(SYSTEM_FONTS.iter().map(PathBuf::from).collect(), 36.0)
    }
}

impl FontResolver {
    /// Resolver over an explicit candidate list, rendering at `size` pixels.
    #[must_use]
    pub fn new(candidates: Vec<PathBuf>, size: f32) -> Self {
        Self { candidates, size }
    }

    /// Resolver over the built-in system font list at the configured font size.
    #[must_use]
    pub fn system(config: &MatchConfig) -> Self {
        Self {
            size: config.font_size,
            ..Self::default()
        }
    }

    /// Pick a renderer for `text`.
    ///
    /// Prefers the first font covering every character; otherwise the first
    /// font that parses at all; otherwise `None`.
    #[must_use]
    pub fn resolve(&self, text: &str) -> Option<Box<dyn GlyphRenderer>> {
        let mut fallback = None;
        for path in &self.candidates {
            let Some(font) = FontGlyphs::from_file(path, self.size) else {
                continue;
            };
            if font.covers(text) {
                debug!("Rendering {text:?} with {}", path.display());
                return Some(Box::new(font));
            }
            if fallback.is_none() {
                fallback = Some(font);
            }
        }

        fallback.map(|font| {
            debug!(
                "No font covers {text:?}, falling back to {}",
                font.source().display()
            );
            Box::new(font) as Box<dyn GlyphRenderer>
        })
    }
}

/// Render `text` centered on a white canvas of `width` x `height`.
///
/// Without a renderer, or when the text does not fit inside the canvas, a
/// hollow black rectangle over the middle half of the canvas is drawn instead.
#[must_use]
pub fn synthesize_text_template(
    text: &str,
    width: u32,
    height: u32,
    renderer: Option<&dyn GlyphRenderer>,
) -> Template {
    let mut canvas = RgbImage::from_pixel(width, height, WHITE);
    let name = format!("synthetic_{text}");

    if let Some(renderer) = renderer {
        let (text_w, text_h) = renderer.measure(text);
        let x = (i64::from(width) - i64::from(text_w)) / 2;
        let y = (i64::from(height) - i64::from(text_h)) / 2;
        if x > 0 && y > 0 {
            // both are below the canvas size here
            #[allow(clippy::cast_possible_truncation)]
            renderer.draw(&mut canvas, x as i32, y as i32, text);
            return Template::new(name, canvas);
        }
        debug!("Text {text:?} does not fit a {width}x{height} template, using marker");
    }

    draw_marker(&mut canvas);
    Template::new(name, canvas)
}

fn draw_marker(canvas: &mut RgbImage) {
    let (w, h) = canvas.dimensions();
    let (x0, y0) = (w / 4, h / 4);
    let (x1, y1) = (3 * w / 4, 3 * h / 4);
    for inset in 0..2u32 {
        let rw = (x1 - x0 + 1).saturating_sub(2 * inset);
        let rh = (y1 - y0 + 1).saturating_sub(2 * inset);
        if rw == 0 || rh == 0 {
            break;
        }
        #[allow(clippy::cast_possible_wrap)]
        let rect = Rect::at((x0 + inset) as i32, (y0 + inset) as i32).of_size(rw, rh);
        draw_hollow_rect_mut(canvas, rect, BLACK);
    }
}

struct SyntheticText {
    text: String,
    renderer: Option<Box<dyn GlyphRenderer>>,
}

/// File templates plus the texts to synthesize per image width.
///
/// Built once per run; fonts are resolved up front.
pub struct TemplateStore {
    files: Vec<Template>,
    synthetic: Vec<SyntheticText>,
    synthetic_height: u32,
}

impl fmt::Debug for TemplateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateStore")
            .field("files", &self.files)
            .field(
                "synthetic",
                &self.synthetic.iter().map(|s| &s.text).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl TemplateStore {
    /// Store with no templates at all; matching never fires.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            files: Vec::new(),
            synthetic: Vec::new(),
            synthetic_height: 0,
        }
    }

    /// Store from already loaded file templates and the configured synthetic texts.
    #[must_use]
    pub fn new(files: Vec<Template>, config: &MatchConfig, resolver: &FontResolver) -> Self {
        let synthetic = config
            .synthetic_texts
            .iter()
            .map(|text| SyntheticText {
                text: text.clone(),
                renderer: resolver.resolve(text),
            })
            .collect();
        Self {
            files,
            synthetic,
            synthetic_height: config.synthetic_height,
        }
    }

    /// Load file templates from `dir` (if any) and resolve fonts from the system list.
    #[must_use]
    pub fn load(dir: Option<&Path>, config: &MatchConfig) -> Self {
        let files = dir.map(load_templates).unwrap_or_default();
        Self::new(files, config, &FontResolver::system(config))
    }

    /// Templates decoded from files.
    #[must_use]
    pub fn file_templates(&self) -> &[Template] {
        &self.files
    }

    /// Render the synthetic templates for an image of the given width.
    #[must_use]
    pub fn synthesize_for_width(&self, width: u32) -> Vec<Template> {
        if width == 0 {
            return Vec::new();
        }
        self.synthetic
            .iter()
            .map(|s| {
                synthesize_text_template(&s.text, width, self.synthetic_height, s.renderer.as_deref())
            })
            .collect()
    }

    /// Whether the store can produce any template at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.synthetic.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Draws a solid block the size it claims to measure.
    struct BlockGlyphs {
        size: (u32, u32),
    }

    impl GlyphRenderer for BlockGlyphs {
        fn covers(&self, _text: &str) -> bool {
            true
        }

        fn measure(&self, _text: &str) -> (u32, u32) {
            self.size
        }

        #[allow(clippy::cast_sign_loss)]
        fn draw(&self, canvas: &mut RgbImage, x: i32, y: i32, _text: &str) {
            for dy in 0..self.size.1 {
                for dx in 0..self.size.0 {
                    canvas.put_pixel(x as u32 + dx, y as u32 + dy, BLACK);
                }
            }
        }
    }

    #[test]
    fn synthesize_without_renderer_draws_marker() {
        let t = synthesize_text_template("baozi", 400, 80, None);
        assert_eq!(t.name(), "synthetic_baozi");
        assert_eq!((t.width(), t.height()), (400, 80));
        assert_eq!(*t.image().get_pixel(100, 20), BLACK);
        assert_eq!(*t.image().get_pixel(101, 21), BLACK);
        assert_eq!(*t.image().get_pixel(200, 40), WHITE);
        assert_eq!(*t.image().get_pixel(10, 5), WHITE);
    }

    #[test]
    fn synthesize_centers_rendered_text() {
        let renderer = BlockGlyphs { size: (100, 20) };
        let t = synthesize_text_template("baozi", 400, 80, Some(&renderer));
        assert_eq!(*t.image().get_pixel(150, 30), BLACK);
        assert_eq!(*t.image().get_pixel(249, 49), BLACK);
        assert_eq!(*t.image().get_pixel(149, 30), WHITE);
        assert_eq!(*t.image().get_pixel(250, 30), WHITE);
    }

    #[test]
    fn synthesize_falls_back_to_marker_when_text_overflows() {
        let renderer = BlockGlyphs { size: (500, 20) };
        let t = synthesize_text_template("baozi", 400, 80, Some(&renderer));
        assert_eq!(*t.image().get_pixel(100, 20), BLACK);
        assert_eq!(*t.image().get_pixel(200, 40), WHITE);
    }

    #[test]
    fn marker_survives_tiny_canvas() {
        let t = synthesize_text_template("x", 2, 2, None);
        assert_eq!((t.width(), t.height()), (2, 2));
    }

    #[test]
    fn resolver_without_usable_fonts_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.ttf");
        std::fs::write(&bogus, b"not a font").unwrap();
        let resolver = FontResolver::new(
            vec![dir.path().join("missing.ttf"), bogus],
            36.0,
        );
        assert!(resolver.resolve("baozi").is_none());
    }

    #[test]
    fn store_synthesizes_one_template_per_text() {
        let config = MatchConfig::default();
        let resolver = FontResolver::new(Vec::new(), config.font_size);
        let store = TemplateStore::new(Vec::new(), &config, &resolver);
        assert!(!store.is_empty());

        let templates = store.synthesize_for_width(640);
        assert_eq!(templates.len(), config.synthetic_texts.len());
        for t in &templates {
            assert_eq!((t.width(), t.height()), (640, config.synthetic_height));
        }
        assert!(store.synthesize_for_width(0).is_empty());
    }

    #[test]
    fn empty_store_has_nothing() {
        let store = TemplateStore::empty();
        assert!(store.is_empty());
        assert!(store.file_templates().is_empty());
        assert!(store.synthesize_for_width(800).is_empty());
    }

    #[test]
    fn load_templates_skips_broken_and_unsupported_files() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(30, 10, Rgb([10, 20, 30]))
            .save(dir.path().join("banner.png"))
            .unwrap();
        std::fs::write(dir.path().join("broken.png"), b"garbage").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

        let templates = load_templates(dir.path());
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name(), "banner.png");
        assert_eq!((templates[0].width(), templates[0].height()), (30, 10));
    }

    #[test]
    fn load_templates_from_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_templates(&dir.path().join("assets")).is_empty());
    }
}
