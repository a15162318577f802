//! Reading input folders and writing output sections.

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::{ImageFormat, RgbImage};
use log::{info, warn};

use crate::compositor::Section;
use crate::error::{Error, Result};

/// Check if a file path has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Chunk {
    Number(String),
    Text(String),
}

impl Ord for Chunk {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            // digits without leading zeros: longer is larger, then lexicographic
            (Chunk::Number(a), Chunk::Number(b)) => a
                .len()
                .cmp(&b.len())
                .then_with(|| a.cmp(b)),
            (Chunk::Text(a), Chunk::Text(b)) => a.cmp(b),
            (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Chunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn push_chunk(chunks: &mut Vec<Chunk>, run: &str, digits: bool) {
    if digits {
        let trimmed = run.trim_start_matches('0');
        chunks.push(Chunk::Number(if trimmed.is_empty() {
            "0".to_string()
        } else {
            trimmed.to_string()
        }));
    } else {
        chunks.push(Chunk::Text(run.to_lowercase()));
    }
}

/// Split a name into alternating text and digit runs.
fn chunks(name: &str) -> Vec<Chunk> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut digits = None;
    for (i, c) in name.char_indices() {
        let is_digit = c.is_ascii_digit();
        if digits == Some(!is_digit) {
            push_chunk(&mut out, &name[start..i], !is_digit);
            start = i;
        }
        digits = Some(is_digit);
    }
    if let Some(d) = digits {
        push_chunk(&mut out, &name[start..], d);
    }
    out
}

/// Order names so embedded numbers compare by value (`page2` before `page10`).
///
/// Text runs compare case-insensitively.
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    chunks(a).cmp(&chunks(b)).then_with(|| a.cmp(b))
}

/// Supported image files directly inside `dir`, in natural filename order.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && is_supported_image(p))
        .collect();
    paths.sort_by(|a, b| {
        let name = |p: &PathBuf| p.file_name().unwrap_or_default().to_string_lossy().into_owned();
        natural_cmp(&name(a), &name(b))
    });
    Ok(paths)
}

/// Decode every supported image in `dir` to RGB, in natural filename order.
///
/// Files that fail to decode are skipped with a warning.
///
/// # Errors
///
/// Returns [`Error::NoImages`] when nothing could be loaded, or an I/O error
/// if the directory cannot be read.
pub fn load_images(dir: &Path) -> Result<Vec<RgbImage>> {
    let images: Vec<RgbImage> = list_images(dir)?
        .into_iter()
        .filter_map(|path| match image::open(&path) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                None
            }
        })
        .collect();
    if images.is_empty() {
        return Err(Error::NoImages(dir.to_path_buf()));
    }
    info!("Loaded {} images from {}", images.len(), dir.display());
    Ok(images)
}

/// Sibling output directory for an input folder.
///
/// Example: `"/comics/My Comic"` becomes `"/comics/My_Comic[Stitched]"`.
#[must_use]
pub fn default_output_dir(input: &Path) -> PathBuf {
    let raw = input
        .file_name()
        .map_or_else(|| "images".to_string(), |n| n.to_string_lossy().into_owned());
    let cleaned: String = raw.chars().filter(|c| !"<>:\"|?*\\".contains(*c)).collect();
    let mut name = cleaned.trim_end().replace(' ', "_");
    if name.is_empty() {
        name = "images".to_string();
    }
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{name}[Stitched]"))
}

/// Encoding used for output sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// JPEG with a configurable quality.
    #[default]
    Jpg,
    /// Lossless PNG.
    Png,
    /// Lossless WebP.
    Webp,
    /// Uncompressed BMP.
    Bmp,
}

impl OutputFormat {
    /// File extension without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            "bmp" => Ok(Self::Bmp),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Save an RGB image, picking the encoder from the file extension.
///
/// `quality` (1-100) applies to JPEG only.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbImage, path: &Path, quality: u8) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            let file = fs::File::create(path)?;
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                std::io::BufWriter::new(file),
                quality.clamp(1, 100),
            );
            encoder.encode_image(img)?;
        }
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp => {
            img.save_with_format(path, format)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}

/// Write sections as `01.<ext>`, `02.<ext>`, ... into `dir`, creating it if needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or any write fails.
pub fn save_sections(
    sections: &[Section],
    dir: &Path,
    format: OutputFormat,
    quality: u8,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(sections.len());
    for (i, section) in sections.iter().enumerate() {
        let path = dir.join(format!("{:02}.{}", i + 1, format.extension()));
        save_image(&section.image, &path, quality)?;
        written.push(path);
    }
    info!("Wrote {} sections to {}", written.len(), dir.display());
    Ok(written)
}
