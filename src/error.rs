//! Error types for the comic-stitch crate.

use std::path::PathBuf;

/// Errors surfaced by the I/O-facing helpers and configuration validation.
///
/// The trimming and compositing core never returns these: per-image problems
/// are logged and the item is skipped or passed through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A watermark template file could not be decoded.
    #[error("failed to decode template {}: {source}", path.display())]
    TemplateDecode {
        /// Path of the offending template file.
        path: PathBuf,
        /// Underlying decoder error.
        source: image::ImageError,
    },

    /// No supported images were found in the input directory.
    #[error("no supported images found in {}", .0.display())]
    NoImages(PathBuf),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (load, save, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let io_err = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io_err.to_string().contains("gone"));

        let unsupported = Error::UnsupportedFormat("tiff".to_string());
        assert!(unsupported.to_string().contains("tiff"));

        let no_images = Error::NoImages(PathBuf::from("/tmp/chapter-12"));
        assert!(no_images.to_string().contains("chapter-12"));

        let invalid = Error::InvalidConfig("sensitivity must be <= 100".to_string());
        assert!(invalid.to_string().starts_with("invalid configuration"));
    }

    #[test]
    fn template_decode_names_the_file() {
        let source = image::ImageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "truncated",
        ));
        let err = Error::TemplateDecode {
            path: PathBuf::from("assets/banner.png"),
            source,
        };
        let msg = err.to_string();
        assert!(msg.contains("banner.png"));
        assert!(msg.contains("truncated"));
    }
}
