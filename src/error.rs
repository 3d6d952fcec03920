// Error types module
// None of these are fatal: callers log them and leave the screen unchanged

use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn an image file into pixels
#[derive(Error, Debug)]
pub enum ImageLoadError {
    /// The file could not be read (missing, permission denied, ...)
    #[error("Failed to read image file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not a decodable image
    #[error("Failed to decode image {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Neither the content nor the extension identify a known format
    #[error("Unsupported image format: {path:?}")]
    UnsupportedFormat { path: PathBuf },
}

/// Failure to enumerate the image directory. Always treated as "no images".
#[derive(Error, Debug)]
pub enum DirectoryScanError {
    #[error("Image directory does not exist: {0:?}")]
    Missing(PathBuf),

    #[error("Failed to read image directory {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Failure to read the persisted config. Defaults are used instead.
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure while capturing or saving a region screenshot
#[derive(Error, Debug)]
pub enum ScreenshotError {
    #[error("Screen capture failed: {0}")]
    Capture(String),

    #[error("No region selected")]
    EmptySelection,

    #[error("Failed to save screenshot {path:?}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to create screenshot directory {path:?}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
