//! Persisting captured stills and their metadata.

use crate::traits::{Frame, FrameMetadata, StreamInfo};
use log::{debug, info, warn};
use serde::Deserialize;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Errors raised by an output sink.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// Writing the image failed.
    #[error("Failed to write image to {destination}: {source}")]
    Image {
        /// Where the image was going.
        destination: Destination,
        /// Underlying error.
        source: io::Error,
    },
    /// Writing the metadata failed.
    #[error("Failed to write metadata to {destination}: {source}")]
    Metadata {
        /// Where the metadata was going.
        destination: Destination,
        /// Underlying error.
        source: io::Error,
    },
    /// Metadata could not be serialized.
    #[error("Failed to serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for output operations.
pub type Result<T> = std::result::Result<T, OutputError>;

/// A file path, or standard output when given as `-`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Standard output.
    Stdout,
    /// A file on disk.
    File(PathBuf),
}

impl From<&str> for Destination {
    fn from(s: &str) -> Self {
        if s == "-" {
            Self::Stdout
        } else {
            Self::File(PathBuf::from(s))
        }
    }
}

impl FromStr for Destination {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl<'de> Deserialize<'de> for Destination {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.as_str()))
    }
}

impl Destination {
    /// Substitute a `%d` or `%0Nd` counter in a file path with `index`.
    /// Paths without a counter, and stdout, come back unchanged.
    #[must_use]
    pub fn for_capture(&self, index: u32) -> Self {
        match self {
            Self::Stdout => Self::Stdout,
            Self::File(path) => Self::File(expand_counter(path, index)),
        }
    }

    fn open(&self) -> io::Result<Box<dyn Write>> {
        Ok(match self {
            Self::Stdout => Box::new(io::stdout().lock()),
            Self::File(path) => Box::new(BufWriter::new(File::create(path)?)),
        })
    }
}

/// Replace the first `%d` / `%0Nd` in `path` with `index`.
fn expand_counter(path: &Path, index: u32) -> PathBuf {
    let raw = path.to_string_lossy();
    let Some(start) = raw.find('%') else {
        return path.to_path_buf();
    };
    let rest = raw.get(start + 1..).unwrap_or_default();
    let Some(end) = rest.find('d') else {
        return path.to_path_buf();
    };
    let spec = rest.get(..end).unwrap_or_default();
    if !spec.chars().all(|c| c.is_ascii_digit()) {
        return path.to_path_buf();
    }
    let width = spec.parse::<usize>().unwrap_or(0);
    let mut expanded = String::with_capacity(raw.len() + width);
    expanded.push_str(raw.get(..start).unwrap_or_default());
    let _ = write!(expanded, "{index:0width$}");
    expanded.push_str(rest.get(end + 1..).unwrap_or_default());
    PathBuf::from(expanded)
}

/// Metadata file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MetadataFormat {
    /// Pretty-printed JSON object.
    #[default]
    Json,
    /// One `key=value` pair per line.
    Txt,
}

/// Where and how to write still metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTarget {
    /// File or stdout.
    pub destination: Destination,
    /// Serialization format.
    pub format: MetadataFormat,
}

/// Render `metadata` in `format`, newline terminated.
pub fn format_metadata(format: MetadataFormat, metadata: &FrameMetadata) -> Result<String> {
    match format {
        MetadataFormat::Json => {
            let mut text = serde_json::to_string_pretty(metadata)?;
            text.push('\n');
            Ok(text)
        }
        MetadataFormat::Txt => {
            let value = serde_json::to_value(metadata)?;
            let mut text = String::new();
            if let serde_json::Value::Object(fields) = value {
                for (key, value) in fields {
                    let _ = writeln!(text, "{key}={value}");
                }
            }
            Ok(text)
        }
    }
}

/// Where completed stills go.
pub trait OutputSink {
    /// Persist one still image.
    fn write_image(
        &mut self,
        frame: &Frame,
        info: &StreamInfo,
        destination: &Destination,
        camera_model: &str,
    ) -> Result<()>;

    /// Persist the metadata of a still.
    fn write_metadata(
        &mut self,
        destination: &Destination,
        format: MetadataFormat,
        metadata: &FrameMetadata,
    ) -> Result<()>;
}

/// Writes buffers verbatim to files or stdout.
///
/// Compressed (MJPG) buffers are complete JPEG files already; raw formats are
/// written as-is.
#[derive(Debug, Default)]
pub struct FileSink {
    written: u32,
}

impl FileSink {
    /// Number of images written so far.
    pub const fn written(&self) -> u32 {
        self.written
    }
}

impl OutputSink for FileSink {
    fn write_image(
        &mut self,
        frame: &Frame,
        info: &StreamInfo,
        destination: &Destination,
        camera_model: &str,
    ) -> Result<()> {
        if !info.fourcc.is_compressed() {
            warn!("Writing uncompressed {} buffer", info.fourcc);
        }
        let write = || -> io::Result<()> {
            let mut out = destination.open()?;
            out.write_all(&frame.data)?;
            out.flush()
        };
        write().map_err(|source| OutputError::Image {
            destination: destination.clone(),
            source,
        })?;

        self.written += 1;
        info!(
            "Saved {}x{} {} image from {camera_model} to {destination} ({} bytes)",
            info.width,
            info.height,
            info.fourcc,
            frame.data.len()
        );
        Ok(())
    }

    fn write_metadata(
        &mut self,
        destination: &Destination,
        format: MetadataFormat,
        metadata: &FrameMetadata,
    ) -> Result<()> {
        let text = format_metadata(format, metadata)?;
        let write = || -> io::Result<()> {
            let mut out = destination.open()?;
            out.write_all(text.as_bytes())?;
            out.flush()
        };
        write().map_err(|source| OutputError::Metadata {
            destination: destination.clone(),
            source,
        })?;
        debug!("Wrote metadata to {destination}");
        Ok(())
    }
}
