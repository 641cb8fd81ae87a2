//! Command-line arguments.

use crate::config::Encoding;
use crate::gpio::GpioBackend;
use crate::output::MetadataFormat;
use clap::Parser;
use std::path::PathBuf;

/// Capture stills from a camera on timeout, keypress or shutter button
#[derive(Parser, Debug)]
#[command(name = "pi-cam-shutter")]
#[command(version, about = "Viewfinder-to-still capture with keyboard and GPIO triggers", long_about = None)]
pub struct Args {
    /// Output file for stills (`-` for stdout, `%d` for a capture counter)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Capture after this many milliseconds (0 disables)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Metadata output file (`-` for stdout)
    #[arg(long)]
    pub metadata: Option<String>,

    /// Metadata format
    #[arg(long, value_enum)]
    pub metadata_format: Option<MetadataFormat>,

    /// Verbosity level (0-3)
    #[arg(short, long)]
    pub verbose: Option<u8>,

    /// Camera device index (/dev/videoN)
    #[arg(long)]
    pub camera: Option<u32>,

    /// Still width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Still height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Viewfinder width in pixels
    #[arg(long)]
    pub viewfinder_width: Option<u32>,

    /// Viewfinder height in pixels
    #[arg(long)]
    pub viewfinder_height: Option<u32>,

    /// Still pixel encoding
    #[arg(long, value_enum)]
    pub encoding: Option<Encoding>,

    /// Per-frame device timeout in milliseconds
    #[arg(long)]
    pub frame_timeout: Option<u64>,

    /// Number of driver buffers per stream
    #[arg(long)]
    pub buffer_count: Option<u32>,

    /// Give up after this many consecutive device timeouts (default: never)
    #[arg(long)]
    pub max_restarts: Option<u32>,

    /// GPIO binding for the shutter button
    #[arg(long, value_enum)]
    pub gpio_backend: Option<GpioBackend>,

    /// GPIO chip name or path
    #[arg(long)]
    pub gpio_chip: Option<String>,

    /// GPIO line offset of the shutter button
    #[arg(long)]
    pub gpio_line: Option<u32>,

    /// Treat a low level on the button line as pressed
    #[arg(long)]
    pub gpio_active_low: bool,

    /// Key that triggers a capture
    #[arg(long)]
    pub trigger_key: Option<char>,

    /// Config file path
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}
