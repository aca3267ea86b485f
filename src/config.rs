//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::convert::{BayerInterpolation, ImageFormatConverter};
use crate::encoding::PixelEncoding;
use crate::sink::{DisplayMode, FileFormat, DISPLAY_TARGET};
use crate::traits::DeviceDescriptor;
use crate::workflow::{WorkflowOptions, DEFAULT_SERIAL_NUMBER};

/// Log filter used when `RUST_LOG` is unset: warnings, plus the image
/// summaries of `--display log`.
pub fn default_log_filter() -> String {
    format!("warn,{DISPLAY_TARGET}=info")
}

/// Grab color frames from a camera and print the RGB values of the first pixel.
#[derive(Debug, Clone, Parser)]
#[command(name = "rgb-probe", version, about)]
pub struct Config {
    /// Serial number of the camera to use; empty selects any camera
    #[arg(long, env = "RGB_PROBE_SERIAL", default_value = DEFAULT_SERIAL_NUMBER)]
    pub serial: String,

    /// Model name to match (case-insensitive substring)
    #[arg(long, env = "RGB_PROBE_MODEL")]
    pub model: Option<String>,

    /// Pixel format requested from the camera (e.g. RGB8, BayerRG8, YUV422_8)
    #[arg(long, env = "RGB_PROBE_PIXEL_FORMAT", default_value = "RGB8")]
    pub pixel_format: PixelEncoding,

    /// Frame width in pixels; the camera's current width if unset
    #[arg(long, env = "RGB_PROBE_WIDTH", requires = "height")]
    pub width: Option<u32>,

    /// Frame height in pixels; the camera's current height if unset
    #[arg(long, env = "RGB_PROBE_HEIGHT", requires = "width")]
    pub height: Option<u32>,

    /// Number of frames to grab
    #[arg(
        long,
        env = "RGB_PROBE_FRAMES",
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub frames: u32,

    /// Wait for each frame, in milliseconds
    #[arg(long, env = "RGB_PROBE_TIMEOUT_MS", default_value_t = 5000)]
    pub timeout_ms: u64,

    /// Directory the images are written to
    #[arg(long, env = "RGB_PROBE_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Container format of the saved images
    #[arg(long, env = "RGB_PROBE_FILE_FORMAT", value_enum, default_value_t = FileFormat::Bmp)]
    pub file_format: FileFormat,

    /// How images are displayed
    #[arg(long, env = "RGB_PROBE_DISPLAY", value_enum, default_value_t = DisplayMode::Log)]
    pub display: DisplayMode,

    /// Demosaicing method for Bayer frames
    #[arg(
        long,
        env = "RGB_PROBE_BAYER",
        value_enum,
        default_value_t = BayerInterpolation::Bilinear
    )]
    pub bayer: BayerInterpolation,

    /// Wait for Enter before exiting
    #[arg(long, env = "RGB_PROBE_WAIT_ON_EXIT")]
    pub wait_on_exit: bool,

    /// List attached cameras and exit
    #[arg(long)]
    pub list: bool,
}

impl Config {
    /// Camera selection built from `--serial` and `--model`.
    #[must_use]
    pub fn descriptor(&self) -> DeviceDescriptor {
        let mut descriptor = DeviceDescriptor::new();
        let serial = self.serial.trim();
        if !serial.is_empty() {
            descriptor = descriptor.with_serial_number(serial);
        }
        if let Some(model) = self.model.as_deref().filter(|model| !model.is_empty()) {
            descriptor = descriptor.with_model_name(model);
        }
        descriptor
    }

    /// Workflow parameters.
    #[must_use]
    pub fn workflow_options(&self) -> WorkflowOptions {
        WorkflowOptions {
            pixel_format: self.pixel_format,
            frame_size: self.width.zip(self.height),
            frames: self.frames,
            timeout: Duration::from_millis(self.timeout_ms),
            output_dir: self.output_dir.clone(),
            file_format: self.file_format,
        }
    }

    /// Converter configured with the selected demosaicing method.
    #[must_use]
    pub const fn converter(&self) -> ImageFormatConverter {
        ImageFormatConverter::new().with_bayer_interpolation(self.bayer)
    }
}
