//! Grab color frames and inspect their RGB values.
//!
//! One run locates a camera, configures its output encoding, grabs a bounded
//! number of frames and, for every color frame, converts it to packed RGB,
//! reads the first pixel, converts to planar RGB, splits the three planes and
//! hands all four images to the sink and viewer.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::buffer::{Channel, Image};
use crate::convert::FormatConverter;
use crate::encoding::PixelEncoding;
use crate::session::Session;
use crate::sink::{FileFormat, ImageSink, ImageViewer};
use crate::traits::{
    AcquisitionFailure, CameraError, DeviceDescriptor, DeviceHandle, DeviceLocator, Frame,
    GrabOutcome, Result,
};

/// Serial number of the camera the workflow looks for by default.
pub const DEFAULT_SERIAL_NUMBER: &str = "21824812";

/// Default wait for each frame.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Base name of the packed RGB output file.
const RGB_FILE_STEM: &str = "RGB";

/// Parameters of one workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowOptions {
    /// Encoding the camera is asked to deliver.
    pub pixel_format: PixelEncoding,
    /// Frame size to request; the device's current size when `None`.
    pub frame_size: Option<(u32, u32)>,
    /// Number of frames to grab.
    pub frames: u32,
    /// Wait for each frame.
    pub timeout: Duration,
    /// Directory the output files are written to.
    pub output_dir: PathBuf,
    /// Container format of the output files.
    pub file_format: FileFormat,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            pixel_format: PixelEncoding::Rgb8,
            frame_size: None,
            frames: 1,
            timeout: DEFAULT_TIMEOUT,
            output_dir: PathBuf::from("."),
            file_format: FileFormat::Bmp,
        }
    }
}

/// Red, green and blue sample values of one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelValues {
    /// Red sample.
    pub red: u8,
    /// Green sample.
    pub green: u8,
    /// Blue sample.
    pub blue: u8,
}

/// What happened to one grabbed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameReport {
    /// The frame's encoding carries no color; it was not processed.
    NotColor {
        /// Delivered encoding.
        encoding: PixelEncoding,
    },
    /// The frame was converted, inspected and saved.
    Color {
        /// Delivered encoding.
        encoding: PixelEncoding,
        /// Whether a conversion to packed RGB was needed.
        converted: bool,
        /// First pixel read from the packed RGB buffer.
        packed: ChannelValues,
        /// First pixel read from the red, green and blue planes.
        planar: ChannelValues,
        /// Files written, packed image first.
        saved: Vec<PathBuf>,
    },
    /// The hardware failed to fill the buffer.
    Failed {
        /// Failure reported by the device.
        failure: AcquisitionFailure,
    },
}

const NOT_COLOR_HINT: &str =
    "Image is not color. Please set camera's Pixel Format to either Bayer, RGB, or YUV/YCbCr.";

impl fmt::Display for FrameReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotColor { encoding } => {
                writeln!(f, "Image Pixel format: {encoding}")?;
                f.write_str(NOT_COLOR_HINT)
            }
            Self::Color {
                encoding,
                packed,
                planar,
                ..
            } => {
                writeln!(f, "Image Pixel format: {encoding}")?;
                writeln!(f)?;
                writeln!(f, "Accessing RGB values of image...")?;
                writeln!(f, "Red Value of first pixel   : {}", packed.red)?;
                writeln!(f, "Green Value of first pixel : {}", packed.green)?;
                writeln!(f, "Blue Value of first pixel  : {}", packed.blue)?;
                writeln!(f)?;
                writeln!(
                    f,
                    "Accessing RGB values of RGB image converted to planar format..."
                )?;
                writeln!(f, "Value of first pixel in Red Plane   : {}", planar.red)?;
                writeln!(f, "Value of first pixel in Green Plane : {}", planar.green)?;
                write!(f, "Value of first pixel in Blue Plane  : {}", planar.blue)
            }
            Self::Failed { failure } => write!(f, "Error: {failure}"),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// The camera that was used.
    pub device: DeviceHandle,
    /// One report per grabbed frame, in acquisition order.
    pub frames: Vec<FrameReport>,
}

/// Receives progress as the workflow runs.
pub trait Reporter {
    /// The camera was opened.
    fn device_opened(&mut self, device: &DeviceHandle);

    /// A frame was processed.
    fn frame_processed(&mut self, report: &FrameReport);
}

/// Reporter printing human-readable status lines to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn device_opened(&mut self, device: &DeviceHandle) {
        println!("Using device {}", device.model_name);
    }

    fn frame_processed(&mut self, report: &FrameReport) {
        println!("{report}");
    }
}

/// Reporter that discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn device_opened(&mut self, _device: &DeviceHandle) {}

    fn frame_processed(&mut self, _report: &FrameReport) {}
}

/// The acquire, convert, inspect and save sequence, wired to its collaborators.
pub struct Pipeline<'a> {
    converter: &'a dyn FormatConverter,
    sink: &'a dyn ImageSink,
    viewer: &'a mut dyn ImageViewer,
    reporter: &'a mut dyn Reporter,
}

impl<'a> Pipeline<'a> {
    /// Wire a pipeline.
    pub fn new(
        converter: &'a dyn FormatConverter,
        sink: &'a dyn ImageSink,
        viewer: &'a mut dyn ImageViewer,
        reporter: &'a mut dyn Reporter,
    ) -> Self {
        Self {
            converter,
            sink,
            viewer,
            reporter,
        }
    }

    /// Run the whole workflow against the first device matching `descriptor`.
    ///
    /// A frame the hardware failed to fill is reported and skipped; every
    /// other failure aborts the run. The camera is released on every path.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while locating, opening, configuring,
    /// grabbing, converting or saving.
    pub fn run<L: DeviceLocator>(
        &mut self,
        locator: &L,
        descriptor: &DeviceDescriptor,
        options: &WorkflowOptions,
    ) -> Result<RunSummary> {
        let handle = locator.locate(descriptor)?;
        let mut session = Session::open(locator, &handle)?;
        self.reporter.device_opened(&handle);

        match options.frame_size {
            Some((width, height)) => {
                session.configure_with_size(options.pixel_format, width, height)?;
            }
            None => {
                session.configure(options.pixel_format)?;
            }
        }

        let mut reports = Vec::new();
        let mut grabbing = session.start_grabbing(options.frames)?;
        while grabbing.is_grabbing() {
            let frame = grabbing.retrieve(options.timeout)?;
            let report = self.process_frame(frame, options)?;
            self.reporter.frame_processed(&report);
            reports.push(report);
        }
        drop(grabbing);
        session.close();

        Ok(RunSummary {
            device: handle,
            frames: reports,
        })
    }

    /// Classify, convert, inspect, save and show one frame.
    ///
    /// # Errors
    ///
    /// Returns conversion, plane extraction and save errors.
    pub fn process_frame(
        &mut self,
        frame: Frame,
        options: &WorkflowOptions,
    ) -> Result<FrameReport> {
        let Frame {
            encoding,
            metadata,
            outcome,
        } = frame;

        let image = match outcome {
            GrabOutcome::Succeeded(image) => image,
            GrabOutcome::Failed(failure) => {
                tracing::warn!(sequence = metadata.sequence, %failure, "frame not acquired");
                return Ok(FrameReport::Failed { failure });
            }
        };

        if !encoding.is_color() {
            tracing::info!(sequence = metadata.sequence, %encoding, "frame is not color");
            return Ok(FrameReport::NotColor { encoding });
        }

        let converted = !encoding.is_packed_rgb();
        let rgb = if converted {
            self.converter.convert(PixelEncoding::Rgb8, &image)?
        } else {
            image
        };
        let packed = first_pixel(&rgb)?;

        let planar = self.converter.convert(PixelEncoding::Rgb8Planar, &rgb)?;
        let [red, green, blue] = Channel::ALL.map(|channel| planar.extract_channel(channel));
        let planes = [red?, green?, blue?];
        let planar_values = ChannelValues {
            red: first_sample(&planes[0])?,
            green: first_sample(&planes[1])?,
            blue: first_sample(&planes[2])?,
        };

        tracing::info!(
            sequence = metadata.sequence,
            %encoding,
            converted,
            red = packed.red,
            green = packed.green,
            blue = packed.blue,
            "inspected frame"
        );

        let saved = self.save_all(&rgb, &planes, options)?;

        self.viewer.show(0, &rgb);
        for (slot, plane) in (1..).zip(&planes) {
            self.viewer.show(slot, plane);
        }

        Ok(FrameReport::Color {
            encoding,
            converted,
            packed,
            planar: planar_values,
            saved,
        })
    }

    fn save_all(
        &self,
        rgb: &Image,
        planes: &[Image; 3],
        options: &WorkflowOptions,
    ) -> Result<Vec<PathBuf>> {
        let extension = options.file_format.extension();
        let rgb_path = options
            .output_dir
            .join(format!("{RGB_FILE_STEM}.{extension}"));
        self.sink.save(&rgb_path, options.file_format, rgb)?;

        let mut saved = vec![rgb_path];
        for (channel, plane) in Channel::ALL.into_iter().zip(planes) {
            let path = options
                .output_dir
                .join(format!("{}_plane.{extension}", channel.name()));
            self.sink.save(&path, options.file_format, plane)?;
            saved.push(path);
        }
        Ok(saved)
    }
}

fn first_pixel(rgb: &Image) -> Result<ChannelValues> {
    match rgb.data() {
        [red, green, blue, ..] => Ok(ChannelValues {
            red: *red,
            green: *green,
            blue: *blue,
        }),
        _ => Err(empty_image(rgb)),
    }
}

fn first_sample(plane: &Image) -> Result<u8> {
    plane.data().first().copied().ok_or_else(|| empty_image(plane))
}

fn empty_image(image: &Image) -> CameraError {
    CameraError::InvalidBuffer {
        encoding: image.encoding(),
        reason: "image holds no pixels".to_owned(),
    }
}

/// Process exit code for a workflow result: `0` on success, `1` otherwise.
pub const fn exit_code<T, E>(result: &std::result::Result<T, E>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}
