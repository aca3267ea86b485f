//! Core traits and types for the camera abstraction.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::buffer::Image;
use crate::encoding::PixelEncoding;

/// Four-character pixel format code as reported by V4L2 drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// 8-bit greyscale.
    pub const GREY: Self = Self::new(b"GREY");
    /// 16-bit little-endian greyscale.
    pub const Y16: Self = Self::new(b"Y16 ");
    /// 8-bit Bayer, RGGB order.
    pub const RGGB: Self = Self::new(b"RGGB");
    /// 8-bit Bayer, GRBG order.
    pub const GRBG: Self = Self::new(b"GRBG");
    /// 8-bit Bayer, GBRG order.
    pub const GBRG: Self = Self::new(b"GBRG");
    /// 8-bit Bayer, BGGR order.
    pub const BA81: Self = Self::new(b"BA81");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");
    /// BGR3 pixel format (24-bit BGR).
    pub const BGR3: Self = Self::new(b"BGR3");
    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// UYVY pixel format (4:2:2 packed).
    pub const UYVY: Self = Self::new(b"UYVY");
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            let ch = if byte.is_ascii_graphic() || byte == b' ' {
                char::from(byte)
            } else {
                '?'
            };
            write!(f, "{ch}")?;
        }
        Ok(())
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel encoding.
    pub encoding: PixelEncoding,
    /// Bytes per line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl Format {
    /// Describe a tightly packed format.
    #[must_use]
    pub fn new(width: u32, height: u32, encoding: PixelEncoding) -> Self {
        let stride = encoding
            .stride(width as usize)
            .and_then(|stride| u32::try_from(stride).ok())
            .unwrap_or(0);
        let size = encoding
            .buffer_len(width as usize, height as usize)
            .and_then(|size| u32::try_from(size).ok())
            .unwrap_or(0);
        Self {
            width,
            height,
            encoding,
            stride,
            size,
        }
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Identifies which camera to use.
///
/// Every field that is set must match; an empty descriptor matches the
/// first enumerated device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDescriptor {
    serial_number: Option<String>,
    model_name: Option<String>,
}

impl DeviceDescriptor {
    /// Descriptor that matches any device.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            serial_number: None,
            model_name: None,
        }
    }

    /// Require an exact serial number.
    #[must_use]
    pub fn with_serial_number(mut self, serial: &str) -> Self {
        self.serial_number = Some(serial.to_owned());
        self
    }

    /// Require a model name containing `model` (case-insensitive).
    #[must_use]
    pub fn with_model_name(mut self, model: &str) -> Self {
        self.model_name = Some(model.to_owned());
        self
    }

    /// Serial number constraint, if any.
    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    /// Model name constraint, if any.
    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    /// Whether `handle` satisfies every constraint of this descriptor.
    pub fn matches(&self, handle: &DeviceHandle) -> bool {
        let serial_ok = self
            .serial_number
            .as_deref()
            .map_or(true, |serial| handle.serial_number.as_deref() == Some(serial));
        let model_ok = self.model_name.as_deref().map_or(true, |model| {
            handle
                .model_name
                .to_lowercase()
                .contains(&model.to_lowercase())
        });
        serial_ok && model_ok
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.serial_number, &self.model_name) {
            (None, None) => write!(f, "any device"),
            (Some(serial), None) => write!(f, "serial number {serial}"),
            (None, Some(model)) => write!(f, "model {model}"),
            (Some(serial), Some(model)) => write!(f, "model {model} with serial number {serial}"),
        }
    }
}

/// A located device, ready to be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Backend-specific identifier (e.g. `/dev/video2`).
    pub id: String,
    /// Human-readable model name.
    pub model_name: String,
    /// Serial number, when the backend can read one.
    pub serial_number: Option<String>,
    /// Driver capabilities.
    pub capabilities: DeviceCapabilities,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
}

/// Hardware-level failure carried inside a [`Frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionFailure {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable description.
    pub description: String,
}

impl AcquisitionFailure {
    /// The driver marked the buffer as corrupted.
    pub const BUFFER_ERROR: u32 = 0xE100_0001;
    /// The buffer holds fewer bytes than the negotiated format requires.
    pub const BUFFER_UNDERRUN: u32 = 0xE100_0002;

    /// Create a failure record.
    #[must_use]
    pub fn new(code: u32, description: &str) -> Self {
        Self {
            code,
            description: description.to_owned(),
        }
    }
}

impl fmt::Display for AcquisitionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010X} {}", self.code, self.description)
    }
}

/// Result of acquiring one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrabOutcome {
    /// The buffer was filled; it holds the image.
    Succeeded(Image),
    /// The hardware reported a failure for this buffer.
    Failed(AcquisitionFailure),
}

/// A captured video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Pixel encoding the device delivered.
    pub encoding: PixelEncoding,
    /// Frame metadata.
    pub metadata: FrameMetadata,
    /// Image or failure.
    pub outcome: GrabOutcome,
}

impl Frame {
    /// A successfully acquired frame.
    #[must_use]
    pub fn succeeded(image: Image, metadata: FrameMetadata) -> Self {
        Self {
            encoding: image.encoding(),
            metadata,
            outcome: GrabOutcome::Succeeded(image),
        }
    }

    /// A frame the hardware failed to fill.
    #[must_use]
    pub const fn failed(
        encoding: PixelEncoding,
        metadata: FrameMetadata,
        failure: AcquisitionFailure,
    ) -> Self {
        Self {
            encoding,
            metadata,
            outcome: GrabOutcome::Failed(failure),
        }
    }

    /// Whether acquisition succeeded at the hardware level.
    pub const fn grab_succeeded(&self) -> bool {
        matches!(self.outcome, GrabOutcome::Succeeded(_))
    }

    /// Borrow the image of a successful frame.
    pub const fn image(&self) -> Option<&Image> {
        match &self.outcome {
            GrabOutcome::Succeeded(image) => Some(image),
            GrabOutcome::Failed(_) => None,
        }
    }

    /// Take ownership of the frame's buffer without copying it.
    pub fn into_image(self) -> Option<Image> {
        match self.outcome {
            GrabOutcome::Succeeded(image) => Some(image),
            GrabOutcome::Failed(_) => None,
        }
    }

    /// The failure of an unsuccessful frame.
    pub const fn failure(&self) -> Option<&AcquisitionFailure> {
        match &self.outcome {
            GrabOutcome::Succeeded(_) => None,
            GrabOutcome::Failed(failure) => Some(failure),
        }
    }
}

/// Error type for camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// No attached device matches the descriptor.
    #[error("no device found matching {0}")]
    DeviceNotFound(String),
    /// Failed to open device.
    #[error("failed to open device: {0}")]
    DeviceOpenFailed(String),
    /// The device rejected the requested pixel encoding, or the name is unknown.
    #[error("unsupported pixel encoding: {0}")]
    UnsupportedEncoding(String),
    /// No frame arrived within the timeout.
    #[error("no frame received within {} ms", .0.as_millis())]
    Timeout(Duration),
    /// The source encoding cannot be converted to the target.
    #[error("cannot convert {from} to {to}")]
    Conversion {
        /// Source encoding.
        from: PixelEncoding,
        /// Requested target encoding.
        to: PixelEncoding,
    },
    /// Plane index outside the image's plane range.
    #[error("plane index {index} out of range (image has {planes} planes)")]
    InvalidPlaneIndex {
        /// Requested index.
        index: usize,
        /// Number of planes in the image.
        planes: usize,
    },
    /// Plane extraction on an image that is not planar.
    #[error("image encoding {0} is not planar")]
    NotPlanar(PixelEncoding),
    /// Buffer does not match the layout of its encoding.
    #[error("invalid {encoding} buffer: {reason}")]
    InvalidBuffer {
        /// Encoding the buffer claims.
        encoding: PixelEncoding,
        /// What is wrong with it.
        reason: String,
    },
    /// Operation not allowed in the session's current state.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        /// Attempted operation.
        operation: &'static str,
        /// State the session was in.
        state: crate::session::SessionState,
    },
    /// Error during streaming operation.
    #[error("stream error: {0}")]
    StreamError(String),
    /// An image does not hold the expected test pattern.
    #[error("pattern mismatch: {0}")]
    PatternMismatch(String),
    /// Writing an image file failed.
    #[error("failed to save {}: {source}", .path.display())]
    Save {
        /// Destination path.
        path: PathBuf,
        /// Underlying encoder or I/O error.
        #[source]
        source: image::ImageError,
    },
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Finds and opens cameras.
pub trait DeviceLocator {
    /// Device type produced by [`DeviceLocator::open`].
    type Device: CameraDevice;

    /// List every attached device.
    fn enumerate(&self) -> Result<Vec<DeviceHandle>>;

    /// Find the first attached device matching `descriptor`.
    fn locate(&self, descriptor: &DeviceDescriptor) -> Result<DeviceHandle> {
        let handle = self
            .enumerate()?
            .into_iter()
            .find(|handle| descriptor.matches(handle))
            .ok_or_else(|| CameraError::DeviceNotFound(descriptor.to_string()))?;

        tracing::debug!(id = %handle.id, model = %handle.model_name, "located device");
        Ok(handle)
    }

    /// Claim the device behind `handle`.
    fn open(&self, handle: &DeviceHandle) -> Result<Self::Device>;
}

/// Abstraction over camera device operations.
pub trait CameraDevice {
    /// The stream type returned by `create_stream`.
    type Stream<'a>: CaptureStream
    where
        Self: 'a;

    /// Get device capabilities.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Get current format.
    fn format(&self) -> Result<Format>;

    /// Set capture format. Returns the actual format set by the driver.
    fn set_format(&mut self, format: &Format) -> Result<Format>;

    /// Create a capture stream with the specified number of buffers.
    fn create_stream(&mut self, buffer_count: u32) -> Result<Self::Stream<'_>>;
}

/// Abstraction over capture stream operations.
pub trait CaptureStream {
    /// Wait up to `timeout` for the next frame.
    fn next_frame(&mut self, timeout: Duration) -> Result<Frame>;
}
