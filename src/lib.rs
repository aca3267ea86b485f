//! RGB-Probe: grab color frames from a camera and inspect their RGB values
//!
//! This library provides trait-based abstractions over camera discovery,
//! acquisition, pixel format conversion and image persistence, enabling both
//! production use with V4L2 hardware and testing with mock devices.

pub mod buffer;
pub mod config;
pub mod convert;
pub mod device;
pub mod encoding;
pub mod session;
pub mod sink;
pub mod traits;
pub mod validation;
pub mod workflow;

#[cfg(test)]
pub mod mock;

pub use buffer::{Channel, Image};
pub use config::Config;
pub use convert::{BayerInterpolation, FormatConverter, ImageFormatConverter};
pub use device::{V4L2Device, V4L2Locator};
pub use encoding::PixelEncoding;
pub use session::{Grabbing, Session, SessionState};
pub use sink::{DisplayMode, FileFormat, FileSink, ImageSink, ImageViewer};
pub use traits::{
    AcquisitionFailure, CameraDevice, CameraError, CaptureStream, DeviceCapabilities,
    DeviceDescriptor, DeviceHandle, DeviceLocator, Format, FourCC, Frame, FrameMetadata,
    GrabOutcome,
};
pub use workflow::{exit_code, ConsoleReporter, FrameReport, Pipeline, RunSummary, WorkflowOptions};
