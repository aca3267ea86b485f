//! V4L2 device implementation using the v4l crate.

use std::io;
use std::path::Path;
use std::time::Duration;

use v4l::buffer::{Flags, Type};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as V4lCaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::buffer::Image;
use crate::encoding::PixelEncoding;
use crate::traits::{
    AcquisitionFailure, CameraDevice, CameraError, CaptureStream, DeviceCapabilities,
    DeviceHandle, DeviceLocator, Format, FourCC, Frame, FrameMetadata, Result,
};

/// Highest `/dev/videoN` index probed during enumeration.
const MAX_DEVICE_INDEX: u32 = 16;

/// `EBUSY` on Linux.
const EBUSY: i32 = 16;

/// Finds V4L2 capture devices under `/dev/video*`.
#[derive(Debug, Clone, Copy, Default)]
pub struct V4L2Locator;

impl V4L2Locator {
    /// Create a locator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn probe(index: u32) -> Option<DeviceHandle> {
        let path = format!("/dev/video{index}");
        if !Path::new(&path).exists() {
            return None;
        }

        let device = Device::with_path(&path).ok()?;
        let capabilities = query_capabilities(&device).ok()?;
        if !capabilities.can_capture {
            return None;
        }

        Some(DeviceHandle {
            model_name: capabilities.card.clone(),
            serial_number: read_usb_serial(&path),
            id: path,
            capabilities,
        })
    }
}

impl DeviceLocator for V4L2Locator {
    type Device = V4L2Device;

    fn enumerate(&self) -> Result<Vec<DeviceHandle>> {
        let devices: Vec<_> = (0..MAX_DEVICE_INDEX).filter_map(Self::probe).collect();
        tracing::debug!(count = devices.len(), "enumerated V4L2 capture devices");
        Ok(devices)
    }

    fn open(&self, handle: &DeviceHandle) -> Result<Self::Device> {
        V4L2Device::open_path(&handle.id)
    }
}

/// Read the USB serial number of a `/dev/videoN` device from sysfs.
///
/// Returns `None` if the device is not USB or has no serial.
fn read_usb_serial(device_path: &str) -> Option<String> {
    let dev_name = Path::new(device_path).file_name()?.to_str()?;
    // /sys/class/video4linux/videoN/device links to the USB interface dir
    let interface_dir =
        std::fs::canonicalize(format!("/sys/class/video4linux/{dev_name}/device")).ok()?;
    let serial = std::fs::read_to_string(interface_dir.parent()?.join("serial")).ok()?;
    let serial = serial.trim();
    (!serial.is_empty()).then(|| serial.to_owned())
}

fn query_capabilities(device: &Device) -> Result<DeviceCapabilities> {
    let caps = device
        .query_caps()
        .map_err(|err| CameraError::DeviceOpenFailed(err.to_string()))?;

    Ok(DeviceCapabilities {
        driver: caps.driver,
        card: caps.card,
        bus_info: caps.bus,
        can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
        can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
    })
}

fn to_format(fmt: &v4l::Format) -> Format {
    Format {
        width: fmt.width,
        height: fmt.height,
        encoding: PixelEncoding::from(FourCC::from(fmt.fourcc)),
        stride: fmt.stride,
        size: fmt.size,
    }
}

/// V4L2 device implementation wrapping the v4l crate.
pub struct V4L2Device {
    device: Device,
    path: String,
    capabilities: DeviceCapabilities,
}

impl V4L2Device {
    /// Open a V4L2 device by path (e.g., "/dev/video2").
    pub fn open_path(path: &str) -> Result<Self> {
        let device = Device::with_path(path)
            .map_err(|err| CameraError::DeviceOpenFailed(format!("{path}: {err}")))?;

        let capabilities = query_capabilities(&device)?;
        tracing::info!(
            device = path,
            driver = %capabilities.driver,
            card = %capabilities.card,
            "opened camera"
        );

        Ok(Self {
            device,
            path: path.to_owned(),
            capabilities,
        })
    }
}

impl CameraDevice for V4L2Device {
    type Stream<'a> = V4L2Stream<'a>;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        let fmt = self
            .device
            .format()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        Ok(to_format(&fmt))
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        let fourcc = format
            .encoding
            .fourcc()
            .ok_or_else(|| CameraError::UnsupportedEncoding(format.encoding.to_string()))?;

        let mut fmt = self
            .device
            .format()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = fourcc.into();

        let fmt = self.device.set_format(&fmt).map_err(|err| {
            claim_error(err, &self.path, |err| {
                CameraError::UnsupportedEncoding(format!("{}: {err}", format.encoding))
            })
        })?;

        Ok(to_format(&fmt))
    }

    fn create_stream(&mut self, buffer_count: u32) -> Result<Self::Stream<'_>> {
        let format = self.format()?;
        let stream = Stream::with_buffers(&self.device, Type::VideoCapture, buffer_count)
            .map_err(|err| {
                claim_error(err, &self.path, |err| {
                    CameraError::StreamError(err.to_string())
                })
            })?;

        Ok(V4L2Stream {
            stream,
            format,
            timeout: None,
        })
    }
}

/// Map `EBUSY` to [`CameraError::DeviceOpenFailed`], anything else through `other`.
///
/// V4L2 allows several opens of one node; another process holding the
/// device only shows up once formats or buffers are requested.
fn claim_error<F>(err: io::Error, path: &str, other: F) -> CameraError
where
    F: FnOnce(io::Error) -> CameraError,
{
    if err.raw_os_error() == Some(EBUSY) {
        CameraError::DeviceOpenFailed(format!("{path}: device busy"))
    } else {
        other(err)
    }
}

/// V4L2 capture stream wrapping mmap-based streaming.
pub struct V4L2Stream<'a> {
    stream: Stream<'a>,
    format: Format,
    timeout: Option<Duration>,
}

impl V4L2Stream<'_> {
    fn failed(&self, metadata: FrameMetadata, code: u32, description: &str) -> Frame {
        tracing::warn!(sequence = metadata.sequence, code, description, "acquisition failed");
        Frame::failed(
            self.format.encoding,
            metadata,
            AcquisitionFailure::new(code, description),
        )
    }
}

impl CaptureStream for V4L2Stream<'_> {
    fn next_frame(&mut self, timeout: Duration) -> Result<Frame> {
        if self.timeout != Some(timeout) {
            self.stream.set_timeout(timeout);
            self.timeout = Some(timeout);
        }

        let (buf, meta) = self.stream.next().map_err(|err| match err.kind() {
            io::ErrorKind::TimedOut => CameraError::Timeout(timeout),
            _ => CameraError::StreamError(err.to_string()),
        })?;

        // Safe conversions: V4L2 timestamps are always non-negative in practice
        #[allow(clippy::cast_sign_loss)]
        let secs = meta.timestamp.sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

        let metadata = FrameMetadata {
            sequence: meta.sequence,
            timestamp: Duration::new(secs, nanos),
            bytes_used: meta.bytesused,
        };
        let flagged = meta.flags.contains(Flags::ERROR);
        let used = buf.len().min(meta.bytesused as usize);
        let data = pack_rows(buf.get(..used).unwrap_or_default(), &self.format);

        if flagged {
            return Ok(self.failed(
                metadata,
                AcquisitionFailure::BUFFER_ERROR,
                "driver flagged the buffer as corrupted",
            ));
        }

        let Some(data) = data else {
            return Ok(self.failed(
                metadata,
                AcquisitionFailure::BUFFER_UNDERRUN,
                "buffer holds fewer bytes than the negotiated format",
            ));
        };

        tracing::debug!(sequence = metadata.sequence, bytes = data.len(), "frame received");
        let image = Image::new(self.format.encoding, self.format.width, self.format.height, data)?;
        Ok(Frame::succeeded(image, metadata))
    }
}

/// Copy the visible part of every row, dropping driver line padding.
///
/// Returns `None` if `buf` is too short for the format.
fn pack_rows(buf: &[u8], format: &Format) -> Option<Vec<u8>> {
    let width = format.width as usize;
    let height = format.height as usize;

    let Some(row_len) = format.encoding.stride(width) else {
        // Unknown layout: keep the bytes the driver reported.
        return Some(buf.to_vec());
    };

    let stride = (format.stride as usize).max(row_len);
    if stride == row_len {
        return buf.get(..row_len * height).map(<[u8]>::to_vec);
    }

    let mut packed = Vec::with_capacity(row_len * height);
    for row in 0..height {
        let start = row * stride;
        packed.extend_from_slice(buf.get(start..start + row_len)?);
    }
    Some(packed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_rows_tight() {
        let format = Format::new(2, 2, PixelEncoding::Mono8);
        assert_eq!(pack_rows(&[1, 2, 3, 4, 5], &format), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_pack_rows_drops_padding() {
        let mut format = Format::new(2, 2, PixelEncoding::Mono8);
        format.stride = 4;
        let buf = [1, 2, 0, 0, 3, 4, 0, 0];
        assert_eq!(pack_rows(&buf, &format), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_pack_rows_short_buffer() {
        let format = Format::new(2, 2, PixelEncoding::Rgb8);
        assert_eq!(pack_rows(&[0; 11], &format), None);
    }

    #[test]
    fn test_pack_rows_unknown_encoding() {
        let format = Format::new(2, 2, PixelEncoding::Unknown(FourCC::new(b"MJPG")));
        assert_eq!(pack_rows(&[9, 9, 9], &format), Some(vec![9, 9, 9]));
    }

    #[test]
    fn test_busy_device_is_an_open_failure() {
        let err = claim_error(io::Error::from_raw_os_error(EBUSY), "/dev/video0", |_| {
            CameraError::UnsupportedEncoding("RGB8".to_owned())
        });
        assert!(
            matches!(&err, CameraError::DeviceOpenFailed(msg) if msg.contains("/dev/video0")),
            "{err}"
        );
    }

    #[test]
    fn test_format_rejection_stays_unsupported() {
        const EINVAL: i32 = 22;
        let err = claim_error(io::Error::from_raw_os_error(EINVAL), "/dev/video0", |err| {
            CameraError::UnsupportedEncoding(format!("RGB8: {err}"))
        });
        assert!(matches!(err, CameraError::UnsupportedEncoding(_)));
    }

    #[test]
    fn test_missing_device_path() {
        let err = V4L2Device::open_path("/dev/video-does-not-exist")
            .err()
            .expect("no such device");
        assert!(matches!(err, CameraError::DeviceOpenFailed(_)));
    }
}
