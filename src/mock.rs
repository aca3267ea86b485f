//! Mock device implementation for testing without hardware.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use crate::buffer::Image;
use crate::convert::cfa_pattern;
use crate::encoding::PixelEncoding;
use crate::traits::{
    AcquisitionFailure, CameraDevice, CameraError, CaptureStream, DeviceCapabilities,
    DeviceHandle, DeviceLocator, Format, Frame, FrameMetadata, Result,
};
use crate::validation::SMPTE_COLOR_BARS;

/// Scripted result of one `next_frame` call.
#[derive(Debug, Clone)]
pub enum MockEvent {
    /// Deliver a frame with this pattern.
    Frame(TestPattern),
    /// Deliver a failed frame.
    Failure(AcquisitionFailure),
    /// Time out without a frame.
    Timeout,
}

/// Mock device for testing without hardware.
#[derive(Debug, Clone)]
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    format: Format,
    supported: Vec<PixelEncoding>,
    substitute: Option<PixelEncoding>,
    events: VecDeque<MockEvent>,
    pattern: TestPattern,
    frame_count: u32,
    busy: bool,
    claim: Option<Rc<Claim>>,
}

/// Exclusive hold on a mock device id, released on drop.
#[derive(Debug)]
struct Claim {
    id: String,
    claims: Rc<RefCell<HashSet<String>>>,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.claims.borrow_mut().remove(&self.id);
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a new mock device with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            format: Format::new(64, 48, PixelEncoding::Rgb8),
            supported: PixelEncoding::KNOWN.to_vec(),
            substitute: None,
            events: VecDeque::new(),
            pattern: TestPattern::ColorBars,
            frame_count: 0,
            busy: false,
            claim: None,
        }
    }

    /// Set the format for this mock device.
    #[must_use]
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Restrict the encodings `set_format` accepts.
    #[must_use]
    pub fn with_supported(mut self, supported: &[PixelEncoding]) -> Self {
        self.supported = supported.to_vec();
        self
    }

    /// Make the driver silently deliver `encoding` whatever is requested.
    #[must_use]
    pub const fn with_substitute(mut self, encoding: PixelEncoding) -> Self {
        self.substitute = Some(encoding);
        self
    }

    /// Script the outcomes of the next `next_frame` calls.
    #[must_use]
    pub fn with_events(mut self, events: Vec<MockEvent>) -> Self {
        self.events = events.into();
        self
    }

    /// Pattern used once the script is exhausted.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Make opening the device fail.
    #[must_use]
    pub const fn busy(mut self) -> Self {
        self.busy = true;
        self
    }
}

impl CameraDevice for MockDevice {
    type Stream<'a> = MockStream<'a>;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        Ok(self.format.clone())
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        if !self.supported.contains(&format.encoding) {
            return Err(CameraError::UnsupportedEncoding(format.encoding.to_string()));
        }
        let encoding = self.substitute.unwrap_or(format.encoding);
        self.format = Format::new(format.width, format.height, encoding);
        Ok(self.format.clone())
    }

    fn create_stream(&mut self, _buffer_count: u32) -> Result<Self::Stream<'_>> {
        Ok(MockStream { device: self })
    }
}

/// Locator over a fixed list of mock devices.
///
/// A device can be opened once at a time; the claim is released when the
/// opened [`MockDevice`] is dropped.
#[derive(Debug, Default)]
pub struct MockLocator {
    devices: Vec<(DeviceHandle, MockDevice)>,
    claims: Rc<RefCell<HashSet<String>>>,
}

impl MockLocator {
    /// Locator with no attached devices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the device with backend id `id` is currently open.
    pub fn is_claimed(&self, id: &str) -> bool {
        self.claims.borrow().contains(id)
    }

    /// Attach a device with the given model name and serial number.
    #[must_use]
    pub fn with_device(mut self, model: &str, serial: &str, device: MockDevice) -> Self {
        let handle = DeviceHandle {
            id: format!("mock:{}", self.devices.len()),
            model_name: model.to_owned(),
            serial_number: Some(serial.to_owned()),
            capabilities: device.capabilities.clone(),
        };
        self.devices.push((handle, device));
        self
    }
}

impl DeviceLocator for MockLocator {
    type Device = MockDevice;

    fn enumerate(&self) -> Result<Vec<DeviceHandle>> {
        Ok(self.devices.iter().map(|(handle, _)| handle.clone()).collect())
    }

    fn open(&self, handle: &DeviceHandle) -> Result<Self::Device> {
        let (_, device) = self
            .devices
            .iter()
            .find(|(candidate, _)| candidate.id == handle.id)
            .ok_or_else(|| CameraError::DeviceOpenFailed(format!("{} vanished", handle.id)))?;

        if device.busy {
            return Err(CameraError::DeviceOpenFailed(format!(
                "{}: device busy",
                handle.id
            )));
        }
        if !self.claims.borrow_mut().insert(handle.id.clone()) {
            return Err(CameraError::DeviceOpenFailed(format!(
                "{}: already claimed",
                handle.id
            )));
        }

        let mut opened = device.clone();
        opened.claim = Some(Rc::new(Claim {
            id: handle.id.clone(),
            claims: Rc::clone(&self.claims),
        }));
        Ok(opened)
    }
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal grey ramp from dark to light.
    Gradient,
    /// Solid color with specified R, G, B values.
    Solid(u8, u8, u8),
}

/// Mock capture stream for testing.
pub struct MockStream<'a> {
    device: &'a mut MockDevice,
}

impl CaptureStream for MockStream<'_> {
    fn next_frame(&mut self, timeout: Duration) -> Result<Frame> {
        let event = self
            .device
            .events
            .pop_front()
            .unwrap_or(MockEvent::Frame(self.device.pattern));

        let format = &self.device.format;
        let seq = self.device.frame_count;
        let metadata = FrameMetadata {
            sequence: seq,
            timestamp: Duration::from_millis(u64::from(seq) * 33), // ~30fps
            bytes_used: format.size,
        };

        let frame = match event {
            MockEvent::Timeout => return Err(CameraError::Timeout(timeout)),
            MockEvent::Failure(failure) => Frame::failed(format.encoding, metadata, failure),
            MockEvent::Frame(pattern) => {
                let data = generate_test_frame(format, pattern);
                let image = Image::new(format.encoding, format.width, format.height, data)?;
                Frame::succeeded(image, metadata)
            }
        };

        self.device.frame_count += 1;
        Ok(frame)
    }
}

/// Generate test frame data in the format's encoding.
pub fn generate_test_frame(format: &Format, pattern: TestPattern) -> Vec<u8> {
    let rgb = generate_rgb(format.width as usize, format.height as usize, pattern);
    encode_rgb(&rgb, format)
}

fn generate_rgb(width: usize, height: usize, pattern: TestPattern) -> Vec<(u8, u8, u8)> {
    let bar_width = (width / 8).max(1);
    let mut pixels = Vec::with_capacity(width * height);

    for _ in 0..height {
        for x in 0..width {
            let px = match pattern {
                TestPattern::ColorBars => SMPTE_COLOR_BARS[(x / bar_width).min(7)],
                TestPattern::Gradient => {
                    #[allow(clippy::cast_possible_truncation)]
                    let value = ((x * 255) / width) as u8;
                    (value, value, value)
                }
                TestPattern::Solid(r, g, b) => (r, g, b),
            };
            pixels.push(px);
        }
    }

    pixels
}

fn encode_rgb(rgb: &[(u8, u8, u8)], format: &Format) -> Vec<u8> {
    let width = format.width as usize;

    match format.encoding {
        PixelEncoding::Rgb8 => rgb.iter().flat_map(|&(r, g, b)| [r, g, b]).collect(),
        PixelEncoding::Bgr8 => rgb.iter().flat_map(|&(r, g, b)| [b, g, r]).collect(),
        PixelEncoding::Rgb8Planar => {
            let mut planes = Vec::with_capacity(rgb.len() * 3);
            planes.extend(rgb.iter().map(|px| px.0));
            planes.extend(rgb.iter().map(|px| px.1));
            planes.extend(rgb.iter().map(|px| px.2));
            planes
        }
        PixelEncoding::Mono8 => rgb.iter().map(|&(r, g, b)| rgb_to_yuv(r, g, b).0).collect(),
        PixelEncoding::Mono16 => rgb
            .iter()
            .flat_map(|&(r, g, b)| [0, rgb_to_yuv(r, g, b).0])
            .collect(),
        encoding @ (PixelEncoding::BayerRG8
        | PixelEncoding::BayerGR8
        | PixelEncoding::BayerGB8
        | PixelEncoding::BayerBG8) => {
            let pattern = cfa_pattern(encoding);
            rgb.iter()
                .enumerate()
                .map(|(i, &(r, g, b))| {
                    let (x, y) = (i % width, i / width);
                    [r, g, b][pattern[y % 2][x % 2]]
                })
                .collect()
        }
        PixelEncoding::Yuv422Yuyv | PixelEncoding::Yuv422Uyvy => {
            let uyvy = format.encoding == PixelEncoding::Yuv422Uyvy;
            rgb.chunks_exact(2)
                .flat_map(|pair| {
                    let (y0, u0, v0) = rgb_to_yuv(pair[0].0, pair[0].1, pair[0].2);
                    let (y1, u1, v1) = rgb_to_yuv(pair[1].0, pair[1].1, pair[1].2);
                    #[allow(clippy::cast_possible_truncation)]
                    let (u, v) = (
                        ((u16::from(u0) + u16::from(u1)) / 2) as u8,
                        ((u16::from(v0) + u16::from(v1)) / 2) as u8,
                    );
                    if uyvy {
                        [u, y0, v, y1]
                    } else {
                        [y0, u, y1, v]
                    }
                })
                .collect()
        }
        PixelEncoding::Unknown(_) => vec![0; rgb.len() * 2],
    }
}

/// Full-range BT.601, the inverse of the converter's YUV decoding.
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let y = 0.114f32.mul_add(b, 0.587f32.mul_add(g, 0.299 * r));
    let u = 0.564f32.mul_add(b - y, 128.0);
    let v = 0.713f32.mul_add(r - y, 128.0);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let to_u8 = |val: f32| val.round().clamp(0.0, 255.0) as u8;
    (to_u8(y), to_u8(u), to_u8(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{FormatConverter, ImageFormatConverter};
    use crate::traits::DeviceDescriptor;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn test_mock_device_creation() {
        let device = MockDevice::new();
        assert_eq!(device.capabilities().driver, "mock");
        assert!(device.capabilities().can_capture);
        assert!(device.capabilities().can_stream);
    }

    #[test]
    fn test_mock_device_format() {
        let mut device = MockDevice::new();
        let format = device.format().expect("format should succeed");
        assert_eq!(format.width, 64);
        assert_eq!(format.height, 48);

        let new_format = Format::new(1280, 720, PixelEncoding::Yuv422Yuyv);
        let actual = device.set_format(&new_format).expect("set_format should succeed");
        assert_eq!(actual.width, 1280);
        assert_eq!(actual.height, 720);
        assert_eq!(actual.encoding, PixelEncoding::Yuv422Yuyv);
    }

    #[test]
    fn test_mock_stream_capture() {
        let mut device = MockDevice::new();
        let mut stream = device.create_stream(4).expect("create_stream should succeed");

        let frame1 = stream.next_frame(TIMEOUT).expect("next_frame should succeed");
        assert_eq!(frame1.metadata.sequence, 0);
        assert!(frame1.grab_succeeded());

        let frame2 = stream.next_frame(TIMEOUT).expect("next_frame should succeed");
        assert_eq!(frame2.metadata.sequence, 1);
    }

    #[test]
    fn test_scripted_events() {
        let failure = AcquisitionFailure::new(AcquisitionFailure::BUFFER_ERROR, "corrupt");
        let mut device = MockDevice::new().with_events(vec![
            MockEvent::Failure(failure.clone()),
            MockEvent::Timeout,
            MockEvent::Frame(TestPattern::Solid(1, 2, 3)),
        ]);
        let mut stream = device.create_stream(4).expect("create_stream should succeed");

        let failed = stream.next_frame(TIMEOUT).expect("failed frame");
        assert_eq!(failed.failure(), Some(&failure));

        let err = stream.next_frame(TIMEOUT).expect_err("timeout");
        assert!(matches!(err, CameraError::Timeout(_)));

        let solid = stream.next_frame(TIMEOUT).expect("solid frame");
        assert_eq!(solid.metadata.sequence, 1);
        let image = solid.image().expect("succeeded");
        assert_eq!(&image.data()[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_color_bars_pattern() {
        let format = Format::new(640, 480, PixelEncoding::Rgb8);
        let data = generate_test_frame(&format, TestPattern::ColorBars);

        assert_eq!(data.len(), 640 * 480 * 3);

        // First bar is white
        assert_eq!(&data[..3], &[235, 235, 235]);
    }

    #[test]
    fn test_gradient_pattern() {
        let format = Format::new(640, 480, PixelEncoding::Mono8);
        let data = generate_test_frame(&format, TestPattern::Gradient);

        // Left edge should be dark
        assert!(data[0] < 10);

        // Right edge should be bright
        let last_row_start = 479 * 640;
        assert!(data[last_row_start + 639] > 200);
    }

    #[test]
    fn test_bayer_encoding_samples_cfa() {
        let format = Format::new(2, 2, PixelEncoding::BayerRG8);
        let data = generate_test_frame(&format, TestPattern::Solid(10, 20, 30));
        assert_eq!(data, vec![10, 20, 20, 30]);
    }

    #[test]
    fn test_yuv_encoding_decodes_back() {
        let format = Format::new(8, 2, PixelEncoding::Yuv422Uyvy);
        let data = generate_test_frame(&format, TestPattern::Solid(200, 40, 90));
        let image = Image::new(format.encoding, 8, 2, data).expect("valid");
        let rgb = ImageFormatConverter::new()
            .convert(PixelEncoding::Rgb8, &image)
            .expect("converts");

        let (r, g, b) = rgb.pixel_rgb(3, 1).expect("in range");
        assert!(r.abs_diff(200) <= 3 && g.abs_diff(40) <= 3 && b.abs_diff(90) <= 3);
    }

    #[test]
    fn test_locator_enumerates_and_locates() {
        let locator = MockLocator::new()
            .with_device("Cam A", "111", MockDevice::new())
            .with_device("Cam B", "222", MockDevice::new());

        assert_eq!(locator.enumerate().expect("enumerate").len(), 2);

        let handle = locator
            .locate(&DeviceDescriptor::new().with_serial_number("222"))
            .expect("locate");
        assert_eq!(handle.model_name, "Cam B");
        assert_eq!(handle.id, "mock:1");

        let err = locator
            .locate(&DeviceDescriptor::new().with_serial_number("333"))
            .expect_err("absent");
        assert!(matches!(err, CameraError::DeviceNotFound(_)));
    }
}
