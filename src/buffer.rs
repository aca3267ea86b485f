//! Image buffers and plane extraction.

use std::fmt;

use crate::convert::yuv_to_rgb;
use crate::encoding::PixelEncoding;
use crate::traits::{CameraError, Result};

/// One color channel of an RGB image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Plane 0.
    Red,
    /// Plane 1.
    Green,
    /// Plane 2.
    Blue,
}

impl Channel {
    /// Channels in plane order.
    pub const ALL: [Self; 3] = [Self::Red, Self::Green, Self::Blue];

    /// Plane index of this channel in an `RGB8Planar` image.
    pub const fn plane_index(self) -> usize {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
        }
    }

    /// Lowercase channel name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A rectangular grid of pixel samples.
///
/// The buffer length always matches the layout implied by the encoding,
/// width and height; rows are tightly packed and planes are contiguous.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    encoding: PixelEncoding,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("encoding", &self.encoding)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.data.len())
            .finish()
    }
}

impl Image {
    /// Wrap `data` as an image, checking it against the encoding's layout.
    ///
    /// Buffers of unknown encodings are accepted as-is.
    pub fn new(encoding: PixelEncoding, width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let invalid = |reason: String| CameraError::InvalidBuffer { encoding, reason };

        if matches!(
            encoding,
            PixelEncoding::Yuv422Uyvy | PixelEncoding::Yuv422Yuyv
        ) && width % 2 != 0
        {
            return Err(invalid(format!("width {width} must be even for 4:2:2")));
        }

        if let Some(expected) = encoding.buffer_len(width as usize, height as usize) {
            if data.len() != expected {
                return Err(invalid(format!(
                    "{width}x{height} needs {expected} bytes, got {}",
                    data.len()
                )));
            }
        }

        Ok(Self {
            encoding,
            width,
            height,
            data,
        })
    }

    /// Pixel encoding of the buffer.
    pub const fn encoding(&self) -> PixelEncoding {
        self.encoding
    }

    /// Width in pixels.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels.
    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Raw bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the image, returning its bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Split out one plane of a planar image as a `Mono8` image.
    pub fn extract_plane(&self, index: usize) -> Result<Self> {
        if !self.encoding.is_planar() {
            return Err(CameraError::NotPlanar(self.encoding));
        }

        let planes = self.encoding.plane_count();
        if index >= planes {
            return Err(CameraError::InvalidPlaneIndex { index, planes });
        }

        let plane_len = self.pixel_count();
        let start = index * plane_len;
        let plane = self
            .data
            .get(start..start + plane_len)
            .ok_or_else(|| CameraError::InvalidBuffer {
                encoding: self.encoding,
                reason: format!("plane {index} is truncated"),
            })?;

        Self::new(PixelEncoding::Mono8, self.width, self.height, plane.to_vec())
    }

    /// Split out the plane holding `channel`.
    pub fn extract_channel(&self, channel: Channel) -> Result<Self> {
        self.extract_plane(channel.plane_index())
    }

    /// Get RGB values for a pixel at the specified coordinates.
    ///
    /// Supported for RGB, BGR, planar RGB, `Mono8` and YUV 4:2:2 images.
    /// Returns `None` for other encodings or out-of-range coordinates.
    ///
    /// For 4:2:2 images, odd x coordinates use the second luma sample of the
    /// pair with the shared chroma values.
    #[must_use]
    pub fn pixel_rgb(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }

        let index = y as usize * self.width as usize + x as usize;
        let byte = |offset: usize| self.data.get(offset).copied();

        match self.encoding {
            PixelEncoding::Rgb8 => {
                let base = index * 3;
                Some((byte(base)?, byte(base + 1)?, byte(base + 2)?))
            }
            PixelEncoding::Bgr8 => {
                let base = index * 3;
                Some((byte(base + 2)?, byte(base + 1)?, byte(base)?))
            }
            PixelEncoding::Rgb8Planar => {
                let plane = self.pixel_count();
                Some((byte(index)?, byte(plane + index)?, byte(2 * plane + index)?))
            }
            PixelEncoding::Mono8 => {
                let value = byte(index)?;
                Some((value, value, value))
            }
            PixelEncoding::Yuv422Yuyv | PixelEncoding::Yuv422Uyvy => {
                // Each pair of pixels shares U and V values
                let pair = (index & !1) * 2;
                let (luma_offset, u_offset, v_offset) = match self.encoding {
                    PixelEncoding::Yuv422Yuyv => (2 * (index % 2), 1, 3),
                    _ => (2 * (index % 2) + 1, 0, 2),
                };
                let luma = byte(pair + luma_offset)?;
                Some(yuv_to_rgb(luma, byte(pair + u_offset)?, byte(pair + v_offset)?))
            }
            _ => None,
        }
    }
}
