//! Pixel encodings and the color / packed-RGB classifier.

use std::fmt;
use std::str::FromStr;

use crate::traits::{CameraError, FourCC};

/// Layout of the samples in an image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelEncoding {
    /// 8-bit greyscale.
    Mono8,
    /// 16-bit little-endian greyscale.
    Mono16,
    /// 8-bit Bayer mosaic, RGGB.
    BayerRG8,
    /// 8-bit Bayer mosaic, GRBG.
    BayerGR8,
    /// 8-bit Bayer mosaic, GBRG.
    BayerGB8,
    /// 8-bit Bayer mosaic, BGGR.
    BayerBG8,
    /// Packed RGB, 3 bytes per pixel.
    Rgb8,
    /// Packed BGR, 3 bytes per pixel.
    Bgr8,
    /// Three consecutive 8-bit planes: red, green, blue.
    Rgb8Planar,
    /// YUV 4:2:2, byte order U Y0 V Y1.
    Yuv422Uyvy,
    /// YUV 4:2:2, byte order Y0 U Y1 V.
    Yuv422Yuyv,
    /// A hardware code outside the known set.
    Unknown(FourCC),
}

impl PixelEncoding {
    /// Every encoding with a known layout.
    pub const KNOWN: [Self; 11] = [
        Self::Mono8,
        Self::Mono16,
        Self::BayerRG8,
        Self::BayerGR8,
        Self::BayerGB8,
        Self::BayerBG8,
        Self::Rgb8,
        Self::Bgr8,
        Self::Rgb8Planar,
        Self::Yuv422Uyvy,
        Self::Yuv422Yuyv,
    ];

    /// Canonical name, e.g. `"RGB8"`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mono8 => "Mono8",
            Self::Mono16 => "Mono16",
            Self::BayerRG8 => "BayerRG8",
            Self::BayerGR8 => "BayerGR8",
            Self::BayerGB8 => "BayerGB8",
            Self::BayerBG8 => "BayerBG8",
            Self::Rgb8 => "RGB8",
            Self::Bgr8 => "BGR8",
            Self::Rgb8Planar => "RGB8Planar",
            Self::Yuv422Uyvy => "YUV422_8_UYVY",
            Self::Yuv422Yuyv => "YUV422_8",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// Whether the encoding carries color information.
    ///
    /// Unknown encodings are reported as not color.
    pub const fn is_color(self) -> bool {
        match self {
            Self::BayerRG8
            | Self::BayerGR8
            | Self::BayerGB8
            | Self::BayerBG8
            | Self::Rgb8
            | Self::Bgr8
            | Self::Rgb8Planar
            | Self::Yuv422Uyvy
            | Self::Yuv422Yuyv => true,
            Self::Mono8 | Self::Mono16 | Self::Unknown(_) => false,
        }
    }

    /// Whether the buffer is already interleaved R, G, B.
    pub const fn is_packed_rgb(self) -> bool {
        matches!(self, Self::Rgb8)
    }

    /// Whether each channel lives in its own plane.
    pub const fn is_planar(self) -> bool {
        matches!(self, Self::Rgb8Planar)
    }

    /// Whether the buffer is a raw color filter array.
    pub const fn is_bayer(self) -> bool {
        matches!(
            self,
            Self::BayerRG8 | Self::BayerGR8 | Self::BayerGB8 | Self::BayerBG8
        )
    }

    /// Number of planes in the buffer.
    pub const fn plane_count(self) -> usize {
        if self.is_planar() {
            3
        } else {
            1
        }
    }

    /// Bytes per pixel within one plane, `None` for unknown encodings.
    pub const fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            Self::Mono8
            | Self::BayerRG8
            | Self::BayerGR8
            | Self::BayerGB8
            | Self::BayerBG8
            | Self::Rgb8Planar => Some(1),
            Self::Mono16 | Self::Yuv422Uyvy | Self::Yuv422Yuyv => Some(2),
            Self::Rgb8 | Self::Bgr8 => Some(3),
            Self::Unknown(_) => None,
        }
    }

    /// Bytes per row of one plane for a tightly packed buffer.
    pub fn stride(self, width: usize) -> Option<usize> {
        self.bytes_per_pixel()?.checked_mul(width)
    }

    /// Total buffer length for a tightly packed image.
    pub fn buffer_len(self, width: usize, height: usize) -> Option<usize> {
        self.stride(width)?
            .checked_mul(height)?
            .checked_mul(self.plane_count())
    }

    /// Map a V4L2 four-character code.
    pub fn from_fourcc(fourcc: FourCC) -> Self {
        match fourcc {
            FourCC::GREY => Self::Mono8,
            FourCC::Y16 => Self::Mono16,
            FourCC::RGGB => Self::BayerRG8,
            FourCC::GRBG => Self::BayerGR8,
            FourCC::GBRG => Self::BayerGB8,
            FourCC::BA81 => Self::BayerBG8,
            FourCC::RGB3 => Self::Rgb8,
            FourCC::BGR3 => Self::Bgr8,
            FourCC::UYVY => Self::Yuv422Uyvy,
            FourCC::YUYV => Self::Yuv422Yuyv,
            other => Self::Unknown(other),
        }
    }

    /// The V4L2 code for this encoding, if V4L2 has one.
    pub const fn fourcc(self) -> Option<FourCC> {
        match self {
            Self::Mono8 => Some(FourCC::GREY),
            Self::Mono16 => Some(FourCC::Y16),
            Self::BayerRG8 => Some(FourCC::RGGB),
            Self::BayerGR8 => Some(FourCC::GRBG),
            Self::BayerGB8 => Some(FourCC::GBRG),
            Self::BayerBG8 => Some(FourCC::BA81),
            Self::Rgb8 => Some(FourCC::RGB3),
            Self::Bgr8 => Some(FourCC::BGR3),
            Self::Yuv422Uyvy => Some(FourCC::UYVY),
            Self::Yuv422Yuyv => Some(FourCC::YUYV),
            Self::Rgb8Planar => None,
            Self::Unknown(fourcc) => Some(fourcc),
        }
    }
}

impl From<FourCC> for PixelEncoding {
    fn from(fourcc: FourCC) -> Self {
        Self::from_fourcc(fourcc)
    }
}

impl fmt::Display for PixelEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(fourcc) => write!(f, "Unknown({fourcc})"),
            known => f.write_str(known.name()),
        }
    }
}

impl FromStr for PixelEncoding {
    type Err = CameraError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let encoding = match name.trim().to_ascii_uppercase().as_str() {
            "MONO8" | "GREY" => Self::Mono8,
            "MONO16" | "Y16" => Self::Mono16,
            "BAYERRG8" | "RGGB" => Self::BayerRG8,
            "BAYERGR8" | "GRBG" => Self::BayerGR8,
            "BAYERGB8" | "GBRG" => Self::BayerGB8,
            "BAYERBG8" | "BA81" => Self::BayerBG8,
            "RGB8" | "RGB8PACKED" | "RGB3" => Self::Rgb8,
            "BGR8" | "BGR8PACKED" | "BGR3" => Self::Bgr8,
            "RGB8PLANAR" => Self::Rgb8Planar,
            "YUV422_8_UYVY" | "YUV422PACKED" | "UYVY" => Self::Yuv422Uyvy,
            "YUV422_8" | "YUV422_YUYV_PACKED" | "YUYV" => Self::Yuv422Yuyv,
            _ => return Err(CameraError::UnsupportedEncoding(name.to_owned())),
        };
        Ok(encoding)
    }
}
