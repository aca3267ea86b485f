//! Pixel format conversion.
//!
//! [`FormatConverter`] is the seam the workflow converts through; the
//! native [`ImageFormatConverter`] decodes every known source encoding to
//! packed RGB and re-encodes it into the requested target.

use yuvutils_rs::{YuvPackedImage, YuvRange, YuvStandardMatrix};

use crate::buffer::Image;
use crate::encoding::PixelEncoding;
use crate::traits::{CameraError, Result};

/// Converts images between pixel encodings.
pub trait FormatConverter {
    /// Produce a new image in `target` encoding. The source is not modified.
    fn convert(&self, target: PixelEncoding, source: &Image) -> Result<Image>;
}

/// How missing color samples of a Bayer mosaic are reconstructed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum BayerInterpolation {
    /// Average of the same-color samples in the 3x3 neighbourhood.
    #[default]
    Bilinear,
    /// Copy the same-color sample from the 2x2 cell.
    NearestNeighbor,
}

/// Native converter supporting `RGB8`, `BGR8`, `RGB8Planar` and `Mono8` targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFormatConverter {
    bayer: BayerInterpolation,
}

impl ImageFormatConverter {
    /// Converter with bilinear demosaicing.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bayer: BayerInterpolation::Bilinear,
        }
    }

    /// Select the demosaicing strategy.
    #[must_use]
    pub const fn with_bayer_interpolation(mut self, bayer: BayerInterpolation) -> Self {
        self.bayer = bayer;
        self
    }

    /// Whether `target` can be produced by this converter.
    pub const fn supports_target(target: PixelEncoding) -> bool {
        matches!(
            target,
            PixelEncoding::Rgb8
                | PixelEncoding::Bgr8
                | PixelEncoding::Rgb8Planar
                | PixelEncoding::Mono8
        )
    }

    fn decode_rgb(&self, target: PixelEncoding, source: &Image) -> Result<Vec<u8>> {
        let width = source.width() as usize;
        let height = source.height() as usize;
        let data = source.data();

        let rgb = match source.encoding() {
            PixelEncoding::Rgb8 => data.to_vec(),
            PixelEncoding::Bgr8 => swap_red_blue(data),
            PixelEncoding::Rgb8Planar => interleave_planes(data, width * height),
            PixelEncoding::Mono8 => data.iter().flat_map(|&value| [value; 3]).collect(),
            // Little-endian, keep the high byte
            PixelEncoding::Mono16 => data
                .iter()
                .skip(1)
                .step_by(2)
                .flat_map(|&high| [high; 3])
                .collect(),
            encoding @ (PixelEncoding::BayerRG8
            | PixelEncoding::BayerGR8
            | PixelEncoding::BayerGB8
            | PixelEncoding::BayerBG8) => {
                let mosaic = Mosaic {
                    data,
                    width,
                    height,
                    pattern: cfa_pattern(encoding),
                };
                mosaic.demosaic(self.bayer)
            }
            PixelEncoding::Yuv422Yuyv | PixelEncoding::Yuv422Uyvy => unpack_yuv422(source)?,
            from @ PixelEncoding::Unknown(_) => {
                return Err(CameraError::Conversion { from, to: target });
            }
        };

        Ok(rgb)
    }
}

impl FormatConverter for ImageFormatConverter {
    fn convert(&self, target: PixelEncoding, source: &Image) -> Result<Image> {
        let from = source.encoding();
        if !Self::supports_target(target) || matches!(from, PixelEncoding::Unknown(_)) {
            return Err(CameraError::Conversion { from, to: target });
        }

        if from == target {
            return Ok(source.clone());
        }

        let rgb = self.decode_rgb(target, source)?;
        let data = match target {
            PixelEncoding::Rgb8 => rgb,
            PixelEncoding::Bgr8 => swap_red_blue(&rgb),
            PixelEncoding::Rgb8Planar => split_planes(&rgb),
            PixelEncoding::Mono8 => rgb
                .chunks_exact(3)
                .flat_map(<&[u8; 3]>::try_from)
                .map(|&[r, g, b]| luma(r, g, b))
                .collect(),
            _ => return Err(CameraError::Conversion { from, to: target }),
        };

        tracing::debug!(
            %from,
            to = %target,
            width = source.width(),
            height = source.height(),
            "converted image"
        );
        Image::new(target, source.width(), source.height(), data)
    }
}

fn swap_red_blue(data: &[u8]) -> Vec<u8> {
    data.chunks_exact(3)
        .flat_map(|px| px.iter().rev().copied())
        .collect()
}

fn interleave_planes(data: &[u8], plane_len: usize) -> Vec<u8> {
    let (red, rest) = data.split_at(plane_len.min(data.len()));
    let (green, blue) = rest.split_at(plane_len.min(rest.len()));
    red.iter()
        .zip(green)
        .zip(blue)
        .flat_map(|((&r, &g), &b)| [r, g, b])
        .collect()
}

fn split_planes(rgb: &[u8]) -> Vec<u8> {
    (0..3)
        .flat_map(|channel| rgb.iter().skip(channel).step_by(3).copied())
        .collect()
}

/// ITU-R BT.601 luma, integer approximation.
#[allow(clippy::cast_possible_truncation)]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    let weighted = 77 * u32::from(r) + 150 * u32::from(g) + 29 * u32::from(b) + 128;
    (weighted >> 8) as u8
}

/// Full-range BT.601 YUV 4:2:2 to packed RGB.
fn unpack_yuv422(source: &Image) -> Result<Vec<u8>> {
    let encoding = source.encoding();
    let (width, height) = (source.width(), source.height());
    let packed = YuvPackedImage {
        yuy: source.data(),
        yuy_stride: width * 2,
        width,
        height,
    };

    let rgb_stride = width * 3;
    let mut rgb = vec![0; rgb_stride as usize * height as usize];
    let unpacked = if encoding == PixelEncoding::Yuv422Uyvy {
        yuvutils_rs::uyvy422_to_rgb(
            &packed,
            &mut rgb,
            rgb_stride,
            YuvRange::Full,
            YuvStandardMatrix::Bt601,
        )
    } else {
        yuvutils_rs::yuyv422_to_rgb(
            &packed,
            &mut rgb,
            rgb_stride,
            YuvRange::Full,
            YuvStandardMatrix::Bt601,
        )
    };

    unpacked.map_err(|err| CameraError::InvalidBuffer {
        encoding,
        reason: err.to_string(),
    })?;
    Ok(rgb)
}

/// Convert YUV values to RGB.
///
/// Uses the ITU-R BT.601 conversion formula.
///
/// # Arguments
///
/// * `y` - Luminance value
/// * `u` - Blue-difference chroma value
/// * `v` - Red-difference chroma value
///
/// # Returns
///
/// RGB tuple with values clamped to 0-255 range.
#[must_use]
#[allow(clippy::many_single_char_names)]
pub(crate) fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamp = |val: f32| -> u8 { val.clamp(0.0, 255.0) as u8 };

    (clamp(r), clamp(g), clamp(b))
}

const RED: usize = 0;
const GREEN: usize = 1;
const BLUE: usize = 2;

/// Channel sampled at each position of the 2x2 color filter tile, row-major.
pub(crate) const fn cfa_pattern(encoding: PixelEncoding) -> [[usize; 2]; 2] {
    match encoding {
        PixelEncoding::BayerGR8 => [[GREEN, RED], [BLUE, GREEN]],
        PixelEncoding::BayerGB8 => [[GREEN, BLUE], [RED, GREEN]],
        PixelEncoding::BayerBG8 => [[BLUE, GREEN], [GREEN, RED]],
        _ => [[RED, GREEN], [GREEN, BLUE]],
    }
}

struct Mosaic<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    pattern: [[usize; 2]; 2],
}

impl Mosaic<'_> {
    const fn channel_at(&self, x: usize, y: usize) -> usize {
        let [even_row, odd_row] = self.pattern;
        let [left, right] = if y % 2 == 0 { even_row } else { odd_row };
        if x % 2 == 0 {
            left
        } else {
            right
        }
    }

    fn sample(&self, x: usize, y: usize) -> u8 {
        self.data.get(y * self.width + x).copied().unwrap_or(0)
    }

    fn demosaic(&self, method: BayerInterpolation) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.width * self.height * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                let own = self.channel_at(x, y);
                for channel in [RED, GREEN, BLUE] {
                    let value = if channel == own {
                        self.sample(x, y)
                    } else {
                        match method {
                            BayerInterpolation::Bilinear => self.average(x, y, channel),
                            BayerInterpolation::NearestNeighbor => self
                                .nearest(x, y, channel)
                                .unwrap_or_else(|| self.average(x, y, channel)),
                        }
                    };
                    rgb.push(value);
                }
            }
        }
        rgb
    }

    /// Rounded mean of the `channel` samples among the 8 neighbours; 0 if none.
    #[allow(clippy::cast_possible_truncation)]
    fn average(&self, x: usize, y: usize, channel: usize) -> u8 {
        let mut sum = 0u32;
        let mut count = 0u32;
        for ny in y.saturating_sub(1)..=(y + 1).min(self.height - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(self.width - 1) {
                if (nx, ny) != (x, y) && self.channel_at(nx, ny) == channel {
                    sum += u32::from(self.sample(nx, ny));
                    count += 1;
                }
            }
        }
        if count == 0 {
            return 0;
        }
        ((sum + count / 2) / count) as u8
    }

    fn nearest(&self, x: usize, y: usize, channel: usize) -> Option<u8> {
        let (cell_x, cell_y) = (x & !1, y & !1);
        [(0, 0), (1, 0), (0, 1), (1, 1)]
            .into_iter()
            .map(|(dx, dy)| (cell_x + dx, cell_y + dy))
            .find(|&(nx, ny)| {
                nx < self.width && ny < self.height && self.channel_at(nx, ny) == channel
            })
            .map(|(nx, ny)| self.sample(nx, ny))
    }
}
