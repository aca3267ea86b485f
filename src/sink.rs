//! Image persistence and best-effort display.

use std::borrow::Cow;
use std::path::Path;

use crate::buffer::Image;
use crate::convert::{FormatConverter, ImageFormatConverter};
use crate::encoding::PixelEncoding;
use crate::traits::{CameraError, Result};

/// Tracing target of [`LogViewer`] events.
pub const DISPLAY_TARGET: &str = "rgb_probe::display";

/// Container format for saved images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum FileFormat {
    /// Windows bitmap.
    #[default]
    Bmp,
    /// Portable Network Graphics.
    Png,
    /// Tagged Image File Format.
    Tiff,
}

impl FileFormat {
    /// File name extension, without the dot.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Bmp => "bmp",
            Self::Png => "png",
            Self::Tiff => "tiff",
        }
    }

    const fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Bmp => image::ImageFormat::Bmp,
            Self::Png => image::ImageFormat::Png,
            Self::Tiff => image::ImageFormat::Tiff,
        }
    }
}

/// Writes images to durable storage.
pub trait ImageSink {
    /// Write `image` to `path` in the given container format.
    fn save(&self, path: &Path, format: FileFormat, image: &Image) -> Result<()>;
}

/// Sink writing files with the `image` crate.
///
/// `RGB8` and `Mono8` images are written as-is; other encodings are
/// converted to `RGB8` first.
#[derive(Debug, Clone, Default)]
pub struct FileSink<C = ImageFormatConverter> {
    converter: C,
}

impl FileSink {
    /// Sink using the native converter for non-RGB images.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            converter: ImageFormatConverter::new(),
        }
    }
}

impl<C: FormatConverter> FileSink<C> {
    /// Sink using `converter` for non-RGB images.
    pub const fn with_converter(converter: C) -> Self {
        Self { converter }
    }
}

impl<C: FormatConverter> ImageSink for FileSink<C> {
    fn save(&self, path: &Path, format: FileFormat, image: &Image) -> Result<()> {
        let writable = match image.encoding() {
            PixelEncoding::Rgb8 | PixelEncoding::Mono8 => Cow::Borrowed(image),
            _ => Cow::Owned(self.converter.convert(PixelEncoding::Rgb8, image)?),
        };

        let color = if writable.encoding() == PixelEncoding::Mono8 {
            image::ExtendedColorType::L8
        } else {
            image::ExtendedColorType::Rgb8
        };

        image::save_buffer_with_format(
            path,
            writable.data(),
            writable.width(),
            writable.height(),
            color,
            format.image_format(),
        )
        .map_err(|source| CameraError::Save {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %path.display(), encoding = %image.encoding(), "saved image");
        Ok(())
    }
}

/// Renders images in numbered viewer slots. Never fails.
pub trait ImageViewer {
    /// Show `image` in viewer `slot`.
    fn show(&mut self, slot: u32, image: &Image);
}

/// Viewer for environments without a display surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessViewer;

impl ImageViewer for HeadlessViewer {
    fn show(&mut self, slot: u32, _image: &Image) {
        tracing::trace!(slot, "no display surface, skipping");
    }
}

/// Viewer that logs a short summary of each image.
#[derive(Debug, Clone, Default)]
pub struct LogViewer {
    shown: Vec<u32>,
}

impl LogViewer {
    /// Slots shown so far, in order.
    pub fn shown(&self) -> &[u32] {
        &self.shown
    }
}

impl ImageViewer for LogViewer {
    fn show(&mut self, slot: u32, image: &Image) {
        let means = channel_means(image);
        tracing::info!(
            target: DISPLAY_TARGET,
            slot,
            width = image.width(),
            height = image.height(),
            encoding = %image.encoding(),
            means = ?means,
            "display"
        );
        self.shown.push(slot);
    }
}

/// Which viewer the binary drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DisplayMode {
    /// Do not display.
    None,
    /// Log image summaries.
    #[default]
    Log,
}

impl DisplayMode {
    /// Build the viewer for this mode.
    pub fn viewer(self) -> Box<dyn ImageViewer> {
        match self {
            Self::None => Box::new(HeadlessViewer),
            Self::Log => Box::new(LogViewer::default()),
        }
    }
}

/// Mean sample value per interleaved channel.
#[allow(clippy::cast_precision_loss)]
fn channel_means(image: &Image) -> Vec<f32> {
    let channels = match image.encoding() {
        PixelEncoding::Rgb8 | PixelEncoding::Bgr8 => 3,
        _ => 1,
    };

    let mut sums = vec![0u64; channels];
    for px in image.data().chunks_exact(channels) {
        for (sum, &sample) in sums.iter_mut().zip(px) {
            *sum += u64::from(sample);
        }
    }

    let count = (image.data().len() / channels).max(1);
    sums.into_iter()
        .map(|sum| sum as f32 / count as f32)
        .collect()
}
