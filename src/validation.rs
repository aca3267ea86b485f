//! Checks that captured or converted images hold known test patterns.
//!
//! Used by the vivid integration tests and by unit tests against the mock
//! camera.

use crate::buffer::{Channel, Image};
use crate::traits::{CameraError, Frame, Result};

/// SMPTE color bars as RGB, left to right:
/// white, yellow, cyan, green, magenta, red, blue, black.
pub(crate) const SMPTE_COLOR_BARS: [(u8, u8, u8); 8] = [
    (235, 235, 235),
    (235, 235, 11),
    (12, 236, 237),
    (13, 237, 13),
    (237, 13, 237),
    (238, 14, 13),
    (15, 15, 239),
    (16, 16, 16),
];

/// Per-channel slack for YUV and Bayer reconstruction error.
const COLOR_TOLERANCE: u8 = 15;

/// Smallest luma rise accepted across a gradient.
const MIN_GRADIENT_RISE: f32 = 50.0;

/// Horizontal distance between gradient samples.
const GRADIENT_STEP: usize = 10;

const fn mismatch(message: String) -> CameraError {
    CameraError::PatternMismatch(message)
}

fn pixel(image: &Image, x: u32, y: u32) -> Result<(u8, u8, u8)> {
    image.pixel_rgb(x, y).ok_or_else(|| {
        mismatch(format!(
            "no RGB value at ({x}, {y}) in {} {}x{} image",
            image.encoding(),
            image.width(),
            image.height()
        ))
    })
}

/// Check the centre of each of the eight vertical bars on the middle row.
///
/// # Errors
///
/// Returns `PatternMismatch` naming the first bar whose color is off by more
/// than the tolerance, or if the image has no RGB pixel access.
pub fn validate_color_bars(image: &Image) -> Result<()> {
    let bar_width = image.width() / 8;
    let row = image.height() / 2;

    for (bar, &expected) in (0u32..).zip(SMPTE_COLOR_BARS.iter()) {
        let column = bar * bar_width + bar_width / 2;
        let actual = pixel(image, column, row)?;
        if !colors_match(actual, expected, COLOR_TOLERANCE) {
            return Err(mismatch(format!(
                "bar {bar} at ({column}, {row}) is RGB{actual:?}, expected RGB{expected:?}"
            )));
        }
    }
    Ok(())
}

/// Check that luma rises from left to right along the middle row.
///
/// Dips of up to one level are tolerated as rounding noise.
///
/// # Errors
///
/// Returns `PatternMismatch` if luma falls anywhere along the row or rises by
/// less than 50 levels overall.
pub fn validate_gradient(image: &Image) -> Result<()> {
    let row = image.height() / 2;
    let lumas = (0..image.width())
        .step_by(GRADIENT_STEP)
        .map(|x| pixel(image, x, row).map(|(r, g, b)| (x, luma(r, g, b))))
        .collect::<Result<Vec<_>>>()?;

    for pair in lumas.windows(2) {
        if let [(_, before), (x, after)] = pair {
            if *after < before - 1.0 {
                return Err(mismatch(format!(
                    "luma drops from {before} to {after} at x={x}"
                )));
            }
        }
    }

    if let (Some((_, first)), Some((_, last))) = (lumas.first(), lumas.last()) {
        let rise = last - first;
        if rise < MIN_GRADIENT_RISE {
            return Err(mismatch(format!(
                "luma rises by only {rise}, expected at least {MIN_GRADIENT_RISE}"
            )));
        }
    }
    Ok(())
}

/// Rec. 601 luma.
fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.114f32.mul_add(
        f32::from(b),
        0.587f32.mul_add(f32::from(g), 0.299 * f32::from(r)),
    )
}

/// Check that frame sequence numbers are consecutive.
///
/// # Errors
///
/// Returns `PatternMismatch` if `frames` is empty or a sequence number is skipped
/// or repeated.
pub fn validate_frame_sequence(frames: &[Frame]) -> Result<()> {
    let Some(first) = frames.first() else {
        return Err(mismatch("no frames to check".to_owned()));
    };

    let start = first.metadata.sequence;
    for (expected, frame) in (start..).zip(frames) {
        let actual = frame.metadata.sequence;
        if actual != expected {
            return Err(mismatch(format!(
                "frame sequence {actual} where {expected} was expected"
            )));
        }
    }
    Ok(())
}

/// Check that three single-channel planes hold exactly the samples of a
/// packed RGB image.
///
/// # Errors
///
/// Returns `PatternMismatch` on a size or sample mismatch.
pub fn validate_planes_match(packed: &Image, planes: &[Image; 3]) -> Result<()> {
    for (channel, plane) in Channel::ALL.into_iter().zip(planes) {
        if plane.data().len() != packed.pixel_count() {
            return Err(mismatch(format!(
                "{channel} plane has {} samples, expected {}",
                plane.data().len(),
                packed.pixel_count()
            )));
        }

        let differing = packed
            .data()
            .iter()
            .skip(channel.plane_index())
            .step_by(3)
            .zip(plane.data())
            .position(|(packed_sample, plane_sample)| packed_sample != plane_sample);

        if let Some(index) = differing {
            return Err(mismatch(format!(
                "{channel} plane differs from packed image at pixel {index}"
            )));
        }
    }
    Ok(())
}

fn colors_match(actual: (u8, u8, u8), expected: (u8, u8, u8), tolerance: u8) -> bool {
    [
        actual.0.abs_diff(expected.0),
        actual.1.abs_diff(expected.1),
        actual.2.abs_diff(expected.2),
    ]
    .into_iter()
    .all(|diff| diff <= tolerance)
}
