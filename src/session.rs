//! Camera session lifecycle and bounded grabbing.

use std::fmt;
use std::time::Duration;

use crate::encoding::PixelEncoding;
use crate::traits::{
    CameraDevice, CameraError, CaptureStream, DeviceHandle, DeviceLocator, Format, Frame, Result,
};

/// Driver buffers queued while grabbing.
const BUFFER_COUNT: u32 = 4;

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Device claimed, output format not yet set.
    Open,
    /// Output format negotiated.
    Configured,
    /// A bounded acquisition is in progress.
    Grabbing,
    /// Acquisition finished; grabbing cannot be restarted.
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Configured => "configured",
            Self::Grabbing => "grabbing",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// An opened camera. The device claim is released when the session is dropped.
pub struct Session<D: CameraDevice> {
    device: D,
    handle: DeviceHandle,
    state: SessionState,
    format: Option<Format>,
}

impl<D: CameraDevice> Session<D> {
    /// Claim the located device.
    pub fn open<L>(locator: &L, handle: &DeviceHandle) -> Result<Self>
    where
        L: DeviceLocator<Device = D>,
    {
        let device = locator.open(handle)?;
        tracing::info!(id = %handle.id, model = %handle.model_name, "opened camera session");

        Ok(Self {
            device,
            handle: handle.clone(),
            state: SessionState::Open,
            format: None,
        })
    }

    /// The device this session was opened on.
    pub const fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Negotiated format, once configured.
    pub const fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }

    /// Set the device's output encoding, keeping its current frame size.
    pub fn configure(&mut self, encoding: PixelEncoding) -> Result<Format> {
        self.apply_format(encoding, None)
    }

    /// Set the output encoding from its name, e.g. `"RGB8"`.
    pub fn configure_named(&mut self, name: &str) -> Result<Format> {
        let encoding = name.parse()?;
        self.configure(encoding)
    }

    /// Set the output encoding and frame size.
    pub fn configure_with_size(
        &mut self,
        encoding: PixelEncoding,
        width: u32,
        height: u32,
    ) -> Result<Format> {
        self.apply_format(encoding, Some((width, height)))
    }

    fn apply_format(
        &mut self,
        encoding: PixelEncoding,
        size: Option<(u32, u32)>,
    ) -> Result<Format> {
        self.require(&[SessionState::Open, SessionState::Configured], "configure")?;

        let (width, height) = match size {
            Some(size) => size,
            None => {
                let current = self.device.format()?;
                (current.width, current.height)
            }
        };

        let actual = self
            .device
            .set_format(&Format::new(width, height, encoding))?;
        if actual.encoding != encoding {
            return Err(CameraError::UnsupportedEncoding(format!(
                "{encoding} (device substituted {})",
                actual.encoding
            )));
        }

        tracing::info!(
            width = actual.width,
            height = actual.height,
            encoding = %actual.encoding,
            "configured output format"
        );

        self.format = Some(actual.clone());
        self.state = SessionState::Configured;
        Ok(actual)
    }

    /// Begin acquiring at most `max_frames` frames.
    ///
    /// Grabbing stops when the returned guard has retrieved `max_frames`
    /// frames or is dropped, whichever comes first.
    pub fn start_grabbing(&mut self, max_frames: u32) -> Result<Grabbing<'_, D>> {
        self.require(&[SessionState::Configured], "start grabbing")?;

        let Self {
            device,
            state,
            format,
            ..
        } = self;
        let format = format.clone().ok_or(CameraError::InvalidState {
            operation: "start grabbing",
            state: *state,
        })?;

        let stream = device.create_stream(BUFFER_COUNT)?;
        *state = SessionState::Grabbing;
        tracing::debug!(max_frames, "started grabbing");

        Ok(Grabbing {
            stream,
            state,
            format,
            remaining: max_frames,
        })
    }

    /// Release the device explicitly.
    pub fn close(self) {
        tracing::info!(id = %self.handle.id, "closed camera session");
    }

    fn require(&self, allowed: &[SessionState], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CameraError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}

/// A bounded acquisition in progress.
///
/// Borrowing the session mutably guarantees one outstanding retrieve at a
/// time. Dropping the guard stops the stream and moves the session to
/// [`SessionState::Stopped`].
pub struct Grabbing<'a, D: CameraDevice + 'a> {
    stream: D::Stream<'a>,
    state: &'a mut SessionState,
    format: Format,
    remaining: u32,
}

impl<'a, D: CameraDevice + 'a> Grabbing<'a, D> {
    /// Whether more frames may be retrieved.
    pub const fn is_grabbing(&self) -> bool {
        self.remaining > 0
    }

    /// Format frames are delivered in.
    pub const fn format(&self) -> &Format {
        &self.format
    }

    /// Block up to `timeout` for the next frame.
    ///
    /// Hardware failures come back as a failed [`Frame`]; only transport
    /// problems and timeouts are errors.
    pub fn retrieve(&mut self, timeout: Duration) -> Result<Frame> {
        if self.remaining == 0 {
            return Err(CameraError::InvalidState {
                operation: "retrieve",
                state: SessionState::Stopped,
            });
        }

        let frame = self.stream.next_frame(timeout)?;
        self.remaining -= 1;
        if self.remaining == 0 {
            *self.state = SessionState::Stopped;
            tracing::debug!("bounded grab complete");
        }

        Ok(frame)
    }
}

impl<'a, D: CameraDevice + 'a> Drop for Grabbing<'a, D> {
    fn drop(&mut self) {
        *self.state = SessionState::Stopped;
    }
}
