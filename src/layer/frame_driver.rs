// Frame driver - per-frame recording protocol
//
//   Idle --begin_frame--> FrameBegun --end_frame--> Recorded --submitted--> Idle
//
// Everything drawn for a frame (main pass, layers, overlay) goes into the one
// command buffer opened by begin_frame, so overlay work is ordered after the
// main pass. Submission and its semaphore/fence wiring belong to whoever
// end_frame hands the recorded buffer to.
//
// attach/detach bracket the driver's lifetime. Using it outside that window
// is a programming error and panics.

use ash::prelude::VkResult;
use ash::vk;

use super::{FrameContext, FrameTarget};
use crate::backend::error::{FrameError, FrameState};

/// Source of the per-frame command buffer
pub trait CommandRecorder {
    /// Reset and open the frame's command buffer for recording
    fn begin(&mut self) -> VkResult<vk::CommandBuffer>;

    fn end(&mut self, command_buffer: vk::CommandBuffer) -> VkResult<()>;

    /// Free the underlying pool. Called once, on detach.
    fn release(&mut self);
}

/// A closed command buffer ready for submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedFrame {
    pub command_buffer: vk::CommandBuffer,
    pub image_index: u32,
}

pub struct FrameDriver<R: CommandRecorder> {
    recorder: Option<R>,
    state: FrameState,
    frame: Option<FrameContext>,
    frames_submitted: u64,
}

impl<R: CommandRecorder> Default for FrameDriver<R> {
    fn default() -> Self {
        Self {
            recorder: None,
            state: FrameState::Idle,
            frame: None,
            frames_submitted: 0,
        }
    }
}

impl<R: CommandRecorder> FrameDriver<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, recorder: R) {
        assert!(self.recorder.is_none(), "frame driver attached twice");
        self.recorder = Some(recorder);
        log::debug!("Frame driver attached");
    }

    pub fn detach(&mut self) {
        assert_eq!(
            self.state,
            FrameState::Idle,
            "frame driver detached in the middle of a frame"
        );
        let mut recorder = self.recorder.take().expect("frame driver detached twice");
        recorder.release();
        log::debug!("Frame driver detached after {} frames", self.frames_submitted);
    }

    pub fn is_attached(&self) -> bool {
        self.recorder.is_some()
    }

    fn recorder(&mut self) -> &mut R {
        self.recorder
            .as_mut()
            .expect("frame driver used outside its attach/detach window")
    }

    fn expect_state(&self, expected: FrameState) -> Result<(), FrameError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(FrameError::InvalidState {
                expected,
                found: self.state,
            })
        }
    }

    /// Open this frame's command buffer. Idle -> FrameBegun.
    pub fn begin_frame(&mut self, target: FrameTarget) -> Result<&FrameContext, FrameError> {
        self.recorder();
        self.expect_state(FrameState::Idle)?;

        let command_buffer = self.recorder().begin()?;
        self.state = FrameState::FrameBegun;
        Ok(self.frame.insert(FrameContext {
            command_buffer,
            image_index: target.image_index,
            framebuffer: target.framebuffer,
            extent: target.extent,
            delta_time: target.delta_time,
        }))
    }

    /// The frame being recorded; only available between begin and end
    pub fn active_frame(&self) -> Result<&FrameContext, FrameError> {
        self.expect_state(FrameState::FrameBegun)?;
        self.frame.as_ref().ok_or(FrameError::InvalidState {
            expected: FrameState::FrameBegun,
            found: self.state,
        })
    }

    /// Run `draw` against the open frame
    pub fn record<F>(&mut self, draw: F) -> Result<(), FrameError>
    where
        F: FnOnce(&FrameContext),
    {
        self.recorder();
        let frame = self.active_frame()?;
        draw(frame);
        Ok(())
    }

    /// Close recording and hand the buffer to `submit`.
    /// FrameBegun -> Recorded -> Idle; the driver is Idle again afterwards
    /// even if closing or submitting fails.
    pub fn end_frame<T, E, S>(&mut self, submit: S) -> Result<T, E>
    where
        E: From<FrameError>,
        S: FnOnce(RecordedFrame) -> Result<T, E>,
    {
        self.recorder();
        self.expect_state(FrameState::FrameBegun)?;
        let frame = self.frame.take().ok_or(FrameError::InvalidState {
            expected: FrameState::FrameBegun,
            found: self.state,
        })?;

        if let Err(e) = self.recorder().end(frame.command_buffer) {
            self.state = FrameState::Idle;
            return Err(FrameError::Recording(e).into());
        }
        self.state = FrameState::Recorded;

        let result = submit(RecordedFrame {
            command_buffer: frame.command_buffer,
            image_index: frame.image_index,
        });

        self.state = FrameState::Idle;
        if result.is_ok() {
            self.frames_submitted += 1;
        }
        result
    }
}
