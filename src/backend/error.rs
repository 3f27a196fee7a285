// Error kinds for the presentation core
//
// Every failure is fatal to the current swapchain generation. The one thing
// callers need to tell apart is "stale, rebuild and retry" vs "abort".

use ash::vk;
use thiserror::Error;

/// Which half of the acquire/present cycle reported a stale swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquire,
    Present,
}

#[derive(Debug, Error)]
pub enum SwapchainError {
    #[error("surface reports no formats")]
    NoSurfaceFormat,

    #[error("failed to create swapchain: {0}")]
    SwapchainCreation(#[source] vk::Result),

    #[error("failed to create image view for swapchain image {index}: {result}")]
    ViewCreation { index: usize, result: vk::Result },

    #[error("failed to create framebuffer for swapchain image {index}: {result}")]
    FramebufferCreation { index: usize, result: vk::Result },

    #[error("failed to create image-available semaphore: {0}")]
    SyncCreation(#[source] vk::Result),

    #[error("failed to acquire next swapchain image: {0}")]
    Acquire(#[source] vk::Result),

    #[error("failed to present swapchain image {index}: {result}")]
    Present { index: u32, result: vk::Result },

    #[error("swapchain is out of date ({0:?})")]
    OutOfDate(Stage),

    #[error("present called without an acquired image")]
    NoAcquiredImage,

    #[error("image {0} is still acquired; present it before acquiring again")]
    ImageAlreadyAcquired(u32),
}

impl SwapchainError {
    /// True when the swapchain no longer matches the surface and should be
    /// rebuilt; false for device loss and other unrecoverable conditions.
    pub fn is_stale(&self) -> bool {
        matches!(self, SwapchainError::OutOfDate(_))
    }
}

pub type SwapchainResult<T> = std::result::Result<T, SwapchainError>;

/// Frame-cycle states of the frame driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    FrameBegun,
    Recorded,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame driver is {found:?}, expected {expected:?}")]
    InvalidState { expected: FrameState, found: FrameState },

    #[error("command recording failed: {0}")]
    Recording(#[from] vk::Result),
}
