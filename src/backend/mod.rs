// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with safety and ergonomics
// Presentation core: swapchain + framebuffers, written against PresentDevice

pub mod command;
pub mod device;
pub mod error;
pub mod framebuffer;
pub mod render_pass;
pub mod surface;
pub mod swapchain;
pub mod sync;

#[cfg(test)]
pub(crate) mod mock;

pub use device::VulkanDevice;
pub use swapchain::Swapchain;
