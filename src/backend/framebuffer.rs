// Framebuffers - one per swapchain image
//
// Attachment slot 0 is always the swapchain image's view; caller-provided
// attachments (depth, etc.) follow in order. Rebuilt with the swapchain,
// never on its own.

use ash::vk;

use super::device::PresentDevice;
use super::error::{SwapchainError, SwapchainResult};

#[derive(Debug)]
pub struct FramebufferSet {
    framebuffers: Vec<vk::Framebuffer>,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
}

impl FramebufferSet {
    /// Create one framebuffer per view. On failure, framebuffers created so
    /// far are destroyed before the error is returned.
    pub fn build<D: PresentDevice + ?Sized>(
        device: &D,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
        extra_attachments: &[vk::ImageView],
    ) -> SwapchainResult<Self> {
        let mut attachments = Vec::with_capacity(1 + extra_attachments.len());
        attachments.push(vk::ImageView::null());
        attachments.extend_from_slice(extra_attachments);

        let mut framebuffers = Vec::with_capacity(views.len());
        for (index, &view) in views.iter().enumerate() {
            attachments[0] = view;

            match device.create_framebuffer(render_pass, &attachments, extent) {
                Ok(framebuffer) => framebuffers.push(framebuffer),
                Err(result) => {
                    for framebuffer in framebuffers {
                        device.destroy_framebuffer(framebuffer);
                    }
                    return Err(SwapchainError::FramebufferCreation { index, result });
                }
            }
        }

        log::debug!(
            "Created {} framebuffers ({}x{}, {} attachments each)",
            framebuffers.len(),
            extent.width,
            extent.height,
            attachments.len()
        );

        Ok(Self {
            framebuffers,
            render_pass,
            extent,
        })
    }

    pub fn get(&self, index: usize) -> Option<vk::Framebuffer> {
        self.framebuffers.get(index).copied()
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn destroy<D: PresentDevice + ?Sized>(self, device: &D) {
        for framebuffer in self.framebuffers {
            device.destroy_framebuffer(framebuffer);
        }
    }
}
