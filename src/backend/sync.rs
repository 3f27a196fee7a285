// Submission synchronization
//
// The semaphores live in the swapchain: one image-available semaphore per
// generation and one render-finished semaphore per image. This is the CPU
// side: the fence waited on before reusing the frame's command buffer.
// One instance, since only one frame is ever in flight.

use ash::vk;
use anyhow::Result;
use super::VulkanDevice;

pub struct FrameSync {
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let fence_info = vk::FenceCreateInfo::builder()
            .flags(vk::FenceCreateFlags::SIGNALED); // Start signaled

        let in_flight_fence = unsafe { device.device.create_fence(&fence_info, None)? };
        Ok(Self { in_flight_fence })
    }

    /// Block until the previous submission finished
    pub fn wait(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.wait_for_fences(&[self.in_flight_fence], true, u64::MAX)? };
        Ok(())
    }

    /// Re-arm the fence. Only call right before a submit that signals it,
    /// otherwise the next wait never returns.
    pub fn reset(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.reset_fences(&[self.in_flight_fence])? };
        Ok(())
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_fence(self.in_flight_fence, None) };
    }
}
