// Transient command recording
//
// One primary command buffer, re-recorded every frame. The pool is TRANSIENT
// (short-lived contents) and RESET_COMMAND_BUFFER (reset per frame).

use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;
use crate::layer::frame_driver::CommandRecorder;

pub struct TransientCommands {
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
    device: Arc<VulkanDevice>,
}

impl TransientCommands {
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.queue_families.graphics)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffer = match unsafe { device.device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(e) => {
                unsafe { device.device.destroy_command_pool(pool, None) };
                return Err(e).context("Failed to allocate command buffer");
            }
        };

        Ok(Self { pool, buffer, device })
    }
}

impl CommandRecorder for TransientCommands {
    fn begin(&mut self) -> VkResult<vk::CommandBuffer> {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .device
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
            self.device.device.begin_command_buffer(self.buffer, &begin_info)?;
        }
        Ok(self.buffer)
    }

    fn end(&mut self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.device.end_command_buffer(command_buffer) }
    }

    fn release(&mut self) {
        unsafe {
            // Also frees the command buffer
            self.device.device.destroy_command_pool(self.pool, None);
        }
        self.pool = vk::CommandPool::null();
        self.buffer = vk::CommandBuffer::null();
    }
}
