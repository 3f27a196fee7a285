// Mock PresentDevice for unit tests (no GPU required)
//
// Hands out fake handles, records every call in order, tracks which objects
// are still alive and lets tests inject failures.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use parking_lot::Mutex;
use std::collections::HashSet;

use super::device::{PresentDevice, QueueFamilyIndices};
use super::swapchain::{SharingMode, SwapchainConfig};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateSwapchain {
        swapchain: vk::SwapchainKHR,
        image_count: u32,
        sharing: SharingMode,
    },
    DestroySwapchain(vk::SwapchainKHR),
    CreateImageView(vk::ImageView),
    DestroyImageView(vk::ImageView),
    CreateFramebuffer {
        framebuffer: vk::Framebuffer,
        attachments: Vec<vk::ImageView>,
        extent: vk::Extent2D,
    },
    DestroyFramebuffer(vk::Framebuffer),
    CreateSemaphore(vk::Semaphore),
    DestroySemaphore(vk::Semaphore),
    Acquire { timeout: u64, semaphore: vk::Semaphore },
    Present { index: u32, waits: Vec<vk::Semaphore> },
}

impl Call {
    pub fn kind(&self) -> &'static str {
        match self {
            Call::CreateSwapchain { .. } => "create_swapchain",
            Call::DestroySwapchain(_) => "destroy_swapchain",
            Call::CreateImageView(_) => "create_image_view",
            Call::DestroyImageView(_) => "destroy_image_view",
            Call::CreateFramebuffer { .. } => "create_framebuffer",
            Call::DestroyFramebuffer(_) => "destroy_framebuffer",
            Call::CreateSemaphore(_) => "create_semaphore",
            Call::DestroySemaphore(_) => "destroy_semaphore",
            Call::Acquire { .. } => "acquire",
            Call::Present { .. } => "present",
        }
    }
}

#[derive(Default)]
struct MockState {
    next_handle: u64,
    calls: Vec<Call>,

    swapchains: HashSet<u64>,
    views: HashSet<u64>,
    framebuffers: HashSet<u64>,
    semaphores: HashSet<u64>,

    image_count: u32,
    next_image: u32,
    engine_image_count: Option<u32>,
    suboptimal: bool,

    fail_swapchain: Option<vk::Result>,
    fail_view: Option<(usize, vk::Result)>,
    view_calls: usize,
    fail_framebuffer: Option<(usize, vk::Result)>,
    framebuffer_calls: usize,
    fail_semaphore: Option<vk::Result>,
    fail_acquire: Option<vk::Result>,
    fail_present: Option<vk::Result>,
}

impl MockState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

pub struct MockDevice {
    queue_families: QueueFamilyIndices,
    state: Mutex<MockState>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::with_queue_families(QueueFamilyIndices { graphics: 0, present: 0 })
    }

    pub fn with_queue_families(queue_families: QueueFamilyIndices) -> Self {
        Self {
            queue_families,
            state: Mutex::new(MockState::default()),
        }
    }

    // Failure injection ------------------------------------------------------

    pub fn fail_swapchain_creation(&self, result: vk::Result) {
        self.state.lock().fail_swapchain = Some(result);
    }

    /// Fail the `index`-th image view created from now on
    pub fn fail_view_at(&self, index: usize, result: vk::Result) {
        let mut state = self.state.lock();
        state.fail_view = Some((index, result));
        state.view_calls = 0;
    }

    /// Fail the `index`-th framebuffer created from now on
    pub fn fail_framebuffer_at(&self, index: usize, result: vk::Result) {
        let mut state = self.state.lock();
        state.fail_framebuffer = Some((index, result));
        state.framebuffer_calls = 0;
    }

    pub fn fail_semaphore(&self, result: vk::Result) {
        self.state.lock().fail_semaphore = Some(result);
    }

    pub fn fail_next_acquire(&self, result: vk::Result) {
        self.state.lock().fail_acquire = Some(result);
    }

    pub fn fail_next_present(&self, result: vk::Result) {
        self.state.lock().fail_present = Some(result);
    }

    pub fn set_suboptimal(&self, suboptimal: bool) {
        self.state.lock().suboptimal = suboptimal;
    }

    /// Override how many images the engine hands back (default: min_image_count)
    pub fn set_engine_image_count(&self, count: Option<u32>) {
        self.state.lock().engine_image_count = count;
    }

    // Inspection -------------------------------------------------------------

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn live_swapchains(&self) -> usize {
        self.state.lock().swapchains.len()
    }

    pub fn live_views(&self) -> usize {
        self.state.lock().views.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state.lock().framebuffers.len()
    }

    pub fn live_objects(&self) -> usize {
        let state = self.state.lock();
        state.swapchains.len() + state.views.len() + state.framebuffers.len() + state.semaphores.len()
    }

    pub fn presented(&self) -> Vec<u32> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Present { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    pub fn last_acquire(&self) -> Option<(u64, vk::Semaphore)> {
        self.state.lock().calls.iter().rev().find_map(|call| match call {
            Call::Acquire { timeout, semaphore } => Some((*timeout, *semaphore)),
            _ => None,
        })
    }

    pub fn last_present_waits(&self) -> Vec<vk::Semaphore> {
        self.state
            .lock()
            .calls
            .iter()
            .rev()
            .find_map(|call| match call {
                Call::Present { waits, .. } => Some(waits.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

impl PresentDevice for MockDevice {
    fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    fn create_swapchain(
        &self,
        _surface: vk::SurfaceKHR,
        config: &SwapchainConfig,
    ) -> VkResult<vk::SwapchainKHR> {
        let mut state = self.state.lock();
        if let Some(result) = state.fail_swapchain.take() {
            return Err(result);
        }

        let raw = state.handle();
        let swapchain = vk::SwapchainKHR::from_raw(raw);
        state.swapchains.insert(raw);
        state.image_count = state.engine_image_count.unwrap_or(config.image_count);
        state.next_image = 0;
        state.calls.push(Call::CreateSwapchain {
            swapchain,
            image_count: config.image_count,
            sharing: config.sharing,
        });
        Ok(swapchain)
    }

    fn swapchain_images(&self, _swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let mut state = self.state.lock();
        let count = state.image_count;
        Ok((0..count).map(|_| vk::Image::from_raw(state.handle())).collect())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.lock();
        assert!(state.swapchains.remove(&swapchain.as_raw()), "double destroy of swapchain");
        state.calls.push(Call::DestroySwapchain(swapchain));
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format) -> VkResult<vk::ImageView> {
        let mut state = self.state.lock();
        let call = state.view_calls;
        state.view_calls += 1;
        if let Some((index, result)) = state.fail_view {
            if index == call {
                state.fail_view = None;
                return Err(result);
            }
        }

        let raw = state.handle();
        state.views.insert(raw);
        let view = vk::ImageView::from_raw(raw);
        state.calls.push(Call::CreateImageView(view));
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut state = self.state.lock();
        assert!(state.views.remove(&view.as_raw()), "double destroy of image view");
        state.calls.push(Call::DestroyImageView(view));
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let mut state = self.state.lock();
        let call = state.framebuffer_calls;
        state.framebuffer_calls += 1;
        if let Some((index, result)) = state.fail_framebuffer {
            if index == call {
                state.fail_framebuffer = None;
                return Err(result);
            }
        }

        let raw = state.handle();
        state.framebuffers.insert(raw);
        let framebuffer = vk::Framebuffer::from_raw(raw);
        state.calls.push(Call::CreateFramebuffer {
            framebuffer,
            attachments: attachments.to_vec(),
            extent,
        });
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        let mut state = self.state.lock();
        assert!(
            state.framebuffers.remove(&framebuffer.as_raw()),
            "double destroy of framebuffer"
        );
        state.calls.push(Call::DestroyFramebuffer(framebuffer));
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut state = self.state.lock();
        if let Some(result) = state.fail_semaphore.take() {
            return Err(result);
        }

        let raw = state.handle();
        state.semaphores.insert(raw);
        let semaphore = vk::Semaphore::from_raw(raw);
        state.calls.push(Call::CreateSemaphore(semaphore));
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.state.lock();
        assert!(
            state.semaphores.remove(&semaphore.as_raw()),
            "double destroy of semaphore"
        );
        state.calls.push(Call::DestroySemaphore(semaphore));
    }

    fn acquire_next_image(
        &self,
        _swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut state = self.state.lock();
        state.calls.push(Call::Acquire { timeout, semaphore });
        if let Some(result) = state.fail_acquire.take() {
            return Err(result);
        }
        if state.image_count == 0 {
            return Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        }

        let index = state.next_image;
        state.next_image = (index + 1) % state.image_count;
        Ok((index, state.suboptimal))
    }

    fn queue_present(
        &self,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> VkResult<bool> {
        let mut state = self.state.lock();
        state.calls.push(Call::Present {
            index: image_index,
            waits: wait_semaphores.to_vec(),
        });
        if let Some(result) = state.fail_present.take() {
            return Err(result);
        }
        Ok(state.suboptimal)
    }
}
