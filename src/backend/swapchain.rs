// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// One Swapchain value is one generation: it is dropped and rebuilt wholesale
// on resize or when acquire/present report it out of date.
//
// Teardown order: framebuffers -> image views -> semaphores -> swapchain.
// The images themselves belong to the presentation engine.

use ash::vk;
use std::sync::Arc;
use std::time::Duration;

use super::device::{PresentDevice, QueueFamilyIndices};
use super::error::{Stage, SwapchainError, SwapchainResult};
use super::framebuffer::FramebufferSet;
use super::surface::SurfaceSupport;

// =============================================================================
// NEGOTIATION
// =============================================================================

/// How swapchain images are shared between queue families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingMode {
    Exclusive,
    Concurrent([u32; 2]),
}

impl SharingMode {
    pub fn vk_mode(&self) -> vk::SharingMode {
        match self {
            SharingMode::Exclusive => vk::SharingMode::EXCLUSIVE,
            SharingMode::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    /// Family indices to declare at creation; empty when exclusive
    pub fn queue_family_indices(&self) -> &[u32] {
        match self {
            SharingMode::Exclusive => &[],
            SharingMode::Concurrent(families) => families,
        }
    }
}

/// Everything negotiated with the surface for one swapchain generation
#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing: SharingMode,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainConfig {
    pub fn negotiate(
        support: &SurfaceSupport,
        queue_families: QueueFamilyIndices,
        width: u32,
        height: u32,
    ) -> SwapchainResult<Self> {
        let surface_format =
            choose_surface_format(&support.formats).ok_or(SwapchainError::NoSurfaceFormat)?;

        Ok(Self {
            surface_format,
            present_mode: choose_present_mode(&support.present_modes),
            extent: resolve_extent(&support.capabilities, width, height),
            image_count: resolve_image_count(&support.capabilities),
            sharing: resolve_sharing(queue_families),
            pre_transform: support.capabilities.current_transform,
        })
    }
}

/// Prefer 8-bit RGBA/BGRA UNORM in the sRGB non-linear color space,
/// otherwise take whatever the surface lists first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            (f.format == vk::Format::R8G8B8A8_UNORM || f.format == vk::Format::B8G8R8A8_UNORM)
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX: no tearing, never blocks on a full queue, triple buffered
/// FIFO: vsync, guaranteed available
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface dictates the size unless it reports the u32::MAX sentinel
pub fn resolve_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    let current = caps.current_extent;
    if current.width != u32::MAX && current.height != u32::MAX {
        return current;
    }

    vk::Extent2D {
        width: clamp_dimension(width, caps.min_image_extent.width, caps.max_image_extent.width),
        height: clamp_dimension(height, caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

// Some drivers leave the bounds zeroed alongside the sentinel
fn clamp_dimension(value: u32, min: u32, max: u32) -> u32 {
    if max == 0 || min > max {
        value
    } else {
        value.clamp(min, max)
    }
}

/// One image past the minimum so the CPU does not stall on the engine
pub fn resolve_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count > 0 && desired > caps.max_image_count {
        caps.max_image_count
    } else {
        desired
    }
}

pub fn resolve_sharing(queue_families: QueueFamilyIndices) -> SharingMode {
    if queue_families.is_shared() {
        SharingMode::Exclusive
    } else {
        SharingMode::Concurrent([queue_families.graphics, queue_families.present])
    }
}

// =============================================================================
// SWAPCHAIN
// =============================================================================

/// One slot of the presentable image ring
#[derive(Debug, Clone, Copy)]
pub struct PresentableImage {
    pub index: u32,
    /// Owned by the presentation engine, never destroyed here
    pub image: vk::Image,
    pub view: vk::ImageView,
    /// Signalled by the frame rendering into this image and waited on by its
    /// present. A present can still hold it when the next frame is submitted.
    pub render_finished: vk::Semaphore,
}

/// Result of a successful acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    pub index: u32,
    /// Still usable, but no longer matches the surface exactly
    pub suboptimal: bool,
}

pub struct Swapchain<D: PresentDevice> {
    swapchain: vk::SwapchainKHR,
    config: SwapchainConfig,
    images: Vec<PresentableImage>,
    framebuffers: Option<FramebufferSet>,
    /// Single acquire signal for the generation; limits us to one frame in flight
    image_available: vk::Semaphore,
    current_image: Option<u32>,
    acquire_timeout: u64,
    device: Arc<D>,
}

impl<D: PresentDevice> Swapchain<D> {
    pub fn new(
        device: Arc<D>,
        support: &SurfaceSupport,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> SwapchainResult<Self> {
        let config = SwapchainConfig::negotiate(support, device.queue_families(), width, height)?;

        log::info!(
            "Creating swapchain: {}x{}, {} images, {:?} / {:?}, {:?}",
            config.extent.width,
            config.extent.height,
            config.image_count,
            config.surface_format.format,
            config.present_mode,
            config.sharing,
        );

        let swapchain = device
            .create_swapchain(surface, &config)
            .map_err(SwapchainError::SwapchainCreation)?;

        let images = match Self::create_images(device.as_ref(), swapchain, config.surface_format.format) {
            Ok(images) => images,
            Err(e) => {
                device.destroy_swapchain(swapchain);
                return Err(e);
            }
        };

        let image_available = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(result) => {
                Self::release_images(device.as_ref(), &images);
                device.destroy_swapchain(swapchain);
                return Err(SwapchainError::SyncCreation(result));
            }
        };

        log::info!("Created swapchain with {} images", images.len());

        Ok(Self {
            swapchain,
            config,
            images,
            framebuffers: None,
            image_available,
            current_image: None,
            acquire_timeout: u64::MAX,
            device,
        })
    }

    /// Fetch the engine's images and build a 2D color view and a
    /// render-finished semaphore for each. Everything built before a failure
    /// is destroyed before returning.
    fn create_images(
        device: &D,
        swapchain: vk::SwapchainKHR,
        format: vk::Format,
    ) -> SwapchainResult<Vec<PresentableImage>> {
        let raw_images = device
            .swapchain_images(swapchain)
            .map_err(SwapchainError::SwapchainCreation)?;

        let mut images = Vec::with_capacity(raw_images.len());
        for (index, &image) in raw_images.iter().enumerate() {
            let view = match device.create_image_view(image, format) {
                Ok(view) => view,
                Err(result) => {
                    Self::release_images(device, &images);
                    return Err(SwapchainError::ViewCreation { index, result });
                }
            };
            let render_finished = match device.create_semaphore() {
                Ok(semaphore) => semaphore,
                Err(result) => {
                    device.destroy_image_view(view);
                    Self::release_images(device, &images);
                    return Err(SwapchainError::SyncCreation(result));
                }
            };

            let image = PresentableImage {
                index: index as u32,
                image,
                view,
                render_finished,
            };
            log::debug!(
                "Swapchain image {}: {:?} (view {:?})",
                image.index,
                image.image,
                image.view
            );
            images.push(image);
        }

        Ok(images)
    }

    /// Views first, then semaphores
    fn release_images(device: &D, images: &[PresentableImage]) {
        for image in images {
            device.destroy_image_view(image.view);
        }
        for image in images {
            device.destroy_semaphore(image.render_finished);
        }
    }

    /// Bound acquire waits; expiry is reported as a stale swapchain.
    /// `None` and a zero duration both wait forever: a zero timeout only
    /// polls, and every NOT_READY would force a rebuild.
    pub fn set_acquire_timeout(&mut self, timeout: Option<Duration>) {
        self.acquire_timeout = timeout
            .filter(|t| !t.is_zero())
            .map(|t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(u64::MAX);
    }

    /// Build framebuffers for every image against `render_pass`.
    ///
    /// The new set is built before the old one is destroyed, so a failed
    /// rebuild leaves the previous set in place.
    pub fn build_framebuffers(
        &mut self,
        render_pass: vk::RenderPass,
        extra_attachments: &[vk::ImageView],
    ) -> SwapchainResult<&FramebufferSet> {
        let views: Vec<vk::ImageView> = self.images.iter().map(|image| image.view).collect();
        let new_set = FramebufferSet::build(
            self.device.as_ref(),
            &views,
            self.config.extent,
            render_pass,
            extra_attachments,
        )?;

        if let Some(old) = self.framebuffers.take() {
            old.destroy(self.device.as_ref());
        }

        Ok(self.framebuffers.insert(new_set))
    }

    /// Wait for the presentation engine to hand over an image.
    ///
    /// At most one image may be held at a time: present it before acquiring
    /// again.
    pub fn acquire_next_image(&mut self) -> SwapchainResult<AcquiredImage> {
        if let Some(held) = self.current_image {
            return Err(SwapchainError::ImageAlreadyAcquired(held));
        }

        let result = self.device.acquire_next_image(
            self.swapchain,
            self.acquire_timeout,
            self.image_available,
        );

        match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::debug!("Acquired image {} from a suboptimal swapchain", index);
                }
                self.current_image = Some(index);
                Ok(AcquiredImage { index, suboptimal })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(SwapchainError::OutOfDate(Stage::Acquire)),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) if self.acquire_timeout != u64::MAX => {
                log::warn!("Swapchain acquire timed out, requesting rebuild");
                Err(SwapchainError::OutOfDate(Stage::Acquire))
            }
            Err(e) => Err(SwapchainError::Acquire(e)),
        }
    }

    /// Present the held image once `wait_semaphores` are signaled.
    ///
    /// Returns whether the swapchain is suboptimal. The image is handed back
    /// to the engine whatever the outcome.
    pub fn present(&mut self, wait_semaphores: &[vk::Semaphore]) -> SwapchainResult<bool> {
        let index = self.current_image.take().ok_or(SwapchainError::NoAcquiredImage)?;

        match self.device.queue_present(self.swapchain, index, wait_semaphores) {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(SwapchainError::OutOfDate(Stage::Present)),
            Err(result) => Err(SwapchainError::Present { index, result }),
        }
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    pub fn format(&self) -> vk::Format {
        self.config.surface_format.format
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available
    }

    /// Index of the held image, between a successful acquire and present
    pub fn current_image(&self) -> Option<u32> {
        self.current_image
    }

    /// Semaphore the held image's frame signals and its present waits on
    pub fn render_finished(&self) -> Option<vk::Semaphore> {
        let index = self.current_image?;
        self.images.get(index as usize).map(|image| image.render_finished)
    }

    pub fn framebuffers(&self) -> Option<&FramebufferSet> {
        self.framebuffers.as_ref()
    }

    /// Framebuffer for the held image, if framebuffers were built
    pub fn current_framebuffer(&self) -> Option<vk::Framebuffer> {
        let index = self.current_image?;
        self.framebuffers.as_ref()?.get(index as usize)
    }
}

impl<D: PresentDevice> Drop for Swapchain<D> {
    fn drop(&mut self) {
        log::debug!("Destroying swapchain generation ({} images)", self.images.len());

        if let Some(framebuffers) = self.framebuffers.take() {
            framebuffers.destroy(self.device.as_ref());
        }
        Self::release_images(self.device.as_ref(), &self.images);
        self.images.clear();
        self.device.destroy_semaphore(self.image_available);
        self.device.destroy_swapchain(self.swapchain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{Call, MockDevice};

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn support(min: u32, max: u32) -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: min,
                max_image_count: max,
                current_extent: vk::Extent2D { width: 800, height: 600 },
                ..Default::default()
            },
            formats: vec![format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    fn shared_families() -> QueueFamilyIndices {
        QueueFamilyIndices { graphics: 0, present: 0 }
    }

    fn framebuffer_handles(set: &FramebufferSet) -> Vec<vk::Framebuffer> {
        (0..).map_while(|i| set.get(i)).collect()
    }

    fn created_swapchain(device: &MockDevice) -> Option<(u32, SharingMode)> {
        device.calls().into_iter().find_map(|call| match call {
            Call::CreateSwapchain { image_count, sharing, .. } => Some((image_count, sharing)),
            _ => None,
        })
    }

    #[test]
    fn surface_format_prefers_unorm_srgb() {
        let formats = [
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[2]));
    }

    #[test]
    fn surface_format_takes_first_bgra_or_rgba_match_in_order() {
        let formats = [
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
    }

    #[test]
    fn surface_format_falls_back_to_first_listed() {
        let formats = [
            format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::HDR10_ST2084_EXT),
            // Right format, wrong color space
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&formats), choose_surface_format(&formats));
    }

    #[test]
    fn surface_format_none_for_empty_list() {
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        let modes = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn image_count_is_min_plus_one_when_unbounded() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(resolve_image_count(&caps), 3);
    }

    #[test]
    fn image_count_is_clamped_to_max() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(resolve_image_count(&caps), 2);
    }

    #[test]
    fn image_count_stays_within_bounds() {
        for min in 1..6 {
            for max in [0, min, min + 1, min + 4] {
                let caps = vk::SurfaceCapabilitiesKHR {
                    min_image_count: min,
                    max_image_count: max,
                    ..Default::default()
                };
                let count = resolve_image_count(&caps);
                assert!(count >= min);
                if max > 0 {
                    assert!(count <= max);
                }
            }
        }
    }

    #[test]
    fn extent_uses_requested_size_for_sentinel() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            ..Default::default()
        };
        assert_eq!(resolve_extent(&caps, 1280, 720), vk::Extent2D { width: 1280, height: 720 });
    }

    #[test]
    fn extent_sentinel_in_height_only_still_counts() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 0, height: u32::MAX },
            ..Default::default()
        };
        assert_eq!(resolve_extent(&caps, 1280, 720), vk::Extent2D { width: 1280, height: 720 });
    }

    #[test]
    fn extent_sentinel_clamps_to_surface_bounds() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 64, height: 64 },
            max_image_extent: vk::Extent2D { width: 1024, height: 1024 },
            ..Default::default()
        };
        assert_eq!(resolve_extent(&caps, 4000, 10), vk::Extent2D { width: 1024, height: 64 });
    }

    #[test]
    fn extent_follows_surface_when_reported() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 800, height: 600 },
            ..Default::default()
        };
        assert_eq!(resolve_extent(&caps, 1280, 720), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn sharing_is_exclusive_for_one_family() {
        let sharing = resolve_sharing(shared_families());
        assert_eq!(sharing, SharingMode::Exclusive);
        assert!(sharing.queue_family_indices().is_empty());
        assert_eq!(sharing.vk_mode(), vk::SharingMode::EXCLUSIVE);
    }

    #[test]
    fn sharing_is_concurrent_across_distinct_families() {
        let sharing = resolve_sharing(QueueFamilyIndices { graphics: 0, present: 2 });
        assert_eq!(sharing.queue_family_indices(), &[0, 2]);
        assert_eq!(sharing.vk_mode(), vk::SharingMode::CONCURRENT);
    }

    #[test]
    fn negotiate_rejects_empty_format_list() {
        let mut support = support(2, 0);
        support.formats.clear();
        let result = SwapchainConfig::negotiate(&support, shared_families(), 800, 600);
        assert!(matches!(result, Err(SwapchainError::NoSurfaceFormat)));
    }

    #[test]
    fn build_creates_one_view_per_image() {
        let device = Arc::new(MockDevice::new());
        let swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();

        assert_eq!(swapchain.image_count(), 3);
        assert_eq!(created_swapchain(&device), Some((3, SharingMode::Exclusive)));
        assert_eq!(device.live_views(), 3);
        for (i, image) in swapchain.images.iter().enumerate() {
            assert_eq!(image.index as usize, i);
        }
        assert_eq!(swapchain.extent(), vk::Extent2D { width: 800, height: 600 });
        assert_eq!(swapchain.current_image(), None);
    }

    #[test]
    fn build_passes_concurrent_sharing_for_distinct_families() {
        let device = Arc::new(MockDevice::with_queue_families(QueueFamilyIndices {
            graphics: 0,
            present: 2,
        }));
        let _swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();

        assert_eq!(
            created_swapchain(&device),
            Some((3, SharingMode::Concurrent([0, 2])))
        );
    }

    #[test]
    fn build_failure_leaves_nothing_alive() {
        let device = Arc::new(MockDevice::new());
        device.fail_swapchain_creation(vk::Result::ERROR_SURFACE_LOST_KHR);

        let result = Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600);
        assert!(matches!(
            result,
            Err(SwapchainError::SwapchainCreation(vk::Result::ERROR_SURFACE_LOST_KHR))
        ));
        assert_eq!(device.live_swapchains(), 0);
    }

    #[test]
    fn view_failure_releases_earlier_views_and_swapchain() {
        let device = Arc::new(MockDevice::new());
        device.fail_view_at(2, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);

        let result = Swapchain::new(device.clone(), &support(3, 0), vk::SurfaceKHR::null(), 800, 600);
        assert!(matches!(
            result,
            Err(SwapchainError::ViewCreation { index: 2, .. })
        ));
        assert_eq!(device.live_views(), 0);
        assert_eq!(device.live_swapchains(), 0);
    }

    #[test]
    fn semaphore_failure_releases_views_and_swapchain() {
        let device = Arc::new(MockDevice::new());
        device.fail_semaphore(vk::Result::ERROR_OUT_OF_HOST_MEMORY);

        let result = Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600);
        assert!(matches!(result, Err(SwapchainError::SyncCreation(_))));
        assert_eq!(device.live_views(), 0);
        assert_eq!(device.live_swapchains(), 0);
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn each_image_gets_its_own_render_finished_semaphore() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();
        assert_eq!(swapchain.render_finished(), None);

        let mut seen = Vec::new();
        for _ in 0..swapchain.image_count() {
            swapchain.acquire_next_image().unwrap();
            let semaphore = swapchain.render_finished().unwrap();
            assert_ne!(semaphore, swapchain.image_available());
            assert!(!seen.contains(&semaphore));
            seen.push(semaphore);

            swapchain.present(&[semaphore]).unwrap();
            assert_eq!(device.last_present_waits(), vec![semaphore]);
            assert_eq!(swapchain.render_finished(), None);
        }

        // The ring wraps back to the first image's semaphore
        swapchain.acquire_next_image().unwrap();
        assert_eq!(swapchain.render_finished(), Some(seen[0]));
    }

    #[test]
    fn acquire_then_present_cycles() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();

        for expected in [0, 1, 2, 0] {
            let acquired = swapchain.acquire_next_image().unwrap();
            assert_eq!(acquired, AcquiredImage { index: expected, suboptimal: false });
            assert_eq!(swapchain.current_image(), Some(expected));

            let suboptimal = swapchain.present(&[]).unwrap();
            assert!(!suboptimal);
            assert_eq!(swapchain.current_image(), None);
        }

        assert_eq!(device.presented(), vec![0, 1, 2, 0]);
    }

    #[test]
    fn acquire_waits_on_generation_semaphore_without_timeout() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();

        swapchain.acquire_next_image().unwrap();
        let (timeout, semaphore) = device.last_acquire().unwrap();
        assert_eq!(timeout, u64::MAX);
        assert_eq!(semaphore, swapchain.image_available());
    }

    #[test]
    fn present_without_acquire_is_rejected() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();

        assert!(matches!(swapchain.present(&[]), Err(SwapchainError::NoAcquiredImage)));
        assert!(device.presented().is_empty());

        // The failed call did not disturb the cycle
        swapchain.acquire_next_image().unwrap();
        swapchain.present(&[]).unwrap();
        assert!(matches!(swapchain.present(&[]), Err(SwapchainError::NoAcquiredImage)));
    }

    #[test]
    fn second_acquire_before_present_is_rejected() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();

        let first = swapchain.acquire_next_image().unwrap();
        assert!(matches!(
            swapchain.acquire_next_image(),
            Err(SwapchainError::ImageAlreadyAcquired(i)) if i == first.index
        ));
        assert_eq!(swapchain.current_image(), Some(first.index));
    }

    #[test]
    fn out_of_date_acquire_is_stale() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();

        device.fail_next_acquire(vk::Result::ERROR_OUT_OF_DATE_KHR);
        let err = swapchain.acquire_next_image().unwrap_err();
        assert!(err.is_stale());
        assert_eq!(swapchain.current_image(), None);
    }

    #[test]
    fn device_loss_on_acquire_is_fatal() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();

        device.fail_next_acquire(vk::Result::ERROR_DEVICE_LOST);
        let err = swapchain.acquire_next_image().unwrap_err();
        assert!(matches!(err, SwapchainError::Acquire(vk::Result::ERROR_DEVICE_LOST)));
        assert!(!err.is_stale());
    }

    #[test]
    fn acquire_timeout_is_stale_only_when_bounded() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();

        device.fail_next_acquire(vk::Result::TIMEOUT);
        assert!(matches!(
            swapchain.acquire_next_image(),
            Err(SwapchainError::Acquire(vk::Result::TIMEOUT))
        ));

        swapchain.set_acquire_timeout(Some(Duration::from_millis(100)));
        device.fail_next_acquire(vk::Result::TIMEOUT);
        assert!(swapchain.acquire_next_image().unwrap_err().is_stale());
        assert_eq!(device.last_acquire().unwrap().0, 100_000_000);
    }

    #[test]
    fn zero_acquire_timeout_waits_forever() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();

        swapchain.set_acquire_timeout(Some(Duration::ZERO));
        device.fail_next_acquire(vk::Result::NOT_READY);
        assert!(!swapchain.acquire_next_image().unwrap_err().is_stale());
        assert_eq!(device.last_acquire().unwrap().0, u64::MAX);

        swapchain.acquire_next_image().unwrap();
        assert_eq!(device.last_acquire().unwrap().0, u64::MAX);
    }

    #[test]
    fn suboptimal_results_are_reported_not_failed() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();

        device.set_suboptimal(true);
        let acquired = swapchain.acquire_next_image().unwrap();
        assert!(acquired.suboptimal);
        assert!(swapchain.present(&[]).unwrap());
    }

    #[test]
    fn present_errors_distinguish_stale_from_fatal() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();

        swapchain.acquire_next_image().unwrap();
        device.fail_next_present(vk::Result::ERROR_OUT_OF_DATE_KHR);
        let err = swapchain.present(&[]).unwrap_err();
        assert!(matches!(err, SwapchainError::OutOfDate(Stage::Present)));
        assert_eq!(swapchain.current_image(), None);

        let acquired = swapchain.acquire_next_image().unwrap();
        device.fail_next_present(vk::Result::ERROR_SURFACE_LOST_KHR);
        let err = swapchain.present(&[]).unwrap_err();
        assert!(matches!(
            err,
            SwapchainError::Present { index, result: vk::Result::ERROR_SURFACE_LOST_KHR } if index == acquired.index
        ));
        assert!(!err.is_stale());
    }

    #[test]
    fn present_forwards_wait_semaphores() {
        use ash::vk::Handle;

        let device = Arc::new(MockDevice::new());
        let mut swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();
        let render_finished = vk::Semaphore::from_raw(0xbeef);

        swapchain.acquire_next_image().unwrap();
        swapchain.present(&[render_finished]).unwrap();
        assert_eq!(device.last_present_waits(), vec![render_finished]);
    }

    #[test]
    fn teardown_destroys_framebuffers_then_views_then_semaphores_then_swapchain() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain =
            Swapchain::new(device.clone(), &support(1, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();
        swapchain
            .build_framebuffers(vk::RenderPass::null(), &[])
            .unwrap();
        device.clear_calls();

        drop(swapchain);

        let calls = device.calls();
        let kinds: Vec<&str> = calls.iter().map(Call::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "destroy_framebuffer",
                "destroy_framebuffer",
                "destroy_image_view",
                "destroy_image_view",
                "destroy_semaphore",
                "destroy_semaphore",
                "destroy_semaphore",
                "destroy_swapchain",
            ]
        );
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn teardown_with_zero_images_does_not_panic() {
        let device = Arc::new(MockDevice::new());
        device.set_engine_image_count(Some(0));

        let swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();
        assert_eq!(swapchain.image_count(), 0);
        drop(swapchain);
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn framebuffer_rebuild_replaces_whole_set() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();

        let first = framebuffer_handles(
            swapchain
                .build_framebuffers(vk::RenderPass::null(), &[])
                .unwrap(),
        );
        let second = framebuffer_handles(
            swapchain
                .build_framebuffers(vk::RenderPass::null(), &[])
                .unwrap(),
        );

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);
        assert!(first.iter().all(|fb| !second.contains(fb)));
        assert_eq!(device.live_framebuffers(), 3);
    }

    #[test]
    fn failed_framebuffer_rebuild_keeps_previous_set() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();
        let first = framebuffer_handles(
            swapchain
                .build_framebuffers(vk::RenderPass::null(), &[])
                .unwrap(),
        );

        device.fail_framebuffer_at(1, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert!(swapchain.build_framebuffers(vk::RenderPass::null(), &[]).is_err());

        let kept = framebuffer_handles(swapchain.framebuffers().unwrap());
        assert_eq!(kept, first);
        assert_eq!(device.live_framebuffers(), 3);
    }

    #[test]
    fn current_framebuffer_tracks_acquired_image() {
        let device = Arc::new(MockDevice::new());
        let mut swapchain =
            Swapchain::new(device.clone(), &support(2, 0), vk::SurfaceKHR::null(), 800, 600).unwrap();
        swapchain
            .build_framebuffers(vk::RenderPass::null(), &[])
            .unwrap();

        assert_eq!(swapchain.current_framebuffer(), None);
        let acquired = swapchain.acquire_next_image().unwrap();
        let expected = swapchain.framebuffers().unwrap().get(acquired.index as usize);
        assert_eq!(swapchain.current_framebuffer(), expected);
    }
}
