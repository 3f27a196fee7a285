// Surface - the window we present into
//
// Owns the platform surface handle and snapshots what the GPU supports for it.
// Destroyed by the device after every swapchain built on it is gone.

use anyhow::{Context, Result};
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

pub struct Surface {
    pub surface: vk::SurfaceKHR,
    pub loader: ash::extensions::khr::Surface,
}

impl Surface {
    /// Instance extensions needed to create a surface on this platform
    pub fn required_extensions() -> Vec<*const std::ffi::c_char> {
        let mut extensions = vec![ash::extensions::khr::Surface::name().as_ptr()];

        #[cfg(target_os = "windows")]
        extensions.push(ash::extensions::khr::Win32Surface::name().as_ptr());

        #[cfg(all(unix, not(target_os = "macos"), not(target_os = "android")))]
        {
            extensions.push(ash::extensions::khr::XlibSurface::name().as_ptr());
            extensions.push(ash::extensions::khr::WaylandSurface::name().as_ptr());
        }

        extensions
    }

    /// Create a surface for a native window
    ///
    /// # Safety
    /// The handles must refer to a live window that outlives the surface.
    pub unsafe fn new(
        entry: &Entry,
        instance: &ash::Instance,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> Result<Self> {
        let loader = ash::extensions::khr::Surface::new(entry, instance);

        let surface = match (display_handle, window_handle) {
            #[cfg(target_os = "windows")]
            (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
                let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0) as *const std::ffi::c_void;
                let hwnd = handle.hwnd.get() as *const std::ffi::c_void;
                let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                    .hinstance(hinstance)
                    .hwnd(hwnd);
                ash::extensions::khr::Win32Surface::new(entry, instance)
                    .create_win32_surface(&create_info, None)
                    .context("Failed to create Win32 surface")?
            }

            #[cfg(all(unix, not(target_os = "macos"), not(target_os = "android")))]
            (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(window)) => {
                let dpy = display
                    .display
                    .context("Xlib display handle is null")?
                    .as_ptr();
                let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                    .dpy(dpy as *mut _)
                    .window(window.window);
                ash::extensions::khr::XlibSurface::new(entry, instance)
                    .create_xlib_surface(&create_info, None)
                    .context("Failed to create Xlib surface")?
            }

            #[cfg(all(unix, not(target_os = "macos"), not(target_os = "android")))]
            (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(window)) => {
                let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                    .display(display.display.as_ptr())
                    .surface(window.surface.as_ptr());
                ash::extensions::khr::WaylandSurface::new(entry, instance)
                    .create_wayland_surface(&create_info, None)
                    .context("Failed to create Wayland surface")?
            }

            _ => anyhow::bail!("Unsupported window handle type"),
        };

        Ok(Self { surface, loader })
    }

    /// Whether a queue family of this GPU can present to the surface
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<bool> {
        let supported = unsafe {
            self.loader.get_physical_device_surface_support(
                physical_device,
                queue_family,
                self.surface,
            )
        }?;
        Ok(supported)
    }

    /// Snapshot capabilities, formats and present modes
    pub fn query_support(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        unsafe {
            let capabilities = self
                .loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .context("Failed to query surface capabilities")?;
            let formats = self
                .loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .context("Failed to query surface formats")?;
            let present_modes = self
                .loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
                .context("Failed to query present modes")?;

            Ok(SurfaceSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    pub(super) fn destroy(&self) {
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

/// What the surface supports, taken once per swapchain build
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// True while the window is minimised (the surface reports a 0x0 extent)
    pub fn is_zero_sized(&self) -> bool {
        let extent = self.capabilities.current_extent;
        extent.width == 0 || extent.height == 0
    }
}
