// =============================================================================
// VULKAN PRESENTER - Swapchain presentation core with a layered frame loop
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit App (window, input, resize)                              │
// │    └── LayerStack (update -> render -> overlay, events)         │
// │          └── FrameDriver (one command buffer per frame)         │
// │                └── Swapchain (images, views, framebuffers)      │
// │                      └── VulkanDevice + Surface                 │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Wait for the previous frame's fence
// 2. Acquire swapchain image (stale -> rebuild next frame)
// 3. Begin frame, record main pass + layers + overlay into one buffer
// 4. Submit, waiting on image-available, signalling render-finished
// 5. Present (stale or suboptimal -> rebuild next frame)
//
// =============================================================================

mod backend;
mod config;
mod hud;
mod layer;

use anyhow::{Context, Result};
use ash::vk;
use backend::command::TransientCommands;
use backend::render_pass::{self, DepthBuffer};
use backend::sync::FrameSync;
use backend::{Swapchain, VulkanDevice};
use config::Config;
use hud::FpsHud;
use layer::{AttachContext, FrameDriver, FrameTarget, LayerStack, OverlayLayer};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::KeyCode,
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml; the logger needs its level, so
    // the outcome is reported once logging is up
    let (config, source) = Config::load();

    init_logging(&config);
    source.report();
    log::debug!("Config: {:?}", config);
    log::info!("Starting Vulkan presenter");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Level comes from config; RUST_LOG still wins when set
fn init_logging(config: &Config) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.debug.level_filter());
    builder.parse_default_env();
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Main application struct holding all Vulkan resources.
///
/// Destruction order is explicit in Drop; the device goes last.
pub struct App {
    config: Config,

    // ─────────────────────────────────────────────────────────────────────────
    // WINDOW
    // ─────────────────────────────────────────────────────────────────────────
    window: Option<Arc<Window>>,
    is_fullscreen: bool,
    overlay_key: KeyCode,

    // ─────────────────────────────────────────────────────────────────────────
    // VULKAN CORE
    // ─────────────────────────────────────────────────────────────────────────
    device: Option<Arc<VulkanDevice>>,
    swapchain: Option<Swapchain<VulkanDevice>>,
    depth: Option<DepthBuffer>,
    /// Recreated only when the swapchain format changes
    render_pass: Option<(vk::RenderPass, vk::Format)>,

    // ─────────────────────────────────────────────────────────────────────────
    // FRAME LOOP
    // ─────────────────────────────────────────────────────────────────────────
    driver: FrameDriver<TransientCommands>,
    layers: LayerStack<WindowEvent>,
    /// One frame in flight: the swapchain has a single acquire semaphore
    frame_sync: Option<FrameSync>,

    // ─────────────────────────────────────────────────────────────────────────
    // STATE FLAGS
    // ─────────────────────────────────────────────────────────────────────────
    /// Rebuild the swapchain generation before the next frame
    pub needs_resize: bool,
    /// Window has zero area - skip rendering
    pub is_minimized: bool,

    // ─────────────────────────────────────────────────────────────────────────
    // FPS TRACKING
    // ─────────────────────────────────────────────────────────────────────────
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    pub fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let overlay_key = hud::parse_key_code(&config.overlay.toggle_key).unwrap_or_else(|| {
            log::warn!(
                "Unknown overlay toggle key '{}', using F1",
                config.overlay.toggle_key
            );
            KeyCode::F1
        });
        let now = Instant::now();
        Self {
            config,
            window: None,
            is_fullscreen,
            overlay_key,
            device: None,
            swapchain: None,
            depth: None,
            render_pass: None,
            driver: FrameDriver::new(),
            layers: LayerStack::new(),
            frame_sync: None,
            needs_resize: false,
            is_minimized: false,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Called once when the window is created:
    /// 1. Vulkan device and surface
    /// 2. First swapchain generation
    /// 3. Frame sync and the frame driver's command buffer
    /// 4. Layers
    fn init_vulkan(&mut self, window: Arc<Window>) -> Result<()> {
        log::info!("Initializing Vulkan...");

        // Validation only makes sense in debug builds
        let enable_validation = cfg!(debug_assertions) && self.config.debug.validation_layers;

        let (display_handle, window_handle) = {
            use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
            let display = window
                .display_handle()
                .context("Failed to get display handle")?
                .as_raw();
            let window = window
                .window_handle()
                .context("Failed to get window handle")?
                .as_raw();
            (display, window)
        };

        let device = VulkanDevice::new(
            &self.config.window.title,
            enable_validation,
            display_handle,
            window_handle,
        )?;
        self.device = Some(device.clone());

        self.create_swapchain_resources(&window)?;

        // These don't need to be recreated on resize
        self.frame_sync = Some(FrameSync::new(&device)?);
        self.driver.attach(TransientCommands::new(device.clone())?);

        if self.config.overlay.enabled {
            let target = self.attach_target(&window);
            let hud = FpsHud::new(device.device.clone(), self.overlay_key);
            self.layers
                .push(Box::new(OverlayLayer::new("fps-overlay", hud)), &target)?;
        }

        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    /// What layers see of the presentation target. Before the first
    /// swapchain exists (minimized at startup) only the size is known.
    fn attach_target(&self, window: &Window) -> AttachContext {
        match self.swapchain.as_ref() {
            Some(swapchain) => AttachContext {
                format: swapchain.format(),
                extent: swapchain.extent(),
                image_count: swapchain.image_count(),
            },
            None => {
                let size = window.inner_size();
                AttachContext {
                    format: vk::Format::UNDEFINED,
                    extent: vk::Extent2D {
                        width: size.width,
                        height: size.height,
                    },
                    image_count: 0,
                }
            }
        }
    }

    /// Build a swapchain generation: swapchain -> depth -> render pass ->
    /// framebuffers.
    ///
    /// Separated from init_vulkan because it runs again on every resize and
    /// every stale acquire/present.
    fn create_swapchain_resources(&mut self, window: &Window) -> Result<()> {
        let device = self.device.clone().context("Device not initialized")?;

        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            self.is_minimized = true;
            return Ok(());
        }

        let support = device.surface.query_support(device.physical_device)?;
        if support.is_zero_sized() {
            log::debug!("Surface has zero extent, deferring swapchain creation");
            self.is_minimized = true;
            return Ok(());
        }
        self.is_minimized = false;

        // The surface can only have one swapchain at a time, and the old
        // framebuffers reference the old depth view
        self.swapchain = None;
        self.depth = None;

        let mut swapchain = Swapchain::new(
            device.clone(),
            &support,
            device.surface.surface,
            size.width,
            size.height,
        )?;
        swapchain.set_acquire_timeout(self.config.graphics.acquire_timeout());

        let depth = if self.config.graphics.depth_attachment {
            Some(DepthBuffer::new(device.clone(), swapchain.extent())?)
        } else {
            None
        };

        let render_pass = match self.render_pass {
            Some((render_pass, format)) if format == swapchain.format() => render_pass,
            previous => {
                if let Some((old, _)) = previous {
                    unsafe { device.device.destroy_render_pass(old, None) };
                    self.render_pass = None;
                }
                let render_pass = render_pass::create_render_pass(
                    &device,
                    swapchain.format(),
                    depth.is_some(),
                )?;
                self.render_pass = Some((render_pass, swapchain.format()));
                render_pass
            }
        };

        let extra: Vec<vk::ImageView> = depth.iter().map(|depth| depth.view).collect();
        swapchain.build_framebuffers(render_pass, &extra)?;

        self.swapchain = Some(swapchain);
        self.depth = depth;
        self.needs_resize = false;

        Ok(())
    }

    /// Rebuild after a resize or a stale swapchain.
    fn recreate_swapchain(&mut self) -> Result<()> {
        // Wait for GPU to finish all work before destroying resources
        if let Some(ref device) = self.device {
            device.wait_idle()?;
        }

        let window = self.window.clone();
        if let Some(ref win) = window {
            self.create_swapchain_resources(win)?;
        }

        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render a single frame. Returns whether an image was presented.
    ///
    /// Stale results only flag a rebuild; everything else is returned as an
    /// error and ends the app.
    pub fn render_frame(&mut self) -> Result<bool> {
        if self.is_minimized {
            return Ok(false);
        }

        if self.needs_resize {
            self.recreate_swapchain()?;
            if self.is_minimized {
                return Ok(false);
            }
        }

        let now = Instant::now();
        let delta_time = now.duration_since(self.last_frame_time).as_secs_f64();

        let device = self.device.clone().context("Device not initialized")?;
        let sync = self.frame_sync.as_ref().context("Frame sync not initialized")?;
        let swapchain = self.swapchain.as_mut().context("Swapchain not initialized")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Wait for the previous frame
        // ─────────────────────────────────────────────────────────────────────
        // Must come before acquire: the single image-available semaphore may
        // still have a pending wait from the last submit.
        sync.wait(&device.device)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Acquire next swapchain image
        // ─────────────────────────────────────────────────────────────────────
        let acquired = match swapchain.acquire_next_image() {
            Ok(acquired) => acquired,
            Err(e) if e.is_stale() => {
                log::debug!("{}, rebuilding", e);
                self.needs_resize = true;
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        if acquired.suboptimal {
            self.needs_resize = true;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Record and submit
        // ─────────────────────────────────────────────────────────────────────
        self.layers.update(delta_time);

        let clear_color = self.config.graphics.clear_color;
        submit_frame(
            &device,
            swapchain,
            sync,
            &mut self.driver,
            &mut self.layers,
            clear_color,
            self.depth.is_some(),
            delta_time,
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Present the image
        // ─────────────────────────────────────────────────────────────────────
        let render_finished = swapchain
            .render_finished()
            .context("No image held for present")?;
        match swapchain.present(&[render_finished]) {
            Ok(suboptimal) => {
                if suboptimal {
                    self.needs_resize = true;
                }
            }
            Err(e) if e.is_stale() => {
                log::debug!("{}, rebuilding", e);
                self.needs_resize = true;
            }
            Err(e) => return Err(e.into()),
        }

        Ok(true)
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }

            self.needs_resize = true;
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    pub fn update_fps(&mut self) {
        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        if !self.config.debug.show_fps {
            return;
        }

        // Update title every second
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                let mode = if self.is_fullscreen { "fullscreen" } else { "windowed" };
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) [{}]",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                    mode
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

/// Record the main pass plus every layer into the frame's command buffer
/// and submit it.
///
/// The submit waits on the swapchain's image-available semaphore at the
/// color-output stage and signals the held image's render-finished semaphore
/// plus the in-flight fence.
#[allow(clippy::too_many_arguments)]
fn submit_frame(
    device: &VulkanDevice,
    swapchain: &Swapchain<VulkanDevice>,
    sync: &FrameSync,
    driver: &mut FrameDriver<TransientCommands>,
    layers: &mut LayerStack<WindowEvent>,
    clear_color: [f32; 4],
    with_depth: bool,
    delta_time: f64,
) -> Result<()> {
    let image_index = swapchain.current_image().context("No image acquired")?;
    let framebuffers = swapchain.framebuffers().context("Framebuffers not built")?;
    let framebuffer = swapchain
        .current_framebuffer()
        .with_context(|| format!("No framebuffer for image {}", image_index))?;
    let render_finished = swapchain.render_finished().context("No image acquired")?;
    let render_pass = framebuffers.render_pass();

    driver.begin_frame(FrameTarget {
        image_index,
        framebuffer,
        extent: framebuffers.extent(),
        delta_time,
    })?;

    let clear_values = [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ];
    let clear_values = if with_depth { &clear_values[..] } else { &clear_values[..1] };

    driver.record(|frame| {
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(frame.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: frame.extent,
            })
            .clear_values(clear_values);

        unsafe {
            device.device.cmd_begin_render_pass(
                frame.command_buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }

        layers.render(frame);
        // Overlay last, inside the same pass, so it lands on top
        layers.overlay(frame);

        unsafe { device.device.cmd_end_render_pass(frame.command_buffer) };
    })?;

    let wait_semaphores = [swapchain.image_available()];
    let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
    let signal_semaphores = [render_finished];

    driver.end_frame(|recorded| -> Result<()> {
        log::trace!("Submitting frame for image {}", recorded.image_index);
        let command_buffers = [recorded.command_buffer];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        sync.reset(&device.device)?;
        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info.build()], sync.in_flight_fence)
                .context("Failed to submit frame")?;
        }
        Ok(())
    })
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        // Needed by swapchain rebuilds triggered during init
        self.window = Some(window.clone());

        if let Err(e) = self.init_vulkan(window) {
            log::error!("Failed to initialize Vulkan: {:?}", e);
            event_loop.exit();
        }
    }

    /// Handle window events. Layers see input first; whatever they consume
    /// never reaches the app.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        if self.layers.dispatch_event(&event) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref device) = self.device {
                    let _ = device.wait_idle();
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                if size.width == 0 || size.height == 0 {
                    self.is_minimized = true;
                } else {
                    self.is_minimized = false;
                    self.needs_resize = true;
                }
            }

            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(true) => self.update_fps(),
                Ok(false) => {}
                Err(e) => {
                    log::error!("Render error: {:?}", e);
                    event_loop.exit();
                }
            },

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::PhysicalKey;

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                event_loop.exit();
                            }
                            KeyCode::F11 => {
                                self.toggle_fullscreen();
                            }
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws for maximum FPS.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        if let Some(device) = self.device.take() {
            // Wait for GPU to finish before destroying anything
            let _ = device.wait_idle();

            // 1. Layers release what they attached with
            self.layers.clear();

            // 2. Command pool
            if self.driver.is_attached() {
                self.driver.detach();
            }

            // 3. Sync objects
            if let Some(sync) = self.frame_sync.take() {
                sync.destroy(&device.device);
            }

            // 4. Swapchain generation, then what its framebuffers referenced
            self.swapchain = None;
            self.depth = None;
            if let Some((render_pass, _)) = self.render_pass.take() {
                unsafe { device.device.destroy_render_pass(render_pass, None) };
            }

            // 5. Device (and surface) when the last Arc goes
        }

        log::info!("Cleanup complete");
    }
}
