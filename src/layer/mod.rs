// Layers - everything that renders on top of the frame loop
//
// A layer is a set of hooks the app calls in a fixed order every frame:
// update -> render -> overlay, plus event handling whenever input arrives.
// Layers never own the renderer; they get the frame's recording target
// passed in for the duration of each call.

pub mod frame_driver;
pub mod overlay;

use anyhow::Result;
use ash::vk;

pub use frame_driver::FrameDriver;
pub use overlay::{OverlayLayer, OverlayUi};

/// What a layer needs to know about the presentation target when attaching
#[derive(Debug, Clone, Copy)]
pub struct AttachContext {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub image_count: usize,
}

/// Where the acquired image will be drawn this frame
#[derive(Debug, Clone, Copy)]
pub struct FrameTarget {
    pub image_index: u32,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub delta_time: f64,
}

/// The frame currently being recorded
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub command_buffer: vk::CommandBuffer,
    pub image_index: u32,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub delta_time: f64,
}

pub trait Layer<E> {
    fn name(&self) -> &str;

    /// Acquire GPU-side resources. Called exactly once, before any other hook.
    fn on_attach(&mut self, _target: &AttachContext) -> Result<()> {
        Ok(())
    }

    /// Release what `on_attach` acquired. Called exactly once.
    fn on_detach(&mut self) {}

    fn on_update(&mut self, _delta_time: f64) {}

    fn on_render(&mut self, _frame: &FrameContext) {}

    fn on_overlay(&mut self, _frame: &FrameContext) {}

    /// Return true to consume the event
    fn on_event(&mut self, _event: &E) -> bool {
        false
    }
}

/// Attached layers, bottom first
pub struct LayerStack<E> {
    layers: Vec<Box<dyn Layer<E>>>,
}

impl<E> Default for LayerStack<E> {
    fn default() -> Self {
        Self { layers: Vec::new() }
    }
}

impl<E> LayerStack<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a layer and push it on top. A layer that fails to attach is
    /// dropped without being detached.
    pub fn push(&mut self, mut layer: Box<dyn Layer<E>>, target: &AttachContext) -> Result<()> {
        layer.on_attach(target)?;
        log::info!("Attached layer '{}'", layer.name());
        self.layers.push(layer);
        Ok(())
    }

    /// Detach and remove the top layer
    pub fn pop(&mut self) -> Option<Box<dyn Layer<E>>> {
        let mut layer = self.layers.pop()?;
        layer.on_detach();
        log::info!("Detached layer '{}'", layer.name());
        Some(layer)
    }

    /// Detach every layer, top first
    pub fn clear(&mut self) {
        while self.pop().is_some() {}
    }

    pub fn update(&mut self, delta_time: f64) {
        for layer in &mut self.layers {
            layer.on_update(delta_time);
        }
    }

    pub fn render(&mut self, frame: &FrameContext) {
        for layer in &mut self.layers {
            layer.on_render(frame);
        }
    }

    pub fn overlay(&mut self, frame: &FrameContext) {
        for layer in &mut self.layers {
            layer.on_overlay(frame);
        }
    }

    /// Offer an event to each layer, top first. Returns true as soon as one
    /// consumes it; the caller must then not handle it itself.
    pub fn dispatch_event(&mut self, event: &E) -> bool {
        for layer in self.layers.iter_mut().rev() {
            if layer.on_event(event) {
                log::trace!("Event consumed by layer '{}'", layer.name());
                return true;
            }
        }
        false
    }
}

impl<E> Drop for LayerStack<E> {
    fn drop(&mut self) {
        self.clear();
    }
}
