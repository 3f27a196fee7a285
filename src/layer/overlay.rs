// Overlay layer - debug UI drawn on top of the main pass
//
// Wraps any immediate-mode UI behind OverlayUi. The UI draws into the frame's
// own command buffer during the overlay phase and never submits on its own.

use anyhow::Result;

use super::{AttachContext, FrameContext, Layer};

/// The UI backend an overlay layer drives
pub trait OverlayUi<E> {
    /// Fonts, descriptor pools and the like
    fn create_resources(&mut self, target: &AttachContext) -> Result<()>;

    fn release_resources(&mut self);

    fn update(&mut self, _delta_time: f64) {}

    fn draw(&mut self, frame: &FrameContext);

    /// Return true when the UI wants the event for itself
    fn handle_event(&mut self, event: &E) -> bool;
}

pub struct OverlayLayer<U> {
    name: String,
    ui: U,
    attached: bool,
}

impl<U> OverlayLayer<U> {
    pub fn new(name: impl Into<String>, ui: U) -> Self {
        Self {
            name: name.into(),
            ui,
            attached: false,
        }
    }

    fn assert_attached(&self) {
        assert!(self.attached, "overlay '{}' used while detached", self.name);
    }
}

impl<E, U: OverlayUi<E>> Layer<E> for OverlayLayer<U> {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_attach(&mut self, target: &AttachContext) -> Result<()> {
        assert!(!self.attached, "overlay '{}' attached twice", self.name);
        self.ui.create_resources(target)?;
        self.attached = true;
        Ok(())
    }

    fn on_detach(&mut self) {
        assert!(self.attached, "overlay '{}' detached twice", self.name);
        self.ui.release_resources();
        self.attached = false;
    }

    fn on_update(&mut self, delta_time: f64) {
        self.assert_attached();
        self.ui.update(delta_time);
    }

    fn on_overlay(&mut self, frame: &FrameContext) {
        self.assert_attached();
        self.ui.draw(frame);
    }

    fn on_event(&mut self, event: &E) -> bool {
        // Input may arrive before attach or after detach; nothing to route it to.
        // Hidden UIs still get events so their show key keeps working.
        self.attached && self.ui.handle_event(event)
    }
}
