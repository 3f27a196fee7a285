// FPS HUD - the in-tree debug overlay
//
// Draws a frame-rate bar across the top of the image with attachment clears,
// so it needs no pipeline of its own. Runs inside the main render pass during
// the overlay phase.

use anyhow::Result;
use ash::vk;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::layer::{AttachContext, FrameContext, OverlayUi};

const BAR_MARGIN: u32 = 8;
const BAR_HEIGHT: u32 = 12;
/// Frame rate that fills the whole bar
const BAR_FULL_FPS: f64 = 240.0;
const SAMPLE_WINDOW: f64 = 0.5;

/// Averages frame times over a short window
#[derive(Debug, Default)]
pub struct FpsCounter {
    frames: u32,
    elapsed: f64,
    fps: f64,
}

impl FpsCounter {
    pub fn tick(&mut self, delta_time: f64) {
        self.frames += 1;
        self.elapsed += delta_time;
        if self.elapsed >= SAMPLE_WINDOW {
            self.fps = self.frames as f64 / self.elapsed;
            self.frames = 0;
            self.elapsed = 0.0;
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

/// Screen area of the bar for a given frame rate; zero-sized when there is
/// no room for it
pub fn bar_rect(extent: vk::Extent2D, fps: f64) -> vk::Rect2D {
    let usable = extent.width.saturating_sub(2 * BAR_MARGIN);
    let fill = (fps / BAR_FULL_FPS).clamp(0.0, 1.0);
    let height = if extent.height > BAR_MARGIN + BAR_HEIGHT { BAR_HEIGHT } else { 0 };

    vk::Rect2D {
        offset: vk::Offset2D {
            x: BAR_MARGIN as i32,
            y: BAR_MARGIN as i32,
        },
        extent: vk::Extent2D {
            width: (usable as f64 * fill) as u32,
            height,
        },
    }
}

fn bar_color(fps: f64) -> [f32; 4] {
    if fps >= 60.0 {
        [0.2, 0.9, 0.3, 1.0]
    } else if fps >= 30.0 {
        [0.95, 0.8, 0.2, 1.0]
    } else {
        [0.9, 0.2, 0.2, 1.0]
    }
}

fn contains(rect: vk::Rect2D, x: f64, y: f64) -> bool {
    let left = rect.offset.x as f64;
    let top = rect.offset.y as f64;
    x >= left
        && y >= top
        && x < left + rect.extent.width as f64
        && y < top + rect.extent.height as f64
}

/// Key names accepted by `[overlay] toggle_key`
pub fn parse_key_code(name: &str) -> Option<KeyCode> {
    let code = match name.trim().to_ascii_uppercase().as_str() {
        "F1" => KeyCode::F1,
        "F2" => KeyCode::F2,
        "F3" => KeyCode::F3,
        "F4" => KeyCode::F4,
        "F5" => KeyCode::F5,
        "F6" => KeyCode::F6,
        "F7" => KeyCode::F7,
        "F8" => KeyCode::F8,
        "F9" => KeyCode::F9,
        "F10" => KeyCode::F10,
        "F12" => KeyCode::F12,
        "TAB" => KeyCode::Tab,
        "BACKQUOTE" | "`" => KeyCode::Backquote,
        "INSERT" => KeyCode::Insert,
        _ => return None,
    };
    Some(code)
}

pub struct FpsHud {
    device: Option<ash::Device>,
    toggle_key: KeyCode,
    shown: bool,
    counter: FpsCounter,
    cursor: Option<(f64, f64)>,
    last_bar: Option<vk::Rect2D>,
}

impl FpsHud {
    /// `device` is only used for recording; it must outlive the overlay
    pub fn new(device: ash::Device, toggle_key: KeyCode) -> Self {
        Self {
            device: Some(device),
            ..Self::headless(toggle_key)
        }
    }

    fn headless(toggle_key: KeyCode) -> Self {
        Self {
            device: None,
            toggle_key,
            shown: true,
            counter: FpsCounter::default(),
            cursor: None,
            last_bar: None,
        }
    }

    fn toggle(&mut self) {
        self.shown = !self.shown;
        if !self.shown {
            self.last_bar = None;
        }
        log::debug!("FPS overlay {}", if self.shown { "shown" } else { "hidden" });
    }

    fn cursor_over_bar(&self) -> bool {
        match (self.cursor, self.last_bar) {
            (Some((x, y)), Some(bar)) => contains(bar, x, y),
            _ => false,
        }
    }
}

impl OverlayUi<WindowEvent> for FpsHud {
    fn create_resources(&mut self, target: &AttachContext) -> Result<()> {
        log::debug!(
            "FPS overlay attached ({:?}, {}x{}, {} images)",
            target.format,
            target.extent.width,
            target.extent.height,
            target.image_count
        );
        Ok(())
    }

    fn release_resources(&mut self) {
        self.device = None;
        self.last_bar = None;
    }

    fn update(&mut self, delta_time: f64) {
        self.counter.tick(delta_time);
    }

    fn draw(&mut self, frame: &FrameContext) {
        if !self.shown {
            return;
        }
        let Some(device) = self.device.as_ref() else {
            return;
        };

        let fps = self.counter.fps();
        let rect = bar_rect(frame.extent, fps);
        if rect.extent.width == 0 || rect.extent.height == 0 {
            self.last_bar = None;
            return;
        }

        let attachment = vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: bar_color(fps),
                },
            },
        };
        let clear_rect = vk::ClearRect {
            rect,
            base_array_layer: 0,
            layer_count: 1,
        };

        unsafe {
            device.cmd_clear_attachments(frame.command_buffer, &[attachment], &[clear_rect]);
        }
        self.last_bar = Some(rect);
    }

    fn handle_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && !event.repeat
                    && event.physical_key == PhysicalKey::Code(self.toggle_key)
                {
                    self.toggle();
                    return true;
                }
                false
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Some((position.x, position.y));
                false
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                false
            }
            // Clicks on the bar belong to the overlay
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => self.shown && self.cursor_over_bar(),
            _ => false,
        }
    }
}
