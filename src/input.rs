use std::collections::HashSet;

use glam::Vec2;
use winit::event::{DeviceEvent, ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Keyboard and mouse state for one frame.
///
/// Events are folded in between frames with [`Input::handle_event`]; the owner
/// calls [`Input::begin_frame`] once the frame has consumed them. Held state
/// survives `begin_frame`, per-frame deltas and edges do not.
#[derive(Debug, Default)]
pub struct Input {
    keys_down: HashSet<KeyCode>,
    keys_pressed: HashSet<KeyCode>,
    keys_released: HashSet<KeyCode>,
    buttons_down: HashSet<MouseButton>,
    buttons_pressed: HashSet<MouseButton>,
    buttons_released: HashSet<MouseButton>,
    cursor: Option<Vec2>,
    mouse_delta: Vec2,
    raw_motion: Vec2,
    scroll_delta: Vec2,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears edges and deltas collected during the previous frame.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.keys_released.clear();
        self.buttons_pressed.clear();
        self.buttons_released.clear();
        self.mouse_delta = Vec2::ZERO;
        self.raw_motion = Vec2::ZERO;
        self.scroll_delta = Vec2::ZERO;
    }

    /// Folds a window event into the current state.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => self.press_key(key),
                        ElementState::Released => self.release_key(key),
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => self.press_button(*button),
                ElementState::Released => self.release_button(*button),
            },
            WindowEvent::CursorMoved { position, .. } => {
                self.move_cursor(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::CursorLeft { .. } => self.cursor = None,
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll_delta += match delta {
                    MouseScrollDelta::LineDelta(x, y) => Vec2::new(*x, *y),
                    MouseScrollDelta::PixelDelta(pos) => {
                        Vec2::new(pos.x as f32, pos.y as f32) / 120.0
                    }
                };
            }
            WindowEvent::Focused(false) => self.release_all(),
            _ => {}
        }
    }

    /// Folds raw device motion, which keeps arriving when the cursor is grabbed.
    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.raw_motion += Vec2::new(delta.0 as f32, delta.1 as f32);
        }
    }

    pub fn press_key(&mut self, key: KeyCode) {
        if self.keys_down.insert(key) {
            self.keys_pressed.insert(key);
        }
    }

    pub fn release_key(&mut self, key: KeyCode) {
        if self.keys_down.remove(&key) {
            self.keys_released.insert(key);
        }
    }

    pub fn press_button(&mut self, button: MouseButton) {
        if self.buttons_down.insert(button) {
            self.buttons_pressed.insert(button);
        }
    }

    pub fn release_button(&mut self, button: MouseButton) {
        if self.buttons_down.remove(&button) {
            self.buttons_released.insert(button);
        }
    }

    /// Moves the cursor to `position` in window pixels. The first position
    /// after entering the window produces no delta.
    pub fn move_cursor(&mut self, position: Vec2) {
        if let Some(previous) = self.cursor {
            self.mouse_delta += position - previous;
        }
        self.cursor = Some(position);
    }

    fn release_all(&mut self) {
        let keys: Vec<KeyCode> = self.keys_down.iter().copied().collect();
        for key in keys {
            self.release_key(key);
        }
        let buttons: Vec<MouseButton> = self.buttons_down.iter().copied().collect();
        for button in buttons {
            self.release_button(button);
        }
    }

    pub fn key_down(&self, key: KeyCode) -> bool {
        self.keys_down.contains(&key)
    }

    /// True only on the frame the key went down.
    pub fn key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    pub fn key_released(&self, key: KeyCode) -> bool {
        self.keys_released.contains(&key)
    }

    pub fn mouse_down(&self, button: MouseButton) -> bool {
        self.buttons_down.contains(&button)
    }

    pub fn mouse_pressed(&self, button: MouseButton) -> bool {
        self.buttons_pressed.contains(&button)
    }

    pub fn mouse_released(&self, button: MouseButton) -> bool {
        self.buttons_released.contains(&button)
    }

    /// Last cursor position inside the window, if any.
    pub fn mouse_position(&self) -> Option<Vec2> {
        self.cursor
    }

    /// Cursor movement this frame, in pixels.
    ///
    /// Falls back to raw device motion when the cursor did not move (for
    /// example while it is locked).
    pub fn mouse_delta(&self) -> Vec2 {
        if self.mouse_delta == Vec2::ZERO {
            self.raw_motion
        } else {
            self.mouse_delta
        }
    }

    /// Scroll this frame, in lines.
    pub fn scroll_delta(&self) -> Vec2 {
        self.scroll_delta
    }
}
