//! Input forwarding.
//!
//! The UI layer hands over events it has already recognized; this module
//! only maps their coordinates into the browser's pixel space and passes
//! them on. Key code translation stays with the UI layer.

use display_sink::SharedScaleFactor;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InputModifiers: u32 {
        const CAPS_LOCK_ON = 1 << 0;
        const SHIFT_DOWN = 1 << 1;
        const CONTROL_DOWN = 1 << 2;
        const ALT_DOWN = 1 << 3;
        const LEFT_MOUSE_BUTTON = 1 << 4;
        const MIDDLE_MOUSE_BUTTON = 1 << 5;
        const RIGHT_MOUSE_BUTTON = 1 << 6;
        const COMMAND_DOWN = 1 << 7;
        const NUM_LOCK_ON = 1 << 8;
        const IS_KEY_PAD = 1 << 9;
        const IS_LEFT = 1 << 10;
        const IS_RIGHT = 1 << 11;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TouchPhase {
    Pressed,
    Released,
    Moved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    RawKeyDown,
    KeyUp,
    Char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub windows_key_code: i32,
    pub native_key_code: i32,
    pub is_system_key: bool,
    pub modifiers: InputModifiers,
}

/// Position in the browser's pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DevicePoint {
    pub x: i32,
    pub y: i32,
}

/// Position in UI logical units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LogicalPoint {
    pub x: f64,
    pub y: f64,
}

impl LogicalPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UiInputEvent {
    MouseMove {
        position: LogicalPoint,
        modifiers: InputModifiers,
    },
    MouseLeave {
        position: LogicalPoint,
        modifiers: InputModifiers,
    },
    MouseButton {
        position: LogicalPoint,
        button: MouseButton,
        released: bool,
        click_count: u32,
        modifiers: InputModifiers,
    },
    MouseWheel {
        position: LogicalPoint,
        delta_x: i32,
        delta_y: i32,
        modifiers: InputModifiers,
    },
    Touch {
        id: i32,
        position: LogicalPoint,
        phase: TouchPhase,
    },
    Key(KeyEvent),
    Focus(bool),
    /// Anything the UI layer saw but the browser has no mapping for (extra
    /// mouse buttons, drag-and-drop, gestures).
    Unrecognized,
}

/// Input side of the browser engine.
pub trait BrowserInput {
    fn send_mouse_move(&mut self, point: DevicePoint, leaving: bool, modifiers: InputModifiers);

    fn send_mouse_click(
        &mut self,
        point: DevicePoint,
        button: MouseButton,
        released: bool,
        click_count: u32,
        modifiers: InputModifiers,
    );

    fn send_mouse_wheel(&mut self, point: DevicePoint, delta_x: i32, delta_y: i32, modifiers: InputModifiers);

    fn send_touch(&mut self, id: i32, point: DevicePoint, phase: TouchPhase);

    fn send_key(&mut self, event: KeyEvent);

    fn set_focus(&mut self, focused: bool);
}

pub struct InputAdapter<B: BrowserInput> {
    browser: B,
    scale_factor: SharedScaleFactor,
}

impl<B: BrowserInput> InputAdapter<B> {
    pub fn new(browser: B, scale_factor: f64) -> Self {
        Self::with_scale_factor(browser, SharedScaleFactor::new(scale_factor))
    }

    /// Adapter whose mapping follows `scale_factor`, typically the display
    /// sink's handle.
    pub fn with_scale_factor(browser: B, scale_factor: SharedScaleFactor) -> Self {
        Self {
            browser,
            scale_factor,
        }
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn into_browser(self) -> B {
        self.browser
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor.get()
    }

    /// Detaches from any shared scale and maps with `scale_factor` from now
    /// on. Invalid values are ignored.
    pub fn set_scale_factor(&mut self, scale_factor: f64) {
        if scale_factor.is_finite() && scale_factor > 0.0 {
            self.scale_factor = SharedScaleFactor::new(scale_factor);
        }
    }

    /// Truncates toward zero, matching how the engine rounds pointer input.
    pub fn to_device(&self, point: LogicalPoint) -> DevicePoint {
        let scale_factor = self.scale_factor.get();
        DevicePoint {
            x: (point.x * scale_factor) as i32,
            y: (point.y * scale_factor) as i32,
        }
    }

    /// Returns whether the event was forwarded.
    pub fn forward(&mut self, event: UiInputEvent) -> bool {
        match event {
            UiInputEvent::MouseMove {
                position,
                modifiers,
            } => {
                let point = self.to_device(position);
                self.browser.send_mouse_move(point, false, modifiers);
            }
            UiInputEvent::MouseLeave {
                position,
                modifiers,
            } => {
                let point = self.to_device(position);
                self.browser.send_mouse_move(point, true, modifiers);
            }
            UiInputEvent::MouseButton {
                position,
                button,
                released,
                click_count,
                modifiers,
            } => {
                let point = self.to_device(position);
                self.browser
                    .send_mouse_click(point, button, released, click_count, modifiers);
            }
            UiInputEvent::MouseWheel {
                position,
                delta_x,
                delta_y,
                modifiers,
            } => {
                let point = self.to_device(position);
                self.browser
                    .send_mouse_wheel(point, delta_x, delta_y, modifiers);
            }
            UiInputEvent::Touch {
                id,
                position,
                phase,
            } => {
                let point = self.to_device(position);
                self.browser.send_touch(id, point, phase);
            }
            UiInputEvent::Key(event) => self.browser.send_key(event),
            UiInputEvent::Focus(focused) => self.browser.set_focus(focused),
            UiInputEvent::Unrecognized => {
                tracing::trace!("input event not forwarded");
                return false;
            }
        }
        true
    }
}
