// ============================================================================
// input.rs — lifegrid
// Pointer/keyboard state collected from window events and handed to the
// sandbox once per frame.
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerButton {
    /// Paint live cells.
    Fill,
    /// Paint dead cells.
    Clear,
    /// Drag the view.
    Pan,
}

/// One-shot actions triggered by key presses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    ClearGrid,
    Reseed,
    GrowGrid,
    ShrinkGrid,
}

/// Everything the sandbox consumes for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameInput {
    /// Pointer position in surface pixels, `None` when outside the window.
    pub pointer_px: Option<[f32; 2]>,
    pub pointer_delta: [f32; 2],
    /// Surface size in pixels.
    pub viewport_px: [f32; 2],
    pub fill: bool,
    pub clear: bool,
    pub pan: bool,
    pub scroll_y: f32,
    /// Scroll adjusts zoom instead of the edit radius while held.
    pub modifier: bool,
    pub pause_toggled: bool,
    pub commands: Vec<Command>,
}

/// Accumulates events between frames. Held buttons are levels; scroll,
/// pointer motion, pause and commands are consumed by `take_frame`.
#[derive(Default)]
pub struct InputState {
    pointer: Option<[f32; 2]>,
    pointer_delta: [f32; 2],
    fill: bool,
    clear: bool,
    pan: bool,
    scroll_y: f32,
    modifier: bool,
    pause_toggled: bool,
    commands: Vec<Command>,
}

impl InputState {
    pub fn cursor_moved(&mut self, position: [f32; 2]) {
        self.pointer = Some(position);
    }

    /// Raw device motion. Keeps arriving while the cursor is grabbed, when
    /// the window's cursor position no longer changes. Only counted while
    /// panning.
    pub fn pointer_motion(&mut self, delta: [f32; 2]) {
        if self.pan {
            self.pointer_delta[0] += delta[0];
            self.pointer_delta[1] += delta[1];
        }
    }

    pub fn cursor_left(&mut self) {
        self.pointer = None;
    }

    pub fn button(&mut self, button: PointerButton, pressed: bool) {
        match button {
            PointerButton::Fill => self.fill = pressed,
            PointerButton::Clear => self.clear = pressed,
            PointerButton::Pan => self.pan = pressed,
        }
    }

    pub fn scroll(&mut self, delta_y: f32) {
        self.scroll_y += delta_y;
    }

    pub fn set_modifier(&mut self, held: bool) {
        self.modifier = held;
    }

    pub fn toggle_pause(&mut self) {
        self.pause_toggled = !self.pause_toggled;
    }

    pub fn push_command(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Snapshot the current state and reset per-frame accumulators.
    pub fn take_frame(&mut self, viewport_px: [f32; 2]) -> FrameInput {
        FrameInput {
            pointer_px: self.pointer,
            pointer_delta: std::mem::take(&mut self.pointer_delta),
            viewport_px,
            fill: self.fill,
            clear: self.clear,
            pan: self.pan,
            scroll_y: std::mem::take(&mut self.scroll_y),
            modifier: self.modifier,
            pause_toggled: std::mem::take(&mut self.pause_toggled),
            commands: std::mem::take(&mut self.commands),
        }
    }
}
