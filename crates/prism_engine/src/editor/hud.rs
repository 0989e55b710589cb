//! Editor HUD
//!
//! A small line-stacked text overlay. Lines are pushed each frame and
//! drained into the UI payload; content is truncated to a fixed width so
//! a runaway format string cannot grow the text buffer unbounded.

use crate::view::UiText;

/// Maximum characters kept per HUD line
pub const MAX_LINE_LEN: usize = 128;

const LINE_HEIGHT: f32 = 18.0;
const MARGIN: f32 = 8.0;

/// Frame-rebuilt text overlay
pub struct Hud {
    lines: Vec<UiText>,
    /// Object id assigned to the first line; lines count up from here so
    /// the pick pass can resolve hovers over HUD text
    base_id: u32,
}

impl Hud {
    /// Create an empty HUD. `base_id` seeds the per-line object ids.
    pub fn new(base_id: u32) -> Self {
        Self {
            lines: Vec::new(),
            base_id,
        }
    }

    /// Drop all lines; called at the top of each frame
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Append one line, truncated to [`MAX_LINE_LEN`] characters
    pub fn line(&mut self, text: impl Into<String>) {
        let mut content: String = text.into();
        if content.chars().count() > MAX_LINE_LEN {
            content = content.chars().take(MAX_LINE_LEN).collect();
        }
        let index = self.lines.len();
        self.lines.push(UiText {
            content,
            position: [MARGIN, MARGIN + index as f32 * LINE_HEIGHT],
            unique_id: self.base_id + index as u32,
        });
    }

    /// Current lines, top to bottom
    pub fn lines(&self) -> &[UiText] {
        &self.lines
    }

    /// Move the lines out for this frame's UI payload
    pub fn take_lines(&mut self) -> Vec<UiText> {
        std::mem::take(&mut self.lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_stack_downward() {
        let mut hud = Hud::new(1000);
        hud.line("fps: 60");
        hud.line("camera: 0.0 1.0 5.0");

        let lines = hud.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].position[1] > lines[0].position[1]);
        assert_eq!(lines[0].unique_id, 1000);
        assert_eq!(lines[1].unique_id, 1001);
    }

    #[test]
    fn test_long_line_truncated() {
        let mut hud = Hud::new(0);
        hud.line("x".repeat(500));

        assert_eq!(hud.lines()[0].content.chars().count(), MAX_LINE_LEN);
    }

    #[test]
    fn test_take_lines_resets() {
        let mut hud = Hud::new(0);
        hud.line("one");

        let taken = hud.take_lines();
        assert_eq!(taken.len(), 1);
        assert!(hud.lines().is_empty());
    }
}
