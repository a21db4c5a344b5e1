//! Plain geometry types shared by windows and the externally reported
//! dock-panel rectangle.

use serde::{Deserialize, Serialize};

/// Screen-space rectangle (x, y, width, height).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Strict overlap: shared edges do not count.
    pub fn intersects(&self, other: &Rect) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Overlap test used by smart-hide, where the dock edge shared with the
    /// screen border must still count as overlap. A window flush against a
    /// left dock has `window.x == dock.right()`; the strict test would miss
    /// it by one pixel, so the edge facing away from `position` is inclusive.
    pub fn intersects_dock(&self, dock: &Rect, position: Position) -> bool {
        if self.is_empty() || dock.is_empty() {
            return false;
        }
        match position {
            Position::Left | Position::Right => {
                self.x <= dock.right()
                    && dock.x < self.right()
                    && self.y < dock.bottom()
                    && dock.y < self.bottom()
            }
            Position::Top | Position::Bottom => {
                self.x < dock.right()
                    && dock.x < self.right()
                    && self.y <= dock.bottom()
                    && dock.y < self.bottom()
            }
        }
    }
}

/// Screen edge the dock panel is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    Top,
    Right,
    Bottom,
    Left,
}

impl Default for Position {
    fn default() -> Self {
        Position::Bottom
    }
}
