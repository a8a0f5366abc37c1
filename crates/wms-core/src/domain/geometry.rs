//! Rectangles and points in screen pixel space.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A point in pixels.  Used for a screen's offset inside its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle.  `x`/`y` is the top-left corner and may be
/// negative (hot zones extend past a window's own bounds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
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

    /// Rightmost X coordinate (exclusive).
    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    /// Bottommost Y coordinate (exclusive).
    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Grows the rectangle by `by` pixels on every side.
    pub fn inflate(&self, by: u32) -> Rect {
        Rect {
            x: self.x - by as i32,
            y: self.y - by as i32,
            width: self.width + 2 * by,
            height: self.height + 2 * by,
        }
    }
}

/// Errors from parsing the persisted `x,y,w,h` form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid rect literal: {0}")]
pub struct ParseRectError(pub String);

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

impl FromStr for Rect {
    type Err = ParseRectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseRectError(s.to_string());
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(err());
        }
        Ok(Rect {
            x: parts[0].parse().map_err(|_| err())?,
            y: parts[1].parse().map_err(|_| err())?,
            width: parts[2].parse().map_err(|_| err())?,
            height: parts[3].parse().map_err(|_| err())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inflate_extends_every_side() {
        let rect = Rect::new(10, 20, 100, 50).inflate(5);
        assert_eq!(rect, Rect::new(5, 15, 110, 60));
    }

    #[test]
    fn test_right_and_bottom_are_exclusive_edges() {
        let rect = Rect::new(-4, 2, 10, 3);
        assert_eq!(rect.right(), 6);
        assert_eq!(rect.bottom(), 5);
    }

    #[test]
    fn test_parse_accepts_display_output() {
        let rect = Rect::new(-3, 4, 720, 1280);
        assert_eq!(rect.to_string().parse::<Rect>(), Ok(rect));
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!("1,2,3".parse::<Rect>().is_err());
        assert!("a,b,c,d".parse::<Rect>().is_err());
        assert!("1,2,-3,4".parse::<Rect>().is_err());
    }
}
