//! Layout data types for imposition
//!
//! These types represent the intermediate layout calculations between
//! page pairing and PDF rendering.

/// Which half of the sheet a logical page occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Left half (side by side) or top half (stacked)
    First,
    /// Right half (side by side) or bottom half (stacked)
    Second,
}

impl Slot {
    pub fn index(self) -> usize {
        match self {
            Slot::First => 0,
            Slot::Second => 1,
        }
    }
}

/// A rectangular area in points
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    /// X position (left edge)
    pub x: f32,
    /// Y position (bottom edge)
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge x coordinate
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Top edge y coordinate
    pub fn top(&self) -> f32 {
        self.y + self.height
    }

    /// Center x coordinate
    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    /// Center y coordinate
    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    /// Whether `other` lies entirely inside this rect (with a small tolerance)
    pub fn contains(&self, other: &Rect) -> bool {
        const EPS: f32 = 0.01;
        other.x >= self.x - EPS
            && other.y >= self.y - EPS
            && other.right() <= self.right() + EPS
            && other.top() <= self.top() + EPS
    }
}

/// Final placement of a source page on the output sheet
///
/// This is the result of all layout calculations and contains
/// everything needed to render the page.
#[derive(Debug, Clone, PartialEq)]
pub struct PagePlacement {
    /// Source page index (None = blank slot)
    pub source_page: Option<usize>,
    /// Which half of the sheet
    pub slot: Slot,
    /// The half-sheet area available to this page
    pub cell: Rect,
    /// Position and size of the scaled page content in points
    pub content_rect: Rect,
    /// Scale factor applied to the source page
    pub scale: f32,
}

/// Geometry of one output sheet
#[derive(Debug, Clone, PartialEq)]
pub struct SheetPlan {
    /// Sheet width in points
    pub width_pt: f32,
    /// Sheet height in points
    pub height_pt: f32,
    /// Placements for both halves, in slot order
    pub placements: Vec<PagePlacement>,
}
