//! Page geometry shared by imposition and stamping
//!
//! Page boxes, `/Rotate` and `/UserUnit` may be set on the page itself or
//! inherited from any ancestor in the page tree.

use crate::types::{ImposeError, Result};
use lopdf::{Document, Object, ObjectId};

/// Guard against malformed page trees with `/Parent` cycles
const MAX_TREE_DEPTH: usize = 64;

/// Resolved geometry of one page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Visible box `[x0, y0, x1, y1]` in user space (CropBox, else MediaBox)
    pub bbox: [f32; 4],
    /// Media box in user space
    pub media_box: [f32; 4],
    /// Clockwise display rotation, normalized to 0, 90, 180 or 270
    pub rotation: i32,
    /// Size of one user-space unit in points
    pub user_unit: f32,
}

impl PageGeometry {
    /// Width of the visible box in user space
    pub fn width(&self) -> f32 {
        self.bbox[2] - self.bbox[0]
    }

    /// Height of the visible box in user space
    pub fn height(&self) -> f32 {
        self.bbox[3] - self.bbox[1]
    }

    /// Whether the page is displayed turned by a quarter
    pub fn is_quarter_turned(&self) -> bool {
        self.rotation == 90 || self.rotation == 270
    }

    /// Displayed (width, height) in user units
    pub fn displayed_size(&self) -> (f32, f32) {
        if self.is_quarter_turned() {
            (self.height(), self.width())
        } else {
            (self.width(), self.height())
        }
    }

    /// Displayed (width, height) in points
    pub fn displayed_size_pt(&self) -> (f32, f32) {
        let (w, h) = self.displayed_size();
        (w * self.user_unit, h * self.user_unit)
    }

    /// Matrix mapping displayed coordinates (origin at the displayed
    /// bottom-left corner, user units) to the page's user space.
    pub fn display_to_user_matrix(&self) -> [f32; 6] {
        let [x0, y0, _, _] = self.bbox;
        let (w, h) = (self.width(), self.height());
        match self.rotation {
            90 => [0.0, 1.0, -1.0, 0.0, x0 + w, y0],
            180 => [-1.0, 0.0, 0.0, -1.0, x0 + w, y0 + h],
            270 => [0.0, -1.0, 1.0, 0.0, x0, y0 + h],
            _ => [1.0, 0.0, 0.0, 1.0, x0, y0],
        }
    }

    /// Matrix drawing the page's user space into an upright rectangle at
    /// `(x, y)` with the given scale (points per displayed point).
    pub fn user_to_placement_matrix(&self, x: f32, y: f32, scale: f32) -> [f32; 6] {
        let [x0, y0, _, _] = self.bbox;
        let (w, h) = (self.width(), self.height());
        let s = scale * self.user_unit;
        match self.rotation {
            90 => [0.0, -s, s, 0.0, x - s * y0, y + s * (w + x0)],
            180 => [-s, 0.0, 0.0, -s, x + s * (w + x0), y + s * (h + y0)],
            270 => [0.0, s, -s, 0.0, x + s * (h + y0), y - s * x0],
            _ => [s, 0.0, 0.0, s, x - s * x0, y - s * y0],
        }
    }
}

/// Resolve the geometry of a page.
///
/// # Arguments
/// * `doc` - The document containing the page
/// * `page_id` - The object ID of the page
/// * `page_number` - 1-based page number, used in error reports
pub fn page_geometry(doc: &Document, page_id: ObjectId, page_number: usize) -> Result<PageGeometry> {
    let media_box = inherited_attribute(doc, page_id, b"MediaBox")?
        .and_then(|obj| rect_from_object(doc, obj))
        .ok_or(ImposeError::MissingPageBox { page: page_number })?;

    let bbox = inherited_attribute(doc, page_id, b"CropBox")?
        .and_then(|obj| rect_from_object(doc, obj))
        .map(|crop| intersect(crop, media_box))
        .filter(|r| r[2] > r[0] && r[3] > r[1])
        .unwrap_or(media_box);

    let rotation = inherited_attribute(doc, page_id, b"Rotate")?
        .and_then(|obj| resolve(doc, obj).as_i64().ok())
        .map(|deg| (deg.rem_euclid(360) / 90 * 90) as i32)
        .unwrap_or(0);

    let user_unit = doc
        .get_dictionary(page_id)?
        .get(b"UserUnit")
        .ok()
        .and_then(|obj| extract_number(resolve(doc, obj)))
        .filter(|u| *u > 0.0)
        .unwrap_or(1.0);

    Ok(PageGeometry {
        bbox,
        media_box,
        rotation,
        user_unit,
    })
}

/// Look up a page attribute, walking up `/Parent` links for inheritable keys.
pub fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>> {
    let mut current = doc.get_dictionary(page_id)?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Ok(Some(value));
        }
        match current.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => current = doc.get_dictionary(*parent_id)?,
            _ => return Ok(None),
        }
    }
    Ok(None)
}

/// Follow a single reference, returning the object itself otherwise
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Parse a 4-number rectangle, normalizing corner order
fn rect_from_object(doc: &Document, obj: &Object) -> Option<[f32; 4]> {
    let arr = resolve(doc, obj).as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let mut values = [0.0f32; 4];
    for (slot, item) in values.iter_mut().zip(arr) {
        *slot = extract_number(resolve(doc, item))?;
    }
    let [a, b, c, d] = values;
    let rect = [a.min(c), b.min(d), a.max(c), b.max(d)];
    (rect[2] > rect[0] && rect[3] > rect[1]).then_some(rect)
}

fn intersect(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    [a[0].max(b[0]), a[1].max(b[1]), a[2].min(b[2]), a[3].min(b[3])]
}

/// Extract numeric value from a PDF object
pub fn extract_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(rotation: i32) -> PageGeometry {
        PageGeometry {
            bbox: [10.0, 20.0, 110.0, 220.0],
            media_box: [10.0, 20.0, 110.0, 220.0],
            rotation,
            user_unit: 1.0,
        }
    }

    fn apply(m: [f32; 6], (x, y): (f32, f32)) -> (f32, f32) {
        (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
    }

    fn close(a: (f32, f32), b: (f32, f32)) -> bool {
        (a.0 - b.0).abs() < 0.01 && (a.1 - b.1).abs() < 0.01
    }

    #[test]
    fn test_displayed_size_swaps_for_quarter_turns() {
        assert_eq!(geometry(0).displayed_size(), (100.0, 200.0));
        assert_eq!(geometry(90).displayed_size(), (200.0, 100.0));
        assert_eq!(geometry(270).displayed_size(), (200.0, 100.0));
    }

    #[test]
    fn test_display_and_placement_matrices_are_inverse() {
        for rotation in [0, 90, 180, 270] {
            let g = geometry(rotation);
            let to_user = g.display_to_user_matrix();
            let to_sheet = g.user_to_placement_matrix(0.0, 0.0, 1.0);
            let (dw, dh) = g.displayed_size();
            for corner in [(0.0, 0.0), (dw, 0.0), (0.0, dh), (dw, dh)] {
                let round_trip = apply(to_sheet, apply(to_user, corner));
                assert!(close(round_trip, corner), "rotation {rotation}: {corner:?} -> {round_trip:?}");
            }
        }
    }

    #[test]
    fn test_clockwise_rotation_moves_top_left_to_top_right() {
        let g = geometry(90);
        let (dw, dh) = g.displayed_size();
        // User-space top-left corner of the box
        let user_top_left = (10.0, 220.0);
        let placed = apply(g.user_to_placement_matrix(0.0, 0.0, 1.0), user_top_left);
        assert!(close(placed, (dw, dh)));
    }
}
