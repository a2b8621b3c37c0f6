//! Content placement within sheet halves
//!
//! This module handles calculating the final position of page content
//! on an output sheet, accounting for:
//! - Sheet margins and the gutter between halves
//! - Fitting each page into its half without cropping
//! - Centering the scaled page within its half

use crate::constants::{DEFAULT_PAGE_DIMENSIONS, PAGES_PER_SHEET, mm_to_pt};
use crate::options::SheetLayout;
use crate::types::Arrangement;

use super::{PagePlacement, Rect, SheetPlan, Slot};

/// Sheet dimensions in points with orientation applied
pub fn sheet_dimensions_pt(layout: &SheetLayout) -> (f32, f32) {
    let (width_mm, height_mm) = layout.sheet_dimensions_mm();
    (mm_to_pt(width_mm), mm_to_pt(height_mm))
}

/// Calculate the half-sheet area for a slot.
///
/// The usable area is the sheet minus its margins; it is split in two along the
/// arrangement axis with the gutter in between. For stacked sheets the first slot
/// is the top half, matching reading order.
pub fn cell_bounds(layout: &SheetLayout, slot: Slot) -> Rect {
    let (sheet_w, sheet_h) = sheet_dimensions_pt(layout);
    let margins = &layout.margins;

    let left = mm_to_pt(margins.left_mm);
    let bottom = mm_to_pt(margins.bottom_mm);
    let usable_w = sheet_w - left - mm_to_pt(margins.right_mm);
    let usable_h = sheet_h - bottom - mm_to_pt(margins.top_mm);
    let gutter = mm_to_pt(layout.gutter_mm);

    match layout.arrangement {
        Arrangement::SideBySide => {
            let half_w = (usable_w - gutter) / 2.0;
            let x = match slot {
                Slot::First => left,
                Slot::Second => left + half_w + gutter,
            };
            Rect::new(x, bottom, half_w, usable_h)
        }
        Arrangement::Stacked => {
            let half_h = (usable_h - gutter) / 2.0;
            let y = match slot {
                Slot::First => bottom + half_h + gutter,
                Slot::Second => bottom,
            };
            Rect::new(left, y, usable_w, half_h)
        }
    }
}

/// Scale a page of the given size to fit the cell and center it.
///
/// Aspect ratio is preserved and the page is never cropped.
/// Returns the content rect and the scale factor.
pub fn fit_page(cell: &Rect, source_width: f32, source_height: f32) -> (Rect, f32) {
    let scale = calculate_fit_scale(source_width, source_height, cell.width, cell.height);

    let scaled_width = source_width * scale;
    let scaled_height = source_height * scale;

    let x = cell.x + (cell.width - scaled_width) / 2.0;
    let y = cell.y + (cell.height - scaled_height) / 2.0;

    (Rect::new(x, y, scaled_width, scaled_height), scale)
}

/// Plan one output sheet.
///
/// Sheet `n` (0-based) holds source pages `2n` and `2n + 1`; a slot past the end
/// of the document is left blank.
///
/// # Arguments
/// * `layout` - The sheet layout
/// * `sheet_index` - Index of the output sheet
/// * `source_dimensions` - Displayed (width, height) in points for each source page
pub fn plan_sheet(
    layout: &SheetLayout,
    sheet_index: usize,
    source_dimensions: &[(f32, f32)],
) -> SheetPlan {
    let (width_pt, height_pt) = sheet_dimensions_pt(layout);

    let placements = [Slot::First, Slot::Second]
        .into_iter()
        .map(|slot| {
            let page_index = sheet_index * PAGES_PER_SHEET + slot.index();
            let source_page = (page_index < source_dimensions.len()).then_some(page_index);

            let cell = cell_bounds(layout, slot);
            let (src_width, src_height) = source_page
                .map(|idx| source_dimensions[idx])
                .unwrap_or(DEFAULT_PAGE_DIMENSIONS);
            let (content_rect, scale) = fit_page(&cell, src_width, src_height);

            PagePlacement {
                source_page,
                slot,
                cell,
                content_rect,
                scale,
            }
        })
        .collect();

    SheetPlan {
        width_pt,
        height_pt,
        placements,
    }
}

/// Plan every output sheet for a document with the given page sizes
pub fn plan_sheets(layout: &SheetLayout, source_dimensions: &[(f32, f32)]) -> Vec<SheetPlan> {
    let sheet_count = source_dimensions.len().div_ceil(PAGES_PER_SHEET);
    (0..sheet_count)
        .map(|sheet| plan_sheet(layout, sheet, source_dimensions))
        .collect()
}

/// Calculate scale factor for fitting source to target dimensions.
fn calculate_fit_scale(src_width: f32, src_height: f32, target_width: f32, target_height: f32) -> f32 {
    if src_width <= 0.0 || src_height <= 0.0 {
        return 1.0;
    }
    let scale_w = target_width / src_width;
    let scale_h = target_height / src_height;
    scale_w.min(scale_h)
}
