//! Shared constants for PDF imposition
//!
//! This module centralizes magic numbers and constants used throughout
//! the imposition and stamping process.

// =============================================================================
// Unit Conversion
// =============================================================================

/// Points per millimeter (1 inch = 72 points, 1 inch = 25.4mm)
pub const POINTS_PER_MM: f32 = 72.0 / 25.4; // ≈ 2.83465

/// Convert millimeters to points
#[inline]
pub fn mm_to_pt(mm: f32) -> f32 {
    mm * POINTS_PER_MM
}

// =============================================================================
// Default Page Dimensions
// =============================================================================

/// Fallback page width in points when a blank slot needs a size (A4)
pub const DEFAULT_PAGE_WIDTH_PT: f32 = 595.0;

/// Fallback page height in points (A4)
pub const DEFAULT_PAGE_HEIGHT_PT: f32 = 842.0;

/// Default page dimensions as tuple (width, height)
pub const DEFAULT_PAGE_DIMENSIONS: (f32, f32) = (DEFAULT_PAGE_WIDTH_PT, DEFAULT_PAGE_HEIGHT_PT);

// =============================================================================
// Two-up Layout
// =============================================================================

/// Logical pages placed on each physical sheet
pub const PAGES_PER_SHEET: usize = 2;

/// Default sheet margin (printer-safe area) in millimeters
pub const DEFAULT_SHEET_MARGIN_MM: f32 = 5.0;

/// Default gap between the two halves of a sheet in millimeters
pub const DEFAULT_GUTTER_MM: f32 = 5.0;

/// PDF version written for imposed output
pub const OUTPUT_PDF_VERSION: &str = "1.7";
