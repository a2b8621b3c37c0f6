//! Layout calculation modules for two-up imposition
//!
//! This module handles the geometric side of imposition:
//! - Splitting the sheet into two halves (side by side or stacked)
//! - Fitting each logical page into its half (aspect preserved, centered)

mod placement;
mod types;

pub use placement::*;
pub use types::*;
