pub mod constants;
pub mod impose;
pub mod layout;
mod options;
pub mod render;
mod stats;
mod types;

pub use impose::{impose, impose_sync, load_pdf, load_pdf_bytes, save_pdf, save_pdf_bytes};
pub use options::*;
pub use render::{PageGeometry, page_geometry};
pub use stats::{calculate_statistics, statistics_for_page_count};
pub use types::*;
