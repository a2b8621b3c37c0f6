mod clock;
mod font;
mod options;
mod overlay;
mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use options::*;
pub use overlay::{stamp_document, Stamper};
pub use types::*;
