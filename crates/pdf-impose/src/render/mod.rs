//! PDF rendering modules for imposition
//!
//! This module handles all PDF-specific operations:
//! - Resolving page geometry (boxes, rotation, user units)
//! - Creating XObjects from source pages
//! - Building imposed output pages
//! - Deep copying PDF objects

mod geometry;
mod page;
mod xobject;

pub use geometry::{
    PageGeometry, extract_number, inherited_attribute, page_geometry, resolve,
};
pub use page::*;
pub use xobject::{copy_object_deep, create_page_xobject, get_page_content};
