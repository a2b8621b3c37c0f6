//! PDF imposition - arranging pages two-up for printing
//!
//! This module orchestrates the imposition process:
//! 1. Resolve the geometry of every source page
//! 2. Pair pages in order and plan each sheet
//! 3. Render each sheet with the source pages as Form XObjects

mod io;

pub use io::{load_pdf, load_pdf_bytes, save_pdf, save_pdf_bytes};

use crate::constants::OUTPUT_PDF_VERSION;
use crate::layout::plan_sheets;
use crate::options::SheetLayout;
use crate::render::{PageGeometry, page_geometry, render_sheet};
use crate::types::*;
use lopdf::{Dictionary, Document, Object, ObjectId};

/// Main imposition function
pub async fn impose(document: &Document, layout: &SheetLayout) -> Result<Document> {
    layout.validate()?;

    let document = document.clone();
    let layout = *layout;

    tokio::task::spawn_blocking(move || impose_sync(&document, &layout)).await?
}

/// Impose a document on the calling thread.
///
/// Page `2n + 1` and `2n + 2` land on sheet `n + 1`; an odd last page leaves the
/// second slot blank. The result has `ceil(pages / 2)` pages and contains no
/// time-dependent data, so the same input and layout always produce the same bytes.
pub fn impose_sync(source: &Document, layout: &SheetLayout) -> Result<Document> {
    layout.validate()?;

    // Get source page info
    let page_ids: Vec<ObjectId> = source.get_pages().values().copied().collect();
    if page_ids.is_empty() {
        return Err(ImposeError::NoPages);
    }

    let geometries = page_ids
        .iter()
        .enumerate()
        .map(|(idx, &id)| page_geometry(source, id, idx + 1))
        .collect::<Result<Vec<PageGeometry>>>()?;
    let source_dimensions: Vec<(f32, f32)> =
        geometries.iter().map(PageGeometry::displayed_size_pt).collect();

    // Build output document
    let mut output = Document::with_version(OUTPUT_PDF_VERSION);
    let pages_tree_id = output.new_object_id();
    let mut page_refs = Vec::new();

    for plan in plan_sheets(layout, &source_dimensions) {
        let page_id = render_sheet(
            &mut output,
            source,
            &page_ids,
            &geometries,
            &plan,
            pages_tree_id,
        )?;
        page_refs.push(Object::Reference(page_id));
    }

    // Create pages tree
    let count = page_refs.len() as i64;
    let pages_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(page_refs)),
        ("Count", Object::Integer(count)),
    ]);
    output
        .objects
        .insert(pages_tree_id, Object::Dictionary(pages_dict));

    // Create catalog
    let catalog_id = output.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_tree_id)),
    ]));

    output.trailer.set("Root", catalog_id);

    Ok(output)
}
