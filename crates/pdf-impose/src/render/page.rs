//! Output page rendering for imposition
//!
//! Builds one output page per sheet plan: every occupied slot becomes a Form
//! XObject drawn through a single `cm` transform, blank slots draw nothing.

use crate::layout::SheetPlan;
use crate::types::Result;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;

use super::geometry::PageGeometry;
use super::xobject::create_page_xobject;

/// Render one sheet to the output document.
///
/// # Arguments
/// * `output` - The output document
/// * `source` - The source document containing the pages
/// * `source_page_ids` - Object IDs of all source pages, in page order
/// * `geometries` - Resolved geometry for each source page
/// * `plan` - Placements for this sheet
/// * `parent_pages_id` - The parent Pages object ID
pub fn render_sheet(
    output: &mut Document,
    source: &Document,
    source_page_ids: &[ObjectId],
    geometries: &[PageGeometry],
    plan: &SheetPlan,
    parent_pages_id: ObjectId,
) -> Result<ObjectId> {
    // Create page dictionary
    let mut page_dict = Dictionary::new();
    page_dict.set("Type", Object::Name(b"Page".to_vec()));
    page_dict.set("Parent", Object::Reference(parent_pages_id));
    page_dict.set(
        "MediaBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(plan.width_pt),
            Object::Real(plan.height_pt),
        ]),
    );

    let mut content_ops = Vec::new();
    let mut xobjects = Dictionary::new();
    let mut xobject_cache: HashMap<ObjectId, ObjectId> = HashMap::new();

    for placement in &plan.placements {
        let Some(source_idx) = placement.source_page else {
            continue;
        };
        let (Some(&source_page_id), Some(geometry)) =
            (source_page_ids.get(source_idx), geometries.get(source_idx))
        else {
            continue;
        };

        let xobject_name = format!("P{}", placement.slot.index());
        let xobject_id =
            create_page_xobject(output, source, source_page_id, geometry, &mut xobject_cache)?;
        xobjects.set(xobject_name.as_bytes(), Object::Reference(xobject_id));

        let rect = &placement.content_rect;
        let matrix = geometry.user_to_placement_matrix(rect.x, rect.y, placement.scale);
        content_ops.push(generate_placement_command(&xobject_name, matrix));
    }

    // Set up resources
    let mut resources = Dictionary::new();
    resources.set("XObject", Object::Dictionary(xobjects));

    // Create content stream
    let content = content_ops.join("");
    let content_id = output.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

    page_dict.set("Contents", Object::Reference(content_id));
    page_dict.set("Resources", Object::Dictionary(resources));

    Ok(output.add_object(page_dict))
}

/// Generate the PDF content stream command to place a page.
fn generate_placement_command(xobject_name: &str, m: [f32; 6]) -> String {
    format!(
        "q {} {} {} {} {} {} cm /{} Do Q\n",
        fmt_num(m[0]),
        fmt_num(m[1]),
        fmt_num(m[2]),
        fmt_num(m[3]),
        fmt_num(m[4]),
        fmt_num(m[5]),
        xobject_name
    )
}

/// Format a number for a content stream with fixed precision.
///
/// Fixed precision keeps output byte-stable and avoids exponent notation,
/// which PDF syntax does not allow.
pub fn fmt_num(value: f32) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    let text = format!("{:.4}", if rounded == 0.0 { 0.0 } else { rounded });
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}
