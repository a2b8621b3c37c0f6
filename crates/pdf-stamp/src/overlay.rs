//! Stamp overlay
//!
//! Each page keeps its existing content streams untouched. The page's
//! `/Contents` becomes `[q, existing..., Q + stamp]`, so whatever graphics
//! state the existing content leaves behind cannot leak into the stamp.

use crate::clock::{Clock, SystemClock};
use crate::font::StampFont;
use crate::options::StampSpec;
use crate::types::*;
use chrono::NaiveDate;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use pdf_impose::PageGeometry;
use pdf_impose::constants::mm_to_pt;
use pdf_impose::render::{fmt_num, inherited_attribute, page_geometry, resolve};
use std::sync::Arc;

/// Distance from the text baseline to the bottom of the text box, in em
const DESCENT_EM: f32 = 0.2;
/// Height of the text box, in em
const LINE_HEIGHT_EM: f32 = 1.0;
const FRAME_PADDING_EM: f32 = 0.3;
const FRAME_LINE_EM: f32 = 0.08;

const FONT_RESOURCE: &str = "StampFont";
const GS_RESOURCE: &str = "StampGS";

/// Applies a [`StampSpec`] using the date from a [`Clock`]
#[derive(Clone)]
pub struct Stamper {
    spec: StampSpec,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Stamper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stamper").field("spec", &self.spec).finish()
    }
}

impl Stamper {
    /// Create a stamper reading the system clock
    pub fn new(spec: StampSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            spec,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn spec(&self) -> &StampSpec {
        &self.spec
    }

    /// Stamp every page of a document.
    ///
    /// The clock is read once, so all pages of one document carry the same date.
    pub fn stamp(&self, document: &Document) -> Result<Document> {
        let date = self.clock.today();
        stamp_document(document, &self.spec, date)
    }
}

/// Objects shared by every stamped page of one document
struct SharedObjects {
    font: StampFont,
    font_id: ObjectId,
    gs_id: ObjectId,
    save_id: ObjectId,
}

/// Stamp every page of a document with the text for `date`.
///
/// Works on a copy: on error the input is unchanged and no partially stamped
/// document is returned.
pub fn stamp_document(document: &Document, spec: &StampSpec, date: NaiveDate) -> Result<Document> {
    spec.validate()?;
    let text = spec.render_text(date)?;
    let font = StampFont::for_text(&text);

    let mut output = document.clone();
    let page_ids: Vec<ObjectId> = output.get_pages().values().copied().collect();
    if page_ids.is_empty() {
        return Err(StampError::NoPages);
    }

    let shared = SharedObjects {
        font,
        font_id: output.add_object(font.dictionary()),
        gs_id: output.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"ExtGState".to_vec())),
            ("ca", Object::Real(spec.opacity)),
            ("CA", Object::Real(spec.opacity)),
        ])),
        save_id: output.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec())),
    };

    for (idx, &page_id) in page_ids.iter().enumerate() {
        stamp_page(&mut output, page_id, idx + 1, &shared, spec, &text)?;
    }

    log::debug!("Stamped {} page(s) with \"{}\"", page_ids.len(), text);
    Ok(output)
}

fn stamp_page(
    doc: &mut Document,
    page_id: ObjectId,
    page: usize,
    shared: &SharedObjects,
    spec: &StampSpec,
    text: &str,
) -> Result<()> {
    let geometry = page_geometry(doc, page_id, page).map_err(|e| malformed(page, e))?;
    let existing = content_streams(doc, page_id, page)?;

    let mut resources = effective_resources(doc, page_id, page)?;
    let font_name = register_resource(
        doc,
        &mut resources,
        b"Font",
        FONT_RESOURCE,
        shared.font_id,
        page,
    )?;
    let gs_name = register_resource(
        doc,
        &mut resources,
        b"ExtGState",
        GS_RESOURCE,
        shared.gs_id,
        page,
    )?;

    let ops = stamp_operations(&geometry, spec, text, shared.font, &font_name, &gs_name);
    let stamp_id = doc.add_object(Stream::new(
        Dictionary::new(),
        format!("\nQ\n{}", ops).into_bytes(),
    ));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(shared.save_id));
    contents.extend(existing.into_iter().map(Object::Reference));
    contents.push(Object::Reference(stamp_id));

    let page_dict = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page_dict.set("Resources", Object::Dictionary(resources));
    page_dict.set("Contents", Object::Array(contents));
    Ok(())
}

/// Content stream ids of a page, in drawing order
fn content_streams(doc: &Document, page_id: ObjectId, page: usize) -> Result<Vec<ObjectId>> {
    let page_dict = doc.get_dictionary(page_id)?;
    let ids = match page_dict.get(b"Contents") {
        Err(_) => return Ok(Vec::new()),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => references(items, page)?,
            Ok(_) => vec![*id],
            Err(_) => return Err(malformed(page, "content stream is missing")),
        },
        Ok(Object::Array(items)) => references(items, page)?,
        Ok(_) => return Err(malformed(page, "invalid /Contents entry")),
    };

    for id in &ids {
        if doc.get_object(*id).and_then(Object::as_stream).is_err() {
            return Err(malformed(
                page,
                format!("content object {} {} is not a stream", id.0, id.1),
            ));
        }
    }
    Ok(ids)
}

fn references(items: &[Object], page: usize) -> Result<Vec<ObjectId>> {
    items
        .iter()
        .map(|item| {
            item.as_reference()
                .map_err(|_| malformed(page, "content array holds a non-reference"))
        })
        .collect()
}

/// The page's resources, including ones inherited from the page tree
fn effective_resources(doc: &Document, page_id: ObjectId, page: usize) -> Result<Dictionary> {
    let inherited =
        inherited_attribute(doc, page_id, b"Resources").map_err(|e| malformed(page, e))?;
    match inherited.map(|obj| resolve(doc, obj)) {
        None | Some(Object::Null) => Ok(Dictionary::new()),
        Some(Object::Dictionary(dict)) => Ok(dict.clone()),
        Some(_) => Err(malformed(page, "invalid /Resources entry")),
    }
}

/// Add `id` to a resource category under a name not yet in use
fn register_resource(
    doc: &Document,
    resources: &mut Dictionary,
    category: &[u8],
    base_name: &str,
    id: ObjectId,
    page: usize,
) -> Result<String> {
    let mut entries = match resources.get(category).map(|obj| resolve(doc, obj)) {
        Err(_) | Ok(Object::Null) => Dictionary::new(),
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(_) => {
            return Err(malformed(
                page,
                format!("invalid /{} resources", String::from_utf8_lossy(category)),
            ));
        }
    };

    let name = unique_name(&entries, base_name);
    entries.set(name.as_bytes(), Object::Reference(id));
    resources.set(category, Object::Dictionary(entries));
    Ok(name)
}

fn unique_name(entries: &Dictionary, base_name: &str) -> String {
    let mut name = base_name.to_string();
    let mut suffix = 1;
    while entries.has(name.as_bytes()) {
        name = format!("{}{}", base_name, suffix);
        suffix += 1;
    }
    name
}

/// Stamp box `(x, y, width, height)` in displayed coordinates, user units
fn stamp_box(geometry: &PageGeometry, spec: &StampSpec, text: &str, font: StampFont) -> [f32; 4] {
    let unit = geometry.user_unit;
    let font_size = spec.font_size_pt / unit;
    let padding = if spec.frame {
        font_size * FRAME_PADDING_EM
    } else {
        0.0
    };

    let width = font.text_width_em(text) * font_size + 2.0 * padding;
    let height = font_size * LINE_HEIGHT_EM + 2.0 * padding;
    let offset_x = mm_to_pt(spec.offset_x_mm) / unit;
    let offset_y = mm_to_pt(spec.offset_y_mm) / unit;
    let (page_width, page_height) = geometry.displayed_size();

    let x = if spec.corner.is_right() {
        page_width - offset_x - width
    } else {
        offset_x
    };
    let y = if spec.corner.is_top() {
        page_height - offset_y - height
    } else {
        offset_y
    };
    [x, y, width, height]
}

fn stamp_operations(
    geometry: &PageGeometry,
    spec: &StampSpec,
    text: &str,
    font: StampFont,
    font_name: &str,
    gs_name: &str,
) -> String {
    let font_size = spec.font_size_pt / geometry.user_unit;
    let [x, y, width, height] = stamp_box(geometry, spec, text, font);
    let m = geometry.display_to_user_matrix();
    let color = spec.color;

    let mut ops = String::from("q\n");
    ops.push_str(&format!(
        "{} {} {} {} {} {} cm\n",
        fmt_num(m[0]),
        fmt_num(m[1]),
        fmt_num(m[2]),
        fmt_num(m[3]),
        fmt_num(m[4]),
        fmt_num(m[5])
    ));
    ops.push_str(&format!("/{} gs\n", gs_name));
    ops.push_str(&format!(
        "{r} {g} {b} rg {r} {g} {b} RG\n",
        r = fmt_num(color.r),
        g = fmt_num(color.g),
        b = fmt_num(color.b)
    ));

    let padding = if spec.frame {
        ops.push_str(&format!(
            "{} w {} {} {} {} re S\n",
            fmt_num(font_size * FRAME_LINE_EM),
            fmt_num(x),
            fmt_num(y),
            fmt_num(width),
            fmt_num(height)
        ));
        font_size * FRAME_PADDING_EM
    } else {
        0.0
    };

    ops.push_str(&format!(
        "BT /{} {} Tf {} {} Td {} Tj ET\n",
        font_name,
        fmt_num(font_size),
        fmt_num(x + padding),
        fmt_num(y + padding + font_size * DESCENT_EM),
        font.encode(text)
    ));
    ops.push_str("Q\n");
    ops
}

fn malformed(page: usize, reason: impl ToString) -> StampError {
    StampError::MalformedPage {
        page,
        reason: reason.to_string(),
    }
}
