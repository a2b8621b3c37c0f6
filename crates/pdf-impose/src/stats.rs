use crate::constants::PAGES_PER_SHEET;
use crate::types::*;
use lopdf::Document;

/// Calculate statistics for imposing a document two-up
pub fn calculate_statistics(document: &Document) -> Result<ImpositionStatistics> {
    statistics_for_page_count(document.get_pages().len())
}

/// Calculate statistics for a known page count
pub fn statistics_for_page_count(source_pages: usize) -> Result<ImpositionStatistics> {
    if source_pages == 0 {
        return Err(ImposeError::NoPages);
    }

    let output_sheets = source_pages.div_ceil(PAGES_PER_SHEET);
    let blank_slots = output_sheets * PAGES_PER_SHEET - source_pages;

    Ok(ImpositionStatistics {
        source_pages,
        output_sheets,
        blank_slots,
    })
}
