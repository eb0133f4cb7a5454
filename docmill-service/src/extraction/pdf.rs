//! PDF text extraction via PDFium, with opportunistic table detection.
//!
//! Pages are read in order and concatenated with page markers. Text segments
//! whose vertical positions nearly coincide are grouped into rows; runs of
//! rows with multiple aligned columns are surfaced as table fragments.

use pdfium_render::prelude::*;
use tracing::debug;

use super::TableFragment;

/// Vertical tolerance (PDF points) within which segments count as one row
const ROW_TOLERANCE: f32 = 3.0;

/// Minimum columns and minimum consecutive rows for a table fragment
const MIN_TABLE_COLUMNS: usize = 2;
const MIN_TABLE_ROWS: usize = 2;

pub(super) struct PdfExtraction {
    pub text: String,
    pub pages: usize,
    pub tables: Vec<TableFragment>,
}

/// A text segment with its position on the page
#[derive(Debug, Clone)]
struct PositionedText {
    text: String,
    left: f32,
    top: f32,
}

/// One detected row: cells ordered left to right
#[derive(Debug)]
struct TextRow {
    cells: Vec<PositionedText>,
}

fn create_pdfium() -> Result<Pdfium, String> {
    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| format!("Failed to load PDFium library: {e:?}"))
}

pub(super) fn extract(bytes: &[u8], ceiling: usize) -> Result<PdfExtraction, String> {
    let pdfium = create_pdfium()?;

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| format!("Failed to load PDF: {e:?}"))?;

    let page_count = document.pages().len() as usize;
    let mut text = String::new();
    let mut tables = Vec::new();

    for (page_index, page) in document.pages().iter().enumerate() {
        let page_num = page_index as u32 + 1;

        let page_text = page
            .text()
            .map_err(|e| format!("Failed to read text from page {page_num}: {e:?}"))?;

        text.push_str(&format!("--- Page {page_num} ---\n"));
        text.push_str(page_text.all().trim());
        text.push('\n');

        let segments: Vec<PositionedText> = page_text
            .segments()
            .iter()
            .map(|segment| {
                let bounds = segment.bounds();
                PositionedText {
                    text: segment.text().trim().to_string(),
                    left: bounds.left.value,
                    top: bounds.top.value,
                }
            })
            .filter(|s| !s.text.is_empty())
            .collect();

        let rows = group_into_rows(segments, ROW_TOLERANCE);
        tables.extend(detect_tables(&rows, page_num));

        // Stop reading pages once the ceiling is reached; the uniform
        // truncation pass cuts to the exact limit afterwards.
        if text.chars().count() > ceiling {
            debug!(
                page = page_num,
                pages = page_count,
                "Stopping PDF read early at truncation ceiling"
            );
            break;
        }
    }

    Ok(PdfExtraction {
        text,
        pages: page_count,
        tables,
    })
}

/// Group positioned segments into rows by near-equal vertical position.
/// Rows come back top-to-bottom with cells ordered left-to-right.
fn group_into_rows(mut segments: Vec<PositionedText>, tolerance: f32) -> Vec<TextRow> {
    if segments.is_empty() {
        return Vec::new();
    }

    // PDF y-axis points up: larger `top` means higher on the page
    segments.sort_by(|a, b| {
        b.top
            .partial_cmp(&a.top)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut rows: Vec<TextRow> = Vec::new();
    for segment in segments {
        match rows.last_mut() {
            Some(row) if (row.cells[0].top - segment.top).abs() <= tolerance => {
                row.cells.push(segment);
            }
            _ => rows.push(TextRow {
                cells: vec![segment],
            }),
        }
    }

    for row in &mut rows {
        row.cells.sort_by(|a, b| {
            a.left
                .partial_cmp(&b.left)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    rows
}

/// Find runs of consecutive rows that share a multi-column shape.
fn detect_tables(rows: &[TextRow], page: u32) -> Vec<TableFragment> {
    let mut tables = Vec::new();
    let mut run: Vec<Vec<String>> = Vec::new();
    let mut run_columns = 0;

    for row in rows {
        let columns = row.cells.len();
        if columns >= MIN_TABLE_COLUMNS && (run.is_empty() || columns == run_columns) {
            run_columns = columns;
            run.push(row.cells.iter().map(|c| c.text.clone()).collect());
        } else {
            flush_run(&mut run, &mut tables, page);
            // A multi-column row with a different shape starts a new run
            if columns >= MIN_TABLE_COLUMNS {
                run_columns = columns;
                run.push(row.cells.iter().map(|c| c.text.clone()).collect());
            }
        }
    }
    flush_run(&mut run, &mut tables, page);

    tables
}

fn flush_run(run: &mut Vec<Vec<String>>, tables: &mut Vec<TableFragment>, page: u32) {
    if run.len() >= MIN_TABLE_ROWS {
        tables.push(TableFragment {
            page: Some(page),
            rows: std::mem::take(run),
        });
    } else {
        run.clear();
    }
}
