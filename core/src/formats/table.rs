/// Tabular model shared by CSV and Excel. The unit of translation is one
/// cell; only columns classified as free text are translated, everything
/// else passes through unchanged.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::task::{TranslationUnit, UnitPosition, UnitStatus};

/// How many rows are sampled when classifying a column.
const CLASSIFY_SAMPLE_ROWS: usize = 10;
/// Minimum character length for a sampled cell to count as free text.
const MIN_TEXT_LEN: usize = 2;

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^\d{4}-\d{2}-\d{2}$",
        r"^\d{2}-\d{2}-\d{4}$",
        r"^\d{2}/\d{2}/\d{4}$",
        r"^\d{4}/\d{2}/\d{2}$",
        r"^\d{2}\.\d{2}\.\d{4}$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid date regex"))
    .collect()
});

/// One worksheet (or the single logical sheet of a CSV): a header row
/// followed by data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A decoded tabular document. Rows are addressed by a global index that
/// runs across sheets in order, so `UnitPosition::Cell` stays a plain
/// row+column locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub sheets: Vec<Sheet>,
}

impl Table {
    pub fn single_sheet(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            sheets: vec![Sheet {
                name: "Sheet1".into(),
                headers,
                rows,
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.iter().all(|s| s.rows.is_empty() && s.headers.is_empty())
    }
}

pub fn is_date_like(value: &str) -> bool {
    DATE_PATTERNS.iter().any(|p| p.is_match(value.trim()))
}

pub fn is_numeric(value: &str) -> bool {
    !value.trim().is_empty() && value.trim().parse::<f64>().is_ok()
}

fn is_free_text(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.chars().count() >= MIN_TEXT_LEN && !is_numeric(trimmed) && !is_date_like(trimmed)
}

/// Classify each column of a sheet by sampling up to
/// [`CLASSIFY_SAMPLE_ROWS`] rows: translatable iff more than half of the
/// non-empty sampled cells are free text.
pub fn translatable_columns(sheet: &Sheet) -> Vec<bool> {
    let column_count = sheet.headers.len().max(
        sheet.rows.iter().map(|r| r.len()).max().unwrap_or(0),
    );

    (0..column_count)
        .map(|col| {
            let mut non_empty = 0usize;
            let mut free_text = 0usize;

            for row in sheet.rows.iter().take(CLASSIFY_SAMPLE_ROWS) {
                let Some(cell) = row.get(col) else { continue };
                if cell.trim().is_empty() {
                    continue;
                }
                non_empty += 1;
                if is_free_text(cell) {
                    free_text += 1;
                }
            }

            non_empty > 0 && free_text * 2 > non_empty
        })
        .collect()
}

/// Produce one unit per non-empty cell in a translatable column, rows
/// numbered globally across sheets.
pub fn chunk_table(table: &Table) -> Vec<TranslationUnit> {
    let mut units = Vec::new();
    let mut row_base = 0usize;

    for sheet in &table.sheets {
        let columns = translatable_columns(sheet);

        for (row_idx, row) in sheet.rows.iter().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                if !columns.get(col_idx).copied().unwrap_or(false) {
                    continue;
                }
                if cell.trim().is_empty() {
                    continue;
                }
                units.push(TranslationUnit::new(
                    UnitPosition::Cell {
                        row: row_base + row_idx,
                        column: col_idx,
                    },
                    cell.clone(),
                ));
            }
        }

        row_base += sheet.rows.len();
    }

    units
}

/// Write unit outputs back into a copy of the table. Cells without a unit
/// are untouched; failed units carry their placeholder in
/// `translated_text` by the time they get here.
pub fn apply_units(table: &Table, units: &[TranslationUnit]) -> Table {
    let mut result = table.clone();

    for unit in units {
        let UnitPosition::Cell { row, column } = unit.position else {
            continue;
        };
        if unit.status == UnitStatus::Pending {
            continue;
        }

        let mut row_base = 0usize;
        for sheet in &mut result.sheets {
            if row < row_base + sheet.rows.len() {
                if let Some(cell) = sheet.rows[row - row_base].get_mut(column) {
                    *cell = unit.output_text().to_string();
                }
                break;
            }
            row_base += sheet.rows.len();
        }
    }

    result
}

/// Dedup key for cell text: trimmed, inner whitespace collapsed, case
/// folded. Identical cell content costs one external call and fans out to
/// every matching position.
pub fn normalize_cell_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
