//! Validation and type coercion applied to every batch before it reaches
//! the store.
//!
//! The steps run in a fixed order:
//!
//! 1. every required column must be present, otherwise the whole batch is
//!    rejected with the full list of missing columns;
//! 2. `price_baht` and 3. `stock_qty` are coerced to numbers;
//! 4. text columns are taken as trimmed text;
//! 5. rows with a blank `developer`, `project_name` or `room_type` are dropped;
//! 6. `id` values that are not canonical UUIDs are cleared;
//! 7. `updated_at` is discarded, the store owns it;
//! 8. any other column is discarded and reported.

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use super::table::RawTable;
use crate::error::AppError;
use crate::models::{CatalogColumn, CatalogRow};

static CANONICAL_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("UUID pattern is valid")
});

/// What to do with a numeric cell that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericPolicy {
    /// Store 0 and count the row. Used by bulk imports.
    CoerceToZero,
    /// Fail the batch. Used by the upload route.
    Reject,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeReport {
    pub input_rows: usize,
    pub invalid_price_rows: usize,
    pub invalid_stock_rows: usize,
    pub dropped_rows: usize,
    pub cleared_ids: usize,
    pub dropped_columns: Vec<String>,
    pub dropped_updated_at: bool,
}

impl NormalizeReport {
    pub fn log(&self, source: &str) {
        if self.invalid_price_rows > 0 {
            tracing::warn!(
                "{}: invalid price values found in {} rows, set to 0",
                source,
                self.invalid_price_rows
            );
        }
        if self.invalid_stock_rows > 0 {
            tracing::warn!(
                "{}: invalid stock values found in {} rows, set to 0",
                source,
                self.invalid_stock_rows
            );
        }
        if self.dropped_rows > 0 {
            tracing::warn!(
                "{}: removed {} rows with missing critical data",
                source,
                self.dropped_rows
            );
        }
        if self.cleared_ids > 0 {
            tracing::warn!(
                "{}: removed invalid UUID values from {} rows",
                source,
                self.cleared_ids
            );
        }
        if !self.dropped_columns.is_empty() {
            tracing::warn!(
                "{}: ignoring extra columns: {}",
                source,
                self.dropped_columns.join(", ")
            );
        }
        if self.dropped_updated_at {
            tracing::debug!("{}: dropped client-supplied updated_at column", source);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    pub rows: Vec<CatalogRow>,
    pub report: NormalizeReport,
}

struct ColumnMap {
    required: [usize; 8],
    id: Option<usize>,
    updated_at: Option<usize>,
}

impl ColumnMap {
    fn resolve(table: &RawTable) -> Result<Self, AppError> {
        let find = |col: CatalogColumn| {
            col.accepted_headers()
                .iter()
                .find_map(|name| table.column_index(name))
        };

        let mut required = [0usize; 8];
        let mut missing = Vec::new();
        for (slot, col) in required.iter_mut().zip(CatalogColumn::REQUIRED) {
            match find(col) {
                Some(idx) => *slot = idx,
                None => missing.push(col.as_str().to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(AppError::MissingColumns(missing));
        }

        Ok(ColumnMap {
            required,
            id: find(CatalogColumn::Id),
            updated_at: find(CatalogColumn::UpdatedAt),
        })
    }

    fn get<'a>(&self, row: &'a [String], col: CatalogColumn) -> &'a str {
        let idx = match col {
            CatalogColumn::Id => self.id,
            CatalogColumn::UpdatedAt => self.updated_at,
            other => CatalogColumn::REQUIRED
                .iter()
                .position(|c| *c == other)
                .map(|pos| self.required[pos]),
        };
        idx.and_then(|i| row.get(i)).map(String::as_str).unwrap_or("")
    }

    fn is_known(&self, idx: usize) -> bool {
        self.required.contains(&idx) || self.id == Some(idx) || self.updated_at == Some(idx)
    }
}

/// Blank counts as zero. Anything else must be a finite, non-negative number.
fn parse_amount(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0.0);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Like `parse_amount`, truncated to a whole count.
fn parse_count(raw: &str) -> Option<u32> {
    parse_amount(raw)
        .map(f64::trunc)
        .filter(|v| *v <= u32::MAX as f64)
        .map(|v| v as u32)
}

pub fn is_canonical_uuid(raw: &str) -> bool {
    CANONICAL_UUID.is_match(raw)
}

fn rejected(col: CatalogColumn, line: usize, raw: &str) -> AppError {
    AppError::Validation(format!(
        "{} value '{}' on line {} is not a non-negative number",
        col, raw, line
    ))
}

/// Turns a raw table into catalog rows ready for upsert.
pub fn normalize(table: &RawTable, policy: NumericPolicy) -> Result<NormalizedBatch, AppError> {
    let columns = ColumnMap::resolve(table)?;

    let mut report = NormalizeReport {
        input_rows: table.rows.len(),
        dropped_updated_at: columns.updated_at.is_some(),
        dropped_columns: table
            .headers
            .iter()
            .enumerate()
            .filter(|(idx, name)| !columns.is_known(*idx) && !name.is_empty())
            .map(|(_, name)| name.clone())
            .collect(),
        ..NormalizeReport::default()
    };

    let mut rows = Vec::with_capacity(table.rows.len());
    for (idx, raw) in table.rows.iter().enumerate() {
        // header is line 1
        let line = idx + 2;

        let price_raw = columns.get(raw, CatalogColumn::PriceBaht);
        let price_baht = match parse_amount(price_raw) {
            Some(v) => v,
            None if policy == NumericPolicy::Reject => {
                return Err(rejected(CatalogColumn::PriceBaht, line, price_raw));
            }
            None => {
                report.invalid_price_rows += 1;
                0.0
            }
        };

        let stock_raw = columns.get(raw, CatalogColumn::StockQty);
        let stock_qty = match parse_count(stock_raw) {
            Some(v) => v,
            None if policy == NumericPolicy::Reject => {
                return Err(rejected(CatalogColumn::StockQty, line, stock_raw));
            }
            None => {
                report.invalid_stock_rows += 1;
                0
            }
        };

        let text = |col: CatalogColumn| columns.get(raw, col).trim().to_string();
        let row = CatalogRow {
            id: None,
            developer: text(CatalogColumn::Developer),
            project_name: text(CatalogColumn::ProjectName),
            room_type: text(CatalogColumn::RoomType),
            room_number: text(CatalogColumn::RoomNumber),
            block: text(CatalogColumn::Block),
            sq_m: text(CatalogColumn::SqM),
            price_baht,
            stock_qty,
            updated_at: None,
        };

        if CatalogColumn::CRITICAL.iter().any(|col| text(*col).is_empty()) {
            report.dropped_rows += 1;
            continue;
        }

        let id_raw = columns.get(raw, CatalogColumn::Id).trim();
        let id = if id_raw.is_empty() {
            None
        } else if is_canonical_uuid(id_raw) {
            Uuid::parse_str(id_raw).ok()
        } else {
            report.cleared_ids += 1;
            None
        };

        rows.push(CatalogRow { id, ..row });
    }

    Ok(NormalizedBatch { rows, report })
}
