use serde_json::Value;

use crate::error::AppError;

/// A worksheet or CSV file as read: a header row plus rows of raw cell
/// text. Nothing is typed yet; see `normalizer` for that step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// First row is the header. Rows whose cells are all blank are
    /// dropped and short rows are padded to the header width.
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Self {
        if rows.is_empty() {
            return RawTable::default();
        }

        let headers: Vec<String> = rows
            .remove(0)
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();
        let width = headers.len();

        let rows = rows
            .into_iter()
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .map(|mut row| {
                if row.len() < width {
                    row.resize(width, String::new());
                }
                row
            })
            .collect();

        RawTable { headers, rows }
    }

    /// Parses CSV text with a header row. A leading UTF-8 BOM is ignored.
    pub fn from_csv(text: &str) -> Result<Self, AppError> {
        let text = text.trim_start_matches('\u{FEFF}');

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self::from_rows(rows))
    }

    /// Builds a table from a Sheets `values` payload. Cells arrive as
    /// strings, numbers or booleans and all become text here.
    pub fn from_values(values: Vec<Vec<Value>>) -> Self {
        Self::from_rows(
            values
                .into_iter()
                .map(|row| row.into_iter().map(cell_text).collect())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Rows as header → cell objects, for display endpoints.
    pub fn records(&self) -> Vec<serde_json::Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .zip(row.iter())
                    .map(|(h, cell)| (h.clone(), Value::from(cell.as_str())))
                    .collect()
            })
            .collect()
    }
}

pub fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}
