//! In-memory stand-ins for the remote collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::clients::store::{Filter, FilterOp};
use crate::clients::{DataStore, RateSource, SpreadsheetService};
use crate::error::AppError;
use crate::models::{spreadsheet_url, DriveFile, SpreadsheetInfo, CATALOG_TABLE};
use crate::services::table::RawTable;

/// Applies a store filter to one record the way PostgREST compares text.
pub fn filter_matches(filter: &Filter, record: &Value) -> bool {
    let Some(field) = record.get(&filter.column) else {
        return false;
    };
    let field = match field {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match filter.op {
        FilterOp::Eq => field == filter.value,
        FilterOp::Gte => field >= filter.value,
        FilterOp::Lt => field < filter.value,
    }
}

/// Tables of JSON records. Catalog rows get an `id` and `updated_at` on
/// write like the real table; `unique` keys make duplicate inserts fail.
#[derive(Default)]
pub struct FakeStore {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    unique: Mutex<HashMap<String, Vec<String>>>,
    failing: Mutex<HashSet<String>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn with_unique(table: &str, columns: &[&str]) -> Self {
        let store = FakeStore::default();
        store.unique.lock().unwrap().insert(
            table.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        store
    }

    /// Makes every call of `op` ("select", "insert", "upsert", "update") fail.
    pub fn fail(&self, op: &str) {
        self.failing.lock().unwrap().insert(op.to_string());
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.lock().unwrap().get(table).cloned().unwrap_or_default()
    }

    pub fn seed(&self, table: &str, records: Vec<Value>) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .extend(records);
    }

    fn enter(&self, op: &str, table: &str) -> Result<(), AppError> {
        self.calls.lock().unwrap().push(format!("{} {}", op, table));
        if self.failing.lock().unwrap().contains(op) {
            return Err(AppError::Store(format!("{} {} failed", op, table)));
        }
        Ok(())
    }

    fn stamp(table: &str, mut record: Value) -> Value {
        if table == CATALOG_TABLE {
            if let Some(obj) = record.as_object_mut() {
                obj.entry("id").or_insert_with(|| json!(Uuid::new_v4().to_string()));
                obj.insert("updated_at".to_string(), json!("2024-05-01T10:00:00+00:00"));
            }
        }
        record
    }

    fn same_key(a: &Value, b: &Value, columns: &[String]) -> bool {
        !columns.is_empty() && columns.iter().all(|c| a.get(c).is_some() && a.get(c) == b.get(c))
    }
}

#[async_trait]
impl DataStore for FakeStore {
    async fn select(&self, table: &str, filters: &[Filter], limit: Option<usize>) -> Result<Vec<Value>, AppError> {
        self.enter("select", table)?;
        let rows = self
            .rows(table)
            .into_iter()
            .filter(|r| filters.iter().all(|f| filter_matches(f, r)))
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Ok(rows)
    }

    async fn insert(&self, table: &str, records: &[Value]) -> Result<Vec<Value>, AppError> {
        self.enter("insert", table)?;
        let unique = self.unique.lock().unwrap().get(table).cloned().unwrap_or_default();
        let mut tables = self.tables.lock().unwrap();
        let existing = tables.entry(table.to_string()).or_default();

        for record in records {
            if existing.iter().any(|r| Self::same_key(record, r, &unique)) {
                return Err(AppError::Store(format!(
                    "insert into {} failed with status 409 Conflict: duplicate key",
                    table
                )));
            }
        }
        let stamped: Vec<Value> = records.iter().cloned().map(|r| Self::stamp(table, r)).collect();
        existing.extend(stamped.iter().cloned());
        Ok(stamped)
    }

    async fn upsert(&self, table: &str, records: &[Value], on_conflict: Option<&str>) -> Result<Vec<Value>, AppError> {
        self.enter("upsert", table)?;
        let key: Vec<String> = on_conflict
            .map(|c| c.split(',').map(str::to_string).collect())
            .unwrap_or_default();
        let mut tables = self.tables.lock().unwrap();
        let existing = tables.entry(table.to_string()).or_default();

        let mut written = Vec::new();
        for record in records {
            let record = Self::stamp(table, record.clone());
            match existing.iter_mut().find(|r| Self::same_key(&record, r, &key)) {
                Some(current) => {
                    if let (Some(target), Some(patch)) = (current.as_object_mut(), record.as_object()) {
                        for (k, v) in patch {
                            target.insert(k.clone(), v.clone());
                        }
                    }
                    written.push(current.clone());
                }
                None => {
                    existing.push(record.clone());
                    written.push(record);
                }
            }
        }
        Ok(written)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: &Value) -> Result<Vec<Value>, AppError> {
        self.enter("update", table)?;
        let mut tables = self.tables.lock().unwrap();
        let existing = tables.entry(table.to_string()).or_default();

        let mut updated = Vec::new();
        for row in existing.iter_mut().filter(|r| filters.iter().all(|f| filter_matches(f, r))) {
            if let (Some(target), Some(patch)) = (row.as_object_mut(), patch.as_object()) {
                for (k, v) in patch {
                    target.insert(k.clone(), v.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }
}

pub struct FakeSpreadsheet {
    pub name: String,
    pub parents: Vec<String>,
    pub worksheets: Vec<(String, Vec<Vec<Value>>)>,
}

/// Drive folders and spreadsheets held in memory.
#[derive(Default)]
pub struct FakeSheets {
    pub folders: Mutex<Vec<DriveFile>>,
    pub spreadsheets: Mutex<Vec<(String, FakeSpreadsheet)>>,
    pub shares: Mutex<Vec<(String, String)>>,
    pub deleted: Mutex<Vec<String>>,
    pub broken: Mutex<HashSet<String>>,
    pub undeletable: Mutex<HashSet<String>>,
    next_id: Mutex<usize>,
}

impl FakeSheets {
    pub fn add_folder(&self, name: &str) -> String {
        let id = self.fresh_id("folder");
        self.folders.lock().unwrap().push(DriveFile { id: id.clone(), name: name.to_string() });
        id
    }

    pub fn add_spreadsheet(&self, folder_id: &str, name: &str, worksheets: Vec<(&str, Vec<Vec<Value>>)>) -> String {
        let id = self.fresh_id("sheet");
        self.spreadsheets.lock().unwrap().push((
            id.clone(),
            FakeSpreadsheet {
                name: name.to_string(),
                parents: vec![folder_id.to_string()],
                worksheets: worksheets.into_iter().map(|(t, v)| (t.to_string(), v)).collect(),
            },
        ));
        id
    }

    /// Metadata reads for `id` will fail.
    pub fn break_spreadsheet(&self, id: &str) {
        self.broken.lock().unwrap().insert(id.to_string());
    }

    pub fn block_delete(&self, id: &str) {
        self.undeletable.lock().unwrap().insert(id.to_string());
    }

    pub fn worksheet_values(&self, id: &str) -> Vec<Vec<Value>> {
        self.spreadsheets
            .lock()
            .unwrap()
            .iter()
            .find(|(sid, _)| sid == id)
            .and_then(|(_, s)| s.worksheets.first().map(|(_, v)| v.clone()))
            .unwrap_or_default()
    }

    pub fn parents(&self, id: &str) -> Vec<String> {
        self.spreadsheets
            .lock()
            .unwrap()
            .iter()
            .find(|(sid, _)| sid == id)
            .map(|(_, s)| s.parents.clone())
            .unwrap_or_default()
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("{}-{}", prefix, next)
    }

    fn missing(id: &str) -> AppError {
        AppError::Sheets(format!("File not found: {}", id))
    }
}

#[async_trait]
impl SpreadsheetService for FakeSheets {
    async fn list_spreadsheets(&self, folder_id: Option<&str>) -> Result<Vec<DriveFile>, AppError> {
        Ok(self
            .spreadsheets
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| folder_id.map_or(true, |f| s.parents.iter().any(|p| p == f)))
            .map(|(id, s)| DriveFile { id: id.clone(), name: s.name.clone() })
            .collect())
    }

    async fn find_folder(&self, name: &str) -> Result<Option<DriveFile>, AppError> {
        Ok(self.folders.lock().unwrap().iter().find(|f| f.name == name).cloned())
    }

    async fn create_folder(&self, name: &str) -> Result<DriveFile, AppError> {
        let id = self.add_folder(name);
        Ok(DriveFile { id, name: name.to_string() })
    }

    async fn spreadsheet_info(&self, spreadsheet_id: &str) -> Result<SpreadsheetInfo, AppError> {
        if self.broken.lock().unwrap().contains(spreadsheet_id) {
            return Err(AppError::Sheets(format!("Spreadsheet {} is unreadable", spreadsheet_id)));
        }
        let sheets = self.spreadsheets.lock().unwrap();
        let (_, sheet) = sheets
            .iter()
            .find(|(id, _)| id == spreadsheet_id)
            .ok_or_else(|| Self::missing(spreadsheet_id))?;
        Ok(SpreadsheetInfo {
            id: spreadsheet_id.to_string(),
            name: sheet.name.clone(),
            sheets: sheet.worksheets.iter().map(|(t, _)| t.clone()).collect(),
            url: spreadsheet_url(spreadsheet_id),
        })
    }

    async fn read_sheet(&self, spreadsheet_id: &str, worksheet: Option<&str>) -> Result<RawTable, AppError> {
        let sheets = self.spreadsheets.lock().unwrap();
        let (_, sheet) = sheets
            .iter()
            .find(|(id, _)| id == spreadsheet_id)
            .ok_or_else(|| Self::missing(spreadsheet_id))?;
        let values = match worksheet {
            Some(title) => sheet.worksheets.iter().find(|(t, _)| t == title),
            None => sheet.worksheets.first(),
        }
        .map(|(_, v)| v.clone())
        .ok_or_else(|| AppError::Sheets("Worksheet not found".to_string()))?;
        Ok(RawTable::from_values(values))
    }

    async fn create_spreadsheet(&self, title: &str) -> Result<(DriveFile, String), AppError> {
        let id = self.fresh_id("sheet");
        self.spreadsheets.lock().unwrap().push((
            id.clone(),
            FakeSpreadsheet {
                name: title.to_string(),
                parents: vec!["root".to_string()],
                worksheets: vec![("Sheet1".to_string(), Vec::new())],
            },
        ));
        Ok((DriveFile { id, name: title.to_string() }, "Sheet1".to_string()))
    }

    async fn write_rows(&self, spreadsheet_id: &str, worksheet: &str, rows: Vec<Vec<Value>>) -> Result<(), AppError> {
        let mut sheets = self.spreadsheets.lock().unwrap();
        let (_, sheet) = sheets
            .iter_mut()
            .find(|(id, _)| id == spreadsheet_id)
            .ok_or_else(|| Self::missing(spreadsheet_id))?;
        let target = sheet
            .worksheets
            .iter_mut()
            .find(|(t, _)| t == worksheet)
            .ok_or_else(|| AppError::Sheets("Worksheet not found".to_string()))?;
        target.1 = rows;
        Ok(())
    }

    async fn share(&self, file_id: &str, email: &str) -> Result<(), AppError> {
        self.shares.lock().unwrap().push((file_id.to_string(), email.to_string()));
        Ok(())
    }

    async fn move_to_folder(&self, file_id: &str, folder_id: &str) -> Result<(), AppError> {
        let mut sheets = self.spreadsheets.lock().unwrap();
        let (_, sheet) = sheets
            .iter_mut()
            .find(|(id, _)| id == file_id)
            .ok_or_else(|| Self::missing(file_id))?;
        sheet.parents = vec![folder_id.to_string()];
        Ok(())
    }

    async fn delete(&self, file_id: &str) -> Result<(), AppError> {
        if self.undeletable.lock().unwrap().contains(file_id) {
            return Err(AppError::Sheets(format!("Cannot delete {}", file_id)));
        }
        self.spreadsheets.lock().unwrap().retain(|(id, _)| id != file_id);
        self.deleted.lock().unwrap().push(file_id.to_string());
        Ok(())
    }
}

/// Fixed rate table; `None` makes every fetch fail.
pub struct FakeRates {
    pub rates: Option<HashMap<String, f64>>,
    pub fetches: Mutex<usize>,
}

impl FakeRates {
    pub fn new(pairs: &[(&str, f64)]) -> Self {
        Self {
            rates: Some(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()),
            fetches: Mutex::new(0),
        }
    }

    pub fn failing() -> Self {
        Self { rates: None, fetches: Mutex::new(0) }
    }
}

#[async_trait]
impl RateSource for FakeRates {
    async fn latest(&self, _base: &str) -> Result<HashMap<String, f64>, AppError> {
        *self.fetches.lock().unwrap() += 1;
        self.rates
            .clone()
            .ok_or_else(|| AppError::RateApi("API request failed with status 503".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_match_json_records() {
        let record = json!({"base": "USD", "fetched_at": "2024-05-01T05:00:00Z", "rate": 36.5});
        assert!(filter_matches(&Filter::eq("base", "USD"), &record));
        assert!(filter_matches(&Filter::gte("fetched_at", "2024-05-01T00:00:00Z"), &record));
        assert!(!filter_matches(&Filter::lt("fetched_at", "2024-05-01T00:00:00Z"), &record));
        assert!(!filter_matches(&Filter::eq("quote", "EUR"), &record));
    }
}
