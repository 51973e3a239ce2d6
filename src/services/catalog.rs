use serde_json::Value;

use crate::clients::DataStore;
use crate::error::AppError;
use crate::models::{CatalogRow, CATALOG_TABLE};

/// Writes normalized rows to the catalog table and returns how many were
/// written. Rows carrying an `id` are upserted on it; the rest are inserted
/// and get an id from the store. Each request keeps uniform JSON keys.
pub async fn upsert_rows(store: &dyn DataStore, rows: &[CatalogRow]) -> Result<usize, AppError> {
    let (keyed, fresh): (Vec<&CatalogRow>, Vec<&CatalogRow>) = rows.iter().partition(|r| r.id.is_some());

    let mut written = 0;
    if !keyed.is_empty() {
        let records = to_records(&keyed)?;
        store.upsert(CATALOG_TABLE, &records, Some("id")).await?;
        written += records.len();
    }
    if !fresh.is_empty() {
        let records = to_records(&fresh)?;
        store.insert(CATALOG_TABLE, &records).await?;
        written += records.len();
    }

    tracing::info!(
        "Wrote {} rows to {} ({} keyed, {} new)",
        written,
        CATALOG_TABLE,
        keyed.len(),
        fresh.len()
    );
    Ok(written)
}

/// Every row in the catalog table, with the set of columns present in at
/// least one of them.
pub async fn fetch_all(store: &dyn DataStore) -> Result<(Vec<CatalogRow>, Vec<String>), AppError> {
    let raw = store.select(CATALOG_TABLE, &[], None).await?;
    Ok(parse_rows(raw))
}

/// Typed rows plus the columns present in them. A record that cannot be
/// read as a catalog row is skipped with a warning.
pub fn parse_rows(raw: Vec<Value>) -> (Vec<CatalogRow>, Vec<String>) {
    let mut rows = Vec::with_capacity(raw.len());
    let mut columns: Vec<String> = Vec::new();
    for record in raw {
        let keys: Vec<String> = record
            .as_object()
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default();
        match serde_json::from_value::<CatalogRow>(record) {
            Ok(row) => {
                for key in keys {
                    if !columns.contains(&key) {
                        columns.push(key);
                    }
                }
                rows.push(row);
            }
            Err(e) => tracing::warn!("Skipping unreadable catalog row: {}", e),
        }
    }
    (rows, columns)
}

fn to_records(rows: &[&CatalogRow]) -> Result<Vec<Value>, AppError> {
    rows.iter()
        .map(|row| serde_json::to_value(row).map_err(AppError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStore;
    use uuid::Uuid;

    fn row(room: &str, id: Option<Uuid>) -> CatalogRow {
        CatalogRow {
            id,
            developer: "DevCo".into(),
            project_name: "Tower A".into(),
            room_type: "Studio".into(),
            room_number: room.into(),
            block: "A".into(),
            sq_m: "25".into(),
            price_baht: 1_000_000.0,
            stock_qty: 1,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn keyed_rows_update_in_place() {
        let store = FakeStore::default();
        let id = Uuid::new_v4();

        upsert_rows(&store, &[row("101", Some(id)), row("102", None)]).await.unwrap();
        let mut again = row("101", Some(id));
        again.price_baht = 900_000.0;
        upsert_rows(&store, &[again]).await.unwrap();

        let (rows, _) = fetch_all(&store).await.unwrap();
        assert_eq!(rows.len(), 2);
        let updated = rows.iter().find(|r| r.id == Some(id)).unwrap();
        assert_eq!(updated.price_baht, 900_000.0);
        assert!(rows.iter().all(|r| r.id.is_some()));
    }

    #[tokio::test]
    async fn unkeyed_rows_duplicate_on_rerun() {
        let store = FakeStore::default();
        upsert_rows(&store, &[row("101", None)]).await.unwrap();
        upsert_rows(&store, &[row("101", None)]).await.unwrap();
        assert_eq!(store.rows(CATALOG_TABLE).len(), 2);
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let store = FakeStore::default();
        store.fail("insert");
        let err = upsert_rows(&store, &[row("101", None)]).await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }

    #[test]
    fn parse_collects_present_columns() {
        let raw = vec![
            serde_json::json!({"developer": "A", "project_name": "P", "room_type": "S"}),
            serde_json::json!({"developer": "B", "id": "0f8fad5b-d9cb-469f-a165-70867728950e"}),
        ];
        let (rows, columns) = parse_rows(raw);
        assert_eq!(rows.len(), 2);
        assert_eq!(columns, vec!["developer", "project_name", "room_type", "id"]);
    }

    #[test]
    fn unreadable_rows_are_skipped_not_fatal() {
        let raw = vec![
            serde_json::json!({"developer": "A", "stock_qty": -1, "updated_at": "2024-05-01T10:00:00.123456"}),
            serde_json::json!({"developer": "B", "id": "not-a-uuid", "notes": "x"}),
        ];
        let (rows, columns) = parse_rows(raw);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].developer, "A");
        assert_eq!(rows[0].stock_qty, 0);
        assert_eq!(rows[0].updated_at.as_deref(), Some("2024-05-01T10:00:00.123456"));
        assert!(!columns.contains(&"id".to_string()));
    }
}
