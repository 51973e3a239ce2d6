use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const CATALOG_TABLE: &str = "catalog";
pub const FX_RATES_TABLE: &str = "fx_rates";

/// Columns of the `catalog` table. `RoomNumber` is stored under the
/// historical key `room_nymber`; existing rows and sheet templates use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogColumn {
    Developer,
    ProjectName,
    RoomType,
    RoomNumber,
    Block,
    SqM,
    PriceBaht,
    StockQty,
    UpdatedAt,
    Id,
}

impl CatalogColumn {
    /// Columns every imported table must carry.
    pub const REQUIRED: [CatalogColumn; 8] = [
        CatalogColumn::Developer,
        CatalogColumn::ProjectName,
        CatalogColumn::RoomType,
        CatalogColumn::RoomNumber,
        CatalogColumn::Block,
        CatalogColumn::SqM,
        CatalogColumn::PriceBaht,
        CatalogColumn::StockQty,
    ];

    pub const CRITICAL: [CatalogColumn; 3] = [
        CatalogColumn::Developer,
        CatalogColumn::ProjectName,
        CatalogColumn::RoomType,
    ];

    /// Column order used when writing the catalog to a spreadsheet.
    pub const DISPLAY_ORDER: [CatalogColumn; 10] = [
        CatalogColumn::Developer,
        CatalogColumn::ProjectName,
        CatalogColumn::RoomType,
        CatalogColumn::RoomNumber,
        CatalogColumn::Block,
        CatalogColumn::SqM,
        CatalogColumn::PriceBaht,
        CatalogColumn::StockQty,
        CatalogColumn::UpdatedAt,
        CatalogColumn::Id,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogColumn::Developer => "developer",
            CatalogColumn::ProjectName => "project_name",
            CatalogColumn::RoomType => "room_type",
            CatalogColumn::RoomNumber => "room_nymber",
            CatalogColumn::Block => "block",
            CatalogColumn::SqM => "sq_m",
            CatalogColumn::PriceBaht => "price_baht",
            CatalogColumn::StockQty => "stock_qty",
            CatalogColumn::UpdatedAt => "updated_at",
            CatalogColumn::Id => "id",
        }
    }

    /// Header spellings accepted on input. Only the room number column has
    /// an alias.
    pub fn accepted_headers(&self) -> &'static [&'static str] {
        match self {
            CatalogColumn::RoomNumber => &["room_nymber", "room_number"],
            CatalogColumn::Developer => &["developer"],
            CatalogColumn::ProjectName => &["project_name"],
            CatalogColumn::RoomType => &["room_type"],
            CatalogColumn::Block => &["block"],
            CatalogColumn::SqM => &["sq_m"],
            CatalogColumn::PriceBaht => &["price_baht"],
            CatalogColumn::StockQty => &["stock_qty"],
            CatalogColumn::UpdatedAt => &["updated_at"],
            CatalogColumn::Id => &["id"],
        }
    }

    pub fn from_header(header: &str) -> Option<CatalogColumn> {
        CatalogColumn::DISPLAY_ORDER
            .into_iter()
            .find(|col| col.accepted_headers().contains(&header))
    }
}

impl std::fmt::Display for CatalogColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inventory unit (a room in a real-estate project).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, deserialize_with = "text_or_blank")]
    pub developer: String,
    #[serde(default, deserialize_with = "text_or_blank")]
    pub project_name: String,
    #[serde(default, deserialize_with = "text_or_blank")]
    pub room_type: String,
    #[serde(rename = "room_nymber", alias = "room_number", default, deserialize_with = "text_or_blank")]
    pub room_number: String,
    #[serde(default, deserialize_with = "text_or_blank")]
    pub block: String,
    #[serde(default, deserialize_with = "text_or_blank")]
    pub sq_m: String,
    #[serde(default, deserialize_with = "number_or_zero")]
    pub price_baht: f64,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub stock_qty: u32,
    /// Owned by the store and never sent on writes. Kept as the store's
    /// text since its timestamp shape varies by column type.
    #[serde(default, skip_serializing, deserialize_with = "text_or_none")]
    pub updated_at: Option<String>,
}

impl CatalogRow {
    /// Sheet cell for one display column.
    pub fn cell(&self, column: CatalogColumn) -> Value {
        match column {
            CatalogColumn::Developer => Value::from(self.developer.as_str()),
            CatalogColumn::ProjectName => Value::from(self.project_name.as_str()),
            CatalogColumn::RoomType => Value::from(self.room_type.as_str()),
            CatalogColumn::RoomNumber => Value::from(self.room_number.as_str()),
            CatalogColumn::Block => Value::from(self.block.as_str()),
            CatalogColumn::SqM => Value::from(self.sq_m.as_str()),
            CatalogColumn::PriceBaht => Value::from(self.price_baht),
            CatalogColumn::StockQty => Value::from(self.stock_qty),
            CatalogColumn::UpdatedAt => Value::from(self.updated_at.as_deref().unwrap_or("")),
            CatalogColumn::Id => self
                .id
                .map(|id| Value::from(id.to_string()))
                .unwrap_or_else(|| Value::from("")),
        }
    }
}

fn text_or_blank<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

fn text_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Numbers or numeric text; anything else reads as 0.
fn number_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(value.filter(|v| v.is_finite()).unwrap_or(0.0))
}

/// Like `number_or_zero`, truncated and clamped into `u32`.
fn count_or_zero<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = number_or_zero(deserializer)?;
    Ok(value.trunc().clamp(0.0, u32::MAX as f64) as u32)
}

/// A `(base, quote)` exchange rate as stored in `fx_rates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub base: String,
    pub quote: String,
    pub rate: f64,
    pub fetched_at: DateTime<Utc>,
}

/// A Drive file or folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
}

impl DriveFile {
    pub fn spreadsheet_url(&self) -> String {
        spreadsheet_url(&self.id)
    }
}

/// Spreadsheet metadata: title and worksheet names in tab order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpreadsheetInfo {
    pub id: String,
    pub name: String,
    pub sheets: Vec<String>,
    pub url: String,
}

pub fn spreadsheet_url(id: &str) -> String {
    format!("https://docs.google.com/spreadsheets/d/{}", id)
}
