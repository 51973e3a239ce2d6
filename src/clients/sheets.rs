use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::google_auth::TokenSource;
use crate::error::AppError;
use crate::models::{spreadsheet_url, DriveFile, SpreadsheetInfo};
use crate::services::table::RawTable;

pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
pub const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const SHEETS_API: &str = "https://sheets.googleapis.com/v4";

/// Drive and Sheets operations the importer, exporter and sheet routes use.
#[async_trait]
pub trait SpreadsheetService: Send + Sync {
    /// Spreadsheets visible to the account, optionally only inside one folder.
    async fn list_spreadsheets(&self, folder_id: Option<&str>) -> Result<Vec<DriveFile>, AppError>;

    async fn find_folder(&self, name: &str) -> Result<Option<DriveFile>, AppError>;

    async fn create_folder(&self, name: &str) -> Result<DriveFile, AppError>;

    async fn spreadsheet_info(&self, spreadsheet_id: &str) -> Result<SpreadsheetInfo, AppError>;

    /// Reads one worksheet, or the first one when `worksheet` is `None`.
    async fn read_sheet(&self, spreadsheet_id: &str, worksheet: Option<&str>) -> Result<RawTable, AppError>;

    /// Creates a spreadsheet and returns it with the title of its first worksheet.
    async fn create_spreadsheet(&self, title: &str) -> Result<(DriveFile, String), AppError>;

    /// Writes `rows` starting at A1 of `worksheet`.
    async fn write_rows(&self, spreadsheet_id: &str, worksheet: &str, rows: Vec<Vec<Value>>) -> Result<(), AppError>;

    /// Grants `email` writer access and sends a notification email.
    async fn share(&self, file_id: &str, email: &str) -> Result<(), AppError>;

    async fn move_to_folder(&self, file_id: &str, folder_id: &str) -> Result<(), AppError>;

    async fn delete(&self, file_id: &str) -> Result<(), AppError>;
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct Parents {
    #[serde(default)]
    parents: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Spreadsheet {
    spreadsheet_id: String,
    #[serde(default)]
    spreadsheet_url: Option<String>,
    properties: SpreadsheetProperties,
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SpreadsheetProperties,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// REST client for Drive v3 and Sheets v4.
pub struct GoogleSheetsClient {
    client: Client,
    auth: Arc<dyn TokenSource>,
    drive_api: String,
    sheets_api: String,
}

impl GoogleSheetsClient {
    pub fn new(client: Client, auth: Arc<dyn TokenSource>) -> Self {
        Self::with_endpoints(client, auth, DRIVE_API, SHEETS_API)
    }

    pub fn with_endpoints(client: Client, auth: Arc<dyn TokenSource>, drive_api: &str, sheets_api: &str) -> Self {
        Self {
            client,
            auth,
            drive_api: drive_api.trim_end_matches('/').to_string(),
            sheets_api: sheets_api.trim_end_matches('/').to_string(),
        }
    }

    fn url(base: &str, segments: &[&str]) -> Result<Url, AppError> {
        let mut url = Url::parse(base)
            .map_err(|e| AppError::Internal(format!("Invalid API base {}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Internal(format!("API base {} cannot take a path", base)))?
            .extend(segments);
        Ok(url)
    }

    async fn authorized(&self, method: Method, url: Url) -> Result<RequestBuilder, AppError> {
        let token = self.auth.access_token().await?;
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<reqwest::Response, AppError> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::Sheets(format!("Failed to {}: {}", action, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = super::error_body(response).await;
            return Err(AppError::Sheets(format!(
                "Failed to {} (status {}): {}",
                action, status, body
            )));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, action: &str) -> Result<T, AppError> {
        self.send(request, action)
            .await?
            .json::<T>()
            .await
            .map_err(|e| AppError::Sheets(format!("Unexpected response when trying to {}: {}", action, e)))
    }

    async fn search(&self, query: String) -> Result<Vec<DriveFile>, AppError> {
        let url = Self::url(&self.drive_api, &["files"])?;
        let request = self
            .authorized(Method::GET, url)
            .await?
            .query(&[
                ("q", query.as_str()),
                ("spaces", "drive"),
                ("fields", "files(id,name)"),
                ("pageSize", "1000"),
            ]);
        let list: FileList = self.send_json(request, "list Drive files").await?;
        Ok(list.files)
    }
}

/// Quotes a value for a Drive search query.
fn quoted(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// A1 range that addresses a whole worksheet by title.
fn sheet_range(worksheet: &str) -> String {
    format!("'{}'", worksheet.replace('\'', "''"))
}

#[async_trait]
impl SpreadsheetService for GoogleSheetsClient {
    async fn list_spreadsheets(&self, folder_id: Option<&str>) -> Result<Vec<DriveFile>, AppError> {
        let mut query = format!("mimeType = '{}' and trashed = false", SPREADSHEET_MIME);
        if let Some(folder_id) = folder_id {
            query = format!("{} in parents and {}", quoted(folder_id), query);
        }
        self.search(query).await
    }

    async fn find_folder(&self, name: &str) -> Result<Option<DriveFile>, AppError> {
        let query = format!(
            "name = {} and mimeType = '{}' and trashed = false",
            quoted(name),
            FOLDER_MIME
        );
        Ok(self.search(query).await?.into_iter().next())
    }

    async fn create_folder(&self, name: &str) -> Result<DriveFile, AppError> {
        let url = Self::url(&self.drive_api, &["files"])?;
        let request = self
            .authorized(Method::POST, url)
            .await?
            .query(&[("fields", "id,name")])
            .json(&json!({ "name": name, "mimeType": FOLDER_MIME }));
        self.send_json(request, "create folder").await
    }

    async fn spreadsheet_info(&self, spreadsheet_id: &str) -> Result<SpreadsheetInfo, AppError> {
        let url = Self::url(&self.sheets_api, &["spreadsheets", spreadsheet_id])?;
        let request = self
            .authorized(Method::GET, url)
            .await?
            .query(&[("fields", "spreadsheetId,spreadsheetUrl,properties.title,sheets.properties.title")]);
        let sheet: Spreadsheet = self.send_json(request, "read spreadsheet metadata").await?;

        Ok(SpreadsheetInfo {
            url: sheet
                .spreadsheet_url
                .unwrap_or_else(|| spreadsheet_url(&sheet.spreadsheet_id)),
            id: sheet.spreadsheet_id,
            name: sheet.properties.title,
            sheets: sheet.sheets.into_iter().map(|s| s.properties.title).collect(),
        })
    }

    async fn read_sheet(&self, spreadsheet_id: &str, worksheet: Option<&str>) -> Result<RawTable, AppError> {
        let title = match worksheet {
            Some(title) => title.to_string(),
            None => self
                .spreadsheet_info(spreadsheet_id)
                .await?
                .sheets
                .into_iter()
                .next()
                .ok_or_else(|| AppError::Sheets(format!("Spreadsheet {} has no worksheets", spreadsheet_id)))?,
        };

        let range = sheet_range(&title);
        let url = Self::url(&self.sheets_api, &["spreadsheets", spreadsheet_id, "values", range.as_str()])?;
        let request = self
            .authorized(Method::GET, url)
            .await?
            .query(&[("valueRenderOption", "UNFORMATTED_VALUE"), ("majorDimension", "ROWS")]);
        let values: ValueRange = self
            .send_json(request, &format!("read worksheet {}", title))
            .await?;

        Ok(RawTable::from_values(values.values))
    }

    async fn create_spreadsheet(&self, title: &str) -> Result<(DriveFile, String), AppError> {
        let url = Self::url(&self.sheets_api, &["spreadsheets"])?;
        let request = self
            .authorized(Method::POST, url)
            .await?
            .json(&json!({ "properties": { "title": title } }));
        let sheet: Spreadsheet = self.send_json(request, "create spreadsheet").await?;

        let first = sheet
            .sheets
            .into_iter()
            .next()
            .map(|s| s.properties.title)
            .unwrap_or_else(|| "Sheet1".to_string());
        Ok((
            DriveFile {
                id: sheet.spreadsheet_id,
                name: sheet.properties.title,
            },
            first,
        ))
    }

    async fn write_rows(&self, spreadsheet_id: &str, worksheet: &str, rows: Vec<Vec<Value>>) -> Result<(), AppError> {
        let range = format!("{}!A1", sheet_range(worksheet));
        let url = Self::url(&self.sheets_api, &["spreadsheets", spreadsheet_id, "values", range.as_str()])?;
        let request = self
            .authorized(Method::PUT, url)
            .await?
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "range": range, "majorDimension": "ROWS", "values": rows }));
        self.send(request, "write rows").await?;
        Ok(())
    }

    async fn share(&self, file_id: &str, email: &str) -> Result<(), AppError> {
        let url = Self::url(&self.drive_api, &["files", file_id, "permissions"])?;
        let request = self
            .authorized(Method::POST, url)
            .await?
            .query(&[("sendNotificationEmail", "true"), ("fields", "id")])
            .json(&json!({ "type": "user", "role": "writer", "emailAddress": email }));
        self.send(request, "share file").await?;
        Ok(())
    }

    async fn move_to_folder(&self, file_id: &str, folder_id: &str) -> Result<(), AppError> {
        let url = Self::url(&self.drive_api, &["files", file_id])?;
        let request = self
            .authorized(Method::GET, url.clone())
            .await?
            .query(&[("fields", "parents")]);
        let current: Parents = self.send_json(request, "read file parents").await?;

        let remove = current.parents.join(",");
        let request = self
            .authorized(Method::PATCH, url)
            .await?
            .query(&[
                ("addParents", folder_id),
                ("removeParents", remove.as_str()),
                ("fields", "id,parents"),
            ])
            .json(&json!({}));
        self.send(request, "move file").await?;
        Ok(())
    }

    async fn delete(&self, file_id: &str) -> Result<(), AppError> {
        let url = Self::url(&self.drive_api, &["files", file_id])?;
        let request = self.authorized(Method::DELETE, url).await?;
        self.send(request, "delete file").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticToken;

    #[async_trait]
    impl TokenSource for StaticToken {
        async fn access_token(&self) -> Result<String, AppError> {
            Ok("test-token".to_string())
        }
    }

    fn client(server: &MockServer) -> GoogleSheetsClient {
        GoogleSheetsClient::with_endpoints(
            Client::new(),
            Arc::new(StaticToken),
            &format!("{}/drive/v3", server.uri()),
            &format!("{}/v4", server.uri()),
        )
    }

    #[tokio::test]
    async fn lists_spreadsheets_inside_folder() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(header("authorization", "Bearer test-token"))
            .and(query_param(
                "q",
                "'folder-1' in parents and mimeType = 'application/vnd.google-apps.spreadsheet' and trashed = false",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [{"id": "s1", "name": "Batch May"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let files = client(&server).list_spreadsheets(Some("folder-1")).await.unwrap();
        assert_eq!(files, vec![DriveFile { id: "s1".into(), name: "Batch May".into() }]);
        assert_eq!(files[0].spreadsheet_url(), "https://docs.google.com/spreadsheets/d/s1");
    }

    #[tokio::test]
    async fn missing_folder_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": []})))
            .mount(&server)
            .await;

        assert!(client(&server).find_folder("MCP_sandbox_app").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reads_first_worksheet_when_unnamed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "spreadsheetId": "s1",
                "properties": {"title": "Batch May"},
                "sheets": [{"properties": {"title": "Inventory"}}, {"properties": {"title": "Archive"}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/s1/values/'Inventory'"))
            .and(query_param("valueRenderOption", "UNFORMATTED_VALUE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "'Inventory'!A1:B2",
                "values": [["developer", "price_baht"], ["DevCo", 1000000]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let table = client(&server).read_sheet("s1", None).await.unwrap();
        assert_eq!(table.headers, vec!["developer", "price_baht"]);
        assert_eq!(table.rows, vec![vec!["DevCo".to_string(), "1000000".to_string()]]);
    }

    #[tokio::test]
    async fn share_grants_writer_with_notification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/drive/v3/files/f1/permissions"))
            .and(query_param("sendNotificationEmail", "true"))
            .and(body_partial_json(json!({
                "type": "user", "role": "writer", "emailAddress": "owner@example.com"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "p1"})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).share("f1", "owner@example.com").await.unwrap();
    }

    #[tokio::test]
    async fn move_replaces_existing_parents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"parents": ["root-id"]})))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/drive/v3/files/s1"))
            .and(query_param("addParents", "folder-1"))
            .and(query_param("removeParents", "root-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "s1"})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).move_to_folder("s1", "folder-1").await.unwrap();
    }

    #[tokio::test]
    async fn failed_delete_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/drive/v3/files/s1"))
            .respond_with(ResponseTemplate::new(403).set_body_string("insufficientFilePermissions"))
            .mount(&server)
            .await;

        let err = client(&server).delete("s1").await.unwrap_err();
        assert!(matches!(err, AppError::Sheets(_)));
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn drive_query_values_are_escaped() {
        assert_eq!(quoted("Tom's files"), r"'Tom\'s files'");
        assert_eq!(sheet_range("Tom's"), "'Tom''s'");
    }
}
