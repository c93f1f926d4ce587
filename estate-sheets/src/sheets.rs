//! Google Sheets (API v4) backend.
//!
//! One worksheet of one spreadsheet is the task table. Authentication is a
//! bearer token obtained elsewhere; this module only speaks the values API.
//!
//! The repository is synchronous, so each primitive drives the async client
//! to completion: inside a multi-threaded tokio runtime via `block_in_place`,
//! otherwise on a throwaway runtime.

use std::future::Future;

use estate_core::{ConnectionError, StoreError, TableStore};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4/";

#[derive(Debug, Clone)]
pub struct SheetsTable {
    client: reqwest::Client,
    base_url: Url,
    spreadsheet_id: String,
    sheet: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
struct ValuesBody<'a> {
    values: Vec<Vec<&'a str>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdate<'a> {
    value_input_option: &'static str,
    data: Vec<RangeValues<'a>>,
}

#[derive(Debug, Serialize)]
struct RangeValues<'a> {
    range: String,
    values: Vec<Vec<&'a str>>,
}

impl SheetsTable {
    pub fn connect(
        spreadsheet_id: &str,
        sheet: &str,
        token: &str,
        base_url: Option<&str>,
    ) -> Result<Self, ConnectionError> {
        if spreadsheet_id.trim().is_empty() {
            return Err(ConnectionError::MissingLocation);
        }
        if token.trim().is_empty() {
            return Err(ConnectionError::Credentials("no access token".to_string()));
        }
        let base = base_url.unwrap_or(DEFAULT_BASE_URL);
        let base_url = Url::parse(base)
            .map_err(|e| ConnectionError::Credentials(format!("bad base url '{base}': {e}")))?;
        // Calls may run on short-lived runtimes, so pooled connections must not
        // outlive the call that opened them.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| ConnectionError::Unreachable {
                location: base_url.to_string(),
                source: StoreError::Transport(format!("http client: {e}")),
            })?;
        Ok(Self {
            client,
            base_url,
            spreadsheet_id: spreadsheet_id.trim().to_string(),
            sheet: if sheet.trim().is_empty() { "Sheet1" } else { sheet.trim() }.to_string(),
            token: token.trim().to_string(),
        })
    }

    /// `Sheet1!C5`, quoting the sheet title when it needs it.
    fn range(&self, cells: &str) -> String {
        let title = if self.sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.sheet.clone()
        } else {
            format!("'{}'", self.sheet.replace('\'', "''"))
        };
        if cells.is_empty() {
            title
        } else {
            format!("{title}!{cells}")
        }
    }

    fn url(&self, tail: &str, query: &[(&str, &str)]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Transport("base url cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(["spreadsheets", self.spreadsheet_id.as_str(), "values", tail]);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// `values:batchUpdate` hangs off the values collection, not a range.
    fn batch_update_url(&self) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Transport("base url cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(["spreadsheets", self.spreadsheet_id.as_str(), "values:batchUpdate"]);
        Ok(url)
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<String, StoreError> {
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|e| StoreError::Rejected(format!("token is not a valid header: {e}")))?;

        let mut req = self.client.request(method.clone(), url.clone()).header(AUTHORIZATION, auth);
        if let Some(b) = body {
            req = req.json(b);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("{method} {url}: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| StoreError::Transport(format!("reading response: {e}")))?;
        if !status.is_success() {
            return Err(StoreError::Rejected(format!("{status} {text}")));
        }
        debug!(%method, %status, "sheets request");
        Ok(text)
    }

    async fn get_values(&self, range: String) -> Result<Vec<Vec<String>>, StoreError> {
        let url = self.url(&range, &[])?;
        let body = self.send::<()>(Method::GET, url, None).await?;
        parse_value_range(&body)
    }
}

/// Drive a future to completion from synchronous code.
fn block_on<F: Future>(fut: F) -> Result<F::Output, StoreError> {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
    } else {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StoreError::Transport(format!("create tokio runtime: {e}")))?;
        Ok(rt.block_on(fut))
    }
}

/// 1 → `A`, 26 → `Z`, 27 → `AA`.
pub fn column_letters(mut col: usize) -> String {
    let mut out = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        out.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

pub fn a1(row: usize, col: usize) -> String {
    format!("{}{}", column_letters(col), row)
}

/// Rows from a `ValueRange` response, padded to the widest row.
fn parse_value_range(body: &str) -> Result<Vec<Vec<String>>, StoreError> {
    let vr: ValueRange = serde_json::from_str(body)
        .map_err(|e| StoreError::Malformed(format!("values response: {e}")))?;
    let width = vr.values.iter().map(|r| r.len()).max().unwrap_or(0);
    Ok(vr
        .values
        .into_iter()
        .map(|r| {
            let mut cells: Vec<String> = r
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect();
            cells.resize(width, String::new());
            cells
        })
        .collect())
}

impl TableStore for SheetsTable {
    fn location(&self) -> String {
        format!("sheets:{}/{}", self.spreadsheet_id, self.sheet)
    }

    fn read_all_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        block_on(self.get_values(self.range("")))?
    }

    fn read_header_row(&self) -> Result<Vec<String>, StoreError> {
        let rows = block_on(self.get_values(self.range("1:1")))??;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    fn write_cell(&self, row: usize, col: usize, value: &str) -> Result<(), StoreError> {
        if row == 0 || col == 0 {
            return Err(StoreError::OutOfRange { row, col });
        }
        let range = self.range(&a1(row, col));
        let url = self.url(&range, &[("valueInputOption", "RAW")])?;
        let body = ValuesBody {
            values: vec![vec![value]],
        };
        block_on(self.send(Method::PUT, url, Some(&body)))??;
        Ok(())
    }

    /// One `values:batchUpdate` request for the whole record.
    fn write_cells(&self, row: usize, cells: &[(usize, String)]) -> Result<(), StoreError> {
        if cells.is_empty() {
            return Ok(());
        }
        let mut data = Vec::with_capacity(cells.len());
        for (col, value) in cells {
            if row == 0 || *col == 0 {
                return Err(StoreError::OutOfRange { row, col: *col });
            }
            data.push(RangeValues {
                range: self.range(&a1(row, *col)),
                values: vec![vec![value.as_str()]],
            });
        }
        let body = BatchUpdate {
            value_input_option: "RAW",
            data,
        };
        let url = self.batch_update_url()?;
        block_on(self.send(Method::POST, url, Some(&body)))??;
        Ok(())
    }

    fn append_row(&self, values: &[String]) -> Result<(), StoreError> {
        let tail = format!("{}:append", self.range("A1"));
        let url = self.url(
            &tail,
            &[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")],
        )?;
        let body = ValuesBody {
            values: vec![values.iter().map(|s| s.as_str()).collect()],
        };
        block_on(self.send(Method::POST, url, Some(&body)))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(sheet: &str) -> SheetsTable {
        SheetsTable::connect("abc123", sheet, "tok", None).unwrap()
    }

    #[test]
    fn column_letters_roll_over() {
        assert_eq!(column_letters(1), "A");
        assert_eq!(column_letters(11), "K");
        assert_eq!(column_letters(26), "Z");
        assert_eq!(column_letters(27), "AA");
        assert_eq!(column_letters(703), "AAA");
        assert_eq!(a1(5, 3), "C5");
    }

    #[test]
    fn sheet_titles_with_spaces_are_quoted() {
        assert_eq!(table("Sheet1").range("C5"), "Sheet1!C5");
        assert_eq!(table("Estate Tasks").range("1:1"), "'Estate Tasks'!1:1");
        assert_eq!(table("").range(""), "Sheet1");
    }

    #[test]
    fn urls_target_the_values_collection() {
        let t = table("Sheet1");
        let url = t.url("Sheet1!C5", &[("valueInputOption", "RAW")]).unwrap();
        assert_eq!(url.host_str(), Some("sheets.googleapis.com"));
        assert!(url.path().starts_with("/v4/spreadsheets/abc123/values/Sheet1"));
        assert_eq!(url.query(), Some("valueInputOption=RAW"));
    }

    #[test]
    fn batch_update_targets_the_collection() {
        let url = table("Estate Tasks").batch_update_url().unwrap();
        assert_eq!(url.path(), "/v4/spreadsheets/abc123/values:batchUpdate");
        assert_eq!(url.query(), None);

        let proxied = SheetsTable::connect("abc123", "Sheet1", "tok", Some("http://127.0.0.1:8080/sheets/v4"))
            .unwrap()
            .batch_update_url()
            .unwrap();
        assert_eq!(proxied.path(), "/sheets/v4/spreadsheets/abc123/values:batchUpdate");
    }

    #[test]
    fn ragged_rows_are_padded() {
        let body = r#"{"range":"Sheet1!A1:K3","majorDimension":"ROWS","values":[["Task ID","Status","Priority"],["1","Completed"],[2]]}"#;
        let rows = parse_value_range(body).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], vec!["1", "Completed", ""]);
        assert_eq!(rows[2], vec!["2", "", ""]);
    }

    #[test]
    fn empty_sheet_has_no_rows() {
        let rows = parse_value_range(r#"{"range":"Sheet1!A1:Z1000","majorDimension":"ROWS"}"#).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn connect_requires_id_and_token() {
        assert!(matches!(
            SheetsTable::connect("", "Sheet1", "tok", None),
            Err(ConnectionError::MissingLocation)
        ));
        assert!(matches!(
            SheetsTable::connect("abc", "Sheet1", " ", None),
            Err(ConnectionError::Credentials(_))
        ));
    }
}
