//! Spreadsheet-backed knowledge source
//!
//! Reads one range of a spreadsheet through the Sheets values API. The first
//! row is the header; every other row is flattened to
//! `"header: value | header: value"`.

use super::{KnowledgeRow, KnowledgeSource};
use crate::config::settings::KnowledgeConfig;
use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct SheetsSource {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    range: String,
    api_key: String,
}

impl SheetsSource {
    pub fn new(
        base_url: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        range: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(
        config: &KnowledgeConfig,
        spreadsheet_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self::new(
            config.sheets_base_url.clone(),
            spreadsheet_id,
            config.range.clone(),
            api_key,
        )
    }

    fn values_url(&self) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url.trim_end_matches('/'),
            self.spreadsheet_id,
            self.range
        )
    }
}

#[async_trait]
impl KnowledgeSource for SheetsSource {
    async fn fetch_rows(&self) -> Result<Vec<KnowledgeRow>, FetchError> {
        tracing::debug!("[SheetsSource] Fetching {}", self.range);

        let response = self
            .client
            .get(self.values_url())
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        Ok(flatten_rows(&range.values))
    }
}

/// Turn a header row plus data rows into one text record per data row.
/// Blank rows are skipped; short rows render missing cells as empty.
pub fn flatten_rows(values: &[Vec<Value>]) -> Vec<KnowledgeRow> {
    let Some((header, data)) = values.split_first() else {
        return Vec::new();
    };
    let header: Vec<String> = header.iter().map(cell_text).collect();

    data.iter()
        .filter(|row| row.iter().any(|cell| !cell_text(cell).trim().is_empty()))
        .map(|row| {
            let fields: Vec<String> = header
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let value = row.get(i).map(cell_text).unwrap_or_default();
                    format!("{}: {}", name, value)
                })
                .collect();
            KnowledgeRow::new(fields.join(" | "))
        })
        .collect()
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
