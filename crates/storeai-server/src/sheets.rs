use std::time::Duration;

use reqwest::{Client, Url};
use serde_json::json;
use storeai_contracts::SheetValues;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("missing spreadsheet access token")]
    MissingToken,
    #[error("not a spreadsheet url: {0}")]
    InvalidUrl(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("spreadsheet api returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Minimal client for the spreadsheet values API (read a worksheet, append rows).
#[derive(Debug, Clone)]
pub struct SheetsClient {
    client: Client,
    api_base: String,
    access_token: Option<String>,
}

impl SheetsClient {
    pub fn new(
        api_base: &str,
        access_token: Option<String>,
        timeout_ms: u64,
    ) -> Result<Self, SheetsError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token: access_token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn has_token(&self) -> bool {
        self.access_token.is_some()
    }

    fn token(&self) -> Result<&str, SheetsError> {
        self.access_token.as_deref().ok_or(SheetsError::MissingToken)
    }

    fn values_url(&self, sheet_url: &str, range: &str) -> Result<Url, SheetsError> {
        let id = spreadsheet_id(sheet_url)
            .ok_or_else(|| SheetsError::InvalidUrl(sheet_url.to_string()))?;
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| SheetsError::InvalidUrl(format!("{}: {e}", self.api_base)))?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::InvalidUrl(self.api_base.clone()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", id, "values", range]);
        Ok(url)
    }

    /// Every populated row of a worksheet.
    pub async fn read_values(
        &self,
        sheet_url: &str,
        worksheet: &str,
    ) -> Result<Vec<Vec<String>>, SheetsError> {
        let token = self.token()?;
        let url = self.values_url(sheet_url, worksheet)?;
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SheetsError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let values: SheetValues = response.json().await?;
        Ok(values.values)
    }

    pub async fn append_row(
        &self,
        sheet_url: &str,
        worksheet: &str,
        cells: &[String],
    ) -> Result<(), SheetsError> {
        let token = self.token()?;
        let mut url = self.values_url(sheet_url, &format!("{worksheet}:append"))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&json!({"values": [cells]}))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SheetsError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Spreadsheet id from a share URL (`.../spreadsheets/d/<id>/edit`) or a bare id.
pub fn spreadsheet_id(sheet_url: &str) -> Option<&str> {
    let trimmed = sheet_url.trim();
    if let Some((_, rest)) = trimmed.split_once("/spreadsheets/d/") {
        return rest
            .split(['/', '?', '#'])
            .next()
            .filter(|id| !id.is_empty());
    }
    if !trimmed.is_empty() && !trimmed.contains('/') {
        return Some(trimmed);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_from_share_url() {
        assert_eq!(
            spreadsheet_id("https://docs.google.com/spreadsheets/d/1-C4Ow_x/edit?usp=sharing"),
            Some("1-C4Ow_x")
        );
        assert_eq!(spreadsheet_id("1-C4Ow_x"), Some("1-C4Ow_x"));
        assert_eq!(spreadsheet_id("https://example.com/other"), None);
        assert_eq!(spreadsheet_id(""), None);
    }

    #[test]
    fn builds_values_url_with_encoded_worksheet() {
        let client = SheetsClient::new("https://sheets.example.com/", None, 1000).unwrap();
        let url = client
            .values_url("https://docs.google.com/spreadsheets/d/abc/edit", "My Sheet")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.example.com/v4/spreadsheets/abc/values/My%20Sheet"
        );
    }

    #[tokio::test]
    async fn reads_require_a_token() {
        let client = SheetsClient::new("https://sheets.example.com", None, 1000).unwrap();
        assert!(!client.has_token());
        let err = client.read_values("abc", "Sheet1").await.unwrap_err();
        assert!(matches!(err, SheetsError::MissingToken));
    }
}
