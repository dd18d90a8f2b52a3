use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use storeai_contracts::{
    KnowledgeRow, KnowledgeSyncReport, RequestEnvelope, ResponseEnvelope, TriageRecord,
    APIKEY_HEADER,
};
use storeai_kernel::RotatingToken;
use tracing::debug;

use crate::TriageError;

pub const ROUTE_ASSISTANT_QUERY: &str = "/v1/assistant/query";
pub const ROUTE_COMPLETION: &str = "/v1/completion";
pub const ROUTE_KNOWLEDGE_SYNC: &str = "/v1/knowledge/sync";
pub const ROUTE_REPORT_MAIL: &str = "/v1/report/mail";
pub const ROUTE_KNOWLEDGE_ROWS: &str = "/v1/knowledge/rows";

/// Calls the deployed handlers with request envelopes and unwraps their
/// response envelopes. Anything but `200`/`"0000"` becomes [`TriageError::Handler`].
#[derive(Debug, Clone)]
pub struct HandlerClient {
    http: Client,
    base_url: String,
    token: RotatingToken,
}

impl HandlerClient {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self, TriageError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RotatingToken::default(),
        })
    }

    async fn call(&self, route: &str, envelope: RequestEnvelope) -> Result<Value, TriageError> {
        let response = self
            .http
            .post(format!("{}{route}", self.base_url))
            .json(&envelope)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        let reply: ResponseEnvelope = serde_json::from_str(&text).map_err(|e| {
            TriageError::InvalidResponse(format!("{route} answered {status} with {e}"))
        })?;
        debug!(route, status_code = reply.status_code, "handler replied");
        if !reply.is_success() {
            return Err(TriageError::Handler {
                route: route.to_string(),
                status_code: reply.status_code,
                return_code: reply.body.return_code.clone(),
                message: reply.data_text(),
            });
        }
        Ok(reply.body.data)
    }

    async fn call_text(&self, route: &str, envelope: RequestEnvelope) -> Result<String, TriageError> {
        match self.call(route, envelope).await? {
            Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }

    pub async fn ask_assistant(&self, assistant_id: &str, query: &str) -> Result<String, TriageError> {
        let envelope = RequestEnvelope::new(json!({"asst": assistant_id, "query": query}))
            .with_header(APIKEY_HEADER, &self.token.issue(Utc::now()));
        self.call_text(ROUTE_ASSISTANT_QUERY, envelope).await
    }

    pub async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        prompt: &str,
    ) -> Result<String, TriageError> {
        let envelope = RequestEnvelope::new(json!({
            "model": model,
            "sys_prompt": system_prompt,
            "prompt": prompt,
        }));
        self.call_text(ROUTE_COMPLETION, envelope).await
    }

    pub async fn add_knowledge_rows(&self, rows: &[KnowledgeRow]) -> Result<String, TriageError> {
        let envelope = RequestEnvelope::new(json!({"datas": rows}));
        self.call_text(ROUTE_KNOWLEDGE_ROWS, envelope).await
    }

    pub async fn sync_knowledge(
        &self,
        assistant_id: &str,
        vector_store_id: &str,
        sheet_name: &str,
        sheet_url: Option<&str>,
    ) -> Result<KnowledgeSyncReport, TriageError> {
        let mut body = json!({
            "assistant_id": assistant_id,
            "vector_store_id": vector_store_id,
            "sheet_name": sheet_name,
        });
        if let Some(url) = sheet_url {
            body["sheet_url"] = Value::String(url.to_string());
        }
        let data = self
            .call(ROUTE_KNOWLEDGE_SYNC, RequestEnvelope::new(body))
            .await?;
        serde_json::from_value(data)
            .map_err(|e| TriageError::InvalidResponse(format!("sync report: {e}")))
    }

    pub async fn send_report(
        &self,
        records: &[TriageRecord],
        receiver: &str,
    ) -> Result<String, TriageError> {
        let envelope = RequestEnvelope::new(json!({"data": records, "receiver": receiver}));
        self.call_text(ROUTE_REPORT_MAIL, envelope).await
    }
}
