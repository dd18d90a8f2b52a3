use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const RETURN_CODE_OK: &str = "0000";
pub const RETURN_CODE_FAILURE: &str = "9999";
pub const RETURN_CODE_INTERNAL: &str = "500";

/// Header carrying the rotating token on guarded handlers.
pub const APIKEY_HEADER: &str = "apikey";

/// Inbound shape shared by every handler. `body` is duck-typed per handler;
/// the completion handler historically sent it under `message`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, alias = "message")]
    pub body: Value,
}

/// Gateways send `"headers": null` when a request carries none.
fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl RequestEnvelope {
    pub fn new(body: Value) -> Self {
        Self {
            headers: BTreeMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(rename = "returnCode")]
    pub return_code: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: ResponseBody,
}

impl ResponseEnvelope {
    pub fn is_success(&self) -> bool {
        self.status_code == 200 && self.body.return_code == RETURN_CODE_OK
    }

    pub fn data_text(&self) -> String {
        match &self.body.data {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

// Handler bodies.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantQueryRequest {
    #[serde(default)]
    pub asst: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub sys_prompt: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeSyncRequest {
    #[serde(default)]
    pub assistant_id: Option<String>,
    #[serde(default)]
    pub vector_store_id: Option<String>,
    #[serde(default)]
    pub sheet_name: Option<String>,
    #[serde(default)]
    pub sheet_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSyncReport {
    pub message: String,
    pub platform: String,
    pub sheet_name: String,
    pub vector_store_id: String,
    pub assistant_id: String,
    pub timestamp: String,
    pub file_id: String,
    pub file_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeRowsRequest {
    #[serde(default)]
    pub datas: Option<Vec<KnowledgeRow>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeRow {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub quest: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub datetime: String,
    #[serde(default)]
    pub rank: Value,
    #[serde(default)]
    pub appversion: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailReportRequest {
    #[serde(default)]
    pub data: Option<Vec<TriageRecord>>,
    #[serde(default)]
    pub receiver: Option<String>,
}

/// One row of the mailed triage report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriageRecord {
    #[serde(default)]
    pub original_index: usize,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Comment", default)]
    pub comment: String,
    #[serde(rename = "Platform", default)]
    pub platform: String,
    #[serde(rename = "UserReply", default)]
    pub user_reply: String,
    #[serde(rename = "Reformulated_Reply", default)]
    pub reformulated_reply: Vec<String>,
    #[serde(rename = "YesNoList", default)]
    pub yes_no_list: Vec<String>,
    #[serde(rename = "Yes_times", default)]
    pub yes_times: usize,
    #[serde(rename = "No_times", default)]
    pub no_times: usize,
}

/// Orchestrator input row, as exported from the review spreadsheet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackRow {
    #[serde(rename = "ReviewID", default)]
    pub review_id: Value,
    #[serde(rename = "Title", default)]
    pub title: Option<String>,
    #[serde(rename = "Comment", default)]
    pub comment: Option<String>,
    #[serde(rename = "Platform", default)]
    pub platform: Option<String>,
    #[serde(rename = "UserReply", default)]
    pub user_reply: Option<String>,
    #[serde(rename = "Rating", default)]
    pub rating: Value,
    #[serde(rename = "AppVersion", default)]
    pub app_version: Option<String>,
    #[serde(rename = "Brand", default)]
    pub brand: Option<String>,
}

// Upstream assistant / completion / vector-store API payloads.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorEnvelope {
    #[serde(default)]
    pub error: Option<ApiErrorDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn is_terminal_failure(self) -> bool {
        matches!(
            self,
            RunStatus::Cancelled | RunStatus::Failed | RunStatus::Incomplete | RunStatus::Expired
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    #[serde(default)]
    pub id: Option<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<ApiErrorDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageText {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(default)]
    pub text: Option<MessageText>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreFileStatus {
    InProgress,
    Completed,
    Cancelled,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreFile {
    pub id: String,
    pub status: VectorStoreFileStatus,
    #[serde(default)]
    pub last_error: Option<ApiErrorDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeletionStatus {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.to_string()),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

/// Spreadsheet values range, as returned by the values API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SheetValues {
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub values: Vec<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_envelope_accepts_legacy_message_key() {
        let env: RequestEnvelope = serde_json::from_value(json!({
            "message": {"model": "gpt-4o", "sys_prompt": "s", "prompt": "p"}
        }))
        .unwrap();
        assert_eq!(env.body["model"], "gpt-4o");
        assert!(env.headers.is_empty());
    }

    #[test]
    fn request_envelope_treats_null_headers_as_empty() {
        let env: RequestEnvelope = serde_json::from_value(json!({
            "headers": null,
            "body": {"asst": "asst_1"}
        }))
        .unwrap();
        assert!(env.headers.is_empty());
        assert_eq!(env.body["asst"], "asst_1");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let env = RequestEnvelope::new(json!({})).with_header("ApiKey", "k");
        assert_eq!(env.header("apikey"), Some("k"));
        assert_eq!(env.header("missing"), None);
    }

    #[test]
    fn run_status_tolerates_unknown_values() {
        let run: Run =
            serde_json::from_value(json!({"id": "run_1", "status": "brand_new_state"})).unwrap();
        assert_eq!(run.status, RunStatus::Unknown);
        assert!(!run.status.is_terminal_failure());
        let run: Run = serde_json::from_value(json!({"status": "expired"})).unwrap();
        assert!(run.status.is_terminal_failure());
    }

    #[test]
    fn triage_record_uses_report_field_names() {
        let record = TriageRecord {
            original_index: 3,
            title: "Login".to_string(),
            reformulated_reply: vec!["a".to_string()],
            yes_no_list: vec!["yes".to_string()],
            yes_times: 1,
            ..Default::default()
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["Title"], "Login");
        assert_eq!(value["Reformulated_Reply"], json!(["a"]));
        assert_eq!(value["Yes_times"], 1);
    }

    #[test]
    fn response_envelope_round_trips_wire_names() {
        let text = r#"{"statusCode":200,"headers":{},"body":{"returnCode":"0000","data":"Hi"}}"#;
        let env: ResponseEnvelope = serde_json::from_str(text).unwrap();
        assert!(env.is_success());
        assert_eq!(env.data_text(), "Hi");
    }
}
