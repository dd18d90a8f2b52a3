pub mod knowledge;
pub mod mail;
pub mod openai;
pub mod sheets;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde_json::Value;
use storeai_config::Config;
use storeai_contracts::{
    AssistantQueryRequest, CompletionRequest, KnowledgeRowsRequest, KnowledgeSyncRequest,
    MailReportRequest, RequestEnvelope, ResponseEnvelope, APIKEY_HEADER, RETURN_CODE_FAILURE,
    RETURN_CODE_INTERNAL,
};
use storeai_kernel::envelope::{failure, success};
use storeai_kernel::report::render_report;
use storeai_kernel::sheet_rows::layout_knowledge_row;
use storeai_kernel::{AllowAll, AuthStrategy, PollPolicy, RotatingToken};
use tracing::{info, warn};

use crate::knowledge::{run_sync, SyncJob, SyncSettings};
use crate::mail::{MailCredentials, MailTransport, OutgoingMail, SmtpMailer};
use crate::openai::{OpenAiClient, UpstreamError};
use crate::sheets::SheetsClient;

const DEFAULT_SHEET_NAME: &str = "Sheet1";

pub async fn serve(cfg: Config) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let app = build_app(cfg).await?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    info!(%addr, "storeai handlers listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

pub async fn build_app(cfg: Config) -> Result<Router, String> {
    let mailer = Arc::new(SmtpMailer::new(&cfg.mail.smtp_host, cfg.mail.smtp_port));
    build_app_with_mailer(cfg, mailer).await
}

/// Same router as [`build_app`] with a caller-supplied mail transport.
pub async fn build_app_with_mailer(
    cfg: Config,
    mailer: Arc<dyn MailTransport>,
) -> Result<Router, String> {
    let state = AppState::new(cfg, mailer)?;
    Ok(Router::new()
        .route("/v1/healthz", get(healthz))
        .route("/v1/assistant/query", post(assistant_query))
        .route("/v1/completion", post(completion))
        .route("/v1/knowledge/sync", post(knowledge_sync))
        .route("/v1/report/mail", post(report_mail))
        .route("/v1/knowledge/rows", post(knowledge_rows))
        .with_state(state))
}

#[derive(Clone)]
struct AppState {
    cfg: Arc<Config>,
    auth: Arc<dyn AuthStrategy>,
    openai: Option<Arc<OpenAiClient>>,
    sheets: Arc<SheetsClient>,
    mailer: Arc<dyn MailTransport>,
    sync: Arc<SyncSettings>,
    run_poll: PollPolicy,
}

impl AppState {
    fn new(cfg: Config, mailer: Arc<dyn MailTransport>) -> Result<Self, String> {
        let auth: Arc<dyn AuthStrategy> = match cfg.auth.mode.as_str() {
            "none" => Arc::new(AllowAll),
            _ => Arc::new(RotatingToken::new(cfg.auth.bypass_token.clone())),
        };

        // Without a key the server still starts; OpenAI-backed handlers answer 500.
        let openai = match cfg.openai.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Some(Arc::new(
                OpenAiClient::new(&cfg.openai.api_base, key, cfg.openai.timeout_ms)
                    .map_err(|e| format!("openai client: {e}"))?,
            )),
            _ => {
                warn!("openai.api_key is not set; assistant and completion handlers will fail");
                None
            }
        };

        let sheets = SheetsClient::new(
            &cfg.sheets.api_base,
            cfg.sheets.access_token.clone(),
            cfg.openai.timeout_ms,
        )
        .map_err(|e| format!("sheets client: {e}"))?;

        let timezone: Tz = cfg
            .sync
            .timezone
            .parse()
            .map_err(|e| format!("invalid sync.timezone {}: {e}", cfg.sync.timezone))?;
        let sync = SyncSettings {
            staging_dir: PathBuf::from(&cfg.sync.staging_dir),
            timezone,
            delete_settle: Duration::from_millis(cfg.sync.delete_settle_ms),
            relink_settle: Duration::from_millis(cfg.sync.relink_settle_ms),
            file_poll: PollPolicy::new(cfg.poll.file_interval_ms, cfg.poll.file_max_attempts),
        };

        Ok(Self {
            run_poll: PollPolicy::new(cfg.poll.run_interval_ms, cfg.poll.run_max_attempts),
            auth,
            openai,
            sheets: Arc::new(sheets),
            mailer,
            sync: Arc::new(sync),
            cfg: Arc::new(cfg),
        })
    }

    fn openai(&self) -> Result<&OpenAiClient, UpstreamError> {
        self.openai.as_deref().ok_or(UpstreamError::MissingApiKey)
    }

    fn check_token(&self, envelope: &RequestEnvelope) -> Result<(), ResponseEnvelope> {
        let Some(token) = envelope.header(APIKEY_HEADER) else {
            return Err(failure(401, "401", "Missing API key"));
        };
        if !self.auth.authorize(token, Utc::now()) {
            warn!("rejected request with invalid api key");
            return Err(failure(403, "403", "Invalid API key"));
        }
        Ok(())
    }

    async fn handle_assistant_query(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        if let Err(rejected) = self.check_token(&envelope) {
            return rejected;
        }
        let req: AssistantQueryRequest = match parse_body(&envelope.body) {
            Ok(req) => req,
            Err(rejected) => return rejected,
        };
        let (Some(asst), Some(query)) = (non_empty(&req.asst), non_empty(&req.query)) else {
            return failure(400, "400", "Missing required parameters: asst, query");
        };

        let result = match self.openai() {
            Ok(client) => client.ask_assistant(asst, query, self.run_poll).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(reply) => {
                info!(assistant_id = asst, "assistant replied");
                success(reply)
            }
            Err(e) => {
                warn!(assistant_id = asst, error = %e, "assistant query failed");
                match e {
                    UpstreamError::Status { code, message, .. } => failure(
                        500,
                        code.as_deref().unwrap_or(RETURN_CODE_INTERNAL),
                        message,
                    ),
                    other => failure(500, RETURN_CODE_INTERNAL, other.to_string()),
                }
            }
        }
    }

    async fn handle_completion(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        let req: CompletionRequest = match parse_body(&envelope.body) {
            Ok(req) => req,
            Err(rejected) => return rejected,
        };
        let (Some(model), Some(sys_prompt), Some(prompt)) = (
            non_empty(&req.model),
            non_empty(&req.sys_prompt),
            non_empty(&req.prompt),
        ) else {
            return failure(400, "400", "Missing required parameters: model, sys_prompt, prompt");
        };

        let result = match self.openai() {
            Ok(client) => client.complete(sys_prompt, prompt, model).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(content) => success(content),
            Err(UpstreamError::Status {
                status,
                code,
                message,
            }) => {
                warn!(model, status, "completion rejected upstream");
                failure(status, code.as_deref().unwrap_or("unknown_error"), message)
            }
            Err(e) => {
                warn!(model, error = %e, "completion failed");
                failure(500, RETURN_CODE_INTERNAL, format!("Error: {e}"))
            }
        }
    }

    async fn handle_knowledge_sync(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        let req: KnowledgeSyncRequest = match parse_body(&envelope.body) {
            Ok(req) => req,
            Err(rejected) => return rejected,
        };
        let (Some(assistant_id), Some(vector_store_id)) =
            (non_empty(&req.assistant_id), non_empty(&req.vector_store_id))
        else {
            return failure(
                400,
                "400",
                "Missing required parameters: assistant_id, vector_store_id",
            );
        };
        let Some(sheet_url) =
            non_empty(&req.sheet_url).or(non_empty(&self.cfg.sheets.default_sheet_url))
        else {
            return failure(400, "400", "Missing required parameters: sheet_url");
        };
        let job = SyncJob {
            assistant_id: assistant_id.to_string(),
            vector_store_id: vector_store_id.to_string(),
            sheet_name: non_empty(&req.sheet_name)
                .unwrap_or(DEFAULT_SHEET_NAME)
                .to_string(),
            sheet_url: sheet_url.to_string(),
        };

        let client = match self.openai() {
            Ok(client) => client,
            Err(e) => return failure(500, RETURN_CODE_FAILURE, e.to_string()),
        };
        match run_sync(client, &self.sheets, &self.sync, &job).await {
            Ok(report) => {
                info!(
                    vector_store_id = %report.vector_store_id,
                    file_count = report.file_count,
                    "knowledge sync finished"
                );
                success(serde_json::to_value(report).unwrap_or(Value::Null))
            }
            Err(e) => {
                warn!(vector_store_id = %job.vector_store_id, error = %e, "knowledge sync failed");
                failure(500, RETURN_CODE_FAILURE, e.to_string())
            }
        }
    }

    async fn handle_report_mail(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        let req: MailReportRequest = match parse_body(&envelope.body) {
            Ok(req) => req,
            Err(rejected) => return rejected,
        };
        let (Some(records), Some(receiver)) = (req.data.as_ref(), non_empty(&req.receiver)) else {
            return failure(400, "400", "Missing required parameters: data, receiver");
        };
        let (Some(sender), Some(password)) = (
            non_empty(&self.cfg.mail.sender),
            non_empty(&self.cfg.mail.password),
        ) else {
            return failure(500, RETURN_CODE_FAILURE, "Missing sender email credentials");
        };

        let credentials = MailCredentials {
            sender: sender.to_string(),
            password: password.to_string(),
        };
        let mail = OutgoingMail::from_report(receiver, render_report(records));
        match self.mailer.send(&credentials, &mail).await {
            Ok(()) => success(format!(
                "Successfully sent an email to {receiver} containing {} issues.",
                records.len()
            )),
            Err(e) => {
                warn!(receiver, error = %e, "report mail failed");
                failure(500, RETURN_CODE_FAILURE, format!("Failed to send email: {e}"))
            }
        }
    }

    async fn handle_knowledge_rows(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        let req: KnowledgeRowsRequest = match parse_body(&envelope.body) {
            Ok(req) => req,
            Err(rejected) => return rejected,
        };
        let Some(rows) = req.datas else {
            return failure(400, "400", "Missing required parameters: datas");
        };
        let Some(sheet_url) = non_empty(&self.cfg.sheets.knowledge_sheet_url) else {
            return failure(500, RETURN_CODE_FAILURE, "sheets.knowledge_sheet_url is not configured");
        };

        let mut added = 0usize;
        for row in &rows {
            let Some(append) = layout_knowledge_row(row) else {
                warn!(platform = %row.platform, "no knowledge sheet for platform; row skipped");
                continue;
            };
            if let Err(e) = self
                .sheets
                .append_row(sheet_url, append.worksheet, &append.cells)
                .await
            {
                warn!(worksheet = append.worksheet, error = %e, "append knowledge row failed");
                return failure(500, RETURN_CODE_FAILURE, e.to_string());
            }
            added += 1;
        }
        info!(added, received = rows.len(), "knowledge rows appended");
        success(format!("add {added} items"))
    }
}

/// Serializes an envelope as the HTTP response: status mirrors `statusCode`
/// and the envelope headers are copied onto the response.
struct EnvelopeReply(ResponseEnvelope);

impl IntoResponse for EnvelopeReply {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let headers = self.0.headers.clone();
        let mut response = (status, Json(self.0)).into_response();
        for (name, value) in headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn assistant_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RequestEnvelope>, JsonRejection>,
) -> EnvelopeReply {
    match envelope_from(&headers, payload) {
        Ok(envelope) => EnvelopeReply(state.handle_assistant_query(envelope).await),
        Err(rejected) => EnvelopeReply(rejected),
    }
}

async fn completion(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RequestEnvelope>, JsonRejection>,
) -> EnvelopeReply {
    match envelope_from(&headers, payload) {
        Ok(envelope) => EnvelopeReply(state.handle_completion(envelope).await),
        Err(rejected) => EnvelopeReply(rejected),
    }
}

async fn knowledge_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RequestEnvelope>, JsonRejection>,
) -> EnvelopeReply {
    match envelope_from(&headers, payload) {
        Ok(envelope) => EnvelopeReply(state.handle_knowledge_sync(envelope).await),
        Err(rejected) => EnvelopeReply(rejected),
    }
}

async fn report_mail(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RequestEnvelope>, JsonRejection>,
) -> EnvelopeReply {
    match envelope_from(&headers, payload) {
        Ok(envelope) => EnvelopeReply(state.handle_report_mail(envelope).await),
        Err(rejected) => EnvelopeReply(rejected),
    }
}

async fn knowledge_rows(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RequestEnvelope>, JsonRejection>,
) -> EnvelopeReply {
    match envelope_from(&headers, payload) {
        Ok(envelope) => EnvelopeReply(state.handle_knowledge_rows(envelope).await),
        Err(rejected) => EnvelopeReply(rejected),
    }
}

/// Decode the inbound envelope and fold HTTP headers underneath the envelope's
/// own headers (envelope values win).
fn envelope_from(
    headers: &HeaderMap,
    payload: Result<Json<RequestEnvelope>, JsonRejection>,
) -> Result<RequestEnvelope, ResponseEnvelope> {
    let Json(mut envelope) =
        payload.map_err(|e| failure(400, "400", format!("Invalid request body: {e}")))?;
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        if envelope.header(name.as_str()).is_none() {
            envelope
                .headers
                .insert(name.as_str().to_string(), value.to_string());
        }
    }
    Ok(envelope)
}

/// Handler bodies arrive as an object, as a JSON-encoded string, or not at all.
fn parse_body<T: DeserializeOwned + Default>(body: &Value) -> Result<T, ResponseEnvelope> {
    let parsed = match body {
        Value::Null => return Ok(T::default()),
        Value::String(raw) if raw.trim().is_empty() => return Ok(T::default()),
        Value::String(raw) => serde_json::from_str(raw),
        other => serde_json::from_value(other.clone()),
    };
    parsed.map_err(|e| failure(400, "400", format!("Invalid request body: {e}")))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_body_accepts_encoded_string() {
        let body = Value::String(r#"{"asst": "asst_1", "query": "hi"}"#.to_string());
        let req: AssistantQueryRequest = parse_body(&body).unwrap();
        assert_eq!(req.asst.as_deref(), Some("asst_1"));
        assert_eq!(req.query.as_deref(), Some("hi"));
    }

    #[test]
    fn parse_body_treats_missing_body_as_empty() {
        let req: CompletionRequest = parse_body(&Value::Null).unwrap();
        assert!(req.model.is_none());
    }

    #[test]
    fn parse_body_rejects_wrong_shape() {
        let body = json!({"data": "not-a-list", "receiver": "ops@example.com"});
        let rejected = parse_body::<MailReportRequest>(&body).unwrap_err();
        assert_eq!(rejected.status_code, 400);
    }

    #[test]
    fn envelope_headers_win_over_http_headers() {
        let mut http = HeaderMap::new();
        http.insert("apikey", HeaderValue::from_static("from-http"));
        http.insert("x-trace", HeaderValue::from_static("t1"));
        let envelope = RequestEnvelope::new(Value::Null).with_header("ApiKey", "from-envelope");
        let merged = envelope_from(&http, Ok(Json(envelope))).unwrap();
        assert_eq!(merged.header("apikey"), Some("from-envelope"));
        assert_eq!(merged.header("X-Trace"), Some("t1"));
    }

    #[test]
    fn non_empty_rejects_blank_values() {
        assert_eq!(non_empty(&Some("  ".to_string())), None);
        assert_eq!(non_empty(&Some(" a ".to_string())), Some(" a "));
        assert_eq!(non_empty(&None), None);
    }
}
