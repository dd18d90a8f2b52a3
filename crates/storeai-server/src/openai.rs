use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use storeai_contracts::{
    ApiErrorEnvelope, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, DeletionStatus,
    ListResponse, ObjectRef, Run, ThreadMessage, VectorStoreFile,
};
use storeai_kernel::{classify_file, classify_run, clean_reply, PollOutcome, PollPolicy, PollStep};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("{what} ended without completing: {reason}")]
    PollFailed { what: &'static str, reason: String },
    #[error("{what} still pending after {attempts} attempts")]
    PollTimedOut { what: &'static str, attempts: u32 },
    #[error("read {path} failed: {message}")]
    File { path: String, message: String },
}

/// Client for the chat-completion, assistant/thread/run and vector-store
/// endpoints of an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_base: String,
}

impl OpenAiClient {
    pub fn new(api_base: &str, api_key: &str, timeout_ms: u64) -> Result<Self, UpstreamError> {
        if api_key.trim().is_empty() {
            return Err(UpstreamError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key.trim())).map_err(|e| {
                UpstreamError::InvalidResponse(format!("invalid API key header: {e}"))
            })?,
        );
        headers.insert("OpenAI-Beta", HeaderValue::from_static("assistants=v2"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    // Conversation threads.

    pub async fn create_thread(&self) -> Result<String, UpstreamError> {
        let created: ObjectRef = send_json(self.client.post(self.url("threads")).json(&json!({})))
            .await?;
        require_id(created, "create thread")
    }

    pub async fn create_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<String, UpstreamError> {
        let created: ObjectRef = send_json(
            self.client
                .post(self.url(&format!("threads/{thread_id}/messages")))
                .json(&json!({"role": "user", "content": content})),
        )
        .await?;
        require_id(created, "create message")
    }

    pub async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<String, UpstreamError> {
        let created: ObjectRef = send_json(
            self.client
                .post(self.url(&format!("threads/{thread_id}/runs")))
                .json(&json!({"assistant_id": assistant_id})),
        )
        .await?;
        require_id(created, "create run")
    }

    pub async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, UpstreamError> {
        send_json(
            self.client
                .get(self.url(&format!("threads/{thread_id}/runs/{run_id}"))),
        )
        .await
    }

    pub async fn poll_run(
        &self,
        thread_id: &str,
        run_id: &str,
        policy: PollPolicy,
    ) -> Result<PollOutcome, UpstreamError> {
        poll_until(policy, "run", move || async move {
            let run = self.get_run(thread_id, run_id).await?;
            debug!(thread_id, run_id, status = run.status.as_str(), "polled run");
            Ok(classify_run(&run))
        })
        .await
    }

    /// Text of the newest message in the thread with annotations and markdown removed.
    pub async fn fetch_first_reply(&self, thread_id: &str) -> Result<String, UpstreamError> {
        let messages: ListResponse<ThreadMessage> = send_json(
            self.client
                .get(self.url(&format!("threads/{thread_id}/messages"))),
        )
        .await?;
        let text = messages
            .data
            .first()
            .and_then(|m| m.content.first())
            .and_then(|c| c.text.as_ref())
            .ok_or_else(|| {
                UpstreamError::InvalidResponse("thread has no text reply".to_string())
            })?;
        Ok(clean_reply(text))
    }

    /// One full question/answer round trip on a fresh thread. The thread is
    /// left behind on the remote side whether or not the call succeeds.
    pub async fn ask_assistant(
        &self,
        assistant_id: &str,
        query: &str,
        policy: PollPolicy,
    ) -> Result<String, UpstreamError> {
        let thread_id = self.create_thread().await?;
        self.create_message(&thread_id, query).await?;
        let run_id = self.create_run(&thread_id, assistant_id).await?;
        debug!(%thread_id, %run_id, assistant_id, "run started");

        match self.poll_run(&thread_id, &run_id, policy).await? {
            PollOutcome::Completed => {}
            PollOutcome::Failed(reason) => {
                return Err(UpstreamError::PollFailed { what: "run", reason })
            }
            PollOutcome::TimedOut { attempts } => {
                return Err(UpstreamError::PollTimedOut {
                    what: "run",
                    attempts,
                })
            }
        }

        self.fetch_first_reply(&thread_id).await
    }

    // Chat completion.

    /// Returns the first choice's content as-is; no markdown post-processing.
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &str,
    ) -> Result<String, UpstreamError> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)],
        };
        let response: ChatCompletionResponse =
            send_json(self.client.post(self.url("chat/completions")).json(&request)).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| UpstreamError::InvalidResponse("completion has no choices".to_string()))
    }

    // Vector stores and files.

    pub async fn list_vector_store_files(
        &self,
        vector_store_id: &str,
    ) -> Result<Vec<VectorStoreFile>, UpstreamError> {
        let list: ListResponse<VectorStoreFile> = send_json(
            self.client
                .get(self.url(&format!("vector_stores/{vector_store_id}/files"))),
        )
        .await?;
        Ok(list.data)
    }

    pub async fn delete_vector_store_file(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<bool, UpstreamError> {
        let status: DeletionStatus = send_json(
            self.client
                .delete(self.url(&format!("vector_stores/{vector_store_id}/files/{file_id}"))),
        )
        .await?;
        Ok(status.deleted)
    }

    pub async fn upload_file(&self, path: &Path) -> Result<String, UpstreamError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| UpstreamError::File {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.txt".to_string());
        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        let created: ObjectRef =
            send_json(self.client.post(self.url("files")).multipart(form)).await?;
        require_id(created, "upload file")
    }

    pub async fn attach_file(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<VectorStoreFile, UpstreamError> {
        send_json(
            self.client
                .post(self.url(&format!("vector_stores/{vector_store_id}/files")))
                .json(&json!({"file_id": file_id})),
        )
        .await
    }

    pub async fn get_vector_store_file(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<VectorStoreFile, UpstreamError> {
        send_json(
            self.client
                .get(self.url(&format!("vector_stores/{vector_store_id}/files/{file_id}"))),
        )
        .await
    }

    pub async fn poll_vector_store_file(
        &self,
        vector_store_id: &str,
        file_id: &str,
        policy: PollPolicy,
    ) -> Result<PollOutcome, UpstreamError> {
        poll_until(policy, "vector store file", move || async move {
            let file = self.get_vector_store_file(vector_store_id, file_id).await?;
            debug!(vector_store_id, file_id, status = ?file.status, "polled vector store file");
            Ok(classify_file(&file))
        })
        .await
    }

    /// Point the assistant's file-search tool at the given vector store.
    pub async fn relink_assistant(
        &self,
        assistant_id: &str,
        vector_store_id: &str,
    ) -> Result<(), UpstreamError> {
        let _: ObjectRef = send_json(
            self.client
                .post(self.url(&format!("assistants/{assistant_id}")))
                .json(&json!({
                    "tool_resources": {
                        "file_search": {"vector_store_ids": [vector_store_id]}
                    }
                })),
        )
        .await?;
        info!(assistant_id, vector_store_id, "assistant relinked");
        Ok(())
    }
}

async fn poll_until<F, Fut>(
    policy: PollPolicy,
    what: &'static str,
    mut observe: F,
) -> Result<PollOutcome, UpstreamError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStep, UpstreamError>>,
{
    for attempt in 1..=policy.max_attempts {
        match observe().await? {
            PollStep::Done => return Ok(PollOutcome::Completed),
            PollStep::Failed(reason) => return Ok(PollOutcome::Failed(reason)),
            PollStep::Pending => {}
        }
        if attempt < policy.max_attempts && policy.interval > Duration::ZERO {
            sleep(policy.interval).await;
        }
    }
    debug!(what, attempts = policy.max_attempts, "poll budget exhausted");
    Ok(PollOutcome::TimedOut {
        attempts: policy.max_attempts,
    })
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, UpstreamError> {
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(status_error(status.as_u16(), &text));
    }
    serde_json::from_str(&text)
        .map_err(|e| UpstreamError::InvalidResponse(format!("unexpected response body: {e}")))
}

/// Keep the remote's own error code and message when the body carries them.
fn status_error(status: u16, body: &str) -> UpstreamError {
    match serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error)
    {
        Some(detail) => UpstreamError::Status {
            status,
            code: detail.code,
            message: detail.message.unwrap_or_else(|| "Unknown error".to_string()),
        },
        None => UpstreamError::Status {
            status,
            code: None,
            message: if body.trim().is_empty() {
                "Unknown error".to_string()
            } else {
                body.chars().take(512).collect()
            },
        },
    }
}

fn require_id(created: ObjectRef, step: &str) -> Result<String, UpstreamError> {
    created
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| UpstreamError::InvalidResponse(format!("{step}: response has no id")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_extracts_remote_code_and_message() {
        let err = status_error(
            429,
            r#"{"error": {"code": "rate_limit_exceeded", "message": "Too many requests"}}"#,
        );
        match err {
            UpstreamError::Status {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 429);
                assert_eq!(code.as_deref(), Some("rate_limit_exceeded"));
                assert_eq!(message, "Too many requests");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn status_error_falls_back_to_raw_body() {
        match status_error(502, "bad gateway") {
            UpstreamError::Status { code, message, .. } => {
                assert_eq!(code, None);
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn client_requires_api_key() {
        assert!(matches!(
            OpenAiClient::new("https://api.openai.com/v1", "  ", 1000),
            Err(UpstreamError::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn poll_until_reports_timeout_after_budget() {
        let mut calls = 0u32;
        let outcome = poll_until(PollPolicy::new(0, 3), "test", || {
            calls += 1;
            async { Ok(PollStep::Pending) }
        })
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 3 });
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn poll_until_stops_on_failure() {
        let outcome = poll_until(PollPolicy::new(0, 10), "test", || async {
            Ok(PollStep::Failed("expired".to_string()))
        })
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::Failed("expired".to_string()));
    }
}
