use chrono::Utc;
use storeai_config::{Config, PlatformRoute};
use storeai_contracts::{FeedbackRow, KnowledgeRow, TriageRecord};
use storeai_kernel::model_output::{count_verdicts, parse_conflict, parse_string_list};
use tracing::{info, warn};

use crate::client::HandlerClient;
use crate::prompts;
use crate::{TriageError, TriageSummary};

/// What happened to one feedback row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// The knowledge base already answers the comment.
    Consistent,
    Recorded(TriageRecord),
    Skipped(String),
}

#[derive(Debug, Clone)]
pub struct TriageSettings {
    pub receiver: Option<String>,
    pub classifier_model: String,
    pub reformulate_model: String,
    pub reformulation_count: usize,
    pub sheet_url: Option<String>,
    pub platforms: std::collections::BTreeMap<String, PlatformRoute>,
}

impl TriageSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            receiver: cfg.triage.receiver.clone().filter(|r| !r.trim().is_empty()),
            classifier_model: cfg.triage.classifier_model.clone(),
            reformulate_model: cfg.triage.reformulate_model.clone(),
            reformulation_count: cfg.triage.reformulation_count.max(1),
            sheet_url: cfg.sheets.knowledge_sheet_url.clone(),
            platforms: cfg.triage.platforms.clone(),
        }
    }
}

pub struct TriageRunner {
    client: HandlerClient,
    settings: TriageSettings,
}

impl TriageRunner {
    pub fn new(client: HandlerClient, settings: TriageSettings) -> Self {
        Self { client, settings }
    }

    pub fn from_config(cfg: &Config) -> Result<Self, TriageError> {
        let client = HandlerClient::new(&cfg.triage.handler_base_url, cfg.triage.timeout_ms)?;
        Ok(Self::new(client, TriageSettings::from_config(cfg)))
    }

    /// Triage every row, then mail the records whose reformulations did not
    /// all reproduce the user reply. `first_index` numbers the rows.
    pub async fn run(
        &self,
        rows: &[FeedbackRow],
        first_index: usize,
    ) -> Result<TriageSummary, TriageError> {
        let mut summary = TriageSummary::default();
        let mut records = Vec::new();

        for (offset, row) in rows.iter().enumerate() {
            let index = first_index + offset;
            summary.processed += 1;
            match self.process_row(index, row).await {
                RowOutcome::Consistent => summary.consistent += 1,
                RowOutcome::Recorded(record) => records.push(record),
                RowOutcome::Skipped(reason) => {
                    warn!(index, %reason, "row skipped");
                    summary.skipped += 1;
                }
            }
        }

        let target = self.settings.reformulation_count;
        let (exportable, issues): (Vec<TriageRecord>, Vec<TriageRecord>) =
            records.into_iter().partition(|r| r.yes_times == target);
        summary.exportable = exportable.iter().map(|r| r.original_index).collect();
        summary.issues = issues.len();
        info!(exportable = ?summary.exportable, "rows ready for export");

        if !issues.is_empty() {
            match &self.settings.receiver {
                Some(receiver) => {
                    let message = self.client.send_report(&issues, receiver).await?;
                    info!(%message, "issue report sent");
                    summary.mailed = true;
                }
                None => warn!(issues = issues.len(), "no receiver configured; report not sent"),
            }
        }
        Ok(summary)
    }

    pub async fn process_row(&self, index: usize, row: &FeedbackRow) -> RowOutcome {
        match self.try_process_row(index, row).await {
            Ok(outcome) => outcome,
            Err(e) => RowOutcome::Skipped(e.to_string()),
        }
    }

    async fn try_process_row(
        &self,
        index: usize,
        row: &FeedbackRow,
    ) -> Result<RowOutcome, TriageError> {
        let platform = row.platform.as_deref().unwrap_or_default().to_lowercase();
        let Some(route) = self.settings.platforms.get(&platform) else {
            return Ok(RowOutcome::Skipped(format!("unknown platform {platform:?}")));
        };
        let title = row.title.as_deref().unwrap_or_default();
        let comment = row.comment.as_deref().unwrap_or_default();
        let user_reply = row.user_reply.as_deref().unwrap_or_default();
        let original_comment = format!("{title}{comment}");

        let generated = self
            .client
            .ask_assistant(&route.assistant_id, &original_comment)
            .await?;
        info!(index, %platform, "production assistant replied");

        let classification = self
            .client
            .complete(
                &self.settings.classifier_model,
                prompts::CONFLICT_SYSTEM_PROMPT,
                &prompts::conflict_prompt(&original_comment, user_reply, &generated),
            )
            .await?;
        let (conflict, reason) = parse_conflict(&classification).map_err(TriageError::ModelOutput)?;
        info!(index, ?conflict, %reason, "reply classified");
        if conflict.is_consistent() {
            return Ok(RowOutcome::Consistent);
        }

        let knowledge = KnowledgeRow {
            id: row.review_id.clone(),
            title: title.to_string(),
            quest: comment.to_string(),
            response: user_reply.to_string(),
            platform: platform.clone(),
            datetime: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            rank: row.rating.clone(),
            appversion: row.app_version.clone(),
            brand: row.brand.clone(),
        };
        if let Err(e) = self.client.add_knowledge_rows(&[knowledge]).await {
            warn!(index, error = %e, "knowledge row not appended");
        }

        let report = self
            .client
            .sync_knowledge(
                &route.temp_assistant_id,
                &route.temp_vector_store_id,
                &route.temp_sheet_name,
                self.settings.sheet_url.as_deref(),
            )
            .await?;
        info!(index, file_count = report.file_count, "temporary knowledge store rebuilt");

        let count = self.settings.reformulation_count;
        let reformulated = self
            .client
            .complete(
                &self.settings.reformulate_model,
                &prompts::reformulate_system_prompt(count),
                &prompts::reformulate_prompt(count, &original_comment),
            )
            .await?;
        let reformulations = parse_string_list(&reformulated).map_err(TriageError::ModelOutput)?;

        let mut replies = Vec::with_capacity(reformulations.len());
        for (i, sentence) in reformulations.iter().enumerate() {
            match self
                .client
                .ask_assistant(&route.temp_assistant_id, sentence)
                .await
            {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    warn!(index, attempt = i + 1, error = %e, "temporary assistant failed");
                    replies.push(String::new());
                }
            }
        }

        let verdict_text = self
            .client
            .complete(
                &self.settings.classifier_model,
                &prompts::check_system_prompt(replies.len()),
                &prompts::check_prompt(&replies, user_reply),
            )
            .await?;
        let verdicts = parse_string_list(&verdict_text).map_err(TriageError::ModelOutput)?;
        let (yes_times, no_times) = count_verdicts(&verdicts);

        Ok(RowOutcome::Recorded(TriageRecord {
            original_index: index,
            title: title.to_string(),
            comment: comment.to_string(),
            platform: row.platform.clone().unwrap_or_default(),
            user_reply: user_reply.to_string(),
            reformulated_reply: replies,
            yes_no_list: verdicts,
            yes_times,
            no_times,
        }))
    }
}
