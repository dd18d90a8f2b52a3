use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use storeai_contracts::{KnowledgeSyncReport, VectorStoreFileStatus};
use storeai_kernel::poll::failure_reason;
use storeai_kernel::staging::{
    pick_latest, platform_for_sheet, render_sheet, staged_file_name, superseded_exports,
};
use storeai_kernel::{PollOutcome, PollPolicy};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::openai::{OpenAiClient, UpstreamError};
use crate::sheets::{SheetsClient, SheetsError};

/// Every failure of the export / delete / upload sequence.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No data found in sheet: {0}")]
    EmptySheet(String),
    #[error("spreadsheet: {0}")]
    Sheets(#[from] SheetsError),
    #[error("upstream: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("staging I/O at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("vector store file failed: {0}")]
    FileFailed(String),
    #[error("Some files were not deleted ({0} remaining)")]
    NotAllDeleted(usize),
    #[error("No files found to upload for platform {0}")]
    NoStagedFile(String),
    #[error("vector store file {file_id} ended without completing: {reason}")]
    ProcessingFailed { file_id: String, reason: String },
    #[error("vector store file {file_id} still processing after {attempts} attempts")]
    ProcessingTimedOut { file_id: String, attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub staging_dir: PathBuf,
    pub timezone: Tz,
    pub delete_settle: Duration,
    pub relink_settle: Duration,
    pub file_poll: PollPolicy,
}

#[derive(Debug, Clone)]
pub struct SyncJob {
    pub assistant_id: String,
    pub vector_store_id: String,
    pub sheet_name: String,
    pub sheet_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub file_name: String,
    pub file_id: String,
    pub file_count: usize,
}

/// Export the worksheet, empty the vector store, then upload the newest
/// staged export for the sheet's platform and relink the assistant.
pub async fn run_sync(
    openai: &OpenAiClient,
    sheets: &SheetsClient,
    settings: &SyncSettings,
    job: &SyncJob,
) -> Result<KnowledgeSyncReport, SyncError> {
    let platform = platform_for_sheet(&job.sheet_name);
    let stamp = Utc::now()
        .with_timezone(&settings.timezone)
        .format("%Y-%m-%d-%H-%M-%S")
        .to_string();
    info!(
        platform,
        sheet_name = %job.sheet_name,
        vector_store_id = %job.vector_store_id,
        "knowledge sync started"
    );

    export_sheet(
        sheets,
        &job.sheet_url,
        &job.sheet_name,
        &settings.staging_dir,
        platform,
        &stamp,
    )
    .await?;
    delete_all(openai, &job.vector_store_id, settings.delete_settle).await?;
    let upload = upload_latest(
        openai,
        &settings.staging_dir,
        platform,
        &job.vector_store_id,
        &job.assistant_id,
        settings.file_poll,
        settings.relink_settle,
    )
    .await?;

    Ok(KnowledgeSyncReport {
        message: "Successfully processed Google Sheet and updated Vector Store".to_string(),
        platform: platform.to_string(),
        sheet_name: job.sheet_name.clone(),
        vector_store_id: job.vector_store_id.clone(),
        assistant_id: job.assistant_id.clone(),
        timestamp: stamp,
        file_id: upload.file_id,
        file_count: upload.file_count,
    })
}

/// Write the worksheet to `<staging_dir>/<platform>_sheet_data_<stamp>.txt`.
pub async fn export_sheet(
    sheets: &SheetsClient,
    sheet_url: &str,
    sheet_name: &str,
    staging_dir: &Path,
    platform: &str,
    stamp: &str,
) -> Result<PathBuf, SyncError> {
    let rows = sheets.read_values(sheet_url, sheet_name).await?;
    if rows.is_empty() {
        return Err(SyncError::EmptySheet(sheet_name.to_string()));
    }

    tokio::fs::create_dir_all(staging_dir)
        .await
        .map_err(|source| SyncError::Io {
            path: staging_dir.to_path_buf(),
            source,
        })?;
    let path = staging_dir.join(staged_file_name(platform, stamp));
    tokio::fs::write(&path, render_sheet(&rows))
        .await
        .map_err(|source| SyncError::Io {
            path: path.clone(),
            source,
        })?;
    info!(path = %path.display(), rows = rows.len(), "worksheet staged");
    Ok(path)
}

/// Remove every file from the vector store and verify the store is empty.
/// Returns how many files were listed for deletion.
pub async fn delete_all(
    openai: &OpenAiClient,
    vector_store_id: &str,
    settle: Duration,
) -> Result<usize, SyncError> {
    let files = openai.list_vector_store_files(vector_store_id).await?;
    if files.is_empty() {
        info!(vector_store_id, "vector store already empty");
        return Ok(0);
    }
    info!(vector_store_id, count = files.len(), "deleting vector store files");

    for file in &files {
        match openai
            .delete_vector_store_file(vector_store_id, &file.id)
            .await
        {
            Ok(true) => info!(file_id = %file.id, "deleted vector store file"),
            Ok(false) => warn!(file_id = %file.id, "vector store refused deletion"),
            Err(e) => warn!(file_id = %file.id, error = %e, "deleting vector store file failed"),
        }
    }
    if settle > Duration::ZERO {
        sleep(settle).await;
    }

    let remaining = openai.list_vector_store_files(vector_store_id).await?;
    if let Some(failed) = remaining
        .iter()
        .find(|f| f.status == VectorStoreFileStatus::Failed)
    {
        return Err(SyncError::FileFailed(failure_reason(
            failed.last_error.as_ref(),
            "failed",
        )));
    }
    if !remaining.is_empty() {
        return Err(SyncError::NotAllDeleted(remaining.len()));
    }
    info!(vector_store_id, "vector store emptied");
    Ok(files.len())
}

/// Upload the newest staged export for `platform`, attach it to the vector
/// store, wait for processing, and relink the assistant's file search.
/// Older exports of the platform are removed once the upload is in place.
pub async fn upload_latest(
    openai: &OpenAiClient,
    staging_dir: &Path,
    platform: &str,
    vector_store_id: &str,
    assistant_id: &str,
    poll: PollPolicy,
    settle: Duration,
) -> Result<UploadReport, SyncError> {
    let names = staged_file_names(staging_dir).await?;
    let file_name = pick_latest(names.iter().map(String::as_str), platform)
        .ok_or_else(|| SyncError::NoStagedFile(platform.to_string()))?
        .to_string();
    let path = staging_dir.join(&file_name);

    let file_id = openai.upload_file(&path).await?;
    info!(%file_id, %file_name, "uploaded staged file");
    openai.attach_file(vector_store_id, &file_id).await?;

    match openai
        .poll_vector_store_file(vector_store_id, &file_id, poll)
        .await?
    {
        PollOutcome::Completed => {}
        PollOutcome::Failed(reason) => {
            return Err(SyncError::ProcessingFailed { file_id, reason })
        }
        PollOutcome::TimedOut { attempts } => {
            return Err(SyncError::ProcessingTimedOut { file_id, attempts })
        }
    }

    openai.relink_assistant(assistant_id, vector_store_id).await?;
    if settle > Duration::ZERO {
        sleep(settle).await;
    }

    let file_count = openai.list_vector_store_files(vector_store_id).await?.len();
    info!(vector_store_id, file_count, "upload finished");

    for stale in superseded_exports(names.iter().map(String::as_str), platform, &file_name) {
        let stale_path = staging_dir.join(stale);
        match tokio::fs::remove_file(&stale_path).await {
            Ok(()) => info!(path = %stale_path.display(), "removed superseded export"),
            Err(e) => warn!(
                path = %stale_path.display(),
                error = %e,
                "removing superseded export failed"
            ),
        }
    }
    Ok(UploadReport {
        file_name,
        file_id,
        file_count,
    })
}

async fn staged_file_names(staging_dir: &Path) -> Result<Vec<String>, SyncError> {
    let io_err = |source| SyncError::Io {
        path: staging_dir.to_path_buf(),
        source,
    };
    tokio::fs::create_dir_all(staging_dir).await.map_err(io_err)?;
    let mut entries = tokio::fs::read_dir(staging_dir).await.map_err(io_err)?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        if entry.file_type().await.map_err(io_err)?.is_file() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}
