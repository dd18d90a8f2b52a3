use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use storeai_triage::{load_feedback, select_rows, TriageRunner};
use tracing::info;

/// Feedback-triage handlers and the offline triage driver.
#[derive(Parser)]
#[command(name = "storeai", version)]
struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the handler server.
    Serve {
        #[arg(long, default_value = "./config/storeai.yaml")]
        config: String,
    },
    /// Triage exported feedback through the running handlers.
    Triage {
        #[arg(long, default_value = "./config/storeai.yaml")]
        config: String,
        /// JSON array of feedback rows.
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn init_tracing(format: &LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("storeai=info"));
    match format {
        LogFormat::Text => fmt().with_env_filter(env_filter).with_target(false).init(),
        LogFormat::Json => fmt().json().with_env_filter(env_filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_format);

    match cli.command {
        Command::Serve { config } => {
            let cfg = storeai_config::load_and_validate(&config)
                .with_context(|| format!("failed to load config {config}"))?;
            storeai_server::serve(cfg)
                .await
                .map_err(|e| anyhow!("server exited with error: {e}"))
        }
        Command::Triage {
            config,
            input,
            skip,
            limit,
        } => {
            let cfg = storeai_config::load_and_validate(&config)
                .with_context(|| format!("failed to load config {config}"))?;
            let rows = load_feedback(&input)?;
            let selected = select_rows(&rows, skip, limit);
            info!(total = rows.len(), selected = selected.len(), "feedback loaded");

            let runner = TriageRunner::from_config(&cfg)?;
            let summary = runner.run(selected, skip).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}
