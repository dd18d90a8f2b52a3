use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(String),
    #[error("parse config failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub openai: OpenAi,
    #[serde(default)]
    pub poll: Poll,
    #[serde(default)]
    pub sync: KnowledgeSync,
    #[serde(default)]
    pub sheets: Sheets,
    #[serde(default)]
    pub mail: Mail,
    #[serde(default)]
    pub triage: Triage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub listen_addr: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auth {
    #[serde(default = "default_auth_mode")]
    pub mode: String,
    #[serde(default = "default_bypass_token")]
    pub bypass_token: Option<String>,
}

impl Default for Auth {
    fn default() -> Self {
        Self {
            mode: default_auth_mode(),
            bypass_token: default_bypass_token(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAi {
    #[serde(default = "default_openai_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for OpenAi {
    fn default() -> Self {
        Self {
            api_base: default_openai_api_base(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    #[serde(default = "default_run_interval_ms")]
    pub run_interval_ms: u64,
    #[serde(default = "default_run_max_attempts")]
    pub run_max_attempts: u32,
    #[serde(default = "default_file_interval_ms")]
    pub file_interval_ms: u64,
    #[serde(default = "default_file_max_attempts")]
    pub file_max_attempts: u32,
}

impl Default for Poll {
    fn default() -> Self {
        Self {
            run_interval_ms: default_run_interval_ms(),
            run_max_attempts: default_run_max_attempts(),
            file_interval_ms: default_file_interval_ms(),
            file_max_attempts: default_file_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSync {
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_delete_settle_ms")]
    pub delete_settle_ms: u64,
    #[serde(default = "default_relink_settle_ms")]
    pub relink_settle_ms: u64,
}

impl Default for KnowledgeSync {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            timezone: default_timezone(),
            delete_settle_ms: default_delete_settle_ms(),
            relink_settle_ms: default_relink_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sheets {
    #[serde(default = "default_sheets_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Spreadsheet read by the knowledge sync when a request names none.
    #[serde(default)]
    pub default_sheet_url: Option<String>,
    /// Spreadsheet the knowledge-row handler appends to.
    #[serde(default)]
    pub knowledge_sheet_url: Option<String>,
}

impl Default for Sheets {
    fn default() -> Self {
        Self {
            api_base: default_sheets_api_base(),
            access_token: None,
            default_sheet_url: None,
            knowledge_sheet_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mail {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for Mail {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            sender: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformRoute {
    pub assistant_id: String,
    pub temp_assistant_id: String,
    pub temp_vector_store_id: String,
    pub temp_sheet_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Triage {
    #[serde(default = "default_handler_base_url")]
    pub handler_base_url: String,
    #[serde(default)]
    pub receiver: Option<String>,
    #[serde(default = "default_classifier_model")]
    pub classifier_model: String,
    #[serde(default = "default_reformulate_model")]
    pub reformulate_model: String,
    #[serde(default = "default_reformulation_count")]
    pub reformulation_count: usize,
    #[serde(default = "default_triage_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformRoute>,
}

impl Config {
    /// Upper bound of the time a single handler call spends polling and
    /// settling, in milliseconds.
    pub fn handler_poll_budget_ms(&self) -> u64 {
        let run = self
            .poll
            .run_interval_ms
            .saturating_mul(u64::from(self.poll.run_max_attempts));
        let sync = self
            .poll
            .file_interval_ms
            .saturating_mul(u64::from(self.poll.file_max_attempts))
            .saturating_add(self.sync.delete_settle_ms)
            .saturating_add(self.sync.relink_settle_ms);
        run.max(sync)
    }
}

impl Default for Triage {
    fn default() -> Self {
        Self {
            handler_base_url: default_handler_base_url(),
            receiver: None,
            classifier_model: default_classifier_model(),
            reformulate_model: default_reformulate_model(),
            reformulation_count: default_reformulation_count(),
            timeout_ms: default_triage_timeout_ms(),
            platforms: BTreeMap::new(),
        }
    }
}

fn default_auth_mode() -> String {
    "rotating_token".to_string()
}

fn default_bypass_token() -> Option<String> {
    Some("testtt".to_string())
}

fn default_openai_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout_ms() -> u64 {
    120_000
}

/// Outlasts the default sync: 300 file polls of 1 s plus both settles.
fn default_triage_timeout_ms() -> u64 {
    600_000
}

fn default_run_interval_ms() -> u64 {
    500
}

fn default_run_max_attempts() -> u32 {
    240
}

fn default_file_interval_ms() -> u64 {
    1_000
}

fn default_file_max_attempts() -> u32 {
    300
}

fn default_staging_dir() -> String {
    "/tmp/history".to_string()
}

fn default_timezone() -> String {
    "Asia/Taipei".to_string()
}

fn default_delete_settle_ms() -> u64 {
    5_000
}

fn default_relink_settle_ms() -> u64 {
    4_000
}

fn default_sheets_api_base() -> String {
    "https://sheets.googleapis.com".to_string()
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_handler_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_classifier_model() -> String {
    "o3-mini".to_string()
}

fn default_reformulate_model() -> String {
    "gpt-4o".to_string()
}

fn default_reformulation_count() -> usize {
    5
}

pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config_text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&config_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance = serde_json::to_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(&instance)?;

    let mut cfg: Config =
        serde_json::from_value(instance).map_err(|e| ConfigError::Parse(e.to_string()))?;
    apply_env_overrides(&mut cfg, |name| std::env::var(name).ok());
    validate_runtime_support(&cfg)?;
    Ok(cfg)
}

/// Secrets and deployment-specific URLs come from the process environment
/// and take precedence over the file.
pub fn apply_env_overrides<F>(cfg: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty("OPENAI_API_KEY") {
        cfg.openai.api_key = Some(v);
    }
    if let Some(v) = non_empty("GOOGLE_ACCESS_TOKEN") {
        cfg.sheets.access_token = Some(v);
    }
    if let Some(v) = non_empty("GOOGLE_URL") {
        cfg.sheets.default_sheet_url = Some(v);
    }
    if let Some(v) = non_empty("SENDER_EMAIL") {
        cfg.mail.sender = Some(v);
    }
    if let Some(v) = non_empty("PASSWORD") {
        cfg.mail.password = Some(v);
    }
}

fn validate_against_schema(instance: &serde_json::Value) -> Result<(), ConfigError> {
    let schema_path = [
        std::path::PathBuf::from("config/config.schema.json"),
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join("config/config.schema.json"),
    ]
    .into_iter()
    .find(|p| p.exists())
    .ok_or_else(|| {
        ConfigError::SchemaLoad(
            "config schema not found at config/config.schema.json or workspace config path"
                .to_string(),
        )
    })?;

    let schema_text =
        std::fs::read_to_string(schema_path).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&schema_text).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    if let Err(first) = validator.validate(instance) {
        return Err(ConfigError::SchemaValidation(first.to_string()));
    }
    Ok(())
}

pub fn validate_runtime_support(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.auth.mode != "rotating_token" && cfg.auth.mode != "none" {
        return Err(ConfigError::UnsupportedConfig(format!(
            "auth.mode={} is not implemented; supported: rotating_token, none",
            cfg.auth.mode
        )));
    }
    if cfg
        .auth
        .bypass_token
        .as_ref()
        .map(|v| v.trim().is_empty())
        .unwrap_or(false)
    {
        return Err(ConfigError::UnsupportedConfig(
            "auth.bypass_token must not be empty; omit it or set it to null".to_string(),
        ));
    }
    if cfg.openai.api_base.trim().is_empty() {
        return Err(ConfigError::UnsupportedConfig(
            "openai.api_base is required".to_string(),
        ));
    }
    if cfg.poll.run_max_attempts == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "poll.run_max_attempts must be >= 1".to_string(),
        ));
    }
    if cfg.poll.file_max_attempts == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "poll.file_max_attempts must be >= 1".to_string(),
        ));
    }
    if cfg.sync.staging_dir.trim().is_empty() {
        return Err(ConfigError::UnsupportedConfig(
            "sync.staging_dir is required".to_string(),
        ));
    }
    if cfg.triage.timeout_ms <= cfg.handler_poll_budget_ms() {
        return Err(ConfigError::UnsupportedConfig(format!(
            "triage.timeout_ms={} must exceed the handler poll budget of {} ms",
            cfg.triage.timeout_ms,
            cfg.handler_poll_budget_ms()
        )));
    }
    if cfg.triage.reformulation_count == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "triage.reformulation_count must be >= 1".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("storeai-config-test-")
            .suffix(".yaml")
            .tempfile()
            .expect("create temp config");
        file.write_all(contents.as_bytes())
            .expect("write temp config");
        file
    }

    fn base_yaml() -> String {
        r#"
server:
  listen_addr: "127.0.0.1:0"

auth:
  mode: "rotating_token"

openai:
  api_base: "https://api.openai.com/v1"

poll:
  run_interval_ms: 500
  run_max_attempts: 10

sync:
  staging_dir: "/tmp/history"
  delete_settle_ms: 0
  relink_settle_ms: 0

triage:
  receiver: "ops@example.com"
  platforms:
    ios:
      assistant_id: "asst_ios"
      temp_assistant_id: "asst_ios_temp"
      temp_vector_store_id: "vs_ios_temp"
      temp_sheet_name: "Temp_IOS_KM"
"#
        .to_string()
    }

    fn load(contents: &str) -> Result<Config, ConfigError> {
        let file = write_temp_config(contents);
        load_and_validate(&file.path().to_string_lossy())
    }

    #[test]
    fn loads_base_config_with_defaults() {
        let cfg = load(&base_yaml()).expect("base config should load");
        assert_eq!(cfg.poll.run_max_attempts, 10);
        assert_eq!(cfg.poll.file_interval_ms, 1_000);
        assert_eq!(cfg.sync.timezone, "Asia/Taipei");
        assert_eq!(cfg.auth.bypass_token.as_deref(), Some("testtt"));
        assert_eq!(cfg.triage.reformulation_count, 5);
        assert_eq!(cfg.triage.platforms["ios"].temp_sheet_name, "Temp_IOS_KM");
    }

    #[test]
    fn rejects_zero_poll_attempts() {
        let err = load(&base_yaml().replace("run_max_attempts: 10", "run_max_attempts: 0"))
            .expect_err("expected unsupported config");
        assert!(matches!(
            err,
            ConfigError::SchemaValidation(_) | ConfigError::UnsupportedConfig(_)
        ));
    }

    #[test]
    fn rejects_unknown_auth_mode() {
        let err = load(&base_yaml().replace("mode: \"rotating_token\"", "mode: \"oauth\""))
            .expect_err("expected unsupported config");
        assert!(matches!(
            err,
            ConfigError::SchemaValidation(_) | ConfigError::UnsupportedConfig(_)
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_and_validate("/nonexistent/storeai.yaml").expect_err("expected read error");
        assert!(matches!(err, ConfigError::Read(_)));
    }

    #[test]
    fn env_overrides_fill_secrets_and_skip_blank_values() {
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg, |name| match name {
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            "SENDER_EMAIL" => Some("bot@example.com".to_string()),
            "PASSWORD" => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(cfg.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.mail.sender.as_deref(), Some("bot@example.com"));
        assert_eq!(cfg.mail.password, None);
        assert_eq!(cfg.sheets.access_token, None);
    }

    #[test]
    fn triage_timeout_outlasts_default_poll_budget() {
        let cfg = load(&base_yaml()).expect("base config should load");
        assert_eq!(cfg.triage.timeout_ms, 600_000);
        assert!(cfg.triage.timeout_ms > cfg.handler_poll_budget_ms());

        let defaults = Config::default();
        assert_eq!(defaults.handler_poll_budget_ms(), 309_000);
        assert!(validate_runtime_support(&defaults).is_ok());
    }

    #[test]
    fn runtime_check_rejects_triage_timeout_inside_poll_budget() {
        let mut cfg = Config::default();
        cfg.triage.timeout_ms = 120_000;
        let err = validate_runtime_support(&cfg).expect_err("expected unsupported config");
        assert!(matches!(err, ConfigError::UnsupportedConfig(msg) if msg.contains("triage.timeout_ms")));
    }

    #[test]
    fn runtime_check_rejects_empty_bypass_token() {
        let mut cfg = Config::default();
        cfg.auth.bypass_token = Some(String::new());
        assert!(matches!(
            validate_runtime_support(&cfg),
            Err(ConfigError::UnsupportedConfig(_))
        ));
    }
}
