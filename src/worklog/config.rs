use crate::error::ReviewError;
use crate::worklog::paths::ReviewPaths;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_CHUNK_BUDGET: usize = 20_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub min_turns: usize,
    pub min_size_bytes: u64,
    #[serde(default = "default_subagent_marker")]
    pub subagent_marker: String,
}

fn default_subagent_marker() -> String {
    "subagents".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_turns: 3,
            min_size_bytes: 5_000,
            subagent_marker: default_subagent_marker(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub chunk_budget_chars: usize,
    pub concurrency: usize,
    #[serde(default = "default_consolidate_min_items")]
    pub consolidate_min_items: usize,
    #[serde(default = "default_consolidate_top_projects")]
    pub consolidate_top_projects: usize,
}

fn default_consolidate_min_items() -> usize {
    5
}

fn default_consolidate_top_projects() -> usize {
    10
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_budget_chars: DEFAULT_CHUNK_BUDGET,
            concurrency: 5,
            consolidate_min_items: default_consolidate_min_items(),
            consolidate_top_projects: default_consolidate_top_projects(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub provider: String,
    pub classify_model: String,
    pub consolidate_model: String,
    pub classify_timeout_secs: u64,
    pub consolidate_timeout_secs: u64,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: "claude-cli".to_string(),
            classify_model: "haiku".to_string(),
            consolidate_model: "opus".to_string(),
            classify_timeout_secs: 120,
            consolidate_timeout_secs: 180,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub timezone: String,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default = "default_todo_filenames")]
    pub todo_filenames: Vec<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_todo_filenames() -> Vec<String> {
    vec![
        "todos.org".to_string(),
        "TODO.md".to_string(),
        "todo.md".to_string(),
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            projects: Vec::new(),
            todo_filenames: default_todo_filenames(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReviewConfig {
    pub scan: ScanConfig,
    pub pipeline: PipelineConfig,
    pub oracle: OracleConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialReviewConfig {
    scan: Option<ScanConfig>,
    pipeline: Option<PipelineConfig>,
    oracle: Option<OracleConfig>,
    report: Option<ReportConfig>,
}

impl ReviewConfig {
    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.report
            .timezone
            .trim()
            .parse::<chrono_tz::Tz>()
            .map_err(|err| anyhow!("invalid timezone `{}`: {err}", self.report.timezone))
    }
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_optional_string(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

fn env_or_csv(var: &str, fallback: &[String]) -> Vec<String> {
    match env::var(var) {
        Ok(v) => {
            let out = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect::<Vec<_>>();
            if out.is_empty() {
                fallback.to_vec()
            } else {
                out
            }
        }
        Err(_) => fallback.to_vec(),
    }
}

pub const KNOWN_PROVIDERS: [&str; 3] = ["claude-cli", "anthropic", "openai-compatible"];

fn validate(cfg: &ReviewConfig) -> Result<()> {
    let invalid = |msg: &str| -> Result<()> {
        Err(ReviewError::InvalidConfig(msg.to_string()).into())
    };

    if cfg.pipeline.chunk_budget_chars == 0 {
        return invalid("chunk budget must be >= 1 character");
    }
    if cfg.pipeline.concurrency == 0 {
        return invalid("pipeline concurrency must be >= 1");
    }
    if cfg.oracle.classify_timeout_secs == 0 || cfg.oracle.consolidate_timeout_secs == 0 {
        return invalid("oracle timeouts must be >= 1 second");
    }
    if !KNOWN_PROVIDERS.contains(&cfg.oracle.provider.as_str()) {
        return Err(ReviewError::InvalidConfig(format!(
            "unknown oracle provider `{}`; use one of {}",
            cfg.oracle.provider,
            KNOWN_PROVIDERS.join(", ")
        ))
        .into());
    }
    if cfg.oracle.classify_model.trim().is_empty() || cfg.oracle.consolidate_model.trim().is_empty()
    {
        return invalid("oracle model names cannot be empty");
    }
    cfg.timezone()
        .map_err(|err| ReviewError::InvalidConfig(format!("{err:#}")))?;
    Ok(())
}

fn resolve_config_path(paths: &ReviewPaths) -> PathBuf {
    if let Ok(custom) = env::var("WORKLOG_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    paths.worklog_home.join("worklog.toml")
}

fn merge_file_config(base: &mut ReviewConfig, raw: &str, origin: &str) -> Result<()> {
    let parsed: PartialReviewConfig = toml::from_str(raw)
        .map_err(|err| ReviewError::InvalidConfig(format!("failed to parse {origin}: {err}")))?;
    if let Some(scan) = parsed.scan {
        base.scan = scan;
    }
    if let Some(pipeline) = parsed.pipeline {
        base.pipeline = pipeline;
    }
    if let Some(oracle) = parsed.oracle {
        base.oracle = oracle;
    }
    if let Some(report) = parsed.report {
        base.report = report;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut ReviewConfig) {
    cfg.scan.min_turns = env_or_usize("WORKLOG_MIN_TURNS", cfg.scan.min_turns);
    cfg.scan.min_size_bytes = env_or_u64("WORKLOG_MIN_SIZE_BYTES", cfg.scan.min_size_bytes);
    cfg.pipeline.chunk_budget_chars =
        env_or_usize("WORKLOG_CHUNK_BUDGET", cfg.pipeline.chunk_budget_chars);
    cfg.pipeline.concurrency = env_or_usize("WORKLOG_CONCURRENCY", cfg.pipeline.concurrency);
    cfg.oracle.provider = env_or_string("WORKLOG_ORACLE_PROVIDER", &cfg.oracle.provider);
    cfg.oracle.classify_model =
        env_or_string("WORKLOG_CLASSIFY_MODEL", &cfg.oracle.classify_model);
    cfg.oracle.consolidate_model =
        env_or_string("WORKLOG_CONSOLIDATE_MODEL", &cfg.oracle.consolidate_model);
    cfg.oracle.classify_timeout_secs = env_or_u64(
        "WORKLOG_CLASSIFY_TIMEOUT_SECS",
        cfg.oracle.classify_timeout_secs,
    );
    cfg.oracle.consolidate_timeout_secs = env_or_u64(
        "WORKLOG_CONSOLIDATE_TIMEOUT_SECS",
        cfg.oracle.consolidate_timeout_secs,
    );
    cfg.oracle.base_url = env_or_optional_string("WORKLOG_BASE_URL", cfg.oracle.base_url.take());
    cfg.report.timezone = env_or_string("WORKLOG_TIMEZONE", &cfg.report.timezone);
    cfg.report.projects = env_or_csv("WORKLOG_PROJECTS", &cfg.report.projects);
    cfg.report.log_level = env_or_string("WORKLOG_LOG_LEVEL", &cfg.report.log_level);
}

pub fn load_config(paths: &ReviewPaths) -> Result<ReviewConfig> {
    let mut cfg = ReviewConfig::default();

    let path = resolve_config_path(paths);
    if path.exists() {
        let raw = fs::read_to_string(&path)
            .map_err(|err| anyhow!("failed to read {}: {err}", path.display()))?;
        merge_file_config(&mut cfg, &raw, &path.display().to_string())?;
    }

    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_CHUNK_BUDGET, ReviewConfig, merge_file_config, validate};

    #[test]
    fn defaults_are_valid() {
        let cfg = ReviewConfig::default();
        assert!(validate(&cfg).is_ok());
        assert_eq!(cfg.pipeline.chunk_budget_chars, DEFAULT_CHUNK_BUDGET);
        assert_eq!(cfg.pipeline.concurrency, 5);
        assert_eq!(cfg.scan.min_turns, 3);
        assert_eq!(cfg.scan.min_size_bytes, 5_000);
    }

    #[test]
    fn file_sections_replace_defaults() {
        let mut cfg = ReviewConfig::default();
        let raw = r#"
[pipeline]
chunk_budget_chars = 8000
concurrency = 2

[report]
timezone = "US/Pacific"
projects = ["~/code/billing"]
"#;
        merge_file_config(&mut cfg, raw, "inline").expect("merge");
        assert_eq!(cfg.pipeline.chunk_budget_chars, 8000);
        assert_eq!(cfg.pipeline.concurrency, 2);
        assert_eq!(cfg.pipeline.consolidate_min_items, 5);
        assert_eq!(cfg.report.timezone, "US/Pacific");
        assert_eq!(cfg.report.todo_filenames.len(), 3);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn malformed_file_is_rejected() {
        let mut cfg = ReviewConfig::default();
        let err = merge_file_config(&mut cfg, "[pipeline\n", "inline").expect_err("should fail");
        assert!(format!("{err:#}").contains("failed to parse inline"));
    }

    #[test]
    fn validation_rejects_zero_concurrency_and_unknown_provider() {
        let mut cfg = ReviewConfig::default();
        cfg.pipeline.concurrency = 0;
        assert!(validate(&cfg).is_err());

        let mut cfg = ReviewConfig::default();
        cfg.oracle.provider = "carrier-pigeon".to_string();
        let err = validate(&cfg).expect_err("unknown provider");
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[test]
    fn validation_rejects_bad_timezone() {
        let mut cfg = ReviewConfig::default();
        cfg.report.timezone = "Mars/Olympus".to_string();
        assert!(validate(&cfg).is_err());
    }
}
