use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ReviewPaths {
    pub home_dir: PathBuf,
    pub worklog_home: PathBuf,
    pub sessions_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub priorities_file: Option<PathBuf>,
    pub token_file: PathBuf,
}

impl ReviewPaths {
    pub fn report_dir(&self, kind: &str) -> PathBuf {
        self.reports_dir.join(kind)
    }

    pub fn timeseries_file(&self) -> PathBuf {
        self.reports_dir.join("hourly").join("timeseries.jsonl")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.logs_dir.join("audit.log")
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_path(var: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(expand_tilde(v.trim())),
        _ => None,
    }
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    env_path(var).unwrap_or(fallback)
}

/// Expand a leading `~/` against the current home directory.
pub fn expand_tilde(raw: &str) -> PathBuf {
    if raw == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw));
    }
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

pub fn resolve_paths() -> Result<ReviewPaths> {
    let home = required_home_dir()?;
    let worklog_home = env_or_default_path("WORKLOG_HOME", home.join(".worklog-review"));

    let sessions_dir =
        env_or_default_path("WORKLOG_SESSIONS_DIR", home.join(".claude").join("projects"));
    let reports_dir = env_or_default_path("WORKLOG_REPORTS_DIR", worklog_home.join("reports"));
    let logs_dir = env_or_default_path("WORKLOG_LOGS_DIR", worklog_home.join("logs"));
    let priorities_file = env_path("WORKLOG_PRIORITIES_FILE");
    let token_file = env_or_default_path(
        "WORKLOG_TOKEN_FILE",
        home.join(".ssh").join("claude-oauth-token"),
    );

    Ok(ReviewPaths {
        home_dir: home,
        worklog_home,
        sessions_dir,
        reports_dir,
        logs_dir,
        priorities_file,
        token_file,
    })
}

/// Priority taxonomy text, or an empty string when none is configured.
pub fn load_taxonomy(path: Option<&Path>) -> Result<String> {
    let Some(path) = path else {
        return Ok(String::new());
    };
    if !path.is_file() {
        return Ok(String::new());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|err| anyhow::anyhow!("failed to read {}: {err}", path.display()))?;
    Ok(raw.trim().to_string())
}
