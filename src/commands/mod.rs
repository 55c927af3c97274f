pub mod daily;
pub mod review;
pub mod sessions;
pub mod weekly;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::logging;
use crate::worklog::config::{ReviewConfig, load_config};
use crate::worklog::log_store::ScanOptions;
use crate::worklog::paths::{ReviewPaths, load_taxonomy, resolve_paths};

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
    /// Full report body, emitted instead of the detail lines with `--print`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
            payload: None,
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn attach<T: Serialize>(&mut self, payload: &T) -> Result<()> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(())
    }
}

/// Paths, validated config and taxonomy shared by every command.
pub struct Runtime {
    pub paths: ReviewPaths,
    pub config: ReviewConfig,
    pub taxonomy: String,
}

impl Runtime {
    pub fn load() -> Result<Self> {
        let paths = resolve_paths()?;
        let config = load_config(&paths)?;
        logging::init(&config.report.log_level);
        let taxonomy = load_taxonomy(paths.priorities_file.as_deref())?;
        Ok(Self {
            paths,
            config,
            taxonomy,
        })
    }

    pub fn scan_options(&self, min_turns: Option<usize>) -> ScanOptions {
        ScanOptions {
            min_turns: min_turns.unwrap_or(self.config.scan.min_turns),
            min_size_bytes: self.config.scan.min_size_bytes,
            subagent_marker: self.config.scan.subagent_marker.clone(),
        }
    }
}

/// Record degradation warnings as detail lines; they never fail a command.
pub fn note_warnings(report: &mut CommandReport, prefix: &str, warnings: &[String]) {
    report.detail(format!("{prefix}.warnings={}", warnings.len()));
    for warning in warnings {
        report.detail(format!("{prefix}.warning={warning}"));
    }
}
