//! Completion backends for classification and consolidation prompts.
//!
//! Every backend turns `(prompt, model, timeout)` into response text or an
//! [`OracleError`]. Callers own the fallback policy; nothing here retries.

use crate::error::{OracleError, ReviewError};
use crate::worklog::config::OracleConfig;
use crate::worklog::paths::ReviewPaths;
use crate::worklog::util::{CommandFailure, run_command_with_timeout, truncate_with_ellipsis};
use anyhow::Result;
use reqwest::blocking::Client;
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

const CLAUDE_TOKEN_ENV: &str = "CLAUDE_CODE_OAUTH_TOKEN";
const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const MAX_STDERR_CHARS: usize = 300;
const MAX_OUTPUT_TOKENS: u32 = 2048;

pub trait Oracle: Send + Sync {
    fn name(&self) -> &str;
    fn complete(&self, prompt: &str, model: &str, timeout: Duration)
    -> Result<String, OracleError>;
}

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn non_empty_text(raw: &str) -> Result<String, OracleError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(OracleError::EmptyOutput)
    } else {
        Ok(trimmed.to_string())
    }
}

/// `claude -p` as a subprocess.
pub struct ClaudeCliOracle {
    bin: Option<PathBuf>,
    token: Option<String>,
}

impl ClaudeCliOracle {
    pub fn new(bin: Option<PathBuf>, token: Option<String>) -> Self {
        Self { bin, token }
    }

    /// Binary from `WORKLOG_CLAUDE_BIN`, else `claude` on PATH. A missing
    /// binary is reported per call, not at construction.
    pub fn discover(token: Option<String>) -> Self {
        Self::new(resolve_claude_bin(), token)
    }
}

fn resolve_claude_bin() -> Option<PathBuf> {
    if let Some(raw) = env_non_empty("WORKLOG_CLAUDE_BIN") {
        let path = PathBuf::from(raw);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!(bin = %path.display(), "WORKLOG_CLAUDE_BIN does not exist; trying PATH");
    }
    which::which("claude").ok()
}

impl Oracle for ClaudeCliOracle {
    fn name(&self) -> &str {
        "claude-cli"
    }

    fn complete(
        &self,
        prompt: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<String, OracleError> {
        let Some(bin) = &self.bin else {
            return Err(OracleError::Unavailable(
                "claude binary not found in WORKLOG_CLAUDE_BIN or PATH".to_string(),
            ));
        };

        let mut cmd = Command::new(bin);
        cmd.arg("-p").arg("--model").arg(model).arg(prompt);
        if let Some(token) = &self.token {
            cmd.env(CLAUDE_TOKEN_ENV, token);
        }

        let output = run_command_with_timeout(&mut cmd, timeout).map_err(|err| match err {
            CommandFailure::TimedOut => OracleError::Timeout {
                secs: timeout.as_secs(),
            },
            CommandFailure::Io(err) => {
                OracleError::Process(format!("failed to run `{}`: {err}", bin.display()))
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OracleError::Process(format!(
                "exit {}: {}",
                output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                truncate_with_ellipsis(stderr.trim(), MAX_STDERR_CHARS)
            )));
        }
        non_empty_text(&String::from_utf8_lossy(&output.stdout))
    }
}

fn http_error(err: reqwest::Error, timeout: Duration) -> OracleError {
    if err.is_timeout() {
        OracleError::Timeout {
            secs: timeout.as_secs(),
        }
    } else {
        OracleError::Http(err.to_string())
    }
}

fn post_json(
    request: reqwest::blocking::RequestBuilder,
    payload: &Value,
    timeout: Duration,
) -> Result<Value, OracleError> {
    let response = request
        .timeout(timeout)
        .json(payload)
        .send()
        .map_err(|err| http_error(err, timeout))?;
    let status = response.status();
    if !status.is_success() {
        return Err(OracleError::Http(format!("status {status}")));
    }
    response.json().map_err(|err| http_error(err, timeout))
}

fn collect_text_parts(parts: &[Value]) -> Option<String> {
    let chunks = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>();
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join("\n"))
    }
}

pub fn extract_anthropic_text(json: &Value) -> Option<String> {
    let content = json.get("content").and_then(Value::as_array)?;
    collect_text_parts(content)
}

pub fn extract_openai_compatible_text(json: &Value) -> Option<String> {
    let first = json.get("choices").and_then(Value::as_array)?.first()?;
    match first.get("message")?.get("content")? {
        Value::String(s) => Some(s.to_string()),
        Value::Array(parts) => collect_text_parts(parts),
        _ => None,
    }
}

/// Anthropic Messages API.
pub struct AnthropicOracle {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicOracle {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
        }
    }
}

impl Oracle for AnthropicOracle {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn complete(
        &self,
        prompt: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<String, OracleError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let payload = serde_json::json!({
            "model": model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "temperature": 0.2,
            "messages": [
                {"role": "user", "content": prompt}
            ]
        });
        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01");
        let json = post_json(request, &payload, timeout)?;
        let text = extract_anthropic_text(&json).ok_or(OracleError::EmptyOutput)?;
        non_empty_text(&text)
    }
}

/// Any endpoint speaking the OpenAI chat-completions shape.
pub struct OpenAiCompatOracle {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatOracle {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        }
    }
}

impl Oracle for OpenAiCompatOracle {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn complete(
        &self,
        prompt: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<String, OracleError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let payload = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.2
        });
        let request = self.client.post(&url).bearer_auth(&self.api_key);
        let json = post_json(request, &payload, timeout)?;
        let text = extract_openai_compatible_text(&json).ok_or(OracleError::EmptyOutput)?;
        non_empty_text(&text)
    }
}

fn read_token_file(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    let token = raw.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn first_env(vars: &[&str]) -> Option<String> {
    vars.iter().find_map(|var| env_non_empty(var))
}

/// Build the configured backend with its credential resolved once.
pub fn build_oracle(cfg: &OracleConfig, paths: &ReviewPaths) -> Result<Box<dyn Oracle>> {
    match cfg.provider.as_str() {
        "claude-cli" => {
            let token = env_non_empty(CLAUDE_TOKEN_ENV).or_else(|| read_token_file(&paths.token_file));
            Ok(Box::new(ClaudeCliOracle::discover(token)))
        }
        "anthropic" => {
            let key = first_env(&["WORKLOG_API_KEY", "ANTHROPIC_API_KEY"]).ok_or_else(|| {
                ReviewError::InvalidConfig(
                    "anthropic provider needs WORKLOG_API_KEY or ANTHROPIC_API_KEY".to_string(),
                )
            })?;
            Ok(Box::new(AnthropicOracle::new(key, cfg.base_url.clone())))
        }
        "openai-compatible" => {
            let key = first_env(&["WORKLOG_API_KEY", "OPENAI_API_KEY"]).ok_or_else(|| {
                ReviewError::InvalidConfig(
                    "openai-compatible provider needs WORKLOG_API_KEY or OPENAI_API_KEY"
                        .to_string(),
                )
            })?;
            Ok(Box::new(OpenAiCompatOracle::new(key, cfg.base_url.clone())))
        }
        other => Err(ReviewError::InvalidConfig(format!("unknown oracle provider `{other}`")).into()),
    }
}
