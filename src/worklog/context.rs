use crate::worklog::paths::expand_tilde;
use crate::worklog::util::{CommandFailure, run_command_with_timeout};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

const GIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectContext {
    pub commits: BTreeMap<String, String>,
    pub todos: BTreeMap<String, String>,
}

fn lookup<'a>(map: &'a BTreeMap<String, String>, project: &str) -> Option<&'a str> {
    if project.is_empty() {
        return None;
    }
    if let Some(exact) = map.get(project) {
        return Some(exact.as_str());
    }
    map.iter()
        .find(|(key, _)| !key.is_empty() && (project.contains(key.as_str()) || key.contains(project)))
        .map(|(_, value)| value.as_str())
}

impl ProjectContext {
    pub fn commits_for(&self, project: &str) -> Option<&str> {
        lookup(&self.commits, project)
    }

    pub fn todos_for(&self, project: &str) -> Option<&str> {
        lookup(&self.todos, project)
    }
}

fn read_todos(dir: &Path, filenames: &[String]) -> Option<String> {
    let parts = filenames
        .iter()
        .map(|name| dir.join(name))
        .filter(|path| path.is_file())
        .filter_map(|path| fs::read_to_string(&path).ok())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

fn git_log_since(dir: &Path, since: DateTime<Utc>) -> Option<String> {
    let mut cmd = Command::new("git");
    cmd.arg("-C")
        .arg(dir)
        .arg("log")
        .arg(format!("--since={}", since.to_rfc3339()))
        .arg("--oneline");
    match run_command_with_timeout(&mut cmd, GIT_TIMEOUT) {
        Ok(output) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
            (!text.is_empty()).then_some(text)
        }
        Ok(output) => {
            tracing::debug!(
                dir = %dir.display(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "git log failed"
            );
            None
        }
        Err(CommandFailure::TimedOut) => {
            tracing::debug!(dir = %dir.display(), "git log timed out");
            None
        }
        Err(CommandFailure::Io(err)) => {
            tracing::debug!(dir = %dir.display(), error = %err, "git not runnable");
            None
        }
    }
}

/// Context for each configured project directory, keyed by its final path
/// component.
pub fn load(projects: &[String], todo_filenames: &[String], since: DateTime<Utc>) -> ProjectContext {
    let mut ctx = ProjectContext::default();
    for raw in projects {
        let dir = expand_tilde(raw);
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "configured project directory missing");
            continue;
        }
        let Some(key) = dir.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        if let Some(todos) = read_todos(&dir, todo_filenames) {
            ctx.todos.insert(key.clone(), todos);
        }
        if let Some(commits) = git_log_since(&dir, since) {
            ctx.commits.insert(key, commits);
        }
    }
    ctx
}
