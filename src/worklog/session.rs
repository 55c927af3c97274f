use crate::worklog::chunker::{chunk, format_chunk};
use crate::worklog::classify::{Classifier, Tag, unclear};
use crate::worklog::extract::{Turn, extract, filter_window};
use crate::worklog::log_store::LogFile;
use crate::worklog::oracle::Oracle;
use crate::worklog::warn;
use crate::worklog::window::TimeWindow;
use anyhow::Result;
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const NO_CONTENT: &str = "(no content)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub tag: Tag,
    pub label: String,
    pub synopsis: String,
    pub user_chars: u64,
    pub user_turns: u64,
    pub hour: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    pub project: String,
    pub chunks: Vec<ChunkResult>,
    pub synopsis: String,
    pub total_user_chars: u64,
    pub total_user_turns: u64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl SessionResult {
    /// Totals are always the exact sum of the chunk counts.
    pub fn new(project: String, chunks: Vec<ChunkResult>, synopsis: String, warnings: Vec<String>) -> Self {
        let total_user_chars = chunks.iter().map(|c| c.user_chars).sum();
        let total_user_turns = chunks.iter().map(|c| c.user_turns).sum();
        Self {
            project,
            chunks,
            synopsis,
            total_user_chars,
            total_user_turns,
            warnings,
        }
    }
}

/// How chunk synopses become the session synopsis.
pub enum SynopsisMode<'a> {
    Join,
    Combine {
        oracle: &'a dyn Oracle,
        model: &'a str,
        timeout: Duration,
    },
}

pub struct SessionOptions<'a> {
    pub taxonomy: &'a str,
    pub window: Option<TimeWindow>,
    pub chunk_budget: usize,
    pub synopsis: SynopsisMode<'a>,
}

/// Hour of the median user timestamp in the chunk.
fn representative_hour(turns: &[Turn]) -> Option<u32> {
    let mut stamps = turns
        .iter()
        .filter(|t| t.is_user())
        .filter_map(|t| t.timestamp)
        .collect::<Vec<_>>();
    if stamps.is_empty() {
        return None;
    }
    stamps.sort();
    Some(stamps[stamps.len() / 2].hour())
}

fn user_counts(turns: &[Turn]) -> (u64, u64) {
    turns
        .iter()
        .filter(|t| t.is_user())
        .fold((0, 0), |(chars, count), t| (chars + t.char_len() as u64, count + 1))
}

pub fn build_combine_prompt(project: &str, synopses: &[&str]) -> String {
    format!(
        "Combine these partial summaries into one concise summary (3-4 bullets max).\n\n\
         Project: {project}\n\n\
         {}\n\n\
         Combined summary:",
        synopses.join("\n")
    )
}

fn combine_synopses(
    project: &str,
    source: &str,
    chunks: &[ChunkResult],
    mode: &SynopsisMode<'_>,
    warnings: &mut Vec<String>,
) -> String {
    let parts = chunks
        .iter()
        .map(|c| c.synopsis.as_str())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();
    match (parts.len(), mode) {
        (0, _) => NO_CONTENT.to_string(),
        (1, _) | (_, SynopsisMode::Join) => parts.join("\n"),
        (
            _,
            SynopsisMode::Combine {
                oracle,
                model,
                timeout,
            },
        ) => match oracle.complete(&build_combine_prompt(project, &parts), model, *timeout) {
            Ok(text) => text,
            Err(err) => {
                warn::emit(warn::WarnEvent {
                    code: err.code(),
                    stage: "combine",
                    action: "fallback-join",
                    project,
                    source,
                    reason: "session synopsis combine failed",
                    err: &err.to_string(),
                });
                warnings.push(format!("combine_failed: {project}: {err}"));
                parts.join("\n")
            }
        },
    }
}

/// Classify every chunk of one session log.
///
/// `Ok(None)` when no turn survives extraction and the window filter, which
/// is the normal outcome for most files in a short window.
pub fn process(
    file: &LogFile,
    classifier: &dyn Classifier,
    opts: &SessionOptions<'_>,
) -> Result<Option<SessionResult>> {
    let turns = extract(&file.path, opts.window.is_some())?;
    let turns = match opts.window {
        Some(window) => filter_window(turns, &window),
        None => turns,
    };
    if turns.is_empty() {
        return Ok(None);
    }

    let source = file.path.display().to_string();
    let mut warnings = Vec::new();
    let mut results = Vec::new();
    for (idx, turns) in chunk(turns, opts.chunk_budget).into_iter().enumerate() {
        let text = format_chunk(&turns);
        let classification = match classifier.classify(&text, &file.project, opts.taxonomy) {
            Ok(classification) => classification,
            Err(err) => {
                warn::emit(warn::WarnEvent {
                    code: err.code(),
                    stage: "classify",
                    action: "fallback-unclear",
                    project: &file.project,
                    source: &source,
                    reason: &format!("chunk {idx} classification failed"),
                    err: &err.to_string(),
                });
                warnings.push(format!("classify_failed: {} chunk {idx}: {err}", file.project));
                unclear(&err.to_string())
            }
        };
        let (user_chars, user_turns) = user_counts(&turns);
        results.push(ChunkResult {
            tag: classification.tag,
            label: classification.label,
            synopsis: classification.summary,
            user_chars,
            user_turns,
            hour: representative_hour(&turns),
        });
    }

    let synopsis = combine_synopses(&file.project, &source, &results, &opts.synopsis, &mut warnings);
    Ok(Some(SessionResult::new(
        file.project.clone(),
        results,
        synopsis,
        warnings,
    )))
}
