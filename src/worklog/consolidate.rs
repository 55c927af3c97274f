//! Oracle-assisted dedup of label and project breakdowns.
//!
//! The oracle only ever proposes groupings by item index. Turn counts are
//! summed here from the measured values, so a bad response can change how
//! items are grouped but never how many turns exist.

use crate::error::OracleError;
use crate::worklog::aggregate::{LabelShare, ProjectSummary, pct, sort_shares};
use crate::worklog::context::ProjectContext;
use crate::worklog::oracle::Oracle;
use crate::worklog::session::NO_CONTENT;
use crate::worklog::warn;
use serde::Deserialize;
use std::time::Duration;

/// Oracle settings shared by both passes.
pub struct ConsolidateOptions<'a> {
    pub oracle: &'a dyn Oracle,
    pub model: &'a str,
    pub timeout: Duration,
    /// Inputs with at most this many entries pass through untouched.
    pub min_items: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct GroupSpec {
    name: String,
    items: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupingError {
    Oracle(OracleError),
    Malformed(String),
    IndexOutOfRange { index: usize, len: usize },
}

impl std::fmt::Display for GroupingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Oracle(err) => write!(f, "{err}"),
            Self::Malformed(reason) => write!(f, "malformed grouping: {reason}"),
            Self::IndexOutOfRange { index, len } => {
                write!(f, "grouping references item {index} of {len}")
            }
        }
    }
}

impl GroupingError {
    fn code(&self) -> &'static str {
        match self {
            Self::Oracle(err) => err.code(),
            Self::Malformed(_) => "GROUPING_MALFORMED",
            Self::IndexOutOfRange { .. } => "GROUPING_OUT_OF_RANGE",
        }
    }
}

/// Body of the first fenced block when the reply has one, minus a `json`
/// language tag.
pub fn strip_code_fence(output: &str) -> &str {
    let trimmed = output.trim();
    let mut parts = trimmed.split("```");
    match (parts.next(), parts.next()) {
        (Some(_), Some(body)) => {
            let body = body.trim_start();
            body.strip_prefix("json").unwrap_or(body).trim()
        }
        _ => trimmed,
    }
}

fn parse_groups(output: &str) -> Result<Vec<GroupSpec>, GroupingError> {
    let body = strip_code_fence(output);
    let first_err = match serde_json::from_str::<Vec<GroupSpec>>(body) {
        Ok(groups) => return Ok(groups),
        Err(err) => err,
    };

    // Replies sometimes wrap the array in prose, which may carry brackets of
    // its own. Only a `[` opening an object or closing at once can start it.
    let Some(close) = body.rfind(']') else {
        return Err(GroupingError::Malformed(first_err.to_string()));
    };
    let mut last_err = first_err;
    for (open, _) in body[..close].match_indices('[') {
        let rest = body[open + 1..].trim_start();
        if !(rest.starts_with('{') || rest.starts_with(']')) {
            continue;
        }
        match serde_json::from_str::<Vec<GroupSpec>>(&body[open..=close]) {
            Ok(groups) => return Ok(groups),
            Err(err) => last_err = err,
        }
    }
    Err(GroupingError::Malformed(last_err.to_string()))
}

/// Merge `items` according to `groups`.
///
/// Each index lands in exactly one bucket: its first referencing group, or
/// its own unchanged entry when no group mentions it.
fn apply_groups(
    items: &[LabelShare],
    groups: Vec<GroupSpec>,
    total: u64,
) -> Result<Vec<LabelShare>, GroupingError> {
    let len = items.len();
    if let Some(index) = groups
        .iter()
        .flat_map(|g| g.items.iter().copied())
        .find(|&i| i >= len)
    {
        return Err(GroupingError::IndexOutOfRange { index, len });
    }

    let mut placed = vec![false; len];
    let mut out = Vec::with_capacity(groups.len());
    for group in groups {
        let mut turns = 0u64;
        let mut first = None;
        for idx in group.items {
            if placed[idx] {
                continue;
            }
            placed[idx] = true;
            turns += items[idx].turns;
            first.get_or_insert(idx);
        }
        let Some(first) = first else {
            continue;
        };
        let name = match group.name.trim() {
            "" => items[first].name.clone(),
            name => name.to_string(),
        };
        out.push(LabelShare {
            name,
            turns,
            pct: pct(turns, total),
        });
    }

    out.extend(
        items
            .iter()
            .zip(&placed)
            .filter(|(_, placed)| !**placed)
            .map(|(item, _)| item.clone()),
    );
    sort_shares(&mut out);
    Ok(out)
}

pub fn build_label_prompt(items: &[LabelShare]) -> String {
    let listing = items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{i}. {} ({} turns)", item.name, item.turns))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You have a numbered list of work items from coding-assistant sessions, each tagged \
         with a priority category and description. Many items are duplicates or variations \
         of the same work.\n\n\
         Group similar items. For each group give a short consolidated name (keep the \
         priority prefix like \"P0:\", \"TOOLING:\", etc.) and the item numbers it contains. \
         Never merge items with different priority prefixes.\n\n\
         Items:\n{listing}\n\n\
         Reply with JSON only: an array of objects with \"name\" and \"items\" fields, where \
         \"items\" lists item numbers from above. Example:\n\
         [\n\
         \x20 {{\"name\": \"P0: Migrate billing service to new API\", \"items\": [0, 3]}},\n\
         \x20 {{\"name\": \"TOOLING: CI pipeline improvements\", \"items\": [1]}}\n\
         ]\n\n\
         Consolidate aggressively - similar work should be grouped even if descriptions \
         differ slightly."
    )
}

#[derive(Debug, Clone)]
pub struct LabelConsolidation {
    pub items: Vec<LabelShare>,
    pub warning: Option<String>,
}

/// Group near-duplicate labels. Falls back to `items` unchanged on any
/// oracle or structural failure.
pub fn consolidate_labels(
    opts: &ConsolidateOptions<'_>,
    items: &[LabelShare],
    total: u64,
) -> LabelConsolidation {
    if items.len() <= opts.min_items {
        return LabelConsolidation {
            items: items.to_vec(),
            warning: None,
        };
    }

    tracing::info!(items = items.len(), model = opts.model, "consolidating label breakdown");
    let grouped = opts
        .oracle
        .complete(&build_label_prompt(items), opts.model, opts.timeout)
        .map_err(GroupingError::Oracle)
        .and_then(|output| parse_groups(&output))
        .and_then(|groups| apply_groups(items, groups, total));

    match grouped {
        Ok(merged) => {
            tracing::info!(before = items.len(), after = merged.len(), "labels consolidated");
            LabelConsolidation {
                items: merged,
                warning: None,
            }
        }
        Err(err) => {
            warn::emit(warn::WarnEvent {
                code: err.code(),
                stage: "consolidate-labels",
                action: "pass-through",
                project: "all",
                source: opts.oracle.name(),
                reason: "label consolidation failed",
                err: &err.to_string(),
            });
            LabelConsolidation {
                items: items.to_vec(),
                warning: Some(format!("label_consolidation_failed: {err}")),
            }
        }
    }
}

pub fn build_project_prompt(
    project: &ProjectSummary,
    raw_summaries: &str,
    taxonomy: &str,
    context: &ProjectContext,
) -> String {
    let mut prompt = String::from(
        "You are consolidating summaries of coding-assistant sessions for a daily activity report.\n\n",
    );
    if !taxonomy.trim().is_empty() {
        prompt.push_str(&format!("## Your Priorities Reference\n{taxonomy}\n\n"));
    }
    prompt.push_str(&format!("## Project: {}\n\n", project.project));
    prompt.push_str(&format!(
        "## Raw Summaries (from multiple sessions/chunks)\n{raw_summaries}\n\n"
    ));
    if let Some(commits) = context.commits_for(&project.project) {
        prompt.push_str(&format!("## Commits In This Period\n{commits}\n\n"));
    }
    if let Some(todos) = context.todos_for(&project.project) {
        prompt.push_str(&format!("## Open TODOs\n{todos}\n\n"));
    }
    prompt.push_str(
        "## Instructions\n\
         Write 3-5 plain text bullet points of the substantive work done on this project.\n\n\
         - Start immediately with bullets (no preamble, no headers, no \"Summary:\" label)\n\
         - Use plain text only: no markdown headers, no **bold**, no ## headings\n\
         - Focus on actual accomplishments, findings, and progress - not setup or initialization\n\
         - Be specific: include concrete details, numbers, file names where relevant\n\
         - If work relates to a priority, note which one in parentheses\n\
         - If the summaries are mostly empty or just initialization, write a single bullet: \
         \"No substantive work captured\"\n",
    );
    prompt
}

#[derive(Debug, Clone)]
pub struct ProjectConsolidation {
    pub projects: Vec<ProjectSummary>,
    pub warnings: Vec<String>,
}

/// Rewrite the synopses of the `top_n` largest projects. `projects` must be
/// ordered by chars descending; the rest pass through.
pub fn consolidate_projects(
    opts: &ConsolidateOptions<'_>,
    projects: Vec<ProjectSummary>,
    top_n: usize,
    taxonomy: &str,
    context: &ProjectContext,
) -> ProjectConsolidation {
    if projects.len() <= opts.min_items {
        return ProjectConsolidation {
            projects,
            warnings: Vec::new(),
        };
    }

    let mut warnings = Vec::new();
    let mut out = Vec::with_capacity(projects.len());
    for (rank, project) in projects.into_iter().enumerate() {
        if rank >= top_n {
            out.push(project);
            continue;
        }
        let raw = project.summaries.join("\n\n");
        if raw.trim().is_empty() || raw == NO_CONTENT {
            out.push(project);
            continue;
        }

        let prompt = build_project_prompt(&project, &raw, taxonomy, context);
        match opts.oracle.complete(&prompt, opts.model, opts.timeout) {
            Ok(text) => {
                tracing::info!(project = %project.project, "project synopsis consolidated");
                out.push(ProjectSummary {
                    summaries: vec![text],
                    ..project
                });
            }
            Err(err) => {
                warn::emit(warn::WarnEvent {
                    code: err.code(),
                    stage: "consolidate-projects",
                    action: "keep-original",
                    project: &project.project,
                    source: opts.oracle.name(),
                    reason: "project consolidation failed",
                    err: &err.to_string(),
                });
                warnings.push(format!(
                    "project_consolidation_failed: {}: {err}",
                    project.project
                ));
                out.push(project);
            }
        }
    }
    ProjectConsolidation {
        projects: out,
        warnings,
    }
}
