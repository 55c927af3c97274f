use crate::worklog::session::SessionResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub turns: u64,
    pub chars: u64,
    pub chunks: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelShare {
    pub name: String,
    pub turns: u64,
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project: String,
    pub chars: u64,
    pub summaries: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    pub sessions: usize,
    pub categories: BTreeMap<String, CategoryTotals>,
    /// Turns per `TAG: label` key, before any consolidation.
    pub label_turns: BTreeMap<String, u64>,
    pub hourly: BTreeMap<u32, BTreeMap<String, u64>>,
    pub projects: BTreeMap<String, ProjectSummary>,
    pub total_turns: u64,
    pub total_chars: u64,
    pub warnings: Vec<String>,
}

/// `100 * part / total` to one decimal; 0 when there is no total.
pub fn pct(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (1000.0 * part as f64 / total as f64).round() / 10.0
}

pub fn compound_label(tag: &str, label: &str) -> String {
    if label.is_empty() {
        tag.to_string()
    } else {
        format!("{tag}: {label}")
    }
}

pub fn reduce(results: &[SessionResult]) -> Aggregate {
    let mut agg = Aggregate {
        sessions: results.len(),
        ..Aggregate::default()
    };

    for session in results {
        for chunk in &session.chunks {
            let tag = chunk.tag.as_str();
            let totals = agg.categories.entry(tag.to_string()).or_default();
            totals.turns += chunk.user_turns;
            totals.chars += chunk.user_chars;
            totals.chunks += 1;

            *agg.label_turns
                .entry(compound_label(tag, &chunk.label))
                .or_default() += chunk.user_turns;

            if let Some(hour) = chunk.hour {
                *agg.hourly
                    .entry(hour)
                    .or_default()
                    .entry(tag.to_string())
                    .or_default() += chunk.user_turns;
            }

            agg.total_turns += chunk.user_turns;
            agg.total_chars += chunk.user_chars;
        }

        let project = agg
            .projects
            .entry(session.project.clone())
            .or_insert_with(|| ProjectSummary {
                project: session.project.clone(),
                chars: 0,
                summaries: Vec::new(),
            });
        project.chars += session.total_user_chars;
        project.summaries.push(session.synopsis.clone());

        agg.warnings.extend(session.warnings.iter().cloned());
    }

    agg.hourly
        .retain(|_, by_tag| by_tag.values().sum::<u64>() > 0);
    agg
}

pub fn percentages(categories: &BTreeMap<String, CategoryTotals>, total: u64) -> BTreeMap<String, f64> {
    categories
        .iter()
        .map(|(tag, totals)| (tag.clone(), pct(totals.turns, total)))
        .collect()
}

/// Turns descending, ties by name.
pub fn sort_shares(shares: &mut [LabelShare]) {
    shares.sort_by(|a, b| b.turns.cmp(&a.turns).then_with(|| a.name.cmp(&b.name)));
}

pub fn label_breakdown(label_turns: &BTreeMap<String, u64>, total: u64) -> Vec<LabelShare> {
    let mut shares = label_turns
        .iter()
        .map(|(name, &turns)| LabelShare {
            name: name.clone(),
            turns,
            pct: pct(turns, total),
        })
        .collect::<Vec<_>>();
    sort_shares(&mut shares);
    shares
}

/// Projects by character volume, largest first.
pub fn project_list(projects: &BTreeMap<String, ProjectSummary>) -> Vec<ProjectSummary> {
    let mut list = projects.values().cloned().collect::<Vec<_>>();
    list.sort_by(|a, b| b.chars.cmp(&a.chars).then_with(|| a.project.cmp(&b.project)));
    list
}
