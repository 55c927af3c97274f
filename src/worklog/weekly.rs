use crate::error::ReviewError;
use crate::worklog::aggregate::{LabelShare, pct, sort_shares};
use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const TOP_LABELS: usize = 20;
const TOP_PROJECTS: usize = 10;

// Daily reports are read leniently: files written by older versions may
// lack newer fields.
#[derive(Debug, Clone, Default, Deserialize)]
struct DailyBreakdown {
    #[serde(default)]
    by_user_turns: BTreeMap<String, u64>,
    #[serde(default)]
    by_user_chars: BTreeMap<String, u64>,
    #[serde(default)]
    by_chunk_count: BTreeMap<String, u64>,
    #[serde(default)]
    percentage_of_effort: BTreeMap<String, f64>,
    #[serde(default)]
    by_priority_name: Vec<DailyLabel>,
    #[serde(default)]
    total_user_turns: u64,
    #[serde(default)]
    total_user_chars: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct DailyLabel {
    name: String,
    #[serde(default)]
    turns: Option<u64>,
    #[serde(default)]
    chars: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct DailyProject {
    project: String,
    #[serde(default)]
    chars: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailyReport {
    #[serde(default)]
    priority_breakdown: DailyBreakdown,
    #[serde(default)]
    projects: Vec<DailyProject>,
}

#[derive(Debug, Clone)]
pub struct DatedReport {
    pub date: NaiveDate,
    pub report: DailyReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub pct: BTreeMap<String, f64>,
    pub total_turns: u64,
    pub total_chars: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectTotal {
    pub project: String,
    pub chars: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyBreakdown {
    pub by_user_turns: BTreeMap<String, u64>,
    pub by_user_chars: BTreeMap<String, u64>,
    pub by_chunk_count: BTreeMap<String, u64>,
    pub percentage_of_effort: BTreeMap<String, f64>,
    pub by_priority_name: Vec<LabelShare>,
    pub total_user_turns: u64,
    pub total_user_chars: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyReport {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub days_covered: usize,
    pub priority_breakdown: WeeklyBreakdown,
    pub daily_trend: Vec<DailyTrend>,
    pub top_projects: Vec<ProjectTotal>,
    pub warnings: Vec<String>,
}

fn add_all(into: &mut BTreeMap<String, u64>, from: &BTreeMap<String, u64>) {
    for (key, value) in from {
        *into.entry(key.clone()).or_default() += value;
    }
}

/// Daily reports in `daily_dir` dated within the last `days` days of
/// `today`, oldest first. Unreadable files are skipped and reported.
pub fn load_daily_reports(
    daily_dir: &Path,
    today: NaiveDate,
    days: u32,
) -> Result<(Vec<DatedReport>, Vec<String>)> {
    if !daily_dir.is_dir() {
        return Ok((Vec::new(), Vec::new()));
    }
    let cutoff = today - Duration::days(i64::from(days));

    let mut reports = Vec::new();
    let mut skipped = Vec::new();
    let entries = fs::read_dir(daily_dir)
        .with_context(|| format!("failed to read {}", daily_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let Ok(date) = NaiveDate::parse_from_str(&stem, "%Y-%m-%d") else {
            skipped.push(format!("skipped {}: name is not a date", path.display()));
            continue;
        };
        if date <= cutoff {
            continue;
        }
        let parsed = fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str::<DailyReport>(&raw).map_err(anyhow::Error::from));
        match parsed {
            Ok(report) => reports.push(DatedReport { date, report }),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable daily report");
                skipped.push(format!("skipped {}: {err}", path.display()));
            }
        }
    }
    reports.sort_by_key(|r| r.date);
    Ok((reports, skipped))
}

pub fn aggregate_reports(reports: &[DatedReport], warnings: Vec<String>) -> Result<WeeklyReport> {
    let (Some(first), Some(last)) = (reports.first(), reports.last()) else {
        return Err(ReviewError::NoData("no daily reports found".to_string()).into());
    };

    let mut by_user_turns = BTreeMap::new();
    let mut by_user_chars = BTreeMap::new();
    let mut by_chunk_count = BTreeMap::new();
    let mut total_user_turns = 0u64;
    let mut total_user_chars = 0u64;
    let mut daily_trend = Vec::with_capacity(reports.len());
    let mut label_turns: BTreeMap<String, u64> = BTreeMap::new();
    let mut project_chars: BTreeMap<String, u64> = BTreeMap::new();

    for dated in reports {
        let breakdown = &dated.report.priority_breakdown;
        add_all(&mut by_user_turns, &breakdown.by_user_turns);
        add_all(&mut by_user_chars, &breakdown.by_user_chars);
        add_all(&mut by_chunk_count, &breakdown.by_chunk_count);
        total_user_turns += breakdown.total_user_turns;
        total_user_chars += breakdown.total_user_chars;

        daily_trend.push(DailyTrend {
            date: dated.date,
            pct: breakdown.percentage_of_effort.clone(),
            total_turns: breakdown.total_user_turns,
            total_chars: breakdown.total_user_chars,
        });

        for item in &breakdown.by_priority_name {
            *label_turns.entry(item.name.clone()).or_default() +=
                item.turns.or(item.chars).unwrap_or(0);
        }
        for project in &dated.report.projects {
            *project_chars.entry(project.project.clone()).or_default() += project.chars;
        }
    }

    let percentage_of_effort = by_user_turns
        .iter()
        .map(|(tag, turns)| (tag.clone(), pct(*turns, total_user_turns)))
        .collect();

    let mut by_priority_name = label_turns
        .into_iter()
        .map(|(name, turns)| LabelShare {
            name,
            turns,
            pct: pct(turns, total_user_turns),
        })
        .collect::<Vec<_>>();
    sort_shares(&mut by_priority_name);
    by_priority_name.truncate(TOP_LABELS);

    let mut top_projects = project_chars
        .into_iter()
        .map(|(project, chars)| ProjectTotal { project, chars })
        .collect::<Vec<_>>();
    top_projects.sort_by(|a, b| b.chars.cmp(&a.chars).then_with(|| a.project.cmp(&b.project)));
    top_projects.truncate(TOP_PROJECTS);

    Ok(WeeklyReport {
        period_start: first.date,
        period_end: last.date,
        days_covered: reports.len(),
        priority_breakdown: WeeklyBreakdown {
            by_user_turns,
            by_user_chars,
            by_chunk_count,
            percentage_of_effort,
            by_priority_name,
            total_user_turns,
            total_user_chars,
        },
        daily_trend,
        top_projects,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::{aggregate_reports, load_daily_reports};
    use chrono::NaiveDate;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, n).expect("date")
    }

    fn write_daily(dir: &std::path::Path, date: &str, turns: serde_json::Value, total: u64) {
        let body = json!({
            "priority_breakdown": {
                "by_user_turns": turns,
                "by_user_chars": {},
                "by_chunk_count": {},
                "percentage_of_effort": {},
                "by_priority_name": [{"name": "P0: billing", "turns": 10, "pct": 5.0}],
                "total_user_turns": total,
                "total_user_chars": total * 10
            },
            "projects": [{"project": "code/app", "chars": total, "summaries": []}]
        });
        fs::write(dir.join(format!("{date}.json")), body.to_string()).expect("write");
    }

    #[test]
    fn two_days_sum_per_category() {
        let tmp = tempdir().expect("tempdir");
        write_daily(tmp.path(), "2026-02-14", json!({"P0": 100, "P1": 50}), 150);
        write_daily(tmp.path(), "2026-02-15", json!({"P0": 80, "TOOLING": 70}), 150);

        let (reports, skipped) = load_daily_reports(tmp.path(), day(15), 7).expect("load");
        assert!(skipped.is_empty());
        let weekly = aggregate_reports(&reports, skipped).expect("aggregate");
        let pb = &weekly.priority_breakdown;

        assert_eq!(pb.by_user_turns["P0"], 180);
        assert_eq!(pb.by_user_turns["P1"], 50);
        assert_eq!(pb.by_user_turns["TOOLING"], 70);
        assert_eq!(pb.total_user_turns, 300);
        assert_eq!(pb.by_user_turns.values().sum::<u64>(), pb.total_user_turns);
        assert_eq!(pb.percentage_of_effort["P0"], 60.0);
        assert_eq!(pb.by_priority_name[0].turns, 20);
        assert_eq!(weekly.top_projects[0].chars, 300);
        assert_eq!(weekly.days_covered, 2);
        assert_eq!(weekly.period_start, day(14));
        assert_eq!(weekly.daily_trend[1].date, day(15));
    }

    #[test]
    fn old_and_broken_files_are_excluded() {
        let tmp = tempdir().expect("tempdir");
        write_daily(tmp.path(), "2026-02-15", json!({"P0": 5}), 5);
        write_daily(tmp.path(), "2026-02-01", json!({"P0": 999}), 999);
        fs::write(tmp.path().join("2026-02-14.json"), "{broken").expect("write");
        fs::write(tmp.path().join("notes.json"), "{}").expect("write");
        fs::write(tmp.path().join("2026-02-13.txt"), "{}").expect("write");

        let (reports, skipped) = load_daily_reports(tmp.path(), day(15), 7).expect("load");
        assert_eq!(reports.len(), 1);
        assert_eq!(skipped.len(), 2);
        let weekly = aggregate_reports(&reports, skipped).expect("aggregate");
        assert_eq!(weekly.priority_breakdown.total_user_turns, 5);
        assert_eq!(weekly.warnings.len(), 2);
    }

    #[test]
    fn no_reports_is_no_data() {
        let tmp = tempdir().expect("tempdir");
        let (reports, _) = load_daily_reports(&tmp.path().join("daily"), day(15), 7).expect("load");
        assert!(aggregate_reports(&reports, Vec::new()).is_err());
    }
}
