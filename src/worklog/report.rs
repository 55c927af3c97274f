use crate::error::ReviewError;
use crate::worklog::aggregate::{
    Aggregate, CategoryTotals, LabelShare, ProjectSummary, label_breakdown, percentages,
};
use crate::worklog::audit;
use crate::worklog::paths::ReviewPaths;
use crate::worklog::window::TimeWindow;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityBreakdown {
    pub by_user_turns: BTreeMap<String, u64>,
    pub by_user_chars: BTreeMap<String, u64>,
    pub by_chunk_count: BTreeMap<String, u64>,
    pub percentage_of_effort: BTreeMap<String, f64>,
    pub by_priority_name: Vec<LabelShare>,
    #[serde(default)]
    pub by_priority_name_raw: Vec<LabelShare>,
    pub total_user_turns: u64,
    pub total_user_chars: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyRow {
    pub hour: u32,
    pub priorities: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_sessions_with_activity: usize,
    pub priority_breakdown: PriorityBreakdown,
    pub hourly_breakdown: Vec<HourlyRow>,
    pub projects: Vec<ProjectSummary>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// `NoData` unless at least one session produced activity.
pub fn ensure_activity(agg: &Aggregate) -> Result<()> {
    if agg.sessions == 0 {
        return Err(ReviewError::NoData("no session had activity in the window".to_string()).into());
    }
    Ok(())
}

fn column(agg: &Aggregate, f: impl Fn(&CategoryTotals) -> u64) -> BTreeMap<String, u64> {
    agg.categories
        .iter()
        .map(|(tag, totals)| (tag.clone(), f(totals)))
        .collect()
}

/// Build the report from reduced totals plus the (possibly consolidated)
/// label and project lists.
pub fn assemble(
    period: TimeWindow,
    agg: &Aggregate,
    by_priority_name: Vec<LabelShare>,
    projects: Vec<ProjectSummary>,
    extra_warnings: Vec<String>,
) -> Report {
    let mut warnings = agg.warnings.clone();
    warnings.extend(extra_warnings);

    Report {
        period_start: period.start,
        period_end: period.end,
        total_sessions_with_activity: agg.sessions,
        priority_breakdown: PriorityBreakdown {
            by_user_turns: column(agg, |t| t.turns),
            by_user_chars: column(agg, |t| t.chars),
            by_chunk_count: column(agg, |t| t.chunks),
            percentage_of_effort: percentages(&agg.categories, agg.total_turns),
            by_priority_name,
            by_priority_name_raw: label_breakdown(&agg.label_turns, agg.total_turns),
            total_user_turns: agg.total_turns,
            total_user_chars: agg.total_chars,
        },
        hourly_breakdown: agg
            .hourly
            .iter()
            .map(|(hour, priorities)| HourlyRow {
                hour: *hour,
                priorities: priorities.clone(),
            })
            .collect(),
        projects,
        warnings,
    }
}

pub fn report_path(paths: &ReviewPaths, kind: &str, date: NaiveDate) -> PathBuf {
    paths
        .report_dir(kind)
        .join(format!("{}.json", date.format("%Y-%m-%d")))
}

/// Write `value` as pretty JSON through a temp file in the target directory.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;

    let data = serde_json::to_string_pretty(value)?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    tmp.write_all(format!("{data}\n").as_bytes())
        .with_context(|| format!("failed to write temp file for {}", path.display()))?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to persist {}", path.display()))?;
    Ok(())
}

pub fn save_report<T: Serialize>(
    paths: &ReviewPaths,
    kind: &str,
    date: NaiveDate,
    report: &T,
) -> Result<PathBuf> {
    let path = report_path(paths, kind, date);
    write_json_atomic(&path, report)?;
    audit::append_event(paths, kind, "ok", &format!("saved {}", path.display()))?;
    Ok(path)
}

pub fn timeseries_rows(date: NaiveDate, hourly: &[HourlyRow]) -> Vec<Value> {
    hourly
        .iter()
        .map(|row| {
            let mut obj = Map::new();
            obj.insert("date".to_string(), Value::from(date.format("%Y-%m-%d").to_string()));
            obj.insert("hour".to_string(), Value::from(row.hour));
            for (tag, turns) in &row.priorities {
                obj.insert(tag.clone(), Value::from(*turns));
            }
            Value::Object(obj)
        })
        .collect()
}

/// Append one JSON line per active hour, holding an exclusive lock on the
/// stream while writing.
pub fn append_timeseries(paths: &ReviewPaths, date: NaiveDate, hourly: &[HourlyRow]) -> Result<usize> {
    let rows = timeseries_rows(date, hourly);
    if rows.is_empty() {
        return Ok(0);
    }
    let path = paths.timeseries_file();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut buf = String::new();
    for row in &rows {
        buf.push_str(&serde_json::to_string(row)?);
        buf.push('\n');
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    FileExt::lock_exclusive(&file).with_context(|| format!("failed to lock {}", path.display()))?;
    file.write_all(buf.as_bytes())
        .with_context(|| format!("failed to append {}", path.display()))?;
    FileExt::unlock(&file)?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::{Report, append_timeseries, assemble, ensure_activity, save_report};
    use crate::worklog::aggregate::{Aggregate, reduce};
    use crate::worklog::classify::Tag;
    use crate::worklog::paths::ReviewPaths;
    use crate::worklog::session::{ChunkResult, SessionResult};
    use crate::worklog::window::TimeWindow;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn paths(root: &Path) -> ReviewPaths {
        ReviewPaths {
            home_dir: root.to_path_buf(),
            worklog_home: root.to_path_buf(),
            sessions_dir: root.join("sessions"),
            reports_dir: root.join("reports"),
            logs_dir: root.join("logs"),
            priorities_file: None,
            token_file: root.join("token"),
        }
    }

    fn window() -> TimeWindow {
        TimeWindow {
            start: Utc.with_ymd_and_hms(2026, 2, 15, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 2, 16, 0, 0, 0).unwrap(),
        }
    }

    fn sample() -> Aggregate {
        let chunk = |tag: Tag, turns: u64, hour: Option<u32>| ChunkResult {
            tag,
            label: "work".to_string(),
            synopsis: "- did work".to_string(),
            user_chars: turns * 10,
            user_turns: turns,
            hour,
        };
        reduce(&[SessionResult::new(
            "code/app".to_string(),
            vec![chunk(Tag::P0, 6, Some(9)), chunk(Tag::Tooling, 4, Some(13))],
            "- did work".to_string(),
            vec!["classify_failed: code/app chunk 3: timeout".to_string()],
        )])
    }

    #[test]
    fn empty_aggregate_is_no_data() {
        assert!(ensure_activity(&Aggregate::default()).is_err());
        assert!(ensure_activity(&sample()).is_ok());
    }

    #[test]
    fn assembled_report_uses_expected_keys() {
        let agg = sample();
        let report = assemble(window(), &agg, Vec::new(), Vec::new(), vec!["extra".to_string()]);
        let json = serde_json::to_value(&report).expect("json");
        let pb = &json["priority_breakdown"];
        assert_eq!(pb["by_user_turns"]["P0"], 6);
        assert_eq!(pb["by_user_chars"]["TOOLING"], 40);
        assert_eq!(pb["percentage_of_effort"]["P0"], 60.0);
        assert_eq!(pb["total_user_turns"], 10);
        assert_eq!(pb["by_priority_name_raw"][0]["name"], "P0: work");
        assert_eq!(json["hourly_breakdown"][1]["hour"], 13);
        assert_eq!(json["total_sessions_with_activity"], 1);
        assert_eq!(json["warnings"].as_array().map(Vec::len), Some(2));
        assert!(json["period_start"].as_str().is_some_and(|s| s.starts_with("2026-02-15T00:00:00")));
    }

    #[test]
    fn saved_report_round_trips_and_audits() {
        let tmp = tempdir().expect("tempdir");
        let paths = paths(tmp.path());
        let report = assemble(window(), &sample(), Vec::new(), Vec::new(), Vec::new());
        let date = NaiveDate::from_ymd_opt(2026, 2, 15).expect("date");

        let path = save_report(&paths, "daily", date, &report).expect("save");
        assert!(path.ends_with("daily/2026-02-15.json"));
        let back: Report = serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(back, report);
        assert!(fs::read_to_string(paths.audit_log()).expect("audit").contains("daily"));

        // second save replaces the file
        save_report(&paths, "daily", date, &report).expect("resave");
        let entries = fs::read_dir(path.parent().expect("parent")).expect("dir").count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn timeseries_appends_one_row_per_hour() {
        let tmp = tempdir().expect("tempdir");
        let paths = paths(tmp.path());
        let report = assemble(window(), &sample(), Vec::new(), Vec::new(), Vec::new());
        let date = NaiveDate::from_ymd_opt(2026, 2, 15).expect("date");

        assert_eq!(append_timeseries(&paths, date, &report.hourly_breakdown).expect("append"), 2);
        append_timeseries(&paths, date, &report.hourly_breakdown).expect("append again");

        let raw = fs::read_to_string(paths.timeseries_file()).expect("read");
        let rows: Vec<serde_json::Value> = raw
            .lines()
            .map(|l| serde_json::from_str(l).expect("row"))
            .collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0]["date"], "2026-02-15");
        assert_eq!(rows[0]["hour"], 9);
        assert_eq!(rows[0]["P0"], 6);
        assert_eq!(rows[1]["TOOLING"], 4);
    }
}
