use anyhow::Result;
use chrono::Utc;

use crate::commands::{CommandReport, Runtime, note_warnings};
use crate::error::ReviewError;
use crate::worklog::report::save_report;
use crate::worklog::weekly::{aggregate_reports, load_daily_reports};

#[derive(Debug, Clone)]
pub struct WeeklyOptions {
    pub days: u32,
    pub save: bool,
    pub print: bool,
}

pub fn run(opts: &WeeklyOptions) -> Result<CommandReport> {
    if opts.days == 0 {
        return Err(ReviewError::InvalidWindow("--days must be at least 1".to_string()).into());
    }
    let rt = Runtime::load()?;
    let today = Utc::now().with_timezone(&rt.config.timezone()?).date_naive();
    let mut report = CommandReport::new("weekly");

    let daily_dir = rt.paths.report_dir("daily");
    let (reports, skipped) = load_daily_reports(&daily_dir, today, opts.days)?;
    report.detail(format!("weekly.daily_dir={}", daily_dir.display()));
    report.detail(format!("weekly.days_found={}", reports.len()));

    let weekly = aggregate_reports(&reports, skipped)?;
    report.detail(format!("weekly.period_start={}", weekly.period_start));
    report.detail(format!("weekly.period_end={}", weekly.period_end));
    report.detail(format!(
        "weekly.total_user_turns={}",
        weekly.priority_breakdown.total_user_turns
    ));
    for (tag, pct) in &weekly.priority_breakdown.percentage_of_effort {
        report.detail(format!("weekly.pct.{tag}={pct}"));
    }
    note_warnings(&mut report, "weekly", &weekly.warnings);

    if opts.save {
        let path = save_report(&rt.paths, "weekly", today, &weekly)?;
        report.detail(format!("weekly.saved={}", path.display()));
    }
    if opts.print {
        report.attach(&weekly)?;
    }
    Ok(report)
}
