use anyhow::Result;
use chrono::Utc;
use std::time::Duration;

use crate::commands::{CommandReport, Runtime, note_warnings};
use crate::worklog::aggregate::{label_breakdown, project_list, reduce};
use crate::worklog::classify::OracleClassifier;
use crate::worklog::consolidate::{ConsolidateOptions, consolidate_labels, consolidate_projects};
use crate::worklog::oracle::build_oracle;
use crate::worklog::report::{append_timeseries, assemble, ensure_activity, save_report};
use crate::worklog::session::{SessionOptions, SynopsisMode, process};
use crate::worklog::window::{TimeWindow, parse_date};
use crate::worklog::{context, log_store, scheduler};

#[derive(Debug, Clone)]
pub struct DailyOptions {
    pub hours: u32,
    pub date: Option<String>,
    pub save: bool,
    pub print: bool,
}

pub fn run(opts: &DailyOptions) -> Result<CommandReport> {
    let rt = Runtime::load()?;
    let cfg = &rt.config;
    let tz = cfg.timezone()?;
    let mut report = CommandReport::new("daily");

    let (window, report_date) = match &opts.date {
        Some(raw) => {
            let date = parse_date(raw)?;
            (TimeWindow::for_local_date(date, tz)?, date)
        }
        None => {
            let window = TimeWindow::last_hours(Utc::now(), opts.hours)?;
            (window, window.end.with_timezone(&tz).date_naive())
        }
    };
    report.detail(format!("daily.window_start={}", window.start.to_rfc3339()));
    report.detail(format!("daily.window_end={}", window.end.to_rfc3339()));

    let files = log_store::list(
        &rt.paths.sessions_dir,
        &rt.paths.home_dir,
        &rt.scan_options(None),
        None,
    );
    report.detail(format!("daily.candidate_files={}", files.len()));
    tracing::info!(files = files.len(), "scanning sessions for daily window");

    let oracle = build_oracle(&cfg.oracle, &rt.paths)?;
    report.detail(format!("daily.oracle={}", oracle.name()));
    let classifier = OracleClassifier::new(
        oracle.as_ref(),
        &cfg.oracle.classify_model,
        Duration::from_secs(cfg.oracle.classify_timeout_secs),
    );
    let session_opts = SessionOptions {
        taxonomy: &rt.taxonomy,
        window: Some(window),
        chunk_budget: cfg.pipeline.chunk_budget_chars,
        synopsis: SynopsisMode::Join,
    };

    let batch = scheduler::run_all(files, cfg.pipeline.concurrency, |file| {
        process(file, &classifier, &session_opts)
    });
    let agg = reduce(&batch.results);
    ensure_activity(&agg)?;

    let consolidate_opts = ConsolidateOptions {
        oracle: oracle.as_ref(),
        model: &cfg.oracle.consolidate_model,
        timeout: Duration::from_secs(cfg.oracle.consolidate_timeout_secs),
        min_items: cfg.pipeline.consolidate_min_items,
    };
    let raw_labels = label_breakdown(&agg.label_turns, agg.total_turns);
    let labels = consolidate_labels(&consolidate_opts, &raw_labels, agg.total_turns);

    let ctx = context::load(&cfg.report.projects, &cfg.report.todo_filenames, window.start);
    let projects = consolidate_projects(
        &consolidate_opts,
        project_list(&agg.projects),
        cfg.pipeline.consolidate_top_projects,
        &rt.taxonomy,
        &ctx,
    );

    let mut warnings = batch.failures;
    warnings.extend(labels.warning);
    warnings.extend(projects.warnings);
    let daily = assemble(window, &agg, labels.items, projects.projects, warnings);

    report.detail(format!("daily.sessions={}", daily.total_sessions_with_activity));
    report.detail(format!(
        "daily.total_user_turns={}",
        daily.priority_breakdown.total_user_turns
    ));
    report.detail(format!(
        "daily.total_user_chars={}",
        daily.priority_breakdown.total_user_chars
    ));
    for (tag, pct) in &daily.priority_breakdown.percentage_of_effort {
        report.detail(format!("daily.pct.{tag}={pct}"));
    }
    note_warnings(&mut report, "daily", &daily.warnings);

    if opts.save {
        let path = save_report(&rt.paths, "daily", report_date, &daily)?;
        report.detail(format!("daily.saved={}", path.display()));
        let rows = append_timeseries(&rt.paths, report_date, &daily.hourly_breakdown)?;
        report.detail(format!("daily.timeseries_rows={rows}"));
    }
    if opts.print {
        report.attach(&daily)?;
    }
    Ok(report)
}
