use anyhow::Result;
use chrono::Utc;
use std::time::{Duration, SystemTime};

use crate::commands::{CommandReport, Runtime, note_warnings};
use crate::error::ReviewError;
use crate::worklog::aggregate::{label_breakdown, project_list, reduce};
use crate::worklog::classify::OracleClassifier;
use crate::worklog::oracle::build_oracle;
use crate::worklog::report::{assemble, ensure_activity, save_report};
use crate::worklog::session::{SessionOptions, SynopsisMode, process};
use crate::worklog::window::TimeWindow;
use crate::worklog::{log_store, scheduler};

const SECS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct ReviewOptions {
    pub days: u32,
    pub min_turns: Option<usize>,
    pub save: bool,
    pub print: bool,
}

/// Sessions touched in the last `days` days, classified whole (no time
/// filter) and summarised per session.
pub fn run(opts: &ReviewOptions) -> Result<CommandReport> {
    if opts.days == 0 {
        return Err(ReviewError::InvalidWindow("--days must be at least 1".to_string()).into());
    }
    let rt = Runtime::load()?;
    let cfg = &rt.config;
    let tz = cfg.timezone()?;
    let mut report = CommandReport::new("review");

    let now = Utc::now();
    let period = TimeWindow {
        start: now - chrono::Duration::days(i64::from(opts.days)),
        end: now,
    };
    let since = SystemTime::now()
        .checked_sub(Duration::from_secs(u64::from(opts.days) * SECS_PER_DAY))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let files = log_store::list(
        &rt.paths.sessions_dir,
        &rt.paths.home_dir,
        &rt.scan_options(opts.min_turns),
        Some(since),
    );
    report.detail(format!("review.days={}", opts.days));
    report.detail(format!("review.candidate_files={}", files.len()));

    let oracle = build_oracle(&cfg.oracle, &rt.paths)?;
    report.detail(format!("review.oracle={}", oracle.name()));
    let classify_timeout = Duration::from_secs(cfg.oracle.classify_timeout_secs);
    let classifier = OracleClassifier::new(oracle.as_ref(), &cfg.oracle.classify_model, classify_timeout);
    let session_opts = SessionOptions {
        taxonomy: &rt.taxonomy,
        window: None,
        chunk_budget: cfg.pipeline.chunk_budget_chars,
        synopsis: SynopsisMode::Combine {
            oracle: oracle.as_ref(),
            model: &cfg.oracle.classify_model,
            timeout: classify_timeout,
        },
    };

    let batch = scheduler::run_all(files, cfg.pipeline.concurrency, |file| {
        process(file, &classifier, &session_opts)
    });
    let agg = reduce(&batch.results);
    ensure_activity(&agg)?;

    let labels = label_breakdown(&agg.label_turns, agg.total_turns);
    let review = assemble(period, &agg, labels, project_list(&agg.projects), batch.failures);

    report.detail(format!("review.sessions={}", review.total_sessions_with_activity));
    report.detail(format!(
        "review.total_user_turns={}",
        review.priority_breakdown.total_user_turns
    ));
    for (tag, pct) in &review.priority_breakdown.percentage_of_effort {
        report.detail(format!("review.pct.{tag}={pct}"));
    }
    note_warnings(&mut report, "review", &review.warnings);

    if opts.save {
        let date = now.with_timezone(&tz).date_naive();
        let path = save_report(&rt.paths, "review", date, &review)?;
        report.detail(format!("review.saved={}", path.display()));
    }
    if opts.print {
        report.attach(&review)?;
    }
    Ok(report)
}
