use anyhow::Result;
use std::time::{Duration, SystemTime};

use crate::commands::{CommandReport, Runtime};
use crate::worklog::log_store;

#[derive(Debug, Clone)]
pub struct SessionsOptions {
    pub since_days: Option<u32>,
    pub min_turns: Option<usize>,
}

pub fn run(opts: &SessionsOptions) -> Result<CommandReport> {
    let rt = Runtime::load()?;
    let mut report = CommandReport::new("sessions");

    let since = opts.since_days.map(|days| {
        SystemTime::now()
            .checked_sub(Duration::from_secs(u64::from(days) * 86_400))
            .unwrap_or(SystemTime::UNIX_EPOCH)
    });
    let files = log_store::list(
        &rt.paths.sessions_dir,
        &rt.paths.home_dir,
        &rt.scan_options(opts.min_turns),
        since,
    );

    report.detail(format!("sessions.root={}", rt.paths.sessions_dir.display()));
    report.detail(format!("sessions.count={}", files.len()));
    for file in &files {
        report.detail(format!(
            "session project={} size={} path={}",
            file.project,
            file.size_bytes,
            file.path.display()
        ));
    }
    if !rt.paths.sessions_dir.is_dir() {
        report.issue(format!(
            "sessions dir missing: {} (set WORKLOG_SESSIONS_DIR)",
            rt.paths.sessions_dir.display()
        ));
    }
    Ok(report)
}
