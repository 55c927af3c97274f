use crate::worklog::log_store::LogFile;
use crate::worklog::warn;
use anyhow::Result;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct BatchOutcome<R> {
    pub results: Vec<R>,
    /// One line per file whose task errored or panicked.
    pub failures: Vec<String>,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// Run `task` over every file on a pool of `concurrency` workers.
///
/// A task that errors or panics yields no result for its file; the rest of
/// the batch is unaffected. Result order is unspecified.
pub fn run_all<R, F>(files: Vec<LogFile>, concurrency: usize, task: F) -> BatchOutcome<R>
where
    R: Send,
    F: Fn(&LogFile) -> Result<Option<R>> + Sync,
{
    let total = files.len();
    let completed = AtomicUsize::new(0);

    let run_one = |file: &LogFile| -> std::result::Result<Option<R>, String> {
        let outcome = catch_unwind(AssertUnwindSafe(|| task(file)));
        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(completed = done, total, project = %file.project, "session processed");

        let failure = match outcome {
            Ok(Ok(result)) => return Ok(result),
            Ok(Err(err)) => format!("{err:#}"),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };
        let source = file.path.display().to_string();
        warn::emit(warn::WarnEvent {
            code: "SESSION_FAILED",
            stage: "process",
            action: "skip-file",
            project: &file.project,
            source: &source,
            reason: "session task failed",
            err: &failure,
        });
        Err(format!("session_failed: {}: {failure}", source))
    };

    let job = || -> Vec<std::result::Result<Option<R>, String>> {
        files.par_iter().map(|file| run_one(file)).collect()
    };
    let outcomes = match ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .build()
    {
        Ok(pool) => pool.install(job),
        Err(err) => {
            tracing::warn!(error = %err, "worker pool build failed; using global pool");
            job()
        }
    };

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(Some(result)) => results.push(result),
            Ok(None) => {}
            Err(failure) => failures.push(failure),
        }
    }
    BatchOutcome { results, failures }
}

#[cfg(test)]
mod tests {
    use super::run_all;
    use crate::worklog::log_store::LogFile;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    fn files(n: usize) -> Vec<LogFile> {
        (0..n)
            .map(|i| LogFile {
                path: PathBuf::from(format!("/tmp/session-{i}.jsonl")),
                project: format!("proj-{i}"),
                size_bytes: 0,
                modified: SystemTime::UNIX_EPOCH,
            })
            .collect()
    }

    #[test]
    fn errors_and_panics_do_not_abort_the_batch() {
        let outcome = run_all(files(10), 3, |file| {
            let idx: usize = file.project["proj-".len()..].parse()?;
            match idx {
                3 => anyhow::bail!("unreadable"),
                5 => panic!("boom"),
                7 => Ok(None),
                _ => Ok(Some(idx)),
            }
        });

        let mut got = outcome.results;
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 2, 4, 6, 8, 9]);
        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome.failures.iter().any(|f| f.contains("unreadable")));
        assert!(outcome.failures.iter().any(|f| f.contains("panicked: boom")));
    }

    #[test]
    fn every_file_runs_exactly_once() {
        let calls = AtomicUsize::new(0);
        let outcome = run_all(files(25), 5, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(()))
        });
        assert_eq!(calls.load(Ordering::SeqCst), 25);
        assert_eq!(outcome.results.len(), 25);
    }

    #[test]
    fn in_flight_tasks_never_exceed_concurrency() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let outcome = run_all(files(40), 3, |_| {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Some(()))
        });

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight was {peak}");
        assert!(peak >= 1);
        assert_eq!(outcome.results.len(), 40);
    }

    #[test]
    fn empty_batch_is_empty() {
        let outcome = run_all(Vec::new(), 0, |_| Ok(Some(1u8)));
        assert!(outcome.results.is_empty());
        assert!(outcome.failures.is_empty());
    }
}
