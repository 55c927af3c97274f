use anyhow::Result;
use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Return the current Unix epoch in seconds.
pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Keep at most `max_chars` Unicode characters of `input`.
pub fn take_chars(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => input[..byte_idx].to_string(),
        None => input.to_string(),
    }
}

/// Shorten `input` for log lines and warning labels.
pub fn truncate_with_ellipsis(input: &str, max_chars: usize) -> String {
    let clean: String = input.chars().filter(|c| !c.is_control()).collect();
    if clean.chars().count() > max_chars {
        let mut s = take_chars(&clean, max_chars);
        s.push('…');
        s
    } else {
        clean
    }
}

#[derive(Debug)]
pub enum CommandFailure {
    TimedOut,
    Io(std::io::Error),
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

fn collect_until(
    rx: &mpsc::Receiver<Vec<u8>>,
    deadline: Instant,
) -> std::result::Result<Vec<u8>, CommandFailure> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    match rx.recv_timeout(remaining) {
        Ok(buf) => Ok(buf),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(CommandFailure::TimedOut),
        Err(mpsc::RecvTimeoutError::Disconnected) => Ok(Vec::new()),
    }
}

/// Run `cmd` to completion, killing it once `timeout` elapses.
///
/// stdout and stderr are drained on helper threads so a chatty child cannot
/// block on a full pipe while we wait. The deadline also bounds the drain: a
/// background process that inherited the pipes cannot hold the call open.
pub fn run_command_with_timeout(
    cmd: &mut Command,
    timeout: Duration,
) -> std::result::Result<Output, CommandFailure> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    let deadline = Instant::now() + timeout;
    let mut child = cmd.spawn().map_err(CommandFailure::Io)?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        if let Some(status) = child.try_wait().map_err(CommandFailure::Io)? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CommandFailure::TimedOut);
        }
        thread::sleep(Duration::from_millis(50));
    };

    Ok(Output {
        status,
        stdout: collect_until(&stdout, deadline)?,
        stderr: collect_until(&stderr, deadline)?,
    })
}
