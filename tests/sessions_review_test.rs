use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write_fake_claude(path: &Path, body: &str) {
    fs::write(path, body).expect("write fake claude");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("chmod");
    }
}

fn write_log(path: &Path, user_turns: usize) {
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    let lines = (0..user_turns)
        .flat_map(|i| {
            [
                json!({"type": "user", "message": {"role": "user", "content": format!("refactor the parser module step {i}")}}),
                json!({"type": "assistant", "message": {"role": "assistant", "content": "Refactored."}}),
            ]
        })
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(path, lines).expect("write log");
}

fn base_cmd(root: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("worklog-review");
    cmd.current_dir(root)
        .env("HOME", root.join("home"))
        .env("WORKLOG_HOME", root.join("worklog"))
        .env("WORKLOG_SESSIONS_DIR", root.join("sessions"))
        .env("WORKLOG_REPORTS_DIR", root.join("reports"))
        .env("WORKLOG_CLAUDE_BIN", root.join("claude"))
        .env("WORKLOG_TOKEN_FILE", root.join("no-token"))
        .env("WORKLOG_MIN_SIZE_BYTES", "0")
        .env("WORKLOG_TIMEZONE", "UTC")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn sessions_lists_eligible_logs_and_skips_subagents() {
    let tmp = tempdir().expect("tempdir");
    let sessions = tmp.path().join("sessions");
    write_log(&sessions.join("-srv-code-parser/main.jsonl"), 4);
    write_log(&sessions.join("-srv-code-parser/subagents/helper.jsonl"), 4);
    write_log(&sessions.join("-srv-code-tiny/short.jsonl"), 1);
    fs::write(sessions.join("-srv-code-parser/notes.txt"), "ignored").expect("write");

    base_cmd(tmp.path())
        .arg("sessions")
        .assert()
        .success()
        .stdout(predicate::str::contains("sessions.count=1"))
        .stdout(predicate::str::contains("project=srv/code/parser"))
        .stdout(predicate::str::contains("helper.jsonl").not());

    base_cmd(tmp.path())
        .arg("sessions")
        .args(["--min-turns", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sessions.count=2"));
}

#[test]
fn sessions_reports_missing_root_as_issue() {
    let tmp = tempdir().expect("tempdir");

    base_cmd(tmp.path())
        .arg("sessions")
        .assert()
        .failure()
        .stderr(predicate::str::contains("sessions dir missing"));
}

#[test]
fn review_classifies_whole_sessions_and_combines_synopses() {
    let tmp = tempdir().expect("tempdir");
    write_fake_claude(
        &tmp.path().join("claude"),
        "#!/usr/bin/env bash\nprintf 'PRIORITY: TOOLING: Parser cleanup\\nSUMMARY:\\n- split the parser\\n'\n",
    );
    write_log(&tmp.path().join("sessions/-srv-code-parser/main.jsonl"), 4);

    let out = base_cmd(tmp.path())
        .arg("review")
        .args(["--days", "2", "--print"])
        .output()
        .expect("run review");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let review: Value = serde_json::from_slice(&out.stdout).expect("review json");
    assert_eq!(review["priority_breakdown"]["by_user_turns"]["TOOLING"], 4);
    assert_eq!(review["priority_breakdown"]["percentage_of_effort"]["TOOLING"], 100.0);
    assert_eq!(review["projects"][0]["project"], "srv/code/parser");

    let saved = fs::read_dir(tmp.path().join("reports").join("review"))
        .expect("review dir")
        .count();
    assert_eq!(saved, 1);
}

#[test]
fn review_rejects_zero_days() {
    let tmp = tempdir().expect("tempdir");

    base_cmd(tmp.path())
        .arg("review")
        .args(["--days", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid report window"));
}
