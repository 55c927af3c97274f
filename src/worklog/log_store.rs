use serde::Serialize;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize)]
pub struct LogFile {
    pub path: PathBuf,
    pub project: String,
    pub size_bytes: u64,
    #[serde(skip)]
    pub modified: SystemTime,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub min_turns: usize,
    pub min_size_bytes: u64,
    pub subagent_marker: String,
}

const USER_TURN_MARKERS: [&str; 2] = ["\"type\":\"user\"", "\"type\": \"user\""];

/// Count user records by line prefix match, without parsing JSON.
pub fn count_user_turns(path: &Path) -> std::io::Result<usize> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut count = 0usize;
    for line in reader.split(b'\n') {
        let raw = line?;
        let decoded = String::from_utf8_lossy(&raw);
        if USER_TURN_MARKERS.iter().any(|m| decoded.contains(m)) {
            count += 1;
        }
    }
    Ok(count)
}

/// Readable project id from a session path.
///
/// Session dirs encode the working directory with `-` separators
/// (`-home-alice-code-billing`); the home prefix is stripped and the rest
/// becomes `code/billing`.
pub fn project_name_from_path(path: &Path, root: &Path, home: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let first = rel
        .components()
        .find_map(|c| match c {
            Component::Normal(seg) => Some(seg.to_string_lossy().to_string()),
            _ => None,
        })
        .unwrap_or_default();

    let home_prefix = home.to_string_lossy().replace('/', "-");
    let stripped = if !home_prefix.is_empty() && first.starts_with(&home_prefix) {
        &first[home_prefix.len()..]
    } else {
        first.as_str()
    };
    stripped.trim_matches('-').replace('-', "/")
}

fn has_marker_segment(path: &Path, root: &Path, marker: &str) -> bool {
    if marker.is_empty() {
        return false;
    }
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .any(|c| matches!(c, Component::Normal(seg) if seg.to_string_lossy() == marker))
}

fn is_session_log(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("jsonl")
}

fn inspect(
    path: &Path,
    root: &Path,
    home: &Path,
    opts: &ScanOptions,
    since: Option<SystemTime>,
) -> Option<LogFile> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "stat failed; skipping");
            return None;
        }
    };
    if meta.len() < opts.min_size_bytes {
        return None;
    }
    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    if let Some(cutoff) = since
        && modified < cutoff
    {
        return None;
    }

    let turns = match count_user_turns(path) {
        Ok(turns) => turns,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "turn scan failed; skipping");
            return None;
        }
    };
    if turns < opts.min_turns {
        return None;
    }

    Some(LogFile {
        path: path.to_path_buf(),
        project: project_name_from_path(path, root, home),
        size_bytes: meta.len(),
        modified,
    })
}

/// Eligible session logs under `root`.
///
/// With `since`, only files modified at or after it are kept and the result
/// is ordered newest first; without it the order is unspecified.
pub fn list(
    root: &Path,
    home: &Path,
    opts: &ScanOptions,
    since: Option<SystemTime>,
) -> Vec<LogFile> {
    if !root.is_dir() {
        tracing::warn!(root = %root.display(), "sessions root is not a directory");
        return Vec::new();
    }

    let mut out = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_session_log(path))
        .filter(|path| !has_marker_segment(path, root, &opts.subagent_marker))
        .filter_map(|path| inspect(&path, root, home, opts, since))
        .collect::<Vec<_>>();

    if since.is_some() {
        out.sort_by(|a, b| b.modified.cmp(&a.modified));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{ScanOptions, count_user_turns, list, project_name_from_path};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn opts(min_turns: usize, min_size_bytes: u64) -> ScanOptions {
        ScanOptions {
            min_turns,
            min_size_bytes,
            subagent_marker: "subagents".to_string(),
        }
    }

    fn user_lines(n: usize) -> String {
        (0..n)
            .map(|i| {
                format!(
                    "{{\"type\":\"user\",\"message\":{{\"content\":\"please do task number {i}\"}}}}\n"
                )
            })
            .collect()
    }

    #[test]
    fn project_name_strips_home_prefix_and_rewrites_separators() {
        let root = Path::new("/home/alice/.claude/projects");
        let path = root.join("-home-alice-code-billing/abc.jsonl");
        let got = project_name_from_path(&path, root, Path::new("/home/alice"));
        assert_eq!(got, "code/billing");
    }

    #[test]
    fn project_name_without_home_prefix_is_kept() {
        let root = Path::new("/data/projects");
        let path = root.join("-srv-tools-ci/abc.jsonl");
        let got = project_name_from_path(&path, root, Path::new("/home/alice"));
        assert_eq!(got, "srv/tools/ci");
    }

    #[test]
    fn turn_count_uses_both_marker_spellings() {
        let tmp = tempdir().expect("tempdir");
        let file = tmp.path().join("s.jsonl");
        fs::write(
            &file,
            "{\"type\":\"user\"}\n{\"type\": \"user\"}\n{\"type\":\"assistant\"}\nnot json\n",
        )
        .expect("write");
        assert_eq!(count_user_turns(&file).expect("count"), 2);
    }

    #[test]
    fn list_applies_size_turn_and_subagent_filters() {
        let tmp = tempdir().expect("tempdir");
        let root = tmp.path().join("projects");
        let proj = root.join("-home-alice-code-app");
        fs::create_dir_all(proj.join("subagents")).expect("mkdir");

        fs::write(proj.join("keep.jsonl"), user_lines(4)).expect("write keep");
        fs::write(proj.join("few.jsonl"), user_lines(1)).expect("write few");
        fs::write(proj.join("notes.txt"), user_lines(4)).expect("write txt");
        fs::write(proj.join("subagents/agent.jsonl"), user_lines(4)).expect("write agent");

        let got = list(&root, Path::new("/home/alice"), &opts(3, 10), None);
        let names: Vec<PathBuf> = got.iter().map(|f| f.path.clone()).collect();
        assert_eq!(names, vec![proj.join("keep.jsonl")]);
        assert_eq!(got[0].project, "code/app");

        let none = list(&root, Path::new("/home/alice"), &opts(3, 1_000_000), None);
        assert!(none.is_empty());
    }

    #[test]
    fn list_with_since_filters_and_sorts_newest_first() {
        let tmp = tempdir().expect("tempdir");
        let root = tmp.path().join("projects");
        let proj = root.join("p");
        fs::create_dir_all(&proj).expect("mkdir");
        let old = proj.join("old.jsonl");
        let mid = proj.join("mid.jsonl");
        let new = proj.join("new.jsonl");
        for path in [&old, &mid, &new] {
            fs::write(path, user_lines(3)).expect("write");
        }

        let now = SystemTime::now();
        let set_mtime = |path: &Path, age_secs: u64| {
            let file = fs::File::options().write(true).open(path).expect("open");
            file.set_modified(now - Duration::from_secs(age_secs))
                .expect("set mtime");
        };
        set_mtime(&old, 10 * 86_400);
        set_mtime(&mid, 2 * 86_400);
        set_mtime(&new, 60);

        let since = now - Duration::from_secs(7 * 86_400);
        let got = list(&root, Path::new("/nonexistent-home"), &opts(1, 1), Some(since));
        let order: Vec<PathBuf> = got.iter().map(|f| f.path.clone()).collect();
        assert_eq!(order, vec![new, mid]);
    }

    #[test]
    fn missing_root_yields_empty_list() {
        let tmp = tempdir().expect("tempdir");
        let got = list(&tmp.path().join("absent"), tmp.path(), &opts(0, 0), None);
        assert!(got.is_empty());
    }
}
