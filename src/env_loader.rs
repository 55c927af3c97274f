use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(
    worklog_home: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    match (worklog_home, home_dir) {
        (Some(base), _) => Some(base.join(".env")),
        (None, Some(home)) => Some(home.join(".worklog-review/.env")),
        (None, None) => None,
    }
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("WORKLOG_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::fallback_dotenv_path;
    use std::path::PathBuf;

    #[test]
    fn fallback_prefers_worklog_home() {
        let got = fallback_dotenv_path(
            Some(PathBuf::from("/workspace/review")),
            Some(PathBuf::from("/home/alice")),
        );

        let want = Some(PathBuf::from("/workspace/review/.env"));
        assert_eq!(got, want);
    }

    #[test]
    fn fallback_uses_home_when_worklog_home_unset() {
        let got = fallback_dotenv_path(None, Some(PathBuf::from("/home/alice")));
        let want = Some(PathBuf::from("/home/alice/.worklog-review/.env"));
        assert_eq!(got, want);
    }

    #[test]
    fn fallback_is_none_without_any_base() {
        assert_eq!(fallback_dotenv_path(None, None), None);
    }
}
