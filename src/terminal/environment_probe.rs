//! Environment Probe (§4.10).
//!
//! One-shot inspection of a working directory: home-relative path
//! shortening, Python/virtualenv detection, and an initial Git snapshot.
//! All external state is read via subprocess (`git`, `python3`/`python`)
//! or process environment variables — never parsed from disk formats
//! directly, and absence of either tool degrades to a negative result
//! rather than failing the probe.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::types::{EnvType, EnvironmentInfo, GitInfo, PythonEnv};

const GIT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);
const PYTHON_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

pub fn get_environment_info(work_path: &str) -> EnvironmentInfo {
    EnvironmentInfo {
        work_path: shorten_home(work_path),
        python_env: detect_python_env(),
        git_info: query_git_info(Path::new(work_path)),
    }
}

/// Replace a leading `$HOME` (or `$HOME` + separator) with `~`.
pub fn shorten_home(path: &str) -> String {
    let Some(home) = dirs::home_dir() else {
        return path.to_string();
    };
    let home = home.to_string_lossy().into_owned();
    if path == home {
        return "~".to_string();
    }
    if let Some(rest) = path.strip_prefix(&home) {
        if rest.starts_with(std::path::MAIN_SEPARATOR) {
            return format!("~{rest}");
        }
    }
    path.to_string()
}

/// Inverse of `shorten_home`: expand a leading `~` (or `~` + separator)
/// back to the real home directory. Paths without a leading `~` pass
/// through unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    let Some(rest) = path.strip_prefix('~') else {
        return PathBuf::from(path);
    };
    let Some(home) = dirs::home_dir() else {
        return PathBuf::from(path);
    };
    if rest.is_empty() {
        return home;
    }
    match rest.strip_prefix(std::path::MAIN_SEPARATOR) {
        Some(tail) => home.join(tail),
        None => PathBuf::from(path),
    }
}

fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Option<String> {
    let start = std::time::Instant::now();
    let mut child = cmd.stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .spawn()
        .ok()?;

    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(_) => return None,
        }
    }

    let output = child.wait_with_output().ok()?;
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn git(work_path: &Path, args: &[&str]) -> Option<String> {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(work_path);
    run_with_timeout(cmd, GIT_COMMAND_TIMEOUT)
}

/// Compute Git status by invoking the `git` binary directly in `work_path`.
/// Used both by the probe and by the Watcher's debounce-triggered re-query.
pub fn query_git_info(work_path: &Path) -> GitInfo {
    let is_repo = git(work_path, &["rev-parse", "--is-inside-work-tree"])
        .map(|s| s == "true")
        .unwrap_or(false);

    if !is_repo {
        return GitInfo::default();
    }

    let branch = git(work_path, &["branch", "--show-current"]).filter(|s| !s.is_empty());

    let (modified_files, added_lines, deleted_lines) = git(work_path, &["diff", "--numstat"])
        .map(|out| parse_numstat(&out))
        .unwrap_or((0, 0, 0));
    let (staged_files, staged_added, staged_deleted) =
        git(work_path, &["diff", "--cached", "--numstat"])
            .map(|out| parse_numstat(&out))
            .unwrap_or((0, 0, 0));

    GitInfo {
        is_repo: true,
        branch,
        modified_files: modified_files + staged_files,
        added_lines: added_lines + staged_added,
        deleted_lines: deleted_lines + staged_deleted,
    }
}

fn parse_numstat(output: &str) -> (u32, u32, u32) {
    let mut files = 0u32;
    let mut added = 0u32;
    let mut deleted = 0u32;
    for line in output.lines() {
        let mut parts = line.split_whitespace();
        let (Some(a), Some(d)) = (parts.next(), parts.next()) else {
            continue;
        };
        files += 1;
        added += a.parse::<u32>().unwrap_or(0);
        deleted += d.parse::<u32>().unwrap_or(0);
    }
    (files, added, deleted)
}

fn detect_python_env() -> PythonEnv {
    let version = run_with_timeout(
        {
            let mut cmd = Command::new("python3");
            cmd.arg("--version");
            cmd
        },
        PYTHON_COMMAND_TIMEOUT,
    )
    .filter(|s| !s.is_empty())
    .or_else(|| {
        run_with_timeout(
            {
                let mut cmd = Command::new("python");
                cmd.arg("--version");
                cmd
            },
            PYTHON_COMMAND_TIMEOUT,
        )
        .filter(|s| !s.is_empty())
    });

    let has_python = version.is_some();
    let (env_active, env_type, env_name, env_path) = detect_active_virtualenv();

    PythonEnv {
        has_python,
        version,
        env_active,
        env_type,
        env_name,
        env_path,
    }
}

/// Priority order per §4: conda → pipenv → poetry → venv, stopping at the
/// first environment variable set that indicates an active environment.
fn detect_active_virtualenv() -> (bool, Option<EnvType>, Option<String>, Option<String>) {
    if let Ok(name) = std::env::var("CONDA_DEFAULT_ENV") {
        if !name.is_empty() {
            let path = std::env::var("CONDA_PREFIX").ok();
            return (true, Some(EnvType::Conda), Some(name), path);
        }
    }
    if std::env::var("PIPENV_ACTIVE").map(|v| v == "1").unwrap_or(false) {
        let path = std::env::var("VIRTUAL_ENV").ok();
        let name = path
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
            .map(|n| n.to_string_lossy().into_owned());
        return (true, Some(EnvType::Pipenv), name, path);
    }
    if std::env::var("POETRY_ACTIVE").map(|v| v == "1").unwrap_or(false) {
        let path = std::env::var("VIRTUAL_ENV").ok();
        let name = path
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
            .map(|n| n.to_string_lossy().into_owned());
        return (true, Some(EnvType::Poetry), name, path);
    }
    if let Ok(path) = std::env::var("VIRTUAL_ENV") {
        if !path.is_empty() {
            let name = Path::new(&path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            return (true, Some(EnvType::Venv), name, Some(path));
        }
    }
    (false, None, None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorten_home_collapses_prefix() {
        if let Some(home) = dirs::home_dir() {
            let path = home.join("projects").join("boxify");
            let shortened = shorten_home(&path.to_string_lossy());
            assert!(shortened.starts_with('~'));
        }
    }

    #[test]
    fn shorten_home_leaves_unrelated_paths_alone() {
        assert_eq!(shorten_home("/var/log"), "/var/log");
    }

    #[test]
    fn expand_home_reverses_shorten_home() {
        if let Some(home) = dirs::home_dir() {
            let expanded = expand_home("~/projects/boxify");
            assert_eq!(expanded, home.join("projects").join("boxify"));
        }
    }

    #[test]
    fn expand_home_bare_tilde_is_home_dir() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~"), home);
        }
    }

    #[test]
    fn expand_home_leaves_unrelated_paths_alone() {
        assert_eq!(expand_home("/var/log"), PathBuf::from("/var/log"));
    }

    #[test]
    fn parse_numstat_sums_files_and_lines() {
        let (files, added, deleted) = parse_numstat("3\t1\tfoo.rs\n10\t0\tbar.rs\n");
        assert_eq!(files, 2);
        assert_eq!(added, 13);
        assert_eq!(deleted, 1);
    }

    #[test]
    fn query_git_info_on_non_repo_reports_not_a_repo() {
        let dir = std::env::temp_dir().join("boxify_env_probe_test_not_repo");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let info = query_git_info(&dir);
        assert!(!info.is_repo);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
