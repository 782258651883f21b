//! Git Watcher (§4.9).
//!
//! Watches a session's `.git` directory for writes and re-queries status
//! on a debounce, pushing `terminal:git_update` events. Status itself is
//! always computed by shelling out to `git` — the core never parses
//! packfiles or refs directly, mirroring how this codebase probes
//! external environments rather than reimplementing their internals.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::environment_probe::query_git_info;
use super::events::{EventEmitter, TerminalEvent};
use super::types::GitInfo;

const DEBOUNCE: Duration = Duration::from_millis(500);

pub struct GitWatcher {
    work_path: PathBuf,
    cancellation: CancellationToken,
    _watcher: Mutex<Option<RecommendedWatcher>>,
}

impl GitWatcher {
    /// Resolve the repo's real git dir, open a watcher on it, and spawn the
    /// debounce/status loop. Returns the initial status snapshot.
    pub fn start(
        session_id: String,
        work_path: PathBuf,
        emitter: Arc<dyn EventEmitter>,
    ) -> (Self, GitInfo) {
        let git_dir = resolve_git_dir(&work_path);

        let Some(git_dir) = git_dir else {
            return (
                Self {
                    work_path,
                    cancellation: CancellationToken::new(),
                    _watcher: Mutex::new(None),
                },
                GitInfo {
                    is_repo: false,
                    ..Default::default()
                },
            );
        };

        let initial = query_git_info(&work_path);

        let cancellation = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<()>(64);

        let mut watcher = match notify::recommended_watcher(move |res: notify::Result<Event>| {
            if res.is_ok() {
                let _ = tx.try_send(());
            }
        }) {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!("git watcher: failed to create watcher for {}: {}", session_id, e);
                return (
                    Self {
                        work_path,
                        cancellation,
                        _watcher: Mutex::new(None),
                    },
                    initial,
                );
            }
        };

        for path in [git_dir.join("HEAD"), git_dir.join("index"), git_dir.join("refs")] {
            if path.exists() {
                let mode = if path.is_dir() {
                    RecursiveMode::Recursive
                } else {
                    RecursiveMode::NonRecursive
                };
                if let Err(e) = watcher.watch(&path, mode) {
                    tracing::debug!("git watcher: failed to watch {:?}: {}", path, e);
                }
            }
        }

        let loop_cancellation = cancellation.clone();
        let loop_work_path = work_path.clone();
        let loop_session_id = session_id.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_cancellation.cancelled() => break,
                    received = rx.recv() => {
                        if received.is_none() {
                            break;
                        }
                    }
                }

                // Debounce: keep draining events that arrive within the window.
                loop {
                    tokio::select! {
                        _ = loop_cancellation.cancelled() => return,
                        _ = tokio::time::sleep(DEBOUNCE) => break,
                        more = rx.recv() => {
                            if more.is_none() {
                                return;
                            }
                        }
                    }
                }

                let git = query_git_info(&loop_work_path);
                emitter.emit(TerminalEvent::GitUpdate {
                    session_id: loop_session_id.clone(),
                    git,
                });
            }
        });

        (
            Self {
                work_path,
                cancellation,
                _watcher: Mutex::new(Some(watcher)),
            },
            initial,
        )
    }

    /// §4.9 `UpdateWorkPath`: no-op (besides a fresh status query) if the
    /// directory hasn't changed; otherwise stop the current watch and start
    /// a new one against `new_work_path`, so a session that `cd`s into a
    /// different repository doesn't keep reporting the old one's status.
    pub fn update_work_path(
        self,
        session_id: String,
        new_work_path: PathBuf,
        emitter: Arc<dyn EventEmitter>,
    ) -> (Self, GitInfo) {
        if new_work_path == self.work_path {
            let info = query_git_info(&self.work_path);
            return (self, info);
        }
        self.stop();
        GitWatcher::start(session_id, new_work_path, emitter)
    }

    pub fn stop(self) {
        self.cancellation.cancel();
    }
}

fn resolve_git_dir(work_path: &Path) -> Option<PathBuf> {
    let dot_git = work_path.join(".git");
    if dot_git.is_dir() {
        return Some(dot_git);
    }
    if dot_git.is_file() {
        if let Ok(contents) = std::fs::read_to_string(&dot_git) {
            if let Some(rest) = contents.trim().strip_prefix("gitdir: ") {
                let linked = PathBuf::from(rest);
                let linked = if linked.is_absolute() {
                    linked
                } else {
                    work_path.join(linked)
                };
                if linked.is_dir() {
                    return Some(linked);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_git_dir_missing_returns_none() {
        let dir = std::env::temp_dir().join("boxify_git_watcher_test_missing");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        assert!(resolve_git_dir(&dir).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn resolve_git_dir_finds_plain_dot_git() {
        let dir = std::env::temp_dir().join("boxify_git_watcher_test_plain");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join(".git")).unwrap();
        assert_eq!(resolve_git_dir(&dir), Some(dir.join(".git")));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn resolve_git_dir_follows_gitdir_file() {
        let dir = std::env::temp_dir().join("boxify_git_watcher_test_worktree");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let real = dir.join("real_git_dir");
        std::fs::create_dir_all(&real).unwrap();
        std::fs::write(dir.join(".git"), format!("gitdir: {}\n", real.display())).unwrap();
        assert_eq!(resolve_git_dir(&dir), Some(real));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn update_work_path_is_noop_when_unchanged() {
        let dir = std::env::temp_dir().join("boxify_git_watcher_test_update_noop");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let emitter: Arc<dyn EventEmitter> = Arc::new(crate::terminal::events::NullEmitter);
        let (watcher, _) = GitWatcher::start("s1".to_string(), dir.clone(), emitter.clone());
        let (watcher, info) = watcher.update_work_path("s1".to_string(), dir.clone(), emitter);

        assert!(!info.is_repo);
        assert_eq!(watcher.work_path, dir);
        watcher.stop();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn update_work_path_restarts_watch_on_change() {
        let dir_a = std::env::temp_dir().join("boxify_git_watcher_test_update_a");
        let dir_b = std::env::temp_dir().join("boxify_git_watcher_test_update_b");
        let _ = std::fs::remove_dir_all(&dir_a);
        let _ = std::fs::remove_dir_all(&dir_b);
        std::fs::create_dir_all(&dir_a).unwrap();
        std::fs::create_dir_all(&dir_b).unwrap();

        let emitter: Arc<dyn EventEmitter> = Arc::new(crate::terminal::events::NullEmitter);
        let (watcher, _) = GitWatcher::start("s1".to_string(), dir_a.clone(), emitter.clone());
        let (watcher, _) = watcher.update_work_path("s1".to_string(), dir_b.clone(), emitter);

        assert_eq!(watcher.work_path, dir_b);
        watcher.stop();
        let _ = std::fs::remove_dir_all(&dir_a);
        let _ = std::fs::remove_dir_all(&dir_b);
    }
}
