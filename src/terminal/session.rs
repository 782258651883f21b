//! Session data model (§3).
//!
//! A `Session` owns everything tied to one interactive shell: the PTY
//! handle, the Marker Filter, an optional Git Watcher, and the temp rc
//! path if one was generated. Mutable fields that are read far more often
//! than written (`cwd`, `current_block_id`) sit behind a `tokio::sync::RwLock`
//! per the many-readers-one-writer invariant in §3; the PTY itself is
//! already internally synchronized (see `pty.rs`).

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::git_watcher::GitWatcher;
use super::marker_filter::MarkerFilter;
use super::pty::PtyHandle;
use super::types::ShellKind;

pub struct Session {
    pub id: String,
    pub shell_kind: ShellKind,
    /// true ⇒ shell rc injection is active; false ⇒ Command Wrapper fallback.
    pub hooks_mode: bool,
    pub created_at: DateTime<Utc>,

    pub pty: Arc<PtyHandle>,
    pub marker_filter: Arc<MarkerFilter>,
    pub git_watcher: std::sync::Mutex<Option<GitWatcher>>,
    /// rc file or rc directory generated for this session, deleted exactly
    /// once at teardown by the Process Manager.
    pub temp_config_path: Option<PathBuf>,

    cwd: tokio::sync::RwLock<String>,
    current_block_id: tokio::sync::RwLock<Option<String>>,

    pub cancellation: CancellationToken,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        shell_kind: ShellKind,
        hooks_mode: bool,
        pty: Arc<PtyHandle>,
        marker_filter: Arc<MarkerFilter>,
        temp_config_path: Option<PathBuf>,
        initial_cwd: String,
    ) -> Self {
        Self {
            id,
            shell_kind,
            hooks_mode,
            created_at: Utc::now(),
            pty,
            marker_filter,
            git_watcher: std::sync::Mutex::new(None),
            temp_config_path,
            cwd: tokio::sync::RwLock::new(initial_cwd),
            current_block_id: tokio::sync::RwLock::new(None),
            cancellation: CancellationToken::new(),
        }
    }

    pub async fn cwd(&self) -> String {
        self.cwd.read().await.clone()
    }

    pub async fn set_cwd(&self, path: String) {
        *self.cwd.write().await = path;
    }

    pub async fn current_block_id(&self) -> Option<String> {
        self.current_block_id.read().await.clone()
    }

    pub async fn set_current_block_id(&self, block_id: Option<String>) {
        *self.current_block_id.write().await = block_id;
    }

    /// Generate a fresh block id and make it current, returning it.
    pub async fn start_new_block(&self) -> String {
        let block_id = uuid::Uuid::new_v4().to_string();
        self.set_current_block_id(Some(block_id.clone())).await;
        block_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::pty::SpawnConfig;

    fn dummy_pty() -> Arc<PtyHandle> {
        let config = SpawnConfig {
            rows: 24,
            cols: 80,
            shell_path: PathBuf::from(if cfg!(windows) { "cmd.exe" } else { "/bin/sh" }),
            args: vec![],
            cwd: None,
            env: vec![],
        };
        Arc::new(PtyHandle::spawn(config).expect("spawn a throwaway shell for the test"))
    }

    #[tokio::test]
    async fn current_block_id_round_trips() {
        let session = Session::new(
            "s1".into(),
            ShellKind::Sh,
            false,
            dummy_pty(),
            Arc::new(MarkerFilter::new()),
            None,
            "/tmp".into(),
        );
        assert_eq!(session.current_block_id().await, None);
        let block = session.start_new_block().await;
        assert_eq!(session.current_block_id().await, Some(block));
    }

    #[tokio::test]
    async fn cwd_round_trips() {
        let session = Session::new(
            "s2".into(),
            ShellKind::Sh,
            false,
            dummy_pty(),
            Arc::new(MarkerFilter::new()),
            None,
            "/tmp".into(),
        );
        assert_eq!(session.cwd().await, "/tmp");
        session.set_cwd("/home/user".into()).await;
        assert_eq!(session.cwd().await, "/home/user");
    }
}
