//! Session Registry (§4.1).
//!
//! A map from session id to `Session` guarded by a readers/writer lock, per
//! the explicit "readers/writer lock" wording in §5 — a `DashMap` would
//! work too, but closing a session needs to hold the write side across an
//! `await` (PTY teardown, child wait), which a sharded lock-free map
//! doesn't model cleanly.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::config_generator::ShellConfigGenerator;
use super::session::Session;

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Last-writer-wins on duplicate id, matching §4.1.
    pub async fn add(&self, session: Arc<Session>) {
        self.sessions.write().await.insert(session.id.clone(), session);
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(id)
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn for_each(&self, mut f: impl FnMut(&Session)) {
        for session in self.sessions.read().await.values() {
            f(session);
        }
    }

    /// Tear down one session: cancel the read loop, kill the PTY process
    /// group, and delete the temp rc path. Every step is best-effort —
    /// errors are logged and swallowed, teardown is never blocked on them.
    pub async fn close_session(&self, id: &str, config_gen: &ShellConfigGenerator) {
        let Some(session) = self.remove(id).await else {
            return;
        };
        teardown(&session, config_gen);
    }

    pub async fn close_all(&self, config_gen: &ShellConfigGenerator) {
        let sessions: Vec<Arc<Session>> = {
            let mut map = self.sessions.write().await;
            map.drain().map(|(_, s)| s).collect()
        };
        for session in &sessions {
            teardown(session, config_gen);
        }
    }
}

fn teardown(session: &Session, config_gen: &ShellConfigGenerator) {
    session.cancellation.cancel();

    if let Err(e) = session.pty.kill_process_group() {
        tracing::warn!("session {}: failed to kill process group: {}", session.id, e);
    }

    if let Some(watcher) = session.git_watcher.lock().unwrap().take() {
        watcher.stop();
    }

    if let Some(path) = &session.temp_config_path {
        config_gen.cleanup(path);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::marker_filter::MarkerFilter;
    use crate::terminal::pty::{PtyHandle, SpawnConfig};
    use crate::terminal::types::ShellKind;
    use std::path::PathBuf;

    fn dummy_session(id: &str) -> Arc<Session> {
        let config = SpawnConfig {
            rows: 24,
            cols: 80,
            shell_path: PathBuf::from(if cfg!(windows) { "cmd.exe" } else { "/bin/sh" }),
            args: vec![],
            cwd: None,
            env: vec![],
        };
        let pty = Arc::new(PtyHandle::spawn(config).expect("spawn a throwaway shell"));
        Arc::new(Session::new(
            id.to_string(),
            ShellKind::Sh,
            false,
            pty,
            Arc::new(MarkerFilter::new()),
            None,
            "/tmp".into(),
        ))
    }

    #[tokio::test]
    async fn add_get_remove_round_trip() {
        let registry = SessionRegistry::new();
        registry.add(dummy_session("a")).await;
        assert!(registry.get("a").await.is_some());
        assert_eq!(registry.count().await, 1);
        registry.remove("a").await;
        assert!(registry.get("a").await.is_none());
    }

    #[tokio::test]
    async fn close_session_is_idempotent() {
        let registry = SessionRegistry::new();
        let config_gen = ShellConfigGenerator::new();
        registry.add(dummy_session("b")).await;
        registry.close_session("b", &config_gen).await;
        assert!(registry.get("b").await.is_none());
        // Closing again must not panic or error.
        registry.close_session("b", &config_gen).await;
    }

    #[tokio::test]
    async fn ids_reflects_membership() {
        let registry = SessionRegistry::new();
        registry.add(dummy_session("c")).await;
        registry.add(dummy_session("d")).await;
        let mut ids = registry.ids().await;
        ids.sort();
        assert_eq!(ids, vec!["c".to_string(), "d".to_string()]);
    }
}
