//! Process Manager (§4.5).
//!
//! Spawns a shell under a PTY using whatever the Shell Config Generator
//! produced (or plain argv, if hooks aren't available or generation
//! failed), and owns the Create/Resize/WriteInitialCommand/Cleanup
//! lifecycle operations on the resulting process.

use std::path::PathBuf;
use std::sync::Arc;

use super::config_generator::ShellConfigGenerator;
use super::pty::{PtyError, PtyHandle, SpawnConfig};
use super::types::ProcessOptions;

#[derive(Debug, thiserror::Error)]
pub enum ProcessManagerError {
    #[error("pty error: {0}")]
    Pty(#[from] PtyError),
}

/// A freshly spawned shell process plus the bookkeeping the rest of the
/// core needs: whether hooks are active, and the temp config path (if
/// any) that must be deleted exactly once at teardown.
pub struct Process {
    pub pty: Arc<PtyHandle>,
    pub temp_config_path: Option<PathBuf>,
    pub uses_hooks: bool,
}

pub struct ProcessManager {
    config_gen: ShellConfigGenerator,
}

impl ProcessManager {
    pub fn new(config_gen: ShellConfigGenerator) -> Self {
        Self { config_gen }
    }

    pub fn create_process(&self, opts: &ProcessOptions) -> Result<Process, ProcessManagerError> {
        let mut args: Vec<String> = vec![];
        let mut env: Vec<(String, String)> = vec![
            ("TERM".to_string(), "xterm-256color".to_string()),
            ("COLORTERM".to_string(), "truecolor".to_string()),
            ("BOXIFY_SESSION_ID".to_string(), opts.session_id.clone()),
        ];
        let mut temp_config_path = None;
        let mut uses_hooks = false;

        if opts.kind.supports_hooks() {
            match self.config_gen.generate(opts.kind, &opts.session_id) {
                Ok(generated) => {
                    args = generated.args;
                    env.extend(generated.env);
                    temp_config_path = Some(generated.path);
                    uses_hooks = true;
                }
                Err(e) => {
                    tracing::warn!(
                        "process manager: config generation failed for session {} ({}), falling back to non-hooks mode",
                        opts.session_id,
                        e
                    );
                }
            }
        }

        let spawn_config = SpawnConfig {
            rows: opts.rows,
            cols: opts.cols,
            shell_path: opts.shell_path.clone(),
            args,
            cwd: opts.work_path.clone(),
            env,
        };

        let pty = match PtyHandle::spawn(spawn_config) {
            Ok(pty) => pty,
            Err(e) => {
                if let Some(path) = &temp_config_path {
                    self.config_gen.cleanup(path);
                }
                return Err(e.into());
            }
        };

        Ok(Process {
            pty: Arc::new(pty),
            temp_config_path,
            uses_hooks,
        })
    }

    pub fn resize(&self, pty: &PtyHandle, rows: u16, cols: u16) -> Result<(), ProcessManagerError> {
        pty.resize(cols, rows)?;
        Ok(())
    }

    pub fn write_initial_command(&self, pty: &PtyHandle, cmd: &str) -> Result<(), ProcessManagerError> {
        if cmd.is_empty() {
            return Ok(());
        }
        let mut to_write = cmd.to_string();
        if !to_write.ends_with('\n') {
            to_write.push('\n');
        }
        pty.write(to_write.as_bytes())?;
        Ok(())
    }

    /// Best-effort teardown: kill the process group, wait, then delete the
    /// temp config path. Every step logs and swallows its own errors.
    pub fn cleanup(&self, process: &Process) {
        if let Err(e) = process.pty.kill_process_group() {
            tracing::warn!("process manager: failed to kill process group: {}", e);
        }
        if let Some(path) = &process.temp_config_path {
            self.config_gen.cleanup(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::types::ShellKind;

    #[test]
    fn create_process_for_sh_has_no_hooks() {
        let manager = ProcessManager::new(ShellConfigGenerator::new());
        let opts = ProcessOptions {
            session_id: "test-pm-1".to_string(),
            kind: ShellKind::Sh,
            shell_path: PathBuf::from(if cfg!(windows) { "cmd.exe" } else { "/bin/sh" }),
            rows: 24,
            cols: 80,
            work_path: None,
        };
        let process = manager.create_process(&opts).expect("spawn should succeed");
        assert!(!process.uses_hooks);
        assert!(process.temp_config_path.is_none());
        manager.cleanup(&process);
    }

    #[cfg(unix)]
    #[test]
    fn create_process_for_bash_generates_hooks() {
        let bash = which_bash();
        let Some(bash_path) = bash else {
            return; // bash unavailable in this environment; skip.
        };
        let manager = ProcessManager::new(ShellConfigGenerator::new());
        let opts = ProcessOptions {
            session_id: "test-pm-2".to_string(),
            kind: ShellKind::Bash,
            shell_path: bash_path,
            rows: 24,
            cols: 80,
            work_path: None,
        };
        let process = manager.create_process(&opts).expect("spawn should succeed");
        assert!(process.uses_hooks);
        assert!(process.temp_config_path.is_some());
        manager.cleanup(&process);
    }

    #[cfg(unix)]
    fn which_bash() -> Option<PathBuf> {
        std::env::split_paths(&std::env::var_os("PATH")?)
            .map(|dir| dir.join("bash"))
            .find(|p| p.is_file())
    }
}
