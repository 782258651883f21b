//! Low-level PTY handle.
//!
//! Wraps `portable-pty` behind a thread-safe interface. Generalized from
//! the profile/Oh-My-Posh-aware local-terminal PTY wrapper to the plainer
//! needs of the Process Manager: spawn with an explicit argv/env supplied
//! by the caller (the Shell Config Generator or Command Wrapper having
//! already decided what those are), read/write, resize, and tear down the
//! whole process group on drop.

use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("failed to create pty: {0}")]
    CreateFailed(String),
    #[error("failed to spawn shell: {0}")]
    SpawnFailed(String),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("pty system error: {0}")]
    PtySystemError(String),
    #[error("lock error")]
    LockError,
}

/// Everything needed to spawn a shell process in a PTY.
#[derive(Clone, Debug)]
pub struct SpawnConfig {
    pub rows: u16,
    pub cols: u16,
    pub shell_path: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

/// Thread-safe PTY handle.
///
/// `MasterPty` is not `Sync`, so the master/child/reader/writer each sit
/// behind a standard `Mutex` and every operation goes through this
/// wrapper rather than touching the trait objects directly.
pub struct PtyHandle {
    master: StdMutex<Box<dyn MasterPty + Send>>,
    child: StdMutex<Box<dyn portable_pty::Child + Send + Sync>>,
    reader: Arc<StdMutex<Box<dyn Read + Send>>>,
    writer: Arc<StdMutex<Box<dyn Write + Send>>>,
}

unsafe impl Sync for PtyHandle {}

impl PtyHandle {
    pub fn spawn(config: SpawnConfig) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: config.rows,
                cols: config.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::CreateFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&config.shell_path);
        for arg in &config.args {
            cmd.arg(arg);
        }

        if let Some(cwd) = &config.cwd {
            cmd.cwd(cwd);
        } else if let Ok(home) = std::env::var("HOME") {
            cmd.cwd(home);
        } else if let Ok(userprofile) = std::env::var("USERPROFILE") {
            cmd.cwd(userprofile);
        }

        for (key, value) in std::env::vars() {
            cmd.env(key, value);
        }
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");

        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        #[cfg(unix)]
        {
            if let Ok(mut path) = std::env::var("PATH") {
                let additional_paths = ["/usr/local/bin", "/usr/local/sbin", "/opt/homebrew/bin"];
                for p in additional_paths {
                    if !path.contains(p) && std::path::Path::new(p).exists() {
                        path.push(':');
                        path.push_str(p);
                    }
                }
                cmd.env("PATH", path);
            }
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::PtySystemError(format!("failed to clone reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::PtySystemError(format!("failed to take writer: {e}")))?;

        Ok(Self {
            master: StdMutex::new(pair.master),
            child: StdMutex::new(child),
            reader: Arc::new(StdMutex::new(reader)),
            writer: Arc::new(StdMutex::new(writer)),
        })
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        let master = self.master.lock().map_err(|_| PtyError::LockError)?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::PtySystemError(e.to_string()))
    }

    pub fn write(&self, data: &[u8]) -> Result<usize, PtyError> {
        let mut writer = self.writer.lock().map_err(|_| PtyError::LockError)?;
        let n = writer.write(data)?;
        writer.flush()?;
        Ok(n)
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize, PtyError> {
        let mut reader = self.reader.lock().map_err(|_| PtyError::LockError)?;
        Ok(reader.read(buf)?)
    }

    pub fn clone_reader(&self) -> Arc<StdMutex<Box<dyn Read + Send>>> {
        self.reader.clone()
    }

    pub fn is_alive(&self) -> bool {
        if let Ok(mut child) = self.child.lock() {
            matches!(child.try_wait(), Ok(None))
        } else {
            false
        }
    }

    pub fn kill(&self) -> Result<(), PtyError> {
        let mut child = self.child.lock().map_err(|_| PtyError::LockError)?;
        child
            .kill()
            .map_err(|e| PtyError::PtySystemError(e.to_string()))
    }

    #[cfg(unix)]
    pub fn kill_process_group(&self) -> Result<(), PtyError> {
        if let Some(pid) = self.pid() {
            tracing::debug!("killing process group for pid {}", pid);
            let pgid = Pid::from_raw(pid as i32);

            if let Err(e) = killpg(pgid, Signal::SIGTERM) {
                tracing::warn!("failed to send SIGTERM to process group {}: {}", pid, e);
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                tracing::debug!(
                    "SIGKILL to process group {} (may have already exited): {}",
                    pid,
                    e
                );
            }
            Ok(())
        } else {
            self.kill()
        }
    }

    #[cfg(windows)]
    pub fn kill_process_group(&self) -> Result<(), PtyError> {
        if let Some(pid) = self.pid() {
            tracing::debug!("killing process tree for pid {} (windows)", pid);
            let _ = std::process::Command::new("taskkill")
                .args(["/F", "/T", "/PID", &pid.to_string()])
                .output();
        }
        self.kill()
    }

    pub fn pid(&self) -> Option<u32> {
        if let Ok(child) = self.child.lock() {
            child.process_id()
        } else {
            None
        }
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        tracing::debug!("dropping pty, killing process group");
        let _ = self.kill_process_group();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_config_carries_dimensions() {
        let config = SpawnConfig {
            rows: 24,
            cols: 80,
            shell_path: PathBuf::from("/bin/sh"),
            args: vec![],
            cwd: None,
            env: vec![],
        };
        assert_eq!(config.rows, 24);
        assert_eq!(config.cols, 80);
    }
}
