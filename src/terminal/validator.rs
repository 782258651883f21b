//! Validator (§4.3).
//!
//! Sanity-checks terminal configs before anything is spawned, and
//! optionally probes an initial command in a throwaway PTY so `TestConfig`
//! can report back without touching a live session.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::pty::{PtyHandle, SpawnConfig};
use super::shell_detector::ShellDetector;
use super::types::{
    InitialCommandProbeResult, ShellKind, TerminalConfig, ValidationResult, DEFAULT_COLS,
    DEFAULT_ROWS, MAX_COLS, MAX_INITIAL_COMMAND_LEN, MAX_ROWS,
};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_BUFFER_CAP: usize = 64 * 1024;

pub struct Validator {
    detector: ShellDetector,
}

impl Validator {
    pub fn new(detector: ShellDetector) -> Self {
        Self { detector }
    }

    pub fn validate_basic(&self, config: &TerminalConfig) -> ValidationResult {
        if config.rows > MAX_ROWS {
            return ValidationResult {
                valid: false,
                message: format!("rows out of range: {} > {}", config.rows, MAX_ROWS),
                ..Default::default()
            };
        }
        if config.cols > MAX_COLS {
            return ValidationResult {
                valid: false,
                message: format!("cols out of range: {} > {}", config.cols, MAX_COLS),
                ..Default::default()
            };
        }

        let resolved_work_path = match &config.work_path {
            Some(p) if !p.is_empty() => {
                let path = PathBuf::from(p);
                if !path.is_dir() {
                    return ValidationResult {
                        valid: false,
                        message: format!("work path does not exist or is not a directory: {p}"),
                        ..Default::default()
                    };
                }
                p.clone()
            }
            _ => dirs::home_dir()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        let resolved_shell_path = match self.detector.detect(config.shell) {
            Ok(path) => path,
            Err(e) => {
                return ValidationResult {
                    valid: false,
                    message: format!("shell not found: {e}"),
                    ..Default::default()
                };
            }
        };

        let resolved_shell_kind = if config.shell == ShellKind::Auto {
            self.detector.classify_by_path(&resolved_shell_path)
        } else {
            config.shell
        };

        ValidationResult {
            valid: true,
            message: String::new(),
            resolved_shell_path: Some(resolved_shell_path),
            resolved_shell_kind: Some(resolved_shell_kind),
            resolved_work_path: Some(resolved_work_path),
        }
    }

    pub fn validate_initial_command_format(cmd: &str) -> Result<(), String> {
        if cmd.trim().is_empty() {
            return Err("initial command is blank".to_string());
        }
        if cmd.len() > MAX_INITIAL_COMMAND_LEN {
            return Err(format!(
                "initial command exceeds {MAX_INITIAL_COMMAND_LEN} characters"
            ));
        }
        Ok(())
    }

    /// Best-effort: spawn a disposable shell under a PTY, run the command,
    /// and report whether it looked like it succeeded. Used only by
    /// `TestConfig` — never on the live session path.
    pub fn validate_initial_command(
        &self,
        shell_path: &std::path::Path,
        config: &TerminalConfig,
    ) -> InitialCommandProbeResult {
        let Some(command) = &config.initial_command else {
            return InitialCommandProbeResult {
                success: true,
                output: String::new(),
                error: None,
            };
        };

        let work_path = config
            .work_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(dirs::home_dir);

        let spawn_config = SpawnConfig {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            shell_path: shell_path.to_path_buf(),
            args: vec![],
            cwd: work_path,
            env: vec![
                ("TERM".to_string(), "xterm-256color".to_string()),
                ("COLORTERM".to_string(), "truecolor".to_string()),
            ],
        };

        let pty = match PtyHandle::spawn(spawn_config) {
            Ok(p) => p,
            Err(e) => {
                return InitialCommandProbeResult {
                    success: false,
                    output: String::new(),
                    error: Some(format!("failed to spawn probe shell: {e}")),
                };
            }
        };

        let mut to_write = command.clone();
        if !to_write.ends_with('\n') {
            to_write.push('\n');
        }
        to_write.push_str("exit\n");
        if let Err(e) = pty.write(to_write.as_bytes()) {
            return InitialCommandProbeResult {
                success: false,
                output: String::new(),
                error: Some(format!("failed to write probe command: {e}")),
            };
        }

        let mut buffer = Vec::new();
        let deadline = Instant::now() + PROBE_TIMEOUT;
        let mut buf = [0u8; 4096];
        loop {
            if Instant::now() >= deadline {
                let _ = pty.kill();
                break;
            }
            if !pty.is_alive() {
                // Drain whatever is left without blocking forever.
                break;
            }
            match pty.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    buffer.extend_from_slice(&buf[..n]);
                    if buffer.len() > PROBE_BUFFER_CAP {
                        buffer.truncate(PROBE_BUFFER_CAP);
                    }
                }
                Err(_) => break,
            }
        }

        let output = String::from_utf8_lossy(&buffer).into_owned();
        let has_error = self.detector.has_command_error(&output);

        InitialCommandProbeResult {
            success: !has_error,
            output,
            error: if has_error {
                Some("probe output matched a command-failure phrase".to_string())
            } else {
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rows: u16, cols: u16) -> TerminalConfig {
        TerminalConfig {
            id: "test".to_string(),
            shell: ShellKind::Auto,
            rows,
            cols,
            work_path: None,
            initial_command: None,
        }
    }

    #[test]
    fn zero_dimensions_are_valid() {
        let validator = Validator::new(ShellDetector::new());
        let result = validator.validate_basic(&config(0, 0));
        assert!(result.valid);
    }

    #[test]
    fn oversize_rows_are_rejected() {
        let validator = Validator::new(ShellDetector::new());
        let result = validator.validate_basic(&config(301, 80));
        assert!(!result.valid);
        assert!(result.message.contains("rows out of range"));
    }

    #[test]
    fn oversize_cols_are_rejected() {
        let validator = Validator::new(ShellDetector::new());
        let result = validator.validate_basic(&config(24, 501));
        assert!(!result.valid);
        assert!(result.message.contains("cols out of range"));
    }

    #[test]
    fn blank_initial_command_is_rejected() {
        assert!(Validator::validate_initial_command_format("   ").is_err());
    }

    #[test]
    fn too_long_initial_command_is_rejected() {
        let cmd = "a".repeat(MAX_INITIAL_COMMAND_LEN + 1);
        assert!(Validator::validate_initial_command_format(&cmd).is_err());
    }

    #[test]
    fn reasonable_initial_command_is_accepted() {
        assert!(Validator::validate_initial_command_format("echo hi").is_ok());
    }
}
