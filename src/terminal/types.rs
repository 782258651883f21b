//! Core data types shared across the terminal subsystem.
//!
//! These are the plain value types described by the data model: inputs to
//! the Validator / Shell Detector / Shell Config Generator, and results
//! handed back to callers. None of them own a PTY, a child process, or a
//! file handle — those live on `Session` (see `session.rs`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Maximum terminal dimensions accepted by the Validator.
pub const MAX_ROWS: u16 = 300;
pub const MAX_COLS: u16 = 500;
pub const DEFAULT_ROWS: u16 = 24;
pub const DEFAULT_COLS: u16 = 80;
pub const MAX_INITIAL_COMMAND_LEN: usize = 10_000;

/// The closed set of shells the core knows how to drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    Cmd,
    Powershell,
    Pwsh,
    Bash,
    Zsh,
    Sh,
    Auto,
}

impl ShellKind {
    /// Whether this shell can be configured via rc-file hook injection
    /// (§4.4). Shells outside this set fall back to Command Wrapper.
    pub fn supports_hooks(self) -> bool {
        matches!(
            self,
            ShellKind::Zsh | ShellKind::Bash | ShellKind::Powershell | ShellKind::Pwsh
        )
    }

    /// The bare executable name used for PATH lookups and classification,
    /// without any platform suffix.
    pub fn exe_stem(self) -> &'static str {
        match self {
            ShellKind::Cmd => "cmd",
            ShellKind::Powershell => "powershell",
            ShellKind::Pwsh => "pwsh",
            ShellKind::Bash => "bash",
            ShellKind::Zsh => "zsh",
            ShellKind::Sh => "sh",
            ShellKind::Auto => "auto",
        }
    }

    /// Classify a shell executable's final path component back into a
    /// `ShellKind`. Unknown names default per-platform (§4.2).
    pub fn classify_by_path(path: &std::path::Path) -> ShellKind {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match stem.as_str() {
            "cmd" => ShellKind::Cmd,
            "powershell" => ShellKind::Powershell,
            "pwsh" => ShellKind::Pwsh,
            "bash" => ShellKind::Bash,
            "zsh" => ShellKind::Zsh,
            "sh" => ShellKind::Sh,
            _ => {
                if cfg!(target_os = "windows") {
                    ShellKind::Cmd
                } else {
                    ShellKind::Sh
                }
            }
        }
    }
}

impl std::fmt::Display for ShellKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.exe_stem())
    }
}

/// Request to create a new terminal session (§3 TerminalConfig).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalConfig {
    pub id: String,
    #[serde(default = "default_shell_kind")]
    pub shell: ShellKind,
    #[serde(default)]
    pub rows: u16,
    #[serde(default)]
    pub cols: u16,
    pub work_path: Option<String>,
    pub initial_command: Option<String>,
}

fn default_shell_kind() -> ShellKind {
    ShellKind::Auto
}

/// Result of §4.3's `ValidateBasic`.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub message: String,
    pub resolved_shell_path: Option<PathBuf>,
    pub resolved_shell_kind: Option<ShellKind>,
    pub resolved_work_path: Option<String>,
}

/// Outcome of probing an initial command in a throwaway PTY (§4.3).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialCommandProbeResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

/// Full report returned by the Service Facade's `TestConfig` (§4.11).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConfigReport {
    pub validation: ValidationResult,
    pub initial_command: Option<InitialCommandProbeResult>,
}

/// Transient options passed from the Validator/Service Facade into the
/// Process Manager (§3 ProcessOptions).
#[derive(Clone, Debug)]
pub struct ProcessOptions {
    pub session_id: String,
    pub kind: ShellKind,
    pub shell_path: PathBuf,
    pub rows: u16,
    pub cols: u16,
    pub work_path: Option<PathBuf>,
}

/// Git repository snapshot (§3 GitInfo).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitInfo {
    pub is_repo: bool,
    pub branch: Option<String>,
    pub modified_files: u32,
    pub added_lines: u32,
    pub deleted_lines: u32,
}

/// Known virtualenv flavors, checked in priority order (§4.10).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvType {
    Conda,
    Pipenv,
    Poetry,
    Venv,
}

/// Python interpreter / virtualenv snapshot (§3 PythonEnv).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonEnv {
    pub has_python: bool,
    pub version: Option<String>,
    pub env_active: bool,
    pub env_type: Option<EnvType>,
    pub env_name: Option<String>,
    pub env_path: Option<String>,
}

/// One-shot environment snapshot for a working directory (§4.10).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInfo {
    pub work_path: String,
    pub python_env: PythonEnv,
    pub git_info: GitInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hooks_support_matches_spec_set() {
        assert!(ShellKind::Zsh.supports_hooks());
        assert!(ShellKind::Bash.supports_hooks());
        assert!(ShellKind::Powershell.supports_hooks());
        assert!(ShellKind::Pwsh.supports_hooks());
        assert!(!ShellKind::Cmd.supports_hooks());
        assert!(!ShellKind::Sh.supports_hooks());
        assert!(!ShellKind::Auto.supports_hooks());
    }

    #[test]
    fn classify_by_path_known_names() {
        assert_eq!(
            ShellKind::classify_by_path(std::path::Path::new("/bin/zsh")),
            ShellKind::Zsh
        );
        assert_eq!(
            ShellKind::classify_by_path(std::path::Path::new("/usr/bin/bash")),
            ShellKind::Bash
        );
    }

    #[test]
    fn classify_by_path_unknown_defaults_per_platform() {
        let kind = ShellKind::classify_by_path(std::path::Path::new("/usr/bin/fish"));
        if cfg!(target_os = "windows") {
            assert_eq!(kind, ShellKind::Cmd);
        } else {
            assert_eq!(kind, ShellKind::Sh);
        }
    }
}
