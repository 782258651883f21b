//! Shell Config Generator (§4.4)
//!
//! Produces a per-session temporary shell rc file (or rc directory) whose
//! contents inject hooks that emit the framing markers around every
//! interactive command. The rc contents are part of the external contract
//! (§9 Design Notes) and are reproduced verbatim from the spec — they are
//! not templated or generated from any host-specific source.

use std::io::Write;
use std::path::{Path, PathBuf};

use super::types::ShellKind;

#[derive(Debug, thiserror::Error)]
pub enum ConfigGenError {
    #[error("shell kind does not support hooks")]
    UnsupportedShell,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of generating a shell config: where it lives, and the
/// arguments/environment the Process Manager needs to make the shell
/// load it.
pub struct GeneratedConfig {
    /// Path to the rc file or rc directory, to be deleted at teardown.
    pub path: PathBuf,
    /// Extra argv entries the shell needs (e.g. `-i`, `--rcfile <file>`).
    pub args: Vec<String>,
    /// Extra environment variables (e.g. `ZDOTDIR` for zsh).
    pub env: Vec<(String, String)>,
}

pub struct ShellConfigGenerator;

impl ShellConfigGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate hook configuration for `kind` scoped to `session_id`.
    /// Returns `Err(UnsupportedShell)` for shells with no hooks path
    /// (cmd) — callers fall back to Command Wrapper in that case.
    pub fn generate(
        &self,
        kind: ShellKind,
        session_id: &str,
    ) -> Result<GeneratedConfig, ConfigGenError> {
        match kind {
            ShellKind::Zsh => generate_zsh(session_id),
            ShellKind::Bash => generate_bash(session_id),
            ShellKind::Powershell | ShellKind::Pwsh => generate_powershell(session_id),
            _ => Err(ConfigGenError::UnsupportedShell),
        }
    }

    /// Remove a previously generated config. Accepts a directory (zsh) or
    /// a single file (bash/powershell); empty input is a no-op.
    pub fn cleanup(&self, path: &Path) {
        if path.as_os_str().is_empty() {
            return;
        }
        let result = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        if let Err(e) = result {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to clean up shell config at {:?}: {}", path, e);
            }
        }
    }
}

impl Default for ShellConfigGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path, dir: bool) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if dir { 0o700 } else { 0o600 };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_restrictive_permissions(_path: &Path, _dir: bool) -> std::io::Result<()> {
    Ok(())
}

fn zsh_rc_contents() -> String {
    // Sourcing the user's own .zshrc first means their aliases, prompt
    // theme, etc. still load; our hooks are installed after, so they
    // observe every precmd/preexec cycle regardless of what the user's rc
    // does internally.
    r#"[ -f "$HOME/.zshrc" ] && source "$HOME/.zshrc"

__boxify_preexec() {
    printf '\x1b]133;A\x1b\\'
}

__boxify_precmd() {
    local exit_code=$?
    local pwd_b64
    pwd_b64=$(printf '%s' "${PWD/#$HOME/~}" | base64 | tr -d '\n')
    printf '\x1b]1337;Pwd;%s\x1b\\' "$pwd_b64"
    printf '\x1b]133;D;%s\x1b\\' "$exit_code"
}

autoload -Uz add-zsh-hook
add-zsh-hook preexec __boxify_preexec
add-zsh-hook precmd __boxify_precmd
"#
    .to_string()
}

fn generate_zsh(session_id: &str) -> Result<GeneratedConfig, ConfigGenError> {
    let dir = std::env::temp_dir().join(format!("boxify_zsh_{session_id}"));
    std::fs::create_dir_all(&dir)?;
    set_restrictive_permissions(&dir, true)?;

    let rc_path = dir.join(".zshrc");
    let mut file = std::fs::File::create(&rc_path)?;
    file.write_all(zsh_rc_contents().as_bytes())?;
    set_restrictive_permissions(&rc_path, false)?;

    Ok(GeneratedConfig {
        path: dir.clone(),
        args: vec!["-i".to_string()],
        env: vec![("ZDOTDIR".to_string(), dir.to_string_lossy().to_string())],
    })
}

fn bash_rc_contents() -> String {
    r#"[ -f "$HOME/.bashrc" ] && source "$HOME/.bashrc"

__boxify_fired=0

__boxify_debug_trap() {
    [ -n "$COMP_LINE" ] && return
    if [ "$__boxify_fired" = "0" ]; then
        printf '\x1b]133;A\x1b\\'
        __boxify_fired=1
    fi
}

__boxify_prompt_command() {
    local exit_code=$?
    if [ "$__boxify_fired" = "1" ]; then
        local pwd_b64
        pwd_b64=$(printf '%s' "${PWD/#$HOME/~}" | base64 | tr -d '\n')
        printf '\x1b]1337;Pwd;%s\x1b\\' "$pwd_b64"
        printf '\x1b]133;D;%s\x1b\\' "$exit_code"
        __boxify_fired=0
    fi
}

trap '__boxify_debug_trap' DEBUG
PROMPT_COMMAND="__boxify_prompt_command${PROMPT_COMMAND:+;$PROMPT_COMMAND}"
"#
    .to_string()
}

fn generate_bash(session_id: &str) -> Result<GeneratedConfig, ConfigGenError> {
    let path = std::env::temp_dir().join(format!("boxify_shell_{session_id}.bash"));
    let mut file = std::fs::File::create(&path)?;
    file.write_all(bash_rc_contents().as_bytes())?;
    set_restrictive_permissions(&path, false)?;

    Ok(GeneratedConfig {
        args: vec![
            "--rcfile".to_string(),
            path.to_string_lossy().to_string(),
            "-i".to_string(),
        ],
        path,
        env: vec![],
    })
}

fn powershell_script_contents() -> String {
    r#"$global:__boxifyOriginalPrompt = $function:prompt

function global:prompt {
    $code = if ($null -eq $LASTEXITCODE) { 0 } else { $LASTEXITCODE }
    Write-Host -NoNewline "`e]133;D;$code`e\"
    $pwdB64 = [Convert]::ToBase64String([Text.Encoding]::UTF8.GetBytes($PWD.Path))
    Write-Host -NoNewline "`e]1337;Pwd;$pwdB64`e\"
    & $global:__boxifyOriginalPrompt
}

if ($PSVersionTable.PSVersion.Major -ge 7) {
    Register-EngineEvent -SourceIdentifier PowerShell.OnIdle -Action {} | Out-Null
    $ExecutionContext.InvokeCommand.PreCommandLookupAction = {
        param($commandName, $commandLookupEventArgs)
        Write-Host -NoNewline "`e]133;A`e\"
    }
}
"#
    .to_string()
}

fn generate_powershell(session_id: &str) -> Result<GeneratedConfig, ConfigGenError> {
    let path = std::env::temp_dir().join(format!("boxify_shell_{session_id}.ps1"));
    let mut file = std::fs::File::create(&path)?;
    file.write_all(powershell_script_contents().as_bytes())?;
    set_restrictive_permissions(&path, false)?;

    Ok(GeneratedConfig {
        path: path.clone(),
        args: vec![
            "-NoExit".to_string(),
            "-Command".to_string(),
            format!(". {}", path.display()),
        ],
        env: vec![],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_is_unsupported() {
        let gen = ShellConfigGenerator::new();
        assert!(matches!(
            gen.generate(ShellKind::Cmd, "s1"),
            Err(ConfigGenError::UnsupportedShell)
        ));
    }

    #[test]
    fn zsh_generates_dir_with_zdotdir_env() {
        let gen = ShellConfigGenerator::new();
        let cfg = gen.generate(ShellKind::Zsh, "test-zsh-1").unwrap();
        assert!(cfg.path.is_dir());
        assert!(cfg.path.join(".zshrc").exists());
        assert_eq!(cfg.args, vec!["-i".to_string()]);
        assert!(cfg.env.iter().any(|(k, _)| k == "ZDOTDIR"));
        gen.cleanup(&cfg.path);
        assert!(!cfg.path.exists());
    }

    #[test]
    fn bash_generates_single_rcfile() {
        let gen = ShellConfigGenerator::new();
        let cfg = gen.generate(ShellKind::Bash, "test-bash-1").unwrap();
        assert!(cfg.path.is_file());
        let contents = std::fs::read_to_string(&cfg.path).unwrap();
        assert!(contents.contains("PROMPT_COMMAND"));
        gen.cleanup(&cfg.path);
        assert!(!cfg.path.exists());
    }

    #[test]
    fn powershell_script_registers_precommand_hook() {
        let gen = ShellConfigGenerator::new();
        let cfg = gen.generate(ShellKind::Pwsh, "test-pwsh-1").unwrap();
        let contents = std::fs::read_to_string(&cfg.path).unwrap();
        assert!(contents.contains("PreCommandLookupAction"));
        gen.cleanup(&cfg.path);
    }

    #[test]
    fn cleanup_of_empty_path_is_noop() {
        let gen = ShellConfigGenerator::new();
        gen.cleanup(Path::new(""));
    }
}
