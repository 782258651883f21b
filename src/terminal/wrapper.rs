//! Command Wrapper (§4.6)
//!
//! Fallback for shells that cannot be configured with rc-file hooks
//! (`cmd`, or any shell where the Config Generator failed): wraps a user
//! command so its output is bracketed by the same framing markers the
//! hooks would have emitted.

use super::types::ShellKind;

/// `Wrap(command) -> wrapped`. Blank/whitespace-only input returns empty,
/// matching the spec exactly (a wrapped no-op would otherwise still emit
/// a spurious start/end pair).
pub fn wrap(kind: ShellKind, command: &str) -> String {
    if command.trim().is_empty() {
        return String::new();
    }

    match kind {
        ShellKind::Powershell | ShellKind::Pwsh => wrap_powershell(command),
        ShellKind::Cmd => wrap_cmd(command),
        _ => wrap_unix(command),
    }
}

fn wrap_unix(command: &str) -> String {
    format!(
        "printf '\\e]133;A\\e\\\\'; {command}; printf '\\e]133;D;%s\\e\\\\' \"$?\"",
        command = command
    )
}

fn wrap_powershell(command: &str) -> String {
    format!(
        "Write-Host -NoNewline \"`e]133;A`e\\\\\"; {command}; Write-Host -NoNewline \"`e]133;D;$($LASTEXITCODE ?? 0)`e\\\\\"",
        command = command
    )
}

/// cmd.exe cannot portably emit ESC sequences, so it uses plain-text
/// sentinels instead. The Marker Filter does not recognize these — a
/// session in cmd-wrap mode stays in fallback passthrough (§4.6, §9 Open
/// Question).
fn wrap_cmd(command: &str) -> String {
    format!("echo BOXIFY_CMD_START & {command} & echo BOXIFY_CMD_END")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_contains_command_as_substring_unix() {
        let wrapped = wrap(ShellKind::Bash, "echo hi");
        assert!(wrapped.contains("echo hi"));
    }

    #[test]
    fn wrap_contains_command_as_substring_powershell() {
        let wrapped = wrap(ShellKind::Pwsh, "Get-ChildItem");
        assert!(wrapped.contains("Get-ChildItem"));
    }

    #[test]
    fn wrap_contains_command_as_substring_cmd() {
        let wrapped = wrap(ShellKind::Cmd, "dir");
        assert!(wrapped.contains("dir"));
        assert!(wrapped.contains("BOXIFY_CMD_START"));
        assert!(wrapped.contains("BOXIFY_CMD_END"));
    }

    #[test]
    fn blank_input_returns_empty() {
        assert_eq!(wrap(ShellKind::Bash, "   "), "");
        assert_eq!(wrap(ShellKind::Bash, ""), "");
    }
}
