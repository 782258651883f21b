//! Shell Detector (§4.2)
//!
//! Resolves a requested `ShellKind` to an executable path, classifies a
//! path back to a kind, and checks probe output against a platform phrase
//! set for command-failure detection. Results are cached per-process in a
//! lock-free concurrent map, keyed the way the spec requires:
//! `"shell:<kind>"` and `"default:<os>"`.

use once_cell_like::OnceCache;
use std::path::PathBuf;

use super::types::ShellKind;

#[derive(Debug, thiserror::Error)]
pub enum ShellDetectError {
    #[error("shell not found on PATH: {0}")]
    NotFound(String),
}

/// Tiny process-wide cache. `DashMap` already gives us concurrent,
/// write-once-per-key semantics; this wrapper just gives the cache a name
/// that matches the spec's vocabulary.
mod once_cell_like {
    use dashmap::DashMap;

    #[derive(Default)]
    pub struct OnceCache {
        inner: DashMap<String, PathBuf>,
    }

    use std::path::PathBuf;

    impl OnceCache {
        pub fn new() -> Self {
            Self {
                inner: DashMap::new(),
            }
        }

        pub fn get_or_try_insert_with<E>(
            &self,
            key: &str,
            f: impl FnOnce() -> Result<PathBuf, E>,
        ) -> Result<PathBuf, E> {
            if let Some(v) = self.inner.get(key) {
                return Ok(v.clone());
            }
            let v = f()?;
            // Last-writer-wins is fine here: the detector is deterministic
            // for a given key within one process, so a racing duplicate
            // insert computes the same value.
            self.inner.insert(key.to_string(), v.clone());
            Ok(v)
        }
    }
}

/// Stateless-looking detector; the cache is the only state, and it is
/// safe to share across threads (`Arc<ShellDetector>` or a single static
/// instance both work).
pub struct ShellDetector {
    cache: OnceCache,
}

impl ShellDetector {
    pub fn new() -> Self {
        Self {
            cache: OnceCache::new(),
        }
    }

    /// Resolve `preferred` to an executable path, consulting (and
    /// populating) the process-wide cache.
    pub fn detect(&self, preferred: ShellKind) -> Result<PathBuf, ShellDetectError> {
        match preferred {
            ShellKind::Auto => {
                let os_key = format!("default:{}", std::env::consts::OS);
                self.cache
                    .get_or_try_insert_with(&os_key, detect_default_shell)
            }
            kind => {
                let key = format!("shell:{}", kind);
                self.cache
                    .get_or_try_insert_with(&key, move || find_on_path(kind))
            }
        }
    }

    /// Classify a path's final component back to a `ShellKind` (§4.2).
    pub fn classify_by_path(&self, path: &std::path::Path) -> ShellKind {
        ShellKind::classify_by_path(path)
    }

    /// Case-insensitive substring match against the active platform's
    /// failure-phrase set (§6). Used only by probe-style validation.
    pub fn has_command_error(&self, text: &str) -> bool {
        has_command_error(text)
    }
}

impl Default for ShellDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn exe_name(stem: &str) -> String {
    if cfg!(target_os = "windows") && matches!(stem, "cmd" | "powershell" | "pwsh") {
        format!("{stem}.exe")
    } else {
        stem.to_string()
    }
}

fn find_on_path(kind: ShellKind) -> Result<PathBuf, ShellDetectError> {
    let name = exe_name(kind.exe_stem());
    which(&name).ok_or(ShellDetectError::NotFound(name))
}

fn detect_default_shell() -> Result<PathBuf, ShellDetectError> {
    let candidates: &[&str] = if cfg!(target_os = "windows") {
        &["pwsh", "powershell", "cmd.exe"]
    } else {
        // macOS and Linux alike (§4.2): zsh, then bash, then /bin/sh.
        &["zsh", "bash", "/bin/sh"]
    };

    for candidate in candidates {
        if candidate.starts_with('/') {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Ok(path);
            }
            continue;
        }
        if let Some(path) = which(candidate) {
            return Ok(path);
        }
    }

    Err(ShellDetectError::NotFound("no default shell found".into()))
}

/// Minimal PATH search — deliberately dependency-free (no `which` crate in
/// the stack) since this is a handful of lines and the corpus doesn't pull
/// one in for this purpose either.
fn which(name: &str) -> Option<PathBuf> {
    if name.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(name);
        return if path.exists() { Some(path) } else { None };
    }

    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

const UNIX_BASE_PHRASES: &[&str] = &[
    "command not found",
    "no such file or directory",
    "permission denied",
    "cannot execute",
    "is not recognized",
    "invalid option",
    "illegal option",
    "error:",
    "failed",
    "unable to",
];

const WINDOWS_CMD_PHRASES: &[&str] = &[
    "is not recognized as an internal or external command",
    "cannot find the path specified",
    "the system cannot find the file specified",
    "access is denied",
    "the syntax of the command is incorrect",
];

const POWERSHELL_PHRASES: &[&str] = &[
    "term '",
    "' is not recognized",
    "cannot be found",
    "does not exist",
    "access to the path",
    "is denied",
    "exception",
];

fn has_command_error(text: &str) -> bool {
    let lower = text.to_lowercase();
    let mut phrases: Vec<&str> = UNIX_BASE_PHRASES.to_vec();
    if cfg!(target_os = "windows") {
        phrases.extend_from_slice(WINDOWS_CMD_PHRASES);
        phrases.extend_from_slice(POWERSHELL_PHRASES);
    }
    phrases.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_auto_is_referentially_transparent() {
        let detector = ShellDetector::new();
        let first = detector.detect(ShellKind::Auto);
        let second = detector.detect(ShellKind::Auto);
        assert_eq!(first.is_ok(), second.is_ok());
        if let (Ok(a), Ok(b)) = (&first, &second) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn has_command_error_matches_unix_phrases() {
        assert!(has_command_error("bash: foo: command not found"));
        assert!(has_command_error("Permission Denied"));
        assert!(!has_command_error("hello world"));
    }

    #[test]
    fn classify_by_path_delegates() {
        let detector = ShellDetector::new();
        assert_eq!(
            detector.classify_by_path(std::path::Path::new("/bin/zsh")),
            ShellKind::Zsh
        );
    }
}
