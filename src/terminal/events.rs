//! Event emission (§4.8, §9).
//!
//! The core has no dependency on the host's event bus: it emits through a
//! one-method `Emit(name, payload)` abstraction, grounded in the AppHandle
//! indirection used elsewhere in this codebase for pushing backend state
//! to the frontend. A null emitter silences all emits and is a legal
//! configuration (tests, or a session created before Tauri setup runs).

use parking_lot::RwLock;
use serde::Serialize;
use tauri::{AppHandle, Emitter as TauriEmitter};

use super::types::GitInfo;

/// The five event names the core ever emits, each bundling its payload.
/// `untagged` so the wire payload is exactly the field set named in §6 —
/// the event name travels as the Tauri channel name, not as a tag field.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TerminalEvent {
    #[serde(rename_all = "camelCase")]
    Output {
        session_id: String,
        block_id: String,
        data: String,
    },
    #[serde(rename_all = "camelCase")]
    CommandEnd {
        session_id: String,
        block_id: String,
        exit_code: i32,
    },
    #[serde(rename_all = "camelCase")]
    PwdUpdate { session_id: String, pwd: String },
    #[serde(rename_all = "camelCase")]
    GitUpdate { session_id: String, git: GitInfo },
    #[serde(rename_all = "camelCase")]
    Error {
        session_id: String,
        message: String,
    },
}

impl TerminalEvent {
    fn name(&self) -> &'static str {
        match self {
            TerminalEvent::Output { .. } => "terminal:output",
            TerminalEvent::CommandEnd { .. } => "terminal:command_end",
            TerminalEvent::PwdUpdate { .. } => "terminal:pwd_update",
            TerminalEvent::GitUpdate { .. } => "terminal:git_update",
            TerminalEvent::Error { .. } => "terminal:error",
        }
    }
}

/// Injected at every call site that needs to push an event. Implementors
/// decide where (and whether) the event actually goes.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: TerminalEvent);
}

/// Forwards events to the frontend over a Tauri `AppHandle`, set lazily
/// during app setup. Events emitted before the handle is set are dropped
/// silently — nothing buffers them, since the frontend re-derives current
/// state through the Service Facade rather than replaying history.
pub struct AppHandleEmitter {
    app_handle: RwLock<Option<AppHandle>>,
}

impl AppHandleEmitter {
    pub fn new() -> Self {
        Self {
            app_handle: RwLock::new(None),
        }
    }

    pub fn set_app_handle(&self, handle: AppHandle) {
        *self.app_handle.write() = Some(handle);
        tracing::debug!("terminal event emitter: app handle set");
    }
}

impl Default for AppHandleEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter for AppHandleEmitter {
    fn emit(&self, event: TerminalEvent) {
        let handle = self.app_handle.read();
        let Some(handle) = handle.as_ref() else {
            tracing::debug!("terminal event emitter: app handle not ready, dropping event");
            return;
        };
        if let Err(e) = handle.emit(event.name(), &event) {
            tracing::warn!("failed to emit {}: {}", event.name(), e);
        }
    }
}

/// Silences every event. Legal per §9; used by headless callers and tests.
#[derive(Default)]
pub struct NullEmitter;

impl EventEmitter for NullEmitter {
    fn emit(&self, _event: TerminalEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_handle_emitter_drops_before_handle_set() {
        let emitter = AppHandleEmitter::new();
        emitter.emit(TerminalEvent::Error {
            session_id: "s1".into(),
            message: "unreachable without a handle".into(),
        });
    }

    #[test]
    fn null_emitter_accepts_everything() {
        let emitter = NullEmitter;
        emitter.emit(TerminalEvent::PwdUpdate {
            session_id: "s1".into(),
            pwd: "~".into(),
        });
    }
}
