//! Terminal Core commands.
//!
//! Tauri commands exposing the Service Facade (§4.11): create, write,
//! write_command, resize, close, test_config.

use std::sync::Arc;

use tauri::State;

use crate::terminal::service::{CreateResult, ServiceError, TerminalService};
use crate::terminal::types::{TerminalConfig, TestConfigReport};

impl From<ServiceError> for String {
    fn from(e: ServiceError) -> Self {
        e.to_string()
    }
}

#[tauri::command]
pub async fn terminal_create(
    config: TerminalConfig,
    state: State<'_, Arc<TerminalService>>,
) -> Result<CreateResult, String> {
    state.create(config).await.map_err(Into::into)
}

#[tauri::command]
pub async fn terminal_write(
    session_id: String,
    data: String,
    state: State<'_, Arc<TerminalService>>,
) -> Result<(), String> {
    state.write(&session_id, &data).await.map_err(Into::into)
}

#[tauri::command]
pub async fn terminal_write_command(
    session_id: String,
    command: String,
    state: State<'_, Arc<TerminalService>>,
) -> Result<String, String> {
    state
        .write_command(&session_id, &command)
        .await
        .map_err(Into::into)
}

#[tauri::command]
pub async fn terminal_resize(
    session_id: String,
    rows: u16,
    cols: u16,
    state: State<'_, Arc<TerminalService>>,
) -> Result<(), String> {
    state.resize(&session_id, rows, cols).await.map_err(Into::into)
}

#[tauri::command]
pub async fn terminal_close(
    session_id: String,
    state: State<'_, Arc<TerminalService>>,
) -> Result<(), String> {
    state.close(&session_id).await;
    Ok(())
}

#[tauri::command]
pub async fn terminal_test_config(
    config: TerminalConfig,
    state: State<'_, Arc<TerminalService>>,
) -> Result<TestConfigReport, String> {
    // validate_initial_command spawns a disposable PTY and can block for up
    // to 5s; keep it off the async worker thread.
    let state = state.inner().clone();
    tokio::task::spawn_blocking(move || state.test_config(&config))
        .await
        .map_err(|e| e.to_string())
}
