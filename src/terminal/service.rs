//! Service Facade (§4.11).
//!
//! The public surface of the terminal core: Create, Write, WriteCommand,
//! Resize, Close, TestConfig. Every operation is fallible and reports a
//! structured result rather than panicking — bad input degrades to a
//! failure response, never a crash.

use std::path::PathBuf;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;

use super::config_generator::ShellConfigGenerator;
use super::environment_probe::get_environment_info;
use super::events::EventEmitter;
use super::git_watcher::GitWatcher;
use super::marker_filter::MarkerFilter;
use super::output_handler::start_read_loop;
use super::process_manager::ProcessManager;
use super::registry::SessionRegistry;
use super::session::Session;
use super::shell_detector::ShellDetector;
use super::types::{
    EnvironmentInfo, ProcessOptions, TerminalConfig, TestConfigReport, DEFAULT_COLS, DEFAULT_ROWS,
};
use super::validator::Validator;
use super::wrapper;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("process error: {0}")]
    Process(#[from] super::process_manager::ProcessManagerError),
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("pty error: {0}")]
    Pty(#[from] super::pty::PtyError),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResult {
    pub ok: bool,
    pub message: String,
    pub environment_info: Option<EnvironmentInfo>,
}

pub struct TerminalService {
    registry: SessionRegistry,
    validator: Validator,
    process_manager: ProcessManager,
    config_gen: ShellConfigGenerator,
    emitter: Arc<dyn EventEmitter>,
}

impl TerminalService {
    pub fn new(emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            validator: Validator::new(ShellDetector::new()),
            process_manager: ProcessManager::new(ShellConfigGenerator::new()),
            config_gen: ShellConfigGenerator::new(),
            emitter,
        }
    }

    pub async fn create(&self, config: TerminalConfig) -> Result<CreateResult, ServiceError> {
        let validation = self.validator.validate_basic(&config);
        if !validation.valid {
            return Ok(CreateResult {
                ok: false,
                message: validation.message,
                environment_info: None,
            });
        }

        if let Some(cmd) = &config.initial_command {
            if let Err(msg) = Validator::validate_initial_command_format(cmd) {
                return Ok(CreateResult {
                    ok: false,
                    message: msg,
                    environment_info: None,
                });
            }
        }

        let rows = if config.rows == 0 { DEFAULT_ROWS } else { config.rows };
        let cols = if config.cols == 0 { DEFAULT_COLS } else { config.cols };

        let resolved_shell_path = validation
            .resolved_shell_path
            .expect("valid ValidationResult always carries a resolved shell path");
        let resolved_shell_kind = validation
            .resolved_shell_kind
            .expect("valid ValidationResult always carries a resolved shell kind");
        let resolved_work_path = validation
            .resolved_work_path
            .expect("valid ValidationResult always carries a resolved work path");

        let opts = ProcessOptions {
            session_id: config.id.clone(),
            kind: resolved_shell_kind,
            shell_path: resolved_shell_path,
            rows,
            cols,
            work_path: Some(PathBuf::from(&resolved_work_path)),
        };

        let process = match self.process_manager.create_process(&opts) {
            Ok(p) => p,
            Err(e) => {
                return Ok(CreateResult {
                    ok: false,
                    message: format!("failed to start shell: {e}"),
                    environment_info: None,
                });
            }
        };

        let session = Arc::new(Session::new(
            config.id.clone(),
            resolved_shell_kind,
            process.uses_hooks,
            process.pty.clone(),
            Arc::new(MarkerFilter::new()),
            process.temp_config_path.clone(),
            resolved_work_path.clone(),
        ));

        self.registry.add(session.clone()).await;
        start_read_loop(session.clone(), self.emitter.clone());

        let (watcher, initial_git) = GitWatcher::start(
            session.id.clone(),
            PathBuf::from(&resolved_work_path),
            self.emitter.clone(),
        );
        *session.git_watcher.lock().unwrap() = Some(watcher);

        if let Some(cmd) = &config.initial_command {
            if let Err(e) = self.process_manager.write_initial_command(&session.pty, cmd) {
                tracing::warn!("session {}: failed to write initial command: {}", session.id, e);
            }
        }

        let mut environment_info = get_environment_info(&resolved_work_path);
        environment_info.git_info = initial_git;

        Ok(CreateResult {
            ok: true,
            message: String::new(),
            environment_info: Some(environment_info),
        })
    }

    pub async fn write(&self, session_id: &str, data_b64: &str) -> Result<(), ServiceError> {
        let session = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| ServiceError::NotFound(session_id.to_string()))?;
        let data = BASE64.decode(data_b64)?;
        session.pty.write(&data)?;
        Ok(())
    }

    pub async fn write_command(
        &self,
        session_id: &str,
        command: &str,
    ) -> Result<String, ServiceError> {
        let session = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| ServiceError::NotFound(session_id.to_string()))?;

        let block_id = session.start_new_block().await;

        let mut to_write = if session.hooks_mode {
            command.to_string()
        } else {
            wrapper::wrap(session.shell_kind, command)
        };
        if !to_write.ends_with('\n') && !to_write.ends_with('\r') {
            to_write.push('\n');
        }

        session.pty.write(to_write.as_bytes())?;
        Ok(block_id)
    }

    pub async fn resize(&self, session_id: &str, rows: u16, cols: u16) -> Result<(), ServiceError> {
        let session = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| ServiceError::NotFound(session_id.to_string()))?;
        self.process_manager.resize(&session.pty, rows, cols)?;
        Ok(())
    }

    pub async fn close(&self, session_id: &str) {
        self.registry.close_session(session_id, &self.config_gen).await;
    }

    pub async fn close_all(&self) {
        self.registry.close_all(&self.config_gen).await;
    }

    pub fn test_config(&self, config: &TerminalConfig) -> TestConfigReport {
        let validation = self.validator.validate_basic(config);
        if !validation.valid {
            return TestConfigReport {
                validation,
                initial_command: None,
            };
        }

        let initial_command = config.initial_command.as_ref().map(|_| {
            self.validator.validate_initial_command(
                validation
                    .resolved_shell_path
                    .as_deref()
                    .expect("valid ValidationResult always carries a resolved shell path"),
                config,
            )
        });

        TestConfigReport {
            validation,
            initial_command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::events::NullEmitter;
    use crate::terminal::types::ShellKind;

    fn service() -> TerminalService {
        TerminalService::new(Arc::new(NullEmitter))
    }

    #[tokio::test]
    async fn create_with_oversize_dimensions_fails_without_spawning() {
        let svc = service();
        let config = TerminalConfig {
            id: "svc-test-1".to_string(),
            shell: ShellKind::Auto,
            rows: 1000,
            cols: 80,
            work_path: None,
            initial_command: None,
        };
        let result = svc.create(config).await.unwrap();
        assert!(!result.ok);
    }

    #[tokio::test]
    async fn write_to_unknown_session_reports_not_found() {
        let svc = service();
        let result = svc.write("nonexistent", "aGk=").await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[test]
    fn test_config_rejects_oversize_cols_without_probing() {
        let svc = service();
        let config = TerminalConfig {
            id: "svc-test-2".to_string(),
            shell: ShellKind::Auto,
            rows: 24,
            cols: 9999,
            work_path: None,
            initial_command: None,
        };
        let report = svc.test_config(&config);
        assert!(!report.validation.valid);
        assert!(report.initial_command.is_none());
    }
}
