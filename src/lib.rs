//! Boxify Terminal Core
//!
//! Multiplexes PTY sessions for the embedded terminal: detects and
//! configures the user's interactive shell, streams bidirectional I/O,
//! and frames command output into blocks with known start/end boundaries
//! and exit codes.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod commands;
pub mod terminal;

use std::sync::Arc;
use tauri::Manager;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use terminal::{AppHandleEmitter, TerminalService};

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    init_logging();
    tracing::info!("starting terminal core");

    let emitter = Arc::new(AppHandleEmitter::new());
    let terminal_service = Arc::new(TerminalService::new(emitter.clone()));

    let builder = tauri::Builder::default()
        .manage(terminal_service)
        .setup(move |app| {
            emitter.set_app_handle(app.handle().clone());
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::terminal_create,
            commands::terminal_write,
            commands::terminal_write_command,
            commands::terminal_resize,
            commands::terminal_close,
            commands::terminal_test_config,
        ]);

    match builder.build(tauri::generate_context!()) {
        Ok(app) => {
            app.run(|app_handle, event| {
                if let tauri::RunEvent::Exit = event {
                    tracing::info!("app exit requested, closing all terminal sessions...");
                    if let Some(service) = app_handle.try_state::<Arc<TerminalService>>() {
                        tauri::async_runtime::block_on(async {
                            service.close_all().await;
                        });
                    }
                }
            });
        }
        Err(e) => {
            tracing::error!("failed to build tauri application: {}", e);
        }
    }
}
