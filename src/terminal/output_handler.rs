//! Output Handler (§4.8).
//!
//! Drives the per-session PTY read loop on a blocking task (the PTY reader
//! is a synchronous `Read`), feeds every chunk through the session's
//! Marker Filter, and emits the resulting events in order. A UTF-8-safe
//! boundary is applied to the filtered output before it's base64-encoded,
//! so a multi-byte character split across two PTY reads never produces a
//! corrupted character in the emitted event.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use super::environment_probe::expand_home;
use super::events::{EventEmitter, TerminalEvent};
use super::session::Session;

const READ_CHUNK_SIZE: usize = 1024;

pub fn start_read_loop(session: Arc<Session>, emitter: Arc<dyn EventEmitter>) {
    tokio::task::spawn_blocking(move || read_loop(session, emitter));
}

fn read_loop(session: Arc<Session>, emitter: Arc<dyn EventEmitter>) {
    let mut buf = [0u8; READ_CHUNK_SIZE];
    let mut remainder: Vec<u8> = Vec::new();
    let cancellation = session.cancellation.clone();

    loop {
        if cancellation.is_cancelled() {
            break;
        }

        let n = match session.pty.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                if !cancellation.is_cancelled() {
                    emitter.emit(TerminalEvent::Error {
                        session_id: session.id.clone(),
                        message: format!("pty read error: {e}"),
                    });
                }
                break;
            }
        };

        let result = session.marker_filter.process(&buf[..n]);

        if !result.output.is_empty() {
            let mut to_emit = if remainder.is_empty() {
                result.output
            } else {
                let mut combined = std::mem::take(&mut remainder);
                combined.extend_from_slice(&result.output);
                combined
            };

            let safe_end = find_utf8_safe_boundary(&to_emit);
            if safe_end < to_emit.len() {
                remainder = to_emit[safe_end..].to_vec();
                to_emit.truncate(safe_end);
            }

            if !to_emit.is_empty() {
                let block_id = block_on(session.current_block_id()).unwrap_or_default();
                emitter.emit(TerminalEvent::Output {
                    session_id: session.id.clone(),
                    block_id,
                    data: BASE64.encode(&to_emit),
                });
            }
        }

        if result.pwd_changed {
            if let Some(pwd) = result.pwd {
                block_on(session.set_cwd(pwd.clone()));
                emitter.emit(TerminalEvent::PwdUpdate {
                    session_id: session.id.clone(),
                    pwd: pwd.clone(),
                });
                restart_git_watcher_if_needed(&session, &pwd, &emitter);
            }
        }

        if result.command_ended {
            let block_id = block_on(session.current_block_id()).unwrap_or_default();
            emitter.emit(TerminalEvent::CommandEnd {
                session_id: session.id.clone(),
                block_id,
                exit_code: result.exit_code.unwrap_or(-1),
            });
        }
    }

    if !remainder.is_empty() {
        let block_id = block_on(session.current_block_id()).unwrap_or_default();
        emitter.emit(TerminalEvent::Output {
            session_id: session.id.clone(),
            block_id,
            data: BASE64.encode(&remainder),
        });
    }
}

/// The read loop runs on a blocking thread (see `start_read_loop`), so it
/// can't `.await` directly; session state is only ever touched briefly
/// here, so blocking on the current Tokio handle is safe and avoids
/// threading an async boundary through the whole Marker Filter pipeline.
fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Handle::current().block_on(fut)
}

/// §4.9 `UpdateWorkPath`: the pwd reported by the shell's hooks is
/// home-collapsed (`~/...`), so it's expanded back to a real path before
/// being compared against the watcher's current target. A `cd` into a
/// different repository re-targets the watcher instead of leaving it
/// watching the session's original directory.
fn restart_git_watcher_if_needed(session: &Session, pwd: &str, emitter: &Arc<dyn EventEmitter>) {
    let new_work_path = expand_home(pwd);
    let mut guard = session.git_watcher.lock().unwrap();
    if let Some(watcher) = guard.take() {
        let (watcher, _) =
            watcher.update_work_path(session.id.clone(), new_work_path, emitter.clone());
        *guard = Some(watcher);
    }
}

/// Returns the index up to which `buf` forms complete UTF-8 characters;
/// a trailing incomplete multi-byte sequence is excluded.
fn find_utf8_safe_boundary(buf: &[u8]) -> usize {
    if buf.is_empty() {
        return 0;
    }

    let mut i = buf.len();
    while i > 0 && i > buf.len().saturating_sub(4) {
        let byte = buf[i - 1];

        if byte & 0x80 == 0 {
            return i;
        }

        if byte & 0xC0 == 0x80 {
            i -= 1;
            continue;
        }

        let char_len = if byte & 0xF8 == 0xF0 {
            4
        } else if byte & 0xF0 == 0xE0 {
            3
        } else if byte & 0xE0 == 0xC0 {
            2
        } else {
            return i;
        };

        let start_pos = i - 1;
        let available = buf.len() - start_pos;

        return if available >= char_len {
            start_pos + char_len
        } else {
            start_pos
        };
    }

    buf.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_ascii_is_full_length() {
        assert_eq!(find_utf8_safe_boundary(b"hello"), 5);
    }

    #[test]
    fn boundary_excludes_incomplete_trailing_sequence() {
        let data: &[u8] = &[0xE4, 0xBD, 0xA0, 0xE5, 0xA5];
        assert_eq!(find_utf8_safe_boundary(data), 3);
    }

    #[test]
    fn boundary_includes_complete_four_byte_sequence() {
        let data = "\u{1F600}".as_bytes();
        assert_eq!(find_utf8_safe_boundary(data), 4);
    }
}
