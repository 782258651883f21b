//! Marker Filter (§4.7)
//!
//! Stream-processes raw PTY output: strips prompt/echo, recognizes
//! OSC-133-style start/end markers and the OSC-1337 `Pwd` marker, and
//! emits clean command output plus command-end/pwd-change signals. If no
//! marker ever appears within a grace window, the filter degrades to a
//! passthrough so the UI stays usable against an uninstrumented shell.
//!
//! This is deliberately not built on a general ANSI/VTE parser: the only
//! escape sequences that matter here are OSC sequences, and everything
//! else is just bytes that get kept or dropped depending on whether we're
//! currently inside a command's output.

use std::time::{Duration, Instant};

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;
const GRACE_PERIOD: Duration = Duration::from_secs(3);
/// Width of the "might be a split marker" lookahead window (§4.7 step 5).
const SPLIT_MARKER_LOOKAHEAD: usize = 10;

/// Result of feeding one chunk through `MarkerFilter::process`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MarkerFilterResult {
    pub output: Vec<u8>,
    pub command_ended: bool,
    pub exit_code: Option<i32>,
    pub pwd_changed: bool,
    pub pwd: Option<String>,
}

impl MarkerFilterResult {
    fn passthrough(data: Vec<u8>) -> Self {
        Self {
            output: data,
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum MarkerKind {
    Start,
    End,
    Pwd,
}

/// A complete marker found in the buffer, with byte offsets relative to
/// the buffer it was found in.
struct Marker {
    start: usize,
    end: usize,
    kind: MarkerKind,
    payload: Vec<u8>,
}

struct FilterState {
    buffer: Vec<u8>,
    in_command_output: bool,
    created_at: Instant,
    marker_detected: bool,
    in_fallback: bool,
}

/// Stream processor with internal buffer and small state machine.
///
/// The spec calls for a mutex around the state machine even though, in
/// practice, only the Output Handler's read loop ever calls `process` for
/// a given session — the lock defends against future re-entrancy rather
/// than any contention we expect today.
pub struct MarkerFilter {
    state: std::sync::Mutex<FilterState>,
}

impl MarkerFilter {
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(FilterState {
                buffer: Vec::new(),
                in_command_output: false,
                created_at: Instant::now(),
                marker_detected: false,
                in_fallback: false,
            }),
        }
    }

    /// Clears the buffer and `in_command_output`. `marker_detected` and
    /// `in_fallback` persist (§4.7 `Reset`).
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("marker filter lock poisoned");
        state.buffer.clear();
        state.in_command_output = false;
    }

    pub fn process(&self, chunk: &[u8]) -> MarkerFilterResult {
        let mut state = self.state.lock().expect("marker filter lock poisoned");

        // 1. Degradation gate.
        if state.in_fallback {
            return MarkerFilterResult::passthrough(chunk.to_vec());
        }
        if !state.marker_detected && state.created_at.elapsed() > GRACE_PERIOD {
            state.in_fallback = true;
            let mut flushed = std::mem::take(&mut state.buffer);
            flushed.extend_from_slice(chunk);
            return MarkerFilterResult::passthrough(flushed);
        }

        // 2. Append chunk to buffer.
        let mut content = std::mem::take(&mut state.buffer);
        content.extend_from_slice(chunk);

        // 3. Scrub discardable OSCs.
        scrub_discardable_osc(&mut content);

        // 4. Sweep markers left-to-right.
        let mut result = MarkerFilterResult::default();
        let mut cursor = 0usize;
        while let Some(marker) = find_next_marker(&content, cursor) {
            let preceding = &content[cursor..marker.start];
            if state.in_command_output {
                result.output.extend_from_slice(preceding);
            }
            // else: discarded — this is how prompt/echo gets suppressed.

            match marker.kind {
                MarkerKind::Start => {
                    state.in_command_output = true;
                    state.marker_detected = true;
                }
                MarkerKind::End => {
                    state.in_command_output = false;
                    state.marker_detected = true;
                    result.command_ended = true;
                    result.exit_code = parse_exit_code(&marker.payload);
                }
                MarkerKind::Pwd => {
                    state.marker_detected = true;
                    if let Some(path) = decode_pwd_payload(&marker.payload) {
                        result.pwd_changed = true;
                        result.pwd = Some(path);
                    }
                }
            }

            cursor = marker.end;
        }

        // 5. Remainder handling.
        let remainder = content[cursor..].to_vec();
        if !remainder.is_empty() {
            if state.in_command_output {
                let might_be_split = remainder
                    .iter()
                    .take(SPLIT_MARKER_LOOKAHEAD)
                    .any(|&b| b == ESC);
                if might_be_split {
                    state.buffer = remainder;
                } else {
                    result.output.extend_from_slice(&remainder);
                }
            } else {
                state.buffer = remainder;
            }
        }

        result
    }
}

impl Default for MarkerFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Find the terminator (`ST` = `ESC \` or `BEL`) starting at or after
/// `from`. Returns `(terminator_start, terminator_end)`.
fn find_terminator(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i < buf.len() {
        match buf[i] {
            BEL => return Some((i, i + 1)),
            ESC if buf.get(i + 1) == Some(&b'\\') => return Some((i, i + 2)),
            _ => i += 1,
        }
    }
    None
}

/// Find the next complete OSC sequence (`ESC ]` ... terminator) at or
/// after `from`. Returns its full span and payload bytes (the text
/// between `ESC ]` and the terminator), regardless of classification.
fn find_next_osc(buf: &[u8], from: usize) -> Option<(usize, usize, Vec<u8>)> {
    let mut i = from;
    while i + 1 < buf.len() {
        if buf[i] == ESC && buf[i + 1] == b']' {
            let (term_start, term_end) = find_terminator(buf, i + 2)?;
            let payload = buf[i + 2..term_start].to_vec();
            return Some((i, term_end, payload));
        }
        i += 1;
    }
    None
}

fn is_discardable(payload: &[u8]) -> bool {
    let text = String::from_utf8_lossy(payload);
    if text.starts_with("1337;") {
        return !text.starts_with("1337;Pwd;");
    }
    matches!(
        text.split(';').next().unwrap_or_default(),
        "0" | "1" | "2" | "7"
    )
}

/// Remove every complete discardable OSC run from `buf` in place. A
/// trailing incomplete OSC (no terminator found yet) is left untouched —
/// we can't classify it until more data arrives.
fn scrub_discardable_osc(buf: &mut Vec<u8>) {
    let mut search_from = 0usize;
    loop {
        match find_next_osc(buf, search_from) {
            Some((start, end, payload)) => {
                if is_discardable(&payload) {
                    buf.drain(start..end);
                    search_from = start;
                } else {
                    search_from = end;
                }
            }
            None => break,
        }
    }
}

fn classify_marker(payload: &[u8]) -> Option<MarkerKind> {
    let text = std::str::from_utf8(payload).ok()?;
    if text.starts_with("133;A") {
        Some(MarkerKind::Start)
    } else if text.starts_with("133;D;") {
        Some(MarkerKind::End)
    } else if text.starts_with("1337;Pwd;") {
        Some(MarkerKind::Pwd)
    } else {
        None
    }
}

/// Find the earliest complete start/end/pwd marker at or after `from`.
/// Unrecognized OSCs (not caught by the scrub step, e.g. OSC 8 hyperlinks)
/// are skipped over and left as ordinary bytes for the caller to flush or
/// discard along with everything else.
fn find_next_marker(buf: &[u8], from: usize) -> Option<Marker> {
    let mut search_from = from;
    loop {
        let (start, end, payload) = find_next_osc(buf, search_from)?;
        if let Some(kind) = classify_marker(&payload) {
            return Some(Marker {
                start,
                end,
                kind,
                payload,
            });
        }
        search_from = end;
    }
}

fn parse_exit_code(payload: &[u8]) -> Option<i32> {
    let text = std::str::from_utf8(payload).ok()?;
    text.strip_prefix("133;D;")?.trim().parse().ok()
}

fn decode_pwd_payload(payload: &[u8]) -> Option<String> {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    let text = std::str::from_utf8(payload).ok()?;
    let encoded = text.strip_prefix("1337;Pwd;")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    String::from_utf8(decoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    #[test]
    fn happy_path_strips_prompt_and_reports_exit_code() {
        let filter = MarkerFilter::new();
        let input = b"user$ echo hi\n\x1b]133;A\x1b\\hi\n\x1b]133;D;0\x1b\\";
        let result = filter.process(input);
        assert_eq!(result.output, b"hi\n");
        assert!(result.command_ended);
        assert_eq!(result.exit_code, Some(0));
    }

    #[test]
    fn bel_terminated_markers_are_equivalent() {
        let filter = MarkerFilter::new();
        let input = b"user$ echo hi\n\x1b]133;A\x07hi\n\x1b]133;D;0\x07";
        let result = filter.process(input);
        assert_eq!(result.output, b"hi\n");
        assert!(result.command_ended);
        assert_eq!(result.exit_code, Some(0));
    }

    #[test]
    fn pwd_marker_decodes_base64_payload() {
        let filter = MarkerFilter::new();
        let encoded = BASE64.encode("~/work");
        let mut input = Vec::new();
        input.extend_from_slice(b"\x1b]133;A\x1b\\");
        input.extend_from_slice(format!("\x1b]1337;Pwd;{}\x07", encoded).as_bytes());
        input.extend_from_slice(b"\x1b]133;D;0\x1b\\");

        let result = filter.process(&input);
        assert!(result.pwd_changed);
        assert_eq!(result.pwd.as_deref(), Some("~/work"));
        assert!(result.command_ended);
        assert_eq!(result.exit_code, Some(0));
    }

    #[test]
    fn split_marker_across_chunks_is_not_emitted_prematurely() {
        let filter = MarkerFilter::new();
        // Put the filter into command-output mode first so the remainder
        // handling path that guards against split markers is exercised.
        filter.process(b"\x1b]133;A\x1b\\");

        let first = filter.process(b"\x1b]13");
        assert!(first.output.is_empty());

        let second = filter.process(b"3;A\x1b\\hello");
        assert_eq!(second.output, b"hello");
    }

    #[test]
    fn fallback_after_grace_period_is_identity() {
        let filter = MarkerFilter::new();
        {
            let mut state = filter.state.lock().unwrap();
            state.created_at = Instant::now() - Duration::from_millis(3500);
        }

        let first = filter.process(b"plain\n");
        assert_eq!(first.output, b"plain\n");

        let second = filter.process(b"more\n");
        assert_eq!(second.output, b"more\n");
        assert!(!second.command_ended);
        assert!(!second.pwd_changed);
    }

    #[test]
    fn discardable_osc_is_scrubbed_without_affecting_markers() {
        let filter = MarkerFilter::new();
        let input = b"\x1b]0;window title\x07\x1b]133;A\x1b\\body\x1b]133;D;1\x1b\\";
        let result = filter.process(input);
        assert_eq!(result.output, b"body");
        assert!(result.command_ended);
        assert_eq!(result.exit_code, Some(1));
    }

    #[test]
    fn unrecognized_osc_passes_through_as_ordinary_bytes() {
        let filter = MarkerFilter::new();
        // OSC 8 (hyperlink) is neither a marker nor on the discardable list.
        let input = b"\x1b]133;A\x1b\\\x1b]8;;http://example\x1b\\link\x1b]133;D;0\x1b\\";
        let result = filter.process(input);
        assert!(result.output.ends_with(b"link"));
        assert!(result.command_ended);
    }

    #[test]
    fn reset_clears_buffer_but_keeps_marker_detected() {
        let filter = MarkerFilter::new();
        filter.process(b"\x1b]133;A\x1b\\partial");
        filter.reset();
        let state = filter.state.lock().unwrap();
        assert!(state.buffer.is_empty());
        assert!(!state.in_command_output);
        assert!(state.marker_detected);
    }
}
