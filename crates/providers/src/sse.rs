//! Server-sent events plumbing shared by streaming adapters.
//!
//! The response body is buffered as raw bytes and split on blank lines;
//! only complete event blocks are decoded, so a multi-byte character split
//! across two network chunks is never mangled. Each `data:` payload goes to
//! an adapter-specific parser that returns zero or more stream events.

use crate::util::from_reqwest;
use wf_domain::error::Result;
use wf_domain::stream::{BoxStream, StreamEvent};

/// Extract complete `data:` payloads from an SSE byte buffer.
///
/// Consumed bytes are removed; a trailing partial event stays for the next
/// call. `\r\n` line endings are accepted.
pub(crate) fn drain_data_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut data_lines = Vec::new();

    while let Some((pos, delim_len)) = find_event_boundary(buffer) {
        let block: Vec<u8> = buffer.drain(..pos).collect();
        buffer.drain(..delim_len);

        let block = String::from_utf8_lossy(&block);
        for line in block.lines() {
            if let Some(data) = line.trim().strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_string());
                }
            }
        }
    }

    data_lines
}

fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Build a [`BoxStream`] from an SSE `reqwest::Response` and a stateful
/// parser closure.
///
/// The stream flushes the remaining buffer when the body closes and emits a
/// fallback `Done` if the parser never produced one. It stops after the
/// first `Done` or `Error`.
pub(crate) fn sse_response_stream<F>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;

        'read: loop {
            let data_lines = match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.extend_from_slice(&bytes);
                    drain_data_lines(&mut buffer)
                }
                Ok(None) => {
                    if buffer.iter().all(u8::is_ascii_whitespace) {
                        break 'read;
                    }
                    buffer.extend_from_slice(b"\n\n");
                    let lines = drain_data_lines(&mut buffer);
                    if lines.is_empty() {
                        break 'read;
                    }
                    lines
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    finished = true;
                    break 'read;
                }
            };

            for data in data_lines {
                for event in parse_data(&data) {
                    let terminal = matches!(
                        &event,
                        Ok(StreamEvent::Done { .. }) | Ok(StreamEvent::Error { .. }) | Err(_)
                    );
                    yield event;
                    if terminal {
                        finished = true;
                        break 'read;
                    }
                }
            }
        }

        if !finished {
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            });
        }
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
