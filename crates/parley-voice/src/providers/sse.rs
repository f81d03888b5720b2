//! Server-Sent Events → reply fragment adapter.
//!
//! Both completion dialects stream SSE: one JSON document per `data:` line,
//! blank-line separated, optionally terminated by `data: [DONE]`. This module
//! turns the raw byte stream into a [`CompletionStream`] of text fragments,
//! delegating the per-dialect JSON shape to an extractor function.

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::backend::CompletionStream;
use crate::error::VoiceError;

/// Pull the reply text out of one decoded `data:` payload.
///
/// `Ok(None)` means the event carries no text (role headers, usage, ...).
pub(crate) type Extractor = fn(&Value) -> Result<Option<String>, VoiceError>;

/// Classification of one SSE line.
#[derive(Debug, PartialEq, Eq)]
enum SseLine<'a> {
    /// Blank line, comment, or a field we do not use (`event:`, `id:`).
    Skip,
    Data(&'a str),
    Done,
}

fn classify(line: &str) -> SseLine<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return SseLine::Skip;
    }
    match trimmed.strip_prefix("data:") {
        Some(data) if data.trim() == "[DONE]" => SseLine::Done,
        Some(data) => SseLine::Data(data.trim()),
        None => SseLine::Skip,
    }
}

fn find_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// State threaded through the `unfold` stream.
struct SseState {
    stream: futures_util::stream::BoxStream<'static, Result<Bytes, String>>,
    buf: BytesMut,
    extract: Extractor,
    done: bool,
}

/// Convert an SSE byte stream into reply fragments.
///
/// Upstream transport errors and error events from the extractor end the
/// stream after yielding one `Err`. Payloads that are not valid JSON are
/// logged and skipped. A final line without a trailing newline is still
/// parsed when the upstream closes.
pub(crate) fn fragments<S, E>(byte_stream: S, extract: Extractor) -> CompletionStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + 'static,
{
    let state = SseState {
        stream: byte_stream
            .map(|item| item.map_err(|e| e.to_string()))
            .fuse()
            .boxed(),
        buf: BytesMut::new(),
        extract,
        done: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }

        loop {
            if let Some(line_end) = find_newline(&st.buf) {
                let line = st.buf.split_to(line_end + 1);
                let line = String::from_utf8_lossy(&line);

                match classify(&line) {
                    SseLine::Skip => continue,
                    SseLine::Done => {
                        st.done = true;
                        return None;
                    }
                    SseLine::Data(data) => {
                        let value = match serde_json::from_str::<Value>(data) {
                            Ok(value) => value,
                            Err(e) => {
                                tracing::warn!(error = %e, "Skipping malformed SSE payload");
                                continue;
                            }
                        };
                        match (st.extract)(&value) {
                            Ok(Some(fragment)) if !fragment.is_empty() => {
                                return Some((Ok(fragment), st));
                            }
                            Ok(_) => continue,
                            Err(e) => {
                                st.done = true;
                                return Some((Err(e), st));
                            }
                        }
                    }
                }
            }

            match st.stream.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Upstream completion stream error");
                    st.done = true;
                    return Some((
                        Err(VoiceError::Completion(format!("stream interrupted: {e}"))),
                        st,
                    ));
                }
                None if st.buf.is_empty() => return None,
                // Terminate the last line so the loop above can parse it.
                None => st.buf.extend_from_slice(b"\n"),
            }
        }
    })
    .boxed()
}
