//! HTTP plumbing shared by the voice cascade, STT client and debug surface
//!
//! Thin layer over `ureq`: per-concern agents with explicit timeouts (probe
//! requests are short-fused, audio streams generous), non-2xx statuses
//! returned as data rather than raised, and a counting byte-stream wrapper
//! that encodes the transfer-completion rules: a fixed-length body must
//! deliver every byte, an unknown-length body succeeds when it ends cleanly.

use std::io::Read;
use std::time::Duration;

use ureq::http::Response;
use ureq::{Agent, Body};

use crate::{GotchiError, Result};

/// User-Agent header sent on every outbound request
pub const USER_AGENT: &str = "gotchi/0.1";

/// Idle bound for audio body reads
pub const READ_TIMEOUT: Duration = Duration::from_secs(15);
/// Overall bound for a single TTS attempt
pub const TTS_TIMEOUT: Duration = Duration::from_secs(6);
/// Probe sweep per-request bound
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(2_200);
/// Probe bound in quick mode
pub const PROBE_QUICK_TIMEOUT: Duration = Duration::from_millis(750);
/// Largest voice file accepted into the in-memory cache
pub const MAX_VOICE_BYTES: usize = 192 * 1024;

fn agent_with_timeout(timeout: Duration) -> Agent {
    Agent::new_with_config(
        Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .user_agent(USER_AGENT)
            .build(),
    )
}

/// Agent for TTS attempts (6 s bound)
pub fn tts_agent() -> Agent {
    agent_with_timeout(TTS_TIMEOUT)
}

/// Agent for full audio downloads and streamed playback (15 s bound)
pub fn download_agent() -> Agent {
    agent_with_timeout(READ_TIMEOUT)
}

/// Agent for endpoint probing
pub fn probe_agent(quick: bool) -> Agent {
    agent_with_timeout(if quick {
        PROBE_QUICK_TIMEOUT
    } else {
        PROBE_TIMEOUT
    })
}

/// Extract a response header as an owned lowercase string (empty if absent)
pub fn header_str(resp: &Response<Body>, name: &str) -> String {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Declared Content-Length, if the transfer is fixed-size
pub fn content_length(resp: &Response<Body>) -> Option<u64> {
    resp.headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

/// True for content types the player accepts directly: the audio/wav family,
/// an absent type, or an opaque octet stream.
pub fn looks_like_wav(content_type: &str) -> bool {
    content_type.is_empty()
        || content_type.contains("audio/wav")
        || content_type.contains("audio/x-wav")
        || content_type.contains("audio/wave")
        || content_type.contains("application/octet-stream")
}

/// True for bodies worth scanning for an embedded audio URL
pub fn is_json_or_text(content_type: &str) -> bool {
    content_type.contains("json") || content_type.contains("text/plain")
}

/// Counting reader enforcing transfer-completion semantics.
///
/// Wraps a response body reader. For fixed-length transfers a clean EOF
/// before `expected` bytes is reported as an error; for unknown-length
/// (chunked) transfers EOF is simply the end. Read stalls surface as
/// `TimedOut` from the agent's timeout configuration.
pub struct HttpByteStream<R: Read> {
    inner: R,
    expected: Option<u64>,
    total: u64,
}

impl<R: Read> HttpByteStream<R> {
    /// Wrap a body reader; `expected` is the Content-Length when known
    pub fn new(inner: R, expected: Option<u64>) -> Self {
        HttpByteStream {
            inner,
            expected,
            total: 0,
        }
    }

    /// Bytes delivered so far
    pub fn bytes_read(&self) -> u64 {
        self.total
    }

    /// Whether the transfer declared a fixed length
    pub fn is_fixed(&self) -> bool {
        self.expected.is_some()
    }
}

impl<R: Read> Read for HttpByteStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            if let Some(expected) = self.expected {
                if self.total < expected {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("fixed transfer ended early: {}/{}", self.total, expected),
                    ));
                }
            }
        }
        self.total += n as u64;
        Ok(n)
    }
}

/// Read an entire body into a bounded buffer, applying the completion rules.
///
/// Fails with `BAD_SIZE` when the declared length exceeds `max`, `EMPTY`
/// when nothing arrived, and `INCOMPLETE` when a fixed-length transfer came
/// up short. An unknown-length body is additionally clipped at `max`.
pub fn read_body_bounded(resp: Response<Body>, max: usize) -> Result<Vec<u8>> {
    let expected = content_length(&resp);
    if let Some(len) = expected {
        if len as usize > max {
            return Err(GotchiError::HttpError(format!(
                "BAD_SIZE: {len} > {max}"
            )));
        }
    }

    let mut reader = resp.into_body().into_reader();
    let mut out = Vec::with_capacity(expected.unwrap_or(8_192) as usize);
    let mut buf = [0u8; 2_048];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| GotchiError::HttpError(format!("TIMEOUT: {e}")))?;
        if n == 0 {
            break;
        }
        if out.len() + n > max {
            return Err(GotchiError::HttpError("BAD_SIZE: body over limit".into()));
        }
        out.extend_from_slice(&buf[..n]);
    }

    if out.is_empty() {
        return Err(GotchiError::HttpError("EMPTY".into()));
    }
    if let Some(len) = expected {
        if out.len() as u64 != len {
            return Err(GotchiError::HttpError(format!(
                "INCOMPLETE: {}/{}",
                out.len(),
                len
            )));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_content_type_classes() {
        assert!(looks_like_wav(""));
        assert!(looks_like_wav("audio/wav"));
        assert!(looks_like_wav("audio/x-wav; charset=binary"));
        assert!(looks_like_wav("application/octet-stream"));
        assert!(!looks_like_wav("audio/mpeg"));
        assert!(is_json_or_text("application/json; charset=utf-8"));
        assert!(is_json_or_text("text/plain"));
        assert!(!is_json_or_text("audio/wav"));
    }

    #[test]
    fn test_byte_stream_chunked_clean_end() {
        let mut s = HttpByteStream::new(Cursor::new(vec![1u8, 2, 3]), None);
        let mut out = Vec::new();
        s.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(s.bytes_read(), 3);
        assert!(!s.is_fixed());
    }

    #[test]
    fn test_byte_stream_fixed_short_is_error() {
        let mut s = HttpByteStream::new(Cursor::new(vec![1u8, 2, 3]), Some(10));
        let mut out = Vec::new();
        let err = s.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_byte_stream_fixed_exact_succeeds() {
        let mut s = HttpByteStream::new(Cursor::new(vec![9u8; 5]), Some(5));
        let mut out = Vec::new();
        s.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 5);
    }
}
