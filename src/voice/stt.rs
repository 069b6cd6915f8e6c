//! Push-to-talk speech-to-text client
//!
//! Capture accumulates into a bounded 16 kHz mono buffer while the hold
//! gesture is active. On release the recording is framed with the canonical
//! 44-byte WAV header and POSTed as a raw body (no multipart) to the STT
//! server, which answers `{"text": "..."}`. The transcription is then spoken
//! back through the regular TTS cascade.

use tracing::{debug, warn};

use crate::app::AppContext;
use crate::net;
use crate::wav;
use crate::{GotchiError, Result};

/// Capture sample rate in Hz
pub const STT_SAMPLE_RATE: u32 = 16_000;
/// Capture ceiling in seconds
pub const STT_MAX_SECONDS: usize = 5;
/// Minimum usable recording (100 ms)
pub const STT_MIN_SAMPLES: usize = 1_600;
/// Per-poll capture chunk (100 ms at 16 kHz)
pub const STT_CHUNK_SAMPLES: usize = 1_600;
/// Default STT server port
pub const STT_PORT: u16 = 8_002;
/// Raw-WAV upload path
pub const STT_PATH: &str = "/v1/stt-raw";

/// Microphone seam. The desktop build has no microphone wiring; the
/// silence implementation keeps the capture path exercisable.
pub trait AudioCapture: Send {
    /// Start a capture session
    fn start(&mut self) -> Result<()>;
    /// Fill `buf` with captured samples, returning how many were written
    fn read(&mut self, buf: &mut [i16]) -> usize;
    /// End the capture session
    fn stop(&mut self);
}

/// Capture source that yields silence
#[derive(Debug, Default)]
pub struct SilenceCapture;

impl AudioCapture for SilenceCapture {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16]) -> usize {
        buf.fill(0);
        buf.len()
    }

    fn stop(&mut self) {}
}

/// Bounded push-to-talk recording buffer
#[derive(Debug)]
pub struct Recorder {
    samples: Vec<i16>,
    max_samples: usize,
}

impl Default for Recorder {
    fn default() -> Self {
        Recorder::new(STT_SAMPLE_RATE as usize * STT_MAX_SECONDS)
    }
}

impl Recorder {
    /// Create a recorder bounded at `max_samples`
    pub fn new(max_samples: usize) -> Self {
        Recorder {
            samples: Vec::new(),
            max_samples,
        }
    }

    /// Append captured samples, clipping at the bound. Returns false once
    /// the buffer is full (caller should auto-stop the session).
    pub fn push(&mut self, chunk: &[i16]) -> bool {
        let room = self.max_samples - self.samples.len();
        let take = chunk.len().min(room);
        self.samples.extend_from_slice(&chunk[..take]);
        self.samples.len() < self.max_samples
    }

    /// Samples captured so far
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether nothing was captured
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether the recording is long enough to transcribe
    pub fn usable(&self) -> bool {
        self.samples.len() >= STT_MIN_SAMPLES
    }

    /// Take the recording, leaving the buffer empty for the next session
    pub fn take(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.samples)
    }

    /// Borrow the recording without consuming it
    pub fn peek(&self) -> &[i16] {
        &self.samples
    }
}

fn stt_host(ctx: &AppContext) -> String {
    if let Some(attempt) = ctx.last_attempt.lock().as_ref() {
        if !attempt.host.is_empty() {
            return attempt.host.clone();
        }
    }
    if let Some(host) = &ctx.config.stt_host {
        return host.clone();
    }
    "192.168.11.12".to_string()
}

pub(crate) fn extract_text(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("text")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

/// POST a recording to the STT server and return the transcription.
///
/// The body is the canonical 44-byte header plus the PCM payload; the
/// current character name rides along in an `X-Character` header so the
/// server can answer in persona.
pub fn transcribe(ctx: &AppContext, samples: &[i16]) -> Result<String> {
    if samples.len() < STT_MIN_SAMPLES {
        debug!(len = samples.len(), "stt recording too short, skipping");
        return Err(GotchiError::Other("recording too short".into()));
    }

    let host = stt_host(ctx);
    let port = ctx.config.stt_port;
    let url = format!("http://{host}:{port}{STT_PATH}");
    let body = wav::encode_wav(samples, STT_SAMPLE_RATE);
    debug!(%url, bytes = body.len(), "stt upload");

    let character = super::phrases::CHARACTERS[super::phrases::character_index(
        ctx.current_character(),
    )]
    .name;

    let agent = net::download_agent();
    let resp = agent
        .post(url.as_str())
        .header("Content-Type", "audio/wav")
        .header("X-Character", character)
        .send(&body[..])
        .map_err(|e| {
            warn!(%url, error = %e, "stt connect failed");
            GotchiError::HttpError(format!("stt post failed: {e}"))
        })?;

    let code = resp.status().as_u16();
    if code != 200 {
        warn!(%url, code, "stt http error");
        return Err(GotchiError::HttpError(format!("stt status {code}")));
    }

    let text = resp
        .into_body()
        .read_to_string()
        .map_err(|e| GotchiError::HttpError(format!("stt body read failed: {e}")))?;
    extract_text(&text).ok_or_else(|| GotchiError::HttpError("no text in stt reply".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_bounds() {
        let mut rec = Recorder::new(10);
        assert!(rec.push(&[1; 4]));
        assert!(rec.push(&[2; 4]));
        // Third push hits the cap and clips
        assert!(!rec.push(&[3; 4]));
        assert_eq!(rec.len(), 10);
        let taken = rec.take();
        assert_eq!(taken.len(), 10);
        assert!(rec.is_empty());
    }

    #[test]
    fn test_recorder_usable_threshold() {
        let mut rec = Recorder::default();
        rec.push(&vec![0i16; STT_MIN_SAMPLES - 1]);
        assert!(!rec.usable());
        rec.push(&[0i16; 1]);
        assert!(rec.usable());
    }

    #[test]
    fn test_extract_text() {
        assert_eq!(
            extract_text(r#"{"text": "こんにちは"}"#),
            Some("こんにちは".to_string())
        );
        assert_eq!(extract_text(r#"{"text": ""}"#), None);
        assert_eq!(extract_text(r#"{"error": "nope"}"#), None);
        assert_eq!(extract_text("garbage"), None);
    }

    #[test]
    fn test_upload_body_framing() {
        // The upload body must be a parseable mono 16 kHz / 16-bit WAV
        let samples = vec![42i16; STT_MIN_SAMPLES];
        let body = wav::encode_wav(&samples, STT_SAMPLE_RATE);
        let (info, pcm) = wav::buffer::parse(&body).unwrap();
        assert_eq!(info.channels, 1);
        assert_eq!(info.sample_rate, STT_SAMPLE_RATE);
        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(pcm.len(), samples.len() * 2);
    }

    #[test]
    fn test_silence_capture_fills_buffer() {
        let mut cap = SilenceCapture;
        cap.start().unwrap();
        let mut buf = [7i16; 64];
        assert_eq!(cap.read(&mut buf), 64);
        assert!(buf.iter().all(|&s| s == 0));
        cap.stop();
    }
}
