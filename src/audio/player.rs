//! Chunked streaming playback
//!
//! Bridges an incoming byte stream to the audio output with minimal added
//! latency: raw PCM accumulates in a 2048-byte staging chunk; each full
//! chunk is moved into the output queue and the producer then waits until
//! the queue holds fewer than two undrained chunks before filling the next.
//! Combined with the chunk currently sounding, at most three chunks are
//! alive per session; latency is hidden at the cost of ~6 KiB.
//!
//! Two entry points share the machinery: [`play_wav_stream`] runs the full
//! defensive container parse first, while [`PlaybackWriter`] interprets only
//! a fixed 44-byte header and is used for chunked TTS response bodies.

use std::io::Read;
use std::time::{Duration, Instant};

use super::{AudioOutput, StreamSpec};
use crate::wav::{self, WavInfo};
use crate::{GotchiError, Result};

/// Size of one streaming chunk in bytes
pub const STREAM_CHUNK_BYTES: usize = 2048;
/// Undrained-chunk ceiling before the producer pauses
pub const MAX_QUEUED_CHUNKS: usize = 2;
/// Bound on the wait for a queue slot before proceeding anyway
pub const CHUNK_WAIT: Duration = Duration::from_secs(3);
/// Bound on the end-of-stream drain before declaring completion
pub const DRAIN_WAIT: Duration = Duration::from_secs(15);
/// Poll interval while waiting on the output queue
const QUEUE_POLL: Duration = Duration::from_millis(5);

/// Counters reported after a playback session
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaybackStats {
    /// Raw PCM bytes handed to the output
    pub pcm_bytes: usize,
    /// Chunk submissions made
    pub submissions: usize,
}

/// Streaming PCM player over an [`AudioOutput`]
pub struct StreamingPlayer<'a> {
    out: &'a mut dyn AudioOutput,
    staging: Vec<u8>,
    sample_bytes: usize,
    stats: PlaybackStats,
}

impl<'a> StreamingPlayer<'a> {
    /// Start a playback session for the given stream parameters.
    ///
    /// `rate_scale` multiplies the playback rate (spoken replies run at
    /// 1.25x); the output is prepared immediately.
    pub fn new(out: &'a mut dyn AudioOutput, info: &WavInfo, rate_scale: f32) -> Result<Self> {
        let play_rate = (info.sample_rate as f32 * rate_scale) as u32;
        out.begin(StreamSpec {
            sample_rate: play_rate.max(1),
            channels: info.channels,
        })?;
        Ok(StreamingPlayer {
            out,
            staging: Vec::with_capacity(STREAM_CHUNK_BYTES),
            sample_bytes: info.bytes_per_sample().max(1),
            stats: PlaybackStats::default(),
        })
    }

    /// Feed raw PCM bytes; full chunks are submitted as they complete
    pub fn push(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let space = STREAM_CHUNK_BYTES - self.staging.len();
            let take = bytes.len().min(space);
            self.staging.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            if self.staging.len() >= STREAM_CHUNK_BYTES {
                self.flush_chunk()?;
            }
        }
        Ok(())
    }

    /// Flush the staging chunk, rounded down to whole samples
    fn flush_chunk(&mut self) -> Result<()> {
        let usable = self.staging.len() - self.staging.len() % self.sample_bytes;
        if usable == 0 {
            self.staging.clear();
            return Ok(());
        }

        // Wait for a queue slot so the device never holds more than
        // MAX_QUEUED_CHUNKS undrained chunks; give up after CHUNK_WAIT and
        // submit anyway (best effort, not a hard failure).
        let deadline = Instant::now() + CHUNK_WAIT;
        while self.out.pending() >= MAX_QUEUED_CHUNKS && Instant::now() < deadline {
            std::thread::sleep(QUEUE_POLL);
        }

        let chunk = decode_samples(&self.staging[..usable], self.sample_bytes);
        self.staging.clear();
        self.out
            .submit(chunk)
            .map_err(|e| GotchiError::PlaybackError(format!("submit rejected: {e}")))?;
        self.stats.pcm_bytes += usable;
        self.stats.submissions += 1;
        Ok(())
    }

    /// Finish the session: flush the trailing partial chunk and drain the
    /// output, bounded by [`DRAIN_WAIT`], after which completion is declared
    /// regardless.
    pub fn finish(mut self) -> Result<PlaybackStats> {
        if !self.staging.is_empty() {
            self.flush_chunk()?;
        }
        let deadline = Instant::now() + DRAIN_WAIT;
        while self.out.pending() > 0 && Instant::now() < deadline {
            std::thread::sleep(QUEUE_POLL * 2);
        }
        Ok(self.stats)
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> PlaybackStats {
        self.stats
    }
}

/// Convert little-endian PCM bytes to interleaved i16 samples.
///
/// 8-bit WAV is unsigned midpoint-128; it is recentered and widened.
fn decode_samples(bytes: &[u8], sample_bytes: usize) -> Vec<i16> {
    if sample_bytes == 1 {
        bytes
            .iter()
            .map(|&b| ((b as i16) - 128) << 8)
            .collect()
    } else {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }
}

/// Parse a WAV header from `src` and stream exactly the declared payload to
/// the output. Chunk reads are rounded down to whole frames.
pub fn play_wav_stream<R: Read>(
    src: &mut R,
    out: &mut dyn AudioOutput,
    rate_scale: f32,
) -> Result<PlaybackStats> {
    let info = wav::stream::parse_header(src)?;
    play_wav_payload(src, out, &info, rate_scale)
}

/// Stream `info.data_bytes` of PCM payload from `src` to the output
pub fn play_wav_payload<R: Read>(
    src: &mut R,
    out: &mut dyn AudioOutput,
    info: &WavInfo,
    rate_scale: f32,
) -> Result<PlaybackStats> {
    let frame_bytes = info.block_size as usize;
    let mut player = StreamingPlayer::new(out, info, rate_scale)?;
    let mut remaining = info.data_bytes as usize;
    let mut buf = [0u8; STREAM_CHUNK_BYTES];

    while remaining > 0 {
        let mut want = remaining.min(STREAM_CHUNK_BYTES);
        want -= want % frame_bytes;
        if want == 0 {
            // Sub-frame tail: discard rather than play a torn frame
            wav::stream::skip_bytes(src, remaining, "READ_DROP")?;
            break;
        }
        src.read_exact(&mut buf[..want])
            .map_err(|e| GotchiError::ParseError(format!("READ_ERR: {e}")))?;
        player.push(&buf[..want])?;
        remaining -= want;
    }

    player.finish()
}

/// `std::io::Write` adapter that treats the first 44 bytes as a canonical
/// WAV header (sample rate at offset 24, channel count at offset 22) and
/// streams everything after it as PCM. Used where the response body arrives
/// through a writer-style copy, e.g. chunked TTS responses.
pub struct PlaybackWriter<'a> {
    out: Option<&'a mut dyn AudioOutput>,
    player: Option<StreamingPlayer<'a>>,
    header: [u8; wav::HEADER_LEN],
    header_pos: usize,
    rate_scale: f32,
}

impl<'a> PlaybackWriter<'a> {
    /// Create a writer that will start playback once the header is complete
    pub fn new(out: &'a mut dyn AudioOutput, rate_scale: f32) -> Self {
        PlaybackWriter {
            out: Some(out),
            player: None,
            header: [0u8; wav::HEADER_LEN],
            header_pos: 0,
            rate_scale,
        }
    }

    /// Whether a complete header was seen and playback started
    pub fn started(&self) -> bool {
        self.player.is_some()
    }

    fn begin_playback(&mut self) -> Result<()> {
        let sample_rate = wav::read_le32(&self.header[24..]);
        let channels = wav::read_le16(&self.header[22..]).max(1);
        let info = WavInfo {
            channels: channels.min(2),
            bits_per_sample: 16,
            block_size: channels.min(2) * 2,
            sample_rate: sample_rate.max(1),
            data_bytes: 0, // unknown: chunked transfer
        };
        tracing::debug!(
            sample_rate,
            channels,
            rate_scale = self.rate_scale,
            "stream playback started"
        );
        let out = self.out.take().expect("writer already started");
        self.player = Some(StreamingPlayer::new(out, &info, self.rate_scale)?);
        Ok(())
    }

    /// Flush the trailing chunk and drain the output
    pub fn finish(self) -> Result<PlaybackStats> {
        match self.player {
            Some(player) => player.finish(),
            // Body ended before a full header arrived
            None => Err(GotchiError::ParseError("HDR_FAIL: short body".into())),
        }
    }
}

impl std::io::Write for PlaybackWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut consumed = 0usize;

        if self.player.is_none() {
            while consumed < buf.len() && self.header_pos < wav::HEADER_LEN {
                self.header[self.header_pos] = buf[consumed];
                self.header_pos += 1;
                consumed += 1;
            }
            if self.header_pos >= wav::HEADER_LEN {
                self.begin_playback()
                    .map_err(|e| std::io::Error::other(e.to_string()))?;
            }
            if consumed >= buf.len() {
                return Ok(buf.len());
            }
        }

        if let Some(player) = self.player.as_mut() {
            player
                .push(&buf[consumed..])
                .map_err(|e| std::io::Error::other(e.to_string()))?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::StreamSpec;
    use std::io::Write;

    /// Output that records submissions and simulates an instantly-draining
    /// queue; optionally rejects after N submissions.
    #[derive(Default)]
    struct CaptureOutput {
        spec: Option<StreamSpec>,
        chunk_lens: Vec<usize>,
        reject_after: Option<usize>,
    }

    impl AudioOutput for CaptureOutput {
        fn begin(&mut self, spec: StreamSpec) -> crate::Result<()> {
            self.spec = Some(spec);
            Ok(())
        }

        fn submit(&mut self, chunk: Vec<i16>) -> crate::Result<()> {
            if let Some(limit) = self.reject_after {
                if self.chunk_lens.len() >= limit {
                    return Err(crate::GotchiError::AudioDeviceError("queue full".into()));
                }
            }
            self.chunk_lens.push(chunk.len());
            Ok(())
        }

        fn pending(&self) -> usize {
            0
        }

        fn stop(&mut self) {}

        fn is_running(&self) -> bool {
            true
        }
    }

    fn info_mono16(rate: u32) -> WavInfo {
        WavInfo {
            channels: 1,
            bits_per_sample: 16,
            block_size: 2,
            sample_rate: rate,
            data_bytes: 0,
        }
    }

    #[test]
    fn test_three_chunks_plus_one_byte_submits_three() {
        // 3 full chunks plus a single trailing byte: the tail rounds down
        // to zero samples, so exactly 3 submissions reach the output.
        let mut out = CaptureOutput::default();
        let mut player = StreamingPlayer::new(&mut out, &info_mono16(24_000), 1.0).unwrap();
        let data = vec![0u8; STREAM_CHUNK_BYTES * 3 + 1];
        player.push(&data).unwrap();
        let stats = player.finish().unwrap();
        assert_eq!(stats.submissions, 3);
        assert_eq!(stats.pcm_bytes, STREAM_CHUNK_BYTES * 3);
        assert_eq!(out.chunk_lens, vec![STREAM_CHUNK_BYTES / 2; 3]);
    }

    #[test]
    fn test_trailing_partial_chunk_rounds_to_samples() {
        let mut out = CaptureOutput::default();
        let mut player = StreamingPlayer::new(&mut out, &info_mono16(24_000), 1.0).unwrap();
        player.push(&vec![0u8; STREAM_CHUNK_BYTES + 2047]).unwrap();
        let stats = player.finish().unwrap();
        assert_eq!(stats.submissions, 2);
        // 2047 trailing bytes flush as 2046 (1023 samples)
        assert_eq!(out.chunk_lens[1], 1023);
    }

    #[test]
    fn test_eight_bit_recentered() {
        let info = WavInfo {
            channels: 1,
            bits_per_sample: 8,
            block_size: 1,
            sample_rate: 8_000,
            data_bytes: 0,
        };
        let mut out = CaptureOutput::default();
        let mut player = StreamingPlayer::new(&mut out, &info, 1.0).unwrap();
        player.push(&[128u8, 255, 0]).unwrap();
        player.finish().unwrap();
        assert_eq!(out.chunk_lens, vec![3]);
    }

    #[test]
    fn test_rate_scale_applied() {
        let mut out = CaptureOutput::default();
        let player = StreamingPlayer::new(&mut out, &info_mono16(16_000), 1.25).unwrap();
        drop(player);
        assert_eq!(out.spec.unwrap().sample_rate, 20_000);
    }

    #[test]
    fn test_rejected_submission_aborts() {
        let mut out = CaptureOutput {
            reject_after: Some(1),
            ..Default::default()
        };
        let mut player = StreamingPlayer::new(&mut out, &info_mono16(24_000), 1.0).unwrap();
        let err = player.push(&vec![0u8; STREAM_CHUNK_BYTES * 2]).unwrap_err();
        assert!(matches!(err, GotchiError::PlaybackError(_)));
    }

    #[test]
    fn test_play_wav_stream_counts() {
        let pcm = vec![0i16; 3 * STREAM_CHUNK_BYTES / 2 + 100];
        let bytes = crate::wav::encode_wav(&pcm, 16_000);
        let mut out = CaptureOutput::default();
        let stats = play_wav_stream(&mut std::io::Cursor::new(bytes), &mut out, 1.0).unwrap();
        assert_eq!(stats.submissions, 4);
        assert_eq!(stats.pcm_bytes, pcm.len() * 2);
        assert_eq!(out.chunk_lens[3], 100);
    }

    #[test]
    fn test_play_wav_stream_short_body_fails() {
        let pcm = vec![0i16; 4096];
        let mut bytes = crate::wav::encode_wav(&pcm, 16_000);
        bytes.truncate(bytes.len() - 100); // broken transfer
        let mut out = CaptureOutput::default();
        let err = play_wav_stream(&mut std::io::Cursor::new(bytes), &mut out, 1.0).unwrap_err();
        assert!(err.to_string().contains("READ_ERR"));
    }

    #[test]
    fn test_playback_writer_header_then_pcm() {
        let pcm = vec![0i16; STREAM_CHUNK_BYTES]; // two chunks worth
        let bytes = crate::wav::encode_wav(&pcm, 24_000);
        let mut out = CaptureOutput::default();
        let mut writer = PlaybackWriter::new(&mut out, 1.0);
        // Deliver in uneven slices the way a chunked body arrives
        for part in bytes.chunks(777) {
            writer.write_all(part).unwrap();
        }
        assert!(writer.started());
        let stats = writer.finish().unwrap();
        assert_eq!(stats.submissions, 2);
        assert_eq!(out.spec.unwrap().sample_rate, 24_000);
    }

    #[test]
    fn test_playback_writer_short_body() {
        let mut out = CaptureOutput::default();
        let mut writer = PlaybackWriter::new(&mut out, 1.0);
        writer.write_all(&[0u8; 20]).unwrap();
        assert!(!writer.started());
        assert!(writer.finish().is_err());
    }
}
