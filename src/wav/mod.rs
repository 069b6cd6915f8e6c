//! WAV container parsing and writing
//!
//! Standard `RIFF`/`WAVE` containers carrying linear PCM, 8 or 16 bits,
//! 1–2 channels. Two parse modes share the same validation rules:
//! - [`buffer`]: a completed capture held in memory. Tolerant of truncated
//!   downloads (an oversized `data` declaration is clipped to the bytes
//!   actually present) and bounded against adversarial zero-size chunks.
//! - [`stream`]: a live network body consumed incrementally. A short read is
//!   a hard failure since it indicates a broken transfer.
//!
//! The writer side emits the fixed 44-byte canonical header (PCM, mono,
//! 16-bit) used for speech-to-text uploads, plus a `hound`-based file export
//! for captured recordings.
//!
//! Parse failures carry a short status tag (`BAD_WAV`, `FMT_UNSUP`, ...)
//! surfaced on the voice status endpoints.

pub mod buffer;
pub mod stream;

use crate::{GotchiError, Result};

/// Length of the canonical PCM WAV header
pub const HEADER_LEN: usize = 44;

/// Stream parameters extracted from a WAV container header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WavInfo {
    /// Channel count (1 or 2)
    pub channels: u16,
    /// Bits per sample (8 or 16)
    pub bits_per_sample: u16,
    /// Bytes per multi-channel frame (`channels * bits_per_sample / 8`)
    pub block_size: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Length of the PCM payload in bytes
    pub data_bytes: u32,
}

impl WavInfo {
    /// Bytes per single-channel sample
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample / 8) as usize
    }

    /// True when more than one channel is present
    pub fn stereo(&self) -> bool {
        self.channels > 1
    }
}

pub(crate) fn read_le16(data: &[u8]) -> u16 {
    u16::from_le_bytes([data[0], data[1]])
}

pub(crate) fn read_le32(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

/// Check for the `RIFF....WAVE` container magic
pub fn is_riff_wave(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE"
}

/// Validate a 16-byte `fmt ` chunk body and fill the format fields of a
/// [`WavInfo`] (everything except `data_bytes`).
pub(crate) fn parse_fmt_body(body: &[u8]) -> Result<WavInfo> {
    if body.len() < 16 {
        return Err(GotchiError::ParseError("BAD_FMT".into()));
    }
    let format_tag = read_le16(&body[0..]);
    let channels = read_le16(&body[2..]);
    let sample_rate = read_le32(&body[4..]);
    let block_size = read_le16(&body[12..]);
    let bits = read_le16(&body[14..]);

    if format_tag != 1
        || channels == 0
        || channels > 2
        || sample_rate == 0
        || (bits != 8 && bits != 16)
        || block_size == 0
    {
        return Err(GotchiError::ParseError("FMT_UNSUP".into()));
    }
    if block_size != channels * (bits / 8) {
        return Err(GotchiError::ParseError("FMT_BADBLK".into()));
    }

    Ok(WavInfo {
        channels,
        bits_per_sample: bits,
        block_size,
        sample_rate,
        data_bytes: 0,
    })
}

/// Write the canonical 44-byte PCM header (mono, 16-bit) for `data_bytes`
/// bytes of payload at `sample_rate` Hz.
pub fn write_header(header: &mut [u8; HEADER_LEN], data_bytes: u32, sample_rate: u32) {
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(data_bytes + 36).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&1u16.to_le_bytes()); // mono
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    header[32..34].copy_from_slice(&2u16.to_le_bytes()); // block align
    header[34..36].copy_from_slice(&16u16.to_le_bytes()); // bits per sample
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_bytes.to_le_bytes());
}

/// Frame mono 16-bit samples as a complete in-memory WAV file
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let data_bytes = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(HEADER_LEN + samples.len() * 2);
    let mut header = [0u8; HEADER_LEN];
    write_header(&mut header, data_bytes, sample_rate);
    out.extend_from_slice(&header);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Export mono 16-bit samples to a WAV file on disk
pub fn export_wav_file(path: &std::path::Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| GotchiError::Io(std::io::Error::other(e.to_string())))?;
    for &s in samples {
        writer
            .write_sample(s)
            .map_err(|e| GotchiError::Io(std::io::Error::other(e.to_string())))?;
    }
    writer
        .finalize()
        .map_err(|e| GotchiError::Io(std::io::Error::other(e.to_string())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        // Write a header for N samples at rate R, parse it back
        let samples = vec![0i16; 777];
        let data = encode_wav(&samples, 16_000);
        let (info, pcm) = buffer::parse(&data).unwrap();

        assert_eq!(info.channels, 1);
        assert_eq!(info.sample_rate, 16_000);
        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(info.block_size, 2);
        assert_eq!(info.data_bytes, 777 * 2);
        assert_eq!(pcm.len(), 777 * 2);
    }

    #[test]
    fn test_encoded_payload_offset() {
        let samples: Vec<i16> = (0..8).collect();
        let data = encode_wav(&samples, 11_025);
        // Payload begins right after the 44-byte header
        assert_eq!(&data[36..40], b"data");
        assert_eq!(data.len(), HEADER_LEN + 16);
        let (_, pcm) = buffer::parse(&data).unwrap();
        assert_eq!(pcm, &data[HEADER_LEN..]);
    }

    #[test]
    fn test_riff_magic_check() {
        assert!(is_riff_wave(&encode_wav(&[0i16; 4], 8_000)));
        assert!(!is_riff_wave(b"RIFF1234"));
        assert!(!is_riff_wave(b"RIFX\0\0\0\0WAVE"));
    }

    #[test]
    fn test_fmt_body_rejects_bad_block_align() {
        let mut body = [0u8; 16];
        body[0] = 1; // PCM
        body[2] = 1; // mono
        body[4..8].copy_from_slice(&16_000u32.to_le_bytes());
        body[12] = 4; // wrong: mono 16-bit means block size 2
        body[14] = 16;
        let err = parse_fmt_body(&body).unwrap_err();
        assert!(err.to_string().contains("FMT_BADBLK"));
    }
}
