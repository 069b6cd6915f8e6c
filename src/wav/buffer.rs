//! Buffer-mode WAV parse
//!
//! Operates on a completed capture held in memory. Sub-chunks may appear in
//! any order; unknown chunk types are skipped by their declared size plus the
//! mandatory even-byte pad. The chunk walk is iteration-capped so an
//! adversarial zero-size chunk cannot loop forever, and a `data` declaration
//! larger than the bytes actually present is clipped rather than rejected,
//! which keeps truncated downloads playable.

use super::{is_riff_wave, parse_fmt_body, read_le32, WavInfo};
use crate::{GotchiError, Result};

/// Upper bound on chunk-walk steps (well past any real file)
const MAX_CHUNK_ITERATIONS: usize = 100;

/// Parse a WAV container from a byte buffer.
///
/// Returns the validated [`WavInfo`] and the PCM payload slice, which
/// addresses exactly the bytes following the located `data` chunk's 8-byte
/// header (clipped to the buffer end when the declaration overshoots).
pub fn parse(data: &[u8]) -> Result<(WavInfo, &[u8])> {
    if !is_riff_wave(data) {
        return Err(GotchiError::ParseError("BAD_WAV".into()));
    }

    let mut info: Option<WavInfo> = None;
    let mut pos = 12usize;
    let mut iterations = 0usize;

    while pos + 8 <= data.len() {
        iterations += 1;
        if iterations > MAX_CHUNK_ITERATIONS {
            return Err(GotchiError::ParseError("CHUNK_LOOP".into()));
        }

        let id = &data[pos..pos + 4];
        let declared = read_le32(&data[pos + 4..]) as usize;
        let body = pos + 8;

        if id == b"fmt " {
            if declared < 16 || body + declared > data.len() {
                return Err(GotchiError::ParseError("BAD_FMT".into()));
            }
            info = Some(parse_fmt_body(&data[body..body + declared])?);
        } else if id == b"data" {
            let Some(mut found) = info else {
                // data before fmt leaves the payload uninterpretable
                return Err(GotchiError::ParseError("FMT_FIRST".into()));
            };
            if declared == 0 {
                return Err(GotchiError::ParseError("NO_DATA".into()));
            }
            let available = data.len() - body;
            let len = declared.min(available);
            if len == 0 {
                return Err(GotchiError::ParseError("NO_DATA".into()));
            }
            found.data_bytes = len as u32;
            return Ok((found, &data[body..body + len]));
        } else {
            // Unknown chunk: skippable only if its declared size stays in bounds
            if declared > data.len() || body + declared > data.len() {
                return Err(GotchiError::ParseError("CHUNK_SKIP".into()));
            }
        }

        pos = body + declared;
        if declared & 1 == 1 {
            pos += 1;
        }
    }

    Err(GotchiError::ParseError(
        if info.is_none() { "BAD_FMT" } else { "NO_DATA" }.into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(id);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        if body.len() & 1 == 1 {
            out.push(0);
        }
        out
    }

    fn fmt_body(channels: u16, sample_rate: u32, bits: u16) -> Vec<u8> {
        let block = channels * (bits / 8);
        let mut body = vec![0u8; 16];
        body[0..2].copy_from_slice(&1u16.to_le_bytes());
        body[2..4].copy_from_slice(&channels.to_le_bytes());
        body[4..8].copy_from_slice(&sample_rate.to_le_bytes());
        body[8..12].copy_from_slice(&(sample_rate * block as u32).to_le_bytes());
        body[12..14].copy_from_slice(&block.to_le_bytes());
        body[14..16].copy_from_slice(&bits.to_le_bytes());
        body
    }

    fn build_wav(chunks: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        let total: usize = 4 + chunks.iter().map(Vec::len).sum::<usize>();
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        for c in chunks {
            out.extend_from_slice(c);
        }
        out
    }

    fn minimal_wav(channels: u16, sample_rate: u32, bits: u16, pcm: &[u8]) -> Vec<u8> {
        build_wav(&[
            chunk(b"fmt ", &fmt_body(channels, sample_rate, bits)),
            chunk(b"data", pcm),
        ])
    }

    #[test]
    fn test_parse_mono_16bit() {
        let pcm = [1u8, 2, 3, 4, 5, 6];
        let data = minimal_wav(1, 24_000, 16, &pcm);
        let (info, payload) = parse(&data).unwrap();
        assert_eq!(info.channels, 1);
        assert_eq!(info.sample_rate, 24_000);
        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(info.block_size, 2);
        assert_eq!(info.data_bytes, 6);
        assert_eq!(payload, &pcm);
    }

    #[test]
    fn test_parse_stereo_8bit() {
        let data = minimal_wav(2, 8_000, 8, &[9u8; 8]);
        let (info, payload) = parse(&data).unwrap();
        assert_eq!(info.channels, 2);
        assert_eq!(info.block_size, 2);
        assert_eq!(info.bits_per_sample, 8);
        assert_eq!(payload.len(), 8);
    }

    #[test]
    fn test_missing_riff_magic() {
        let mut data = minimal_wav(1, 16_000, 16, &[0u8; 4]);
        data[0] = b'X';
        assert!(parse(&data).is_err());
    }

    #[test]
    fn test_missing_wave_magic() {
        let mut data = minimal_wav(1, 16_000, 16, &[0u8; 4]);
        data[8] = b'X';
        assert!(parse(&data).is_err());
    }

    #[test]
    fn test_non_pcm_format_rejected() {
        let mut body = fmt_body(1, 16_000, 16);
        body[0] = 3; // IEEE float
        let data = build_wav(&[chunk(b"fmt ", &body), chunk(b"data", &[0u8; 4])]);
        let err = parse(&data).unwrap_err();
        assert!(err.to_string().contains("FMT_UNSUP"));
    }

    #[test]
    fn test_unsupported_bit_depths_rejected() {
        for bits in [12u16, 24, 32] {
            let mut body = fmt_body(1, 16_000, 16);
            body[14..16].copy_from_slice(&bits.to_le_bytes());
            let data = build_wav(&[chunk(b"fmt ", &body), chunk(b"data", &[0u8; 4])]);
            assert!(parse(&data).is_err(), "bits={bits} accepted");
        }
    }

    #[test]
    fn test_three_channels_rejected() {
        let mut body = fmt_body(2, 16_000, 16);
        body[2] = 3;
        body[12] = 6;
        let data = build_wav(&[chunk(b"fmt ", &body), chunk(b"data", &[0u8; 6])]);
        assert!(parse(&data).is_err());
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let data = build_wav(&[
            chunk(b"fmt ", &fmt_body(1, 0, 16)),
            chunk(b"data", &[0u8; 4]),
        ]);
        assert!(parse(&data).is_err());
    }

    #[test]
    fn test_data_before_fmt_rejected() {
        let data = build_wav(&[
            chunk(b"data", &[0u8; 4]),
            chunk(b"fmt ", &fmt_body(1, 16_000, 16)),
        ]);
        let err = parse(&data).unwrap_err();
        assert!(err.to_string().contains("FMT_FIRST"));
    }

    #[test]
    fn test_unknown_chunks_skipped_in_any_order() {
        let data = build_wav(&[
            chunk(b"JUNK", &[0xAA; 7]), // odd size exercises pad skip
            chunk(b"fmt ", &fmt_body(1, 16_000, 16)),
            chunk(b"LIST", &[0xBB; 10]),
            chunk(b"data", &[1, 2, 3, 4]),
        ]);
        let (info, payload) = parse(&data).unwrap();
        assert_eq!(info.data_bytes, 4);
        assert_eq!(payload, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_oversized_data_declaration_truncated() {
        let mut data = build_wav(&[chunk(b"fmt ", &fmt_body(1, 16_000, 16))]);
        data.extend_from_slice(b"data");
        data.extend_from_slice(&100_000u32.to_le_bytes());
        data.extend_from_slice(&[7u8; 10]); // only 10 bytes actually present
        let (info, payload) = parse(&data).unwrap();
        assert_eq!(info.data_bytes, 10);
        assert_eq!(payload, &[7u8; 10]);
    }

    #[test]
    fn test_zero_data_declaration_rejected() {
        let data = build_wav(&[
            chunk(b"fmt ", &fmt_body(1, 16_000, 16)),
            chunk(b"data", &[]),
        ]);
        assert!(parse(&data).is_err());
    }

    #[test]
    fn test_chunk_overrunning_buffer_rejected() {
        let mut data = build_wav(&[chunk(b"fmt ", &fmt_body(1, 16_000, 16))]);
        data.extend_from_slice(b"LIST");
        data.extend_from_slice(&100u32.to_le_bytes()); // declared past the end
        data.extend_from_slice(&[0u8; 4]);
        assert!(parse(&data).is_err());
    }

    #[test]
    fn test_zero_size_chunk_flood_terminates() {
        // A run of zero-size chunks advances 8 bytes each step; the
        // iteration cap must stop the walk instead of succeeding late.
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        for _ in 0..(super::MAX_CHUNK_ITERATIONS + 10) {
            chunks.push(chunk(b"JUNK", &[]));
        }
        chunks.push(chunk(b"fmt ", &fmt_body(1, 16_000, 16)));
        chunks.push(chunk(b"data", &[0u8; 2]));
        let data = build_wav(&chunks);
        let err = parse(&data).unwrap_err();
        assert!(err.to_string().contains("CHUNK_LOOP"));
    }

    #[test]
    fn test_truncated_header_rejected() {
        assert!(parse(b"RIFF").is_err());
        assert!(parse(&[]).is_err());
    }
}
