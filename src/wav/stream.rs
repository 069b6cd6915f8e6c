//! Stream-mode WAV parse
//!
//! Consumes a live byte source incrementally: header fields are read as they
//! arrive so playback can begin before the body is complete. The source is
//! expected to enforce its own idle timeout (see `net::HttpByteStream`);
//! here every short read is a hard failure, because on a network transfer it
//! means the peer broke off mid-container.

use std::io::Read;

use super::{is_riff_wave, parse_fmt_body, read_le32, WavInfo};
use crate::{GotchiError, Result};

const SKIP_BUF_LEN: usize = 512;

fn read_exact_tagged<R: Read>(src: &mut R, buf: &mut [u8], tag: &str) -> Result<()> {
    src.read_exact(buf)
        .map_err(|e| GotchiError::ParseError(format!("{tag}: {e}")))
}

/// Discard exactly `bytes` bytes from the source
pub(crate) fn skip_bytes<R: Read>(src: &mut R, mut bytes: usize, tag: &str) -> Result<()> {
    let mut scratch = [0u8; SKIP_BUF_LEN];
    while bytes > 0 {
        let want = bytes.min(SKIP_BUF_LEN);
        read_exact_tagged(src, &mut scratch[..want], tag)?;
        bytes -= want;
    }
    Ok(())
}

/// Parse a WAV container header from a live byte source.
///
/// Blocks until the `data` chunk header has been consumed; on success the
/// source is positioned at the first PCM payload byte and the returned
/// [`WavInfo`] carries the declared payload length. Sub-chunks may appear in
/// any order before `data`; unknown chunks are read and discarded including
/// their even-byte pad.
pub fn parse_header<R: Read>(src: &mut R) -> Result<WavInfo> {
    let mut riff = [0u8; 12];
    read_exact_tagged(src, &mut riff, "HDR_FAIL")?;
    if !is_riff_wave(&riff) {
        return Err(GotchiError::ParseError("BAD_WAV".into()));
    }

    let mut info: Option<WavInfo> = None;
    loop {
        let mut chunk_hdr = [0u8; 8];
        read_exact_tagged(src, &mut chunk_hdr, "HDR_FAIL")?;
        let declared = read_le32(&chunk_hdr[4..]) as usize;

        if &chunk_hdr[0..4] == b"fmt " {
            if declared < 16 {
                return Err(GotchiError::ParseError("BAD_FMT".into()));
            }
            let mut fmt = [0u8; 16];
            read_exact_tagged(src, &mut fmt, "BAD_FMT")?;
            let parsed = parse_fmt_body(&fmt)?;

            if declared > fmt.len() {
                skip_bytes(src, declared - fmt.len(), "FMT_SKIP")?;
            }
            if declared & 1 == 1 {
                skip_bytes(src, 1, "FMT_PAD")?;
            }
            info = Some(parsed);
            continue;
        }

        if &chunk_hdr[0..4] == b"data" {
            let Some(mut found) = info else {
                return Err(GotchiError::ParseError("FMT_FIRST".into()));
            };
            if declared == 0 {
                return Err(GotchiError::ParseError("NO_DATA".into()));
            }
            found.data_bytes = declared as u32;
            return Ok(found);
        }

        skip_bytes(src, declared, "CHUNK_SKIP")?;
        if declared & 1 == 1 {
            skip_bytes(src, 1, "CHUNK_PAD")?;
        }
    }
}
