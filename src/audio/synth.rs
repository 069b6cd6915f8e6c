//! Procedurally synthesized fallback sounds
//!
//! When every network voice source fails, the pet still makes noise: a
//! cry-like glide, a warbling "alt voice", and plain tones. The two longer
//! waveforms are computed once and cached in a lookup table so repeated
//! playback costs no per-sample trig.

use std::f32::consts::PI;
use std::sync::OnceLock;
use std::time::Duration;

use super::player::{self, StreamingPlayer};
use super::AudioOutput;
use crate::wav::WavInfo;
use crate::Result;

/// Sample rate of the synthesized waveforms
pub const SYNTH_SAMPLE_RATE: u32 = 11_025;
/// Length of the cry waveform in samples (~0.5 s)
pub const CRY_SAMPLES: usize = 5_500;
/// Length of the alt-voice waveform in samples (~0.38 s)
pub const ALT_VOICE_SAMPLES: usize = 4_200;

static CRY_WAVE: OnceLock<Vec<i16>> = OnceLock::new();
static ALT_VOICE_WAVE: OnceLock<Vec<i16>> = OnceLock::new();

/// Cry-like waveform: a wobbling base pitch with a slow glide, short attack,
/// long release and tremolo.
pub fn cry_wave() -> &'static [i16] {
    CRY_WAVE.get_or_init(|| {
        let mut wave = Vec::with_capacity(CRY_SAMPLES);
        for i in 0..CRY_SAMPLES {
            let t = i as f32 / SYNTH_SAMPLE_RATE as f32;
            let base = 780.0 + 90.0 * (2.0 * PI * 2.8 * t).sin();
            let glide = 120.0 * (2.0 * PI * 0.9 * t).sin();
            let pitch = base + glide;
            let env = if t < 0.03 {
                t / 0.03
            } else if t > 0.42 {
                (1.0 - ((t - 0.42) / 0.20)).max(0.0)
            } else {
                1.0
            };
            let carrier = (2.0 * PI * pitch * t).sin() * 8_000.0;
            let trem = (2.0 * PI * 35.0 * t).sin() * 0.18 + 0.82;
            wave.push((carrier * env * trem) as i16);
        }
        wave
    })
}

/// Warbling voice-like waveform used as the happy-phrase fallback
pub fn alt_voice_wave() -> &'static [i16] {
    ALT_VOICE_WAVE.get_or_init(|| {
        let mut wave = Vec::with_capacity(ALT_VOICE_SAMPLES);
        for i in 0..ALT_VOICE_SAMPLES {
            let t = i as f32 / SYNTH_SAMPLE_RATE as f32;
            let base = 660.0 + 90.0 * (2.0 * PI * 2.4 * t).sin();
            let formant = 180.0 + 45.0 * (2.0 * PI * 0.8 * t).sin();
            let pitch =
                base + 120.0 * (2.0 * PI * 0.4 * t).sin() + formant * (2.0 * PI * 1.8 * t).sin();
            let env = if t < 0.06 {
                t / 0.06
            } else if t > 0.60 {
                ((0.7 - t) / 0.30).max(0.0)
            } else {
                1.0
            };
            let carrier = (2.0 * PI * pitch * t).sin()
                + 0.38 * (2.0 * PI * (pitch * 2.0 + 120.0) * t).sin();
            wave.push((carrier * 9_000.0 * env) as i16);
        }
        wave
    })
}

/// Generate a plain sine tone with a 5 ms attack/release ramp
pub fn tone_wave(frequency: f32, duration: Duration) -> Vec<i16> {
    let total = ((duration.as_secs_f32() * SYNTH_SAMPLE_RATE as f32) as usize).max(1);
    let ramp = (SYNTH_SAMPLE_RATE as f32 * 0.005) as usize;
    let mut wave = Vec::with_capacity(total);
    for i in 0..total {
        let t = i as f32 / SYNTH_SAMPLE_RATE as f32;
        let mut env = 1.0f32;
        if ramp > 0 {
            if i < ramp {
                env = i as f32 / ramp as f32;
            } else if i + ramp > total {
                env = (total - i) as f32 / ramp as f32;
            }
        }
        wave.push(((2.0 * PI * frequency * t).sin() * 9_000.0 * env) as i16);
    }
    wave
}

/// Play mono 16-bit samples through the streaming pipeline
pub fn play_pcm(out: &mut dyn AudioOutput, samples: &[i16], sample_rate: u32) -> Result<()> {
    let info = WavInfo {
        channels: 1,
        bits_per_sample: 16,
        block_size: 2,
        sample_rate,
        data_bytes: (samples.len() * 2) as u32,
    };
    let mut player = StreamingPlayer::new(out, &info, 1.0)?;
    let mut buf = [0u8; player::STREAM_CHUNK_BYTES];
    for batch in samples.chunks(player::STREAM_CHUNK_BYTES / 2) {
        for (i, s) in batch.iter().enumerate() {
            buf[i * 2..i * 2 + 2].copy_from_slice(&s.to_le_bytes());
        }
        player.push(&buf[..batch.len() * 2])?;
    }
    player.finish()?;
    Ok(())
}

/// Play a plain tone (fallback beep)
pub fn play_tone(out: &mut dyn AudioOutput, frequency: f32, duration: Duration) -> Result<()> {
    let wave = tone_wave(frequency, duration);
    play_pcm(out, &wave, SYNTH_SAMPLE_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullOutput;
    use approx::assert_relative_eq;

    #[test]
    fn test_cry_wave_cached_and_bounded() {
        let a = cry_wave();
        let b = cry_wave();
        assert_eq!(a.len(), CRY_SAMPLES);
        assert!(std::ptr::eq(a.as_ptr(), b.as_ptr()), "table not cached");
        assert!(a.iter().all(|&s| s.abs() <= 9_000));
        // Attack starts from silence
        assert_eq!(a[0], 0);
    }

    #[test]
    fn test_alt_voice_wave_shape() {
        let w = alt_voice_wave();
        assert_eq!(w.len(), ALT_VOICE_SAMPLES);
        let peak = w.iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!(peak > 4_000, "waveform unexpectedly quiet: {peak}");
    }

    #[test]
    fn test_tone_wave_envelope() {
        let w = tone_wave(880.0, Duration::from_millis(120));
        assert_eq!(w.len(), (SYNTH_SAMPLE_RATE as usize * 120) / 1000);
        assert_relative_eq!(w[0] as f32, 0.0, epsilon = 1.0);
        assert_relative_eq!(*w.last().unwrap() as f32, 0.0, epsilon = 600.0);
    }

    #[test]
    fn test_play_pcm_chunks_everything() {
        let mut out = NullOutput::default();
        let samples = vec![100i16; 3000];
        play_pcm(&mut out, &samples, SYNTH_SAMPLE_RATE).unwrap();
        assert_eq!(out.samples(), 3000);
        assert_eq!(out.chunks(), 3); // 1024 + 1024 + 952
    }
}
