//! Voice acquisition and playback orchestration
//!
//! Turns a phrase (or a pre-baked tone index) into audible output through a
//! strict, sequential cascade: live TTS endpoints first, then two statically
//! hosted WAV mirrors, then a procedurally synthesized sound. Requests reach
//! the voice thread through a small bounded queue; a full queue drops the
//! request rather than blocking the game loop.

pub mod candidates;
pub mod phrases;
pub mod stt;
pub mod tts;

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::AppContext;
use crate::audio::synth;
use crate::net;
use crate::wav;
use crate::Result;

pub use tts::AttemptRecord;

/// Delay between the primary and mirror static-URL attempts
pub const STATIC_RETRY_DELAY: Duration = Duration::from_millis(350);
/// How long a spoken phrase stays on screen
pub const PHRASE_DISPLAY_TIME: Duration = Duration::from_secs(3);
/// How long an STT transcription stays on screen
pub const STT_DISPLAY_TIME: Duration = Duration::from_secs(4);

/// Pre-baked voice slots backed by static WAV mirrors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceTone {
    /// Default speaking voice
    Default = 0,
    /// Secondary beep voice
    Beep2 = 1,
}

/// Number of voice tone slots
pub const VOICE_TONE_COUNT: usize = 2;

impl VoiceTone {
    /// Slot index of this tone
    pub fn index(self) -> usize {
        self as usize
    }
}

/// What a voice request should say
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Happy phrase (tap)
    Happy,
    /// Sad phrase (tap)
    Sad,
    /// Cleaning-done phrase
    Clean,
    /// Character introduction (boot / skin switch)
    Boot,
    /// Transcribe the held recording and speak the reply
    SttReply,
}

/// One unit of work for the voice thread. Created by the game logic,
/// consumed exactly once, dropped silently when the queue is full.
#[derive(Debug, Clone, Copy)]
pub struct VoiceRequest {
    /// Character skin the phrase belongs to
    pub character: u8,
    /// Phrase category
    pub kind: RequestKind,
}

/// Lifecycle of a voice slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Nothing attempted yet
    Pending = 0,
    /// A download or cascade is in flight
    Downloading = 1,
    /// Audio was produced (streamed or cached)
    Downloaded = 2,
    /// The last attempt failed
    Failed = 3,
}

/// Per-tone status and optional in-memory WAV cache
#[derive(Debug)]
pub struct VoiceSlot {
    /// Current lifecycle state
    pub state: VoiceState,
    /// Short status tag of the latest transition
    pub message: String,
    /// Cached WAV bytes from a static mirror, if prefetched
    pub cached: Option<Vec<u8>>,
}

impl Default for VoiceSlot {
    fn default() -> Self {
        VoiceSlot {
            state: VoiceState::Pending,
            message: "...".to_string(),
            cached: None,
        }
    }
}

impl VoiceSlot {
    /// Whether a cached WAV is available for replay
    pub fn loaded(&self) -> bool {
        self.cached.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Length of the cached WAV in bytes
    pub fn cached_len(&self) -> usize {
        self.cached.as_ref().map(Vec::len).unwrap_or(0)
    }
}

/// Speak `phrase` through the prioritized cascade: TTS endpoints, then the
/// tone's static mirrors, in strict order. Returns whether anything played;
/// the synthesized fallback is the caller's job since it depends on the
/// request kind.
pub fn speak_with_fallback(
    ctx: &AppContext,
    tone: VoiceTone,
    phrase: &str,
    quick: bool,
    rate_scale: f32,
) -> bool {
    if tts::speak_text(ctx, phrase, tone, quick, rate_scale).is_ok() {
        return true;
    }

    ctx.set_slot_downloading(tone);
    let urls = ctx.config.voice_urls(tone);
    for (attempt, url) in urls.iter().enumerate() {
        ctx.set_slot_message(tone, if attempt == 0 { "TRY1" } else { "TRY2" });
        if tts::play_url(ctx, tone, url, 1.0).is_ok() {
            return true;
        }
        if attempt + 1 < urls.len() {
            std::thread::sleep(STATIC_RETRY_DELAY);
        }
    }

    ctx.set_slot_failed(tone, "FAIL");
    false
}

/// Synthesized last-resort sound for a request kind: a three-tone chime for
/// cleaning, the alt-voice warble for happy phrases, otherwise the cry.
pub fn play_fallback_sound(ctx: &AppContext, kind: RequestKind) {
    let Ok(mut out) = ctx.lock_output_for_playback("play_fallback_sound") else {
        return;
    };
    let out = out.as_mut();

    match kind {
        RequestKind::Clean => {
            for (freq, ms) in [(880.0, 80u64), (1_040.0, 90), (1_240.0, 90)] {
                if synth::play_tone(out, freq, Duration::from_millis(ms)).is_err() {
                    break;
                }
            }
        }
        RequestKind::Happy | RequestKind::Boot => {
            if synth::play_pcm(out, synth::alt_voice_wave(), synth::SYNTH_SAMPLE_RATE).is_err()
                && synth::play_pcm(out, synth::cry_wave(), synth::SYNTH_SAMPLE_RATE).is_err()
            {
                let _ = synth::play_tone(out, 900.0, Duration::from_millis(110));
            }
        }
        _ => {
            if synth::play_pcm(out, synth::cry_wave(), synth::SYNTH_SAMPLE_RATE).is_err() {
                let _ = synth::play_tone(out, 900.0, Duration::from_millis(110));
            }
        }
    }
}

/// Prefetch a tone's static WAV into the in-memory cache, trying the primary
/// then the mirror URL. The result is validated by the buffer-mode parser
/// before it is kept.
pub fn ensure_voice_cached(ctx: &AppContext, tone: VoiceTone) -> Result<usize> {
    if ctx.slot_loaded(tone) {
        return Ok(ctx.slot_cached_len(tone));
    }

    let urls = ctx.config.voice_urls(tone);
    let agent = net::download_agent();
    let mut last_err = crate::GotchiError::HttpError("no urls configured".into());

    for (attempt, url) in urls.iter().enumerate() {
        ctx.set_slot_downloading(tone);
        ctx.set_slot_message(tone, if attempt == 0 { "TRY1" } else { "TRY2" });

        let outcome = (|| -> Result<Vec<u8>> {
            let resp = agent
                .get(url.as_str())
                .call()
                .map_err(|e| crate::GotchiError::HttpError(format!("begin failed: {e}")))?;
            let code = resp.status().as_u16();
            if code != 200 {
                ctx.set_slot_message(tone, &format!("HTTP_{code}"));
                return Err(crate::GotchiError::HttpError(format!("status {code}")));
            }
            let content_type = net::header_str(&resp, "content-type");
            if !content_type.is_empty() && !net::looks_like_wav(&content_type) {
                // Mirror served an error page; note it but read anyway
                warn!(%url, %content_type, "voice content-type suspicious");
                ctx.set_slot_message(tone, "BAD_TYPE");
            }
            let body = net::read_body_bounded(resp, net::MAX_VOICE_BYTES)?;
            if !wav::is_riff_wave(&body) {
                ctx.set_slot_message(tone, "BAD_HEADER");
                return Err(crate::GotchiError::ParseError("BAD_HEADER".into()));
            }
            // Must be playable, not just RIFF-framed
            wav::buffer::parse(&body)?;
            Ok(body)
        })();

        match outcome {
            Ok(body) => {
                let len = body.len();
                info!(%url, len, "voice downloaded");
                ctx.store_cached_voice(tone, body);
                return Ok(len);
            }
            Err(e) => {
                debug!(%url, error = %e, "voice download failed");
                last_err = e;
                if attempt + 1 < urls.len() {
                    std::thread::sleep(Duration::from_millis(400));
                }
            }
        }
    }

    ctx.set_slot_failed(tone, "FAIL");
    Err(last_err)
}

/// Replay a previously cached voice from memory
pub fn play_cached(ctx: &AppContext, tone: VoiceTone) -> Result<()> {
    let bytes = ctx
        .take_cached_voice(tone)
        .ok_or_else(|| crate::GotchiError::Other("voice not cached".into()))?;
    let result = (|| -> Result<()> {
        let (info, pcm) = wav::buffer::parse(&bytes)?;
        let mut out = ctx.lock_output_for_playback("play_cached")?;
        out.stop();
        let mut player = crate::audio::StreamingPlayer::new(out.as_mut(), &info, 1.0)?;
        player.push(pcm)?;
        player.finish()?;
        Ok(())
    })();
    // Cache survives playback so the slot can replay without refetching
    ctx.store_cached_voice(tone, bytes);
    result
}

/// Voice thread body: drain the request queue, resolve each request to a
/// phrase, and run the acquisition cascade. Network and playback block only
/// this thread.
pub fn run_voice_loop(ctx: Arc<AppContext>, requests: Receiver<VoiceRequest>) {
    info!("voice thread started");
    for req in requests.iter() {
        if !ctx.speaker_ready() {
            continue;
        }

        match req.kind {
            RequestKind::SttReply => handle_stt_reply(&ctx),
            kind => {
                let Some(phrase) = phrases::phrase_for(kind, req.character) else {
                    continue;
                };
                ctx.set_display_phrase(phrase, PHRASE_DISPLAY_TIME);
                let ok = speak_with_fallback(
                    &ctx,
                    VoiceTone::Default,
                    phrase,
                    ctx.config.quick_voice,
                    ctx.config.rate_scale,
                );
                if !ok {
                    play_fallback_sound(&ctx, kind);
                }
            }
        }
    }
    info!("voice thread stopped");
}

fn handle_stt_reply(ctx: &AppContext) {
    debug!("stt processing");
    let samples = ctx.recorder.lock().take();
    match stt::transcribe(ctx, &samples) {
        Ok(text) => {
            info!(%text, "stt result");
            ctx.set_display_phrase(&text, STT_DISPLAY_TIME);
            let ok = speak_with_fallback(ctx, VoiceTone::Default, &text, true, ctx.config.rate_scale);
            if !ok {
                play_fallback_sound(ctx, RequestKind::Happy);
            }
        }
        Err(e) => {
            warn!(error = %e, "stt no result");
            if let Ok(mut out) = ctx.lock_output_for_playback("stt_error_beep") {
                let _ = synth::play_tone(out.as_mut(), 440.0, Duration::from_millis(100));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_slot_defaults() {
        let slot = VoiceSlot::default();
        assert_eq!(slot.state, VoiceState::Pending);
        assert_eq!(slot.message, "...");
        assert!(!slot.loaded());
        assert_eq!(slot.cached_len(), 0);
    }

    #[test]
    fn test_tone_indices() {
        assert_eq!(VoiceTone::Default.index(), 0);
        assert_eq!(VoiceTone::Beep2.index(), 1);
    }
}
