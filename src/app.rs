//! Application context and task wiring
//!
//! One explicitly owned context object replaces the firmware's pile of
//! globals: created once at startup, shared by `Arc`, alive for the process
//! lifetime. Three cooperating threads communicate exclusively through two
//! bounded queues (input events, capacity 8; voice requests, capacity 4)
//! plus a handful of read-mostly atomic flags. Enqueues never block; a
//! full queue drops the message so the UI stays responsive.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::audio::AudioOutput;
use crate::config::Config;
use crate::diag::DiagLog;
use crate::game::{self, AppState, ButtonEvent, GameAction};
use crate::render::scene::{self, Overlay};
use crate::render::{FrameBuffer, FrameSink};
use crate::voice::candidates::{parse_host_override, HostOverride};
use crate::voice::stt::{AudioCapture, Recorder, STT_CHUNK_SAMPLES};
use crate::voice::tts::AttemptRecord;
use crate::voice::{RequestKind, VoiceRequest, VoiceSlot, VoiceState, VoiceTone, VOICE_TONE_COUNT};
use crate::{GotchiError, Result};

/// Input event queue capacity
pub const EVENT_QUEUE_DEPTH: usize = 8;
/// Voice request queue capacity
pub const VOICE_QUEUE_DEPTH: usize = 4;
/// Delay before the boot announcement once the stack is ready
pub const BOOT_ANNOUNCEMENT_DELAY: Duration = Duration::from_millis(1_300);

/// Most recent phrase for the display, with its expiry
#[derive(Debug, Clone)]
pub struct DisplayPhrase {
    /// Phrase text
    pub text: String,
    /// When it disappears
    pub until: Instant,
}

/// Last probe outcome for `/miotts`
#[derive(Debug, Clone, Default)]
pub struct ProbeStatus {
    /// Report line of the last probe
    pub last: String,
    /// Uptime milliseconds when it ran
    pub at_ms: u64,
}

/// Process-wide shared state, created once at startup
pub struct AppContext {
    /// Runtime configuration
    pub config: Config,
    /// Bounded diagnostic ring
    pub diag: Arc<DiagLog>,
    /// The exclusive audio output device
    pub output: Mutex<Box<dyn AudioOutput>>,
    /// Output device initialized and usable
    pub speaker_ready: AtomicBool,
    /// Active character skin, mirrored for threads without game state
    pub current_character: AtomicU8,
    /// A push-to-talk session is active
    pub recording: AtomicBool,
    /// Push-to-talk capture buffer
    pub recorder: Mutex<Recorder>,
    /// Per-tone voice status and cache
    pub voice_slots: Mutex<[VoiceSlot; VOICE_TONE_COUNT]>,
    /// Runtime TTS host override
    pub tts_override: Mutex<Option<HostOverride>>,
    /// Most recent TTS attempt
    pub last_attempt: Mutex<Option<AttemptRecord>>,
    /// Most recent probe sweep
    pub probe_status: Mutex<ProbeStatus>,
    /// Phrase currently on screen
    pub display_phrase: Mutex<Option<DisplayPhrase>>,
    /// Debug HTTP request counter
    pub http_requests: AtomicU64,
    started: Instant,
}

impl AppContext {
    /// Build the context around a configuration and an output device
    pub fn new(config: Config, output: Box<dyn AudioOutput>) -> Self {
        let tts_override = config.tts_host.as_deref().and_then(parse_host_override);
        if let Some(o) = &tts_override {
            info!(host = %o.host, port = ?o.port, "tts override set");
        }
        let ctx = AppContext {
            diag: Arc::new(DiagLog::default()),
            output: Mutex::new(output),
            speaker_ready: AtomicBool::new(false),
            current_character: AtomicU8::new(0),
            recording: AtomicBool::new(false),
            recorder: Mutex::new(Recorder::default()),
            voice_slots: Mutex::new(Default::default()),
            tts_override: Mutex::new(tts_override),
            last_attempt: Mutex::new(None),
            probe_status: Mutex::new(ProbeStatus::default()),
            display_phrase: Mutex::new(None),
            http_requests: AtomicU64::new(0),
            started: Instant::now(),
            config,
        };
        {
            let mut out = ctx.output.lock();
            out.set_volume(ctx.config.volume());
            ctx.speaker_ready.store(out.is_running(), Ordering::Relaxed);
        }
        ctx
    }

    /// Milliseconds since the context was created
    pub fn uptime_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Whether the output device is believed usable
    pub fn speaker_ready(&self) -> bool {
        self.speaker_ready.load(Ordering::Relaxed)
    }

    /// Active character skin index
    pub fn current_character(&self) -> u8 {
        self.current_character.load(Ordering::Relaxed)
    }

    /// Lock the output for a playback session, restarting the device once
    /// if it stopped running.
    pub fn lock_output_for_playback(
        &self,
        context: &str,
    ) -> Result<MutexGuard<'_, Box<dyn AudioOutput>>> {
        if !self.speaker_ready() {
            debug!(context, "speaker not ready");
            return Err(GotchiError::AudioDeviceError(format!(
                "{context}: speaker not ready"
            )));
        }
        let mut out = self.output.lock();
        if !out.is_running() {
            warn!(context, "speaker not running, restarting");
            if let Err(e) = out.restart() {
                self.speaker_ready.store(false, Ordering::Relaxed);
                return Err(GotchiError::AudioDeviceError(format!(
                    "{context}: restart failed: {e}"
                )));
            }
        }
        Ok(out)
    }

    /// Current override as (host, port) for candidate generation
    pub fn tts_target(&self) -> (Option<String>, Option<u16>) {
        match self.tts_override.lock().as_ref() {
            Some(o) => (Some(o.host.clone()), o.port),
            None => (None, None),
        }
    }

    /// Replace the TTS host override (None clears it)
    pub fn set_tts_override(&self, value: Option<HostOverride>) {
        *self.tts_override.lock() = value;
    }

    /// Record a probe report line
    pub fn set_probe_result(&self, line: &str) {
        *self.probe_status.lock() = ProbeStatus {
            last: line.to_string(),
            at_ms: self.uptime_ms(),
        };
    }

    /// Put a phrase on screen for `duration`
    pub fn set_display_phrase(&self, text: &str, duration: Duration) {
        *self.display_phrase.lock() = Some(DisplayPhrase {
            text: text.to_string(),
            until: Instant::now() + duration,
        });
    }

    /// Phrase currently on screen, if not expired
    pub fn current_phrase(&self) -> Option<String> {
        let guard = self.display_phrase.lock();
        guard
            .as_ref()
            .filter(|p| p.until > Instant::now())
            .map(|p| p.text.clone())
    }

    fn with_slot<R>(&self, tone: VoiceTone, f: impl FnOnce(&mut VoiceSlot) -> R) -> R {
        let mut slots = self.voice_slots.lock();
        f(&mut slots[tone.index()])
    }

    /// Set a slot's short status tag
    pub fn set_slot_message(&self, tone: VoiceTone, msg: &str) {
        self.with_slot(tone, |slot| slot.message = msg.to_string());
    }

    /// Mark a slot as mid-download/cascade
    pub fn set_slot_downloading(&self, tone: VoiceTone) {
        self.with_slot(tone, |slot| slot.state = VoiceState::Downloading);
    }

    /// Mark a slot as having produced audio
    pub fn set_slot_downloaded(&self, tone: VoiceTone, msg: &str) {
        self.with_slot(tone, |slot| {
            slot.state = VoiceState::Downloaded;
            slot.message = msg.to_string();
        });
    }

    /// Mark a slot as failed
    pub fn set_slot_failed(&self, tone: VoiceTone, msg: &str) {
        self.with_slot(tone, |slot| {
            slot.state = VoiceState::Failed;
            if !msg.is_empty() {
                slot.message = msg.to_string();
            }
        });
    }

    /// Whether a cached WAV is present for the tone
    pub fn slot_loaded(&self, tone: VoiceTone) -> bool {
        self.with_slot(tone, |slot| slot.loaded())
    }

    /// Length of the tone's cached WAV
    pub fn slot_cached_len(&self, tone: VoiceTone) -> usize {
        self.with_slot(tone, |slot| slot.cached_len())
    }

    /// Store a validated WAV in the tone's cache
    pub fn store_cached_voice(&self, tone: VoiceTone, bytes: Vec<u8>) {
        self.with_slot(tone, |slot| {
            slot.cached = Some(bytes);
            slot.state = VoiceState::Downloaded;
            slot.message = "OK".to_string();
        });
    }

    /// Take the tone's cached WAV out of the slot
    pub fn take_cached_voice(&self, tone: VoiceTone) -> Option<Vec<u8>> {
        self.with_slot(tone, |slot| slot.cached.take())
    }
}

/// Best-effort enqueue: a full queue drops the message
pub fn try_send<T>(tx: &SyncSender<T>, value: T) -> bool {
    match tx.try_send(value) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!("queue full, dropping message");
            false
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

/// Everything the game thread owns
pub struct GameTask {
    ctx: Arc<AppContext>,
    events: Receiver<ButtonEvent>,
    voice_tx: SyncSender<VoiceRequest>,
    sink: Box<dyn FrameSink>,
    capture: Box<dyn AudioCapture>,
    stop: Arc<AtomicBool>,
    net_text: Option<String>,
}

impl GameTask {
    /// Bundle the game thread's resources
    pub fn new(
        ctx: Arc<AppContext>,
        events: Receiver<ButtonEvent>,
        voice_tx: SyncSender<VoiceRequest>,
        sink: Box<dyn FrameSink>,
        capture: Box<dyn AudioCapture>,
        stop: Arc<AtomicBool>,
        net_text: Option<String>,
    ) -> Self {
        GameTask {
            ctx,
            events,
            voice_tx,
            sink,
            capture,
            stop,
            net_text,
        }
    }

    fn apply_action(&mut self, action: GameAction, state: &AppState) {
        match action {
            GameAction::Speak(kind) => {
                if kind == RequestKind::Boot {
                    self.ctx
                        .current_character
                        .store(state.character_index, Ordering::Relaxed);
                }
                try_send(
                    &self.voice_tx,
                    VoiceRequest {
                        character: state.character_index,
                        kind,
                    },
                );
            }
            GameAction::StartRecording => {
                // Mic and speaker are mutually exclusive
                self.ctx.output.lock().stop();
                *self.ctx.recorder.lock() = Recorder::default();
                if self.capture.start().is_ok() {
                    self.ctx.recording.store(true, Ordering::Relaxed);
                    info!("recording started");
                } else {
                    warn!("capture start failed");
                }
            }
            GameAction::StopRecording => {
                self.stop_recording(true);
            }
        }
    }

    fn stop_recording(&mut self, send_request: bool) {
        if !self.ctx.recording.swap(false, Ordering::Relaxed) {
            return;
        }
        self.capture.stop();
        let len = self.ctx.recorder.lock().len();
        info!(samples = len, "recording stopped");
        if send_request {
            try_send(
                &self.voice_tx,
                VoiceRequest {
                    character: self.ctx.current_character(),
                    kind: RequestKind::SttReply,
                },
            );
        }
    }

    fn record_chunk(&mut self, state: &mut AppState) {
        let mut buf = [0i16; STT_CHUNK_SAMPLES];
        let n = self.capture.read(&mut buf);
        if n == 0 {
            return;
        }
        let more = self.ctx.recorder.lock().push(&buf[..n]);
        if !more {
            // Buffer full: auto-stop and transcribe
            state.recording = false;
            self.stop_recording(true);
        }
    }

    /// Game thread body: drain events, advance timers, render, ~18 FPS
    pub fn run(mut self) {
        let mut state = AppState::new(Instant::now());
        self.ctx
            .current_character
            .store(state.character_index, Ordering::Relaxed);
        let mut fb = FrameBuffer::default();
        let mut boot_announce_at: Option<Instant> =
            Some(Instant::now() + BOOT_ANNOUNCEMENT_DELAY);
        info!("game thread started");

        while !self.stop.load(Ordering::Relaxed) {
            let frame_started = Instant::now();

            while let Ok(event) = self.events.try_recv() {
                let now = Instant::now();
                if let Some(action) = game::handle_event(&mut state, event, now) {
                    self.apply_action(action, &state);
                }
            }

            if state.recording {
                self.record_chunk(&mut state);
            }

            let now = Instant::now();
            game::tick(&mut state, now, game::random_mess_roll);

            if let Some(due) = boot_announce_at {
                if now >= due && self.ctx.speaker_ready() {
                    boot_announce_at = None;
                    debug!("boot announcement queued");
                    try_send(
                        &self.voice_tx,
                        VoiceRequest {
                            character: state.character_index,
                            kind: RequestKind::Boot,
                        },
                    );
                }
            }

            let overlay = Overlay {
                net_text: self.net_text.clone(),
                recording: state.recording,
                phrase: self.ctx.current_phrase(),
            };
            scene::draw_frame(&mut fb, &state, &overlay, now);
            self.sink.present(&fb);

            let elapsed = frame_started.elapsed();
            if elapsed < game::FRAME_PERIOD {
                std::thread::sleep(game::FRAME_PERIOD - elapsed);
            }
        }
        info!("game thread stopped");
    }
}

/// Spawn the game and voice threads. The caller owns the input side of the
/// event queue and the stop flag.
pub fn spawn_tasks(
    ctx: Arc<AppContext>,
    events: Receiver<ButtonEvent>,
    sink: Box<dyn FrameSink>,
    capture: Box<dyn AudioCapture>,
    stop: Arc<AtomicBool>,
    net_text: Option<String>,
) -> Vec<std::thread::JoinHandle<()>> {
    let (voice_tx, voice_rx) = std::sync::mpsc::sync_channel::<VoiceRequest>(VOICE_QUEUE_DEPTH);

    let game_ctx = Arc::clone(&ctx);
    let game = std::thread::Builder::new()
        .name("game".into())
        .spawn(move || {
            GameTask::new(game_ctx, events, voice_tx, sink, capture, stop, net_text).run()
        })
        .expect("failed to spawn game thread");

    let voice_ctx = Arc::clone(&ctx);
    let voice = std::thread::Builder::new()
        .name("voice".into())
        .spawn(move || crate::voice::run_voice_loop(voice_ctx, voice_rx))
        .expect("failed to spawn voice thread");

    vec![game, voice]
}

/// Create the bounded input event queue
pub fn event_queue() -> (SyncSender<ButtonEvent>, Receiver<ButtonEvent>) {
    std::sync::mpsc::sync_channel(EVENT_QUEUE_DEPTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullOutput;

    fn test_ctx() -> AppContext {
        AppContext::new(Config::default(), Box::new(NullOutput::default()))
    }

    #[test]
    fn test_context_initial_flags() {
        let ctx = test_ctx();
        assert!(ctx.speaker_ready());
        assert_eq!(ctx.current_character(), 0);
        assert!(ctx.current_phrase().is_none());
    }

    #[test]
    fn test_display_phrase_expires() {
        let ctx = test_ctx();
        ctx.set_display_phrase("やあ", Duration::from_millis(5));
        assert_eq!(ctx.current_phrase().as_deref(), Some("やあ"));
        std::thread::sleep(Duration::from_millis(10));
        assert!(ctx.current_phrase().is_none());
    }

    #[test]
    fn test_slot_state_transitions() {
        let ctx = test_ctx();
        ctx.set_slot_downloading(VoiceTone::Default);
        ctx.set_slot_failed(VoiceTone::Default, "HTTP_503");
        let slots = ctx.voice_slots.lock();
        assert_eq!(slots[0].state, VoiceState::Failed);
        assert_eq!(slots[0].message, "HTTP_503");
        assert_eq!(slots[1].state, VoiceState::Pending);
    }

    #[test]
    fn test_cached_voice_roundtrip() {
        let ctx = test_ctx();
        assert!(!ctx.slot_loaded(VoiceTone::Beep2));
        ctx.store_cached_voice(VoiceTone::Beep2, vec![1, 2, 3]);
        assert!(ctx.slot_loaded(VoiceTone::Beep2));
        assert_eq!(ctx.slot_cached_len(VoiceTone::Beep2), 3);
        assert_eq!(ctx.take_cached_voice(VoiceTone::Beep2), Some(vec![1, 2, 3]));
        assert!(!ctx.slot_loaded(VoiceTone::Beep2));
    }

    #[test]
    fn test_tts_override_from_config() {
        let ctx = AppContext::new(
            Config {
                tts_host: Some("192.168.11.12:8001".into()),
                ..Config::default()
            },
            Box::new(NullOutput::default()),
        );
        let (host, port) = ctx.tts_target();
        assert_eq!(host.as_deref(), Some("192.168.11.12"));
        assert_eq!(port, Some(8_001));
    }

    #[test]
    fn test_try_send_drops_on_full() {
        let (tx, _rx) = std::sync::mpsc::sync_channel::<u8>(2);
        assert!(try_send(&tx, 1));
        assert!(try_send(&tx, 2));
        assert!(!try_send(&tx, 3)); // full, dropped
    }
}
