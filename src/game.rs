//! Pet state machine
//!
//! Emotion, mess and cleaning state advance once per animation frame on the
//! game thread. Every transition is deterministic given the current state
//! and the event; only the timers reverse anything. The random mess roll is
//! injected so tests stay deterministic.

use std::time::{Duration, Instant};

use crate::voice::phrases::CHARACTERS;
use crate::voice::RequestKind;

/// Animation frame period (~18 FPS)
pub const FRAME_PERIOD: Duration = Duration::from_millis(55);
/// Minimum interval between mess rolls
pub const MESS_INTERVAL: Duration = Duration::from_secs(60);
/// Probability of a mess per roll, in percent
pub const MESS_CHANCE_PERCENT: u32 = 20;
/// How long a tapped emotion lasts
pub const EMOTION_TIME: Duration = Duration::from_millis(1_100);
/// Duration of the cleaning animation
pub const CLEANING_TIME: Duration = Duration::from_millis(900);
/// Frames between blinks
pub const BLINK_INTERVAL: u32 = 420;
/// Frames a blink is held
pub const BLINK_HOLD_FRAMES: u32 = 4;

/// Debounced input events delivered to the game thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    /// Single tap
    Tap,
    /// Double tap
    DoubleTap,
    /// Hold threshold crossed
    Hold,
    /// Release after a hold
    HoldRelease,
}

/// Current face of the pet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Emotion {
    /// Resting face
    #[default]
    Neutral,
    /// Smiling
    Happy,
    /// Frowning
    Sad,
}

/// Side effects a transition asks the caller to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameAction {
    /// Enqueue a voice request of this kind
    Speak(RequestKind),
    /// Begin a push-to-talk recording session
    StartRecording,
    /// End the recording session and transcribe it
    StopRecording,
}

/// Complete pet state. Owned exclusively by the game thread; the renderer
/// reads it on the same thread.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Active character skin
    pub character_index: u8,
    /// Current emotion
    pub emotion: Emotion,
    /// When the emotion reverts to neutral (None = no timer)
    pub emotion_until: Option<Instant>,
    /// A mess is on the floor
    pub has_mess: bool,
    /// The cleaning animation is running
    pub cleaning: bool,
    /// When the cleaning animation ends
    pub cleaning_until: Option<Instant>,
    /// Last mess transition, gates the roll
    pub last_mess_at: Instant,
    /// Frame counter captured at the last mess transition, seeds the
    /// mess-pile position
    pub mess_seed: u32,
    /// Frame counter driving blink and bounce
    pub frame: u32,
    /// A push-to-talk session is active
    pub recording: bool,
}

impl AppState {
    /// Fresh state at `now`
    pub fn new(now: Instant) -> Self {
        AppState {
            character_index: 0,
            emotion: Emotion::Neutral,
            emotion_until: None,
            has_mess: false,
            cleaning: false,
            cleaning_until: None,
            last_mess_at: now,
            mess_seed: 0,
            frame: 0,
            recording: false,
        }
    }

    /// Whether the blink frames of the current blink window are active
    pub fn blinking(&self) -> bool {
        self.frame % BLINK_INTERVAL >= BLINK_INTERVAL - BLINK_HOLD_FRAMES
    }
}

/// Apply one input event. Returns the side effect the caller must perform,
/// if any.
pub fn handle_event(state: &mut AppState, event: ButtonEvent, now: Instant) -> Option<GameAction> {
    match event {
        ButtonEvent::DoubleTap => {
            state.character_index = (state.character_index + 1) % CHARACTERS.len() as u8;
            state.emotion = Emotion::Neutral;
            state.emotion_until = None;
            state.cleaning = false;
            state.cleaning_until = None;
            Some(GameAction::Speak(RequestKind::Boot))
        }
        ButtonEvent::Hold => {
            state.recording = true;
            // Happy face while listening, held until release
            state.emotion = Emotion::Happy;
            state.emotion_until = None;
            Some(GameAction::StartRecording)
        }
        ButtonEvent::HoldRelease => {
            if !state.recording {
                return None;
            }
            state.recording = false;
            state.emotion = Emotion::Neutral;
            state.emotion_until = None;
            Some(GameAction::StopRecording)
        }
        ButtonEvent::Tap => {
            if state.has_mess {
                state.has_mess = false;
                state.cleaning = true;
                state.cleaning_until = Some(now + CLEANING_TIME);
                state.emotion = Emotion::Happy;
                state.emotion_until = Some(now + CLEANING_TIME);
                state.last_mess_at = now;
                state.mess_seed = state.frame;
                return Some(GameAction::Speak(RequestKind::Clean));
            }

            state.emotion = if state.emotion == Emotion::Happy {
                Emotion::Sad
            } else {
                Emotion::Happy
            };
            state.emotion_until = Some(now + EMOTION_TIME);
            Some(GameAction::Speak(if state.emotion == Emotion::Happy {
                RequestKind::Happy
            } else {
                RequestKind::Sad
            }))
        }
    }
}

/// Advance the timers one frame. `mess_roll` is consulted at most once, only
/// when the minimum interval since the last mess transition has elapsed.
pub fn tick(state: &mut AppState, now: Instant, mut mess_roll: impl FnMut() -> bool) {
    if state.cleaning && state.cleaning_until.is_some_and(|t| now > t) {
        state.cleaning = false;
        state.cleaning_until = None;
    }

    if state.emotion_until.is_some_and(|t| now > t) {
        state.emotion = Emotion::Neutral;
        state.emotion_until = None;
    }

    if !state.has_mess
        && !state.cleaning
        && now.duration_since(state.last_mess_at) > MESS_INTERVAL
    {
        if mess_roll() {
            state.has_mess = true;
            state.mess_seed = state.frame;
        }
        state.last_mess_at = now;
    }

    state.frame = state.frame.wrapping_add(1);
}

/// The production mess roll: 20 %
pub fn random_mess_roll() -> bool {
    use rand::Rng;
    rand::rng().random_range(0..100) < MESS_CHANCE_PERCENT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_at(now: Instant) -> AppState {
        AppState::new(now)
    }

    #[test]
    fn test_tap_toggles_happy_sad() {
        let now = Instant::now();
        let mut state = state_at(now);

        let action = handle_event(&mut state, ButtonEvent::Tap, now);
        assert_eq!(state.emotion, Emotion::Happy);
        assert_eq!(action, Some(GameAction::Speak(RequestKind::Happy)));

        let action = handle_event(&mut state, ButtonEvent::Tap, now);
        assert_eq!(state.emotion, Emotion::Sad);
        assert_eq!(action, Some(GameAction::Speak(RequestKind::Sad)));

        let action = handle_event(&mut state, ButtonEvent::Tap, now);
        assert_eq!(state.emotion, Emotion::Happy);
        assert_eq!(action, Some(GameAction::Speak(RequestKind::Happy)));
    }

    #[test]
    fn test_emotion_expires_to_neutral() {
        let now = Instant::now();
        let mut state = state_at(now);
        handle_event(&mut state, ButtonEvent::Tap, now);
        assert_eq!(state.emotion, Emotion::Happy);

        tick(&mut state, now + EMOTION_TIME + Duration::from_millis(1), || {
            false
        });
        assert_eq!(state.emotion, Emotion::Neutral);
        assert!(state.emotion_until.is_none());
    }

    #[test]
    fn test_tap_while_messy_cleans() {
        let now = Instant::now();
        let mut state = state_at(now);
        state.has_mess = true;

        let action = handle_event(&mut state, ButtonEvent::Tap, now);
        assert_eq!(action, Some(GameAction::Speak(RequestKind::Clean)));
        assert!(!state.has_mess);
        assert!(state.cleaning);
        assert_eq!(state.emotion, Emotion::Happy);
        assert_eq!(state.cleaning_until, Some(now + CLEANING_TIME));

        // Cleaning animation runs out
        tick(&mut state, now + CLEANING_TIME + Duration::from_millis(1), || {
            false
        });
        assert!(!state.cleaning);
    }

    #[test]
    fn test_double_tap_cycles_characters() {
        let now = Instant::now();
        let mut state = state_at(now);
        state.emotion = Emotion::Sad;
        state.cleaning = true;

        let action = handle_event(&mut state, ButtonEvent::DoubleTap, now);
        assert_eq!(action, Some(GameAction::Speak(RequestKind::Boot)));
        assert_eq!(state.character_index, 1);
        assert_eq!(state.emotion, Emotion::Neutral);
        assert!(!state.cleaning);

        handle_event(&mut state, ButtonEvent::DoubleTap, now);
        handle_event(&mut state, ButtonEvent::DoubleTap, now);
        assert_eq!(state.character_index, 0); // wraps after 3 skins
    }

    #[test]
    fn test_hold_release_recording_cycle() {
        let now = Instant::now();
        let mut state = state_at(now);

        let action = handle_event(&mut state, ButtonEvent::Hold, now);
        assert_eq!(action, Some(GameAction::StartRecording));
        assert!(state.recording);
        assert_eq!(state.emotion, Emotion::Happy);
        // Pinned: no timer reverts the listening face
        assert!(state.emotion_until.is_none());
        tick(&mut state, now + Duration::from_secs(10), || false);
        assert_eq!(state.emotion, Emotion::Happy);

        let action = handle_event(&mut state, ButtonEvent::HoldRelease, now);
        assert_eq!(action, Some(GameAction::StopRecording));
        assert!(!state.recording);
        assert_eq!(state.emotion, Emotion::Neutral);
    }

    #[test]
    fn test_release_without_hold_is_ignored() {
        let now = Instant::now();
        let mut state = state_at(now);
        assert_eq!(handle_event(&mut state, ButtonEvent::HoldRelease, now), None);
    }

    #[test]
    fn test_mess_roll_honors_interval() {
        let now = Instant::now();
        let mut state = state_at(now);
        let mut rolls = 0;

        // Within the interval: no roll
        tick(&mut state, now + Duration::from_secs(30), || {
            rolls += 1;
            true
        });
        assert_eq!(rolls, 0);
        assert!(!state.has_mess);

        // Past the interval: rolled once, mess appears
        tick(&mut state, now + MESS_INTERVAL + Duration::from_secs(1), || {
            rolls += 1;
            true
        });
        assert_eq!(rolls, 1);
        assert!(state.has_mess);

        // Messy: no further rolls
        tick(
            &mut state,
            now + MESS_INTERVAL * 2 + Duration::from_secs(2),
            || {
                rolls += 1;
                true
            },
        );
        assert_eq!(rolls, 1);
    }

    #[test]
    fn test_failed_roll_still_resets_interval() {
        let now = Instant::now();
        let mut state = state_at(now);
        let first = now + MESS_INTERVAL + Duration::from_secs(1);
        tick(&mut state, first, || false);
        assert!(!state.has_mess);
        assert_eq!(state.last_mess_at, first);
    }

    #[test]
    fn test_blink_window() {
        let now = Instant::now();
        let mut state = state_at(now);
        state.frame = BLINK_INTERVAL - BLINK_HOLD_FRAMES;
        assert!(state.blinking());
        state.frame = BLINK_INTERVAL - BLINK_HOLD_FRAMES - 1;
        assert!(!state.blinking());
        state.frame = 0;
        assert!(!state.blinking());
    }

    #[test]
    fn test_frame_counter_wraps() {
        let now = Instant::now();
        let mut state = state_at(now);
        state.frame = u32::MAX;
        tick(&mut state, now, || false);
        assert_eq!(state.frame, 0);
    }
}
