//! Virtual pet companion with streaming TTS voice playback
//!
//! A desktop-hosted rendition of a pocket "virtual pet" toy: a cartoon
//! character is animated into an off-screen RGB565 frame buffer, reacts to
//! tap/hold/double-tap events, occasionally soils itself and must be cleaned,
//! and speaks phrases by calling a text-to-speech server over HTTP. Audio
//! arrives as WAV over the network and is decoded incrementally by a
//! defensive container parser, then streamed to the audio output through a
//! small rotation of fixed-size chunks so playback starts while bytes are
//! still arriving.
//!
//! # Features
//! - Defensive WAV container parsing (buffer and live-stream modes)
//! - Chunked streaming playback with bounded pipeline depth
//! - Prioritized voice acquisition cascade: TTS endpoints, static WAV
//!   mirrors, procedurally synthesized fallback tones
//! - Push-to-talk speech-to-text round trip
//! - Timer-driven pet state machine and sprite renderer
//! - Local diagnostic HTTP surface
//!
//! # Crate feature flags
//! - `debug-server` (default): local diagnostic HTTP endpoints (`server`)
//! - `streaming` (opt-in): real-time audio output (enables optional `rodio` dep)
//!
//! # Quick start
//! ## Parse and play a WAV capture (no streaming)
//! ```no_run
//! use gotchi::audio::{play_pcm, NullOutput};
//! use gotchi::wav;
//! let data = std::fs::read("voice.wav").unwrap();
//! let (info, pcm) = wav::buffer::parse(&data).unwrap();
//! let samples: Vec<i16> = pcm
//!     .chunks_exact(2)
//!     .map(|b| i16::from_le_bytes([b[0], b[1]]))
//!     .collect();
//! let mut out = NullOutput::default();
//! play_pcm(&mut out, &samples, info.sample_rate).unwrap();
//! ```
//!
//! ## Speak through the acquisition cascade
//! ```no_run
//! # #[cfg(feature = "streaming")]
//! # {
//! use std::sync::Arc;
//! use gotchi::app::AppContext;
//! use gotchi::audio::AudioDevice;
//! use gotchi::config::Config;
//! use gotchi::voice::{self, VoiceTone};
//! let out = AudioDevice::open().unwrap();
//! let ctx = Arc::new(AppContext::new(Config::default(), Box::new(out)));
//! voice::speak_with_fallback(&ctx, VoiceTone::Default, "こんにちは", true, 1.0);
//! # }
//! ```

#![warn(missing_docs)]

// Domain modules
pub mod app; // Application context & task wiring
pub mod audio; // Streaming playback & synthesized fallbacks
pub mod config; // Runtime configuration
pub mod diag; // Bounded diagnostic ring
pub mod game; // Pet state machine
pub mod render; // Frame buffer & sprites
#[cfg(feature = "debug-server")]
pub mod server; // Local diagnostic HTTP surface
pub mod voice; // Voice acquisition cascade, TTS/STT clients
pub mod wav; // WAV container parsing & writing

pub(crate) mod net; // HTTP plumbing shared by voice and server

/// Error types for pet companion operations
#[derive(thiserror::Error, Debug)]
pub enum GotchiError {
    /// Error while parsing a WAV container (short status tag + detail)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// HTTP transport or protocol error
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Audio device error
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    /// Playback pipeline error (submission rejected, stream aborted)
    #[error("Playback error: {0}")]
    PlaybackError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// IO error from filesystem or stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for GotchiError {
    /// Converts a String into `GotchiError::Other`.
    ///
    /// Convenience for generic string errors; prefer the specific variant
    /// constructors (`ParseError`, `HttpError`, ...) where the failure class
    /// is known, since `Other` loses that discrimination.
    fn from(msg: String) -> Self {
        GotchiError::Other(msg)
    }
}

impl From<&str> for GotchiError {
    /// Converts a string slice into `GotchiError::Other`.
    fn from(msg: &str) -> Self {
        GotchiError::Other(msg.to_string())
    }
}

/// Result type for pet companion operations
pub type Result<T> = std::result::Result<T, GotchiError>;

// Public API exports
pub use app::AppContext;
pub use audio::{play_pcm, AudioOutput, NullOutput, PlaybackStats, PlaybackWriter, StreamingPlayer};
pub use config::Config;
pub use diag::DiagLog;
pub use game::{AppState, ButtonEvent, Emotion};
pub use voice::{RequestKind, VoiceRequest, VoiceTone};
pub use wav::WavInfo;
