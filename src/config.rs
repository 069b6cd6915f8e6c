//! Runtime configuration
//!
//! Everything the firmware kept as compile-time constants that a desktop
//! host reasonably wants to override: the TTS host override, the static
//! voice mirrors, the STT server, ports and volume. Loaded from an optional
//! JSON file; every field has a default so a missing or partial file works.

use serde::{Deserialize, Serialize};

use crate::voice::VoiceTone;
use crate::{GotchiError, Result};

/// Speaker volume steps in percent, index selects one
pub const VOLUME_PERCENT: [u8; 5] = [8, 14, 20, 30, 40];

/// Primary/mirror URL pair for one pre-baked voice tone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSource {
    /// First URL tried
    pub primary: String,
    /// Mirror tried after the primary fails
    pub fallback: String,
}

fn default_voice_sources() -> Vec<VoiceSource> {
    vec![
        VoiceSource {
            primary: "https://raw.githubusercontent.com/pdx-cs-sound/wavs/main/voice-note.wav"
                .into(),
            fallback: "https://cdn.jsdelivr.net/gh/pdx-cs-sound/wavs@main/voice-note.wav".into(),
        },
        VoiceSource {
            primary: "https://raw.githubusercontent.com/pdx-cs-sound/wavs/main/overdrive.wav"
                .into(),
            fallback: "https://cdn.jsdelivr.net/gh/pdx-cs-sound/wavs@main/overdrive.wav".into(),
        },
    ]
}

fn default_device_name() -> String {
    "gotchi".into()
}

fn default_stt_port() -> u16 {
    8_002
}

fn default_http_port() -> u16 {
    8_080
}

fn default_volume_index() -> usize {
    3
}

fn default_quick_voice() -> bool {
    true
}

fn default_rate_scale() -> f32 {
    1.25
}

/// Runtime configuration, JSON-serializable with per-field defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name announced on the debug surface
    pub device_name: String,
    /// Explicit TTS `host[:port]` override; `None` scans the candidates
    pub tts_host: Option<String>,
    /// Network gateway address, tried before the hostname fallbacks
    pub gateway_host: Option<String>,
    /// STT server host; defaults to the last host that answered a TTS call
    pub stt_host: Option<String>,
    /// STT server port
    pub stt_port: u16,
    /// Static voice mirrors, one pair per tone slot
    pub voice_sources: Vec<VoiceSource>,
    /// Diagnostics relay URL; `None` disables the relay push
    pub relay_url: Option<String>,
    /// Debug HTTP server port
    pub http_port: u16,
    /// Index into [`VOLUME_PERCENT`]
    pub volume_index: usize,
    /// Use the collapsed TTS candidate space for phrase playback
    pub quick_voice: bool,
    /// Playback rate multiplier for spoken phrases
    pub rate_scale: f32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_name: default_device_name(),
            tts_host: None,
            gateway_host: None,
            stt_host: None,
            stt_port: default_stt_port(),
            voice_sources: default_voice_sources(),
            relay_url: None,
            http_port: default_http_port(),
            volume_index: default_volume_index(),
            quick_voice: default_quick_voice(),
            rate_scale: default_rate_scale(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: &std::path::Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| GotchiError::ConfigError(format!("{}: {e}", path.display())))
    }

    /// URL pair for a tone slot, primary first
    pub fn voice_urls(&self, tone: VoiceTone) -> Vec<String> {
        match self.voice_sources.get(tone.index()) {
            Some(source) => vec![source.primary.clone(), source.fallback.clone()],
            None => Vec::new(),
        }
    }

    /// Output gain derived from the volume step
    pub fn volume(&self) -> f32 {
        let idx = self.volume_index.min(VOLUME_PERCENT.len() - 1);
        VOLUME_PERCENT[idx] as f32 / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.stt_port, 8_002);
        assert_eq!(cfg.http_port, 8_080);
        assert_eq!(cfg.voice_sources.len(), 2);
        assert!(cfg.quick_voice);
        assert!((cfg.volume() - 0.30).abs() < 1e-6);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg: Config =
            serde_json::from_str(r#"{"tts_host": "192.168.11.12:8001", "volume_index": 0}"#)
                .unwrap();
        assert_eq!(cfg.tts_host.as_deref(), Some("192.168.11.12:8001"));
        assert!((cfg.volume() - 0.08).abs() < 1e-6);
        assert_eq!(cfg.stt_port, 8_002);
    }

    #[test]
    fn test_voice_urls_per_tone() {
        let cfg = Config::default();
        let urls = cfg.voice_urls(VoiceTone::Default);
        assert_eq!(urls.len(), 2);
        assert!(urls[0].contains("voice-note"));
        let urls = cfg.voice_urls(VoiceTone::Beep2);
        assert!(urls[0].contains("overdrive"));
    }

    #[test]
    fn test_volume_index_clamped() {
        let cfg = Config {
            volume_index: 99,
            ..Config::default()
        };
        assert!((cfg.volume() - 0.40).abs() < 1e-6);
    }
}
