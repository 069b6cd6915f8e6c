//! TTS endpoint candidate generation
//!
//! The cascade tries hosts × ports × endpoints × payload shapes until one
//! yields audio. Candidate generation is a lazy iterator so the retry loop
//! stays a single flat `for` and each generation rule is testable on its
//! own. Two request conventions are covered: a preset-reference JSON API
//! (`{"text": ..., "reference": {"preset_id": ...}}`) and the OpenAI-style
//! speech API (`{"input": ..., "model": ..., "voice": ...}`).

use serde_json::{json, Value};

/// Candidate ports scanned when no override is set
pub const PORTS: [u16; 7] = [8_001, 7_860, 80, 8_080, 8_000, 5_000, 3_000];

/// Hostname fallbacks tried after the override / gateway address
pub const HOST_FALLBACKS: [&str; 4] = ["miotts.local", "miotts", "audio.local", "localhost"];

/// Ceiling on generated host candidates
pub const MAX_HOSTS: usize = 8;

/// Number of request-body shapes per endpoint
pub const PAYLOAD_VARIANTS: usize = 9;

/// Paths probed when sweeping for a live server
pub const PROBE_PATHS: [&str; 8] = [
    "/health",
    "/v1/health",
    "/v1/presets",
    "/v1/models",
    "/v1/voices",
    "/docs",
    "/openapi.json",
    "/",
];

/// Shorter probe list used in quick mode
pub const QUICK_PROBE_PATHS: [&str; 4] = ["/health", "/v1/presets", "/v1/health", "/v1/tts"];

const PRESET_DEFAULT: &str = "jp_female";
const PRESET_ALT: &str = "en_female";
const PRESET_FALLBACK: &str = "jp_male";
const OUTPUT_FORMAT: &str = "wav";
const VOICE_PRIMARY: &str = "alloy";
const VOICE_FALLBACK: &str = "nova";
const MODEL_PRIMARY: &str = "tts-1";
const MODEL_FALLBACK: &str = "gpt-4o-mini-tts";

/// HTTP method of a TTS endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Text passed via query parameters
    Get,
    /// JSON body
    Post,
}

/// One TTS endpoint descriptor
#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    /// Request path
    pub path: &'static str,
    /// Request method
    pub method: Method,
}

/// The endpoint menu, most likely first
pub static ENDPOINTS: [Endpoint; 13] = [
    Endpoint { path: "/v1/tts", method: Method::Post },
    Endpoint { path: "/tts", method: Method::Post },
    Endpoint { path: "/audio/speech", method: Method::Post },
    Endpoint { path: "/v1/audio/speech", method: Method::Post },
    Endpoint { path: "/v1/speech", method: Method::Post },
    Endpoint { path: "/api/tts", method: Method::Post },
    Endpoint { path: "/audio", method: Method::Get },
    Endpoint { path: "/api/audio", method: Method::Get },
    Endpoint { path: "/speak", method: Method::Post },
    Endpoint { path: "/api/speak", method: Method::Post },
    Endpoint { path: "/api/tts.mp3", method: Method::Get },
    Endpoint { path: "/tts", method: Method::Get },
    Endpoint { path: "/speak", method: Method::Get },
];

/// Parsed `host[:port]` override supplied at runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOverride {
    /// Bare host name or address
    pub host: String,
    /// Explicit port, when one was given
    pub port: Option<u16>,
}

/// Parse a user-supplied host override. Accepts URLs and `host:port` pairs;
/// scheme, path and fragment are stripped. Returns `None` for empty input.
pub fn parse_host_override(raw: &str) -> Option<HostOverride> {
    let mut host = raw.trim();
    for scheme in ["http://", "https://"] {
        if let Some(rest) = host.strip_prefix(scheme) {
            host = rest;
            break;
        }
    }
    if let Some(slash) = host.find('/') {
        host = &host[..slash];
    }
    if let Some(hash) = host.find('#') {
        host = &host[..hash];
    }

    let mut port = None;
    if let Some(col) = host.rfind(':') {
        if col > 0 {
            if let Ok(p) = host[col + 1..].parse::<u16>() {
                if p >= 1 {
                    port = Some(p);
                    host = &host[..col];
                }
            }
        }
    }

    let host = host.trim();
    if host.is_empty() {
        return None;
    }
    Some(HostOverride {
        host: host.to_string(),
        port,
    })
}

/// Build the ordered, deduplicated host candidate list: the override when
/// set, otherwise the network gateway when known, then the fixed fallbacks.
pub fn host_candidates(
    override_host: Option<&str>,
    gateway: Option<&str>,
) -> Vec<String> {
    let mut hosts: Vec<String> = Vec::new();
    let mut push = |h: &str| {
        if !h.is_empty() && hosts.len() < MAX_HOSTS && !hosts.iter().any(|x| x == h) {
            hosts.push(h.to_string());
        }
    };

    if let Some(h) = override_host {
        push(h);
    } else if let Some(gw) = gateway {
        push(gw);
    }
    for h in HOST_FALLBACKS {
        push(h);
    }
    hosts
}

/// One fully-specified TTS attempt
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Target host
    pub host: String,
    /// Target port
    pub port: u16,
    /// Endpoint descriptor
    pub endpoint: Endpoint,
    /// Payload/query shape index (0..[`PAYLOAD_VARIANTS`])
    pub variant: usize,
}

impl Candidate {
    /// `http://host[:port]` base for this candidate (port 80 omitted)
    pub fn base_url(&self) -> String {
        if self.port == 80 {
            format!("http://{}", self.host)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    /// Full request URL without query parameters
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url(), self.endpoint.path)
    }
}

/// Lazily generate the attempt sequence. Quick mode collapses the space to
/// the first host with a single endpoint and payload shape (all candidate
/// ports are still scanned); a port override collapses the port dimension.
pub fn candidates(
    hosts: &[String],
    port_override: Option<u16>,
    quick: bool,
) -> impl Iterator<Item = Candidate> {
    let hosts: Vec<String> = if quick {
        hosts.iter().take(1).cloned().collect()
    } else {
        hosts.to_vec()
    };
    let ports: Vec<u16> = match port_override {
        Some(p) => vec![p],
        None => PORTS.to_vec(),
    };
    let endpoint_count = if quick { 1 } else { ENDPOINTS.len() };
    let variant_count = if quick { 1 } else { PAYLOAD_VARIANTS };

    hosts.into_iter().flat_map(move |host| {
        let ports = ports.clone();
        ports.into_iter().flat_map(move |port| {
            let host = host.clone();
            ENDPOINTS[..endpoint_count]
                .iter()
                .flat_map(move |&endpoint| {
                    let host = host.clone();
                    (0..variant_count).map(move |variant| Candidate {
                        host: host.clone(),
                        port,
                        endpoint,
                        variant,
                    })
                })
        })
    })
}

/// JSON body for a POST candidate
pub fn payload_for(variant: usize, text: &str) -> Value {
    match variant % PAYLOAD_VARIANTS {
        0 => json!({
            "text": text,
            "reference": {"type": "preset", "preset_id": PRESET_DEFAULT},
            "output": {"format": OUTPUT_FORMAT},
        }),
        1 => json!({
            "text": text,
            "reference": {"type": "preset", "preset_id": PRESET_ALT},
            "output": {"format": OUTPUT_FORMAT},
        }),
        2 => json!({
            "text": text,
            "reference": {"type": "preset", "preset_id": PRESET_FALLBACK},
            "output": {"format": OUTPUT_FORMAT},
        }),
        3 => json!({
            "text": text,
            "preset": PRESET_DEFAULT,
            "format": OUTPUT_FORMAT,
        }),
        4 => json!({
            "text": text,
            "reference": {"type": "preset", "preset_id": PRESET_DEFAULT},
        }),
        5 => json!({
            "text": text,
            "reference": {"type": "preset", "preset_id": PRESET_ALT},
            "output": {"format": OUTPUT_FORMAT},
        }),
        6 => json!({
            "input": text,
            "model": MODEL_PRIMARY,
            "voice": VOICE_PRIMARY,
            "response_format": OUTPUT_FORMAT,
        }),
        7 => json!({
            "input": text,
            "model": MODEL_FALLBACK,
            "voice": VOICE_FALLBACK,
            "response_format": OUTPUT_FORMAT,
        }),
        _ => json!({
            "text": text,
            "reference": {"type": "preset", "preset_id": PRESET_FALLBACK},
            "output": {"format": OUTPUT_FORMAT},
            "llm": {"temperature": 0.85},
        }),
    }
}

/// Query parameters for a GET candidate
pub fn query_for(variant: usize, text: &str) -> Vec<(&'static str, String)> {
    let v = variant % PAYLOAD_VARIANTS;
    let mut query = vec![("text", text.to_string())];
    if v > 0 {
        query.push(("response_format", "wav".into()));
    }
    if (4..=8).contains(&v) {
        query.push(("speaker", "0".into()));
    }
    if v == 5 || v == 7 {
        query.push(("voice", VOICE_PRIMARY.into()));
    }
    if v == 6 || v == 8 {
        query.push(("model", MODEL_PRIMARY.into()));
    }
    query
}
