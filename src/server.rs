//! Local diagnostic HTTP surface
//!
//! A small plaintext/JSON debug server on its own thread: liveness, status
//! snapshot, the diagnostic ring, speaker tests, TTS probing and overrides,
//! voice prefetch and a relay push. GET/POST only, no authentication; this
//! is a LAN debugging tool, not an API.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tiny_http::{Header, Method, Response, Server};
use tracing::{info, warn};

use crate::app::AppContext;
use crate::audio::synth;
use crate::net;
use crate::voice::candidates::parse_host_override;
use crate::voice::stt;
use crate::voice::phrases::{character_index, CHARACTERS, PHRASE_BEEP};
use crate::voice::{self, tts, RequestKind, VoiceTone};
use crate::{GotchiError, Result};

fn content_type(value: &str) -> Header {
    Header::from_bytes(&b"Content-Type"[..], value.as_bytes()).expect("static header")
}

fn text_response(body: impl Into<String>) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut resp = Response::from_string(body.into());
    resp.add_header(content_type("text/plain; charset=utf-8"));
    resp.add_header(Header::from_bytes(&b"Cache-Control"[..], &b"no-store"[..]).unwrap());
    resp
}

fn json_response(value: &serde_json::Value) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut resp = Response::from_string(value.to_string());
    resp.add_header(content_type("application/json; charset=utf-8"));
    resp.add_header(Header::from_bytes(&b"Cache-Control"[..], &b"no-store"[..]).unwrap());
    resp
}

fn parse_query(url: &str) -> (String, HashMap<String, String>) {
    let mut args = HashMap::new();
    let (path, query) = match url.split_once('?') {
        Some((p, q)) => (p.to_string(), q),
        None => (url.to_string(), ""),
    };
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        args.insert(k.to_string(), url_decode(v));
    }
    (path, args)
}

fn url_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = |c: u8| -> Option<u8> {
                    match c {
                        b'0'..=b'9' => Some(c - b'0'),
                        b'A'..=b'F' => Some(c - b'A' + 10),
                        b'a'..=b'f' => Some(c - b'a' + 10),
                        _ => None,
                    }
                };
                if let (Some(hi), Some(lo)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                    out.push((hi << 4) | lo);
                    i += 3;
                    continue;
                }
                out.push(b'%');
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_affirmative(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn status_body(ctx: &AppContext) -> serde_json::Value {
    let (override_host, override_port) = ctx.tts_target();
    let probe = ctx.probe_status.lock().clone();
    let last = ctx.last_attempt.lock().clone();
    let slots = ctx.voice_slots.lock();
    let speaker_running = ctx.output.lock().is_running();

    json!({
        "host": format!("{}.local", ctx.config.device_name),
        "speakerReady": ctx.speaker_ready(),
        "speakerRunning": speaker_running,
        "character": ctx.current_character(),
        "miottsHost": override_host.unwrap_or_default(),
        "miottsPort": override_port.unwrap_or(0),
        "miottsProbe": probe.last,
        "miottsProbeMs": probe.at_ms,
        "miottsLast": last,
        "diagLines": ctx.diag.len(),
        "voiceLoaded": slots[0].loaded(),
        "voiceState": slots[0].state as u8,
        "voiceMsg": slots[0].message.clone(),
        "voiceLen": slots[0].cached_len(),
        "voice2Loaded": slots[1].loaded(),
        "voice2State": slots[1].state as u8,
        "voice2Msg": slots[1].message.clone(),
        "voice2Len": slots[1].cached_len(),
        "httpReq": ctx.http_requests.load(Ordering::Relaxed),
        "uptimeMs": ctx.uptime_ms(),
    })
}

fn diag_body(ctx: &AppContext) -> String {
    let mut out = format!("{} debug log\n", ctx.config.device_name);
    let lines = ctx.diag.snapshot();
    if lines.is_empty() {
        out.push_str("no logs\n");
    } else {
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

/// Push the diagnostic ring to the configured relay URL
pub fn post_diagnostics_to_relay(ctx: &AppContext) -> Result<()> {
    let Some(url) = ctx.config.relay_url.clone() else {
        return Err(GotchiError::ConfigError("relay url not set".into()));
    };
    let mut body = format!(
        "{} debug report\nspeakerReady={}\ndiagSeq={}\n----\n",
        ctx.config.device_name,
        ctx.speaker_ready() as u8,
        ctx.diag.seq(),
    );
    for line in ctx.diag.snapshot() {
        body.push_str(&line);
        body.push('\n');
    }

    let agent = net::download_agent();
    let resp = agent
        .post(url.as_str())
        .header("Content-Type", "text/plain; charset=utf-8")
        .send(body.as_str())
        .map_err(|e| GotchiError::HttpError(format!("relay post failed: {e}")))?;
    let code = resp.status().as_u16();
    if !(200..300).contains(&code) {
        warn!(code, "relay post error");
        return Err(GotchiError::HttpError(format!("relay status {code}")));
    }
    info!(code, "relay post ok");
    Ok(())
}

fn handle_miotts(ctx: &AppContext, args: &HashMap<String, String>) -> serde_json::Value {
    if let Some(host) = args.get("host") {
        if host == "clear" || host == "none" {
            ctx.set_tts_override(None);
        } else {
            match parse_host_override(host) {
                Some(o) => ctx.set_tts_override(Some(o)),
                None => ctx.set_tts_override(None),
            }
        }
    }

    if let Some(port) = args.get("port") {
        let mut current = ctx.tts_override.lock();
        if let Some(o) = current.as_mut() {
            if port == "default" || port == "0" {
                o.port = None;
            } else if let Ok(p) = port.parse::<u16>() {
                o.port = Some(p);
            } else {
                warn!(%port, "tts port parse failed");
            }
        }
    }

    if args.get("clear").map(String::as_str).map(is_affirmative) == Some(true) {
        if let Some(o) = ctx.tts_override.lock().as_mut() {
            o.port = None;
        }
    }

    let quick = args.get("quick").map(String::as_str).map(is_affirmative) == Some(true);
    let mut probe_now = String::from("not run");
    if args.get("probe").map(String::as_str).map(is_affirmative) == Some(true) {
        let verbose = args.get("verbose").map(String::as_str).map(is_affirmative) == Some(true);
        let (_, report) = tts::probe(ctx, quick, verbose);
        probe_now = report;
    }

    if let Some(text) = args.get("speak") {
        if !text.is_empty() {
            let ok = tts::speak_text(ctx, text, VoiceTone::Default, quick, 1.0).is_ok();
            return json!({"ok": ok, "text": text});
        }
    }

    let (host, port) = ctx.tts_target();
    let probe = ctx.probe_status.lock().clone();
    json!({
        "host": host.clone().unwrap_or_default(),
        "portOverride": port.unwrap_or(0),
        "state": if host.is_some() { "override" } else { "auto" },
        "probe": probe.last,
        "probeLastMs": probe.at_ms,
        "probeNow": probe_now,
        "candidates": crate::voice::candidates::HOST_FALLBACKS,
    })
}

fn handle_request(ctx: &AppContext, path: &str, args: &HashMap<String, String>) -> Response<std::io::Cursor<Vec<u8>>> {
    match path {
        "/ping" => text_response(format!("pong {}", ctx.uptime_ms())),
        "/" => text_response(format!("{} debug ready", ctx.config.device_name)),
        "/status" => json_response(&status_body(ctx)),
        "/diag" => text_response(diag_body(ctx)),
        "/beep" => {
            let ok = ctx
                .lock_output_for_playback("beep")
                .and_then(|mut out| {
                    synth::play_tone(out.as_mut(), 880.0, Duration::from_millis(120))
                })
                .is_ok();
            text_response(if ok { "beep:ok" } else { "beep:fail" })
        }
        "/beep2" => {
            let mut ok =
                voice::speak_with_fallback(ctx, VoiceTone::Beep2, PHRASE_BEEP, false, 1.0);
            if !ok {
                ok = ctx
                    .lock_output_for_playback("beep2")
                    .and_then(|mut out| {
                        synth::play_pcm(
                            out.as_mut(),
                            synth::alt_voice_wave(),
                            synth::SYNTH_SAMPLE_RATE,
                        )
                    })
                    .is_ok();
            }
            text_response(if ok { "beep2:ok" } else { "beep2:fail" })
        }
        "/voice" => {
            let ci = character_index(ctx.current_character());
            let phrase = crate::voice::phrases::phrase_for(RequestKind::Happy, ci as u8)
                .unwrap_or(CHARACTERS[ci].name);
            let ok = voice::speak_with_fallback(ctx, VoiceTone::Default, phrase, false, 1.0);
            text_response(if ok { "voice:ok" } else { "voice:fail" })
        }
        "/miotts" => json_response(&handle_miotts(ctx, args)),
        "/download" => {
            let mut report = Vec::new();
            for tone in [VoiceTone::Default, VoiceTone::Beep2] {
                match voice::ensure_voice_cached(ctx, tone) {
                    Ok(len) => report.push(format!("voice{}:{len}", tone.index())),
                    Err(e) => report.push(format!("voice{}:fail({e})", tone.index())),
                }
            }
            text_response(format!("download:{}", report.join(",")))
        }
        "/relay" => {
            let _ = post_diagnostics_to_relay(ctx);
            text_response("relay:requested")
        }
        "/record" => {
            // Export the current push-to-talk buffer for inspection
            let samples = {
                let recorder = ctx.recorder.lock();
                if recorder.is_empty() {
                    return text_response("record:empty");
                }
                recorder.peek().to_vec()
            };
            let path = std::path::Path::new("gotchi-recording.wav");
            match crate::wav::export_wav_file(path, &samples, stt::STT_SAMPLE_RATE) {
                Ok(()) => text_response(format!("record:{} samples", samples.len())),
                Err(e) => text_response(format!("record:fail({e})")),
            }
        }
        _ => text_response("not found").with_status_code(404),
    }
}

/// Serve the debug surface until the process exits. Runs on the calling
/// thread; spawn it with [`spawn`].
pub fn run(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("0.0.0.0:{}", ctx.config.http_port);
    let server = Server::http(&addr)
        .map_err(|e| GotchiError::HttpError(format!("debug server bind failed: {e}")))?;
    info!(%addr, "debug server started");

    for request in server.incoming_requests() {
        let req_id = ctx.http_requests.fetch_add(1, Ordering::Relaxed) + 1;
        let method = request.method().clone();
        let (path, args) = parse_query(request.url());
        info!(req_id, method = %method, %path, "http request");

        let response = match method {
            Method::Get | Method::Post => handle_request(&ctx, &path, &args),
            _ => text_response("method-not-allowed").with_status_code(405),
        };
        let _ = request.respond(response);
    }
    Ok(())
}

/// Spawn the debug server thread
pub fn spawn(ctx: Arc<AppContext>) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("debug-http".into())
        .spawn(move || {
            if let Err(e) = run(ctx) {
                warn!(error = %e, "debug server exited");
            }
        })
        .expect("failed to spawn debug server thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullOutput;
    use crate::config::Config;

    fn test_ctx() -> Arc<AppContext> {
        Arc::new(AppContext::new(
            Config::default(),
            Box::new(NullOutput::default()),
        ))
    }

    #[test]
    fn test_parse_query() {
        let (path, args) = parse_query("/miotts?host=192.168.11.12%3A8001&probe=1&speak=");
        assert_eq!(path, "/miotts");
        assert_eq!(args.get("host").map(String::as_str), Some("192.168.11.12:8001"));
        assert_eq!(args.get("probe").map(String::as_str), Some("1"));
        assert_eq!(args.get("speak").map(String::as_str), Some(""));
    }

    #[test]
    fn test_url_decode() {
        assert_eq!(url_decode("a+b%20c"), "a b c");
        assert_eq!(url_decode("%E3%81%82"), "あ");
        assert_eq!(url_decode("100%"), "100%");
    }

    #[test]
    fn test_affirmative_args() {
        for v in ["1", "true", "YES", "On"] {
            assert!(is_affirmative(v), "{v}");
        }
        for v in ["0", "false", "", "maybe"] {
            assert!(!is_affirmative(v), "{v}");
        }
    }

    #[test]
    fn test_status_body_shape() {
        let ctx = test_ctx();
        let body = status_body(&ctx);
        assert_eq!(body["host"], "gotchi.local");
        assert_eq!(body["voiceState"], 0);
        assert!(body["speakerReady"].as_bool().unwrap());
    }

    #[test]
    fn test_miotts_override_roundtrip() {
        let ctx = test_ctx();
        let mut args = HashMap::new();
        args.insert("host".to_string(), "audio.local:9000".to_string());
        let body = handle_miotts(&ctx, &args);
        assert_eq!(body["host"], "audio.local");
        assert_eq!(body["portOverride"], 9_000);
        assert_eq!(body["state"], "override");

        let mut clear = HashMap::new();
        clear.insert("host".to_string(), "clear".to_string());
        let body = handle_miotts(&ctx, &clear);
        assert_eq!(body["state"], "auto");
    }

    #[test]
    fn test_diag_body_includes_ring() {
        let ctx = test_ctx();
        ctx.diag.push("hello from test");
        let body = diag_body(&ctx);
        assert!(body.contains("hello from test"));
    }

    #[test]
    fn test_relay_without_url_fails() {
        let ctx = test_ctx();
        assert!(post_diagnostics_to_relay(&ctx).is_err());
    }
}
