//! TTS cascade execution
//!
//! Walks the candidate sequence from [`super::candidates`] until one attempt
//! yields audio. An HTTP 200 with an audio-ish content type streams straight
//! into the playback pipeline; a JSON or text body is scanned for an
//! embedded audio URL and followed. Every attempt, good or bad, is recorded
//! for the diagnostic surface.

use std::io::Read;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::candidates::{self, Candidate, Method};
use super::VoiceTone;
use crate::app::AppContext;
use crate::audio::player::{play_wav_stream, PlaybackWriter};
use crate::net;
use crate::{GotchiError, Result};

/// Delay between cascade attempts
pub const RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(140);

/// Snapshot of the most recent TTS attempt, surfaced on `/status`
#[derive(Debug, Clone, Serialize, Default)]
pub struct AttemptRecord {
    /// Request method (`GET`/`POST`)
    pub method: String,
    /// Target host
    pub host: String,
    /// Target port
    pub port: u16,
    /// Request path
    pub path: String,
    /// HTTP status, or -1 for a transport failure
    pub code: i32,
    /// Wall time of the attempt in milliseconds
    pub elapsed_ms: u64,
    /// Declared response length, or -1 when unknown
    pub payload_len: i64,
    /// Response content type
    pub content_type: String,
    /// True unless the status was 2xx
    pub error: bool,
    /// Uptime milliseconds when the attempt finished
    pub at_ms: u64,
}

#[allow(clippy::too_many_arguments)]
fn record_attempt(
    ctx: &AppContext,
    method: &str,
    host: &str,
    port: u16,
    path: &str,
    code: i32,
    elapsed_ms: u64,
    payload_len: i64,
    content_type: &str,
) {
    *ctx.last_attempt.lock() = Some(AttemptRecord {
        method: method.to_string(),
        host: host.to_string(),
        port,
        path: path.to_string(),
        code,
        elapsed_ms,
        payload_len,
        content_type: content_type.to_string(),
        error: !(200..300).contains(&code),
        at_ms: ctx.uptime_ms(),
    });
}

/// Pull a JSON/text body and return the embedded audio reference, if any.
/// Keys are tried in the order the servers in the wild actually use.
fn extract_audio_url(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    for key in ["audio", "url", "path", "result"] {
        if let Some(s) = value.get(key).and_then(Value::as_str) {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

/// Stream an already-accepted HTTP response body to the audio output via the
/// 44-byte-header playback writer (tolerates chunked bodies of unknown
/// length).
fn stream_response(
    ctx: &AppContext,
    tone: VoiceTone,
    resp: ureq::http::Response<ureq::Body>,
    rate_scale: f32,
    success_msg: &str,
) -> Result<()> {
    let expected = net::content_length(&resp);
    let mut src = net::HttpByteStream::new(resp.into_body().into_reader(), expected);

    let mut out = ctx.lock_output_for_playback("stream_response")?;
    ctx.set_slot_message(tone, "DECODE");
    out.stop();

    let mut writer = PlaybackWriter::new(out.as_mut(), rate_scale);
    let copied = std::io::copy(&mut src, &mut writer);
    let stats = match (copied, writer.finish()) {
        (Ok(_), Ok(stats)) => stats,
        (copied, finished) => {
            warn!(?copied, ?finished, "streaming playback failed");
            ctx.set_slot_failed(tone, "PLAY_FAIL");
            return Err(GotchiError::PlaybackError("stream aborted".into()));
        }
    };

    debug!(
        pcm_bytes = stats.pcm_bytes,
        submissions = stats.submissions,
        "streaming playback done"
    );
    ctx.set_slot_downloaded(tone, success_msg);
    Ok(())
}

/// Fetch a WAV by URL and play it through the defensive stream parser
pub fn play_url(ctx: &AppContext, tone: VoiceTone, url: &str, rate_scale: f32) -> Result<()> {
    let agent = net::download_agent();
    let resp = agent
        .get(url)
        .call()
        .map_err(|e| {
            ctx.set_slot_failed(tone, "HTTP_BEGIN");
            GotchiError::HttpError(format!("voice fetch failed: {e}"))
        })?;

    let code = resp.status().as_u16();
    if code != 200 {
        warn!(url, code, "voice http error");
        ctx.set_slot_failed(tone, &format!("HTTP_{code}"));
        return Err(GotchiError::HttpError(format!("status {code} for {url}")));
    }

    ctx.set_slot_downloading(tone);
    let expected = net::content_length(&resp);
    let mut src = net::HttpByteStream::new(resp.into_body().into_reader(), expected);

    let mut out = ctx.lock_output_for_playback("play_url")?;
    out.stop();
    match play_wav_stream(&mut src, out.as_mut(), rate_scale) {
        Ok(stats) => {
            debug!(%url, pcm_bytes = stats.pcm_bytes, "voice stream play ok");
            ctx.set_slot_downloaded(tone, "URL");
            Ok(())
        }
        Err(e) => {
            // Parse failures carry their short status tag
            let tag = match &e {
                GotchiError::ParseError(msg) => {
                    msg.split(':').next().unwrap_or("PLAY_FAIL").to_string()
                }
                _ => "PLAY_FAIL".to_string(),
            };
            ctx.set_slot_failed(tone, &tag);
            Err(e)
        }
    }
}

fn attempt(
    ctx: &AppContext,
    agent: &ureq::Agent,
    cand: &Candidate,
    text: &str,
    tone: VoiceTone,
    rate_scale: f32,
) -> Result<()> {
    let url = cand.url();
    let started = Instant::now();
    let is_post = cand.endpoint.method == Method::Post;

    let call = if is_post {
        let payload = candidates::payload_for(cand.variant, text).to_string();
        agent
            .post(url.as_str())
            .header("Accept", "audio/wav, audio/x-wav, audio/wave, application/json, text/plain, */*")
            .header("Content-Type", "application/json")
            .send(payload.as_str())
    } else {
        let mut req = agent.get(url.as_str()).header(
            "Accept",
            "audio/wav, audio/x-wav, audio/wave, application/json, text/plain, */*",
        );
        for (k, v) in candidates::query_for(cand.variant, text) {
            req = req.query(k, &v);
        }
        req.call()
    };

    let elapsed = started.elapsed().as_millis() as u64;
    let method = if is_post { "POST" } else { "GET" };

    let resp = match call {
        Ok(resp) => resp,
        Err(e) => {
            debug!(%url, error = %e, "tts attempt transport failure");
            record_attempt(ctx, method, &cand.host, cand.port, cand.endpoint.path, -1, elapsed, -1, "");
            ctx.set_slot_message(tone, "MI_BEGIN");
            return Err(GotchiError::HttpError(e.to_string()));
        }
    };

    let code = resp.status().as_u16();
    let content_type = net::header_str(&resp, "content-type");
    let payload_len = net::content_length(&resp).map(|l| l as i64).unwrap_or(-1);
    record_attempt(
        ctx,
        method,
        &cand.host,
        cand.port,
        cand.endpoint.path,
        code as i32,
        elapsed,
        payload_len,
        &content_type,
    );

    if code != 200 {
        debug!(%url, code, "tts http error");
        ctx.set_slot_failed(tone, &format!("MI_{code}"));
        return Err(GotchiError::HttpError(format!("status {code}")));
    }

    if net::looks_like_wav(&content_type) {
        stream_response(ctx, tone, resp, rate_scale, "MIOTTS")?;
        ctx.set_slot_downloaded(tone, "MI_OK");
        return Ok(());
    }

    if content_type.contains("audio/") {
        debug!(%url, %content_type, "tts unsupported audio type");
        return Err(GotchiError::HttpError(format!(
            "unsupported audio type {content_type}"
        )));
    }

    if net::is_json_or_text(&content_type) {
        let mut body = String::new();
        resp.into_body()
            .into_reader()
            .take(64 * 1024)
            .read_to_string(&mut body)
            .map_err(|e| GotchiError::HttpError(e.to_string()))?;
        if let Some(audio_url) = extract_audio_url(&body) {
            let absolute = if audio_url.starts_with("http://") || audio_url.starts_with("https://")
            {
                audio_url
            } else if audio_url.starts_with('/') {
                format!("{}{}", cand.base_url(), audio_url)
            } else {
                debug!(%audio_url, "tts json audio ref unexpected");
                return Err(GotchiError::HttpError("unusable audio reference".into()));
            };
            play_url(ctx, tone, &absolute, 1.0)?;
            ctx.set_slot_downloaded(tone, "MI_OK_URL");
            return Ok(());
        }
        debug!(%content_type, "tts unsupported json payload");
        return Err(GotchiError::HttpError("no audio reference in body".into()));
    }

    Err(GotchiError::HttpError(format!(
        "unusable content type {content_type}"
    )))
}

/// Run the full TTS candidate cascade for `text`.
///
/// Returns on the first attempt that produced audible output; candidates are
/// strictly sequential with a short backoff between failures. In quick mode
/// the space collapses to one endpoint/payload combination on the first
/// host.
pub fn speak_text(
    ctx: &AppContext,
    text: &str,
    tone: VoiceTone,
    quick: bool,
    rate_scale: f32,
) -> Result<()> {
    let (override_host, port_override) = ctx.tts_target();
    let hosts = candidates::host_candidates(
        override_host.as_deref(),
        ctx.config.gateway_host.as_deref(),
    );
    if hosts.is_empty() {
        ctx.set_slot_failed(tone, "GW_NONE");
        return Err(GotchiError::HttpError("no host candidates".into()));
    }

    ctx.set_slot_downloading(tone);
    ctx.set_slot_message(tone, "MIOTTS");

    let agent = net::tts_agent();
    for cand in candidates::candidates(&hosts, port_override, quick) {
        match attempt(ctx, &agent, &cand, text, tone, rate_scale) {
            Ok(()) => {
                debug!(url = %cand.url(), "tts hit");
                return Ok(());
            }
            Err(_) => std::thread::sleep(RETRY_DELAY),
        }
    }

    ctx.set_slot_failed(tone, "M_FAIL");
    Err(GotchiError::HttpError("tts cascade exhausted".into()))
}

/// Sweep the probe paths across the host/port candidates looking for a live
/// server. Returns whether any path answered 200, plus a per-attempt report.
pub fn probe(ctx: &AppContext, quick: bool, verbose: bool) -> (bool, String) {
    let (override_host, port_override) = ctx.tts_target();
    let hosts = candidates::host_candidates(
        override_host.as_deref(),
        ctx.config.gateway_host.as_deref(),
    );
    if hosts.is_empty() {
        ctx.set_probe_result("NO_HOST");
        return (false, "NO_HOST".into());
    }

    let paths: &[&str] = if quick {
        &candidates::QUICK_PROBE_PATHS
    } else {
        &candidates::PROBE_PATHS
    };
    let agent = net::probe_agent(quick);
    let mut report = String::new();
    let mut push_line = |report: &mut String, line: &str| {
        if !report.is_empty() {
            report.push_str("; ");
        }
        report.push_str(line);
    };

    for (h, host) in hosts.iter().enumerate() {
        let ports: Vec<u16> = match port_override {
            Some(p) => vec![p],
            None => candidates::PORTS.to_vec(),
        };
        for port in ports {
            let mut any_for_host = false;
            for path in paths {
                let base = if port == 80 {
                    format!("http://{host}")
                } else {
                    format!("http://{host}:{port}")
                };
                let url = format!("{base}{path}");
                let started = Instant::now();
                let outcome = agent.get(url.as_str()).call();
                let elapsed = started.elapsed().as_millis() as u64;

                let (code, content_type) = match &outcome {
                    Ok(resp) => (
                        resp.status().as_u16() as i32,
                        net::header_str(resp, "content-type"),
                    ),
                    Err(_) => (-1, String::new()),
                };
                record_attempt(ctx, "GET", host, port, path, code, elapsed, -1, &content_type);
                if code >= 0 {
                    any_for_host = true;
                }

                let line = if verbose {
                    format!(
                        "{host}:{port}{path} -> {}, {}, ms={elapsed}, attempt={}/{}",
                        if code >= 0 { code.to_string() } else { "ERR".into() },
                        if content_type.is_empty() { "none" } else { &content_type },
                        h + 1,
                        hosts.len(),
                    )
                } else {
                    format!(
                        "{host}:{port}{path} {} ct={} ms={elapsed}",
                        if code >= 0 { code.to_string() } else { "ERR".into() },
                        if content_type.is_empty() { "none" } else { &content_type },
                    )
                };
                push_line(&mut report, &line);

                if code == 200 {
                    ctx.set_probe_result(&line);
                    return (true, report);
                }
            }
            if any_for_host {
                // Something answered on this host; other ports won't improve
                break;
            }
        }
    }

    if report.is_empty() {
        report = "NO_RESPONSE".into();
    }
    ctx.set_probe_result(&report);
    (false, report)
}
