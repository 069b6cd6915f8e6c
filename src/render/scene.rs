//! Scene composition
//!
//! One frame = room background, status overlay, character sprite, mess pile
//! and speech bubble, in that order. The mess position is seeded from the
//! last mess timestamp so it stays put between frames without storing
//! coordinates.

use std::time::Instant;

use super::character::{self, Pose};
use super::{color, FrameBuffer, SCREEN_H, SCREEN_W};
use crate::game::{AppState, Emotion, BLINK_HOLD_FRAMES, BLINK_INTERVAL, CLEANING_TIME};
use crate::voice::phrases::{character_index, CHARACTERS};

/// Network / recording facts the renderer overlays on the frame
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    /// Address line shown during the first seconds after boot
    pub net_text: Option<String>,
    /// Recording badge
    pub recording: bool,
    /// Current speech bubble text (the bubble box is drawn; terminal sinks
    /// print the text itself on the status line)
    pub phrase: Option<String>,
}

/// Frames during which the boot network indicator stays visible
pub const NET_TEXT_FRAMES: u32 = 10_000 / 55;

fn wall_and_floor(fb: &mut FrameBuffer) {
    let wall = 0xF71C;
    let wall_dot = 0xEF1B;
    for y in 0..85 {
        fb.hline(0, y, SCREEN_W as i32, wall);
    }
    // Dotted wallpaper
    let mut dy = 8;
    while dy < 85 {
        let mut dx = 6;
        while dx < SCREEN_W as i32 {
            fb.set(dx, dy, wall_dot);
            dx += 12;
        }
        dy += 12;
    }

    // Planked floor
    let floor = 0xCC60;
    let floor_line = 0xBB40;
    fb.fill_rect(0, 85, SCREEN_W as i32, SCREEN_H as i32 - 85, floor);
    fb.hline(0, 85, SCREEN_W as i32, 0xA520);
    fb.hline(0, 86, SCREEN_W as i32, 0xB560);
    let mut y = 92;
    while y < SCREEN_H as i32 {
        fb.hline(0, y, SCREEN_W as i32, floor_line);
        y += 8;
    }
}

fn window_and_clock(fb: &mut FrameBuffer) {
    // Round window with sky and a cloud
    fb.fill_round_rect(8, 8, 24, 24, 4, 0x9E1F);
    fb.draw_round_rect(8, 8, 24, 24, 4, 0xA520);
    fb.hline(8, 20, 24, 0xA520);
    fb.vline(20, 8, 24, 0xA520);
    fb.fill_circle(16, 14, 3, color::WHITE);
    fb.fill_circle(20, 13, 2, color::WHITE);

    // Wall clock
    fb.fill_circle(112, 18, 9, color::WHITE);
    fb.draw_circle(112, 18, 9, 0xA520);
    fb.draw_line(112, 18, 112, 12, color::BLACK);
    fb.draw_line(112, 18, 116, 18, color::BLACK);
    fb.fill_circle(112, 18, 1, color::RED);
}

/// Background layer: papered wall, planked floor, window, clock
pub fn background(fb: &mut FrameBuffer) {
    wall_and_floor(fb);
    window_and_clock(fb);
}

fn status(fb: &mut FrameBuffer, state: &AppState, overlay: &Overlay) {
    // Boot indicator: a short colored bar where the address text sits;
    // terminal sinks show the text itself separately
    if state.frame < NET_TEXT_FRAMES {
        let c = if overlay.net_text.is_some() {
            color::WHITE
        } else {
            color::YELLOW
        };
        fb.fill_rect(4, 4, 3, 3, c);
    }

    if overlay.recording {
        fb.fill_circle(120, 8, 5, color::RED);
    }
}

fn mess_pile(fb: &mut FrameBuffer, state: &AppState, now: Instant) {
    if !state.has_mess && !state.cleaning {
        return;
    }

    // Deterministic position, seeded from the moment the mess appeared
    let seed = state.mess_seed;
    let x = 20 + ((seed.wrapping_mul(7).wrapping_add(13)) % 88) as i32;
    let base_y = 90 + ((seed.wrapping_mul(11).wrapping_add(37)) % 28) as i32;

    // During cleaning the pile lifts off the floor and away
    let mut lift = 0;
    if state.cleaning {
        if let Some(until) = state.cleaning_until {
            let total = CLEANING_TIME.as_millis() as i64;
            let left = until.saturating_duration_since(now).as_millis() as i64;
            let elapsed = (total - left).clamp(0, total);
            lift = (elapsed * 36 / total) as i32;
        }
    }

    let y = base_y - lift;
    fb.fill_circle(x, y, 4, color::MESS_BROWN);
    fb.fill_circle(x - 1, y - 5, 3, color::MESS_BROWN);
    fb.fill_circle(x, y - 9, 2, color::MESS_BROWN);
}

fn speech_bubble(fb: &mut FrameBuffer, overlay: &Overlay) {
    if overlay.phrase.is_none() {
        return;
    }
    // Fixed-width bubble box at the bottom of the frame
    let bw = 110;
    let bx = (SCREEN_W as i32 - bw) / 2;
    fb.fill_round_rect(bx, 108, bw, 16, 3, 0x2104);
    fb.draw_round_rect(bx, 108, bw, 16, 3, 0x4A69);
    // Ellipsis dots stand in for glyph rendering
    for i in 0..3 {
        fb.fill_circle(bx + 12 + i * 8, 116, 1, color::WHITE);
    }
}

/// Draw one complete frame
pub fn draw_frame(fb: &mut FrameBuffer, state: &AppState, overlay: &Overlay, now: Instant) {
    fb.fill(color::BLACK);
    background(fb);
    status(fb, state, overlay);

    let f = state.frame % 14;
    let bounce = if f < 7 { f as i32 - 3 } else { 16 - f as i32 - 3 };
    let pose = Pose {
        happy: state.emotion == Emotion::Happy,
        sad: state.emotion == Emotion::Sad,
        blink: state.frame % BLINK_INTERVAL >= BLINK_INTERVAL - BLINK_HOLD_FRAMES,
        bounce,
    };
    let ci = character_index(state.character_index);
    character::draw(fb, ci, 64, 50, &CHARACTERS[ci], pose);

    mess_pile(fb, state, now);
    speech_bubble(fb, overlay);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_state() -> AppState {
        AppState::new(Instant::now())
    }

    #[test]
    fn test_frame_renders_background_and_character() {
        let mut fb = FrameBuffer::default();
        let state = fresh_state();
        draw_frame(&mut fb, &state, &Overlay::default(), Instant::now());
        // Wall color somewhere near the top, floor color near the bottom
        assert_eq!(fb.get(64, 2), 0xF71C);
        assert_eq!(fb.get(2, 100), 0xCC60);
    }

    #[test]
    fn test_mess_pile_only_when_messy() {
        let now = Instant::now();
        let mut clean_fb = FrameBuffer::default();
        let mut messy_fb = FrameBuffer::default();
        let mut state = fresh_state();
        draw_frame(&mut clean_fb, &state, &Overlay::default(), now);
        state.has_mess = true;
        draw_frame(&mut messy_fb, &state, &Overlay::default(), now);
        let brown = |fb: &FrameBuffer| {
            fb.pixels()
                .iter()
                .filter(|&&p| p == color::MESS_BROWN)
                .count()
        };
        assert_eq!(brown(&clean_fb), 0);
        assert!(brown(&messy_fb) > 10);
    }

    #[test]
    fn test_mess_position_stable_across_frames() {
        let now = Instant::now();
        let mut state = fresh_state();
        state.has_mess = true;
        let mut a = FrameBuffer::default();
        let mut b = FrameBuffer::default();
        draw_frame(&mut a, &state, &Overlay::default(), now);
        draw_frame(&mut b, &state, &Overlay::default(), now);
        assert_eq!(a.pixels(), b.pixels());
    }

    #[test]
    fn test_recording_badge() {
        let mut fb = FrameBuffer::default();
        let state = fresh_state();
        let overlay = Overlay {
            recording: true,
            ..Default::default()
        };
        draw_frame(&mut fb, &state, &overlay, Instant::now());
        assert_eq!(fb.get(120, 8), color::RED);
    }

    #[test]
    fn test_speech_bubble_box() {
        let mut fb = FrameBuffer::default();
        let state = fresh_state();
        let overlay = Overlay {
            phrase: Some("やあ".into()),
            ..Default::default()
        };
        draw_frame(&mut fb, &state, &overlay, Instant::now());
        assert_eq!(fb.get(64, 112), 0x2104);
    }
}
