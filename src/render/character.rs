//! Character sprites
//!
//! Three hand-drawn skins built from frame-buffer primitives. Each draws
//! around an anchor point with a vertical bounce offset and reacts to the
//! happy/sad/blink state supplied by the scene.

use super::color;
use super::FrameBuffer;
use crate::voice::phrases::CharacterStyle;

/// Per-frame pose inputs shared by all skins
#[derive(Debug, Clone, Copy)]
pub struct Pose {
    /// Smiling mouth
    pub happy: bool,
    /// Frowning mouth
    pub sad: bool,
    /// Eyes closed this frame
    pub blink: bool,
    /// Vertical bounce offset in pixels
    pub bounce: i32,
}

/// Draw the skin at `idx` (bread hero, bullet train, rabbit)
pub fn draw(fb: &mut FrameBuffer, idx: usize, x: i32, y: i32, style: &CharacterStyle, pose: Pose) {
    match idx {
        0 => draw_bread_hero(fb, x, y, pose),
        1 => draw_bullet_train(fb, x, y, pose),
        _ => draw_rabbit(fb, x, y, style, pose),
    }
}

fn draw_eyes_round(fb: &mut FrameBuffer, x: i32, eye_y: i32, pose: Pose) {
    if pose.blink {
        fb.hline(x - 10, eye_y, 6, color::BLACK);
        fb.hline(x + 4, eye_y, 6, color::BLACK);
    } else {
        fb.fill_circle(x - 7, eye_y, 4, color::WHITE);
        fb.fill_circle(x + 7, eye_y, 4, color::WHITE);
        fb.fill_circle(x - 6, eye_y + 1, 2, color::BLACK);
        fb.fill_circle(x + 6, eye_y + 1, 2, color::BLACK);
        fb.set(x - 6, eye_y, color::WHITE);
        fb.set(x + 6, eye_y, color::WHITE);
    }
}

/// Round-faced hero with a red nose and a cape
fn draw_bread_hero(fb: &mut FrameBuffer, x: i32, y: i32, pose: Pose) {
    let by = y + pose.bounce;
    let face = 0xFE60;
    let cheek = 0xF800;

    // Cape behind the body
    fb.fill_triangle(x - 22, by + 6, x - 10, by - 8, x - 6, by + 18, 0xF800);
    fb.fill_triangle(x + 22, by + 6, x + 10, by - 8, x + 6, by + 18, 0xF800);

    // Face
    fb.fill_circle(x, by, 22, face);
    fb.draw_circle(x, by, 22, 0xC440);

    // Cheeks with highlights
    fb.fill_circle(x - 14, by + 2, 6, cheek);
    fb.fill_circle(x + 14, by + 2, 6, cheek);
    fb.fill_circle(x - 13, by + 1, 2, 0xFB2C);
    fb.fill_circle(x + 13, by + 1, 2, 0xFB2C);

    // Nose
    fb.fill_circle(x, by + 2, 7, cheek);
    fb.fill_circle(x - 2, by, 2, 0xFBE0);

    // Brows
    fb.fill_round_rect(x - 12, by - 14, 8, 3, 1, 0x6200);
    fb.fill_round_rect(x + 4, by - 14, 8, 3, 1, 0x6200);

    draw_eyes_round(fb, x, by - 8, pose);

    // Mouth
    if pose.happy {
        for i in -8..=8 {
            fb.set(x + i, by + 12 + (i * i) / 16, color::BLACK);
            fb.set(x + i, by + 13 + (i * i) / 16, color::BLACK);
        }
    } else if pose.sad {
        for i in -6..=6 {
            fb.set(x + i, by + 15 - (i * i) / 12, color::BLACK);
        }
    } else {
        fb.hline(x - 4, by + 12, 8, color::BLACK);
    }

    // Hands
    fb.fill_circle(x - 10, by + 24, 4, face);
    fb.fill_circle(x + 10, by + 24, 4, face);
}

/// Bullet train seen from a three-quarter front view
fn draw_bullet_train(fb: &mut FrameBuffer, x: i32, y: i32, pose: Pose) {
    let by = y + pose.bounce;
    let green = 0x0600;
    let green_hi = 0x2EC4;
    let white = color::WHITE;
    let pink = 0xF81F;
    let gray = 0x7BEF;
    let dk_gray = 0x4208;
    let navy = 0x0013;
    let sky = 0x4A7F;

    // Body side
    fb.fill_triangle(x - 20, by - 8, x - 20, by + 16, x + 4, by + 10, white);
    fb.fill_triangle(x - 20, by - 8, x + 4, by - 14, x + 4, by + 10, white);
    fb.draw_line(x - 20, by - 8, x + 4, by - 14, gray);
    fb.draw_line(x - 20, by + 16, x + 4, by + 10, gray);
    fb.draw_line(x - 20, by - 8, x - 20, by + 16, gray);

    // Roof
    fb.fill_triangle(x - 20, by - 8, x + 4, by - 14, x + 18, by - 18, green);
    fb.fill_triangle(x - 20, by - 8, x + 18, by - 18, x - 6, by - 12, green);
    fb.fill_triangle(x - 20, by - 8, x - 6, by - 12, x - 18, by - 10, green_hi);

    // Nose cone
    fb.fill_triangle(x + 4, by - 14, x + 4, by + 10, x + 24, by - 4, white);
    fb.fill_triangle(x + 4, by - 14, x + 18, by - 18, x + 24, by - 4, green);
    fb.fill_triangle(x + 24, by - 4, x + 18, by - 18, x + 26, by - 8, green_hi);
    fb.draw_line(x + 4, by + 10, x + 24, by - 4, gray);
    fb.draw_line(x + 18, by - 18, x + 26, by - 8, gray);
    fb.draw_line(x + 24, by - 4, x + 26, by - 8, dk_gray);

    // Accent stripe across the side and nose
    fb.draw_line(x - 20, by + 2, x + 4, by - 3, pink);
    fb.draw_line(x - 20, by + 3, x + 4, by - 2, pink);
    fb.draw_line(x + 4, by - 3, x + 24, by - 4, pink);
    fb.draw_line(x + 4, by - 2, x + 24, by - 3, pink);

    // Side windows, shrinking toward the nose
    fb.fill_rect(x - 17, by - 5, 5, 5, navy);
    fb.fill_rect(x - 10, by - 6, 4, 4, navy);
    fb.fill_rect(x - 4, by - 7, 3, 4, navy);
    fb.set(x - 16, by - 4, sky);
    fb.set(x - 9, by - 5, sky);
    fb.set(x - 3, by - 6, sky);

    // Front window
    fb.fill_triangle(x + 8, by - 12, x + 6, by - 2, x + 20, by - 8, navy);
    fb.draw_line(x + 10, by - 10, x + 16, by - 8, sky);

    // Headlight
    fb.fill_circle(x + 22, by - 2, 2, color::YELLOW);
    fb.fill_circle(x + 22, by - 2, 1, white);

    // Eyes inside the front window
    if pose.blink {
        fb.hline(x + 9, by - 8, 4, white);
        fb.hline(x + 15, by - 9, 3, white);
    } else {
        fb.fill_circle(x + 10, by - 8, 3, white);
        fb.fill_circle(x + 11, by - 7, 1, color::BLACK);
        fb.fill_circle(x + 17, by - 9, 2, white);
        fb.fill_circle(x + 17, by - 8, 1, color::BLACK);
        fb.set(x + 9, by - 9, white);
        fb.set(x + 16, by - 10, white);
    }

    // Mouth on the nose
    if pose.happy {
        for i in 0..6 {
            fb.set(x + 14 + i, by - 1 + (i - 2).abs().min(2), dk_gray);
        }
    } else if pose.sad {
        for i in 0..5 {
            fb.set(x + 14 + i, by + 1 - (i - 2).abs().min(2), dk_gray);
        }
    } else {
        fb.hline(x + 14, by, 5, dk_gray);
    }

    // Wheels, larger in front
    fb.fill_circle(x - 14, by + 18, 3, dk_gray);
    fb.fill_circle(x - 6, by + 16, 3, dk_gray);
    fb.fill_circle(x + 2, by + 13, 2, dk_gray);
    fb.fill_circle(x - 14, by + 18, 1, gray);
    fb.fill_circle(x - 6, by + 16, 1, gray);
    fb.fill_circle(x + 2, by + 13, 1, gray);
}

/// Rabbit: the generic round body plus two long ears
fn draw_rabbit(fb: &mut FrameBuffer, x: i32, y: i32, style: &CharacterStyle, pose: Pose) {
    let by = y + pose.bounce;

    // Ears behind the body
    fb.fill_round_rect(x - 10, by - 42, 7, 22, 3, style.accent);
    fb.fill_round_rect(x + 3, by - 42, 7, 22, 3, style.accent);
    fb.fill_round_rect(x - 8, by - 38, 3, 14, 2, 0xFDB8);
    fb.fill_round_rect(x + 5, by - 38, 3, 14, 2, 0xFDB8);

    // Round body with a lighter belly
    fb.fill_circle(x, by, 20, style.body);
    fb.fill_circle(x, by + 4, 12, style.head);

    // Eyes
    let eye_y = by - 6;
    if pose.blink {
        fb.hline(x - 8, eye_y, 5, style.eye);
        fb.hline(x + 3, eye_y, 5, style.eye);
    } else {
        fb.fill_circle(x - 6, eye_y, 2, style.eye);
        fb.fill_circle(x + 6, eye_y, 2, style.eye);
        fb.set(x - 5, eye_y - 1, color::WHITE);
        fb.set(x + 7, eye_y - 1, color::WHITE);
    }

    // Mouth
    let mouth_y = by + 4;
    if pose.happy {
        for i in -5..=5 {
            fb.set(x + i, mouth_y + (i * i) / 8, style.eye);
        }
    } else if pose.sad {
        for i in -5..=5 {
            fb.set(x + i, mouth_y + 3 - (i * i) / 8, style.eye);
        }
    } else {
        fb.fill_circle(x, mouth_y + 1, 1, style.eye);
    }

    // Feet
    fb.fill_circle(x - 8, by + 20, 4, style.accent);
    fb.fill_circle(x + 8, by + 20, 4, style.accent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::phrases::CHARACTERS;

    fn count_nonblack(fb: &FrameBuffer) -> usize {
        fb.pixels().iter().filter(|&&p| p != 0).count()
    }

    #[test]
    fn test_each_skin_draws_something() {
        for idx in 0..CHARACTERS.len() {
            let mut fb = FrameBuffer::default();
            draw(
                &mut fb,
                idx,
                64,
                50,
                &CHARACTERS[idx],
                Pose {
                    happy: false,
                    sad: false,
                    blink: false,
                    bounce: 0,
                },
            );
            assert!(count_nonblack(&fb) > 200, "skin {idx} drew too little");
        }
    }

    #[test]
    fn test_happy_and_sad_differ() {
        let mut happy = FrameBuffer::default();
        let mut sad = FrameBuffer::default();
        let base = Pose {
            happy: true,
            sad: false,
            blink: false,
            bounce: 0,
        };
        draw(&mut happy, 0, 64, 50, &CHARACTERS[0], base);
        draw(
            &mut sad,
            0,
            64,
            50,
            &CHARACTERS[0],
            Pose {
                happy: false,
                sad: true,
                ..base
            },
        );
        assert_ne!(happy.pixels(), sad.pixels());
    }

    #[test]
    fn test_blink_changes_eyes() {
        let base = Pose {
            happy: false,
            sad: false,
            blink: false,
            bounce: 0,
        };
        let mut open = FrameBuffer::default();
        let mut closed = FrameBuffer::default();
        draw(&mut open, 2, 64, 50, &CHARACTERS[2], base);
        draw(
            &mut closed,
            2,
            64,
            50,
            &CHARACTERS[2],
            Pose { blink: true, ..base },
        );
        assert_ne!(open.pixels(), closed.pixels());
    }

    #[test]
    fn test_offscreen_draw_is_clipped_not_panicking() {
        let mut fb = FrameBuffer::default();
        draw(
            &mut fb,
            1,
            -40,
            -40,
            &CHARACTERS[1],
            Pose {
                happy: true,
                sad: false,
                blink: false,
                bounce: 3,
            },
        );
    }
}
