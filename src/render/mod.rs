//! Off-screen frame buffer and presentation
//!
//! Every tick the scene is drawn into a 128x128 RGB565 frame buffer and
//! handed to a [`FrameSink`]. The primitives mirror what a small display
//! library offers (filled circles, fast h/v lines, rounded rects, filled
//! triangles); sprites are built from them in [`character`] and composed in
//! [`scene`].

pub mod character;
pub mod scene;

/// Display width in pixels
pub const SCREEN_W: u32 = 128;
/// Display height in pixels
pub const SCREEN_H: u32 = 128;

/// Common RGB565 colors
pub mod color {
    /// Black
    pub const BLACK: u16 = 0x0000;
    /// White
    pub const WHITE: u16 = 0xFFFF;
    /// Red
    pub const RED: u16 = 0xF800;
    /// Yellow
    pub const YELLOW: u16 = 0xFFE0;
    /// Mess-pile brown
    pub const MESS_BROWN: u16 = 0xA145;

    /// Expand RGB565 to 8-bit RGB components
    pub fn to_rgb888(c: u16) -> (u8, u8, u8) {
        let r = ((c >> 11) & 0x1F) as u32;
        let g = ((c >> 5) & 0x3F) as u32;
        let b = (c & 0x1F) as u32;
        (
            ((r * 255 + 15) / 31) as u8,
            ((g * 255 + 31) / 63) as u8,
            ((b * 255 + 15) / 31) as u8,
        )
    }
}

/// Off-screen RGB565 pixel buffer
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u16>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        FrameBuffer::new(SCREEN_W, SCREEN_H)
    }
}

impl FrameBuffer {
    /// Allocate a cleared buffer
    pub fn new(width: u32, height: u32) -> Self {
        FrameBuffer {
            width,
            height,
            pixels: vec![0; (width * height) as usize],
        }
    }

    /// Buffer width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Buffer height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw pixel row-major slice
    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    /// Read one pixel (black outside the buffer)
    pub fn get(&self, x: i32, y: i32) -> u16 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0;
        }
        self.pixels[(y as u32 * self.width + x as u32) as usize]
    }

    /// Fill the whole buffer
    pub fn fill(&mut self, color: u16) {
        self.pixels.fill(color);
    }

    /// Set one pixel; out-of-bounds writes are clipped
    pub fn set(&mut self, x: i32, y: i32, color: u16) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        self.pixels[(y as u32 * self.width + x as u32) as usize] = color;
    }

    /// Horizontal line from (x, y), `len` pixels
    pub fn hline(&mut self, x: i32, y: i32, len: i32, color: u16) {
        for i in 0..len {
            self.set(x + i, y, color);
        }
    }

    /// Vertical line from (x, y), `len` pixels
    pub fn vline(&mut self, x: i32, y: i32, len: i32, color: u16) {
        for i in 0..len {
            self.set(x, y + i, color);
        }
    }

    /// Filled axis-aligned rectangle
    pub fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: u16) {
        for row in 0..h {
            self.hline(x, y + row, w, color);
        }
    }

    /// Filled rectangle with rounded corners
    pub fn fill_round_rect(&mut self, x: i32, y: i32, w: i32, h: i32, r: i32, color: u16) {
        let r = r.min(w / 2).min(h / 2).max(0);
        for row in 0..h {
            let inset = if row < r {
                r - round_chord(r, r - row)
            } else if row >= h - r {
                r - round_chord(r, row - (h - r - 1))
            } else {
                0
            };
            self.hline(x + inset, y + row, w - 2 * inset, color);
        }
    }

    /// Rectangle outline with rounded corners
    pub fn draw_round_rect(&mut self, x: i32, y: i32, w: i32, h: i32, r: i32, color: u16) {
        self.hline(x + r, y, w - 2 * r, color);
        self.hline(x + r, y + h - 1, w - 2 * r, color);
        self.vline(x, y + r, h - 2 * r, color);
        self.vline(x + w - 1, y + r, h - 2 * r, color);
        // Corner arcs, quarter circles
        for (cx, cy, sx, sy) in [
            (x + r, y + r, -1, -1),
            (x + w - 1 - r, y + r, 1, -1),
            (x + r, y + h - 1 - r, -1, 1),
            (x + w - 1 - r, y + h - 1 - r, 1, 1),
        ] {
            for dx in 0..=r {
                let dy = round_chord(r, dx);
                self.set(cx + sx * dx, cy + sy * dy, color);
                self.set(cx + sx * dy, cy + sy * dx, color);
            }
        }
    }

    /// Filled circle
    pub fn fill_circle(&mut self, cx: i32, cy: i32, r: i32, color: u16) {
        for dy in -r..=r {
            let half = round_chord(r, dy.abs());
            self.hline(cx - half, cy + dy, half * 2 + 1, color);
        }
    }

    /// Circle outline
    pub fn draw_circle(&mut self, cx: i32, cy: i32, r: i32, color: u16) {
        let mut x = r;
        let mut y = 0;
        let mut err = 1 - r;
        while x >= y {
            for (px, py) in [
                (cx + x, cy + y),
                (cx - x, cy + y),
                (cx + x, cy - y),
                (cx - x, cy - y),
                (cx + y, cy + x),
                (cx - y, cy + x),
                (cx + y, cy - x),
                (cx - y, cy - x),
            ] {
                self.set(px, py, color);
            }
            y += 1;
            if err < 0 {
                err += 2 * y + 1;
            } else {
                x -= 1;
                err += 2 * (y - x) + 1;
            }
        }
    }

    /// Line segment (Bresenham)
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u16) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (x0, y0);
        loop {
            self.set(x, y, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Filled triangle (scanline)
    pub fn fill_triangle(
        &mut self,
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        color: u16,
    ) {
        let min_y = y0.min(y1).min(y2);
        let max_y = y0.max(y1).max(y2);
        for y in min_y..=max_y {
            let mut xs: Vec<i32> = Vec::with_capacity(3);
            for &((ax, ay), (bx, by)) in
                &[((x0, y0), (x1, y1)), ((x1, y1), (x2, y2)), ((x2, y2), (x0, y0))]
            {
                if ay == by {
                    if y == ay {
                        xs.push(ax);
                        xs.push(bx);
                    }
                    continue;
                }
                let (top, bot) = if ay < by { ((ax, ay), (bx, by)) } else { ((bx, by), (ax, ay)) };
                if y >= top.1 && y <= bot.1 {
                    let x = top.0 + (bot.0 - top.0) * (y - top.1) / (bot.1 - top.1);
                    xs.push(x);
                }
            }
            if let (Some(&lo), Some(&hi)) = (xs.iter().min(), xs.iter().max()) {
                self.hline(lo, y, hi - lo + 1, color);
            }
        }
    }
}

/// Half-chord of a circle of radius `r` at offset `d` from the center
fn round_chord(r: i32, d: i32) -> i32 {
    if d > r {
        return 0;
    }
    (((r * r - d * d) as f32).sqrt()) as i32
}

/// Receiver of completed frames
pub trait FrameSink: Send {
    /// Present one frame
    fn present(&mut self, frame: &FrameBuffer);
}

/// Sink that discards frames (headless operation and tests)
#[derive(Debug, Default)]
pub struct NullSink {
    frames: u64,
}

impl NullSink {
    /// Number of frames presented
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameSink for NullSink {
    fn present(&mut self, _frame: &FrameBuffer) {
        self.frames += 1;
    }
}

/// Terminal sink rendering two pixels per character cell with the upper
/// half block and 24-bit color escapes. Frames are downsampled by `step`.
pub struct AnsiSink {
    step: u32,
    first: bool,
}

impl AnsiSink {
    /// Create a sink downsampling by `step` (2 fits a 128px frame into 64
    /// columns and 32 rows)
    pub fn new(step: u32) -> Self {
        AnsiSink {
            step: step.max(1),
            first: true,
        }
    }

    fn render(&self, frame: &FrameBuffer) -> String {
        let cols = frame.width() / self.step;
        let rows = frame.height() / self.step;
        let mut out = String::with_capacity((cols * rows * 24) as usize);
        let mut y = 0;
        while y + 1 < rows {
            for x in 0..cols {
                let top = frame.get((x * self.step) as i32, (y * self.step) as i32);
                let bottom = frame.get((x * self.step) as i32, ((y + 1) * self.step) as i32);
                let (tr, tg, tb) = color::to_rgb888(top);
                let (br, bg, bb) = color::to_rgb888(bottom);
                out.push_str(&format!(
                    "\x1B[38;2;{tr};{tg};{tb}m\x1B[48;2;{br};{bg};{bb}m▀"
                ));
            }
            out.push_str("\x1B[0m\n");
            y += 2;
        }
        out
    }
}

impl FrameSink for AnsiSink {
    fn present(&mut self, frame: &FrameBuffer) {
        use std::io::Write;
        let rows = frame.height() / self.step / 2;
        let mut stdout = std::io::stdout().lock();
        if !self.first {
            let _ = write!(stdout, "\x1B[{rows}A");
        }
        self.first = false;
        let _ = stdout.write_all(self.render(frame).as_bytes());
        let _ = stdout.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_and_clipping() {
        let mut fb = FrameBuffer::new(16, 16);
        fb.set(3, 4, 0x1234);
        assert_eq!(fb.get(3, 4), 0x1234);
        fb.set(-1, 0, 0xFFFF);
        fb.set(16, 0, 0xFFFF);
        fb.set(0, 16, 0xFFFF);
        assert_eq!(fb.get(-1, 0), 0);
        assert_eq!(fb.pixels().iter().filter(|&&p| p != 0).count(), 1);
    }

    #[test]
    fn test_fill_rect_extent() {
        let mut fb = FrameBuffer::new(16, 16);
        fb.fill_rect(2, 3, 4, 5, color::WHITE);
        assert_eq!(fb.get(2, 3), color::WHITE);
        assert_eq!(fb.get(5, 7), color::WHITE);
        assert_eq!(fb.get(6, 3), color::BLACK);
        assert_eq!(fb.get(2, 8), color::BLACK);
    }

    #[test]
    fn test_fill_circle_contains_center_and_extremes() {
        let mut fb = FrameBuffer::new(32, 32);
        fb.fill_circle(16, 16, 5, color::RED);
        assert_eq!(fb.get(16, 16), color::RED);
        assert_eq!(fb.get(21, 16), color::RED);
        assert_eq!(fb.get(16, 11), color::RED);
        assert_eq!(fb.get(23, 16), color::BLACK);
    }

    #[test]
    fn test_fill_triangle_covers_vertices() {
        let mut fb = FrameBuffer::new(32, 32);
        fb.fill_triangle(2, 2, 20, 4, 10, 18, color::YELLOW);
        assert_eq!(fb.get(10, 8), color::YELLOW); // interior
        assert_eq!(fb.get(0, 0), color::BLACK);
        assert_eq!(fb.get(30, 30), color::BLACK);
    }

    #[test]
    fn test_draw_line_endpoints() {
        let mut fb = FrameBuffer::new(16, 16);
        fb.draw_line(1, 1, 10, 7, color::WHITE);
        assert_eq!(fb.get(1, 1), color::WHITE);
        assert_eq!(fb.get(10, 7), color::WHITE);
    }

    #[test]
    fn test_ansi_sink_renders_rows() {
        let mut fb = FrameBuffer::new(8, 8);
        fb.fill(color::RED);
        let sink = AnsiSink::new(2);
        let text = sink.render(&fb);
        assert_eq!(text.lines().count(), 2); // 4 sampled rows, 2 per line
        assert!(text.contains("▀"));
    }

    #[test]
    fn test_rgb888_expansion() {
        assert_eq!(color::to_rgb888(color::BLACK), (0, 0, 0));
        assert_eq!(color::to_rgb888(color::WHITE), (255, 255, 255));
        let (r, g, b) = color::to_rgb888(color::RED);
        assert_eq!((r, g, b), (255, 0, 0));
    }
}
