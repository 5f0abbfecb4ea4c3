//! Software rasterizer drawing into the screen region of RAM.
//!
//! Public primitives take world coordinates: the camera offset is subtracted
//! before clipping. Everything drawn with the pen goes through `plot`, which
//! applies the fill pattern, draw palette, color bitmask and clip rectangle.

use core::ops::Range;
use log::trace;

use crate::font;
use crate::ram::{self, Ram, PAL_TRANSPARENT};

const W: i32 = ram::WIDTH as i32;
const H: i32 = ram::HEIGHT as i32;

/// Rows touched since the host last consumed the frame.
#[derive(Debug, Clone)]
pub struct Graphics {
    dirty_top: i32,
    dirty_bottom: i32,
    needs_flip: bool,
}

impl Default for Graphics {
    fn default() -> Self {
        Self { dirty_top: H, dirty_bottom: 0, needs_flip: false }
    }
}

fn ordered(a: i32, b: i32) -> (i32, i32) {
    if a <= b { (a, b) } else { (b, a) }
}

impl Graphics {
    pub fn new() -> Self {
        Self::default()
    }

    // dirty tracking

    #[inline(always)]
    fn mark_dirty(&mut self, y0: i32, y1: i32) {
        self.dirty_top = self.dirty_top.min(y0.max(0));
        self.dirty_bottom = self.dirty_bottom.max((y1 + 1).min(H));
        self.needs_flip = true;
    }

    /// For writes that bypass the rasterizer, like pokes into screen memory.
    pub fn mark_all_dirty(&mut self) {
        self.mark_dirty(0, H - 1);
    }

    pub fn needs_flip(&self) -> bool {
        self.needs_flip
    }

    /// Screen rows changed since the last `flip`.
    pub fn dirty_rows(&self) -> Option<Range<usize>> {
        if self.dirty_top < self.dirty_bottom {
            Some(self.dirty_top as usize..self.dirty_bottom as usize)
        } else {
            None
        }
    }

    pub fn flip(&mut self) {
        self.dirty_top = H;
        self.dirty_bottom = 0;
        self.needs_flip = false;
    }

    // pixel path

    #[inline(always)]
    fn in_clip(ram: &Ram, x: i32, y: i32) -> bool {
        let (xb, yb, xe, ye) = ram.clip();
        x >= xb && x < xe && y >= yb && y < ye
    }

    #[inline(always)]
    fn to_screen(ram: &Ram, x: i32, y: i32) -> (i32, i32) {
        let (cx, cy) = ram.camera();
        (x - cx as i32, y - cy as i32)
    }

    /// Writes a palette-resolved color, honoring the color bitmask.
    #[inline(always)]
    fn put(&mut self, ram: &mut Ram, x: i32, y: i32, c: u8) {
        let mask = ram.color_bitmask();
        let c = if mask.write_mask() != 0x0F || mask.read_mask() != 0x0F {
            let src = ram::get_pixel(ram.screen(), x, y);
            (src & !mask.write_mask()) | (c & mask.write_mask() & mask.read_mask())
        } else {
            c
        };
        ram::set_pixel(ram.screen_mut(), x, y, c);
        self.mark_dirty(y, y);
    }

    /// Pen color at a screen position, or `None` for a transparent fill bit.
    #[inline(always)]
    fn pen_color(ram: &Ram, x: i32, y: i32) -> Option<u8> {
        let pen = ram.pen();
        let mut c = pen.primary();
        let pattern = ram.fillp();
        if pattern != 0 && (pattern >> (15 - ((x & 3) + 4 * (y & 3)))) & 1 == 1 {
            if ram.fillp_transparent() {
                return None;
            }
            c = pen.secondary();
        }
        Some(ram.draw_pal(c) & 0x0F)
    }

    /// Pen pixel at a screen position already known to be inside the clip.
    #[inline(always)]
    fn plot_unchecked(&mut self, ram: &mut Ram, x: i32, y: i32) {
        if let Some(c) = Self::pen_color(ram, x, y) {
            self.put(ram, x, y, c);
        }
    }

    #[inline(always)]
    fn plot(&mut self, ram: &mut Ram, x: i32, y: i32) {
        if Self::in_clip(ram, x, y) {
            self.plot_unchecked(ram, x, y);
        }
    }

    fn is_plain_pen(ram: &Ram) -> bool {
        let mask = ram.color_bitmask();
        ram.fillp() == 0 && mask.write_mask() == 0x0F && mask.read_mask() == 0x0F
    }

    /// Horizontal pen run in screen coordinates.
    fn h_line(&mut self, ram: &mut Ram, x0: i32, x1: i32, y: i32) {
        let (xb, yb, xe, ye) = ram.clip();
        let (minx, maxx) = ordered(x0, x1);
        if xb >= xe || y < yb || y >= ye || maxx < xb || minx >= xe {
            return;
        }
        let minx = minx.max(xb);
        let maxx = maxx.min(xe - 1);

        if Self::is_plain_pen(ram) && maxx - minx > 1 {
            let c = ram.draw_pal(ram.pen().primary()) & 0x0F;
            let mut x = minx;
            let row = y as usize * 64;
            let screen = ram.screen_mut();
            if x & 1 == 1 {
                ram::set_pixel(screen, x, y, c);
                x += 1;
            }
            let end = if maxx & 1 == 0 { maxx } else { maxx + 1 };
            screen[row + x as usize / 2..row + end as usize / 2].fill(c | c << 4);
            if maxx & 1 == 0 {
                ram::set_pixel(screen, maxx, y, c);
            }
            self.mark_dirty(y, y);
        } else {
            for x in minx..=maxx {
                self.plot_unchecked(ram, x, y);
            }
        }
    }

    /// Vertical pen run in screen coordinates.
    fn v_line(&mut self, ram: &mut Ram, x: i32, y0: i32, y1: i32) {
        let (xb, yb, xe, ye) = ram.clip();
        let (miny, maxy) = ordered(y0, y1);
        if yb >= ye || x < xb || x >= xe || maxy < yb || miny >= ye {
            return;
        }
        let miny = miny.max(yb);
        let maxy = maxy.min(ye - 1);

        if Self::is_plain_pen(ram) {
            let c = ram.draw_pal(ram.pen().primary()) & 0x0F;
            let screen = ram.screen_mut();
            for y in miny..=maxy {
                ram::set_pixel(screen, x, y, c);
            }
            self.mark_dirty(miny, maxy);
        } else {
            for y in miny..=maxy {
                self.plot_unchecked(ram, x, y);
            }
        }
    }

    // state

    pub fn color(&mut self, ram: &mut Ram, c: u8) {
        ram.set_pen(c);
    }

    fn apply_color(ram: &mut Ram, c: Option<u8>) {
        if let Some(c) = c {
            ram.set_pen(c);
        }
    }

    pub fn camera(&mut self, ram: &mut Ram, x: i16, y: i16) {
        ram.set_camera(x, y);
    }

    /// Negative width, or no arguments, resets to the full screen.
    pub fn clip(&mut self, ram: &mut Ram, rect: Option<(i32, i32, i32, i32)>) {
        match rect {
            Some((x, y, w, h)) if w >= 0 => {
                let xb = x.clamp(0, W);
                let yb = y.clamp(0, H);
                let xe = x.saturating_add(w).clamp(0, W);
                let ye = y.saturating_add(h.max(0)).clamp(0, H);
                ram.set_clip(xb as u8, yb as u8, xe as u8, ye as u8);
            }
            _ => ram.set_clip(0, 0, W as u8, H as u8),
        }
    }

    /// `p == 0` remaps the draw palette keeping transparency, `p == 1` the screen palette.
    pub fn pal(&mut self, ram: &mut Ram, c0: u8, c1: u8, p: u8) {
        match p {
            0 => {
                let keep = ram.draw_pal(c0) & PAL_TRANSPARENT;
                ram.set_draw_pal(c0, (c1 & 0x0F) | keep);
            }
            1 => {
                ram.set_screen_pal(c0, c1);
                self.mark_all_dirty();
            }
            _ => {}
        }
    }

    pub fn pal_reset(&mut self, ram: &mut Ram) {
        ram.reset_palettes();
        self.mark_all_dirty();
    }

    pub fn palt(&mut self, ram: &mut Ram, c: u8, transparent: bool) {
        let v = ram.draw_pal(c) & !PAL_TRANSPARENT;
        ram.set_draw_pal(c, if transparent { v | PAL_TRANSPARENT } else { v });
    }

    /// Only color 0 transparent.
    pub fn palt_reset(&mut self, ram: &mut Ram) {
        for c in 0..16 {
            self.palt(ram, c, c == 0);
        }
    }

    pub fn fillp(&mut self, ram: &mut Ram, pattern: u16, transparent: bool) {
        ram.set_fillp(pattern);
        ram.set_fillp_transparent(transparent);
    }

    // primitives

    pub fn cls(&mut self, ram: &mut Ram, c: u8) {
        let c = c & 0x0F;
        ram.screen_mut().fill(c | c << 4);
        ram.set_cursor(0, 0);
        ram.set_clip(0, 0, W as u8, H as u8);
        self.mark_all_dirty();
    }

    pub fn pset(&mut self, ram: &mut Ram, x: i32, y: i32, c: Option<u8>) {
        Self::apply_color(ram, c);
        let (x, y) = Self::to_screen(ram, x, y);
        self.plot(ram, x, y);
    }

    pub fn pget(&self, ram: &Ram, x: i32, y: i32) -> u8 {
        let (x, y) = Self::to_screen(ram, x, y);
        ram::get_pixel(ram.screen(), x, y)
    }

    /// Draws a line and remembers its end for `line_to`.
    pub fn line(&mut self, ram: &mut Ram, x0: i32, y0: i32, x1: i32, y1: i32, c: Option<u8>) {
        Self::apply_color(ram, c);
        ram.set_line_endpoint(x1 as i16, y1 as i16);
        let (x0, y0) = Self::to_screen(ram, x0, y0);
        let (x1, y1) = Self::to_screen(ram, x1, y1);

        if x0 == x1 {
            self.v_line(ram, x0, y0, y1);
            return;
        }
        if y0 == y1 {
            self.h_line(ram, x0, x1, y0);
            return;
        }

        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (x0, y0);
        loop {
            self.plot(ram, x, y);
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

    /// Continues from the last line's endpoint; starts a new one if there is none.
    pub fn line_to(&mut self, ram: &mut Ram, x1: i32, y1: i32, c: Option<u8>) {
        match ram.line_endpoint() {
            Some((x0, y0)) => self.line(ram, x0 as i32, y0 as i32, x1, y1, c),
            None => {
                Self::apply_color(ram, c);
                ram.set_line_endpoint(x1 as i16, y1 as i16);
            }
        }
    }

    pub fn rect(&mut self, ram: &mut Ram, x0: i32, y0: i32, x1: i32, y1: i32, c: Option<u8>) {
        Self::apply_color(ram, c);
        let (x0, y0) = Self::to_screen(ram, x0, y0);
        let (x1, y1) = Self::to_screen(ram, x1, y1);
        let (x0, x1) = ordered(x0, x1);
        let (y0, y1) = ordered(y0, y1);
        self.h_line(ram, x0, x1, y0);
        self.h_line(ram, x0, x1, y1);
        if y1 - y0 > 1 {
            self.v_line(ram, x0, y0 + 1, y1 - 1);
            self.v_line(ram, x1, y0 + 1, y1 - 1);
        }
    }

    pub fn rectfill(&mut self, ram: &mut Ram, x0: i32, y0: i32, x1: i32, y1: i32, c: Option<u8>) {
        Self::apply_color(ram, c);
        let (x0, y0) = Self::to_screen(ram, x0, y0);
        let (x1, y1) = Self::to_screen(ram, x1, y1);
        let (x0, x1) = ordered(x0, x1);
        let (y0, y1) = ordered(y0, y1);
        let (_, yb, _, ye) = ram.clip();
        for y in y0.max(yb)..=y1.min(ye - 1) {
            self.h_line(ram, x0, x1, y);
        }
    }

    pub fn circ(&mut self, ram: &mut Ram, cx: i32, cy: i32, r: i32, c: Option<u8>) {
        Self::apply_color(ram, c);
        if r < 0 {
            return;
        }
        let (cx, cy) = Self::to_screen(ram, cx, cy);
        let mut x = r;
        let mut y = 0;
        let mut dec = 1 - x;
        while y <= x {
            self.plot(ram, cx + x, cy + y);
            self.plot(ram, cx + y, cy + x);
            self.plot(ram, cx - y, cy + x);
            self.plot(ram, cx - x, cy + y);
            self.plot(ram, cx - x, cy - y);
            self.plot(ram, cx - y, cy - x);
            self.plot(ram, cx + y, cy - x);
            self.plot(ram, cx + x, cy - y);
            y += 1;
            if dec < 0 {
                dec += 2 * y + 1;
            } else {
                x -= 1;
                dec += 2 * (y - x) + 1;
            }
        }
    }

    pub fn circfill(&mut self, ram: &mut Ram, cx: i32, cy: i32, r: i32, c: Option<u8>) {
        Self::apply_color(ram, c);
        if r < 0 {
            return;
        }
        let (cx, cy) = Self::to_screen(ram, cx, cy);
        match r {
            0 => self.plot(ram, cx, cy),
            1 => {
                self.plot(ram, cx, cy - 1);
                self.h_line(ram, cx - 1, cx + 1, cy);
                self.plot(ram, cx, cy + 1);
            }
            _ => {
                let mut x = -r;
                let mut y = 0;
                let mut err = 2 - 2 * r;
                loop {
                    self.h_line(ram, cx + x, cx - x, cy + y);
                    if y != 0 {
                        self.h_line(ram, cx + x, cx - x, cy - y);
                    }
                    let r2 = err;
                    if r2 <= y {
                        y += 1;
                        err += y * 2 + 1;
                    }
                    if r2 > x || err > y {
                        x += 1;
                        err += x * 2 + 1;
                    }
                    if x >= 0 {
                        break;
                    }
                }
            }
        }
    }

    /// Bresenham ellipse inscribed in the box, in 64-bit to survive large radii.
    fn ellipse(&mut self, ram: &mut Ram, x0: i32, y0: i32, x1: i32, y1: i32, fill: bool) {
        let (mut x0, mut y0, mut x1, mut y1) = (x0 as i64, y0 as i64, x1 as i64, y1 as i64);
        let mut a = (x1 - x0).abs();
        let b = (y1 - y0).abs();
        let mut b1 = b & 1;
        let mut dx = 4 * (1 - a) * b * b;
        let mut dy = 4 * (b1 + 1) * a * a;
        let mut err = dx + dy + b1 * a * a;

        if x0 > x1 {
            x0 = x1;
            x1 += a;
        }
        if y0 > y1 {
            y0 = y1;
        }
        y0 += (b + 1) / 2;
        y1 = y0 - b1;
        a *= 8 * a;
        b1 = 8 * b * b;

        let span = |g: &mut Self, ram: &mut Ram, xa: i64, xb: i64, ya: i64, yb: i64| {
            let (xa, xb, ya, yb) = (xa as i32, xb as i32, ya as i32, yb as i32);
            if fill {
                g.h_line(ram, xa, xb, ya);
                g.h_line(ram, xa, xb, yb);
            } else {
                g.plot(ram, xa, ya);
                g.plot(ram, xb, ya);
                g.plot(ram, xa, yb);
                g.plot(ram, xb, yb);
            }
        };

        loop {
            span(self, ram, x0, x1, y0, y1);
            let e2 = 2 * err;
            if e2 <= dy {
                y0 += 1;
                y1 -= 1;
                dy += a;
                err += dy;
            }
            if e2 >= dx || 2 * err > dy {
                x0 += 1;
                x1 -= 1;
                dx += b1;
                err += dx;
            }
            if x0 > x1 {
                break;
            }
        }

        while y0 - y1 <= b {
            span(self, ram, x0 - 1, x1 + 1, y0, y1);
            y0 += 1;
            y1 -= 1;
        }
    }

    pub fn oval(&mut self, ram: &mut Ram, x0: i32, y0: i32, x1: i32, y1: i32, c: Option<u8>) {
        Self::apply_color(ram, c);
        let (x0, y0) = Self::to_screen(ram, x0, y0);
        let (x1, y1) = Self::to_screen(ram, x1, y1);
        self.ellipse(ram, x0, y0, x1, y1, false);
    }

    pub fn ovalfill(&mut self, ram: &mut Ram, x0: i32, y0: i32, x1: i32, y1: i32, c: Option<u8>) {
        Self::apply_color(ram, c);
        let (x0, y0) = Self::to_screen(ram, x0, y0);
        let (x1, y1) = Self::to_screen(ram, x1, y1);
        self.ellipse(ram, x0, y0, x1, y1, true);
    }

    // sprites

    /// Stretched blit from the sprite sheet. Negative destination sizes flip.
    pub fn sspr(
        &mut self,
        ram: &mut Ram,
        sx: i32,
        sy: i32,
        sw: i32,
        sh: i32,
        dx: i32,
        dy: i32,
        dw: i32,
        dh: i32,
        flip_x: bool,
        flip_y: bool,
    ) {
        let (mut dw, mut dh, mut flip_x, mut flip_y) = (dw, dh, flip_x, flip_y);
        if dw < 0 {
            dw = -dw;
            flip_x = !flip_x;
        }
        if dh < 0 {
            dh = -dh;
            flip_y = !flip_y;
        }
        if sw <= 0 || sh <= 0 || dw == 0 || dh == 0 {
            return;
        }

        let (dx, dy) = Self::to_screen(ram, dx, dy);
        let (xb, yb, xe, ye) = ram.clip();
        let x_start = dx.max(xb);
        let x_end = dx.saturating_add(dw).min(xe);
        let y_start = dy.max(yb);
        let y_end = dy.saturating_add(dh).min(ye);
        if x_start >= x_end || y_start >= y_end {
            return;
        }

        // 16.16 source step per destination pixel
        let step_x = ((sw as i64) << 16) / dw as i64;
        let step_y = ((sh as i64) << 16) / dh as i64;

        for y in y_start..y_end {
            let v = (((y - dy) as i64 * step_y) >> 16) as i32;
            let src_y = if flip_y { sy + sh - 1 - v } else { sy + v };
            if !(0..H).contains(&src_y) {
                continue;
            }
            for x in x_start..x_end {
                let u = (((x - dx) as i64 * step_x) >> 16) as i32;
                let src_x = if flip_x { sx + sw - 1 - u } else { sx + u };
                if !(0..W).contains(&src_x) {
                    continue;
                }
                let c = ram::get_pixel(ram.sprites(), src_x, src_y);
                let mapped = ram.draw_pal(c);
                if mapped & PAL_TRANSPARENT != 0 {
                    continue;
                }
                self.put(ram, x, y, mapped & 0x0F);
            }
        }
    }

    /// Sprite `n` covering `w`x`h` pixels of the sheet (8x8 per sprite).
    pub fn spr(&mut self, ram: &mut Ram, n: i32, x: i32, y: i32, w: i32, h: i32, flip_x: bool, flip_y: bool) {
        if !(0..256).contains(&n) {
            return;
        }
        let sx = (n % 16) * 8;
        let sy = (n / 16) * 8;
        self.sspr(ram, sx, sy, w, h, x, y, w, h, flip_x, flip_y);
    }

    pub fn sget(&self, ram: &Ram, x: i32, y: i32) -> u8 {
        ram::get_pixel(ram.sprites(), x, y)
    }

    pub fn sset(&mut self, ram: &mut Ram, x: i32, y: i32, c: Option<u8>) {
        let c = c.unwrap_or_else(|| ram.pen().primary());
        ram::set_pixel(ram.sprites_mut(), x, y, c);
    }

    pub fn fget(&self, ram: &Ram, n: u8) -> u8 {
        ram.read8(ram::SPRITE_FLAGS + n as usize)
    }

    pub fn fget_bit(&self, ram: &Ram, n: u8, bit: u8) -> bool {
        bit < 8 && (self.fget(ram, n) >> bit) & 1 == 1
    }

    /// Sets one flag, or the whole flag byte when `bit` is `None`.
    pub fn fset(&mut self, ram: &mut Ram, n: u8, bit: Option<u8>, value: u8) {
        let at = ram::SPRITE_FLAGS + n as usize;
        match bit {
            Some(bit) if bit < 8 => {
                let flags = ram.read8(at) & !(1 << bit);
                ram.write8(at, flags | ((value != 0) as u8) << bit);
            }
            Some(_) => {}
            None => ram.write8(at, value),
        }
    }

    // map

    fn map_addr(x: i32, y: i32) -> Option<usize> {
        if !(0..128).contains(&x) || !(0..64).contains(&y) {
            return None;
        }
        Some(if y < 32 {
            ram::MAP + y as usize * 128 + x as usize
        } else {
            ram::SPRITES + ram::MAP_SHARED + (y as usize - 32) * 128 + x as usize
        })
    }

    pub fn mget(&self, ram: &Ram, x: i32, y: i32) -> u8 {
        Self::map_addr(x, y).map_or(0, |at| ram.read8(at))
    }

    pub fn mset(&mut self, ram: &mut Ram, x: i32, y: i32, v: u8) {
        if let Some(at) = Self::map_addr(x, y) {
            ram.write8(at, v);
        }
    }

    /// Draws a block of map cells. Tile 0 is never drawn; a nonzero `layer`
    /// only draws tiles sharing a flag bit with it.
    pub fn map(&mut self, ram: &mut Ram, cel_x: i32, cel_y: i32, sx: i32, sy: i32, cel_w: i32, cel_h: i32, layer: u8) {
        trace!("map {},{} {}x{} at {},{}", cel_x, cel_y, cel_w, cel_h, sx, sy);
        for ty in 0..cel_h.clamp(0, 64) {
            for tx in 0..cel_w.clamp(0, 128) {
                let tile = self.mget(ram, cel_x + tx, cel_y + ty);
                if tile == 0 {
                    continue;
                }
                if layer != 0 && self.fget(ram, tile) & layer == 0 {
                    continue;
                }
                self.spr(ram, tile as i32, sx + tx * 8, sy + ty * 8, 8, 8, false, false);
            }
        }
    }

    // text

    fn draw_char(&mut self, ram: &mut Ram, ch: u8, x: i32, y: i32) {
        let Some(rows) = font::glyph(ch) else {
            return;
        };
        let (x, y) = Self::to_screen(ram, x, y);
        for (row, &bits) in rows.iter().take(font::char_height() as usize).enumerate() {
            for col in 0..8 {
                if (bits >> col) & 1 == 1 {
                    self.plot(ram, x + col, y + row as i32);
                }
            }
        }
    }

    /// Prints at `pos` or at the cursor, and leaves the cursor on the next line.
    /// Returns the x just past the last character.
    pub fn print(&mut self, ram: &mut Ram, text: &[u8], pos: Option<(i32, i32)>, c: Option<u8>) -> i32 {
        Self::apply_color(ram, c);
        let (start_x, mut y) = pos.unwrap_or_else(|| {
            let (cx, cy) = ram.cursor();
            (cx as i32, cy as i32)
        });
        let line_height = font::char_height() as i32 + 1;
        let mut x = start_x;

        for &ch in text {
            if ch == b'\n' {
                x = start_x;
                y += line_height;
                continue;
            }
            if ch < font::FIRST_CHAR {
                continue;
            }
            self.draw_char(ram, ch, x, y);
            x += if ch >= 128 { font::wide_char_width() } else { font::char_width() } as i32;
        }

        ram.set_cursor(start_x as u8, (y + line_height) as u8);
        x
    }
}
