//! The functions a cart can call, with the console's argument defaults.
//!
//! A script engine converts its own values into `Fix32` and byte strings and
//! calls these; omitted arguments are passed as `None`.

use alloc::vec::Vec;
use log::info;
use pvm_synth::Synth;

use crate::fix::Fix32;
use crate::gfx::Graphics;
use crate::inputs::{Button, InputLatch};
use crate::ram::{self, Ram};
use crate::rng::PicoRng;

const PERSIST_SLOTS: usize = ram::PERSIST_SIZE / 4;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame_count: u64,
    pub fps: u8,
}

/// Everything a running hook may touch, borrowed from the VM for one call.
pub struct Api<'a> {
    pub ram: &'a mut Ram,
    pub gfx: &'a mut Graphics,
    pub synth: &'a mut Synth,
    pub input: &'a InputLatch,
    /// Cart data as loaded, for `reload`.
    pub rom: &'a [u8],
    pub frame: FrameInfo,
    pub save_dirty: &'a mut bool,
}

#[inline]
fn int(v: Fix32) -> i32 {
    v.to_int()
}

#[inline]
fn color(v: Fix32) -> u8 {
    v.to_int() as u8
}

/// Script addresses are 16 bit; anything past RAM reads as zero.
#[inline]
fn addr(v: Fix32) -> usize {
    v.to_int() as u16 as usize
}

fn overlaps(start: usize, len: usize, region: usize, region_len: usize) -> bool {
    start < region + region_len && start.saturating_add(len) > region
}

impl<'a> Api<'a> {
    fn touched(&mut self, start: usize, len: usize) {
        if overlaps(start, len, ram::SCREEN, ram::SCREEN_SIZE) {
            self.gfx.mark_all_dirty();
        }
        if overlaps(start, len, ram::PERSIST, ram::PERSIST_SIZE) {
            *self.save_dirty = true;
        }
    }

    // graphics

    pub fn cls(&mut self, c: Option<Fix32>) {
        self.gfx.cls(self.ram, c.map_or(0, color));
    }

    pub fn pset(&mut self, x: Fix32, y: Fix32, c: Option<Fix32>) {
        self.gfx.pset(self.ram, int(x), int(y), c.map(color));
    }

    pub fn pget(&self, x: Fix32, y: Fix32) -> Fix32 {
        Fix32::from(self.gfx.pget(self.ram, int(x), int(y)))
    }

    /// `line()` forgets the last endpoint, `line(x1, y1 [, c])` continues from
    /// it, `line(x0, y0, x1, y1 [, c])` draws a fresh line.
    pub fn line(&mut self, args: &[Fix32]) {
        match *args {
            [] => self.ram.invalidate_line(),
            [x1, y1] => self.gfx.line_to(self.ram, int(x1), int(y1), None),
            [x1, y1, c] => self.gfx.line_to(self.ram, int(x1), int(y1), Some(color(c))),
            [x0, y0, x1, y1] => self.gfx.line(self.ram, int(x0), int(y0), int(x1), int(y1), None),
            [x0, y0, x1, y1, c, ..] => {
                self.gfx.line(self.ram, int(x0), int(y0), int(x1), int(y1), Some(color(c)))
            }
            [_] => {}
        }
    }

    pub fn rect(&mut self, x0: Fix32, y0: Fix32, x1: Fix32, y1: Fix32, c: Option<Fix32>) {
        self.gfx.rect(self.ram, int(x0), int(y0), int(x1), int(y1), c.map(color));
    }

    pub fn rectfill(&mut self, x0: Fix32, y0: Fix32, x1: Fix32, y1: Fix32, c: Option<Fix32>) {
        self.gfx.rectfill(self.ram, int(x0), int(y0), int(x1), int(y1), c.map(color));
    }

    pub fn circ(&mut self, x: Fix32, y: Fix32, r: Option<Fix32>, c: Option<Fix32>) {
        self.gfx.circ(self.ram, int(x), int(y), r.map_or(4, int), c.map(color));
    }

    pub fn circfill(&mut self, x: Fix32, y: Fix32, r: Option<Fix32>, c: Option<Fix32>) {
        self.gfx.circfill(self.ram, int(x), int(y), r.map_or(4, int), c.map(color));
    }

    pub fn oval(&mut self, x0: Fix32, y0: Fix32, x1: Fix32, y1: Fix32, c: Option<Fix32>) {
        self.gfx.oval(self.ram, int(x0), int(y0), int(x1), int(y1), c.map(color));
    }

    pub fn ovalfill(&mut self, x0: Fix32, y0: Fix32, x1: Fix32, y1: Fix32, c: Option<Fix32>) {
        self.gfx.ovalfill(self.ram, int(x0), int(y0), int(x1), int(y1), c.map(color));
    }

    /// `w` and `h` count sprites and may be fractional.
    pub fn spr(
        &mut self,
        n: Fix32,
        x: Fix32,
        y: Fix32,
        w: Option<Fix32>,
        h: Option<Fix32>,
        flip_x: bool,
        flip_y: bool,
    ) {
        let eight = Fix32::from_int(8);
        let w = int(w.unwrap_or(Fix32::ONE) * eight);
        let h = int(h.unwrap_or(Fix32::ONE) * eight);
        self.gfx.spr(self.ram, int(n), int(x), int(y), w, h, flip_x, flip_y);
    }

    pub fn sspr(
        &mut self,
        sx: Fix32,
        sy: Fix32,
        sw: Fix32,
        sh: Fix32,
        dx: Fix32,
        dy: Fix32,
        dw: Option<Fix32>,
        dh: Option<Fix32>,
        flip_x: bool,
        flip_y: bool,
    ) {
        let dw = dw.unwrap_or(sw);
        let dh = dh.unwrap_or(sh);
        self.gfx.sspr(
            self.ram,
            int(sx), int(sy), int(sw), int(sh),
            int(dx), int(dy), int(dw), int(dh),
            flip_x, flip_y,
        );
    }

    pub fn map(
        &mut self,
        cel_x: Option<Fix32>,
        cel_y: Option<Fix32>,
        sx: Option<Fix32>,
        sy: Option<Fix32>,
        cel_w: Option<Fix32>,
        cel_h: Option<Fix32>,
        layer: Option<Fix32>,
    ) {
        self.gfx.map(
            self.ram,
            cel_x.map_or(0, int),
            cel_y.map_or(0, int),
            sx.map_or(0, int),
            sy.map_or(0, int),
            cel_w.map_or(128, int),
            cel_h.map_or(64, int),
            layer.map_or(0, color),
        );
    }

    /// Returns the x coordinate after the last character.
    pub fn print(&mut self, text: &[u8], x: Option<Fix32>, y: Option<Fix32>, c: Option<Fix32>) -> Fix32 {
        let pos = x.zip(y).map(|(x, y)| (int(x), int(y)));
        Fix32::from_int(self.gfx.print(self.ram, text, pos, c.map(color)))
    }

    pub fn cursor(&mut self, x: Option<Fix32>, y: Option<Fix32>, c: Option<Fix32>) {
        self.ram.set_cursor(x.map_or(0, color), y.map_or(0, color));
        if let Some(c) = c {
            self.gfx.color(self.ram, color(c));
        }
    }

    pub fn color(&mut self, c: Option<Fix32>) {
        self.gfx.color(self.ram, c.map_or(6, color));
    }

    pub fn camera(&mut self, x: Option<Fix32>, y: Option<Fix32>) {
        self.gfx.camera(self.ram, x.map_or(0, int) as i16, y.map_or(0, int) as i16);
    }

    pub fn clip(&mut self, x: Option<Fix32>, y: Option<Fix32>, w: Option<Fix32>, h: Option<Fix32>) {
        let rect = match (x, y, w, h) {
            (Some(x), Some(y), Some(w), Some(h)) => Some((int(x), int(y), int(w), int(h))),
            _ => None,
        };
        self.gfx.clip(self.ram, rect);
    }

    /// `pal()` resets both palettes.
    pub fn pal(&mut self, c0: Option<Fix32>, c1: Option<Fix32>, p: Option<Fix32>) {
        match (c0, c1) {
            (Some(c0), Some(c1)) => self.gfx.pal(self.ram, color(c0), color(c1), p.map_or(0, color)),
            _ => self.gfx.pal_reset(self.ram),
        }
    }

    pub fn palt(&mut self, c: Option<Fix32>, t: Option<bool>) {
        match c {
            Some(c) => self.gfx.palt(self.ram, color(c), t.unwrap_or(true)),
            None => self.gfx.palt_reset(self.ram),
        }
    }

    /// The fraction bit 0x8000 of the pattern turns on secondary-color transparency.
    pub fn fillp(&mut self, pattern: Option<Fix32>) {
        let p = pattern.unwrap_or(Fix32::ZERO);
        self.gfx.fillp(self.ram, p.to_int() as u16, p.fract_bits() & 0x8000 != 0);
    }

    pub fn fget(&self, n: Fix32, f: Option<Fix32>) -> Fix32 {
        let n = color(n);
        match f {
            Some(f) => Fix32::from(self.gfx.fget_bit(self.ram, n, color(f))),
            None => Fix32::from(self.gfx.fget(self.ram, n)),
        }
    }

    /// `fset(n, v)` writes the flag byte, `fset(n, f, v)` one flag.
    pub fn fset(&mut self, n: Fix32, f: Option<Fix32>, v: Fix32) {
        self.gfx.fset(self.ram, color(n), f.map(color), color(v));
    }

    pub fn sget(&self, x: Fix32, y: Fix32) -> Fix32 {
        Fix32::from(self.gfx.sget(self.ram, int(x), int(y)))
    }

    pub fn sset(&mut self, x: Fix32, y: Fix32, c: Option<Fix32>) {
        self.gfx.sset(self.ram, int(x), int(y), c.map(color));
    }

    pub fn mget(&self, x: Fix32, y: Fix32) -> Fix32 {
        Fix32::from(self.gfx.mget(self.ram, int(x), int(y)))
    }

    pub fn mset(&mut self, x: Fix32, y: Fix32, v: Fix32) {
        self.gfx.mset(self.ram, int(x), int(y), color(v));
    }

    // input

    fn player(p: Option<Fix32>) -> usize {
        p.map_or(0, |p| int(p).max(0) as usize)
    }

    pub fn btn(&self, b: Fix32, p: Option<Fix32>) -> bool {
        Button::from_index(color(b)).is_some_and(|b| self.input.btn(b, Self::player(p)))
    }

    /// `btn()` with no arguments: player 0's button bits.
    pub fn btn_bits(&self, p: Option<Fix32>) -> Fix32 {
        Fix32::from(self.input.btn_bits(Self::player(p)))
    }

    pub fn btnp(&self, b: Fix32, p: Option<Fix32>) -> bool {
        let (delay, interval) = (self.ram.btnp_delay(), self.ram.btnp_interval());
        Button::from_index(color(b))
            .is_some_and(|b| self.input.btnp(b, Self::player(p), delay, interval))
    }

    pub fn btnp_bits(&self, p: Option<Fix32>) -> Fix32 {
        let (delay, interval) = (self.ram.btnp_delay(), self.ram.btnp_interval());
        Fix32::from(self.input.btnp_bits(Self::player(p), delay, interval))
    }

    // audio

    /// `channel` -1 (the default) picks a free channel; `sfx(-1)` without a
    /// channel stops every channel.
    pub fn sfx(&mut self, n: Fix32, channel: Option<Fix32>, offset: Option<Fix32>, length: Option<Fix32>) {
        let n = int(n);
        let channel = channel.map(int).filter(|&c| c >= 0).map(|c| c as usize);
        let offset = offset.map_or(0, int).clamp(0, 255) as u8;
        let length = length.map_or(32, int).clamp(0, 255) as u8;

        if n < 0 && channel.is_none() {
            for c in 0..pvm_synth::CHANNELS {
                self.synth.sfx(self.ram.sfx_table(), n, Some(c), 0, 0);
            }
            return;
        }
        self.synth.sfx(self.ram.sfx_table(), n, channel, offset, length);
    }

    pub fn music(&mut self, n: Fix32, fade_ms: Option<Fix32>, mask: Option<Fix32>) {
        let fade = fade_ms.map_or(0, int).clamp(0, u16::MAX as i32) as u16;
        self.synth.music(int(n), fade, mask.map_or(0x0F, color));
    }

    // memory

    pub fn peek(&self, a: Fix32) -> Fix32 {
        Fix32::from(self.ram.read8(addr(a)))
    }

    pub fn peek2(&self, a: Fix32) -> Fix32 {
        Fix32::from(self.ram.read16(addr(a)) as i16)
    }

    pub fn peek4(&self, a: Fix32) -> Fix32 {
        Fix32::from_bits(self.ram.read32(addr(a)) as i32)
    }

    /// Writes consecutive bytes starting at `a`.
    pub fn poke(&mut self, a: Fix32, values: &[Fix32]) {
        let start = addr(a);
        for (i, &v) in values.iter().enumerate() {
            self.ram.write8(start + i, color(v));
        }
        self.touched(start, values.len());
    }

    pub fn poke2(&mut self, a: Fix32, v: Fix32) {
        self.ram.write16(addr(a), int(v) as u16);
        self.touched(addr(a), 2);
    }

    pub fn poke4(&mut self, a: Fix32, v: Fix32) {
        self.ram.write32(addr(a), v.to_bits() as u32);
        self.touched(addr(a), 4);
    }

    pub fn memcpy(&mut self, dst: Fix32, src: Fix32, len: Fix32) {
        let len = int(len).max(0) as usize;
        self.ram.memcpy(addr(dst), addr(src), len);
        self.touched(addr(dst), len);
    }

    pub fn memset(&mut self, dst: Fix32, v: Fix32, len: Fix32) {
        let len = int(len).max(0) as usize;
        self.ram.memset(addr(dst), color(v), len);
        self.touched(addr(dst), len);
    }

    /// Copies cart data back into RAM; all defaults restore the whole cart.
    pub fn reload(&mut self, dst: Option<Fix32>, src: Option<Fix32>, len: Option<Fix32>) {
        let dst = dst.map_or(0, addr);
        let src = src.map_or(0, addr);
        let len = len.map_or(ram::ROM_SIZE as i32, int).max(0) as usize;
        if src >= self.rom.len() || dst >= ram::RAM_SIZE {
            return;
        }
        let len = len.min(self.rom.len() - src).min(ram::RAM_SIZE - dst);
        self.ram.bytes_mut()[dst..dst + len].copy_from_slice(&self.rom[src..src + len]);
        self.touched(dst, len);
    }

    pub fn dget(&self, i: Fix32) -> Fix32 {
        match usize::try_from(int(i)) {
            Ok(i) if i < PERSIST_SLOTS => Fix32::from_bits(self.ram.read32(ram::PERSIST + i * 4) as i32),
            _ => Fix32::ZERO,
        }
    }

    pub fn dset(&mut self, i: Fix32, v: Fix32) {
        if let Ok(i) = usize::try_from(int(i)) {
            if i < PERSIST_SLOTS {
                self.ram.write32(ram::PERSIST + i * 4, v.to_bits() as u32);
                *self.save_dirty = true;
            }
        }
    }

    // math

    pub fn rnd(&mut self, limit: Option<Fix32>) -> Fix32 {
        let mut rng = PicoRng::from_state(self.ram.rng_state());
        let v = rng.rnd(limit.unwrap_or(Fix32::ONE));
        self.ram.set_rng_state(rng.state());
        v
    }

    pub fn srand(&mut self, seed: Fix32) {
        self.ram.set_rng_state(PicoRng::seeded(seed).state());
    }

    // system

    pub fn time(&self) -> Fix32 {
        let fps = self.frame.fps.max(1) as i64;
        let bits = ((self.frame.frame_count as i64) << 16) / fps;
        Fix32::from_bits(bits as i32)
    }

    /// 7 is the target frame rate, 16..19 the sfx on each channel (-1 when idle).
    pub fn stat(&self, n: Fix32) -> Fix32 {
        match int(n) {
            1 => Fix32::ONE,
            7 | 8 => Fix32::from(self.frame.fps),
            ch @ 16..=19 => {
                let sfx = self.synth.channels[(ch - 16) as usize].sfx;
                Fix32::from_int(sfx.map_or(-1, |s| s as i32))
            }
            _ => Fix32::ZERO,
        }
    }

    /// Debug output to the host log.
    pub fn printh(&self, text: &[u8]) {
        info!(target: "printh", "{}", alloc::string::String::from_utf8_lossy(text));
    }

    /// Bytes of the persistent region, for engines that snapshot saves.
    pub fn persistent(&self) -> Vec<u8> {
        self.ram.persistent().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Parts {
        ram: Ram,
        gfx: Graphics,
        synth: Synth,
        input: InputLatch,
        rom: Vec<u8>,
        dirty: bool,
    }

    impl Parts {
        fn new() -> Self {
            Parts {
                ram: Ram::default(),
                gfx: Graphics::new(),
                synth: Synth::new(pvm_synth::SAMPLE_RATE),
                input: InputLatch::default(),
                rom: alloc::vec![0u8; ram::ROM_SIZE],
                dirty: false,
            }
        }

        fn api(&mut self) -> Api<'_> {
            Api {
                ram: &mut self.ram,
                gfx: &mut self.gfx,
                synth: &mut self.synth,
                input: &self.input,
                rom: &self.rom,
                frame: FrameInfo { frame_count: 45, fps: 30 },
                save_dirty: &mut self.dirty,
            }
        }
    }

    fn n(v: i32) -> Fix32 {
        Fix32::from_int(v)
    }

    #[test]
    fn cls_and_circle_defaults() {
        let mut parts = Parts::new();
        let mut api = parts.api();
        api.cls(Some(n(1)));
        api.circ(n(64), n(64), None, Some(n(7)));
        assert_eq!(api.pget(n(68), n(64)), n(7));
        api.cls(None);
        assert_eq!(api.pget(n(0), n(0)), Fix32::ZERO);
    }

    #[test]
    fn line_forms() {
        let mut parts = Parts::new();
        let mut api = parts.api();
        api.line(&[n(0), n(0), n(4), n(0), n(8)]);
        api.line(&[n(4), n(4)]);
        assert_eq!(api.pget(n(4), n(3)), n(8));
        api.line(&[]);
        assert_eq!(api.ram.line_endpoint(), None);
        api.line(&[n(9), n(9)]);
        assert_eq!(api.pget(n(9), n(9)), Fix32::ZERO);
        assert_eq!(api.ram.line_endpoint(), Some((9, 9)));
    }

    #[test]
    fn print_uses_cursor() {
        let mut parts = Parts::new();
        let mut api = parts.api();
        assert_eq!(api.print(b"ab", None, None, Some(n(7))), n(8));
        assert_eq!(api.ram.cursor(), (0, 6));
    }

    #[test]
    fn fillp_transparency_from_fraction() {
        let mut parts = Parts::new();
        let mut api = parts.api();
        api.fillp(Some(Fix32::from_bits(0x5A5A_8000)));
        assert_eq!(api.ram.fillp(), 0x5A5A);
        assert!(api.ram.fillp_transparent());
        api.fillp(None);
        assert_eq!(api.ram.fillp(), 0);
        assert!(!api.ram.fillp_transparent());
    }

    #[test]
    fn peek_poke_widths() {
        let mut parts = Parts::new();
        let mut api = parts.api();
        api.poke(n(0x4300), &[n(1), n(2), n(3)]);
        assert_eq!(api.peek(n(0x4301)), n(2));
        api.poke2(n(0x4400), n(-2));
        assert_eq!(api.peek2(n(0x4400)), n(-2));
        api.poke4(n(0x4404), Fix32::from_f64(1.5));
        assert_eq!(api.peek4(n(0x4404)), Fix32::from_f64(1.5));
        assert_eq!(api.peek(n(0x7FFF + 1)), Fix32::ZERO);
        assert_eq!(api.peek(n(-1)), Fix32::ZERO);
    }

    #[test]
    fn screen_pokes_mark_frame_dirty() {
        let mut parts = Parts::new();
        let mut api = parts.api();
        api.gfx.flip();
        api.poke(n(0x4300), &[n(1)]);
        assert!(!api.gfx.needs_flip());
        api.memset(n(0x6000), n(0x11), n(64));
        assert!(api.gfx.needs_flip());
    }

    #[test]
    fn persistent_slots() {
        let mut parts = Parts::new();
        {
            let mut api = parts.api();
            api.dset(n(3), Fix32::from_f64(-7.25));
            assert_eq!(api.dget(n(3)), Fix32::from_f64(-7.25));
            api.dset(n(64), n(1));
            assert_eq!(api.dget(n(64)), Fix32::ZERO);
            assert_eq!(api.dget(n(-1)), Fix32::ZERO);
        }
        assert!(parts.dirty);
    }

    #[test]
    fn reload_restores_cart_data() {
        let mut parts = Parts::new();
        parts.rom[0x10] = 0xAB;
        let mut api = parts.api();
        api.poke(n(0x10), &[n(0)]);
        api.reload(None, None, None);
        assert_eq!(api.peek(n(0x10)), n(0xAB));
        api.reload(Some(n(0x4300)), Some(n(0x10)), Some(n(1)));
        assert_eq!(api.peek(n(0x4300)), n(0xAB));
    }

    #[test]
    fn rnd_state_lives_in_ram() {
        let mut parts = Parts::new();
        let mut api = parts.api();
        api.srand(n(5));
        let a = api.rnd(Some(n(100)));
        api.srand(n(5));
        let b = api.rnd(Some(n(100)));
        assert_eq!(a, b);
        assert!(a < n(100));
    }

    #[test]
    fn time_and_stat() {
        let mut parts = Parts::new();
        let api = parts.api();
        assert_eq!(api.time(), Fix32::from_f64(1.5));
        assert_eq!(api.stat(n(7)), n(30));
        assert_eq!(api.stat(n(16)), n(-1));
        assert_eq!(api.stat(n(99)), Fix32::ZERO);
    }
}
