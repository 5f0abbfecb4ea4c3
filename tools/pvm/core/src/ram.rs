use alloc::boxed::Box;
use alloc::vec;
use bitfield::bitfield;
use log::trace;

pub const WIDTH: usize = 128;
pub const HEIGHT: usize = 128;

pub const RAM_SIZE: usize = 0x8000;

pub const SPRITES: usize      = 0x0000;
pub const MAP: usize          = 0x2000;
pub const MAP_SHARED: usize   = 0x1000;
pub const SPRITE_FLAGS: usize = 0x3000;
pub const MUSIC: usize        = 0x3100;
pub const SFX: usize          = 0x3200;
pub const GENERAL: usize      = 0x4300;
pub const PERSIST: usize      = 0x5E00;
pub const DRAW_STATE: usize   = 0x5F00;
pub const HW_STATE: usize     = 0x5F40;
pub const GPIO: usize         = 0x5F80;
pub const SCREEN: usize       = 0x6000;

pub const SPRITES_SIZE: usize = 0x2000;
pub const MAP_SIZE: usize     = 0x1000;
pub const FLAGS_SIZE: usize   = 0x100;
pub const MUSIC_SIZE: usize   = 0x100;
pub const SFX_SIZE: usize     = 0x1100;
pub const PERSIST_SIZE: usize = 0x100;
pub const SCREEN_SIZE: usize  = 0x2000;

/// Graphics, map, flags, music and sfx: everything a cart ships besides code.
pub const ROM_SIZE: usize = GENERAL;

pub const DS_DRAW_PAL: usize     = 0x5F00;
pub const DS_SCREEN_PAL: usize   = 0x5F10;
pub const DS_CLIP_XB: usize      = 0x5F20;
pub const DS_CLIP_YB: usize      = 0x5F21;
pub const DS_CLIP_XE: usize      = 0x5F22;
pub const DS_CLIP_YE: usize      = 0x5F23;
pub const DS_PEN: usize          = 0x5F25;
pub const DS_CURSOR_X: usize     = 0x5F26;
pub const DS_CURSOR_Y: usize     = 0x5F27;
pub const DS_CAMERA_X: usize     = 0x5F28;
pub const DS_CAMERA_Y: usize     = 0x5F2A;
pub const DS_FILLP: usize        = 0x5F31;
pub const DS_FILLP_TRANS: usize  = 0x5F33;
pub const DS_LINE_INVALID: usize = 0x5F35;
pub const DS_LINE_X: usize       = 0x5F3C;
pub const DS_LINE_Y: usize       = 0x5F3E;

pub const HW_RNG: usize           = 0x5F44;
pub const HW_BTN: usize           = 0x5F4C;
pub const HW_SPR_MAP: usize       = 0x5F54;
pub const HW_SCR_MAP: usize       = 0x5F55;
pub const HW_MAP_MAP: usize       = 0x5F56;
pub const HW_MAP_WIDTH: usize     = 0x5F57;
pub const HW_BTNP_DELAY: usize    = 0x5F5C;
pub const HW_BTNP_INTERVAL: usize = 0x5F5D;
pub const HW_COLOR_BITMASK: usize = 0x5F5E;

/// Draw palette bit marking a color as transparent for sprite blits.
pub const PAL_TRANSPARENT: u8 = 0x10;

bitfield! {
    /// Pen byte: low nibble primary color, high nibble fill pattern color.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Pen(u8);
    impl Debug;
    pub u8, primary, set_primary: 3, 0;
    pub u8, secondary, set_secondary: 7, 4;
}

bitfield! {
    /// Color read/write mask register.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct ColorBitmask(u8);
    impl Debug;
    pub u8, write_mask, set_write_mask: 3, 0;
    pub u8, read_mask, set_read_mask: 7, 4;
}

/// Reads a 4-bit pixel from a 128 px wide nibble-packed buffer.
#[inline(always)]
pub fn get_pixel(buf: &[u8], x: i32, y: i32) -> u8 {
    if !(0..WIDTH as i32).contains(&x) || !(0..HEIGHT as i32).contains(&y) {
        return 0;
    }
    let b = buf.get(y as usize * 64 + x as usize / 2).copied().unwrap_or(0);
    if x & 1 == 1 { b >> 4 } else { b & 0x0F }
}

#[inline(always)]
pub fn set_pixel(buf: &mut [u8], x: i32, y: i32, c: u8) {
    if !(0..WIDTH as i32).contains(&x) || !(0..HEIGHT as i32).contains(&y) {
        return;
    }
    if let Some(b) = buf.get_mut(y as usize * 64 + x as usize / 2) {
        *b = if x & 1 == 1 {
            (*b & 0x0F) | ((c & 0x0F) << 4)
        } else {
            (*b & 0xF0) | (c & 0x0F)
        };
    }
}

/// Four-channel music pattern row.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Song([u8; 4]);

impl Song {
    pub fn sfx(&self, channel: usize) -> u8 { self.0[channel & 3] & 0x7F }
    pub fn loop_start(&self) -> bool { self.0[0] & 0x80 != 0 }
    pub fn loop_back(&self) -> bool { self.0[1] & 0x80 != 0 }
    pub fn stop(&self) -> bool { self.0[2] & 0x80 != 0 }
    pub fn mode(&self) -> bool { self.0[3] & 0x80 != 0 }
}

/// The console's 32 KiB address space.
#[derive(Clone)]
pub struct Ram {
    bytes: Box<[u8]>,
}

impl core::fmt::Debug for Ram {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Ram")
            .field("clip", &self.clip())
            .field("camera", &self.camera())
            .field("pen", &self.pen())
            .finish()
    }
}

impl Default for Ram {
    fn default() -> Self {
        let mut ram = Ram { bytes: vec![0u8; RAM_SIZE].into_boxed_slice() };
        ram.reset();
        ram
    }
}

impl Ram {
    /// Clears everything but the persistent slots and installs power-on state.
    pub fn reset(&mut self) {
        trace!("ram reset");
        self.bytes[..PERSIST].fill(0);
        self.bytes[DRAW_STATE..].fill(0);

        self.reset_palettes();
        self.set_clip(0, 0, 128, 128);
        self.bytes[DS_PEN] = 6;
        self.bytes[DS_LINE_INVALID] = 1;

        self.bytes[HW_COLOR_BITMASK] = 0xFF;
        self.bytes[HW_SPR_MAP] = 0x00;
        self.bytes[HW_SCR_MAP] = 0x60;
        self.bytes[HW_MAP_MAP] = 0x20;
        self.bytes[HW_MAP_WIDTH] = 128;
        self.bytes[HW_BTNP_DELAY] = 15;
        self.bytes[HW_BTNP_INTERVAL] = 4;
    }

    pub fn reset_palettes(&mut self) {
        for i in 0..16 {
            self.bytes[DS_DRAW_PAL + i] = i as u8;
            self.bytes[DS_SCREEN_PAL + i] = i as u8;
        }
        self.bytes[DS_DRAW_PAL] |= PAL_TRANSPARENT;
    }

    #[inline(always)]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline(always)]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn read8(&self, addr: usize) -> u8 {
        self.bytes.get(addr).copied().unwrap_or(0)
    }

    pub fn write8(&mut self, addr: usize, val: u8) {
        if let Some(b) = self.bytes.get_mut(addr) {
            *b = val;
        }
    }

    pub fn read16(&self, addr: usize) -> u16 {
        match addr.checked_add(2).and_then(|end| self.bytes.get(addr..end)) {
            Some(&[a, b]) => u16::from_le_bytes([a, b]),
            _ => 0,
        }
    }

    pub fn write16(&mut self, addr: usize, val: u16) {
        if let Some(dst) = addr.checked_add(2).and_then(|end| self.bytes.get_mut(addr..end)) {
            dst.copy_from_slice(&val.to_le_bytes());
        }
    }

    pub fn read32(&self, addr: usize) -> u32 {
        match addr.checked_add(4).and_then(|end| self.bytes.get(addr..end)) {
            Some(&[a, b, c, d]) => u32::from_le_bytes([a, b, c, d]),
            _ => 0,
        }
    }

    pub fn write32(&mut self, addr: usize, val: u32) {
        if let Some(dst) = addr.checked_add(4).and_then(|end| self.bytes.get_mut(addr..end)) {
            dst.copy_from_slice(&val.to_le_bytes());
        }
    }

    /// Overlap-safe copy, clamped so neither range leaves the address space.
    pub fn memcpy(&mut self, dst: usize, src: usize, len: usize) {
        if dst >= RAM_SIZE || src >= RAM_SIZE {
            return;
        }
        let len = len.min(RAM_SIZE - dst).min(RAM_SIZE - src);
        self.bytes.copy_within(src..src + len, dst);
    }

    pub fn memset(&mut self, dst: usize, val: u8, len: usize) {
        if dst >= RAM_SIZE {
            return;
        }
        let len = len.min(RAM_SIZE - dst);
        self.bytes[dst..dst + len].fill(val);
    }

    #[inline(always)]
    pub fn region(&self, start: usize, len: usize) -> &[u8] {
        &self.bytes[start..start + len]
    }

    #[inline(always)]
    pub fn region_mut(&mut self, start: usize, len: usize) -> &mut [u8] {
        &mut self.bytes[start..start + len]
    }

    pub fn screen(&self) -> &[u8] { self.region(SCREEN, SCREEN_SIZE) }
    pub fn screen_mut(&mut self) -> &mut [u8] { self.region_mut(SCREEN, SCREEN_SIZE) }
    pub fn sprites(&self) -> &[u8] { self.region(SPRITES, SPRITES_SIZE) }
    pub fn sprites_mut(&mut self) -> &mut [u8] { self.region_mut(SPRITES, SPRITES_SIZE) }
    pub fn sfx_table(&self) -> &[u8] { self.region(SFX, SFX_SIZE) }
    pub fn persistent(&self) -> &[u8] { self.region(PERSIST, PERSIST_SIZE) }
    pub fn persistent_mut(&mut self) -> &mut [u8] { self.region_mut(PERSIST, PERSIST_SIZE) }

    pub fn song(&self, n: usize) -> Option<Song> {
        if n >= 64 {
            return None;
        }
        let at = MUSIC + n * 4;
        Some(Song([self.bytes[at], self.bytes[at + 1], self.bytes[at + 2], self.bytes[at + 3]]))
    }

    // draw state

    #[inline(always)]
    pub fn draw_pal(&self, c: u8) -> u8 {
        self.bytes[DS_DRAW_PAL + (c & 0x0F) as usize]
    }

    #[inline(always)]
    pub fn set_draw_pal(&mut self, c: u8, v: u8) {
        self.bytes[DS_DRAW_PAL + (c & 0x0F) as usize] = v;
    }

    #[inline(always)]
    pub fn screen_pal(&self, c: u8) -> u8 {
        self.bytes[DS_SCREEN_PAL + (c & 0x0F) as usize]
    }

    #[inline(always)]
    pub fn set_screen_pal(&mut self, c: u8, v: u8) {
        self.bytes[DS_SCREEN_PAL + (c & 0x0F) as usize] = v;
    }

    /// (xb, yb, xe, ye); the end bounds are exclusive.
    #[inline(always)]
    pub fn clip(&self) -> (i32, i32, i32, i32) {
        (
            self.bytes[DS_CLIP_XB] as i32,
            self.bytes[DS_CLIP_YB] as i32,
            self.bytes[DS_CLIP_XE] as i32,
            self.bytes[DS_CLIP_YE] as i32,
        )
    }

    pub fn set_clip(&mut self, xb: u8, yb: u8, xe: u8, ye: u8) {
        self.bytes[DS_CLIP_XB] = xb;
        self.bytes[DS_CLIP_YB] = yb;
        self.bytes[DS_CLIP_XE] = xe;
        self.bytes[DS_CLIP_YE] = ye;
    }

    #[inline(always)]
    pub fn pen(&self) -> Pen {
        Pen(self.bytes[DS_PEN])
    }

    pub fn set_pen(&mut self, c: u8) {
        self.bytes[DS_PEN] = c;
    }

    pub fn cursor(&self) -> (u8, u8) {
        (self.bytes[DS_CURSOR_X], self.bytes[DS_CURSOR_Y])
    }

    pub fn set_cursor(&mut self, x: u8, y: u8) {
        self.bytes[DS_CURSOR_X] = x;
        self.bytes[DS_CURSOR_Y] = y;
    }

    #[inline(always)]
    pub fn camera(&self) -> (i16, i16) {
        (self.read16(DS_CAMERA_X) as i16, self.read16(DS_CAMERA_Y) as i16)
    }

    pub fn set_camera(&mut self, x: i16, y: i16) {
        self.write16(DS_CAMERA_X, x as u16);
        self.write16(DS_CAMERA_Y, y as u16);
    }

    #[inline(always)]
    pub fn fillp(&self) -> u16 {
        self.read16(DS_FILLP)
    }

    pub fn set_fillp(&mut self, pattern: u16) {
        self.write16(DS_FILLP, pattern);
    }

    #[inline(always)]
    pub fn fillp_transparent(&self) -> bool {
        self.bytes[DS_FILLP_TRANS] & 1 != 0
    }

    pub fn set_fillp_transparent(&mut self, t: bool) {
        self.bytes[DS_FILLP_TRANS] = t as u8;
    }

    /// Endpoint of the last line drawn, if there is one to continue from.
    pub fn line_endpoint(&self) -> Option<(i16, i16)> {
        if self.bytes[DS_LINE_INVALID] != 0 {
            return None;
        }
        Some((self.read16(DS_LINE_X) as i16, self.read16(DS_LINE_Y) as i16))
    }

    pub fn set_line_endpoint(&mut self, x: i16, y: i16) {
        self.write16(DS_LINE_X, x as u16);
        self.write16(DS_LINE_Y, y as u16);
        self.bytes[DS_LINE_INVALID] = 0;
    }

    pub fn invalidate_line(&mut self) {
        self.bytes[DS_LINE_INVALID] = 1;
    }

    // hardware state

    #[inline(always)]
    pub fn color_bitmask(&self) -> ColorBitmask {
        ColorBitmask(self.bytes[HW_COLOR_BITMASK])
    }

    pub fn rng_state(&self) -> [u32; 2] {
        [self.read32(HW_RNG), self.read32(HW_RNG + 4)]
    }

    pub fn set_rng_state(&mut self, state: [u32; 2]) {
        self.write32(HW_RNG, state[0]);
        self.write32(HW_RNG + 4, state[1]);
    }

    pub fn buttons(&self, player: usize) -> u8 {
        if player < 8 { self.bytes[HW_BTN + player] } else { 0 }
    }

    pub fn set_buttons(&mut self, player: usize, bits: u8) {
        if player < 8 {
            self.bytes[HW_BTN + player] = bits;
        }
    }

    pub fn btnp_delay(&self) -> u8 { self.bytes[HW_BTNP_DELAY] }
    pub fn btnp_interval(&self) -> u8 { self.bytes[HW_BTNP_INTERVAL] }
    pub fn map_width(&self) -> u8 { self.bytes[HW_MAP_WIDTH] }
}
