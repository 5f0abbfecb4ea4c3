use crate::ram::{self, Ram};

/// The sixteen display colors, followed by the sixteen alternates reachable
/// by setting bit 7 of a screen palette entry.
pub const COLOR_MAP: [(u8, u8, u8, u8); 32] = [
    (0x00, 0x00, 0x00, 0xFF),
    (0x1D, 0x2B, 0x53, 0xFF),
    (0x7E, 0x25, 0x53, 0xFF),
    (0x00, 0x87, 0x51, 0xFF),
    (0xAB, 0x52, 0x36, 0xFF),
    (0x5F, 0x57, 0x4F, 0xFF),
    (0xC2, 0xC3, 0xC7, 0xFF),
    (0xFF, 0xF1, 0xE8, 0xFF),
    (0xFF, 0x00, 0x4D, 0xFF),
    (0xFF, 0xA3, 0x00, 0xFF),
    (0xFF, 0xEC, 0x27, 0xFF),
    (0x00, 0xE4, 0x36, 0xFF),
    (0x29, 0xAD, 0xFF, 0xFF),
    (0x83, 0x76, 0x9C, 0xFF),
    (0xFF, 0x77, 0xA8, 0xFF),
    (0xFF, 0xCC, 0xAA, 0xFF),

    (0x29, 0x18, 0x14, 0xFF),
    (0x11, 0x1D, 0x35, 0xFF),
    (0x42, 0x21, 0x36, 0xFF),
    (0x12, 0x53, 0x59, 0xFF),
    (0x74, 0x2F, 0x29, 0xFF),
    (0x49, 0x33, 0x3B, 0xFF),
    (0xA2, 0x88, 0x79, 0xFF),
    (0xF3, 0xEF, 0x7D, 0xFF),
    (0xBE, 0x12, 0x50, 0xFF),
    (0xFF, 0x6C, 0x24, 0xFF),
    (0xA8, 0xE7, 0x2E, 0xFF),
    (0x00, 0xB5, 0x43, 0xFF),
    (0x06, 0x5A, 0xB5, 0xFF),
    (0x75, 0x46, 0x65, 0xFF),
    (0xFF, 0x6E, 0x59, 0xFF),
    (0xFF, 0x9D, 0x81, 0xFF),
];

const fn rgb565(c: (u8, u8, u8, u8)) -> u16 {
    ((c.0 as u16 >> 3) << 11) | ((c.1 as u16 >> 2) << 5) | (c.2 as u16 >> 3)
}

const fn build_rgb565() -> [u16; 32] {
    let mut out = [0u16; 32];
    let mut i = 0;
    while i < 32 {
        out[i] = rgb565(COLOR_MAP[i]);
        i += 1;
    }
    out
}

pub const COLOR_MAP_RGB565: [u16; 32] = build_rgb565();

/// Index into `COLOR_MAP` for a screen palette entry.
#[inline(always)]
pub fn display_index(entry: u8) -> usize {
    (entry & 0x0F) as usize | ((entry & 0x80) >> 3) as usize
}

fn for_each_pixel(ram: &Ram, mut f: impl FnMut(usize, usize)) {
    let mut lut = [0usize; 16];
    for (c, slot) in lut.iter_mut().enumerate() {
        *slot = display_index(ram.screen_pal(c as u8));
    }
    for (i, &byte) in ram.screen().iter().enumerate() {
        f(i * 2, lut[(byte & 0x0F) as usize]);
        f(i * 2 + 1, lut[(byte >> 4) as usize]);
    }
}

/// Writes the screen as RGBA8 into `out`, which must hold 128*128*4 bytes.
pub fn render_rgba(ram: &Ram, out: &mut [u8]) {
    let Ok(pixels) = bytemuck::try_cast_slice_mut::<u8, [u8; 4]>(out) else {
        return;
    };
    if pixels.len() < ram::WIDTH * ram::HEIGHT {
        return;
    }
    for_each_pixel(ram, |i, c| {
        let (r, g, b, a) = COLOR_MAP[c];
        pixels[i] = [r, g, b, a];
    });
}

/// Writes the screen as RGB565 into `out`, which must hold 128*128 entries.
pub fn render_rgb565(ram: &Ram, out: &mut [u16]) {
    if out.len() < ram::WIDTH * ram::HEIGHT {
        return;
    }
    for_each_pixel(ram, |i, c| out[i] = COLOR_MAP_RGB565[c]);
}
