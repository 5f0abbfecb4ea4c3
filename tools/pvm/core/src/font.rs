//! Built-in 3x5 font.
//!
//! Layout: a 128 byte header (char width, wide char width, height, x and y
//! offset) followed by 8 bytes per glyph starting at codepoint 16. Bit n of a
//! glyph row is column n.

pub const FIRST_CHAR: u8 = 16;
pub const GLYPH_BYTES: usize = 8;
pub const HEADER_LEN: usize = 128;

const LAST_CHAR: u8 = 127;
const FONT_LEN: usize = HEADER_LEN + (LAST_CHAR - FIRST_CHAR + 1) as usize * GLYPH_BYTES;

/// Glyphs for 32..=127, one octal digit per row, top row first.
#[rustfmt::skip]
const GLYPHS: [u16; 96] = [
    // space ! " # $ % & '
    0o00000, 0o22202, 0o55000, 0o57575, 0o63263, 0o54215, 0o33657, 0o22000,
    // ( ) * + , - . /
    0o21112, 0o24442, 0o52725, 0o02720, 0o00021, 0o00700, 0o00002, 0o44211,
    // 0 - 7
    0o75557, 0o32227, 0o74717, 0o74647, 0o55744, 0o71747, 0o11757, 0o74444,
    // 8 9 : ; < = > ?
    0o75757, 0o75744, 0o02020, 0o02021, 0o42124, 0o07070, 0o12421, 0o74602,
    // @ A - G
    0o25516, 0o75755, 0o75357, 0o61116, 0o35557, 0o71317, 0o71311, 0o61157,
    // H - O
    0o55755, 0o72227, 0o72223, 0o55355, 0o11117, 0o77555, 0o35555, 0o65553,
    // P - W
    0o75711, 0o25536, 0o75355, 0o61743, 0o72222, 0o55556, 0o55572, 0o55577,
    // X Y Z [ \ ] ^ _
    0o55255, 0o55747, 0o74217, 0o31113, 0o11244, 0o64446, 0o25000, 0o00007,
    // ` a - g
    0o24000, 0o75755, 0o75357, 0o61116, 0o35557, 0o71317, 0o71311, 0o61157,
    // h - o
    0o55755, 0o72227, 0o72223, 0o55355, 0o11117, 0o77555, 0o35555, 0o65553,
    // p - w
    0o75711, 0o25536, 0o75355, 0o61743, 0o72222, 0o55556, 0o55572, 0o55577,
    // x y z { | } ~ del
    0o55255, 0o55747, 0o74217, 0o62326, 0o22222, 0o32623, 0o04710, 0o27772,
];

const fn build() -> [u8; FONT_LEN] {
    let mut font = [0u8; FONT_LEN];
    font[0] = 4;
    font[1] = 8;
    font[2] = 5;

    let mut g = 0;
    while g < GLYPHS.len() {
        let base = HEADER_LEN + (32 - FIRST_CHAR as usize + g) * GLYPH_BYTES;
        let mut row = 0;
        while row < 5 {
            font[base + row] = ((GLYPHS[g] >> (3 * (4 - row))) & 7) as u8;
            row += 1;
        }
        g += 1;
    }
    font
}

pub static FONT: [u8; FONT_LEN] = build();

pub fn char_width() -> u8 { FONT[0] }
pub fn wide_char_width() -> u8 { FONT[1] }
pub fn char_height() -> u8 { FONT[2] }

/// Row bitmaps of `ch`, or `None` where nothing is drawn.
pub fn glyph(ch: u8) -> Option<&'static [u8]> {
    if !(FIRST_CHAR..=LAST_CHAR).contains(&ch) {
        return None;
    }
    let at = HEADER_LEN + (ch - FIRST_CHAR) as usize * GLYPH_BYTES;
    Some(&FONT[at..at + GLYPH_BYTES])
}
