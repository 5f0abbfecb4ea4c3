//! `.p8` text carts: a header line followed by `__tag__` sections.

use alloc::vec::Vec;
use log::{debug, warn};
use pvm_synth::Note;

use crate::error::LoadError;
use crate::ram::{self, Ram};

pub const HEADER: &[u8] = b"pico-8 cartridge";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Section {
    Lua,
    Gfx,
    Gff,
    Map,
    Sfx,
    Music,
    /// `__label__` and anything unrecognized.
    Skip,
}

impl Section {
    fn from_tag(line: &[u8]) -> Option<Self> {
        let name = line.strip_prefix(b"__")?.strip_suffix(b"__")?;
        if name.is_empty() || !name.iter().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }
        Some(match name {
            b"lua" => Section::Lua,
            b"gfx" => Section::Gfx,
            b"gff" => Section::Gff,
            b"map" => Section::Map,
            b"sfx" => Section::Sfx,
            b"music" => Section::Music,
            _ => Section::Skip,
        })
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let start = line.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(line.len());
    let end = line.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |e| e + 1);
    &line[start..end]
}

fn nibble(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

/// Hex pairs of a line, stopping at the first malformed pair.
fn hex_bytes(line: &[u8]) -> impl Iterator<Item = u8> + '_ {
    line.chunks_exact(2)
        .map_while(|pair| Some(nibble(pair[0])? << 4 | nibble(pair[1])?))
}

/// Splits the cart into `(section, body)` pairs, body lines kept verbatim.
fn sections(data: &[u8]) -> Vec<(Section, &[u8])> {
    let mut found = Vec::new();
    let mut current: Option<(Section, usize)> = None;
    let mut offset = 0;

    for line in data.split_inclusive(|&b| b == b'\n') {
        if let Some(section) = Section::from_tag(trim_line(line)) {
            if let Some((s, start)) = current.take() {
                found.push((s, &data[start..offset]));
            }
            current = Some((section, offset + line.len()));
        }
        offset += line.len();
    }
    if let Some((s, start)) = current {
        found.push((s, &data[start..]));
    }
    found
}

fn lines(body: &[u8]) -> impl Iterator<Item = &[u8]> {
    body.split(|&b| b == b'\n').map(trim_line).filter(|l| !l.is_empty())
}

fn parse_gfx(body: &[u8], ram: &mut Ram) {
    let sprites = ram.sprites_mut();
    for (y, line) in lines(body).take(ram::HEIGHT).enumerate() {
        for (x, c) in line.iter().take(ram::WIDTH).map_while(|&c| nibble(c)).enumerate() {
            ram::set_pixel(sprites, x as i32, y as i32, c);
        }
    }
}

fn parse_gff(body: &[u8], ram: &mut Ram) {
    let flags = ram.region_mut(ram::SPRITE_FLAGS, ram::FLAGS_SIZE);
    let mut slots = flags.iter_mut();
    for line in lines(body) {
        for (b, slot) in hex_bytes(line).zip(&mut slots) {
            *slot = b;
        }
    }
}

fn parse_map(body: &[u8], ram: &mut Ram) {
    let map = ram.region_mut(ram::MAP, ram::MAP_SIZE);
    for (row, line) in map.chunks_exact_mut(128).zip(lines(body)) {
        for (tile, b) in row.iter_mut().zip(hex_bytes(line)) {
            *tile = b;
        }
    }
}

/// One sfx per line: 4 header bytes, then 32 notes as `PPWVE` digits.
fn parse_sfx(body: &[u8], ram: &mut Ram) {
    let table = ram.region_mut(ram::SFX, ram::SFX_SIZE);
    for (sfx, line) in table.chunks_exact_mut(pvm_synth::SFX_SIZE).zip(lines(body)) {
        let (header, notes) = line.split_at(line.len().min(8));
        for (dst, b) in sfx[64..].iter_mut().zip(hex_bytes(header)) {
            *dst = b;
        }

        for (i, digits) in notes.chunks_exact(5).take(pvm_synth::NOTES_PER_SFX).enumerate() {
            let Some(d) = digits.iter().map(|&c| nibble(c)).collect::<Option<Vec<u8>>>() else {
                break;
            };
            let mut note = Note::default();
            note.set_pitch((d[0] << 4 | d[1]) & 0x3F);
            note.set_waveform_bits(d[2] & 7);
            note.set_custom(d[2] >= 8);
            note.set_volume(d[3] & 7);
            note.set_effect(d[4] & 7);
            sfx[i * 2..i * 2 + 2].copy_from_slice(&note.to_bytes());
        }
    }
}

/// One pattern per line: `FF AABBCCDD`, flag bit n lands in bit 7 of channel n.
fn parse_music(body: &[u8], ram: &mut Ram) {
    let music = ram.region_mut(ram::MUSIC, ram::MUSIC_SIZE);
    for (pattern, line) in music.chunks_exact_mut(4).zip(lines(body)) {
        let mut parts = line.split(|&b| b == b' ').filter(|p| !p.is_empty());
        let (Some(flags), Some(channels)) = (parts.next(), parts.next()) else {
            continue;
        };
        let flags = hex_bytes(flags).next().unwrap_or(0);
        for (n, (dst, b)) in pattern.iter_mut().zip(hex_bytes(channels)).enumerate() {
            *dst = (b & 0x7F) | ((flags >> n) & 1) << 7;
        }
    }
}

/// Loads every data section into RAM and returns the script text.
pub fn parse(data: &[u8], ram: &mut Ram, capacity: usize) -> Result<Vec<u8>, LoadError> {
    let mut script = Vec::new();

    for (section, body) in sections(data) {
        debug!(target: "cart", "section {:?}: {} bytes", section, body.len());
        match section {
            Section::Lua => {
                if body.len() >= capacity {
                    warn!(target: "cart", "script of {} bytes exceeds {}", body.len(), capacity);
                    return Err(LoadError::ScriptTooLarge { len: body.len(), capacity });
                }
                script = body.to_vec();
            }
            Section::Gfx => parse_gfx(body, ram),
            Section::Gff => parse_gff(body, ram),
            Section::Map => parse_map(body, ram),
            Section::Sfx => parse_sfx(body, ram),
            Section::Music => parse_music(body, ram),
            Section::Skip => {}
        }
    }

    Ok(script)
}
