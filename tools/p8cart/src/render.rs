use anyhow::{bail, Context, Result};
use image::RgbaImage;
use tracing::debug;

use pvm_core::color_map;
use pvm_core::gfx::Graphics;
use pvm_core::ram::{self, Ram, HEIGHT, WIDTH};
use pvm_core::synth::{Sfx, Synth, NOTES_PER_SFX, SAMPLE_RATE, SFX_COUNT};

const MAP_CELLS_W: u32 = 128;
const MAP_CELLS_H: u32 = 64;
/// Map cells that fit on one screen.
const SCREEN_CELLS: u32 = 16;

fn screen_image(ram: &Ram) -> Result<RgbaImage> {
    let mut rgba = vec![0u8; WIDTH * HEIGHT * 4];
    color_map::render_rgba(ram, &mut rgba);
    RgbaImage::from_raw(WIDTH as u32, HEIGHT as u32, rgba).context("screen buffer has the wrong size")
}

/// The sprite sheet shown through the screen, so the screen palette applies.
pub fn sprite_sheet(ram: &mut Ram, scale: u32) -> Result<RgbaImage> {
    if scale == 0 || scale > 16 {
        bail!("scale must be between 1 and 16");
    }
    ram.memcpy(ram::SCREEN, ram::SPRITES, ram::SPRITES_SIZE);
    let sheet = screen_image(ram)?;
    if scale == 1 {
        return Ok(sheet);
    }
    Ok(image::imageops::resize(
        &sheet,
        sheet.width() * scale,
        sheet.height() * scale,
        image::imageops::FilterType::Nearest,
    ))
}

/// Draws the map one screenful at a time with the console's own `map`.
pub fn tile_map(ram: &mut Ram, layer: u8) -> Result<RgbaImage> {
    let mut gfx = Graphics::new();
    let cell = 8;
    let mut out = RgbaImage::new(MAP_CELLS_W * cell, MAP_CELLS_H * cell);

    for cy in (0..MAP_CELLS_H).step_by(SCREEN_CELLS as usize) {
        for cx in (0..MAP_CELLS_W).step_by(SCREEN_CELLS as usize) {
            gfx.cls(ram, 0);
            gfx.map(ram, cx as i32, cy as i32, 0, 0, SCREEN_CELLS as i32, SCREEN_CELLS as i32, layer);
            let screen = screen_image(ram)?;
            image::imageops::replace(&mut out, &screen, (cx * cell) as i64, (cy * cell) as i64);
        }
    }
    debug!("rendered {}x{} map", out.width(), out.height());
    Ok(out)
}

/// Plays one effect from the start until it ends or `seconds` run out.
pub fn sfx_pcm(ram: &Ram, index: u8, seconds: f32) -> Result<Vec<i16>> {
    if index as usize >= SFX_COUNT {
        bail!("sfx {} does not exist, carts have {}", index, SFX_COUNT);
    }
    let table = ram.sfx_table();
    let sfx = Sfx::from_table(table, index as usize).context("sfx table is truncated")?;
    let limit = (seconds.max(0.0) * SAMPLE_RATE as f32) as usize;

    let mut synth = Synth::new(SAMPLE_RATE);
    synth.sfx(table, index as i32, Some(0), 0, NOTES_PER_SFX as u8);

    // one note's worth of samples per chunk
    let chunk = (SAMPLE_RATE as usize * sfx.speed().max(1) as usize / 120).max(1);
    let mut pcm = Vec::new();
    while pcm.len() < limit && synth.channels[0].is_playing() {
        let start = pcm.len();
        pcm.resize((start + chunk).min(limit), 0);
        synth.fill(table, &mut pcm[start..]);
    }
    Ok(pcm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ram_with_sfx(speed: u8, loop_start: u8, loop_end: u8) -> Ram {
        let mut ram = Ram::default();
        let base = ram::SFX;
        for i in 0..NOTES_PER_SFX {
            // pitch 24, square, volume 5
            ram.write16(base + i * 2, 24 | 3 << 6 | 5 << 9);
        }
        ram.write8(base + 65, speed);
        ram.write8(base + 66, loop_start);
        ram.write8(base + 67, loop_end);
        ram
    }

    #[test]
    fn one_shot_sfx_renders_its_length() {
        let ram = ram_with_sfx(1, 0, 0);
        let pcm = sfx_pcm(&ram, 0, 10.0).unwrap();
        let note = SAMPLE_RATE as usize / 120;
        assert_eq!(pcm.len(), note * NOTES_PER_SFX);
        assert!(pcm.iter().any(|&s| s != 0));
    }

    #[test]
    fn looping_sfx_is_cut_off() {
        let ram = ram_with_sfx(1, 0, 8);
        let pcm = sfx_pcm(&ram, 0, 0.5).unwrap();
        assert_eq!(pcm.len(), SAMPLE_RATE as usize / 2);
    }

    #[test]
    fn sheet_scales() {
        let mut ram = Ram::default();
        ram.write8(ram::SPRITES, 0x87);
        let sheet = sprite_sheet(&mut ram, 2).unwrap();
        assert_eq!(sheet.dimensions(), (256, 256));
        assert_ne!(sheet.get_pixel(0, 0), sheet.get_pixel(2, 0));
        assert_eq!(sheet.get_pixel(0, 0), sheet.get_pixel(1, 1));
        assert!(sprite_sheet(&mut ram, 0).is_err());
    }

    #[test]
    fn map_places_tiles() {
        let mut ram = Ram::default();
        // sprite 1 is solid color 9
        for y in 0..8 {
            for x in 8..16 {
                ram::set_pixel(ram.sprites_mut(), x, y, 9);
            }
        }
        ram.write8(ram::MAP + 127, 1);
        let map = tile_map(&mut ram, 0).unwrap();
        assert_eq!(map.dimensions(), (1024, 512));
        assert_ne!(map.get_pixel(127 * 8, 0), map.get_pixel(0, 0));
    }
}
