//! Minimal PNG decoder for 8-bit RGBA carts, and the LSB payload extractor.

use alloc::vec;
use alloc::vec::Vec;
use log::debug;

use super::inflate::inflate;
use crate::error::PngError;

pub const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const MAX_DIMENSION: u32 = 16384;
/// Carts are 160x205; anything far larger is not a cart and is refused
/// before the inflate buffer is allocated.
const MAX_PIXELS: u64 = 512 * 512;
const COLOR_RGBA: u8 = 6;
const MAX_DEFLATE_RATIO: usize = 1032;

/// Bytes hidden in a cart image: 0x8000 of memory plus the version byte.
pub const PAYLOAD_SIZE: usize = 0x8001;

pub struct Image {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA, four bytes per pixel.
    pub rgba: Vec<u8>,
}

struct Header {
    width: u32,
    height: u32,
}

fn be32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn parse_header(data: &[u8]) -> Result<Header, PngError> {
    if data.len() < 13 {
        return Err(PngError::MissingHeader);
    }
    let width = be32(&data[0..4]);
    let height = be32(&data[4..8]);
    let (depth, color, interlace) = (data[8], data[9], data[12]);

    if depth != 8 || color != COLOR_RGBA || interlace != 0 {
        return Err(PngError::Unsupported { depth, color, interlace });
    }
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(PngError::Dimensions { width, height });
    }
    if width as u64 * height as u64 > MAX_PIXELS {
        return Err(PngError::Dimensions { width, height });
    }
    Ok(Header { width, height })
}

fn check_zlib(cmf: u8, flg: u8) -> Result<(), PngError> {
    let checksum_ok = ((cmf as u16) << 8 | flg as u16) % 31 == 0;
    if cmf & 0x0F != 8 || !checksum_ok || flg & 0x20 != 0 {
        return Err(PngError::ZlibHeader(cmf, flg));
    }
    Ok(())
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Reverses the per-scanline filters of `raw` (filter byte + row) into RGBA.
fn unfilter(raw: &[u8], width: usize, height: usize) -> Result<Vec<u8>, PngError> {
    const BPP: usize = 4;
    let stride = width * BPP;
    let mut pixels = vec![0u8; stride * height];

    for y in 0..height {
        let line = &raw[y * (stride + 1)..(y + 1) * (stride + 1)];
        let filter = line[0];
        let src = &line[1..];

        let (done, rest) = pixels.split_at_mut(y * stride);
        let prev = if y > 0 { Some(&done[(y - 1) * stride..]) } else { None };
        let row = &mut rest[..stride];

        for x in 0..stride {
            let a = if x >= BPP { row[x - BPP] } else { 0 };
            let b = prev.map_or(0, |p| p[x]);
            let c = if x >= BPP { prev.map_or(0, |p| p[x - BPP]) } else { 0 };
            let predicted = match filter {
                0 => 0,
                1 => a,
                2 => b,
                3 => ((a as u16 + b as u16) / 2) as u8,
                4 => paeth(a, b, c),
                f => return Err(PngError::Filter(f)),
            };
            row[x] = src[x].wrapping_add(predicted);
        }
    }

    Ok(pixels)
}

pub fn decode(file: &[u8]) -> Result<Image, PngError> {
    if !file.starts_with(&SIGNATURE) {
        return Err(PngError::Signature);
    }

    let mut header = None;
    let mut idat = Vec::new();
    let mut pos = SIGNATURE.len();

    while pos + 8 <= file.len() {
        let len = be32(&file[pos..]) as usize;
        let kind = &file[pos + 4..pos + 8];
        let body_start = pos + 8;
        let body_end = body_start
            .checked_add(len)
            .filter(|&end| end.checked_add(4).is_some_and(|crc_end| crc_end <= file.len()))
            .ok_or(PngError::Chunk(pos))?;
        let body = &file[body_start..body_end];

        match kind {
            b"IHDR" => header = Some(parse_header(body)?),
            b"IDAT" => idat.extend_from_slice(body),
            b"IEND" => break,
            _ => {}
        }
        pos = body_end + 4;
    }

    let header = header.ok_or(PngError::MissingHeader)?;
    if idat.len() < 6 {
        return Err(PngError::MissingData);
    }
    check_zlib(idat[0], idat[1])?;

    let (width, height) = (header.width as usize, header.height as usize);
    let expected = (width * 4 + 1) * height;
    // deflate expands at most ~1032:1
    if expected / MAX_DEFLATE_RATIO > idat.len() {
        return Err(PngError::Dimensions { width: header.width, height: header.height });
    }
    let mut raw = vec![0u8; expected];
    let actual = inflate(&idat[2..], &mut raw)?;
    if actual != expected {
        return Err(PngError::SizeMismatch { expected, actual });
    }

    debug!(target: "cart", "png {}x{}, {} compressed bytes", width, height, idat.len());
    let rgba = unfilter(&raw, width, height)?;
    Ok(Image { width: header.width, height: header.height, rgba })
}

/// Collects one byte per pixel from the two low bits of A, R, G and B.
pub fn extract_payload(image: &Image) -> Vec<u8> {
    let mut out = vec![0u8; PAYLOAD_SIZE];
    for (dst, px) in out.iter_mut().zip(image.rgba.chunks_exact(4)) {
        let (r, g, b, a) = (px[0], px[1], px[2], px[3]);
        *dst = (a & 3) << 6 | (r & 3) << 4 | (g & 3) << 2 | (b & 3);
    }
    out
}
