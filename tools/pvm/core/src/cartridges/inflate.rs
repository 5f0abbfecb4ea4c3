//! Raw DEFLATE (RFC 1951) decoder. Zlib framing is handled by the caller.

use crate::error::InflateError;

const LEN_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31,
    35, 43, 51, 59, 67, 83, 99, 115, 131, 163, 195, 227, 258,
];
const LEN_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2,
    3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193,
    257, 385, 513, 769, 1025, 1537, 2049, 3073, 4097, 6145,
    8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6,
    7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13, 13,
];

/// Order in which code length code lengths are sent in a dynamic block header.
const CL_ORDER: [usize; 19] = [16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];

struct BitReader<'a> {
    src: &'a [u8],
    pos: usize,
    bits: u32,
    nbits: u32,
}

impl<'a> BitReader<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self { src, pos: 0, bits: 0, nbits: 0 }
    }

    /// Reads `n` (at most 16) bits, least significant first.
    fn bits(&mut self, n: u32) -> Result<u32, InflateError> {
        while self.nbits < n {
            let byte = *self.src.get(self.pos).ok_or(InflateError::Truncated)?;
            self.pos += 1;
            self.bits |= (byte as u32) << self.nbits;
            self.nbits += 8;
        }
        let v = self.bits & ((1u32 << n) - 1);
        self.bits >>= n;
        self.nbits -= n;
        Ok(v)
    }

    /// Drops the rest of the current byte.
    fn align(&mut self) {
        let skip = self.nbits & 7;
        self.bits >>= skip;
        self.nbits -= skip;
    }

    fn byte(&mut self) -> Result<u8, InflateError> {
        self.bits(8).map(|b| b as u8)
    }
}

/// Canonical Huffman code stored as per-length counts plus symbols sorted by code.
struct Huffman {
    counts: [u16; 16],
    symbols: [u16; 320],
}

impl Huffman {
    fn new(lengths: &[u8]) -> Self {
        let mut h = Huffman { counts: [0; 16], symbols: [0; 320] };
        for &len in lengths {
            h.counts[len as usize & 15] += 1;
        }
        h.counts[0] = 0;

        let mut offsets = [0u16; 16];
        for len in 1..16 {
            offsets[len] = offsets[len - 1] + h.counts[len - 1];
        }
        for (sym, &len) in lengths.iter().enumerate() {
            if len != 0 {
                let slot = &mut offsets[len as usize & 15];
                h.symbols[*slot as usize] = sym as u16;
                *slot += 1;
            }
        }
        h
    }

    fn decode(&self, r: &mut BitReader) -> Result<u16, InflateError> {
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..16 {
            code |= r.bits(1)? as i32;
            let count = self.counts[len] as i32;
            if code - first < count {
                return Ok(self.symbols[(index + code - first) as usize]);
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }
        Err(InflateError::BadCode)
    }
}

fn fixed_tables() -> (Huffman, Huffman) {
    let mut lengths = [0u8; 288];
    lengths[..144].fill(8);
    lengths[144..256].fill(9);
    lengths[256..280].fill(7);
    lengths[280..].fill(8);
    (Huffman::new(&lengths), Huffman::new(&[5u8; 30]))
}

fn dynamic_tables(r: &mut BitReader) -> Result<(Huffman, Huffman), InflateError> {
    let hlit = r.bits(5)? as usize + 257;
    let hdist = r.bits(5)? as usize + 1;
    let hclen = r.bits(4)? as usize + 4;
    if hlit > 286 || hdist > 30 {
        return Err(InflateError::BadSymbol(hlit as u16));
    }

    let mut cl_lengths = [0u8; 19];
    for &slot in CL_ORDER.iter().take(hclen) {
        cl_lengths[slot] = r.bits(3)? as u8;
    }
    let cl = Huffman::new(&cl_lengths);

    let mut lengths = [0u8; 320];
    let total = hlit + hdist;
    let mut i = 0;
    while i < total {
        let sym = cl.decode(r)?;
        let (value, repeat) = match sym {
            0..=15 => (sym as u8, 1),
            16 => {
                let prev = *lengths[..i].last().ok_or(InflateError::BadRepeat)?;
                (prev, r.bits(2)? as usize + 3)
            }
            17 => (0, r.bits(3)? as usize + 3),
            _ => (0, r.bits(7)? as usize + 11),
        };
        if i + repeat > total {
            return Err(InflateError::BadRepeat);
        }
        lengths[i..i + repeat].fill(value);
        i += repeat;
    }

    Ok((Huffman::new(&lengths[..hlit]), Huffman::new(&lengths[hlit..total])))
}

fn inflate_block(
    r: &mut BitReader,
    out: &mut [u8],
    pos: &mut usize,
    lit: &Huffman,
    dist: &Huffman,
) -> Result<(), InflateError> {
    loop {
        let sym = lit.decode(r)?;
        match sym {
            0..=255 => {
                let cap = out.len();
                let slot = out.get_mut(*pos).ok_or(InflateError::Overflow(cap))?;
                *slot = sym as u8;
                *pos += 1;
            }
            256 => return Ok(()),
            _ => {
                let li = (sym - 257) as usize;
                if li >= LEN_BASE.len() {
                    return Err(InflateError::BadSymbol(sym));
                }
                let length = LEN_BASE[li] as usize + r.bits(LEN_EXTRA[li] as u32)? as usize;

                let di = dist.decode(r)? as usize;
                if di >= DIST_BASE.len() {
                    return Err(InflateError::BadSymbol(di as u16));
                }
                let distance = DIST_BASE[di] as usize + r.bits(DIST_EXTRA[di] as u32)? as usize;

                if distance > *pos {
                    return Err(InflateError::Distance { distance, produced: *pos });
                }
                if *pos + length > out.len() {
                    return Err(InflateError::Overflow(out.len()));
                }
                for _ in 0..length {
                    out[*pos] = out[*pos - distance];
                    *pos += 1;
                }
            }
        }
    }
}

/// Inflates `src` into `out`, returning the number of bytes produced.
/// Output that would not fit in `out` is an error.
pub fn inflate(src: &[u8], out: &mut [u8]) -> Result<usize, InflateError> {
    let mut r = BitReader::new(src);
    let mut pos = 0;

    loop {
        let last = r.bits(1)? == 1;
        match r.bits(2)? {
            0 => {
                r.align();
                let len = r.byte()? as u16 | (r.byte()? as u16) << 8;
                let nlen = r.byte()? as u16 | (r.byte()? as u16) << 8;
                if len != !nlen {
                    return Err(InflateError::StoredLength { len });
                }
                for _ in 0..len {
                    let b = r.byte()?;
                    let cap = out.len();
                    let slot = out.get_mut(pos).ok_or(InflateError::Overflow(cap))?;
                    *slot = b;
                    pos += 1;
                }
            }
            1 => {
                let (lit, dist) = fixed_tables();
                inflate_block(&mut r, out, &mut pos, &lit, &dist)?;
            }
            2 => {
                let (lit, dist) = dynamic_tables(&mut r)?;
                inflate_block(&mut r, out, &mut pos, &lit, &dist)?;
            }
            t => return Err(InflateError::BlockType(t as u8)),
        }

        if last {
            return Ok(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_block() {
        // final stored block holding "hi"
        let src = [0x01, 0x02, 0x00, 0xFD, 0xFF, b'h', b'i'];
        let mut out = [0u8; 4];
        assert_eq!(inflate(&src, &mut out), Ok(2));
        assert_eq!(&out[..2], b"hi");
    }

    #[test]
    fn stored_block_with_bad_complement() {
        let src = [0x01, 0x02, 0x00, 0x00, 0x00, b'h', b'i'];
        let mut out = [0u8; 4];
        assert_eq!(inflate(&src, &mut out), Err(InflateError::StoredLength { len: 2 }));
    }

    #[test]
    fn fixed_block_empty() {
        // BFINAL=1, BTYPE=01, then end-of-block (7 zero bits)
        let src = [0x03, 0x00];
        let mut out = [0u8; 1];
        assert_eq!(inflate(&src, &mut out), Ok(0));
    }

    #[test]
    fn reserved_block_type() {
        let src = [0x07];
        let mut out = [0u8; 1];
        assert_eq!(inflate(&src, &mut out), Err(InflateError::BlockType(3)));
    }

    #[test]
    fn output_capacity_is_enforced() {
        let src = [0x01, 0x02, 0x00, 0xFD, 0xFF, b'h', b'i'];
        let mut out = [0u8; 1];
        assert_eq!(inflate(&src, &mut out), Err(InflateError::Overflow(1)));
    }

    #[test]
    fn fixed_literal_respects_capacity() {
        // zlib's fixed-huffman encoding of "a"
        let src = [0x4B, 0x04, 0x00];
        let mut out = [0u8; 1];
        assert_eq!(inflate(&src, &mut out), Ok(1));
        assert_eq!(out, [b'a']);
        assert_eq!(inflate(&src, &mut []), Err(InflateError::Overflow(0)));
    }

    #[test]
    fn truncated_input() {
        let src = [0x01, 0x05, 0x00, 0xFA, 0xFF, b'h'];
        let mut out = [0u8; 8];
        assert_eq!(inflate(&src, &mut out), Err(InflateError::Truncated));
    }
}
