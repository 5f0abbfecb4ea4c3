//! Decompressors for the script region of a PNG cart.
//!
//! Every decoder writes into a caller-supplied buffer and stops once that
//! buffer or the declared length is full, whichever comes first.

use crate::error::CodecError;
use log::debug;

pub const PXA_MAGIC: &[u8; 4] = b"\0pxa";
pub const LEGACY_MAGIC: &[u8; 4] = b":c:\0";

const HEADER_LEN: usize = 8;

/// Symbol table of the legacy format, indexed by byte value minus one.
const LEGACY_LUT: &[u8] = b"\n 0123456789abcdefghijklmnopqrstuvwxyz!#%(){}[]<>+=/*:;.,~_";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CodeFormat {
    /// Plain NUL-terminated text.
    Raw,
    /// `:c:\0` byte-oriented LZ over a fixed alphabet.
    Legacy,
    /// `\0pxa` bit stream with move-to-front literals.
    Pxa,
}

impl CodeFormat {
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(PXA_MAGIC) {
            Some(CodeFormat::Pxa)
        } else if data.starts_with(LEGACY_MAGIC) {
            Some(CodeFormat::Legacy)
        } else {
            match data.first() {
                Some(0x20..=0x7E) | Some(b'\n') | Some(b'\r') | Some(b'\t') => Some(CodeFormat::Raw),
                _ => None,
            }
        }
    }
}

/// Decodes `data` in whichever format it is in.
pub fn decompress(format: CodeFormat, data: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
    match format {
        CodeFormat::Raw => Ok(copy_raw(data, out)),
        CodeFormat::Legacy => decompress_legacy(data, out),
        CodeFormat::Pxa => decompress_pxa(data, out),
    }
}

fn declared_len(data: &[u8]) -> Result<usize, CodecError> {
    if data.len() < HEADER_LEN {
        return Err(CodecError::Header);
    }
    Ok((data[4] as usize) << 8 | data[5] as usize)
}

/// Copies text up to the first NUL.
pub fn copy_raw(data: &[u8], out: &mut [u8]) -> usize {
    let len = data.iter().position(|&b| b == 0).unwrap_or(data.len()).min(out.len());
    out[..len].copy_from_slice(&data[..len]);
    len
}

pub fn decompress_legacy(data: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
    let declared = declared_len(data)?;
    let limit = declared.min(out.len());
    let mut src = data[HEADER_LEN..].iter().copied();
    let mut pos = 0;

    while pos < limit {
        let b = src.next().ok_or(CodecError::Truncated { declared })?;
        match b {
            0 => {
                out[pos] = src.next().ok_or(CodecError::Truncated { declared })?;
                pos += 1;
            }
            0x01..=0x3B => {
                out[pos] = LEGACY_LUT.get(b as usize - 1).copied().unwrap_or(b' ');
                pos += 1;
            }
            _ => {
                let next = src.next().ok_or(CodecError::Truncated { declared })?;
                let offset = ((b as usize - 0x3C) << 4) | (next as usize & 0x0F);
                let length = (next as usize >> 4) + 2;
                if offset == 0 || offset > pos {
                    return Err(CodecError::BadOffset { offset, produced: pos });
                }
                for _ in 0..length {
                    if pos >= limit {
                        break;
                    }
                    out[pos] = out[pos - offset];
                    pos += 1;
                }
            }
        }
    }

    debug!(target: "cart", "legacy code: {} of {} bytes", pos, declared);
    Ok(pos)
}

/// LSB-first bit reader over the pxa stream.
struct Bits<'a> {
    data: &'a [u8],
    bit: usize,
    declared: usize,
}

impl<'a> Bits<'a> {
    fn one(&mut self) -> Result<u32, CodecError> {
        let byte = self
            .data
            .get(self.bit >> 3)
            .ok_or(CodecError::Truncated { declared: self.declared })?;
        let v = (byte >> (self.bit & 7)) & 1;
        self.bit += 1;
        Ok(v as u32)
    }

    fn read(&mut self, n: u32) -> Result<u32, CodecError> {
        let mut v = 0;
        for i in 0..n {
            v |= self.one()? << i;
        }
        Ok(v)
    }
}

pub fn decompress_pxa(data: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
    let declared = declared_len(data)?;
    let limit = declared.min(out.len());
    let mut bits = Bits { data: &data[HEADER_LEN..], bit: 0, declared };

    let mut mtf = [0u8; 256];
    for (i, m) in mtf.iter_mut().enumerate() {
        *m = i as u8;
    }

    let mut pos = 0;
    while pos < limit {
        if bits.one()? == 1 {
            let mut unary = 0;
            while bits.one()? == 1 {
                unary += 1;
                if unary > 4 {
                    return Err(CodecError::BadIndex(((1 << unary) - 1) << 4));
                }
            }
            let index = bits.read(4 + unary)? as usize + (((1usize << unary) - 1) << 4);
            if index >= mtf.len() {
                return Err(CodecError::BadIndex(index));
            }
            let byte = mtf[index];
            mtf.copy_within(0..index, 1);
            mtf[0] = byte;
            out[pos] = byte;
            pos += 1;
            continue;
        }

        let offset_bits = if bits.one()? == 1 {
            if bits.one()? == 1 { 5 } else { 10 }
        } else {
            15
        };
        let offset = bits.read(offset_bits)? as usize + 1;

        if offset_bits == 10 && offset == 1 {
            // uncompressed run, zero terminated
            loop {
                let b = bits.read(8)? as u8;
                if b == 0 || pos >= limit {
                    break;
                }
                out[pos] = b;
                pos += 1;
            }
            continue;
        }

        let mut length = 3;
        loop {
            let chunk = bits.read(3)? as usize;
            length += chunk;
            if chunk != 7 {
                break;
            }
        }

        if offset > pos {
            return Err(CodecError::BadOffset { offset, produced: pos });
        }
        for _ in 0..length {
            if pos >= limit {
                break;
            }
            out[pos] = out[pos - offset];
            pos += 1;
        }
    }

    debug!(target: "cart", "pxa code: {} of {} bytes", pos, declared);
    Ok(pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy(declared: u16, body: &[u8]) -> alloc::vec::Vec<u8> {
        let mut v = LEGACY_MAGIC.to_vec();
        v.extend_from_slice(&declared.to_be_bytes());
        v.extend_from_slice(&[0, 0]);
        v.extend_from_slice(body);
        v
    }

    #[test]
    fn detects_formats() {
        assert_eq!(CodeFormat::detect(b"\0pxa\0\0"), Some(CodeFormat::Pxa));
        assert_eq!(CodeFormat::detect(b":c:\0"), Some(CodeFormat::Legacy));
        assert_eq!(CodeFormat::detect(b"print(1)"), Some(CodeFormat::Raw));
        assert_eq!(CodeFormat::detect(&[0xFF, 0]), None);
        assert_eq!(CodeFormat::detect(&[]), None);
    }

    #[test]
    fn raw_stops_at_nul_and_capacity() {
        let mut out = [0u8; 16];
        assert_eq!(copy_raw(b"cls()\0junk", &mut out), 5);
        assert_eq!(&out[..5], b"cls()");
        let mut small = [0u8; 3];
        assert_eq!(copy_raw(b"cls()", &mut small), 3);
    }

    #[test]
    fn legacy_lut_escape_and_backref() {
        // "ab" via lut, escaped '?', then copy "ab?" with offset 3 length 3
        let a = 1 + LEGACY_LUT.iter().position(|&c| c == b'a').unwrap() as u8;
        let b = a + 1;
        let data = legacy(6, &[a, b, 0, b'?', 0x3C, 0x13]);
        let mut out = [0u8; 16];
        assert_eq!(decompress_legacy(&data, &mut out), Ok(6));
        assert_eq!(&out[..6], b"ab?ab?");
    }

    #[test]
    fn legacy_rejects_offset_past_output() {
        let data = legacy(4, &[0x3C, 0x05]);
        let mut out = [0u8; 8];
        assert_eq!(
            decompress_legacy(&data, &mut out),
            Err(CodecError::BadOffset { offset: 5, produced: 0 })
        );
    }

    #[test]
    fn legacy_truncated_escape() {
        let data = legacy(4, &[0]);
        let mut out = [0u8; 8];
        assert_eq!(decompress_legacy(&data, &mut out), Err(CodecError::Truncated { declared: 4 }));
    }

    #[test]
    fn short_header() {
        let mut out = [0u8; 8];
        assert_eq!(decompress_pxa(b"\0pxa", &mut out), Err(CodecError::Header));
    }

    #[test]
    fn pxa_literals_and_copy() {
        // literal 'a' (index 97), then a 5-bit back-reference offset 1 length 3
        let mut w = BitWriter::default();
        w.literal(97);
        w.push(0, 1);
        w.push(1, 1);
        w.push(1, 1);
        w.push(0, 5);
        w.push(0, 3);

        let mut data = PXA_MAGIC.to_vec();
        data.extend_from_slice(&4u16.to_be_bytes());
        data.extend_from_slice(&[0, 0]);
        data.extend_from_slice(&w.bytes);

        let mut out = [0u8; 8];
        assert_eq!(decompress_pxa(&data, &mut out), Ok(4));
        assert_eq!(&out[..4], b"aaaa");
    }

    #[test]
    fn pxa_capacity_limits_output() {
        let mut w = BitWriter::default();
        w.literal(97);
        w.push(0, 1);
        w.push(1, 1);
        w.push(1, 1);
        w.push(0, 5);
        w.push(7, 3);
        w.push(0, 3);

        let mut data = PXA_MAGIC.to_vec();
        data.extend_from_slice(&100u16.to_be_bytes());
        data.extend_from_slice(&[0, 0]);
        data.extend_from_slice(&w.bytes);

        let mut out = [0u8; 5];
        assert_eq!(decompress_pxa(&data, &mut out), Ok(5));
    }

    #[derive(Default)]
    struct BitWriter {
        bytes: alloc::vec::Vec<u8>,
        bit: usize,
    }

    impl BitWriter {
        fn push(&mut self, v: u32, n: u32) {
            for i in 0..n {
                if self.bit % 8 == 0 {
                    self.bytes.push(0);
                }
                let last = self.bytes.len() - 1;
                self.bytes[last] |= (((v >> i) & 1) as u8) << (self.bit % 8);
                self.bit += 1;
            }
        }

        /// Emits an index into a fresh move-to-front table.
        fn literal(&mut self, index: u32) {
            self.push(1, 1);
            let mut unary = 0;
            while index >= ((1 << (unary + 1)) - 1) << 4 {
                unary += 1;
            }
            for _ in 0..unary {
                self.push(1, 1);
            }
            self.push(0, 1);
            self.push(index - (((1 << unary) - 1) << 4), 4 + unary);
        }
    }
}
