//! P8SCII byte-string helpers: one byte per character, 1-based indices.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::fix::Fix32;

/// Resolves a possibly negative 1-based index against `len`.
fn resolve(i: i32, len: i32) -> i32 {
    if i < 0 { len + i + 1 } else { i }
}

/// Substring from `i` to `j` inclusive; negative indices count from the end.
pub fn sub(s: &[u8], i: i32, j: Option<i32>) -> &[u8] {
    let len = s.len() as i32;
    let start = resolve(i, len).max(1);
    let end = resolve(j.unwrap_or(-1), len).min(len);
    if start > end {
        return &[];
    }
    &s[(start - 1) as usize..end as usize]
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Separator<'a> {
    Text(&'a [u8]),
    /// Fixed-size chunks; also used for the empty separator.
    Every(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Piece {
    Num(Fix32),
    Str(Vec<u8>),
}

fn piece(bytes: &[u8], convert: bool) -> Piece {
    match convert.then(|| tonum(bytes)).flatten() {
        Some(n) => Piece::Num(n),
        None => Piece::Str(bytes.to_vec()),
    }
}

/// Splits `s`, turning numeric pieces into numbers when `convert` is set.
pub fn split(s: &[u8], sep: Separator, convert: bool) -> Vec<Piece> {
    match sep {
        Separator::Text(sep) if !sep.is_empty() => {
            let mut out = Vec::new();
            let mut rest = s;
            while let Some(at) = rest.windows(sep.len()).position(|w| w == sep) {
                out.push(piece(&rest[..at], convert));
                rest = &rest[at + sep.len()..];
            }
            out.push(piece(rest, convert));
            out
        }
        Separator::Text(_) => s.chunks(1).map(|c| piece(c, convert)).collect(),
        Separator::Every(n) => s.chunks(n.max(1)).map(|c| piece(c, convert)).collect(),
    }
}

pub fn chr(codes: &[i32]) -> Vec<u8> {
    codes.iter().map(|&c| c as u8).collect()
}

/// Codes of `n` characters starting at 1-based `i`; `None` past either end.
pub fn ord(s: &[u8], i: i32, n: usize) -> Vec<Option<u8>> {
    let start = resolve(i, s.len() as i32);
    (0..n as i32)
        .map(|k| {
            let at = start + k;
            if at < 1 { None } else { s.get(at as usize - 1).copied() }
        })
        .collect()
}

pub fn tostr(v: Fix32, hex: bool) -> String {
    if hex {
        let mut s = String::new();
        // writing to a String cannot fail
        let _ = v.fmt_hex(&mut s);
        s
    } else {
        v.to_string()
    }
}

/// Decimal, `0x` hex or `0b` binary, with optional sign and fraction.
pub fn tonum(s: &[u8]) -> Option<Fix32> {
    let start = s.iter().position(|b| !b.is_ascii_whitespace())?;
    let end = s.iter().rposition(|b| !b.is_ascii_whitespace())? + 1;
    Fix32::parse(&s[start..end])
}
