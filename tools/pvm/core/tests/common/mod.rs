//! Shared fixtures: a tiny command-script engine and cart builders.
#![allow(dead_code)]

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};
use pvm_core::cartridges::codec::{LEGACY_MAGIC, PXA_MAGIC};
use pvm_core::cartridges::png::{PAYLOAD_SIZE, SIGNATURE};
use pvm_core::strings::tonum;
use pvm_core::{Api, Fix32, ScriptEngine, ScriptError, Vm, VmConfig};

#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Num(Fix32),
    Str(Vec<u8>),
    Nil,
}

#[derive(Clone, Debug)]
pub struct Call {
    pub name: String,
    pub args: Vec<Arg>,
}

/// Understands just enough of the cart language for tests: comments,
/// `function NAME() ... end` blocks and calls with literal arguments.
/// Top-level calls run on load.
#[derive(Default)]
pub struct TinyEngine {
    functions: Vec<(String, Vec<Call>)>,
}

fn split_args(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_str = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_str = !in_str,
            ',' if !in_str => {
                out.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = s[start..].trim();
    if !last.is_empty() || !out.is_empty() {
        out.push(last);
    }
    out
}

fn parse_call(line: &str, lineno: usize) -> Result<Call, ScriptError> {
    let syntax = || ScriptError::Compile(format!("line {}: syntax error near '{}'", lineno, line));
    let open = line.find('(').ok_or_else(syntax)?;
    let inner = line[open + 1..].strip_suffix(')').ok_or_else(syntax)?;
    let name = line[..open].trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(syntax());
    }

    let args = split_args(inner)
        .into_iter()
        .map(|a| {
            if a == "nil" {
                Ok(Arg::Nil)
            } else if let Some(s) = a.strip_prefix('"').and_then(|a| a.strip_suffix('"')) {
                Ok(Arg::Str(s.as_bytes().to_vec()))
            } else {
                tonum(a.as_bytes()).map(Arg::Num).ok_or_else(syntax)
            }
        })
        .collect::<Result<_, _>>()?;
    Ok(Call { name: name.to_string(), args })
}

fn num(args: &[Arg], i: usize) -> Option<Fix32> {
    match args.get(i) {
        Some(Arg::Num(n)) => Some(*n),
        _ => None,
    }
}

fn req(args: &[Arg], i: usize, name: &str) -> Result<Fix32, ScriptError> {
    num(args, i).ok_or_else(|| ScriptError::Runtime(format!("bad argument #{} to '{}'", i + 1, name)))
}

fn text(args: &[Arg], i: usize) -> Vec<u8> {
    match args.get(i) {
        Some(Arg::Str(s)) => s.clone(),
        Some(Arg::Num(n)) => n.to_string().into_bytes(),
        _ => Vec::new(),
    }
}

fn exec(call: &Call, api: &mut Api<'_>) -> Result<(), ScriptError> {
    let a = &call.args;
    let n = |i| num(a, i);
    let name = call.name.as_str();
    match name {
        "cls" => api.cls(n(0)),
        "pset" => api.pset(req(a, 0, name)?, req(a, 1, name)?, n(2)),
        "line" => {
            let nums: Vec<Fix32> = a.iter().filter_map(|v| match v {
                Arg::Num(n) => Some(*n),
                _ => None,
            }).collect();
            api.line(&nums)
        }
        "rect" => api.rect(req(a, 0, name)?, req(a, 1, name)?, req(a, 2, name)?, req(a, 3, name)?, n(4)),
        "rectfill" => api.rectfill(req(a, 0, name)?, req(a, 1, name)?, req(a, 2, name)?, req(a, 3, name)?, n(4)),
        "circ" => api.circ(req(a, 0, name)?, req(a, 1, name)?, n(2), n(3)),
        "circfill" => api.circfill(req(a, 0, name)?, req(a, 1, name)?, n(2), n(3)),
        "spr" => api.spr(req(a, 0, name)?, req(a, 1, name)?, req(a, 2, name)?, n(3), n(4), false, false),
        "map" => api.map(n(0), n(1), n(2), n(3), n(4), n(5), n(6)),
        "print" => {
            api.print(&text(a, 0), n(1), n(2), n(3));
        }
        "printh" => api.printh(&text(a, 0)),
        "color" => api.color(n(0)),
        "camera" => api.camera(n(0), n(1)),
        "clip" => api.clip(n(0), n(1), n(2), n(3)),
        "pal" => api.pal(n(0), n(1), n(2)),
        "fillp" => api.fillp(n(0)),
        "poke" => {
            let values: Vec<Fix32> = (1..a.len()).filter_map(n).collect();
            api.poke(req(a, 0, name)?, &values)
        }
        "memset" => api.memset(req(a, 0, name)?, req(a, 1, name)?, req(a, 2, name)?),
        "dset" => api.dset(req(a, 0, name)?, req(a, 1, name)?),
        "sfx" => api.sfx(req(a, 0, name)?, n(1), n(2), n(3)),
        "music" => api.music(req(a, 0, name)?, n(1), n(2)),
        "srand" => api.srand(req(a, 0, name)?),
        "reload" => api.reload(n(0), n(1), n(2)),
        "error" => return Err(ScriptError::Runtime(String::from_utf8_lossy(&text(a, 0)).into_owned())),
        "halt" => return Err(ScriptError::Runtime(String::new())),
        _ => return Err(ScriptError::Runtime(format!("attempt to call nil value '{}'", name))),
    }
    Ok(())
}

impl ScriptEngine for TinyEngine {
    type Hook = usize;

    fn load(&mut self, source: &[u8], api: &mut Api<'_>) -> Result<(), ScriptError> {
        let source = String::from_utf8_lossy(source);
        let mut top = Vec::new();
        let mut current: Option<(String, Vec<Call>)> = None;

        for (i, line) in source.lines().enumerate() {
            let line = line.split("--").next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("function ") {
                let name = rest.trim().trim_end_matches("()").trim();
                current = Some((name.to_string(), Vec::new()));
            } else if line == "end" {
                let f = current
                    .take()
                    .ok_or_else(|| ScriptError::Compile(format!("line {}: 'end' without function", i + 1)))?;
                self.functions.push(f);
            } else {
                let call = parse_call(line, i + 1)?;
                match &mut current {
                    Some((_, body)) => body.push(call),
                    None => top.push(call),
                }
            }
        }
        if current.is_some() {
            return Err(ScriptError::Compile("'end' expected".into()));
        }

        top.iter().try_for_each(|call| exec(call, api))
    }

    fn resolve(&mut self, name: &str) -> Option<usize> {
        self.functions.iter().position(|(n, _)| n == name)
    }

    fn call(&mut self, hook: usize, api: &mut Api<'_>) -> Result<(), ScriptError> {
        for call in &self.functions[hook].1 {
            exec(call, api)?;
        }
        Ok(())
    }
}

pub fn tiny_vm() -> Vm<TinyEngine> {
    Vm::new(VmConfig::default(), || Ok(TinyEngine::default()))
}

/// A text cart with the given script and extra raw sections.
pub fn text_cart(script: &str, sections: &str) -> Vec<u8> {
    format!("pico-8 cartridge // http://www.pico-8.com\nversion 41\n__lua__\n{}\n{}", script, sections)
        .into_bytes()
}

// code compressors

fn code_header(magic: &[u8; 4], declared: usize, compressed: usize) -> Vec<u8> {
    let mut v = magic.to_vec();
    v.extend_from_slice(&(declared as u16).to_be_bytes());
    v.extend_from_slice(&(compressed as u16).to_be_bytes());
    v
}

const LEGACY_LUT: &[u8] = b"\n 0123456789abcdefghijklmnopqrstuvwxyz!#%(){}[]<>+=/*:;.,~_";

fn longest_match(text: &[u8], pos: usize, max_offset: usize, max_len: usize) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for offset in 1..=max_offset.min(pos) {
        let len = (0..max_len.min(text.len() - pos))
            .take_while(|&k| text[pos + k] == text[pos + k - offset])
            .count();
        if len > best.map_or(0, |b| b.1) {
            best = Some((offset, len));
        }
    }
    best
}

/// Greedy encoder for the `:c:` format.
pub fn compress_legacy(text: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        match longest_match(text, pos, 3135, 17) {
            Some((offset, len)) if len >= 3 => {
                body.push(0x3C + (offset >> 4) as u8);
                body.push(((len - 2) << 4) as u8 | (offset & 0x0F) as u8);
                pos += len;
            }
            _ => {
                let c = text[pos];
                match LEGACY_LUT.iter().position(|&l| l == c) {
                    Some(i) => body.push(i as u8 + 1),
                    None => body.extend_from_slice(&[0, c]),
                }
                pos += 1;
            }
        }
    }
    let mut out = code_header(LEGACY_MAGIC, text.len(), 0);
    out.extend(body);
    out
}

#[derive(Default)]
struct BitWriter {
    bytes: Vec<u8>,
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
}

/// Greedy encoder for the `pxa` format: move-to-front literals and 15-bit
/// back-references.
pub fn compress_pxa(text: &[u8]) -> Vec<u8> {
    let mut mtf: Vec<u8> = (0..=255).collect();
    let mut w = BitWriter::default();
    let mut pos = 0;

    while pos < text.len() {
        match longest_match(text, pos, 0x7FFF, 64) {
            Some((offset, len)) if len >= 3 => {
                w.push(0, 1);
                w.push(0, 1);
                w.push(offset as u32 - 1, 15);
                let mut rest = len - 3;
                loop {
                    let chunk = rest.min(7);
                    w.push(chunk as u32, 3);
                    rest -= chunk;
                    if chunk != 7 {
                        break;
                    }
                }
                pos += len;
            }
            _ => {
                let c = text[pos];
                let index = mtf.iter().position(|&m| m == c).unwrap_or(0) as u32;
                mtf.remove(index as usize);
                mtf.insert(0, c);

                w.push(1, 1);
                let mut unary = 0;
                while index >= ((1 << (unary + 1)) - 1) << 4 {
                    unary += 1;
                }
                for _ in 0..unary {
                    w.push(1, 1);
                }
                w.push(0, 1);
                w.push(index - (((1 << unary) - 1) << 4), 4 + unary);
                pos += 1;
            }
        }
    }

    let mut out = code_header(PXA_MAGIC, text.len(), w.bytes.len() + 8);
    out.extend(w.bytes);
    out
}

// png carts

pub const CART_WIDTH: u32 = 160;
pub const CART_HEIGHT: u32 = 205;

fn chunk(out: &mut Vec<u8>, kind: &[u8; 4], body: &[u8]) {
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(body);
    out.extend_from_slice(&crc.sum().to_be_bytes());
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let (pa, pb, pc) = ((p - a as i16).abs(), (p - b as i16).abs(), (p - c as i16).abs());
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Encodes an RGBA image, cycling through all five scanline filters.
pub fn encode_png(width: u32, height: u32, rgba: &[u8]) -> Vec<u8> {
    let stride = width as usize * 4;
    let mut raw = Vec::with_capacity((stride + 1) * height as usize);
    for y in 0..height as usize {
        let filter = (y % 5) as u8;
        raw.push(filter);
        let row = &rgba[y * stride..(y + 1) * stride];
        for x in 0..stride {
            let a = if x >= 4 { row[x - 4] } else { 0 };
            let b = if y > 0 { rgba[(y - 1) * stride + x] } else { 0 };
            let c = if y > 0 && x >= 4 { rgba[(y - 1) * stride + x - 4] } else { 0 };
            let predicted = match filter {
                0 => 0,
                1 => a,
                2 => b,
                3 => ((a as u16 + b as u16) / 2) as u8,
                _ => paeth(a, b, c),
            };
            raw.push(row[x].wrapping_sub(predicted));
        }
    }

    let mut z = ZlibEncoder::new(Vec::new(), Compression::default());
    z.write_all(&raw).unwrap();
    let idat = z.finish().unwrap();

    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);

    let mut out = SIGNATURE.to_vec();
    chunk(&mut out, b"IHDR", &ihdr);
    chunk(&mut out, b"IDAT", &idat);
    chunk(&mut out, b"IEND", &[]);
    out
}

/// Hides `payload` in the two low bits of each channel of a cart image.
pub fn png_cart(payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= PAYLOAD_SIZE);
    let pixels = (CART_WIDTH * CART_HEIGHT) as usize;
    let mut rgba = Vec::with_capacity(pixels * 4);
    for i in 0..pixels {
        let b = payload.get(i).copied().unwrap_or(0);
        // label art in the high bits, data in the low bits
        let art = (i as u8).wrapping_mul(37) & 0xFC;
        rgba.push(art | (b >> 4) & 3);
        rgba.push(art | (b >> 2) & 3);
        rgba.push(art | b & 3);
        rgba.push(0xFC | (b >> 6) & 3);
    }
    encode_png(CART_WIDTH, CART_HEIGHT, &rgba)
}

/// A full payload: memory image bytes, `code` at the script offset, and a version byte.
pub fn payload_with_code(code: &[u8], version: u8) -> Vec<u8> {
    let mut payload = vec![0u8; PAYLOAD_SIZE];
    payload[0x4300..0x4300 + code.len()].copy_from_slice(code);
    payload[0x8000] = version;
    payload
}
