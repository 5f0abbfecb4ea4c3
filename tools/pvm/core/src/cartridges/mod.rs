//! Cart loading: format detection, the two container formats, and save sidecars.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use log::{debug, info, warn};

use crate::error::LoadError;
use crate::ram::{self, Ram};

pub mod codec;
pub mod inflate;
pub mod png;
pub mod text;

pub use codec::CodeFormat;

/// Largest cart accepted, from disk or memory.
pub const MAX_CART_SIZE: usize = 1024 * 1024;

/// Offset of the compressed script inside a PNG payload.
const PNG_CODE: usize = ram::GENERAL;
const PNG_CODE_END: usize = 0x8000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CartFormat {
    Text,
    Png,
}

impl CartFormat {
    pub fn detect(data: &[u8]) -> Option<CartFormat> {
        if data.starts_with(&png::SIGNATURE[..4]) {
            Some(CartFormat::Png)
        } else if data.starts_with(text::HEADER) {
            Some(CartFormat::Text)
        } else {
            None
        }
    }
}

/// What the loader learned about the cart. `valid` is false after a failed load.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CartInfo {
    pub format: Option<CartFormat>,
    pub code_format: Option<CodeFormat>,
    /// Version byte stored after the memory image of a PNG cart.
    pub version: u8,
    pub script_len: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    pub valid: bool,
}

#[derive(Debug)]
pub struct LoadedCart {
    pub info: CartInfo,
    pub script: Vec<u8>,
}

/// First two `--` comment lines of a script, by convention title and author.
fn script_credits(script: &[u8]) -> (Option<String>, Option<String>) {
    let mut comments = script
        .split(|&b| b == b'\n')
        .take(2)
        .map_while(|line| line.strip_prefix(b"--"))
        .map(|c| String::from_utf8_lossy(c).trim().into());
    (comments.next(), comments.next())
}

fn load_png(data: &[u8], ram: &mut Ram, capacity: usize) -> Result<LoadedCart, LoadError> {
    let image = png::decode(data)?;
    let payload = png::extract_payload(&image);

    ram.bytes_mut()[..ram::ROM_SIZE].copy_from_slice(&payload[..ram::ROM_SIZE]);
    let version = payload[PNG_CODE_END];

    let code = &payload[PNG_CODE..PNG_CODE_END];
    let format = CodeFormat::detect(code).ok_or(LoadError::UnknownCodeFormat(code[0]))?;
    let mut script = vec![0u8; capacity];
    let len = codec::decompress(format, code, &mut script)?;
    script.truncate(len);

    debug!(target: "cart", "png cart v{}, {:?} code, {} bytes", version, format, len);
    Ok(LoadedCart {
        info: CartInfo {
            format: Some(CartFormat::Png),
            code_format: Some(format),
            version,
            script_len: len,
            ..CartInfo::default()
        },
        script,
    })
}

/// Decodes a cart image into `ram` and returns its script.
///
/// RAM may be partly written when this fails.
pub fn load_mem(data: &[u8], ram: &mut Ram, capacity: usize) -> Result<LoadedCart, LoadError> {
    if data.is_empty() {
        return Err(LoadError::Empty);
    }
    if data.len() > MAX_CART_SIZE {
        return Err(LoadError::TooLarge(data.len()));
    }

    let mut cart = match CartFormat::detect(data) {
        Some(CartFormat::Png) => load_png(data, ram, capacity)?,
        Some(CartFormat::Text) => {
            let script = text::parse(data, ram, capacity)?;
            LoadedCart {
                info: CartInfo {
                    format: Some(CartFormat::Text),
                    code_format: Some(CodeFormat::Raw),
                    script_len: script.len(),
                    ..CartInfo::default()
                },
                script,
            }
        }
        None => return Err(LoadError::UnknownFormat),
    };

    let (title, author) = script_credits(&cart.script);
    cart.info.title = title;
    cart.info.author = author;
    cart.info.valid = true;
    info!(target: "cart", "loaded {:?} cart, {} byte script", cart.info.format, cart.info.script_len);
    Ok(cart)
}

#[cfg(feature = "std")]
pub use self::files::*;

#[cfg(feature = "std")]
mod files {
    use super::*;
    use std::fs;
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};

    pub fn load_path(path: &Path, ram: &mut Ram, capacity: usize) -> Result<LoadedCart, LoadError> {
        let size = fs::metadata(path)?.len() as usize;
        if size > MAX_CART_SIZE {
            return Err(LoadError::TooLarge(size));
        }
        let data = fs::read(path)?;
        load_mem(&data, ram, capacity)
    }

    /// `game.p8.png` saves to `game.p8.png.sav`.
    pub fn save_path(cart: &Path) -> PathBuf {
        let mut name = cart.as_os_str().to_owned();
        name.push(".sav");
        PathBuf::from(name)
    }

    /// Copies a saved persistent region into RAM. A missing or short file
    /// counts as no save.
    pub fn read_save(cart: &Path, ram: &mut Ram) -> bool {
        let path = save_path(cart);
        match fs::read(&path) {
            Ok(data) if data.len() >= ram::PERSIST_SIZE => {
                ram.persistent_mut().copy_from_slice(&data[..ram::PERSIST_SIZE]);
                debug!(target: "cart", "restored {}", path.display());
                true
            }
            Ok(data) => {
                warn!(target: "cart", "ignoring {}: {} bytes", path.display(), data.len());
                false
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(target: "cart", "could not read {}: {}", path.display(), e);
                false
            }
        }
    }

    pub fn write_save(cart: &Path, ram: &Ram) -> std::io::Result<()> {
        fs::write(save_path(cart), ram.persistent())
    }
}
