use alloc::string::String;
use thiserror::Error;

/// Failures inside the DEFLATE decoder used for PNG carts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InflateError {
    #[error("deflate stream ended early")]
    Truncated,
    #[error("reserved block type {0}")]
    BlockType(u8),
    #[error("stored block length {len:#06x} does not match its complement")]
    StoredLength { len: u16 },
    #[error("no huffman code matches the input")]
    BadCode,
    #[error("invalid length or distance symbol {0}")]
    BadSymbol(u16),
    #[error("code length repeat with nothing to repeat")]
    BadRepeat,
    #[error("back-reference distance {distance} exceeds the {produced} bytes produced")]
    Distance { distance: usize, produced: usize },
    #[error("inflated data exceeds {0} bytes")]
    Overflow(usize),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PngError {
    #[error("missing png signature")]
    Signature,
    #[error("chunk at offset {0} runs past the end of the file")]
    Chunk(usize),
    #[error("unsupported png: bit depth {depth}, color type {color}, interlace {interlace}")]
    Unsupported { depth: u8, color: u8, interlace: u8 },
    #[error("no IHDR chunk")]
    MissingHeader,
    #[error("no IDAT chunk")]
    MissingData,
    #[error("bad dimensions {width}x{height}")]
    Dimensions { width: u32, height: u32 },
    #[error("bad zlib header {0:02x} {1:02x}")]
    ZlibHeader(u8, u8),
    #[error("corrupt image data: {0}")]
    Inflate(#[from] InflateError),
    #[error("inflated {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("unknown scanline filter {0}")]
    Filter(u8),
}

/// Failures in the two code compression schemes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("compressed header is too short")]
    Header,
    #[error("compressed stream ended before {declared} bytes were produced")]
    Truncated { declared: usize },
    #[error("back-reference offset {offset} with {produced} bytes produced")]
    BadOffset { offset: usize, produced: usize },
    #[error("move-to-front index {0} out of range")]
    BadIndex(usize),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("empty cart")]
    Empty,
    #[error("not a cart: unrecognized header")]
    UnknownFormat,
    #[error("cart file is {0} bytes, larger than the 1 MiB limit")]
    TooLarge(usize),
    #[error(transparent)]
    Png(#[from] PngError),
    #[error("code section: {0}")]
    Codec(#[from] CodecError),
    #[error("unknown code format, first byte {0:#04x}")]
    UnknownCodeFormat(u8),
    #[error("script is {len} bytes, buffer holds {capacity}")]
    ScriptTooLarge { len: usize, capacity: usize },
    #[error("script failed to load: {0}")]
    Script(#[from] ScriptError),
    #[cfg(feature = "std")]
    #[error("could not read cart: {0}")]
    Io(#[from] std::io::Error),
}

impl LoadError {
    /// Stable negative sentinel for hosts that want a C-style status code.
    pub fn code(&self) -> i32 {
        match self {
            LoadError::Empty => -1,
            LoadError::UnknownFormat => -2,
            LoadError::TooLarge(_) => -3,
            LoadError::Png(_) => -4,
            LoadError::Codec(_) => -5,
            LoadError::UnknownCodeFormat(_) => -6,
            LoadError::ScriptTooLarge { .. } => -7,
            #[cfg(feature = "std")]
            LoadError::Io(_) => -8,
            LoadError::Script(_) => -9,
        }
    }
}

/// Errors reported by a script engine. A hook failing with an empty
/// message is treated as a silent early return, not a fault.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("load error: {0}")]
    Compile(String),
    #[error("{0}")]
    Runtime(String),
    #[error("engine unavailable: {0}")]
    Engine(String),
}

impl ScriptError {
    pub fn message(&self) -> &str {
        match self {
            ScriptError::Compile(m) | ScriptError::Runtime(m) | ScriptError::Engine(m) => m,
        }
    }
}
