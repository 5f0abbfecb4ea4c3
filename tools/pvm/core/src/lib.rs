#![cfg_attr(not(feature = "std"), no_std)]
#![allow(clippy::single_match, clippy::too_many_arguments)]
extern crate alloc;

pub mod api;
pub mod cartridges;
pub mod color_map;
pub mod error;
pub mod fix;
pub mod font;
pub mod gfx;
pub mod inputs;
pub mod ram;
pub mod rng;
pub mod strings;
pub mod table;
pub mod vm;

pub use pvm_synth as synth;

pub use crate::api::Api;
pub use crate::error::{LoadError, ScriptError};
pub use crate::fix::Fix32;
pub use crate::ram::{HEIGHT, WIDTH};
pub use crate::vm::{HookFlags, ScriptEngine, Vm, VmConfig, VmState};
