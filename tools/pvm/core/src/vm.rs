use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt::{Debug, Formatter};
use core::ops::Range;
use heapless::FnvIndexMap;
use log::{debug, error, info, trace, warn};
use pvm_synth::audio_output::PicoAudio;
use pvm_synth::Synth;

use crate::api::{Api, FrameInfo};
use crate::cartridges::{self, CartInfo, LoadedCart};
use crate::color_map;
use crate::error::{LoadError, ScriptError};
use crate::fix::Fix32;
use crate::gfx::Graphics;
use crate::inputs::InputCommand::{Controller1, Controller2, PlayPause, Reset};
use crate::inputs::KeyState::JustReleased;
use crate::inputs::{InputCommand, InputLatch, KeyState};
use crate::ram::{self, Ram};
use crate::rng::PicoRng;
use crate::vm::VmState::{Error, Paused, Running, Stopped};

pub const FPS_DEFAULT: u8 = 30;
pub const FPS_60: u8 = 60;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VmState {
    Stopped,
    Running,
    Paused,
    Error,
}

/// The boundary to whatever language runs the cart's script.
///
/// `load` compiles the source and runs its top level once. `resolve` is asked
/// for each lifecycle hook right after loading; the VM never probes again.
pub trait ScriptEngine {
    type Hook: Copy;

    fn load(&mut self, source: &[u8], api: &mut Api<'_>) -> Result<(), ScriptError>;
    fn resolve(&mut self, name: &str) -> Option<Self::Hook>;
    fn call(&mut self, hook: Self::Hook, api: &mut Api<'_>) -> Result<(), ScriptError>;
}

pub type EngineFactory<E> = Box<dyn FnMut() -> Result<E, ScriptError>>;

#[derive(Copy, Clone, Debug)]
struct Hooks<H> {
    init: Option<H>,
    update: Option<H>,
    update60: Option<H>,
    draw: Option<H>,
}

impl<H> Default for Hooks<H> {
    fn default() -> Self {
        Hooks { init: None, update: None, update60: None, draw: None }
    }
}

/// Which lifecycle hooks the loaded cart defines.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HookFlags {
    pub init: bool,
    pub update: bool,
    pub update60: bool,
    pub draw: bool,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VmConfig {
    /// Rate the synth renders at; the attached output resamples from here.
    pub sample_rate: u32,
    pub master_volume: u8,
    /// Seed installed into the RNG registers on every reset.
    pub boot_seed: Fix32,
    /// Largest decompressed script accepted.
    pub script_capacity: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            sample_rate: pvm_synth::SAMPLE_RATE,
            master_volume: 255,
            boot_seed: Fix32::ZERO,
            script_capacity: 64 * 1024,
        }
    }
}

/// Where the current cart came from, so `Reset` can load it again.
#[derive(Clone, Debug)]
enum CartSource {
    Mem(Vec<u8>),
    #[cfg(feature = "std")]
    Path(std::path::PathBuf),
}

pub struct Vm<E: ScriptEngine> {
    pub ram: Ram,
    pub gfx: Graphics,
    pub synth: Synth,
    pub input: InputLatch,
    pub audio_out: Option<PicoAudio>,

    pub input_state: FnvIndexMap<InputCommand, KeyState, 32>,

    config: VmConfig,
    factory: EngineFactory<E>,
    engine: Option<E>,
    hooks: Hooks<E::Hook>,

    state: VmState,
    frame_count: u64,
    target_fps: u8,
    last_error: Option<String>,

    cart: CartInfo,
    source: Option<CartSource>,
    /// Cart data as loaded, for `reload`.
    rom: Vec<u8>,
    save_dirty: bool,

    pcm: Vec<i16>,
    sample_carry: u32,
    committed_rows: Option<Range<usize>>,
}

impl<E: ScriptEngine> Debug for Vm<E> {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        f.debug_struct("Vm")
            .field("state", &self.state)
            .field("frame_count", &self.frame_count)
            .field("target_fps", &self.target_fps)
            .field("last_error", &self.last_error)
            .field("cart", &self.cart)
            .field("ram", &self.ram)
            .finish()
    }
}

impl<E: ScriptEngine> Vm<E> {
    /// Builds a stopped VM. `factory` is called on every reset for a fresh engine.
    pub fn new(config: VmConfig, factory: impl FnMut() -> Result<E, ScriptError> + 'static) -> Self {
        let mut vm = Vm {
            ram: Ram::default(),
            gfx: Graphics::new(),
            synth: Synth::new(config.sample_rate),
            input: InputLatch::default(),
            audio_out: None,
            input_state: Default::default(),
            config,
            factory: Box::new(factory),
            engine: None,
            hooks: Hooks::default(),
            state: Stopped,
            frame_count: 0,
            target_fps: FPS_DEFAULT,
            last_error: None,
            cart: CartInfo::default(),
            source: None,
            rom: Vec::new(),
            save_dirty: false,
            pcm: Vec::new(),
            sample_carry: 0,
            committed_rows: None,
        };
        vm.reset();
        vm
    }

    // lifecycle

    /// Tears down the script engine and restores every subsystem to power-on state.
    pub fn reset(&mut self) {
        debug!("vm reset");
        self.state = Stopped;

        self.ram.reset();
        self.ram.set_rng_state(PicoRng::seeded(self.config.boot_seed).state());
        self.gfx = Graphics::new();
        self.synth = Synth::new(self.config.sample_rate);
        self.synth.master_volume = self.config.master_volume;
        self.input.clear();

        self.hooks = Hooks::default();
        self.frame_count = 0;
        self.target_fps = FPS_DEFAULT;
        self.last_error = None;
        self.save_dirty = false;
        self.sample_carry = 0;
        self.committed_rows = None;

        self.engine = None;
        match (self.factory)() {
            Ok(engine) => self.engine = Some(engine),
            Err(e) => self.fail(e),
        }
    }

    pub fn load_mem(&mut self, data: &[u8]) -> Result<(), LoadError> {
        self.begin_load()?;
        let loaded = cartridges::load_mem(data, &mut self.ram, self.config.script_capacity)
            .map_err(|e| self.load_failed(e))?;
        self.source = Some(CartSource::Mem(data.to_vec()));
        self.finish_load(loaded)
    }

    /// Loads a cart file and its `.sav` sidecar, if there is one.
    #[cfg(feature = "std")]
    pub fn load_path(&mut self, path: &std::path::Path) -> Result<(), LoadError> {
        self.begin_load()?;
        let loaded = cartridges::load_path(path, &mut self.ram, self.config.script_capacity)
            .map_err(|e| self.load_failed(e))?;
        cartridges::read_save(path, &mut self.ram);
        self.source = Some(CartSource::Path(path.to_path_buf()));
        self.finish_load(loaded)
    }

    fn begin_load(&mut self) -> Result<(), LoadError> {
        self.flush_save();
        self.source = None;
        self.rom.clear();
        self.cart = CartInfo::default();
        self.reset();
        match &self.last_error {
            Some(msg) if self.state == Error => {
                Err(LoadError::Script(ScriptError::Engine(msg.clone())))
            }
            _ => Ok(()),
        }
    }

    fn load_failed(&mut self, e: LoadError) -> LoadError {
        warn!(target: "cart", "cart failed to load: {}", e);
        self.cart = CartInfo::default();
        self.last_error = Some(e.to_string());
        e
    }

    fn finish_load(&mut self, loaded: LoadedCart) -> Result<(), LoadError> {
        self.rom = self.ram.bytes()[..ram::ROM_SIZE].to_vec();
        self.cart = loaded.info;

        if let Err(e) = self.with_api(|engine, api| engine.load(&loaded.script, api)) {
            self.fail(e.clone());
            return Err(LoadError::Script(e));
        }

        if let Some(engine) = self.engine.as_mut() {
            self.hooks = Hooks {
                init: engine.resolve("_init"),
                update: engine.resolve("_update"),
                update60: engine.resolve("_update60"),
                draw: engine.resolve("_draw"),
            };
        }
        self.target_fps = if self.hooks.update60.is_some() { FPS_60 } else { FPS_DEFAULT };

        info!(
            "cart ready: {:?}, {} fps, hooks {:?}",
            self.cart.title.as_deref().unwrap_or("untitled"),
            self.target_fps,
            self.hooks()
        );
        Ok(())
    }

    /// Stops, resets and forgets the current cart.
    pub fn unload(&mut self) {
        self.flush_save();
        self.stop();
        self.reset();
        self.cart = CartInfo::default();
        self.source = None;
        self.rom.clear();
    }

    /// Starts the cart from its `_init`. Does nothing while already running.
    pub fn run(&mut self) {
        if self.state == Running {
            return;
        }
        if self.engine.is_none() {
            warn!("run: no script engine");
            return;
        }

        info!("vm running");
        self.state = Running;
        self.frame_count = 0;
        self.last_error = None;

        if let Some(init) = self.hooks.init {
            if let Err(e) = self.call_hook(init) {
                self.fail(e);
            }
        }
    }

    pub fn stop(&mut self) {
        if self.state != Stopped {
            debug!("vm stopped");
        }
        self.state = Stopped;
    }

    pub fn pause(&mut self) {
        if self.state == Running {
            debug!("vm paused");
            self.state = Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == Paused {
            debug!("vm resumed");
            self.state = Running;
        }
    }

    /// Runs one frame: applies queued host input, calls the update and draw
    /// hooks, then commits audio, the save file and the frame.
    pub fn step(&mut self) {
        self.process_inputs();

        if self.state != Running {
            trace!("step: not running ({:?})", self.state);
            return;
        }

        self.input.advance(&mut self.ram);

        let update = self.hooks.update60.or(self.hooks.update);
        for hook in [update, self.hooks.draw].into_iter().flatten() {
            if let Err(e) = self.call_hook(hook) {
                if !e.message().is_empty() {
                    self.fail(e);
                    return;
                }
            }
        }

        self.synth.update();
        self.render_audio();
        self.flush_save();

        self.committed_rows = self.gfx.dirty_rows();
        self.gfx.flip();
        self.frame_count += 1;
    }

    fn fail(&mut self, e: ScriptError) {
        error!("script error: {}", e);
        self.last_error = Some(e.message().to_string());
        self.state = Error;
    }

    fn call_hook(&mut self, hook: E::Hook) -> Result<(), ScriptError> {
        self.with_api(|engine, api| engine.call(hook, api))
    }

    fn with_api<R>(
        &mut self,
        f: impl FnOnce(&mut E, &mut Api<'_>) -> Result<R, ScriptError>,
    ) -> Result<R, ScriptError> {
        let Some(engine) = self.engine.as_mut() else {
            return Err(ScriptError::Engine("no script engine".into()));
        };
        let mut api = Api {
            ram: &mut self.ram,
            gfx: &mut self.gfx,
            synth: &mut self.synth,
            input: &self.input,
            rom: &self.rom,
            frame: FrameInfo { frame_count: self.frame_count, fps: self.target_fps },
            save_dirty: &mut self.save_dirty,
        };
        f(engine, &mut api)
    }

    // audio

    /// Sends every committed frame's samples to `audio` from now on.
    pub fn attach_audio(&mut self, audio: PicoAudio) {
        self.audio_out = Some(audio);
    }

    fn render_audio(&mut self) {
        let fps = self.target_fps.max(1) as u32;
        let total = self.synth.sample_rate() + self.sample_carry;
        let count = (total / fps) as usize;
        self.sample_carry = total % fps;

        self.pcm.resize(count, 0);
        self.synth.fill(self.ram.sfx_table(), &mut self.pcm);

        if let Some(audio) = &mut self.audio_out {
            let pushed = audio.push_samples(&self.pcm);
            if pushed < count {
                warn!(target: "synth", "dropped {} samples", count - pushed);
            }
            audio.convert_to_output_buffers();
        }
    }

    /// Samples rendered for the last committed frame.
    pub fn frame_samples(&self) -> &[i16] {
        &self.pcm
    }

    // persistence

    #[cfg(feature = "std")]
    fn flush_save(&mut self) {
        if !self.save_dirty {
            return;
        }
        self.save_dirty = false;
        if let Some(CartSource::Path(path)) = &self.source {
            match cartridges::write_save(path, &self.ram) {
                Ok(()) => debug!(target: "cart", "saved persistent data for {}", path.display()),
                Err(e) => warn!(target: "cart", "could not write save for {}: {}", path.display(), e),
            }
        }
    }

    #[cfg(not(feature = "std"))]
    fn flush_save(&mut self) {
        self.save_dirty = false;
    }

    // input

    /// Queues a host input change; it is applied at the start of the next `step`.
    pub fn set_input_state(&mut self, command: InputCommand, state: KeyState) {
        if self.input_state.insert(command, state).is_err() {
            warn!("input queue full, dropping {:?}", command);
        }
    }

    fn process_inputs(&mut self) {
        let keys: Vec<_> = self.input_state.keys().cloned().collect();

        for key in &keys {
            let Some(&state) = self.input_state.get(key) else {
                continue;
            };
            match key {
                Controller1(button) => self.input.set(0, *button, state.is_pressed()),
                Controller2(button) => self.input.set(1, *button, state.is_pressed()),
                PlayPause => {
                    if state == JustReleased {
                        match self.state {
                            Running => self.pause(),
                            Paused => self.resume(),
                            Stopped | Error => {}
                        }
                    }
                }
                Reset => {
                    if state == JustReleased {
                        self.reload_cart();
                    }
                }
            }
            // the key is already present, so this only replaces its value
            let _ = self.input_state.insert(*key, state.update());
        }
    }

    /// Loads the current cart again from where it came from and restarts it.
    fn reload_cart(&mut self) {
        let Some(source) = self.source.clone() else {
            return;
        };
        info!("reloading cart");
        let result = match source {
            CartSource::Mem(data) => self.load_mem(&data),
            #[cfg(feature = "std")]
            CartSource::Path(path) => self.load_path(&path),
        };
        if result.is_ok() {
            self.run();
        }
    }

    // queries

    pub fn state(&self) -> VmState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn target_fps(&self) -> u8 {
        self.target_fps
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn cart_info(&self) -> &CartInfo {
        &self.cart
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn hooks(&self) -> HookFlags {
        HookFlags {
            init: self.hooks.init.is_some(),
            update: self.hooks.update.is_some(),
            update60: self.hooks.update60.is_some(),
            draw: self.hooks.draw.is_some(),
        }
    }

    /// Packed 4-bit screen memory, two pixels per byte, low nibble on the left.
    pub fn framebuffer(&self) -> &[u8] {
        self.ram.screen()
    }

    /// Screen rows the last committed frame changed.
    pub fn dirty_rows(&self) -> Option<Range<usize>> {
        self.committed_rows.clone()
    }

    pub fn render_rgba(&self, out: &mut [u8]) {
        color_map::render_rgba(&self.ram, out);
    }

    pub fn render_rgb565(&self, out: &mut [u16]) {
        color_map::render_rgb565(&self.ram, out);
    }
}
