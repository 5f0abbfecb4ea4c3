#![no_std]
extern crate alloc;

use bitfield::bitfield;
use log::{debug, trace};

pub mod audio_output;
pub mod waveform;

use crate::waveform::{clock_lfsr, Waveform};

pub const SAMPLE_RATE: u32 = 22_050;
pub const CHANNELS: usize = 4;
pub const NOTES_PER_SFX: usize = 32;
pub const SFX_COUNT: usize = 64;
pub const SFX_SIZE: usize = 68;
pub const MUSIC_COUNT: usize = 64;

const LFSR_SEED: u16 = 0xACE1;

/// Pitch 0..63 to frequency in 16.16 fixed-point hertz (C-0 to D#-5).
pub const NOTE_FREQ: [u32; 64] = [
    1079, 1144, 1212, 1285, 1361, 1442, 1528, 1619, 1716, 1818, 1926, 2041,
    2162, 2291, 2427, 2572, 2725, 2887, 3059, 3241, 3434, 3639, 3856, 4086,
    4330, 4588, 4861, 5151, 5458, 5783, 6127, 6492, 6878, 7288, 7722, 8181,
    8670, 9185, 9732, 10311, 10926, 11576, 12265, 12995, 13768, 14588, 15457, 16376,
    17352, 18382, 19477, 20637, 21866, 23166, 24545, 26006, 27553, 29192, 30930, 32770,
    34716, 36781, 38968, 41285,
];

pub fn note_to_freq(pitch: u8) -> u32 {
    NOTE_FREQ[(pitch as usize).min(63)]
}

bitfield! {
    /// One tracker row, stored little-endian in sfx memory.
    #[derive(Copy, Clone, PartialEq, Eq, Default)]
    pub struct Note(u16);
    impl Debug;
    pub u8, pitch, set_pitch: 5, 0;
    pub u8, waveform_bits, set_waveform_bits: 8, 6;
    pub u8, volume, set_volume: 11, 9;
    pub u8, effect, set_effect: 14, 12;
    pub custom, set_custom: 15;
}

impl Note {
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Note(u16::from_le_bytes(bytes))
    }

    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    pub fn waveform(&self) -> Waveform {
        Waveform::from_bits(self.waveform_bits())
    }
}

/// Read-only view of one 68 byte sound effect.
#[derive(Copy, Clone, Debug)]
pub struct Sfx<'a>(&'a [u8]);

impl<'a> Sfx<'a> {
    /// `table` is the whole sfx region (64 * 68 bytes).
    pub fn from_table(table: &'a [u8], n: usize) -> Option<Self> {
        if n >= SFX_COUNT {
            return None;
        }
        table.get(n * SFX_SIZE..(n + 1) * SFX_SIZE).map(Sfx)
    }

    pub fn note(&self, i: usize) -> Note {
        let i = i.min(NOTES_PER_SFX - 1) * 2;
        Note::from_bytes([self.0[i], self.0[i + 1]])
    }

    pub fn editor_mode(&self) -> u8 { self.0[64] }
    pub fn speed(&self) -> u8 { self.0[65] }
    pub fn loop_start(&self) -> u8 { self.0[66] }
    pub fn loop_end(&self) -> u8 { self.0[67] }
}

#[derive(Copy, Clone, Debug)]
pub struct Channel {
    pub sfx: Option<u8>,
    pub note_index: u8,
    end_note: u8,
    pub sample_counter: u32,
    pub samples_per_tick: u32,
    pub phase: u32,
    pub phase_inc: u32,
    pub waveform: Waveform,
    pub volume: u8,
    pub effect: u8,
    pub frequency: u32,
    pub noise_lfsr: u16,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            sfx: None,
            note_index: 0,
            end_note: NOTES_PER_SFX as u8,
            sample_counter: 0,
            samples_per_tick: 1,
            phase: 0,
            phase_inc: 0,
            waveform: Waveform::Triangle,
            volume: 0,
            effect: 0,
            frequency: 0,
            noise_lfsr: LFSR_SEED,
        }
    }
}

impl Channel {
    pub fn is_playing(&self) -> bool {
        self.sfx.is_some()
    }

    fn load_note(&mut self, note: Note, sample_rate: u32) {
        self.waveform = note.waveform();
        self.volume = note.volume();
        self.effect = note.effect();
        self.frequency = note_to_freq(note.pitch());
        self.phase_inc = ((self.frequency as u64 * 65536) / sample_rate as u64) as u32;
    }

    /// Advances the tick counter and refreshes the note parameters.
    fn update(&mut self, table: &[u8], sample_rate: u32) {
        let Some(sfx) = self.sfx.and_then(|n| Sfx::from_table(table, n as usize)) else {
            self.sfx = None;
            return;
        };

        self.sample_counter += 1;
        if self.sample_counter >= self.samples_per_tick {
            self.sample_counter = 0;
            self.note_index += 1;

            if self.note_index >= self.end_note {
                if sfx.loop_start() < sfx.loop_end() {
                    self.note_index = sfx.loop_start();
                    self.end_note = NOTES_PER_SFX as u8;
                } else {
                    trace!(target: "synth", "sfx {:?} finished", self.sfx);
                    self.sfx = None;
                    return;
                }
            }
            self.phase = 0;
        }

        self.load_note(sfx.note(self.note_index as usize), sample_rate);
    }

    fn next_sample(&mut self) -> i32 {
        let sample = if self.waveform == Waveform::Noise {
            let prev = self.phase;
            self.phase = self.phase.wrapping_add(self.phase_inc);
            if (self.phase ^ prev) & 0x10000 != 0 {
                self.noise_lfsr = clock_lfsr(self.noise_lfsr);
            }
            waveform::sample(Waveform::Noise, self.phase, self.noise_lfsr)
        } else {
            let s = waveform::sample(self.waveform, self.phase, self.noise_lfsr);
            self.phase = self.phase.wrapping_add(self.phase_inc);
            s
        };

        sample as i32 * self.volume as i32 * 32 / 256
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MusicState {
    pub pattern: Option<u8>,
    pub tick: u8,
    pub loop_enabled: bool,
}

/// Four channel synthesizer. Sfx data is borrowed from console memory on every
/// call, so pokes into the sfx region are audible on the next sample.
#[derive(Debug)]
pub struct Synth {
    pub channels: [Channel; CHANNELS],
    pub music: MusicState,
    pub master_volume: u8,
    sample_rate: u32,
}

impl Synth {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            channels: [Channel::default(); CHANNELS],
            music: MusicState::default(),
            master_volume: 255,
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn reset(&mut self) {
        for ch in self.channels.iter_mut() {
            ch.sfx = None;
        }
        self.music = MusicState::default();
    }

    /// Starts sfx `n` on `channel` (`None` picks the first idle channel, else 0).
    /// A negative `n` stops the given channel.
    pub fn sfx(&mut self, table: &[u8], n: i32, channel: Option<usize>, offset: u8, length: u8) {
        if n < 0 {
            if let Some(ch) = channel.and_then(|c| self.channels.get_mut(c)) {
                ch.sfx = None;
            }
            return;
        }

        let Some(sfx) = Sfx::from_table(table, n as usize) else {
            return;
        };
        if offset as usize >= NOTES_PER_SFX {
            trace!(target: "synth", "sfx {} offset {} is past the last note", n, offset);
            return;
        }

        let channel = channel.unwrap_or_else(|| {
            self.channels.iter().position(|ch| !ch.is_playing()).unwrap_or(0)
        });
        let sample_rate = self.sample_rate;
        let Some(ch) = self.channels.get_mut(channel) else {
            return;
        };

        debug!(target: "synth", "sfx {} on channel {} from note {}", n, channel, offset);

        ch.sfx = Some(n as u8);
        ch.note_index = offset;
        ch.end_note = (offset as usize + length as usize).min(NOTES_PER_SFX) as u8;
        ch.sample_counter = 0;
        ch.phase = 0;
        ch.samples_per_tick = sample_rate * sfx.speed().max(1) as u32 / 120;

        ch.load_note(sfx.note(offset as usize), sample_rate);
    }

    pub fn music(&mut self, n: i32, _fade_ms: u16, _channel_mask: u8) {
        if n < 0 {
            self.music.pattern = None;
            return;
        }
        if n as usize >= MUSIC_COUNT {
            return;
        }
        self.music = MusicState { pattern: Some(n as u8), tick: 0, loop_enabled: true };
    }

    /// Per-frame sequencer hook. Only the active pattern is tracked.
    pub fn update(&mut self) {
        if self.music.pattern.is_some() {
            self.music.tick = self.music.tick.wrapping_add(1);
        }
    }

    /// Renders `out.len()` mono samples.
    pub fn fill(&mut self, table: &[u8], out: &mut [i16]) {
        for o in out.iter_mut() {
            let mut mix: i32 = 0;

            for ch in self.channels.iter_mut() {
                if !ch.is_playing() {
                    continue;
                }
                ch.update(table, self.sample_rate);
                if !ch.is_playing() {
                    continue;
                }
                mix += ch.next_sample();
            }

            let mix = mix.clamp(i16::MIN as i32, i16::MAX as i32);
            *o = (mix * self.master_volume as i32 / 256) as i16;
        }
    }
}
