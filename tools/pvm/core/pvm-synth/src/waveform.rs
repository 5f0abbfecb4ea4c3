/// The eight built-in instruments of the sound chip.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Waveform {
    Triangle,
    Tilted,
    Sawtooth,
    Square,
    Pulse,
    Organ,
    Noise,
    Phaser,
}

impl Waveform {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0 => Waveform::Triangle,
            1 => Waveform::Tilted,
            2 => Waveform::Sawtooth,
            3 => Waveform::Square,
            4 => Waveform::Pulse,
            5 => Waveform::Organ,
            6 => Waveform::Noise,
            _ => Waveform::Phaser,
        }
    }
}

#[inline(always)]
fn triangle(pos: i32) -> i32 {
    if pos < 0x8000 {
        pos * 2 - 0x8000
    } else {
        0x8000 - (pos - 0x8000) * 2
    }
}

/// One noise step: 16-bit Fibonacci LFSR with taps 0, 2, 3, 5.
#[inline(always)]
pub fn clock_lfsr(lfsr: u16) -> u16 {
    let bit = (lfsr ^ (lfsr >> 2) ^ (lfsr >> 3) ^ (lfsr >> 5)) & 1;
    (lfsr >> 1) | (bit << 15)
}

/// Evaluates `wave` at a 32-bit phase (one period per 2^32).
/// Noise does not look at the phase; it reads the current LFSR state.
pub fn sample(wave: Waveform, phase: u32, lfsr: u16) -> i16 {
    let pos = (phase >> 16) as i32;

    let sample = match wave {
        Waveform::Triangle => triangle(pos),
        Waveform::Tilted => {
            let pos = pos as i64;
            let v = if pos < 0xE000 {
                pos * 0x10000 / 0xE000 - 0x8000
            } else {
                0x8000 - (pos - 0xE000) * 0x10000 / 0x2000
            };
            v as i32
        }
        Waveform::Sawtooth => pos - 0x8000,
        Waveform::Square => if pos < 0x8000 { -0x7FFF } else { 0x7FFF },
        Waveform::Pulse => if pos < 0x4000 { -0x7FFF } else { 0x7FFF },
        Waveform::Organ => {
            let t1 = triangle(pos);
            let t2 = triangle((pos * 2) & 0xFFFF);
            (t1 + t2 / 2) * 2 / 3
        }
        Waveform::Noise => lfsr as i32 - 0x8000,
        Waveform::Phaser => {
            let pos2 = (pos + 0x4000) & 0xFFFF;
            ((pos - 0x8000) + (pos2 - 0x8000)) / 2
        }
    };

    (sample >> 1) as i16
}
