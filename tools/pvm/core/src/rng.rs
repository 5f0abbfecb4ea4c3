use rand_core::{impls, Error, RngCore};

use crate::fix::Fix32;

const SEED_XOR: u32 = 0xBEAD_29BA;
const ZERO_SEED_LO: u32 = 0x6000_9755;

/// The console's two-word generator. Its state lives in hardware RAM, so
/// scripts that poke the seed registers get the sequence they expect.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PicoRng {
    hi: u32,
    lo: u32,
}

impl PicoRng {
    pub fn from_state(state: [u32; 2]) -> Self {
        PicoRng { hi: state[0], lo: state[1] }
    }

    pub fn state(&self) -> [u32; 2] {
        [self.hi, self.lo]
    }

    pub fn seeded(seed: Fix32) -> Self {
        let bits = seed.to_bits() as u32;
        let mut rng = PicoRng {
            hi: bits ^ SEED_XOR,
            lo: if bits == 0 { ZERO_SEED_LO } else { bits },
        };
        for _ in 0..32 {
            rng.step();
        }
        rng
    }

    #[inline]
    fn step(&mut self) -> u32 {
        self.hi = self.hi.rotate_left(16).wrapping_add(self.lo);
        self.lo = self.lo.wrapping_add(self.hi);
        self.hi
    }

    /// Uniform in `[0, limit)`; a zero or negative limit gives 0.
    pub fn rnd(&mut self, limit: Fix32) -> Fix32 {
        let r = self.step();
        let limit = limit.to_bits();
        if limit <= 0 {
            return Fix32::ZERO;
        }
        Fix32::from_bits((r % limit as u32) as i32)
    }
}

impl RngCore for PicoRng {
    fn next_u32(&mut self) -> u32 {
        self.step()
    }

    fn next_u64(&mut self) -> u64 {
        impls::next_u64_via_u32(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
