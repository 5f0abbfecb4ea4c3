use bitfield::bitfield;

use crate::ram::Ram;

pub const PLAYERS: usize = 2;
const BUTTONS: usize = 6;

/// Disables `btnp` auto-repeat when written to the delay register.
pub const REPEAT_OFF: u8 = 255;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Button {
    Left = 0,
    Right = 1,
    Up = 2,
    Down = 3,
    O = 4,
    X = 5,
}

impl Button {
    pub const ALL: [Button; BUTTONS] = [Button::Left, Button::Right, Button::Up, Button::Down, Button::O, Button::X];

    pub fn from_index(i: u8) -> Option<Button> {
        Self::ALL.get(i as usize).copied()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InputCommand {
    Controller1(Button),
    Controller2(Button),
    PlayPause,
    Reset,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyState {
    JustPressed,
    Pressed,
    JustReleased,
    Released,
}

impl KeyState {
    /// State one frame later with no new host event.
    pub fn update(self) -> KeyState {
        match self {
            KeyState::JustPressed | KeyState::Pressed => KeyState::Pressed,
            KeyState::JustReleased | KeyState::Released => KeyState::Released,
        }
    }

    pub fn is_pressed(self) -> bool {
        matches!(self, KeyState::JustPressed | KeyState::Pressed)
    }
}

bitfield! {
    /// One player's button byte as mirrored into hardware state.
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct ButtonBits(u8);
    impl Debug;
    pub left, set_left: 0;
    pub right, set_right: 1;
    pub up, set_up: 2;
    pub down, set_down: 3;
    pub o, set_o: 4;
    pub x, set_x: 5;
}

impl ButtonBits {
    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_set(self, b: Button) -> bool {
        self.0 >> b as u8 & 1 == 1
    }

    pub fn set(&mut self, b: Button, pressed: bool) {
        match b {
            Button::Left => self.set_left(pressed),
            Button::Right => self.set_right(pressed),
            Button::Up => self.set_up(pressed),
            Button::Down => self.set_down(pressed),
            Button::O => self.set_o(pressed),
            Button::X => self.set_x(pressed),
        }
    }
}

/// Per-frame button state with hold counters for `btnp` repeat.
#[derive(Clone, Debug, Default)]
pub struct InputLatch {
    pending: [ButtonBits; PLAYERS],
    current: [ButtonBits; PLAYERS],
    held: [[u16; BUTTONS]; PLAYERS],
}

impl InputLatch {
    /// Records host state; it becomes visible at the next `advance`.
    pub fn set(&mut self, player: usize, button: Button, pressed: bool) {
        if let Some(bits) = self.pending.get_mut(player) {
            bits.set(button, pressed);
        }
    }

    /// Commits pending state for a new frame and mirrors it into `ram`.
    pub fn advance(&mut self, ram: &mut Ram) {
        self.current = self.pending;
        for p in 0..PLAYERS {
            for b in Button::ALL {
                let held = &mut self.held[p][b as usize];
                *held = if self.current[p].is_set(b) { held.saturating_add(1) } else { 0 };
            }
            ram.set_buttons(p, self.current[p].bits());
        }
    }

    pub fn clear(&mut self) {
        *self = InputLatch::default();
    }

    pub fn btn(&self, button: Button, player: usize) -> bool {
        self.current.get(player).is_some_and(|bits| bits.is_set(button))
    }

    pub fn btn_bits(&self, player: usize) -> u8 {
        self.current.get(player).map_or(0, |bits| bits.bits())
    }

    /// Pressed this frame, or due for an auto-repeat.
    pub fn btnp(&self, button: Button, player: usize, delay: u8, interval: u8) -> bool {
        let Some(&held) = self.held.get(player).map(|h| &h[button as usize]) else {
            return false;
        };
        if held == 1 {
            return true;
        }
        if held == 0 || delay == REPEAT_OFF {
            return false;
        }
        let since = held - 1;
        since >= delay as u16 && (since - delay as u16) % (interval.max(1) as u16) == 0
    }

    pub fn btnp_bits(&self, player: usize, delay: u8, interval: u8) -> u8 {
        Button::ALL
            .iter()
            .filter(|&&b| self.btnp(b, player, delay, interval))
            .fold(0, |acc, &b| acc | 1 << b as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(latch: &mut InputLatch, ram: &mut Ram, n: usize) -> alloc::vec::Vec<bool> {
        (0..n)
            .map(|_| {
                latch.advance(ram);
                latch.btnp(Button::X, 0, 15, 4)
            })
            .collect()
    }

    #[test]
    fn key_state_update() {
        assert_eq!(KeyState::JustPressed.update(), KeyState::Pressed);
        assert_eq!(KeyState::JustReleased.update(), KeyState::Released);
        assert!(KeyState::JustPressed.is_pressed());
        assert!(!KeyState::JustReleased.is_pressed());
    }

    #[test]
    fn state_is_latched_and_mirrored() {
        let mut ram = Ram::default();
        let mut latch = InputLatch::default();
        latch.set(1, Button::Up, true);
        assert!(!latch.btn(Button::Up, 1));
        latch.advance(&mut ram);
        assert!(latch.btn(Button::Up, 1));
        assert_eq!(latch.btn_bits(1), 0b100);
        assert_eq!(ram.buttons(1), 0b100);
        assert!(!latch.btn(Button::Up, 7));
    }

    #[test]
    fn btnp_edge_then_repeat() {
        let mut ram = Ram::default();
        let mut latch = InputLatch::default();
        latch.set(0, Button::X, true);
        let fired: alloc::vec::Vec<usize> = frames(&mut latch, &mut ram, 25)
            .iter()
            .enumerate()
            .filter_map(|(i, &f)| f.then_some(i))
            .collect();
        assert_eq!(fired, [0, 15, 19, 23]);

        latch.set(0, Button::X, false);
        assert_eq!(frames(&mut latch, &mut ram, 1), [false]);
    }

    #[test]
    fn repeat_can_be_disabled() {
        let mut ram = Ram::default();
        let mut latch = InputLatch::default();
        latch.set(0, Button::O, true);
        for _ in 0..40 {
            latch.advance(&mut ram);
        }
        // held for 40 frames: 39 is on the 15 + 4n schedule
        assert!(latch.btnp(Button::O, 0, 15, 4));
        assert!(!latch.btnp(Button::O, 0, REPEAT_OFF, 4));
    }

    #[test]
    fn btnp_bits_collects_edges() {
        let mut ram = Ram::default();
        let mut latch = InputLatch::default();
        latch.set(0, Button::Left, true);
        latch.set(0, Button::X, true);
        latch.advance(&mut ram);
        assert_eq!(latch.btnp_bits(0, 15, 4), 0b100001);
        latch.advance(&mut ram);
        assert_eq!(latch.btnp_bits(0, 15, 4), 0);
    }
}
