use proptest::prelude::*;
use pvm_synth::waveform::{sample, Waveform};
use pvm_synth::{Note, Synth, NOTES_PER_SFX, SAMPLE_RATE, SFX_COUNT, SFX_SIZE};

fn table(notes: &[(u8, u8, u8, u8)], speed: u8) -> Vec<u8> {
    let mut table = vec![0u8; SFX_COUNT * SFX_SIZE];
    for (i, &(pitch, wave, volume, effect)) in notes.iter().take(NOTES_PER_SFX).enumerate() {
        let mut note = Note::default();
        note.set_pitch(pitch);
        note.set_waveform_bits(wave);
        note.set_volume(volume);
        note.set_effect(effect);
        table[i * 2..i * 2 + 2].copy_from_slice(&note.to_bytes());
    }
    table[65] = speed;
    table
}

fn render(table: &[u8], len: usize) -> Vec<i16> {
    let mut synth = Synth::new(SAMPLE_RATE);
    synth.sfx(table, 0, Some(0), 0, NOTES_PER_SFX as u8);
    let mut out = vec![0i16; len];
    synth.fill(table, &mut out);
    out
}

proptest! {
    #[test]
    fn same_sfx_same_samples(
        notes in prop::collection::vec((0u8..64, 0u8..8, 0u8..8, 0u8..8), 1..32),
        speed in 1u8..8,
    ) {
        let table = table(&notes, speed);
        let spt = SAMPLE_RATE as usize * speed as usize / 120;
        prop_assert_eq!(render(&table, spt * 2), render(&table, spt * 2));
    }

    #[test]
    fn waveforms_stay_in_range(bits in 0u8..8, phase in any::<u32>(), lfsr in any::<u16>()) {
        let s = sample(Waveform::from_bits(bits), phase, lfsr) as i32;
        prop_assert!((-0x4000..=0x4000).contains(&s));
    }

    #[test]
    fn silent_notes_render_silence(pitch in 0u8..64, wave in 0u8..8) {
        let table = table(&[(pitch, wave, 0, 0)], 1);
        let out = render(&table, 128);
        prop_assert!(out.iter().all(|&s| s == 0));
    }
}

#[test]
fn idle_synth_is_silent() {
    let table = table(&[], 1);
    let mut synth = Synth::new(SAMPLE_RATE);
    let mut out = [1i16; 64];
    synth.fill(&table, &mut out);
    assert!(out.iter().all(|&s| s == 0));
}
