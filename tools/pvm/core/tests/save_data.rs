//! Persistent slots and the `.sav` sidecar.

mod common;

use common::*;
use pvm_core::cartridges;
use pvm_core::ram::PERSIST_SIZE;
use pvm_core::Fix32;
use tempfile::TempDir;

const SCRIPT: &str = "function _update()\n  dset(0, 12.5)\n  dset(63, -1)\nend";

#[test]
fn persistent_slots_survive_a_reload() {
    let dir = TempDir::new().expect("temp dir");
    let cart = dir.path().join("saver.p8");
    std::fs::write(&cart, text_cart(SCRIPT, "")).unwrap();

    let mut vm = tiny_vm();
    vm.load_path(&cart).unwrap();
    vm.run();
    vm.step();

    let sav = cartridges::save_path(&cart);
    assert_eq!(sav.file_name().unwrap(), "saver.p8.sav");
    let saved = std::fs::read(&sav).unwrap();
    assert_eq!(saved.len(), PERSIST_SIZE);
    assert_eq!(&saved[0..4], &Fix32::from_f64(12.5).to_bits().to_le_bytes());

    let mut fresh = tiny_vm();
    fresh.load_path(&cart).unwrap();
    assert_eq!(fresh.ram.read32(0x5E00), Fix32::from_f64(12.5).to_bits() as u32);
    assert_eq!(fresh.ram.read32(0x5E00 + 63 * 4), (-1i32 << 16) as u32);
}

#[test]
fn missing_or_short_save_is_no_data() {
    let dir = TempDir::new().expect("temp dir");
    let cart = dir.path().join("blank.p8");
    std::fs::write(&cart, text_cart("function _draw()\nend", "")).unwrap();

    let mut vm = tiny_vm();
    vm.load_path(&cart).unwrap();
    assert!(vm.ram.persistent().iter().all(|&b| b == 0));

    std::fs::write(cartridges::save_path(&cart), [1, 2, 3]).unwrap();
    vm.load_path(&cart).unwrap();
    assert!(vm.ram.persistent().iter().all(|&b| b == 0));
}

#[test]
fn in_memory_carts_never_write_saves() {
    let dir = TempDir::new().expect("temp dir");
    let mut vm = tiny_vm();
    vm.load_mem(&text_cart(SCRIPT, "")).unwrap();
    vm.run();
    vm.step();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(vm.ram.read32(0x5E00), Fix32::from_f64(12.5).to_bits() as u32);
}

#[test]
fn missing_cart_file_is_an_io_error() {
    let dir = TempDir::new().expect("temp dir");
    let mut vm = tiny_vm();
    let err = vm.load_path(&dir.path().join("nope.p8")).unwrap_err();
    assert_eq!(err.code(), -8);
    assert!(vm.last_error().is_some());
}
