//! 8051 / 80C552 Microcontroller Simulator Core
//!
//! This crate provides a platform-agnostic simulator core with a stable C ABI.
//! No OS APIs are used - code and external RAM are reached through the
//! `ExternalBus` collaborator, listings are exchanged as text.
//!
//! # Architecture
//!
//! The simulator is organized into several modules:
//! - `sfr`: register, bit and 16-bit pair descriptor tables per chip variant
//! - `memory`: internal address space with change observers
//! - `bus`: write pipeline (side effects, notifications) and external space
//! - `peripherals`: interrupt controller, timers, UART, watchdog, ADC, PWM, I2C
//! - `cpu`: instruction interpreter
//! - `disasm`: decoder and control-flow listing builder
//! - `listing`: listing collection and its text format
//! - `sim`: simulator orchestrator
//!
//! # Internal Address Space
//!
//! | Address Range | Region                                   |
//! |---------------|------------------------------------------|
//! | 0x000 - 0x01F | Register banks 0-3 (R0-R7)               |
//! | 0x020 - 0x02F | Bit-addressable RAM                      |
//! | 0x030 - 0x07F | General RAM                              |
//! | 0x080 - 0x0FF | SFRs (direct addressing)                 |
//! | 0x100 - 0x17F | Upper RAM (indirect addressing of 80-FF) |

pub mod sfr;
pub mod config;
pub mod error;
pub mod memory;
pub mod bus;
pub mod cpu;
pub mod peripherals;
pub mod disasm;
pub mod listing;
pub mod sim;

#[cfg(any(target_arch = "wasm32", feature = "wasm"))]
mod wasm;

#[cfg(any(target_arch = "wasm32", feature = "wasm"))]
pub use wasm::*;

#[cfg(test)]
mod program_integration_test;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::slice;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub use bus::{Bus, ExternalBus, FlatBus};
pub use config::{SimConfig, Variant};
pub use disasm::{CodeStream, Disassembler, Mnemonic, Operand};
pub use error::{BuildError, ConfigError, DisasmError, ExecError, ListingError, SimError};
pub use listing::{ListingCollection, ListingEntry};
pub use sim::Simulator;

/// Thread-safe wrapper for the simulator.
/// All FFI calls go through this mutex so a UI thread and a run loop can
/// share one instance.
/// This is an opaque type from C's perspective (used via void*).
pub struct SyncSim {
    inner: Mutex<Simulator>,
}

impl SyncSim {
    fn new(variant: Variant) -> Result<Self, SimError> {
        let config = SimConfig::for_variant(variant);
        let sim = Simulator::new(config, Box::new(FlatBus::new(Vec::new())), Vec::new())?;
        Ok(Self {
            inner: Mutex::new(sim),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Simulator> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Borrow a C string as UTF-8
fn c_name<'a>(name: *const c_char) -> Option<&'a str> {
    if name.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(name) }.to_str().ok()
}

/// Create a new simulator instance.
/// variant: 0 = plain 8051, 1 = 80C552.
/// Returns null for an unknown variant.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_create")]
pub extern "C" fn sim_create(variant: i32) -> *mut SyncSim {
    let Some(variant) = Variant::from_index(variant) else {
        return ptr::null_mut();
    };
    match SyncSim::new(variant) {
        Ok(sim) => Box::into_raw(Box::new(sim)),
        Err(_) => ptr::null_mut(),
    }
}

/// Destroy a simulator instance.
/// Safe to call with null pointer.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_destroy")]
pub extern "C" fn sim_destroy(sim: *mut SyncSim) {
    if !sim.is_null() {
        unsafe {
            drop(Box::from_raw(sim));
        }
    }
}

/// Load a program image as code memory and rebuild the listing.
/// Returns 0 on success, -1 on bad arguments, -2 if the listing stopped at
/// an undecodable opcode (the program is still loaded).
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_load_rom")]
pub extern "C" fn sim_load_rom(sim: *mut SyncSim, data: *const u8, len: usize) -> i32 {
    if sim.is_null() || data.is_null() {
        return -1;
    }

    let sync_sim = unsafe { &*sim };
    let image = unsafe { slice::from_raw_parts(data, len) }.to_vec();

    match sync_sim.lock().load_program(image) {
        Ok(()) => 0,
        Err(_) => -2,
    }
}

/// Reset the chip: registers to reset values, PC and cycle counter to 0.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_reset")]
pub extern "C" fn sim_reset(sim: *mut SyncSim) {
    if sim.is_null() {
        return;
    }

    let sync_sim = unsafe { &*sim };
    sync_sim.lock().reset();
}

/// Execute one instruction.
/// Returns 0 on success, -1 on null pointer, -2 if the instruction failed.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_step")]
pub extern "C" fn sim_step(sim: *mut SyncSim) -> i32 {
    if sim.is_null() {
        return -1;
    }

    let sync_sim = unsafe { &*sim };
    match sync_sim.lock().step() {
        Ok(()) => 0,
        Err(_) => -2,
    }
}

/// Execute up to `steps` instructions with observers muted.
/// Returns the number of instructions executed before any failure.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_run")]
pub extern "C" fn sim_run(sim: *mut SyncSim, steps: i32) -> i32 {
    if sim.is_null() || steps <= 0 {
        return 0;
    }

    let sync_sim = unsafe { &*sim };
    let mut sim = sync_sim.lock();
    let mut executed = 0;
    for _ in 0..steps {
        if sim.run(1).is_err() {
            break;
        }
        executed += 1;
    }
    executed
}

/// Current program counter.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_pc")]
pub extern "C" fn sim_pc(sim: *const SyncSim) -> u16 {
    if sim.is_null() {
        return 0;
    }

    let sync_sim = unsafe { &*sim };
    sync_sim.lock().pc()
}

/// Machine cycles since reset.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_cycles")]
pub extern "C" fn sim_cycles(sim: *const SyncSim) -> u64 {
    if sim.is_null() {
        return 0;
    }

    let sync_sim = unsafe { &*sim };
    sync_sim.lock().cycles()
}

/// Read a byte of the internal address space (0x000-0x17F).
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_read_memory")]
pub extern "C" fn sim_read_memory(sim: *const SyncSim, address: u16) -> u8 {
    if sim.is_null() || address as usize >= memory::addr::SPACE_SIZE {
        return 0;
    }

    let sync_sim = unsafe { &*sim };
    sync_sim.lock().bus.read_byte(address)
}

/// Write a byte of the internal address space through the full write
/// pipeline. Returns the mask of changed bits, or -1 on bad arguments.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_write_memory")]
pub extern "C" fn sim_write_memory(sim: *mut SyncSim, address: u16, value: u8) -> i32 {
    if sim.is_null() || address as usize >= memory::addr::SPACE_SIZE {
        return -1;
    }

    let sync_sim = unsafe { &*sim };
    sync_sim.lock().bus.write_byte(address, value) as i32
}

/// Read a register by name (e.g. "ACC", "TCON").
/// Returns the value, or -1 for a null pointer or unknown name.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_read_register")]
pub extern "C" fn sim_read_register(sim: *const SyncSim, name: *const c_char) -> i32 {
    let Some(name) = c_name(name) else {
        return -1;
    };
    if sim.is_null() {
        return -1;
    }

    let sync_sim = unsafe { &*sim };
    match sync_sim.lock().read_register(name) {
        Ok(value) => value as i32,
        Err(_) => -1,
    }
}

/// Write a register by name.
/// Returns the mask of changed bits, or -1 for a null pointer or unknown name.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_write_register")]
pub extern "C" fn sim_write_register(sim: *mut SyncSim, name: *const c_char, value: u8) -> i32 {
    let Some(name) = c_name(name) else {
        return -1;
    };
    if sim.is_null() {
        return -1;
    }

    let sync_sim = unsafe { &*sim };
    match sync_sim.lock().write_register(name, value) {
        Ok(changed) => changed as i32,
        Err(_) => -1,
    }
}

/// Read a named bit (e.g. "TR0", "P1.3").
/// Returns 1 or 0, or -1 for a null pointer or unknown name.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_read_bit")]
pub extern "C" fn sim_read_bit(sim: *const SyncSim, name: *const c_char) -> i32 {
    let Some(name) = c_name(name) else {
        return -1;
    };
    if sim.is_null() {
        return -1;
    }

    let sync_sim = unsafe { &*sim };
    match sync_sim.lock().read_bit(name) {
        Ok(level) => level as i32,
        Err(_) => -1,
    }
}

/// Write a named bit. value: non-zero to set.
/// Returns 0 on success, -1 for a null pointer or unknown name.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_write_bit")]
pub extern "C" fn sim_write_bit(sim: *mut SyncSim, name: *const c_char, value: i32) -> i32 {
    let Some(name) = c_name(name) else {
        return -1;
    };
    if sim.is_null() {
        return -1;
    }

    let sync_sim = unsafe { &*sim };
    match sync_sim.lock().write_bit(name, value != 0) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Supply a 10-bit sample for ADC channel 0-7.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_set_adc_input")]
pub extern "C" fn sim_set_adc_input(sim: *mut SyncSim, channel: i32, value: u16) {
    if sim.is_null() || channel < 0 {
        return;
    }

    let sync_sim = unsafe { &*sim };
    sync_sim.lock().set_adc_input(channel as usize, value);
}

/// Drive the active-low EW pin. level: non-zero for high (watchdog off).
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_set_ew_pin")]
pub extern "C" fn sim_set_ew_pin(sim: *mut SyncSim, level: i32) {
    if sim.is_null() {
        return;
    }

    let sync_sim = unsafe { &*sim };
    sync_sim.lock().set_ew_pin(level != 0);
}

/// Deliver a byte to the UART receiver.
/// Returns 1 if accepted, 0 if the receiver is disabled or sim is null.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_receive_serial")]
pub extern "C" fn sim_receive_serial(sim: *mut SyncSim, byte: u8) -> i32 {
    if sim.is_null() {
        return 0;
    }

    let sync_sim = unsafe { &*sim };
    sync_sim.lock().receive_serial(byte) as i32
}

/// Level of PWM output 0 or 1 (1 = high).
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_pwm_output")]
pub extern "C" fn sim_pwm_output(sim: *const SyncSim, channel: i32) -> i32 {
    if sim.is_null() || channel < 0 {
        return 0;
    }

    let sync_sim = unsafe { &*sim };
    sync_sim.lock().pwm_output(channel as usize) as i32
}

/// Export the listing as text.
/// Returns a heap string the caller must release with `sim_free_string`,
/// or null if sim is null.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_listing_text")]
pub extern "C" fn sim_listing_text(sim: *const SyncSim) -> *mut c_char {
    if sim.is_null() {
        return ptr::null_mut();
    }

    let sync_sim = unsafe { &*sim };
    let text = sync_sim.lock().listing_text();
    match CString::new(text) {
        Ok(text) => text.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Release a string returned by `sim_listing_text`.
/// Safe to call with null pointer.
#[cfg_attr(not(feature = "ios_prefixed"), no_mangle)]
#[cfg_attr(feature = "ios_prefixed", export_name = "rust_sim_free_string")]
pub extern "C" fn sim_free_string(text: *mut c_char) {
    if !text.is_null() {
        unsafe {
            drop(CString::from_raw(text));
        }
    }
}
