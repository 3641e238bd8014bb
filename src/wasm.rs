//! WebAssembly bindings for the 8051 / 80C552 simulator
//!
//! This module provides JavaScript-friendly APIs using wasm-bindgen.

use wasm_bindgen::prelude::*;

use crate::config::{SimConfig, Variant};
use crate::memory;
use crate::sim::Simulator;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn warn(s: &str);
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);
}

/// WASM-friendly wrapper around the simulator.
/// Unlike the C FFI, this owns the simulator directly without mutex
/// since WASM is single-threaded.
#[wasm_bindgen]
pub struct WasmSim {
    inner: Simulator,
}

impl WasmSim {
    fn with_variant(variant: Variant) -> Result<WasmSim, JsError> {
        let inner = Simulator::with_program(SimConfig::for_variant(variant), Vec::new())
            .map_err(|err| JsError::new(&err.to_string()))?;
        Ok(WasmSim { inner })
    }
}

#[wasm_bindgen]
impl WasmSim {
    /// Create a new 80C552 simulator with an empty program.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<WasmSim, JsError> {
        #[cfg(target_arch = "wasm32")]
        console_error_panic_hook::set_once();

        Self::with_variant(Variant::C552)
    }

    /// Create a plain 8051 simulator.
    pub fn mcs51() -> Result<WasmSim, JsError> {
        Self::with_variant(Variant::Mcs51)
    }

    /// Load a program image and rebuild the listing.
    /// Returns 0 on success, -2 if the listing stopped at an undecodable
    /// opcode (the program is still loaded).
    #[wasm_bindgen]
    pub fn load_rom(&mut self, data: &[u8]) -> i32 {
        log(&format!("[WASM] load_rom: {} bytes", data.len()));
        match self.inner.load_program(data.to_vec()) {
            Ok(()) => 0,
            Err(err) => {
                warn(&format!("[WASM] load_rom: {}", err));
                -2
            }
        }
    }

    /// Reset the chip.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.inner.reset();
    }

    /// Execute one instruction. Returns 0 on success, -2 on failure.
    #[wasm_bindgen]
    pub fn step(&mut self) -> i32 {
        match self.inner.step() {
            Ok(()) => 0,
            Err(err) => {
                warn(&format!("[WASM] step at {:04X}: {}", self.inner.pc(), err));
                -2
            }
        }
    }

    /// Execute up to `steps` instructions with observers muted.
    /// Returns the number executed before any failure.
    #[wasm_bindgen]
    pub fn run(&mut self, steps: i32) -> i32 {
        if steps <= 0 {
            return 0;
        }
        let mut executed = 0;
        for _ in 0..steps {
            if let Err(err) = self.inner.run(1) {
                warn(&format!("[WASM] run stopped at {:04X}: {}", self.inner.pc(), err));
                break;
            }
            executed += 1;
        }
        executed
    }

    /// Current program counter.
    #[wasm_bindgen]
    pub fn pc(&self) -> u16 {
        self.inner.pc()
    }

    /// Machine cycles since reset (as f64 for JavaScript).
    #[wasm_bindgen]
    pub fn cycles(&self) -> f64 {
        self.inner.cycles() as f64
    }

    /// Read a register by name. Returns -1 for an unknown name.
    #[wasm_bindgen]
    pub fn read_register(&self, name: &str) -> i32 {
        self.inner.read_register(name).map_or(-1, i32::from)
    }

    /// Write a register by name. Returns the mask of changed bits, or -1.
    #[wasm_bindgen]
    pub fn write_register(&mut self, name: &str, value: u8) -> i32 {
        self.inner.write_register(name, value).map_or(-1, i32::from)
    }

    /// Read a named bit. Returns 1, 0 or -1 for an unknown name.
    #[wasm_bindgen]
    pub fn read_bit(&self, name: &str) -> i32 {
        self.inner.read_bit(name).map_or(-1, i32::from)
    }

    /// Write a named bit. Returns 0 on success, -1 for an unknown name.
    #[wasm_bindgen]
    pub fn write_bit(&mut self, name: &str, value: bool) -> i32 {
        self.inner.write_bit(name, value).map_or(-1, |()| 0)
    }

    /// Copy of the internal address space (RAM, SFRs, upper RAM).
    #[wasm_bindgen]
    pub fn memory(&self) -> Vec<u8> {
        (0..memory::addr::SPACE_SIZE as u16)
            .map(|address| self.inner.bus.read_byte(address))
            .collect()
    }

    /// Supply a 10-bit sample for ADC channel 0-7.
    #[wasm_bindgen]
    pub fn set_adc_input(&mut self, channel: usize, value: u16) {
        self.inner.set_adc_input(channel, value);
    }

    /// Drive the active-low EW pin.
    #[wasm_bindgen]
    pub fn set_ew_pin(&mut self, level: bool) {
        self.inner.set_ew_pin(level);
    }

    /// Deliver a byte to the UART receiver. Returns false if it is disabled.
    #[wasm_bindgen]
    pub fn receive_serial(&mut self, byte: u8) -> bool {
        self.inner.receive_serial(byte)
    }

    /// Level of PWM output 0 or 1.
    #[wasm_bindgen]
    pub fn pwm_output(&self, channel: usize) -> bool {
        self.inner.pwm_output(channel)
    }

    /// Current I2C status code (S1STA).
    #[wasm_bindgen]
    pub fn i2c_status(&self) -> u8 {
        self.inner.i2c_status().code()
    }

    /// Listing in its text form.
    #[wasm_bindgen]
    pub fn listing_text(&self) -> String {
        self.inner.listing_text()
    }

    /// Replace the listing with one read back from text.
    /// Returns 0 on success, -1 if the text does not parse.
    #[wasm_bindgen]
    pub fn load_listing(&mut self, text: &str) -> i32 {
        match self.inner.load_listing(text) {
            Ok(()) => 0,
            Err(err) => {
                warn(&format!("[WASM] load_listing: {}", err));
                -1
            }
        }
    }

    /// Recent instructions, oldest first, one per line.
    #[wasm_bindgen]
    pub fn history(&self) -> String {
        self.inner.history().dump()
    }
}
