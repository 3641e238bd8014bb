//! 8051 CPU tests
//!
//! Test suite for the instruction interpreter, organized into:
//! - instructions.rs: individual instructions and instruction families
//! - interrupts.rs: vector dispatch, deferral and arbitration
//! - alu.rs: flag properties of the ALU helpers
//!
//! Programs are given as raw bytes and decoded with the disassembler, so
//! every test also exercises the opcode table.

use super::*;
use crate::bus::{Bus, FlatBus};
use crate::config::SimConfig;
use crate::disasm::{CodeStream, Disassembler};
use crate::sfr::addr;

mod alu;

// ========== Test Helpers ==========

/// CPU, bus and decoder around one code image
struct Machine {
    cpu: Cpu,
    bus: Bus,
    disassembler: Disassembler,
    code: Vec<u8>,
}

impl Machine {
    fn new(code: &[u8]) -> Self {
        let config = SimConfig::default();
        let bus = Bus::new(&config, Box::new(FlatBus::new(code.to_vec()))).unwrap();
        Self {
            cpu: Cpu::new(),
            bus,
            disassembler: Disassembler::new(config.variant).unwrap(),
            code: code.to_vec(),
        }
    }

    /// Image of `size` NOPs with `program` at address 0
    fn padded(program: &[u8], size: usize) -> Self {
        let mut code = vec![0x00; size];
        code[..program.len()].copy_from_slice(program);
        Self::new(&code)
    }

    fn decode(&self, address: u16) -> ListingEntry {
        let mut stream = CodeStream::new(&self.code);
        stream.seek(address);
        self.disassembler.decode_one(&mut stream).unwrap()
    }

    /// Execute the instruction at PC
    fn step(&mut self) {
        let entry = self.decode(self.cpu.pc);
        self.cpu.execute(&mut self.bus, &entry).unwrap();
    }

    fn steps(&mut self, count: usize) {
        for _ in 0..count {
            self.step();
        }
    }

    fn acc(&self) -> u8 {
        self.bus.sfr(addr::ACC)
    }

    fn carry(&self) -> bool {
        self.bus.sfr(addr::PSW) & flags::CY != 0
    }

    fn flag(&self, mask: u8) -> bool {
        self.bus.sfr(addr::PSW) & mask != 0
    }

    fn set(&mut self, name: &str, value: u8) {
        self.bus.write_register(name, value).unwrap();
    }

    fn get(&self, name: &str) -> u8 {
        self.bus.read_register(name).unwrap()
    }

    fn set_bit(&mut self, name: &str, value: bool) {
        self.bus.write_bit_named(name, value).unwrap();
    }
}
