//! 8051 instruction interpreter
//!
//! Executes decoded `ListingEntry` values against the bus. Exactly one
//! instruction is in flight at a time.
//!
//! # Module Organization
//!
//! - `flags`: PSW bit masks
//! - `helpers`: operand accessors, stack, flags and ALU arithmetic
//! - `execute`: per-mnemonic instruction effects
//!
//! # Timing
//!
//! Every machine cycle charged to the CPU ticks the peripherals once. The
//! first cycle is charged before the instruction's effect, the rest after,
//! so branch instructions cost the same whether or not they are taken.
//!
//! # Interrupts
//!
//! A timer overflow that is unmasked requests its vector at once. During an
//! instruction the request is parked in `pending` and taken as soon as the
//! instruction completes, followed by the regular arbitration check. Only
//! one handler level is tracked: while a handler runs (vector entry until
//! RETI) no other vector is taken.

use tracing::{debug, info, trace};

use crate::bus::Bus;
use crate::error::ExecError;
use crate::listing::ListingEntry;

mod execute;
pub mod flags;
mod helpers;

#[cfg(test)]
mod tests;

pub use helpers::{add_with_carry, decimal_adjust, sub_with_borrow};

/// Machine cycles of the virtual LCALL that enters an interrupt handler
pub const INTERRUPT_CALL_CYCLES: u8 = 2;

/// Return address pushed by a call or interrupt entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallStackEntry {
    pub return_address: u16,
    /// SP before the return address was pushed
    pub stack_pointer: u8,
}

/// Interrupt requested while an instruction was executing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingInterrupt {
    pub vector_address: u16,
}

/// 8051 CPU state
///
/// Architectural registers (ACC, B, PSW, SP, DPTR, R0-R7) live in the bus;
/// the CPU owns only the program counter and execution bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct Cpu {
    /// Program counter
    pub pc: u16,
    /// Machine cycles since reset
    pub cycles: u64,
    call_stack: Vec<CallStackEntry>,
    pending: Option<PendingInterrupt>,
    /// An instruction is executing
    in_progress: bool,
    /// A vector was taken and its RETI has not run yet
    handler_active: bool,
    /// Watchdog overflow seen during the current instruction
    reset_requested: bool,
    /// A watchdog reset was applied and not yet reported
    watchdog_reset: bool,
}

impl Cpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// CPU part of a chip reset; registers are reset through the bus
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn call_stack(&self) -> &[CallStackEntry] {
        &self.call_stack
    }

    pub fn pending(&self) -> Option<PendingInterrupt> {
        self.pending
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn handler_active(&self) -> bool {
        self.handler_active
    }

    /// Report, once, that the last `execute` ended in a watchdog reset
    pub fn take_watchdog_reset(&mut self) -> bool {
        std::mem::take(&mut self.watchdog_reset)
    }

    // ========== Instruction Execution ==========

    /// Execute one decoded instruction
    ///
    /// After the effect: a watchdog reset requested during the instruction
    /// resets the chip, otherwise a deferred interrupt is taken, then the
    /// arbitration check runs. A failing effect still applies the reset but
    /// drops the deferred vector; its flag stays set for arbitration.
    pub fn execute(&mut self, bus: &mut Bus, entry: &ListingEntry) -> Result<(), ExecError> {
        if entry.is_data() {
            return Err(ExecError::DataEntry(entry.address));
        }
        trace!(pc = entry.address, cycles = self.cycles, "{}", entry.mnemonic);

        self.in_progress = true;
        self.pc = entry.next_address();
        self.charge(bus, 1);
        let effect = self.effect(bus, entry);
        self.charge(bus, entry.cycles.saturating_sub(1));
        self.in_progress = false;

        // Latches from this instruction's cycles never outlive it
        if self.reset_requested {
            info!(pc = entry.address, "chip reset by watchdog");
            bus.reset();
            self.reset();
            self.watchdog_reset = true;
            return effect;
        }
        if let Err(err) = effect {
            self.pending = None;
            return Err(err);
        }
        if let Some(pending) = self.pending.take() {
            self.fire(bus, pending.vector_address);
        }
        self.check_interrupts(bus);
        Ok(())
    }

    /// Advance the peripherals by `cycles` machine cycles
    pub fn charge(&mut self, bus: &mut Bus, cycles: u8) {
        for _ in 0..cycles {
            self.cycles += 1;
            let events = bus.tick();
            if events.reset {
                self.reset_requested = true;
            }
            for vector in events.vectors() {
                self.request_vector(bus, vector);
            }
        }
    }

    /// Take the highest-priority requesting interrupt, if any
    pub fn check_interrupts(&mut self, bus: &mut Bus) {
        if self.handler_active {
            return;
        }
        if let Some(vector) = bus.peripherals.interrupt.arbitrate(&bus.memory) {
            self.fire(bus, vector);
        }
    }

    /// Vector requested outside arbitration (timer overflow edge)
    fn request_vector(&mut self, bus: &mut Bus, vector: u16) {
        if self.handler_active {
            return;
        }
        if self.in_progress {
            if self.pending.is_none() {
                self.pending = Some(PendingInterrupt {
                    vector_address: vector,
                });
            }
            return;
        }
        self.fire(bus, vector);
    }

    /// Enter an interrupt handler with a virtual LCALL
    fn fire(&mut self, bus: &mut Bus, vector: u16) {
        bus.peripherals.interrupt.acknowledge(vector, &mut bus.memory);
        let name = bus.peripherals.interrupt.name_of(vector).unwrap_or("?");
        debug!(source = name, vector, return_address = self.pc, "entering interrupt handler");

        self.push_return(bus, self.pc);
        self.pc = vector;
        self.handler_active = true;
        self.charge(bus, INTERRUPT_CALL_CYCLES);
    }
}
