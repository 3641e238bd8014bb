//! Simulator orchestrator
//!
//! Owns one chip: the CPU, the bus (register model, peripherals and the
//! external collaborator), the disassembler and the listing recovered from
//! the program image. The driver calls `step()` or `run()`; everything else
//! here is the host-facing surface (named register access, observers, pins).

use tracing::{error, info, warn};

use crate::bus::{Bus, ExternalBus, FlatBus};
use crate::config::SimConfig;
use crate::cpu::Cpu;
use crate::disasm::{CodeStream, Disassembler, Mnemonic};
use crate::error::{BuildError, ListingError, SimError};
use crate::listing::{ListingCollection, ListingEntry};
use crate::peripherals::I2cStatus;

/// One executed instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryEntry {
    pub address: u16,
    pub mnemonic: Mnemonic,
    /// Opcode bytes, `len` of them valid
    pub bytes: [u8; 3],
    pub len: u8,
    /// CPU cycle count before the instruction
    pub cycles: u64,
}

/// Ring buffer of the last executed instructions, for failure diagnostics
#[derive(Debug, Clone)]
pub struct ExecutionHistory {
    entries: Vec<HistoryEntry>,
    capacity: usize,
    /// Next slot to overwrite once full
    write_idx: usize,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            write_idx: 0,
        }
    }

    pub fn record(&mut self, entry: &ListingEntry, cycles: u64) {
        if self.capacity == 0 {
            return;
        }
        let mut bytes = [0; 3];
        let len = entry.bytes.len().min(bytes.len());
        bytes[..len].copy_from_slice(&entry.bytes[..len]);
        let record = HistoryEntry {
            address: entry.address,
            mnemonic: entry.mnemonic,
            bytes,
            len: len as u8,
            cycles,
        };
        if self.entries.len() < self.capacity {
            self.entries.push(record);
        } else {
            self.entries[self.write_idx] = record;
        }
        self.write_idx = (self.write_idx + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.write_idx = 0;
    }

    /// Entries from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        let start = if self.entries.len() < self.capacity {
            0
        } else {
            self.write_idx
        };
        let count = self.entries.len();
        (0..count).map(move |i| &self.entries[(start + i) % count])
    }

    /// Multi-line dump, one instruction per line
    pub fn dump(&self) -> String {
        self.iter()
            .map(|h| {
                let bytes: Vec<String> = h.bytes[..h.len as usize]
                    .iter()
                    .map(|b| format!("{b:02X}"))
                    .collect();
                format!("{:04X}  {:<8}  {}  @{}", h.address, bytes.join(" "), h.mnemonic, h.cycles)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One simulated microcontroller
pub struct Simulator {
    config: SimConfig,
    pub cpu: Cpu,
    pub bus: Bus,
    disassembler: Disassembler,
    listing: ListingCollection,
    /// Program image the listing is recovered from
    image: Vec<u8>,
    history: ExecutionHistory,
}

impl Simulator {
    /// Chip with a custom external collaborator; `image` is what gets
    /// disassembled
    pub fn new(
        config: SimConfig,
        external: Box<dyn ExternalBus>,
        image: Vec<u8>,
    ) -> Result<Self, SimError> {
        let bus = Bus::new(&config, external)?;
        let disassembler = Disassembler::new(config.variant)?;
        let history = ExecutionHistory::new(config.history_len);
        info!(variant = config.variant.name(), image_len = image.len(), "simulator created");
        Ok(Self {
            config,
            cpu: Cpu::new(),
            bus,
            disassembler,
            listing: ListingCollection::new(),
            image,
            history,
        })
    }

    /// Chip running `image` from a flat code and external RAM space, with
    /// the listing already built
    pub fn with_program(config: SimConfig, image: Vec<u8>) -> Result<Self, SimError> {
        let external = Box::new(FlatBus::new(image.clone()));
        let mut sim = Self::new(config, external, image)?;
        sim.build_listing()?;
        Ok(sim)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn disassembler(&self) -> &Disassembler {
        &self.disassembler
    }

    pub fn listing(&self) -> &ListingCollection {
        &self.listing
    }

    pub fn listing_mut(&mut self) -> &mut ListingCollection {
        &mut self.listing
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    pub fn pc(&self) -> u16 {
        self.cpu.pc
    }

    pub fn cycles(&self) -> u64 {
        self.cpu.cycles
    }

    // ========== Program and Listing ==========

    /// Replace the program with a flat image, reset and rebuild the listing
    pub fn load_program(&mut self, image: Vec<u8>) -> Result<(), SimError> {
        self.bus.replace_external(Box::new(FlatBus::new(image.clone())));
        self.image = image;
        self.reset();
        self.build_listing()
    }

    /// Rebuild the listing from the image, starting at address 0
    ///
    /// On a decode error the partial listing is kept and the error returned.
    pub fn build_listing(&mut self) -> Result<(), SimError> {
        let mut stream = CodeStream::new(&self.image);
        match self.disassembler.build(&mut stream, &self.config.entry_label) {
            Ok(listing) => {
                self.listing = listing;
                Ok(())
            }
            Err(BuildError { source, partial }) => {
                self.listing = partial;
                Err(source.into())
            }
        }
    }

    /// Listing in its text form
    pub fn listing_text(&self) -> String {
        self.listing.to_text(self.bus.map())
    }

    /// Replace the listing with one read back from text
    pub fn load_listing(&mut self, text: &str) -> Result<(), SimError> {
        self.listing = ListingCollection::parse(text, &self.disassembler)?;
        Ok(())
    }

    /// Make sure the listing holds an instruction at `address`
    fn ensure_code(&mut self, address: u16) -> Result<(), SimError> {
        if self.listing.get(address).is_some_and(|e| !e.is_data()) {
            return Ok(());
        }
        let mut stream = CodeStream::new(&self.image);
        self.disassembler.promote(&mut stream, &mut self.listing, address)?;
        Ok(())
    }

    // ========== Execution ==========

    /// Registers to reset values; clears the CPU, call stack and history
    pub fn reset(&mut self) {
        self.bus.reset();
        self.cpu.reset();
        self.history.clear();
    }

    /// Execute one given entry
    pub fn execute(&mut self, entry: &ListingEntry) -> Result<(), SimError> {
        run_entry(&mut self.cpu, &mut self.bus, &mut self.history, entry)
    }

    /// Execute the instruction at PC, decoding it first if needed
    pub fn step(&mut self) -> Result<(), SimError> {
        let pc = self.cpu.pc;
        if let Err(err) = self.ensure_code(pc) {
            warn!(pc, %err, "no instruction at pc");
            return Err(err);
        }

        let Self {
            cpu,
            bus,
            listing,
            history,
            ..
        } = self;
        let entry = listing.get(pc).ok_or(ListingError::NoEntry(pc))?;
        run_entry(cpu, bus, history, entry)
    }

    /// Execute up to `steps` instructions with change notifications off
    ///
    /// Returns the number executed; stops at the first failure.
    pub fn run(&mut self, steps: usize) -> Result<usize, SimError> {
        let notifications = self.bus.memory.notifications_enabled();
        self.bus.memory.set_notifications(false);
        let mut executed = 0;
        let outcome = loop {
            if executed == steps {
                break Ok(executed);
            }
            if let Err(err) = self.step() {
                break Err(err);
            }
            executed += 1;
        };
        self.bus.memory.set_notifications(notifications);
        outcome
    }

    // ========== Registers ==========

    pub fn read_register(&self, name: &str) -> Result<u8, SimError> {
        Ok(self.bus.read_register(name)?)
    }

    /// Write through the full pipeline; returns the changed-bit mask
    pub fn write_register(&mut self, name: &str, value: u8) -> Result<u8, SimError> {
        Ok(self.bus.write_register(name, value)?)
    }

    pub fn read_bit(&self, name: &str) -> Result<bool, SimError> {
        Ok(self.bus.read_bit_named(name)?)
    }

    pub fn write_bit(&mut self, name: &str, value: bool) -> Result<(), SimError> {
        self.bus.write_bit_named(name, value)?;
        Ok(())
    }

    pub fn read16(&self, name: &str) -> Result<u16, SimError> {
        Ok(self.bus.read16(name)?)
    }

    pub fn write16(&mut self, name: &str, value: u16) -> Result<(), SimError> {
        Ok(self.bus.write16(name, value)?)
    }

    // ========== Observers ==========

    pub fn register_bit_change_callback(
        &mut self,
        name: &str,
        callback: impl FnMut(bool) + 'static,
    ) -> Result<(), SimError> {
        Ok(self.bus.memory.on_bit_change(name, Box::new(callback))?)
    }

    pub fn register_sfr_change_callback(
        &mut self,
        name: &str,
        callback: impl FnMut(u8) + 'static,
    ) -> Result<(), SimError> {
        Ok(self.bus.memory.on_register_change(name, Box::new(callback))?)
    }

    pub fn register_word_change_callback(
        &mut self,
        name: &str,
        callback: impl FnMut(u16) + 'static,
    ) -> Result<(), SimError> {
        Ok(self.bus.memory.on_word_change(name, Box::new(callback))?)
    }

    /// Suppress or restore observer notifications
    pub fn set_notifications(&mut self, enabled: bool) {
        self.bus.memory.set_notifications(enabled);
    }

    // ========== Pins and Host Inputs ==========

    pub fn set_adc_input(&mut self, channel: usize, value: u16) {
        self.bus.set_adc_input(channel, value);
    }

    pub fn set_ew_pin(&mut self, level: bool) {
        self.bus.set_ew_pin(level);
    }

    /// Deliver a byte to the UART; false if the receiver is disabled
    pub fn receive_serial(&mut self, byte: u8) -> bool {
        self.bus.receive_serial(byte)
    }

    pub fn pwm_output(&self, channel: usize) -> bool {
        self.bus.pwm_output(channel)
    }

    pub fn i2c_status(&self) -> I2cStatus {
        self.bus.peripherals.i2c.status()
    }
}

/// Record, execute and log one entry
///
/// A watchdog reset clears the history the same way `Simulator::reset` does.
fn run_entry(
    cpu: &mut Cpu,
    bus: &mut Bus,
    history: &mut ExecutionHistory,
    entry: &ListingEntry,
) -> Result<(), SimError> {
    history.record(entry, cpu.cycles);
    let result = cpu.execute(bus, entry);
    if let Err(err) = &result {
        error!(%err, history = %history.dump(), "instruction failed");
    }
    if cpu.take_watchdog_reset() {
        history.clear();
    }
    result.map_err(SimError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;
    use crate::error::{DisasmError, ExecError};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn sim(image: &[u8]) -> Simulator {
        Simulator::with_program(SimConfig::default(), image.to_vec()).unwrap()
    }

    #[test]
    fn test_with_program_builds_listing() {
        let s = sim(&[0x02, 0x00, 0x03, 0x22]);
        assert_eq!(s.listing().len(), 2);
        assert_eq!(s.listing().label_at(0), Some("reset"));
        assert_eq!(s.listing().label_at(3), Some("code_0003"));
    }

    #[test]
    fn test_step_follows_listing() {
        // MOV A,#0x05; INC A; SJMP $
        let mut s = sim(&[0x74, 0x05, 0x04, 0x80, 0xFE]);
        s.step().unwrap();
        s.step().unwrap();
        assert_eq!(s.read_register("ACC").unwrap(), 0x06);
        assert_eq!(s.pc(), 3);
        s.step().unwrap();
        assert_eq!(s.pc(), 3);
        assert_eq!(s.history().len(), 3);
    }

    #[test]
    fn test_step_promotes_placeholder() {
        // MOV DPTR,#0x0030; CLR A; JMP @A+DPTR is too far away to be
        // followed, so 0x0030 starts out as data
        let mut code = vec![0x90, 0x00, 0x30, 0xE4, 0x73];
        code.resize(0x40, 0x00);
        code[0x30] = 0x04; // INC A
        let mut s = sim(&code);
        assert!(s.listing().get(0x30).map_or(true, |e| e.is_data()));

        s.run(3).unwrap();
        assert_eq!(s.pc(), 0x30);
        s.step().unwrap();
        assert!(!s.listing().get(0x30).unwrap().is_data());
        assert_eq!(s.read_register("ACC").unwrap(), 0x01);
    }

    #[test]
    fn test_unknown_opcode_keeps_partial_listing() {
        let mut s = Simulator::new(
            SimConfig::default(),
            Box::new(FlatBus::new(vec![])),
            vec![0x00, 0x00, 0xA5],
        )
        .unwrap();
        let err = s.build_listing().unwrap_err();
        assert!(matches!(
            err,
            SimError::Disasm(DisasmError::UnknownOpcode { address: 2, .. })
        ));
        assert_eq!(s.listing().len(), 2);
    }

    #[test]
    fn test_step_into_bad_opcode_fails() {
        let mut s = Simulator::new(
            SimConfig::default(),
            Box::new(FlatBus::new(vec![0x00, 0xA5])),
            vec![0x00, 0xA5],
        )
        .unwrap();
        let _ = s.build_listing();
        s.step().unwrap();
        assert!(s.step().is_err());
        assert_eq!(s.pc(), 1);
    }

    #[test]
    fn test_execute_data_entry_fails() {
        let mut s = sim(&[0x22]);
        let err = s.execute(&ListingEntry::data(0, vec![0x22])).unwrap_err();
        assert!(matches!(err, SimError::Exec(ExecError::DataEntry(0))));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut s = sim(&[0x74, 0x05, 0x80, 0xFE]);
        s.run(2).unwrap();
        s.reset();
        assert_eq!(s.pc(), 0);
        assert_eq!(s.cycles(), 0);
        assert_eq!(s.read_register("ACC").unwrap(), 0);
        assert!(s.history().is_empty());
        assert!(s.cpu.call_stack().is_empty());
    }

    #[test]
    fn test_watchdog_reset_clears_history() {
        let mut s = sim(&[0x80, 0xFE]);
        s.write_register("PCON", 0x10).unwrap();
        s.write_register("T3", 0xFF).unwrap();
        s.set_ew_pin(false);

        let mut reset = false;
        for _ in 0..crate::peripherals::watchdog::PRESCALER_PERIOD {
            let before = s.cycles();
            s.step().unwrap();
            if s.cycles() < before {
                reset = true;
                break;
            }
        }
        assert!(reset);
        assert_eq!(s.pc(), 0);
        assert!(s.history().is_empty());

        s.step().unwrap();
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn test_run_suppresses_notifications() {
        // MOV P1,#0x00; SJMP $
        let mut s = sim(&[0x75, 0x90, 0x00, 0x80, 0xFE]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        s.register_sfr_change_callback("P1", move |v| sink.borrow_mut().push(v))
            .unwrap();

        s.run(2).unwrap();
        assert!(seen.borrow().is_empty());
        assert!(s.bus.memory.notifications_enabled());

        s.write_register("P1", 0x0F).unwrap();
        assert_eq!(*seen.borrow(), vec![0x0F]);
    }

    #[test]
    fn test_bit_and_word_callbacks() {
        let mut s = sim(&[0x00]);
        let bits = Rc::new(RefCell::new(Vec::new()));
        let words = Rc::new(RefCell::new(Vec::new()));
        let bit_sink = Rc::clone(&bits);
        let word_sink = Rc::clone(&words);
        s.register_bit_change_callback("TR0", move |v| bit_sink.borrow_mut().push(v))
            .unwrap();
        s.register_word_change_callback("DPTR", move |v| word_sink.borrow_mut().push(v))
            .unwrap();

        s.write_bit("TR0", true).unwrap();
        s.write_bit("TR0", true).unwrap();
        s.write16("DPTR", 0x1234).unwrap();
        assert_eq!(*bits.borrow(), vec![true]);
        assert_eq!(words.borrow().last(), Some(&0x1234));
    }

    #[test]
    fn test_unknown_names_are_errors() {
        let mut s = sim(&[0x00]);
        assert!(matches!(s.read_register("NOPE"), Err(SimError::Config(_))));
        assert!(s.write_bit("NOPE", true).is_err());
        assert!(s.register_sfr_change_callback("NOPE", |_| {}).is_err());
    }

    #[test]
    fn test_listing_text_round_trip() {
        let s = sim(&[0x02, 0x00, 0x03, 0x22]);
        let text = s.listing_text();
        let mut other = sim(&[0x00]);
        other.load_listing(&text).unwrap();
        assert_eq!(other.listing(), s.listing());
    }

    #[test]
    fn test_load_program_rebuilds() {
        let mut s = sim(&[0x00]);
        s.load_program(vec![0x74, 0x09, 0x22]).unwrap();
        assert_eq!(s.listing().len(), 2);
        s.step().unwrap();
        assert_eq!(s.read_register("ACC").unwrap(), 0x09);
    }

    #[test]
    fn test_history_wraps() {
        let mut history = ExecutionHistory::new(2);
        for address in 0..3u16 {
            let entry = ListingEntry::data(address, vec![0x00]);
            history.record(&entry, address as u64);
        }
        let addresses: Vec<u16> = history.iter().map(|h| h.address).collect();
        assert_eq!(addresses, vec![1, 2]);
        assert!(history.dump().starts_with("0001"));
    }

    #[test]
    fn test_plain_8051_variant() {
        let s = Simulator::with_program(SimConfig::for_variant(Variant::Mcs51), vec![0x22]).unwrap();
        assert!(s.read_register("ADCON").is_err());
        assert_eq!(s.read_register("SP").unwrap(), 0x07);
    }
}
