//! SIO1 I2C serial engine (80C552)
//!
//! A master-mode protocol state machine whose status codes are mirrored in
//! S1STA. The engine only moves while S1CON.ENS1 is set and S1CON.SI is
//! clear; a prescaler selected by CR2:CR1:CR0 paces one protocol step per
//! expiration. Bus traffic is resolved by the external collaborator through
//! `ExternalBus::i2c_command`.
//!
//! Per step:
//! - STO set: back to `Reset`, STO cleared, collaborator sees `Stop`
//! - STA set: `Start` from `Reset`, otherwise `RepeatStart`; SI set and a
//!   byte-plus-ack window of `TRANSFER_STEPS` steps armed
//! - window expired: the address or data phase is resolved and the
//!   matching ACK/NACK status entered, re-arming the window while the
//!   transfer can continue

use tracing::debug;

use crate::bus::ExternalBus;
use crate::memory::Memory;
use crate::sfr::addr;

/// S1CON bits
pub mod s1con {
    pub const CR2: u8 = 1 << 7;
    pub const ENS1: u8 = 1 << 6;
    pub const STA: u8 = 1 << 5;
    pub const STO: u8 = 1 << 4;
    pub const SI: u8 = 1 << 3;
    pub const AA: u8 = 1 << 2;
    pub const CR1: u8 = 1 << 1;
    pub const CR0: u8 = 1 << 0;
}

/// Machine cycles per protocol step, indexed by CR2:CR1:CR0
pub const PRESCALER_CYCLES: [Option<u16>; 8] = [
    Some(43),
    Some(37),
    Some(32),
    Some(27),
    Some(160),
    Some(20),
    Some(10),
    None,
];

/// Protocol steps in one byte-plus-acknowledge transfer
pub const TRANSFER_STEPS: u8 = 9;

/// S1STA status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum I2cStatus {
    Reset = 0xF8,
    Start = 0x08,
    RepeatStart = 0x10,
    SlaWAck = 0x18,
    SlaWNack = 0x20,
    DataWAck = 0x28,
    DataWNack = 0x30,
    SlaRAck = 0x40,
    SlaRNack = 0x48,
    DataRAck = 0x50,
    DataRNack = 0x58,
}

impl I2cStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Another byte follows without software issuing START or STOP
    fn continues(self) -> bool {
        matches!(
            self,
            I2cStatus::SlaWAck | I2cStatus::DataWAck | I2cStatus::SlaRAck | I2cStatus::DataRAck
        )
    }
}

/// Requests passed to the I2C collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cCommand {
    Start,
    Address,
    Data,
    Stop,
}

impl I2cCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            I2cCommand::Start => "STA",
            I2cCommand::Address => "SLA",
            I2cCommand::Data => "DAT",
            I2cCommand::Stop => "STO",
        }
    }
}

#[derive(Debug, Clone)]
pub struct I2cEngine {
    status: I2cStatus,
    prescaler: u16,
    /// Steps left in the current transfer window, 0 when idle
    window: u8,
}

impl I2cEngine {
    pub fn new() -> Self {
        Self {
            status: I2cStatus::Reset,
            prescaler: 0,
            window: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn status(&self) -> I2cStatus {
        self.status
    }

    /// Advance by one machine cycle
    pub fn tick(&mut self, mem: &mut Memory, external: &mut dyn ExternalBus) {
        let control = mem.sfr(addr::S1CON);
        if control & s1con::ENS1 == 0 || control & s1con::SI != 0 {
            return;
        }
        let rate = ((control & s1con::CR2) >> 5) | (control & (s1con::CR1 | s1con::CR0));
        let Some(period) = PRESCALER_CYCLES[rate as usize] else {
            return;
        };
        self.prescaler += 1;
        if self.prescaler < period {
            return;
        }
        self.prescaler = 0;
        self.step(mem, external);
    }

    fn step(&mut self, mem: &mut Memory, external: &mut dyn ExternalBus) {
        let control = mem.sfr(addr::S1CON);

        if control & s1con::STO != 0 {
            self.window = 0;
            mem.set_sfr(addr::S1CON, control & !s1con::STO);
            self.enter(mem, I2cStatus::Reset);
            let mut data = mem.sfr(addr::S1DAT);
            external.i2c_command(I2cCommand::Stop, &mut data);
            return;
        }

        if control & s1con::STA != 0 {
            let next = if self.status == I2cStatus::Reset {
                I2cStatus::Start
            } else {
                I2cStatus::RepeatStart
            };
            self.enter(mem, next);
            let mut data = mem.sfr(addr::S1DAT);
            external.i2c_command(I2cCommand::Start, &mut data);
            mem.set_sfr(addr::S1CON, control | s1con::SI);
            self.window = TRANSFER_STEPS;
            return;
        }

        if self.window == 0 {
            return;
        }
        self.window -= 1;
        if self.window > 0 {
            return;
        }

        let next = match self.status {
            I2cStatus::Start | I2cStatus::RepeatStart => {
                let mut data = mem.sfr(addr::S1DAT);
                let read = data & 0x01 != 0;
                let ack = external.i2c_command(I2cCommand::Address, &mut data);
                match (read, ack) {
                    (false, true) => I2cStatus::SlaWAck,
                    (false, false) => I2cStatus::SlaWNack,
                    (true, true) => I2cStatus::SlaRAck,
                    (true, false) => I2cStatus::SlaRNack,
                }
            }
            I2cStatus::SlaWAck | I2cStatus::DataWAck => {
                let mut data = mem.sfr(addr::S1DAT);
                if external.i2c_command(I2cCommand::Data, &mut data) {
                    I2cStatus::DataWAck
                } else {
                    I2cStatus::DataWNack
                }
            }
            I2cStatus::SlaRAck | I2cStatus::DataRAck => {
                let mut data = 0xFF;
                external.i2c_command(I2cCommand::Data, &mut data);
                mem.set_sfr(addr::S1DAT, data);
                if control & s1con::AA != 0 {
                    I2cStatus::DataRAck
                } else {
                    I2cStatus::DataRNack
                }
            }
            _ => return,
        };

        self.enter(mem, next);
        mem.set_sfr(addr::S1CON, mem.sfr(addr::S1CON) | s1con::SI);
        self.window = if next.continues() { TRANSFER_STEPS } else { 0 };
    }

    fn enter(&mut self, mem: &mut Memory, status: I2cStatus) {
        if status != self.status {
            debug!(from = ?self.status, to = ?status, "I2C state change");
        }
        self.status = status;
        mem.set_sfr(addr::S1STA, status.code());
    }
}

impl Default for I2cEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;
    use crate::sfr::RegisterMap;

    /// Collaborator that records commands and answers from a script
    struct Target {
        log: Vec<(I2cCommand, u8)>,
        ack: bool,
        read_value: u8,
    }

    impl ExternalBus for Target {
        fn code_byte(&mut self, _address: u16) -> u8 {
            0xFF
        }
        fn ram_byte(&mut self, _address: u16) -> u8 {
            0xFF
        }
        fn set_ram_byte(&mut self, _address: u16, _value: u8) {}
        fn i2c_command(&mut self, command: I2cCommand, data: &mut u8) -> bool {
            if command == I2cCommand::Data && self.read_value != 0 {
                *data = self.read_value;
            }
            self.log.push((command, *data));
            self.ack
        }
    }

    fn setup(ack: bool) -> (I2cEngine, Memory, Target) {
        let mem = Memory::new(RegisterMap::for_variant(Variant::C552));
        let target = Target {
            log: Vec::new(),
            ack,
            read_value: 0,
        };
        (I2cEngine::new(), mem, target)
    }

    /// Run until SI is set, with the fastest prescaler
    fn run_to_si(engine: &mut I2cEngine, mem: &mut Memory, target: &mut Target) {
        for _ in 0..10_000 {
            engine.tick(mem, target);
            if mem.sfr(addr::S1CON) & s1con::SI != 0 {
                return;
            }
        }
        panic!("SI never set, status {:?}", engine.status());
    }

    /// Clear SI and update control bits like a driver would
    fn write_control(mem: &mut Memory, set: u8, clear: u8) {
        let value = (mem.sfr(addr::S1CON) | set) & !clear & !s1con::SI;
        mem.set_sfr(addr::S1CON, value);
    }

    const FAST: u8 = s1con::ENS1 | s1con::CR2 | s1con::CR1;

    #[test]
    fn test_start_from_reset() {
        let (mut engine, mut mem, mut target) = setup(true);
        mem.set_sfr(addr::S1CON, FAST | s1con::STA);
        run_to_si(&mut engine, &mut mem, &mut target);
        assert_eq!(engine.status(), I2cStatus::Start);
        assert_eq!(mem.sfr(addr::S1STA), 0x08);
        assert_eq!(target.log[0].0, I2cCommand::Start);
    }

    #[test]
    fn test_start_after_address_ack_is_repeat_start() {
        let (mut engine, mut mem, mut target) = setup(true);
        mem.set_sfr(addr::S1CON, FAST | s1con::STA);
        run_to_si(&mut engine, &mut mem, &mut target);

        mem.set_sfr(addr::S1DAT, 0x50 << 1);
        write_control(&mut mem, 0, s1con::STA);
        run_to_si(&mut engine, &mut mem, &mut target);
        assert_eq!(engine.status(), I2cStatus::SlaWAck);
        assert_eq!(target.log[1], (I2cCommand::Address, 0xA0));

        write_control(&mut mem, s1con::STA, 0);
        run_to_si(&mut engine, &mut mem, &mut target);
        assert_eq!(engine.status(), I2cStatus::RepeatStart);
        assert_eq!(mem.sfr(addr::S1STA), 0x10);
    }

    #[test]
    fn test_address_nack_stops_transfer() {
        let (mut engine, mut mem, mut target) = setup(false);
        mem.set_sfr(addr::S1CON, FAST | s1con::STA);
        run_to_si(&mut engine, &mut mem, &mut target);
        mem.set_sfr(addr::S1DAT, 0x20);
        write_control(&mut mem, 0, s1con::STA);
        run_to_si(&mut engine, &mut mem, &mut target);
        assert_eq!(engine.status(), I2cStatus::SlaWNack);

        // Nothing happens until software asks for STOP
        write_control(&mut mem, 0, 0);
        for _ in 0..1000 {
            engine.tick(&mut mem, &mut target);
        }
        assert_eq!(target.log.len(), 2);

        write_control(&mut mem, s1con::STO, 0);
        for _ in 0..100 {
            engine.tick(&mut mem, &mut target);
        }
        assert_eq!(engine.status(), I2cStatus::Reset);
        assert_eq!(mem.sfr(addr::S1CON) & s1con::STO, 0);
        assert_eq!(target.log.last().unwrap().0, I2cCommand::Stop);
    }

    #[test]
    fn test_write_data_phase() {
        let (mut engine, mut mem, mut target) = setup(true);
        mem.set_sfr(addr::S1CON, FAST | s1con::STA);
        run_to_si(&mut engine, &mut mem, &mut target);
        mem.set_sfr(addr::S1DAT, 0x40);
        write_control(&mut mem, 0, s1con::STA);
        run_to_si(&mut engine, &mut mem, &mut target);
        mem.set_sfr(addr::S1DAT, 0x5A);
        write_control(&mut mem, 0, 0);
        run_to_si(&mut engine, &mut mem, &mut target);
        assert_eq!(engine.status(), I2cStatus::DataWAck);
        assert_eq!(target.log[2], (I2cCommand::Data, 0x5A));
    }

    #[test]
    fn test_read_phase_uses_aa() {
        let (mut engine, mut mem, mut target) = setup(true);
        target.read_value = 0x77;
        mem.set_sfr(addr::S1CON, FAST | s1con::STA | s1con::AA);
        run_to_si(&mut engine, &mut mem, &mut target);
        mem.set_sfr(addr::S1DAT, 0x41);
        write_control(&mut mem, 0, s1con::STA);
        run_to_si(&mut engine, &mut mem, &mut target);
        assert_eq!(engine.status(), I2cStatus::SlaRAck);

        write_control(&mut mem, 0, 0);
        run_to_si(&mut engine, &mut mem, &mut target);
        assert_eq!(engine.status(), I2cStatus::DataRAck);
        assert_eq!(mem.sfr(addr::S1DAT), 0x77);

        write_control(&mut mem, 0, s1con::AA);
        run_to_si(&mut engine, &mut mem, &mut target);
        assert_eq!(engine.status(), I2cStatus::DataRNack);
    }

    #[test]
    fn test_disabled_prescaler_never_steps() {
        let (mut engine, mut mem, mut target) = setup(true);
        mem.set_sfr(addr::S1CON, s1con::ENS1 | s1con::CR2 | s1con::CR1 | s1con::CR0 | s1con::STA);
        for _ in 0..1000 {
            engine.tick(&mut mem, &mut target);
        }
        assert_eq!(engine.status(), I2cStatus::Reset);
        assert!(target.log.is_empty());
    }
}
