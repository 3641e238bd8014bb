//! Priority interrupt controller
//!
//! Interrupt sources are declared as plain data: vector address, fixed
//! polling rank, enable bit, priority bit, pending flags and what hardware
//! clears when the vector is taken. The controller resolves the names once
//! against the register map and afterwards works on bit locations only.
//!
//! Effective priority is the polling rank, raised by `HIGH_PRIORITY_BOOST`
//! when the source's IP0/IP1 bit is set. EA gates every source.

use tracing::debug;

use crate::config::Variant;
use crate::error::ConfigError;
use crate::memory::Memory;
use crate::sfr::{BitLocation, RegisterMap};

/// Added to the rank of sources whose priority bit is set
pub const HIGH_PRIORITY_BOOST: u8 = 16;

/// Vector addresses
pub mod vectors {
    pub const EXTERNAL0: u16 = 0x0003;
    pub const TIMER0: u16 = 0x000B;
    pub const EXTERNAL1: u16 = 0x0013;
    pub const TIMER1: u16 = 0x001B;
    pub const SERIAL0: u16 = 0x0023;
    pub const SERIAL1: u16 = 0x002B;
    pub const CAPTURE0: u16 = 0x0033;
    pub const CAPTURE1: u16 = 0x003B;
    pub const CAPTURE2: u16 = 0x0043;
    pub const CAPTURE3: u16 = 0x004B;
    pub const ADC: u16 = 0x0053;
    pub const COMPARE0: u16 = 0x005B;
    pub const COMPARE1: u16 = 0x0063;
    pub const COMPARE2: u16 = 0x006B;
    pub const TIMER2: u16 = 0x0073;
}

/// What the hardware clears when a vector is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearAction {
    /// Software must clear the flags
    None,
    /// All pending flags are cleared
    Flags,
    /// Flags are cleared only while the named mode bit selects edge triggering
    FlagsIfEdge(&'static str),
}

/// Declaration of one interrupt source
#[derive(Debug, Clone, Copy)]
pub struct InterruptSource {
    pub name: &'static str,
    pub vector: u16,
    /// Fixed polling rank, higher wins
    pub rank: u8,
    pub enable: &'static str,
    pub priority: &'static str,
    pub flags: &'static [&'static str],
    pub clear: ClearAction,
}

const fn source(
    name: &'static str,
    vector: u16,
    rank: u8,
    enable: &'static str,
    priority: &'static str,
    flags: &'static [&'static str],
    clear: ClearAction,
) -> InterruptSource {
    InterruptSource {
        name,
        vector,
        rank,
        enable,
        priority,
        flags,
        clear,
    }
}

const CORE_SOURCES: &[InterruptSource] = &[
    source("X0", vectors::EXTERNAL0, 5, "EX0", "PX0", &["IE0"], ClearAction::FlagsIfEdge("IT0")),
    source("T0", vectors::TIMER0, 4, "ET0", "PT0", &["TF0"], ClearAction::Flags),
    source("X1", vectors::EXTERNAL1, 3, "EX1", "PX1", &["IE1"], ClearAction::FlagsIfEdge("IT1")),
    source("T1", vectors::TIMER1, 2, "ET1", "PT1", &["TF1"], ClearAction::Flags),
    source("S0", vectors::SERIAL0, 1, "ES0", "PS0", &["RI", "TI"], ClearAction::None),
];

/// 80C552 sources in hardware polling order
const C552_SOURCES: &[InterruptSource] = &[
    source("X0", vectors::EXTERNAL0, 15, "EX0", "PX0", &["IE0"], ClearAction::FlagsIfEdge("IT0")),
    source("S1", vectors::SERIAL1, 14, "ES1", "PS1", &["SI"], ClearAction::None),
    source("ADC", vectors::ADC, 13, "EAD", "PAD", &["ADCI"], ClearAction::None),
    source("T0", vectors::TIMER0, 12, "ET0", "PT0", &["TF0"], ClearAction::Flags),
    source("CT0", vectors::CAPTURE0, 11, "ECT0", "PCT0", &["CTI0"], ClearAction::None),
    source("CM0", vectors::COMPARE0, 10, "ECM0", "PCM0", &["CMI0"], ClearAction::None),
    source("X1", vectors::EXTERNAL1, 9, "EX1", "PX1", &["IE1"], ClearAction::FlagsIfEdge("IT1")),
    source("CT1", vectors::CAPTURE1, 8, "ECT1", "PCT1", &["CTI1"], ClearAction::None),
    source("CM1", vectors::COMPARE1, 7, "ECM1", "PCM1", &["CMI1"], ClearAction::None),
    source("T1", vectors::TIMER1, 6, "ET1", "PT1", &["TF1"], ClearAction::Flags),
    source("CT2", vectors::CAPTURE2, 5, "ECT2", "PCT2", &["CTI2"], ClearAction::None),
    source("CM2", vectors::COMPARE2, 4, "ECM2", "PCM2", &["CMI2"], ClearAction::None),
    source("S0", vectors::SERIAL0, 3, "ES0", "PS0", &["RI", "TI"], ClearAction::None),
    source("CT3", vectors::CAPTURE3, 2, "ECT3", "PCT3", &["CTI3"], ClearAction::None),
    source("T2", vectors::TIMER2, 1, "ET2", "PT2", &["T2OV"], ClearAction::None),
];

/// Built-in source table for a variant
pub fn sources_for(variant: Variant) -> &'static [InterruptSource] {
    match variant {
        Variant::Mcs51 => CORE_SOURCES,
        Variant::C552 => C552_SOURCES,
    }
}

#[derive(Debug, Clone, Copy)]
enum Clear {
    None,
    Flags,
    FlagsIfEdge(BitLocation),
}

#[derive(Debug, Clone)]
struct Source {
    name: &'static str,
    vector: u16,
    rank: u8,
    enable: BitLocation,
    priority: BitLocation,
    flags: Vec<BitLocation>,
    clear: Clear,
}

impl Source {
    fn requesting(&self, mem: &Memory) -> bool {
        mem.test(self.enable) && self.flags.iter().any(|flag| mem.test(*flag))
    }

    fn effective_priority(&self, mem: &Memory) -> u8 {
        if mem.test(self.priority) {
            self.rank + HIGH_PRIORITY_BOOST
        } else {
            self.rank
        }
    }
}

/// Interrupt arbitration over a fixed set of sources
#[derive(Debug, Clone)]
pub struct InterruptController {
    global_enable: BitLocation,
    sources: Vec<Source>,
}

impl InterruptController {
    /// Resolve a source table against a register map
    pub fn new(map: &RegisterMap, sources: &[InterruptSource]) -> Result<Self, ConfigError> {
        let mut resolved = Vec::with_capacity(sources.len());
        for decl in sources {
            if resolved.iter().any(|s: &Source| s.vector == decl.vector) {
                return Err(ConfigError::DuplicateName(decl.name.to_string()));
            }
            let flags = decl
                .flags
                .iter()
                .map(|flag| map.bit(flag))
                .collect::<Result<Vec<_>, _>>()?;
            let clear = match decl.clear {
                ClearAction::None => Clear::None,
                ClearAction::Flags => Clear::Flags,
                ClearAction::FlagsIfEdge(mode) => Clear::FlagsIfEdge(map.bit(mode)?),
            };
            resolved.push(Source {
                name: decl.name,
                vector: decl.vector,
                rank: decl.rank,
                enable: map.bit(decl.enable)?,
                priority: map.bit(decl.priority)?,
                flags,
                clear,
            });
        }
        Ok(Self {
            global_enable: map.bit("EA")?,
            sources: resolved,
        })
    }

    /// Controller with the built-in sources of the map's variant
    pub fn for_map(map: &RegisterMap) -> Result<Self, ConfigError> {
        Self::new(map, sources_for(map.variant()))
    }

    /// Declared sources as (name, vector)
    pub fn sources(&self) -> impl Iterator<Item = (&'static str, u16)> + '_ {
        self.sources.iter().map(|s| (s.name, s.vector))
    }

    fn find(&self, vector: u16) -> Option<&Source> {
        self.sources.iter().find(|s| s.vector == vector)
    }

    pub fn name_of(&self, vector: u16) -> Option<&'static str> {
        self.find(vector).map(|s| s.name)
    }

    pub fn globally_enabled(&self, mem: &Memory) -> bool {
        mem.test(self.global_enable)
    }

    /// Source is enabled and has a pending flag (EA not considered)
    pub fn is_requesting(&self, vector: u16, mem: &Memory) -> bool {
        self.find(vector).is_some_and(|s| s.requesting(mem))
    }

    pub fn priority(&self, vector: u16, mem: &Memory) -> Option<u8> {
        self.find(vector).map(|s| s.effective_priority(mem))
    }

    /// Vector of the highest-priority requesting source, if EA is set
    ///
    /// Ties go to the lowest vector address.
    pub fn arbitrate(&self, mem: &Memory) -> Option<u16> {
        if !self.globally_enabled(mem) {
            return None;
        }
        self.sources
            .iter()
            .filter(|s| s.requesting(mem))
            .max_by_key(|s| (s.effective_priority(mem), std::cmp::Reverse(s.vector)))
            .map(|s| s.vector)
    }

    /// Apply the source's clear action as its vector is taken
    pub fn acknowledge(&self, vector: u16, mem: &mut Memory) {
        let Some(source) = self.find(vector) else {
            return;
        };
        let clear = match source.clear {
            Clear::None => false,
            Clear::Flags => true,
            Clear::FlagsIfEdge(mode) => mem.test(mode),
        };
        if clear {
            for flag in &source.flags {
                mem.set(*flag, false);
            }
        }
        debug!(source = source.name, vector, cleared = clear, "interrupt acknowledged");
    }

    /// Vector enabled by a given enable bit
    pub fn vector_for_enable(&self, location: BitLocation) -> Option<u16> {
        self.sources
            .iter()
            .find(|s| s.enable == location)
            .map(|s| s.vector)
    }
}
