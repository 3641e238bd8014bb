//! Simulator configuration

/// Supported chip variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Variant {
    /// Plain 8051 core: two timers, UART, five interrupt sources
    Mcs51,
    /// 80C552-style core with T2 capture/compare, ADC, PWM, watchdog and I2C
    #[default]
    C552,
}

impl Variant {
    pub fn name(self) -> &'static str {
        match self {
            Variant::Mcs51 => "8051",
            Variant::C552 => "80C552",
        }
    }

    pub fn has_extended_peripherals(self) -> bool {
        self == Variant::C552
    }

    /// Parse a variant number used by the C ABI (0 = 8051, 1 = 80C552)
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(Variant::Mcs51),
            1 => Some(Variant::C552),
            _ => None,
        }
    }
}

/// Simulator construction parameters
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub variant: Variant,
    /// Level of the active-low EW pin at power-up (high keeps the watchdog off)
    pub ew_pin: bool,
    /// Label given to the reset entry point when the listing is built
    pub entry_label: String,
    /// Number of executed instructions kept for diagnostics
    pub history_len: usize,
    /// Machine cycles from an S0BUF write until TI is raised
    pub serial_cycles_per_byte: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            variant: Variant::default(),
            ew_pin: true,
            entry_label: "reset".to_string(),
            history_len: 64,
            serial_cycles_per_byte: 320,
        }
    }
}

impl SimConfig {
    pub fn for_variant(variant: Variant) -> Self {
        Self {
            variant,
            ..Self::default()
        }
    }
}
