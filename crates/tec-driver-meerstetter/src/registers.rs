//! TEC-1089-SV register map.
//!
//! Each logical quantity maps to a fixed `{parameter id, instance, value
//! kind}` triple. The table is static; nothing is discovered at runtime.
//!
//! Reference: TEC Controller Communication Protocol 5136 (MeCom parameter list)

use crate::codec::ValueKind;

/// Instance used for single-channel controllers.
pub const DEFAULT_INSTANCE: u8 = 1;

/// Whether a register can be read, written, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Readback only
    Read,
    /// Write only (configuration switches)
    Write,
    /// Read and write
    ReadWrite,
}

impl Access {
    /// Register may be read with `?VR`
    pub fn readable(&self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Register may be written with `VS`
    pub fn writable(&self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// A device register and how to interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    /// Short name, used by tools and logs
    pub name: &'static str,
    /// MeCom parameter id
    pub id: u16,
    /// Channel sub-index
    pub instance: u8,
    /// Value encoding
    pub kind: ValueKind,
    /// Allowed directions
    pub access: Access,
    /// Physical unit of the value, if any
    pub unit: Option<&'static str>,
}

impl Register {
    const fn new(
        name: &'static str,
        id: u16,
        kind: ValueKind,
        access: Access,
        unit: Option<&'static str>,
    ) -> Self {
        Self {
            name,
            id,
            instance: DEFAULT_INSTANCE,
            kind,
            access,
            unit,
        }
    }

    /// Same register on another channel.
    pub const fn with_instance(mut self, instance: u8) -> Self {
        self.instance = instance;
        self
    }
}

/// Object (load) temperature, °C
pub const OBJECT_TEMPERATURE: Register = Register::new(
    "object_temperature",
    1000,
    ValueKind::Float32,
    Access::Read,
    Some("°C"),
);

/// Heat sink temperature, °C
pub const SINK_TEMPERATURE: Register = Register::new(
    "sink_temperature",
    1001,
    ValueKind::Float32,
    Access::Read,
    Some("°C"),
);

/// Actual output current, A
pub const OUTPUT_CURRENT: Register = Register::new(
    "output_current",
    1020,
    ValueKind::Float32,
    Access::Read,
    Some("A"),
);

/// Actual output voltage, V
pub const OUTPUT_VOLTAGE: Register = Register::new(
    "output_voltage",
    1021,
    ValueKind::Float32,
    Access::Read,
    Some("V"),
);

/// Temperature stability indicator (0 off, 1 unstable, 2 stable)
pub const TEMPERATURE_STABILITY: Register = Register::new(
    "temperature_stability",
    1200,
    ValueKind::Int32,
    Access::Read,
    None,
);

/// Output stage enable (0 off, 1 on)
pub const OUTPUT_ENABLE: Register = Register::new(
    "output_enable",
    2010,
    ValueKind::Int32,
    Access::ReadWrite,
    None,
);

/// Target object temperature, °C
pub const TARGET_TEMPERATURE: Register = Register::new(
    "target_temperature",
    3000,
    ValueKind::Float32,
    Access::ReadWrite,
    Some("°C"),
);

/// Disable persisting parameter writes to flash (1 = don't save)
pub const SAVE_TO_FLASH_DISABLED: Register = Register::new(
    "save_to_flash_disabled",
    108,
    ValueKind::Int32,
    Access::Write,
    None,
);

/// Ramp start point selection
pub const RAMP_START_POINT: Register = Register::new(
    "ramp_start_point",
    50010,
    ValueKind::Int32,
    Access::Write,
    None,
);

/// Every register the driver knows, ordered by id.
pub static REGISTERS: &[Register] = &[
    SAVE_TO_FLASH_DISABLED,
    OBJECT_TEMPERATURE,
    SINK_TEMPERATURE,
    OUTPUT_CURRENT,
    OUTPUT_VOLTAGE,
    TEMPERATURE_STABILITY,
    OUTPUT_ENABLE,
    TARGET_TEMPERATURE,
    RAMP_START_POINT,
];

/// Look a register up by parameter id.
pub fn by_id(id: u16) -> Option<&'static Register> {
    REGISTERS.iter().find(|r| r.id == id)
}

/// Look a register up by its short name.
pub fn by_name(name: &str) -> Option<&'static Register> {
    REGISTERS.iter().find(|r| r.name == name)
}
