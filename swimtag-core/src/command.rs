//! Reader command codes

use std::fmt;

/// Frame opcodes
///
/// Only the inventory responses are interpreted. Every other opcode is kept
/// as [`Command::Other`] so non-inventory traffic still decodes structurally.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    // Real-time inventory
    RealTimeInventory,
    FastSwitchAntInventory,
    CustomizedSessionTargetInventory,

    // Buffered retrieval
    GetInventoryBuffer,
    GetAndResetInventoryBuffer,

    /// Any opcode without tag semantics
    Other(u8),
}

impl Command {
    /// Opcode byte
    pub fn code(self) -> u8 {
        match self {
            Self::RealTimeInventory => 0x89,
            Self::FastSwitchAntInventory => 0x8A,
            Self::CustomizedSessionTargetInventory => 0x8B,
            Self::GetInventoryBuffer => 0x90,
            Self::GetAndResetInventoryBuffer => 0x91,
            Self::Other(code) => code,
        }
    }

    /// Check if frames with this opcode carry tag sightings
    pub fn is_inventory(self) -> bool {
        self.is_real_time() || self.is_buffered()
    }

    /// Check if this is a real-time inventory response
    pub fn is_real_time(self) -> bool {
        matches!(
            self,
            Self::RealTimeInventory
                | Self::FastSwitchAntInventory
                | Self::CustomizedSessionTargetInventory
        )
    }

    /// Check if this is a buffered retrieval response
    pub fn is_buffered(self) -> bool {
        matches!(self, Self::GetInventoryBuffer | Self::GetAndResetInventoryBuffer)
    }

    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::RealTimeInventory => "CMD_REAL_TIME_INVENTORY",
            Self::FastSwitchAntInventory => "CMD_FAST_SWITCH_ANT_INVENTORY",
            Self::CustomizedSessionTargetInventory => "CMD_CUSTOMIZED_SESSION_TARGET_INVENTORY",
            Self::GetInventoryBuffer => "CMD_GET_INVENTORY_BUFFER",
            Self::GetAndResetInventoryBuffer => "CMD_GET_AND_RESET_INVENTORY_BUFFER",
            Self::Other(_) => "CMD_OTHER",
        }
    }
}

impl From<u8> for Command {
    fn from(value: u8) -> Self {
        match value {
            0x89 => Self::RealTimeInventory,
            0x8A => Self::FastSwitchAntInventory,
            0x8B => Self::CustomizedSessionTargetInventory,
            0x90 => Self::GetInventoryBuffer,
            0x91 => Self::GetAndResetInventoryBuffer,
            other => Self::Other(other),
        }
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        cmd.code()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), self.code())
    }
}
