//! Register maps of the ANX7688's two register spaces.
//!
//! The firmware ("main") space carries the OCM configuration, status and
//! soft-interrupt registers. The TCPC-like secondary space carries the
//! vendor identification, alert and message-interface registers.

use proc_bitfield::bitfield;

/// Firmware register space.
pub mod main {
    /// OCM reset control.
    pub const USBC_RESET_CTRL: u8 = 0x05;
    /// Reset bit in [`USBC_RESET_CTRL`].
    pub const OCM_RESET: u8 = 1 << 4;

    /// EEPROM firmware load status.
    pub const EEPROM_LOAD_STATUS0: u8 = 0x12;
    /// Set in [`EEPROM_LOAD_STATUS0`] once the OCM firmware has booted.
    pub const EEPROM_FW_LOADED: u8 = 0x01;

    /// Firmware version, high byte.
    pub const FW_VERSION1: u8 = 0x15;
    /// Firmware version, low byte.
    pub const FW_VERSION0: u8 = 0x16;

    /// Mask register for the soft status interrupts.
    pub const STATUS_INT_MASK: u8 = 0x17;

    /// Maximum contract voltage, in 100 mV units.
    pub const MAX_VOLTAGE: u8 = 0x1b;
    /// Maximum contract power, in 500 mW units.
    pub const MAX_POWER: u8 = 0x1c;
    /// Minimum contract power, in 500 mW units.
    pub const MIN_POWER: u8 = 0x1d;
    /// Auto-negotiated RDO voltage, in 100 mV units.
    pub const MAX_VOLTAGE_STATUS: u8 = 0x1e;
    /// Auto-negotiated RDO power, in 500 mW units.
    pub const MAX_POWER_STATUS: u8 = 0x1f;

    /// Delay before VBUS turns off after CC disconnect, in 4 ms units.
    pub const VBUS_OFF_DELAY_TIME: u8 = 0x22;
    /// Try-UFP period, in 2 ms units.
    pub const TRY_UFP_TIMER: u8 = 0x23;
    /// Timing control.
    pub const TIME_CTRL: u8 = 0x24;

    /// PD policy feature control.
    pub const FEATURE_CTRL: u8 = 0x27;
    /// Try-source policy bit in [`FEATURE_CTRL`].
    pub const FEATURE_TRY_SRC: u8 = 1 << 2;

    /// Soft status interrupt source.
    pub const STATUS_INT: u8 = 0x28;
    /// A message from the OCM is pending.
    pub const INT_RECEIVED_MSG: u8 = 1 << 0;
    /// The OCM acknowledged a sent message.
    pub const INT_RECEIVED_ACK: u8 = 1 << 1;
    /// VCONN sourcing state changed.
    pub const INT_VCONN_CHANGE: u8 = 1 << 2;
    /// VBUS sourcing state changed.
    pub const INT_VBUS_CHANGE: u8 = 1 << 3;
    /// CC pin status changed.
    pub const INT_CC_STATUS_CHANGE: u8 = 1 << 4;
    /// Data role changed.
    pub const INT_DATA_ROLE_CHANGE: u8 = 1 << 5;
    /// All soft interrupt sources this driver consumes.
    pub const SOFT_INT_MASK: u8 = 0x7f;

    /// Chip status, see [`Status`](super::Status).
    pub const STATUS: u8 = 0x29;
    /// CC pin status, see [`CcStatus`](super::CcStatus).
    pub const CC_STATUS: u8 = 0x2a;

    /// Mask for the third external interrupt source bank.
    pub const IRQ_EXT_MASK2: u8 = 0x3d;
    /// Third external interrupt source bank.
    pub const IRQ_EXT_SOURCE2: u8 = 0x4f;
    /// Soft interrupt line in [`IRQ_EXT_SOURCE2`].
    pub const IRQ2_SOFT_INT: u8 = 1 << 2;
}

/// Secondary (TCPC-like) register space.
pub mod tcpc {
    /// Vendor identifier, low byte.
    pub const VENDOR_ID0: u8 = 0x00;
    /// Vendor identifier, high byte.
    pub const VENDOR_ID1: u8 = 0x01;

    /// Alert status.
    pub const ALERT0: u8 = 0x10;
    /// Alert status, second bank.
    pub const ALERT1: u8 = 0x11;
    /// Alert mask.
    pub const ALERT_MASK0: u8 = 0x12;
    /// Alert mask, second bank.
    pub const ALERT_MASK1: u8 = 0x13;

    /// Outbound OCM message window; nonzero while the queue is occupied.
    pub const INTERFACE_SEND: u8 = 0x30;
    /// Inbound OCM message window.
    pub const INTERFACE_RECV: u8 = 0x51;

    /// DisplayPort alt-mode state.
    pub const DP_STATE: u8 = 0x87;
    /// DisplayPort alt-mode substate.
    pub const DP_SUBSTATE: u8 = 0x88;
}

bitfield! {
    /// The main-space [`STATUS`](main::STATUS) register.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Status(pub u8): Debug, FromStorage, IntoStorage {
        /// Data role, set when the chip operates as host (DFP).
        pub data_role_host: bool @ 5,
        /// VBUS is driven by the chip.
        pub vbus_on: bool @ 3,
        /// VCONN is driven by the chip.
        pub vconn_on: bool @ 2,
    }
}

bitfield! {
    /// The main-space [`CC_STATUS`](main::CC_STATUS) register, one nibble
    /// per CC pin.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct CcStatus(pub u8): Debug, FromStorage, IntoStorage {
        /// Raw CC2 nibble.
        pub cc2_raw: u8 @ 4..=7,
        /// Raw CC1 nibble.
        pub cc1_raw: u8 @ 0..=3,
    }
}

impl CcStatus {
    /// Decoded CC1 signaling.
    pub fn cc1(&self) -> CcPull {
        CcPull::from_raw(self.cc1_raw())
    }

    /// Decoded CC2 signaling.
    pub fn cc2(&self) -> CcPull {
        CcPull::from_raw(self.cc2_raw())
    }
}

/// Passive signaling observed on a CC pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CcPull {
    /// No termination.
    Open,
    /// Partner presents Rd.
    Rd,
    /// Partner presents Ra.
    Ra,
    /// Default USB current advertisement.
    Default,
    /// 1.5 A current advertisement.
    Power15,
    /// 3.0 A current advertisement.
    Power30,
    /// An unexpected nibble value.
    Unknown(u8),
}

impl CcPull {
    /// Decode one CC status nibble.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => CcPull::Open,
            1 => CcPull::Rd,
            2 => CcPull::Ra,
            4 => CcPull::Default,
            8 => CcPull::Power15,
            12 => CcPull::Power30,
            other => CcPull::Unknown(other),
        }
    }

    /// Short name, as used in status logs.
    pub fn name(&self) -> &'static str {
        match self {
            CcPull::Open => "SRC.Open",
            CcPull::Rd => "SRC.Rd",
            CcPull::Ra => "SRC.Ra",
            CcPull::Default => "SNK.Default",
            CcPull::Power15 => "SNK.Power1.5",
            CcPull::Power30 => "SNK.Power3.0",
            CcPull::Unknown(_) => "UNK",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CcPull, CcStatus, Status};

    #[test]
    fn status_bits() {
        let status = Status(0);
        assert!(!status.vbus_on());
        assert!(!status.vconn_on());
        assert!(!status.data_role_host());

        let status = Status(1 << 3 | 1 << 5);
        assert!(status.vbus_on());
        assert!(!status.vconn_on());
        assert!(status.data_role_host());
    }

    #[test]
    fn cc_status_nibbles() {
        let cc = CcStatus(0xc8);
        assert_eq!(cc.cc1(), CcPull::Power15);
        assert_eq!(cc.cc2(), CcPull::Power30);

        let cc = CcStatus(0x04);
        assert_eq!(cc.cc1(), CcPull::Default);
        assert_eq!(cc.cc2(), CcPull::Open);
    }

    #[test]
    fn cc_pull_unknown_values() {
        assert_eq!(CcPull::from_raw(7), CcPull::Unknown(7));
        assert_eq!(CcPull::from_raw(7).name(), "UNK");
    }
}
