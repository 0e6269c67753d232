//! Power Data Object and Request Data Object encodings.
//!
//! PDOs travel as 32-bit little-endian words; the two top bits select the
//! supply kind. Units follow the PD encoding: 50 mV voltage steps, 10 mA
//! current steps, 250 mW power steps.

use byteorder::{ByteOrder, LittleEndian};
use heapless::Vec;
use proc_bitfield::bitfield;

bitfield! {
    /// An unclassified power data object.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct RawPowerDataObject(pub u32): Debug, FromStorage, IntoStorage {
        /// Supply kind selector.
        pub kind: u8 @ 30..=31,
    }
}

bitfield! {
    /// Fixed supply PDO.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct FixedSupply(pub u32): Debug, FromStorage, IntoStorage {
        /// Supply kind selector.
        pub kind: u8 @ 30..=31,
        /// Dual-role power.
        pub dual_role_power: bool @ 29,
        /// Unconstrained power.
        pub unconstrained_power: bool @ 27,
        /// Voltage in 50 mV units.
        pub raw_voltage: u16 @ 10..=19,
        /// Maximum current in 10 mA units.
        pub raw_max_current: u16 @ 0..=9,
    }
}

impl FixedSupply {
    /// Supply voltage in millivolts.
    pub fn voltage_mv(&self) -> u32 {
        u32::from(self.raw_voltage()) * 50
    }

    /// Maximum current in milliamperes.
    pub fn max_current_ma(&self) -> u32 {
        u32::from(self.raw_max_current()) * 10
    }
}

bitfield! {
    /// Battery supply PDO.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Battery(pub u32): Debug, FromStorage, IntoStorage {
        /// Supply kind selector.
        pub kind: u8 @ 30..=31,
        /// Maximum voltage in 50 mV units.
        pub raw_max_voltage: u16 @ 20..=29,
        /// Minimum voltage in 50 mV units.
        pub raw_min_voltage: u16 @ 10..=19,
        /// Maximum power in 250 mW units.
        pub raw_max_power: u16 @ 0..=9,
    }
}

impl Battery {
    /// Maximum voltage in millivolts.
    pub fn max_voltage_mv(&self) -> u32 {
        u32::from(self.raw_max_voltage()) * 50
    }

    /// Minimum voltage in millivolts.
    pub fn min_voltage_mv(&self) -> u32 {
        u32::from(self.raw_min_voltage()) * 50
    }

    /// Maximum power in milliwatts.
    pub fn max_power_mw(&self) -> u32 {
        u32::from(self.raw_max_power()) * 250
    }
}

bitfield! {
    /// Variable (non-battery) supply PDO.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct VariableSupply(pub u32): Debug, FromStorage, IntoStorage {
        /// Supply kind selector.
        pub kind: u8 @ 30..=31,
        /// Maximum voltage in 50 mV units.
        pub raw_max_voltage: u16 @ 20..=29,
        /// Minimum voltage in 50 mV units.
        pub raw_min_voltage: u16 @ 10..=19,
        /// Maximum current in 10 mA units.
        pub raw_max_current: u16 @ 0..=9,
    }
}

impl VariableSupply {
    /// Maximum voltage in millivolts.
    pub fn max_voltage_mv(&self) -> u32 {
        u32::from(self.raw_max_voltage()) * 50
    }

    /// Minimum voltage in millivolts.
    pub fn min_voltage_mv(&self) -> u32 {
        u32::from(self.raw_min_voltage()) * 50
    }

    /// Maximum current in milliamperes.
    pub fn max_current_ma(&self) -> u32 {
        u32::from(self.raw_max_current()) * 10
    }
}

/// A classified power data object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerDataObject {
    /// Fixed supply.
    FixedSupply(FixedSupply),
    /// Battery supply.
    Battery(Battery),
    /// Variable supply.
    VariableSupply(VariableSupply),
    /// Augmented PDO (programmable supplies); carried raw.
    Augmented(RawPowerDataObject),
}

impl PowerDataObject {
    /// Classify a raw 32-bit PDO.
    pub fn from_raw(raw: u32) -> Self {
        match RawPowerDataObject(raw).kind() {
            0b00 => PowerDataObject::FixedSupply(FixedSupply(raw)),
            0b01 => PowerDataObject::Battery(Battery(raw)),
            0b10 => PowerDataObject::VariableSupply(VariableSupply(raw)),
            _ => PowerDataObject::Augmented(RawPowerDataObject(raw)),
        }
    }
}

bitfield! {
    /// Request data object for fixed and variable supplies.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct FixedRequest(pub u32): Debug, FromStorage, IntoStorage {
        /// Position of the requested object in the advertised list, one-based.
        pub object_position: u8 @ 28..=30,
        /// Operating current in 10 mA units.
        pub raw_operating_current: u16 @ 10..=19,
        /// Maximum operating current in 10 mA units.
        pub raw_max_current: u16 @ 0..=9,
    }
}

impl FixedRequest {
    /// Operating current in milliamperes.
    pub fn operating_current_ma(&self) -> u32 {
        u32::from(self.raw_operating_current()) * 10
    }

    /// Maximum operating current in milliamperes.
    pub fn max_current_ma(&self) -> u32 {
        u32::from(self.raw_max_current()) * 10
    }
}

/// A PDO array payload had an invalid size.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("PDO array length {0} is not a multiple of four")]
pub struct PdoLengthError(pub usize);

/// Parse a little-endian PDO array payload.
pub fn parse_pdos(payload: &[u8]) -> Result<Vec<PowerDataObject, 8>, PdoLengthError> {
    if payload.len() % 4 != 0 {
        return Err(PdoLengthError(payload.len()));
    }

    let mut pdos = Vec::new();
    for word in payload.chunks_exact(4) {
        pdos.push(PowerDataObject::from_raw(LittleEndian::read_u32(word)))
            .map_err(|_| PdoLengthError(payload.len()))?;
    }

    Ok(pdos)
}

/// Serialize raw PDO words into a little-endian payload.
pub(crate) fn to_le_bytes(caps: &[u32]) -> Vec<u8, 32> {
    let mut payload = Vec::new();
    for cap in caps.iter().take(8) {
        let mut word = [0u8; 4];
        LittleEndian::write_u32(&mut word, *cap);
        let _ = payload.extend_from_slice(&word);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::{Battery, FixedRequest, PdoLengthError, PowerDataObject, parse_pdos, to_le_bytes};

    // Fixed 5 V at 3 A.
    const FIXED_5V_3A: u32 = (100 << 10) | 300;

    #[test]
    fn classifies_fixed_supply() {
        match PowerDataObject::from_raw(FIXED_5V_3A) {
            PowerDataObject::FixedSupply(supply) => {
                assert_eq!(supply.voltage_mv(), 5000);
                assert_eq!(supply.max_current_ma(), 3000);
            }
            other => panic!("misclassified: {other:?}"),
        }
    }

    #[test]
    fn classifies_battery_supply() {
        // Battery 5-21 V at 30 W.
        let raw = (0b01 << 30) | (420 << 20) | (100 << 10) | 120;
        match PowerDataObject::from_raw(raw) {
            PowerDataObject::Battery(battery) => {
                assert_eq!(battery.min_voltage_mv(), 5000);
                assert_eq!(battery.max_voltage_mv(), 21000);
                assert_eq!(battery.max_power_mw(), 30000);
            }
            other => panic!("misclassified: {other:?}"),
        }
    }

    #[test]
    fn classifies_variable_and_augmented() {
        assert!(matches!(
            PowerDataObject::from_raw(0b10 << 30),
            PowerDataObject::VariableSupply(_)
        ));
        assert!(matches!(
            PowerDataObject::from_raw(0b11 << 30),
            PowerDataObject::Augmented(_)
        ));
    }

    #[test]
    fn parses_pdo_arrays() {
        let battery: u32 = (0b01 << 30) | (420 << 20) | (100 << 10) | 120;
        let payload = to_le_bytes(&[FIXED_5V_3A, battery]);

        let pdos = parse_pdos(&payload).unwrap();
        assert_eq!(pdos.len(), 2);
        assert!(matches!(pdos[0], PowerDataObject::FixedSupply(_)));
        assert!(matches!(pdos[1], PowerDataObject::Battery(_)));
    }

    #[test]
    fn rejects_unaligned_payloads() {
        assert_eq!(parse_pdos(&[0u8; 5]).unwrap_err(), PdoLengthError(5));
    }

    #[test]
    fn accepts_empty_payloads() {
        assert!(parse_pdos(&[]).unwrap().is_empty());
    }

    #[test]
    fn request_fields() {
        let rdo = FixedRequest(0)
            .with_object_position(2)
            .with_raw_operating_current(150)
            .with_raw_max_current(300);

        assert_eq!(rdo.object_position(), 2);
        assert_eq!(rdo.operating_current_ma(), 1500);
        assert_eq!(rdo.max_current_ma(), 3000);

        let bytes = rdo.0.to_le_bytes();
        let parsed = FixedRequest(u32::from_le_bytes(bytes));
        assert_eq!(parsed, rdo);
    }

    #[test]
    fn battery_bitfield_layout() {
        let battery = Battery(0)
            .with_raw_max_voltage(420)
            .with_raw_min_voltage(100)
            .with_raw_max_power(120);
        assert_eq!(battery.0 & (0b11 << 30), 0);
        assert_eq!(battery.max_power_mw(), 30000);
    }
}
