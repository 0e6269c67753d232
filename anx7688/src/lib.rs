//! Connection manager for the ANX7688 USB-C HDMI bridge.
//!
//! The ANX7688 carries an on-chip microcontroller (OCM) that runs the USB
//! Power Delivery protocol from firmware. This crate coordinates everything
//! around that firmware:
//!
//! - it watches the cable-detect line and powers the chip up or down on
//!   insertion and removal,
//! - it waits for the OCM firmware to boot, then programs its configuration
//!   and advertises the platform's source/sink capabilities,
//! - it decodes the messages the OCM forwards from the port partner
//!   (capability lists, power requests, resets) and tracks the session,
//! - it mirrors the chip's status registers onto the platform: VBUS/VCONN
//!   rails, the USB data-role switch, and DisplayPort hot-plug signaling,
//! - it decides the input current limit on a delayed schedule, so the
//!   partner has had time to either negotiate PD or reveal that it won't.
//!
//! The platform is reached exclusively through the traits in
//! [`anx7688_traits`]; the crate itself is executor- and HAL-agnostic.
//!
//! Firmware behavior to be aware of: advertising more than one sink
//! capability makes the firmware silently substitute a hardcoded battery
//! PDO. Supply exactly one sink capability.
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

// This module must come first, so the others see its macros.
mod fmt;

pub mod controller;
pub mod protocol;
pub mod registers;

#[cfg(test)]
pub(crate) mod dummy;

use anx7688_traits::{BusError, RegulatorError, RoleSwitchError, SupplyError};
use heapless::Vec;

pub use controller::{Anx7688, ConnectionState, Partner, PortStatus};
use protocol::TransportError;

/// Power role of the port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerRole {
    /// Sourcing VBUS.
    Source,
    /// Sinking VBUS.
    Sink,
}

/// Data role of the port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataRole {
    /// Downstream-facing port (DFP).
    Host,
    /// Upstream-facing port (UFP).
    Device,
}

/// Power operating mode resolved for the port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerMode {
    /// Default USB power, limit determined by charger-type detection.
    Usb,
    /// Type-C 1.5 A advertisement on CC.
    Current1A5,
    /// Type-C 3.0 A advertisement on CC.
    Current3A0,
    /// An explicit PD contract.
    Pd,
}

impl PowerMode {
    /// Short human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            PowerMode::Usb => "USB",
            PowerMode::Current1A5 => "1.5A",
            PowerMode::Current3A0 => "3.0A",
            PowerMode::Pd => "PD",
        }
    }
}

/// Errors that the connection manager can produce.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Register access failed.
    #[error("register access failed")]
    Bus(BusError),

    /// A power rail could not be switched.
    #[error("power rail operation failed")]
    Regulator(RegulatorError),

    /// An input supply property could not be accessed.
    #[error("input supply operation failed")]
    Supply(SupplyError),

    /// The USB role switch rejected a request.
    #[error("role switch operation failed")]
    RoleSwitch(RoleSwitchError),

    /// The OCM message transport failed.
    #[error("message transport failed")]
    Transport(TransportError),

    /// The OCM firmware did not come up within the allowed time.
    #[error("firmware load timed out")]
    FirmwareTimeout,

    /// Firmware reported a nonsensical auto-negotiation result.
    #[error("invalid negotiation result")]
    InvalidNegotiation,

    /// The operation needs an active connection.
    #[error("no active connection")]
    NotConnected,
}

impl From<BusError> for Error {
    fn from(err: BusError) -> Self {
        Error::Bus(err)
    }
}

impl From<RegulatorError> for Error {
    fn from(err: RegulatorError) -> Self {
        Error::Regulator(err)
    }
}

impl From<SupplyError> for Error {
    fn from(err: SupplyError) -> Self {
        Error::Supply(err)
    }
}

impl From<RoleSwitchError> for Error {
    fn from(err: RoleSwitchError) -> Self {
        Error::RoleSwitch(err)
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err)
    }
}

/// Invalid capability configuration.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A capability list must carry 1 to 8 entries.
    #[error("capability list must carry 1 to 8 entries")]
    InvalidCapabilityCount,
}

/// Static PD capability configuration, advertised to the OCM on every
/// connect.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    source_caps: Vec<u32, 8>,
    sink_caps: Vec<u32, 8>,
}

impl Config {
    /// Build a configuration from raw 32-bit PDO values.
    ///
    /// Both lists must carry 1 to 8 entries. Multi-entry sink lists are
    /// accepted, but the firmware is known to replace them with its own
    /// battery PDO; a warning is logged when they are advertised.
    pub fn new(source_caps: &[u32], sink_caps: &[u32]) -> Result<Self, ConfigError> {
        if source_caps.is_empty() || sink_caps.is_empty() {
            return Err(ConfigError::InvalidCapabilityCount);
        }

        Ok(Self {
            source_caps: Vec::from_slice(source_caps).map_err(|_| ConfigError::InvalidCapabilityCount)?,
            sink_caps: Vec::from_slice(sink_caps).map_err(|_| ConfigError::InvalidCapabilityCount)?,
        })
    }

    /// The advertised source capabilities.
    pub fn source_caps(&self) -> &[u32] {
        &self.source_caps
    }

    /// The advertised sink capabilities.
    pub fn sink_caps(&self) -> &[u32] {
        &self.sink_caps
    }
}
