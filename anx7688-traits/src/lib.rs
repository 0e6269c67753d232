//! ANX7688 connection manager traits.
//!
//! Provides the traits through which the connection manager reaches the
//! platform: the raw register transport, timing, power rails, the upstream
//! input supply, the USB data-role switch, control GPIOs, hot-plug signaling
//! and the interrupt event queue.
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
use core::future::Future;

/// Register access error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// A read transaction failed.
    Read,

    /// A write transaction failed.
    Write,
}

/// Byte-oriented access to one register space of the chip.
///
/// The ANX7688 exposes two independently addressed spaces on the same bus:
/// the firmware ("main") space and the TCPC-like secondary space. The
/// connection manager takes one implementation per space. Bus-level
/// reliability (retries, arbitration) is the implementor's concern.
pub trait RegisterBus {
    /// Read a single register.
    fn read(&mut self, reg: u8) -> impl Future<Output = Result<u8, BusError>>;

    /// Write a single register.
    fn write(&mut self, reg: u8, value: u8) -> impl Future<Output = Result<(), BusError>>;

    /// Read a block of registers starting at `reg`.
    fn read_block(&mut self, reg: u8, buffer: &mut [u8]) -> impl Future<Output = Result<(), BusError>>;

    /// Write a block of registers starting at `reg`.
    fn write_block(&mut self, reg: u8, data: &[u8]) -> impl Future<Output = Result<(), BusError>>;

    /// Update the bits selected by `mask` to `value`.
    fn update_bits(&mut self, reg: u8, mask: u8, value: u8) -> impl Future<Output = Result<(), BusError>> {
        async move {
            let old = self.read(reg).await?;
            self.write(reg, (old & !mask) | (value & mask)).await
        }
    }
}

/// Timing services for the connection manager.
///
/// `now_millis` must be monotonic; it is only used for relative deadlines.
pub trait Timer {
    /// Expire after the specified number of milliseconds.
    fn after_millis(milliseconds: u64) -> impl Future<Output = ()>;

    /// Expire after the specified number of microseconds.
    fn after_micros(microseconds: u64) -> impl Future<Output = ()>;

    /// A monotonic timestamp in milliseconds, from an arbitrary epoch.
    fn now_millis() -> u64;
}

/// Regulator operation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegulatorError {
    /// The rail could not be enabled.
    Enable,

    /// The rail could not be disabled.
    Disable,
}

/// The switchable power rails the connection manager controls.
///
/// Always-on supplies are enabled by the platform before the manager starts.
pub trait PowerRails {
    /// Enable the VCONN rail that powers active cable electronics.
    fn enable_vconn(&mut self) -> impl Future<Output = Result<(), RegulatorError>>;

    /// Disable the VCONN rail.
    fn disable_vconn(&mut self) -> impl Future<Output = Result<(), RegulatorError>>;

    /// Enable the VBUS rail for sourcing power to the partner.
    fn enable_vbus(&mut self) -> impl Future<Output = Result<(), RegulatorError>>;

    /// Disable the VBUS rail.
    fn disable_vbus(&mut self) -> impl Future<Output = Result<(), RegulatorError>>;
}

/// Input supply property access error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SupplyError {
    /// A property could not be read.
    Read,

    /// A property could not be written.
    Write,
}

/// Charger type reported by BC1.2 fallback detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChargerKind {
    /// Standard downstream port.
    Sdp,

    /// Charging downstream port.
    Cdp,

    /// Dedicated charging port.
    Dcp,

    /// Detection has not produced a result.
    Unknown,
}

/// The upstream input power path (PMIC side) that draws from VBUS.
pub trait InputSupply {
    /// Program the input current limit, in milliamperes.
    fn set_current_limit_ma(&mut self, limit_ma: u32) -> impl Future<Output = Result<(), SupplyError>>;

    /// Bring the input power path online or take it offline.
    fn set_online(&mut self, online: bool) -> impl Future<Output = Result<(), SupplyError>>;

    /// Enable or disable BC1.2 fallback charger-type detection.
    fn set_detection_enabled(&mut self, enabled: bool) -> impl Future<Output = Result<(), SupplyError>>;

    /// Whether BC1.2 detection is currently enabled.
    fn detection_enabled(&mut self) -> impl Future<Output = Result<bool, SupplyError>>;

    /// The charger type that BC1.2 detection resolved, if any.
    fn charger_kind(&mut self) -> impl Future<Output = Result<ChargerKind, SupplyError>>;
}

/// USB data role requested from the role switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbRole {
    /// The data path is released.
    None,

    /// Host (DFP) operation.
    Host,

    /// Device (UFP) operation.
    Device,
}

/// Role switch operation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RoleSwitchError;

/// The USB data-role switch (PHY mux) of the platform.
pub trait UsbRoleSwitch {
    /// Request a data role from the switch.
    fn set_usb_role(&mut self, role: UsbRole) -> impl Future<Output = Result<(), RoleSwitchError>>;

    /// The role the switch is currently set to.
    fn usb_role(&mut self) -> UsbRole;
}

/// The chip's control GPIOs.
pub trait ControlPins {
    /// Drive the chip power-enable line.
    fn set_power_enable(&mut self, enabled: bool);

    /// Assert or release the chip reset line.
    fn set_reset(&mut self, asserted: bool);

    /// Sample the cable-detect line.
    fn cable_detected(&mut self) -> bool;
}

/// Hot-plug-detect signaling towards the display subsystem.
pub trait HotPlugDetect {
    /// Assert or deassert hot-plug detect.
    fn set_hot_plug(&mut self, asserted: bool);
}

/// Hardware events posted by the platform's interrupt handlers.
///
/// Posting an event must not block; all blocking work happens on the
/// connection manager's task when it picks the event up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HardwareEvent {
    /// An edge on the cable-detect line.
    CableDetect,

    /// The chip's status interrupt line fired.
    StatusAlert,

    /// The upstream input supply reported a property change.
    SupplyChange,
}

/// Single-consumer queue of hardware events, drained by the manager's task.
pub trait EventSource {
    /// Wait for the next event.
    fn next(&mut self) -> impl Future<Output = HardwareEvent>;
}

/// Everything the connection manager needs from the platform besides the
/// register buses and the event queue.
pub trait Platform: PowerRails + InputSupply + UsbRoleSwitch + ControlPins + HotPlugDetect {}

impl<T> Platform for T where T: PowerRails + InputSupply + UsbRoleSwitch + ControlPins + HotPlugDetect {}
