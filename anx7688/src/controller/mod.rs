//! Connection lifecycle controller.
//!
//! [`Anx7688`] owns the message transport, the PD message interpreter, the
//! status reconciler and the current-limit policy engine. Everything runs
//! on a single task that exclusively owns the controller; interrupt
//! handlers on the platform side only post [`HardwareEvent`]s, so
//! multi-step sequences such as a connect are never interleaved.

mod connection;
mod interpreter;
mod policy;
mod status;


use core::marker::PhantomData;

use anx7688_traits::{
    ChargerKind, ControlPins, EventSource, HardwareEvent, InputSupply, Platform, RegisterBus, Timer,
};
use embassy_futures::select::{Either, select};

use crate::protocol::OcmTransport;
use crate::protocol::message::{OcmCommand, OcmMessage};
use crate::registers::main;
use crate::{Config, DataRole, Error, PowerMode, PowerRole};

/// Quiet period after a cable-detect edge before acting on it.
const CABLE_DEBOUNCE_MS: u64 = 10;

/// Interval of the watchdog re-evaluation, guarding against lost interrupts.
const WATCHDOG_INTERVAL_MS: u64 = 1000;

/// Delay before the first service pass after initialization.
const INITIAL_SERVICE_DELAY_MS: u64 = 10;

/// Delay before re-evaluating the cable after a forced reset.
const RESET_SERVICE_DELAY_MS: u64 = 20;

/// Lifecycle of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    /// No cable; the chip is powered down.
    Disconnected,
    /// Power sequencing is in progress.
    PoweringUp,
    /// Waiting for the OCM firmware to boot.
    AwaitingFirmware,
    /// Programming the OCM configuration and capabilities.
    ConfiguringOcm,
    /// A partner session is active.
    Connected,
    /// Firmware never came up; auto-connect is blocked until [`Anx7688::reset`].
    FirmwareLoadFailed,
}

/// Externally visible state of the USB-C port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortStatus {
    /// Power role.
    pub power_role: PowerRole,
    /// Data role.
    pub data_role: DataRole,
    /// VCONN sourcing role.
    pub vconn_role: PowerRole,
    /// Resolved power operating mode.
    pub power_mode: PowerMode,
}

impl Default for PortStatus {
    fn default() -> Self {
        Self {
            power_role: PowerRole::Sink,
            data_role: DataRole::Device,
            vconn_role: PowerRole::Sink,
            power_mode: PowerMode::Usb,
        }
    }
}

/// The attached port partner.
///
/// Exists from a successful OCM configuration until disconnect; a
/// reconfiguration replaces it.
#[derive(Debug)]
pub struct Partner {
    _private: (),
}

impl Partner {
    fn new() -> Self {
        Self { _private: () }
    }
}

/// Cached observations and session facts.
#[derive(Debug, Default)]
struct Session {
    /// Last observed status register; `None` until first observed.
    last_status: Option<u8>,
    last_cc_status: Option<u8>,
    last_dp_state: Option<u16>,
    last_charger_kind: Option<ChargerKind>,
    last_hot_plug: Option<bool>,
    pd_capable: bool,
    /// Limit derived from the firmware's auto-negotiated contract, in mA.
    pd_current_limit_ma: u32,
    /// Limit most recently programmed into the input supply, in mA.
    input_current_limit_ma: u32,
    /// When set, the current-limit engine runs once this passes.
    current_update_deadline: Option<u64>,
    vbus_on: bool,
    vconn_on: bool,
    supply_change_pending: bool,
}

/// Connection manager for one ANX7688 instance.
pub struct Anx7688<B, P, E, TIM>
where
    B: RegisterBus,
    P: Platform,
    E: EventSource,
    TIM: Timer,
{
    bus: B,
    transport: OcmTransport<B, TIM>,
    platform: P,
    events: E,
    config: Config,
    state: ConnectionState,
    session: Session,
    port: PortStatus,
    partner: Option<Partner>,
    /// Pending debounce/service deadline for the run loop.
    service_deadline: Option<u64>,
    _timer: PhantomData<TIM>,
}

impl<B, P, E, TIM> Anx7688<B, P, E, TIM>
where
    B: RegisterBus,
    P: Platform,
    E: EventSource,
    TIM: Timer,
{
    /// Create a connection manager from the two register-space buses, the
    /// platform collaborators and the capability configuration.
    pub fn new(main_bus: B, tcpc_bus: B, platform: P, events: E, config: Config) -> Self {
        Self {
            bus: main_bus,
            transport: OcmTransport::new(tcpc_bus),
            platform,
            events,
            config,
            state: ConnectionState::Disconnected,
            session: Session::default(),
            port: PortStatus::default(),
            partner: None,
            service_deadline: None,
            _timer: PhantomData,
        }
    }

    /// One-time bring-up: probe the chip and set safe defaults.
    ///
    /// Powers the chip briefly to read its vendor identifier, resets the
    /// port to its defaults and enables fallback charger-type detection.
    pub async fn initialize(&mut self) -> Result<(), Error> {
        self.power_enable().await;

        let vendor_id = match self.transport.vendor_id().await {
            Ok(vendor_id) => vendor_id,
            Err(err) => {
                self.power_disable().await;
                return Err(err.into());
            }
        };
        info!("vendor id 0x{:x}", vendor_id);

        self.power_disable().await;

        self.port = PortStatus::default();

        debug!("enabling charger-type detection");
        if let Err(err) = self.platform.set_detection_enabled(true).await {
            error!("failed to enable charger-type detection");
            return Err(err.into());
        }

        // Evaluate the cable state shortly after the run loop starts.
        self.service_deadline = Some(TIM::now_millis() + INITIAL_SERVICE_DELAY_MS);
        Ok(())
    }

    /// Drive the connection manager.
    ///
    /// Multiplexes hardware events against the debounce timer and the 1 s
    /// watchdog. Never returns; all failures are handled internally by
    /// unwinding to a safe disconnected state.
    pub async fn run(&mut self) -> ! {
        loop {
            self.run_step().await;
        }
    }

    async fn run_step(&mut self) {
        let now = TIM::now_millis();
        let sleep_ms = match self.service_deadline {
            Some(deadline) => deadline.saturating_sub(now),
            None => WATCHDOG_INTERVAL_MS,
        };

        match select(self.events.next(), TIM::after_millis(sleep_ms)).await {
            Either::First(HardwareEvent::CableDetect) => {
                debug!("plug edge (detected={})", self.platform.cable_detected());
                // Restart the quiet period; the line must be stable for the
                // whole debounce window before it is acted on.
                self.service_deadline = Some(TIM::now_millis() + CABLE_DEBOUNCE_MS);
            }
            Either::First(HardwareEvent::StatusAlert) => self.service_alert().await,
            Either::First(HardwareEvent::SupplyChange) => {
                self.session.supply_change_pending = true;
                self.service_deadline = Some(TIM::now_millis());
            }
            Either::Second(()) => {
                self.service_deadline = None;
                self.service().await;
            }
        }
    }

    /// One serialized pass of the deferred work: reconcile the cable state,
    /// refresh status, and run the current-limit engine when due.
    async fn service(&mut self) {
        if self.state == ConnectionState::FirmwareLoadFailed {
            return;
        }

        if self.session.supply_change_pending {
            self.session.supply_change_pending = false;
            self.handle_supply_change().await;
        }

        self.handle_cable_change().await;

        if self.state == ConnectionState::Connected {
            // Check status outside of interrupts too, in case one was missed.
            if let Err(err) = self.update_status().await {
                error!("status update failed: {:?}", err);
            }

            if let Some(deadline) = self.session.current_update_deadline {
                if TIM::now_millis() >= deadline {
                    self.session.current_update_deadline = None;
                    self.update_current_limit().await;
                }
            }
        }
    }

    /// Service the chip status interrupt.
    async fn service_alert(&mut self) {
        if self.state != ConnectionState::Connected {
            // The chip should be disabled and powered off.
            debug!("spurious status alert");
            return;
        }

        if let Err(err) = self.drain_alerts().await {
            error!("status alert servicing failed: {:?}", err);
        }
    }

    async fn drain_alerts(&mut self) -> Result<(), Error> {
        // Clear the secondary-space alert.
        if let Ok(alert) = self.transport.read_alert().await {
            if alert != 0 {
                let _ = self.transport.ack_alert(alert).await;
            }
        }

        let ext2 = self.bus.read(main::IRQ_EXT_SOURCE2).await?;
        if ext2 & main::IRQ2_SOFT_INT != 0 {
            let soft = self.bus.read(main::STATUS_INT).await?;
            let _ = self.bus.write(main::STATUS_INT, 0).await;

            let soft = soft & main::SOFT_INT_MASK;
            if soft & main::INT_RECEIVED_MSG != 0 {
                match self.transport.receive().await {
                    Ok(message) => {
                        if let Err(err) = self.handle_message(&message).await {
                            error!("message handling failed: {:?}", err);
                        }
                    }
                    Err(err) => error!("failed to receive ocm message: {:?}", err),
                }
            }

            if soft
                & (main::INT_CC_STATUS_CHANGE
                    | main::INT_VBUS_CHANGE
                    | main::INT_VCONN_CHANGE
                    | main::INT_DATA_ROLE_CHANGE)
                != 0
            {
                self.update_status().await?;
            }

            self.bus.write(main::IRQ_EXT_SOURCE2, main::IRQ2_SOFT_INT).await?;
        }

        Ok(())
    }

    /// React to an input-supply change: log new charger-detection results.
    async fn handle_supply_change(&mut self) {
        let kind = match self.platform.charger_kind().await {
            Ok(kind) => kind,
            Err(_) => {
                error!("failed to read the charger-type detection result");
                return;
            }
        };

        if self.session.last_charger_kind == Some(kind) {
            return;
        }
        self.session.last_charger_kind = Some(kind);

        match kind {
            ChargerKind::Dcp | ChargerKind::Cdp => debug!("charger detection result: DCP or CDP"),
            _ => debug!("charger detection result: SDP"),
        }
    }

    /// Ask the partner to swap power roles.
    pub async fn request_power_role(&mut self, role: PowerRole) -> Result<(), Error> {
        info!("power role swap requested");

        if self.state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        if self.port.power_role == role {
            return Ok(());
        }

        Ok(self
            .transport
            .send(&OcmMessage::empty(OcmCommand::PowerSwapRequest))
            .await?)
    }

    /// Ask the partner to swap data roles.
    pub async fn request_data_role(&mut self, role: DataRole) -> Result<(), Error> {
        info!("data role swap requested");

        if self.state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        if self.port.data_role == role {
            return Ok(());
        }

        Ok(self
            .transport
            .send(&OcmMessage::empty(OcmCommand::DataSwapRequest))
            .await?)
    }

    /// Force a reconnect cycle, clearing a sticky firmware-load failure.
    pub async fn reset(&mut self) {
        if self.state == ConnectionState::Connected {
            self.disconnect().await;
        }

        self.state = ConnectionState::Disconnected;
        self.service_deadline = Some(TIM::now_millis() + RESET_SERVICE_DELAY_MS);
    }

    /// Tear the connection down before the embedding stops the run task.
    pub async fn shutdown(&mut self) {
        if self.state == ConnectionState::Connected {
            self.disconnect().await;
        }
    }

    /// Arm the current-limit engine to run `delay_ms` from now.
    pub(crate) fn arm_current_update(&mut self, delay_ms: u64) {
        self.session.current_update_deadline = Some(TIM::now_millis() + delay_ms);
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The externally visible port state.
    pub fn port(&self) -> &PortStatus {
        &self.port
    }

    /// The attached partner, while a session is active.
    pub fn partner(&self) -> Option<&Partner> {
        self.partner.as_ref()
    }

    /// The input current limit most recently programmed, in milliamperes.
    pub fn input_current_limit_ma(&self) -> u32 {
        self.session.input_current_limit_ma
    }

    /// Whether the partner negotiated USB PD in this session.
    pub fn pd_capable(&self) -> bool {
        self.session.pd_capable
    }
}
