//! Power sequencing, connect and disconnect.

use anx7688_traits::{
    ControlPins, EventSource, InputSupply, Platform, PowerRails, RegisterBus, Timer, UsbRole, UsbRoleSwitch,
};

use super::{Anx7688, ConnectionState, Partner, PortStatus};
use crate::Error;
use crate::protocol::message::{OcmCommand, OcmMessage};
use crate::protocol::pdo;
use crate::protocol::{PollSchedule, TransportError};
use crate::registers::main;

/// Settling time between cable detection and power-up.
const CABLE_INSERT_DELAY_MS: u64 = 10;

/// Settling time before the reset line is released.
const POWER_SETTLE_MS: u64 = 10;

/// Hold time of the reset line after release, before register access.
const RESET_RELEASE_DELAY_US: u64 = 2;

/// Reset hold time during power-down.
const POWER_OFF_RESET_HOLD_MS: u64 = 5;

/// Attempts made while waiting for the firmware-loaded indicator.
const FW_LOAD_ATTEMPTS: u32 = 100;

/// Interval between firmware-loaded polls, in microseconds.
const FW_LOAD_POLL_INTERVAL_US: u64 = 5_000;

/// Delay before the current-limit engine runs after a connect.
const CONNECT_CURRENT_UPDATE_DELAY_MS: u64 = 3000;

/// Input current ceiling applied on disconnect, in milliamperes.
const DISCONNECT_CURRENT_LIMIT_MA: u32 = 500;

/// Identity advertised for the DisplayPort sink function.
const DP_SINK_IDENTITY: [u8; 16] = [
    0x00, 0x00, 0x00, 0xec, // id header
    0x00, 0x00, 0x00, 0x00, // cert stat
    0x00, 0x00, 0x00, 0x00, // product type
    0x39, 0x00, 0x00, 0x51, // alt mode adapter
];

/// Standard ID announcement.
const DP_SVID: [u8; 4] = [0x00, 0x00, 0x01, 0xff];

impl<B, P, E, TIM> Anx7688<B, P, E, TIM>
where
    B: RegisterBus,
    P: Platform,
    E: EventSource,
    TIM: Timer,
{
    /// Compare the cable-detect line against the lifecycle state and
    /// connect or disconnect accordingly.
    pub(crate) async fn handle_cable_change(&mut self) {
        let detected = self.platform.cable_detected();

        if detected && self.state == ConnectionState::Disconnected {
            // Failures unwind internally and leave the chip powered down.
            let _ = self.connect().await;
        } else if !detected && self.state == ConnectionState::Connected {
            self.disconnect().await;
        }
    }

    pub(crate) async fn power_enable(&mut self) {
        self.platform.set_reset(true);
        self.platform.set_power_enable(true);

        // Let the supplies stabilize before releasing reset.
        TIM::after_millis(POWER_SETTLE_MS).await;
        self.platform.set_reset(false);
        TIM::after_micros(RESET_RELEASE_DELAY_US).await;

        debug!("power enabled");
    }

    pub(crate) async fn power_disable(&mut self) {
        self.platform.set_reset(true);
        TIM::after_millis(POWER_OFF_RESET_HOLD_MS).await;
        self.platform.set_power_enable(false);

        debug!("power disabled");
    }

    /// Bring up the chip and configure an OCM session.
    ///
    /// Any failure fully unwinds (VCONN off, power off). A firmware-load
    /// timeout additionally latches [`ConnectionState::FirmwareLoadFailed`],
    /// which blocks further automatic attempts.
    pub(crate) async fn connect(&mut self) -> Result<(), Error> {
        debug!("cable inserted");

        self.session.last_status = None;
        self.session.last_cc_status = None;
        self.session.last_dp_state = None;

        TIM::after_millis(CABLE_INSERT_DELAY_MS).await;
        self.state = ConnectionState::PoweringUp;
        self.power_enable().await;

        if let Err(err) = self.platform.enable_vconn().await {
            error!("failed to enable vconn");
            self.power_disable().await;
            self.state = ConnectionState::Disconnected;
            return Err(err.into());
        }
        self.session.vconn_on = true;

        self.state = ConnectionState::AwaitingFirmware;
        if let Err(err) = self.wait_for_firmware().await {
            error!("boot firmware load failed (the EEPROM may need flashing first)");
            self.unwind_connect().await;
            self.state = ConnectionState::FirmwareLoadFailed;
            return Err(err);
        }

        self.state = ConnectionState::ConfiguringOcm;
        if let Err(err) = self.configure_ocm().await {
            error!("OCM configuration failed");
            self.unwind_connect().await;
            self.state = ConnectionState::Disconnected;
            return Err(err);
        }

        self.state = ConnectionState::Connected;
        // Decide the limit only once the partner had a chance to negotiate.
        self.arm_current_update(CONNECT_CURRENT_UPDATE_DELAY_MS);
        Ok(())
    }

    async fn unwind_connect(&mut self) {
        if self.session.vconn_on {
            if self.platform.disable_vconn().await.is_err() {
                error!("failed to disable vconn");
            }
            self.session.vconn_on = false;
        }

        self.power_disable().await;
    }

    /// Poll the firmware-loaded indicator, for up to 500 ms.
    async fn wait_for_firmware(&mut self) -> Result<(), Error> {
        let mut schedule = PollSchedule::new(FW_LOAD_ATTEMPTS, FW_LOAD_POLL_INTERVAL_US);
        let mut waited_ms: u32 = 0;

        loop {
            // The chip may not acknowledge reads until boot completes, so
            // bus errors keep polling until the budget runs out.
            if let Ok(status) = self.bus.read(main::EEPROM_LOAD_STATUS0).await {
                if status & main::EEPROM_FW_LOADED != 0 {
                    info!("firmware loaded after {} ms", waited_ms);
                    break;
                }
            }

            if !schedule.tick::<TIM>().await {
                return Err(Error::FirmwareTimeout);
            }
            waited_ms += (FW_LOAD_POLL_INTERVAL_US / 1000) as u32;
        }

        let mut version = [0u8; 2];
        self.bus.read_block(main::FW_VERSION1, &mut version).await?;
        info!("OCM firmware loaded (version 0x{:x})", u16::from_be_bytes(version));

        Ok(())
    }

    /// Program the OCM configuration and advertise capabilities.
    async fn configure_ocm(&mut self) -> Result<(), Error> {
        // Unmask the soft status interrupts.
        self.bus.write(main::STATUS_INT, 0).await?;
        self.bus.write(main::STATUS_INT_MASK, !main::SOFT_INT_MASK).await?;
        self.bus.write(main::IRQ_EXT_SOURCE2, 0xff).await?;
        self.bus.write(main::IRQ_EXT_MASK2, !main::IRQ2_SOFT_INT).await?;

        // VBUS-off delay after CC disconnect: 100 ms, in 4 ms units.
        self.bus.write(main::VBUS_OFF_DELAY_TIME, 100 / 4).await?;
        // Try-UFP period: 300 ms, in 2 ms units.
        self.bus.write(main::TRY_UFP_TIMER, 300 / 2).await?;

        // Contract limits: 5 V, 15 W max, 0.5 W min.
        self.bus.write(main::MAX_VOLTAGE, 50).await?;
        self.bus.write(main::MAX_POWER, 15 * 2).await?;
        self.bus.write(main::MIN_POWER, 1).await?;

        // Auto PD negotiation, with the try-source policy disabled.
        self.bus.write(main::FEATURE_CTRL, 0x1e & !main::FEATURE_TRY_SRC).await?;

        self.send_capabilities().await?;

        self.send_message(OcmCommand::DpSinkIdentity, &DP_SINK_IDENTITY).await?;
        self.send_message(OcmCommand::Svid, &DP_SVID).await?;

        debug!("OCM configuration completed");

        // Replacing the partner drops any stale one first.
        self.partner = None;
        self.partner = Some(Partner::new());

        Ok(())
    }

    async fn send_capabilities(&mut self) -> Result<(), Error> {
        let caps = pdo::to_le_bytes(self.config.source_caps());
        self.send_message(OcmCommand::SourceCapabilities, &caps).await?;

        if self.config.sink_caps().len() > 1 {
            // Firmware replaces multi-PDO sink lists with a hardcoded
            // battery PDO.
            warn!(
                "advertising {} sink capabilities; firmware may substitute its own",
                self.config.sink_caps().len()
            );
        }
        let caps = pdo::to_le_bytes(self.config.sink_caps());
        self.send_message(OcmCommand::SinkCapabilities, &caps).await?;

        Ok(())
    }

    pub(crate) async fn send_message(&mut self, command: OcmCommand, payload: &[u8]) -> Result<(), Error> {
        let message = OcmMessage::new(command, payload).map_err(TransportError::from)?;
        Ok(self.transport.send(&message).await?)
    }

    /// Tear down the session and return the platform to its defaults.
    ///
    /// Collaborator failures are logged and skipped; every step is safe to
    /// repeat.
    pub(crate) async fn disconnect(&mut self) {
        debug!("cable removed");

        self.session.current_update_deadline = None;
        self.set_hot_plug(false);

        if self.session.vconn_on {
            if self.platform.disable_vconn().await.is_err() {
                error!("failed to disable vconn");
            }
            self.session.vconn_on = false;
        }

        if self.session.vbus_on {
            if self.platform.disable_vbus().await.is_err() {
                error!("failed to disable vbus");
            }
            self.session.vbus_on = false;
        }

        self.power_disable().await;

        self.session.pd_capable = false;
        self.partner = None;
        self.port = PortStatus::default();

        if self.platform.set_usb_role(UsbRole::None).await.is_err() {
            error!("failed to release the usb role switch");
        }

        debug!("setting input current limit to {} mA", DISCONNECT_CURRENT_LIMIT_MA);
        if self.platform.set_current_limit_ma(DISCONNECT_CURRENT_LIMIT_MA).await.is_err() {
            error!("failed to set input current limit to {} mA", DISCONNECT_CURRENT_LIMIT_MA);
        }
        self.session.input_current_limit_ma = DISCONNECT_CURRENT_LIMIT_MA;

        debug!("disabling input power path");
        if self.platform.set_online(false).await.is_err() {
            error!("failed to take the input path offline");
        }

        debug!("enabling charger-type detection");
        if self.platform.set_detection_enabled(true).await.is_err() {
            error!("failed to enable charger-type detection");
        }

        self.state = ConnectionState::Disconnected;
    }
}
