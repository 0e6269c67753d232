//! Interpreter for the PD protocol messages forwarded by the OCM.
//!
//! Most inbound message kinds are observe-only: firmware auto-negotiation
//! answers them on the wire, and this driver only tracks the session facts
//! it needs for the current-limit policy.

use anx7688_traits::{EventSource, InputSupply, Platform, RegisterBus, Timer};
use byteorder::{ByteOrder, LittleEndian};

use super::Anx7688;
use crate::Error;
use crate::protocol::message::{CommandStatus, OcmCommand, OcmMessage};
use crate::protocol::pdo::{self, FixedSupply, PowerDataObject};
use crate::registers::main;

/// Deadline after a received capability report, once negotiation results
/// are available.
const SRC_CAP_CURRENT_UPDATE_DELAY_MS: u64 = 500;

/// Deadline after a hard reset, giving the link time to resettle.
const HARD_RESET_CURRENT_UPDATE_DELAY_MS: u64 = 3000;

impl<B, P, E, TIM> Anx7688<B, P, E, TIM>
where
    B: RegisterBus,
    P: Platform,
    E: EventSource,
    TIM: Timer,
{
    /// Dispatch one decoded OCM message.
    pub(crate) async fn handle_message(&mut self, message: &OcmMessage) -> Result<(), Error> {
        match message.command {
            OcmCommand::SourceCapabilities => self.handle_source_capabilities(&message.payload).await?,
            OcmCommand::SinkCapabilities => {
                info!("received SNK_CAP");
                log_capability_report("SNK_CAP", &message.payload);
            }
            OcmCommand::PowerObjectRequest => self.handle_power_request(&message.payload),
            OcmCommand::ResponseToRequest => handle_response(&message.payload),
            OcmCommand::HardReset => self.handle_hard_reset().await,
            OcmCommand::SoftReset => info!("received SOFT_RST"),
            OcmCommand::Restart => info!("received RESTART"),
            OcmCommand::Accept => info!("received ACCEPT"),
            OcmCommand::Reject => info!("received REJECT"),
            OcmCommand::PowerSwapRequest => info!("received PSWAP_REQ"),
            OcmCommand::DataSwapRequest => info!("received DSWAP_REQ"),
            OcmCommand::VconnSwapRequest => info!("received VCONN_SWAP_REQ"),
            OcmCommand::GotoMinRequest => info!("received GOTO_MIN_REQ"),
            OcmCommand::DpAltModeEnter => info!("received DP_ALT_ENTER"),
            OcmCommand::DpAltModeExit => info!("received DP_ALT_EXIT"),
            OcmCommand::DpSinkIdentity => info!("received DP_SNK_IDENTITY"),
            OcmCommand::Svid => info!("received SVID"),
            OcmCommand::VendorDefined => info!("received VDM"),
            OcmCommand::DpSinkConfig => info!("received DP_SNK_CFG"),
            OcmCommand::PdStatusRequest => info!("received PD_STATUS_REQ"),
            OcmCommand::GetDpSinkCapability => info!("received GET_DP_SNK_CAP"),
            OcmCommand::GetSinkCapability => info!("received GET_SNK_CAP"),
            OcmCommand::Unknown(command) => info!("received unknown message 0x{:x}", command),
        }

        Ok(())
    }

    /// The partner advertised its source capabilities; firmware has already
    /// auto-negotiated a contract from them.
    async fn handle_source_capabilities(&mut self, payload: &[u8]) -> Result<(), Error> {
        info!("received SRC_CAP");

        let pdos = match pdo::parse_pdos(payload) {
            Ok(pdos) => pdos,
            Err(_) => {
                warn!("received invalid sized PDO array");
                return Ok(());
            }
        };

        self.session.pd_capable = true;

        for pdo in &pdos {
            log_pdo("SRC_CAP", pdo);
        }

        // Firmware has written the RDO it sent to the partner into the
        // status registers. That request may not have been accepted yet,
        // but it is the best estimate for the current limit available here.
        let max_voltage = self.bus.read(main::MAX_VOLTAGE_STATUS).await?;
        if max_voltage == 0 {
            return Err(Error::InvalidNegotiation);
        }

        let max_power = self.bus.read(main::MAX_POWER_STATUS).await?;

        self.session.pd_current_limit_ma = u32::from(max_power) * 5000 / u32::from(max_voltage);

        debug!(
            "RDO max voltage = {} mV, max power = {} mW, PD current limit = {} mA",
            u32::from(max_voltage) * 100,
            u32::from(max_power) * 500,
            self.session.pd_current_limit_ma
        );

        // The negotiation result is in; update the limit sooner.
        self.arm_current_update(SRC_CAP_CURRENT_UPDATE_DELAY_MS);

        Ok(())
    }

    /// The partner requested one of the advertised power objects.
    fn handle_power_request(&mut self, payload: &[u8]) {
        info!("received PWR_OBJ_REQ");

        self.session.pd_capable = true;

        if payload.len() != 4 {
            warn!("received invalid sized RDO");
            return;
        }

        let rdo = pdo::FixedRequest(LittleEndian::read_u32(payload));
        let index = usize::from(rdo.object_position());

        if index >= 1 && index <= self.config.source_caps().len() {
            let advertised = FixedSupply(self.config.source_caps()[index - 1]);

            info!(
                "RDO (idx={} op={} mA max={} mA)",
                index - 1,
                rdo.operating_current_ma(),
                rdo.max_current_ma()
            );
            info!(
                "PDO_FIXED ({} mV {} mA)",
                advertised.voltage_mv(),
                advertised.max_current_ma()
            );

            // Accept/reject is left to firmware auto-negotiation.
        } else {
            info!("PWR_OBJ_REQ index out of range (RDO = 0x{:x})", rdo.0);
        }
    }

    /// The partner signaled a hard reset.
    async fn handle_hard_reset(&mut self) {
        if !self.session.pd_capable {
            debug!("received HARD_RST without a PD contract");
            return;
        }

        info!("received HARD_RST");

        // Stop drawing from VBUS while the link resettles.
        debug!("disabling input power path");
        if self.platform.set_online(false).await.is_err() {
            error!("failed to take the input path offline");
        }

        self.arm_current_update(HARD_RESET_CURRENT_UPDATE_DELAY_MS);
    }
}

fn log_capability_report(context: &str, payload: &[u8]) {
    match pdo::parse_pdos(payload) {
        Ok(pdos) => {
            for pdo in &pdos {
                log_pdo(context, pdo);
            }
        }
        Err(_) => warn!("received invalid sized PDO array"),
    }
}

fn log_pdo(context: &str, pdo: &PowerDataObject) {
    match pdo {
        PowerDataObject::FixedSupply(supply) => {
            info!(
                "{} PDO_FIXED ({} mV {} mA)",
                context,
                supply.voltage_mv(),
                supply.max_current_ma()
            );
        }
        PowerDataObject::Battery(battery) => {
            info!(
                "{} PDO_BATT ({}-{} mV {} mW)",
                context,
                battery.min_voltage_mv(),
                battery.max_voltage_mv(),
                battery.max_power_mw()
            );
        }
        PowerDataObject::VariableSupply(supply) => {
            info!(
                "{} PDO_VAR ({}-{} mV {} mA)",
                context,
                supply.min_voltage_mv(),
                supply.max_voltage_mv(),
                supply.max_current_ma()
            );
        }
        PowerDataObject::Augmented(raw) => info!("{} PDO_APDO (0x{:x})", context, raw.0),
    }
}

fn handle_response(payload: &[u8]) {
    if payload.len() < 2 {
        warn!("received short RESPONSE_TO_REQ");
        return;
    }

    let command = OcmCommand::from(payload[0]);
    let status = CommandStatus::from(payload[1]);

    match command {
        OcmCommand::PowerSwapRequest
        | OcmCommand::DataSwapRequest
        | OcmCommand::VconnSwapRequest
        | OcmCommand::PowerObjectRequest
        | OcmCommand::VendorDefined
        | OcmCommand::GotoMinRequest
        | OcmCommand::GetSinkCapability => info!("received response to {:?} ({:?})", command, status),
        _ => info!("received response to unknown request ({:?})", status),
    }
}
