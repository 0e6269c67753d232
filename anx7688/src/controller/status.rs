//! Status reconciliation between the chip and the platform.

use anx7688_traits::{EventSource, HotPlugDetect, Platform, PowerRails, RegisterBus, Timer, UsbRole, UsbRoleSwitch};

use super::Anx7688;
use crate::registers::{CcStatus, Status, main};
use crate::{DataRole, Error, PowerRole};

/// DisplayPort state at or above which the link drives a display.
const DP_STATE_ACTIVE: u8 = 3;

impl<B, P, E, TIM> Anx7688<B, P, E, TIM>
where
    B: RegisterBus,
    P: Platform,
    E: EventSource,
    TIM: Timer,
{
    /// Poll the status registers, log transitions, and reconcile the power
    /// rails, port roles, USB role switch and hot-plug signal.
    pub(crate) async fn update_status(&mut self) -> Result<(), Error> {
        let status = self.bus.read(main::STATUS).await?;
        let cc_status = self.bus.read(main::CC_STATUS).await?;
        let (dp_state, dp_substate) = self.transport.read_dp_state().await?;

        self.set_hot_plug(dp_state >= DP_STATE_ACTIVE);

        let dp_state = u16::from_be_bytes([dp_state, dp_substate]);

        if self.session.last_status != Some(status) {
            self.session.last_status = Some(status);
            debug!("status changed to 0x{:x}", status);
        }

        if self.session.last_cc_status != Some(cc_status) {
            self.session.last_cc_status = Some(cc_status);
            let cc = CcStatus(cc_status);
            debug!("cc_status changed to CC1 = {} CC2 = {}", cc.cc1().name(), cc.cc2().name());
        }

        if self.session.last_dp_state != Some(dp_state) {
            self.session.last_dp_state = Some(dp_state);
            debug!("DP state changed to 0x{:x}", dp_state);
        }

        let status = Status(status);

        if self.session.vbus_on != status.vbus_on() {
            debug!("power role change to {}", if status.vbus_on() { "SOURCE" } else { "SINK" });

            let switched = if status.vbus_on() {
                self.platform.enable_vbus().await
            } else {
                self.platform.disable_vbus().await
            };
            if let Err(err) = switched {
                error!("failed to {} vbus", if status.vbus_on() { "enable" } else { "disable" });
                return Err(err.into());
            }

            self.port.power_role = if status.vbus_on() { PowerRole::Source } else { PowerRole::Sink };
            self.session.vbus_on = status.vbus_on();
        }

        if self.session.vconn_on != status.vconn_on() {
            debug!("VCONN role change to {}", if status.vconn_on() { "SOURCE" } else { "SINK" });

            let switched = if status.vconn_on() {
                self.platform.enable_vconn().await
            } else {
                self.platform.disable_vconn().await
            };
            if let Err(err) = switched {
                error!("failed to {} vconn", if status.vconn_on() { "enable" } else { "disable" });
                return Err(err.into());
            }

            self.port.vconn_role = if status.vconn_on() { PowerRole::Source } else { PowerRole::Sink };
            self.session.vconn_on = status.vconn_on();
        }

        let host = status.data_role_host();
        self.port.data_role = if host { DataRole::Host } else { DataRole::Device };

        let desired = if host { UsbRole::Host } else { UsbRole::Device };
        if self.platform.usb_role() != desired {
            debug!("DATA role change requested to {}", if host { "DFP" } else { "UFP" });
            self.platform.set_usb_role(desired).await?;
        }

        Ok(())
    }

    /// Reflect the DisplayPort link state on the hot-plug signal,
    /// suppressing redundant writes.
    pub(crate) fn set_hot_plug(&mut self, asserted: bool) {
        if self.session.last_hot_plug != Some(asserted) {
            self.session.last_hot_plug = Some(asserted);
            self.platform.set_hot_plug(asserted);
        }
    }
}
