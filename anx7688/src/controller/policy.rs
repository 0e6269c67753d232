//! Input current limit policy.
//!
//! Runs only when an armed deadline has passed, so the partner has had time
//! to either negotiate PD or reveal that it will not.

use anx7688_traits::{EventSource, InputSupply, Platform, RegisterBus, Timer};

use super::Anx7688;
use crate::PowerMode;
use crate::registers::{CcPull, CcStatus};

/// Limit for a 1.5 A CC advertisement, in milliamperes.
const CURRENT_1A5_MA: u32 = 1500;

/// Limit for a 3.0 A CC advertisement, in milliamperes.
const CURRENT_3A0_MA: u32 = 3000;

/// Conservative limit when no source of information is available.
const FALLBACK_LIMIT_MA: u32 = 500;

impl<B, P, E, TIM> Anx7688<B, P, E, TIM>
where
    B: RegisterBus,
    P: Platform,
    E: EventSource,
    TIM: Timer,
{
    /// Decide the power mode and program the input current limit.
    ///
    /// PD wins over CC advertisements; without either, the limit is left to
    /// BC1.2 fallback detection where possible. Always finishes by bringing
    /// the input path online and reflecting the mode on the port.
    pub(crate) async fn update_current_limit(&mut self) {
        let mode = if self.session.pd_capable {
            PowerMode::Pd
        } else {
            match self.session.last_cc_status {
                None => PowerMode::Usb,
                Some(cc_status) => {
                    let cc = CcStatus(cc_status);
                    classify(cc.cc1())
                        .or_else(|| classify(cc.cc2()))
                        .unwrap_or(PowerMode::Usb)
                }
            }
        };

        let limit_ma = match mode {
            PowerMode::Current1A5 => CURRENT_1A5_MA,
            PowerMode::Current3A0 => CURRENT_3A0_MA,
            PowerMode::Pd => self.session.pd_current_limit_ma,
            PowerMode::Usb => 0,
        };

        self.session.input_current_limit_ma = limit_ma;

        info!(
            "updating power mode to {}, current limit {} mA (0 => BC1.2)",
            mode.name(),
            limit_ma
        );

        if limit_ma != 0 {
            // The limit comes from PD or a CC advertisement; BC1.2 must not
            // override it.
            debug!("disabling charger-type detection");
            if self.platform.set_detection_enabled(false).await.is_err() {
                error!("failed to disable charger-type detection");
            }

            debug!("setting input current limit to {} mA", limit_ma);
            if self.platform.set_current_limit_ma(limit_ma).await.is_err() {
                error!("failed to set input current limit to {} mA", limit_ma);
            }
        } else {
            // Leave the limit to BC1.2 when it can produce one; otherwise
            // fall back to a conservative default.
            match self.platform.detection_enabled().await {
                Ok(true) => {}
                _ => {
                    debug!("setting input current limit to {} mA", FALLBACK_LIMIT_MA);
                    if self.platform.set_current_limit_ma(FALLBACK_LIMIT_MA).await.is_err() {
                        error!("failed to set input current limit to {} mA", FALLBACK_LIMIT_MA);
                    }
                }
            }
        }

        debug!("enabling input power path");
        if self.platform.set_online(true).await.is_err() {
            error!("failed to enable the input path");
        }

        self.port.power_mode = mode;
    }
}

fn classify(pull: CcPull) -> Option<PowerMode> {
    match pull {
        CcPull::Default => Some(PowerMode::Usb),
        CcPull::Power15 => Some(PowerMode::Current1A5),
        CcPull::Power30 => Some(PowerMode::Current3A0),
        _ => None,
    }
}
