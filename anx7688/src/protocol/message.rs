//! Framing of messages on the OCM interface.
//!
//! A frame is `[length][command][payload][checksum]`, where `length` is the
//! payload length plus one, and the checksum makes the byte-sum of the whole
//! frame zero modulo 256. Frames never exceed 32 bytes.

use heapless::Vec;

/// Maximum total frame size of the message interface.
pub const MAX_FRAME_SIZE: usize = 32;

/// Maximum payload size; length, command and checksum take three bytes.
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - 3;

/// Commands exchanged with the OCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OcmCommand {
    /// Source capability advertisement.
    SourceCapabilities,
    /// Sink capability advertisement.
    SinkCapabilities,
    /// DisplayPort sink identity.
    DpSinkIdentity,
    /// Standard/vendor ID announcement.
    Svid,
    /// Query for DisplayPort sink capabilities.
    GetDpSinkCapability,
    /// Accept.
    Accept,
    /// Reject.
    Reject,
    /// Power role swap request.
    PowerSwapRequest,
    /// Data role swap request.
    DataSwapRequest,
    /// Go-to-minimum request.
    GotoMinRequest,
    /// VCONN swap request.
    VconnSwapRequest,
    /// Vendor defined message.
    VendorDefined,
    /// DisplayPort sink configuration.
    DpSinkConfig,
    /// Power object request (RDO).
    PowerObjectRequest,
    /// PD status query.
    PdStatusRequest,
    /// DisplayPort alternate mode entered.
    DpAltModeEnter,
    /// DisplayPort alternate mode exited.
    DpAltModeExit,
    /// Query for sink capabilities.
    GetSinkCapability,
    /// Response to a previously sent request.
    ResponseToRequest,
    /// Soft reset.
    SoftReset,
    /// Hard reset.
    HardReset,
    /// Firmware restart notice.
    Restart,
    /// A command this driver does not know about.
    Unknown(u8),
}

impl OcmCommand {
    /// The raw command byte.
    pub fn raw(self) -> u8 {
        match self {
            OcmCommand::SourceCapabilities => 0x00,
            OcmCommand::SinkCapabilities => 0x01,
            OcmCommand::DpSinkIdentity => 0x02,
            OcmCommand::Svid => 0x03,
            OcmCommand::GetDpSinkCapability => 0x04,
            OcmCommand::Accept => 0x05,
            OcmCommand::Reject => 0x06,
            OcmCommand::PowerSwapRequest => 0x10,
            OcmCommand::DataSwapRequest => 0x11,
            OcmCommand::GotoMinRequest => 0x12,
            OcmCommand::VconnSwapRequest => 0x13,
            OcmCommand::VendorDefined => 0x14,
            OcmCommand::DpSinkConfig => 0x15,
            OcmCommand::PowerObjectRequest => 0x16,
            OcmCommand::PdStatusRequest => 0x17,
            OcmCommand::DpAltModeEnter => 0x19,
            OcmCommand::DpAltModeExit => 0x1a,
            OcmCommand::GetSinkCapability => 0x1b,
            OcmCommand::ResponseToRequest => 0xf0,
            OcmCommand::SoftReset => 0xf1,
            OcmCommand::HardReset => 0xf2,
            OcmCommand::Restart => 0xf3,
            OcmCommand::Unknown(raw) => raw,
        }
    }
}

impl From<u8> for OcmCommand {
    fn from(raw: u8) -> Self {
        match raw {
            0x00 => OcmCommand::SourceCapabilities,
            0x01 => OcmCommand::SinkCapabilities,
            0x02 => OcmCommand::DpSinkIdentity,
            0x03 => OcmCommand::Svid,
            0x04 => OcmCommand::GetDpSinkCapability,
            0x05 => OcmCommand::Accept,
            0x06 => OcmCommand::Reject,
            0x10 => OcmCommand::PowerSwapRequest,
            0x11 => OcmCommand::DataSwapRequest,
            0x12 => OcmCommand::GotoMinRequest,
            0x13 => OcmCommand::VconnSwapRequest,
            0x14 => OcmCommand::VendorDefined,
            0x15 => OcmCommand::DpSinkConfig,
            0x16 => OcmCommand::PowerObjectRequest,
            0x17 => OcmCommand::PdStatusRequest,
            0x19 => OcmCommand::DpAltModeEnter,
            0x1a => OcmCommand::DpAltModeExit,
            0x1b => OcmCommand::GetSinkCapability,
            0xf0 => OcmCommand::ResponseToRequest,
            0xf1 => OcmCommand::SoftReset,
            0xf2 => OcmCommand::HardReset,
            0xf3 => OcmCommand::Restart,
            other => OcmCommand::Unknown(other),
        }
    }
}

/// Status code carried in a response-to-request message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandStatus {
    /// The request succeeded.
    Success,
    /// The partner rejected the request.
    Reject,
    /// The request failed.
    Fail,
    /// The partner is busy.
    Busy,
    /// An unknown status code.
    Unknown(u8),
}

impl From<u8> for CommandStatus {
    fn from(raw: u8) -> Self {
        match raw {
            0 => CommandStatus::Success,
            1 => CommandStatus::Reject,
            2 => CommandStatus::Fail,
            3 => CommandStatus::Busy,
            other => CommandStatus::Unknown(other),
        }
    }
}

/// Malformed or oversized frames.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// The payload does not fit into one frame.
    #[error("payload does not fit into one frame")]
    PayloadTooLarge,

    /// The length byte is outside `1..=30`.
    #[error("invalid frame length {0}")]
    InvalidLength(u8),

    /// The frame bytes do not sum to zero.
    #[error("checksum mismatch")]
    Checksum,
}

/// One message on the OCM interface.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OcmMessage {
    /// The command.
    pub command: OcmCommand,
    /// Up to 29 bytes of payload.
    pub payload: Vec<u8, MAX_PAYLOAD_SIZE>,
}

impl OcmMessage {
    /// Create a message; fails when the payload exceeds the frame budget.
    pub fn new(command: OcmCommand, payload: &[u8]) -> Result<Self, FrameError> {
        Ok(Self {
            command,
            payload: Vec::from_slice(payload).map_err(|_| FrameError::PayloadTooLarge)?,
        })
    }

    /// Create a message without payload.
    pub fn empty(command: OcmCommand) -> Self {
        Self {
            command,
            payload: Vec::new(),
        }
    }

    /// Serialize into a wire frame, appending the zero-sum checksum.
    pub fn to_bytes(&self) -> Vec<u8, MAX_FRAME_SIZE> {
        let mut frame = Vec::new();
        // All sizes are bounded by construction.
        let _ = frame.push(self.payload.len() as u8 + 1);
        let _ = frame.push(self.command.raw());
        let _ = frame.extend_from_slice(&self.payload);

        let sum = frame.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte));
        let _ = frame.push(sum.wrapping_neg());

        frame
    }

    /// Parse a received frame from the fixed-size receive window.
    pub fn from_bytes(block: &[u8]) -> Result<Self, FrameError> {
        let length = *block.first().ok_or(FrameError::InvalidLength(0))? as usize;
        if length == 0 || length + 2 > block.len() {
            return Err(FrameError::InvalidLength(length as u8));
        }

        let frame = &block[..length + 2];
        let sum = frame.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte));
        if sum != 0 {
            return Err(FrameError::Checksum);
        }

        Ok(Self {
            command: OcmCommand::from(frame[1]),
            payload: Vec::from_slice(&frame[2..length + 1]).map_err(|_| FrameError::PayloadTooLarge)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use heapless::Vec;

    use super::{CommandStatus, FrameError, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, OcmCommand, OcmMessage};

    fn byte_sum(frame: &[u8]) -> u8 {
        frame.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
    }

    #[test]
    fn frames_sum_to_zero() {
        for len in [0usize, 1, 4, 16, MAX_PAYLOAD_SIZE] {
            let payload: Vec<u8, 29> = (0..len as u8).map(|b| b.wrapping_mul(37)).collect();
            let message = OcmMessage::new(OcmCommand::SourceCapabilities, &payload).unwrap();

            let frame = message.to_bytes();
            assert_eq!(frame.len(), len + 3);
            assert_eq!(frame[0] as usize, len + 1);
            assert_eq!(byte_sum(&frame), 0);
        }
    }

    #[test]
    fn valid_frames_round_trip() {
        let message = OcmMessage::new(OcmCommand::Svid, &[0x00, 0x00, 0x01, 0xff]).unwrap();

        let mut block = [0u8; MAX_FRAME_SIZE];
        let frame = message.to_bytes();
        block[..frame.len()].copy_from_slice(&frame);

        assert_eq!(OcmMessage::from_bytes(&block).unwrap(), message);
    }

    #[test]
    fn rejects_zero_length() {
        let block = [0u8; MAX_FRAME_SIZE];
        assert_eq!(OcmMessage::from_bytes(&block).unwrap_err(), FrameError::InvalidLength(0));
    }

    #[test]
    fn rejects_overlong_length() {
        let mut block = [0u8; MAX_FRAME_SIZE];
        block[0] = 31;
        assert_eq!(
            OcmMessage::from_bytes(&block).unwrap_err(),
            FrameError::InvalidLength(31)
        );
    }

    #[test]
    fn rejects_bad_checksum() {
        let message = OcmMessage::empty(OcmCommand::Accept);

        let mut block = [0u8; MAX_FRAME_SIZE];
        let frame = message.to_bytes();
        block[..frame.len()].copy_from_slice(&frame);
        block[2] = block[2].wrapping_add(1);

        assert_eq!(OcmMessage::from_bytes(&block).unwrap_err(), FrameError::Checksum);
    }

    #[test]
    fn rejects_oversized_payload() {
        let payload = [0u8; MAX_PAYLOAD_SIZE + 1];
        assert_eq!(
            OcmMessage::new(OcmCommand::SourceCapabilities, &payload).unwrap_err(),
            FrameError::PayloadTooLarge
        );
    }

    #[test]
    fn command_byte_mapping_round_trips() {
        for raw in 0..=255u8 {
            assert_eq!(OcmCommand::from(raw).raw(), raw);
        }
    }

    #[test]
    fn response_status_codes() {
        assert_eq!(CommandStatus::from(0), CommandStatus::Success);
        assert_eq!(CommandStatus::from(1), CommandStatus::Reject);
        assert_eq!(CommandStatus::from(2), CommandStatus::Fail);
        assert_eq!(CommandStatus::from(3), CommandStatus::Busy);
        assert_eq!(CommandStatus::from(9), CommandStatus::Unknown(9));
    }
}
