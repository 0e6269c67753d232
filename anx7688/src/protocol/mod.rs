//! Message transport to the on-chip microcontroller.
//!
//! The OCM exchanges framed, checksummed messages through send/receive
//! windows in the secondary (TCPC-like) register space. The transport owns
//! that register space; besides the message windows it also carries the
//! other secondary-space accessors the controller needs.

pub mod message;
pub mod pdo;

use core::marker::PhantomData;

use anx7688_traits::{BusError, RegisterBus, Timer};

use crate::registers::tcpc;
use message::{FrameError, MAX_FRAME_SIZE, OcmMessage};

/// Attempts made while waiting for the send queue to drain.
const QUEUE_DRAIN_ATTEMPTS: u32 = 300;

/// Interval between send-queue polls, in microseconds.
const QUEUE_DRAIN_INTERVAL_US: u64 = 100;

/// Errors of the message transport.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Register access failed.
    #[error("register access failed")]
    Bus(BusError),

    /// The hardware send queue is occupied.
    #[error("send queue is busy")]
    Busy,

    /// The send queue did not drain in time.
    #[error("send queue did not drain in time")]
    Timeout,

    /// A received frame failed validation.
    #[error("malformed frame")]
    Frame(FrameError),
}

impl From<BusError> for TransportError {
    fn from(err: BusError) -> Self {
        TransportError::Bus(err)
    }
}

impl From<FrameError> for TransportError {
    fn from(err: FrameError) -> Self {
        TransportError::Frame(err)
    }
}

/// A bounded poll: at most `attempts` waits of `interval_us` each.
///
/// Keeps busy-wait timing policy explicit; the caller probes its condition
/// between ticks.
pub(crate) struct PollSchedule {
    attempts: u32,
    interval_us: u64,
}

impl PollSchedule {
    pub(crate) const fn new(attempts: u32, interval_us: u64) -> Self {
        Self { attempts, interval_us }
    }

    /// Sleep one interval. Returns `false` once the schedule is exhausted.
    pub(crate) async fn tick<TIM: Timer>(&mut self) -> bool {
        if self.attempts == 0 {
            return false;
        }

        self.attempts -= 1;
        TIM::after_micros(self.interval_us).await;
        true
    }
}

/// Framed message channel to the OCM.
pub struct OcmTransport<B: RegisterBus, TIM: Timer> {
    bus: B,
    _timer: PhantomData<TIM>,
}

impl<B: RegisterBus, TIM: Timer> OcmTransport<B, TIM> {
    /// Create a transport over the secondary register space.
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            _timer: PhantomData,
        }
    }

    /// Send one message.
    ///
    /// Delivery is at most once: an occupied queue fails with [`Busy`]
    /// immediately, and nothing is queued or retried here. After the write,
    /// waits up to 30 ms for the hardware to consume the frame.
    ///
    /// [`Busy`]: TransportError::Busy
    pub async fn send(&mut self, message: &OcmMessage) -> Result<(), TransportError> {
        let frame = message.to_bytes();
        debug!("send ocm message cmd={:?} len={}", message.command, frame.len());

        if self.bus.read(tcpc::INTERFACE_SEND).await? != 0 {
            error!("failed to send ocm message (tx buffer full)");
            return Err(TransportError::Busy);
        }

        self.bus.write_block(tcpc::INTERFACE_SEND, &frame).await?;

        let mut schedule = PollSchedule::new(QUEUE_DRAIN_ATTEMPTS, QUEUE_DRAIN_INTERVAL_US);
        loop {
            if self.bus.read(tcpc::INTERFACE_SEND).await? == 0 {
                return Ok(());
            }

            if !schedule.tick::<TIM>().await {
                error!("timeout waiting for the send queue to drain");
                return Err(TransportError::Timeout);
            }
        }
    }

    /// Receive and decode one pending message.
    ///
    /// Malformed frames are dropped: the receive window is cleared, the
    /// error is logged and returned, and the session is otherwise
    /// unaffected.
    pub async fn receive(&mut self) -> Result<OcmMessage, TransportError> {
        let mut block = [0u8; MAX_FRAME_SIZE];
        self.bus.read_block(tcpc::INTERFACE_RECV, &mut block).await?;

        // Clearing the indicator is best effort; the frame is already ours.
        if self.bus.write(tcpc::INTERFACE_RECV, 0).await.is_err() {
            warn!("failed to clear the receive window");
        }

        match OcmMessage::from_bytes(&block) {
            Ok(message) => {
                debug!(
                    "recv ocm message cmd={:?} len={}",
                    message.command,
                    message.payload.len()
                );
                Ok(message)
            }
            Err(err) => {
                error!("dropping malformed ocm frame: {:?}", err);
                Err(err.into())
            }
        }
    }

    /// The chip vendor identifier.
    pub async fn vendor_id(&mut self) -> Result<u16, TransportError> {
        let low = self.bus.read(tcpc::VENDOR_ID0).await?;
        let high = self.bus.read(tcpc::VENDOR_ID1).await?;
        Ok(u16::from_le_bytes([low, high]))
    }

    /// Read the alert status register.
    pub async fn read_alert(&mut self) -> Result<u8, TransportError> {
        Ok(self.bus.read(tcpc::ALERT0).await?)
    }

    /// Acknowledge alert bits by writing them back.
    pub async fn ack_alert(&mut self, bits: u8) -> Result<(), TransportError> {
        Ok(self.bus.write(tcpc::ALERT0, bits).await?)
    }

    /// The DisplayPort alt-mode state and substate.
    pub async fn read_dp_state(&mut self) -> Result<(u8, u8), TransportError> {
        let state = self.bus.read(tcpc::DP_STATE).await?;
        let substate = self.bus.read(tcpc::DP_SUBSTATE).await?;
        Ok((state, substate))
    }

    #[cfg(test)]
    pub(crate) fn bus(&mut self) -> &mut B {
        &mut self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::{OcmTransport, TransportError};
    use crate::dummy::{DummyBus, DummyTimer};
    use crate::protocol::message::{FrameError, OcmCommand, OcmMessage};
    use crate::registers::tcpc;

    fn transport() -> OcmTransport<DummyBus, DummyTimer> {
        OcmTransport::new(DummyBus::new())
    }

    #[tokio::test]
    async fn send_writes_a_checksummed_frame() {
        let mut transport = transport();

        let message = OcmMessage::new(OcmCommand::Svid, &[0x00, 0x00, 0x01, 0xff]).unwrap();
        transport.send(&message).await.unwrap();

        let (reg, frame) = transport.bus().block_writes.remove(0);
        assert_eq!(reg, tcpc::INTERFACE_SEND);
        assert_eq!(frame[0], 5);
        assert_eq!(frame[1], 0x03);
        assert_eq!(frame.iter().fold(0u8, |sum, b| sum.wrapping_add(*b)), 0);
    }

    #[tokio::test]
    async fn send_fails_when_queue_is_occupied() {
        let mut transport = transport();
        transport.bus().set_reg(tcpc::INTERFACE_SEND, 1);

        let err = transport.send(&OcmMessage::empty(OcmCommand::Accept)).await.unwrap_err();
        assert_eq!(err, TransportError::Busy);
        assert!(transport.bus().block_writes.is_empty());
    }

    #[tokio::test]
    async fn send_times_out_when_queue_never_drains() {
        let mut transport = transport();
        transport.bus().busy_after_block_write(tcpc::INTERFACE_SEND, u32::MAX);

        let err = transport.send(&OcmMessage::empty(OcmCommand::Accept)).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout);
    }

    #[tokio::test]
    async fn send_succeeds_after_a_slow_drain() {
        let mut transport = transport();
        transport.bus().busy_after_block_write(tcpc::INTERFACE_SEND, 10);

        transport.send(&OcmMessage::empty(OcmCommand::Accept)).await.unwrap();
    }

    #[tokio::test]
    async fn receive_decodes_an_injected_frame() {
        let mut transport = transport();

        let message = OcmMessage::new(OcmCommand::SourceCapabilities, &[0x2c, 0x91, 0x01, 0x08]).unwrap();
        transport.bus().inject_frame(tcpc::INTERFACE_RECV, &message.to_bytes());

        assert_eq!(transport.receive().await.unwrap(), message);
        // The receive window was cleared.
        assert!(
            transport
                .bus()
                .writes
                .iter()
                .any(|(reg, value)| *reg == tcpc::INTERFACE_RECV && *value == 0)
        );
    }

    #[tokio::test]
    async fn receive_drops_malformed_frames() {
        let mut transport = transport();

        let mut frame = OcmMessage::empty(OcmCommand::Accept).to_bytes();
        frame[2] = frame[2].wrapping_add(1);
        transport.bus().inject_frame(tcpc::INTERFACE_RECV, &frame);

        assert_eq!(
            transport.receive().await.unwrap_err(),
            TransportError::Frame(FrameError::Checksum)
        );
    }

    #[tokio::test]
    async fn vendor_id_is_little_endian() {
        let mut transport = transport();
        transport.bus().set_reg(tcpc::VENDOR_ID0, 0x88);
        transport.bus().set_reg(tcpc::VENDOR_ID1, 0x76);

        assert_eq!(transport.vendor_id().await.unwrap(), 0x7688);
    }
}
