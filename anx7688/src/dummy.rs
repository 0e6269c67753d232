//! Test doubles for the register buses, the platform and the timer.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::vec::Vec;

use anx7688_traits::{
    BusError, ChargerKind, ControlPins, EventSource, HardwareEvent, HotPlugDetect, InputSupply, PowerRails,
    RegisterBus, RegulatorError, RoleSwitchError, SupplyError, Timer, UsbRole, UsbRoleSwitch,
};

/// A scripted register space.
///
/// Reads come from a sparse register map (zero by default), block reads can
/// be fed whole frames, and single registers can be made to fail or to
/// report busy for a number of polls after a block write.
pub(crate) struct DummyBus {
    regs: HashMap<u8, u8>,
    /// Frames returned by block reads, per register.
    frames: HashMap<u8, VecDeque<Vec<u8>>>,
    /// Single-register writes, in order.
    pub(crate) writes: Vec<(u8, u8)>,
    /// Block writes, in order.
    pub(crate) block_writes: Vec<(u8, Vec<u8>)>,
    fail_reads: HashSet<u8>,
    fail_writes: HashSet<u8>,
    armed_busy: Option<(u8, u32)>,
    busy: Option<(u8, u32)>,
}

impl DummyBus {
    pub(crate) fn new() -> Self {
        Self {
            regs: HashMap::new(),
            frames: HashMap::new(),
            writes: Vec::new(),
            block_writes: Vec::new(),
            fail_reads: HashSet::new(),
            fail_writes: HashSet::new(),
            armed_busy: None,
            busy: None,
        }
    }

    /// Set a register value that reads will observe.
    pub(crate) fn set_reg(&mut self, reg: u8, value: u8) {
        self.regs.insert(reg, value);
    }

    /// The last value written to a register, if any.
    pub(crate) fn written(&self, reg: u8) -> Option<u8> {
        self.writes.iter().rev().find(|(r, _)| *r == reg).map(|(_, v)| *v)
    }

    /// Queue a frame for a block read of `reg`.
    pub(crate) fn inject_frame(&mut self, reg: u8, frame: &[u8]) {
        self.frames.entry(reg).or_default().push_back(frame.to_vec());
    }

    /// Make reads of `reg` fail.
    pub(crate) fn fail_read(&mut self, reg: u8) {
        self.fail_reads.insert(reg);
    }

    /// Make writes of `reg` fail.
    pub(crate) fn fail_write(&mut self, reg: u8) {
        self.fail_writes.insert(reg);
    }

    /// After the next block write to `reg`, report `polls` busy reads.
    pub(crate) fn busy_after_block_write(&mut self, reg: u8, polls: u32) {
        self.armed_busy = Some((reg, polls));
    }
}

impl RegisterBus for DummyBus {
    async fn read(&mut self, reg: u8) -> Result<u8, BusError> {
        if self.fail_reads.contains(&reg) {
            return Err(BusError::Read);
        }

        if let Some((busy_reg, remaining)) = self.busy.as_mut() {
            if *busy_reg == reg && *remaining > 0 {
                *remaining -= 1;
                return Ok(1);
            }
        }

        Ok(*self.regs.get(&reg).unwrap_or(&0))
    }

    async fn write(&mut self, reg: u8, value: u8) -> Result<(), BusError> {
        if self.fail_writes.contains(&reg) {
            return Err(BusError::Write);
        }

        self.writes.push((reg, value));
        self.regs.insert(reg, value);
        Ok(())
    }

    async fn read_block(&mut self, reg: u8, buffer: &mut [u8]) -> Result<(), BusError> {
        if self.fail_reads.contains(&reg) {
            return Err(BusError::Read);
        }

        if let Some(frame) = self.frames.get_mut(&reg).and_then(VecDeque::pop_front) {
            let len = frame.len().min(buffer.len());
            buffer.fill(0);
            buffer[..len].copy_from_slice(&frame[..len]);
            return Ok(());
        }

        for (offset, byte) in buffer.iter_mut().enumerate() {
            *byte = *self.regs.get(&reg.wrapping_add(offset as u8)).unwrap_or(&0);
        }
        Ok(())
    }

    async fn write_block(&mut self, reg: u8, data: &[u8]) -> Result<(), BusError> {
        if self.fail_writes.contains(&reg) {
            return Err(BusError::Write);
        }

        self.block_writes.push((reg, data.to_vec()));
        if let Some((armed_reg, polls)) = self.armed_busy {
            if armed_reg == reg {
                self.busy = Some((reg, polls));
            }
        }
        Ok(())
    }
}

/// A virtual monotonic clock; sleeps advance it instantly.
pub(crate) struct DummyTimer;

static NOW_US: AtomicU64 = AtomicU64::new(0);

impl Timer for DummyTimer {
    async fn after_millis(milliseconds: u64) {
        NOW_US.fetch_add(milliseconds * 1000, Ordering::Relaxed);
    }

    async fn after_micros(microseconds: u64) {
        NOW_US.fetch_add(microseconds, Ordering::Relaxed);
    }

    fn now_millis() -> u64 {
        NOW_US.load(Ordering::Relaxed) / 1000
    }
}

/// Records every collaborator interaction the controller makes.
pub(crate) struct DummyPlatform {
    pub(crate) power_enabled: bool,
    pub(crate) reset_asserted: bool,
    pub(crate) cable: bool,
    pub(crate) vconn_on: bool,
    pub(crate) vbus_on: bool,
    pub(crate) fail_vconn_enable: bool,
    pub(crate) usb_role: UsbRole,
    pub(crate) hot_plug: bool,
    pub(crate) hot_plug_writes: u32,
    pub(crate) current_limit_ma: Option<u32>,
    pub(crate) online: Option<bool>,
    /// `None` makes the detection-state query fail.
    pub(crate) detection_enabled: Option<bool>,
    pub(crate) charger: ChargerKind,
}

impl Default for DummyPlatform {
    fn default() -> Self {
        Self {
            power_enabled: false,
            reset_asserted: false,
            cable: false,
            vconn_on: false,
            vbus_on: false,
            fail_vconn_enable: false,
            usb_role: UsbRole::None,
            hot_plug: false,
            hot_plug_writes: 0,
            current_limit_ma: None,
            online: None,
            detection_enabled: None,
            charger: ChargerKind::Unknown,
        }
    }
}

impl PowerRails for DummyPlatform {
    async fn enable_vconn(&mut self) -> Result<(), RegulatorError> {
        if self.fail_vconn_enable {
            return Err(RegulatorError::Enable);
        }
        self.vconn_on = true;
        Ok(())
    }

    async fn disable_vconn(&mut self) -> Result<(), RegulatorError> {
        self.vconn_on = false;
        Ok(())
    }

    async fn enable_vbus(&mut self) -> Result<(), RegulatorError> {
        self.vbus_on = true;
        Ok(())
    }

    async fn disable_vbus(&mut self) -> Result<(), RegulatorError> {
        self.vbus_on = false;
        Ok(())
    }
}

impl InputSupply for DummyPlatform {
    async fn set_current_limit_ma(&mut self, limit_ma: u32) -> Result<(), SupplyError> {
        self.current_limit_ma = Some(limit_ma);
        Ok(())
    }

    async fn set_online(&mut self, online: bool) -> Result<(), SupplyError> {
        self.online = Some(online);
        Ok(())
    }

    async fn set_detection_enabled(&mut self, enabled: bool) -> Result<(), SupplyError> {
        self.detection_enabled = Some(enabled);
        Ok(())
    }

    async fn detection_enabled(&mut self) -> Result<bool, SupplyError> {
        self.detection_enabled.ok_or(SupplyError::Read)
    }

    async fn charger_kind(&mut self) -> Result<ChargerKind, SupplyError> {
        Ok(self.charger)
    }
}

impl UsbRoleSwitch for DummyPlatform {
    async fn set_usb_role(&mut self, role: UsbRole) -> Result<(), RoleSwitchError> {
        self.usb_role = role;
        Ok(())
    }

    fn usb_role(&mut self) -> UsbRole {
        self.usb_role
    }
}

impl ControlPins for DummyPlatform {
    fn set_power_enable(&mut self, enabled: bool) {
        self.power_enabled = enabled;
    }

    fn set_reset(&mut self, asserted: bool) {
        self.reset_asserted = asserted;
    }

    fn cable_detected(&mut self) -> bool {
        self.cable
    }
}

impl HotPlugDetect for DummyPlatform {
    fn set_hot_plug(&mut self, asserted: bool) {
        self.hot_plug = asserted;
        self.hot_plug_writes += 1;
    }
}

/// A queue of scripted hardware events; pends forever once drained.
#[derive(Default)]
pub(crate) struct DummyEvents {
    pub(crate) queue: VecDeque<HardwareEvent>,
}

impl EventSource for DummyEvents {
    async fn next(&mut self) -> HardwareEvent {
        match self.queue.pop_front() {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use anx7688_traits::RegisterBus;

    use super::DummyBus;

    #[tokio::test]
    async fn block_reads_fall_back_to_the_register_map() {
        let mut bus = DummyBus::new();
        bus.set_reg(0x15, 0x12);
        bus.set_reg(0x16, 0x34);

        let mut buffer = [0u8; 2];
        bus.read_block(0x15, &mut buffer).await.unwrap();
        assert_eq!(buffer, [0x12, 0x34]);
    }

    #[tokio::test]
    async fn injected_frames_take_precedence() {
        let mut bus = DummyBus::new();
        bus.inject_frame(0x51, &[1, 2, 3]);

        let mut buffer = [0xffu8; 8];
        bus.read_block(0x51, &mut buffer).await.unwrap();
        assert_eq!(buffer, [1, 2, 3, 0, 0, 0, 0, 0]);
    }
}
