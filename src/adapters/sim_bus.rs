//! Simulated bus for deterministic driver tests
//!
//! Models each device as a 256-entry register file. Writes land in the
//! register file so read-modify-write sequences behave like hardware.
//! Individual registers can additionally be fed a queue of byte values
//! (consumed one per read) to script status-poll sequences, block
//! reads can be truncated to provoke parse failures, and devices can
//! be removed mid-test to model transport faults.

use std::collections::{HashMap, VecDeque};

use crate::ports::bus::{BusError, BusPort};

struct SimDevice {
    regs: [u8; 256],
    queued: HashMap<u8, VecDeque<u8>>,
    truncate: Option<(u8, usize)>,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self {
            regs: [0; 256],
            queued: HashMap::new(),
            truncate: None,
        }
    }
}

pub(crate) struct SimBus {
    devices: HashMap<u8, SimDevice>,
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
        }
    }

    pub fn add_device(&mut self, addr: u8) {
        self.devices.insert(addr, SimDevice::default());
    }

    /// Drop a device from the bus; every transaction Nacks until it is
    /// added again. Models a wiring fault or a chip losing power.
    pub fn remove_device(&mut self, addr: u8) {
        self.devices.remove(&addr);
    }

    pub fn set_reg(&mut self, addr: u8, reg: u8, value: u8) {
        self.device_mut(addr).regs[reg as usize] = value;
    }

    pub fn set_word(&mut self, addr: u8, reg: u8, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.set_reg(addr, reg, lo);
        self.set_reg(addr, reg + 1, hi);
    }

    /// Load consecutive registers starting at `reg`.
    pub fn load_block(&mut self, addr: u8, reg: u8, data: &[u8]) {
        let dev = self.device_mut(addr);
        dev.regs[reg as usize..reg as usize + data.len()].copy_from_slice(data);
    }

    /// Script byte reads of `reg`: each read pops one value; once the
    /// queue is drained, reads fall back to the register file.
    pub fn queue_byte_reads(&mut self, addr: u8, reg: u8, values: &[u8]) {
        self.device_mut(addr)
            .queued
            .entry(reg)
            .or_default()
            .extend(values.iter().copied());
    }

    /// Make block reads at `reg` deliver only `len` bytes.
    pub fn truncate_block(&mut self, addr: u8, reg: u8, len: usize) {
        self.device_mut(addr).truncate = Some((reg, len));
    }

    pub fn reg(&self, addr: u8, reg: u8) -> u8 {
        self.devices[&addr].regs[reg as usize]
    }

    fn device_mut(&mut self, addr: u8) -> &mut SimDevice {
        self.devices.get_mut(&addr).expect("unknown sim device")
    }

    fn lookup(&mut self, addr: u8) -> Result<&mut SimDevice, BusError> {
        self.devices.get_mut(&addr).ok_or(BusError::Nack)
    }
}

impl BusPort for SimBus {
    async fn read_byte(&mut self, addr: u8, reg: u8) -> Result<u8, BusError> {
        let dev = self.lookup(addr)?;
        if let Some(queue) = dev.queued.get_mut(&reg) {
            if let Some(value) = queue.pop_front() {
                return Ok(value);
            }
        }
        Ok(dev.regs[reg as usize])
    }

    async fn read_word(&mut self, addr: u8, reg: u8) -> Result<u16, BusError> {
        // Word reads honor the queued scripts byte by byte, same as
        // read_byte, so polled word registers behave consistently.
        let lo = self.read_byte(addr, reg).await?;
        let hi = self.read_byte(addr, reg + 1).await?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    async fn read_block(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<usize, BusError> {
        let dev = self.lookup(addr)?;
        let mut len = buf.len();
        if let Some((treg, tlen)) = dev.truncate {
            if treg == reg {
                len = tlen.min(len);
            }
        }
        buf[..len].copy_from_slice(&dev.regs[reg as usize..reg as usize + len]);
        Ok(len)
    }

    async fn write_byte(&mut self, addr: u8, reg: u8, value: u8) -> Result<(), BusError> {
        self.lookup(addr)?.regs[reg as usize] = value;
        Ok(())
    }

    async fn write_word(&mut self, addr: u8, reg: u8, value: u16) -> Result<(), BusError> {
        let [lo, hi] = value.to_le_bytes();
        let dev = self.lookup(addr)?;
        dev.regs[reg as usize] = lo;
        dev.regs[reg as usize + 1] = hi;
        Ok(())
    }

    async fn write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<(), BusError> {
        let dev = self.lookup(addr)?;
        dev.regs[reg as usize..reg as usize + data.len()].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn word_reads_consume_queued_bytes_before_register_file() {
        let mut bus = SimBus::new();
        bus.add_device(0x10);
        bus.set_word(0x10, 0x04, 0x1111);
        bus.queue_byte_reads(0x10, 0x04, &[0x22]);
        bus.queue_byte_reads(0x10, 0x05, &[0x33]);

        assert_eq!(block_on(bus.read_word(0x10, 0x04)), Ok(0x3322));
        // Queues drained; back to the register file
        assert_eq!(block_on(bus.read_word(0x10, 0x04)), Ok(0x1111));
    }

    #[test]
    fn removed_device_nacks_until_re_added() {
        let mut bus = SimBus::new();
        bus.add_device(0x10);
        bus.set_reg(0x10, 0x00, 0x42);

        bus.remove_device(0x10);
        assert_eq!(block_on(bus.read_byte(0x10, 0x00)), Err(BusError::Nack));

        bus.add_device(0x10);
        assert_eq!(block_on(bus.read_byte(0x10, 0x00)), Ok(0x00));
    }
}
