//! I2C bus adapter
//!
//! Implements [`BusPort`] over any `embedded-hal-async` I2C bus. Every
//! port operation maps to a single `write`/`write_read` transaction, so
//! atomicity comes directly from the underlying bus implementation.

use embedded_hal_async::i2c::{Error as I2cError, ErrorKind, I2c};

use crate::ports::bus::{BusError, BusPort};

/// Largest register block any driver writes in one transaction.
const MAX_WRITE: usize = 32;

/// BusPort adapter owning the underlying I2C peripheral
pub struct I2cBus<I> {
    i2c: I,
}

impl<I: I2c> I2cBus<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    /// Release the underlying I2C bus
    pub fn release(self) -> I {
        self.i2c
    }
}

fn map_err<E: I2cError>(e: E) -> BusError {
    match e.kind() {
        ErrorKind::NoAcknowledge(_) => BusError::Nack,
        _ => BusError::Fault,
    }
}

impl<I: I2c> BusPort for I2cBus<I> {
    async fn read_byte(&mut self, addr: u8, reg: u8) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(addr, &[reg], &mut buf)
            .await
            .map_err(map_err)?;
        Ok(buf[0])
    }

    async fn read_word(&mut self, addr: u8, reg: u8) -> Result<u16, BusError> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(addr, &[reg], &mut buf)
            .await
            .map_err(map_err)?;
        Ok(u16::from_le_bytes(buf))
    }

    async fn read_block(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<usize, BusError> {
        self.i2c
            .write_read(addr, &[reg], buf)
            .await
            .map_err(map_err)?;
        Ok(buf.len())
    }

    async fn write_byte(&mut self, addr: u8, reg: u8, value: u8) -> Result<(), BusError> {
        self.i2c.write(addr, &[reg, value]).await.map_err(map_err)
    }

    async fn write_word(&mut self, addr: u8, reg: u8, value: u16) -> Result<(), BusError> {
        let [lo, hi] = value.to_le_bytes();
        self.i2c.write(addr, &[reg, lo, hi]).await.map_err(map_err)
    }

    async fn write_block(&mut self, addr: u8, reg: u8, data: &[u8]) -> Result<(), BusError> {
        let mut frame = heapless::Vec::<u8, { MAX_WRITE + 1 }>::new();
        frame.push(reg).map_err(|_| BusError::Fault)?;
        frame.extend_from_slice(data).map_err(|_| BusError::Fault)?;
        self.i2c.write(addr, &frame).await.map_err(map_err)
    }
}
