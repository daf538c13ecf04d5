//! Bus port - narrow transport capability for register transactions
//!
//! All drivers talk to their chip through this trait: byte, word and
//! block reads/writes at a (device-address, register) pair. Each call is
//! atomic with respect to every other call on the same bus, so a
//! multi-byte channel can never tear across transactions.
//!
//! Keeping the port this narrow allows a simulated bus to stand in for
//! real hardware in tests.

use core::future::Future;

/// Error type for bus transactions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// Device did not acknowledge its address or a register access
    Nack,
    /// Any other transport-level fault (arbitration loss, overrun, ...)
    Fault,
}

/// Port for register-level transactions on one shared serial bus
///
/// Words are little-endian on the wire, matching the chips this crate
/// drives. `read_block` returns the number of bytes actually delivered;
/// drivers treat a short block as a parse failure.
pub trait BusPort {
    /// Read a single byte register
    fn read_byte(&mut self, addr: u8, reg: u8) -> impl Future<Output = Result<u8, BusError>>;

    /// Read a 16-bit little-endian register
    fn read_word(&mut self, addr: u8, reg: u8) -> impl Future<Output = Result<u16, BusError>>;

    /// Read `buf.len()` consecutive bytes starting at `reg` in one
    /// transaction, returning how many bytes were delivered
    fn read_block(
        &mut self,
        addr: u8,
        reg: u8,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<usize, BusError>>;

    /// Write a single byte register
    fn write_byte(
        &mut self,
        addr: u8,
        reg: u8,
        value: u8,
    ) -> impl Future<Output = Result<(), BusError>>;

    /// Write a 16-bit little-endian register
    fn write_word(
        &mut self,
        addr: u8,
        reg: u8,
        value: u16,
    ) -> impl Future<Output = Result<(), BusError>>;

    /// Write consecutive bytes starting at `reg` in one transaction
    fn write_block(
        &mut self,
        addr: u8,
        reg: u8,
        data: &[u8],
    ) -> impl Future<Output = Result<(), BusError>>;
}
