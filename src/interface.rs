//! Bus transport abstraction for the L6470
//!
//! The chip speaks a byte-oriented command protocol: every byte is exchanged
//! full-duplex, and the chip latches each byte on the rising edge of chip
//! select. The driver therefore consumes exactly one capability from its
//! transport, [`ByteTransfer::transfer`], and leaves chip-select framing to
//! the transport implementation.

use embedded_hal::spi::SpiDevice;

/// Full-duplex single-byte exchange with the motor controller
///
/// Implementations must guarantee FIFO ordering and no byte loss within one
/// logical command; the driver issues the bytes of a command back to back and
/// has no framing beyond that sequence.
///
/// The trait is implemented for `&mut T` as well, so the driver can either
/// own its transport outright or borrow one supplied by the caller:
///
/// ```ignore
/// // Driver owns the transport
/// let motor = L6470Driver::new(SpiInterface::new(spi_device));
///
/// // Driver borrows a caller-managed transport
/// let mut interface = SpiInterface::new(spi_device);
/// let motor = L6470Driver::new(&mut interface);
/// ```
pub trait ByteTransfer {
    /// Transport error type
    type Error;

    /// Send one byte and return the byte shifted out of the chip during the
    /// same clock cycle
    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error>;
}

impl<T: ByteTransfer + ?Sized> ByteTransfer for &mut T {
    type Error = T::Error;

    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error> {
        T::transfer(self, byte)
    }
}

/// SPI transport for the L6470
///
/// # Note on Chip Select
///
/// This interface uses the `SpiDevice` trait from `embedded-hal`, which
/// manages the chip select (CS) pin automatically. Each byte is exchanged in
/// its own SPI transaction: the L6470 requires CS to rise between protocol
/// bytes, which is how it delimits them.
///
/// If using `embedded-hal-bus`, you would typically create an `SpiDevice`
/// like:
/// ```ignore
/// let spi_device = embedded_hal_bus::spi::ExclusiveDevice::new(spi_bus, cs_pin, delay);
/// let interface = SpiInterface::new(spi_device);
/// ```
pub struct SpiInterface<SPI> {
    spi: SPI,
}

impl<SPI> SpiInterface<SPI> {
    /// Create a new SPI transport from the given SPI device
    ///
    /// The SPI device should already include chip select management via the
    /// `SpiDevice` trait (e.g., using `embedded_hal_bus::spi::ExclusiveDevice`).
    /// The L6470 expects SPI mode 3 at up to 5 MHz.
    pub const fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Consume the transport and return the SPI device
    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI, E> ByteTransfer for SpiInterface<SPI>
where
    SPI: SpiDevice<Error = E>,
{
    type Error = E;

    fn transfer(&mut self, byte: u8) -> Result<u8, Self::Error> {
        // One transaction per byte so CS frames every byte.
        let mut buffer = [byte];
        self.spi.transfer_in_place(&mut buffer)?;
        Ok(buffer[0])
    }
}
