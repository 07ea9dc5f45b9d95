//! Register access and run-state control.
//!
//! [`Registers`] owns the bus and the delay provider. The driver keeps it behind
//! its bus lock, so every method here runs without interleaving with other
//! users of the same controller.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::error::Error;
use crate::event::TouchMask;
use crate::registers::{
    Address, ECR_RUN_ALL, ECR_STOP, REG_ECR, REG_TOUCH_STATUS_H, REG_TOUCH_STATUS_L,
};

/// Wait after toggling the ECR before touching the controller again.
const SETTLE_DELAY_MS: u32 = 5;

/// Single-byte register access to one MPR121.
pub struct Registers<I2C, D> {
    i2c: I2C,
    delay: D,
    address: Address,
    running: bool,
}

impl<I2C, D> Registers<I2C, D>
where
    I2C: I2c<SevenBitAddress>,
    D: DelayNs,
{
    /// Wraps the bus.
    ///
    /// The run state is assumed to be on: the controller may still be scanning
    /// from before an MCU reset, so the first [`Registers::stop`] always writes
    /// the ECR.
    pub fn new(i2c: I2C, delay: D, address: Address) -> Self {
        Self {
            i2c,
            delay,
            address,
            running: true,
        }
    }

    /// Gives back the bus and the delay provider.
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    /// The configured bus address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Whether the controller is in run mode.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Writes `value` to `register`.
    pub async fn write_register(&mut self, register: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        log::trace!(
            "mpr121@{:#04x}: write {register:#04x} <- {value:#04x}",
            self.address.value()
        );
        self.i2c
            .write(self.address.value(), &[register, value])
            .await
            .map_err(|err| {
                log::warn!("Error writing register {register:#04x}: {err:?}");
                Error::I2c(err)
            })
    }

    /// Reads a single register.
    pub async fn read_register(&mut self, register: u8) -> Result<u8, Error<I2C::Error>> {
        let mut value = [0u8; 1];
        self.i2c
            .write_read(self.address.value(), &[register], &mut value)
            .await
            .map_err(|err| {
                log::warn!("Error reading register {register:#04x}: {err:?}");
                Error::I2c(err)
            })?;
        Ok(value[0])
    }

    /// Reads the touch status pair, low byte first.
    pub async fn read_touch_mask(&mut self) -> Result<TouchMask, Error<I2C::Error>> {
        let low = self.read_register(REG_TOUCH_STATUS_L).await?;
        let high = self.read_register(REG_TOUCH_STATUS_H).await?;
        Ok(TouchMask::from_status(low, high))
    }

    /// Leaves run mode. Does nothing when already stopped.
    pub async fn stop(&mut self) -> Result<(), Error<I2C::Error>> {
        if !self.running {
            return Ok(());
        }
        self.write_register(REG_ECR, ECR_STOP).await?;
        self.delay.delay_ms(SETTLE_DELAY_MS).await;
        self.running = false;
        log::debug!("mpr121@{:#04x}: scanning stopped", self.address.value());
        Ok(())
    }

    /// Enters run mode with all twelve electrodes enabled. Does nothing when
    /// already running.
    pub async fn start(&mut self) -> Result<(), Error<I2C::Error>> {
        if self.running {
            return Ok(());
        }
        self.write_register(REG_ECR, ECR_RUN_ALL).await?;
        self.delay.delay_ms(SETTLE_DELAY_MS).await;
        self.running = true;
        log::debug!("mpr121@{:#04x}: scanning started", self.address.value());
        Ok(())
    }

    /// Performs `writes` with scanning stopped.
    ///
    /// Writes stop at the first failure. Scanning is resumed on every path once
    /// the controller was stopped, and the first error is returned afterwards.
    pub async fn apply_safely<W>(&mut self, writes: W) -> Result<(), Error<I2C::Error>>
    where
        W: IntoIterator<Item = (u8, u8)>,
    {
        self.stop().await?;

        let mut result = Ok(());
        for (register, value) in writes {
            if let Err(err) = self.write_register(register, value).await {
                result = Err(err);
                break;
            }
        }

        // On failure, it's important to still resume scanning.
        let resumed = self.start().await;
        result.and(resumed)
    }
}
