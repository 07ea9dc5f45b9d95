//! MPR121 register map, bus addresses and electrode numbering.

use core::fmt;

// --- Register Addresses ---
pub(crate) const REG_TOUCH_STATUS_L: u8 = 0x00;
pub(crate) const REG_TOUCH_STATUS_H: u8 = 0x01;
pub(crate) const REG_ECR: u8 = 0x5E;
const REG_TOUCH_THRESHOLD_0: u8 = 0x41;
const REG_RELEASE_THRESHOLD_0: u8 = 0x42;

// --- Electrode Configuration Register values ---
/// Stops all electrode scanning.
pub(crate) const ECR_STOP: u8 = 0x00;
/// CL=0 (calibration lock off), ELEPROX=0 (no proximity), ELE=0xF (12 electrodes).
pub(crate) const ECR_RUN_ALL: u8 = 0x8F;

/// Number of sensing electrodes on the controller.
pub const ELECTRODE_COUNT: usize = 12;

/// Only the low 12 bits of the touch status pair carry electrode state.
pub(crate) const TOUCH_STATUS_MASK: u16 = 0x0FFF;

/// The I2C addresses the MPR121 can be strapped to through its ADDR pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Address {
    /// ADDR tied to GND.
    #[default]
    Addr0x5A = 0x5A,
    /// ADDR tied to VDD.
    Addr0x5B = 0x5B,
    /// ADDR tied to SDA.
    Addr0x5C = 0x5C,
    /// ADDR tied to SCL.
    Addr0x5D = 0x5D,
}

impl Address {
    /// The 7-bit bus address.
    pub const fn value(self) -> u8 {
        self as u8
    }
}

/// One of the twelve sensing electrodes, `E0` to `E11`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Electrode {
    E0 = 0,
    E1,
    E2,
    E3,
    E4,
    E5,
    E6,
    E7,
    E8,
    E9,
    E10,
    E11,
}

impl Electrode {
    /// All electrodes in ascending order.
    pub const ALL: [Electrode; ELECTRODE_COUNT] = [
        Electrode::E0,
        Electrode::E1,
        Electrode::E2,
        Electrode::E3,
        Electrode::E4,
        Electrode::E5,
        Electrode::E6,
        Electrode::E7,
        Electrode::E8,
        Electrode::E9,
        Electrode::E10,
        Electrode::E11,
    ];

    /// Zero-based electrode number.
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Bit of this electrode in the touch status mask.
    pub const fn bit(self) -> u16 {
        1 << self as u16
    }

    /// Touch threshold register of this electrode.
    pub(crate) const fn touch_threshold_register(self) -> u8 {
        REG_TOUCH_THRESHOLD_0 + 2 * self as u8
    }

    /// Release threshold register, directly after the touch threshold.
    pub(crate) const fn release_threshold_register(self) -> u8 {
        REG_RELEASE_THRESHOLD_0 + 2 * self as u8
    }
}

impl fmt::Display for Electrode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.index())
    }
}

/// Returned when converting a number above 11 into an [`Electrode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidElectrode(pub u8);

impl fmt::Display for InvalidElectrode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "electrode {} out of range 0..=11", self.0)
    }
}

impl TryFrom<u8> for Electrode {
    type Error = InvalidElectrode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Electrode::ALL
            .get(value as usize)
            .copied()
            .ok_or(InvalidElectrode(value))
    }
}

impl From<Electrode> for u8 {
    fn from(electrode: Electrode) -> Self {
        electrode.index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_registers_are_interleaved() {
        assert_eq!(Electrode::E0.touch_threshold_register(), 0x41);
        assert_eq!(Electrode::E0.release_threshold_register(), 0x42);
        assert_eq!(Electrode::E1.touch_threshold_register(), 0x43);
        assert_eq!(Electrode::E11.touch_threshold_register(), 0x57);
        assert_eq!(Electrode::E11.release_threshold_register(), 0x58);
    }

    #[test]
    fn electrode_conversion() {
        for (n, electrode) in Electrode::ALL.iter().enumerate() {
            assert_eq!(Electrode::try_from(n as u8), Ok(*electrode));
            assert_eq!(electrode.bit(), 1 << n);
        }
        assert_eq!(Electrode::try_from(12), Err(InvalidElectrode(12)));
    }

    #[test]
    fn default_address() {
        assert_eq!(Address::default().value(), 0x5A);
        assert_eq!(Address::Addr0x5D.value(), 0x5D);
    }
}
