//! Error type of the MPR121 driver.

use core::fmt::{self, Debug};

/// The error type returned by [`Mpr121`](crate::touch::Mpr121) operations.
///
/// `E` is the error type of the underlying I2C bus.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// A read or write transaction failed on the bus.
    I2c(E),
    /// [`Mpr121::run`](crate::touch::Mpr121::run) was called while another poller is active.
    AlreadyPolling,
    /// No subscriber slot is left on the event channel.
    TooManySubscribers,
}

impl<E: Debug> Debug for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c(err) => write!(f, "I2c({err:?})"),
            Self::AlreadyPolling => write!(f, "AlreadyPolling"),
            Self::TooManySubscribers => write!(f, "TooManySubscribers"),
        }
    }
}

impl<E: Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c(err) => write!(f, "I2C transaction failed: {err:?}"),
            Self::AlreadyPolling => write!(f, "touch poller is already running"),
            Self::TooManySubscribers => write!(f, "maximum number of event subscribers reached"),
        }
    }
}
