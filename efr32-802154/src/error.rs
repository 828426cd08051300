//! Error types for the driver.

use crate::rail::RailError;

/// Errors surfaced by the application-facing driver operations.
///
/// Interrupt-context anomalies are never reported here: a corrupt receive
/// is dropped silently and the upper layer is expected to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// A caller-supplied value is out of range: a payload longer than
    /// [`Packet::CAPACITY`](crate::Packet::CAPACITY) bytes, or a channel
    /// outside 11..=26.
    InvalidArgument,
    /// A transmit is already in flight; reissue once it completes.
    Busy,
    /// The hardware rejected an operation.
    Hardware(RailError),
}

impl From<RailError> for Error {
    fn from(err: RailError) -> Self {
        Error::Hardware(err)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidArgument => f.write_str("invalid argument"),
            Error::Busy => f.write_str("tx pending"),
            Error::Hardware(err) => write!(f, "hardware error: {:?}", err),
        }
    }
}

impl core::error::Error for Error {}
