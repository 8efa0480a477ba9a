//! Common traits
//!
//! These are the seams between the PDO engine and the CAN driver.

use snafu::Snafu;

use crate::messages::CanMessage;

/// Error type for CAN send operations containing the failed message
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanSendError(pub CanMessage);

impl core::fmt::Display for CanSendError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Failed to send CAN message: {:?}", self.0)
    }
}

impl core::error::Error for CanSendError {}

/// Error returned by a CAN driver when a buffer cannot be configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CanBindError {
    /// The driver has no buffer with the requested index
    #[snafu(display("No CAN buffer with index {buffer}"))]
    NoSuchBuffer {
        /// The requested buffer index
        buffer: usize,
    },
    /// The identifier is already in use by another buffer
    #[snafu(display("CAN ID 0x{id:X} is already bound"))]
    IdInUse {
        /// The conflicting ID
        id: u16,
    },
}

/// Receives frames from a bound CAN rx buffer
///
/// `on_receive` is called by the driver, possibly from an interrupt, whenever a frame matching
/// the buffer's filter arrives. Implementations must not block.
pub trait CanRxHandler: Sync {
    /// Handle a received frame
    fn on_receive(&self, msg: &CanMessage);
}

/// A CAN driver which provides numbered rx and tx buffers
///
/// Rebinding an already bound buffer replaces its previous configuration. Binding an ID of 0
/// leaves the buffer configured but it will never match a frame or be sent.
pub trait CanDevice: Sync {
    /// Configure an rx buffer to deliver frames matching `id` under `mask` to `handler`
    fn bind_rx(
        &self,
        buffer: usize,
        id: u16,
        mask: u16,
        handler: &'static dyn CanRxHandler,
    ) -> Result<(), CanBindError>;

    /// Configure a tx buffer to send frames with `id` and length `len`
    ///
    /// `sync` marks frames which must only go out inside the synchronous window.
    fn bind_tx(&self, buffer: usize, id: u16, len: u8, sync: bool) -> Result<(), CanBindError>;

    /// Queue a message for transmission on a tx buffer
    fn send(&self, buffer: usize, msg: CanMessage) -> Result<(), CanSendError>;
}

#[cfg(test)]
mod tests {
    use assertables::assert_contains;

    use crate::messages::CanId;

    use super::*;

    #[test]
    fn test_error_display() {
        let err = CanBindError::IdInUse { id: 0x205 };
        assert_contains!(err.to_string().as_str(), "0x205");

        let msg = CanMessage::new(CanId::std(0x183), &[1, 2]).unwrap();
        let err = CanSendError(msg);
        assert_contains!(err.to_string().as_str(), "Failed to send CAN message");
    }
}
