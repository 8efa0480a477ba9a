//! Error reporting
//!
//! The PDO engine does not send emergency messages itself. Faults are passed to an
//! [`ErrorReport`] implementation provided by the application, which is expected to forward them
//! to its EMCY producer.

use copdo_common::AtomicCell;

/// Emergency error code for a protocol error (CiA 301 generic "protocol error" class)
pub const EMC_PROTOCOL_ERROR: u16 = 0x8200;

/// Error status bits which the PDO engine may raise
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorStatus {
    /// A PDO mapping could not be applied
    PdoWrongMapping,
}

/// Receives error reports
pub trait ErrorReport: Sync {
    /// Report an error
    ///
    /// - `status`: The error status bit to set
    /// - `code`: The emergency error code
    /// - `info`: Additional manufacturer information; for mapping errors this is the rejected
    ///   mapping descriptor
    fn report(&self, status: ErrorStatus, code: u16, info: u32);
}

/// A single error report
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorEvent {
    /// The error status bit
    pub status: ErrorStatus,
    /// The emergency error code
    pub code: u16,
    /// Additional information
    pub info: u32,
}

/// An [`ErrorReport`] which holds the most recent report until it is taken
///
/// Useful for applications which poll for errors from their main loop.
#[derive(Debug, Default)]
pub struct ErrorLatch {
    last: AtomicCell<Option<ErrorEvent>>,
}

impl ErrorLatch {
    /// Create a new, empty latch
    pub const fn new() -> Self {
        Self {
            last: AtomicCell::new(None),
        }
    }

    /// Take the most recent report, if any
    pub fn take(&self) -> Option<ErrorEvent> {
        self.last.take()
    }
}

impl ErrorReport for ErrorLatch {
    fn report(&self, status: ErrorStatus, code: u16, info: u32) {
        self.last.store(Some(ErrorEvent { status, code, info }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_latch() {
        let latch = ErrorLatch::new();
        assert_eq!(None, latch.take());
        latch.report(ErrorStatus::PdoWrongMapping, EMC_PROTOCOL_ERROR, 1);
        latch.report(ErrorStatus::PdoWrongMapping, EMC_PROTOCOL_ERROR, 0x2000_0120);
        assert_eq!(
            Some(ErrorEvent {
                status: ErrorStatus::PdoWrongMapping,
                code: EMC_PROTOCOL_ERROR,
                info: 0x2000_0120
            }),
            latch.take()
        );
        assert_eq!(None, latch.take());
    }
}
