//! SYNC consumer state
use copdo_common::{
    messages::{CanMessage, SyncObject, SYNC_ID},
    traits::{CanBindError, CanDevice, CanRxHandler},
    AtomicCell,
};
use defmt_or_log::warn;

/// Provides the state of the SYNC consumer to the PDOs
///
/// Supplying an implementation to a PDO enables synchronous transmission types on it.
pub trait SyncStatus: Sync {
    /// The receive toggle, which changes state on every received SYNC
    ///
    /// Synchronous RPDOs store frames into one of two buffers depending on this value, so that
    /// frames received before a SYNC are not mixed with frames received after it.
    fn rx_toggle(&self) -> bool;

    /// The counter value carried by the most recent SYNC
    fn counter(&self) -> u8;

    /// The configured SYNC counter overflow value
    ///
    /// A non-zero value means SYNC messages carry a counter, which enables the TPDO SYNC start
    /// value.
    fn counter_overflow(&self) -> u8;
}

/// A SYNC consumer
///
/// Bind it to the SYNC COB-ID with [`SyncState::bind`], or feed it messages with
/// [`SyncState::handle_sync`], and pass the result of [`SyncState::take_sync_flag`] to the PDO
/// process step.
#[derive(Debug)]
pub struct SyncState {
    rx_toggle: AtomicCell<bool>,
    counter: AtomicCell<u8>,
    counter_overflow: AtomicCell<u8>,
    sync_flag: AtomicCell<bool>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SyncState {
    /// Create a new SYNC consumer with the given counter overflow value
    pub const fn new(counter_overflow: u8) -> Self {
        Self {
            rx_toggle: AtomicCell::new(false),
            counter: AtomicCell::new(0),
            counter_overflow: AtomicCell::new(counter_overflow),
            sync_flag: AtomicCell::new(false),
        }
    }

    /// Change the counter overflow value
    pub fn set_counter_overflow(&self, value: u8) {
        self.counter_overflow.store(value);
    }

    /// Bind an rx buffer of the CAN device to the SYNC COB-ID
    pub fn bind(&'static self, can: &dyn CanDevice, buffer: usize) -> Result<(), CanBindError> {
        can.bind_rx(buffer, SYNC_ID.raw() as u16, 0x7FF, self)
    }

    /// Update the state from a received SYNC message
    ///
    /// Returns false if the message is not a SYNC.
    pub fn handle_sync(&self, msg: &CanMessage) -> bool {
        let sync = match SyncObject::try_from(*msg) {
            Ok(sync) => sync,
            Err(_) => return false,
        };
        if let Some(count) = sync.count {
            self.counter.store(count);
        } else if self.counter_overflow.load() != 0 {
            warn!("SYNC received without counter");
        }
        self.rx_toggle.fetch_update(|t| Some(!t)).ok();
        self.sync_flag.store(true);
        true
    }

    /// Read and clear the flag indicating a SYNC was received since the last call
    pub fn take_sync_flag(&self) -> bool {
        self.sync_flag.take()
    }
}

impl SyncStatus for SyncState {
    fn rx_toggle(&self) -> bool {
        self.rx_toggle.load()
    }

    fn counter(&self) -> u8 {
        self.counter.load()
    }

    fn counter_overflow(&self) -> u8 {
        self.counter_overflow.load()
    }
}

impl CanRxHandler for SyncState {
    fn on_receive(&self, msg: &CanMessage) {
        self.handle_sync(msg);
    }
}

#[cfg(test)]
mod tests {
    use copdo_common::messages::CanId;

    use super::*;

    #[test]
    fn test_sync_toggle_and_counter() {
        let state = SyncState::new(10);
        assert!(!state.take_sync_flag());

        assert!(state.handle_sync(&SyncObject::new(3).into()));
        assert!(state.rx_toggle());
        assert_eq!(3, state.counter());
        assert!(state.take_sync_flag());
        assert!(!state.take_sync_flag());

        state.on_receive(&SyncObject::new(4).into());
        assert!(!state.rx_toggle());
        assert_eq!(4, state.counter());
        assert_eq!(10, state.counter_overflow());
    }

    #[test]
    fn test_non_sync_ignored() {
        let state = SyncState::default();
        let msg = CanMessage::new(CanId::std(0x181), &[1]).unwrap();
        assert!(!state.handle_sync(&msg));
        assert!(!state.rx_toggle());
        assert!(!state.take_sync_flag());
    }
}
