//! CAN message types
use snafu::Snafu;

/// A CAN identifier, either 11-bit standard or 29-bit extended
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CanId {
    /// A 29-bit extended ID
    Extended(u32),
    /// An 11-bit standard ID
    Std(u16),
}

impl CanId {
    /// Create a new extended ID
    pub const fn extended(id: u32) -> CanId {
        CanId::Extended(id)
    }

    /// Create a new standard ID
    pub const fn std(id: u16) -> CanId {
        CanId::Std(id)
    }

    /// Get the raw ID as a u32
    pub fn raw(&self) -> u32 {
        match self {
            CanId::Extended(id) => *id,
            CanId::Std(id) => *id as u32,
        }
    }

    /// Returns true if this is an extended ID
    pub fn is_extended(&self) -> bool {
        match self {
            CanId::Extended(_) => true,
            CanId::Std(_) => false,
        }
    }
}

/// The maximum payload of a classic CAN frame
pub const MAX_DATA_LENGTH: usize = 8;

/// A classic CAN frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanMessage {
    /// The payload, of which the first `dlc` bytes are valid
    pub data: [u8; MAX_DATA_LENGTH],
    /// The number of valid bytes in `data`
    pub dlc: u8,
    /// The message ID
    pub id: CanId,
}

impl Default for CanMessage {
    fn default() -> Self {
        Self {
            data: [0; MAX_DATA_LENGTH],
            dlc: 0,
            id: CanId::Std(0),
        }
    }
}

impl CanMessage {
    /// Create a new message from a payload slice
    ///
    /// Returns [`MessageError::DataTooLong`] if the payload does not fit in a classic frame.
    pub fn new(id: CanId, data: &[u8]) -> Result<Self, MessageError> {
        if data.len() > MAX_DATA_LENGTH {
            return DataTooLongSnafu { len: data.len() }.fail();
        }
        let mut buf = [0u8; MAX_DATA_LENGTH];
        buf[0..data.len()].copy_from_slice(data);

        Ok(Self {
            id,
            dlc: data.len() as u8,
            data: buf,
        })
    }

    /// Get the message ID
    pub fn id(&self) -> CanId {
        self.id
    }

    /// Get the valid portion of the payload
    pub fn data(&self) -> &[u8] {
        let len = (self.dlc as usize).min(MAX_DATA_LENGTH);
        &self.data[0..len]
    }
}

/// The COB-ID of the SYNC object
pub const SYNC_ID: CanId = CanId::Std(0x80);

/// The NMT operating states
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum NmtState {
    /// Initializing, before the boot-up message is sent
    Bootup = 0,
    /// Stopped; no PDO traffic
    Stopped = 4,
    /// Operational; PDOs are exchanged
    Operational = 5,
    /// Pre-operational; configuration allowed, no PDO traffic
    PreOperational = 127,
}

impl TryFrom<u8> for NmtState {
    type Error = MessageError;

    /// Attempt to convert a u8 to an NmtState enum
    ///
    /// Fails with [`MessageError::InvalidNmtState`] if value is not a valid state
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use NmtState::*;
        match value {
            x if x == Bootup as u8 => Ok(Bootup),
            x if x == Stopped as u8 => Ok(Stopped),
            x if x == Operational as u8 => Ok(Operational),
            x if x == PreOperational as u8 => Ok(PreOperational),
            _ => InvalidNmtStateSnafu { value }.fail(),
        }
    }
}

/// Represents a SYNC object/message
///
/// A single CAN node can serve as the SYNC producer, sending a periodic sync object to all other
/// nodes. When the producer is configured with a counter overflow value, each SYNC carries a one
/// byte counter which starts at 1 and wraps back to 1 after the overflow value. Without it the
/// SYNC frame is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SyncObject {
    /// The SYNC counter, if the frame carried one
    pub count: Option<u8>,
}

impl SyncObject {
    /// Create a SYNC object with a counter value
    pub fn new(count: u8) -> Self {
        Self { count: Some(count) }
    }
}

impl From<SyncObject> for CanMessage {
    fn from(value: SyncObject) -> Self {
        let mut msg = CanMessage {
            id: SYNC_ID,
            ..Default::default()
        };
        if let Some(count) = value.count {
            msg.data[0] = count;
            msg.dlc = 1;
        }
        msg
    }
}

impl TryFrom<CanMessage> for SyncObject {
    type Error = MessageError;

    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        if msg.id() != SYNC_ID {
            return UnexpectedIdSnafu {
                cob_id: msg.id(),
                expected: SYNC_ID,
            }
            .fail();
        }
        Ok(Self {
            count: msg.data().first().copied(),
        })
    }
}

/// Errors from building or interpreting CAN messages
#[derive(Debug, Clone, Copy, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MessageError {
    /// The payload does not fit in a classic CAN frame
    #[snafu(display("Payload of {len} bytes exceeds CAN frame size"))]
    DataTooLong {
        /// The rejected payload length
        len: usize,
    },
    /// The message ID was not the expected value
    #[snafu(display("Unexpected message ID found: {cob_id:?}, expected: {expected:?}"))]
    UnexpectedId {
        /// The received ID
        cob_id: CanId,
        /// The expected ID
        expected: CanId,
    },
    /// The NMT state integer is not a valid NMT state
    #[snafu(display("Invalid NMT state: {value}"))]
    InvalidNmtState {
        /// The rejected value
        value: u8,
    },
}
