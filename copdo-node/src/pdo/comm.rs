//! PDO communication parameters and the rules for applying them
use copdo_common::{
    messages::NmtState,
    pdo::{
        RestrictionFlags, COB_ID_FROZEN_MASK, COB_ID_INVALID, COB_ID_RESERVED_MASK,
        COB_ID_STD_MASK, COB_ID_UNUSED_MASK,
    },
    sdo::AbortCode,
    AtomicCell,
};

/// The communication parameter record of a PDO
///
/// This is the storage behind the 0x1400 (RPDO) and 0x1800 (TPDO) objects. RPDOs use only the
/// COB-ID and transmission type.
#[derive(Debug)]
pub struct PdoCommParams {
    /// The COB-ID, as it was last written
    ///
    /// If the identifier equals the default COB-ID of the PDO, the node ID is added when the PDO
    /// is configured.
    pub cob_id: AtomicCell<u32>,
    /// The transmission type
    pub transmission_type: AtomicCell<u8>,
    /// The minimum time between TPDO transmissions, in units of 100us
    pub inhibit_time: AtomicCell<u16>,
    /// The TPDO event timer period, in ms, or 0 to disable it
    pub event_timer: AtomicCell<u16>,
    /// The SYNC counter value on which a cyclic TPDO is first sent, or 0 to disable it
    pub sync_start: AtomicCell<u8>,
}

impl PdoCommParams {
    /// Create a new record
    pub const fn new(cob_id: u32, transmission_type: u8) -> Self {
        Self {
            cob_id: AtomicCell::new(cob_id),
            transmission_type: AtomicCell::new(transmission_type),
            inhibit_time: AtomicCell::new(0),
            event_timer: AtomicCell::new(0),
            sync_start: AtomicCell::new(0),
        }
    }

    /// Set the initial inhibit time (100us units)
    pub const fn with_inhibit_time(mut self, value: u16) -> Self {
        self.inhibit_time = AtomicCell::new(value);
        self
    }

    /// Set the initial event timer (ms)
    pub const fn with_event_timer(mut self, value: u16) -> Self {
        self.event_timer = AtomicCell::new(value);
        self
    }

    /// Set the initial SYNC start value
    pub const fn with_sync_start(mut self, value: u8) -> Self {
        self.sync_start = AtomicCell::new(value);
        self
    }
}

/// Decide whether a PDO is used, and compute its CAN identifier
///
/// Returns `None` when the COB-ID marks the PDO invalid, the mapping is empty, or the identifier is
/// zero. A COB-ID equal to the default gets the node ID added.
pub(crate) fn effective_id(cob_id: u32, data_length: usize, default_id: u16, node_id: u8) -> Option<u16> {
    let id = (cob_id & COB_ID_STD_MASK) as u16;
    if cob_id & COB_ID_UNUSED_MASK != 0 || data_length == 0 || id == 0 {
        return None;
    }
    if id == default_id && default_id != 0 {
        Some(id + node_id as u16)
    } else {
        Some(id)
    }
}

/// The COB-ID value reported when reading the communication object
pub(crate) fn reported_cob_id(stored: u32, valid: bool, default_id: u16, node_id: u8) -> u32 {
    let mut value = stored;
    if default_id != 0 && (value & 0xFFFF) == default_id as u32 {
        value += node_id as u32;
    }
    if !valid {
        value |= COB_ID_INVALID;
    }
    value
}

/// Validate a COB-ID write, returning the value to store
///
/// A write of "default + node ID" is stored as the bare default, so that the PDO follows a later
/// change of node ID. While the PDO is valid, bits 0-29 may not change, except to clear the
/// identifier entirely. Setting bit 31 alone is how a valid PDO is disabled.
pub(crate) fn validate_cob_id_write(
    value: u32,
    stored: u32,
    valid: bool,
    default_id: u16,
    node_id: u8,
) -> Result<u32, AbortCode> {
    if value & COB_ID_RESERVED_MASK != 0 {
        return Err(AbortCode::InvalidValue);
    }
    let mut value = value;
    if default_id != 0 && (value & 0xFFFF) == default_id as u32 + node_id as u32 {
        value = (value & 0xC000_0000) + default_id as u32;
    }
    let clears_id = value & COB_ID_STD_MASK == 0;
    if valid && !clears_id && (value ^ stored) & COB_ID_FROZEN_MASK != 0 {
        return Err(AbortCode::InvalidValue);
    }
    Ok(value)
}

/// Check the restriction flags of a PDO before a write to one of its parameter objects
pub(crate) fn check_restrictions(
    restrictions: RestrictionFlags,
    read_only: RestrictionFlags,
    not_while_operational: RestrictionFlags,
    nmt: NmtState,
) -> Result<(), AbortCode> {
    if restrictions.contains(read_only) {
        Err(AbortCode::ReadOnly)
    } else if nmt == NmtState::Operational && restrictions.contains(not_while_operational) {
        Err(AbortCode::InvalidDeviceState)
    } else {
        Ok(())
    }
}

/// Returns true for the reserved transmission types, which may never be written
pub(crate) fn is_reserved_transmission_type(value: u8) -> bool {
    (241..=253).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_id() {
        // Default COB-ID gets the node ID
        assert_eq!(Some(0x205), effective_id(0x200, 2, 0x200, 5));
        assert_eq!(Some(0x301), effective_id(0x4000_0301, 2, 0x200, 5));
        // Bit 31 set, no mapping, or id 0 all mean not used
        assert_eq!(None, effective_id(0x8000_0200, 2, 0x200, 5));
        assert_eq!(None, effective_id(0x200, 0, 0x200, 5));
        assert_eq!(None, effective_id(0, 2, 0, 5));
        // Extended frames are not supported
        assert_eq!(None, effective_id(0x2000_0200, 2, 0x200, 5));
        // A zero default never gets the node ID
        assert_eq!(Some(0x10), effective_id(0x10, 1, 0, 5));
    }

    #[test]
    fn test_reported_cob_id() {
        assert_eq!(0x205, reported_cob_id(0x200, true, 0x200, 5));
        assert_eq!(0x8000_0205, reported_cob_id(0x200, false, 0x200, 5));
        assert_eq!(0x8000_0301, reported_cob_id(0x8000_0301, false, 0x200, 5));
    }

    #[test]
    fn test_cob_id_write() {
        assert_eq!(
            Err(AbortCode::InvalidValue),
            validate_cob_id_write(0x0000_8200, 0x200, false, 0x200, 5)
        );
        // Default + node is stored as the bare default
        assert_eq!(Ok(0x200), validate_cob_id_write(0x205, 0x200, true, 0x200, 5));
        assert_eq!(
            Ok(0x4000_0200),
            validate_cob_id_write(0x4000_0205, 0x200, false, 0x200, 5)
        );
        // Changing the identifier of a valid PDO is rejected
        assert_eq!(
            Err(AbortCode::InvalidValue),
            validate_cob_id_write(0x206, 0x200, true, 0x200, 5)
        );
        // ... unless it only sets the invalid bit, or clears the identifier
        assert_eq!(
            Ok(0x8000_0000),
            validate_cob_id_write(0x8000_0000, 0x200, true, 0x200, 5)
        );
        assert_eq!(Ok(0), validate_cob_id_write(0, 0x200, true, 0x200, 5));
        assert_eq!(
            Ok(0x8000_0200),
            validate_cob_id_write(0x8000_0205, 0x200, true, 0x200, 5)
        );
        // Disabling may not change the identifier at the same time
        assert_eq!(
            Err(AbortCode::InvalidValue),
            validate_cob_id_write(0x8000_0306, 0x200, true, 0x200, 5)
        );
        // Any change is fine on an invalid PDO
        assert_eq!(Ok(0x206), validate_cob_id_write(0x206, 0x8000_0200, false, 0x200, 5));
    }

    #[test]
    fn test_restrictions() {
        let flags = RestrictionFlags::COMM_NOT_WHILE_OPERATIONAL | RestrictionFlags::MAP_READ_ONLY;
        assert_eq!(
            Err(AbortCode::InvalidDeviceState),
            check_restrictions(
                flags,
                RestrictionFlags::COMM_READ_ONLY,
                RestrictionFlags::COMM_NOT_WHILE_OPERATIONAL,
                NmtState::Operational
            )
        );
        assert_eq!(
            Ok(()),
            check_restrictions(
                flags,
                RestrictionFlags::COMM_READ_ONLY,
                RestrictionFlags::COMM_NOT_WHILE_OPERATIONAL,
                NmtState::PreOperational
            )
        );
        assert_eq!(
            Err(AbortCode::ReadOnly),
            check_restrictions(
                flags,
                RestrictionFlags::MAP_READ_ONLY,
                RestrictionFlags::MAP_NOT_WHILE_OPERATIONAL,
                NmtState::PreOperational
            )
        );
    }
}
