//! Constants defining standard object indices and special values
//!
//!

/// Object indices for the PDO parameter objects
pub mod object_ids {
    /// The first RPDO communication parameter object
    pub const RPDO_COMM_BASE: u16 = 0x1400;
    /// The first RPDO mapping parameter object
    pub const RPDO_MAP_BASE: u16 = 0x1600;
    /// The first TPDO communication parameter object
    pub const TPDO_COMM_BASE: u16 = 0x1800;
    /// The first TPDO mapping parameter object
    pub const TPDO_MAP_BASE: u16 = 0x1A00;
}

/// Special values used by the PDO protocol
pub mod values {
    /// Pre-defined connection set COB-IDs for the first four RPDOs
    ///
    /// The node ID is added to these when they are used.
    pub const DEFAULT_RPDO_COB_IDS: [u16; 4] = [0x200, 0x300, 0x400, 0x500];
    /// Pre-defined connection set COB-IDs for the first four TPDOs
    ///
    /// The node ID is added to these when they are used.
    pub const DEFAULT_TPDO_COB_IDS: [u16; 4] = [0x180, 0x280, 0x380, 0x480];
    /// The maximum number of objects which can be mapped into a single PDO
    pub const MAX_MAPPED_OBJECTS: u8 = 8;
    /// The largest SYNC start value, and the largest synchronous cyclic transmission type
    pub const MAX_SYNC_VALUE: u8 = 240;
}
