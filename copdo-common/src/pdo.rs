//! PDO parameter encodings
//!
//! Types for the raw values stored in the PDO communication and mapping parameter objects.

/// COB-ID bit: the PDO does not exist / is not valid
pub const COB_ID_INVALID: u32 = 1 << 31;
/// COB-ID bit: RTR is not allowed on this PDO
pub const COB_ID_NO_RTR: u32 = 1 << 30;
/// COB-ID bit: the PDO uses a 29-bit identifier
pub const COB_ID_EXTENDED: u32 = 1 << 29;
/// Mask of the 11-bit identifier in a COB-ID
pub const COB_ID_STD_MASK: u32 = 0x7FF;
/// A PDO is only used if none of these COB-ID bits are set
pub const COB_ID_UNUSED_MASK: u32 = 0xBFFF_F800;
/// COB-ID bits which are never accepted in a write (bits 11-29)
pub const COB_ID_RESERVED_MASK: u32 = 0x3FFF_F800;
/// COB-ID bits which may not change while the PDO is valid
pub const COB_ID_FROZEN_MASK: u32 = 0x3FFF_FFFF;

/// A decoded mapping descriptor
///
/// A descriptor is stored in a mapping parameter sub object as a u32 packed as
/// `index:16 | sub:8 | bit length:8`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MappingEntry {
    /// The mapped object index
    pub index: u16,
    /// The mapped sub index
    pub sub: u8,
    /// The mapped length, in bits
    pub size: u8,
}

impl MappingEntry {
    /// Decode a raw descriptor
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            index: (raw >> 16) as u16,
            sub: ((raw >> 8) & 0xFF) as u8,
            size: (raw & 0xFF) as u8,
        }
    }

    /// Encode to a raw descriptor
    pub const fn to_raw(&self) -> u32 {
        ((self.index as u32) << 16) | ((self.sub as u32) << 8) | self.size as u32
    }

    /// Returns true if the length is a whole number of bytes
    pub const fn is_byte_aligned(&self) -> bool {
        self.size % 8 == 0
    }

    /// The mapped length in bytes
    pub const fn byte_len(&self) -> usize {
        (self.size / 8) as usize
    }

    /// Returns true if this descriptor refers to a data type placeholder rather than an object
    pub const fn is_dummy(&self) -> bool {
        self.index <= 7 && self.sub == 0
    }

    /// The size in bytes of the data type placeholder at `index`
    ///
    /// Placeholders 2..=7 stand for the standard integer types, so a mapping may reserve space
    /// in the frame without any backing object.
    pub const fn dummy_size(index: u16) -> usize {
        match index {
            0 | 1 => 0,
            2 | 5 => 1,
            3 | 6 => 2,
            _ => 4,
        }
    }
}

impl From<u32> for MappingEntry {
    fn from(value: u32) -> Self {
        Self::from_raw(value)
    }
}

impl From<MappingEntry> for u32 {
    fn from(value: MappingEntry) -> Self {
        value.to_raw()
    }
}

/// Classification of a transmission type value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmissionType {
    /// Type 0: sent on the SYNC following an application request
    SynchronousAcyclic,
    /// Types 1-240: sent every N SYNC messages
    SynchronousCyclic(u8),
    /// Types 253-255: sent on request, event timer, or change of state
    EventDriven(u8),
}

impl TransmissionType {
    /// Get the raw value stored in the communication object
    pub const fn raw(&self) -> u8 {
        match self {
            TransmissionType::SynchronousAcyclic => 0,
            TransmissionType::SynchronousCyclic(n) => *n,
            TransmissionType::EventDriven(n) => *n,
        }
    }

    /// Returns true for the types which are triggered by SYNC
    pub const fn is_synchronous(&self) -> bool {
        !matches!(self, TransmissionType::EventDriven(_))
    }
}

/// Error for a reserved transmission type value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReservedTransmissionType(pub u8);

impl TryFrom<u8> for TransmissionType {
    type Error = ReservedTransmissionType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TransmissionType::SynchronousAcyclic),
            1..=240 => Ok(TransmissionType::SynchronousCyclic(value)),
            253..=255 => Ok(TransmissionType::EventDriven(value)),
            _ => Err(ReservedTransmissionType(value)),
        }
    }
}

/// Per-PDO restrictions on SDO writes to its parameter objects
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RestrictionFlags(pub u8);

impl RestrictionFlags {
    /// No restrictions
    pub const NONE: Self = Self(0);
    /// The communication object may not be written while the node is operational
    pub const COMM_NOT_WHILE_OPERATIONAL: Self = Self(0x01);
    /// The mapping object may not be written while the node is operational
    pub const MAP_NOT_WHILE_OPERATIONAL: Self = Self(0x02);
    /// The communication object is read-only
    pub const COMM_READ_ONLY: Self = Self(0x04);
    /// The mapping object is read-only
    pub const MAP_READ_ONLY: Self = Self(0x08);

    /// Combine two sets of flags
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns true if all flags in `other` are set
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for RestrictionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}
