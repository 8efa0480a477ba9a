//! Resolving mapping descriptors, and copying data between PDO frames and the object dictionary
use copdo_common::{pdo::MappingEntry, sdo::AbortCode, AtomicCell};
use defmt_or_log::warn;

use crate::{
    emcy::{ErrorStatus, EMC_PROTOCOL_ERROR},
    object_dict::{find_object, ODEntry},
};

use super::{HookArg, PdoLinks, MAX_PDO_LENGTH, N_MAPPING_PARAMS};

/// The mapping parameter record of a PDO
///
/// This is the storage behind the 0x1600 (RPDO) and 0x1A00 (TPDO) objects.
#[derive(Debug)]
pub struct PdoMapParams {
    /// The number of valid mapping descriptors
    pub count: AtomicCell<u8>,
    /// The mapping descriptors, packed as `index:16 | sub:8 | bit length:8`
    pub entries: [AtomicCell<u32>; N_MAPPING_PARAMS],
}

impl PdoMapParams {
    /// Create a new record
    pub const fn new(count: u8, entries: [u32; N_MAPPING_PARAMS]) -> Self {
        Self {
            count: AtomicCell::new(count),
            entries: [
                AtomicCell::new(entries[0]),
                AtomicCell::new(entries[1]),
                AtomicCell::new(entries[2]),
                AtomicCell::new(entries[3]),
                AtomicCell::new(entries[4]),
                AtomicCell::new(entries[5]),
                AtomicCell::new(entries[6]),
                AtomicCell::new(entries[7]),
            ],
        }
    }

    /// Create a record with no mapped objects
    pub const fn empty() -> Self {
        Self::new(0, [0; N_MAPPING_PARAMS])
    }
}

/// The direction of a PDO
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PdoDirection {
    /// Received PDOs write to the object dictionary
    Receive,
    /// Transmitted PDOs read from the object dictionary
    Transmit,
}

/// Where the bytes of a mapping descriptor go
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MapTarget {
    /// A data type placeholder with no storage
    ///
    /// Received bytes are discarded, and transmitted bytes are zero.
    Dummy,
    /// A sub object in the object dictionary
    Object {
        /// Object index
        index: u16,
        /// Sub index
        sub: u8,
    },
}

/// One resolved mapping descriptor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MappedEntry {
    /// The mapped sub object
    pub target: MapTarget,
    /// The number of mapped bytes
    pub len: u8,
    /// The size of the sub object in bytes
    pub size: u8,
}

impl MappedEntry {
    const EMPTY: Self = Self {
        target: MapTarget::Dummy,
        len: 0,
        size: 0,
    };
}

/// Locates one byte of a PDO frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MapPointer {
    /// Index of the mapped entry in the [`MapTable`]
    pub entry: u8,
    /// Byte offset within the little-endian image of the sub object
    pub offset: u8,
}

/// The result of resolving a single mapping descriptor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResolvedMapping {
    /// The mapped sub object
    pub target: MapTarget,
    /// The number of mapped bytes
    pub len: usize,
    /// The size of the sub object in bytes
    pub size: usize,
    /// The PDO length including this mapping
    pub new_length: usize,
    /// True if the sub object holds a value with a byte order
    pub multibyte: bool,
    /// Change-of-state bits contributed by this mapping, one per frame byte
    pub cos_mask: u8,
}

/// Resolve a mapping descriptor against the object dictionary
///
/// `length` is the number of bytes already mapped ahead of this descriptor.
///
/// The object dictionary presents every value as its little-endian byte image, which is also the
/// PDO wire order, so the bytes of a mapped entry are always copied in ascending order regardless
/// of the host byte order.
///
/// # Errors
///
/// - [`AbortCode::NoMap`] if the length is not a whole number of bytes, the sub object cannot be
///   mapped in this direction, or is shorter than the mapped length
/// - [`AbortCode::MapLengthExceeded`] if the PDO would exceed 8 bytes
/// - [`AbortCode::NoSuchObject`] if the object or sub object does not exist
pub fn resolve_mapping(
    od: &[ODEntry],
    descriptor: u32,
    direction: PdoDirection,
    length: usize,
) -> Result<ResolvedMapping, AbortCode> {
    let entry = MappingEntry::from_raw(descriptor);
    if !entry.is_byte_aligned() {
        return Err(AbortCode::NoMap);
    }
    let len = entry.byte_len();
    let new_length = length + len;
    if new_length > MAX_PDO_LENGTH {
        return Err(AbortCode::MapLengthExceeded);
    }

    if entry.is_dummy() {
        let size = MappingEntry::dummy_size(entry.index);
        if size < len {
            return Err(AbortCode::NoMap);
        }
        return Ok(ResolvedMapping {
            target: MapTarget::Dummy,
            len,
            size,
            new_length,
            multibyte: false,
            cos_mask: 0,
        });
    }

    let object = find_object(od, entry.index).ok_or(AbortCode::NoSuchObject)?;
    let info = object
        .sub_info(entry.sub)
        .map_err(|_| AbortCode::NoSuchObject)?;

    let allowed = match direction {
        PdoDirection::Receive => {
            info.access_type.is_writable() && info.pdo_mapping.supports_rpdo()
        }
        PdoDirection::Transmit => {
            info.access_type.is_readable() && info.pdo_mapping.supports_tpdo()
        }
    };
    if !allowed || info.size < len {
        return Err(AbortCode::NoMap);
    }

    let mut cos_mask = 0;
    if direction == PdoDirection::Transmit && info.tpdo_detect_cos {
        for i in length..new_length {
            cos_mask |= 1 << i;
        }
    }

    Ok(ResolvedMapping {
        target: MapTarget::Object {
            index: entry.index,
            sub: entry.sub,
        },
        len,
        size: info.size,
        new_length,
        multibyte: info.is_multibyte(),
        cos_mask,
    })
}

/// A descriptor which failed to resolve
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct MapError {
    pub code: AbortCode,
    pub descriptor: u32,
}

/// The applied mapping of a PDO
///
/// Holds the resolved descriptors, and a pointer for each byte of the frame giving the entry and
/// byte offset it is copied to or from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapTable {
    entries: [MappedEntry; N_MAPPING_PARAMS],
    n_entries: u8,
    pointers: [MapPointer; MAX_PDO_LENGTH],
    data_length: u8,
    cos_mask: u8,
}

impl Default for MapTable {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl MapTable {
    /// A table with nothing mapped
    pub const EMPTY: Self = Self {
        entries: [MappedEntry::EMPTY; N_MAPPING_PARAMS],
        n_entries: 0,
        pointers: [MapPointer {
            entry: 0,
            offset: 0,
        }; MAX_PDO_LENGTH],
        data_length: 0,
        cos_mask: 0,
    };

    /// Resolve a list of descriptors
    ///
    /// Either every descriptor is applied, or an error is returned for the first one which fails.
    /// The caller limits `descriptors` to at most [`N_MAPPING_PARAMS`] items.
    pub(crate) fn build(
        od: &[ODEntry],
        direction: PdoDirection,
        descriptors: impl Iterator<Item = u32>,
    ) -> Result<Self, MapError> {
        let mut table = Self::EMPTY;
        let mut length = 0;
        for descriptor in descriptors {
            let resolved = resolve_mapping(od, descriptor, direction, length)
                .map_err(|code| MapError { code, descriptor })?;
            debug_assert!((table.n_entries as usize) < N_MAPPING_PARAMS);
            let entry = table.n_entries;
            table.entries[entry as usize] = MappedEntry {
                target: resolved.target,
                len: resolved.len as u8,
                size: resolved.size.min(u8::MAX as usize) as u8,
            };
            table.n_entries += 1;
            for (offset, pos) in (length..resolved.new_length).enumerate() {
                table.pointers[pos] = MapPointer {
                    entry,
                    offset: offset as u8,
                };
            }
            table.cos_mask |= resolved.cos_mask;
            length = resolved.new_length;
        }
        table.data_length = length as u8;
        Ok(table)
    }

    /// The number of mapped bytes
    pub fn data_length(&self) -> usize {
        self.data_length as usize
    }

    /// The change-of-state mask, with one bit per frame byte
    pub fn cos_mask(&self) -> u8 {
        self.cos_mask
    }

    /// The resolved descriptors, in mapping order
    pub fn entries(&self) -> &[MappedEntry] {
        &self.entries[..self.n_entries as usize]
    }

    /// The per-byte pointers for the mapped bytes
    pub fn pointers(&self) -> &[MapPointer] {
        &self.pointers[..self.data_length as usize]
    }

    /// Copy frame bytes into the mapped sub objects
    ///
    /// A sub object which is only partially mapped keeps its unmapped bytes. Write errors are
    /// ignored, as there is nobody to report them to.
    pub(crate) fn write_to_od(&self, od: &[ODEntry], data: &[u8; MAX_PDO_LENGTH]) {
        let mut images = [[0u8; MAX_PDO_LENGTH]; N_MAPPING_PARAMS];
        for (i, entry) in self.entries().iter().enumerate() {
            if let MapTarget::Object { index, sub } = entry.target {
                if entry.len < entry.size && entry.size as usize <= MAX_PDO_LENGTH {
                    if let Some(object) = find_object(od, index) {
                        object
                            .read(sub, 0, &mut images[i][..entry.size as usize])
                            .ok();
                    }
                }
            }
        }

        for (pos, ptr) in self.pointers().iter().enumerate() {
            images[ptr.entry as usize][ptr.offset as usize] = data[pos];
        }

        for (i, entry) in self.entries().iter().enumerate() {
            let MapTarget::Object { index, sub } = entry.target else {
                continue;
            };
            if entry.len == 0 {
                continue;
            }
            let write_len = if entry.len < entry.size && entry.size as usize <= MAX_PDO_LENGTH {
                entry.size
            } else {
                entry.len
            };
            if let Some(object) = find_object(od, index) {
                object.write(sub, &images[i][..write_len as usize]).ok();
            }
        }
    }

    /// Gather the mapped bytes from the object dictionary into a frame payload
    ///
    /// Unmapped and dummy bytes are zero.
    pub(crate) fn read_from_od(&self, od: &[ODEntry]) -> [u8; MAX_PDO_LENGTH] {
        let mut images = [[0u8; MAX_PDO_LENGTH]; N_MAPPING_PARAMS];
        for (i, entry) in self.entries().iter().enumerate() {
            if let MapTarget::Object { index, sub } = entry.target {
                if let Some(object) = find_object(od, index) {
                    object
                        .read(sub, 0, &mut images[i][..entry.len as usize])
                        .ok();
                }
            }
        }

        let mut data = [0u8; MAX_PDO_LENGTH];
        for (pos, ptr) in self.pointers().iter().enumerate() {
            data[pos] = images[ptr.entry as usize][ptr.offset as usize];
        }
        data
    }

    /// Call `f` for each mapped sub object
    pub(crate) fn for_each_object(&self, od: &[ODEntry], mut f: impl FnMut(&HookArg)) {
        for entry in self.entries() {
            let MapTarget::Object { index, sub } = entry.target else {
                continue;
            };
            let Some(object) = find_object(od, index) else {
                continue;
            };
            let Ok(info) = object.sub_info(sub) else {
                continue;
            };
            f(&HookArg {
                index,
                sub,
                object,
                len: entry.len as usize,
                info,
            });
        }
    }
}

/// Apply the mapping parameters of a PDO
///
/// On failure the error is reported and logged, and the abort code is returned. The caller must
/// then clear the mapping.
pub(crate) fn configure_map(
    links: &PdoLinks,
    direction: PdoDirection,
    count: u8,
) -> Result<MapTable, AbortCode> {
    let result = if count as usize > N_MAPPING_PARAMS {
        Err(MapError {
            code: AbortCode::MapLengthExceeded,
            descriptor: 0,
        })
    } else {
        let descriptors = links
            .map
            .entries
            .iter()
            .take(count as usize)
            .map(|e| e.load());
        MapTable::build(links.od, direction, descriptors)
    };

    result.map_err(|e| {
        warn!(
            "Invalid {:?} mapping 0x{:x}: {:?}",
            direction, e.descriptor, e.code
        );
        links
            .errors
            .report(ErrorStatus::PdoWrongMapping, EMC_PROTOCOL_ERROR, e.descriptor);
        e.code
    })
}
