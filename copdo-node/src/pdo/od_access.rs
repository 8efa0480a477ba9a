//! Object dictionary objects for the PDO communication and mapping parameters
//!
//! These are placed in the object dictionary at 0x1400+ (RPDO communication), 0x1600+ (RPDO
//! mapping), 0x1800+ (TPDO communication) and 0x1A00+ (TPDO mapping). Reads report the state of
//! the PDO, and writes are validated and applied to the PDO immediately.
use copdo_common::{
    objects::{ObjectCode, SubInfo},
    pdo::RestrictionFlags,
    sdo::AbortCode,
};

use crate::object_dict::ObjectAccess;

use super::{comm::check_restrictions, PdoLinks, Rpdo, Tpdo, N_MAPPING_PARAMS};

fn read_bytes(bytes: &[u8], offset: usize, buf: &mut [u8]) -> usize {
    if offset < bytes.len() {
        let read_len = buf.len().min(bytes.len() - offset);
        buf[..read_len].copy_from_slice(&bytes[offset..offset + read_len]);
        read_len
    } else {
        0
    }
}

fn check_len(data: &[u8], size: usize) -> Result<(), AbortCode> {
    if data.len() < size {
        Err(AbortCode::DataTypeMismatchLengthLow)
    } else if data.len() > size {
        Err(AbortCode::DataTypeMismatchLengthHigh)
    } else {
        Ok(())
    }
}

fn to_u32(data: &[u8]) -> Result<u32, AbortCode> {
    check_len(data, 4)?;
    Ok(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
}

fn to_u16(data: &[u8]) -> Result<u16, AbortCode> {
    check_len(data, 2)?;
    Ok(u16::from_le_bytes([data[0], data[1]]))
}

fn to_u8(data: &[u8]) -> Result<u8, AbortCode> {
    check_len(data, 1)?;
    Ok(data[0])
}

fn check_comm_write(restrictions: RestrictionFlags, links: &PdoLinks) -> Result<(), AbortCode> {
    check_restrictions(
        restrictions,
        RestrictionFlags::COMM_READ_ONLY,
        RestrictionFlags::COMM_NOT_WHILE_OPERATIONAL,
        links.nmt.load(),
    )
}

fn check_map_write(restrictions: RestrictionFlags, links: &PdoLinks) -> Result<(), AbortCode> {
    check_restrictions(
        restrictions,
        RestrictionFlags::MAP_READ_ONLY,
        RestrictionFlags::MAP_NOT_WHILE_OPERATIONAL,
        links.nmt.load(),
    )
}

const COMM_COB_ID_INFO: SubInfo = SubInfo::new_u32().rw_access();
const COMM_TRANSMISSION_TYPE_INFO: SubInfo = SubInfo::new_u8().rw_access();
const MAP_COUNT_INFO: SubInfo = SubInfo::new_u8().rw_access();
const MAP_ENTRY_INFO: SubInfo = SubInfo::new_u32().rw_access();

fn map_sub_info(sub: u8) -> Result<SubInfo, AbortCode> {
    match sub {
        0 => Ok(MAP_COUNT_INFO),
        s if (s as usize) <= N_MAPPING_PARAMS => Ok(MAP_ENTRY_INFO),
        _ => Err(AbortCode::NoSuchSubIndex),
    }
}

/// The RPDO communication parameter object (0x1400+)
#[allow(missing_debug_implementations)]
pub struct RpdoCommObject {
    pdo: &'static Rpdo,
}

impl RpdoCommObject {
    /// Create the object for an RPDO
    pub const fn new(pdo: &'static Rpdo) -> Self {
        Self { pdo }
    }
}

impl ObjectAccess for RpdoCommObject {
    fn read(&self, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        let links = self.pdo.links()?;
        match sub {
            0 => Ok(read_bytes(&[2], offset, buf)),
            1 => Ok(read_bytes(&self.pdo.read_cob_id()?.to_le_bytes(), offset, buf)),
            2 => Ok(read_bytes(
                &[links.comm.transmission_type.load()],
                offset,
                buf,
            )),
            _ => Err(AbortCode::NoSuchSubIndex),
        }
    }

    fn read_size(&self, sub: u8) -> Result<usize, AbortCode> {
        Ok(self.sub_info(sub)?.size)
    }

    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        let links = self.pdo.links()?;
        match sub {
            0 => Err(AbortCode::ReadOnly),
            1 => {
                let value = to_u32(data)?;
                check_comm_write(self.pdo.restrictions(), &links)?;
                self.pdo.write_cob_id(value)
            }
            2 => {
                let value = to_u8(data)?;
                check_comm_write(self.pdo.restrictions(), &links)?;
                self.pdo.write_transmission_type(value)
            }
            _ => Err(AbortCode::NoSuchSubIndex),
        }
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Record
    }

    fn sub_info(&self, sub: u8) -> Result<SubInfo, AbortCode> {
        match sub {
            0 => Ok(SubInfo::MAX_SUB_NUMBER),
            1 => Ok(COMM_COB_ID_INFO),
            2 => Ok(COMM_TRANSMISSION_TYPE_INFO),
            _ => Err(AbortCode::NoSuchSubIndex),
        }
    }
}

/// The RPDO mapping parameter object (0x1600+)
#[allow(missing_debug_implementations)]
pub struct RpdoMapObject {
    pdo: &'static Rpdo,
}

impl RpdoMapObject {
    /// Create the object for an RPDO
    pub const fn new(pdo: &'static Rpdo) -> Self {
        Self { pdo }
    }
}

impl ObjectAccess for RpdoMapObject {
    fn read(&self, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        let links = self.pdo.links()?;
        map_sub_info(sub)?;
        if sub == 0 {
            Ok(read_bytes(&[self.pdo.read_map_count()?], offset, buf))
        } else {
            let value = links.map.entries[sub as usize - 1].load();
            Ok(read_bytes(&value.to_le_bytes(), offset, buf))
        }
    }

    fn read_size(&self, sub: u8) -> Result<usize, AbortCode> {
        Ok(map_sub_info(sub)?.size)
    }

    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        let links = self.pdo.links()?;
        map_sub_info(sub)?;
        if sub == 0 {
            let value = to_u8(data)?;
            check_map_write(self.pdo.restrictions(), &links)?;
            self.pdo.write_map_count(value)
        } else {
            let value = to_u32(data)?;
            check_map_write(self.pdo.restrictions(), &links)?;
            self.pdo.write_map_entry(sub, value)
        }
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Record
    }

    fn sub_info(&self, sub: u8) -> Result<SubInfo, AbortCode> {
        map_sub_info(sub)
    }
}

/// The TPDO communication parameter object (0x1800+)
#[allow(missing_debug_implementations)]
pub struct TpdoCommObject {
    pdo: &'static Tpdo,
}

impl TpdoCommObject {
    /// Create the object for a TPDO
    pub const fn new(pdo: &'static Tpdo) -> Self {
        Self { pdo }
    }
}

impl ObjectAccess for TpdoCommObject {
    fn read(&self, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        let links = self.pdo.links()?;
        match sub {
            0 => Ok(read_bytes(&[6], offset, buf)),
            1 => Ok(read_bytes(&self.pdo.read_cob_id()?.to_le_bytes(), offset, buf)),
            2 => Ok(read_bytes(
                &[links.comm.transmission_type.load()],
                offset,
                buf,
            )),
            3 => Ok(read_bytes(
                &links.comm.inhibit_time.load().to_le_bytes(),
                offset,
                buf,
            )),
            5 => Ok(read_bytes(
                &links.comm.event_timer.load().to_le_bytes(),
                offset,
                buf,
            )),
            6 => Ok(read_bytes(&[links.comm.sync_start.load()], offset, buf)),
            _ => Err(AbortCode::NoSuchSubIndex),
        }
    }

    fn read_size(&self, sub: u8) -> Result<usize, AbortCode> {
        Ok(self.sub_info(sub)?.size)
    }

    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        let links = self.pdo.links()?;
        // Sub 4 is reserved, and does not exist for reads or writes
        self.sub_info(sub)?;
        if sub == 0 {
            return Err(AbortCode::ReadOnly);
        }
        let restrictions = self.pdo.restrictions();
        match sub {
            1 => {
                let value = to_u32(data)?;
                check_comm_write(restrictions, &links)?;
                self.pdo.write_cob_id(value)
            }
            2 => {
                let value = to_u8(data)?;
                check_comm_write(restrictions, &links)?;
                self.pdo.write_transmission_type(value)
            }
            3 => {
                let value = to_u16(data)?;
                check_comm_write(restrictions, &links)?;
                self.pdo.write_inhibit_time(value)
            }
            5 => {
                let value = to_u16(data)?;
                check_comm_write(restrictions, &links)?;
                self.pdo.write_event_timer(value)
            }
            _ => {
                let value = to_u8(data)?;
                check_comm_write(restrictions, &links)?;
                self.pdo.write_sync_start(value)
            }
        }
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Record
    }

    fn sub_info(&self, sub: u8) -> Result<SubInfo, AbortCode> {
        match sub {
            0 => Ok(SubInfo::MAX_SUB_NUMBER),
            1 => Ok(COMM_COB_ID_INFO),
            2 => Ok(COMM_TRANSMISSION_TYPE_INFO),
            3 => Ok(SubInfo::new_u16().rw_access()),
            5 => Ok(SubInfo::new_u16().rw_access()),
            6 => Ok(SubInfo::new_u8().rw_access()),
            _ => Err(AbortCode::NoSuchSubIndex),
        }
    }
}

/// The TPDO mapping parameter object (0x1A00+)
#[allow(missing_debug_implementations)]
pub struct TpdoMapObject {
    pdo: &'static Tpdo,
}

impl TpdoMapObject {
    /// Create the object for a TPDO
    pub const fn new(pdo: &'static Tpdo) -> Self {
        Self { pdo }
    }
}

impl ObjectAccess for TpdoMapObject {
    fn read(&self, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        let links = self.pdo.links()?;
        map_sub_info(sub)?;
        if sub == 0 {
            Ok(read_bytes(&[self.pdo.read_map_count()?], offset, buf))
        } else {
            let value = links.map.entries[sub as usize - 1].load();
            Ok(read_bytes(&value.to_le_bytes(), offset, buf))
        }
    }

    fn read_size(&self, sub: u8) -> Result<usize, AbortCode> {
        Ok(map_sub_info(sub)?.size)
    }

    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        let links = self.pdo.links()?;
        map_sub_info(sub)?;
        if sub == 0 {
            let value = to_u8(data)?;
            check_map_write(self.pdo.restrictions(), &links)?;
            self.pdo.write_map_count(value)
        } else {
            let value = to_u32(data)?;
            check_map_write(self.pdo.restrictions(), &links)?;
            self.pdo.write_map_entry(sub, value)
        }
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Record
    }

    fn sub_info(&self, sub: u8) -> Result<SubInfo, AbortCode> {
        map_sub_info(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversion() {
        assert_eq!(Ok(0x1234_5678), to_u32(&[0x78, 0x56, 0x34, 0x12]));
        assert_eq!(Err(AbortCode::DataTypeMismatchLengthLow), to_u32(&[1, 2]));
        assert_eq!(Err(AbortCode::DataTypeMismatchLengthHigh), to_u16(&[1, 2, 3]));
        assert_eq!(Ok(7), to_u8(&[7]));
    }

    #[test]
    fn test_read_bytes_offset() {
        let mut buf = [0; 4];
        assert_eq!(2, read_bytes(&[1, 2, 3, 4], 2, &mut buf));
        assert_eq!([3, 4, 0, 0], buf);
        assert_eq!(0, read_bytes(&[1], 1, &mut buf));
    }

    #[test]
    fn test_unbound_objects() {
        static RPDO: Rpdo = Rpdo::new(0x200, RestrictionFlags::NONE);
        static TPDO: Tpdo = Tpdo::new(0x180, RestrictionFlags::NONE);
        let comm = RpdoCommObject::new(&RPDO);
        let map = TpdoMapObject::new(&TPDO);
        assert_eq!(Err(AbortCode::ResourceNotAvailable), comm.read_u32(1));
        assert_eq!(
            Err(AbortCode::ResourceNotAvailable),
            map.write(0, &[0])
        );
        assert_eq!(Ok(SubInfo::new_u32().rw_access()), comm.sub_info(1));
        assert_eq!(Err(AbortCode::NoSuchSubIndex), map.sub_info(9));
        assert_eq!(ObjectCode::Record, map.object_code());
    }
}
