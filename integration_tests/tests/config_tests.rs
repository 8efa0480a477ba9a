//! Test configuration of PDOs through the communication and mapping parameter objects
use assertables::assert_contains;
use copdo_common::{
    messages::{CanId, CanMessage, NmtState},
    sdo::AbortCode,
};
use copdo_node::emcy::{ErrorEvent, ErrorStatus, EMC_PROTOCOL_ERROR};
use integration_tests::object_dict::{
    init_node, od, APP_OBJECT, CAN, ERRORS, NMT, PDOS, RPDO_COMM, RPDO_MAP,
};

fn frame(id: u16, data: &[u8]) -> CanMessage {
    CanMessage::new(CanId::Std(id), data).unwrap()
}

fn write_u32(index: u16, sub: u8, value: u32) -> Result<(), AbortCode> {
    od(index).write(sub, &value.to_le_bytes())
}

#[test]
#[serial_test::serial]
fn test_parameter_reads() {
    init_node();
    let rpdo_comm = od(0x1400);
    assert_eq!(Ok(2), rpdo_comm.read_u8(0));
    assert_eq!(Ok(0x205), rpdo_comm.read_u32(1));
    assert_eq!(Ok(255), rpdo_comm.read_u8(2));
    assert_eq!(Err(AbortCode::NoSuchSubIndex), rpdo_comm.read_u8(3));

    let rpdo_map = od(0x1601);
    assert_eq!(Ok(2), rpdo_map.read_u8(0));
    assert_eq!(Ok(0x2000_0210), rpdo_map.read_u32(1));
    assert_eq!(Ok(0x2000_0308), rpdo_map.read_u32(2));
    assert_eq!(Ok(0), rpdo_map.read_u32(8));
    assert_eq!(Err(AbortCode::NoSuchSubIndex), rpdo_map.read_u32(9));

    let tpdo_comm = od(0x1800);
    assert_eq!(Ok(6), tpdo_comm.read_u8(0));
    assert_eq!(Ok(0x185), tpdo_comm.read_u32(1));
    assert_eq!(Ok(254), tpdo_comm.read_u8(2));
    assert_eq!(Ok(500), tpdo_comm.read_u16(3));
    assert_eq!(Err(AbortCode::NoSuchSubIndex), tpdo_comm.read_u8(4));
    assert_eq!(Ok(100), tpdo_comm.read_u16(5));
    assert_eq!(Ok(0), tpdo_comm.read_u8(6));

    assert_eq!(Ok(1), od(0x1A00).read_u8(0));
    assert_eq!(Ok(0x2000_0420), od(0x1A00).read_u32(1));
}

#[test]
#[serial_test::serial]
fn test_cob_id_locked_while_valid() {
    init_node();
    assert_eq!(Err(AbortCode::InvalidValue), write_u32(0x1400, 1, 0x206));
    assert_eq!(Err(AbortCode::InvalidValue), write_u32(0x1800, 1, 0x186));
    // Writing the current value back is accepted, and leaves the PDO bound as it was. Default
    // plus node ID is stored as the bare default.
    for _ in 0..2 {
        assert_eq!(Ok(()), write_u32(0x1400, 1, 0x205));
        assert!(PDOS.rpdos[0].is_valid());
        assert_eq!(Some(0x205), CAN.rx_id(1));
        assert_eq!(0x200, RPDO_COMM[0].cob_id.load());
    }
    assert_eq!(Ok(()), write_u32(0x1800, 1, 0x185));
    assert!(PDOS.tpdos[0].is_valid());
}

#[test]
#[serial_test::serial]
fn test_invalidating_write_keeps_identifier() {
    init_node();
    // Setting the invalid bit does not allow the identifier to change with it
    assert_eq!(Err(AbortCode::InvalidValue), write_u32(0x1400, 1, 0x8000_0306));
    assert!(PDOS.rpdos[0].is_valid());
    assert_eq!(Some(0x205), CAN.rx_id(1));
    assert_eq!(0x200, RPDO_COMM[0].cob_id.load());

    assert_eq!(Ok(()), write_u32(0x1400, 1, 0x8000_0205));
    assert!(!PDOS.rpdos[0].is_valid());
    assert_eq!(Ok(0x8000_0205), od(0x1400).read_u32(1));

    // Once invalid, the identifier is free to change
    assert_eq!(Ok(()), write_u32(0x1400, 1, 0x8000_0306));
    assert_eq!(Ok(0x8000_0306), od(0x1400).read_u32(1));
}

#[test]
#[serial_test::serial]
fn test_cob_id_change_while_invalid() {
    init_node();
    assert_eq!(Ok(()), write_u32(0x1400, 1, 0x8000_0205));
    assert!(!PDOS.rpdos[0].is_valid());
    assert_eq!(Ok(0x8000_0205), od(0x1400).read_u32(1));
    assert_eq!(Some(0), CAN.rx_id(1));

    assert_eq!(Ok(()), write_u32(0x1400, 1, 0x222));
    assert!(PDOS.rpdos[0].is_valid());
    assert_eq!(Ok(0x222), od(0x1400).read_u32(1));
    assert_eq!(Some(0x222), CAN.rx_id(1));

    NMT.store(NmtState::Operational);
    assert_eq!(0, CAN.deliver(frame(0x205, &[1, 2, 3, 4])));
    assert_eq!(1, CAN.deliver(frame(0x222, &[1, 2, 3, 4])));
    PDOS.rpdos[0].process(false);
    assert_eq!(0x0403_0201, APP_OBJECT.rx_u32.load());
}

#[test]
#[serial_test::serial]
fn test_invalidation_discards_pending_data() {
    init_node();
    NMT.store(NmtState::Operational);
    CAN.deliver(frame(0x205, &[1, 0, 0, 0]));

    // Disabling is always accepted, even while valid and operational
    assert_eq!(Ok(()), write_u32(0x1400, 1, 0x8000_0205));
    assert_eq!(Ok(()), write_u32(0x1400, 1, 0x205));
    PDOS.rpdos[0].process(false);
    assert_eq!(0, APP_OBJECT.rx_u32.load());
}

#[test]
#[serial_test::serial]
fn test_reserved_cob_id_bits_rejected() {
    init_node();
    write_u32(0x1400, 1, 0x8000_0205).unwrap();
    assert_eq!(Err(AbortCode::InvalidValue), write_u32(0x1400, 1, 0x8000_1205));
    assert_eq!(Err(AbortCode::InvalidValue), write_u32(0x1400, 1, 0x2000_0205));
    assert_eq!(Ok(0x8000_0205), od(0x1400).read_u32(1));
}

#[test]
#[serial_test::serial]
fn test_bind_failure_leaves_pdo_invalid() {
    init_node();
    write_u32(0x1400, 1, 0x8000_0205).unwrap();
    // RPDO1 already receives on 0x305
    assert_eq!(Ok(()), write_u32(0x1400, 1, 0x305));
    assert!(!PDOS.rpdos[0].is_valid());
    assert_eq!(Ok(0x8000_0305), od(0x1400).read_u32(1));
}

#[test]
#[serial_test::serial]
fn test_map_sequence() {
    init_node();
    let map = od(0x1600);

    // Valid PDOs may not be remapped
    assert_eq!(Err(AbortCode::UnsupportedAccess), map.write(0, &[0]));
    assert_eq!(
        Err(AbortCode::UnsupportedAccess),
        write_u32(0x1600, 1, 0x2000_0210)
    );

    write_u32(0x1400, 1, 0x8000_0205).unwrap();
    // Entries are locked until the count is cleared
    assert_eq!(
        Err(AbortCode::UnsupportedAccess),
        write_u32(0x1600, 1, 0x2000_0210)
    );
    map.write(0, &[0]).unwrap();
    assert_eq!(Ok(0), map.read_u8(0));
    assert_eq!(0, PDOS.rpdos[0].data_length());

    write_u32(0x1600, 1, 0x2000_0720).unwrap();
    write_u32(0x1600, 2, 0x2000_0308).unwrap();
    assert_eq!(Ok(0x2000_0720), map.read_u32(1));
    map.write(0, &[2]).unwrap();
    assert_eq!(Ok(2), map.read_u8(0));
    assert_eq!(5, PDOS.rpdos[0].data_length());
    // Enabled with the new length
    write_u32(0x1400, 1, 0x205).unwrap();
    assert!(PDOS.rpdos[0].is_valid());

    NMT.store(NmtState::Operational);
    CAN.deliver(frame(0x205, &[b'a', b'b', b'c', b'd', 7]));
    PDOS.rpdos[0].process(false);
    assert_eq!(*b"abcd", APP_OBJECT.label.load());
    assert_eq!(7, APP_OBJECT.both_u8.load());
}

#[test]
#[serial_test::serial]
fn test_map_entry_validation() {
    init_node();
    write_u32(0x1400, 1, 0x8000_0205).unwrap();
    write_u32(0x1800, 1, 0x8000_0185).unwrap();
    od(0x1600).write(0, &[0]).unwrap();
    od(0x1A00).write(0, &[0]).unwrap();

    // Not mappable at all
    assert_eq!(Err(AbortCode::NoMap), write_u32(0x1600, 1, 0x2000_0620));
    // Read-only objects only go in TPDOs, and RPDO-only objects only in RPDOs
    assert_eq!(Err(AbortCode::NoMap), write_u32(0x1600, 1, 0x2000_0420));
    assert_eq!(Err(AbortCode::NoMap), write_u32(0x1A00, 1, 0x2000_0120));
    assert_eq!(Ok(()), write_u32(0x1A00, 1, 0x2000_0420));
    // Not a whole number of bytes
    assert_eq!(Err(AbortCode::NoMap), write_u32(0x1600, 1, 0x2000_0104));
    // Longer than the object
    assert_eq!(Err(AbortCode::NoMap), write_u32(0x1600, 1, 0x2000_0310));
    // Longer than a frame
    assert_eq!(
        Err(AbortCode::MapLengthExceeded),
        write_u32(0x1600, 1, 0x2000_0148)
    );
    assert_eq!(Err(AbortCode::NoSuchObject), write_u32(0x1600, 1, 0x3000_0120));
    assert_eq!(Err(AbortCode::NoSuchObject), write_u32(0x1600, 1, 0x2000_0920));
    assert_eq!(Err(AbortCode::NoSuchSubIndex), write_u32(0x1600, 9, 0x2000_0120));

    // Rejected entries are not stored
    assert_eq!(Ok(0x2000_0120), od(0x1600).read_u32(1));
}

#[test]
#[serial_test::serial]
fn test_dummy_mapping() {
    init_node();
    write_u32(0x1400, 1, 0x8000_0205).unwrap();
    od(0x1600).write(0, &[0]).unwrap();

    assert_eq!(Ok(()), write_u32(0x1600, 1, 0x0002_0008));
    assert_eq!(Ok(()), write_u32(0x1600, 1, 0x0007_0020));
    // An INTEGER8 placeholder cannot cover 16 bits
    assert_eq!(Err(AbortCode::NoMap), write_u32(0x1600, 1, 0x0002_0010));

    write_u32(0x1600, 1, 0x0005_0008).unwrap();
    write_u32(0x1600, 2, 0x2000_0308).unwrap();
    od(0x1600).write(0, &[2]).unwrap();
    write_u32(0x1400, 1, 0x205).unwrap();
    assert_eq!(2, PDOS.rpdos[0].data_length());

    NMT.store(NmtState::Operational);
    CAN.deliver(frame(0x205, &[0xFF, 0x42]));
    PDOS.rpdos[0].process(false);
    assert_eq!(0x42, APP_OBJECT.both_u8.load());
}

#[test]
#[serial_test::serial]
fn test_map_too_long_reports_error() {
    init_node();
    write_u32(0x1400, 1, 0x8000_0205).unwrap();
    let map = od(0x1600);
    map.write(0, &[0]).unwrap();
    write_u32(0x1600, 1, 0x2000_0120).unwrap();
    write_u32(0x1600, 2, 0x2000_0120).unwrap();
    write_u32(0x1600, 3, 0x2000_0308).unwrap();
    assert_eq!(None, ERRORS.take());

    assert_eq!(Err(AbortCode::MapLengthExceeded), map.write(0, &[3]));
    assert_eq!(Ok(0), map.read_u8(0));
    assert_eq!(0, RPDO_MAP[0].count.load());
    assert_eq!(
        Some(ErrorEvent {
            status: ErrorStatus::PdoWrongMapping,
            code: EMC_PROTOCOL_ERROR,
            info: 0x2000_0308,
        }),
        ERRORS.take()
    );

    assert_eq!(Err(AbortCode::MapLengthExceeded), map.write(0, &[9]));
    assert_eq!(Ok(()), map.write(0, &[2]));
    assert_eq!(8, PDOS.rpdos[0].data_length());
}

#[test]
#[serial_test::serial]
fn test_transmission_type_writes() {
    init_node();
    let tpdo_comm = od(0x1800);
    assert_eq!(Err(AbortCode::InvalidValue), tpdo_comm.write(2, &[245]));
    assert_eq!(Err(AbortCode::InvalidValue), tpdo_comm.write(2, &[253]));
    assert_eq!(Ok(()), tpdo_comm.write(2, &[240]));
    assert_eq!(Ok(240), tpdo_comm.read_u8(2));
    assert_eq!(Err(AbortCode::NoSuchSubIndex), tpdo_comm.write(4, &[0]));
    assert_eq!(Err(AbortCode::ReadOnly), tpdo_comm.write(0, &[6]));

    let rpdo_comm = od(0x1400);
    assert_eq!(Err(AbortCode::InvalidValue), rpdo_comm.write(2, &[241]));
    assert!(!PDOS.rpdos[0].is_synchronous());
    assert_eq!(Ok(()), rpdo_comm.write(2, &[0]));
    assert!(PDOS.rpdos[0].is_synchronous());
    assert_eq!(Ok(()), rpdo_comm.write(2, &[254]));
    assert!(!PDOS.rpdos[0].is_synchronous());
}

#[test]
#[serial_test::serial]
fn test_write_length_mismatch() {
    init_node();
    assert_eq!(
        Err(AbortCode::DataTypeMismatchLengthHigh),
        od(0x1400).write(2, &[0, 0])
    );
    assert_eq!(
        Err(AbortCode::DataTypeMismatchLengthLow),
        od(0x1400).write(1, &[0x05, 0x02])
    );
    assert_eq!(
        Err(AbortCode::DataTypeMismatchLengthLow),
        od(0x1800).write(3, &[0])
    );
}

#[test]
#[serial_test::serial]
fn test_tpdo_timing_writes() {
    init_node();
    let comm = od(0x1800);
    assert_eq!(
        Err(AbortCode::InvalidValue),
        comm.write(3, &100u16.to_le_bytes())
    );
    // The event timer may change at any time
    assert_eq!(Ok(()), comm.write(5, &250u16.to_le_bytes()));
    assert_eq!(Ok(250), comm.read_u16(5));

    write_u32(0x1800, 1, 0x8000_0185).unwrap();
    assert_eq!(Ok(()), comm.write(3, &100u16.to_le_bytes()));
    assert_eq!(Ok(100), comm.read_u16(3));
    assert_eq!(Err(AbortCode::InvalidValue), comm.write(6, &[241]));
    assert_eq!(Ok(()), comm.write(6, &[240]));
}

#[test]
#[serial_test::serial]
fn test_restricted_pdo() {
    init_node();
    // RPDO1 has a read-only mapping
    assert_eq!(Err(AbortCode::ReadOnly), od(0x1601).write(0, &[0]));
    assert_eq!(
        Err(AbortCode::ReadOnly),
        write_u32(0x1601, 1, 0x2000_0210)
    );
    assert_eq!(Ok(2), od(0x1601).read_u8(0));

    // and communication parameters which are locked while operational
    assert_eq!(Ok(()), od(0x1401).write(2, &[2]));
    NMT.store(NmtState::Operational);
    assert_eq!(
        Err(AbortCode::InvalidDeviceState),
        od(0x1401).write(2, &[1])
    );
    assert_eq!(
        Err(AbortCode::InvalidDeviceState),
        write_u32(0x1401, 1, 0x8000_0305)
    );
    assert!(PDOS.rpdos[1].is_valid());
    assert_eq!(Ok(2), od(0x1401).read_u8(2));

    // Unrestricted PDOs are unaffected
    assert_eq!(Ok(()), od(0x1400).write(2, &[254]));
}

#[test]
#[serial_test::serial]
fn test_abort_code_reporting() {
    init_node();
    let err = write_u32(0x1400, 1, 0x206).unwrap_err();
    assert_eq!(0x0609_0030, err.raw());
    assert_contains!(format!("{err:?}"), "InvalidValue");
}
