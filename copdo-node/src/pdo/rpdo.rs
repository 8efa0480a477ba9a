//! Receive PDO engine
use core::sync::atomic::{AtomicBool, Ordering};

use copdo_common::{
    constants::values::MAX_MAPPED_OBJECTS,
    messages::CanMessage,
    pdo::{RestrictionFlags, TransmissionType},
    sdo::AbortCode,
    traits::CanRxHandler,
    AtomicCell,
};
use defmt_or_log::{debug, warn};

use super::{
    comm::{effective_id, is_reserved_transmission_type, reported_cob_id, validate_cob_id_write},
    mapping::{configure_map, resolve_mapping, MapTable, PdoDirection},
    PdoConfig, PdoError, PdoLinks, MAX_PDO_LENGTH,
};

/// A receive PDO
///
/// Create it as a static with [`Rpdo::new`], and bind it with [`Rpdo::init`]. Received frames are
/// delivered by the CAN driver through the [`CanRxHandler`] implementation, and copied into the
/// object dictionary by [`Rpdo::process`].
#[allow(missing_debug_implementations)]
pub struct Rpdo {
    default_cob_id: u16,
    restrictions: RestrictionFlags,
    links: AtomicCell<Option<PdoLinks>>,
    valid: AtomicCell<bool>,
    synchronous: AtomicCell<bool>,
    map: AtomicCell<MapTable>,
    data_length: AtomicCell<u8>,
    /// Buffer 1 is only used by synchronous RPDOs, for frames received after a SYNC
    rx_data: [AtomicCell<[u8; MAX_PDO_LENGTH]>; 2],
    rx_new: [AtomicBool; 2],
    notify_cb: AtomicCell<Option<&'static (dyn Fn() + Sync)>>,
}

impl Rpdo {
    /// Create a new RPDO
    ///
    /// - `default_cob_id`: The pre-defined COB-ID for this PDO, to which the node ID is added, or 0
    ///   if it has none
    /// - `restrictions`: Limits on SDO writes to the parameter objects
    pub const fn new(default_cob_id: u16, restrictions: RestrictionFlags) -> Self {
        Self {
            default_cob_id,
            restrictions,
            links: AtomicCell::new(None),
            valid: AtomicCell::new(false),
            synchronous: AtomicCell::new(false),
            map: AtomicCell::new(MapTable::EMPTY),
            data_length: AtomicCell::new(0),
            rx_data: [const { AtomicCell::new([0; MAX_PDO_LENGTH]) }; 2],
            rx_new: [const { AtomicBool::new(false) }; 2],
            notify_cb: AtomicCell::new(None),
        }
    }

    /// Bind the PDO to its collaborators and apply its parameters
    ///
    /// This is the communication reset: the mapping is applied first, then the communication
    /// parameters. A mapping or CAN binding failure leaves the PDO invalid, but is not an error
    /// here; it has already been reported.
    pub fn init(&'static self, config: PdoConfig) -> Result<(), PdoError> {
        let links = config.links()?;
        self.links.store(Some(links));
        self.clear_rx_flags();
        self.apply_map(&links, links.map.count.load()).ok();
        self.configure_comm(&links);
        Ok(())
    }

    /// Register a callback to be called from the receive handler when a frame has been stored
    ///
    /// This runs in the context of the CAN driver, possibly an interrupt, and is intended for
    /// waking the task which calls [`Rpdo::process`].
    pub fn set_notify_callback(&self, callback: &'static (dyn Fn() + Sync)) {
        self.notify_cb.store(Some(callback));
    }

    /// Returns true if the PDO is valid
    pub fn is_valid(&self) -> bool {
        self.valid.load()
    }

    /// Returns true if the PDO only processes received data on SYNC
    pub fn is_synchronous(&self) -> bool {
        self.synchronous.load()
    }

    /// The number of mapped bytes
    pub fn data_length(&self) -> usize {
        self.data_length.load() as usize
    }

    /// The applied mapping
    pub fn map_table(&self) -> MapTable {
        self.map.load()
    }

    /// Copy received data into the object dictionary
    ///
    /// `sync_was` must be true if a SYNC was received since the last call. Synchronous RPDOs
    /// only copy on SYNC, taking the last frame received before it.
    pub fn process(&self, sync_was: bool) {
        let Some(links) = self.links.load() else {
            return;
        };
        if !self.valid.load() || !links.is_operational() {
            self.clear_rx_flags();
            return;
        }
        let synchronous = self.synchronous.load();
        if synchronous && !sync_was {
            return;
        }

        let buf = match links.sync {
            Some(sync) if synchronous && !sync.rx_toggle() => 1,
            _ => 0,
        };

        let map = self.map.load();
        let mut updated = false;
        while self.rx_new[buf].load(Ordering::Acquire) {
            // Clear before copying, so a frame arriving during the copy is copied again
            self.rx_new[buf].store(false, Ordering::Release);
            let data = self.rx_data[buf].load();
            map.write_to_od(links.od, &data);
            updated = true;
        }

        if updated {
            if let Some(hook) = links.hook {
                map.for_each_object(links.od, |arg| hook.on_rpdo_written(arg));
            }
        }
    }

    fn clear_rx_flags(&self) {
        self.rx_new[0].store(false, Ordering::Release);
        self.rx_new[1].store(false, Ordering::Release);
    }

    fn set_map(&self, table: MapTable) {
        self.map.store(table);
        self.data_length.store(table.data_length() as u8);
    }

    fn apply_map(&self, links: &PdoLinks, count: u8) -> Result<(), AbortCode> {
        match configure_map(links, PdoDirection::Receive, count) {
            Ok(table) => {
                self.set_map(table);
                Ok(())
            }
            Err(code) => {
                self.set_map(MapTable::EMPTY);
                Err(code)
            }
        }
    }

    fn configure_comm(&'static self, links: &PdoLinks) {
        let was_valid = self.valid.load();
        let id = effective_id(
            links.comm.cob_id.load(),
            self.data_length(),
            self.default_cob_id,
            links.node_id,
        );

        match id {
            Some(_) => {
                self.valid.store(true);
                self.synchronous.store(
                    links.sync.is_some()
                        && TransmissionType::try_from(links.comm.transmission_type.load())
                            .is_ok_and(|t| t.is_synchronous()),
                );
            }
            None => {
                self.valid.store(false);
                self.clear_rx_flags();
            }
        }

        if let Err(e) = links
            .can
            .bind_rx(links.can_buffer, id.unwrap_or(0), 0x7FF, self)
        {
            warn!("Failed to bind RPDO to rx buffer {}: {:?}", links.can_buffer, e);
            self.valid.store(false);
            self.clear_rx_flags();
        }

        let valid = self.valid.load();
        if valid != was_valid {
            if valid {
                debug!("RPDO enabled on COB-ID 0x{:x}", id.unwrap_or(0));
            } else {
                debug!("RPDO disabled");
            }
        }
    }

    pub(crate) fn restrictions(&self) -> RestrictionFlags {
        self.restrictions
    }

    pub(crate) fn links(&self) -> Result<PdoLinks, AbortCode> {
        self.links.load().ok_or(AbortCode::ResourceNotAvailable)
    }

    pub(crate) fn read_cob_id(&self) -> Result<u32, AbortCode> {
        let links = self.links()?;
        Ok(reported_cob_id(
            links.comm.cob_id.load(),
            self.valid.load(),
            self.default_cob_id,
            links.node_id,
        ))
    }

    pub(crate) fn read_map_count(&self) -> Result<u8, AbortCode> {
        let links = self.links()?;
        if self.data_length() == 0 {
            Ok(0)
        } else {
            Ok(links.map.count.load())
        }
    }

    pub(crate) fn write_cob_id(&'static self, value: u32) -> Result<(), AbortCode> {
        let links = self.links()?;
        let value = validate_cob_id_write(
            value,
            links.comm.cob_id.load(),
            self.valid.load(),
            self.default_cob_id,
            links.node_id,
        )?;
        links.comm.cob_id.store(value);
        self.configure_comm(&links);
        Ok(())
    }

    pub(crate) fn write_transmission_type(&self, value: u8) -> Result<(), AbortCode> {
        let links = self.links()?;
        if links.sync.is_some() {
            if is_reserved_transmission_type(value) {
                return Err(AbortCode::InvalidValue);
            }
            let was_synchronous = self.synchronous.load();
            let synchronous = TransmissionType::try_from(value).is_ok_and(|t| t.is_synchronous());
            self.synchronous.store(synchronous);
            if synchronous != was_synchronous {
                // A frame held for the next SYNC is stale after switching modes
                self.rx_new[1].store(false, Ordering::Release);
            }
        } else if value <= 253 {
            return Err(AbortCode::InvalidValue);
        }
        links.comm.transmission_type.store(value);
        Ok(())
    }

    pub(crate) fn write_map_count(&self, value: u8) -> Result<(), AbortCode> {
        let links = self.links()?;
        if self.valid.load() {
            return Err(AbortCode::UnsupportedAccess);
        }
        if value > MAX_MAPPED_OBJECTS {
            return Err(AbortCode::MapLengthExceeded);
        }
        self.apply_map(&links, value)?;
        links.map.count.store(value);
        Ok(())
    }

    pub(crate) fn write_map_entry(&self, sub: u8, value: u32) -> Result<(), AbortCode> {
        let links = self.links()?;
        if self.valid.load() || self.data_length() != 0 {
            return Err(AbortCode::UnsupportedAccess);
        }
        let slot = links
            .map
            .entries
            .get((sub as usize).wrapping_sub(1))
            .ok_or(AbortCode::NoSuchSubIndex)?;
        resolve_mapping(links.od, value, PdoDirection::Receive, 0)?;
        slot.store(value);
        Ok(())
    }
}

impl CanRxHandler for Rpdo {
    fn on_receive(&self, msg: &CanMessage) {
        let Some(links) = self.links.load() else {
            return;
        };
        let data = msg.data();
        if !self.valid.load() || !links.is_operational() || data.len() < self.data_length() {
            return;
        }

        let buf = match links.sync {
            Some(sync) if self.synchronous.load() && sync.rx_toggle() => 1,
            _ => 0,
        };

        let mut frame = [0; MAX_PDO_LENGTH];
        frame[..data.len()].copy_from_slice(data);
        self.rx_data[buf].store(frame);
        self.rx_new[buf].store(true, Ordering::Release);

        if let Some(cb) = self.notify_cb.load() {
            cb();
        }
    }
}

#[cfg(test)]
mod tests {
    use copdo_common::{
        messages::{CanId, NmtState},
        objects::{ObjectCode, PdoMapping, SubInfo},
        traits::{CanBindError, CanDevice, CanSendError},
        NodeId,
    };

    use crate::{
        emcy::ErrorLatch,
        object_dict::{ConstField, ODEntry, ProvidesSubObjects, ScalarField, SubObjectAccess},
        pdo::{PdoCommParams, PdoMapParams},
    };

    use super::*;

    struct TestObject {
        value: ScalarField<u32>,
    }

    impl ProvidesSubObjects for TestObject {
        fn get_sub_object(&self, sub: u8) -> Option<(SubInfo, &dyn SubObjectAccess)> {
            match sub {
                0 => Some((
                    SubInfo::MAX_SUB_NUMBER,
                    const { &ConstField::new(1u8.to_le_bytes()) },
                )),
                1 => Some((
                    SubInfo::new_u32().rw_access().pdo_mapping(PdoMapping::Rpdo),
                    &self.value,
                )),
                _ => None,
            }
        }

        fn object_code(&self) -> ObjectCode {
            ObjectCode::Record
        }
    }

    struct NullCan;

    impl CanDevice for NullCan {
        fn bind_rx(
            &self,
            _buffer: usize,
            _id: u16,
            _mask: u16,
            _handler: &'static dyn CanRxHandler,
        ) -> Result<(), CanBindError> {
            Ok(())
        }

        fn bind_tx(&self, buffer: usize, _id: u16, _len: u8, _sync: bool) -> Result<(), CanBindError> {
            Err(CanBindError::NoSuchBuffer { buffer })
        }

        fn send(&self, _buffer: usize, msg: CanMessage) -> Result<(), CanSendError> {
            Err(CanSendError(msg))
        }
    }

    static OBJECT: TestObject = TestObject {
        value: ScalarField::<u32>::new(0),
    };
    static OD: [ODEntry; 1] = [ODEntry {
        index: 0x2000,
        data: &OBJECT,
    }];
    static CAN: NullCan = NullCan;
    static NMT: AtomicCell<NmtState> = AtomicCell::new(NmtState::Operational);
    static ERRORS: ErrorLatch = ErrorLatch::new();
    static COMM: PdoCommParams = PdoCommParams::new(0x200, 255);
    static MAP: PdoMapParams = PdoMapParams::new(1, [0x2000_0120, 0, 0, 0, 0, 0, 0, 0]);
    static RPDO: Rpdo = Rpdo::new(0x200, RestrictionFlags::NONE);

    #[test]
    fn test_async_receive() {
        assert_eq!(Err(AbortCode::ResourceNotAvailable), RPDO.read_cob_id());

        RPDO.init(
            PdoConfig::new()
                .od(&OD)
                .can(&CAN, 0)
                .nmt(&NMT)
                .errors(&ERRORS)
                .comm(&COMM)
                .map(&MAP)
                .node_id(NodeId::new(5).unwrap()),
        )
        .unwrap();
        assert!(RPDO.is_valid());
        assert!(!RPDO.is_synchronous());
        assert_eq!(4, RPDO.data_length());
        assert_eq!(Ok(0x205), RPDO.read_cob_id());

        // Short frames are dropped
        RPDO.on_receive(&CanMessage::new(CanId::std(0x205), &[1, 2, 3]).unwrap());
        RPDO.process(false);
        assert_eq!(0, OBJECT.value.load());

        RPDO.on_receive(&CanMessage::new(CanId::std(0x205), &[1, 2, 3, 4]).unwrap());
        RPDO.on_receive(&CanMessage::new(CanId::std(0x205), &[5, 6, 7, 8, 9]).unwrap());
        RPDO.process(false);
        assert_eq!(0x0807_0605, OBJECT.value.load());

        // Invalidating clears pending data
        RPDO.on_receive(&CanMessage::new(CanId::std(0x205), &[1, 1, 1, 1]).unwrap());
        RPDO.write_cob_id(0x8000_0205).unwrap();
        assert!(!RPDO.is_valid());
        assert_eq!(Ok(0x8000_0205), RPDO.read_cob_id());
        RPDO.write_cob_id(0x205).unwrap();
        RPDO.process(false);
        assert_eq!(0x0807_0605, OBJECT.value.load());
    }

    #[test]
    fn test_init_requires_collaborators() {
        static UNBOUND: Rpdo = Rpdo::new(0x300, RestrictionFlags::NONE);
        assert_eq!(
            Err(PdoError::IllegalArgument { missing: "od" }),
            UNBOUND.init(PdoConfig::new().node_id(NodeId::new(1).unwrap()))
        );
        assert_eq!(
            Err(PdoError::IllegalArgument {
                missing: "node_id"
            }),
            UNBOUND.init(PdoConfig::new().od(&OD))
        );
        assert!(!UNBOUND.is_valid());
    }
}
