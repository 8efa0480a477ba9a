//! Transmit PDO engine
use copdo_common::{
    constants::values::{MAX_MAPPED_OBJECTS, MAX_SYNC_VALUE},
    messages::{CanId, CanMessage},
    pdo::{RestrictionFlags, TransmissionType},
    sdo::AbortCode,
    traits::CanSendError,
    AtomicCell,
};
use defmt_or_log::{debug, warn};

use super::{
    comm::{effective_id, is_reserved_transmission_type, reported_cob_id, validate_cob_id_write},
    mapping::{configure_map, resolve_mapping, MapTable, PdoDirection},
    PdoConfig, PdoError, PdoLinks, MAX_PDO_LENGTH,
};

/// SYNC counter value for a cyclic TPDO which has not seen a SYNC since it was configured
const SYNC_COUNTER_RESET: u8 = 255;
/// SYNC counter value for a cyclic TPDO waiting for the SYNC start value
const SYNC_COUNTER_WAIT_START: u8 = 254;

/// A transmit PDO
///
/// Create it as a static with [`Tpdo::new`], bind it with [`Tpdo::init`], and call
/// [`Tpdo::process`] periodically.
#[allow(missing_debug_implementations)]
pub struct Tpdo {
    default_cob_id: u16,
    restrictions: RestrictionFlags,
    links: AtomicCell<Option<PdoLinks>>,
    valid: AtomicCell<bool>,
    sync_flag: AtomicCell<bool>,
    can_id: AtomicCell<u16>,
    map: AtomicCell<MapTable>,
    /// The payload of the last transmitted frame, used for change-of-state detection
    tx_data: AtomicCell<[u8; MAX_PDO_LENGTH]>,
    send_request: AtomicCell<bool>,
    /// Remaining inhibit time, in us
    inhibit_timer: AtomicCell<u32>,
    /// Remaining time until the event timer expires, in us
    event_timer: AtomicCell<u32>,
    sync_counter: AtomicCell<u8>,
}

impl Tpdo {
    /// Create a new TPDO
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
            sync_flag: AtomicCell::new(false),
            can_id: AtomicCell::new(0),
            map: AtomicCell::new(MapTable::EMPTY),
            tx_data: AtomicCell::new([0; MAX_PDO_LENGTH]),
            send_request: AtomicCell::new(false),
            inhibit_timer: AtomicCell::new(0),
            event_timer: AtomicCell::new(0),
            sync_counter: AtomicCell::new(SYNC_COUNTER_RESET),
        }
    }

    /// Bind the PDO to its collaborators and apply its parameters
    ///
    /// The PDO is left invalid if its mapping or COB-ID are not usable, if its transmission type
    /// is reserved or requires SYNC support which was not provided, or if its SYNC start value is
    /// out of range.
    pub fn init(&'static self, config: PdoConfig) -> Result<(), PdoError> {
        let links = config.links()?;
        self.links.store(Some(links));

        let transmission_type = links.comm.transmission_type.load();
        self.inhibit_timer.store(0);
        self.event_timer
            .store(links.comm.event_timer.load() as u32 * 1000);
        self.send_request.store(transmission_type >= 254);

        self.apply_map(&links, links.map.count.load()).ok();
        self.sync_counter.store(SYNC_COUNTER_RESET);

        let unusable = if links.sync.is_some() {
            self.configure_comm(&links, transmission_type <= MAX_SYNC_VALUE);
            is_reserved_transmission_type(transmission_type)
                || links.comm.sync_start.load() > MAX_SYNC_VALUE
        } else {
            self.configure_comm(&links, false);
            transmission_type < 254
        };
        if unusable && self.valid.load() {
            warn!(
                "TPDO disabled by transmission type {} or SYNC start {}",
                transmission_type,
                links.comm.sync_start.load()
            );
            self.valid.store(false);
        }
        Ok(())
    }

    /// Returns true if the PDO is valid
    pub fn is_valid(&self) -> bool {
        self.valid.load()
    }

    /// The number of mapped bytes
    pub fn data_length(&self) -> usize {
        self.map.load().data_length()
    }

    /// The applied mapping
    pub fn map_table(&self) -> MapTable {
        self.map.load()
    }

    /// Request transmission
    ///
    /// An event-driven TPDO is sent on the next process call once its inhibit time has elapsed.
    /// A synchronous acyclic TPDO is sent on the next SYNC.
    pub fn request_send(&self) {
        self.send_request.store(true);
    }

    /// Returns true if a transmission has been requested and not yet sent
    pub fn send_requested(&self) -> bool {
        self.send_request.load()
    }

    /// Read the mapped objects and send the PDO immediately
    ///
    /// Returns the result of the CAN driver unchanged. A TPDO which has not been initialized
    /// returns an error containing an empty message.
    pub fn send(&self) -> Result<(), CanSendError> {
        match self.links.load() {
            Some(links) => self.send_with(&links),
            None => Err(CanSendError(CanMessage::default())),
        }
    }

    /// Returns true if a mapped byte marked for change-of-state detection differs from the value
    /// last sent
    pub fn is_cos(&self) -> bool {
        match self.links.load() {
            Some(links) => self.is_cos_with(&links, &self.map.load()),
            None => false,
        }
    }

    /// Run the TPDO timers and send the PDO if it is due
    ///
    /// - `sync_was`: True if a SYNC was received since the last call
    /// - `elapsed_us`: Time since the last call
    ///
    /// Returns the time in us until this PDO next needs processing, if it is waiting on a timer.
    pub fn process(&self, sync_was: bool, elapsed_us: u32) -> Result<Option<u32>, CanSendError> {
        self.inhibit_timer
            .store(self.inhibit_timer.load().saturating_sub(elapsed_us));
        self.event_timer
            .store(self.event_timer.load().saturating_sub(elapsed_us));

        let Some(links) = self.links.load() else {
            return Ok(None);
        };
        let transmission_type = links.comm.transmission_type.load();
        if !self.valid.load() || !links.is_operational() {
            // Force a send as soon as the PDO becomes usable
            self.send_request.store(transmission_type >= 254);
            return Ok(None);
        }

        match TransmissionType::try_from(transmission_type) {
            Ok(TransmissionType::EventDriven(t)) => self.process_event(&links, t),
            Ok(TransmissionType::SynchronousAcyclic) => {
                if links.sync.is_some() && sync_was && self.send_request.load() {
                    self.send_logged(&links)?;
                }
                Ok(None)
            }
            Ok(TransmissionType::SynchronousCyclic(n)) => {
                if sync_was {
                    self.process_cyclic(&links, n)?;
                }
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }

    fn process_event(
        &self,
        links: &PdoLinks,
        transmission_type: u8,
    ) -> Result<Option<u32>, CanSendError> {
        let map = self.map.load();
        if transmission_type >= 254
            && map.cos_mask() != 0
            && !self.send_request.load()
            && self.is_cos_with(links, &map)
        {
            self.send_request.store(true);
        }

        let event_period = links.comm.event_timer.load() as u32 * 1000;
        if self.inhibit_timer.load() == 0
            && (self.send_request.load() || (event_period != 0 && self.event_timer.load() == 0))
        {
            self.send_logged(links)?;
            self.inhibit_timer
                .store(links.comm.inhibit_time.load() as u32 * 100);
            self.event_timer.store(event_period);
        }

        if self.send_request.load() {
            Ok(Some(self.inhibit_timer.load()))
        } else if event_period != 0 {
            Ok(Some(self.event_timer.load()))
        } else {
            Ok(None)
        }
    }

    fn process_cyclic(&self, links: &PdoLinks, period: u8) -> Result<(), CanSendError> {
        let Some(sync) = links.sync else {
            return Ok(());
        };
        let sync_start = links.comm.sync_start.load();

        let mut counter = self.sync_counter.load();
        if counter == SYNC_COUNTER_RESET {
            counter = if sync.counter_overflow() != 0 && sync_start != 0 {
                SYNC_COUNTER_WAIT_START
            } else {
                period
            };
        }

        if counter == SYNC_COUNTER_WAIT_START {
            if sync.counter() == sync_start {
                self.sync_counter.store(period);
                self.send_logged(links)?;
            } else {
                self.sync_counter.store(counter);
            }
        } else {
            counter = counter.saturating_sub(1);
            if counter == 0 {
                self.sync_counter.store(period);
                self.send_logged(links)?;
            } else {
                self.sync_counter.store(counter);
            }
        }
        Ok(())
    }

    fn send_with(&self, links: &PdoLinks) -> Result<(), CanSendError> {
        let map = self.map.load();
        if let Some(hook) = links.hook {
            map.for_each_object(links.od, |arg| hook.before_tpdo_read(arg));
        }
        let data = map.read_from_od(links.od);
        self.tx_data.store(data);
        self.send_request.store(false);
        let msg = CanMessage {
            data,
            dlc: map.data_length() as u8,
            id: CanId::Std(self.can_id.load()),
        };
        links.can.send(links.can_buffer, msg)
    }

    fn send_logged(&self, links: &PdoLinks) -> Result<(), CanSendError> {
        self.send_with(links).inspect_err(|e| {
            warn!("Failed to send TPDO 0x{:x}: {:?}", self.can_id.load(), e);
        })
    }

    fn is_cos_with(&self, links: &PdoLinks, map: &MapTable) -> bool {
        let current = map.read_from_od(links.od);
        let last = self.tx_data.load();
        let mask = map.cos_mask();
        (0..map.data_length())
            .rev()
            .any(|i| current[i] != last[i] && mask & (1 << i) != 0)
    }

    fn apply_map(&self, links: &PdoLinks, count: u8) -> Result<(), AbortCode> {
        match configure_map(links, PdoDirection::Transmit, count) {
            Ok(table) => {
                self.map.store(table);
                Ok(())
            }
            Err(code) => {
                self.map.store(MapTable::EMPTY);
                Err(code)
            }
        }
    }

    fn configure_comm(&self, links: &PdoLinks, sync_flag: bool) {
        let was_valid = self.valid.load();
        let data_length = self.data_length();
        let id = effective_id(
            links.comm.cob_id.load(),
            data_length,
            self.default_cob_id,
            links.node_id,
        );
        self.valid.store(id.is_some());
        self.can_id.store(id.unwrap_or(0));
        self.sync_flag.store(sync_flag);

        if let Err(e) = links.can.bind_tx(
            links.can_buffer,
            id.unwrap_or(0),
            data_length as u8,
            sync_flag,
        ) {
            warn!("Failed to bind TPDO to tx buffer {}: {:?}", links.can_buffer, e);
            self.valid.store(false);
        }

        let valid = self.valid.load();
        if valid != was_valid {
            if valid {
                debug!("TPDO enabled on COB-ID 0x{:x}", self.can_id.load());
            } else {
                debug!("TPDO disabled");
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

    pub(crate) fn write_cob_id(&self, value: u32) -> Result<(), AbortCode> {
        let links = self.links()?;
        let value = validate_cob_id_write(
            value,
            links.comm.cob_id.load(),
            self.valid.load(),
            self.default_cob_id,
            links.node_id,
        )?;
        links.comm.cob_id.store(value);
        self.configure_comm(&links, self.sync_flag.load());
        self.sync_counter.store(SYNC_COUNTER_RESET);
        Ok(())
    }

    pub(crate) fn write_transmission_type(&self, value: u8) -> Result<(), AbortCode> {
        let links = self.links()?;
        if links.sync.is_some() {
            if is_reserved_transmission_type(value) {
                return Err(AbortCode::InvalidValue);
            }
            links.comm.transmission_type.store(value);
            self.configure_comm(&links, value <= MAX_SYNC_VALUE);
            self.sync_counter.store(SYNC_COUNTER_RESET);
        } else {
            if value <= 253 {
                return Err(AbortCode::InvalidValue);
            }
            links.comm.transmission_type.store(value);
        }
        Ok(())
    }

    pub(crate) fn write_inhibit_time(&self, value: u16) -> Result<(), AbortCode> {
        let links = self.links()?;
        if self.valid.load() {
            return Err(AbortCode::InvalidValue);
        }
        links.comm.inhibit_time.store(value);
        self.inhibit_timer.store(0);
        Ok(())
    }

    pub(crate) fn write_event_timer(&self, value: u16) -> Result<(), AbortCode> {
        let links = self.links()?;
        links.comm.event_timer.store(value);
        self.event_timer.store(value as u32 * 1000);
        Ok(())
    }

    pub(crate) fn write_sync_start(&self, value: u8) -> Result<(), AbortCode> {
        let links = self.links()?;
        if self.valid.load() || value > MAX_SYNC_VALUE {
            return Err(AbortCode::InvalidValue);
        }
        links.comm.sync_start.store(value);
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
        resolve_mapping(links.od, value, PdoDirection::Transmit, 0)?;
        slot.store(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use copdo_common::{
        messages::NmtState,
        objects::{ObjectCode, PdoMapping, SubInfo},
        traits::{CanBindError, CanDevice, CanRxHandler},
        NodeId,
    };

    use crate::{
        emcy::ErrorLatch,
        object_dict::{ConstField, ODEntry, ProvidesSubObjects, ScalarField, SubObjectAccess},
        pdo::{PdoCommParams, PdoMapParams},
    };

    use super::*;

    struct TestObject {
        value: ScalarField<u16>,
    }

    impl ProvidesSubObjects for TestObject {
        fn get_sub_object(&self, sub: u8) -> Option<(SubInfo, &dyn SubObjectAccess)> {
            match sub {
                0 => Some((
                    SubInfo::MAX_SUB_NUMBER,
                    const { &ConstField::new(1u8.to_le_bytes()) },
                )),
                1 => Some((
                    SubInfo::new_u16()
                        .ro_access()
                        .pdo_mapping(PdoMapping::Tpdo)
                        .detect_cos(),
                    &self.value,
                )),
                _ => None,
            }
        }

        fn object_code(&self) -> ObjectCode {
            ObjectCode::Record
        }
    }

    struct RecordingCan {
        sent: Mutex<Vec<CanMessage>>,
    }

    impl CanDevice for RecordingCan {
        fn bind_rx(
            &self,
            buffer: usize,
            _id: u16,
            _mask: u16,
            _handler: &'static dyn CanRxHandler,
        ) -> Result<(), CanBindError> {
            Err(CanBindError::NoSuchBuffer { buffer })
        }

        fn bind_tx(&self, _buffer: usize, _id: u16, _len: u8, _sync: bool) -> Result<(), CanBindError> {
            Ok(())
        }

        fn send(&self, _buffer: usize, msg: CanMessage) -> Result<(), CanSendError> {
            self.sent.lock().unwrap().push(msg);
            Ok(())
        }
    }

    static OBJECT: TestObject = TestObject {
        value: ScalarField::<u16>::new(0x1234),
    };
    static OD: [ODEntry; 1] = [ODEntry {
        index: 0x2000,
        data: &OBJECT,
    }];
    static CAN: RecordingCan = RecordingCan {
        sent: Mutex::new(Vec::new()),
    };
    static NMT: AtomicCell<NmtState> = AtomicCell::new(NmtState::Operational);
    static ERRORS: ErrorLatch = ErrorLatch::new();
    static MAP: PdoMapParams = PdoMapParams::new(1, [0x2000_0110, 0, 0, 0, 0, 0, 0, 0]);

    fn config(comm: &'static PdoCommParams) -> PdoConfig {
        PdoConfig::new()
            .od(&OD)
            .can(&CAN, 0)
            .nmt(&NMT)
            .errors(&ERRORS)
            .comm(comm)
            .map(&MAP)
            .node_id(NodeId::new(3).unwrap())
    }

    #[test]
    fn test_event_driven_with_cos() {
        static COMM: PdoCommParams = PdoCommParams::new(0x180, 254).with_inhibit_time(100);
        static TPDO: Tpdo = Tpdo::new(0x180, RestrictionFlags::NONE);
        TPDO.init(config(&COMM)).unwrap();
        assert!(TPDO.is_valid());
        assert!(TPDO.send_requested());
        assert_eq!(0b11, TPDO.map_table().cos_mask());

        // The initial send request goes out immediately, and starts the 10ms inhibit time. With no
        // event timer, there is nothing to wait for.
        assert_eq!(Ok(None), TPDO.process(false, 0));
        assert!(!TPDO.is_cos());

        OBJECT.value.store(0x1235);
        assert!(TPDO.is_cos());
        // Inhibited
        assert_eq!(Ok(Some(5_000)), TPDO.process(false, 5_000));
        assert!(TPDO.send_requested());
        assert_eq!(Ok(None), TPDO.process(false, 5_000));
        assert!(!TPDO.send_requested());

        let sent = CAN.sent.lock().unwrap().clone();
        let ours: Vec<_> = sent.iter().filter(|m| m.id == CanId::Std(0x183)).collect();
        assert_eq!(2, ours.len());
        assert_eq!(&[0x34, 0x12], ours[0].data());
        assert_eq!(&[0x35, 0x12], ours[1].data());
    }

    #[test]
    fn test_invalid_without_sync() {
        static COMM: PdoCommParams = PdoCommParams::new(0x280, 1);
        static TPDO: Tpdo = Tpdo::new(0x280, RestrictionFlags::NONE);
        TPDO.init(config(&COMM)).unwrap();
        assert!(!TPDO.is_valid());
        assert_eq!(Ok(0x8000_0283), TPDO.read_cob_id());
        assert_eq!(Ok(None), TPDO.process(true, 1000));
        assert_eq!(Err(AbortCode::InvalidValue), TPDO.write_transmission_type(0));
        assert_eq!(Ok(()), TPDO.write_transmission_type(255));
    }
}
