//! A static object dictionary with two RPDOs and three TPDOs
//!
//! | PDO   | Default COB-ID | Type | Mapping                         |
//! |-------|----------------|------|---------------------------------|
//! | RPDO0 | 0x200          | 255  | 0x2000.1 (u32)                  |
//! | RPDO1 | 0x300          | 1    | 0x2000.2 (u16), 0x2000.3 (u8)   |
//! | TPDO0 | 0x180          | 254  | 0x2000.4 (u32, COS)             |
//! | TPDO1 | 0x280          | 3    | 0x2000.5 (u8)                   |
//! | TPDO2 | 0x380          | 0    | 0x2000.2 (u16)                  |
//!
//! RPDO1 may not have its communication changed while operational, and its mapping is read-only.
use std::sync::Mutex;

use copdo_common::{
    messages::{NmtState, SyncObject},
    objects::{ObjectCode, PdoMapping, SubInfo},
    pdo::RestrictionFlags,
    AtomicCell, NodeId,
};
use copdo_node::{
    emcy::ErrorLatch,
    object_dict::{
        find_object, ByteField, ConstField, ODEntry, ObjectAccess, ProvidesSubObjects,
        ScalarField, SubObjectAccess,
    },
    pdo::{
        HookArg, MappedObjectHook, PdoCommParams, PdoConfig, PdoMapParams, Rpdo, RpdoCommObject,
        RpdoMapObject, Tpdo, TpdoCommObject, TpdoMapObject,
    },
    PdoTable, SyncState,
};

use crate::sim_can::SimCanDevice;

pub const NODE_ID: u8 = 5;

/// rx buffer bound to the SYNC COB-ID
pub const SYNC_BUFFER: usize = 0;

/// The application object at 0x2000
pub struct AppObject {
    pub rx_u32: ScalarField<u32>,
    pub both_u16: ScalarField<u16>,
    pub both_u8: ScalarField<u8>,
    pub status: ScalarField<u32>,
    pub counter: ScalarField<u8>,
    pub unmappable: ScalarField<u32>,
    pub label: ByteField<4>,
}

impl AppObject {
    const fn new() -> Self {
        Self {
            rx_u32: ScalarField::<u32>::new(0),
            both_u16: ScalarField::<u16>::new(0),
            both_u8: ScalarField::<u8>::new(0),
            status: ScalarField::<u32>::new(0),
            counter: ScalarField::<u8>::new(0),
            unmappable: ScalarField::<u32>::new(0),
            label: ByteField::new(*b"none"),
        }
    }

    fn reset(&self) {
        self.rx_u32.store(0);
        self.both_u16.store(0);
        self.both_u8.store(0);
        self.status.store(0);
        self.counter.store(0);
        self.unmappable.store(0);
        self.label.store(*b"none");
    }
}

impl ProvidesSubObjects for AppObject {
    fn get_sub_object(&self, sub: u8) -> Option<(SubInfo, &dyn SubObjectAccess)> {
        match sub {
            0 => Some((
                SubInfo::MAX_SUB_NUMBER,
                const { &ConstField::new(7u8.to_le_bytes()) },
            )),
            1 => Some((
                SubInfo::new_u32().rw_access().pdo_mapping(PdoMapping::Rpdo),
                &self.rx_u32,
            )),
            2 => Some((
                SubInfo::new_u16().rw_access().pdo_mapping(PdoMapping::Both),
                &self.both_u16,
            )),
            3 => Some((
                SubInfo::new_u8().rw_access().pdo_mapping(PdoMapping::Both),
                &self.both_u8,
            )),
            4 => Some((
                SubInfo::new_u32()
                    .ro_access()
                    .pdo_mapping(PdoMapping::Tpdo)
                    .detect_cos(),
                &self.status,
            )),
            5 => Some((
                SubInfo::new_u8().ro_access().pdo_mapping(PdoMapping::Tpdo),
                &self.counter,
            )),
            6 => Some((SubInfo::new_u32().rw_access(), &self.unmappable)),
            7 => Some((
                SubInfo::new_visibile_str(4)
                    .rw_access()
                    .pdo_mapping(PdoMapping::Both),
                &self.label,
            )),
            _ => None,
        }
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Record
    }
}

/// Records the mapped objects passed to the hook
#[derive(Default)]
pub struct RecordingHook {
    written: Mutex<Vec<(u16, u8, usize)>>,
    read: Mutex<Vec<(u16, u8, usize)>>,
}

impl RecordingHook {
    const fn new() -> Self {
        Self {
            written: Mutex::new(Vec::new()),
            read: Mutex::new(Vec::new()),
        }
    }

    pub fn take_written(&self) -> Vec<(u16, u8, usize)> {
        core::mem::take(&mut *self.written.lock().unwrap())
    }

    pub fn take_read(&self) -> Vec<(u16, u8, usize)> {
        core::mem::take(&mut *self.read.lock().unwrap())
    }
}

impl MappedObjectHook for RecordingHook {
    fn on_rpdo_written(&self, arg: &HookArg) {
        self.written
            .lock()
            .unwrap()
            .push((arg.index, arg.sub, arg.len));
    }

    fn before_tpdo_read(&self, arg: &HookArg) {
        self.read.lock().unwrap().push((arg.index, arg.sub, arg.len));
    }
}

pub static CAN: SimCanDevice = SimCanDevice::new();
pub static NMT: AtomicCell<NmtState> = AtomicCell::new(NmtState::PreOperational);
pub static SYNC: SyncState = SyncState::new(0);
pub static ERRORS: ErrorLatch = ErrorLatch::new();
pub static HOOK: RecordingHook = RecordingHook::new();

pub static APP_OBJECT: AppObject = AppObject::new();

pub static PDOS: PdoTable<2, 3> = PdoTable::new(
    [
        Rpdo::new(0x200, RestrictionFlags::NONE),
        Rpdo::new(
            0x300,
            RestrictionFlags::COMM_NOT_WHILE_OPERATIONAL.union(RestrictionFlags::MAP_READ_ONLY),
        ),
    ],
    [
        Tpdo::new(0x180, RestrictionFlags::NONE),
        Tpdo::new(0x280, RestrictionFlags::NONE),
        Tpdo::new(0x380, RestrictionFlags::NONE),
    ],
);

pub static RPDO_COMM: [PdoCommParams; 2] = [
    PdoCommParams::new(0x200, 255),
    PdoCommParams::new(0x300, 1),
];
pub static RPDO_MAP: [PdoMapParams; 2] = [PdoMapParams::empty(), PdoMapParams::empty()];
pub static TPDO_COMM: [PdoCommParams; 3] = [
    PdoCommParams::new(0x180, 254),
    PdoCommParams::new(0x280, 3),
    PdoCommParams::new(0x380, 0),
];
pub static TPDO_MAP: [PdoMapParams; 3] = [
    PdoMapParams::empty(),
    PdoMapParams::empty(),
    PdoMapParams::empty(),
];

/// TPDO0 inhibit time, in 100us units
pub const TPDO0_INHIBIT_TIME: u16 = 500;
/// TPDO0 event timer, in ms
pub const TPDO0_EVENT_TIMER: u16 = 100;

const RPDO_DEFAULTS: [(u32, u8); 2] = [(0x200, 255), (0x300, 1)];
const TPDO_DEFAULTS: [(u32, u8); 3] = [(0x180, 254), (0x280, 3), (0x380, 0)];
const RPDO_MAPPINGS: [&[u32]; 2] = [&[0x2000_0120], &[0x2000_0210, 0x2000_0308]];
const TPDO_MAPPINGS: [&[u32]; 3] = [&[0x2000_0420], &[0x2000_0508], &[0x2000_0210]];

static OBJECT1400: RpdoCommObject = RpdoCommObject::new(&PDOS.rpdos[0]);
static OBJECT1401: RpdoCommObject = RpdoCommObject::new(&PDOS.rpdos[1]);
static OBJECT1600: RpdoMapObject = RpdoMapObject::new(&PDOS.rpdos[0]);
static OBJECT1601: RpdoMapObject = RpdoMapObject::new(&PDOS.rpdos[1]);
static OBJECT1800: TpdoCommObject = TpdoCommObject::new(&PDOS.tpdos[0]);
static OBJECT1801: TpdoCommObject = TpdoCommObject::new(&PDOS.tpdos[1]);
static OBJECT1802: TpdoCommObject = TpdoCommObject::new(&PDOS.tpdos[2]);
static OBJECT1A00: TpdoMapObject = TpdoMapObject::new(&PDOS.tpdos[0]);
static OBJECT1A01: TpdoMapObject = TpdoMapObject::new(&PDOS.tpdos[1]);
static OBJECT1A02: TpdoMapObject = TpdoMapObject::new(&PDOS.tpdos[2]);

pub static OD_TABLE: [ODEntry; 11] = [
    ODEntry {
        index: 0x1400,
        data: &OBJECT1400,
    },
    ODEntry {
        index: 0x1401,
        data: &OBJECT1401,
    },
    ODEntry {
        index: 0x1600,
        data: &OBJECT1600,
    },
    ODEntry {
        index: 0x1601,
        data: &OBJECT1601,
    },
    ODEntry {
        index: 0x1800,
        data: &OBJECT1800,
    },
    ODEntry {
        index: 0x1801,
        data: &OBJECT1801,
    },
    ODEntry {
        index: 0x1802,
        data: &OBJECT1802,
    },
    ODEntry {
        index: 0x1A00,
        data: &OBJECT1A00,
    },
    ODEntry {
        index: 0x1A01,
        data: &OBJECT1A01,
    },
    ODEntry {
        index: 0x1A02,
        data: &OBJECT1A02,
    },
    ODEntry {
        index: 0x2000,
        data: &APP_OBJECT,
    },
];

/// Look up an object in the test dictionary
pub fn od(index: u16) -> &'static dyn ObjectAccess {
    find_object(&OD_TABLE, index).expect("object not in test dictionary")
}

fn reset_map(map: &PdoMapParams, entries: &[u32]) {
    for (i, slot) in map.entries.iter().enumerate() {
        slot.store(entries.get(i).copied().unwrap_or(0));
    }
    map.count.store(entries.len() as u8);
}

fn reset_params() {
    for (i, comm) in RPDO_COMM.iter().enumerate() {
        comm.cob_id.store(RPDO_DEFAULTS[i].0);
        comm.transmission_type.store(RPDO_DEFAULTS[i].1);
    }
    for (map, entries) in RPDO_MAP.iter().zip(RPDO_MAPPINGS) {
        reset_map(map, entries);
    }

    for (i, comm) in TPDO_COMM.iter().enumerate() {
        comm.cob_id.store(TPDO_DEFAULTS[i].0);
        comm.transmission_type.store(TPDO_DEFAULTS[i].1);
        comm.inhibit_time.store(0);
        comm.event_timer.store(0);
        comm.sync_start.store(0);
    }
    TPDO_COMM[0].inhibit_time.store(TPDO0_INHIBIT_TIME);
    TPDO_COMM[0].event_timer.store(TPDO0_EVENT_TIMER);
    for (map, entries) in TPDO_MAP.iter().zip(TPDO_MAPPINGS) {
        reset_map(map, entries);
    }
}

/// Restore every parameter and value to its default, and initialize all PDOs
///
/// The NMT state is left pre-operational.
pub fn init_node() {
    CAN.reset();
    NMT.store(NmtState::PreOperational);
    SYNC.set_counter_overflow(0);
    SYNC.take_sync_flag();
    ERRORS.take();
    HOOK.take_written();
    HOOK.take_read();
    APP_OBJECT.reset();
    reset_params();

    SYNC.bind(&CAN, SYNC_BUFFER).expect("failed to bind SYNC");

    let node_id = NodeId::new(NODE_ID).expect("invalid node ID");
    let base = PdoConfig::new()
        .od(&OD_TABLE)
        .nmt(&NMT)
        .sync(&SYNC)
        .errors(&ERRORS)
        .hook(&HOOK)
        .node_id(node_id);

    for (i, rpdo) in PDOS.rpdos().iter().enumerate() {
        rpdo.init(
            base.can(&CAN, SYNC_BUFFER + 1 + i)
                .comm(&RPDO_COMM[i])
                .map(&RPDO_MAP[i]),
        )
        .expect("failed to init RPDO");
    }
    for (i, tpdo) in PDOS.tpdos().iter().enumerate() {
        tpdo.init(base.can(&CAN, i).comm(&TPDO_COMM[i]).map(&TPDO_MAP[i]))
            .expect("failed to init TPDO");
    }
}

/// Deliver a SYNC with the given counter, and return the flag to pass to the process step
pub fn sync(count: u8) -> bool {
    CAN.deliver(SyncObject::new(count).into());
    SYNC.take_sync_flag()
}
