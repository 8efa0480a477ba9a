//! Process Data Objects
//!
//! A PDO carries up to 8 bytes of object dictionary data in a single CAN frame, with no protocol
//! overhead. Which sub objects are carried, and in what order, is defined by the PDO's mapping
//! parameters; the CAN ID and timing are defined by its communication parameters. Both are
//! stored in the object dictionary, and can be changed at run-time over SDO.
//!
//! # Receive PDOs
//!
//! An [`Rpdo`] is bound to an rx buffer of the CAN device. Received frames are stored by
//! [`CanRxHandler::on_receive`](copdo_common::traits::CanRxHandler::on_receive), which may run in
//! interrupt context, and copied into the object dictionary by [`Rpdo::process`]. Synchronous
//! RPDOs (transmission types 0-240) only copy data when a SYNC has occurred, and use a second
//! buffer so that a frame arriving after the SYNC is held for the next one.
//!
//! # Transmit PDOs
//!
//! A [`Tpdo`] is sent from [`Tpdo::process`], depending on its transmission type:
//!
//! - 0: On the next SYNC after [`Tpdo::request_send`]
//! - 1-240: Every N SYNCs, optionally starting on a specific SYNC counter value
//! - 254, 255: On request, when the event timer expires, or when a mapped value marked for
//!   change-of-state detection changes. The inhibit time limits how often it may be sent.
//!
//! # Changing the mapping
//!
//! The mapping of a valid PDO cannot be changed. A configuration tool must first invalidate the
//! PDO by setting bit 31 of its COB-ID, then write the mapping count, the descriptors, and the
//! count again, and finally write the COB-ID with bit 31 cleared.

use copdo_common::{
    messages::NmtState, objects::SubInfo, traits::CanDevice, AtomicCell, NodeId,
};
use snafu::{OptionExt, Snafu};

use crate::{
    emcy::ErrorReport,
    object_dict::{ODEntry, ObjectAccess},
    sync::SyncStatus,
};

mod comm;
mod mapping;
mod od_access;
mod rpdo;
mod tpdo;

pub use comm::PdoCommParams;
pub use mapping::{
    resolve_mapping, MapPointer, MapTable, MapTarget, MappedEntry, PdoDirection, PdoMapParams,
    ResolvedMapping,
};
pub use od_access::{RpdoCommObject, RpdoMapObject, TpdoCommObject, TpdoMapObject};
pub use rpdo::Rpdo;
pub use tpdo::Tpdo;

/// The number of mapping parameters supported per PDO
///
/// Sub-byte mapping is not supported, so it's not possible to map more than 8 objects to a single
/// PDO
pub const N_MAPPING_PARAMS: usize = 8;

/// The maximum number of data bytes in a PDO
pub const MAX_PDO_LENGTH: usize = 8;

/// Error returned by PDO initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum PdoError {
    /// A required collaborator was not provided, or the node ID is not configured
    #[snafu(display("Missing or invalid PDO argument: {missing}"))]
    IllegalArgument {
        /// The name of the missing argument
        missing: &'static str,
    },
}

/// Describes a mapped sub object passed to a [`MappedObjectHook`]
#[allow(missing_debug_implementations)]
pub struct HookArg<'a> {
    /// The object index
    pub index: u16,
    /// The sub index
    pub sub: u8,
    /// The object
    pub object: &'a dyn ObjectAccess,
    /// The number of mapped bytes
    pub len: usize,
    /// The sub object info
    pub info: SubInfo,
}

/// Application callbacks for mapped objects
///
/// These allow the application to react to values written by an RPDO, or to refresh values
/// before a TPDO reads them, without the PDO knowing what the values mean.
pub trait MappedObjectHook: Sync {
    /// Called for each mapped object after an RPDO has written new data to the object dictionary
    fn on_rpdo_written(&self, _arg: &HookArg) {}

    /// Called for each mapped object before a TPDO reads it for sending
    fn before_tpdo_read(&self, _arg: &HookArg) {}
}

/// The collaborators of an initialized PDO
#[derive(Clone, Copy)]
pub(crate) struct PdoLinks {
    pub od: &'static [ODEntry<'static>],
    pub can: &'static dyn CanDevice,
    pub can_buffer: usize,
    pub nmt: &'static AtomicCell<NmtState>,
    pub sync: Option<&'static dyn SyncStatus>,
    pub errors: &'static dyn ErrorReport,
    pub comm: &'static PdoCommParams,
    pub map: &'static PdoMapParams,
    pub node_id: u8,
    pub hook: Option<&'static dyn MappedObjectHook>,
}

impl PdoLinks {
    pub fn is_operational(&self) -> bool {
        self.nmt.load() == NmtState::Operational
    }
}

/// Run-time configuration for initializing a PDO
///
/// All of the collaborators are statics owned by the application. The object dictionary, the CAN
/// device, the NMT state, the error reporter, the parameter records, and a configured node ID are
/// required. SYNC support and the mapped object hook are optional.
#[derive(Clone, Copy, Default)]
#[allow(missing_debug_implementations)]
pub struct PdoConfig {
    od: Option<&'static [ODEntry<'static>]>,
    can: Option<&'static dyn CanDevice>,
    can_buffer: usize,
    nmt: Option<&'static AtomicCell<NmtState>>,
    sync: Option<&'static dyn SyncStatus>,
    errors: Option<&'static dyn ErrorReport>,
    comm: Option<&'static PdoCommParams>,
    map: Option<&'static PdoMapParams>,
    node_id: Option<NodeId>,
    hook: Option<&'static dyn MappedObjectHook>,
}

impl PdoConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the object dictionary table
    pub fn od(mut self, od: &'static [ODEntry<'static>]) -> Self {
        self.od = Some(od);
        self
    }

    /// Set the CAN device, and the index of the buffer this PDO will use
    pub fn can(mut self, can: &'static dyn CanDevice, buffer: usize) -> Self {
        self.can = Some(can);
        self.can_buffer = buffer;
        self
    }

    /// Set the NMT state cell
    pub fn nmt(mut self, nmt: &'static AtomicCell<NmtState>) -> Self {
        self.nmt = Some(nmt);
        self
    }

    /// Enable synchronous transmission types using the given SYNC consumer
    pub fn sync(mut self, sync: &'static dyn SyncStatus) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Set the error reporter
    pub fn errors(mut self, errors: &'static dyn ErrorReport) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Set the communication parameter record
    pub fn comm(mut self, comm: &'static PdoCommParams) -> Self {
        self.comm = Some(comm);
        self
    }

    /// Set the mapping parameter record
    pub fn map(mut self, map: &'static PdoMapParams) -> Self {
        self.map = Some(map);
        self
    }

    /// Set the node ID
    pub fn node_id(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    /// Set the mapped object hook
    pub fn hook(mut self, hook: &'static dyn MappedObjectHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub(crate) fn links(&self) -> Result<PdoLinks, PdoError> {
        let node_id = match self.node_id {
            Some(NodeId::Configured(id)) => id.raw(),
            _ => return IllegalArgumentSnafu { missing: "node_id" }.fail(),
        };
        Ok(PdoLinks {
            od: self.od.context(IllegalArgumentSnafu { missing: "od" })?,
            can: self.can.context(IllegalArgumentSnafu { missing: "can" })?,
            can_buffer: self.can_buffer,
            nmt: self.nmt.context(IllegalArgumentSnafu { missing: "nmt" })?,
            sync: self.sync,
            errors: self.errors.context(IllegalArgumentSnafu { missing: "errors" })?,
            comm: self.comm.context(IllegalArgumentSnafu { missing: "comm" })?,
            map: self.map.context(IllegalArgumentSnafu { missing: "map" })?,
            node_id,
            hook: self.hook,
        })
    }
}
