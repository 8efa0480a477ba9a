//! A library implementing the CANopen PDO protocol in Rust
//!
//! Copdo-node implements the Process Data Objects of a CANopen node: receive PDOs (RPDOs), which
//! copy the payload of received CAN frames into object dictionary entries, and transmit PDOs
//! (TPDOs), which gather object dictionary entries into CAN frames and send them on SYNC, on a
//! timer, on request, or on a change of state. It is primarily intended to be run on
//! microcontrollers, and so it is no_std compatible and performs no heap allocation, instead
//! statically allocating storage. It provides the following:
//!
//! * [`Rpdo`](pdo::Rpdo) and [`Tpdo`](pdo::Tpdo) engines, which are created as statics and bound
//!   to their collaborators at run-time with a [`PdoConfig`](pdo::PdoConfig).
//! * The communication and mapping parameter objects (0x1400, 0x1600, 0x1800 and 0x1A00 ranges),
//!   which validate SDO writes and reconfigure their PDO.
//! * A minimal [`SyncState`] SYNC consumer, and a [`PdoTable`] which runs the process step of all
//!   PDOs.
//!
//! # Getting Started
//!
//! ## Object dictionary
//!
//! The application provides the object dictionary as a sorted slice of
//! [`ODEntry`](object_dict::ODEntry). Objects which may be mapped into PDOs must report it in
//! their [`SubInfo`](common::objects::SubInfo). The PDO parameter objects are placed in the same
//! table, each holding a reference to its PDO.
//!
//! ```ignore
//! static RPDO0: Rpdo = Rpdo::new(0x200, RestrictionFlags::NONE);
//! static RPDO0_COMM: PdoCommParams = PdoCommParams::new(0x200, 255);
//! static RPDO0_MAP: PdoMapParams = PdoMapParams::new(1, [0x2000_0010, 0, 0, 0, 0, 0, 0, 0]);
//! static OBJECT1400: RpdoCommObject = RpdoCommObject::new(&RPDO0);
//! static OBJECT1600: RpdoMapObject = RpdoMapObject::new(&RPDO0);
//! ```
//!
//! ## Binding the PDOs
//!
//! Each PDO is initialized with references to the dictionary, the CAN device, the NMT state, and
//! its parameter records. Initialization applies the mapping and then the communication
//! parameters, exactly as a communication reset does.
//!
//! ```ignore
//! RPDO0.init(
//!     PdoConfig::new()
//!         .od(&OD_TABLE)
//!         .can(&CAN, 0)
//!         .nmt(&NMT_STATE)
//!         .errors(&ERRORS)
//!         .comm(&RPDO0_COMM)
//!         .map(&RPDO0_MAP)
//!         .node_id(node_id),
//! )?;
//! ```
//!
//! ## Processing
//!
//! The CAN driver calls [`CanRxHandler::on_receive`](common::traits::CanRxHandler::on_receive) on
//! the bound RPDO, which may happen in an interrupt. The application then calls
//! [`PdoTable::process`] periodically, which moves received data into the dictionary and sends
//! any TPDOs which are due. It returns the time until the next TPDO timer expires, so that the
//! application may sleep until then, or the first frame which the CAN device refused.
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs, missing_debug_implementations)]
#![allow(clippy::comparison_chain)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod emcy;
mod node_state;
pub mod object_dict;
pub mod pdo;
mod sync;

// Re-export types used by applications
pub use copdo_common as common;
pub use critical_section;

pub use node_state::PdoTable;
pub use sync::{SyncState, SyncStatus};
