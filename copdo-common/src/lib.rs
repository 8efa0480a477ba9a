//! Common types shared by the copdo crates.
//!
//! Most users will have no reason to depend on this crate directly, as it is re-exported by
//! `copdo-node`.
#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs, missing_copy_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod atomic_cell;
pub use atomic_cell::AtomicCell;
pub mod constants;
pub mod messages;
pub mod node_id;
pub mod objects;
pub mod pdo;
pub mod sdo;
pub mod traits;

pub use node_id::NodeId;

pub use messages::{CanId, CanMessage, NmtState};
