//! Object Dictionary
//!
//! # Objects Overview
//!
//! The object dictionary is the main mechanism of configuration and communication for a node. PDOs
//! carry the values of dictionary sub objects, which are identified by the 16-bit index of their
//! parent object and an 8-bit sub index. Objects come in three varieties:
//!
//! - VAR: A single variable of any type (accessed at sub index 0)
//! - ARRAY: An array of sub-objects, all with the same type. Sub-index 0 is a u8 containing the
//!   size of the array. Sub indices 1-N contain the array values.
//! - RECORD: A collection of sub-objects of heterogenous types. Sub-index 0 contains the highest
//!   implemented sub index.
//!
//! The dictionary itself is a slice of [`ODEntry`], sorted by index, and is normally a static
//! owned by the application. Objects never move once they are placed in the table, so the PDO
//! engine holds only the index and sub index of each mapped value and looks the object up when
//! it copies data.
//!
//! # The ObjectAccess trait
//!
//! Any struct which implements the [`ObjectAccess`] trait can be used to represent an object in
//! the dictionary. The PDO parameter objects (e.g. [`RpdoCommObject`](crate::pdo::RpdoCommObject))
//! implement it directly, because their values are computed from the state of the PDO.
//!
//! For plain data objects, a more ergonomic way is to implement the [`ProvidesSubObjects`] trait,
//! and implement the sub objects individually by implementing the [`SubObjectAccess`] trait. Any
//! object which implements [`ProvidesSubObjects`] will also get an [`ObjectAccess`]
//! implementation.
//!
//! ## SubObject implementations
//!
//! Most sub objects can be implemented using one of the following existing types:
//!
//! - [`ScalarField<T>`]
//! - [`ByteField`]
//! - [`ConstField`]
//!
//! ## Example Object Implementation
//!
//! ```rust
//! use copdo_node::object_dict::{ConstField, ObjectAccess, ScalarField, ProvidesSubObjects, SubObjectAccess};
//! use copdo_node::common::objects::{ObjectCode, PdoMapping, SubInfo};
//!
//! struct MotorObject {
//!     setpoint: ScalarField<i16>,
//!     position: ScalarField<i32>,
//! }
//!
//! impl ProvidesSubObjects for MotorObject {
//!     fn get_sub_object(&self, sub: u8) -> Option<(SubInfo, &dyn SubObjectAccess)> {
//!         match sub {
//!             0 => Some((
//!                 SubInfo::MAX_SUB_NUMBER,
//!                 const { &ConstField::new(2u8.to_le_bytes()) },
//!             )),
//!             // Written by an RPDO
//!             1 => Some((
//!                 SubInfo::new_i16().rw_access().pdo_mapping(PdoMapping::Rpdo),
//!                 &self.setpoint,
//!             )),
//!             // Sent by a TPDO whenever it changes
//!             2 => Some((
//!                 SubInfo::new_i32().ro_access().pdo_mapping(PdoMapping::Tpdo).detect_cos(),
//!                 &self.position,
//!             )),
//!             _ => None,
//!         }
//!     }
//!
//!     fn object_code(&self) -> ObjectCode {
//!         ObjectCode::Record
//!     }
//! }
//!
//! let motor = MotorObject {
//!     setpoint: ScalarField::<i16>::new(0),
//!     position: ScalarField::<i32>::new(-5),
//! };
//! assert_eq!(2, motor.read_u8(0).unwrap());
//! assert_eq!(-5, motor.read_i32(2).unwrap());
//! ```
//!
//! # Object threading support
//!
//! All objects must be `Sync` and `Send`, to allow for access from any thread. This is implemented
//! using the `critical_section` crate. A single [`ObjectAccess::read`] or [`ObjectAccess::write`]
//! call on the provided field types is atomic, so a PDO never sees a torn value for a mapped sub
//! object.

mod objects;
mod sub_objects;

// Pull up public sub module definitions. The submodules provide some code organization, but
// shouldn't clutter the public API
pub use objects::*;
pub use sub_objects::*;
