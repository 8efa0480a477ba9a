//! Test fixtures for exercising the PDO engine on a host
//!
//! [`sim_can::SimCanDevice`] stands in for a CAN driver, and [`object_dict`] provides a static
//! object dictionary with a small set of RPDOs and TPDOs bound to it.
pub mod object_dict;
pub mod sim_can;
