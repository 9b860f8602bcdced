//! Building blocks for Bluetooth Low Energy test doubles.
//!
//! This crate holds the synchronous data model shared by the mocks in `blemock-async`: the GATT
//! service/characteristic/descriptor tree a mock connection serves, advertisement payload parsing,
//! the device connection state and the error type.

pub mod advertisement_data;
mod characteristic;
mod connection_state;
mod descriptor;
pub mod error;
mod service;

pub use btuuid::BluetoothUuid;
pub use characteristic::*;
pub use connection_state::*;
pub use descriptor::*;
pub use error::{Error, Result};
pub use service::*;
