//! An asynchronous Bluetooth Low Energy device mock.
//!
//! [`DeviceMock`] simulates a peripheral's connection lifecycle without a radio: it allows one
//! connection at a time, hands out a pre-configured [`ConnectionMock`] while connected, and reports
//! every transition through a replay-latest stream of [`ConnectionState`]s.
//!
//! See the `examples` directory for a complete usage example.

mod connection;
mod device;
mod state;
mod util;

pub use blemock::{
    BluetoothUuid, CLIENT_CHARACTERISTIC_CONFIGURATION, Characteristic, CharacteristicProperties,
    ConnectionState, DISABLE_NOTIFICATION_VALUE, Descriptor, DeviceServices,
    ENABLE_INDICATION_VALUE, ENABLE_NOTIFICATION_VALUE, Service, advertisement_data, error,
};
pub use connection::*;
pub use device::*;
pub use state::ConnectionStateChanges;
pub use util::BroadcastReceiver;
