use std::sync::{Arc, Mutex, PoisonError};

use btuuid::BluetoothUuid;

/// UUID of the Client Characteristic Configuration descriptor.
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: BluetoothUuid = BluetoothUuid::from_u16(0x2902);

/// Client Characteristic Configuration value enabling notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// Client Characteristic Configuration value enabling indications.
pub const ENABLE_INDICATION_VALUE: [u8; 2] = [0x02, 0x00];

/// Client Characteristic Configuration value disabling both notifications and indications.
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

/// A GATT descriptor.
///
/// Clones share the same value.
#[derive(Debug, Clone)]
pub struct Descriptor {
    uuid: BluetoothUuid,
    value: Arc<Mutex<Vec<u8>>>,
}

impl Descriptor {
    pub fn new(uuid: BluetoothUuid) -> Self {
        Self::with_value(uuid, Vec::new())
    }

    pub fn with_value(uuid: BluetoothUuid, value: Vec<u8>) -> Self {
        Self {
            uuid,
            value: Arc::new(Mutex::new(value)),
        }
    }

    /// A Client Characteristic Configuration descriptor with notifications and indications disabled.
    pub fn client_configuration() -> Self {
        Self::with_value(
            CLIENT_CHARACTERISTIC_CONFIGURATION,
            DISABLE_NOTIFICATION_VALUE.to_vec(),
        )
    }

    pub fn uuid(&self) -> &BluetoothUuid {
        &self.uuid
    }

    pub fn value(&self) -> Vec<u8> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_value(&self, value: Vec<u8>) {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }
}
