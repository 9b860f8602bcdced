use std::ops::{BitOr, BitOrAssign};
use std::sync::{Arc, Mutex, PoisonError};

use btuuid::BluetoothUuid;

use crate::descriptor::Descriptor;
use crate::error::{Error, ErrorKind, Result};

/// The GATT characteristic properties bit field (Core Specification Vol 3, Part G §3.3.1.1).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicProperties(pub u8);

impl CharacteristicProperties {
    pub const BROADCAST: Self = Self(0x01);
    pub const READ: Self = Self(0x02);
    pub const WRITE_WITHOUT_RESPONSE: Self = Self(0x04);
    pub const WRITE: Self = Self(0x08);
    pub const NOTIFY: Self = Self(0x10);
    pub const INDICATE: Self = Self(0x20);
    pub const AUTHENTICATED_SIGNED_WRITES: Self = Self(0x40);
    pub const EXTENDED_PROPERTIES: Self = Self(0x80);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CharacteristicProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CharacteristicProperties {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A GATT characteristic and its descriptors.
///
/// Clones share the same value, so a write made through a connection is visible to every holder
/// of the characteristic.
#[derive(Debug, Clone)]
pub struct Characteristic {
    uuid: BluetoothUuid,
    properties: CharacteristicProperties,
    value: Arc<Mutex<Vec<u8>>>,
    descriptors: Vec<Descriptor>,
}

impl Characteristic {
    pub fn new(uuid: BluetoothUuid, properties: CharacteristicProperties) -> Self {
        Self {
            uuid,
            properties,
            value: Default::default(),
            descriptors: Vec::new(),
        }
    }

    /// Sets the initial value of the characteristic.
    pub fn with_value(self, value: Vec<u8>) -> Self {
        self.set_value(value);
        self
    }

    pub fn with_descriptor(mut self, descriptor: Descriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn uuid(&self) -> &BluetoothUuid {
        &self.uuid
    }

    pub fn properties(&self) -> CharacteristicProperties {
        self.properties
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

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Looks up a descriptor of this characteristic by UUID.
    pub fn descriptor(&self, uuid: &BluetoothUuid) -> Result<&Descriptor> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.uuid() == uuid)
            .ok_or_else(|| Error::with_uuid(ErrorKind::DescriptorNotFound, uuid.clone()))
    }
}
