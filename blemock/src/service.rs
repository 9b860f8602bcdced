use btuuid::BluetoothUuid;

use crate::characteristic::Characteristic;
use crate::error::{Error, ErrorKind, Result};

/// A GATT service.
#[derive(Debug, Clone)]
pub struct Service {
    uuid: BluetoothUuid,
    is_primary: bool,
    characteristics: Vec<Characteristic>,
    included_services: Vec<Service>,
}

impl Service {
    /// Creates a primary service.
    pub fn new(uuid: BluetoothUuid) -> Self {
        Self {
            uuid,
            is_primary: true,
            characteristics: Vec::new(),
            included_services: Vec::new(),
        }
    }

    /// Creates a secondary service.
    pub fn secondary(uuid: BluetoothUuid) -> Self {
        Self {
            is_primary: false,
            ..Self::new(uuid)
        }
    }

    pub fn with_characteristic(mut self, characteristic: Characteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    pub fn with_included_service(mut self, service: Service) -> Self {
        self.included_services.push(service);
        self
    }

    pub fn uuid(&self) -> &BluetoothUuid {
        &self.uuid
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    pub fn characteristics(&self) -> &[Characteristic] {
        &self.characteristics
    }

    pub fn included_services(&self) -> &[Service] {
        &self.included_services
    }

    /// Looks up a characteristic of this service by UUID.
    pub fn characteristic(&self, uuid: &BluetoothUuid) -> Result<&Characteristic> {
        self.characteristics
            .iter()
            .find(|characteristic| characteristic.uuid() == uuid)
            .ok_or_else(|| Error::with_uuid(ErrorKind::CharacteristicNotFound, uuid.clone()))
    }
}

/// The services exposed by a peripheral, as returned by service discovery.
#[derive(Debug, Clone, Default)]
pub struct DeviceServices {
    services: Vec<Service>,
}

impl From<Vec<Service>> for DeviceServices {
    fn from(services: Vec<Service>) -> Self {
        Self::new(services)
    }
}

impl DeviceServices {
    pub fn new(services: Vec<Service>) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn service(&self, uuid: &BluetoothUuid) -> Result<&Service> {
        self.services
            .iter()
            .find(|service| service.uuid() == uuid)
            .ok_or_else(|| Error::with_uuid(ErrorKind::ServiceNotFound, uuid.clone()))
    }

    /// Finds the first characteristic with the given UUID in any service.
    pub fn characteristic(&self, uuid: &BluetoothUuid) -> Result<&Characteristic> {
        self.services
            .iter()
            .flat_map(|service| service.characteristics())
            .find(|characteristic| characteristic.uuid() == uuid)
            .ok_or_else(|| Error::with_uuid(ErrorKind::CharacteristicNotFound, uuid.clone()))
    }

    /// Finds a characteristic within a specific service.
    pub fn characteristic_in(
        &self,
        service: &BluetoothUuid,
        characteristic: &BluetoothUuid,
    ) -> Result<&Characteristic> {
        self.service(service)?.characteristic(characteristic)
    }
}
