use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use async_broadcast::InactiveReceiver;
use blemock::error::{Error, ErrorKind, Result};
use blemock::{
    CLIENT_CHARACTERISTIC_CONFIGURATION, Characteristic, Descriptor, DeviceServices,
    ENABLE_INDICATION_VALUE, ENABLE_NOTIFICATION_VALUE,
};
use btuuid::BluetoothUuid;
use tracing::debug;

use crate::util::BroadcastReceiver;

/// The ATT MTU in effect before any exchange.
pub const DEFAULT_MTU: u16 = 23;

/// Produces the value returned when a characteristic is read.
pub type CharacteristicReadCallback = Arc<dyn Fn(&Characteristic) -> Result<Vec<u8>> + Send + Sync>;
/// Accepts or rejects a value written to a characteristic.
pub type CharacteristicWriteCallback =
    Arc<dyn Fn(&Characteristic, &[u8]) -> Result<()> + Send + Sync>;
/// Produces the value returned when a descriptor is read.
pub type DescriptorReadCallback = Arc<dyn Fn(&Descriptor) -> Result<Vec<u8>> + Send + Sync>;
/// Accepts or rejects a value written to a descriptor.
pub type DescriptorWriteCallback = Arc<dyn Fn(&Descriptor, &[u8]) -> Result<()> + Send + Sync>;

type DescriptorMap<T> = HashMap<BluetoothUuid, HashMap<BluetoothUuid, T>>;

/// A simulated GATT connection.
///
/// Serves a fixed [`DeviceServices`] table. Reads and writes go through the callbacks configured
/// on the [`ConnectionMockBuilder`] where present, and otherwise through the attribute's stored
/// value. Clones refer to the same connection.
#[derive(Clone)]
pub struct ConnectionMock {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    services: DeviceServices,
    rssi: i16,
    mtu: AtomicU16,
    notification_sources: HashMap<BluetoothUuid, InactiveReceiver<Vec<u8>>>,
    characteristic_reads: HashMap<BluetoothUuid, CharacteristicReadCallback>,
    characteristic_writes: HashMap<BluetoothUuid, CharacteristicWriteCallback>,
    descriptor_reads: DescriptorMap<DescriptorReadCallback>,
    descriptor_writes: DescriptorMap<DescriptorWriteCallback>,
}

impl std::fmt::Debug for ConnectionMock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMock")
            .field("services", &self.inner.services)
            .field("rssi", &self.inner.rssi)
            .field("mtu", &self.mtu())
            .finish_non_exhaustive()
    }
}

impl PartialEq for ConnectionMock {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ConnectionMock {}

impl Default for ConnectionMock {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ConnectionMock {
    pub fn builder() -> ConnectionMockBuilder {
        ConnectionMockBuilder::default()
    }

    /// The services served by this connection.
    pub fn services(&self) -> &DeviceServices {
        &self.inner.services
    }

    /// Performs service discovery.
    pub async fn discover_services(&self) -> Result<DeviceServices> {
        Ok(self.inner.services.clone())
    }

    /// Reads the RSSI of the peripheral.
    pub async fn read_rssi(&self) -> Result<i16> {
        Ok(self.inner.rssi)
    }

    /// The ATT MTU currently in effect.
    pub fn mtu(&self) -> u16 {
        self.inner.mtu.load(Ordering::Acquire)
    }

    /// Requests a new ATT MTU. The mock always grants the request.
    pub async fn request_mtu(&self, mtu: u16) -> Result<u16> {
        self.inner.mtu.store(mtu, Ordering::Release);
        Ok(mtu)
    }

    /// Reads the value of a characteristic.
    pub async fn read_characteristic(&self, uuid: &BluetoothUuid) -> Result<Vec<u8>> {
        let characteristic = self.inner.services.characteristic(uuid)?;
        match self.inner.characteristic_reads.get(uuid) {
            Some(callback) => {
                let value = callback(characteristic)?;
                characteristic.set_value(value.clone());
                Ok(value)
            }
            None => Ok(characteristic.value()),
        }
    }

    /// Writes the value of a characteristic, returning the bytes written.
    pub async fn write_characteristic(
        &self,
        uuid: &BluetoothUuid,
        data: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let characteristic = self.inner.services.characteristic(uuid)?;
        if let Some(callback) = self.inner.characteristic_writes.get(uuid) {
            callback(characteristic, &data)?;
        }
        characteristic.set_value(data.clone());
        Ok(data)
    }

    /// Reads the value of a descriptor.
    pub async fn read_descriptor(
        &self,
        characteristic: &BluetoothUuid,
        descriptor: &BluetoothUuid,
    ) -> Result<Vec<u8>> {
        let target = self
            .inner
            .services
            .characteristic(characteristic)?
            .descriptor(descriptor)?;
        match lookup(&self.inner.descriptor_reads, characteristic, descriptor) {
            Some(callback) => {
                let value = callback(target)?;
                target.set_value(value.clone());
                Ok(value)
            }
            None => Ok(target.value()),
        }
    }

    /// Writes the value of a descriptor, returning the bytes written.
    pub async fn write_descriptor(
        &self,
        characteristic: &BluetoothUuid,
        descriptor: &BluetoothUuid,
        data: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let target = self
            .inner
            .services
            .characteristic(characteristic)?
            .descriptor(descriptor)?;
        if let Some(callback) = lookup(&self.inner.descriptor_writes, characteristic, descriptor) {
            callback(target, &data)?;
        }
        target.set_value(data.clone());
        Ok(data)
    }

    /// Enables notifications for a characteristic and returns a stream of its values.
    ///
    /// The stream carries the values sent on the characteristic's notification source after this
    /// call.
    pub async fn setup_notification(
        &self,
        uuid: &BluetoothUuid,
    ) -> Result<BroadcastReceiver<Vec<u8>>> {
        self.subscribe(uuid, &ENABLE_NOTIFICATION_VALUE)
    }

    /// Enables indications for a characteristic and returns a stream of its values.
    pub async fn setup_indication(
        &self,
        uuid: &BluetoothUuid,
    ) -> Result<BroadcastReceiver<Vec<u8>>> {
        self.subscribe(uuid, &ENABLE_INDICATION_VALUE)
    }

    fn subscribe(
        &self,
        uuid: &BluetoothUuid,
        configuration: &[u8],
    ) -> Result<BroadcastReceiver<Vec<u8>>> {
        let characteristic = self.inner.services.characteristic(uuid)?;
        let source = self
            .inner
            .notification_sources
            .get(uuid)
            .ok_or_else(|| Error::with_uuid(ErrorKind::NotConfigured, uuid.clone()))?;

        if let Ok(cccd) = characteristic.descriptor(&CLIENT_CHARACTERISTIC_CONFIGURATION) {
            cccd.set_value(configuration.to_vec());
        }

        debug!(%uuid, ?configuration, "characteristic subscribed");
        Ok(source.activate_cloned())
    }
}

fn lookup<'a, T>(
    map: &'a DescriptorMap<T>,
    characteristic: &BluetoothUuid,
    descriptor: &BluetoothUuid,
) -> Option<&'a T> {
    map.get(characteristic)?.get(descriptor)
}

/// Configures a [`ConnectionMock`].
#[derive(Default)]
pub struct ConnectionMockBuilder {
    services: DeviceServices,
    rssi: Option<i16>,
    mtu: Option<u16>,
    notification_sources: HashMap<BluetoothUuid, InactiveReceiver<Vec<u8>>>,
    characteristic_reads: HashMap<BluetoothUuid, CharacteristicReadCallback>,
    characteristic_writes: HashMap<BluetoothUuid, CharacteristicWriteCallback>,
    descriptor_reads: DescriptorMap<DescriptorReadCallback>,
    descriptor_writes: DescriptorMap<DescriptorWriteCallback>,
}

impl ConnectionMockBuilder {
    pub fn services(mut self, services: impl Into<DeviceServices>) -> Self {
        self.services = services.into();
        self
    }

    pub fn rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    pub(crate) fn rssi_or(mut self, rssi: Option<i16>) -> Self {
        self.rssi = self.rssi.or(rssi);
        self
    }

    pub fn mtu(mut self, mtu: u16) -> Self {
        self.mtu = Some(mtu);
        self
    }

    /// Sets the source of notification and indication values for a characteristic.
    ///
    /// Values broadcast on the matching sender are delivered to every stream returned by
    /// [`ConnectionMock::setup_notification`] for that characteristic. The receiver itself is
    /// deactivated, so it does not hold back the sender while nobody is subscribed.
    pub fn notification_source(
        mut self,
        characteristic: BluetoothUuid,
        source: BroadcastReceiver<Vec<u8>>,
    ) -> Self {
        self.notification_sources
            .insert(characteristic, source.deactivate());
        self
    }

    pub fn characteristic_read(
        mut self,
        characteristic: BluetoothUuid,
        callback: impl Fn(&Characteristic) -> Result<Vec<u8>> + Send + Sync + 'static,
    ) -> Self {
        self.characteristic_reads
            .insert(characteristic, Arc::new(callback));
        self
    }

    pub fn characteristic_write(
        mut self,
        characteristic: BluetoothUuid,
        callback: impl Fn(&Characteristic, &[u8]) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.characteristic_writes
            .insert(characteristic, Arc::new(callback));
        self
    }

    pub fn descriptor_read(
        mut self,
        characteristic: BluetoothUuid,
        descriptor: BluetoothUuid,
        callback: impl Fn(&Descriptor) -> Result<Vec<u8>> + Send + Sync + 'static,
    ) -> Self {
        self.descriptor_reads
            .entry(characteristic)
            .or_default()
            .insert(descriptor, Arc::new(callback));
        self
    }

    pub fn descriptor_write(
        mut self,
        characteristic: BluetoothUuid,
        descriptor: BluetoothUuid,
        callback: impl Fn(&Descriptor, &[u8]) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.descriptor_writes
            .entry(characteristic)
            .or_default()
            .insert(descriptor, Arc::new(callback));
        self
    }

    pub fn build(self) -> ConnectionMock {
        ConnectionMock {
            inner: Arc::new(ConnectionInner {
                services: self.services,
                rssi: self.rssi.unwrap_or_default(),
                mtu: AtomicU16::new(self.mtu.unwrap_or(DEFAULT_MTU)),
                notification_sources: self.notification_sources,
                characteristic_reads: self.characteristic_reads,
                characteristic_writes: self.characteristic_writes,
                descriptor_reads: self.descriptor_reads,
                descriptor_writes: self.descriptor_writes,
            }),
        }
    }
}
