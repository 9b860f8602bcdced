use std::any::Any;
use std::fmt::Display;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use blemock::ConnectionState;
use blemock::advertisement_data::AdvertisementData;
use blemock::error::{Error, ErrorKind, Result};
use btuuid::BluetoothUuid;
use futures_lite::Stream;
use tracing::{debug, warn};

use crate::connection::{ConnectionMock, ConnectionMockBuilder};
use crate::state::{ConnectionStateCell, ConnectionStateChanges};
use crate::util::{ScopeGuard, defer};

/// The device API application code can be written against, so a [`DeviceMock`] can stand in for
/// a real peripheral in tests.
pub trait BleDevice {
    /// The handle returned once a connection is established.
    type Connection;
    /// The stream returned by [`establish_connection`][Self::establish_connection].
    type Session: Stream<Item = Result<Self::Connection>> + Unpin;
    /// The stream returned by
    /// [`observe_connection_state_changes`][Self::observe_connection_state_changes].
    type StateChanges: Stream<Item = ConnectionState> + Unpin;

    fn name(&self) -> Option<&str>;

    fn address(&self) -> &str;

    /// Returns a stream that connects to the device when first polled and yields the connection.
    ///
    /// The connection stays open until the stream is dropped.
    fn establish_connection(&self, auto_connect: bool) -> Self::Session;

    fn establish_connection_with_timeout(
        &self,
        auto_connect: bool,
        timeout: Duration,
    ) -> Self::Session;

    fn observe_connection_state_changes(&self) -> Self::StateChanges;

    fn connection_state(&self) -> ConnectionState;
}

/// A simulated peripheral.
///
/// Allows at most one connection at a time and reports the connection lifecycle through
/// [`observe_connection_state_changes`][Self::observe_connection_state_changes]. Clones refer to
/// the same device.
#[derive(Clone)]
pub struct DeviceMock {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    name: Option<String>,
    address: String,
    rssi: Option<i16>,
    scan_record: Option<Vec<u8>>,
    advertisement_data: Option<AdvertisementData>,
    advertised_uuids: Mutex<Vec<BluetoothUuid>>,
    platform_device: Option<Box<dyn Any + Send + Sync>>,
    connection: ConnectionMock,
    is_connected: AtomicBool,
    state: ConnectionStateCell,
}

impl DeviceInner {
    fn release(&self) {
        self.state.publish(ConnectionState::Disconnected);
        self.is_connected.store(false, Ordering::Release);
        debug!(address = %self.address, "connection released");
    }
}

impl std::fmt::Debug for DeviceMock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceMock")
            .field("name", &self.inner.name)
            .field("address", &self.inner.address)
            .field("rssi", &self.inner.rssi)
            .field("state", &self.connection_state())
            .finish_non_exhaustive()
    }
}

impl Display for DeviceMock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DeviceMock{{{}({})}}",
            self.inner.name.as_deref().unwrap_or_default(),
            self.inner.address
        )
    }
}

impl DeviceMock {
    /// Creates a device with the given address, no advertisement data and an empty connection.
    pub fn new(address: impl Into<String>) -> Self {
        Self::builder(address).build()
    }

    pub fn builder(address: impl Into<String>) -> DeviceMockBuilder {
        DeviceMockBuilder::new(address.into())
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// The signal strength the device was discovered with.
    pub fn rssi(&self) -> Option<i16> {
        self.inner.rssi
    }

    /// The raw advertisement payload, if one was configured.
    pub fn scan_record(&self) -> Option<&[u8]> {
        self.inner.scan_record.as_deref()
    }

    /// The parsed advertisement payload.
    ///
    /// This is the record configured on the builder, or else the parse of the raw payload.
    pub fn advertisement_data(&self) -> Option<&AdvertisementData> {
        self.inner.advertisement_data.as_ref()
    }

    pub fn advertised_uuids(&self) -> Vec<BluetoothUuid> {
        self.inner
            .advertised_uuids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn add_advertised_uuid(&self, uuid: BluetoothUuid) {
        self.inner
            .advertised_uuids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(uuid);
    }

    /// Returns the platform device handle the mock was configured with.
    ///
    /// Fails with [`ErrorKind::NotConfigured`] if no handle of type `T` was configured.
    pub fn platform_device<T: Any>(&self) -> Result<&T> {
        self.inner
            .platform_device
            .as_deref()
            .and_then(|device| device.downcast_ref::<T>())
            .ok_or_else(|| ErrorKind::NotConfigured.into())
    }

    /// Returns a stream that connects to the device when first polled.
    ///
    /// On success the stream yields the device's [`ConnectionMock`] once and then stays pending
    /// forever; dropping it disconnects. If another connection is already active it yields an
    /// [`ErrorKind::AlreadyConnected`] error and ends.
    ///
    /// The auto-connect flag has no effect on the mock.
    pub fn establish_connection(&self, _auto_connect: bool) -> EstablishConnection {
        EstablishConnection {
            device: self.inner.clone(),
            session: Session::Idle,
        }
    }

    /// Same as [`establish_connection`][Self::establish_connection]; the mock never times out.
    pub fn establish_connection_with_timeout(
        &self,
        auto_connect: bool,
        _timeout: Duration,
    ) -> EstablishConnection {
        self.establish_connection(auto_connect)
    }

    /// Returns a stream of connection states, starting with the current one.
    pub fn observe_connection_state_changes(&self) -> ConnectionStateChanges {
        self.inner.state.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.get()
    }
}

impl BleDevice for DeviceMock {
    type Connection = ConnectionMock;
    type Session = EstablishConnection;
    type StateChanges = ConnectionStateChanges;

    fn name(&self) -> Option<&str> {
        DeviceMock::name(self)
    }

    fn address(&self) -> &str {
        DeviceMock::address(self)
    }

    fn establish_connection(&self, auto_connect: bool) -> Self::Session {
        DeviceMock::establish_connection(self, auto_connect)
    }

    fn establish_connection_with_timeout(
        &self,
        auto_connect: bool,
        timeout: Duration,
    ) -> Self::Session {
        DeviceMock::establish_connection_with_timeout(self, auto_connect, timeout)
    }

    fn observe_connection_state_changes(&self) -> Self::StateChanges {
        DeviceMock::observe_connection_state_changes(self)
    }

    fn connection_state(&self) -> ConnectionState {
        DeviceMock::connection_state(self)
    }
}

/// A connection attempt, returned by [`DeviceMock::establish_connection`].
#[must_use = "streams do nothing unless polled"]
pub struct EstablishConnection {
    device: Arc<DeviceInner>,
    session: Session,
}

enum Session {
    Idle,
    Active(ScopeGuard<Box<dyn FnOnce() + Send>>),
    Rejected,
}

impl std::fmt::Debug for EstablishConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = match self.session {
            Session::Idle => "idle",
            Session::Active(_) => "active",
            Session::Rejected => "rejected",
        };
        f.debug_struct("EstablishConnection")
            .field("address", &self.device.address)
            .field("session", &session)
            .finish()
    }
}

impl EstablishConnection {
    /// Whether this attempt currently holds the device's connection.
    pub fn is_active(&self) -> bool {
        matches!(self.session, Session::Active(_))
    }
}

impl Stream for EstablishConnection {
    type Item = Result<ConnectionMock>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.session {
            Session::Idle => {
                let device = &this.device;
                if device
                    .is_connected
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    warn!(address = %device.address, "device is already connected");
                    this.session = Session::Rejected;
                    return Poll::Ready(Some(Err(Error::with_address(
                        ErrorKind::AlreadyConnected,
                        device.address.clone(),
                    ))));
                }

                let release = device.clone();
                let release: Box<dyn FnOnce() + Send> = Box::new(move || release.release());
                this.session = Session::Active(defer(release));

                debug!(address = %device.address, "connection established");
                device.state.publish(ConnectionState::Connecting);
                let connection = device.connection.clone();
                device.state.publish(ConnectionState::Connected);
                Poll::Ready(Some(Ok(connection)))
            }
            // The session never completes on its own; it ends when dropped.
            Session::Active(_) => Poll::Pending,
            Session::Rejected => Poll::Ready(None),
        }
    }
}

enum ConnectionSource {
    Built(ConnectionMock),
    Builder(ConnectionMockBuilder),
}

/// Configures a [`DeviceMock`].
pub struct DeviceMockBuilder {
    name: Option<String>,
    address: String,
    rssi: Option<i16>,
    scan_record: Option<Vec<u8>>,
    advertisement_data: Option<AdvertisementData>,
    advertised_uuids: Vec<BluetoothUuid>,
    platform_device: Option<Box<dyn Any + Send + Sync>>,
    connection: ConnectionSource,
}

impl DeviceMockBuilder {
    fn new(address: String) -> Self {
        Self {
            name: None,
            address,
            rssi: None,
            scan_record: None,
            advertisement_data: None,
            advertised_uuids: Vec::new(),
            platform_device: None,
            connection: ConnectionSource::Builder(ConnectionMockBuilder::default()),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the signal strength reported by the device and, unless configured otherwise, by its
    /// connection.
    pub fn rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Sets the raw advertisement payload.
    pub fn scan_record(mut self, scan_record: impl Into<Vec<u8>>) -> Self {
        self.scan_record = Some(scan_record.into());
        self
    }

    /// Sets the parsed advertisement payload, taking precedence over the parse of
    /// [`scan_record`][Self::scan_record].
    pub fn advertisement_data(mut self, advertisement_data: AdvertisementData) -> Self {
        self.advertisement_data = Some(advertisement_data);
        self
    }

    pub fn advertised_uuid(mut self, uuid: BluetoothUuid) -> Self {
        self.advertised_uuids.push(uuid);
        self
    }

    pub fn platform_device<T: Any + Send + Sync>(mut self, device: T) -> Self {
        self.platform_device = Some(Box::new(device));
        self
    }

    /// Uses a pre-built connection.
    pub fn connection(mut self, connection: ConnectionMock) -> Self {
        self.connection = ConnectionSource::Built(connection);
        self
    }

    /// Configures the connection the device will build.
    ///
    /// Replaces a connection previously set with [`connection`][Self::connection].
    pub fn connection_with(
        mut self,
        configure: impl FnOnce(ConnectionMockBuilder) -> ConnectionMockBuilder,
    ) -> Self {
        let builder = match self.connection {
            ConnectionSource::Builder(builder) => builder,
            ConnectionSource::Built(_) => ConnectionMockBuilder::default(),
        };
        self.connection = ConnectionSource::Builder(configure(builder));
        self
    }

    pub fn build(self) -> DeviceMock {
        let advertisement_data = match (self.advertisement_data, &self.scan_record) {
            (Some(advertisement_data), _) => Some(advertisement_data),
            (None, Some(scan_record)) => match AdvertisementData::from_scan_record(scan_record) {
                Ok(advertisement_data) => Some(advertisement_data),
                Err(error) => {
                    warn!(address = %self.address, %error, "ignoring unparsable scan record");
                    None
                }
            },
            (None, None) => None,
        };

        let connection = match self.connection {
            ConnectionSource::Built(connection) => connection,
            ConnectionSource::Builder(builder) => builder.rssi_or(self.rssi).build(),
        };

        DeviceMock {
            inner: Arc::new(DeviceInner {
                name: self.name,
                address: self.address,
                rssi: self.rssi,
                scan_record: self.scan_record,
                advertisement_data,
                advertised_uuids: Mutex::new(self.advertised_uuids),
                platform_device: self.platform_device,
                connection,
                is_connected: AtomicBool::new(false),
                state: ConnectionStateCell::default(),
            }),
        }
    }
}
