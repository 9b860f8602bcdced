use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use blemock_async::error::{AttError, ErrorKind, Result};
use blemock_async::{
    BluetoothUuid, CLIENT_CHARACTERISTIC_CONFIGURATION, Characteristic, CharacteristicProperties,
    ConnectionMock, DISABLE_NOTIFICATION_VALUE, Descriptor, DeviceMock, ENABLE_INDICATION_VALUE,
    ENABLE_NOTIFICATION_VALUE, Service,
};
use futures_lite::StreamExt;
use uuid::Uuid;

const HEART_RATE: BluetoothUuid = BluetoothUuid::from_u16(0x180d);
const HEART_RATE_MEASUREMENT: BluetoothUuid = BluetoothUuid::from_u16(0x2a37);
const BODY_SENSOR_LOCATION: BluetoothUuid = BluetoothUuid::from_u16(0x2a38);
const USER_DESCRIPTION: BluetoothUuid = BluetoothUuid::from_u16(0x2901);

fn nus_tx() -> BluetoothUuid {
    let uuid = Uuid::parse_str("6e400003-b5a3-f393-e0a9-e50e24dcca9e").unwrap();
    BluetoothUuid::from(uuid)
}

fn heart_rate_service() -> Service {
    Service::new(HEART_RATE)
        .with_characteristic(
            Characteristic::new(HEART_RATE_MEASUREMENT, CharacteristicProperties::NOTIFY)
                .with_descriptor(Descriptor::client_configuration()),
        )
        .with_characteristic(
            Characteristic::new(
                BODY_SENSOR_LOCATION,
                CharacteristicProperties::READ | CharacteristicProperties::WRITE,
            )
            .with_value(vec![0x01])
            .with_descriptor(Descriptor::with_value(USER_DESCRIPTION, b"location".to_vec())),
        )
        .with_characteristic(Characteristic::new(nus_tx(), CharacteristicProperties::NOTIFY))
}

#[tokio::test]
async fn read_callbacks_supply_and_store_values() -> Result<()> {
    let reads = Arc::new(AtomicUsize::new(0));
    let connection = ConnectionMock::builder()
        .services(vec![heart_rate_service()])
        .characteristic_read(BODY_SENSOR_LOCATION, {
            let reads = reads.clone();
            move |characteristic: &Characteristic| {
                assert_eq!(characteristic.uuid(), &BODY_SENSOR_LOCATION);
                reads.fetch_add(1, Ordering::Relaxed);
                Ok(vec![0x03])
            }
        })
        .build();

    assert_eq!(connection.read_characteristic(&BODY_SENSOR_LOCATION).await?, [0x03]);
    assert_eq!(reads.load(Ordering::Relaxed), 1);

    let services = connection.discover_services().await?;
    assert_eq!(services.characteristic(&BODY_SENSOR_LOCATION)?.value(), [0x03]);
    Ok(())
}

#[tokio::test]
async fn callback_errors_surface_as_att_errors() {
    let connection = ConnectionMock::builder()
        .services(vec![heart_rate_service()])
        .characteristic_read(BODY_SENSOR_LOCATION, |_| {
            Err(AttError::INSUFFICIENT_AUTHENTICATION.into())
        })
        .characteristic_write(BODY_SENSOR_LOCATION, |_, _| {
            Err(AttError::WRITE_NOT_PERMITTED.into())
        })
        .build();

    let error = connection
        .read_characteristic(&BODY_SENSOR_LOCATION)
        .await
        .unwrap_err();
    assert_eq!(
        error.kind(),
        ErrorKind::Att(AttError::INSUFFICIENT_AUTHENTICATION)
    );

    let error = connection
        .write_characteristic(&BODY_SENSOR_LOCATION, vec![0x02])
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Att(AttError::WRITE_NOT_PERMITTED));

    // A rejected write leaves the stored value untouched.
    let stored = connection
        .services()
        .characteristic(&BODY_SENSOR_LOCATION)
        .unwrap()
        .value();
    assert_eq!(stored, [0x01]);
}

#[tokio::test]
async fn writes_are_stored_and_echoed() -> Result<()> {
    let connection = ConnectionMock::builder()
        .services(vec![heart_rate_service()])
        .characteristic_write(BODY_SENSOR_LOCATION, |_, data| {
            if data.len() == 1 {
                Ok(())
            } else {
                Err(AttError::INVALID_ATTRIBUTE_VALUE_LENGTH.into())
            }
        })
        .build();

    assert_eq!(
        connection
            .write_characteristic(&BODY_SENSOR_LOCATION, vec![0x05])
            .await?,
        [0x05]
    );
    assert_eq!(connection.read_characteristic(&BODY_SENSOR_LOCATION).await?, [0x05]);
    Ok(())
}

#[tokio::test]
async fn descriptor_callbacks_are_keyed_by_characteristic() -> Result<()> {
    let connection = ConnectionMock::builder()
        .services(vec![heart_rate_service()])
        .descriptor_read(BODY_SENSOR_LOCATION, USER_DESCRIPTION, |descriptor| {
            let mut value = descriptor.value();
            value.extend_from_slice(b" (wrist)");
            Ok(value)
        })
        .descriptor_write(
            HEART_RATE_MEASUREMENT,
            CLIENT_CHARACTERISTIC_CONFIGURATION,
            |_, data| {
                if *data == ENABLE_INDICATION_VALUE {
                    Err(AttError::REQUEST_NOT_SUPPORTED.into())
                } else {
                    Ok(())
                }
            },
        )
        .build();

    assert_eq!(
        connection
            .read_descriptor(&BODY_SENSOR_LOCATION, &USER_DESCRIPTION)
            .await?,
        b"location (wrist)"
    );

    connection
        .write_descriptor(
            &HEART_RATE_MEASUREMENT,
            &CLIENT_CHARACTERISTIC_CONFIGURATION,
            ENABLE_NOTIFICATION_VALUE.to_vec(),
        )
        .await?;
    let error = connection
        .write_descriptor(
            &HEART_RATE_MEASUREMENT,
            &CLIENT_CHARACTERISTIC_CONFIGURATION,
            ENABLE_INDICATION_VALUE.to_vec(),
        )
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Att(AttError::REQUEST_NOT_SUPPORTED));
    assert_eq!(
        connection
            .read_descriptor(&HEART_RATE_MEASUREMENT, &CLIENT_CHARACTERISTIC_CONFIGURATION)
            .await?,
        ENABLE_NOTIFICATION_VALUE
    );

    let error = connection
        .read_descriptor(&HEART_RATE_MEASUREMENT, &USER_DESCRIPTION)
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::DescriptorNotFound);
    Ok(())
}

#[tokio::test]
async fn notifications_deliver_values_sent_after_setup() -> Result<()> {
    let (sender, source) = async_broadcast::broadcast(8);
    let connection = ConnectionMock::builder()
        .services(vec![heart_rate_service()])
        .notification_source(HEART_RATE_MEASUREMENT, source)
        .build();

    let cccd = connection
        .services()
        .characteristic(&HEART_RATE_MEASUREMENT)?
        .descriptor(&CLIENT_CHARACTERISTIC_CONFIGURATION)?
        .clone();
    assert_eq!(cccd.value(), DISABLE_NOTIFICATION_VALUE);

    let mut notifications = connection
        .setup_notification(&HEART_RATE_MEASUREMENT)
        .await?;
    assert_eq!(cccd.value(), ENABLE_NOTIFICATION_VALUE);

    sender.try_broadcast(vec![0x00, 72]).unwrap();
    sender.try_broadcast(vec![0x00, 74]).unwrap();
    assert_eq!(notifications.recv().await.unwrap(), [0x00, 72]);
    assert_eq!(notifications.recv().await.unwrap(), [0x00, 74]);

    let _indications = connection
        .setup_indication(&HEART_RATE_MEASUREMENT)
        .await?;
    assert_eq!(cccd.value(), ENABLE_INDICATION_VALUE);
    Ok(())
}

#[tokio::test]
async fn notifications_require_a_source() {
    let connection = ConnectionMock::builder()
        .services(vec![heart_rate_service()])
        .build();

    let error = connection.setup_notification(&nus_tx()).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotConfigured);
    assert_eq!(error.uuid(), Some(&nus_tx()));

    let error = connection
        .setup_notification(&BluetoothUuid::from_u16(0x2a19))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::CharacteristicNotFound);
}

#[tokio::test]
async fn device_hands_out_the_configured_connection() -> Result<()> {
    let (sender, source) = async_broadcast::broadcast(4);
    let device = DeviceMock::builder("F0:F1:F2:F3:F4:F5")
        .name("HRM")
        .rssi(-55)
        .connection_with(|connection| {
            connection
                .services(vec![heart_rate_service()])
                .notification_source(nus_tx(), source)
                .mtu(247)
        })
        .build();

    let mut session = device.establish_connection(false);
    let connection = session.next().await.unwrap()?;
    assert_eq!(connection.read_rssi().await?, -55);
    assert_eq!(connection.mtu(), 247);
    assert_eq!(connection.discover_services().await?.services().len(), 1);

    let mut rx = connection.setup_notification(&nus_tx()).await?;
    sender.try_broadcast(b"hello".to_vec()).unwrap();
    assert_eq!(rx.recv().await.unwrap(), b"hello");
    Ok(())
}
