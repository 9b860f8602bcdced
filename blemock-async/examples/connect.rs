use std::error::Error;

use blemock_async::{
    BluetoothUuid, Characteristic, CharacteristicProperties, ConnectionState, Descriptor,
    DeviceMock, Service,
};
use futures_lite::StreamExt;
use tracing::info;
use tracing::metadata::LevelFilter;

const HEART_RATE: BluetoothUuid = BluetoothUuid::from_u16(0x180d);
const HEART_RATE_MEASUREMENT: BluetoothUuid = BluetoothUuid::from_u16(0x2a37);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::DEBUG.into())
                .from_env_lossy(),
        )
        .init();

    let (sender, source) = async_broadcast::broadcast(16);
    let device = DeviceMock::builder("D2:4B:77:10:3C:A1")
        .name("Pulse")
        .rssi(-64)
        .scan_record([
            0x02, 0x01, 0x06, 0x03, 0x03, 0x0d, 0x18, 0x06, 0x09, b'P', b'u', b'l', b's', b'e',
        ])
        .connection_with(|connection| {
            connection
                .services(vec![Service::new(HEART_RATE).with_characteristic(
                    Characteristic::new(HEART_RATE_MEASUREMENT, CharacteristicProperties::NOTIFY)
                        .with_descriptor(Descriptor::client_configuration()),
                )])
                .notification_source(HEART_RATE_MEASUREMENT, source)
        })
        .build();

    info!(%device, advertisement = ?device.advertisement_data(), "device ready");

    let states = tokio::spawn({
        let mut states = device.observe_connection_state_changes();
        async move {
            while let Some(state) = states.next().await {
                info!(%state, "connection state");
            }
        }
    });

    let mut session = device.establish_connection(false);
    let connection = session.next().await.ok_or("session ended early")??;

    let mut measurements = connection.setup_notification(&HEART_RATE_MEASUREMENT).await?;
    for bpm in [71u8, 73, 72] {
        sender.try_broadcast(vec![0x00, bpm])?;
    }
    for _ in 0..3 {
        let measurement = measurements.recv().await?;
        info!(bpm = measurement[1], "heart rate");
    }

    drop(session);
    assert_eq!(device.connection_state(), ConnectionState::Disconnected);
    info!("session closed");

    states.abort();
    Ok(())
}
