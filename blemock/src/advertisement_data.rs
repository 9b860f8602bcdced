//! Advertisement payloads and their parsing.

use std::collections::HashMap;

use btuuid::BluetoothUuid;

use crate::error::{ErrorKind, Result};

/// Data included in a Bluetooth advertisement or scan reponse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisementData {
    /// The (possibly shortened) local name of the device (CSS §A.1.2)
    pub local_name: Option<String>,
    /// Manufacturer specific data (CSS §A.1.4)
    pub manufacturer_data: Option<ManufacturerData>,
    /// Service associated data (CSS §A.1.11)
    pub service_data: HashMap<BluetoothUuid, Vec<u8>>,
    /// Advertised GATT service UUIDs (CSS §A.1.1)
    pub service_uuids: Vec<BluetoothUuid>,
    /// Transmitted power level (CSS §A.1.5)
    pub tx_power_level: Option<i16>,
    /// Advertising flags (CSS §A.1.3)
    pub flags: Option<u8>,
    /// Solicited GATT service UUIDs (CSS §A.1.10)
    pub solicited_service_uuids: Vec<BluetoothUuid>,
}

/// Manufacturer specific data included in Bluetooth advertisements. See the Bluetooth Core Specification Supplement
/// §A.1.4 for details.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManufacturerData {
    /// Company identifier (defined [here](https://www.bluetooth.com/specifications/assigned-numbers/company-identifiers/))
    pub company_id: u16,
    /// Manufacturer specific data
    pub data: Vec<u8>,
}

mod ad_type {
    pub const FLAGS: u8 = 0x01;
    pub const INCOMPLETE_UUID16: u8 = 0x02;
    pub const COMPLETE_UUID16: u8 = 0x03;
    pub const INCOMPLETE_UUID32: u8 = 0x04;
    pub const COMPLETE_UUID32: u8 = 0x05;
    pub const INCOMPLETE_UUID128: u8 = 0x06;
    pub const COMPLETE_UUID128: u8 = 0x07;
    pub const SHORTENED_LOCAL_NAME: u8 = 0x08;
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
    pub const TX_POWER_LEVEL: u8 = 0x0a;
    pub const SOLICITED_UUID16: u8 = 0x14;
    pub const SOLICITED_UUID128: u8 = 0x15;
    pub const SERVICE_DATA_UUID16: u8 = 0x16;
    pub const SOLICITED_UUID32: u8 = 0x1f;
    pub const SERVICE_DATA_UUID32: u8 = 0x20;
    pub const SERVICE_DATA_UUID128: u8 = 0x21;
    pub const MANUFACTURER_SPECIFIC_DATA: u8 = 0xff;
}

impl AdvertisementData {
    /// Parses a raw legacy advertisement or scan response payload.
    ///
    /// The payload is a sequence of `[length][type][data]` structures. A zero length ends the
    /// payload, so trailing padding is accepted. Structures of unknown type are skipped.
    pub fn from_scan_record(bytes: &[u8]) -> Result<Self> {
        use ad_type::*;

        let mut adv_data = AdvertisementData::default();
        let mut shortened_name = None;

        let mut rest = bytes;
        while let Some((&len, tail)) = rest.split_first() {
            let len = usize::from(len);
            if len == 0 {
                break;
            }
            if tail.len() < len {
                return Err(ErrorKind::MalformedAdvertisement.into());
            }
            let (field, next) = tail.split_at(len);
            rest = next;

            let (kind, data) = (field[0], &field[1..]);
            match kind {
                FLAGS => adv_data.flags = data.first().copied(),
                INCOMPLETE_UUID16 | COMPLETE_UUID16 => {
                    extend_uuids(&mut adv_data.service_uuids, data, 2)?
                }
                INCOMPLETE_UUID32 | COMPLETE_UUID32 => {
                    extend_uuids(&mut adv_data.service_uuids, data, 4)?
                }
                INCOMPLETE_UUID128 | COMPLETE_UUID128 => {
                    extend_uuids(&mut adv_data.service_uuids, data, 16)?
                }
                SOLICITED_UUID16 => extend_uuids(&mut adv_data.solicited_service_uuids, data, 2)?,
                SOLICITED_UUID32 => extend_uuids(&mut adv_data.solicited_service_uuids, data, 4)?,
                SOLICITED_UUID128 => {
                    extend_uuids(&mut adv_data.solicited_service_uuids, data, 16)?
                }
                SHORTENED_LOCAL_NAME => {
                    shortened_name = Some(String::from_utf8_lossy(data).into_owned())
                }
                COMPLETE_LOCAL_NAME => {
                    adv_data.local_name = Some(String::from_utf8_lossy(data).into_owned())
                }
                TX_POWER_LEVEL => {
                    adv_data.tx_power_level = data.first().map(|&level| i16::from(level as i8))
                }
                SERVICE_DATA_UUID16 => insert_service_data(&mut adv_data.service_data, data, 2)?,
                SERVICE_DATA_UUID32 => insert_service_data(&mut adv_data.service_data, data, 4)?,
                SERVICE_DATA_UUID128 => {
                    insert_service_data(&mut adv_data.service_data, data, 16)?
                }
                MANUFACTURER_SPECIFIC_DATA => {
                    if data.len() < 2 {
                        return Err(ErrorKind::MalformedAdvertisement.into());
                    }
                    if adv_data.manufacturer_data.is_none() {
                        adv_data.manufacturer_data = Some(ManufacturerData {
                            company_id: u16::from_le_bytes([data[0], data[1]]),
                            data: data[2..].to_vec(),
                        });
                    }
                }
                _ => {}
            }
        }

        if adv_data.local_name.is_none() {
            adv_data.local_name = shortened_name;
        }

        Ok(adv_data)
    }
}

fn extend_uuids(uuids: &mut Vec<BluetoothUuid>, data: &[u8], width: usize) -> Result<()> {
    if data.len() % width != 0 {
        return Err(ErrorKind::MalformedAdvertisement.into());
    }
    uuids.extend(
        data.chunks_exact(width)
            .filter_map(|uuid| BluetoothUuid::from_le_slice(uuid).ok()),
    );
    Ok(())
}

fn insert_service_data(
    service_data: &mut HashMap<BluetoothUuid, Vec<u8>>,
    data: &[u8],
    width: usize,
) -> Result<()> {
    if data.len() < width {
        return Err(ErrorKind::MalformedAdvertisement.into());
    }
    let (uuid, value) = data.split_at(width);
    let uuid =
        BluetoothUuid::from_le_slice(uuid).map_err(|_| ErrorKind::MalformedAdvertisement)?;
    service_data.insert(uuid, value.to_vec());
    Ok(())
}
