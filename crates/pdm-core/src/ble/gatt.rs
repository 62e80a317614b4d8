//! Static GATT UUID names and the translation from discovered services to a
//! named capability model.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::Serialize;
use uuid::Uuid;

use super::platform::RawService;

pub const UNKNOWN_SERVICE: &str = "Unknown Service";
pub const UNKNOWN_CHARACTERISTIC: &str = "Unknown Characteristic";

// ── Services ────────────────────────────────────────────────────────

pub const GENERIC_ACCESS: Uuid = Uuid::from_u128(0x0000_1800_0000_1000_8000_0080_5f9b_34fb);
pub const GENERIC_ATTRIBUTE: Uuid = Uuid::from_u128(0x0000_1801_0000_1000_8000_0080_5f9b_34fb);
pub const DEVICE_INFORMATION: Uuid = Uuid::from_u128(0x0000_180a_0000_1000_8000_0080_5f9b_34fb);
pub const HEART_RATE: Uuid = Uuid::from_u128(0x0000_180d_0000_1000_8000_0080_5f9b_34fb);

/// Secure device access transport service.
pub const SDA_SERVICE: Uuid = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e_24dc_ca9e);

// ── Characteristics ─────────────────────────────────────────────────

pub const DEVICE_NAME: Uuid = Uuid::from_u128(0x0000_2a00_0000_1000_8000_0080_5f9b_34fb);
pub const APPEARANCE: Uuid = Uuid::from_u128(0x0000_2a01_0000_1000_8000_0080_5f9b_34fb);
pub const PERIPHERAL_PREFERRED_CONNECTION_PARAMETERS: Uuid =
    Uuid::from_u128(0x0000_2a04_0000_1000_8000_0080_5f9b_34fb);
pub const SERVICE_CHANGED: Uuid = Uuid::from_u128(0x0000_2a05_0000_1000_8000_0080_5f9b_34fb);
pub const SERIAL_NUMBER: Uuid = Uuid::from_u128(0x0000_2a25_0000_1000_8000_0080_5f9b_34fb);
pub const MANUFACTURER_NAME: Uuid = Uuid::from_u128(0x0000_2a29_0000_1000_8000_0080_5f9b_34fb);
pub const HEART_RATE_MEASUREMENT: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_0080_5f9b_34fb);

/// Read/write characteristic of [`SDA_SERVICE`].
pub const SDA_CHARACTERISTIC: Uuid = Uuid::from_u128(0x6e40_0002_b5a3_f393_e0a9_e50e_24dc_ca9e);

static NAMES: LazyLock<HashMap<Uuid, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        (GENERIC_ACCESS, "Generic Access"),
        (GENERIC_ATTRIBUTE, "Generic Attribute"),
        (DEVICE_INFORMATION, "Device Information Service"),
        (HEART_RATE, "Heart Rate Service"),
        (SDA_SERVICE, "Secure Device Access Service"),
        (DEVICE_NAME, "Device Name"),
        (APPEARANCE, "Appearance"),
        (
            PERIPHERAL_PREFERRED_CONNECTION_PARAMETERS,
            "Peripheral Preferred Connection Parameters",
        ),
        (SERVICE_CHANGED, "Service Changed"),
        (SERIAL_NUMBER, "Serial Number"),
        (MANUFACTURER_NAME, "Manufacturer Name String"),
        (HEART_RATE_MEASUREMENT, "Heart Rate Measurement"),
        (SDA_CHARACTERISTIC, "Secure Device Access Characteristic"),
    ])
});

/// Name for `uuid`, or `default` when the table has no entry.
pub fn lookup(uuid: &Uuid, default: &'static str) -> &'static str {
    NAMES.get(uuid).copied().unwrap_or(default)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub name: &'static str,
    pub handle: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GattService {
    pub uuid: Uuid,
    pub name: &'static str,
    pub handle: u16,
    pub characteristics: Vec<GattCharacteristic>,
}

/// Name every discovered service and characteristic. Pure; unknown UUIDs
/// get the placeholder names.
pub fn catalog(raw: &[RawService]) -> Vec<GattService> {
    raw.iter()
        .map(|service| GattService {
            uuid: service.uuid,
            name: lookup(&service.uuid, UNKNOWN_SERVICE),
            handle: service.handle,
            characteristics: service
                .characteristics
                .iter()
                .map(|c| GattCharacteristic {
                    uuid: c.uuid,
                    name: lookup(&c.uuid, UNKNOWN_CHARACTERISTIC),
                    handle: c.handle,
                })
                .collect(),
        })
        .collect()
}
