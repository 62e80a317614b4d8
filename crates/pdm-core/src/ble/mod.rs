//! Bluetooth Low Energy discovery and GATT access.
//!
//! - [`platform`]: the host stack boundary ([`BlePlatform`]) and its raw events.
//! - [`scan`]: [`ScanSession`], one time-bounded discovery at a time.
//! - [`device`]: address-keyed [`DeviceRegistry`] of [`BleDevice`] records.
//! - [`gatt`]: static UUID names and the named service model.
//! - [`link`]: [`GattSession`] over a connected peripheral ([`GattLink`]).

pub mod device;
pub mod gatt;
pub mod link;
pub mod platform;
pub mod scan;

pub use device::{BleDevice, DeviceRegistry, UNKNOWN_DEVICE};
pub use gatt::{GattCharacteristic, GattService};
pub use link::{GattLink, GattSession, LinkError, MAX_MTU, MAX_PACKET, MIN_PACKET};
pub use platform::{
    Advertisement, BlePlatform, BleUnavailableReason, RawCharacteristic, RawService, ScanEvent,
    ScanFailureCode, ScanFilters,
};
pub use scan::{DEFAULT_SCAN_PERIOD, ScanSession, ScanState, ScanUpdate};
