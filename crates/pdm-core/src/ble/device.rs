// Discovered device records and the address-keyed registry.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::Serialize;

use super::gatt::{self, GattService};
use super::platform::{Advertisement, RawService};

/// Name used when an advertisement carries none.
pub const UNKNOWN_DEVICE: &str = "Unknown Device";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BleDevice {
    /// Hardware address; the record's identity.
    pub address: String,
    pub name: String,
    pub rssi: i16,
    pub services: Vec<GattService>,
}

impl BleDevice {
    fn from_advertisement(adv: &Advertisement) -> Self {
        Self {
            address: adv.address.clone(),
            name: adv
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNKNOWN_DEVICE.to_owned()),
            rssi: adv.rssi,
            services: Vec::new(),
        }
    }

    pub fn has_name(&self) -> bool {
        self.name != UNKNOWN_DEVICE
    }
}

/// Whether a sighting created a record or refreshed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sighting {
    New,
    Updated,
}

/// Devices seen during a scan, keyed by address, in discovery order.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: IndexMap<String, BleDevice>,
    /// Indices touched since the last `drain_pending`.
    pending: BTreeSet<usize>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record or refresh the signal strength of an existing one.
    pub fn observe(&mut self, adv: &Advertisement) -> Sighting {
        if let Some((index, _, device)) = self.devices.get_full_mut(&adv.address) {
            device.rssi = adv.rssi;
            if !device.has_name() {
                if let Some(name) = adv.name.as_deref().filter(|n| !n.is_empty()) {
                    device.name = name.to_owned();
                }
            }
            self.pending.insert(index);
            return Sighting::Updated;
        }

        let (index, _) = self
            .devices
            .insert_full(adv.address.clone(), BleDevice::from_advertisement(adv));
        self.pending.insert(index);
        Sighting::New
    }

    /// Replace a device's services with the named form of `raw`.
    /// Returns `false` for an address the registry has never seen.
    pub fn record_services(&mut self, address: &str, raw: &[RawService]) -> bool {
        match self.devices.get_mut(address) {
            Some(device) => {
                device.services = gatt::catalog(raw);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, address: &str) -> Option<&BleDevice> {
        self.devices.get(address)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn clear(&mut self) {
        self.devices.clear();
        self.pending.clear();
    }

    /// Every record, in discovery order.
    pub fn snapshot(&self) -> Vec<BleDevice> {
        self.devices.values().cloned().collect()
    }

    /// Records sighted since the previous call, in discovery order.
    pub fn drain_pending(&mut self) -> Vec<BleDevice> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .filter_map(|index| self.devices.get_index(index))
            .map(|(_, device)| device.clone())
            .collect()
    }
}
