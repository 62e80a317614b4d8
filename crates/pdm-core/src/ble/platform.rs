// Boundary to the host Bluetooth stack.
//
// Platform backends implement `BlePlatform` and push raw callbacks into the
// channel handed to `start_scan`, in the order the hardware reports them.

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Why a scan was refused before touching the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum BleUnavailableReason {
    #[strum(to_string = "BLE is not available on an emulator")]
    Emulator,
    #[strum(to_string = "Bluetooth adapter is disabled")]
    AdapterDisabled,
    #[strum(to_string = "BLE is not supported by this hardware")]
    Unsupported,
}

/// Hardware scan failure cause, numbered as the platform reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum ScanFailureCode {
    #[strum(to_string = "a scan with the same settings is already running")]
    AlreadyStarted,
    #[strum(to_string = "application registration failed")]
    ApplicationRegistrationFailed,
    #[strum(to_string = "internal error")]
    InternalError,
    #[strum(to_string = "feature unsupported")]
    FeatureUnsupported,
    #[strum(to_string = "out of hardware resources")]
    OutOfHardwareResources,
    #[strum(to_string = "scanning too frequently")]
    ScanningTooFrequently,
}

impl ScanFailureCode {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::AlreadyStarted,
            2 => Self::ApplicationRegistrationFailed,
            3 => Self::InternalError,
            4 => Self::FeatureUnsupported,
            5 => Self::OutOfHardwareResources,
            6 => Self::ScanningTooFrequently,
            _ => return None,
        })
    }

    pub fn code(self) -> i32 {
        match self {
            Self::AlreadyStarted => 1,
            Self::ApplicationRegistrationFailed => 2,
            Self::InternalError => 3,
            Self::FeatureUnsupported => 4,
            Self::OutOfHardwareResources => 5,
            Self::ScanningTooFrequently => 6,
        }
    }
}

/// Which advertisements the platform should report. Empty lists match all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilters {
    pub addresses: Vec<String>,
    pub service_uuids: Vec<Uuid>,
    pub names: Vec<String>,
}

impl ScanFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.addresses.push(address.into());
        self
    }

    pub fn service(mut self, uuid: Uuid) -> Self {
        self.service_uuids.push(uuid);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty() && self.service_uuids.is_empty() && self.names.is_empty()
    }
}

/// One advertisement sighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub address: String,
    pub name: Option<String>,
    pub rssi: i16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCharacteristic {
    pub uuid: Uuid,
    pub handle: u16,
}

/// A service as reported by GATT discovery, before naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawService {
    pub uuid: Uuid,
    pub handle: u16,
    pub characteristics: Vec<RawCharacteristic>,
}

/// Raw callback from the platform.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Advertisement(Advertisement),
    Batch(Vec<Advertisement>),
    ServicesDiscovered {
        address: String,
        services: Vec<RawService>,
    },
    Failed(ScanFailureCode),
}

/// Host Bluetooth stack.
pub trait BlePlatform: Send + Sync + 'static {
    fn is_emulator(&self) -> bool;

    fn is_adapter_enabled(&self) -> bool;

    /// Whether the hardware declares Bluetooth Low Energy support.
    fn supports_ble(&self) -> bool;

    /// Begin delivering callbacks into `events`. Returns once the radio has
    /// accepted or refused the request.
    fn start_scan(
        &self,
        filters: &ScanFilters,
        events: mpsc::Sender<ScanEvent>,
    ) -> Result<(), ScanFailureCode>;

    /// Stop the radio. Events already queued may still be drained.
    fn stop_scan(&self);
}
