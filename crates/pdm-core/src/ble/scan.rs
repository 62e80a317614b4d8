// BLE scan lifecycle.
//
// The platform pushes raw callbacks into a bounded channel. One spawned task
// per scan drains it in arrival order and is the only owner of the device
// registry while the scan runs; the registry comes back through the task's
// JoinHandle once the scan has ended.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::device::{BleDevice, DeviceRegistry, Sighting};
use super::platform::{
    BlePlatform, BleUnavailableReason, RawService, ScanEvent, ScanFailureCode, ScanFilters,
};
use crate::error::CoreError;

/// Scan length used when the caller has no preference.
pub const DEFAULT_SCAN_PERIOD: Duration = Duration::from_millis(2000);

const EVENT_CAPACITY: usize = 256;
const UPDATE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ScanState {
    Idle,
    Scanning,
    Stopped,
    Expired,
    Failed(ScanFailureCode),
}

impl ScanState {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Stopped | Self::Expired | Self::Failed(_))
    }
}

/// What a running scan reports to its consumer, in hardware order.
#[derive(Debug, Clone)]
pub enum ScanUpdate {
    Discovered(BleDevice),
    Updated(BleDevice),
    /// Devices sighted since the previous batch, in discovery order.
    Batch(Vec<BleDevice>),
    ServicesDiscovered(BleDevice),
    Failed(ScanFailureCode),
    /// Always the last update of a scan.
    Finished {
        state: ScanState,
        devices: Vec<BleDevice>,
    },
}

struct ActiveScan {
    stop: CancellationToken,
    task: JoinHandle<DeviceRegistry>,
}

/// Owns one BLE discovery lifecycle at a time.
pub struct ScanSession<P: BlePlatform> {
    platform: Arc<P>,
    state: Arc<watch::Sender<ScanState>>,
    active: Option<ActiveScan>,
    registry: DeviceRegistry,
}

impl<P: BlePlatform> ScanSession<P> {
    pub fn new(platform: Arc<P>) -> Self {
        let (state, _) = watch::channel(ScanState::Idle);
        Self {
            platform,
            state: Arc::new(state),
            active: None,
            registry: DeviceRegistry::new(),
        }
    }

    pub fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ScanState> {
        self.state.subscribe()
    }

    /// Refuse early when the host cannot scan at all. The checks run in a
    /// fixed order and stop at the first failure, so an emulator never has
    /// its adapter queried.
    pub fn check_preconditions(&self) -> Result<(), BleUnavailableReason> {
        if self.platform.is_emulator() {
            return Err(BleUnavailableReason::Emulator);
        }
        if !self.platform.is_adapter_enabled() {
            return Err(BleUnavailableReason::AdapterDisabled);
        }
        if !self.platform.supports_ble() {
            return Err(BleUnavailableReason::Unsupported);
        }
        Ok(())
    }

    /// Clear the registry and start scanning for `period`.
    ///
    /// Returns the stream of updates for this scan. It ends with a
    /// [`ScanUpdate::Finished`] carrying the final device list.
    pub fn start(
        &mut self,
        period: Duration,
        filters: &ScanFilters,
    ) -> Result<mpsc::Receiver<ScanUpdate>, CoreError> {
        if self.active.as_ref().is_some_and(|a| !a.task.is_finished()) {
            return Err(CoreError::BleScanFailure(ScanFailureCode::AlreadyStarted));
        }
        self.check_preconditions()
            .map_err(CoreError::BleUnavailable)?;

        self.active = None;
        self.registry.clear();

        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        if let Err(code) = self.platform.start_scan(filters, events_tx) {
            warn!(code = code.code(), "scan refused: {code}");
            self.state.send_replace(ScanState::Failed(code));
            return Err(CoreError::BleScanFailure(code));
        }

        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_CAPACITY);
        let stop = CancellationToken::new();
        self.state.send_replace(ScanState::Scanning);
        info!(?period, "BLE scan started");

        let task = tokio::spawn(run_scan(ScanTask {
            platform: Arc::clone(&self.platform),
            state: Arc::clone(&self.state),
            events: events_rx,
            updates: updates_tx,
            stop: stop.clone(),
            deadline: Instant::now() + period,
        }));
        self.active = Some(ActiveScan { stop, task });
        Ok(updates_rx)
    }

    /// Stop the scan now and return the final device list. A scan that has
    /// already ended keeps its terminal state.
    pub async fn stop(&mut self) -> Vec<BleDevice> {
        if let Some(active) = &self.active {
            active.stop.cancel();
        }
        self.reclaim().await
    }

    /// Wait for the scan to end on its own (expiry or failure).
    pub async fn wait(&mut self) -> Vec<BleDevice> {
        self.reclaim().await
    }

    async fn reclaim(&mut self) -> Vec<BleDevice> {
        if let Some(active) = self.active.take() {
            match active.task.await {
                Ok(registry) => self.registry = registry,
                Err(e) => warn!("scan task ended abnormally: {e}"),
            }
        }
        self.registry.snapshot()
    }

    /// Devices from the most recent finished scan.
    pub fn devices(&self) -> Vec<BleDevice> {
        self.registry.snapshot()
    }

    /// Attach discovered GATT services to a device from the last scan.
    /// While a scan runs the platform reports discovery through the event
    /// channel instead; this returns `None` then, and for unknown addresses.
    pub fn record_services(&mut self, address: &str, raw: &[RawService]) -> Option<&BleDevice> {
        if self.active.is_some() {
            return None;
        }
        if self.registry.record_services(address, raw) {
            self.registry.get(address)
        } else {
            None
        }
    }

    /// Abandon any scan and forget every device. The scan task has fully
    /// ended before `Idle` is published.
    pub async fn reset(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.cancel();
            if let Err(e) = active.task.await {
                warn!("scan task ended abnormally: {e}");
            }
        }
        self.registry.clear();
        self.state.send_replace(ScanState::Idle);
    }
}

impl<P: BlePlatform> Drop for ScanSession<P> {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.stop.cancel();
        }
    }
}

// ── Scan task ────────────────────────────────────────────────────────

struct ScanTask<P> {
    platform: Arc<P>,
    state: Arc<watch::Sender<ScanState>>,
    events: mpsc::Receiver<ScanEvent>,
    updates: mpsc::Sender<ScanUpdate>,
    stop: CancellationToken,
    deadline: Instant,
}

async fn run_scan<P: BlePlatform>(mut task: ScanTask<P>) -> DeviceRegistry {
    let mut registry = DeviceRegistry::new();

    let end = loop {
        tokio::select! {
            biased;
            () = task.stop.cancelled() => break ScanState::Stopped,
            () = sleep_until(task.deadline) => break ScanState::Expired,
            event = task.events.recv() => {
                let Some(event) = event else {
                    break ScanState::Stopped;
                };
                let Some(update) = apply(&mut registry, event) else {
                    continue;
                };
                let failed = match &update {
                    ScanUpdate::Failed(code) => Some(*code),
                    _ => None,
                };
                // A consumer that stops reading must not hold up stop or expiry.
                tokio::select! {
                    biased;
                    () = task.stop.cancelled() => break ScanState::Stopped,
                    () = sleep_until(task.deadline) => break ScanState::Expired,
                    _ = task.updates.send(update) => {}
                }
                if let Some(code) = failed {
                    break ScanState::Failed(code);
                }
            }
        }
    };

    task.platform.stop_scan();
    // Late callbacks must not reach the registry after the flush below.
    task.events.close();

    task.state.send_replace(end);
    debug!(state = %end, devices = registry.len(), "BLE scan finished");
    let finished = ScanUpdate::Finished {
        state: end,
        devices: registry.snapshot(),
    };
    if task.updates.try_send(finished).is_err() {
        debug!("final scan update not delivered, consumer is behind or gone");
    }
    registry
}

fn apply(registry: &mut DeviceRegistry, event: ScanEvent) -> Option<ScanUpdate> {
    match event {
        ScanEvent::Advertisement(adv) => {
            let sighting = registry.observe(&adv);
            let device = registry.get(&adv.address)?.clone();
            Some(match sighting {
                Sighting::New => ScanUpdate::Discovered(device),
                Sighting::Updated => ScanUpdate::Updated(device),
            })
        }
        ScanEvent::Batch(advertisements) => {
            for adv in &advertisements {
                registry.observe(adv);
            }
            Some(ScanUpdate::Batch(registry.drain_pending()))
        }
        ScanEvent::ServicesDiscovered { address, services } => {
            if registry.record_services(&address, &services) {
                registry
                    .get(&address)
                    .cloned()
                    .map(ScanUpdate::ServicesDiscovered)
            } else {
                debug!(%address, "services for unknown device ignored");
                None
            }
        }
        ScanEvent::Failed(code) => {
            warn!(code = code.code(), "scan failed: {code}");
            Some(ScanUpdate::Failed(code))
        }
    }
}
