// Connected GATT operations against one peripheral.
//
// Backends implement `GattLink`. `GattSession` puts the transfer policy on
// top of it: MTU negotiation, writes split to the negotiated packet size, and
// notifications delivered on a bounded channel.

use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::gatt::{self, DEVICE_INFORMATION, GattService, SERIAL_NUMBER};
use super::platform::RawService;
use crate::error::CoreError;
use crate::options::DeveloperOptions;

/// MTU requested when large transfers are allowed.
pub const MAX_MTU: u16 = 244;
/// Largest write payload.
pub const MAX_PACKET: usize = 230;
/// Write payload that fits the default MTU of every peripheral.
pub const MIN_PACKET: usize = 18;
/// Headers carried by every packet on top of its payload.
const PACKET_OVERHEAD: usize = 14;

pub const NOTIFY_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("not connected")]
    NotConnected,

    #[error("connection to {address} failed: {reason}")]
    ConnectFailed { address: String, reason: String },

    #[error("characteristic {characteristic} of service {service} not found")]
    MissingCharacteristic { service: Uuid, characteristic: Uuid },

    #[error("GATT operation failed with status {0}")]
    Gatt(i32),
}

/// Host GATT client for a single peripheral.
pub trait GattLink: Send + Sync {
    /// Connect and run service discovery.
    fn connect(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Vec<RawService>, LinkError>> + Send;

    fn disconnect(&self) -> impl Future<Output = ()> + Send;

    /// Ask for `mtu`; resolves to what the peripheral accepted.
    fn request_mtu(&self, mtu: u16) -> impl Future<Output = Result<u16, LinkError>> + Send;

    fn read(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> impl Future<Output = Result<Vec<u8>, LinkError>> + Send;

    /// Write one packet and wait for the peripheral's acknowledgement.
    fn write(
        &self,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Start pushing every notified value into `values`.
    fn subscribe(
        &self,
        service: Uuid,
        characteristic: Uuid,
        values: mpsc::Sender<Vec<u8>>,
    ) -> impl Future<Output = Result<(), LinkError>> + Send;

    fn unsubscribe(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> impl Future<Output = Result<(), LinkError>> + Send;
}

/// Write payload available at a negotiated `mtu`.
pub fn packet_size_for(mtu: u16) -> usize {
    usize::from(mtu)
        .saturating_sub(PACKET_OVERHEAD)
        .clamp(MIN_PACKET, MAX_PACKET)
}

/// An open connection with its named services and packet size.
pub struct GattSession<L> {
    link: L,
    address: String,
    services: Vec<GattService>,
    packet_size: usize,
}

impl<L: GattLink> GattSession<L> {
    /// Connect to `address`, name its services and settle the packet size.
    ///
    /// The large MTU is requested unless developer options turn it off. A
    /// refused request falls back to the minimum packet.
    pub async fn connect(
        link: L,
        address: impl Into<String>,
        options: &DeveloperOptions,
    ) -> Result<Self, CoreError> {
        let address = address.into();
        let raw = link.connect(&address).await?;
        let services = gatt::catalog(&raw);

        let packet_size = if options.max_mtu_enabled() {
            match link.request_mtu(MAX_MTU).await {
                Ok(mtu) => {
                    debug!(%address, mtu, "MTU negotiated");
                    packet_size_for(mtu)
                }
                Err(e) => {
                    warn!(%address, "MTU request failed: {e}");
                    MIN_PACKET
                }
            }
        } else {
            MIN_PACKET
        };

        info!(%address, services = services.len(), packet_size, "GATT connected");
        Ok(Self {
            link,
            address,
            services,
            packet_size,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn services(&self) -> &[GattService] {
        &self.services
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    fn require(&self, service: Uuid, characteristic: Uuid) -> Result<(), LinkError> {
        let found = self
            .services
            .iter()
            .filter(|s| s.uuid == service)
            .flat_map(|s| &s.characteristics)
            .any(|c| c.uuid == characteristic);
        if found {
            Ok(())
        } else {
            Err(LinkError::MissingCharacteristic {
                service,
                characteristic,
            })
        }
    }

    pub async fn read(&self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, CoreError> {
        self.require(service, characteristic)?;
        Ok(self.link.read(service, characteristic).await?)
    }

    /// Endpoint name the peripheral publishes as its serial number.
    pub async fn read_endpoint(&self) -> Result<String, CoreError> {
        let raw = self.read(DEVICE_INFORMATION, SERIAL_NUMBER).await?;
        Ok(String::from_utf8_lossy(&raw)
            .trim_end_matches('\0')
            .to_owned())
    }

    /// Write `data` as consecutive packets of at most `packet_size` bytes,
    /// each acknowledged before the next. Returns the packet count.
    pub async fn write(
        &self,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<usize, CoreError> {
        self.require(service, characteristic)?;
        let mut sent = 0;
        for packet in data.chunks(self.packet_size) {
            self.link.write(service, characteristic, packet).await?;
            sent += 1;
        }
        debug!(address = %self.address, bytes = data.len(), packets = sent, "write complete");
        Ok(sent)
    }

    /// Notified values of one characteristic, until `unsubscribe` or disconnect.
    pub async fn subscribe(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<mpsc::Receiver<Vec<u8>>, CoreError> {
        self.require(service, characteristic)?;
        let (tx, rx) = mpsc::channel(NOTIFY_CAPACITY);
        self.link.subscribe(service, characteristic, tx).await?;
        Ok(rx)
    }

    pub async fn unsubscribe(&self, service: Uuid, characteristic: Uuid) -> Result<(), CoreError> {
        self.require(service, characteristic)?;
        Ok(self.link.unsubscribe(service, characteristic).await?)
    }

    pub async fn disconnect(self) {
        self.link.disconnect().await;
        debug!(address = %self.address, "GATT disconnected");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::{Arc, Mutex};

    use pdm_api::MemoryCredentialStore;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ble::gatt::{SDA_CHARACTERISTIC, SDA_SERVICE};
    use crate::ble::platform::RawCharacteristic;
    use crate::options::DeveloperFlag;

    #[derive(Default)]
    struct MockLink {
        accepted_mtu: Option<u16>,
        mtu_requests: Mutex<Vec<u16>>,
        writes: Mutex<Vec<Vec<u8>>>,
        subscriber: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
        disconnected: Mutex<bool>,
    }

    impl MockLink {
        fn accepting(mtu: u16) -> Arc<Self> {
            Arc::new(Self {
                accepted_mtu: Some(mtu),
                ..Self::default()
            })
        }
    }

    impl GattLink for Arc<MockLink> {
        async fn connect(&self, address: &str) -> Result<Vec<RawService>, LinkError> {
            if address.is_empty() {
                return Err(LinkError::ConnectFailed {
                    address: address.to_owned(),
                    reason: "no address".into(),
                });
            }
            Ok(vec![
                RawService {
                    uuid: DEVICE_INFORMATION,
                    handle: 1,
                    characteristics: vec![RawCharacteristic {
                        uuid: SERIAL_NUMBER,
                        handle: 2,
                    }],
                },
                RawService {
                    uuid: SDA_SERVICE,
                    handle: 10,
                    characteristics: vec![RawCharacteristic {
                        uuid: SDA_CHARACTERISTIC,
                        handle: 11,
                    }],
                },
            ])
        }

        async fn disconnect(&self) {
            *self.disconnected.lock().unwrap() = true;
        }

        async fn request_mtu(&self, mtu: u16) -> Result<u16, LinkError> {
            self.mtu_requests.lock().unwrap().push(mtu);
            self.accepted_mtu.ok_or(LinkError::Gatt(133))
        }

        async fn read(&self, _service: Uuid, characteristic: Uuid) -> Result<Vec<u8>, LinkError> {
            if characteristic == SERIAL_NUMBER {
                Ok(b"016f2c5e0000\0".to_vec())
            } else {
                Ok(Vec::new())
            }
        }

        async fn write(
            &self,
            _service: Uuid,
            _characteristic: Uuid,
            value: &[u8],
        ) -> Result<(), LinkError> {
            self.writes.lock().unwrap().push(value.to_vec());
            Ok(())
        }

        async fn subscribe(
            &self,
            _service: Uuid,
            _characteristic: Uuid,
            values: mpsc::Sender<Vec<u8>>,
        ) -> Result<(), LinkError> {
            *self.subscriber.lock().unwrap() = Some(values);
            Ok(())
        }

        async fn unsubscribe(&self, _service: Uuid, _characteristic: Uuid) -> Result<(), LinkError> {
            self.subscriber.lock().unwrap().take();
            Ok(())
        }
    }

    fn options() -> DeveloperOptions {
        DeveloperOptions::new(Arc::new(MemoryCredentialStore::new()))
    }

    #[test]
    fn packet_size_follows_mtu_within_bounds() {
        assert_eq!(packet_size_for(MAX_MTU), MAX_PACKET);
        assert_eq!(packet_size_for(100), 86);
        assert_eq!(packet_size_for(23), MIN_PACKET);
        assert_eq!(packet_size_for(517), MAX_PACKET);
    }

    #[tokio::test]
    async fn connect_negotiates_large_mtu() {
        let link = MockLink::accepting(MAX_MTU);
        let session = GattSession::connect(link.clone(), "AA:BB", &options()).await.unwrap();

        assert_eq!(*link.mtu_requests.lock().unwrap(), vec![MAX_MTU]);
        assert_eq!(session.packet_size(), MAX_PACKET);
        assert_eq!(session.services()[1].name, "Secure Device Access Service");
    }

    #[tokio::test]
    async fn max_mtu_flag_keeps_minimum_packets() {
        let options = options();
        options.set(DeveloperFlag::DeveloperMode, true).unwrap();
        options.set(DeveloperFlag::DisableMaxMtu, true).unwrap();
        let link = MockLink::accepting(MAX_MTU);

        let session = GattSession::connect(link.clone(), "AA:BB", &options).await.unwrap();

        assert!(link.mtu_requests.lock().unwrap().is_empty());
        assert_eq!(session.packet_size(), MIN_PACKET);
    }

    #[tokio::test]
    async fn refused_mtu_falls_back_to_minimum() {
        let link = Arc::new(MockLink::default());
        let session = GattSession::connect(link, "AA:BB", &options()).await.unwrap();
        assert_eq!(session.packet_size(), MIN_PACKET);
    }

    #[tokio::test]
    async fn failed_connect_is_a_link_error() {
        let err = GattSession::connect(MockLink::accepting(MAX_MTU), "", &options())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CoreError::BleLink(LinkError::ConnectFailed { .. })));
    }

    #[tokio::test]
    async fn writes_are_split_to_packet_size() {
        let link = MockLink::accepting(100);
        let session = GattSession::connect(link.clone(), "AA:BB", &options()).await.unwrap();
        let data: Vec<u8> = (0..200u8).collect();

        let packets = session
            .write(SDA_SERVICE, SDA_CHARACTERISTIC, &data)
            .await
            .unwrap();

        let writes = link.writes.lock().unwrap().clone();
        assert_eq!(packets, 3);
        assert_eq!(
            writes.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![86, 86, 28]
        );
        assert_eq!(writes.concat(), data);
    }

    #[tokio::test]
    async fn unknown_characteristic_is_refused_before_the_link() {
        let link = MockLink::accepting(MAX_MTU);
        let session = GattSession::connect(link.clone(), "AA:BB", &options()).await.unwrap();

        let err = session
            .write(SDA_SERVICE, SERIAL_NUMBER, b"x")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CoreError::BleLink(LinkError::MissingCharacteristic { .. })
        ));
        assert!(link.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn endpoint_is_read_from_serial_number() {
        let session = GattSession::connect(MockLink::accepting(MAX_MTU), "AA:BB", &options())
            .await
            .unwrap();
        assert_eq!(session.read_endpoint().await.unwrap(), "016f2c5e0000");
    }

    #[tokio::test]
    async fn notifications_flow_until_unsubscribed() {
        let link = MockLink::accepting(MAX_MTU);
        let session = GattSession::connect(link.clone(), "AA:BB", &options()).await.unwrap();

        let mut values = session
            .subscribe(SDA_SERVICE, SDA_CHARACTERISTIC)
            .await
            .unwrap();
        let pusher = link.subscriber.lock().unwrap().clone().unwrap();
        pusher.send(vec![1, 2]).await.unwrap();
        assert_eq!(values.recv().await, Some(vec![1, 2]));

        session
            .unsubscribe(SDA_SERVICE, SDA_CHARACTERISTIC)
            .await
            .unwrap();
        drop(pusher);
        assert_eq!(values.recv().await, None);

        session.disconnect().await;
        assert!(*link.disconnected.lock().unwrap());
    }
}
