// pdm-api: Async Rust client for the Pelion Device Management cloud API

pub mod client;
pub mod endpoints;
pub mod error;
pub mod models;
pub mod repository;
pub mod session;
pub mod transport;

pub use client::{AssetDownload, CloudClient};
pub use endpoints::CloudEnvironment;
pub use error::Error;
pub use repository::CloudRepository;
pub use session::{CredentialStore, MemoryCredentialStore, SessionContext, keys};
pub use transport::TransportConfig;
