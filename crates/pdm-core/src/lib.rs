// pdm-core: Orchestration over the cloud client and the BLE platform boundary

pub mod ble;
pub mod error;
pub mod load_state;
pub mod options;
pub mod paging;
pub mod reauth;
pub mod sync;

pub use error::CoreError;
pub use load_state::LoadState;
pub use options::{DeveloperFlag, DeveloperOptions};
pub use paging::{
    AllWorkflows, AssignedWorkflows, AssumeOnline, Connectivity, NETWORK_PAGE_SIZE, PageOutcome,
    WorkflowPageSource, WorkflowPager,
};
pub use reauth::{ReauthOutcome, reauthenticate};
pub use sync::{
    AssetOutcome, AssetReport, SdaOutcome, SyncOutcome, SyncReport, WorkflowReport, WorkflowSyncer,
};
