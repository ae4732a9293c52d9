//! Control-plane client for a running hypervisor.
//!
//! The lifecycle handlers only talk to the hypervisor through [`VmmClient`],
//! so tests and alternative transports can swap the implementation in with
//! `MachineOpt::Client`.

mod socket;

pub use socket::SocketClient;

use crate::vmm::models::{
    ActionType, BootSource, Drive, LoggerConfig, MachineSpec, NetworkInterface,
    SnapshotCreateParams, SnapshotLoadParams, VmState,
};
use async_trait::async_trait;
use fclite_shared::errors::FcliteResult;

/// Operations the lifecycle issues against the hypervisor.
///
/// Every call reports success or failure on its own; callers never retry.
#[async_trait]
pub trait VmmClient: Send + Sync {
    async fn put_logger(&self, logger: &LoggerConfig) -> FcliteResult<()>;

    async fn put_machine_config(&self, spec: &MachineSpec) -> FcliteResult<()>;

    async fn put_boot_source(&self, boot_source: &BootSource) -> FcliteResult<()>;

    async fn put_drive(&self, drive: &Drive) -> FcliteResult<()>;

    async fn put_network_interface(&self, iface: &NetworkInterface) -> FcliteResult<()>;

    /// Issue a synchronous instance action (start, Ctrl+Alt+Del, metrics flush).
    async fn create_sync_action(&self, action: ActionType) -> FcliteResult<()>;

    async fn patch_vm_state(&self, state: VmState) -> FcliteResult<()>;

    async fn load_snapshot(&self, params: &SnapshotLoadParams) -> FcliteResult<()>;

    async fn create_snapshot(&self, params: &SnapshotCreateParams) -> FcliteResult<()>;
}
