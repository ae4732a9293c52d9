//! Lifecycle tasks.
//!
//! ## Default order
//!
//! ```text
//! init-before-start:
//!   ValidateConfig → ValidateNetwork → PrepareSocket → CreateLogFiles → SetupKernelArgs
//!
//! (hypervisor process launched, API socket awaited)
//!
//! init-after-start:
//!   BootstrapLogging → CreateMachine → CreateBootSource → AttachDrives
//!     → CreateNetworkInterfaces → StartVmm [→ LoadSnapshot]
//!
//! teardown:
//!   StopVmm → RemoveSocket
//! ```
//!
//! When a snapshot is configured the boot-configuration tasks and `StartVmm`
//! skip their requests; `LoadSnapshot` restores the VM instead. A jailed
//! machine adds `LinkJailerFiles` after `SetupKernelArgs`.

mod boot;
mod devices;
mod jailer;
mod kernel_args;
mod logging;
mod snapshot;
mod socket;
mod start_vmm;
mod teardown;
mod validate;

use super::types::MachineContext;

fn task_start(ctx: &MachineContext, task_name: &str) {
    tracing::debug!(vm_id = %ctx.vm_id, task = %task_name, "Executing task");
}

pub use boot::{CreateBootSourceTask, CreateMachineTask};
pub use devices::{AttachDrivesTask, CreateNetworkInterfacesTask};
pub use jailer::LinkJailerFilesTask;
pub use kernel_args::SetupKernelArgsTask;
pub use logging::{BootstrapLoggingTask, CreateLogFilesTask};
pub use snapshot::LoadSnapshotTask;
pub use socket::{PrepareSocketTask, RemoveSocketTask};
pub use start_vmm::StartVmmTask;
pub use teardown::StopVmmTask;
pub use validate::{ValidateConfigTask, ValidateNetworkTask};
