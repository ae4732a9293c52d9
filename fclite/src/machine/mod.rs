//! Machine: a hypervisor process driven through the lifecycle pipelines.

mod config;
mod init;
mod lifecycle;
mod metrics;
mod opts;
mod state;

pub use config::{DEFAULT_SOCKET_TIMEOUT_MS, LoadSnapshotOpt, MachineConfig, SnapshotConfig};
pub use init::{
    LifecycleHandlers, MachineContext, MachineHandler, MachineHandlers, Phase, Placement, names,
};
pub use metrics::BootMetrics;
pub use opts::MachineOpt;
pub use state::MachineState;

use crate::vmm::models::VmState;
use crate::vmm::{CommandRunner, SocketClient};
use fclite_shared::errors::{FcliteError, FcliteResult};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use tracing::Dispatch;

/// A single microVM.
///
/// Built with [`Machine::new`], which applies the given options in order.
/// The lifecycle lists can be edited by name until [`Machine::start`].
///
/// # Example
///
/// ```ignore
/// let mut machine = Machine::new(config, vec![
///     MachineOpt::snapshot("/snap/mem", "/snap/state", vec![]),
/// ])?;
/// machine.start().await?;
/// machine.wait().await?;
/// ```
pub struct Machine {
    id: String,
    ctx: MachineContext,
    handlers: LifecycleHandlers,
    state: MachineState,
    logger: Option<Dispatch>,
    boot_metrics: Option<BootMetrics>,
}

impl Machine {
    /// Create a machine with the default client, runner and handler lists,
    /// then apply `opts` in order.
    pub fn new(
        config: MachineConfig,
        opts: impl IntoIterator<Item = MachineOpt>,
    ) -> FcliteResult<Self> {
        let id = config
            .vm_id
            .clone()
            .unwrap_or_else(|| ulid::Ulid::new().to_string());
        let socket_path = config
            .socket_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(format!("fclite-{}.sock", id)));

        let client = Arc::new(SocketClient::new(&socket_path));
        let runner = Box::new(CommandRunner::firecracker(
            &config.firecracker_bin,
            &socket_path,
            &id,
        ));
        let ctx = MachineContext::new(id.clone(), socket_path, config, client, runner);

        let mut machine = Self {
            id,
            ctx,
            handlers: LifecycleHandlers::new()?,
            state: MachineState::Unconfigured,
            logger: None,
            boot_metrics: None,
        };

        for opt in opts {
            tracing::trace!(vm_id = %machine.id, opt = ?opt, "Applying option");
            opt.apply(&mut machine)?;
        }
        machine.state = MachineState::Configured;

        tracing::debug!(vm_id = %machine.id, socket = %machine.ctx.socket_path.display(), "Machine configured");
        Ok(machine)
    }

    /// Apply one more option before start.
    pub fn apply(&mut self, opt: MachineOpt) -> FcliteResult<()> {
        self.ensure_configurable()?;
        opt.apply(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn config(&self) -> &MachineConfig {
        &self.ctx.config
    }

    pub fn socket_path(&self) -> &Path {
        &self.ctx.socket_path
    }

    /// PID of the hypervisor process, once launched.
    pub fn pid(&self) -> Option<u32> {
        self.ctx.runner.pid()
    }

    /// Timings of the last successful boot.
    pub fn boot_metrics(&self) -> Option<&BootMetrics> {
        self.boot_metrics.as_ref()
    }

    pub fn handlers(&self) -> &LifecycleHandlers {
        &self.handlers
    }

    /// Edit the lifecycle lists directly. Only allowed before start.
    pub fn handlers_mut(&mut self) -> FcliteResult<&mut LifecycleHandlers> {
        self.ensure_configurable()?;
        Ok(&mut self.handlers)
    }

    /// Run init-before-start, launch the hypervisor, then run
    /// init-after-start.
    ///
    /// On failure the teardown list runs and the boot error is returned;
    /// the machine ends up `Terminated`.
    pub async fn start(&mut self) -> FcliteResult<()> {
        lifecycle::start(self).await
    }

    /// Tear down a running machine. Returns the first teardown failure.
    pub async fn stop(&mut self) -> FcliteResult<()> {
        lifecycle::stop(self).await
    }

    /// Wait for the hypervisor to exit, then tear down.
    pub async fn wait(&mut self) -> FcliteResult<ExitStatus> {
        lifecycle::wait(self).await
    }

    /// Send Ctrl+Alt+Del to the guest.
    pub async fn shutdown(&mut self) -> FcliteResult<()> {
        lifecycle::shutdown(self).await
    }

    pub async fn pause(&mut self) -> FcliteResult<()> {
        lifecycle::set_vm_state(self, VmState::Paused).await
    }

    pub async fn resume(&mut self) -> FcliteResult<()> {
        lifecycle::set_vm_state(self, VmState::Resumed).await
    }

    /// Snapshot a paused machine to the given files.
    pub async fn create_snapshot(
        &mut self,
        mem_file_path: impl Into<PathBuf>,
        snapshot_path: impl Into<PathBuf>,
    ) -> FcliteResult<()> {
        lifecycle::create_snapshot(self, mem_file_path.into(), snapshot_path.into()).await
    }

    fn ensure_configurable(&self) -> FcliteResult<()> {
        if self.state.can_configure() {
            return Ok(());
        }
        Err(FcliteError::InvalidState(format!(
            "machine {} can no longer be configured in {} state",
            self.id, self.state
        )))
    }
}

impl Drop for Machine {
    fn drop(&mut self) {
        lifecycle::drop_handler(self);
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("ctx", &self.ctx)
            .field("handlers", &self.handlers)
            .finish()
    }
}

const _: () = {
    const fn assert_send<T: Send>() {}
    let _ = assert_send::<Machine>;
};
