//! Type definitions for the lifecycle pipelines.

use crate::machine::config::MachineConfig;
use crate::vmm::{ProcessRunner, VmmClient};
use std::path::PathBuf;
use std::sync::Arc;

/// Shared state the lifecycle handlers act on.
///
/// Owned by the machine and lent exclusively to one handler list run at a
/// time.
pub struct MachineContext {
    pub vm_id: String,
    pub socket_path: PathBuf,
    pub config: MachineConfig,
    pub client: Arc<dyn VmmClient>,
    pub runner: Box<dyn ProcessRunner>,
}

impl MachineContext {
    pub fn new(
        vm_id: String,
        socket_path: PathBuf,
        config: MachineConfig,
        client: Arc<dyn VmmClient>,
        runner: Box<dyn ProcessRunner>,
    ) -> Self {
        Self {
            vm_id,
            socket_path,
            config,
            client,
            runner,
        }
    }

    /// Whether boot restores a snapshot instead of cold booting.
    pub fn restoring_snapshot(&self) -> bool {
        self.config.has_snapshot()
    }
}

impl std::fmt::Debug for MachineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineContext")
            .field("vm_id", &self.vm_id)
            .field("socket_path", &self.socket_path)
            .field("pid", &self.runner.pid())
            .finish()
    }
}
