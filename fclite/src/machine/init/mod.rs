//! Lifecycle pipelines.
//!
//! ## Architecture
//!
//! A machine owns three handler lists, one per phase:
//!
//! ```text
//! init-before-start   host-side preparation, no hypervisor yet
//!        │
//!   (launch process, wait for API socket)
//!        │
//! init-after-start    configure through the API and boot (or restore)
//!        │
//! teardown            best effort, on failure or stop
//! ```
//!
//! Lists are built fresh for every machine by [`LifecycleHandlers::new`] and
//! may be edited by name until the machine starts.

mod tasks;
mod types;

pub use types::MachineContext;

use crate::pipeline::{Handler, HandlerList};
use fclite_shared::errors::{FcliteError, FcliteResult};
use std::path::PathBuf;
use std::str::FromStr;

use tasks::{
    AttachDrivesTask, BootstrapLoggingTask, CreateBootSourceTask, CreateLogFilesTask,
    CreateMachineTask, CreateNetworkInterfacesTask, LinkJailerFilesTask, LoadSnapshotTask,
    PrepareSocketTask, RemoveSocketTask, SetupKernelArgsTask, StartVmmTask, StopVmmTask,
    ValidateConfigTask, ValidateNetworkTask,
};

/// Names of the built-in handlers, usable as anchors.
pub mod names {
    pub const VALIDATE_CONFIG: &str = "validate_config";
    pub const VALIDATE_NETWORK: &str = "validate_network";
    pub const PREPARE_SOCKET: &str = "prepare_socket";
    pub const CREATE_LOG_FILES: &str = "create_log_files";
    pub const SETUP_KERNEL_ARGS: &str = "setup_kernel_args";
    /// Added by the jailer combinator.
    pub const LINK_JAILER_FILES: &str = "link_jailer_files";

    pub const BOOTSTRAP_LOGGING: &str = "bootstrap_logging";
    pub const CREATE_MACHINE: &str = "create_machine";
    pub const CREATE_BOOT_SOURCE: &str = "create_boot_source";
    pub const ATTACH_DRIVES: &str = "attach_drives";
    pub const CREATE_NETWORK_INTERFACES: &str = "create_network_interfaces";
    pub const START_VMM: &str = "start_vmm";
    /// Added by the snapshot combinator.
    pub const LOAD_SNAPSHOT: &str = "load_snapshot";

    pub const STOP_VMM: &str = "stop_vmm";
    pub const REMOVE_SOCKET: &str = "remove_socket";
}

/// Handler list over the machine context.
pub type MachineHandlers = HandlerList<MachineContext>;

/// Handler over the machine context.
pub type MachineHandler = Handler<MachineContext>;

// ============================================================================
// PHASES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    InitBeforeStart,
    InitAfterStart,
    Teardown,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::InitBeforeStart, Phase::InitAfterStart, Phase::Teardown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::InitBeforeStart => "init-before-start",
            Phase::InitAfterStart => "init-after-start",
            Phase::Teardown => "teardown",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = FcliteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| FcliteError::Config(format!("unknown lifecycle phase: {}", s)))
    }
}

/// Where a spliced handler goes in its list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Front,
    Back,
    Before(String),
    After(String),
}

// ============================================================================
// LIFECYCLE HANDLERS
// ============================================================================

/// The three phase lists of one machine.
#[derive(Debug)]
pub struct LifecycleHandlers {
    pub init_before_start: MachineHandlers,
    pub init_after_start: MachineHandlers,
    pub teardown: MachineHandlers,
}

impl LifecycleHandlers {
    /// Default lists for a cold boot.
    pub fn new() -> FcliteResult<Self> {
        let init_before_start = HandlerList::from_handlers([
            Handler::new(names::VALIDATE_CONFIG, ValidateConfigTask),
            Handler::new(names::VALIDATE_NETWORK, ValidateNetworkTask),
            Handler::new(names::PREPARE_SOCKET, PrepareSocketTask),
            Handler::new(names::CREATE_LOG_FILES, CreateLogFilesTask),
            Handler::new(names::SETUP_KERNEL_ARGS, SetupKernelArgsTask),
        ])?;

        let init_after_start = HandlerList::from_handlers([
            Handler::new(names::BOOTSTRAP_LOGGING, BootstrapLoggingTask),
            Handler::new(names::CREATE_MACHINE, CreateMachineTask),
            Handler::new(names::CREATE_BOOT_SOURCE, CreateBootSourceTask),
            Handler::new(names::ATTACH_DRIVES, AttachDrivesTask),
            Handler::new(names::CREATE_NETWORK_INTERFACES, CreateNetworkInterfacesTask),
            Handler::new(names::START_VMM, StartVmmTask),
        ])?;

        let teardown = HandlerList::from_handlers([
            Handler::new(names::STOP_VMM, StopVmmTask),
            Handler::new(names::REMOVE_SOCKET, RemoveSocketTask),
        ])?;

        Ok(Self {
            init_before_start,
            init_after_start,
            teardown,
        })
    }

    /// Lists with no handlers at all.
    pub fn empty() -> Self {
        Self {
            init_before_start: HandlerList::new(),
            init_after_start: HandlerList::new(),
            teardown: HandlerList::new(),
        }
    }

    pub fn get(&self, phase: Phase) -> &MachineHandlers {
        match phase {
            Phase::InitBeforeStart => &self.init_before_start,
            Phase::InitAfterStart => &self.init_after_start,
            Phase::Teardown => &self.teardown,
        }
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut MachineHandlers {
        match phase {
            Phase::InitBeforeStart => &mut self.init_before_start,
            Phase::InitAfterStart => &mut self.init_after_start,
            Phase::Teardown => &mut self.teardown,
        }
    }

    /// Insert `handler` into the `phase` list at `placement`.
    pub fn splice(
        &mut self,
        phase: Phase,
        placement: Placement,
        handler: MachineHandler,
    ) -> FcliteResult<()> {
        let list = self.get_mut(phase);
        match placement {
            Placement::Front => list.prepend(handler),
            Placement::Back => list.append(handler),
            Placement::Before(anchor) => list.insert_before(&anchor, handler),
            Placement::After(anchor) => list.insert_after(&anchor, handler),
        }
    }

    /// Place the snapshot restore right after `start_vmm`.
    pub(crate) fn add_snapshot_restore(&mut self) -> FcliteResult<()> {
        self.init_after_start.insert_after(
            names::START_VMM,
            Handler::new(names::LOAD_SNAPSHOT, LoadSnapshotTask),
        )
    }

    /// Insert `link_jailer_files` after `setup_kernel_args`.
    pub(crate) fn add_jailer_links(
        &mut self,
        root: PathBuf,
        uid: u32,
        gid: u32,
    ) -> FcliteResult<()> {
        self.init_before_start.insert_after(
            names::SETUP_KERNEL_ARGS,
            Handler::new(
                names::LINK_JAILER_FILES,
                LinkJailerFilesTask::new(root, uid, gid),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order() {
        let handlers = LifecycleHandlers::new().unwrap();
        assert_eq!(
            handlers.init_before_start.names(),
            vec![
                "validate_config",
                "validate_network",
                "prepare_socket",
                "create_log_files",
                "setup_kernel_args"
            ]
        );
        assert_eq!(
            handlers.init_after_start.names(),
            vec![
                "bootstrap_logging",
                "create_machine",
                "create_boot_source",
                "attach_drives",
                "create_network_interfaces",
                "start_vmm"
            ]
        );
        assert_eq!(handlers.teardown.names(), vec!["stop_vmm", "remove_socket"]);
    }

    #[test]
    fn test_each_machine_gets_fresh_lists() {
        let mut first = LifecycleHandlers::new().unwrap();
        first.init_after_start.remove(names::START_VMM).unwrap();

        let second = LifecycleHandlers::new().unwrap();
        assert!(second.init_after_start.has(names::START_VMM));
    }

    #[test]
    fn test_phase_parse_and_display() {
        for phase in Phase::ALL {
            assert_eq!(phase.to_string().parse::<Phase>().unwrap(), phase);
        }
        assert_eq!("teardown".parse::<Phase>().unwrap(), Phase::Teardown);
        assert!("init".parse::<Phase>().is_err());
    }

    #[test]
    fn test_splice_placements() {
        let mut handlers = LifecycleHandlers::empty();
        let noop = |name: &str| Handler::from_fn(name, |_: &mut MachineContext| Ok(()));

        handlers
            .splice(Phase::Teardown, Placement::Back, noop("b"))
            .unwrap();
        handlers
            .splice(Phase::Teardown, Placement::Front, noop("a"))
            .unwrap();
        handlers
            .splice(Phase::Teardown, Placement::After("b".into()), noop("d"))
            .unwrap();
        handlers
            .splice(Phase::Teardown, Placement::Before("d".into()), noop("c"))
            .unwrap();
        assert_eq!(handlers.teardown.names(), vec!["a", "b", "c", "d"]);
        assert!(handlers.get(Phase::InitBeforeStart).is_empty());

        let err = handlers
            .splice(Phase::Teardown, Placement::After("zz".into()), noop("e"))
            .unwrap_err();
        assert!(
            matches!(err, FcliteError::AnchorNotFound(name) if name == "zz")
        );
    }

    #[test]
    fn test_snapshot_restore_follows_start_vmm() {
        let mut handlers = LifecycleHandlers::new().unwrap();
        handlers.add_snapshot_restore().unwrap();
        let names = handlers.init_after_start.names();
        assert_eq!(names.last(), Some(&"load_snapshot"));
        assert!(handlers.add_snapshot_restore().is_err());
    }

    #[test]
    fn test_jailer_links_follow_kernel_args() {
        let mut handlers = LifecycleHandlers::new().unwrap();
        handlers
            .add_jailer_links(PathBuf::from("/jail/root"), 1000, 1000)
            .unwrap();
        let names = handlers.init_before_start.names();
        assert_eq!(
            &names[names.len() - 2..],
            ["setup_kernel_args", "link_jailer_files"]
        );

        let mut handlers = LifecycleHandlers::empty();
        let root = PathBuf::from("/jail/root");
        assert!(handlers.add_jailer_links(root, 0, 0).is_err());
    }
}
