//! Configuration combinators.
//!
//! A [`MachineOpt`] is applied to a machine before it starts, in the order
//! given. Each one either swaps a collaborator, changes configuration, or
//! splices handlers into a lifecycle list; later options see the effects of
//! earlier ones.

use super::Machine;
use super::config::LoadSnapshotOpt;
use super::init::{MachineHandler, Phase, Placement};
use crate::vmm::{CommandRunner, JailerConfig, ProcessRunner, SocketClient, VmmClient};
use fclite_shared::errors::FcliteResult;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Dispatch, Subscriber};

pub enum MachineOpt {
    /// Replace the control-plane client.
    Client(Arc<dyn VmmClient>),
    /// Run the machine's pipelines with this dispatcher as the default.
    Logger(Dispatch),
    /// Replace the process launcher.
    ProcessRunner(Box<dyn ProcessRunner>),
    /// Restore from a snapshot instead of cold booting.
    ///
    /// Adds `load_snapshot` right after `start_vmm`. Fails with
    /// `AnchorNotFound` if `start_vmm` is gone, leaving the configuration
    /// untouched.
    Snapshot {
        mem_file_path: PathBuf,
        snapshot_path: PathBuf,
        opts: Vec<LoadSnapshotOpt>,
    },
    /// Launch through the jailer.
    ///
    /// Points the socket, client and runner at the jail and adds
    /// `link_jailer_files` after `setup_kernel_args` so boot files are
    /// reachable from inside the chroot. Later `Client` or `ProcessRunner`
    /// options still take precedence.
    Jailer(JailerConfig),
    /// Accepted and ignored.
    RootFs,
    AddHandler {
        phase: Phase,
        placement: Placement,
        handler: MachineHandler,
    },
    RemoveHandler {
        phase: Phase,
        name: String,
    },
}

impl MachineOpt {
    pub fn client(client: impl VmmClient + 'static) -> Self {
        MachineOpt::Client(Arc::new(client))
    }

    pub fn logger<S>(subscriber: S) -> Self
    where
        S: Subscriber + Send + Sync + 'static,
    {
        MachineOpt::Logger(Dispatch::new(subscriber))
    }

    pub fn process_runner(runner: impl ProcessRunner + 'static) -> Self {
        MachineOpt::ProcessRunner(Box::new(runner))
    }

    pub fn snapshot(
        mem_file_path: impl Into<PathBuf>,
        snapshot_path: impl Into<PathBuf>,
        opts: Vec<LoadSnapshotOpt>,
    ) -> Self {
        MachineOpt::Snapshot {
            mem_file_path: mem_file_path.into(),
            snapshot_path: snapshot_path.into(),
            opts,
        }
    }

    pub fn jailer(jailer: JailerConfig) -> Self {
        MachineOpt::Jailer(jailer)
    }

    pub fn add_handler(phase: Phase, placement: Placement, handler: MachineHandler) -> Self {
        MachineOpt::AddHandler {
            phase,
            placement,
            handler,
        }
    }

    pub fn remove_handler(phase: Phase, name: impl Into<String>) -> Self {
        MachineOpt::RemoveHandler {
            phase,
            name: name.into(),
        }
    }

    pub(super) fn apply(self, machine: &mut Machine) -> FcliteResult<()> {
        match self {
            MachineOpt::Client(client) => {
                machine.ctx.client = client;
            }
            MachineOpt::Logger(dispatch) => {
                machine.logger = Some(dispatch);
            }
            MachineOpt::ProcessRunner(runner) => {
                machine.ctx.runner = runner;
            }
            MachineOpt::Snapshot {
                mem_file_path,
                snapshot_path,
                opts,
            } => {
                machine.handlers.add_snapshot_restore()?;
                let snapshot = &mut machine.ctx.config.snapshot;
                snapshot.mem_file_path = Some(mem_file_path);
                snapshot.snapshot_path = Some(snapshot_path);
                snapshot.opts = opts;
            }
            MachineOpt::Jailer(jailer) => {
                let firecracker_bin = machine.ctx.config.firecracker_bin.clone();
                let root = jailer.chroot_root(&firecracker_bin, &machine.id);
                machine
                    .handlers
                    .add_jailer_links(root, jailer.uid, jailer.gid)?;

                let socket_path = jailer.host_socket_path(&firecracker_bin, &machine.id);
                machine.ctx.client = Arc::new(SocketClient::new(&socket_path));
                machine.ctx.runner = Box::new(CommandRunner::jailer(
                    &jailer,
                    &firecracker_bin,
                    &machine.id,
                ));
                machine.ctx.socket_path = socket_path;
            }
            MachineOpt::RootFs => {}
            MachineOpt::AddHandler {
                phase,
                placement,
                handler,
            } => {
                machine.handlers.splice(phase, placement, handler)?;
            }
            MachineOpt::RemoveHandler { phase, name } => {
                machine.handlers.get_mut(phase).remove(&name)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MachineOpt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineOpt::Client(_) => f.write_str("Client"),
            MachineOpt::Logger(_) => f.write_str("Logger"),
            MachineOpt::ProcessRunner(_) => f.write_str("ProcessRunner"),
            MachineOpt::Snapshot {
                mem_file_path,
                snapshot_path,
                opts,
            } => f
                .debug_struct("Snapshot")
                .field("mem_file_path", mem_file_path)
                .field("snapshot_path", snapshot_path)
                .field("opts", opts)
                .finish(),
            MachineOpt::Jailer(jailer) => f.debug_tuple("Jailer").field(jailer).finish(),
            MachineOpt::RootFs => f.write_str("RootFs"),
            MachineOpt::AddHandler {
                phase,
                placement,
                handler,
            } => f
                .debug_struct("AddHandler")
                .field("phase", phase)
                .field("placement", placement)
                .field("handler", &handler.name())
                .finish(),
            MachineOpt::RemoveHandler { phase, name } => f
                .debug_struct("RemoveHandler")
                .field("phase", phase)
                .field("name", name)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::MachineConfig;
    use crate::machine::init::{MachineContext, names};
    use crate::pipeline::Handler;
    use fclite_shared::errors::FcliteError;
    use std::path::Path;

    fn machine(opts: Vec<MachineOpt>) -> FcliteResult<Machine> {
        Machine::new(MachineConfig::default(), opts)
    }

    #[test]
    fn test_snapshot_inserted_after_start_vmm() {
        let m = machine(vec![MachineOpt::snapshot("/snap/mem", "/snap/state", vec![])]).unwrap();
        let names = m.handlers().init_after_start.names();
        let start = names.iter().position(|n| *n == names::START_VMM).unwrap();
        assert_eq!(names[start + 1], names::LOAD_SNAPSHOT);
        assert!(m.config().has_snapshot());
    }

    #[test]
    fn test_snapshot_without_start_vmm_fails_cleanly() {
        let err = machine(vec![
            MachineOpt::remove_handler(Phase::InitAfterStart, names::START_VMM),
            MachineOpt::snapshot("/snap/mem", "/snap/state", vec![]),
        ])
        .unwrap_err();
        assert!(
            matches!(err, FcliteError::AnchorNotFound(ref n) if n == names::START_VMM)
        );

        let mut m = machine(vec![MachineOpt::remove_handler(
            Phase::InitAfterStart,
            names::START_VMM,
        )])
        .unwrap();
        assert!(
            m.apply(MachineOpt::snapshot("/snap/mem", "/snap/state", vec![]))
                .is_err()
        );
        assert!(!m.config().has_snapshot());
        assert!(!m.handlers().init_after_start.has(names::LOAD_SNAPSHOT));
    }

    #[test]
    fn test_options_apply_in_order() {
        let marker = || Handler::from_fn("marker", |_: &mut MachineContext| Ok(()));

        let m = machine(vec![
            MachineOpt::add_handler(
                Phase::InitBeforeStart,
                Placement::After(names::VALIDATE_CONFIG.into()),
                marker(),
            ),
            MachineOpt::remove_handler(Phase::InitBeforeStart, "marker"),
        ])
        .unwrap();
        assert!(!m.handlers().init_before_start.has("marker"));

        let err = machine(vec![
            MachineOpt::remove_handler(Phase::InitBeforeStart, "marker"),
            MachineOpt::add_handler(Phase::InitBeforeStart, Placement::Back, marker()),
        ])
        .unwrap_err();
        assert!(matches!(err, FcliteError::AnchorNotFound(_)));
    }

    #[test]
    fn test_duplicate_handler_rejected() {
        let err = machine(vec![MachineOpt::add_handler(
            Phase::Teardown,
            Placement::Front,
            Handler::from_fn(names::STOP_VMM, |_: &mut MachineContext| Ok(())),
        )])
        .unwrap_err();
        assert!(
            matches!(err, FcliteError::DuplicateName(ref n) if n == names::STOP_VMM)
        );
    }

    #[test]
    fn test_jailer_moves_socket_and_links_files() {
        let mut jailer = JailerConfig::new("/usr/bin/jailer", 1000, 1000);
        jailer.chroot_base_dir = PathBuf::from("/srv/jail");
        let config = MachineConfig {
            vm_id: Some("vm1".into()),
            firecracker_bin: PathBuf::from("/usr/bin/firecracker"),
            ..MachineConfig::default()
        };
        let m = Machine::new(config, vec![MachineOpt::jailer(jailer)]).unwrap();

        assert_eq!(
            m.socket_path(),
            Path::new("/srv/jail/firecracker/vm1/root/run/firecracker.socket")
        );
        let names = m.handlers().init_before_start.names();
        let kernel_args = names
            .iter()
            .position(|n| *n == names::SETUP_KERNEL_ARGS)
            .unwrap();
        assert_eq!(names[kernel_args + 1], names::LINK_JAILER_FILES);
    }

    #[test]
    fn test_root_fs_changes_nothing() {
        let plain = machine(vec![]).unwrap();
        let with_rootfs = machine(vec![MachineOpt::RootFs]).unwrap();
        for phase in Phase::ALL {
            assert_eq!(
                plain.handlers().get(phase).names(),
                with_rootfs.handlers().get(phase).names()
            );
        }
        assert_eq!(plain.config().kernel_args, with_rootfs.config().kernel_args);
    }

    #[test]
    fn test_debug_names_variant() {
        let opt = MachineOpt::remove_handler(Phase::Teardown, "x");
        assert!(format!("{:?}", opt).contains("RemoveHandler"));
    }
}
