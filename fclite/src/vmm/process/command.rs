//! Subprocess runner for the hypervisor binary.

use super::ProcessRunner;
use async_trait::async_trait;
use fclite_shared::errors::{FcliteError, FcliteResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// Socket path handed to the hypervisor when it runs inside a jail.
const JAILED_SOCKET_PATH: &str = "/run/firecracker.socket";

/// Jailer invocation settings.
#[derive(Debug, Clone)]
pub struct JailerConfig {
    pub jailer_bin: PathBuf,
    pub uid: u32,
    pub gid: u32,
    pub chroot_base_dir: PathBuf,
}

impl JailerConfig {
    pub fn new(jailer_bin: impl Into<PathBuf>, uid: u32, gid: u32) -> Self {
        Self {
            jailer_bin: jailer_bin.into(),
            uid,
            gid,
            chroot_base_dir: PathBuf::from("/srv/jailer"),
        }
    }

    /// Host-side directory the jailer chroots into:
    /// `<chroot_base_dir>/<exec file name>/<vm_id>/root`.
    pub fn chroot_root(&self, firecracker_bin: &Path, vm_id: &str) -> PathBuf {
        let exec_name = firecracker_bin
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("firecracker"));
        self.chroot_base_dir
            .join(exec_name)
            .join(vm_id)
            .join("root")
    }

    /// Host-side path of the API socket created inside the jail.
    pub fn host_socket_path(&self, firecracker_bin: &Path, vm_id: &str) -> PathBuf {
        self.chroot_root(firecracker_bin, vm_id)
            .join(JAILED_SOCKET_PATH.trim_start_matches('/'))
    }
}

/// Default [`ProcessRunner`] backed by `tokio::process`.
///
/// The child is killed if the runner is dropped while it is still running.
#[derive(Debug)]
pub struct CommandRunner {
    program: PathBuf,
    args: Vec<OsString>,
    child: Option<Child>,
    pid: Option<u32>,
}

impl CommandRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            child: None,
            pid: None,
        }
    }

    /// Run the hypervisor directly, serving its API on `socket_path`.
    pub fn firecracker(firecracker_bin: &Path, socket_path: &Path, vm_id: &str) -> Self {
        Self::new(firecracker_bin)
            .arg("--api-sock")
            .arg(socket_path)
            .arg("--id")
            .arg(vm_id)
    }

    /// Run the hypervisor through the jailer.
    ///
    /// The machine's socket path must be set to
    /// [`JailerConfig::host_socket_path`] for the same binary and id.
    pub fn jailer(jailer: &JailerConfig, firecracker_bin: &Path, vm_id: &str) -> Self {
        Self::new(&jailer.jailer_bin)
            .arg("--id")
            .arg(vm_id)
            .arg("--exec-file")
            .arg(firecracker_bin)
            .arg("--uid")
            .arg(jailer.uid.to_string())
            .arg("--gid")
            .arg(jailer.gid.to_string())
            .arg("--chroot-base-dir")
            .arg(&jailer.chroot_base_dir)
            .arg("--")
            .arg("--api-sock")
            .arg(JAILED_SOCKET_PATH)
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    fn child_mut(&mut self) -> FcliteResult<&mut Child> {
        self.child
            .as_mut()
            .ok_or_else(|| FcliteError::InvalidState("process not started".into()))
    }
}

#[async_trait]
impl ProcessRunner for CommandRunner {
    async fn start(&mut self) -> FcliteResult<u32> {
        if self.child.is_some() {
            return Err(FcliteError::InvalidState("process already started".into()));
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null()).kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            let err_msg = format!("Failed to spawn {}: {}", self.program.display(), e);
            tracing::error!("{}", err_msg);
            FcliteError::Process(err_msg)
        })?;

        let pid = child
            .id()
            .ok_or_else(|| FcliteError::Process("spawned process has no PID".into()))?;

        tracing::debug!(pid, program = %self.program.display(), "Spawned hypervisor process");

        self.child = Some(child);
        self.pid = Some(pid);
        Ok(pid)
    }

    async fn wait(&mut self) -> FcliteResult<ExitStatus> {
        let status = self.child_mut()?.wait().await?;
        Ok(status)
    }

    fn try_wait(&mut self) -> FcliteResult<Option<ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait()?),
            None => Ok(None),
        }
    }

    fn kill(&mut self) -> FcliteResult<()> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        match child.start_kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(FcliteError::Process(format!(
                "Failed to kill process {:?}: {}",
                self.pid, e
            ))),
        }
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firecracker_args() {
        let runner = CommandRunner::firecracker(
            Path::new("/usr/bin/firecracker"),
            Path::new("/tmp/vm.sock"),
            "vm1",
        );
        assert_eq!(runner.program(), Path::new("/usr/bin/firecracker"));
        assert_eq!(runner.args(), ["--api-sock", "/tmp/vm.sock", "--id", "vm1"]);
    }

    #[test]
    fn test_jailer_args_and_socket() {
        let mut jailer = JailerConfig::new("/usr/bin/jailer", 123, 100);
        jailer.chroot_base_dir = PathBuf::from("/jail");
        let fc = Path::new("/usr/bin/firecracker");

        let runner = CommandRunner::jailer(&jailer, fc, "vm1");
        assert_eq!(runner.program(), Path::new("/usr/bin/jailer"));
        let args: Vec<_> = runner.args().iter().map(|a| a.to_string_lossy()).collect();
        assert_eq!(
            args,
            [
                "--id",
                "vm1",
                "--exec-file",
                "/usr/bin/firecracker",
                "--uid",
                "123",
                "--gid",
                "100",
                "--chroot-base-dir",
                "/jail",
                "--",
                "--api-sock",
                "/run/firecracker.socket",
            ]
        );
        assert_eq!(
            jailer.chroot_root(fc, "vm1"),
            PathBuf::from("/jail/firecracker/vm1/root")
        );
        assert_eq!(
            jailer.host_socket_path(fc, "vm1"),
            PathBuf::from("/jail/firecracker/vm1/root/run/firecracker.socket")
        );
    }

    #[tokio::test]
    async fn test_start_and_wait() {
        let mut runner = CommandRunner::new("sh").arg("-c").arg("exit 0");
        assert!(runner.pid().is_none());

        let pid = runner.start().await.unwrap();
        assert_eq!(runner.pid(), Some(pid));
        assert!(runner.wait().await.unwrap().success());
        // Already exited; killing is a no-op.
        runner.kill().unwrap();
    }

    #[tokio::test]
    async fn test_kill_running_process() {
        let mut runner = CommandRunner::new("sleep").arg("30");
        runner.start().await.unwrap();
        assert!(runner.try_wait().unwrap().is_none());

        runner.kill().unwrap();
        assert!(!runner.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let mut runner = CommandRunner::new("sleep").arg("30");
        runner.start().await.unwrap();
        assert!(matches!(
            runner.start().await,
            Err(FcliteError::InvalidState(_))
        ));
        runner.kill().unwrap();
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let mut runner = CommandRunner::new("/nonexistent/firecracker");
        assert!(matches!(
            runner.start().await,
            Err(FcliteError::Process(_))
        ));
        assert!(matches!(
            runner.wait().await,
            Err(FcliteError::InvalidState(_))
        ));
    }
}
