//! Hypervisor process management.
//!
//! [`ProcessRunner`] covers launching and supervising the hypervisor's OS
//! process. The default [`CommandRunner`] wraps `tokio::process::Command`;
//! callers can launch through a privilege-isolation wrapper with
//! [`CommandRunner::jailer`] or provide their own runner.

mod command;

pub use command::{CommandRunner, JailerConfig};

use async_trait::async_trait;
use fclite_shared::errors::FcliteResult;
use std::process::ExitStatus;

/// Trait for starting and supervising the hypervisor process.
///
/// Separates process supervision from control-plane calls, which go through
/// `VmmClient`.
#[async_trait]
pub trait ProcessRunner: Send {
    /// Launch the process and return its PID.
    async fn start(&mut self) -> FcliteResult<u32>;

    /// Wait for the process to exit.
    async fn wait(&mut self) -> FcliteResult<ExitStatus>;

    /// Check for exit without blocking.
    fn try_wait(&mut self) -> FcliteResult<Option<ExitStatus>>;

    /// Send SIGKILL. Succeeds if the process already exited.
    fn kill(&mut self) -> FcliteResult<()>;

    /// PID of the launched process, if started.
    fn pid(&self) -> Option<u32>;
}
