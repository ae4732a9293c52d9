//! Tasks: API socket file.

use super::task_start;
use crate::machine::init::types::MachineContext;
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use fclite_shared::errors::{FcliteError, FcliteResult};
use std::path::Path;

/// Create the socket's directory and clear a stale socket file.
///
/// The hypervisor refuses to bind over an existing path.
pub struct PrepareSocketTask;

#[async_trait]
impl PipelineTask<MachineContext> for PrepareSocketTask {
    async fn run(&self, ctx: &mut MachineContext) -> FcliteResult<()> {
        task_start(ctx, "prepare_socket");
        let socket_path = ctx.socket_path.clone();

        if let Some(parent) = socket_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                FcliteError::Config(format!(
                    "Failed to create socket directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        if remove_if_exists(&socket_path).await? {
            tracing::warn!(vm_id = %ctx.vm_id, path = %socket_path.display(), "Removed stale API socket");
        }
        Ok(())
    }
}

pub struct RemoveSocketTask;

#[async_trait]
impl PipelineTask<MachineContext> for RemoveSocketTask {
    async fn run(&self, ctx: &mut MachineContext) -> FcliteResult<()> {
        task_start(ctx, "remove_socket");
        remove_if_exists(&ctx.socket_path).await?;
        Ok(())
    }
}

/// Returns whether a file was removed.
async fn remove_if_exists(path: &Path) -> FcliteResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
