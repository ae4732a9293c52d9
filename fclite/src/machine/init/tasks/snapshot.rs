//! Task: restore the VM from a snapshot.

use super::task_start;
use crate::machine::init::types::MachineContext;
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use fclite_shared::errors::FcliteResult;

/// Loads the snapshot recorded in the machine's snapshot config.
///
/// The load parameters are built when the task runs, so sub-options added
/// after the task was inserted still apply.
pub struct LoadSnapshotTask;

#[async_trait]
impl PipelineTask<MachineContext> for LoadSnapshotTask {
    async fn run(&self, ctx: &mut MachineContext) -> FcliteResult<()> {
        task_start(ctx, "load_snapshot");

        let params = ctx.config.snapshot.load_params()?;
        ctx.client.load_snapshot(&params).await?;

        tracing::info!(
            vm_id = %ctx.vm_id,
            snapshot = %params.snapshot_path.display(),
            resumed = params.resume_vm,
            "Restored VM from snapshot"
        );
        Ok(())
    }
}
