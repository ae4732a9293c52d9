//! Task: start the guest.
//!
//! Issues `InstanceStart` for a cold boot. With a snapshot configured the
//! load request resumes the VM instead, so nothing is sent here.

use super::task_start;
use crate::machine::init::types::MachineContext;
use crate::pipeline::PipelineTask;
use crate::vmm::models::ActionType;
use async_trait::async_trait;
use fclite_shared::errors::FcliteResult;

pub struct StartVmmTask;

#[async_trait]
impl PipelineTask<MachineContext> for StartVmmTask {
    async fn run(&self, ctx: &mut MachineContext) -> FcliteResult<()> {
        task_start(ctx, "start_vmm");
        if ctx.restoring_snapshot() {
            tracing::debug!(vm_id = %ctx.vm_id, "Snapshot restore replaces cold boot");
            return Ok(());
        }

        ctx.client
            .create_sync_action(ActionType::InstanceStart)
            .await?;
        tracing::info!(vm_id = %ctx.vm_id, "Instance started");
        Ok(())
    }
}
