//! Tasks: machine configuration and boot source.

use super::task_start;
use crate::machine::init::types::MachineContext;
use crate::pipeline::PipelineTask;
use crate::vmm::models::BootSource;
use async_trait::async_trait;
use fclite_shared::errors::FcliteResult;

pub struct CreateMachineTask;

#[async_trait]
impl PipelineTask<MachineContext> for CreateMachineTask {
    async fn run(&self, ctx: &mut MachineContext) -> FcliteResult<()> {
        task_start(ctx, "create_machine");
        if ctx.restoring_snapshot() {
            tracing::debug!(vm_id = %ctx.vm_id, "Machine config comes from snapshot, skipping");
            return Ok(());
        }

        ctx.client.put_machine_config(&ctx.config.machine).await?;

        tracing::info!(
            vm_id = %ctx.vm_id,
            vcpus = ctx.config.machine.vcpu_count,
            mem_mib = ctx.config.machine.mem_size_mib,
            "Configured machine"
        );
        Ok(())
    }
}

pub struct CreateBootSourceTask;

#[async_trait]
impl PipelineTask<MachineContext> for CreateBootSourceTask {
    async fn run(&self, ctx: &mut MachineContext) -> FcliteResult<()> {
        task_start(ctx, "create_boot_source");
        if ctx.restoring_snapshot() {
            return Ok(());
        }

        let boot_source = BootSource {
            kernel_image_path: ctx.config.kernel_image_path.clone(),
            boot_args: Some(ctx.config.kernel_args.clone()).filter(|args| !args.is_empty()),
            initrd_path: ctx.config.initrd_path.clone(),
        };
        ctx.client.put_boot_source(&boot_source).await
    }
}
