//! Task: stop the hypervisor process.

use super::task_start;
use crate::machine::init::types::MachineContext;
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use fclite_shared::errors::FcliteResult;

pub struct StopVmmTask;

#[async_trait]
impl PipelineTask<MachineContext> for StopVmmTask {
    async fn run(&self, ctx: &mut MachineContext) -> FcliteResult<()> {
        task_start(ctx, "stop_vmm");
        let Some(pid) = ctx.runner.pid() else {
            tracing::debug!(vm_id = %ctx.vm_id, "No process was started");
            return Ok(());
        };

        if let Some(status) = ctx.runner.try_wait()? {
            tracing::debug!(vm_id = %ctx.vm_id, pid, %status, "Process already exited");
            return Ok(());
        }

        ctx.runner.kill()?;
        let status = ctx.runner.wait().await?;
        tracing::info!(vm_id = %ctx.vm_id, pid, %status, "Stopped hypervisor process");
        Ok(())
    }
}
