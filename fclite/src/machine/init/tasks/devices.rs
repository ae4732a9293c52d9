//! Tasks: drives and network interfaces.

use super::task_start;
use crate::machine::init::types::MachineContext;
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use fclite_shared::errors::FcliteResult;

pub struct AttachDrivesTask;

#[async_trait]
impl PipelineTask<MachineContext> for AttachDrivesTask {
    async fn run(&self, ctx: &mut MachineContext) -> FcliteResult<()> {
        task_start(ctx, "attach_drives");
        if ctx.restoring_snapshot() {
            return Ok(());
        }

        for drive in &ctx.config.drives {
            ctx.client.put_drive(drive).await?;
            tracing::debug!(
                vm_id = %ctx.vm_id,
                drive_id = %drive.drive_id,
                path = %drive.path_on_host.display(),
                root = drive.is_root_device,
                "Attached drive"
            );
        }
        Ok(())
    }
}

pub struct CreateNetworkInterfacesTask;

#[async_trait]
impl PipelineTask<MachineContext> for CreateNetworkInterfacesTask {
    async fn run(&self, ctx: &mut MachineContext) -> FcliteResult<()> {
        task_start(ctx, "create_network_interfaces");
        if ctx.restoring_snapshot() {
            return Ok(());
        }

        for iface in &ctx.config.network_interfaces {
            ctx.client.put_network_interface(iface).await?;
            tracing::debug!(
                vm_id = %ctx.vm_id,
                iface_id = %iface.iface_id,
                tap = %iface.host_dev_name,
                "Created network interface"
            );
        }
        Ok(())
    }
}
