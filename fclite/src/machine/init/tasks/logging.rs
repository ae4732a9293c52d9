//! Tasks: hypervisor log file.

use super::task_start;
use crate::machine::init::types::MachineContext;
use crate::pipeline::PipelineTask;
use crate::vmm::models::LoggerConfig;
use async_trait::async_trait;
use fclite_shared::errors::{FcliteError, FcliteResult};

/// Create the log file before launch so the hypervisor can open it.
pub struct CreateLogFilesTask;

#[async_trait]
impl PipelineTask<MachineContext> for CreateLogFilesTask {
    async fn run(&self, ctx: &mut MachineContext) -> FcliteResult<()> {
        task_start(ctx, "create_log_files");
        let Some(log_path) = ctx.config.log_path.clone() else {
            return Ok(());
        };

        if let Some(parent) = log_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
            .map_err(|e| {
                FcliteError::Config(format!(
                    "Failed to create log file {}: {}",
                    log_path.display(),
                    e
                ))
            })?;

        tracing::debug!(vm_id = %ctx.vm_id, path = %log_path.display(), "Created log file");
        Ok(())
    }
}

/// Point the hypervisor's logger at the configured file.
pub struct BootstrapLoggingTask;

#[async_trait]
impl PipelineTask<MachineContext> for BootstrapLoggingTask {
    async fn run(&self, ctx: &mut MachineContext) -> FcliteResult<()> {
        task_start(ctx, "bootstrap_logging");
        let Some(log_path) = ctx.config.log_path.clone() else {
            return Ok(());
        };

        let logger = LoggerConfig {
            log_path,
            level: ctx.config.log_level,
            show_level: true,
            show_log_origin: false,
        };
        ctx.client.put_logger(&logger).await?;

        tracing::info!(vm_id = %ctx.vm_id, path = %logger.log_path.display(), "Hypervisor logging configured");
        Ok(())
    }
}
