//! Boot timing.

use crate::pipeline::PipelineMetrics;

/// Timings of one successful boot.
#[derive(Debug, Clone, Default)]
pub struct BootMetrics {
    pub init_before_start: PipelineMetrics,
    /// Process launch until the API socket appeared.
    pub process_start_ms: u128,
    pub init_after_start: PipelineMetrics,
    pub total_boot_ms: u128,
}

impl BootMetrics {
    /// Duration of the named handler in either init phase.
    pub fn step_duration_ms(&self, name: &str) -> Option<u128> {
        self.init_before_start
            .step_duration_ms(name)
            .or_else(|| self.init_after_start.step_duration_ms(name))
    }

    pub(super) fn log(&self, vm_id: &str) {
        for step in self
            .init_before_start
            .steps
            .iter()
            .chain(&self.init_after_start.steps)
        {
            tracing::debug!(vm_id = %vm_id, handler = %step.name, duration_ms = step.duration_ms as u64, "Handler timing");
        }
        tracing::info!(
            vm_id = %vm_id,
            init_before_start_ms = self.init_before_start.total_duration_ms as u64,
            process_start_ms = self.process_start_ms as u64,
            init_after_start_ms = self.init_after_start.total_duration_ms as u64,
            total_boot_ms = self.total_boot_ms as u64,
            "Machine booted"
        );
    }
}
