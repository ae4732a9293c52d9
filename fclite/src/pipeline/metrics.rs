#[derive(Debug, Clone)]
pub struct StepMetrics {
    pub name: String,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    pub total_duration_ms: u128,
    pub steps: Vec<StepMetrics>,
}

impl PipelineMetrics {
    pub fn step_duration_ms(&self, name: &str) -> Option<u128> {
        self.steps
            .iter()
            .find(|step| step.name == name)
            .map(|step| step.duration_ms)
    }

    /// Names of the steps that ran, in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name.as_str()).collect()
    }
}
