//! Machine lifecycle status.

/// Lifecycle status of a machine.
///
/// ```text
/// Unconfigured → Configured → Initializing → Started → PostInit → Running
///                                  │            │          │         │
///                                  └────────────┴──────────┴─────────┴──→ TearingDown → Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineState {
    /// Constructed, combinators not yet applied.
    Unconfigured,
    /// Combinators applied; pipelines may still be modified.
    Configured,
    /// Running the init-before-start handlers.
    Initializing,
    /// Hypervisor process launched and its API socket is up.
    Started,
    /// Running the init-after-start handlers.
    PostInit,
    Running,
    TearingDown,
    Terminated,
}

impl MachineState {
    /// Whether combinators and pipeline edits are still accepted.
    pub fn can_configure(&self) -> bool {
        matches!(self, MachineState::Configured)
    }

    pub fn can_start(&self) -> bool {
        matches!(self, MachineState::Configured)
    }

    pub fn can_stop(&self) -> bool {
        matches!(self, MachineState::Running)
    }

    /// Whether a hypervisor process may be alive.
    ///
    /// The process is launched at the end of `Initializing`.
    pub fn has_process(&self) -> bool {
        matches!(
            self,
            MachineState::Initializing
                | MachineState::Started
                | MachineState::PostInit
                | MachineState::Running
                | MachineState::TearingDown
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Unconfigured => "unconfigured",
            MachineState::Configured => "configured",
            MachineState::Initializing => "initializing",
            MachineState::Started => "started",
            MachineState::PostInit => "post-init",
            MachineState::Running => "running",
            MachineState::TearingDown => "tearing-down",
            MachineState::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
