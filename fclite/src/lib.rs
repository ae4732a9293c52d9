//! fclite: bootstrap lifecycle driver for Firecracker microVMs.
//!
//! A [`Machine`] walks a hypervisor through three named, ordered handler
//! lists (init-before-start, init-after-start, teardown). Callers extend
//! or rearrange the lists by handler name with [`MachineOpt`] or
//! [`Machine::handlers_mut`] before boot.

pub mod logging;
pub mod machine;
pub mod pipeline;
pub mod vmm;

pub use fclite_shared::errors::{FcliteError, FcliteResult};
pub use logging::{LogGuard, init_logging};
pub use machine::{
    BootMetrics, LifecycleHandlers, LoadSnapshotOpt, Machine, MachineConfig, MachineContext,
    MachineHandler, MachineOpt, MachineState, Phase, Placement,
};
pub use pipeline::{Handler, HandlerList, PipelineMetrics, PipelineTask};
