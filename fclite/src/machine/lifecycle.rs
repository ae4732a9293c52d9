//! Machine lifecycle.
//!
//! Boot, teardown, and the operations available on a running machine.

use super::Machine;
use super::init::MachineContext;
use super::metrics::BootMetrics;
use super::state::MachineState;
use crate::vmm::models::{ActionType, SnapshotCreateParams, SnapshotType, VmState};
use fclite_shared::errors::{FcliteError, FcliteResult};
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::{Duration, Instant};
use tracing::Dispatch;
use tracing::instrument::WithSubscriber;

/// Interval between checks for the API socket.
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Run `fut` with the machine's logger as the default dispatcher, if set.
async fn with_logger<F: Future>(logger: Option<Dispatch>, fut: F) -> F::Output {
    match logger {
        Some(dispatch) => fut.with_subscriber(dispatch).await,
        None => fut.await,
    }
}

fn ensure_state(machine: &Machine, allowed: bool, action: &str) -> FcliteResult<()> {
    if allowed {
        return Ok(());
    }
    Err(FcliteError::InvalidState(format!(
        "cannot {} machine {} in {} state",
        action, machine.id, machine.state
    )))
}

// ============================================================================
// BOOT
// ============================================================================

/// Boot the machine, tearing down on any failure.
pub(super) async fn start(machine: &mut Machine) -> FcliteResult<()> {
    ensure_state(machine, machine.state.can_start(), "start")?;

    let logger = machine.logger.clone();
    let deadline = machine.ctx.config.boot_timeout();

    match with_logger(logger.clone(), boot_with_deadline(machine, deadline)).await {
        Ok(metrics) => {
            machine.state = MachineState::Running;
            with_logger(logger, async { metrics.log(&machine.id) }).await;
            machine.boot_metrics = Some(metrics);
            Ok(())
        }
        Err(e) => {
            let failed_in = machine.state;
            with_logger(logger, async {
                tracing::error!(vm_id = %machine.id, state = %failed_in, "Boot failed: {}", e);
                teardown(machine).await;
            })
            .await;
            Err(e)
        }
    }
}

async fn boot_with_deadline(
    machine: &mut Machine,
    deadline: Option<Duration>,
) -> FcliteResult<BootMetrics> {
    let Some(limit) = deadline else {
        return boot(machine).await;
    };

    match tokio::time::timeout(limit, boot(machine)).await {
        Ok(result) => result,
        Err(_) => Err(FcliteError::Timeout(format!(
            "boot did not finish within {} ms",
            limit.as_millis()
        ))),
    }
}

async fn boot(machine: &mut Machine) -> FcliteResult<BootMetrics> {
    let total_start = Instant::now();
    tracing::info!(vm_id = %machine.id, snapshot = machine.ctx.restoring_snapshot(), "Booting machine");

    machine.state = MachineState::Initializing;
    let init_before_start = machine
        .handlers
        .init_before_start
        .run(&mut machine.ctx)
        .await?;

    let process_start = Instant::now();
    start_process(&mut machine.ctx).await?;
    let process_start_ms = process_start.elapsed().as_millis();
    machine.state = MachineState::Started;
    tracing::debug!(vm_id = %machine.id, process_start_ms = process_start_ms as u64, "Hypervisor API up");

    machine.state = MachineState::PostInit;
    let init_after_start = machine
        .handlers
        .init_after_start
        .run(&mut machine.ctx)
        .await?;

    Ok(BootMetrics {
        init_before_start,
        process_start_ms,
        init_after_start,
        total_boot_ms: total_start.elapsed().as_millis(),
    })
}

/// Launch the hypervisor and wait until its API socket is up.
async fn start_process(ctx: &mut MachineContext) -> FcliteResult<()> {
    let pid = ctx.runner.start().await?;
    tracing::info!(vm_id = %ctx.vm_id, pid, "Hypervisor process started");

    let timeout = ctx.config.socket_timeout();
    wait_for_socket(ctx, timeout).await?;
    tracing::debug!(vm_id = %ctx.vm_id, socket = %ctx.socket_path.display(), "API socket ready");
    Ok(())
}

async fn wait_for_socket(ctx: &mut MachineContext, timeout: Duration) -> FcliteResult<()> {
    let started = Instant::now();
    loop {
        if tokio::fs::try_exists(&ctx.socket_path).await? {
            return Ok(());
        }
        if let Some(status) = ctx.runner.try_wait()? {
            return Err(FcliteError::Process(format!(
                "hypervisor exited with {} before its API socket appeared",
                status
            )));
        }
        if started.elapsed() >= timeout {
            return Err(FcliteError::Timeout(format!(
                "API socket {} did not appear within {} ms",
                ctx.socket_path.display(),
                timeout.as_millis()
            )));
        }
        tokio::time::sleep(SOCKET_POLL_INTERVAL).await;
    }
}

// ============================================================================
// TEARDOWN
// ============================================================================

/// Run every teardown handler and return the failures.
///
/// Failures are already logged by the handler list; callers decide whether
/// to surface them.
async fn teardown(machine: &mut Machine) -> Vec<FcliteError> {
    machine.state = MachineState::TearingDown;
    let failures = machine.handlers.teardown.run_all(&mut machine.ctx).await;
    machine.state = MachineState::Terminated;
    tracing::info!(vm_id = %machine.id, failures = failures.len(), "Machine terminated");
    failures
}

/// Stop a running machine.
pub(super) async fn stop(machine: &mut Machine) -> FcliteResult<()> {
    ensure_state(machine, machine.state.can_stop(), "stop")?;
    let logger = machine.logger.clone();
    let failures = with_logger(logger, teardown(machine)).await;
    match failures.into_iter().next() {
        Some(first) => Err(first),
        None => Ok(()),
    }
}

/// Wait for the hypervisor to exit on its own, then tear down.
pub(super) async fn wait(machine: &mut Machine) -> FcliteResult<ExitStatus> {
    ensure_state(machine, machine.state.can_stop(), "wait for")?;
    let logger = machine.logger.clone();
    with_logger(logger, async {
        let status = machine.ctx.runner.wait().await?;
        tracing::info!(vm_id = %machine.id, %status, "Hypervisor process exited");
        teardown(machine).await;
        Ok::<_, FcliteError>(status)
    })
    .await
}

// ============================================================================
// RUNNING MACHINE
// ============================================================================

/// Ask the guest to reboot, which the hypervisor turns into an exit.
pub(super) async fn shutdown(machine: &mut Machine) -> FcliteResult<()> {
    ensure_state(machine, machine.state.can_stop(), "shut down")?;
    tracing::debug!(vm_id = %machine.id, "Sending Ctrl+Alt+Del");
    machine
        .ctx
        .client
        .create_sync_action(ActionType::SendCtrlAltDel)
        .await
}

pub(super) async fn set_vm_state(machine: &mut Machine, state: VmState) -> FcliteResult<()> {
    let action = match state {
        VmState::Paused => "pause",
        VmState::Resumed => "resume",
    };
    ensure_state(machine, machine.state.can_stop(), action)?;
    machine.ctx.client.patch_vm_state(state).await?;
    tracing::info!(vm_id = %machine.id, state = ?state, "VM state changed");
    Ok(())
}

/// Write a full snapshot. The VM must be paused first.
pub(super) async fn create_snapshot(
    machine: &mut Machine,
    mem_file_path: PathBuf,
    snapshot_path: PathBuf,
) -> FcliteResult<()> {
    ensure_state(machine, machine.state.can_stop(), "snapshot")?;
    let params = SnapshotCreateParams {
        mem_file_path,
        snapshot_path,
        snapshot_type: SnapshotType::Full,
    };
    machine.ctx.client.create_snapshot(&params).await?;
    tracing::info!(
        vm_id = %machine.id,
        snapshot = %params.snapshot_path.display(),
        mem = %params.mem_file_path.display(),
        "Snapshot created"
    );
    Ok(())
}

// ============================================================================
// DROP
// ============================================================================

/// Kill a hypervisor that is still alive when its machine goes away.
pub(super) fn drop_handler(machine: &mut Machine) {
    if !machine.state.has_process() || machine.ctx.runner.pid().is_none() {
        return;
    }
    tracing::warn!(
        vm_id = %machine.id,
        state = %machine.state,
        pid = ?machine.ctx.runner.pid(),
        "Machine dropped with a live process, killing it"
    );
    if let Err(e) = machine.ctx.runner.kill() {
        tracing::error!(vm_id = %machine.id, "Failed to kill hypervisor process: {}", e);
    }
}
