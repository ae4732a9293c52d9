//! fclite: boot a Firecracker microVM from a JSON config and keep it running
//! until it exits or Ctrl-C is pressed.

use clap::Parser;
use fclite::vmm::JailerConfig;
use fclite::{FcliteError, FcliteResult, LoadSnapshotOpt, Machine, MachineConfig, MachineOpt};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fclite", version, about = "Boot a Firecracker microVM")]
struct Cli {
    /// Machine configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Override the hypervisor binary from the config.
    #[arg(long)]
    firecracker_bin: Option<PathBuf>,

    /// Launch through this jailer binary.
    #[arg(long, requires_all = ["uid", "gid"])]
    jailer: Option<PathBuf>,

    #[arg(long, requires = "jailer")]
    uid: Option<u32>,

    #[arg(long, requires = "jailer")]
    gid: Option<u32>,

    /// Restore guest memory from this file.
    #[arg(long, requires = "snapshot_state")]
    snapshot_mem: Option<PathBuf>,

    /// Restore VM state from this file.
    #[arg(long, requires = "snapshot_mem")]
    snapshot_state: Option<PathBuf>,

    /// Leave a restored VM paused.
    #[arg(long, requires = "snapshot_mem")]
    no_resume: bool,

    /// Write logs to daily files in this directory instead of stderr.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_guard = fclite::init_logging(cli.log_dir.as_deref());

    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        eprintln!("fclite: {}", e);
        drop(log_guard);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> FcliteResult<()> {
    let mut config = MachineConfig::from_file(&cli.config)?;
    if let Some(bin) = cli.firecracker_bin {
        config.firecracker_bin = bin;
    }

    let mut opts = Vec::new();

    if let Some(jailer_bin) = cli.jailer {
        let (Some(uid), Some(gid)) = (cli.uid, cli.gid) else {
            return Err(FcliteError::Config("--jailer needs --uid and --gid".into()));
        };
        opts.push(MachineOpt::jailer(JailerConfig::new(jailer_bin, uid, gid)));
    }

    if let (Some(mem), Some(state)) = (cli.snapshot_mem, cli.snapshot_state) {
        let mut load_opts = Vec::new();
        if cli.no_resume {
            load_opts.push(LoadSnapshotOpt::ResumeVm(false));
        }
        opts.push(MachineOpt::snapshot(mem, state, load_opts));
    }

    let mut machine = Machine::new(config, opts)?;
    machine.start().await?;
    tracing::info!(vm_id = %machine.id(), pid = ?machine.pid(), "Machine running, Ctrl-C to stop");

    let exited = tokio::select! {
        result = machine.wait() => Some(result),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            None
        }
    };

    match exited {
        Some(result) => {
            let status = result?;
            tracing::info!(vm_id = %machine.id(), %status, "Machine exited");
        }
        None => {
            tracing::info!(vm_id = %machine.id(), "Interrupted, stopping machine");
            machine.stop().await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_jailer_requires_ids() {
        let missing_ids = ["fclite", "--config", "vm.json", "--jailer", "/bin/jailer"];
        assert!(Cli::try_parse_from(missing_ids).is_err());

        let cli = Cli::try_parse_from([
            "fclite",
            "--config",
            "vm.json",
            "--jailer",
            "/bin/jailer",
            "--uid",
            "1",
            "--gid",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.uid, Some(1));
    }

    #[test]
    fn test_snapshot_flags_come_in_pairs() {
        let missing_state = ["fclite", "--config", "vm.json", "--snapshot-mem", "m"];
        assert!(Cli::try_parse_from(missing_state).is_err());

        let cli = Cli::try_parse_from([
            "fclite",
            "--config",
            "vm.json",
            "--snapshot-mem",
            "m",
            "--snapshot-state",
            "s",
            "--no-resume",
        ])
        .unwrap();
        assert!(cli.no_resume);
    }
}
