//! Task: expose host files inside the jailer's chroot.

use super::task_start;
use crate::machine::config::MachineConfig;
use crate::machine::init::types::MachineContext;
use crate::pipeline::PipelineTask;
use crate::vmm::models::MemBackendType;
use async_trait::async_trait;
use fclite_shared::errors::{FcliteError, FcliteResult};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Link the kernel, initrd, drives, log file and snapshot files into the jail
/// root and point the config at their jail-relative paths.
///
/// Files are hard-linked so writes from inside the jail (the log file) stay
/// visible on the host; a copy is made when the jail sits on another
/// filesystem. A UFFD memory backend is a socket and is left untouched.
pub struct LinkJailerFilesTask {
    root: PathBuf,
    uid: u32,
    gid: u32,
}

impl LinkJailerFilesTask {
    pub fn new(root: PathBuf, uid: u32, gid: u32) -> Self {
        Self { root, uid, gid }
    }
}

#[async_trait]
impl PipelineTask<MachineContext> for LinkJailerFilesTask {
    async fn run(&self, ctx: &mut MachineContext) -> FcliteResult<()> {
        task_start(ctx, "link_jailer_files");
        let linked = self.link_config(&mut ctx.config).await?;
        tracing::info!(
            vm_id = %ctx.vm_id,
            root = %self.root.display(),
            files = linked,
            "Linked files into jail"
        );
        Ok(())
    }
}

impl LinkJailerFilesTask {
    async fn link_config(&self, config: &mut MachineConfig) -> FcliteResult<usize> {
        tokio::fs::create_dir_all(&self.root).await?;
        let mut seen = HashSet::new();

        if config.has_snapshot() {
            let backend = config.snapshot.load_params()?.mem_backend.backend_type;
            if let Some(path) = config.snapshot.snapshot_path.take() {
                config.snapshot.snapshot_path = Some(self.link(&path, &mut seen).await?);
            }
            if backend == MemBackendType::File {
                if let Some(path) = config.snapshot.mem_file_path.take() {
                    config.snapshot.mem_file_path = Some(self.link(&path, &mut seen).await?);
                }
            }
        } else {
            config.kernel_image_path = self.link(&config.kernel_image_path, &mut seen).await?;
            if let Some(path) = config.initrd_path.take() {
                config.initrd_path = Some(self.link(&path, &mut seen).await?);
            }
            for drive in &mut config.drives {
                drive.path_on_host = self.link(&drive.path_on_host, &mut seen).await?;
            }
        }

        if let Some(path) = config.log_path.take() {
            config.log_path = Some(self.link(&path, &mut seen).await?);
        }
        Ok(seen.len())
    }

    /// Place `host_path` at `<root>/<file name>` and return `/<file name>`.
    async fn link(&self, host_path: &Path, seen: &mut HashSet<OsString>) -> FcliteResult<PathBuf> {
        let file_name = host_path.file_name().ok_or_else(|| {
            FcliteError::Config(format!("{} has no file name", host_path.display()))
        })?;
        if !seen.insert(file_name.to_os_string()) {
            return Err(FcliteError::Config(format!(
                "more than one jailed file is named {}",
                file_name.to_string_lossy()
            )));
        }

        let target = self.root.join(file_name);
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = tokio::fs::hard_link(host_path, &target).await {
            tracing::debug!(path = %host_path.display(), error = %e, "Hard link failed, copying");
            tokio::fs::copy(host_path, &target).await.map_err(|e| {
                FcliteError::Config(format!(
                    "Failed to place {} in jail: {}",
                    host_path.display(),
                    e
                ))
            })?;
        }
        std::os::unix::fs::chown(&target, Some(self.uid), Some(self.gid)).map_err(|e| {
            FcliteError::Config(format!("Failed to chown {}: {}", target.display(), e))
        })?;

        Ok(Path::new("/").join(file_name))
    }
}
