use crate::vmm::models::{
    Drive, LogLevel, MachineSpec, MemBackendType, NetworkInterface, SnapshotLoadParams,
};
use fclite_shared::errors::{FcliteError, FcliteResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default wait for the API socket to appear after launch.
pub const DEFAULT_SOCKET_TIMEOUT_MS: u64 = 3000;

/// Machine configuration.
///
/// Deserializable from JSON so the CLI can load it from a file. Every field
/// except the kernel image has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Machine identifier; generated when absent.
    pub vm_id: Option<String>,
    /// API socket path; derived from the machine id when absent.
    pub socket_path: Option<PathBuf>,
    pub firecracker_bin: PathBuf,
    pub kernel_image_path: PathBuf,
    pub kernel_args: String,
    pub initrd_path: Option<PathBuf>,
    pub machine: MachineSpec,
    pub drives: Vec<Drive>,
    pub network_interfaces: Vec<NetworkInterface>,
    /// Hypervisor log file, configured once the API is up.
    pub log_path: Option<PathBuf>,
    pub log_level: Option<LogLevel>,
    pub socket_timeout_ms: u64,
    /// Deadline over the whole boot sequence.
    pub boot_timeout_ms: Option<u64>,

    /// Set by the snapshot combinator, never read from a config file.
    #[serde(skip)]
    pub snapshot: SnapshotConfig,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            vm_id: None,
            socket_path: None,
            firecracker_bin: PathBuf::from("firecracker"),
            kernel_image_path: PathBuf::new(),
            kernel_args: "console=ttyS0 reboot=k panic=1 pci=off".to_string(),
            initrd_path: None,
            machine: MachineSpec::default(),
            drives: Vec::new(),
            network_interfaces: Vec::new(),
            log_path: None,
            log_level: None,
            socket_timeout_ms: DEFAULT_SOCKET_TIMEOUT_MS,
            boot_timeout_ms: None,
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl MachineConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file(path: &Path) -> FcliteResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FcliteError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&raw).map_err(|e| {
            FcliteError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_set()
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    pub fn boot_timeout(&self) -> Option<Duration> {
        self.boot_timeout_ms.map(Duration::from_millis)
    }
}

/// Snapshot to restore instead of cold booting.
#[derive(Debug, Clone, Default)]
pub struct SnapshotConfig {
    pub mem_file_path: Option<PathBuf>,
    pub snapshot_path: Option<PathBuf>,
    /// Applied in order to the load request before it is sent.
    pub opts: Vec<LoadSnapshotOpt>,
}

impl SnapshotConfig {
    pub fn is_set(&self) -> bool {
        self.mem_file_path.is_some() && self.snapshot_path.is_some()
    }

    /// Build the load request, applying the sub-options in order.
    pub fn load_params(&self) -> FcliteResult<SnapshotLoadParams> {
        let (Some(mem_file_path), Some(snapshot_path)) =
            (&self.mem_file_path, &self.snapshot_path)
        else {
            return Err(FcliteError::Config("snapshot paths are not set".into()));
        };

        let mut params = SnapshotLoadParams::new(mem_file_path.clone(), snapshot_path.clone());
        for opt in &self.opts {
            opt.apply(&mut params);
        }
        Ok(params)
    }
}

/// Sub-option tweaking a snapshot load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSnapshotOpt {
    /// Resume the VM after loading (default true).
    ResumeVm(bool),
    EnableDiffSnapshots(bool),
    MemoryBackend(MemBackendType),
}

impl LoadSnapshotOpt {
    fn apply(self, params: &mut SnapshotLoadParams) {
        match self {
            LoadSnapshotOpt::ResumeVm(resume) => params.resume_vm = resume,
            LoadSnapshotOpt::EnableDiffSnapshots(enable) => params.enable_diff_snapshots = enable,
            LoadSnapshotOpt::MemoryBackend(backend) => params.mem_backend.backend_type = backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_file_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "kernel_image_path": "/images/vmlinux",
                "machine": {{ "vcpu_count": 2 }},
                "drives": [{{ "drive_id": "rootfs", "path_on_host": "/images/rootfs.ext4", "is_root_device": true }}],
                "network_interfaces": [{{
                    "iface_id": "eth0",
                    "host_dev_name": "tap0",
                    "static_ip": {{ "ip": "10.0.0.2", "prefix_len": 24, "gateway": "10.0.0.1" }}
                }}]
            }}"#
        )
        .unwrap();

        let config = MachineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.kernel_image_path, PathBuf::from("/images/vmlinux"));
        assert_eq!(config.machine.vcpu_count, 2);
        assert_eq!(config.machine.mem_size_mib, 512);
        assert_eq!(config.firecracker_bin, PathBuf::from("firecracker"));
        assert_eq!(config.socket_timeout_ms, DEFAULT_SOCKET_TIMEOUT_MS);
        assert!(config.drives[0].is_root_device);
        assert!(!config.drives[0].is_read_only);
        assert!(config.network_interfaces[0].static_ip.is_some());
        assert!(!config.has_snapshot());
    }

    #[test]
    fn test_from_file_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            MachineConfig::from_file(file.path()),
            Err(FcliteError::Config(_))
        ));
    }

    #[test]
    fn test_load_params_apply_opts_in_order() {
        let snapshot = SnapshotConfig {
            mem_file_path: Some("/snap/mem".into()),
            snapshot_path: Some("/snap/state".into()),
            opts: vec![
                LoadSnapshotOpt::ResumeVm(false),
                LoadSnapshotOpt::EnableDiffSnapshots(true),
                LoadSnapshotOpt::MemoryBackend(MemBackendType::Uffd),
                LoadSnapshotOpt::ResumeVm(true),
            ],
        };

        let params = snapshot.load_params().unwrap();
        assert!(params.resume_vm);
        assert!(params.enable_diff_snapshots);
        assert_eq!(params.mem_backend.backend_type, MemBackendType::Uffd);
        assert_eq!(params.mem_backend.backend_path, PathBuf::from("/snap/mem"));
        assert_eq!(params.snapshot_path, PathBuf::from("/snap/state"));
    }

    #[test]
    fn test_load_params_require_paths() {
        assert!(SnapshotConfig::default().load_params().is_err());
    }
}
