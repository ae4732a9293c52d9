//! Tasks: configuration checks run before anything touches the host.

use super::task_start;
use crate::machine::config::MachineConfig;
use crate::machine::init::types::MachineContext;
use crate::pipeline::PipelineTask;
use crate::vmm::models::MemBackendType;
use async_trait::async_trait;
use fclite_shared::errors::{FcliteError, FcliteResult};
use std::collections::HashSet;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

/// Upper bound the hypervisor accepts for vCPUs.
const MAX_VCPUS: u8 = 32;

pub struct ValidateConfigTask;

#[async_trait]
impl PipelineTask<MachineContext> for ValidateConfigTask {
    async fn run(&self, ctx: &mut MachineContext) -> FcliteResult<()> {
        task_start(ctx, "validate_config");
        validate_config(&ctx.config)
    }
}

pub struct ValidateNetworkTask;

#[async_trait]
impl PipelineTask<MachineContext> for ValidateNetworkTask {
    async fn run(&self, ctx: &mut MachineContext) -> FcliteResult<()> {
        task_start(ctx, "validate_network");
        validate_network(&ctx.config)
    }
}

fn validate_config(config: &MachineConfig) -> FcliteResult<()> {
    if config.has_snapshot() {
        // Restored machines take their boot config from the snapshot.
        return validate_snapshot(config);
    }

    if config.kernel_image_path.as_os_str().is_empty() {
        return Err(FcliteError::Config("kernel_image_path is not set".into()));
    }
    require_file("kernel image", &config.kernel_image_path)?;
    if let Some(initrd) = &config.initrd_path {
        require_file("initrd", initrd)?;
    }

    let vcpus = config.machine.vcpu_count;
    if vcpus == 0 || vcpus > MAX_VCPUS {
        return Err(FcliteError::Config(format!(
            "vcpu_count must be between 1 and {}, got {}",
            MAX_VCPUS, vcpus
        )));
    }
    if config.machine.mem_size_mib == 0 {
        return Err(FcliteError::Config("mem_size_mib must be positive".into()));
    }

    let mut ids = HashSet::new();
    let mut root_devices = 0;
    for drive in &config.drives {
        if !ids.insert(drive.drive_id.as_str()) {
            return Err(FcliteError::Config(format!(
                "duplicate drive id: {}",
                drive.drive_id
            )));
        }
        require_file("drive", &drive.path_on_host)?;
        if drive.is_root_device {
            root_devices += 1;
        }
    }
    if root_devices > 1 {
        return Err(FcliteError::Config(
            "at most one drive may be the root device".into(),
        ));
    }

    Ok(())
}

fn validate_snapshot(config: &MachineConfig) -> FcliteResult<()> {
    let params = config.snapshot.load_params()?;
    require_file("snapshot file", &params.snapshot_path)?;

    let backend = &params.mem_backend;
    match backend.backend_type {
        MemBackendType::File => require_file("snapshot memory file", &backend.backend_path),
        // Guest memory is served by a page-fault handler listening here.
        MemBackendType::Uffd => require_socket("uffd handler socket", &backend.backend_path),
    }
}

fn validate_network(config: &MachineConfig) -> FcliteResult<()> {
    let mut ids = HashSet::new();
    let mut devices = HashSet::new();
    let mut static_ips = 0;

    for iface in &config.network_interfaces {
        if !ids.insert(iface.iface_id.as_str()) {
            return Err(FcliteError::Config(format!(
                "duplicate interface id: {}",
                iface.iface_id
            )));
        }
        if iface.host_dev_name.is_empty() {
            return Err(FcliteError::Config(format!(
                "interface {} has no host device",
                iface.iface_id
            )));
        }
        if !devices.insert(iface.host_dev_name.as_str()) {
            return Err(FcliteError::Config(format!(
                "host device {} used by more than one interface",
                iface.host_dev_name
            )));
        }
        if let Some(mac) = iface.guest_mac.as_deref().filter(|mac| !is_valid_mac(mac)) {
            return Err(FcliteError::Config(format!(
                "interface {} has invalid MAC address: {}",
                iface.iface_id, mac
            )));
        }
        if let Some(ip) = &iface.static_ip {
            static_ips += 1;
            if ip.prefix_len > 32 {
                return Err(FcliteError::Config(format!(
                    "interface {} has invalid prefix length: {}",
                    iface.iface_id, ip.prefix_len
                )));
            }
        }
    }

    // The kernel `ip=` argument configures a single interface.
    if static_ips > 1 {
        return Err(FcliteError::Config(
            "at most one interface may carry a static IP".into(),
        ));
    }
    Ok(())
}

fn require_file(what: &str, path: &Path) -> FcliteResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(FcliteError::Config(format!(
            "{} not found: {}",
            what,
            path.display()
        )))
    }
}

fn require_socket(what: &str, path: &Path) -> FcliteResult<()> {
    let is_socket = std::fs::metadata(path)
        .map(|meta| meta.file_type().is_socket())
        .unwrap_or(false);
    if is_socket {
        Ok(())
    } else {
        Err(FcliteError::Config(format!(
            "{} not found: {}",
            what,
            path.display()
        )))
    }
}

fn is_valid_mac(mac: &str) -> bool {
    let octets: Vec<&str> = mac.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::config::{LoadSnapshotOpt, SnapshotConfig};
    use crate::vmm::models::{Drive, NetworkInterface, StaticIpConfig};
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    fn config_with_kernel(dir: &TempDir) -> MachineConfig {
        let kernel = dir.path().join("vmlinux");
        std::fs::write(&kernel, b"kernel").unwrap();
        MachineConfig {
            kernel_image_path: kernel,
            ..Default::default()
        }
    }

    fn drive(dir: &TempDir, id: &str, root: bool) -> Drive {
        let path = dir.path().join(format!("{id}.ext4"));
        std::fs::write(&path, b"disk").unwrap();
        Drive {
            drive_id: id.into(),
            path_on_host: path,
            is_root_device: root,
            is_read_only: false,
        }
    }

    fn iface(id: &str, dev: &str) -> NetworkInterface {
        NetworkInterface {
            iface_id: id.into(),
            host_dev_name: dev.into(),
            guest_mac: None,
            static_ip: None,
        }
    }

    fn static_ip(prefix_len: u8) -> StaticIpConfig {
        StaticIpConfig {
            ip: Ipv4Addr::new(10, 0, 0, 2),
            prefix_len,
            gateway: Ipv4Addr::new(10, 0, 0, 1),
            hostname: None,
        }
    }

    #[test]
    fn test_valid_config() {
        let dir = TempDir::new().unwrap();
        let mut config = config_with_kernel(&dir);
        config.drives = vec![drive(&dir, "rootfs", true), drive(&dir, "data", false)];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_missing_kernel() {
        assert!(validate_config(&MachineConfig::default()).is_err());

        let config = MachineConfig {
            kernel_image_path: "/nonexistent/vmlinux".into(),
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("kernel image not found"));
    }

    #[test]
    fn test_vcpu_and_memory_bounds() {
        let dir = TempDir::new().unwrap();
        let mut config = config_with_kernel(&dir);
        config.machine.vcpu_count = 0;
        assert!(validate_config(&config).is_err());
        config.machine.vcpu_count = MAX_VCPUS + 1;
        assert!(validate_config(&config).is_err());
        config.machine.vcpu_count = MAX_VCPUS;
        assert!(validate_config(&config).is_ok());
        config.machine.mem_size_mib = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_drive_rules() {
        let dir = TempDir::new().unwrap();
        let mut config = config_with_kernel(&dir);

        config.drives = vec![drive(&dir, "a", false), drive(&dir, "a", false)];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate drive id"));

        config.drives = vec![drive(&dir, "a", true), drive(&dir, "b", true)];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("root device"));

        let mut missing = drive(&dir, "c", false);
        missing.path_on_host = dir.path().join("absent.ext4");
        config.drives = vec![missing];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_snapshot_skips_boot_checks() {
        let dir = TempDir::new().unwrap();
        let mem = dir.path().join("mem");
        let state = dir.path().join("state");
        std::fs::write(&mem, b"mem").unwrap();
        std::fs::write(&state, b"state").unwrap();

        let mut config = MachineConfig {
            snapshot: SnapshotConfig {
                mem_file_path: Some(mem),
                snapshot_path: Some(state.clone()),
                opts: Vec::new(),
            },
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());

        std::fs::remove_file(&state).unwrap();
        assert!(validate_config(&config).is_err());
        config.snapshot = SnapshotConfig::default();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_snapshot_memory_checked_by_backend() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("state");
        let mem = dir.path().join("mem");
        let uffd = dir.path().join("uffd.sock");
        std::fs::write(&state, b"state").unwrap();
        std::fs::write(&mem, b"mem").unwrap();
        let _listener = std::os::unix::net::UnixListener::bind(&uffd).unwrap();

        let snapshot = |mem_file_path: &Path, backend| MachineConfig {
            snapshot: SnapshotConfig {
                mem_file_path: Some(mem_file_path.to_path_buf()),
                snapshot_path: Some(state.clone()),
                opts: vec![LoadSnapshotOpt::MemoryBackend(backend)],
            },
            ..Default::default()
        };

        let uffd_socket = snapshot(&uffd, MemBackendType::Uffd);
        assert!(validate_config(&uffd_socket).is_ok());
        let mem_file = snapshot(&mem, MemBackendType::File);
        assert!(validate_config(&mem_file).is_ok());

        let err = validate_config(&snapshot(&mem, MemBackendType::Uffd)).unwrap_err();
        assert!(err.to_string().contains("uffd handler socket not found"));
        let socket_as_file = snapshot(&uffd, MemBackendType::File);
        assert!(validate_config(&socket_as_file).is_err());
    }

    #[test]
    fn test_network_rules() {
        let mut config = MachineConfig::default();
        config.network_interfaces = vec![iface("eth0", "tap0"), iface("eth1", "tap1")];
        assert!(validate_network(&config).is_ok());

        config.network_interfaces = vec![iface("eth0", "tap0"), iface("eth0", "tap1")];
        assert!(validate_network(&config).is_err());

        config.network_interfaces = vec![iface("eth0", "tap0"), iface("eth1", "tap0")];
        assert!(validate_network(&config).is_err());

        config.network_interfaces = vec![iface("eth0", "")];
        assert!(validate_network(&config).is_err());
    }

    #[test]
    fn test_network_mac_and_static_ip() {
        let mut config = MachineConfig::default();
        let mut eth0 = iface("eth0", "tap0");
        eth0.guest_mac = Some("AA:FC:00:00:00:01".into());
        eth0.static_ip = Some(static_ip(24));
        config.network_interfaces = vec![eth0.clone()];
        assert!(validate_network(&config).is_ok());

        let mut bad_mac = eth0.clone();
        bad_mac.guest_mac = Some("AA:FC:00:00:01".into());
        config.network_interfaces = vec![bad_mac];
        assert!(validate_network(&config).is_err());

        let mut bad_prefix = eth0.clone();
        bad_prefix.static_ip = Some(static_ip(33));
        config.network_interfaces = vec![bad_prefix];
        assert!(validate_network(&config).is_err());

        let mut eth1 = iface("eth1", "tap1");
        eth1.static_ip = Some(static_ip(24));
        config.network_interfaces = vec![eth0, eth1];
        assert!(validate_network(&config).is_err());
    }

    #[test]
    fn test_mac_format() {
        assert!(is_valid_mac("06:00:AC:10:00:02"));
        assert!(!is_valid_mac("06:00:AC:10:00:0G"));
        assert!(!is_valid_mac("0600AC100002"));
    }
}
