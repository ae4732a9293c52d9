//! Task: kernel command line.
//!
//! Renders a static guest IP configuration into the kernel `ip=` argument,
//! replacing any `ip=` already present.

use super::task_start;
use crate::machine::init::types::MachineContext;
use crate::pipeline::PipelineTask;
use crate::vmm::models::StaticIpConfig;
use async_trait::async_trait;
use fclite_shared::errors::FcliteResult;

pub struct SetupKernelArgsTask;

#[async_trait]
impl PipelineTask<MachineContext> for SetupKernelArgsTask {
    async fn run(&self, ctx: &mut MachineContext) -> FcliteResult<()> {
        task_start(ctx, "setup_kernel_args");

        let ip_arg = ctx
            .config
            .network_interfaces
            .iter()
            .enumerate()
            .find_map(|(index, iface)| iface.static_ip.as_ref().map(|ip| ip_boot_arg(index, ip)));

        if let Some(ip_arg) = ip_arg {
            ctx.config.kernel_args = with_ip_arg(&ctx.config.kernel_args, &ip_arg);
            tracing::debug!(vm_id = %ctx.vm_id, args = %ctx.config.kernel_args, "Kernel args updated");
        }
        Ok(())
    }
}

/// `ip=<client>::<gateway>:<netmask>:<hostname>:<device>:off`
fn ip_boot_arg(index: usize, ip: &StaticIpConfig) -> String {
    format!(
        "ip={}::{}:{}:{}:eth{}:off",
        ip.ip,
        ip.gateway,
        ip.netmask(),
        ip.hostname.as_deref().unwrap_or(""),
        index
    )
}

fn with_ip_arg(args: &str, ip_arg: &str) -> String {
    args.split_whitespace()
        .filter(|token| !token.starts_with("ip="))
        .chain(std::iter::once(ip_arg))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn static_ip(hostname: Option<&str>) -> StaticIpConfig {
        StaticIpConfig {
            ip: Ipv4Addr::new(172, 16, 0, 2),
            prefix_len: 24,
            gateway: Ipv4Addr::new(172, 16, 0, 1),
            hostname: hostname.map(str::to_string),
        }
    }

    #[test]
    fn test_ip_boot_arg() {
        assert_eq!(
            ip_boot_arg(0, &static_ip(None)),
            "ip=172.16.0.2::172.16.0.1:255.255.255.0::eth0:off"
        );
        assert_eq!(
            ip_boot_arg(1, &static_ip(Some("vm1"))),
            "ip=172.16.0.2::172.16.0.1:255.255.255.0:vm1:eth1:off"
        );
    }

    #[test]
    fn test_with_ip_arg_replaces_existing() {
        assert_eq!(
            with_ip_arg("console=ttyS0 ip=dhcp  panic=1", "ip=new"),
            "console=ttyS0 panic=1 ip=new"
        );
        assert_eq!(with_ip_arg("", "ip=new"), "ip=new");
    }
}
