//! Shell scripts executed on the control plane nodes
use std::fmt::Write;

/// The kubeadm verbosity flag for verbose runs
pub const KUBEADM_VERBOSE_FLAG: &str = "--v=6";

/// The kubeadm verbosity flag to be used
pub fn kubeadm_verbose_flag(verbose: bool) -> &'static str {
    if verbose {
        KUBEADM_VERBOSE_FLAG
    } else {
        ""
    }
}

fn kubeadm(verbose_flag: &str) -> String {
    if verbose_flag.is_empty() {
        "sudo kubeadm".into()
    } else {
        format!("sudo kubeadm {}", verbose_flag)
    }
}

fn node_config(work_dir: &str, node_id: usize) -> String {
    format!("--config={}/cfg/master_{}.yaml", work_dir, node_id)
}

/// Re-render the API server and controller-manager static pod manifests
pub fn regenerate_control_plane_manifests(
    work_dir: &str,
    node_id: usize,
    verbose_flag: &str,
) -> String {
    let mut script = String::new();
    for component in &["apiserver", "controller-manager"] {
        writeln!(
            script,
            "{} init phase control-plane {} {}",
            kubeadm(verbose_flag),
            component,
            node_config(work_dir, node_id),
        )
        .ok();
    }
    script
}

/// Rewrite the kubelet configuration and restart the kubelet
pub fn update_kubelet_config(work_dir: &str, node_id: usize, verbose_flag: &str) -> String {
    format!(
        "{} init phase kubelet-start {}\n",
        kubeadm(verbose_flag),
        node_config(work_dir, node_id),
    )
}

/// Query the state of a systemd unit
pub fn systemd_status(unit: &str) -> String {
    format!("systemctl show {} -p LoadState,ActiveState,SubState\n", unit)
}

/// Retrieve the fully qualified hostname
pub fn hostname() -> &'static str {
    "hostname -f\n"
}
