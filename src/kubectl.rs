use crate::{
    accessor::ClusterAccessor,
    cancel::CancelToken,
    drain::NodeDrainer,
    resources::{List, Machine, PersistentVolume, Pod, conditional_merge_patch},
    system::System,
};
use anyhow::{Context, Result, bail};
use log::{debug, trace};
use serde::de::DeserializeOwned;
use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
    time::Duration,
};

const MACHINES: &str = "machines.cluster.k8s.io";

/// Cluster access through the `kubectl` binary
#[derive(Clone, Debug)]
pub struct Kubectl {
    executable: PathBuf,
    kubeconfig: PathBuf,
    drain_timeout: Duration,
}

impl Kubectl {
    /// Create a new kubectl wrapper for the provided kubeconfig
    pub fn new(kubeconfig: &Path, drain_timeout: Duration) -> Result<Self> {
        Ok(Self {
            executable: System::find_executable("kubectl")?,
            kubeconfig: kubeconfig.into(),
            drain_timeout,
        })
    }

    /// Run a generic kubectl command
    pub fn execute(&self, args: &[&str]) -> Result<Output> {
        self.execute_until(args, &CancelToken::never())
    }

    /// Run a generic kubectl command, killing it on cancellation
    pub fn execute_until(&self, args: &[&str], cancel: &CancelToken) -> Result<Output> {
        trace!("kubectl args: {:?}", args);
        let output = System::run(
            Command::new(&self.executable)
                .args(args)
                .arg("--kubeconfig")
                .arg(&self.kubeconfig),
            None,
            cancel,
        )?;
        if !output.status.success() {
            debug!("kubectl args: {:?}", args);
            debug!("kubectl stdout: {}", String::from_utf8_lossy(&output.stdout));
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("kubectl {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(output)
    }

    /// Run kubectl get and decode the JSON output
    fn get<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let mut final_args = vec!["get"];
        final_args.extend(args);
        final_args.extend(["-o", "json"]);
        let output = self.execute(&final_args)?;
        serde_json::from_slice(&output.stdout)
            .with_context(|| format!("Unable to decode output of kubectl get {}", args.join(" ")))
    }
}

impl ClusterAccessor for Kubectl {
    fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.get(&["pod", "--namespace", namespace, name])
    }

    fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
        let list: List<Pod> = self.get(&["pods", "--namespace", namespace, "--selector", selector])?;
        Ok(list.items)
    }

    fn list_machines(&self) -> Result<Vec<Machine>> {
        let list: List<Machine> = self.get(&[MACHINES, "--all-namespaces"])?;
        Ok(list.items)
    }

    fn list_persistent_volumes(&self) -> Result<Vec<PersistentVolume>> {
        let list: List<PersistentVolume> = self.get(&["persistentvolumes"])?;
        Ok(list.items)
    }

    fn patch_persistent_volume(
        &self,
        modified: &PersistentVolume,
        base: &PersistentVolume,
    ) -> Result<()> {
        let patch = conditional_merge_patch(
            &base.metadata,
            &serde_json::to_value(base)?,
            &serde_json::to_value(modified)?,
        );
        let patch = serde_json::to_string(&patch)?;
        self.execute(&[
            "patch",
            "persistentvolume",
            &base.metadata.name,
            "--type",
            "merge",
            "--patch",
            &patch,
        ])?;
        Ok(())
    }

    fn daemon_set_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        let output = self.execute(&[
            "get",
            "daemonsets",
            "--namespace",
            namespace,
            "--field-selector",
            &format!("metadata.name={}", name),
            "-o",
            "name",
        ])?;
        Ok(!String::from_utf8(output.stdout)?.trim().is_empty())
    }
}

impl NodeDrainer for Kubectl {
    fn cordon(&self, node: &str, desired: bool) -> Result<()> {
        let action = if desired { "cordon" } else { "uncordon" };
        self.execute(&[action, node])?;
        Ok(())
    }

    fn drain(&self, node: &str, cancel: &CancelToken) -> Result<()> {
        let timeout = format!("--timeout={}s", self.drain_timeout.as_secs());
        self.execute_until(
            &[
                "drain",
                node,
                "--ignore-daemonsets",
                "--delete-emptydir-data",
                "--force",
                &timeout,
            ],
            cancel,
        )?;
        Ok(())
    }
}
