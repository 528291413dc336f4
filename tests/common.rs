#![allow(dead_code)]
use anyhow::{Result, anyhow, bail};
use ccmigrate::{
    CancelToken, ClusterAccessor, ClusterConfiguration, Connector, Container, HostConfig, Machine,
    Migration, NodeDrainer, PROVISIONED_BY_ANNOTATION, PersistentVolume, Pod, PodCondition,
    PollPolicy, RemoteExecutor, Timings,
};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};

pub const OPENSTACK_MANIFEST: &str = r#"
name: integration
controlPlane:
  hosts:
    - publicAddress: 192.0.2.10
      hostname: cp-0
    - publicAddress: 192.0.2.11
      hostname: cp-1
    - publicAddress: 192.0.2.12
      hostname: cp-2
cloudProvider:
  external: true
  openstack: {}
"#;

/// Everything the fake cluster observed and is configured to do
#[derive(Default)]
pub struct State {
    pub calls: Vec<String>,
    pub in_tree: bool,
    pub ccm_deployed: bool,
    pub volumes: Vec<PersistentVolume>,
    pub machines: Vec<Machine>,
    pub fail_drain: Option<String>,
    pub fail_list_pods: bool,
}

/// A scripted cluster, cloneable into all collaborators of a migration
#[derive(Clone, Default)]
pub struct World {
    pub state: Arc<Mutex<State>>,
}

impl World {
    pub fn in_tree() -> Self {
        let w = Self::default();
        w.state.lock().in_tree = true;
        w
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().calls.push(call);
    }

    pub fn migration(&self, manifest: &str) -> Result<Migration> {
        Migration::builder()
            .cluster(ClusterConfiguration::from_yaml(manifest)?)
            .accessor(Box::new(self.clone()))
            .drainer(Box::new(self.clone()))
            .connector(Box::new(self.clone()))
            .timings(timings())
            .build()
    }
}

pub fn timings() -> Timings {
    Timings {
        settle: Duration::from_millis(1),
        poll: PollPolicy {
            interval: Duration::from_millis(5),
            timeout: Duration::from_millis(200),
        },
        drain: Duration::from_secs(1),
    }
}

pub fn volume(name: &str, provisioner: &str) -> PersistentVolume {
    let mut pv = PersistentVolume::default();
    pv.metadata.name = name.into();
    pv.metadata.resource_version = "1".into();
    pv.metadata
        .annotations
        .insert(PROVISIONED_BY_ANNOTATION.into(), provisioner.into());
    pv
}

fn running_pod(cloud_provider: &str) -> Pod {
    let mut pod = Pod::default();
    pod.spec.containers.push(Container {
        name: "kube-controller-manager".into(),
        command: vec![format!("--cloud-provider={}", cloud_provider)],
        args: vec![],
    });
    pod.status.phase = "Running".into();
    pod.status.conditions = ["Ready", "ContainersReady"]
        .iter()
        .map(|x| PodCondition {
            type_: (*x).into(),
            status: "True".into(),
        })
        .collect();
    pod
}

impl ClusterAccessor for World {
    fn get_pod(&self, _: &str, _: &str) -> Result<Pod> {
        let in_tree = self.state.lock().in_tree;
        Ok(running_pod(if in_tree { "openstack" } else { "external" }))
    }

    fn list_pods(&self, _: &str, _: &str) -> Result<Vec<Pod>> {
        let state = self.state.lock();
        if state.fail_list_pods {
            bail!("connection refused")
        }
        let provider = if state.in_tree { "openstack" } else { "external" };
        Ok((0..3).map(|_| running_pod(provider)).collect())
    }

    fn list_machines(&self) -> Result<Vec<Machine>> {
        self.record("list machines".into());
        Ok(self.state.lock().machines.clone())
    }

    fn list_persistent_volumes(&self) -> Result<Vec<PersistentVolume>> {
        Ok(self.state.lock().volumes.clone())
    }

    fn patch_persistent_volume(
        &self,
        modified: &PersistentVolume,
        base: &PersistentVolume,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let stored = state
            .volumes
            .iter_mut()
            .find(|x| x.metadata.name == base.metadata.name)
            .ok_or_else(|| anyhow!("persistentvolume {} not found", base.metadata.name))?;
        if stored.metadata.resource_version != base.metadata.resource_version {
            bail!("conflict")
        }
        *stored = modified.clone();
        state.calls.push(format!("patch {}", base.metadata.name));
        Ok(())
    }

    fn daemon_set_exists(&self, _: &str, _: &str) -> Result<bool> {
        Ok(self.state.lock().ccm_deployed)
    }
}

impl NodeDrainer for World {
    fn cordon(&self, node: &str, desired: bool) -> Result<()> {
        let action = if desired { "cordon" } else { "uncordon" };
        self.record(format!("{} {}", action, node));
        Ok(())
    }

    fn drain(&self, node: &str, cancel: &CancelToken) -> Result<()> {
        cancel.check()?;
        if self.state.lock().fail_drain.as_deref() == Some(node) {
            bail!("eviction blocked by a pod disruption budget")
        }
        self.record(format!("drain {}", node));
        Ok(())
    }
}

impl Connector for World {
    fn connect(&self, host: &HostConfig) -> Result<Box<dyn RemoteExecutor>> {
        Ok(Box::new(Node {
            world: self.clone(),
            hostname: host.hostname.clone(),
        }))
    }
}

/// A control plane node which runs every script successfully
pub struct Node {
    world: World,
    hostname: String,
}

impl RemoteExecutor for Node {
    fn run_raw(&self, command: &str, cancel: &CancelToken) -> Result<(String, String)> {
        cancel.check()?;
        if command.contains("systemctl show") {
            return Ok((
                "LoadState=loaded\nActiveState=active\nSubState=running\n".into(),
                String::new(),
            ));
        }
        if command.contains("kubelet-start") {
            // The kubelet now runs with the external cloud provider
            self.world.state.lock().in_tree = false;
            self.world.record(format!("kubelet-config {}", self.hostname));
        } else if command.contains("control-plane") {
            self.world.record(format!("regenerate {}", self.hostname));
        } else if command.contains("hostname") {
            return Ok((format!("{}\n", self.hostname), String::new()));
        }
        Ok((String::new(), String::new()))
    }
}
