//! Sequencing of the two migration phases
use crate::{
    accessor::ClusterAccessor,
    cancel::CancelToken,
    cluster::{ClusterConfiguration, HostConfig, Provider},
    context::Context,
    drain::NodeDrainer,
    error::{MigrationError, NodeFailure},
    executor::Connector,
    kubelet::reconfigure_kubelet,
    manifests::regenerate_manifests,
    node::resolve_hostname,
    poll::Timings,
    status::inspect_ccm_status,
    validate::{validate_complete, validate_start},
    volumes::migrate_persistent_volumes,
};
use anyhow::{Context as _, Result};
use log::info;
use std::cell::Cell;

/// The phase a migration run reached, or halted in on failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Nothing ran yet
    Pending,
    /// Checking configuration and live cluster state before the start
    Validating,
    /// Regenerating the static manifests of the control plane node at index
    RegeneratingManifests(usize),
    /// Reconfiguring the kubelet of the control plane node at index
    ReconfiguringKubelet(usize),
    /// Checking that all worker machines are rolled out
    ValidatingComplete,
    /// Rewriting the persistent volume provisioner annotations
    MigratingVolumes,
    /// The phase finished successfully
    Done,
}

/// Collects the collaborators of a [`Migration`]
pub struct MigrationBuilder {
    cluster: Option<ClusterConfiguration>,
    accessor: Option<Box<dyn ClusterAccessor>>,
    drainer: Option<Box<dyn NodeDrainer>>,
    connector: Option<Box<dyn Connector>>,
    cancel: CancelToken,
    timings: Timings,
    work_dir: String,
    verbose: bool,
}

impl Default for MigrationBuilder {
    fn default() -> Self {
        Self {
            cluster: None,
            accessor: None,
            drainer: None,
            connector: None,
            cancel: CancelToken::never(),
            timings: Timings::default(),
            work_dir: "./kubeone".into(),
            verbose: false,
        }
    }
}

impl MigrationBuilder {
    /// The cluster to be migrated
    pub fn cluster(mut self, cluster: ClusterConfiguration) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// The live cluster API
    pub fn accessor(mut self, accessor: Box<dyn ClusterAccessor>) -> Self {
        self.accessor = Some(accessor);
        self
    }

    /// The node drainer
    pub fn drainer(mut self, drainer: Box<dyn NodeDrainer>) -> Self {
        self.drainer = Some(drainer);
        self
    }

    /// The connector to the control plane nodes
    pub fn connector(mut self, connector: Box<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Observe cancellation through the provided token
    pub fn cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the settle, poll and drain durations
    pub fn timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// The remote work directory containing `cfg/master_<id>.yaml`
    pub fn work_dir(mut self, work_dir: &str) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Enable verbose polling and kubeadm output
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Build the migration, failing if a collaborator is missing
    pub fn build(self) -> Result<Migration> {
        fn required<T>(value: Option<T>, name: &str) -> Result<T> {
            value.ok_or_else(|| MigrationError::precondition(format!("{} not initialized", name)).into())
        }

        Ok(Migration {
            cluster: required(self.cluster, "cluster configuration")?,
            accessor: required(self.accessor, "cluster accessor")?,
            drainer: required(self.drainer, "node drainer")?,
            connector: required(self.connector, "node connector")?,
            cancel: self.cancel,
            timings: self.timings,
            work_dir: self.work_dir,
            verbose: self.verbose,
            phase: Cell::new(Phase::Pending),
        })
    }
}

/// A CCM/CSI migration of a single cluster
pub struct Migration {
    cluster: ClusterConfiguration,
    accessor: Box<dyn ClusterAccessor>,
    drainer: Box<dyn NodeDrainer>,
    connector: Box<dyn Connector>,
    cancel: CancelToken,
    timings: Timings,
    work_dir: String,
    verbose: bool,
    phase: Cell<Phase>,
}

impl Migration {
    /// Create a new builder
    pub fn builder() -> MigrationBuilder {
        MigrationBuilder::default()
    }

    /// The phase the last run reached
    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    fn context(&self) -> Context<'_> {
        Context {
            accessor: self.accessor.as_ref(),
            drainer: self.drainer.as_ref(),
            cancel: self.cancel.clone(),
            timings: self.timings,
            work_dir: self.work_dir.clone(),
            verbose: self.verbose,
        }
    }

    /// Start the migration: switch every control plane node, one after
    /// another, to the external cloud provider.
    pub fn start(&self) -> Result<()> {
        self.phase.set(Phase::Validating);
        let live = inspect_ccm_status(self.accessor.as_ref(), &self.cluster)
            .context("Unable to inspect the live cluster")?;
        validate_start(&self.cluster, &live).context("Unable to start the ccm/csi migration")?;

        info!(
            "Migrating {} control plane nodes",
            self.cluster.control_plane.hosts.len()
        );
        self.cluster
            .control_plane
            .hosts
            .iter()
            .enumerate()
            .try_for_each(|(index, host)| self.migrate_node(index, host))?;

        self.phase.set(Phase::Done);
        info!("Control plane migrated, roll out all worker machines and run complete afterwards");
        Ok(())
    }

    /// Migrate a single control plane node, both steps have to succeed
    /// before the next node is touched.
    fn migrate_node(&self, index: usize, host: &HostConfig) -> Result<(), NodeFailure> {
        let failure = |step, hostname: &str, source| NodeFailure {
            index,
            hostname: hostname.into(),
            step,
            source,
        };
        let ctx = self.context();
        let mut host = host.clone();

        let executor = self
            .connector
            .connect(&host)
            .with_context(|| format!("Unable to connect to {}", host.public_address))
            .map_err(|e| failure("connect", &host.public_address, e))?;
        resolve_hostname(&mut host, executor.as_ref(), &self.cancel)
            .map_err(|e| failure("connect", &host.public_address, e))?;

        self.phase.set(Phase::RegeneratingManifests(index));
        regenerate_manifests(&ctx, &host, executor.as_ref())
            .map_err(|e| failure("manifest regeneration", &host.hostname, e))?;

        self.phase.set(Phase::ReconfiguringKubelet(index));
        reconfigure_kubelet(&ctx, &host, executor.as_ref())
            .map_err(|e| failure("kubelet reconfiguration", &host.hostname, e))?;
        Ok(())
    }

    /// Complete the migration once every worker machine has been rolled out
    /// with the external cloud provider.
    pub fn complete(&self) -> Result<()> {
        self.phase.set(Phase::ValidatingComplete);
        validate_complete(self.accessor.as_ref())
            .context("Unable to complete the ccm/csi migration")?;
        self.cancel.check()?;

        self.phase.set(Phase::MigratingVolumes);
        if self.cluster.cloud_provider.provider() == Some(Provider::Openstack) {
            migrate_persistent_volumes(self.accessor.as_ref(), self.verbose)?;
        } else {
            info!("No persistent volumes to migrate for this provider");
        }

        self.phase.set(Phase::Done);
        info!("The ccm/csi migration is complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cluster::{ProviderSpec, tests::test_cluster},
        executor::RemoteExecutor,
        resources::{
            EXTERNAL_CLOUD_PROVIDER_KUBELET_FLAG, KUBELET_FLAGS_ANNOTATION_PREFIX, Machine,
            PROVISIONED_BY_ANNOTATION, PersistentVolume, Pod,
        },
        tests::{FakeCluster, controller_manager, test_timings},
        volumes::IN_TREE_CINDER,
    };
    use std::sync::Arc;

    /// Shares one fake cluster between all collaborator slots
    struct Shared(Arc<FakeCluster>);

    impl ClusterAccessor for Shared {
        fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
            self.0.get_pod(namespace, name)
        }
        fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>> {
            self.0.list_pods(namespace, selector)
        }
        fn list_machines(&self) -> Result<Vec<Machine>> {
            self.0.list_machines()
        }
        fn list_persistent_volumes(&self) -> Result<Vec<PersistentVolume>> {
            self.0.list_persistent_volumes()
        }
        fn patch_persistent_volume(
            &self,
            modified: &PersistentVolume,
            base: &PersistentVolume,
        ) -> Result<()> {
            self.0.patch_persistent_volume(modified, base)
        }
        fn daemon_set_exists(&self, namespace: &str, name: &str) -> Result<bool> {
            self.0.daemon_set_exists(namespace, name)
        }
    }

    impl NodeDrainer for Shared {
        fn cordon(&self, node: &str, desired: bool) -> Result<()> {
            self.0.cordon(node, desired)
        }
        fn drain(&self, node: &str, cancel: &CancelToken) -> Result<()> {
            self.0.drain(node, cancel)
        }
    }

    impl Connector for Shared {
        fn connect(&self, host: &HostConfig) -> Result<Box<dyn RemoteExecutor>> {
            self.0.connect(host)
        }
    }

    fn in_tree_cluster() -> Arc<FakeCluster> {
        let c = Arc::new(FakeCluster::default());
        c.controller_managers
            .lock()
            .push(controller_manager("cp-0", "openstack"));
        c
    }

    fn migration(c: &Arc<FakeCluster>, cluster: ClusterConfiguration) -> Result<Migration> {
        Migration::builder()
            .cluster(cluster)
            .accessor(Box::new(Shared(c.clone())))
            .drainer(Box::new(Shared(c.clone())))
            .connector(Box::new(Shared(c.clone())))
            .timings(test_timings())
            .build()
    }

    fn node_events(node: &str) -> Vec<String> {
        [
            "regenerate",
            "cordon",
            "drain",
            "kubelet-config",
            "uncordon",
        ]
        .iter()
        .map(|x| format!("{} {}", x, node))
        .collect()
    }

    #[test]
    fn build_failure_missing_accessor() {
        let err = Migration::builder()
            .cluster(test_cluster())
            .build()
            .err()
            .expect("build should fail");
        assert!(matches!(
            MigrationError::find(&err),
            Some(MigrationError::Precondition(_))
        ));
    }

    #[test]
    fn start_success_sequential_nodes() -> Result<()> {
        let c = in_tree_cluster();
        let m = migration(&c, test_cluster())?;
        m.start()?;

        let expected: Vec<String> = ["cp-0", "cp-1", "cp-2"]
            .iter()
            .flat_map(|x| node_events(x))
            .collect();
        assert_eq!(c.events(), expected);
        assert_eq!(m.phase(), Phase::Done);
        Ok(())
    }

    #[test]
    fn start_failure_stops_after_node() -> Result<()> {
        let c = in_tree_cluster();
        *c.fail_drain.lock() = Some("cp-1".into());
        let m = migration(&c, test_cluster())?;

        let err = m.start().unwrap_err();
        let failure = NodeFailure::find(&err).expect("node failure");
        assert_eq!(failure.index, 1);
        assert_eq!(failure.hostname, "cp-1");
        assert!(matches!(
            MigrationError::find(&err),
            Some(MigrationError::Drain { .. })
        ));
        assert_eq!(m.phase(), Phase::ReconfiguringKubelet(1));

        let mut expected = node_events("cp-0");
        expected.extend(["regenerate cp-1".to_owned(), "cordon cp-1".to_owned()]);
        assert_eq!(c.events(), expected);
        Ok(())
    }

    #[test]
    fn start_failure_in_progress() -> Result<()> {
        let c = in_tree_cluster();
        c.daemon_sets
            .lock()
            .push("openstack-cloud-controller-manager".into());
        let m = migration(&c, test_cluster())?;

        let err = m.start().unwrap_err();
        assert!(matches!(
            MigrationError::find(&err),
            Some(MigrationError::State(_))
        ));
        assert_eq!(m.phase(), Phase::Validating);
        assert!(c.events().is_empty());
        Ok(())
    }

    #[test]
    fn start_resolves_missing_hostname() -> Result<()> {
        let c = Arc::new(FakeCluster::default());
        let mut cluster = test_cluster();
        cluster.control_plane.hosts.truncate(1);
        cluster.control_plane.hosts[0].hostname.clear();
        let address = cluster.control_plane.hosts[0].public_address.clone();

        // The static pods only exist under the hostname reported by the node
        c.controller_managers
            .lock()
            .push(controller_manager(&address, "openstack"));
        c.queue_pod_reads(
            "kube-controller-manager-",
            vec![Err(anyhow::anyhow!("pods \"kube-controller-manager-\" not found"))],
        );

        migration(&c, cluster)?.start()?;
        assert_eq!(c.events(), node_events(&address));
        assert_eq!(c.pod_reads("kube-controller-manager-"), 0);
        assert_eq!(
            c.pod_reads(&format!("kube-controller-manager-{}", address)),
            1
        );
        Ok(())
    }

    #[test]
    fn start_failure_unreachable_api() -> Result<()> {
        let c = in_tree_cluster();
        *c.fail_list_pods.lock() = Some("connection refused".into());
        let m = migration(&c, test_cluster())?;

        let err = m.start().unwrap_err();
        assert!(MigrationError::find(&err).is_none());
        assert!(format!("{:#}", err).contains("connection refused"));
        assert_eq!(m.phase(), Phase::Validating);
        assert!(c.events().is_empty());
        Ok(())
    }

    fn rolled_out_machine() -> Machine {
        let mut m = Machine::default();
        m.metadata.annotations.insert(
            format!(
                "{}{}",
                KUBELET_FLAGS_ANNOTATION_PREFIX, EXTERNAL_CLOUD_PROVIDER_KUBELET_FLAG
            ),
            "true".into(),
        );
        m
    }

    fn cinder_volume(name: &str) -> PersistentVolume {
        let mut pv = PersistentVolume::default();
        pv.metadata.name = name.into();
        pv.metadata
            .annotations
            .insert(PROVISIONED_BY_ANNOTATION.into(), IN_TREE_CINDER.into());
        pv
    }

    #[test]
    fn complete_success_openstack() -> Result<()> {
        let c = Arc::new(FakeCluster::default());
        c.machines.lock().push(rolled_out_machine());
        c.volumes.lock().push(cinder_volume("pv-0"));
        let m = migration(&c, test_cluster())?;

        m.complete()?;
        assert_eq!(c.events(), vec!["patch pv-0"]);
        assert_eq!(m.phase(), Phase::Done);
        Ok(())
    }

    #[test]
    fn complete_skips_volumes_for_vsphere() -> Result<()> {
        let c = Arc::new(FakeCluster::default());
        c.volumes.lock().push(cinder_volume("pv-0"));
        let mut cluster = test_cluster();
        cluster.cloud_provider.openstack = None;
        cluster.cloud_provider.vsphere = Some(ProviderSpec {});

        migration(&c, cluster)?.complete()?;
        assert!(c.events().is_empty());
        Ok(())
    }

    #[test]
    fn complete_failure_not_ready() -> Result<()> {
        let c = Arc::new(FakeCluster::default());
        c.machines
            .lock()
            .extend([rolled_out_machine(), Machine::default()]);
        c.volumes.lock().push(cinder_volume("pv-0"));
        let m = migration(&c, test_cluster())?;

        let err = m.complete().unwrap_err();
        assert!(matches!(
            MigrationError::find(&err),
            Some(MigrationError::NotReady(_))
        ));
        assert_eq!(m.phase(), Phase::ValidatingComplete);
        assert!(c.events().is_empty());
        Ok(())
    }
}
