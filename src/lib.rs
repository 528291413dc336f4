//! # ccmigrate
//!
//! Migrates kubeadm provisioned clusters from the in-tree cloud provider to
//! the external cloud controller manager and CSI driver. The migration runs
//! in two phases: [`Migration::start`] switches the control plane nodes one
//! after another, [`Migration::complete`] finishes the migration once all
//! worker machines are rolled out.
#![deny(missing_docs)]

mod accessor;
mod cancel;
mod cluster;
mod config;
mod context;
mod drain;
mod error;
mod executor;
mod kubectl;
mod kubelet;
mod logger;
mod manifests;
mod migration;
mod node;
mod pod;
mod poll;
mod progress;
mod resources;
mod scripts;
mod status;
mod system;
mod validate;
mod volumes;


pub use accessor::ClusterAccessor;
pub use cancel::{CancelHandle, CancelToken};
pub use cluster::{
    CloudProviderSpec, ClusterConfiguration, HostConfig, HostList, Provider, ProviderSpec,
};
pub use config::{Config, SubCommand};
pub use context::Context;
pub use drain::NodeDrainer;
pub use error::{MigrationError, NodeFailure};
pub use executor::{Connector, RemoteExecutor, SshConnector};
pub use kubectl::Kubectl;
pub use kubelet::{ServiceStatus, reconfigure_kubelet};
pub use manifests::regenerate_manifests;
pub use migration::{Migration, MigrationBuilder, Phase};
pub use pod::wait_for_static_pod;
pub use poll::{PollPolicy, Readiness, Timings};
pub use resources::{
    Container, EXTERNAL_CLOUD_PROVIDER_KUBELET_FLAG, KUBELET_FLAGS_ANNOTATION_PREFIX, Machine,
    NAMESPACE_SYSTEM, ObjectMeta, PROVISIONED_BY_ANNOTATION, PersistentVolume, Pod, PodCondition,
    PodSpec, PodStatus, conditional_merge_patch,
};
pub use status::{LiveClusterStatus, inspect_ccm_status};
pub use validate::{validate_complete, validate_start};
pub use volumes::{CSI_CINDER, IN_TREE_CINDER, migrate_persistent_volumes};

use anyhow::{Context as _, Result, bail};
use log::info;
use logger::Logger;
use progress::Progress;

/// The main entry point for the application
pub struct Ccmigrate;

impl Ccmigrate {
    /// Run the migration phase selected by the provided configuration
    pub fn run(config: Config) -> Result<()> {
        log::set_boxed_logger(Logger::new(config.log_level()))
            .context("Unable to set logger")?;

        let subcommand = match config.subcommand() {
            Some(s) => s,
            None => bail!("No migration phase selected, use either `start` or `complete`"),
        };

        info!("Loading cluster manifest {}", config.manifest().display());
        let cluster = ClusterConfiguration::from_file(config.manifest())?;
        let timings = config.timings();

        let kubectl = Kubectl::new(config.kubeconfig(), timings.drain)?;
        let drainer = kubectl.clone();
        let connector = SshConnector::new(config.ssh_user(), config.ssh_key().cloned())?;

        let (handle, cancel) = CancelHandle::new();
        handle.on_signals()?;

        let migration = Migration::builder()
            .cluster(cluster)
            .accessor(Box::new(kubectl))
            .drainer(Box::new(drainer))
            .connector(Box::new(connector))
            .cancel(cancel)
            .timings(timings)
            .work_dir(config.work_dir())
            .verbose(config.verbose())
            .build()?;

        let progress = Progress::new(config.log_level(), config.verbose());
        let res = match subcommand {
            SubCommand::Start => migration.start(),
            SubCommand::Complete => migration.complete(),
        };
        progress.reset();

        res.with_context(|| format!("Migration halted in phase {:?}", migration.phase()))
    }
}
