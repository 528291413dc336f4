//! The user supplied cluster description
use crate::error::MigrationError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, fs::read_to_string, path::Path};

/// Static description of the target cluster, read only during a run
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfiguration {
    /// The name of the cluster
    #[serde(default)]
    pub name: String,

    /// The control plane nodes
    pub control_plane: HostList,

    /// The cloud provider selection
    pub cloud_provider: CloudProviderSpec,

    /// Worker nodes provisioned by kubeadm instead of the machine-controller
    #[serde(default)]
    pub static_workers: HostList,
}

/// A list of hosts
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct HostList {
    /// All hosts in their stable order
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

/// Connection and identity metadata of a single node
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// Assigned from the position in the host list on load
    #[serde(skip)]
    pub id: usize,

    /// Externally reachable address, used for SSH
    pub public_address: String,

    /// Internal address
    #[serde(default)]
    pub private_address: String,

    /// The hostname(1) of the node, resolved over SSH if empty
    #[serde(default)]
    pub hostname: String,

    /// SSH port, defaults to 22
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_port: Option<u16>,

    /// SSH login name, defaults to the global SSH user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_username: Option<String>,

    /// SSH private key file, defaults to the global SSH key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_private_key_file: Option<String>,

    /// Jump host in `[user@]host[:port]` notation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bastion: Option<String>,
}

/// Empty provider marker, the provider specific settings are not needed here
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProviderSpec {}

/// The cloud provider configuration, exactly one provider has to be set
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudProviderSpec {
    /// Run the provider integration out-of-tree
    #[serde(default)]
    pub external: bool,

    /// The cloud config blob
    #[serde(default)]
    pub cloud_config: String,

    /// The CSI driver config blob
    #[serde(default)]
    pub csi_config: String,

    /// Amazon Web Services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<ProviderSpec>,

    /// Microsoft Azure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<ProviderSpec>,

    /// DigitalOcean
    #[serde(
        default,
        rename = "digitalocean",
        skip_serializing_if = "Option::is_none"
    )]
    pub digital_ocean: Option<ProviderSpec>,

    /// Google Compute Engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gce: Option<ProviderSpec>,

    /// Hetzner Cloud
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hetzner: Option<ProviderSpec>,

    /// OpenStack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openstack: Option<ProviderSpec>,

    /// Equinix Metal (Packet)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet: Option<ProviderSpec>,

    /// VMware vSphere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vsphere: Option<ProviderSpec>,

    /// No cloud provider integration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub none: Option<ProviderSpec>,
}

/// All known cloud providers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Provider {
    Aws,
    Azure,
    DigitalOcean,
    Gce,
    Hetzner,
    Openstack,
    Packet,
    Vsphere,
    None,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
            Provider::DigitalOcean => "digitalocean",
            Provider::Gce => "gce",
            Provider::Hetzner => "hetzner",
            Provider::Openstack => "openstack",
            Provider::Packet => "packet",
            Provider::Vsphere => "vsphere",
            Provider::None => "none",
        };
        write!(f, "{}", name)
    }
}

impl CloudProviderSpec {
    /// All providers which are set
    pub fn providers(&self) -> Vec<Provider> {
        [
            (self.aws.is_some(), Provider::Aws),
            (self.azure.is_some(), Provider::Azure),
            (self.digital_ocean.is_some(), Provider::DigitalOcean),
            (self.gce.is_some(), Provider::Gce),
            (self.hetzner.is_some(), Provider::Hetzner),
            (self.openstack.is_some(), Provider::Openstack),
            (self.packet.is_some(), Provider::Packet),
            (self.vsphere.is_some(), Provider::Vsphere),
            (self.none.is_some(), Provider::None),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, p)| *p)
        .collect()
    }

    /// The selected provider, if exactly one is set
    pub fn provider(&self) -> Option<Provider> {
        match self.providers().as_slice() {
            [p] => Some(*p),
            _ => None,
        }
    }

    /// Returns true if the selected provider can be migrated to CCM/CSI
    pub fn csi_migration_supported(&self) -> bool {
        matches!(
            self.provider(),
            Some(Provider::Openstack) | Some(Provider::Vsphere)
        )
    }
}

impl ClusterConfiguration {
    /// Load the cluster configuration from a YAML manifest
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = read_to_string(path)
            .with_context(|| format!("Unable to read cluster manifest '{}'", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Unable to load cluster manifest '{}'", path.display()))
    }

    /// Parse the cluster configuration, assign host IDs and verify the
    /// provider selection
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut cluster: Self = serde_yml::from_str(content)?;

        match cluster.cloud_provider.providers().len() {
            0 => return Err(MigrationError::configuration("no cloud provider specified").into()),
            1 => {}
            _ => {
                return Err(MigrationError::configuration(
                    "only one cloud provider can be specified at the same time",
                )
                .into());
            }
        }
        if cluster.control_plane.hosts.is_empty() {
            return Err(MigrationError::configuration("no control plane hosts specified").into());
        }

        for (i, host) in cluster.control_plane.hosts.iter_mut().enumerate() {
            host.id = i;
        }
        for (i, host) in cluster.static_workers.hosts.iter_mut().enumerate() {
            host.id = i;
        }
        Ok(cluster)
    }
}
