//! Backend configuration
//!
//! A [`ClusterBackendConfig`] describes how nodes are provisioned for one
//! backend instance. It is validated once, when it is built, and is
//! immutable afterwards. Building a config never talks to a provider.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::node::Role;
use crate::provider::MountSet;
use crate::{Error, Result};

/// Login account on every node of a container cluster
pub const DEFAULT_SSH_USER: &str = "root";

/// Linux distribution the node image is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Distribution {
    #[default]
    #[serde(rename = "centos-7")]
    Centos7,
    #[serde(rename = "ubuntu-16.04")]
    Ubuntu1604,
    #[serde(rename = "fedora-23")]
    Fedora23,
    #[serde(rename = "coreos")]
    CoreOs,
    #[serde(rename = "debian-8")]
    Debian8,
}

impl Distribution {
    /// Distributions the container backend can boot DC/OS on
    pub const SUPPORTED: [Distribution; 2] = [Distribution::Centos7, Distribution::CoreOs];

    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self)
    }

    /// Directory under `build/base/` holding this distribution's Dockerfile
    pub fn template_segment(self) -> &'static str {
        match self {
            Distribution::Centos7 => "centos-7",
            Distribution::Ubuntu1604 => "ubuntu-xenial",
            Distribution::Fedora23 => "fedora-23",
            Distribution::CoreOs => "coreos",
            Distribution::Debian8 => "debian-jessie",
        }
    }
}

/// Docker version installed inside every node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DockerVersion {
    #[serde(rename = "1.11.2")]
    V1_11_2,
    #[default]
    #[serde(rename = "1.13.1")]
    V1_13_1,
    #[serde(rename = "17.12.1-ce")]
    V17_12_1Ce,
}

impl DockerVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            DockerVersion::V1_11_2 => "1.11.2",
            DockerVersion::V1_13_1 => "1.13.1",
            DockerVersion::V17_12_1Ce => "17.12.1-ce",
        }
    }
}

/// Storage driver for the Docker daemon inside every node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageDriver {
    Aufs,
    Overlay,
    Overlay2,
}

impl StorageDriver {
    /// Used when the host's driver is not one nodes can run
    pub const FALLBACK: StorageDriver = StorageDriver::Aufs;

    pub fn as_str(self) -> &'static str {
        match self {
            StorageDriver::Aufs => "aufs",
            StorageDriver::Overlay => "overlay",
            StorageDriver::Overlay2 => "overlay2",
        }
    }

    pub fn from_name(name: &str) -> Option<StorageDriver> {
        match name {
            "aufs" => Some(StorageDriver::Aufs),
            "overlay" => Some(StorageDriver::Overlay),
            "overlay2" => Some(StorageDriver::Overlay2),
            _ => None,
        }
    }

    /// Configured driver, else the provider-detected one, else [`Self::FALLBACK`]
    pub fn resolve(configured: Option<StorageDriver>, detected: Option<&str>) -> StorageDriver {
        configured
            .or_else(|| detected.and_then(StorageDriver::from_name))
            .unwrap_or(Self::FALLBACK)
    }
}

/// Validated, immutable description of how to provision cluster nodes
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterBackendConfig {
    workspace_dir: PathBuf,
    template_dir: Option<PathBuf>,
    custom_master_mounts: MountSet,
    custom_agent_mounts: MountSet,
    custom_public_agent_mounts: MountSet,
    linux_distribution: Distribution,
    docker_version: DockerVersion,
    storage_driver: Option<StorageDriver>,
    docker_container_labels: BTreeMap<String, String>,
}

impl ClusterBackendConfig {
    pub fn builder() -> ClusterBackendConfigBuilder {
        ClusterBackendConfigBuilder::default()
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str::<ClusterBackendConfigBuilder>(content)?.build()
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Directory large temporary files are created under
    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    /// Template tree copied into every staging area, if not the built-in one
    pub fn template_dir(&self) -> Option<&Path> {
        self.template_dir.as_deref()
    }

    pub fn custom_mounts(&self, role: Role) -> &MountSet {
        match role {
            Role::Master => &self.custom_master_mounts,
            Role::Agent => &self.custom_agent_mounts,
            Role::PublicAgent => &self.custom_public_agent_mounts,
        }
    }

    pub fn linux_distribution(&self) -> Distribution {
        self.linux_distribution
    }

    pub fn docker_version(&self) -> DockerVersion {
        self.docker_version
    }

    /// Explicitly configured storage driver; `None` means ask the provider
    pub fn storage_driver(&self) -> Option<StorageDriver> {
        self.storage_driver
    }

    pub fn docker_container_labels(&self) -> &BTreeMap<String, String> {
        &self.docker_container_labels
    }

    pub fn default_ssh_user(&self) -> &'static str {
        DEFAULT_SSH_USER
    }
}

/// Unvalidated backend options, also the on-disk TOML shape
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterBackendConfigBuilder {
    pub workspace_dir: Option<PathBuf>,
    pub template_dir: Option<PathBuf>,
    pub custom_master_mounts: MountSet,
    pub custom_agent_mounts: MountSet,
    pub custom_public_agent_mounts: MountSet,
    pub linux_distribution: Distribution,
    pub docker_version: DockerVersion,
    pub storage_driver: Option<StorageDriver>,
    pub docker_container_labels: BTreeMap<String, String>,
}

impl ClusterBackendConfigBuilder {
    pub fn workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_dir = Some(dir.into());
        self
    }

    pub fn template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.template_dir = Some(dir.into());
        self
    }

    pub fn custom_mounts(mut self, role: Role, mounts: MountSet) -> Self {
        match role {
            Role::Master => self.custom_master_mounts = mounts,
            Role::Agent => self.custom_agent_mounts = mounts,
            Role::PublicAgent => self.custom_public_agent_mounts = mounts,
        }
        self
    }

    pub fn linux_distribution(mut self, distribution: Distribution) -> Self {
        self.linux_distribution = distribution;
        self
    }

    pub fn docker_version(mut self, version: DockerVersion) -> Self {
        self.docker_version = version;
        self
    }

    pub fn storage_driver(mut self, driver: StorageDriver) -> Self {
        self.storage_driver = Some(driver);
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.docker_container_labels.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<ClusterBackendConfig> {
        if !self.linux_distribution.is_supported() {
            return Err(Error::configuration(format!(
                "{:?} is not supported by the docker backend (supported: {:?})",
                self.linux_distribution,
                Distribution::SUPPORTED
            )));
        }

        for role in Role::ALL {
            let mounts = match role {
                Role::Master => &self.custom_master_mounts,
                Role::Agent => &self.custom_agent_mounts,
                Role::PublicAgent => &self.custom_public_agent_mounts,
            };
            if let Some((source, mount)) = mounts.iter().find(|(_, m)| !m.bind.starts_with('/')) {
                return Err(Error::configuration(format!(
                    "custom {role} mount {source}: target {} must be an absolute path",
                    mount.bind
                )));
            }
        }

        if self.docker_container_labels.keys().any(|k| k.is_empty()) {
            return Err(Error::configuration("container label keys must not be empty"));
        }

        Ok(ClusterBackendConfig {
            workspace_dir: self.workspace_dir.unwrap_or_else(std::env::temp_dir),
            template_dir: self.template_dir,
            custom_master_mounts: self.custom_master_mounts,
            custom_agent_mounts: self.custom_agent_mounts,
            custom_public_agent_mounts: self.custom_public_agent_mounts,
            linux_distribution: self.linux_distribution,
            docker_version: self.docker_version,
            storage_driver: self.storage_driver,
            docker_container_labels: self.docker_container_labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{AccessMode, VolumeMount};

    #[test]
    fn defaults_are_centos_and_docker_1_13() {
        let config = ClusterBackendConfig::builder().build().unwrap();
        assert_eq!(config.linux_distribution(), Distribution::Centos7);
        assert_eq!(config.docker_version(), DockerVersion::V1_13_1);
        assert_eq!(config.storage_driver(), None);
        assert_eq!(config.workspace_dir(), std::env::temp_dir());
        assert_eq!(config.default_ssh_user(), "root");
    }

    #[test]
    fn unsupported_distribution_is_rejected() {
        for distribution in [
            Distribution::Ubuntu1604,
            Distribution::Fedora23,
            Distribution::Debian8,
        ] {
            let err = ClusterBackendConfig::builder()
                .linux_distribution(distribution)
                .build()
                .unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{distribution:?}");
        }

        assert!(
            ClusterBackendConfig::builder()
                .linux_distribution(Distribution::CoreOs)
                .build()
                .is_ok()
        );
    }

    #[test]
    fn relative_mount_target_is_rejected() {
        let mut mounts = MountSet::new();
        mounts.insert("/host".into(), VolumeMount::new("data", AccessMode::ReadOnly));

        let err = ClusterBackendConfig::builder()
            .custom_mounts(Role::Agent, mounts)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("custom agent mount /host"));
    }

    #[test]
    fn storage_driver_resolution() {
        assert_eq!(
            StorageDriver::resolve(Some(StorageDriver::Overlay), Some("overlay2")),
            StorageDriver::Overlay
        );
        assert_eq!(
            StorageDriver::resolve(None, Some("overlay2")),
            StorageDriver::Overlay2
        );
        assert_eq!(StorageDriver::resolve(None, Some("btrfs")), StorageDriver::Aufs);
        assert_eq!(StorageDriver::resolve(None, None), StorageDriver::Aufs);
    }

    #[test]
    fn parses_toml() {
        let config = ClusterBackendConfig::from_toml_str(
            r#"
workspace_dir = "/var/tmp/e2e"
linux_distribution = "coreos"
docker_version = "17.12.1-ce"
storage_driver = "overlay2"

[custom_master_mounts."/host/a"]
bind = "/data"
mode = "ro"

[docker_container_labels]
team = "infra"
"#,
        )
        .unwrap();

        assert_eq!(config.workspace_dir(), Path::new("/var/tmp/e2e"));
        assert_eq!(config.linux_distribution(), Distribution::CoreOs);
        assert_eq!(config.docker_version(), DockerVersion::V17_12_1Ce);
        assert_eq!(config.storage_driver(), Some(StorageDriver::Overlay2));
        assert_eq!(
            config.custom_mounts(Role::Master)["/host/a"],
            VolumeMount::new("/data", AccessMode::ReadOnly)
        );
        assert!(config.custom_mounts(Role::Agent).is_empty());
        assert_eq!(config.docker_container_labels()["team"], "infra");
    }

    #[test]
    fn unsupported_distribution_in_toml_is_a_configuration_error() {
        let err = ClusterBackendConfig::from_toml_str(r#"linux_distribution = "debian-8""#)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = ClusterBackendConfig::from_toml_str(r#"linux_distribution = "arch""#)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
