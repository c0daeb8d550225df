//! Resource provider abstraction
//!
//! A [`ResourceProvider`] is anything that can create compute resources, run
//! processes inside them, report their addresses, accept file copies and
//! destroy them again. The cluster manager and the installation flows are
//! written once against this trait; each backend (container engine, cloud
//! API, hypervisor) plugs in its own implementation.

mod docker;

pub use docker::DockerProvider;

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::Result;

/// Name prefix of the per-node state volumes generated at provisioning time.
/// Providers remove attached volumes carrying this prefix when a resource is
/// destroyed.
pub const STATE_VOLUME_PREFIX: &str = "dcos-e2e-state-";

/// Whether a mount is writable from inside the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AccessMode {
    #[serde(rename = "ro")]
    ReadOnly,
    #[serde(rename = "rw")]
    ReadWrite,
}

impl AccessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessMode::ReadOnly => "ro",
            AccessMode::ReadWrite => "rw",
        }
    }
}

/// Where a host path or named volume is mounted inside a resource
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VolumeMount {
    pub bind: String,
    pub mode: AccessMode,
}

impl VolumeMount {
    pub fn new(bind: impl Into<String>, mode: AccessMode) -> Self {
        Self {
            bind: bind.into(),
            mode,
        }
    }
}

/// Host path or volume name -> mount target
pub type MountSet = BTreeMap<String, VolumeMount>;

/// Everything needed to create one resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProvisionSpec {
    pub name: String,
    pub image: String,
    pub privileged: bool,
    pub hostname: String,
    pub environment: BTreeMap<String, String>,
    /// Hostname -> address entries added to the resource's hosts file
    pub extra_hosts: BTreeMap<String, String>,
    pub mounts: MountSet,
    /// Path -> mount options
    pub tmpfs: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

/// A resource as reported by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionedResource {
    pub name: String,
    pub id: String,
    /// `None` while the resource has no network address (e.g. stopped)
    pub address: Option<IpAddr>,
    pub labels: BTreeMap<String, String>,
}

/// Result of running a command inside a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    /// stdout followed by stderr
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A file or directory copy between the host and a resource
#[derive(Debug, Clone, PartialEq)]
pub enum FileCopy {
    ToResource {
        resource: String,
        host_path: PathBuf,
        resource_path: PathBuf,
    },
    FromResource {
        resource: String,
        resource_path: PathBuf,
        host_path: PathBuf,
    },
}

/// An image built from a Dockerfile inside a build context
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuild {
    pub context_dir: PathBuf,
    /// Relative to `context_dir`
    pub dockerfile: PathBuf,
    pub tag: String,
    pub build_args: BTreeMap<String, String>,
}

#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Short backend name used in logs and errors
    fn name(&self) -> &'static str;

    /// Whether nodes boot from images that must be built before provisioning
    fn requires_image_build(&self) -> bool {
        false
    }

    /// Create a resource. Fails with [`crate::Error::Provisioning`] when the
    /// platform rejects the [`ProvisionSpec`].
    async fn provision(&self, spec: &ProvisionSpec) -> Result<ProvisionedResource>;

    /// Run `argv` inside the named resource and wait for it to finish.
    /// A non-zero exit code is not an error; there is no retry.
    async fn run_command(&self, resource: &str, argv: &[String]) -> Result<CommandOutput>;

    /// All resources whose name starts with `prefix`
    async fn list_by_name_prefix(&self, prefix: &str) -> Result<Vec<ProvisionedResource>>;

    /// Stop and remove a resource along with its generated state volumes.
    /// A resource that is already gone counts as destroyed.
    async fn destroy(&self, resource: &str) -> Result<()>;

    async fn copy_file(&self, copy: &FileCopy) -> Result<()>;

    /// Build (or rebuild) a tagged image. Building the same tag twice simply
    /// overwrites it, so concurrent callers racing on one tag are safe.
    async fn build_image(&self, _build: &ImageBuild) -> Result<()> {
        Ok(())
    }

    /// The storage driver the provider's own runtime uses, if it has one
    async fn host_storage_driver(&self) -> Result<Option<String>> {
        Ok(None)
    }

    /// Download an installer artifact to a host path
    async fn fetch_artifact(&self, _url: &str, _destination: &Path) -> Result<()> {
        Err(crate::Error::UnsupportedOperation {
            backend: self.name(),
            operation: "install from URL",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mounts_deserialize_from_toml() {
        let mounts: MountSet = toml::from_str(
            r#"
"/host/a" = { bind = "/data", mode = "ro" }
named = { bind = "/cache", mode = "rw" }
"#,
        )
        .unwrap();

        assert_eq!(mounts["/host/a"], VolumeMount::new("/data", AccessMode::ReadOnly));
        assert_eq!(mounts["named"].mode, AccessMode::ReadWrite);
    }
}
