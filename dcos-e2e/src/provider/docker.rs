//! Docker container-engine provider
//!
//! Drives the `docker` CLI. Every node is a privileged container running
//! systemd, so the distributed OS can manage its own services inside it.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::net::IpAddr;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use super::{
    CommandOutput, FileCopy, ImageBuild, ProvisionSpec, ProvisionedResource, ResourceProvider,
    STATE_VOLUME_PREFIX,
};
use crate::{Error, Result};

const DEFAULT_NETWORK: &str = "bridge";

/// Provider backed by a local Docker daemon
#[derive(Debug, Clone)]
pub struct DockerProvider {
    binary: PathBuf,
}

impl Default for DockerProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerProvider {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("docker"),
        }
    }

    /// Use a specific `docker` executable
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn docker<I, S>(&self, args: I) -> Result<std::process::Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd.kill_on_drop(true);

        cmd.output().await.map_err(|e| {
            Error::provider(format!(
                "failed to run {}: {e}. Make sure Docker is installed and running, and that \
                 you can run \"docker ps\"",
                self.binary.display()
            ))
        })
    }

    /// Run docker and fail with a provider error on non-zero exit
    async fn docker_ok<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.docker(args).await?;
        if !output.status.success() {
            return Err(Error::provider(stderr_of(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn inspect(&self, names: &[String]) -> Result<Vec<ContainerInspect>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec!["container".to_string(), "inspect".to_string()];
        args.extend(names.iter().cloned());
        let output = self.docker(&args).await?;

        // Containers can disappear between `ps` and `inspect`; docker still
        // prints the ones it found and exits non-zero.
        if !output.status.success() && !is_missing(&stderr_of(&output)) {
            return Err(Error::provider(stderr_of(&output)));
        }
        if output.stdout.is_empty() {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[async_trait]
impl ResourceProvider for DockerProvider {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn requires_image_build(&self) -> bool {
        true
    }

    async fn provision(&self, spec: &ProvisionSpec) -> Result<ProvisionedResource> {
        let args = run_args(spec);
        tracing::debug!(name = %spec.name, image = %spec.image, "docker run");

        let output = self.docker(&args).await?;
        if !output.status.success() {
            return Err(Error::provisioning(format!(
                "docker rejected container {}: {}",
                spec.name,
                stderr_of(&output)
            )));
        }

        self.inspect(std::slice::from_ref(&spec.name))
            .await?
            .into_iter()
            .next()
            .map(ContainerInspect::into_resource)
            .ok_or_else(|| {
                Error::provisioning(format!("container {} vanished after start", spec.name))
            })
    }

    async fn run_command(&self, resource: &str, argv: &[String]) -> Result<CommandOutput> {
        tracing::debug!(resource, ?argv, "docker exec");

        let mut args = vec!["exec".to_string(), resource.to_string()];
        args.extend(argv.iter().cloned());
        let output = self.docker(&args).await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() && is_missing(&stderr) {
            return Err(Error::provider(format!("{resource}: {}", stderr.trim())));
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&stderr);

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            output: combined,
        })
    }

    async fn list_by_name_prefix(&self, prefix: &str) -> Result<Vec<ProvisionedResource>> {
        let filter = format!("name={prefix}");
        let stdout = self
            .docker_ok(["ps", "--all", "--filter", filter.as_str(), "--format", "{{.Names}}"])
            .await?;

        // The name filter matches substrings anywhere in the name.
        let names: Vec<String> = stdout
            .lines()
            .map(str::trim)
            .filter(|n| n.starts_with(prefix))
            .map(String::from)
            .collect();

        Ok(self
            .inspect(&names)
            .await?
            .into_iter()
            .map(ContainerInspect::into_resource)
            .collect())
    }

    async fn destroy(&self, resource: &str) -> Result<()> {
        let volumes = match self.inspect(&[resource.to_string()]).await?.into_iter().next() {
            Some(container) => container.state_volumes(),
            None => {
                tracing::debug!(resource, "container already gone");
                return Ok(());
            }
        };

        let output = self.docker(["stop", resource]).await?;
        if !output.status.success() && !is_missing(&stderr_of(&output)) {
            return Err(Error::provider(format!("stop {resource}: {}", stderr_of(&output))));
        }

        let output = self.docker(["rm", "--force", "--volumes", resource]).await?;
        if !output.status.success() && !is_missing(&stderr_of(&output)) {
            return Err(Error::provider(format!("rm {resource}: {}", stderr_of(&output))));
        }

        for volume in volumes {
            let output = self.docker(["volume", "rm", "--force", volume.as_str()]).await?;
            if !output.status.success() {
                tracing::warn!(resource, volume = %volume, error = %stderr_of(&output), "failed to remove state volume");
            }
        }

        Ok(())
    }

    async fn copy_file(&self, copy: &FileCopy) -> Result<()> {
        let (src, dst) = match copy {
            FileCopy::ToResource {
                resource,
                host_path,
                resource_path,
            } => (
                host_path.display().to_string(),
                format!("{resource}:{}", resource_path.display()),
            ),
            FileCopy::FromResource {
                resource,
                resource_path,
                host_path,
            } => (
                format!("{resource}:{}", resource_path.display()),
                host_path.display().to_string(),
            ),
        };

        self.docker_ok(["cp", src.as_str(), dst.as_str()]).await?;
        Ok(())
    }

    async fn build_image(&self, build: &ImageBuild) -> Result<()> {
        tracing::info!(tag = %build.tag, dockerfile = %build.dockerfile.display(), "building image");

        let dockerfile = build.context_dir.join(&build.dockerfile);
        let mut args: Vec<&OsStr> = vec![
            OsStr::new("build"),
            OsStr::new("--rm"),
            OsStr::new("--force-rm"),
            OsStr::new("--tag"),
            OsStr::new(&build.tag),
            OsStr::new("--file"),
            dockerfile.as_os_str(),
        ];
        let build_args: Vec<String> = build
            .build_args
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        for arg in &build_args {
            args.push(OsStr::new("--build-arg"));
            args.push(OsStr::new(arg));
        }
        args.push(build.context_dir.as_os_str());

        let output = self.docker(args).await?;

        if !output.status.success() {
            return Err(Error::provisioning(format!(
                "failed to build image {}: {}",
                build.tag,
                stderr_of(&output)
            )));
        }
        Ok(())
    }

    async fn host_storage_driver(&self) -> Result<Option<String>> {
        let driver = self.docker_ok(["info", "--format", "{{.Driver}}"]).await?;
        let driver = driver.trim();
        Ok((!driver.is_empty()).then(|| driver.to_string()))
    }
}

/// Arguments for `docker run` that start a node container detached
fn run_args(spec: &ProvisionSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--detach".to_string(),
        "--tty".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--hostname".to_string(),
        spec.hostname.clone(),
    ];

    if spec.privileged {
        args.push("--privileged".to_string());
    }
    for (key, value) in &spec.environment {
        args.push("--env".to_string());
        args.push(format!("{key}={value}"));
    }
    for (host, address) in &spec.extra_hosts {
        args.push("--add-host".to_string());
        args.push(format!("{host}:{address}"));
    }
    for (source, mount) in &spec.mounts {
        args.push("--volume".to_string());
        args.push(format!("{source}:{}:{}", mount.bind, mount.mode.as_str()));
    }
    for (path, options) in &spec.tmpfs {
        args.push("--tmpfs".to_string());
        args.push(format!("{path}:{options}"));
    }
    for (key, value) in &spec.labels {
        args.push("--label".to_string());
        args.push(format!("{key}={value}"));
    }

    args.push(spec.image.clone());
    args
}

fn stderr_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn is_missing(stderr: &str) -> bool {
    stderr.contains("No such container") || stderr.contains("No such object")
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerInspect {
    id: String,
    name: String,
    #[serde(default)]
    config: InspectConfig,
    #[serde(default)]
    network_settings: InspectNetworkSettings,
    #[serde(default)]
    mounts: Vec<InspectMount>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    // `null` when the container has no labels
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectNetworkSettings {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
    #[serde(default)]
    networks: Option<BTreeMap<String, InspectEndpoint>>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct InspectEndpoint {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectMount {
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(default)]
    name: Option<String>,
}

impl ContainerInspect {
    /// The default bridge address, or the address on the single
    /// user-defined network a container was attached to.
    fn address(&self) -> Option<IpAddr> {
        if let Ok(ip) = self.network_settings.ip_address.parse() {
            return Some(ip);
        }

        let networks = self.network_settings.networks.as_ref()?;
        let endpoint = match networks.get(DEFAULT_NETWORK) {
            Some(bridge) if networks.len() == 1 => bridge,
            _ => networks
                .iter()
                .find(|(name, _)| name.as_str() != DEFAULT_NETWORK)
                .map(|(_, endpoint)| endpoint)?,
        };
        endpoint.ip_address.parse().ok()
    }

    fn state_volumes(&self) -> Vec<String> {
        self.mounts
            .iter()
            .filter(|m| m.kind == "volume")
            .filter_map(|m| m.name.clone())
            .filter(|name| name.starts_with(STATE_VOLUME_PREFIX))
            .collect()
    }

    fn into_resource(self) -> ProvisionedResource {
        let address = self.address();
        ProvisionedResource {
            name: self.name.trim_start_matches('/').to_string(),
            id: self.id,
            address,
            labels: self.config.labels.unwrap_or_default(),
        }
    }
}
