//! Cluster lifecycle: provision, bootstrap, query and destroy nodes
//!
//! Every resource a cluster owns is named `<cluster-id>-<role>-<n>`, so the
//! provider itself is the source of truth: node accessors and `destroy` list
//! resources by role prefix every time instead of remembering what was
//! created. Resources changed outside this process (a container removed by
//! hand) are picked up on the next call.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::{StreamExt, TryStreamExt};

use crate::config::{ClusterBackendConfig, DEFAULT_SSH_USER, StorageDriver};
use crate::node::{Node, Role};
use crate::provider::{
    AccessMode, CommandOutput, FileCopy, ImageBuild, MountSet, ProvisionSpec, ProvisionedResource,
    ResourceProvider, STATE_VOLUME_PREFIX, VolumeMount,
};
use crate::staging::{StagedFile, StagingArea};
use crate::templates;
use crate::{Error, Result};

/// Every cluster identity starts with this
pub const CLUSTER_ID_PREFIX: &str = "dcos-e2e-";
pub const CLUSTER_ID_LABEL: &str = "dcos_e2e.cluster_id";
pub const WORKSPACE_LABEL: &str = "dcos_e2e.workspace_dir";
pub const NODE_TYPE_LABEL: &str = "node_type";

/// Where the installer's serve directory is visible inside every node
pub const INSTALL_TMP_DIR: &str = "/opt/dcos_install_tmp";

const REGISTRY_HOST: &str = "registry.local";
const LOOPBACK: &str = "127.0.0.1";
const TMPFS_OPTIONS: &str = "rw,exec,nosuid,size=2097152k";
const IMAGE_REPOSITORY: &str = "mesosphere/dcos-docker";
const PROVISION_CONCURRENCY: usize = 8;

/// Lifecycle state of a [`Cluster`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterState {
    Uninitialized,
    Provisioning,
    Ready,
    Installing,
    Destroying,
    Destroyed,
}

/// A live cluster on some [`ResourceProvider`].
///
/// Dropping a `Cluster` does not destroy anything; call [`Cluster::destroy`].
pub struct Cluster {
    provider: Arc<dyn ResourceProvider>,
    cluster_id: String,
    staging: StagingArea,
    default_ssh_user: String,
    state: ClusterState,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("provider", &self.provider.name())
            .field("cluster_id", &self.cluster_id)
            .field("staging", &self.staging.root())
            .field("state", &self.state)
            .finish()
    }
}

impl Cluster {
    /// Provision and bootstrap a new cluster.
    ///
    /// On failure every resource created so far is torn down again before the
    /// error is returned.
    pub async fn create(
        provider: Arc<dyn ResourceProvider>,
        config: &ClusterBackendConfig,
        masters: usize,
        agents: usize,
        public_agents: usize,
        files_to_copy: &[StagedFile],
    ) -> Result<Cluster> {
        if masters == 0 {
            return Err(Error::configuration("a cluster needs at least one master"));
        }

        let cluster_id = format!("{CLUSTER_ID_PREFIX}{}", uuid::Uuid::new_v4());
        let storage_driver = match config.storage_driver() {
            Some(driver) => driver,
            None => {
                let detected = provider.host_storage_driver().await?;
                StorageDriver::resolve(None, detected.as_deref())
            }
        };
        tracing::info!(
            cluster_id = %cluster_id,
            masters,
            agents,
            public_agents,
            storage_driver = storage_driver.as_str(),
            "creating cluster"
        );

        let (staging, public_key) = {
            let config = config.clone();
            let cluster_id = cluster_id.clone();
            let files = files_to_copy.to_vec();
            tokio::task::spawn_blocking(move || {
                StagingArea::create(&config, &cluster_id, &files, storage_driver)
            })
            .await
            .map_err(|e| Error::provisioning(format!("staging task failed: {e}")))??
        };

        let mut cluster = Cluster {
            provider,
            cluster_id,
            staging,
            default_ssh_user: config.default_ssh_user().to_string(),
            state: ClusterState::Uninitialized,
        };

        let counts = Counts {
            masters,
            agents,
            public_agents,
        };
        cluster.state = ClusterState::Provisioning;
        if let Err(e) = cluster.provision(config, counts, &public_key).await {
            tracing::error!(cluster_id = %cluster.cluster_id, error = %e, "cluster creation failed, cleaning up");
            if let Err(teardown) = cluster.destroy().await {
                tracing::warn!(cluster_id = %cluster.cluster_id, error = %teardown, "cleanup after failed create was incomplete");
            }
            return Err(e);
        }

        cluster.state = ClusterState::Ready;
        tracing::info!(cluster_id = %cluster.cluster_id, "cluster ready");
        Ok(cluster)
    }

    /// Rebuild a handle for a cluster created elsewhere, from the labels on
    /// its live resources.
    pub async fn attach(provider: Arc<dyn ResourceProvider>, cluster_id: &str) -> Result<Cluster> {
        let mut workspace = None;
        for role in Role::ALL {
            let resources = provider
                .list_by_name_prefix(&role_prefix(cluster_id, role))
                .await?;
            workspace = resources
                .into_iter()
                .find_map(|r| r.labels.get(WORKSPACE_LABEL).cloned());
            if workspace.is_some() {
                break;
            }
        }

        let workspace = workspace.ok_or_else(|| {
            Error::invalid_state(format!("no live resources belong to cluster {cluster_id}"))
        })?;

        Ok(Cluster {
            provider,
            cluster_id: cluster_id.to_string(),
            staging: StagingArea::open(workspace),
            default_ssh_user: DEFAULT_SSH_USER.to_string(),
            state: ClusterState::Ready,
        })
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    pub fn provider(&self) -> &Arc<dyn ResourceProvider> {
        &self.provider
    }

    pub fn staging_root(&self) -> &Path {
        self.staging.root()
    }

    pub fn ssh_key_path(&self) -> PathBuf {
        self.staging.ssh_key_path()
    }

    pub fn default_ssh_user(&self) -> &str {
        &self.default_ssh_user
    }

    /// Name prefix shared by all resources of one role
    pub fn role_prefix(&self, role: Role) -> String {
        role_prefix(&self.cluster_id, role)
    }

    pub async fn masters(&self) -> Result<Vec<Node>> {
        self.nodes(Role::Master).await
    }

    pub async fn agents(&self) -> Result<Vec<Node>> {
        self.nodes(Role::Agent).await
    }

    pub async fn public_agents(&self) -> Result<Vec<Node>> {
        self.nodes(Role::PublicAgent).await
    }

    /// Nodes of one role as the provider reports them right now, in
    /// provisioning order
    pub async fn nodes(&self, role: Role) -> Result<Vec<Node>> {
        self.ensure_not_destroyed("list nodes")?;

        let mut resources = self
            .provider
            .list_by_name_prefix(&self.role_prefix(role))
            .await?;
        resources.sort_by_key(|r| node_number(&r.name));

        Ok(resources
            .into_iter()
            .filter_map(|resource| {
                let Some(address) = resource.address else {
                    tracing::warn!(resource = %resource.name, "resource has no address, skipping");
                    return None;
                };
                Some(Node {
                    name: resource.name,
                    public_ip_address: address,
                    private_ip_address: address,
                    default_ssh_user: self.default_ssh_user.clone(),
                    ssh_key_path: self.staging.ssh_key_path(),
                    role,
                })
            })
            .collect())
    }

    pub async fn run_on_node(&self, node: &Node, argv: &[String]) -> Result<CommandOutput> {
        self.ensure_not_destroyed("run a command")?;
        self.provider.run_command(&node.name, argv).await
    }

    /// Copy a host file or directory onto a node
    pub async fn send_file(&self, node: &Node, host_path: &Path, node_path: &Path) -> Result<()> {
        self.ensure_not_destroyed("copy a file")?;
        self.provider
            .copy_file(&FileCopy::ToResource {
                resource: node.name.clone(),
                host_path: host_path.to_path_buf(),
                resource_path: node_path.to_path_buf(),
            })
            .await
    }

    /// Copy a file or directory from a node to the host
    pub async fn fetch_file(&self, node: &Node, node_path: &Path, host_path: &Path) -> Result<()> {
        self.ensure_not_destroyed("copy a file")?;
        self.provider
            .copy_file(&FileCopy::FromResource {
                resource: node.name.clone(),
                resource_path: node_path.to_path_buf(),
                host_path: host_path.to_path_buf(),
            })
            .await
    }

    /// Remove every resource of the cluster and its staging area.
    ///
    /// Resources that are already gone are fine. Provider failures do not
    /// stop the teardown; they are collected into [`Error::Teardown`] and
    /// the cluster stays in [`ClusterState::Destroying`] so destroy can be
    /// retried.
    pub async fn destroy(&mut self) -> Result<()> {
        if self.state == ClusterState::Destroyed {
            tracing::debug!(cluster_id = %self.cluster_id, "cluster already destroyed");
            return Ok(());
        }
        self.state = ClusterState::Destroying;
        tracing::info!(cluster_id = %self.cluster_id, "destroying cluster");

        let per_role =
            futures_util::future::join_all(Role::ALL.map(|role| self.destroy_role(role))).await;
        let failures: Vec<String> = per_role.into_iter().flatten().collect();

        self.staging.remove();

        if !failures.is_empty() {
            return Err(Error::Teardown(failures));
        }

        self.state = ClusterState::Destroyed;
        tracing::info!(cluster_id = %self.cluster_id, "cluster destroyed");
        Ok(())
    }

    async fn destroy_role(&self, role: Role) -> Vec<String> {
        let prefix = self.role_prefix(role);
        let resources = match self.provider.list_by_name_prefix(&prefix).await {
            Ok(resources) => resources,
            Err(e) => return vec![format!("list {prefix}*: {e}")],
        };

        let mut failures = Vec::new();
        for resource in resources {
            tracing::debug!(resource = %resource.name, "destroying resource");
            if let Err(e) = self.provider.destroy(&resource.name).await {
                tracing::warn!(resource = %resource.name, error = %e, "failed to destroy resource");
                failures.push(format!("{}: {e}", resource.name));
            }
        }
        failures
    }

    pub(crate) fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub(crate) fn ensure_not_destroyed(&self, operation: &str) -> Result<()> {
        match self.state {
            ClusterState::Destroying | ClusterState::Destroyed => Err(Error::invalid_state(format!(
                "cannot {operation}: cluster {} is {:?}",
                self.cluster_id, self.state
            ))),
            _ => Ok(()),
        }
    }

    /// Enter [`ClusterState::Installing`]; only allowed from `Ready`. The
    /// cluster goes back to `Ready` when the guard drops, including when the
    /// install future is cancelled.
    pub(crate) fn begin_install(&mut self, operation: &str) -> Result<InstallGuard<'_>> {
        if self.state != ClusterState::Ready {
            return Err(Error::invalid_state(format!(
                "cannot {operation}: cluster {} is {:?}",
                self.cluster_id, self.state
            )));
        }
        self.state = ClusterState::Installing;
        Ok(InstallGuard { cluster: self })
    }

    async fn provision(
        &self,
        config: &ClusterBackendConfig,
        counts: Counts,
        public_key: &str,
    ) -> Result<()> {
        let image = self.build_images(config).await?;
        let blueprint = Blueprint {
            cluster_id: &self.cluster_id,
            config,
            staging: &self.staging,
            image: &image,
            counts,
        };

        // The first master comes up alone: every other node maps the
        // registry host to its address.
        let first_master = self
            .provider
            .provision(&blueprint.spec(Role::Master, 1, LOOPBACK))
            .await?;
        let registry_address = first_master
            .address
            .ok_or_else(|| {
                Error::provisioning(format!("{} came up without an address", first_master.name))
            })?
            .to_string();

        let mut specs = Vec::new();
        for (role, count) in [
            (Role::Master, counts.masters),
            (Role::Agent, counts.agents),
            (Role::PublicAgent, counts.public_agents),
        ] {
            let first = if role == Role::Master { 2 } else { 1 };
            for number in first..=count {
                specs.push(blueprint.spec(role, number, &registry_address));
            }
        }

        // Every provision runs to completion before the first error is
        // returned. A dropped request can still create its resource after
        // cleanup has listed the cluster's prefixes.
        let provider = &self.provider;
        let outcomes: Vec<Result<ProvisionedResource>> = futures_util::stream::iter(specs.iter())
            .map(|spec| provider.provision(spec))
            .buffer_unordered(PROVISION_CONCURRENCY)
            .collect()
            .await;
        let mut resources = outcomes.into_iter().collect::<Result<Vec<_>>>()?;
        resources.insert(0, first_master);

        futures_util::stream::iter(resources.iter())
            .map(|resource| self.bootstrap(&resource.name, public_key))
            .buffer_unordered(PROVISION_CONCURRENCY)
            .try_collect::<Vec<()>>()
            .await?;

        for resource in &resources {
            self.clear_nologin(&resource.name).await;
        }
        Ok(())
    }

    /// Build the OS image and the Docker layer on top of it, returning the
    /// tag nodes boot from.
    async fn build_images(&self, config: &ClusterBackendConfig) -> Result<String> {
        let distribution = config.linux_distribution();
        let docker_version = config.docker_version();
        let base_tag = format!("{IMAGE_REPOSITORY}:base-{}", distribution.template_segment());
        let node_tag = format!(
            "{IMAGE_REPOSITORY}:{}-docker-{}",
            distribution.template_segment(),
            docker_version.as_str()
        );

        if !self.provider.requires_image_build() {
            return Ok(node_tag);
        }

        self.provider
            .build_image(&ImageBuild {
                context_dir: self.staging.root().to_path_buf(),
                dockerfile: templates::base_dockerfile(distribution),
                tag: base_tag.clone(),
                build_args: BTreeMap::new(),
            })
            .await?;
        self.provider
            .build_image(&ImageBuild {
                context_dir: self.staging.root().to_path_buf(),
                dockerfile: templates::docker_dockerfile(docker_version),
                tag: node_tag.clone(),
                build_args: BTreeMap::from([(templates::BASE_IMAGE_ARG.to_string(), base_tag)]),
            })
            .await?;

        Ok(node_tag)
    }

    async fn bootstrap(&self, resource: &str, public_key: &str) -> Result<()> {
        for argv in bootstrap_commands(public_key) {
            let output = self.provider.run_command(resource, &argv).await?;
            if !output.success() {
                return Err(Error::provisioning(format!(
                    "bootstrap command {argv:?} on {resource} exited with {}: {}",
                    output.exit_code,
                    output.output.trim()
                )));
            }
        }
        tracing::debug!(resource, "node bootstrapped");
        Ok(())
    }

    async fn clear_nologin(&self, resource: &str) {
        let argv = shell("rm -f /run/nologin || true");
        match self.provider.run_command(resource, &argv).await {
            Ok(output) if output.success() => {}
            Ok(output) => {
                tracing::warn!(resource, exit_code = output.exit_code, "could not remove /run/nologin");
            }
            Err(e) => tracing::warn!(resource, error = %e, "could not remove /run/nologin"),
        }
    }
}

/// Identities of the clusters that currently have resources on `provider`
pub async fn existing_cluster_ids(provider: &dyn ResourceProvider) -> Result<BTreeSet<String>> {
    Ok(provider
        .list_by_name_prefix(CLUSTER_ID_PREFIX)
        .await?
        .into_iter()
        .filter_map(|r| r.labels.get(CLUSTER_ID_LABEL).cloned())
        .collect())
}

/// Holds a cluster in [`ClusterState::Installing`]
pub(crate) struct InstallGuard<'a> {
    cluster: &'a mut Cluster,
}

impl std::ops::Deref for InstallGuard<'_> {
    type Target = Cluster;

    fn deref(&self) -> &Cluster {
        self.cluster
    }
}

impl Drop for InstallGuard<'_> {
    fn drop(&mut self) {
        self.cluster.state = ClusterState::Ready;
    }
}

fn role_prefix(cluster_id: &str, role: Role) -> String {
    format!("{cluster_id}-{}-", role.label())
}

/// Trailing `-<n>` of a resource name; unnumbered names sort last
fn node_number(name: &str) -> (usize, String) {
    let number = name
        .rsplit('-')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(usize::MAX);
    (number, name.to_string())
}

fn shell(script: &str) -> Vec<String> {
    vec!["/bin/bash".to_string(), "-c".to_string(), script.to_string()]
}

/// Commands run once on every new node before anything is installed
pub(crate) fn bootstrap_commands(public_key: &str) -> Vec<Vec<String>> {
    let argv = |args: &[&str]| args.iter().map(|a| a.to_string()).collect::<Vec<_>>();
    vec![
        argv(&["mkdir", "-p", "/var/lib/dcos"]),
        // Mesos must not try to talk to systemd inside the container.
        shell("echo 'MESOS_SYSTEMD_ENABLE_SUPPORT=false' >> /var/lib/dcos/mesos-slave-common"),
        argv(&["systemctl", "start", "sshd.service"]),
        argv(&["mkdir", "--parents", "/root/.ssh"]),
        shell(&format!(
            "echo '{}' >> /root/.ssh/authorized_keys",
            public_key.trim()
        )),
    ]
}

#[derive(Debug, Clone, Copy)]
struct Counts {
    masters: usize,
    agents: usize,
    public_agents: usize,
}

/// Everything needed to describe one node to the provider
struct Blueprint<'a> {
    cluster_id: &'a str,
    config: &'a ClusterBackendConfig,
    staging: &'a StagingArea,
    image: &'a str,
    counts: Counts,
}

impl Blueprint<'_> {
    fn spec(&self, role: Role, number: usize, registry_address: &str) -> ProvisionSpec {
        let name = format!("{}{number}", role_prefix(self.cluster_id, role));

        let mut labels = self.config.docker_container_labels().clone();
        labels.insert(CLUSTER_ID_LABEL.to_string(), self.cluster_id.to_string());
        labels.insert(
            WORKSPACE_LABEL.to_string(),
            self.staging.root().display().to_string(),
        );
        labels.insert(NODE_TYPE_LABEL.to_string(), role.label().to_string());

        ProvisionSpec {
            image: self.image.to_string(),
            privileged: true,
            hostname: name.clone(),
            environment: BTreeMap::from([
                ("container".to_string(), name.clone()),
                ("DCOS_NUM_MASTERS".to_string(), self.counts.masters.to_string()),
                (
                    "DCOS_NUM_AGENTS".to_string(),
                    (self.counts.agents + self.counts.public_agents).to_string(),
                ),
            ]),
            extra_hosts: BTreeMap::from([(
                REGISTRY_HOST.to_string(),
                registry_address.to_string(),
            )]),
            mounts: node_mounts(self.config, self.staging, role),
            tmpfs: ["/run", "/tmp"]
                .into_iter()
                .map(|path| (path.to_string(), TMPFS_OPTIONS.to_string()))
                .collect(),
            labels,
            name,
        }
    }
}

/// Mounts for one node: staging binds, role binds, the caller's custom
/// mounts and fresh state volumes that no other node shares.
pub(crate) fn node_mounts(
    config: &ClusterBackendConfig,
    staging: &StagingArea,
    role: Role,
) -> MountSet {
    let mut mounts = MountSet::new();
    mounts.insert(
        staging.certs_dir().display().to_string(),
        VolumeMount::new("/etc/docker/certs.d", AccessMode::ReadWrite),
    );
    mounts.insert(
        staging.serve_dir().display().to_string(),
        VolumeMount::new(INSTALL_TMP_DIR, AccessMode::ReadOnly),
    );
    if role != Role::Master {
        mounts.insert(
            "/sys/fs/cgroup".to_string(),
            VolumeMount::new("/sys/fs/cgroup", AccessMode::ReadOnly),
        );
    }

    mounts.extend(config.custom_mounts(role).clone());

    let mut state_paths = vec!["/var/lib/docker", "/opt"];
    if role != Role::Master {
        state_paths.push("/var/lib/mesos/slave");
    }
    for path in state_paths {
        mounts.insert(
            format!("{STATE_VOLUME_PREFIX}{}", uuid::Uuid::new_v4().simple()),
            VolumeMount::new(path, AccessMode::ReadWrite),
        );
    }

    mounts
}

/// Address lists handed to the installer, per role
pub(crate) fn addresses(nodes: &[Node]) -> Vec<IpAddr> {
    nodes.iter().map(|n| n.private_ip_address).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging(config: &ClusterBackendConfig) -> StagingArea {
        StagingArea::create(config, "dcos-e2e-test", &[], StorageDriver::Aufs)
            .unwrap()
            .0
    }

    #[test]
    fn custom_mounts_sit_next_to_state_volumes() {
        let workspace = tempfile::tempdir().unwrap();
        let config = ClusterBackendConfig::builder()
            .workspace_dir(workspace.path())
            .custom_mounts(
                Role::Master,
                MountSet::from([(
                    "/host/a".to_string(),
                    VolumeMount::new("/data", AccessMode::ReadOnly),
                )]),
            )
            .build()
            .unwrap();
        let staging = staging(&config);

        let mounts = node_mounts(&config, &staging, Role::Master);
        assert_eq!(
            mounts["/host/a"],
            VolumeMount::new("/data", AccessMode::ReadOnly)
        );

        let state: Vec<&str> = mounts
            .iter()
            .filter(|(source, _)| source.starts_with(STATE_VOLUME_PREFIX))
            .map(|(_, m)| m.bind.as_str())
            .collect();
        assert_eq!(state.len(), 2);
        assert!(state.contains(&"/var/lib/docker"));
        assert!(state.contains(&"/opt"));
        assert_eq!(
            mounts[&staging.serve_dir().display().to_string()].bind,
            INSTALL_TMP_DIR
        );
        assert!(!mounts.contains_key("/sys/fs/cgroup"));
    }

    #[test]
    fn agents_get_cgroups_and_a_third_state_volume() {
        let workspace = tempfile::tempdir().unwrap();
        let config = ClusterBackendConfig::builder()
            .workspace_dir(workspace.path())
            .build()
            .unwrap();
        let staging = staging(&config);

        for role in [Role::Agent, Role::PublicAgent] {
            let mounts = node_mounts(&config, &staging, role);
            assert_eq!(mounts["/sys/fs/cgroup"].mode, AccessMode::ReadOnly);
            assert!(
                mounts
                    .values()
                    .any(|m| m.bind == "/var/lib/mesos/slave")
            );
        }

        let a: BTreeSet<String> = node_mounts(&config, &staging, Role::Agent)
            .into_keys()
            .filter(|k| k.starts_with(STATE_VOLUME_PREFIX))
            .collect();
        let b: BTreeSet<String> = node_mounts(&config, &staging, Role::Agent)
            .into_keys()
            .filter(|k| k.starts_with(STATE_VOLUME_PREFIX))
            .collect();
        assert!(a.is_disjoint(&b));
    }

    #[test]
    fn role_label_wins_over_caller_label() {
        let workspace = tempfile::tempdir().unwrap();
        let config = ClusterBackendConfig::builder()
            .workspace_dir(workspace.path())
            .label(NODE_TYPE_LABEL, "mine")
            .label("team", "infra")
            .build()
            .unwrap();
        let staging = staging(&config);
        let blueprint = Blueprint {
            cluster_id: "dcos-e2e-x",
            config: &config,
            staging: &staging,
            image: "img",
            counts: Counts {
                masters: 3,
                agents: 2,
                public_agents: 1,
            },
        };

        let spec = blueprint.spec(Role::PublicAgent, 1, "172.17.0.2");
        assert_eq!(spec.name, "dcos-e2e-x-public_agent-1");
        assert_eq!(spec.hostname, spec.name);
        assert_eq!(spec.labels[NODE_TYPE_LABEL], "public_agent");
        assert_eq!(spec.labels["team"], "infra");
        assert_eq!(spec.labels[CLUSTER_ID_LABEL], "dcos-e2e-x");
        assert_eq!(spec.environment["DCOS_NUM_MASTERS"], "3");
        assert_eq!(spec.environment["DCOS_NUM_AGENTS"], "3");
        assert_eq!(spec.extra_hosts[REGISTRY_HOST], "172.17.0.2");
        assert_eq!(spec.tmpfs["/tmp"], TMPFS_OPTIONS);
        assert!(spec.privileged);
    }

    #[test]
    fn bootstrap_sequence_authorises_the_key_last() {
        let commands = bootstrap_commands("ssh-rsa AAAA dcos-e2e\n");
        assert_eq!(commands.len(), 5);
        assert_eq!(commands[0], ["mkdir", "-p", "/var/lib/dcos"]);
        assert_eq!(commands[2], ["systemctl", "start", "sshd.service"]);
        assert_eq!(
            commands[4][2],
            "echo 'ssh-rsa AAAA dcos-e2e' >> /root/.ssh/authorized_keys"
        );
    }

    #[test]
    fn nodes_sort_numerically() {
        let mut names = vec!["c-agent-10", "c-agent-2", "c-agent-1"];
        names.sort_by_key(|n| node_number(n));
        assert_eq!(names, ["c-agent-1", "c-agent-2", "c-agent-10"]);
    }
}
