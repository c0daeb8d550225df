//! Installing and upgrading DC/OS on a provisioned cluster
//!
//! Installation has two phases. The installer artifact first runs on the
//! host in offline generate-config mode, which writes per-role install
//! scripts into the staging area's serve directory. Every node sees that
//! directory at [`INSTALL_TMP_DIR`] and then runs the script for its role.
//! A failing generate step aborts the install; a failing node does not stop
//! the other nodes, and all node failures are reported together.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::cluster::{Cluster, INSTALL_TMP_DIR, addresses};
use crate::error::NodeInstallFailure;
use crate::node::{Node, Role};
use crate::{Error, Result};

/// Caller-supplied installer options, merged over the generated ones
pub type ExtraConfig = BTreeMap<String, serde_yaml::Value>;

/// Where a downloaded installer is kept inside the staging area
const DOWNLOADED_INSTALLER: &str = "dcos_generate_config.sh";

/// Installer options written to `genconf/config.yaml`
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct InstallationConfig(BTreeMap<String, serde_yaml::Value>);

impl InstallationConfig {
    /// Options every cluster needs, derived from its node addresses
    pub fn base(
        masters: &[Node],
        agents: &[Node],
        public_agents: &[Node],
        ssh_user: &str,
    ) -> Self {
        let list = |nodes: &[Node]| {
            serde_yaml::Value::Sequence(
                addresses(nodes)
                    .into_iter()
                    .map(|ip| ip.to_string().into())
                    .collect(),
            )
        };

        let mut options: BTreeMap<String, serde_yaml::Value> = BTreeMap::new();
        options.insert("agent_list".into(), list(agents));
        options.insert(
            "bootstrap_url".into(),
            format!("file://{INSTALL_TMP_DIR}").into(),
        );
        // Quoted in the generated file; the installer expects strings here.
        options.insert("check_time".into(), "false".into());
        options.insert("cluster_name".into(), "DCOS".into());
        options.insert("exhibitor_storage_backend".into(), "static".into());
        options.insert("master_discovery".into(), "static".into());
        options.insert("master_list".into(), list(masters));
        options.insert("process_timeout".into(), serde_yaml::Value::from(10000_u32));
        options.insert("public_agent_list".into(), list(public_agents));
        options.insert(
            "resolvers".into(),
            serde_yaml::Value::Sequence(vec!["8.8.8.8".into()]),
        );
        options.insert("ssh_port".into(), serde_yaml::Value::from(22_u16));
        options.insert("ssh_user".into(), ssh_user.into());
        Self(options)
    }

    /// Overlay caller options; on a key collision the caller wins
    pub fn merge(mut self, extra: &ExtraConfig) -> Self {
        self.0
            .extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.0.get(key)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl Cluster {
    /// Install DC/OS from an installer artifact on the host.
    ///
    /// Nodes are installed role by role: masters, then agents, then public
    /// agents. Fails with [`Error::PerNodeInstall`] listing every node whose
    /// install script failed, after all nodes were attempted.
    pub async fn install_from_path(
        &mut self,
        artifact: &Path,
        extra_config: &ExtraConfig,
        log_output_live: bool,
    ) -> Result<()> {
        let cluster = self.begin_install("install DC/OS")?;
        cluster
            .generate_config(artifact, extra_config, log_output_live)
            .await?;
        let failures = cluster.install_roles(&Role::ALL).await?;
        into_result(failures)
    }

    /// Install DC/OS from an installer URL, if the provider can download it.
    ///
    /// The Docker provider cannot; it fails with
    /// [`Error::UnsupportedOperation`] before anything is attempted.
    pub async fn install_from_url(
        &mut self,
        url: &str,
        extra_config: &ExtraConfig,
        log_output_live: bool,
    ) -> Result<()> {
        let artifact = {
            let cluster = self.begin_install("install DC/OS")?;
            let artifact = cluster.staging().root().join(DOWNLOADED_INSTALLER);
            cluster.provider().fetch_artifact(url, &artifact).await?;
            artifact
        };
        tracing::info!(url, path = %artifact.display(), "downloaded installer");
        self.install_from_path(&artifact, extra_config, log_output_live)
            .await
    }

    /// Move one node to the version in `artifact` by re-running its install
    /// script.
    pub async fn upgrade_node(
        &mut self,
        node: &Node,
        artifact: &Path,
        extra_config: &ExtraConfig,
        role: Role,
        log_output_live: bool,
    ) -> Result<()> {
        let cluster = self.begin_install("upgrade a node")?;
        cluster
            .generate_config(artifact, extra_config, log_output_live)
            .await?;
        let failures = cluster.install_node(node, role).await.into_iter().collect();
        into_result(failures)
    }

    /// Upgrade every node, role by role, from a new installer artifact
    pub async fn upgrade_from_path(
        &mut self,
        artifact: &Path,
        extra_config: &ExtraConfig,
        log_output_live: bool,
    ) -> Result<()> {
        let cluster = self.begin_install("upgrade DC/OS")?;
        cluster
            .generate_config(artifact, extra_config, log_output_live)
            .await?;
        let failures = cluster.install_roles(&Role::ALL).await?;
        into_result(failures)
    }

    /// Write `config.yaml` and run the installer's offline generate step
    async fn generate_config(
        &self,
        artifact: &Path,
        extra_config: &ExtraConfig,
        log_output_live: bool,
    ) -> Result<()> {
        let artifact = artifact.canonicalize().map_err(|e| {
            Error::configuration(format!("installer {}: {e}", artifact.display()))
        })?;

        let config = InstallationConfig::base(
            &self.masters().await?,
            &self.agents().await?,
            &self.public_agents().await?,
            self.default_ssh_user(),
        )
        .merge(extra_config);
        tokio::fs::write(self.staging().config_path(), config.to_yaml()?).await?;

        let port = crate::port::reserve_ephemeral_port().await?;
        let mut command = tokio::process::Command::new("bash");
        command
            .arg(&artifact)
            .args(["--offline", "-v", "--genconf"])
            .current_dir(self.staging().root())
            .env("PORT", port.to_string())
            .env(
                "DCOS_INSTALLER_CONTAINER_NAME",
                format!("{}-installer", self.cluster_id()),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(installer = %artifact.display(), port, "generating installer config");
        let (exit_code, output) = run_installer(command, log_output_live).await?;
        if exit_code != 0 {
            return Err(Error::InstallGeneration { exit_code, output });
        }
        Ok(())
    }

    async fn install_roles(&self, roles: &[Role]) -> Result<Vec<NodeInstallFailure>> {
        let mut failures = Vec::new();
        for &role in roles {
            let nodes = self.nodes(role).await?;
            let results = futures_util::future::join_all(
                nodes.iter().map(|node| self.install_node(node, role)),
            )
            .await;
            failures.extend(results.into_iter().flatten());
        }
        Ok(failures)
    }

    /// Run the install script for `role` on one node
    async fn install_node(&self, node: &Node, role: Role) -> Option<NodeInstallFailure> {
        let argv = install_command(role);
        tracing::info!(node = %node.name, address = %node.public_ip_address, %role, "running install script");

        let failure = |exit_code, output| NodeInstallFailure {
            node_name: node.name.clone(),
            address: node.public_ip_address.to_string(),
            role,
            exit_code,
            output,
        };

        match self.provider().run_command(&node.name, &argv).await {
            Ok(output) if output.success() => None,
            Ok(output) => {
                tracing::error!(node = %node.name, exit_code = output.exit_code, "install script failed");
                Some(failure(output.exit_code, output.output))
            }
            Err(e) => {
                tracing::error!(node = %node.name, error = %e, "could not run install script");
                Some(failure(-1, e.to_string()))
            }
        }
    }
}

/// Per-node install script invocation for a role
pub fn install_command(role: Role) -> Vec<String> {
    let script = PathBuf::from(INSTALL_TMP_DIR).join("dcos_install.sh");
    vec![
        "/bin/bash".to_string(),
        script.display().to_string(),
        "--no-block-dcos-setup".to_string(),
        role.install_token().to_string(),
    ]
}

fn into_result(failures: Vec<NodeInstallFailure>) -> Result<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::PerNodeInstall(failures))
    }
}

/// Run the installer, returning its exit code and combined output. With
/// `log_output_live` every line is also logged as it arrives.
async fn run_installer(
    mut command: tokio::process::Command,
    log_output_live: bool,
) -> Result<(i32, String)> {
    let mut child = command.spawn()?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (stdout, stderr) = tokio::try_join!(
        collect_lines(stdout, log_output_live),
        collect_lines(stderr, log_output_live),
    )?;
    let status = child.wait().await?;

    Ok((status.code().unwrap_or(-1), stdout + &stderr))
}

async fn collect_lines<R>(stream: Option<R>, log_output_live: bool) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return Ok(String::new());
    };

    // Installer output is not guaranteed to be UTF-8.
    let mut collected = String::new();
    let mut segments = BufReader::new(stream).split(b'\n');
    while let Some(raw) = segments.next_segment().await? {
        let line = String::from_utf8_lossy(&raw);
        if log_output_live {
            tracing::info!(target: "dcos_e2e::installer", "{line}");
        }
        collected.push_str(&line);
        collected.push('\n');
    }
    Ok(collected)
}
