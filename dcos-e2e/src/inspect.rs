//! Structured description of a running cluster

use std::net::IpAddr;
use std::path::PathBuf;

use serde::Serialize;

use crate::cluster::Cluster;
use crate::node::{Node, Role};
use crate::Result;

const VERSION_FILE: &str = "/opt/mesosphere/etc/dcos-version.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterDescription {
    pub cluster_id: String,
    /// `http://<first master>`; `None` if no master is running
    pub web_ui: Option<String>,
    pub masters: Vec<NodeDescription>,
    pub agents: Vec<NodeDescription>,
    pub public_agents: Vec<NodeDescription>,
    pub ssh_default_user: String,
    pub ssh_key: PathBuf,
    /// Installed DC/OS variant, `None` until DC/OS is installed
    pub dcos_variant: Option<DcosVariant>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDescription {
    /// Stable handle such as `agent_2`, numbered by address order
    pub e2e_reference: String,
    pub container_name: String,
    pub ip_address: IpAddr,
    pub ssh_user: String,
    pub ssh_key: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DcosVariant {
    Oss,
    Enterprise,
}

#[derive(serde::Deserialize)]
struct VersionFile {
    #[serde(rename = "dcos-variant")]
    variant: Option<String>,
}

impl DcosVariant {
    /// Parse the contents of `dcos-version.json`
    pub fn from_version_file(content: &str) -> Option<DcosVariant> {
        let file: VersionFile = serde_json::from_str(content).ok()?;
        match file.variant.as_deref() {
            Some("enterprise") => Some(DcosVariant::Enterprise),
            Some("open") => Some(DcosVariant::Oss),
            // Releases that predate the field are open source.
            None => Some(DcosVariant::Oss),
            Some(other) => {
                tracing::warn!(variant = other, "unknown DC/OS variant");
                None
            }
        }
    }
}

impl Cluster {
    pub async fn describe(&self) -> Result<ClusterDescription> {
        let masters = self.masters().await?;
        let dcos_variant = match masters.first() {
            Some(master) => self.variant_of(master).await?,
            None => None,
        };

        Ok(ClusterDescription {
            cluster_id: self.cluster_id().to_string(),
            web_ui: masters
                .first()
                .map(|m| format!("http://{}", m.public_ip_address)),
            masters: describe_nodes(&masters),
            agents: describe_nodes(&self.agents().await?),
            public_agents: describe_nodes(&self.public_agents().await?),
            ssh_default_user: self.default_ssh_user().to_string(),
            ssh_key: self.ssh_key_path(),
            dcos_variant,
        })
    }

    async fn variant_of(&self, master: &Node) -> Result<Option<DcosVariant>> {
        let argv = vec!["cat".to_string(), VERSION_FILE.to_string()];
        let output = self.run_on_node(master, &argv).await?;
        if !output.success() {
            tracing::debug!(node = %master.name, "no version file, DC/OS not installed");
            return Ok(None);
        }
        Ok(DcosVariant::from_version_file(&output.output))
    }
}

fn describe_nodes(nodes: &[Node]) -> Vec<NodeDescription> {
    let mut sorted: Vec<&Node> = nodes.iter().collect();
    sorted.sort_by_key(|n| n.public_ip_address);

    sorted
        .into_iter()
        .enumerate()
        .map(|(index, node)| NodeDescription {
            e2e_reference: reference(node.role, index + 1),
            container_name: node.name.clone(),
            ip_address: node.public_ip_address,
            ssh_user: node.default_ssh_user.clone(),
            ssh_key: node.ssh_key_path.clone(),
        })
        .collect()
}

fn reference(role: Role, index: usize) -> String {
    format!("{}_{index}", role.label())
}
