//! Nodes and the roles they play in a cluster

use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::path::PathBuf;

/// The function a node has within the distributed system under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Master,
    Agent,
    PublicAgent,
}

impl Role {
    /// Roles in the order they are provisioned and installed
    pub const ALL: [Role; 3] = [Role::Master, Role::Agent, Role::PublicAgent];

    /// Value of the `node_type` label and the role segment of resource names
    pub fn label(self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Agent => "agent",
            Role::PublicAgent => "public_agent",
        }
    }

    /// Role argument understood by `dcos_install.sh`
    pub fn install_token(self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Agent => "slave",
            Role::PublicAgent => "slave_public",
        }
    }

    pub fn from_label(label: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|r| r.label() == label)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One provisioned machine.
///
/// Nodes are values: they are rebuilt from live provider state every time a
/// cluster is asked for them. Equality and hashing only look at the public
/// address.
#[derive(Debug, Clone)]
pub struct Node {
    /// Name of the backing resource, used to run commands on it
    pub name: String,
    pub public_ip_address: IpAddr,
    pub private_ip_address: IpAddr,
    pub default_ssh_user: String,
    pub ssh_key_path: PathBuf,
    pub role: Role,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.public_ip_address == other.public_ip_address
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.public_ip_address.hash(state);
    }
}
