//! Error types for cluster provisioning, installation and teardown

use crate::node::Role;

/// Main error type for dcos-e2e operations
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The backend configuration cannot be used; nothing was provisioned
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Creating a node, building an image or bootstrapping a node failed.
    /// The cluster is unusable and should be destroyed.
    #[error("provisioning error: {0}")]
    Provisioning(String),

    /// The installer's offline generate-config step failed
    #[error("installer config generation failed with exit code {exit_code}: {output}")]
    InstallGeneration { exit_code: i32, output: String },

    /// One or more nodes failed to run the install (or upgrade) script
    #[error("install failed on {} node(s): {}", .0.len(), describe_failures(.0))]
    PerNodeInstall(Vec<NodeInstallFailure>),

    /// The backend intentionally does not implement this operation
    #[error("{operation} is not supported by the {backend} backend")]
    UnsupportedOperation {
        backend: &'static str,
        operation: &'static str,
    },

    /// The resource provider failed for a reason other than absence
    #[error("provider error: {0}")]
    Provider(String),

    /// Destroy attempted every resource but some removals failed
    #[error("teardown finished with {} failure(s): {}", .0.len(), .0.join("; "))]
    Teardown(Vec<String>),

    /// The operation is not allowed in the cluster's current lifecycle state
    #[error("invalid cluster state: {0}")]
    InvalidState(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A single node whose install or upgrade script exited non-zero
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInstallFailure {
    pub node_name: String,
    pub address: String,
    pub role: Role,
    pub exit_code: i32,
    pub output: String,
}

fn describe_failures(failures: &[NodeInstallFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({}, {}) exited {}", f.node_name, f.address, f.role, f.exit_code))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn provisioning(msg: impl Into<String>) -> Self {
        Self::Provisioning(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Failures reported per node, empty for every other variant
    pub fn node_failures(&self) -> &[NodeInstallFailure] {
        match self {
            Self::PerNodeInstall(failures) => failures,
            _ => &[],
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Configuration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_node_install_names_every_failed_node() {
        let err = Error::PerNodeInstall(vec![NodeInstallFailure {
            node_name: "dcos-e2e-abc-agent-1".to_string(),
            address: "172.17.0.3".to_string(),
            role: Role::Agent,
            exit_code: 1,
            output: "boom".to_string(),
        }]);

        let msg = err.to_string();
        assert!(msg.contains("1 node(s)"));
        assert!(msg.contains("dcos-e2e-abc-agent-1"));
        assert!(msg.contains("172.17.0.3"));
        assert_eq!(err.node_failures().len(), 1);
    }

    #[test]
    fn unsupported_operation_names_backend() {
        let err = Error::UnsupportedOperation {
            backend: "docker",
            operation: "install from URL",
        };
        assert_eq!(
            err.to_string(),
            "install from URL is not supported by the docker backend"
        );
        assert!(err.node_failures().is_empty());
    }

    #[test]
    fn teardown_collects_messages() {
        let err = Error::Teardown(vec!["a: denied".into(), "b: denied".into()]);
        assert!(err.to_string().contains("2 failure(s)"));
        assert!(err.to_string().contains("a: denied; b: denied"));
    }
}
