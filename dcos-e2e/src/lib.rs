#![deny(unused_extern_crates)]
#![deny(unused_crate_dependencies)]
#![deny(unsafe_code)]

// used by the dcos-docker binary
use clap as _;
use clap_verbosity_flag as _;
use colored as _;
use directories as _;
use eyre as _;
use tracing_subscriber as _;

#[cfg(test)]
use dcos_e2e_test_utils as _;

mod cluster;
mod config;
mod error;
mod inspect;
mod install;
mod keys;
mod node;
mod port;
pub mod provider;
mod staging;
mod templates;

pub use cluster::{
    CLUSTER_ID_LABEL, CLUSTER_ID_PREFIX, Cluster, ClusterState, INSTALL_TMP_DIR, NODE_TYPE_LABEL,
    WORKSPACE_LABEL, existing_cluster_ids,
};
pub use config::{
    ClusterBackendConfig, ClusterBackendConfigBuilder, DEFAULT_SSH_USER, Distribution,
    DockerVersion, StorageDriver,
};
pub use error::{Error, NodeInstallFailure};
pub use inspect::{ClusterDescription, DcosVariant, NodeDescription};
pub use install::{ExtraConfig, InstallationConfig, install_command};
pub use keys::generate_key_pair;
pub use node::{Node, Role};
pub use port::reserve_ephemeral_port;
pub use provider::{DockerProvider, ResourceProvider};
pub use staging::{INSTALLER_GENCONF, StagedFile, StagingArea};

pub type Result<T> = std::result::Result<T, Error>;
