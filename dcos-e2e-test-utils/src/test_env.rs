//! Isolated workspace for cluster tests

use std::path::{Path, PathBuf};

use dcos_e2e::{ClusterBackendConfig, ClusterBackendConfigBuilder};
use tempfile::TempDir;

/// File the stub installer writes its arguments and environment to,
/// relative to the staging root
pub const STUB_INVOCATION_FILE: &str = "genconf/serve/stub-invocation";

/// A temporary directory holding the cluster workspace and any fixture
/// files a test needs. Everything is removed on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new(test_name: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let temp_dir = tempfile::Builder::new()
            .prefix(&format!("dcos-e2e-test-{test_name}-"))
            .tempdir()?;
        std::fs::create_dir_all(temp_dir.path().join("workspace"))?;
        std::fs::create_dir_all(temp_dir.path().join("fixtures"))?;

        Ok(Self { temp_dir })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory staging areas are created under
    pub fn workspace_dir(&self) -> PathBuf {
        self.temp_dir.path().join("workspace")
    }

    /// Builder with the workspace already pointed at this test's directory
    pub fn config_builder(&self) -> ClusterBackendConfigBuilder {
        ClusterBackendConfig::builder().workspace_dir(self.workspace_dir())
    }

    pub fn config(&self) -> ClusterBackendConfig {
        self.config_builder()
            .build()
            .expect("default test config is valid")
    }

    /// Number of staging areas currently in the workspace
    pub fn staging_area_count(&self) -> usize {
        std::fs::read_dir(self.workspace_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Write a fixture file and return its path
    pub fn write_fixture(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join("fixtures").join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture directory");
        }
        std::fs::write(&path, content).expect("write fixture");
        path
    }

    /// An installer that records how it was invoked into
    /// [`STUB_INVOCATION_FILE`] and exits with `exit_code`
    pub fn stub_installer(&self, exit_code: i32) -> PathBuf {
        self.write_fixture(
            &format!("dcos_generate_config-{exit_code}.sh"),
            &stub_installer_script(exit_code),
        )
    }
}

pub fn stub_installer_script(exit_code: i32) -> String {
    format!(
        r#"#!/usr/bin/env bash
mkdir -p genconf/serve
{{
    echo "args=$*"
    echo "port=$PORT"
    echo "container=$DCOS_INSTALLER_CONTAINER_NAME"
}} > {STUB_INVOCATION_FILE}
echo "stub installer running"
exit {exit_code}
"#
    )
}
