//! Per-cluster staging area
//!
//! ```text
//! <workspace>/<random>/<cluster-id>/
//!     build/...                       Dockerfiles (from the template tree)
//!     genconf/                        installer input, mounted at /genconf
//!         config.yaml
//!         ip-detect
//!         serve/                      bootstrap files, bound at /opt/dcos_install_tmp
//!     include/
//!         certs/                      bound at /etc/docker/certs.d
//!         ssh/id_rsa, ssh/id_rsa.pub
//!         systemd/docker.service
//! ```
//!
//! The extra random directory keeps parallel runs apart even if a cluster
//! identity were ever reused.

use std::path::{Path, PathBuf};

use crate::config::{ClusterBackendConfig, StorageDriver};
use crate::templates;
use crate::{Error, Result};

/// Installer-side directory that staged files must live under
pub const INSTALLER_GENCONF: &str = "/genconf";

/// A host file or directory to place into the installer input directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub host_path: PathBuf,
    /// Absolute path under [`INSTALLER_GENCONF`]
    pub installer_path: PathBuf,
}

impl StagedFile {
    pub fn new(host_path: impl Into<PathBuf>, installer_path: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host_path.into(),
            installer_path: installer_path.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StagingArea {
    /// `<workspace>/<random>`, removed as a whole on teardown
    outer: PathBuf,
    root: PathBuf,
}

impl StagingArea {
    /// Build the staging tree for a new cluster and generate its SSH key
    /// pair. Returns the public key line to authorise on every node.
    pub fn create(
        config: &ClusterBackendConfig,
        cluster_id: &str,
        files: &[StagedFile],
        storage_driver: StorageDriver,
    ) -> Result<(StagingArea, String)> {
        let outer = config
            .workspace_dir()
            .join(uuid::Uuid::new_v4().simple().to_string());
        let root = outer.join(cluster_id);
        std::fs::create_dir_all(&root)?;

        let staging = StagingArea {
            outer: outer.canonicalize()?,
            root: root.canonicalize()?,
        };

        match staging.populate(config, files, storage_driver) {
            Ok(public_key) => Ok((staging, public_key)),
            Err(e) => {
                staging.remove();
                Err(e)
            }
        }
    }

    /// Re-open the staging area of an existing cluster
    pub fn open(root: impl Into<PathBuf>) -> StagingArea {
        let root = root.into();
        let outer = root.parent().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
        StagingArea { outer, root }
    }

    fn populate(
        &self,
        config: &ClusterBackendConfig,
        files: &[StagedFile],
        storage_driver: StorageDriver,
    ) -> Result<String> {
        match config.template_dir() {
            Some(template) => copy_tree(template, &self.root, &[templates::STALE_INSTALLER])?,
            None => templates::write_builtin(&self.root)?,
        }

        for dir in [
            self.serve_dir(),
            self.certs_dir(),
            self.ssh_dir(),
            self.systemd_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }

        let ip_detect = self.genconf_dir().join("ip-detect");
        std::fs::copy(self.root.join(templates::IP_DETECT), &ip_detect)?;
        make_executable(&ip_detect)?;

        std::fs::copy(
            self.root.join(templates::JOURNALD_UNIT),
            self.systemd_dir().join("systemd-journald-init.service"),
        )?;

        let public_key =
            crate::keys::generate_key_pair(&self.ssh_key_path(), &self.ssh_dir().join("id_rsa.pub"))?;

        for file in files {
            self.stage(file)?;
        }

        std::fs::write(
            self.systemd_dir().join("docker.service"),
            docker_service_unit(storage_driver),
        )?;

        Ok(public_key)
    }

    fn stage(&self, file: &StagedFile) -> Result<()> {
        let relative = file
            .installer_path
            .strip_prefix(INSTALLER_GENCONF)
            .map_err(|_| {
                Error::configuration(format!(
                    "{} must be under {INSTALLER_GENCONF}",
                    file.installer_path.display()
                ))
            })?;
        let destination = self.genconf_dir().join(relative);

        if file.host_path.is_dir() {
            let name = file.host_path.file_name().ok_or_else(|| {
                Error::configuration(format!("cannot stage {}", file.host_path.display()))
            })?;
            copy_tree(&file.host_path, &destination.join(name), &[])?;
        } else {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&file.host_path, &destination)?;
        }

        tracing::debug!(
            host = %file.host_path.display(),
            staged = %destination.display(),
            "staged installer file"
        );
        Ok(())
    }

    /// Best-effort removal of the whole tree
    pub fn remove(&self) {
        if let Err(e) = std::fs::remove_dir_all(&self.outer) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.outer.display(), error = %e, "failed to remove staging area");
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn genconf_dir(&self) -> PathBuf {
        self.root.join("genconf")
    }

    /// Host side of the bootstrap directory every node mounts read-only
    pub fn serve_dir(&self) -> PathBuf {
        self.genconf_dir().join("serve")
    }

    pub fn config_path(&self) -> PathBuf {
        self.genconf_dir().join("config.yaml")
    }

    pub fn certs_dir(&self) -> PathBuf {
        self.root.join("include").join("certs")
    }

    pub fn ssh_dir(&self) -> PathBuf {
        self.root.join("include").join("ssh")
    }

    pub fn ssh_key_path(&self) -> PathBuf {
        self.ssh_dir().join("id_rsa")
    }

    pub fn systemd_dir(&self) -> PathBuf {
        self.root.join("include").join("systemd")
    }
}

/// systemd unit running the Docker daemon inside a node
pub fn docker_service_unit(storage_driver: StorageDriver) -> String {
    format!(
        "[Unit]
Description=Docker Application Container Engine
Documentation=https://docs.docker.com
After=dbus.service

[Service]
ExecStart=/usr/bin/docker daemon -D -s {driver} --disable-legacy-registry=true --exec-opt=native.cgroupdriver=cgroupfs
LimitNOFILE=1048576
LimitNPROC=1048576
LimitCORE=infinity
Delegate=yes
TimeoutStartSec=0

[Install]
WantedBy=default.target
",
        driver = storage_driver.as_str()
    )
}

/// Copy the contents of `src` into `dst`, skipping entries named in `skip`
/// at any depth. Symlinks are followed so the copy holds real files; the
/// installer never sees host paths.
fn copy_tree(src: &Path, dst: &Path, skip: &[&str]) -> std::io::Result<()> {
    let walker = walkdir::WalkDir::new(src)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !skip.iter().any(|s| e.file_name() == *s));

    for entry in walker {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
