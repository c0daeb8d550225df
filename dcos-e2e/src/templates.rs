//! Built-in template tree
//!
//! Used to populate a staging area when no template directory is configured.
//! The layout matches what a configured template directory must provide.

use std::path::Path;

use crate::config::{Distribution, DockerVersion};

pub const IP_DETECT: &str = "genconf.src/ip-detect";
pub const JOURNALD_UNIT: &str = "include.src/systemd/systemd-journald-init.service";
/// Build argument naming the OS image the Docker layer is built on
pub const BASE_IMAGE_ARG: &str = "BASE_IMAGE";
/// Never copied from a template directory; the installer regenerates it
pub const STALE_INSTALLER: &str = "dcos_generate_config.sh";

/// Dockerfile for the generic OS image, relative to the staging root
pub fn base_dockerfile(distribution: Distribution) -> std::path::PathBuf {
    Path::new("build")
        .join("base")
        .join(distribution.template_segment())
        .join("Dockerfile")
}

/// Dockerfile layering a Docker release on top of the OS image
pub fn docker_dockerfile(version: DockerVersion) -> std::path::PathBuf {
    Path::new("build")
        .join("base-docker")
        .join(version.as_str())
        .join("Dockerfile")
}

const IP_DETECT_SCRIPT: &str = r#"#!/usr/bin/env bash
set -o nounset -o errexit
export PATH=/usr/sbin:/usr/bin:$PATH
echo $(ip addr show eth0 | grep -Eo '[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}' | head -1)
"#;

const JOURNALD_INIT_UNIT: &str = "[Unit]
Description=Create journald log directory
Before=systemd-journald.service

[Service]
Type=oneshot
ExecStart=/bin/mkdir -p /var/log/journal
ExecStart=/usr/bin/systemd-tmpfiles --create --prefix /var/log/journal

[Install]
WantedBy=sysinit.target
";

const CENTOS_7_DOCKERFILE: &str = r#"FROM centos:7

RUN yum install -y \
        bash-completion \
        bind-utils \
        curl \
        git \
        iproute \
        ipset \
        iputils \
        libcgroup \
        libselinux-utils \
        net-tools \
        openssh-clients \
        openssh-server \
        sudo \
        tar \
        unzip \
        which \
        xz \
    && yum clean all

RUN systemctl enable sshd.service \
    && sed -i 's/^#PermitRootLogin.*/PermitRootLogin yes/' /etc/ssh/sshd_config \
    && groupadd -f nogroup \
    && ln -sf /bin/true /usr/sbin/modprobe

COPY include/systemd/systemd-journald-init.service /etc/systemd/system/
RUN systemctl enable systemd-journald-init.service

STOPSIGNAL SIGRTMIN+3
CMD ["/usr/sbin/init"]
"#;

const COREOS_DOCKERFILE: &str = r#"FROM mesosphere/dcos-docker:coreos-base

RUN systemctl enable sshd.service \
    && groupadd -f nogroup

COPY include/systemd/systemd-journald-init.service /etc/systemd/system/
RUN systemctl enable systemd-journald-init.service

STOPSIGNAL SIGRTMIN+3
CMD ["/sbin/init"]
"#;

fn docker_layer_dockerfile(version: DockerVersion) -> String {
    format!(
        r#"ARG {base_image_arg}=mesosphere/dcos-docker:base
FROM ${{{base_image_arg}}}

RUN curl -fsSL -o /tmp/docker.tgz \
        https://download.docker.com/linux/static/stable/x86_64/docker-{version}.tgz \
    && tar --strip-components=1 -xzf /tmp/docker.tgz -C /usr/bin \
    && rm /tmp/docker.tgz \
    && groupadd -f docker

COPY include/systemd/docker.service /etc/systemd/system/docker.service
RUN systemctl enable docker.service

CMD ["/usr/sbin/init"]
"#,
        version = version.as_str(),
        base_image_arg = BASE_IMAGE_ARG,
    )
}

/// Write the built-in template tree under `root`
pub fn write_builtin(root: &Path) -> std::io::Result<()> {
    let mut files: Vec<(std::path::PathBuf, String)> = vec![
        (IP_DETECT.into(), IP_DETECT_SCRIPT.to_string()),
        (JOURNALD_UNIT.into(), JOURNALD_INIT_UNIT.to_string()),
        (
            base_dockerfile(Distribution::Centos7),
            CENTOS_7_DOCKERFILE.to_string(),
        ),
        (
            base_dockerfile(Distribution::CoreOs),
            COREOS_DOCKERFILE.to_string(),
        ),
    ];
    for version in [
        DockerVersion::V1_11_2,
        DockerVersion::V1_13_1,
        DockerVersion::V17_12_1Ce,
    ] {
        files.push((docker_dockerfile(version), docker_layer_dockerfile(version)));
    }

    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tree_has_dockerfiles_for_supported_combinations() {
        let dir = tempfile::tempdir().unwrap();
        write_builtin(dir.path()).unwrap();

        for distribution in Distribution::SUPPORTED {
            assert!(dir.path().join(base_dockerfile(distribution)).is_file());
        }
        let docker = std::fs::read_to_string(
            dir.path().join(docker_dockerfile(DockerVersion::V17_12_1Ce)),
        )
        .unwrap();
        assert!(docker.contains("docker-17.12.1-ce.tgz"));
        assert!(docker.contains("FROM ${BASE_IMAGE}"));
        assert!(dir.path().join(IP_DETECT).is_file());
        assert!(dir.path().join(JOURNALD_UNIT).is_file());
    }
}
