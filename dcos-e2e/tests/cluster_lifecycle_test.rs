//! Cluster provisioning, node discovery and teardown against the in-memory
//! provider

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dcos_e2e::provider::{AccessMode, FileCopy, MountSet, VolumeMount};
use dcos_e2e::{Cluster, ClusterState, Distribution, Error, Role, StorageDriver};
use dcos_e2e_test_utils::{Call, FakeProvider, TestWorkspace};

async fn create(
    provider: &Arc<FakeProvider>,
    workspace: &TestWorkspace,
    masters: usize,
    agents: usize,
    public_agents: usize,
) -> Cluster {
    Cluster::create(
        provider.clone(),
        &workspace.config(),
        masters,
        agents,
        public_agents,
        &[],
    )
    .await
    .expect("Cluster should be created")
}

#[tokio::test]
async fn test_node_counts_and_unique_addresses() {
    for (masters, agents, public_agents) in [(1, 0, 0), (1, 2, 1), (3, 1, 2)] {
        let workspace = TestWorkspace::new("counts").expect("Should create workspace");
        let provider = Arc::new(FakeProvider::new());
        let cluster = create(&provider, &workspace, masters, agents, public_agents).await;

        assert_eq!(cluster.state(), ClusterState::Ready);
        let m = cluster.masters().await.unwrap();
        let a = cluster.agents().await.unwrap();
        let p = cluster.public_agents().await.unwrap();
        assert_eq!((m.len(), a.len(), p.len()), (masters, agents, public_agents));

        let addresses: HashSet<_> = m
            .iter()
            .chain(&a)
            .chain(&p)
            .map(|n| n.public_ip_address)
            .collect();
        assert_eq!(addresses.len(), masters + agents + public_agents);

        assert!(m.iter().all(|n| n.role == Role::Master));
        assert!(p.iter().all(|n| n.role == Role::PublicAgent));
        assert!(m.iter().all(|n| n.default_ssh_user == "root"));
        assert!(m.iter().all(|n| n.ssh_key_path == cluster.ssh_key_path()));
        assert!(cluster.ssh_key_path().is_file());
    }
}

#[tokio::test]
async fn test_double_destroy_leaves_nothing() {
    let workspace = TestWorkspace::new("double-destroy").expect("Should create workspace");
    let provider = Arc::new(FakeProvider::new());
    let mut cluster = create(&provider, &workspace, 1, 1, 1).await;
    let cluster_id = cluster.cluster_id().to_string();
    assert_eq!(provider.live_resources().len(), 3);

    cluster.destroy().await.expect("First destroy should succeed");
    assert_eq!(cluster.state(), ClusterState::Destroyed);
    cluster.destroy().await.expect("Second destroy should be a no-op");

    assert!(provider.live_resources_with_prefix(&cluster_id).is_empty());
    assert_eq!(workspace.staging_area_count(), 0);
}

#[tokio::test]
async fn test_destroy_tolerates_externally_removed_nodes() {
    let workspace = TestWorkspace::new("external-removal").expect("Should create workspace");
    let provider = Arc::new(FakeProvider::new());
    let mut cluster = create(&provider, &workspace, 1, 2, 0).await;

    let agents = cluster.agents().await.unwrap();
    assert!(provider.remove_externally(&agents[0].name));

    // Accessors see the removal without any refresh call.
    assert_eq!(cluster.agents().await.unwrap().len(), 1);

    cluster.destroy().await.expect("Destroy should succeed");
    assert!(provider.live_resources().is_empty());
}

#[tokio::test]
async fn test_concurrent_clusters_are_isolated() {
    let workspace = TestWorkspace::new("concurrent").expect("Should create workspace");
    let provider = Arc::new(FakeProvider::new());

    let (a, b) = tokio::join!(
        create(&provider, &workspace, 1, 1, 0),
        create(&provider, &workspace, 1, 1, 0),
    );

    assert_ne!(a.cluster_id(), b.cluster_id());
    assert_ne!(a.staging_root(), b.staging_root());
    assert_eq!(workspace.staging_area_count(), 2);

    let names: HashSet<String> = provider.live_resources().into_iter().collect();
    assert_eq!(names.len(), 4);
    assert_eq!(provider.live_resources_with_prefix(a.cluster_id()).len(), 2);
    assert_eq!(provider.live_resources_with_prefix(b.cluster_id()).len(), 2);

    let ids = dcos_e2e::existing_cluster_ids(provider.as_ref()).await.unwrap();
    assert!(ids.contains(a.cluster_id()));
    assert!(ids.contains(b.cluster_id()));
}

#[tokio::test]
async fn test_invalid_configuration_touches_no_provider() {
    let workspace = TestWorkspace::new("bad-config").expect("Should create workspace");
    let provider = Arc::new(FakeProvider::new());

    let err = workspace
        .config_builder()
        .linux_distribution(Distribution::Ubuntu1604)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let err = Cluster::create(provider.clone(), &workspace.config(), 0, 1, 0, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    assert_eq!(provider.call_count(), 0);
    assert_eq!(workspace.staging_area_count(), 0);
}

#[tokio::test]
async fn test_custom_mounts_are_merged_with_state_volumes() {
    let workspace = TestWorkspace::new("mounts").expect("Should create workspace");
    let provider = Arc::new(FakeProvider::new());
    let config = workspace
        .config_builder()
        .custom_mounts(
            Role::Master,
            MountSet::from([(
                "/host/a".to_string(),
                VolumeMount::new("/data", AccessMode::ReadOnly),
            )]),
        )
        .build()
        .unwrap();

    let _cluster = Cluster::create(provider.clone(), &config, 1, 1, 0, &[])
        .await
        .expect("Cluster should be created");

    let specs = provider.provisioned();
    let master = specs
        .iter()
        .find(|s| s.labels["node_type"] == "master")
        .unwrap();
    assert_eq!(
        master.mounts["/host/a"],
        VolumeMount::new("/data", AccessMode::ReadOnly)
    );
    let targets: Vec<&str> = master.mounts.values().map(|m| m.bind.as_str()).collect();
    assert!(targets.contains(&"/var/lib/docker"));
    assert!(targets.contains(&"/opt"));

    let agent = specs
        .iter()
        .find(|s| s.labels["node_type"] == "agent")
        .unwrap();
    assert!(!agent.mounts.contains_key("/host/a"));
}

#[tokio::test]
async fn test_registry_host_points_at_first_master() {
    let workspace = TestWorkspace::new("registry").expect("Should create workspace");
    let provider = Arc::new(FakeProvider::new());
    let cluster = create(&provider, &workspace, 2, 1, 0).await;

    let first_master = cluster.masters().await.unwrap()[0].public_ip_address.to_string();
    let specs = provider.provisioned();

    assert_eq!(specs[0].name, format!("{}1", cluster.role_prefix(Role::Master)));
    assert_eq!(specs[0].extra_hosts["registry.local"], "127.0.0.1");
    for spec in &specs[1..] {
        assert_eq!(spec.extra_hosts["registry.local"], first_master);
    }
}

#[tokio::test]
async fn test_bootstrap_commands_run_once_per_node() {
    let workspace = TestWorkspace::new("bootstrap").expect("Should create workspace");
    let provider = Arc::new(FakeProvider::new());
    let cluster = create(&provider, &workspace, 1, 1, 0).await;

    let public_key = std::fs::read_to_string(cluster.ssh_key_path().with_extension("pub")).unwrap();
    for node in cluster.masters().await.unwrap().iter().chain(&cluster.agents().await.unwrap()) {
        let commands: Vec<String> = provider
            .commands()
            .into_iter()
            .filter(|(resource, _)| *resource == node.name)
            .map(|(_, argv)| argv.join(" "))
            .collect();

        assert_eq!(
            commands.iter().filter(|c| c.contains("sshd.service")).count(),
            1
        );
        assert_eq!(
            commands
                .iter()
                .filter(|c| c.contains("authorized_keys") && c.contains(public_key.trim()))
                .count(),
            1
        );
        assert_eq!(commands.last().unwrap(), "/bin/bash -c rm -f /run/nologin || true");
    }
}

#[tokio::test]
async fn test_bootstrap_failure_aborts_and_cleans_up() {
    let workspace = TestWorkspace::new("bootstrap-failure").expect("Should create workspace");
    let provider = Arc::new(FakeProvider::new());
    provider.fail_command("dcos-e2e-", "sshd.service", 1);

    let err = Cluster::create(provider.clone(), &workspace.config(), 1, 2, 0, &[])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Provisioning(_)), "{err}");
    assert!(provider.live_resources().is_empty());
    assert_eq!(workspace.staging_area_count(), 0);
}

#[tokio::test]
async fn test_provision_failure_cleans_up_partial_cluster() {
    let workspace = TestWorkspace::new("provision-failure").expect("Should create workspace");
    let provider = Arc::new(FakeProvider::new());
    provider.fail_provision("-agent-");

    let err = Cluster::create(provider.clone(), &workspace.config(), 1, 2, 0, &[])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Provisioning(_)), "{err}");
    // The master came up before the agents were rejected.
    assert!(!provider.provisioned().is_empty());
    assert!(provider.live_resources().is_empty());
    assert_eq!(workspace.staging_area_count(), 0);
}

#[tokio::test]
async fn test_provision_failure_waits_for_in_flight_nodes_before_cleanup() {
    let workspace = TestWorkspace::new("provision-in-flight").expect("Should create workspace");
    let delay = Duration::from_millis(100);
    let provider = Arc::new(FakeProvider::new().with_provision_delay(delay));
    provider.fail_provision("-agent-");

    let err = Cluster::create(provider.clone(), &workspace.config(), 1, 2, 3, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Provisioning(_)), "{err}");

    // Anything still being created would show up by now.
    tokio::time::sleep(delay * 3).await;
    let public_agents = provider
        .provisioned()
        .iter()
        .filter(|s| s.labels["node_type"] == "public_agent")
        .count();
    assert_eq!(public_agents, 3);
    assert!(provider.live_resources().is_empty());
    assert_eq!(workspace.staging_area_count(), 0);
}

#[tokio::test]
async fn test_nologin_failure_is_not_fatal() {
    let workspace = TestWorkspace::new("nologin").expect("Should create workspace");
    let provider = Arc::new(FakeProvider::new());
    provider.fail_command("dcos-e2e-", "/run/nologin", 1);

    let cluster = create(&provider, &workspace, 1, 0, 0).await;
    assert_eq!(cluster.state(), ClusterState::Ready);
}

#[tokio::test]
async fn test_teardown_continues_past_provider_failures() {
    let workspace = TestWorkspace::new("teardown").expect("Should create workspace");
    let provider = Arc::new(FakeProvider::new());
    let mut cluster = create(&provider, &workspace, 1, 2, 0).await;

    provider.fail_destroy(&cluster.role_prefix(Role::Agent));
    let err = cluster.destroy().await.unwrap_err();

    let failures = match err {
        Error::Teardown(failures) => failures,
        other => panic!("expected a teardown error, got {other}"),
    };
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|f| f.contains("permission denied")));
    assert!(
        provider
            .live_resources_with_prefix(&cluster.role_prefix(Role::Master))
            .is_empty()
    );
    assert_eq!(cluster.state(), ClusterState::Destroying);
    assert!(matches!(
        cluster.masters().await.unwrap_err(),
        Error::InvalidState(_)
    ));

    provider.clear_failures();
    cluster.destroy().await.expect("Retried destroy should succeed");
    assert!(provider.live_resources().is_empty());
    assert_eq!(cluster.state(), ClusterState::Destroyed);
}

#[tokio::test]
async fn test_destroyed_cluster_rejects_operations() {
    let workspace = TestWorkspace::new("destroyed").expect("Should create workspace");
    let provider = Arc::new(FakeProvider::new());
    let mut cluster = create(&provider, &workspace, 1, 0, 0).await;
    cluster.destroy().await.unwrap();

    assert!(matches!(
        cluster.agents().await.unwrap_err(),
        Error::InvalidState(_)
    ));
    let installer = workspace.stub_installer(0);
    let err = cluster
        .install_from_path(&installer, &Default::default(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn test_file_copies_go_through_the_provider() {
    let workspace = TestWorkspace::new("copy").expect("Should create workspace");
    let provider = Arc::new(FakeProvider::new());
    let mut cluster = create(&provider, &workspace, 1, 0, 0).await;
    let master = cluster.masters().await.unwrap().remove(0);

    let local = workspace.write_fixture("payload.txt", "data");
    cluster
        .send_file(&master, &local, Path::new("/root/payload.txt"))
        .await
        .expect("Send should succeed");
    cluster
        .fetch_file(&master, Path::new("/var/log/dcos.log"), &workspace.path().join("dcos.log"))
        .await
        .expect("Fetch should succeed");

    let copies: Vec<FileCopy> = provider
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::CopyFile(copy) => Some(copy),
            _ => None,
        })
        .collect();
    assert_eq!(
        copies,
        [
            FileCopy::ToResource {
                resource: master.name.clone(),
                host_path: local,
                resource_path: "/root/payload.txt".into(),
            },
            FileCopy::FromResource {
                resource: master.name.clone(),
                resource_path: "/var/log/dcos.log".into(),
                host_path: workspace.path().join("dcos.log"),
            },
        ]
    );

    cluster.destroy().await.unwrap();
    let err = cluster
        .send_file(&master, Path::new("/tmp/x"), Path::new("/tmp/x"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn test_attach_rebuilds_cluster_from_labels() {
    let workspace = TestWorkspace::new("attach").expect("Should create workspace");
    let provider = Arc::new(FakeProvider::new());
    let cluster = create(&provider, &workspace, 1, 1, 1).await;

    let mut attached = Cluster::attach(provider.clone(), cluster.cluster_id())
        .await
        .expect("Should attach to live cluster");

    assert_eq!(attached.state(), ClusterState::Ready);
    assert_eq!(attached.staging_root(), cluster.staging_root());
    assert_eq!(attached.ssh_key_path(), cluster.ssh_key_path());
    assert_eq!(
        attached.masters().await.unwrap(),
        cluster.masters().await.unwrap()
    );

    attached.destroy().await.unwrap();
    assert!(provider.live_resources().is_empty());
    assert!(!cluster.staging_root().exists());

    let err = Cluster::attach(provider.clone(), cluster.cluster_id())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn test_images_are_built_before_nodes() {
    let workspace = TestWorkspace::new("images").expect("Should create workspace");
    let provider = Arc::new(FakeProvider::new().with_image_build());
    let _cluster = create(&provider, &workspace, 1, 0, 0).await;

    let calls = provider.calls();
    let builds: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            Call::BuildImage(build) => Some(build.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(builds.len(), 2);
    assert_eq!(builds[0].tag, "mesosphere/dcos-docker:base-centos-7");
    assert_eq!(builds[1].build_args["BASE_IMAGE"], builds[0].tag);
    assert_eq!(builds[1].tag, "mesosphere/dcos-docker:centos-7-docker-1.13.1");

    let first_provision = calls
        .iter()
        .position(|c| matches!(c, Call::Provision(_)))
        .unwrap();
    let last_build = calls
        .iter()
        .rposition(|c| matches!(c, Call::BuildImage(_)))
        .unwrap();
    assert!(last_build < first_provision);
    assert_eq!(provider.provisioned()[0].image, builds[1].tag);
}

#[tokio::test]
async fn test_storage_driver_follows_host_with_fallback() {
    for (host, expected) in [("overlay2", "overlay2"), ("btrfs", "aufs")] {
        let workspace = TestWorkspace::new("storage").expect("Should create workspace");
        let provider = Arc::new(FakeProvider::new().with_host_storage_driver(host));
        let cluster = create(&provider, &workspace, 1, 0, 0).await;

        let unit = std::fs::read_to_string(
            cluster
                .staging_root()
                .join("include/systemd/docker.service"),
        )
        .unwrap();
        assert!(unit.contains(&format!("-s {expected} ")), "{host}");
    }

    let workspace = TestWorkspace::new("storage-configured").expect("Should create workspace");
    let provider = Arc::new(FakeProvider::new().with_host_storage_driver("overlay2"));
    let config = workspace
        .config_builder()
        .storage_driver(StorageDriver::Overlay)
        .build()
        .unwrap();
    let _cluster = Cluster::create(provider.clone(), &config, 1, 0, 0, &[])
        .await
        .unwrap();
    assert!(!provider.calls().contains(&Call::HostStorageDriver));
}
