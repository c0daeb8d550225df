use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::WrapErr;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    use clap::Parser;

    let cli = Cli::parse();

    // RUST_LOG overrides the -v/-q flags, e.g. RUST_LOG="dcos_e2e=debug"
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = cli.verbose.log_level_filter().to_string().to_lowercase();
        tracing_subscriber::EnvFilter::new(format!("dcos_e2e={level},dcos_docker={level}"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let provider: Arc<dyn dcos_e2e::ResourceProvider> = Arc::new(match &cli.docker {
        Some(binary) => dcos_e2e::DockerProvider::with_binary(binary),
        None => dcos_e2e::DockerProvider::new(),
    });

    match cli.command {
        Command::Create {
            masters,
            agents,
            public_agents,
            genconf_files,
            installer,
            extra_config,
        } => {
            let config = load_backend_config(cli.config.as_deref())?;
            let mut cluster = dcos_e2e::Cluster::create(
                provider,
                &config,
                masters,
                agents,
                public_agents,
                &genconf_files,
            )
            .await?;

            if let Some(installer) = installer {
                let extra = load_extra_config(extra_config.as_deref())?;
                install(&mut cluster, &installer, &extra).await?;
            }

            println!("{}", cluster.cluster_id());
        }
        Command::List => {
            for cluster_id in dcos_e2e::existing_cluster_ids(provider.as_ref()).await? {
                println!("{cluster_id}");
            }
        }
        Command::Inspect { cluster_id } => {
            let cluster = attach(provider, &cluster_id).await?;
            let description = cluster.describe().await?;
            println!("{}", serde_json::to_string_pretty(&description)?);
        }
        Command::Install {
            cluster_id,
            installer,
            extra_config,
        } => {
            let extra = load_extra_config(extra_config.as_deref())?;
            let mut cluster = attach(provider, &cluster_id).await?;
            install(&mut cluster, &installer, &extra).await?;
        }
        Command::Upgrade {
            cluster_id,
            installer,
            extra_config,
        } => {
            let extra = load_extra_config(extra_config.as_deref())?;
            let mut cluster = attach(provider, &cluster_id).await?;
            let installer = PathBuf::from(installer);
            cluster
                .upgrade_from_path(&installer, &extra, true)
                .await
                .map_err(report_node_failures)?;
        }
        Command::Destroy { cluster_ids } => {
            use colored::Colorize;

            for cluster_id in cluster_ids {
                let mut cluster = attach(provider.clone(), &cluster_id).await?;
                cluster.destroy().await?;
                eprintln!("{} {cluster_id}", "destroyed".green());
            }
        }
    }

    Ok(())
}

async fn attach(
    provider: Arc<dyn dcos_e2e::ResourceProvider>,
    cluster_id: &str,
) -> eyre::Result<dcos_e2e::Cluster> {
    let existing = dcos_e2e::existing_cluster_ids(provider.as_ref()).await?;
    if !existing.contains(cluster_id) {
        eyre::bail!("cluster {cluster_id} does not exist, see `dcos-docker list`");
    }
    Ok(dcos_e2e::Cluster::attach(provider, cluster_id).await?)
}

/// Install from a local path, or from a URL when `installer` looks like one
async fn install(
    cluster: &mut dcos_e2e::Cluster,
    installer: &str,
    extra: &dcos_e2e::ExtraConfig,
) -> eyre::Result<()> {
    let result = if installer.starts_with("http://") || installer.starts_with("https://") {
        cluster.install_from_url(installer, extra, true).await
    } else {
        cluster
            .install_from_path(Path::new(installer), extra, true)
            .await
    };
    result.map_err(report_node_failures)?;
    Ok(())
}

fn report_node_failures(e: dcos_e2e::Error) -> eyre::Report {
    use colored::Colorize;

    for failure in e.node_failures() {
        eprintln!(
            "{} {} ({}) exited with {}",
            "install failed:".red(),
            failure.node_name,
            failure.address,
            failure.exit_code
        );
        eprintln!("{}", failure.output.trim_end());
    }
    e.into()
}

fn load_backend_config(path: Option<&Path>) -> eyre::Result<dcos_e2e::ClusterBackendConfig> {
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => directories::ProjectDirs::from("", "", "dcos-e2e")
            .map(|dirs| dirs.config_dir().join("docker.toml"))
            .filter(|path| path.exists()),
    };

    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading backend config");
            dcos_e2e::ClusterBackendConfig::load_from_file(&path)
                .wrap_err_with(|| format!("invalid config file {}", path.display()))
        }
        None => Ok(dcos_e2e::ClusterBackendConfig::builder().build()?),
    }
}

fn load_extra_config(path: Option<&Path>) -> eyre::Result<dcos_e2e::ExtraConfig> {
    let Some(path) = path else {
        return Ok(Default::default());
    };
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&content).wrap_err_with(|| format!("{} is not a YAML mapping", path.display()))
}

fn parse_genconf_file(value: &str) -> Result<dcos_e2e::StagedFile, String> {
    let (host, installer) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("expected <host path>:<installer path>, got {value}"))?;
    if !installer.starts_with(dcos_e2e::INSTALLER_GENCONF) {
        return Err(format!(
            "installer path {installer} must be under {}",
            dcos_e2e::INSTALLER_GENCONF
        ));
    }
    Ok(dcos_e2e::StagedFile::new(host, installer))
}

#[derive(clap::Parser, Debug)]
#[command(version, about = "Create and manage DC/OS clusters in Docker containers", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    #[arg(
        long,
        global = true,
        help = "Backend config file (TOML). Defaults to docker.toml in the dcos-e2e config directory, if present.",
        env = "DCOS_E2E_CONFIG"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "The docker executable to use.")]
    docker: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    #[clap(about = "Create a cluster and optionally install DC/OS on it")]
    Create {
        #[arg(long, default_value_t = 1, help = "The number of master nodes.")]
        masters: usize,
        #[arg(long, default_value_t = 1, help = "The number of agent nodes.")]
        agents: usize,
        #[arg(long, default_value_t = 1, help = "The number of public agent nodes.")]
        public_agents: usize,
        #[arg(
            long = "genconf-file",
            value_parser = parse_genconf_file,
            help = "Copy a host file or directory into the installer's genconf directory, as <host path>:/genconf/<path>. Can be repeated."
        )]
        genconf_files: Vec<dcos_e2e::StagedFile>,
        #[arg(long, help = "Installer path or URL to install DC/OS with once the cluster is up.")]
        installer: Option<String>,
        #[arg(long, help = "YAML file with installer options overriding the generated ones.")]
        extra_config: Option<PathBuf>,
    },
    #[clap(about = "List the IDs of all clusters")]
    List,
    #[clap(about = "Show a cluster's nodes and connection details as JSON")]
    Inspect { cluster_id: String },
    #[clap(about = "Install DC/OS on an existing cluster")]
    Install {
        cluster_id: String,
        #[arg(help = "Installer path or URL.")]
        installer: String,
        #[arg(long, help = "YAML file with installer options overriding the generated ones.")]
        extra_config: Option<PathBuf>,
    },
    #[clap(about = "Upgrade DC/OS on every node of a cluster")]
    Upgrade {
        cluster_id: String,
        #[arg(help = "Installer path for the new version.")]
        installer: String,
        #[arg(long, help = "YAML file with installer options overriding the generated ones.")]
        extra_config: Option<PathBuf>,
    },
    #[clap(about = "Destroy clusters")]
    Destroy {
        #[arg(required = true)]
        cluster_ids: Vec<String>,
    },
}
