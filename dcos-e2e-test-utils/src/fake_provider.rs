//! In-memory [`ResourceProvider`]

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use dcos_e2e::provider::{
    CommandOutput, FileCopy, ImageBuild, ProvisionSpec, ProvisionedResource, ResourceProvider,
};
use dcos_e2e::{Error, Result};

/// First address handed out; every new resource gets the next one
const FIRST_ADDRESS: Ipv4Addr = Ipv4Addr::new(172, 17, 0, 2);

/// One recorded provider call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Provision(ProvisionSpec),
    RunCommand { resource: String, argv: Vec<String> },
    List(String),
    Destroy(String),
    CopyFile(FileCopy),
    BuildImage(ImageBuild),
    HostStorageDriver,
    FetchArtifact(String),
}

#[derive(Debug, Clone)]
struct ScriptedCommand {
    name_prefix: String,
    needle: String,
    exit_code: i32,
    output: String,
}

#[derive(Debug, Default)]
struct State {
    resources: BTreeMap<String, ProvisionedResource>,
    next_address: u32,
    calls: Vec<Call>,
    scripted: Vec<ScriptedCommand>,
    failing_provisions: Vec<String>,
    failing_destroys: Vec<String>,
    artifacts: BTreeMap<String, String>,
}

/// A provider that keeps resources in memory.
///
/// Every resource gets a unique address, commands succeed with empty output
/// unless scripted otherwise, and every call is recorded in order.
#[derive(Debug, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<State>>,
    image_build: bool,
    host_storage_driver: Option<String>,
    provision_delay: Option<Duration>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend nodes boot from images that must be built first
    pub fn with_image_build(mut self) -> Self {
        self.image_build = true;
        self
    }

    pub fn with_host_storage_driver(mut self, driver: &str) -> Self {
        self.host_storage_driver = Some(driver.to_string());
        self
    }

    /// Successful provisions only create their resource after `delay`, like
    /// a daemon that keeps working when its client goes away: dropping the
    /// `provision` future does not stop the resource from appearing.
    /// Rejected provisions fail after half the delay.
    pub fn with_provision_delay(mut self, delay: Duration) -> Self {
        self.provision_delay = Some(delay);
        self
    }

    /// Commands on resources named `name_prefix*` whose argv contains
    /// `needle` exit with `exit_code`
    pub fn fail_command(&self, name_prefix: &str, needle: &str, exit_code: i32) {
        self.respond(name_prefix, needle, exit_code, "scripted failure\n");
    }

    /// Commands on resources named `name_prefix*` whose argv contains
    /// `needle` exit with `exit_code` and print `output`
    pub fn respond(&self, name_prefix: &str, needle: &str, exit_code: i32, output: &str) {
        self.lock().scripted.push(ScriptedCommand {
            name_prefix: name_prefix.to_string(),
            needle: needle.to_string(),
            exit_code,
            output: output.to_string(),
        });
    }

    /// Provisioning resources whose name contains `needle` is rejected
    pub fn fail_provision(&self, needle: &str) {
        self.lock().failing_provisions.push(needle.to_string());
    }

    /// Destroying resources named `name_prefix*` fails with a permission error
    pub fn fail_destroy(&self, name_prefix: &str) {
        self.lock().failing_destroys.push(name_prefix.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.scripted.clear();
        state.failing_provisions.clear();
        state.failing_destroys.clear();
    }

    /// Make `url` downloadable with the given content
    pub fn serve_artifact(&self, url: &str, content: &str) {
        self.lock()
            .artifacts
            .insert(url.to_string(), content.to_string());
    }

    /// Remove a resource behind the cluster's back, like `docker rm -f`
    pub fn remove_externally(&self, name: &str) -> bool {
        self.lock().resources.remove(name).is_some()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Every `(resource, argv)` passed to `run_command`, in order
    pub fn commands(&self) -> Vec<(String, Vec<String>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::RunCommand { resource, argv } => Some((resource, argv)),
                _ => None,
            })
            .collect()
    }

    pub fn provisioned(&self) -> Vec<ProvisionSpec> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Provision(spec) => Some(spec),
                _ => None,
            })
            .collect()
    }

    /// Names of resources that currently exist
    pub fn live_resources(&self) -> Vec<String> {
        self.lock().resources.keys().cloned().collect()
    }

    pub fn live_resources_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.live_resources()
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect()
    }

    /// Record the call and allocate an address. Without a provision delay the
    /// resource exists as soon as this returns.
    fn accept_provision(&self, spec: &ProvisionSpec) -> Result<ProvisionedResource> {
        let mut state = self.lock();
        state.calls.push(Call::Provision(spec.clone()));

        if state
            .failing_provisions
            .iter()
            .any(|needle| spec.name.contains(needle.as_str()))
        {
            return Err(Error::provisioning(format!("{}: quota exceeded", spec.name)));
        }
        if state.resources.contains_key(&spec.name) {
            return Err(Error::provisioning(format!("{}: name already in use", spec.name)));
        }

        let address = Ipv4Addr::from(u32::from(FIRST_ADDRESS) + state.next_address);
        state.next_address += 1;

        let resource = ProvisionedResource {
            name: spec.name.clone(),
            id: format!("fake-{:08x}", state.next_address),
            address: Some(IpAddr::V4(address)),
            labels: spec.labels.clone(),
        };
        if self.provision_delay.is_none() {
            state.resources.insert(spec.name.clone(), resource.clone());
        }
        tracing::debug!(name = %spec.name, %address, "fake provision");
        Ok(resource)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }
}

#[async_trait]
impl ResourceProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn requires_image_build(&self) -> bool {
        self.image_build
    }

    async fn provision(&self, spec: &ProvisionSpec) -> Result<ProvisionedResource> {
        let accepted = self.accept_provision(spec);
        let Some(delay) = self.provision_delay else {
            return accepted;
        };
        let resource = match accepted {
            Ok(resource) => resource,
            Err(e) => {
                tokio::time::sleep(delay / 2).await;
                return Err(e);
            }
        };

        let shared = Arc::clone(&self.state);
        let created = resource.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            lock(&shared).resources.insert(created.name.clone(), created);
        })
        .await
        .map_err(|e| Error::provider(format!("fake provision task failed: {e}")))?;
        Ok(resource)
    }

    async fn run_command(&self, resource: &str, argv: &[String]) -> Result<CommandOutput> {
        let mut state = self.lock();
        state.calls.push(Call::RunCommand {
            resource: resource.to_string(),
            argv: argv.to_vec(),
        });

        if !state.resources.contains_key(resource) {
            return Err(Error::provider(format!("No such container: {resource}")));
        }

        let command_line = argv.join(" ");
        let scripted = state
            .scripted
            .iter()
            .rev()
            .find(|s| resource.starts_with(&s.name_prefix) && command_line.contains(&s.needle));

        Ok(match scripted {
            Some(s) => CommandOutput {
                exit_code: s.exit_code,
                output: s.output.clone(),
            },
            None => CommandOutput {
                exit_code: 0,
                output: String::new(),
            },
        })
    }

    async fn list_by_name_prefix(&self, prefix: &str) -> Result<Vec<ProvisionedResource>> {
        let mut state = self.lock();
        state.calls.push(Call::List(prefix.to_string()));

        Ok(state
            .resources
            .values()
            .filter(|r| r.name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn destroy(&self, resource: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Destroy(resource.to_string()));

        if state
            .failing_destroys
            .iter()
            .any(|prefix| resource.starts_with(prefix))
        {
            return Err(Error::provider(format!("{resource}: permission denied")));
        }

        state.resources.remove(resource);
        Ok(())
    }

    async fn copy_file(&self, copy: &FileCopy) -> Result<()> {
        self.lock().calls.push(Call::CopyFile(copy.clone()));
        Ok(())
    }

    async fn build_image(&self, build: &ImageBuild) -> Result<()> {
        self.lock().calls.push(Call::BuildImage(build.clone()));
        Ok(())
    }

    async fn host_storage_driver(&self) -> Result<Option<String>> {
        self.lock().calls.push(Call::HostStorageDriver);
        Ok(self.host_storage_driver.clone())
    }

    async fn fetch_artifact(&self, url: &str, destination: &Path) -> Result<()> {
        let content = {
            let mut state = self.lock();
            state.calls.push(Call::FetchArtifact(url.to_string()));
            state.artifacts.get(url).cloned()
        };

        match content {
            Some(content) => Ok(std::fs::write(destination, content)?),
            None => Err(Error::UnsupportedOperation {
                backend: self.name(),
                operation: "install from URL",
            }),
        }
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().expect("fake provider state poisoned")
}
