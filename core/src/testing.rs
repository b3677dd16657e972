//! In-memory fakes for unit and integration tests.
//!
//! Compiled for this crate's own tests and, behind the `testing` feature,
//! for downstream crates' tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{HostError, ProbeError, TaskError};
use crate::executor::traits::{Builder, RetryStrategyPlugin};
use crate::executor::types::{Change, CheckOutcome, NodeTask, TaskContext};
use crate::executor::{Fragment, TaskKey};
use crate::host::{CommandOutput, HostSystem, PathInfo};
use crate::model::{CloudProvider, Keystore, SecretStore};
use crate::negotiate::CapabilityProbe;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A host that lives entirely in memory and counts every mutation.
#[derive(Debug)]
pub struct MemoryHost {
    root: PathBuf,
    files: Mutex<BTreeMap<PathBuf, (Vec<u8>, u32)>>,
    kernel: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    dirs: Mutex<BTreeMap<PathBuf, u32>>,
    queries: Mutex<HashMap<String, CommandOutput>>,
    effects: Mutex<HashMap<String, Vec<(String, CommandOutput)>>>,
    failing_runs: Mutex<HashMap<String, String>>,
    downloads: Mutex<HashMap<String, Vec<u8>>>,
    commands: Mutex<Vec<String>>,
    mutations: AtomicUsize,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::with_root("/")
    }
}

impl MemoryHost {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: Mutex::default(),
            kernel: Mutex::default(),
            dirs: Mutex::default(),
            queries: Mutex::default(),
            effects: Mutex::default(),
            failing_runs: Mutex::default(),
            downloads: Mutex::default(),
            commands: Mutex::default(),
            mutations: AtomicUsize::new(0),
        }
    }

    /// Seed a file without counting it as a mutation.
    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl AsRef<[u8]>, mode: u32) -> Self {
        lock(&self.files).insert(path.into(), (contents.as_ref().to_vec(), mode));
        self
    }

    /// Seed a file of the live kernel, e.g. `/proc/filesystems`.
    pub fn with_kernel_file(self, path: impl Into<PathBuf>, contents: impl AsRef<[u8]>) -> Self {
        lock(&self.kernel).insert(path.into(), contents.as_ref().to_vec());
        self
    }

    pub fn with_dir(self, path: impl Into<PathBuf>, mode: u32) -> Self {
        lock(&self.dirs).insert(path.into(), mode);
        self
    }

    /// Answer a read-only command.
    pub fn respond(self, command: &str, output: CommandOutput) -> Self {
        lock(&self.queries).insert(command.to_string(), output);
        self
    }

    /// After `command` runs, `query` answers with `output`.
    pub fn on_run(self, command: &str, query: &str, output: CommandOutput) -> Self {
        lock(&self.effects)
            .entry(command.to_string())
            .or_default()
            .push((query.to_string(), output));
        self
    }

    pub fn fail_run(self, command: &str, stderr: &str) -> Self {
        lock(&self.failing_runs).insert(command.to_string(), stderr.to_string());
        self
    }

    pub fn serve(self, url: &str, body: impl AsRef<[u8]>) -> Self {
        lock(&self.downloads).insert(url.to_string(), body.as_ref().to_vec());
        self
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        lock(&self.files).get(path.as_ref()).map(|(c, _)| c.clone())
    }

    pub fn file_string(&self, path: impl AsRef<Path>) -> Option<String> {
        self.file(path).map(|c| String::from_utf8_lossy(&c).into_owned())
    }

    pub fn mode(&self, path: impl AsRef<Path>) -> Option<u32> {
        let path = path.as_ref();
        lock(&self.files)
            .get(path)
            .map(|(_, m)| *m)
            .or_else(|| lock(&self.dirs).get(path).copied())
    }

    /// Every command passed to `run`, joined with spaces.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl HostSystem for MemoryHost {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>, HostError> {
        Ok(self.file(path))
    }

    async fn read_kernel_file(&self, path: &Path) -> Result<Option<Vec<u8>>, HostError> {
        Ok(lock(&self.kernel).get(path).cloned())
    }

    async fn stat(&self, path: &Path) -> Result<Option<PathInfo>, HostError> {
        if let Some((_, mode)) = lock(&self.files).get(path) {
            return Ok(Some(PathInfo {
                is_dir: false,
                mode: *mode,
            }));
        }
        Ok(lock(&self.dirs).get(path).map(|mode| PathInfo {
            is_dir: true,
            mode: *mode,
        }))
    }

    async fn query(&self, command: &[String]) -> Result<CommandOutput, HostError> {
        let key = command.join(" ");
        Ok(lock(&self.queries)
            .get(&key)
            .cloned()
            .unwrap_or_else(|| CommandOutput::failed("")))
    }

    async fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> Result<(), HostError> {
        self.mutated();
        lock(&self.files).insert(path.to_path_buf(), (contents.to_vec(), mode));
        Ok(())
    }

    async fn create_dir(&self, path: &Path, mode: u32) -> Result<(), HostError> {
        self.mutated();
        lock(&self.dirs).insert(path.to_path_buf(), mode);
        Ok(())
    }

    async fn run(&self, command: &[String]) -> Result<CommandOutput, HostError> {
        self.mutated();
        let key = command.join(" ");
        lock(&self.commands).push(key.clone());

        if let Some(stderr) = lock(&self.failing_runs).get(&key) {
            return Err(HostError::CommandFailed {
                command: key,
                status: "exit status: 1".to_string(),
                output: stderr.clone(),
            });
        }
        if let Some(effects) = lock(&self.effects).get(&key) {
            let mut queries = lock(&self.queries);
            for (query, output) in effects {
                queries.insert(query.clone(), output.clone());
            }
        }
        Ok(CommandOutput::ok(""))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), HostError> {
        let body = lock(&self.downloads).get(url).cloned();
        match body {
            Some(body) => self.write_file(dest, &body, 0o644).await,
            None => Err(HostError::Download {
                url: url.to_string(),
                message: "404 Not Found".to_string(),
            }),
        }
    }
}

/// Keystore and secret store with nothing in them.
#[derive(Debug, Default)]
pub struct EmptyStores;

#[async_trait]
impl Keystore for EmptyStores {
    async fn certificate(&self, _name: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

#[async_trait]
impl SecretStore for EmptyStores {
    async fn secret(&self, _name: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Keystore and secret store backed by maps.
#[derive(Debug, Default)]
pub struct MemoryStores {
    certificates: BTreeMap<String, String>,
    secrets: BTreeMap<String, Vec<u8>>,
}

/// A syntactically plausible PEM block for store fixtures.
pub const TEST_CA_PEM: &str =
    "-----BEGIN CERTIFICATE-----\nMIIBdummyCAcertificate\n-----END CERTIFICATE-----\n";

impl MemoryStores {
    /// A store holding the cluster CA and the `kube` admin secret.
    pub fn cluster() -> Self {
        Self::default()
            .with_certificate("ca", TEST_CA_PEM)
            .with_secret("kube", b"s3cr3t")
    }

    pub fn with_certificate(mut self, name: &str, pem: &str) -> Self {
        self.certificates.insert(name.to_string(), pem.to_string());
        self
    }

    pub fn with_secret(mut self, name: &str, data: &[u8]) -> Self {
        self.secrets.insert(name.to_string(), data.to_vec());
        self
    }
}

#[async_trait]
impl Keystore for MemoryStores {
    async fn certificate(&self, name: &str) -> anyhow::Result<Option<String>> {
        Ok(self.certificates.get(name).cloned())
    }
}

#[async_trait]
impl SecretStore for MemoryStores {
    async fn secret(&self, name: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.secrets.get(name).cloned())
    }
}

/// A cloud handle with canned instance metadata that counts `close` calls.
#[derive(Debug)]
pub struct CountingCloud {
    provider: String,
    metadata: BTreeMap<String, String>,
    closed: AtomicUsize,
}

impl Default for CountingCloud {
    fn default() -> Self {
        Self::for_provider("counting")
    }
}

impl CountingCloud {
    pub fn for_provider(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            metadata: BTreeMap::new(),
            closed: AtomicUsize::new(0),
        }
    }

    pub fn with_metadata(mut self, path: &str, value: &str) -> Self {
        self.metadata.insert(path.to_string(), value.to_string());
        self
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CloudProvider for CountingCloud {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn metadata(&self, path: &str) -> anyhow::Result<Option<String>> {
        Ok(self.metadata.get(path).cloned())
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn task_context(host: Arc<MemoryHost>) -> TaskContext {
    TaskContext {
        host,
        keystore: Arc::new(EmptyStores),
        secrets: Arc::new(EmptyStores),
        config_base: PathBuf::from("/srv/config"),
        cloud: None,
        tags: Default::default(),
    }
}

/// Output sink that can be read back after the target is done with it.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.0)).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Retry after the same delay every time.
#[derive(Debug)]
pub struct FixedDelay(pub Duration);

impl RetryStrategyPlugin for FixedDelay {
    fn name(&self) -> &str {
        "fixed-test"
    }

    fn next_delay(&self, _attempt: u32, _error: &TaskError) -> Duration {
        self.0
    }
}

/// A task that either already matches or always needs applying.
#[derive(Debug, Default)]
pub struct StubTask {
    deps: Vec<TaskKey>,
    satisfied: bool,
    applies: AtomicU32,
}

impl StubTask {
    pub fn satisfied() -> Self {
        Self {
            satisfied: true,
            ..Default::default()
        }
    }

    pub fn with_deps(deps: &[&str]) -> Self {
        Self {
            deps: deps.iter().map(|d| TaskKey::new(*d)).collect(),
            ..Default::default()
        }
    }

    pub fn applies(&self) -> u32 {
        self.applies.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeTask for StubTask {
    fn kind(&self) -> &'static str {
        "Stub"
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        self.deps.clone()
    }

    fn desired(&self) -> Vec<Change> {
        vec![Change::create("state", "converged")]
    }

    async fn check(&self, _ctx: &TaskContext) -> Result<CheckOutcome, TaskError> {
        if self.satisfied {
            Ok(CheckOutcome::Satisfied)
        } else {
            Ok(CheckOutcome::Changes(self.desired()))
        }
    }

    async fn apply(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn render_script(&self) -> Result<Vec<String>, TaskError> {
        Ok(vec!["true".to_string()])
    }
}

/// A builder that contributes [`StubTask`]s, or fails.
#[derive(Debug)]
pub struct StubBuilder {
    name: String,
    tasks: Vec<(String, Vec<String>)>,
    fail: bool,
}

impl StubBuilder {
    pub fn new(name: &str, tasks: &[(&str, &[&str])]) -> Self {
        Self {
            name: name.to_string(),
            tasks: tasks
                .iter()
                .map(|(k, deps)| (k.to_string(), deps.iter().map(|d| d.to_string()).collect()))
                .collect(),
            fail: false,
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tasks: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl Builder for StubBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn build(&self) -> anyhow::Result<Fragment> {
        if self.fail {
            anyhow::bail!("required secret not found");
        }
        let mut fragment = Fragment::new();
        for (key, deps) in &self.tasks {
            let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
            fragment.add(key.as_str(), StubTask::with_deps(&deps));
        }
        Ok(fragment)
    }
}

pub type TaskLog = Arc<Mutex<Vec<(String, &'static str)>>>;

/// A task that records each attempt and each completion in a shared log,
/// and fails according to a script.
#[derive(Debug)]
pub struct RecordingTask {
    name: String,
    deps: Vec<TaskKey>,
    log: TaskLog,
    failures: Mutex<Vec<TaskError>>,
    always: Option<TaskError>,
}

impl RecordingTask {
    pub fn log() -> TaskLog {
        Arc::default()
    }

    pub fn new(name: &str, log: &TaskLog) -> Self {
        Self {
            name: name.to_string(),
            deps: Vec::new(),
            log: log.clone(),
            failures: Mutex::default(),
            always: None,
        }
    }

    pub fn after(mut self, deps: &[&str]) -> Self {
        self.deps = deps.iter().map(|d| TaskKey::new(*d)).collect();
        self
    }

    /// Fail with these errors, in order, before succeeding.
    pub fn failing(self, mut errors: Vec<TaskError>) -> Self {
        errors.reverse();
        *lock(&self.failures) = errors;
        self
    }

    pub fn always_failing(mut self, error: TaskError) -> Self {
        self.always = Some(error);
        self
    }

    pub fn finished(log: &TaskLog) -> Vec<String> {
        lock(log)
            .iter()
            .filter(|(_, event)| *event == "done")
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn attempts(log: &TaskLog, name: &str) -> usize {
        lock(log)
            .iter()
            .filter(|(n, event)| n == name && *event == "attempt")
            .count()
    }
}

#[async_trait]
impl NodeTask for RecordingTask {
    fn kind(&self) -> &'static str {
        "Recording"
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        self.deps.clone()
    }

    fn desired(&self) -> Vec<Change> {
        vec![Change::create(self.name.clone(), "done")]
    }

    async fn check(&self, _ctx: &TaskContext) -> Result<CheckOutcome, TaskError> {
        Ok(CheckOutcome::Changes(self.desired()))
    }

    async fn apply(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
        lock(&self.log).push((self.name.clone(), "attempt"));
        if let Some(err) = &self.always {
            return Err(err.clone());
        }
        if let Some(err) = lock(&self.failures).pop() {
            return Err(err);
        }
        lock(&self.log).push((self.name.clone(), "done"));
        Ok(())
    }

    fn render_script(&self) -> Result<Vec<String>, TaskError> {
        Ok(vec![format!("echo {}", self.name)])
    }
}

/// Capability probe driven by a fixed script.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    supported: Mutex<HashSet<String>>,
    enables: HashSet<String>,
    enable_fails: bool,
    probe_errors: HashSet<String>,
    enabled: Mutex<Vec<String>>,
    probes: AtomicUsize,
}

impl ScriptedProbe {
    pub fn supporting(facilities: &[&str]) -> Self {
        Self {
            supported: Mutex::new(facilities.iter().map(|f| f.to_string()).collect()),
            ..Default::default()
        }
    }

    /// Enabling any of these makes it supported.
    pub fn enables(mut self, facilities: &[&str]) -> Self {
        self.enables = facilities.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn failing_enable(mut self) -> Self {
        self.enable_fails = true;
        self
    }

    pub fn probe_error_for(mut self, facility: &str) -> Self {
        self.probe_errors.insert(facility.to_string());
        self
    }

    /// Facilities `enable` was called for, in order.
    pub fn enabled(&self) -> Vec<String> {
        lock(&self.enabled).clone()
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityProbe for ScriptedProbe {
    async fn is_supported(&self, facility: &str) -> Result<bool, ProbeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.probe_errors.contains(facility) {
            return Err(ProbeError::Probe {
                facility: facility.to_string(),
                message: "permission denied".to_string(),
            });
        }
        Ok(lock(&self.supported).contains(facility))
    }

    async fn enable(&self, facility: &str) -> Result<(), ProbeError> {
        lock(&self.enabled).push(facility.to_string());
        if self.enable_fails {
            return Err(ProbeError::Enable {
                facility: facility.to_string(),
                message: "modprobe exited with status 1".to_string(),
            });
        }
        if self.enables.contains(facility) {
            lock(&self.supported).insert(facility.to_string());
        }
        Ok(())
    }
}
