//! Isolation host.
//!
//! This module provides the `IsolateHost` trait and a Docker-based implementation
//! using the `bollard` crate. Every execution gets a fresh container with strict
//! resource limits and a read-only root filesystem. By default it joins an
//! internal network whose only reachable peer is the call-back proxy.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use codemode_core::config::SandboxSettings;
use codemode_core::{Error, Result};

use crate::proxy::ProxyBinding;

/// Prefix of the stdout line that carries an isolate's result envelope.
pub const RESULT_SENTINEL: &str = "__CODEMODE_RESULT__";

/// Path of the generated module inside the container.
const MODULE_PATH: &str = "/workspace/main.mjs";

// =============================================================================
// Isolate Types
// =============================================================================

/// Unique identifier for one isolate instance.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct IsolateId(pub String);

impl std::fmt::Display for IsolateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Default internal network for isolates.
pub const DEFAULT_NETWORK: &str = "codemode-isolates";

/// Network isolation profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetworkProfile {
    /// No network access. Tool calls through the proxy will fail.
    None,
    /// Bridge network (standard Docker networking). Isolates can reach the
    /// host and the internet.
    Bridge,
    /// Internal network with no route out. Created on first use; the proxy
    /// container is attached to it.
    Internal(String),
}

impl NetworkProfile {
    pub fn from_name(name: &str) -> Self {
        match name {
            "none" => Self::None,
            "bridge" => Self::Bridge,
            other => Self::Internal(other.to_string()),
        }
    }

    fn mode(&self) -> String {
        match self {
            Self::None => "none".to_string(),
            Self::Bridge => "bridge".to_string(),
            Self::Internal(name) => name.clone(),
        }
    }

    /// Extra `/etc/hosts` entries for the container.
    fn extra_hosts(&self) -> Option<Vec<String>> {
        match self {
            // Lets the isolate address the proxy on the host as host.docker.internal
            Self::Bridge => Some(vec!["host.docker.internal:host-gateway".to_string()]),
            Self::None | Self::Internal(_) => None,
        }
    }
}

/// Resource and runtime settings for isolates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolateConfig {
    /// Docker image providing the JavaScript runtime.
    pub image: String,
    /// Maximum memory in bytes.
    pub memory_limit: i64,
    /// CPU quota per 100ms period.
    pub cpu_quota: i64,
    /// Wall-clock limit for one execution.
    pub timeout: Duration,
    /// Network isolation profile.
    pub network_profile: NetworkProfile,
    /// Container to attach to an internal network so isolates can reach it.
    pub proxy_container: Option<String>,
}

impl Default for IsolateConfig {
    fn default() -> Self {
        Self {
            image: "node:20-alpine".to_string(),
            memory_limit: 128 * 1024 * 1024, // 128MB
            cpu_quota: 50_000,
            timeout: Duration::from_secs(30),
            network_profile: NetworkProfile::Internal(DEFAULT_NETWORK.to_string()),
            proxy_container: None,
        }
    }
}

impl From<&SandboxSettings> for IsolateConfig {
    fn from(settings: &SandboxSettings) -> Self {
        Self {
            image: settings.image.clone(),
            memory_limit: settings.memory_limit_bytes,
            cpu_quota: settings.cpu_quota,
            timeout: Duration::from_secs(settings.timeout_secs),
            network_profile: NetworkProfile::from_name(&settings.network),
            proxy_container: settings.proxy_container.clone(),
        }
    }
}

/// A self-contained JavaScript module to run in one isolate.
#[derive(Debug, Clone, PartialEq)]
pub struct IsolateModule {
    pub source: String,
}

/// How an isolate finished.
#[derive(Debug, Clone, PartialEq)]
pub enum IsolateOutcome {
    /// The code returned. `None` means it returned nothing.
    Returned(Option<Value>),
    /// The code raised, or the host stopped it.
    Raised {
        error: String,
        stack: Option<String>,
    },
}

impl IsolateOutcome {
    pub fn raised(error: impl Into<String>) -> Self {
        Self::Raised {
            error: error.into(),
            stack: None,
        }
    }
}

/// Find the last result envelope printed by a module.
pub fn parse_envelope(stdout: &str) -> Option<IsolateOutcome> {
    let line = stdout
        .lines()
        .rev()
        .find_map(|l| l.trim_end().strip_prefix(RESULT_SENTINEL))?;
    let envelope: Value = serde_json::from_str(line).ok()?;

    if envelope.get("ok").and_then(Value::as_bool) == Some(true) {
        return Some(IsolateOutcome::Returned(envelope.get("value").cloned()));
    }
    let error = envelope
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("Unknown isolate error")
        .to_string();
    let stack = envelope
        .get("stack")
        .and_then(Value::as_str)
        .map(String::from);
    Some(IsolateOutcome::Raised { error, stack })
}

fn write_module_command() -> String {
    format!("cat > {}", MODULE_PATH)
}

/// Decide how an exec finished. An envelope on stdout wins even when the
/// process had to be cut off afterwards.
fn outcome_from_output(output: &ExecOutput, timeout: Duration) -> IsolateOutcome {
    if let Some(outcome) = parse_envelope(&output.stdout) {
        return outcome;
    }
    if output.timed_out {
        return IsolateOutcome::raised(format!(
            "Execution timed out after {}s",
            timeout.as_secs()
        ));
    }
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        IsolateOutcome::raised(format!(
            "Isolate exited with code {} without a result",
            output.exit_code
        ))
    } else {
        IsolateOutcome::raised(stderr.to_string())
    }
}

// =============================================================================
// Isolate Host Trait
// =============================================================================

/// Backend that runs one module in a fresh, isolated runtime.
///
/// The runtime is created for the call and destroyed before `run` returns.
#[async_trait]
pub trait IsolateHost: Send + Sync {
    /// Run `module`, exposing only `binding` to it.
    ///
    /// Failures inside the module come back as [`IsolateOutcome::Raised`];
    /// `Err` means the host itself could not run it.
    async fn run(&self, module: &IsolateModule, binding: &ProxyBinding) -> Result<IsolateOutcome>;

    /// Check if the backend is reachable (e.g., Docker daemon running).
    async fn is_available(&self) -> bool;
}

// =============================================================================
// Docker Isolate Host
// =============================================================================

/// Docker-based isolation host using the `bollard` crate.
///
/// Creates one container per execution with:
/// - Read-only root filesystem (writable `/workspace` tmpfs only)
/// - Memory, CPU and process limits
/// - All capabilities dropped, non-root user
/// - Execution timeout enforcement
pub struct DockerIsolateHost {
    docker: bollard::Docker,
    config: IsolateConfig,
    network_ready: tokio::sync::OnceCell<()>,
}

struct ExecOutput {
    exit_code: i64,
    stdout: String,
    stderr: String,
    timed_out: bool,
}

impl DockerIsolateHost {
    /// Connect to the local Docker daemon.
    pub fn new(config: IsolateConfig) -> Result<Self> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            Error::sandbox(format!(
                "Failed to connect to Docker daemon: {}. Is Docker running?",
                e
            ))
        })?;
        Ok(Self::from_client(docker, config))
    }

    /// Create from an existing bollard Docker client.
    pub fn from_client(docker: bollard::Docker, config: IsolateConfig) -> Self {
        Self {
            docker,
            config,
            network_ready: tokio::sync::OnceCell::new(),
        }
    }

    /// Make sure an internal network exists and the proxy container is on it.
    async fn ensure_network(&self, name: &str) -> Result<()> {
        use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions, InspectNetworkOptions};

        let members: Vec<String> = match self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(network) => {
                if network.internal != Some(true) {
                    return Err(Error::sandbox(format!(
                        "Network '{}' exists but is not internal; refusing to give isolates egress",
                        name
                    )));
                }
                network
                    .containers
                    .unwrap_or_default()
                    .into_values()
                    .filter_map(|c| c.name)
                    .collect()
            }
            Err(_) => {
                self.docker
                    .create_network(CreateNetworkOptions {
                        name: name.to_string(),
                        driver: "bridge".to_string(),
                        internal: true,
                        labels: std::collections::HashMap::from([(
                            "managed-by".to_string(),
                            "codemode".to_string(),
                        )]),
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| Error::sandbox(format!("Failed to create isolate network: {}", e)))?;
                tracing::info!(network = %name, "Internal isolate network created");
                Vec::new()
            }
        };

        match &self.config.proxy_container {
            Some(container) if !members.contains(container) => {
                self.docker
                    .connect_network(
                        name,
                        ConnectNetworkOptions {
                            container: container.clone(),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(|e| {
                        Error::sandbox(format!(
                            "Failed to attach '{}' to isolate network: {}",
                            container, e
                        ))
                    })?;
                tracing::info!(network = %name, container = %container, "Proxy attached to isolate network");
            }
            Some(_) => {}
            None => tracing::warn!(
                network = %name,
                "sandbox.proxy_container not set - isolates on the internal network cannot reach the proxy"
            ),
        }
        Ok(())
    }

    async fn create(&self) -> Result<IsolateId> {
        use bollard::container::{Config, CreateContainerOptions};
        use bollard::models::{HostConfig, Mount, MountTmpfsOptions, MountTypeEnum};

        if let NetworkProfile::Internal(name) = &self.config.network_profile {
            self.network_ready
                .get_or_try_init(|| self.ensure_network(name))
                .await?;
        }

        let isolate_id = format!("codemode-isolate-{}", uuid::Uuid::new_v4());

        let host_config = HostConfig {
            memory: Some(self.config.memory_limit),
            cpu_quota: Some(self.config.cpu_quota),
            cpu_period: Some(100_000),
            network_mode: Some(self.config.network_profile.mode()),
            extra_hosts: self.config.network_profile.extra_hosts(),
            mounts: Some(vec![Mount {
                target: Some("/workspace".to_string()),
                typ: Some(MountTypeEnum::TMPFS),
                tmpfs_options: Some(MountTmpfsOptions {
                    size_bytes: Some(self.config.memory_limit / 4),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            readonly_rootfs: Some(true),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            pids_limit: Some(64),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(self.config.image.clone()),
            working_dir: Some("/workspace".to_string()),
            user: Some("node".to_string()),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            host_config: Some(host_config),
            labels: Some(std::collections::HashMap::from([(
                "managed-by".to_string(),
                "codemode".to_string(),
            )])),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: isolate_id.as_str(),
            platform: None,
        };

        self.docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| Error::sandbox(format!("Failed to create isolate container: {}", e)))?;

        let id = IsolateId(isolate_id);
        if let Err(e) = self.docker.start_container::<String>(&id.0, None).await {
            self.destroy(&id).await;
            return Err(Error::sandbox(format!("Failed to start isolate container: {}", e)));
        }

        tracing::debug!(isolate_id = %id, image = %self.config.image, "Isolate container started");
        Ok(id)
    }

    async fn exec(
        &self,
        id: &IsolateId,
        cmd: Vec<String>,
        env: Vec<String>,
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<ExecOutput> {
        use bollard::exec::{CreateExecOptions, StartExecResults};
        use tokio::io::AsyncWriteExt;

        let exec_options = CreateExecOptions {
            cmd: Some(cmd),
            env: Some(env),
            attach_stdin: Some(stdin.is_some()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            working_dir: Some("/workspace".to_string()),
            user: Some("node".to_string()),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(&id.0, exec_options)
            .await
            .map_err(|e| Error::sandbox(format!("Failed to create exec in isolate: {}", e)))?;

        let start_result = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Error::sandbox(format!("Failed to start exec in isolate: {}", e)))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, mut input } = start_result {
            use futures::StreamExt;

            if let Some(bytes) = stdin {
                input
                    .write_all(bytes)
                    .await
                    .map_err(|e| Error::sandbox(format!("Failed to write isolate stdin: {}", e)))?;
                input
                    .shutdown()
                    .await
                    .map_err(|e| Error::sandbox(format!("Failed to close isolate stdin: {}", e)))?;
            }

            let collect_future = async {
                while let Some(msg) = output.next().await {
                    match msg {
                        Ok(bollard::container::LogOutput::StdOut { message }) => {
                            stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(bollard::container::LogOutput::StdErr { message }) => {
                            stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            stderr.push_str(&format!("\n[isolate error: {}]", e));
                            break;
                        }
                    }
                }
            };

            if tokio::time::timeout(timeout, collect_future).await.is_err() {
                tracing::warn!(isolate_id = %id, "Isolate exec timed out");
                return Ok(ExecOutput {
                    exit_code: -1,
                    stdout,
                    stderr,
                    timed_out: true,
                });
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| Error::sandbox(format!("Failed to inspect exec result: {}", e)))?;

        Ok(ExecOutput {
            exit_code: inspect.exit_code.unwrap_or(-1),
            stdout,
            stderr,
            timed_out: false,
        })
    }

    async fn write_module(&self, id: &IsolateId, module: &IsolateModule) -> Result<()> {
        // Streamed over stdin so module size is not bounded by argv limits.
        let result = self
            .exec(
                id,
                vec!["sh".to_string(), "-c".to_string(), write_module_command()],
                Vec::new(),
                Some(module.source.as_bytes()),
                Duration::from_secs(10),
            )
            .await?;

        if result.exit_code != 0 || result.timed_out {
            return Err(Error::sandbox(format!(
                "Failed to write module into isolate: {}",
                result.stderr.trim()
            )));
        }
        Ok(())
    }

    async fn run_in(
        &self,
        id: &IsolateId,
        module: &IsolateModule,
        binding: &ProxyBinding,
    ) -> Result<IsolateOutcome> {
        self.write_module(id, module).await?;

        let env = vec![
            format!("CODEMODE_PROXY_URL={}", binding.endpoint()),
            format!("CODEMODE_PROXY_TOKEN={}", binding.token()),
            format!("CODEMODE_DO_ID={}", binding.do_id()),
        ];
        let output = self
            .exec(
                id,
                vec!["node".to_string(), MODULE_PATH.to_string()],
                env,
                None,
                self.config.timeout,
            )
            .await?;

        Ok(outcome_from_output(&output, self.config.timeout))
    }

    async fn destroy(&self, id: &IsolateId) {
        use bollard::container::RemoveContainerOptions;

        let removed = self
            .docker
            .remove_container(
                &id.0,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;

        match removed {
            Ok(()) => tracing::debug!(isolate_id = %id, "Isolate container destroyed"),
            Err(e) => tracing::warn!(isolate_id = %id, error = %e, "Failed to remove isolate container"),
        }
    }
}

#[async_trait]
impl IsolateHost for DockerIsolateHost {
    async fn run(&self, module: &IsolateModule, binding: &ProxyBinding) -> Result<IsolateOutcome> {
        let id = self.create().await?;
        let outcome = self.run_in(&id, module, binding).await;
        self.destroy(&id).await;
        outcome
    }

    async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

// =============================================================================
// Mock Isolate Host (for testing without Docker)
// =============================================================================

/// What a scripted isolate sees: the generated module and its proxy binding.
#[derive(Clone)]
pub struct IsolateScope {
    pub module: IsolateModule,
    pub binding: ProxyBinding,
}

type Script = Arc<dyn Fn(IsolateScope) -> BoxFuture<'static, Result<IsolateOutcome>> + Send + Sync>;

/// Isolation host whose behavior is a Rust closure.
///
/// The closure can call tools through `scope.binding`, exercising the same
/// proxy path a real isolate uses.
pub struct MockIsolateHost {
    script: Script,
    runs: AtomicUsize,
    modules: std::sync::Mutex<Vec<IsolateModule>>,
}

impl MockIsolateHost {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(IsolateScope) -> BoxFuture<'static, Result<IsolateOutcome>> + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
            runs: AtomicUsize::new(0),
            modules: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Every run finishes with `outcome`.
    pub fn returning(outcome: IsolateOutcome) -> Self {
        Self::new(move |_| {
            let outcome = outcome.clone();
            async move { Ok::<_, Error>(outcome) }.boxed()
        })
    }

    /// Number of isolates started so far.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Modules handed to the host, in order.
    pub fn modules(&self) -> Vec<IsolateModule> {
        self.modules.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl IsolateHost for MockIsolateHost {
    async fn run(&self, module: &IsolateModule, binding: &ProxyBinding) -> Result<IsolateOutcome> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut modules) = self.modules.lock() {
            modules.push(module.clone());
        }
        (self.script)(IsolateScope {
            module: module.clone(),
            binding: binding.clone(),
        })
        .await
    }

    async fn is_available(&self) -> bool {
        true
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_from_settings() {
        let settings = codemode_core::config::AppConfig::default().sandbox;
        let config = IsolateConfig::from(&settings);
        assert_eq!(config.image, "node:20-alpine");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(
            config.network_profile,
            NetworkProfile::Internal(DEFAULT_NETWORK.to_string())
        );
        assert_eq!(config.network_profile, IsolateConfig::default().network_profile);
        assert!(config.proxy_container.is_none());
    }

    #[test]
    fn test_only_bridge_gets_host_gateway() {
        assert_eq!(NetworkProfile::from_name("none"), NetworkProfile::None);
        assert_eq!(NetworkProfile::from_name("bridge"), NetworkProfile::Bridge);
        assert_eq!(
            NetworkProfile::from_name("isolates"),
            NetworkProfile::Internal("isolates".into())
        );

        assert!(NetworkProfile::Internal("isolates".into()).extra_hosts().is_none());
        assert!(NetworkProfile::None.extra_hosts().is_none());
        assert_eq!(
            NetworkProfile::Bridge.extra_hosts(),
            Some(vec!["host.docker.internal:host-gateway".to_string()])
        );
    }

    #[test]
    fn test_proxy_container_flows_from_settings() {
        let mut settings = codemode_core::config::AppConfig::default().sandbox;
        settings.proxy_container = Some("codemode".into());
        settings.network = "bridge".into();
        let config = IsolateConfig::from(&settings);
        assert_eq!(config.proxy_container.as_deref(), Some("codemode"));
        assert_eq!(config.network_profile, NetworkProfile::Bridge);
    }

    #[test]
    fn test_parse_envelope_value() {
        let stdout = format!("log line\n{}{}\n", RESULT_SENTINEL, json!({"ok": true, "value": 2}));
        assert_eq!(parse_envelope(&stdout), Some(IsolateOutcome::Returned(Some(json!(2)))));
    }

    #[test]
    fn test_parse_envelope_keeps_null_apart_from_nothing() {
        let null = format!("{}{}", RESULT_SENTINEL, json!({"ok": true, "value": null}));
        let nothing = format!("{}{}", RESULT_SENTINEL, json!({"ok": true}));
        assert_eq!(parse_envelope(&null), Some(IsolateOutcome::Returned(Some(Value::Null))));
        assert_eq!(parse_envelope(&nothing), Some(IsolateOutcome::Returned(None)));
    }

    #[test]
    fn test_parse_envelope_error() {
        let stdout = format!(
            "{}{}",
            RESULT_SENTINEL,
            json!({"ok": false, "error": "boom", "stack": "Error: boom\n    at main.mjs:3"})
        );
        assert_eq!(
            parse_envelope(&stdout),
            Some(IsolateOutcome::Raised {
                error: "boom".into(),
                stack: Some("Error: boom\n    at main.mjs:3".into()),
            })
        );
        assert_eq!(parse_envelope("no envelope here"), None);
    }

    fn exec_output(stdout: &str, timed_out: bool) -> ExecOutput {
        ExecOutput {
            exit_code: if timed_out { -1 } else { 0 },
            stdout: stdout.to_string(),
            stderr: String::new(),
            timed_out,
        }
    }

    #[test]
    fn test_module_upload_command_carries_no_payload() {
        let command = write_module_command();
        assert_eq!(command, "cat > /workspace/main.mjs");
        assert!(command.len() < 64);
    }

    #[test]
    fn test_envelope_survives_timeout() {
        let stdout = format!("{}{}\n", RESULT_SENTINEL, json!({"ok": true, "value": 7}));
        let outcome = outcome_from_output(&exec_output(&stdout, true), Duration::from_secs(5));
        assert_eq!(outcome, IsolateOutcome::Returned(Some(json!(7))));
    }

    #[test]
    fn test_timeout_without_envelope() {
        let outcome = outcome_from_output(&exec_output("partial", true), Duration::from_secs(5));
        assert_eq!(outcome, IsolateOutcome::raised("Execution timed out after 5s"));
    }

    #[test]
    fn test_exit_without_envelope_reports_stderr() {
        let mut output = exec_output("", false);
        output.exit_code = 1;
        assert_eq!(
            outcome_from_output(&output, Duration::from_secs(5)),
            IsolateOutcome::raised("Isolate exited with code 1 without a result")
        );
        output.stderr = "SyntaxError: Unexpected token\n".into();
        assert_eq!(
            outcome_from_output(&output, Duration::from_secs(5)),
            IsolateOutcome::raised("SyntaxError: Unexpected token")
        );
    }
}
