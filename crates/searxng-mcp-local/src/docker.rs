//! Optional auto-provisioning of a local SearXNG container.
//!
//! Everything here shells out to the `docker` CLI with bounded timeouts. It only runs
//! at startup when the operator asks for it; tool calls never touch it.

use crate::settings;
use searxng_mcp_core::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub const CONTAINER_NAME: &str = "searxng";
pub const IMAGE: &str = "docker.io/searxng/searxng:latest";
pub const HOST_PORT: u16 = 8888;
pub const CONTAINER_PORT: u16 = 8080;

const DOCKER_CMD_TIMEOUT: Duration = Duration::from_secs(120);

pub fn which(bin: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(bin))
        .find(|cand| cand.is_file())
}

pub fn has_docker() -> bool {
    which("docker").is_some()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    Missing,
    Stopped,
    Running,
}

/// Parse `docker ps -a --format "{{.Names}}\t{{.Status}}"` output for one container.
pub fn parse_ps_output(stdout: &str, name: &str) -> ContainerState {
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, '\t');
        let (Some(n), Some(status)) = (parts.next(), parts.next()) else {
            continue;
        };
        if n.trim() != name {
            continue;
        }
        return if status.trim_start().starts_with("Up") {
            ContainerState::Running
        } else {
            ContainerState::Stopped
        };
    }
    ContainerState::Missing
}

async fn docker(args: &[&str]) -> Result<String> {
    let mut cmd = tokio::process::Command::new("docker");
    cmd.args(args)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);
    let out = tokio::time::timeout(DOCKER_CMD_TIMEOUT, cmd.output())
        .await
        .map_err(|_| Error::Bootstrap(format!("docker {} timed out", args.join(" "))))?
        .map_err(|e| Error::Bootstrap(format!("failed to run docker: {e}")))?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(Error::Bootstrap(format!(
            "docker {} exited with {}: {}",
            args.first().copied().unwrap_or(""),
            out.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}

pub async fn container_state() -> Result<ContainerState> {
    let stdout = docker(&[
        "ps",
        "-a",
        "--filter",
        &format!("name={CONTAINER_NAME}"),
        "--format",
        "{{.Names}}\t{{.Status}}",
    ])
    .await?;
    Ok(parse_ps_output(&stdout, CONTAINER_NAME))
}

#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub base_url: String,
    pub config_dir: PathBuf,
    /// Checked before writing the built-in default settings.
    pub project_settings: PathBuf,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl BootstrapOptions {
    pub fn new(base_url: impl Into<String>, config_dir: PathBuf) -> Self {
        Self {
            base_url: base_url.into(),
            config_dir,
            project_settings: PathBuf::from(settings::PROJECT_SETTINGS_PATH),
            ready_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            poll_timeout: Duration::from_secs(5),
        }
    }
}

fn run_args(config_dir: &Path) -> Vec<String> {
    vec![
        "run".to_string(),
        "--name".to_string(),
        CONTAINER_NAME.to_string(),
        "-d".to_string(),
        "-p".to_string(),
        format!("{HOST_PORT}:{CONTAINER_PORT}"),
        "-v".to_string(),
        format!("{}:/etc/searxng/", config_dir.display()),
        IMAGE.to_string(),
    ]
}

/// Make sure a `searxng` container is running, creating it if needed, then wait until
/// the instance answers HTTP 200.
pub async fn ensure_container(
    http: &reqwest::Client,
    opts: &BootstrapOptions,
    shutdown: &CancellationToken,
) -> Result<()> {
    if !has_docker() {
        return Err(Error::Bootstrap("docker not found on PATH".to_string()));
    }

    match container_state().await? {
        ContainerState::Running => {
            tracing::info!("searxng container is already running");
        }
        ContainerState::Stopped => {
            tracing::info!("starting existing searxng container");
            docker(&["start", CONTAINER_NAME]).await?;
        }
        ContainerState::Missing => {
            let settings_path =
                settings::ensure_settings(&opts.config_dir, &opts.project_settings).await?;
            tracing::info!(settings = %settings_path.display(), "creating searxng container");
            let args = run_args(&opts.config_dir);
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            docker(&args).await?;
        }
    }

    wait_ready(http, opts, shutdown).await
}

pub async fn wait_ready(
    http: &reqwest::Client,
    opts: &BootstrapOptions,
    shutdown: &CancellationToken,
) -> Result<()> {
    tracing::info!(url = %opts.base_url, "waiting for searxng to be ready");
    let t0 = Instant::now();
    loop {
        let reply = http
            .get(&opts.base_url)
            .timeout(opts.poll_timeout)
            .send()
            .await;
        if let Ok(resp) = reply {
            if resp.status() == reqwest::StatusCode::OK {
                tracing::info!(
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "searxng is ready"
                );
                return Ok(());
            }
        }
        if t0.elapsed() >= opts.ready_timeout {
            return Err(Error::Bootstrap(format!(
                "timeout waiting for searxng at {} ({}s)",
                opts.base_url,
                opts.ready_timeout.as_secs()
            )));
        }
        tokio::select! {
            _ = shutdown.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(opts.poll_interval) => {}
        }
    }
}
