//! Podman backend.
//!
//! Podman accepts the Docker CLI surface for everything the engine needs, so
//! arguments are built by the docker module and translated here. Only `ps`
//! output differs enough to need its own parser.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::command::{is_tool_installed, run_command};
use crate::docker::{create_args, exec_args, handle_for, select_streams};
use crate::error::{ProviderError, Result};
use crate::{context_name, CreateHint, ExecOptions, ExecOutput, ExecutionHandle, Provider, WORKSPACE_LABEL};

#[derive(Debug, Clone)]
pub struct PodmanProvider;

impl PodmanProvider {
    pub fn new() -> Result<Self> {
        if !is_tool_installed("podman") {
            return Err(ProviderError::DependencyNotFound("Podman".into()));
        }
        Ok(Self)
    }
}

/// Translate Docker command arguments to Podman equivalents.
///
/// Rootless podman cannot honour `--cpus` without cgroup v2 delegation, so the
/// limit is expressed as a CPU quota instead.
fn translate_docker_to_podman(docker_args: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(docker_args.len());
    let mut args = docker_args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--cpus" {
            if let Some(cpus) = args.next() {
                out.push(format!("--cpu-quota={}", cpus.parse::<u64>().unwrap_or(1) * 100_000));
                out.push("--cpu-period=100000".to_string());
            }
            continue;
        }
        out.push(arg);
    }
    out
}

async fn podman<S: AsRef<str>>(args: &[S]) -> Result<crate::command::CommandOutput> {
    run_command("podman", args, &[]).await
}

#[async_trait]
impl Provider for PodmanProvider {
    fn name(&self) -> &'static str {
        "podman"
    }

    async fn create(
        &self,
        id: &str,
        workspace_path: &Path,
        hint: &CreateHint,
    ) -> Result<ExecutionHandle> {
        let args = translate_docker_to_podman(create_args(id, workspace_path, hint));
        let output = podman(&args).await?;
        let container_id = output.stdout.trim().to_string();
        info!(workspace_id = id, container_id = %container_id, "created podman container");

        Ok(handle_for(id, container_id, self.name(), hint))
    }

    async fn start(&self, id: &str) -> Result<()> {
        podman(&["start".to_string(), context_name(id)]).await?;
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        podman(&["stop".to_string(), context_name(id)]).await?;
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        podman(&["rm".to_string(), "-f".to_string(), context_name(id)]).await?;
        Ok(())
    }

    async fn exec(&self, id: &str, opts: &ExecOptions) -> Result<ExecOutput> {
        let output = podman(&translate_docker_to_podman(exec_args(id, opts))).await?;
        Ok(select_streams(opts, output.stdout, output.stderr))
    }

    async fn list(&self) -> Result<Vec<ExecutionHandle>> {
        let filter = format!("label={WORKSPACE_LABEL}");
        let output = podman(&["ps", "-a", "--filter", filter.as_str(), "--format", "json"]).await?;
        parse_podman_ps(&output.stdout)
    }
}

#[derive(Deserialize)]
struct PodmanPsEntry {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Labels", default)]
    labels: Option<BTreeMap<String, String>>,
}

fn parse_podman_ps(output: &str) -> Result<Vec<ExecutionHandle>> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<PodmanPsEntry> =
        serde_json::from_str(output).map_err(|e| ProviderError::Parse {
            what: "podman ps output",
            message: e.to_string(),
        })?;

    Ok(entries
        .into_iter()
        .map(|entry| ExecutionHandle {
            name: entry.names.into_iter().next().unwrap_or_else(|| entry.id.clone()),
            id: entry.id,
            provider: "podman".to_string(),
            status: entry.state,
            labels: entry.labels.unwrap_or_default(),
        })
        .collect())
}
