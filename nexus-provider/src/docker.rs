//! Docker backend.
//!
//! Each workspace gets one long-lived container named `nexus-<id>` that idles
//! on `sleep infinity`; everything else happens through `docker exec`.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::command::{is_tool_installed, run_command};
use crate::error::{ProviderError, Result};
use crate::{
    context_name, CreateHint, ExecOptions, ExecOutput, ExecutionHandle, Provider, WORKSPACE_LABEL,
};

/// Mount point of the workspace directory inside the container.
pub const CONTAINER_WORKSPACE_DIR: &str = "/workspace";

#[derive(Debug, Clone)]
pub struct DockerProvider {
    executable: &'static str,
}

impl DockerProvider {
    pub fn new() -> Result<Self> {
        if !is_tool_installed("docker") {
            return Err(ProviderError::DependencyNotFound("Docker".into()));
        }
        Ok(Self {
            executable: "docker",
        })
    }
}

#[async_trait]
impl Provider for DockerProvider {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn create(
        &self,
        id: &str,
        workspace_path: &Path,
        hint: &CreateHint,
    ) -> Result<ExecutionHandle> {
        let args = create_args(id, workspace_path, hint);
        let output = run_command(self.executable, &args, &[]).await?;
        let container_id = output.stdout.trim().to_string();
        info!(workspace_id = id, container_id = %container_id, "created docker container");

        Ok(handle_for(id, container_id, self.name(), hint))
    }

    async fn start(&self, id: &str) -> Result<()> {
        run_command(self.executable, &["start".to_string(), context_name(id)], &[]).await?;
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        run_command(self.executable, &["stop".to_string(), context_name(id)], &[]).await?;
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        run_command(
            self.executable,
            &["rm".to_string(), "-f".to_string(), context_name(id)],
            &[],
        )
        .await?;
        Ok(())
    }

    async fn exec(&self, id: &str, opts: &ExecOptions) -> Result<ExecOutput> {
        let output = run_command(self.executable, &exec_args(id, opts), &[]).await?;
        Ok(select_streams(opts, output.stdout, output.stderr))
    }

    async fn list(&self) -> Result<Vec<ExecutionHandle>> {
        let filter = format!("label={WORKSPACE_LABEL}");
        let output = run_command(
            self.executable,
            &["ps", "-a", "--filter", filter.as_str(), "--format", "{{json .}}"],
            &[],
        )
        .await?;
        parse_docker_ps(&output.stdout, self.name())
    }
}

/// Arguments for `<engine> create ...`. Shared with the podman backend.
pub(crate) fn create_args(id: &str, workspace_path: &Path, hint: &CreateHint) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        context_name(id),
        "--hostname".to_string(),
        id.to_string(),
        "--label".to_string(),
        format!("{WORKSPACE_LABEL}={id}"),
    ];

    for (key, value) in &hint.labels {
        args.push("--label".to_string());
        args.push(format!("{key}={value}"));
    }
    if hint.cpus > 0 {
        args.push("--cpus".to_string());
        args.push(hint.cpus.to_string());
    }
    if let Some(memory) = engine_size(&hint.memory) {
        args.push("--memory".to_string());
        args.push(memory);
    }
    if let Some(port) = hint.shell_port {
        args.push("-p".to_string());
        args.push(format!("{port}:22"));
    }

    args.push("-v".to_string());
    args.push(format!(
        "{}:{CONTAINER_WORKSPACE_DIR}",
        workspace_path.display()
    ));
    args.push("-w".to_string());
    args.push(CONTAINER_WORKSPACE_DIR.to_string());
    args.push(hint.image.clone());
    args.push("sleep".to_string());
    args.push("infinity".to_string());
    args
}

/// Arguments for `<engine> exec ...`. Shared with the podman backend.
pub(crate) fn exec_args(id: &str, opts: &ExecOptions) -> Vec<String> {
    let mut args = vec!["exec".to_string()];
    for (key, value) in &opts.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(context_name(id));
    args.extend(opts.cmd.iter().cloned());
    args
}

pub(crate) fn select_streams(opts: &ExecOptions, stdout: String, stderr: String) -> ExecOutput {
    ExecOutput {
        stdout: if opts.capture_stdout { stdout } else { String::new() },
        stderr: if opts.capture_stderr { stderr } else { String::new() },
    }
}

pub(crate) fn handle_for(
    id: &str,
    container_id: String,
    provider: &str,
    hint: &CreateHint,
) -> ExecutionHandle {
    let mut labels = hint.labels.clone();
    labels.insert(WORKSPACE_LABEL.to_string(), id.to_string());
    ExecutionHandle {
        id: container_id,
        name: context_name(id),
        provider: provider.to_string(),
        status: "created".to_string(),
        labels,
    }
}

/// `"2GB"` -> `"2g"`, `"512MB"` -> `"512m"`; empty means "no limit".
pub(crate) fn engine_size(size: &str) -> Option<String> {
    let size = size.trim().to_ascii_lowercase();
    if size.is_empty() {
        return None;
    }
    let trimmed = size
        .strip_suffix("ib")
        .or_else(|| {
            size.strip_suffix('b')
                .filter(|s| s.ends_with(|c: char| matches!(c, 'k' | 'm' | 'g' | 't')))
        })
        .unwrap_or(&size);
    Some(trimmed.to_string())
}

#[derive(Deserialize)]
struct DockerPsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Labels", default)]
    labels: String,
}

fn parse_docker_ps(output: &str, provider: &str) -> Result<Vec<ExecutionHandle>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let entry: DockerPsLine =
                serde_json::from_str(line).map_err(|e| ProviderError::Parse {
                    what: "docker ps output",
                    message: e.to_string(),
                })?;
            let labels: BTreeMap<String, String> = entry
                .labels
                .split(',')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            Ok(ExecutionHandle {
                id: entry.id,
                name: entry.names,
                provider: provider.to_string(),
                status: entry.state,
                labels,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint() -> CreateHint {
        CreateHint {
            image: "ubuntu:22.04".to_string(),
            cpus: 2,
            memory: "4GB".to_string(),
            disk: "20GB".to_string(),
            shell_port: Some(2222),
            labels: BTreeMap::new(),
        }
    }

    #[test]
    fn test_create_args() {
        let args = create_args("ws-1", Path::new("/var/lib/nexus/workspaces/ws-1"), &hint());
        let joined = args.join(" ");
        assert!(joined.starts_with("create --name nexus-ws-1"));
        assert!(joined.contains("--label nexus.workspace=ws-1"));
        assert!(joined.contains("--cpus 2"));
        assert!(joined.contains("--memory 4g"));
        assert!(joined.contains("-p 2222:22"));
        assert!(joined.contains("-v /var/lib/nexus/workspaces/ws-1:/workspace"));
        assert!(joined.ends_with("ubuntu:22.04 sleep infinity"));
    }

    #[test]
    fn test_exec_args_include_env_before_container() {
        let mut env = BTreeMap::new();
        env.insert("PORT".to_string(), "3000".to_string());
        let opts = ExecOptions::shell("npm start").with_env(env);
        let args = exec_args("ws-1", &opts);
        assert_eq!(
            args,
            vec!["exec", "-e", "PORT=3000", "nexus-ws-1", "/bin/bash", "-c", "npm start"]
        );
    }

    #[test]
    fn test_engine_size() {
        assert_eq!(engine_size("4GB").as_deref(), Some("4g"));
        assert_eq!(engine_size("512MB").as_deref(), Some("512m"));
        assert_eq!(engine_size("2GiB").as_deref(), Some("2g"));
        assert_eq!(engine_size("1024").as_deref(), Some("1024"));
        assert_eq!(engine_size(""), None);
    }

    #[test]
    fn test_parse_docker_ps() {
        let output = r#"{"ID":"abc123","Names":"nexus-ws-1","State":"running","Labels":"nexus.workspace=ws-1,team=core"}
{"ID":"def456","Names":"nexus-ws-2","State":"exited","Labels":"nexus.workspace=ws-2"}
"#;
        let handles = parse_docker_ps(output, "docker").unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].id, "abc123");
        assert_eq!(handles[0].status, "running");
        assert_eq!(handles[0].labels.get("team").map(String::as_str), Some("core"));
        assert_eq!(handles[1].name, "nexus-ws-2");
    }

    #[test]
    fn test_parse_docker_ps_rejects_garbage() {
        assert!(parse_docker_ps("not json", "docker").is_err());
        assert!(parse_docker_ps("", "docker").unwrap().is_empty());
    }

    #[test]
    fn test_select_streams_honours_capture_flags() {
        let opts = ExecOptions::new(["true"]);
        let out = select_streams(&opts, "out".into(), "err".into());
        assert!(out.stdout.is_empty() && out.stderr.is_empty());

        let out = select_streams(&opts.capture_output(), "out".into(), "err".into());
        assert_eq!(out.stdout, "out");
        assert_eq!(out.stderr, "err");
    }
}
