//! Tart virtual machine backend (macOS hosts).
//!
//! The VM is cloned from the requested image, sized with `tart set`, and run
//! headless in a detached `tart run` process. Commands go through the guest
//! agent via `tart exec`.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::command::{is_tool_installed, run_command, spawn_detached};
use crate::error::{ProviderError, Result};
use crate::{context_name, CreateHint, ExecOptions, ExecOutput, ExecutionHandle, Provider, WORKSPACE_LABEL};

const DEFAULT_TART_IMAGE: &str = "ghcr.io/cirruslabs/ubuntu:latest";

#[derive(Debug, Clone)]
pub struct TartProvider;

impl TartProvider {
    pub fn new() -> Result<Self> {
        if !is_tool_installed("tart") {
            return Err(ProviderError::DependencyNotFound("Tart".into()));
        }
        Ok(Self)
    }

    async fn apply_resources(&self, vm_name: &str, hint: &CreateHint) -> Result<()> {
        let mut args = vec!["set".to_string(), vm_name.to_string()];
        if hint.cpus > 0 {
            args.push("--cpu".to_string());
            args.push(hint.cpus.to_string());
        }
        if let Some(memory_mb) = size_in_mb(&hint.memory) {
            args.push("--memory".to_string());
            args.push(memory_mb.to_string());
        }
        if let Some(disk_gb) = size_in_mb(&hint.disk).map(|mb| mb.div_ceil(1024)) {
            args.push("--disk-size".to_string());
            args.push(disk_gb.to_string());
        }
        if args.len() > 2 {
            info!(vm = vm_name, "applying VM resource limits");
            run_command("tart", &args, &[]).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for TartProvider {
    fn name(&self) -> &'static str {
        "tart"
    }

    async fn create(
        &self,
        id: &str,
        _workspace_path: &Path,
        hint: &CreateHint,
    ) -> Result<ExecutionHandle> {
        let vm_name = context_name(id);
        let image = if hint.image.is_empty() {
            DEFAULT_TART_IMAGE
        } else {
            hint.image.as_str()
        };

        run_command("tart", &["clone", image, vm_name.as_str()], &[]).await?;
        self.apply_resources(&vm_name, hint).await?;

        if hint.shell_port.is_some() {
            // VMs get their own address; host port forwarding is left to the relay.
            warn!(vm = %vm_name, "tart does not map host ports, shell port is advisory");
        }

        let mut labels = hint.labels.clone();
        labels.insert(WORKSPACE_LABEL.to_string(), id.to_string());
        Ok(ExecutionHandle {
            id: vm_name.clone(),
            name: vm_name,
            provider: self.name().to_string(),
            status: "stopped".to_string(),
            labels,
        })
    }

    async fn start(&self, id: &str) -> Result<()> {
        let vm_name = context_name(id);
        spawn_detached("tart", &["run", "--no-graphics", vm_name.as_str()])
    }

    async fn stop(&self, id: &str) -> Result<()> {
        run_command("tart", &["stop".to_string(), context_name(id)], &[]).await?;
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        let vm_name = context_name(id);
        // `tart delete` refuses running VMs.
        if let Err(e) = run_command("tart", &["stop", vm_name.as_str()], &[]).await {
            warn!(vm = %vm_name, error = %e, "stop before delete failed");
        }
        run_command("tart", &["delete", vm_name.as_str()], &[]).await?;
        Ok(())
    }

    async fn exec(&self, id: &str, opts: &ExecOptions) -> Result<ExecOutput> {
        let mut args = vec!["exec".to_string(), context_name(id)];
        if !opts.env.is_empty() {
            args.push("env".to_string());
            args.extend(opts.env.iter().map(|(k, v)| format!("{k}={v}")));
        }
        args.extend(opts.cmd.iter().cloned());

        let output = run_command("tart", &args, &[]).await?;
        Ok(ExecOutput {
            stdout: if opts.capture_stdout { output.stdout } else { String::new() },
            stderr: if opts.capture_stderr { output.stderr } else { String::new() },
        })
    }

    async fn list(&self) -> Result<Vec<ExecutionHandle>> {
        let output = run_command("tart", &["list", "--format", "json"], &[]).await?;
        parse_tart_list(&output.stdout)
    }
}

#[derive(Deserialize)]
struct TartListEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "State", default)]
    state: String,
}

fn parse_tart_list(output: &str) -> Result<Vec<ExecutionHandle>> {
    let entries: Vec<TartListEntry> =
        serde_json::from_str(output).map_err(|e| ProviderError::Parse {
            what: "tart list output",
            message: e.to_string(),
        })?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let workspace = entry.name.strip_prefix("nexus-")?.to_string();
            let mut labels = BTreeMap::new();
            labels.insert(WORKSPACE_LABEL.to_string(), workspace);
            Some(ExecutionHandle {
                id: entry.name.clone(),
                name: entry.name,
                provider: "tart".to_string(),
                status: entry.state,
                labels,
            })
        })
        .collect())
}

/// Parse `"4GB"`, `"512MB"`, `"2GiB"` or a bare number of megabytes.
fn size_in_mb(size: &str) -> Option<u64> {
    let size = size.trim().to_ascii_uppercase();
    if size.is_empty() {
        return None;
    }
    let split = size
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(size.len());
    let (number, unit) = size.split_at(split);
    let number: u64 = number.parse().ok()?;
    match unit.trim().trim_end_matches("IB").trim_end_matches('B') {
        "" | "M" => Some(number),
        "G" => Some(number * 1024),
        "T" => Some(number * 1024 * 1024),
        "K" => Some(number.div_ceil(1024)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_in_mb() {
        assert_eq!(size_in_mb("4GB"), Some(4096));
        assert_eq!(size_in_mb("512MB"), Some(512));
        assert_eq!(size_in_mb("2GiB"), Some(2048));
        assert_eq!(size_in_mb("1024"), Some(1024));
        assert_eq!(size_in_mb("lots"), None);
        assert_eq!(size_in_mb(""), None);
    }

    #[test]
    fn test_parse_tart_list_keeps_only_nexus_vms() {
        let output = r#"[
            {"Name":"nexus-ws-1","State":"running","Source":"local"},
            {"Name":"personal-vm","State":"stopped","Source":"local"}
        ]"#;
        let handles = parse_tart_list(output).unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].name, "nexus-ws-1");
        assert_eq!(handles[0].labels[WORKSPACE_LABEL], "ws-1");
        assert_eq!(handles[0].status, "running");
    }
}
