//! Read-only capability probes – devices, storage, processes, accounts,
//! recycle bin.
//!
//! A probe runs the enumerators of one area and reports what came back
//! plus per-step timing. Nothing is mutated.

use crate::context::AppContext;
use crate::traits::CapError;
use crate::types::*;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

pub const PROBES: [&str; 5] = ["devices", "storage", "processes", "accounts", "recycle_bin"];

/// Run a probe by name and return a full CommandResult.
pub async fn run_probe(name: &str, ctx: &AppContext) -> CommandResult {
    let run_id = new_run_id();
    let start = Instant::now();
    let mut steps = HashMap::new();

    let outcome = match name {
        "devices" => probe_devices(ctx, &mut steps).await,
        "storage" => probe_storage(ctx, &mut steps).await,
        "processes" => probe_processes(ctx, &mut steps).await,
        "accounts" => probe_accounts(ctx, &mut steps).await,
        "recycle_bin" => probe_recycle_bin(ctx, &mut steps).await,
        _ => {
            return result_err(
                "probe",
                name,
                &run_id,
                0,
                ErrorCode::InvalidInput,
                format!("unknown probe: {} (available: {})", name, PROBES.join(", ")),
            )
        }
    };
    let total = start.elapsed().as_millis() as u64;

    let mut r = match outcome {
        Ok(data) => {
            let mut r = result_ok("probe", name, &run_id, total);
            r.data = Some(data);
            r
        }
        Err((step, e)) => probe_err(name, &run_id, total, step, e),
    };
    r.timing_ms.steps = steps;
    r
}

type ProbeOutcome = Result<serde_json::Value, (&'static str, CapError)>;

/// Run one step, recording its duration under `step`.
async fn timed<T, F>(steps: &mut HashMap<String, u64>, step: &'static str, fut: F) -> Result<T, (&'static str, CapError)>
where
    F: std::future::Future<Output = Result<T, CapError>>,
{
    let t = Instant::now();
    let out = fut.await;
    steps.insert(step.to_string(), t.elapsed().as_millis() as u64);
    out.map_err(|e| (step, e))
}

fn probe_err(name: &str, run_id: &str, total: u64, step: &str, err: CapError) -> CommandResult {
    let message = format!("{} probe failed at {}: {}", name, step, err);
    // Hosts without the facility are skipped, not failed.
    match err {
        CapError::Unsupported(_) => {
            result_skip("probe", name, run_id, total, ErrorCode::Unsupported, message)
        }
        CapError::DependencyMissing(_) => {
            result_skip("probe", name, run_id, total, ErrorCode::DependencyMissing, message)
        }
        CapError::PermissionDenied(_) => {
            result_err("probe", name, run_id, total, ErrorCode::PermissionDenied, message)
        }
        CapError::Timeout(_) => result_err("probe", name, run_id, total, ErrorCode::Timeout, message),
        CapError::Io(_) => result_err("probe", name, run_id, total, ErrorCode::IoError, message),
        _ => result_err("probe", name, run_id, total, ErrorCode::OsFailure, message),
    }
}

async fn probe_devices(ctx: &AppContext, steps: &mut HashMap<String, u64>) -> ProbeOutcome {
    let devices = timed(steps, "list_devices", ctx.devices().list()).await?;
    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    for d in &devices {
        *by_status.entry(String::from(d.status.clone())).or_default() += 1;
    }
    Ok(serde_json::json!({
        "count": devices.len(),
        "by_status": by_status,
    }))
}

async fn probe_storage(ctx: &AppContext, steps: &mut HashMap<String, u64>) -> ProbeOutcome {
    let disks = timed(steps, "list_disks", ctx.storage().list_disks()).await?;
    let t = Instant::now();
    let mut partitions = 0usize;
    for disk in &disks {
        partitions += ctx
            .storage()
            .partitions(disk.disk_number)
            .await
            .map_err(|e| ("get_disk_partitions", e))?
            .len();
    }
    steps.insert("get_disk_partitions".into(), t.elapsed().as_millis() as u64);

    Ok(serde_json::json!({
        "disks": disks.len(),
        "partitions": partitions,
        "mounted": disks.iter().filter_map(|d| d.mount_point.clone()).collect::<Vec<_>>(),
    }))
}

async fn probe_processes(ctx: &AppContext, steps: &mut HashMap<String, u64>) -> ProbeOutcome {
    let processes = timed(steps, "list_processes", ctx.processes().list()).await?;
    let top = processes
        .iter()
        .max_by_key(|p| p.memory)
        .map(|p| serde_json::json!({ "pid": p.pid, "name": p.name, "memory": p.memory }));
    Ok(serde_json::json!({
        "count": processes.len(),
        "largest": top,
    }))
}

async fn probe_accounts(ctx: &AppContext, steps: &mut HashMap<String, u64>) -> ProbeOutcome {
    let users = timed(steps, "list_local_users", ctx.accounts().list_users()).await?;
    let groups = timed(steps, "list_local_groups", ctx.accounts().list_groups()).await?;
    Ok(serde_json::json!({
        "users": users.len(),
        "enabled_users": users.iter().filter(|u| u.enabled).count(),
        "groups": groups.len(),
    }))
}

async fn probe_recycle_bin(ctx: &AppContext, steps: &mut HashMap<String, u64>) -> ProbeOutcome {
    let bytes = timed(steps, "analyze_recycle_bin", ctx.recycle_bin().size()).await?;
    Ok(serde_json::json!({ "bytes": bytes }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::platform::processes::{SysinfoProcesses, SysinfoSystem};
    use crate::platform::Unsupported;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_all_probes_pass_on_simulated() {
        let ctx = AppContext::default_simulated();
        for name in PROBES {
            let r = run_probe(name, &ctx).await;
            assert_eq!(r.status, Status::Pass, "{} -> {:?}", name, r.error);
            assert!(!r.timing_ms.steps.is_empty());
        }
    }

    #[tokio::test]
    async fn test_storage_probe_counts() {
        let ctx = AppContext::default_simulated();
        let r = run_probe("storage", &ctx).await;
        let data = r.data.unwrap();
        assert_eq!(data["disks"], 2);
        assert_eq!(data["partitions"], 4);
    }

    #[tokio::test]
    async fn test_unknown_probe() {
        let ctx = AppContext::default_simulated();
        let r = run_probe("clipboard", &ctx).await;
        assert_eq!(r.status, Status::Error);
        assert_eq!(r.error.unwrap().code, ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_unsupported_area_is_skipped() {
        let ctx = AppContext::new(
            EngineConfig::default(),
            Arc::new(Unsupported::new("device")),
            Arc::new(Unsupported::new("storage")),
            Arc::new(Unsupported::new("recycle bin")),
            Arc::new(SysinfoProcesses::new(Duration::from_millis(10))),
            Arc::new(Unsupported::new("account")),
            Arc::new(SysinfoSystem::new("powershell")),
        );
        let r = run_probe("devices", &ctx).await;
        assert_eq!(r.status, Status::Skip);
        assert_eq!(r.error.unwrap().code, ErrorCode::Unsupported);
    }
}
