//! Process and host usage backends over `sysinfo` (all platforms).

use crate::model::{Process, SystemUsage};
use crate::traits::*;
use std::time::Duration;
use sysinfo::{Pid, System};

pub struct SysinfoProcesses {
    /// Gap between the two refreshes CPU usage is computed from.
    sample: Duration,
}

impl SysinfoProcesses {
    pub fn new(sample: Duration) -> Self {
        Self { sample }
    }
}

fn join_error(e: tokio::task::JoinError) -> CapError {
    CapError::Other(format!("process query task failed: {}", e))
}

#[async_trait::async_trait]
impl ProcessOps for SysinfoProcesses {
    async fn list(&self) -> CapResult<Vec<Process>> {
        let sample = self.sample;
        tokio::task::spawn_blocking(move || -> Vec<Process> {
            let mut sys = System::new();
            sys.refresh_processes();
            std::thread::sleep(sample);
            sys.refresh_processes();
            sys.processes()
                .iter()
                .map(|(pid, p)| Process {
                    pid: pid.as_u32(),
                    name: p.name().to_string(),
                    cpu_usage: p.cpu_usage(),
                    memory: p.memory(),
                })
                .collect()
        })
        .await
        .map_err(join_error)
    }

    async fn terminate(&self, pid: u32) -> CapResult<bool> {
        tokio::task::spawn_blocking(move || -> CapResult<bool> {
            let mut sys = System::new();
            let target = Pid::from_u32(pid);
            // Re-validate: the pid may have been reused or gone since listing.
            if !sys.refresh_process(target) {
                return Err(CapError::NotFound(format!("no process with pid {}", pid)));
            }
            let killed = match sys.process(target) {
                Some(p) => p.kill(),
                None => return Err(CapError::NotFound(format!("no process with pid {}", pid))),
            };
            // A refused kill may just mean the process exited on its own.
            let alive = killed || sys.refresh_process(target);
            kill_outcome(pid, killed, alive)
        })
        .await
        .map_err(join_error)?
    }
}

/// `Ok(false)` only for a live process the OS refused to kill.
fn kill_outcome(pid: u32, killed: bool, alive: bool) -> CapResult<bool> {
    match (killed, alive) {
        (true, _) => Ok(true),
        (false, true) => Ok(false),
        (false, false) => Err(CapError::NotFound(format!("process {} exited before it could be terminated", pid))),
    }
}

pub struct SysinfoSystem {
    shell_program: String,
}

impl SysinfoSystem {
    pub fn new(shell_program: impl Into<String>) -> Self {
        Self {
            shell_program: shell_program.into(),
        }
    }
}

#[async_trait::async_trait]
impl SystemOps for SysinfoSystem {
    async fn usage(&self) -> CapResult<SystemUsage> {
        tokio::task::spawn_blocking(|| {
            let mut sys = System::new();
            sys.refresh_cpu();
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            sys.refresh_cpu();
            sys.refresh_memory();
            let mb = |bytes: u64| bytes as f64 / (1024.0 * 1024.0);
            SystemUsage {
                cpu_usage_percent: sys.global_cpu_info().cpu_usage(),
                ram_used_mb: mb(sys.used_memory()),
                ram_total_mb: mb(sys.total_memory()),
            }
        })
        .await
        .map_err(join_error)
    }

    async fn is_elevated(&self) -> bool {
        let program = self.shell_program.clone();
        tokio::task::spawn_blocking(move || crate::doctor::is_elevated(&program))
            .await
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_contains_self() {
        let procs = SysinfoProcesses::new(Duration::from_millis(10));
        let list = procs.list().await.expect("process listing");
        let me = std::process::id();
        assert!(list.iter().any(|p| p.pid == me));
    }

    #[tokio::test]
    async fn test_terminate_missing_pid_is_error() {
        let procs = SysinfoProcesses::new(Duration::from_millis(10));
        // Above the default pid_max on Linux and unused on Windows/macOS.
        let r = procs.terminate(u32::MAX - 7).await;
        assert!(matches!(r, Err(CapError::NotFound(_))));
    }

    #[test]
    fn test_kill_outcome() {
        assert!(kill_outcome(10, true, true).unwrap());
        assert!(!kill_outcome(10, false, true).unwrap());
        assert!(matches!(kill_outcome(10, false, false), Err(CapError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_usage_reports_memory() {
        let sys = SysinfoSystem::new("powershell");
        let u = sys.usage().await.unwrap();
        assert!(u.ram_total_mb > 0.0);
        assert!(u.ram_used_mb <= u.ram_total_mb);
    }
}
