//! Doctor – gather environment facts for diagnostics.

use crate::config::EngineConfig;
use crate::platform::trash::FreedesktopTrash;
use crate::types::*;
use std::time::Instant;

/// Run the doctor check and return a full report as a CommandResult.
pub fn run_doctor(config: &EngineConfig) -> CommandResult {
    let run_id = new_run_id();
    let start = Instant::now();

    let report = gather_report(config);

    let mut r = result_ok("doctor", "env", &run_id, start.elapsed().as_millis() as u64);
    r.data = Some(serde_json::to_value(&report).unwrap_or_default());
    r
}

fn gather_report(config: &EngineConfig) -> DoctorReport {
    let program = config.shell.program.as_str();
    let shell_version = shell_version(program);
    DoctorReport {
        os_name: os_name(),
        os_version: os_version(),
        kernel: kernel_version(),
        arch: std::env::consts::ARCH.to_string(),
        is_elevated: is_elevated(program),
        shell: shell_version.as_ref().map(|_| program.to_string()),
        shell_version,
        trash_dir: trash_dir(config),
    }
}

fn os_name() -> String {
    std::env::consts::OS.to_string()
}

fn os_version() -> String {
    #[cfg(target_os = "windows")]
    {
        run_cmd("cmd", &["/C", "ver"]).unwrap_or_else(|| "unknown".into())
    }
    #[cfg(target_os = "macos")]
    {
        run_cmd("sw_vers", &["-productVersion"]).unwrap_or_else(|| "unknown".into())
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(content) = std::fs::read_to_string("/etc/os-release") {
            for line in content.lines() {
                if let Some(ver) = line.strip_prefix("PRETTY_NAME=") {
                    return ver.trim_matches('"').to_string();
                }
            }
        }
        "unknown".to_string()
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        "unknown".to_string()
    }
}

fn kernel_version() -> String {
    sysinfo::System::kernel_version().unwrap_or_else(|| "unknown".into())
}

/// Whether this process runs with administrator (Windows) or root (Unix)
/// rights. Blocking; shells out once.
pub fn is_elevated(program: &str) -> bool {
    #[cfg(windows)]
    {
        let script = "([Security.Principal.WindowsPrincipal][Security.Principal.WindowsIdentity]::GetCurrent()).IsInRole([Security.Principal.WindowsBuiltInRole]::Administrator)";
        run_cmd(program, &["-NoProfile", "-NonInteractive", "-Command", script])
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
    #[cfg(unix)]
    {
        let _ = program;
        // `id -u` reports the effective uid.
        run_cmd("id", &["-u"])
            .and_then(|s| s.trim().parse::<u32>().ok())
            .map(|uid| uid == 0)
            .unwrap_or(false)
    }
    #[cfg(not(any(windows, unix)))]
    {
        let _ = program;
        false
    }
}

/// PowerShell version, or `None` when the configured shell cannot be run.
fn shell_version(program: &str) -> Option<String> {
    run_cmd(
        program,
        &[
            "-NoProfile",
            "-NonInteractive",
            "-Command",
            "$PSVersionTable.PSVersion.ToString()",
        ],
    )
    .filter(|v| !v.is_empty())
}

fn trash_dir(config: &EngineConfig) -> Option<String> {
    if cfg!(windows) {
        return None;
    }
    config
        .recycle_bin
        .trash_dir
        .clone()
        .or_else(FreedesktopTrash::default_location)
        .map(|p| p.display().to_string())
}

fn run_cmd(cmd: &str, args: &[&str]) -> Option<String> {
    std::process::Command::new(cmd)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
}
