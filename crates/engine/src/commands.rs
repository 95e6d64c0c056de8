//! Command surface and dispatcher.
//!
//! A command name plus JSON args is parsed once into the closed
//! [`Command`] enum; everything after that is typed. Results come back
//! either as a full [`CommandResult`] envelope ([`CommandRegistry::execute`])
//! or flattened to `Result<Value, String>` for UI bridges
//! ([`CommandRegistry::invoke`]).

use crate::context::AppContext;
use crate::handlers;
use crate::locks::Busy;
use crate::model::NewUser;
use crate::traits::CapError;
use crate::types::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::Instrument;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("busy: {0}")]
    Busy(String),
    #[error("partial failure: {0}")]
    Incomplete(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("dependency missing: {0}")]
    DependencyMissing(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("os failure: {0}")]
    OsFailure(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CommandError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CommandError::Validation(_) => ErrorCode::InvalidInput,
            CommandError::NotFound(_) => ErrorCode::NotFound,
            CommandError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            CommandError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            CommandError::Busy(_) => ErrorCode::Busy,
            CommandError::Incomplete(_) => ErrorCode::PartialFailure,
            CommandError::Unsupported(_) => ErrorCode::Unsupported,
            CommandError::DependencyMissing(_) => ErrorCode::DependencyMissing,
            CommandError::Timeout(_) => ErrorCode::Timeout,
            CommandError::Io(_) => ErrorCode::IoError,
            CommandError::OsFailure(_) => ErrorCode::OsFailure,
            CommandError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl From<CapError> for CommandError {
    fn from(e: CapError) -> Self {
        match e {
            CapError::Unsupported(m) => CommandError::Unsupported(m),
            CapError::DependencyMissing(m) => CommandError::DependencyMissing(m),
            CapError::PermissionDenied(m) => CommandError::PermissionDenied(m),
            CapError::NotFound(m) => CommandError::NotFound(m),
            CapError::AlreadyExists(m) => CommandError::AlreadyExists(m),
            CapError::InvalidInput(m) => CommandError::Validation(m),
            CapError::Incomplete(m) => CommandError::Incomplete(m),
            CapError::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
                CommandError::PermissionDenied(io.to_string())
            }
            CapError::Io(io) => CommandError::Io(io),
            CapError::Timeout(secs) => {
                CommandError::Timeout(format!("OS query did not finish within {}s", secs))
            }
            CapError::Other(m) => CommandError::OsFailure(m),
        }
    }
}

impl From<Busy> for CommandError {
    fn from(b: Busy) -> Self {
        CommandError::Busy(b.to_string())
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------
//
// Keys are accepted in camelCase (as sent by the desktop UI) or snake_case.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceArgs {
    #[serde(alias = "instance_id")]
    pub instance_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskArgs {
    #[serde(alias = "disk_number")]
    pub disk_number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeArgs {
    #[serde(alias = "drive_letter")]
    pub drive_letter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatArgs {
    #[serde(alias = "drive_letter")]
    pub drive_letter: String,
    #[serde(alias = "file_system")]
    pub file_system: String,
    /// Explicit acknowledgement that the volume will be erased.
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidArgs {
    pub pid: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserArgs {
    #[serde(alias = "user_name")]
    pub user_name: String,
}

// ---------------------------------------------------------------------------
// Command enum
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Command {
    Ping,
    ListDevices,
    EnableDevice(DeviceArgs),
    DisableDevice(DeviceArgs),
    ListDisks,
    GetDiskPartitions(DiskArgs),
    AnalyzeRecycleBin,
    ClearRecycleBin,
    OptimizeVolume(VolumeArgs),
    FormatDisk(FormatArgs),
    ListProcesses,
    TerminateProcess(PidArgs),
    ListLocalUsers,
    AddLocalUser(NewUser),
    DeleteLocalUser(UserArgs),
    ListLocalGroups,
    IsElevated,
    GetSystemUsage,
}

fn parse_args<T: DeserializeOwned>(name: &str, args: Value) -> Result<T, CommandError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args)
        .map_err(|e| CommandError::Validation(format!("bad arguments for {}: {}", name, e)))
}

impl Command {
    pub const NAMES: [&'static str; 18] = [
        "ping",
        "list_devices",
        "enable_device",
        "disable_device",
        "list_disks",
        "get_disk_partitions",
        "analyze_recycle_bin",
        "clear_recycle_bin",
        "optimize_volume",
        "format_disk",
        "list_processes",
        "terminate_process",
        "list_local_users",
        "add_local_user",
        "delete_local_user",
        "list_local_groups",
        "is_elevated",
        "get_system_usage",
    ];

    /// The only place a command name is matched.
    pub fn parse(name: &str, args: Value) -> Result<Command, CommandError> {
        let cmd = match name {
            "ping" => Command::Ping,
            "list_devices" => Command::ListDevices,
            "enable_device" => Command::EnableDevice(parse_args(name, args)?),
            "disable_device" => Command::DisableDevice(parse_args(name, args)?),
            "list_disks" => Command::ListDisks,
            "get_disk_partitions" => Command::GetDiskPartitions(parse_args(name, args)?),
            "analyze_recycle_bin" => Command::AnalyzeRecycleBin,
            "clear_recycle_bin" => Command::ClearRecycleBin,
            "optimize_volume" => Command::OptimizeVolume(parse_args(name, args)?),
            "format_disk" => Command::FormatDisk(parse_args(name, args)?),
            "list_processes" => Command::ListProcesses,
            "terminate_process" => Command::TerminateProcess(parse_args(name, args)?),
            "list_local_users" => Command::ListLocalUsers,
            "add_local_user" => Command::AddLocalUser(parse_args(name, args)?),
            "delete_local_user" => Command::DeleteLocalUser(parse_args(name, args)?),
            "list_local_groups" => Command::ListLocalGroups,
            "is_elevated" => Command::IsElevated,
            "get_system_usage" => Command::GetSystemUsage,
            other => {
                return Err(CommandError::Validation(format!("unknown command: {}", other)));
            }
        };
        Ok(cmd)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::ListDevices => "list_devices",
            Command::EnableDevice(_) => "enable_device",
            Command::DisableDevice(_) => "disable_device",
            Command::ListDisks => "list_disks",
            Command::GetDiskPartitions(_) => "get_disk_partitions",
            Command::AnalyzeRecycleBin => "analyze_recycle_bin",
            Command::ClearRecycleBin => "clear_recycle_bin",
            Command::OptimizeVolume(_) => "optimize_volume",
            Command::FormatDisk(_) => "format_disk",
            Command::ListProcesses => "list_processes",
            Command::TerminateProcess(_) => "terminate_process",
            Command::ListLocalUsers => "list_local_users",
            Command::AddLocalUser(_) => "add_local_user",
            Command::DeleteLocalUser(_) => "delete_local_user",
            Command::ListLocalGroups => "list_local_groups",
            Command::IsElevated => "is_elevated",
            Command::GetSystemUsage => "get_system_usage",
        }
    }

    /// List command whose output a mutation invalidates. The backend sends
    /// no change notifications, so callers re-run it after the mutation.
    pub fn refresh_with(&self) -> Option<&'static str> {
        match self {
            Command::EnableDevice(_) | Command::DisableDevice(_) => Some("list_devices"),
            Command::OptimizeVolume(_) | Command::FormatDisk(_) => Some("list_disks"),
            Command::ClearRecycleBin => Some("analyze_recycle_bin"),
            Command::TerminateProcess(_) => Some("list_processes"),
            Command::AddLocalUser(_) | Command::DeleteLocalUser(_) => Some("list_local_users"),
            _ => None,
        }
    }
}

fn to_json<T: Serialize>(value: T) -> Result<Value, CommandError> {
    serde_json::to_value(value).map_err(|e| CommandError::Internal(format!("serialize: {}", e)))
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Entry point for every command invocation.
#[derive(Debug, Default)]
pub struct CommandRegistry;

impl CommandRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn list(&self) -> Vec<&'static str> {
        let mut names = Command::NAMES.to_vec();
        names.sort();
        names
    }

    /// Execute a command by name and return a full CommandResult.
    pub async fn execute(&self, name: &str, args: Value, ctx: &AppContext) -> CommandResult {
        let run_id = new_run_id();
        let start = Instant::now();

        let command = match Command::parse(name, args) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(command = name, %run_id, error = %e, "rejected command");
                return result_err(
                    "call",
                    name,
                    &run_id,
                    start.elapsed().as_millis() as u64,
                    e.error_code(),
                    e.to_string(),
                );
            }
        };

        let refresh = command.refresh_with();
        let span = tracing::info_span!("command", name, run_id = %run_id);
        let outcome = self.dispatch(command, ctx).instrument(span).await;
        let elapsed = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(data) => {
                tracing::info!(command = name, %run_id, elapsed_ms = elapsed, "command succeeded");
                let mut r = result_ok("call", name, &run_id, elapsed);
                r.data = Some(data);
                r.refresh = refresh.map(String::from);
                r
            }
            Err(e) => {
                tracing::warn!(command = name, %run_id, elapsed_ms = elapsed, code = %e.error_code(), error = %e, "command failed");
                let mut r = result_err("call", name, &run_id, elapsed, e.error_code(), e.to_string());
                // A failed mutation may still have changed state.
                if matches!(e, CommandError::Incomplete(_)) {
                    r.refresh = refresh.map(String::from);
                }
                r
            }
        }
    }

    /// Flat boundary for UI bridges: the payload, or the self-descriptive
    /// error message.
    pub async fn invoke(&self, name: &str, args: Value, ctx: &AppContext) -> Result<Value, String> {
        let run_id = new_run_id();
        let start = Instant::now();
        let command = Command::parse(name, args).map_err(|e| {
            tracing::warn!(command = name, %run_id, error = %e, "rejected command");
            e.to_string()
        })?;
        let span = tracing::info_span!("invoke", name, run_id = %run_id);
        let outcome = self.dispatch(command, ctx).instrument(span).await;
        let elapsed = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(data) => {
                tracing::info!(command = name, %run_id, elapsed_ms = elapsed, "command succeeded");
                Ok(data)
            }
            Err(e) => {
                tracing::warn!(command = name, %run_id, elapsed_ms = elapsed, code = %e.error_code(), error = %e, "command failed");
                Err(e.to_string())
            }
        }
    }

    /// Run an already parsed command.
    pub async fn dispatch(&self, command: Command, ctx: &AppContext) -> Result<Value, CommandError> {
        tracing::debug!(command = command.name(), "dispatching");
        match command {
            Command::Ping => Ok(serde_json::json!({ "pong": true })),
            Command::ListDevices => to_json(handlers::list_devices(ctx).await?),
            Command::EnableDevice(a) => {
                to_json(handlers::set_device_enabled(ctx, &a.instance_id, true).await?)
            }
            Command::DisableDevice(a) => {
                to_json(handlers::set_device_enabled(ctx, &a.instance_id, false).await?)
            }
            Command::ListDisks => to_json(handlers::list_disks(ctx).await?),
            Command::GetDiskPartitions(a) => {
                to_json(handlers::disk_partitions(ctx, a.disk_number).await?)
            }
            Command::AnalyzeRecycleBin => to_json(handlers::analyze_recycle_bin(ctx).await?),
            Command::ClearRecycleBin => to_json(handlers::clear_recycle_bin(ctx).await?),
            Command::OptimizeVolume(a) => {
                to_json(handlers::optimize_volume(ctx, &a.drive_letter).await?)
            }
            Command::FormatDisk(a) => to_json(handlers::format_disk(ctx, &a).await?),
            Command::ListProcesses => to_json(handlers::list_processes(ctx).await?),
            Command::TerminateProcess(a) => to_json(handlers::terminate_process(ctx, a.pid).await?),
            Command::ListLocalUsers => to_json(handlers::list_local_users(ctx).await?),
            Command::AddLocalUser(u) => to_json(handlers::add_local_user(ctx, &u).await?),
            Command::DeleteLocalUser(a) => {
                to_json(handlers::delete_local_user(ctx, &a.user_name).await?)
            }
            Command::ListLocalGroups => to_json(handlers::list_local_groups(ctx).await?),
            Command::IsElevated => to_json(ctx.system().is_elevated().await),
            Command::GetSystemUsage => to_json(ctx.system().usage().await?),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AppContext;
    use serde_json::json;

    #[tokio::test]
    async fn test_ping_command() {
        let ctx = AppContext::default_simulated();
        let reg = CommandRegistry::new();
        let result = reg.execute("ping", json!({}), &ctx).await;
        assert_eq!(result.status, Status::Pass);
        assert_eq!(result.data.unwrap()["pong"], true);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let ctx = AppContext::default_simulated();
        let reg = CommandRegistry::new();
        let result = reg.execute("nonexistent", json!({}), &ctx).await;
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.error.unwrap().code, ErrorCode::InvalidInput);
    }

    #[test]
    fn test_list_commands() {
        let reg = CommandRegistry::new();
        let names = reg.list();
        assert_eq!(names.len(), Command::NAMES.len());
        assert!(names.contains(&"format_disk"));
        assert!(names.contains(&"list_local_groups"));
    }

    #[test]
    fn test_every_name_parses_back() {
        let args = json!({
            "instanceId": "X", "diskNumber": 0, "driveLetter": "C:",
            "fileSystem": "NTFS", "pid": 1, "userName": "bob", "password": "p"
        });
        for name in Command::NAMES {
            let cmd = Command::parse(name, args.clone()).expect(name);
            assert_eq!(cmd.name(), name);
        }
    }

    #[test]
    fn test_args_accept_both_casings() {
        let camel = Command::parse("get_disk_partitions", json!({ "diskNumber": 2 })).unwrap();
        let snake = Command::parse("get_disk_partitions", json!({ "disk_number": 2 })).unwrap();
        for c in [camel, snake] {
            match c {
                Command::GetDiskPartitions(a) => assert_eq!(a.disk_number, 2),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_missing_args_is_validation_error() {
        let err = Command::parse("enable_device", Value::Null).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidInput);
        let err = Command::parse("terminate_process", json!({ "pid": "abc" })).unwrap_err();
        assert!(err.to_string().starts_with("invalid input: bad arguments for terminate_process"));
    }

    #[test]
    fn test_refresh_hints() {
        let fmt = Command::parse(
            "format_disk",
            json!({ "driveLetter": "E:", "fileSystem": "NTFS" }),
        )
        .unwrap();
        assert_eq!(fmt.refresh_with(), Some("list_disks"));
        assert_eq!(Command::ClearRecycleBin.refresh_with(), Some("analyze_recycle_bin"));
        assert_eq!(Command::ListDevices.refresh_with(), None);
    }

    #[test]
    fn test_cap_error_mapping() {
        let e: CommandError = CapError::Other("boom".into()).into();
        assert_eq!(e.error_code(), ErrorCode::OsFailure);
        let e: CommandError = CapError::Timeout(60).into();
        assert_eq!(e.error_code(), ErrorCode::Timeout);
        let e: CommandError =
            CapError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied)).into();
        assert_eq!(e.error_code(), ErrorCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_invoke_flattens_errors() {
        let ctx = AppContext::default_simulated();
        let reg = CommandRegistry::new();
        let err = reg
            .invoke("get_disk_partitions", json!({ "diskNumber": 42 }), &ctx)
            .await
            .unwrap_err();
        assert!(err.starts_with("not found:"), "{}", err);
        let ok = reg.invoke("analyze_recycle_bin", Value::Null, &ctx).await.unwrap();
        assert_eq!(ok, json!(1024 + 4096 + 1_048_576));
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_invoke_logs_every_outcome() {
        let captured = Captured::default();
        let sink = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let ctx = AppContext::default_simulated();
        let reg = CommandRegistry::new();
        reg.invoke("list_disks", Value::Null, &ctx).await.unwrap();
        reg.invoke("get_disk_partitions", json!({ "diskNumber": 42 }), &ctx)
            .await
            .unwrap_err();

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let succeeded = logs.lines().find(|l| l.contains("command succeeded")).unwrap();
        assert!(succeeded.contains("list_disks"));
        assert!(succeeded.contains("run_id="));
        assert!(succeeded.contains("elapsed_ms="));
        let failed = logs.lines().find(|l| l.contains("command failed")).unwrap();
        assert!(failed.contains("get_disk_partitions"));
        assert!(failed.contains("run_id="));
        assert!(failed.contains("code=NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_mutation_result_carries_refresh() {
        let ctx = AppContext::default_simulated();
        let reg = CommandRegistry::new();
        let r = reg.execute("terminate_process", json!({ "pid": 4321 }), &ctx).await;
        assert_eq!(r.status, Status::Pass);
        assert_eq!(r.refresh.as_deref(), Some("list_processes"));
        assert_eq!(r.data, Some(json!(true)));
    }
}
