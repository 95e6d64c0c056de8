//! Per-command guards around the capability traits.
//!
//! Handlers validate arguments, re-check that the target still exists and
//! take the single-flight lock before any OS mutation. They return
//! [`CommandError`] so the dispatcher can map every failure to one code.

use crate::commands::{CommandError, FormatArgs};
use crate::context::AppContext;
use crate::locks::{volume_key, RECYCLE_BIN_KEY};
use crate::model::*;
use crate::validate;

pub async fn list_devices(ctx: &AppContext) -> Result<Vec<Device>, CommandError> {
    Ok(ctx.devices().list().await?)
}

/// Enable or disable a device node. Already in the requested state is a
/// successful no-op.
pub async fn set_device_enabled(
    ctx: &AppContext,
    instance_id: &str,
    enabled: bool,
) -> Result<(), CommandError> {
    let instance_id = instance_id.trim();
    if instance_id.is_empty() {
        return Err(CommandError::Validation("instance id must not be empty".into()));
    }
    let device = ctx
        .devices()
        .find(instance_id)
        .await?
        .ok_or_else(|| CommandError::NotFound(format!("device {}", instance_id)))?;

    let already = if enabled {
        device.status.is_ok()
    } else {
        device.status.is_disabled()
    };
    if already {
        tracing::info!(device = %device.instance_id, enabled, "device already in requested state");
        return Ok(());
    }
    ctx.devices().set_enabled(&device.instance_id, enabled).await?;
    tracing::info!(device = %device.instance_id, enabled, "device state changed");
    Ok(())
}

pub async fn list_disks(ctx: &AppContext) -> Result<Vec<Disk>, CommandError> {
    Ok(ctx.storage().list_disks().await?)
}

pub async fn disk_partitions(ctx: &AppContext, disk_number: u32) -> Result<Vec<Partition>, CommandError> {
    Ok(ctx.storage().partitions(disk_number).await?)
}

fn drive_letter(raw: &str) -> Result<char, CommandError> {
    parse_drive_letter(raw).map_err(|e| CommandError::Validation(e.to_string()))
}

async fn resolve_volume(ctx: &AppContext, letter: char) -> Result<Volume, CommandError> {
    ctx.storage()
        .volume(letter)
        .await?
        .ok_or_else(|| CommandError::NotFound(format!("no volume mounted at {}:", letter)))
}

pub async fn optimize_volume(ctx: &AppContext, raw_letter: &str) -> Result<(), CommandError> {
    let letter = drive_letter(raw_letter)?;
    resolve_volume(ctx, letter).await?;
    let _guard = ctx.locks().try_acquire(volume_key(letter))?;
    ctx.storage().optimize(letter).await?;
    tracing::info!(volume = %letter, "volume optimized");
    Ok(())
}

/// Erase a volume. Every check runs before the OS is touched.
pub async fn format_disk(ctx: &AppContext, args: &FormatArgs) -> Result<(), CommandError> {
    let fs: FileSystem = args
        .file_system
        .parse()
        .map_err(|e: UnknownFileSystem| CommandError::Validation(e.to_string()))?;
    let letter = drive_letter(&args.drive_letter)?;
    if ctx.config.safety.require_format_confirmation && !args.confirm {
        return Err(CommandError::Validation(format!(
            "formatting {}: erases all data; resend with \"confirm\": true",
            letter
        )));
    }
    let volume = resolve_volume(ctx, letter).await?;
    if volume.is_system {
        return Err(CommandError::PermissionDenied(format!(
            "{}: hosts the running system and cannot be formatted",
            letter
        )));
    }
    let _guard = ctx.locks().try_acquire(volume_key(letter))?;

    tracing::warn!(volume = %letter, file_system = %fs, "formatting volume");
    ctx.storage().format(letter, fs).await?;
    tracing::info!(volume = %letter, file_system = %fs, "volume formatted");
    Ok(())
}

pub async fn analyze_recycle_bin(ctx: &AppContext) -> Result<u64, CommandError> {
    Ok(ctx.recycle_bin().size().await?)
}

pub async fn clear_recycle_bin(ctx: &AppContext) -> Result<(), CommandError> {
    let _guard = ctx.locks().try_acquire(RECYCLE_BIN_KEY)?;
    ctx.recycle_bin().clear().await?;
    tracing::info!("recycle bin emptied");
    Ok(())
}

pub async fn list_processes(ctx: &AppContext) -> Result<Vec<Process>, CommandError> {
    Ok(ctx.processes().list().await?)
}

/// `Ok(false)` means the OS refused; a missing pid is an error.
pub async fn terminate_process(ctx: &AppContext, pid: u32) -> Result<bool, CommandError> {
    let killed = ctx.processes().terminate(pid).await?;
    if killed {
        tracing::info!(pid, "process terminated");
    } else {
        tracing::warn!(pid, "termination refused by the OS");
    }
    Ok(killed)
}

pub async fn list_local_users(ctx: &AppContext) -> Result<Vec<LocalUser>, CommandError> {
    Ok(ctx.accounts().list_users().await?)
}

pub async fn list_local_groups(ctx: &AppContext) -> Result<Vec<LocalGroup>, CommandError> {
    Ok(ctx.accounts().list_groups().await?)
}

pub async fn add_local_user(ctx: &AppContext, user: &NewUser) -> Result<(), CommandError> {
    let name = validate::user_name(&user.user_name).map_err(CommandError::Validation)?;
    validate::password(&user.password, &ctx.config.accounts).map_err(CommandError::Validation)?;
    if ctx.accounts().find_user(name).await?.is_some() {
        return Err(CommandError::AlreadyExists(format!("user {}", name)));
    }

    let user = NewUser {
        user_name: name.to_string(),
        ..user.clone()
    };
    ctx.accounts().create_user(&user).await?;
    tracing::info!(user = %user.user_name, "local user created");
    Ok(())
}

pub async fn delete_local_user(ctx: &AppContext, raw_name: &str) -> Result<(), CommandError> {
    let name = validate::user_name(raw_name).map_err(CommandError::Validation)?;
    if validate::is_protected_account(name, &ctx.config.accounts) {
        return Err(CommandError::PermissionDenied(format!(
            "{} is a built-in account and cannot be deleted",
            name
        )));
    }
    let existing = ctx
        .accounts()
        .find_user(name)
        .await?
        .ok_or_else(|| CommandError::NotFound(format!("user {}", name)))?;
    ctx.accounts().delete_user(&existing.name).await?;
    tracing::info!(user = %existing.name, "local user deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::platform::simulated::SimulatedPlatform;
    use crate::types::ErrorCode;
    use std::sync::Arc;

    fn format_args(letter: &str, fs: &str, confirm: bool) -> FormatArgs {
        FormatArgs {
            drive_letter: letter.into(),
            file_system: fs.into(),
            confirm,
        }
    }

    #[tokio::test]
    async fn test_device_toggle_is_idempotent() {
        let ctx = AppContext::default_simulated();
        let id = "BTH\\MS_BTHPAN\\7&3";
        set_device_enabled(&ctx, id, false).await.unwrap();
        set_device_enabled(&ctx, id, true).await.unwrap();
        set_device_enabled(&ctx, id, true).await.unwrap();
        let dev = ctx.devices().find(id).await.unwrap().unwrap();
        assert_eq!(dev.status, DeviceStatus::Ok);
    }

    #[tokio::test]
    async fn test_device_errors() {
        let ctx = AppContext::default_simulated();
        let err = set_device_enabled(&ctx, "  ", true).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidInput);
        let err = set_device_enabled(&ctx, "PCI\\NOPE", true).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_format_check_order() {
        let ctx = AppContext::default_simulated();
        let err = format_disk(&ctx, &format_args("E:", "REFS", true)).await.unwrap_err();
        assert!(err.to_string().contains("unsupported file system"));
        let err = format_disk(&ctx, &format_args("EE", "NTFS", true)).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidInput);
        let err = format_disk(&ctx, &format_args("E:", "NTFS", false)).await.unwrap_err();
        assert!(err.to_string().contains("confirm"));
        let err = format_disk(&ctx, &format_args("Z:", "NTFS", true)).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::NotFound);
        let err = format_disk(&ctx, &format_args("C:", "NTFS", true)).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::PermissionDenied);
        format_disk(&ctx, &format_args("e", "exfat", true)).await.unwrap();
    }

    #[tokio::test]
    async fn test_format_without_confirmation_when_disabled() {
        let mut config = EngineConfig::default();
        config.safety.require_format_confirmation = false;
        let ctx = AppContext::simulated(config, Arc::new(SimulatedPlatform::seeded()));
        format_disk(&ctx, &format_args("E:", "FAT32", false)).await.unwrap();
    }

    #[tokio::test]
    async fn test_format_busy_while_locked() {
        let ctx = AppContext::default_simulated();
        let _held = ctx.locks().try_acquire(volume_key('E')).unwrap();
        let err = format_disk(&ctx, &format_args("E:", "NTFS", true)).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Busy);
        let err = optimize_volume(&ctx, "e:").await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Busy);
    }

    #[tokio::test]
    async fn test_interrupted_format_is_partial_failure() {
        let sim = Arc::new(SimulatedPlatform::seeded().with_format_interruption());
        let ctx = AppContext::simulated(EngineConfig::default(), sim);
        let err = format_disk(&ctx, &format_args("E:", "NTFS", true)).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::PartialFailure);
        assert!(!ctx.locks().is_held(&volume_key('E')));
    }

    #[tokio::test]
    async fn test_add_user_validation() {
        let ctx = AppContext::default_simulated();
        let weak = NewUser {
            user_name: "bob".into(),
            password: "password".into(),
            full_name: None,
            description: None,
        };
        let err = add_local_user(&ctx, &weak).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidInput);
        assert!(!err.to_string().contains("password\""));

        let dup = NewUser {
            user_name: "OPERATOR".into(),
            password: "Pwd!2345".into(),
            full_name: None,
            description: None,
        };
        let err = add_local_user(&ctx, &dup).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::AlreadyExists);
    }

    #[tokio::test]
    async fn test_protected_account_cannot_be_deleted() {
        let ctx = AppContext::default_simulated();
        let err = delete_local_user(&ctx, "administrator").await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::PermissionDenied);
        assert!(ctx.accounts().find_user("Administrator").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unprivileged_caller_gets_permission_error() {
        let sim = Arc::new(SimulatedPlatform::seeded().unprivileged());
        let ctx = AppContext::simulated(EngineConfig::default(), sim);
        let err = optimize_volume(&ctx, "C:").await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::PermissionDenied);
        assert!(!ctx.locks().is_held(&volume_key('C')));
    }
}
