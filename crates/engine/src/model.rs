//! OS-derived records returned by the enumerators, plus the typed inputs
//! the mutators accept.
//!
//! Every record is a snapshot: the backend owns the OS state, callers only
//! ever receive copies and request changes through commands.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub instance_id: String,
    pub name: String,
    pub class: String,
    pub manufacturer: String,
    pub status: DeviceStatus,
}

/// Device node status.
///
/// Serialises as the exact strings the UI keys on: `"OK"` for an active
/// device, `"Disabled"` for a disabled one, anything else verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeviceStatus {
    Ok,
    Disabled,
    Other(String),
}

impl DeviceStatus {
    pub fn is_disabled(&self) -> bool {
        matches!(self, DeviceStatus::Disabled)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, DeviceStatus::Ok)
    }
}

impl From<String> for DeviceStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "OK" => DeviceStatus::Ok,
            "Disabled" => DeviceStatus::Disabled,
            _ => DeviceStatus::Other(s),
        }
    }
}

impl From<DeviceStatus> for String {
    fn from(s: DeviceStatus) -> Self {
        match s {
            DeviceStatus::Ok => "OK".to_string(),
            DeviceStatus::Disabled => "Disabled".to_string(),
            DeviceStatus::Other(other) => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disk {
    pub disk_number: u32,
    pub name: String,
    /// `"C:"` form; `None` when the disk carries no lettered volume or the
    /// volume lookup failed.
    pub mount_point: Option<String>,
    pub total_space: u64,
    pub available_space: u64,
    pub file_system: Option<String>,
    pub is_removable: bool,
}

impl Disk {
    /// Build a disk record, clamping available space to the total.
    pub fn new(
        disk_number: u32,
        name: impl Into<String>,
        mount_point: Option<String>,
        total_space: u64,
        available_space: u64,
        file_system: Option<String>,
        is_removable: bool,
    ) -> Self {
        Self {
            disk_number,
            name: name.into(),
            mount_point,
            total_space,
            available_space: available_space.min(total_space),
            file_system,
            is_removable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub number: u32,
    pub drive_letter: Option<char>,
    pub size: u64,
    pub partition_type: String,
}

/// A lettered volume, used to resolve and guard the volume mutators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub letter: char,
    pub file_system: Option<String>,
    pub size: u64,
    pub size_remaining: u64,
    /// Hosts the running operating system; never formatted.
    pub is_system: bool,
}

/// File systems `format_disk` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileSystem {
    Ntfs,
    Fat32,
    ExFat,
}

impl FileSystem {
    pub const ALL: [FileSystem; 3] = [FileSystem::Ntfs, FileSystem::Fat32, FileSystem::ExFat];

    /// Name as the OS format tooling expects it.
    pub fn as_str(self) -> &'static str {
        match self {
            FileSystem::Ntfs => "NTFS",
            FileSystem::Fat32 => "FAT32",
            FileSystem::ExFat => "exFAT",
        }
    }
}

impl fmt::Display for FileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported file system '{0}' (expected NTFS, FAT32 or EXFAT)")]
pub struct UnknownFileSystem(pub String);

impl FromStr for FileSystem {
    type Err = UnknownFileSystem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NTFS" => Ok(FileSystem::Ntfs),
            "FAT32" => Ok(FileSystem::Fat32),
            "EXFAT" => Ok(FileSystem::ExFat),
            _ => Err(UnknownFileSystem(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid drive letter '{0}'")]
pub struct InvalidDriveLetter(pub String);

/// Normalise `"c"`, `"C:"` or `"C:\"` to `'C'`.
pub fn parse_drive_letter(raw: &str) -> Result<char, InvalidDriveLetter> {
    let trimmed = raw.trim();
    let rest = trimmed
        .strip_suffix('\\')
        .or_else(|| trimmed.strip_suffix('/'))
        .unwrap_or(trimmed);
    let rest = rest.strip_suffix(':').unwrap_or(rest);
    let mut chars = rest.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Ok(c.to_ascii_uppercase()),
        _ => Err(InvalidDriveLetter(raw.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Processes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub pid: u32,
    pub name: String,
    pub cpu_usage: f32,
    /// Resident memory in bytes.
    pub memory: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemUsage {
    pub cpu_usage_percent: f32,
    pub ram_used_mb: f64,
    pub ram_total_mb: f64,
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalUser {
    pub name: String,
    pub full_name: String,
    pub description: String,
    pub enabled: bool,
    pub sid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalGroup {
    pub name: String,
    pub description: String,
    pub sid: String,
}

/// Input for account creation.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(alias = "user_name")]
    pub user_name: String,
    pub password: String,
    #[serde(default, alias = "full_name")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .field("full_name", &self.full_name)
            .field("description", &self.description)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_status_strings() {
        let disabled: DeviceStatus = serde_json::from_str("\"Disabled\"").unwrap();
        assert!(disabled.is_disabled());
        let ok: DeviceStatus = serde_json::from_str("\"OK\"").unwrap();
        assert!(ok.is_ok());
        let degraded: DeviceStatus = serde_json::from_str("\"Degraded\"").unwrap();
        assert_eq!(degraded, DeviceStatus::Other("Degraded".into()));
        assert_eq!(serde_json::to_string(&DeviceStatus::Ok).unwrap(), "\"OK\"");
        assert_eq!(
            serde_json::to_string(&DeviceStatus::Disabled).unwrap(),
            "\"Disabled\""
        );
    }

    #[test]
    fn test_disk_available_clamped() {
        let d = Disk::new(0, "disk", None, 100, 250, None, false);
        assert_eq!(d.available_space, 100);
    }

    #[test]
    fn test_parse_file_system() {
        assert_eq!("ntfs".parse::<FileSystem>().unwrap(), FileSystem::Ntfs);
        assert_eq!("FAT32".parse::<FileSystem>().unwrap(), FileSystem::Fat32);
        assert_eq!("exFAT".parse::<FileSystem>().unwrap(), FileSystem::ExFat);
        assert!("REFS".parse::<FileSystem>().is_err());
        assert!("".parse::<FileSystem>().is_err());
    }

    #[test]
    fn test_parse_drive_letter() {
        assert_eq!(parse_drive_letter("C").unwrap(), 'C');
        assert_eq!(parse_drive_letter("d:").unwrap(), 'D');
        assert_eq!(parse_drive_letter("E:\\").unwrap(), 'E');
        assert!(parse_drive_letter("").is_err());
        assert!(parse_drive_letter("CD:").is_err());
        assert!(parse_drive_letter("1:").is_err());
    }

    #[test]
    fn test_new_user_debug_hides_password() {
        let u: NewUser = serde_json::from_value(serde_json::json!({
            "userName": "alice",
            "password": "Pwd!2345",
        }))
        .unwrap();
        let dbg = format!("{:?}", u);
        assert!(dbg.contains("alice"));
        assert!(!dbg.contains("Pwd!2345"));
    }
}
