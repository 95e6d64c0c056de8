//! Windows backends built on PowerShell cmdlets (PnpDevice, Storage,
//! LocalAccounts and the shell recycle bin namespace).

use super::powershell::{quote, PowerShell};
use crate::model::*;
use crate::traits::*;
use serde::Deserialize;

// ===========================================================================
// Devices – Get-PnpDevice / Enable-PnpDevice / Disable-PnpDevice
// ===========================================================================

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct PsPnpDevice {
    instance_id: String,
    friendly_name: Option<String>,
    class: Option<String>,
    manufacturer: Option<String>,
    status: Option<String>,
    config_manager_error_code: Option<u32>,
}

/// CM_PROB_DISABLED: the node was disabled. `Get-PnpDevice` reports such
/// a node with `Status = "Error"`, so the problem code decides.
const CM_PROB_DISABLED: u32 = 22;

fn pnp_status(status: Option<String>, problem: Option<u32>) -> DeviceStatus {
    if problem == Some(CM_PROB_DISABLED) {
        return DeviceStatus::Disabled;
    }
    DeviceStatus::from(status.unwrap_or_else(|| "Unknown".to_string()))
}

impl From<PsPnpDevice> for Device {
    fn from(d: PsPnpDevice) -> Self {
        Device {
            instance_id: d.instance_id,
            name: d
                .friendly_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "(Unknown)".to_string()),
            class: d.class.unwrap_or_default(),
            manufacturer: d.manufacturer.unwrap_or_default(),
            status: pnp_status(d.status, d.config_manager_error_code),
        }
    }
}

const PNP_FIELDS: &str = "Select-Object InstanceId, FriendlyName, Class, Manufacturer, Status, \
     @{n='ConfigManagerErrorCode';e={[uint32]$_.ConfigManagerErrorCode}}";

/// Wrap a `Get-PnpDevice` invocation so that only "no matching device"
/// errors are swallowed; anything else is rethrown and fails the call.
fn pnp_script(args: &str) -> String {
    format!(
        "$errs = $null; \
         $rows = @(Get-PnpDevice{} -ErrorAction SilentlyContinue -ErrorVariable errs); \
         $fatal = @($errs | Where-Object {{ $_.CategoryInfo.Category -ne 'ObjectNotFound' }}); \
         if ($fatal.Count -gt 0) {{ throw $fatal[0] }}; \
         $rows | {} | ConvertTo-Json -Compress",
        args, PNP_FIELDS
    )
}

pub struct PnpDevices {
    ps: PowerShell,
    classes: Vec<String>,
}

impl PnpDevices {
    pub fn new(ps: PowerShell, classes: Vec<String>) -> Self {
        Self { ps, classes }
    }
}

#[async_trait::async_trait]
impl DeviceOps for PnpDevices {
    async fn list(&self) -> CapResult<Vec<Device>> {
        let selector = if self.classes.is_empty() {
            String::new()
        } else {
            let classes: Vec<String> = self.classes.iter().map(|c| quote(c)).collect();
            format!(" -Class {}", classes.join(","))
        };
        let rows: Vec<PsPnpDevice> = self.ps.query_list(&pnp_script(&selector)).await?;
        Ok(rows.into_iter().map(Device::from).collect())
    }

    async fn find(&self, instance_id: &str) -> CapResult<Option<Device>> {
        let script = pnp_script(&format!(" -InstanceId {}", quote(instance_id)));
        let rows: Vec<PsPnpDevice> = self.ps.query_list(&script).await?;
        Ok(rows.into_iter().next().map(Device::from))
    }

    async fn set_enabled(&self, instance_id: &str, enabled: bool) -> CapResult<()> {
        let verb = if enabled { "Enable" } else { "Disable" };
        let script = format!(
            "{}-PnpDevice -InstanceId {} -Confirm:$false",
            verb,
            quote(instance_id)
        );
        self.ps.run(&script).await?;
        Ok(())
    }
}

// ===========================================================================
// Storage – Get-Disk / Get-Partition / Get-Volume / Optimize / Format
// ===========================================================================

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct PsDiskRow {
    number: u32,
    friendly_name: Option<String>,
    size: u64,
    is_removable: Option<bool>,
    drive_letter: Option<String>,
    file_system: Option<String>,
    size_remaining: Option<u64>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct PsPartition {
    partition_number: u32,
    drive_letter: Option<String>,
    size: u64,
    #[serde(rename = "Type")]
    partition_type: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct PsVolume {
    drive_letter: Option<String>,
    file_system: Option<String>,
    size: Option<u64>,
    size_remaining: Option<u64>,
    is_system: Option<bool>,
}

/// Volume lookups per disk are wrapped so a failing volume only nulls the
/// optional fields of its disk.
const LIST_DISKS: &str = r#"
Get-Disk | ForEach-Object {
    $d = $_
    $letter = $null
    $vol = $null
    try {
        $letter = Get-Partition -DiskNumber $d.Number -ErrorAction Stop |
            Where-Object { $_.DriveLetter -match '[A-Za-z]' } |
            Select-Object -First 1 -ExpandProperty DriveLetter
        if ($letter) { $vol = Get-Volume -DriveLetter $letter -ErrorAction Stop }
    } catch { }
    [PSCustomObject]@{
        Number = $d.Number
        FriendlyName = $d.FriendlyName
        Size = $d.Size
        IsRemovable = ($d.BusType -eq 'USB' -or $d.BusType -eq 'SD' -or $d.BusType -eq 'MMC')
        DriveLetter = if ($letter) { [string]$letter } else { $null }
        FileSystem = if ($vol) { $vol.FileSystem } else { $null }
        SizeRemaining = if ($vol) { $vol.SizeRemaining } else { $null }
    }
} | ConvertTo-Json -Compress
"#;

/// First ASCII letter of a PowerShell `[char]` rendered as a string; the
/// OS reports "no letter" as NUL.
fn letter_of(raw: Option<&str>) -> Option<char> {
    raw.and_then(|s| s.chars().find(|c| c.is_ascii_alphabetic()))
        .map(|c| c.to_ascii_uppercase())
}

/// Whether a failed format had already begun, judged from the volume
/// before and after the attempt.
fn format_started(before: Option<&Volume>, after: Option<&Volume>) -> bool {
    match (before, after) {
        (Some(b), Some(a)) => b.file_system != a.file_system || a.file_system.is_none(),
        (Some(_), None) => true,
        _ => false,
    }
}

pub struct PsStorage {
    ps: PowerShell,
}

impl PsStorage {
    pub fn new(ps: PowerShell) -> Self {
        Self { ps }
    }
}

#[async_trait::async_trait]
impl StorageOps for PsStorage {
    async fn list_disks(&self) -> CapResult<Vec<Disk>> {
        let rows: Vec<PsDiskRow> = self.ps.query_list(LIST_DISKS).await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let letter = letter_of(r.drive_letter.as_deref());
                Disk::new(
                    r.number,
                    r.friendly_name.unwrap_or_default(),
                    letter.map(|l| format!("{}:", l)),
                    r.size,
                    r.size_remaining.unwrap_or(0),
                    r.file_system.filter(|f| !f.is_empty()),
                    r.is_removable.unwrap_or(false),
                )
            })
            .collect())
    }

    async fn partitions(&self, disk_number: u32) -> CapResult<Vec<Partition>> {
        let script = format!(
            "if (-not (Get-Disk -Number {n} -ErrorAction SilentlyContinue)) {{ \
                 throw 'ObjectNotFound: disk {n} does not exist' }}; \
             @(Get-Partition -DiskNumber {n} -ErrorAction SilentlyContinue) | \
             Select-Object PartitionNumber, @{{n='DriveLetter';e={{[string]$_.DriveLetter}}}}, Size, Type | \
             ConvertTo-Json -Compress",
            n = disk_number
        );
        let rows: Vec<PsPartition> = self.ps.query_list(&script).await?;
        Ok(rows
            .into_iter()
            .map(|p| Partition {
                number: p.partition_number,
                drive_letter: letter_of(p.drive_letter.as_deref()),
                size: p.size,
                partition_type: p.partition_type.unwrap_or_default(),
            })
            .collect())
    }

    async fn volume(&self, letter: char) -> CapResult<Option<Volume>> {
        let script = format!(
            "Get-Volume -DriveLetter {l} -ErrorAction SilentlyContinue | \
             Select-Object @{{n='DriveLetter';e={{[string]$_.DriveLetter}}}}, FileSystem, Size, SizeRemaining, \
             @{{n='IsSystem';e={{ $env:SystemDrive -eq ('{l}' + ':') }}}} | ConvertTo-Json -Compress",
            l = letter
        );
        let rows: Vec<PsVolume> = self.ps.query_list(&script).await?;
        Ok(rows.into_iter().next().map(|v| Volume {
            letter: letter_of(v.drive_letter.as_deref()).unwrap_or(letter),
            file_system: v.file_system.filter(|f| !f.is_empty()),
            size: v.size.unwrap_or(0),
            size_remaining: v.size_remaining.unwrap_or(0),
            is_system: v.is_system.unwrap_or(false),
        }))
    }

    async fn optimize(&self, letter: char) -> CapResult<()> {
        self.ps
            .run(&format!("Optimize-Volume -DriveLetter {}", letter))
            .await?;
        Ok(())
    }

    async fn format(&self, letter: char, fs: FileSystem) -> CapResult<()> {
        let before = self.volume(letter).await?;
        let script = format!(
            "Format-Volume -DriveLetter {} -FileSystem {} -Force -Confirm:$false | Out-Null",
            letter, fs
        );
        match self.ps.run(&script).await {
            Ok(_) => Ok(()),
            Err(e) => {
                // The format may have begun before the failure: a vanished
                // volume or a changed file system means data is already gone.
                let after = self.volume(letter).await.ok().flatten();
                if format_started(before.as_ref(), after.as_ref()) {
                    Err(CapError::Incomplete(format!(
                        "format of {}: started but did not complete: {}",
                        letter, e
                    )))
                } else {
                    Err(e)
                }
            }
        }
    }
}

// ===========================================================================
// Recycle bin – Shell.Application namespace 0xA
// ===========================================================================

const RECYCLE_BIN_SIZE: &str = "$items = (New-Object -ComObject Shell.Application).NameSpace(0xA).Items(); \
     ($items | Measure-Object -Property Size -Sum).Sum";

// 0x80070003 is returned by Clear-RecycleBin when there is nothing to clear.
const RECYCLE_BIN_CLEAR: &str = "try { Clear-RecycleBin -Force } \
     catch { if ($_.Exception.HResult -ne -2147024893) { throw } }";

pub struct ShellRecycleBin {
    ps: PowerShell,
}

impl ShellRecycleBin {
    pub fn new(ps: PowerShell) -> Self {
        Self { ps }
    }
}

/// `Measure-Object` prints nothing for an empty bin and may print a double.
fn parse_size(out: &str) -> CapResult<u64> {
    let s = out.trim();
    if s.is_empty() {
        return Ok(0);
    }
    if let Ok(n) = s.parse::<u64>() {
        return Ok(n);
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map(|f| f as u64)
        .ok_or_else(|| CapError::Other(format!("unexpected recycle bin size output: {}", s)))
}

#[async_trait::async_trait]
impl RecycleBinOps for ShellRecycleBin {
    async fn size(&self) -> CapResult<u64> {
        parse_size(&self.ps.query(RECYCLE_BIN_SIZE).await?)
    }

    async fn clear(&self) -> CapResult<()> {
        self.ps.run(RECYCLE_BIN_CLEAR).await?;
        Ok(())
    }
}

// ===========================================================================
// Accounts – Microsoft.PowerShell.LocalAccounts
// ===========================================================================

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct PsLocalUser {
    name: String,
    full_name: Option<String>,
    description: Option<String>,
    enabled: Option<bool>,
    #[serde(rename = "SID")]
    sid: Option<String>,
}

impl From<PsLocalUser> for LocalUser {
    fn from(u: PsLocalUser) -> Self {
        LocalUser {
            name: u.name,
            full_name: u.full_name.unwrap_or_default(),
            description: u.description.unwrap_or_default(),
            enabled: u.enabled.unwrap_or(false),
            sid: u.sid.unwrap_or_else(|| "N/A".to_string()),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct PsLocalGroup {
    name: String,
    description: Option<String>,
    #[serde(rename = "SID")]
    sid: Option<String>,
}

const USER_FIELDS: &str =
    "Select-Object Name, FullName, Description, Enabled, @{n='SID';e={$_.SID.Value}}";

/// Environment variable carrying the new account's password to the child.
const SECRET_ENV: &str = "ADMINCTL_NEW_USER_SECRET";

pub struct LocalAccounts {
    ps: PowerShell,
}

impl LocalAccounts {
    pub fn new(ps: PowerShell) -> Self {
        Self { ps }
    }
}

#[async_trait::async_trait]
impl AccountOps for LocalAccounts {
    async fn list_users(&self) -> CapResult<Vec<LocalUser>> {
        let script = format!("Get-LocalUser | {} | ConvertTo-Json -Compress", USER_FIELDS);
        let rows: Vec<PsLocalUser> = self.ps.query_list(&script).await?;
        Ok(rows.into_iter().map(LocalUser::from).collect())
    }

    async fn list_groups(&self) -> CapResult<Vec<LocalGroup>> {
        let script = "Get-LocalGroup | Select-Object Name, Description, @{n='SID';e={$_.SID.Value}} | ConvertTo-Json -Compress";
        let rows: Vec<PsLocalGroup> = self.ps.query_list(script).await?;
        Ok(rows
            .into_iter()
            .map(|g| LocalGroup {
                name: g.name,
                description: g.description.unwrap_or_default(),
                sid: g.sid.unwrap_or_else(|| "N/A".to_string()),
            })
            .collect())
    }

    async fn find_user(&self, name: &str) -> CapResult<Option<LocalUser>> {
        let script = format!(
            "Get-LocalUser -Name {} -ErrorAction SilentlyContinue | {} | ConvertTo-Json -Compress",
            quote(name),
            USER_FIELDS
        );
        let rows: Vec<PsLocalUser> = self.ps.query_list(&script).await?;
        Ok(rows.into_iter().next().map(LocalUser::from))
    }

    async fn create_user(&self, user: &NewUser) -> CapResult<()> {
        let script = format!(
            "$p = ConvertTo-SecureString -String $env:{} -AsPlainText -Force; \
             New-LocalUser -Name {} -Password $p -FullName {} -Description {} | Out-Null",
            SECRET_ENV,
            quote(&user.user_name),
            quote(user.full_name.as_deref().unwrap_or("")),
            quote(user.description.as_deref().unwrap_or("")),
        );
        self.ps
            .run_with_env(&script, &[(SECRET_ENV, &user.password)])
            .await?;
        Ok(())
    }

    async fn delete_user(&self, name: &str) -> CapResult<()> {
        self.ps
            .run(&format!("Remove-LocalUser -Name {}", quote(name)))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::powershell::parse_json_list;

    #[test]
    fn test_pnp_row_mapping() {
        let rows: Vec<PsPnpDevice> = parse_json_list(
            r#"[{"InstanceId":"USB\\VID_1","FriendlyName":null,"Class":"USB","Manufacturer":null,"Status":"Disabled"},
                {"InstanceId":"PCI\\VEN_2","FriendlyName":"GPU","Class":"Display","Manufacturer":"ACME","Status":"OK"}]"#,
        )
        .unwrap();
        let devices: Vec<Device> = rows.into_iter().map(Device::from).collect();
        assert_eq!(devices[0].name, "(Unknown)");
        assert!(devices[0].status.is_disabled());
        assert_eq!(devices[1].manufacturer, "ACME");
        assert!(devices[1].status.is_ok());
    }

    #[test]
    fn test_pnp_disabled_node_reports_problem_code() {
        let rows: Vec<PsPnpDevice> = parse_json_list(
            r#"[{"InstanceId":"USB\\VID_1","FriendlyName":"Webcam","Class":"Camera","Manufacturer":null,"Status":"Error","ConfigManagerErrorCode":22},
                {"InstanceId":"USB\\VID_2","FriendlyName":"Dock","Class":"USB","Manufacturer":null,"Status":"Error","ConfigManagerErrorCode":28},
                {"InstanceId":"USB\\VID_3","FriendlyName":"Mouse","Class":"Mouse","Manufacturer":null,"Status":"OK","ConfigManagerErrorCode":0}]"#,
        )
        .unwrap();
        let devices: Vec<Device> = rows.into_iter().map(Device::from).collect();
        assert!(devices[0].status.is_disabled());
        assert_eq!(String::from(devices[0].status.clone()), "Disabled");
        assert_eq!(devices[1].status, DeviceStatus::Other("Error".into()));
        assert!(devices[2].status.is_ok());
    }

    #[test]
    fn test_pnp_script_rethrows_real_failures() {
        let script = pnp_script(" -Class 'USB'");
        assert!(script.contains("Get-PnpDevice -Class 'USB' -ErrorAction SilentlyContinue -ErrorVariable errs"));
        assert!(script.contains("-ne 'ObjectNotFound'"));
        assert!(script.contains("throw $fatal[0]"));
        assert!(script.contains("ConfigManagerErrorCode"));
    }

    fn vol(fs: Option<&str>) -> Volume {
        Volume {
            letter: 'E',
            file_system: fs.map(String::from),
            size: 1000,
            size_remaining: 500,
            is_system: false,
        }
    }

    #[test]
    fn test_format_started_classification() {
        let fat = vol(Some("FAT32"));
        // Unchanged: the format never began.
        assert!(!format_started(Some(&fat), Some(&vol(Some("FAT32")))));
        // File system switched mid-way.
        assert!(format_started(Some(&fat), Some(&vol(Some("NTFS")))));
        // Volume vanished.
        assert!(format_started(Some(&fat), None));
        // Volume left raw.
        assert!(format_started(Some(&fat), Some(&vol(None))));
        // Nothing to compare against.
        assert!(!format_started(None, None));
    }

    #[test]
    fn test_pnp_row_without_identity_fails() {
        let r: CapResult<Vec<PsPnpDevice>> =
            parse_json_list(r#"{"FriendlyName":"ghost","Status":"OK"}"#);
        assert!(r.is_err());
    }

    #[test]
    fn test_letter_of() {
        assert_eq!(letter_of(Some("C")), Some('C'));
        assert_eq!(letter_of(Some("\u{0}")), None);
        assert_eq!(letter_of(Some("e")), Some('E'));
        assert_eq!(letter_of(None), None);
    }

    #[test]
    fn test_disk_row_degrades_missing_volume() {
        let rows: Vec<PsDiskRow> = parse_json_list(
            r#"{"Number":1,"FriendlyName":"USB Stick","Size":1000,"IsRemovable":true,"DriveLetter":null,"FileSystem":null,"SizeRemaining":null}"#,
        )
        .unwrap();
        let r = &rows[0];
        assert_eq!(r.number, 1);
        assert!(letter_of(r.drive_letter.as_deref()).is_none());
        assert!(r.size_remaining.is_none());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("").unwrap(), 0);
        assert_eq!(parse_size("1048576\r\n").unwrap(), 1_048_576);
        assert_eq!(parse_size("1.5E+3").unwrap(), 1500);
        assert!(parse_size("n/a").is_err());
    }

    #[test]
    fn test_user_row_mapping() {
        let rows: Vec<PsLocalUser> = parse_json_list(
            r#"{"Name":"alice","FullName":null,"Description":"ops","Enabled":true,"SID":"S-1-5-21-1-1001"}"#,
        )
        .unwrap();
        let u = LocalUser::from(rows.into_iter().next().unwrap());
        assert_eq!(u.name, "alice");
        assert_eq!(u.full_name, "");
        assert_eq!(u.sid, "S-1-5-21-1-1001");
        assert!(u.enabled);
    }
}
