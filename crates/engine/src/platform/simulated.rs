//! In-memory backend implementing every capability.
//!
//! Used by `adminctl --simulate` and the test suites. It mirrors the
//! observable behaviour of the real backends (status strings, not-found and
//! already-exists failures, protected processes) without touching the host.

use crate::model::*;
use crate::traits::*;
use std::sync::Mutex;
use std::time::Duration;

struct SimProcess {
    process: Process,
    protected: bool,
}

struct SimDisk {
    disk: Disk,
    partitions: Vec<Partition>,
}

struct State {
    devices: Vec<Device>,
    disks: Vec<SimDisk>,
    volumes: Vec<Volume>,
    recycle_bin: Vec<u64>,
    processes: Vec<SimProcess>,
    users: Vec<LocalUser>,
    groups: Vec<LocalGroup>,
    next_rid: u32,
}

pub struct SimulatedPlatform {
    state: Mutex<State>,
    /// How long optimize/format take, so overlapping calls can be observed.
    op_delay: Duration,
    /// How long the disk listing takes.
    query_delay: Duration,
    elevated: bool,
    interrupt_format: bool,
}

const MACHINE_SID: &str = "S-1-5-21-3623811015-3361044348-30300820";
const GB: u64 = 1024 * 1024 * 1024;

impl SimulatedPlatform {
    /// A small machine: two disks, a handful of devices, processes and
    /// accounts.
    pub fn seeded() -> Self {
        let device = |id: &str, name: &str, class: &str, status: &str| Device {
            instance_id: id.to_string(),
            name: name.to_string(),
            class: class.to_string(),
            manufacturer: "Simulated".to_string(),
            status: DeviceStatus::from(status.to_string()),
        };
        let user = |name: &str, enabled: bool, rid: u32, description: &str| LocalUser {
            name: name.to_string(),
            full_name: String::new(),
            description: description.to_string(),
            enabled,
            sid: format!("{}-{}", MACHINE_SID, rid),
        };
        let group = |name: &str, rid: u32| LocalGroup {
            name: name.to_string(),
            description: format!("Members of {}", name),
            sid: format!("S-1-5-32-{}", rid),
        };
        let process = |pid: u32, name: &str, memory: u64, protected: bool| SimProcess {
            process: Process {
                pid,
                name: name.to_string(),
                cpu_usage: 0.0,
                memory,
            },
            protected,
        };

        let state = State {
            devices: vec![
                device("PCI\\VEN_10DE&DEV_1F08\\4&1", "NVIDIA GeForce RTX 2060", "Display", "OK"),
                device("USB\\VID_046D&PID_C52B\\5&2", "USB Receiver", "USB", "OK"),
                device("BTH\\MS_BTHPAN\\7&3", "Bluetooth PAN", "Bluetooth", "Disabled"),
                device("PCI\\VEN_8086&DEV_15F3\\3&4", "Intel Ethernet I225-V", "Net", "Error"),
            ],
            disks: vec![
                SimDisk {
                    disk: Disk::new(0, "Samsung SSD 980", Some("C:".into()), 500 * GB, 120 * GB, Some("NTFS".into()), false),
                    partitions: vec![
                        Partition { number: 1, drive_letter: None, size: 100 * 1024 * 1024, partition_type: "System".into() },
                        Partition { number: 2, drive_letter: None, size: 16 * 1024 * 1024, partition_type: "Reserved".into() },
                        Partition { number: 3, drive_letter: Some('C'), size: 499 * GB, partition_type: "Basic".into() },
                    ],
                },
                SimDisk {
                    disk: Disk::new(1, "SanDisk Ultra", Some("E:".into()), 64 * GB, 60 * GB, Some("FAT32".into()), true),
                    partitions: vec![Partition { number: 1, drive_letter: Some('E'), size: 64 * GB, partition_type: "Basic".into() }],
                },
            ],
            volumes: vec![
                Volume { letter: 'C', file_system: Some("NTFS".into()), size: 499 * GB, size_remaining: 120 * GB, is_system: true },
                Volume { letter: 'E', file_system: Some("FAT32".into()), size: 64 * GB, size_remaining: 60 * GB, is_system: false },
            ],
            recycle_bin: vec![1024, 4096, 1_048_576],
            processes: vec![
                process(0, "System Idle Process", 8 * 1024, true),
                process(4, "System", 140 * 1024, true),
                process(1234, "explorer.exe", 90 * 1024 * 1024, false),
                process(4321, "notepad.exe", 12 * 1024 * 1024, false),
            ],
            users: vec![
                user("Administrator", false, 500, "Built-in account for administering the computer/domain"),
                user("Guest", false, 501, "Built-in account for guest access to the computer/domain"),
                user("DefaultAccount", false, 503, "A user account managed by the system."),
                user("WDAGUtilityAccount", false, 504, "A user account managed and used by the system"),
                user("operator", true, 1001, ""),
            ],
            groups: vec![group("Administrators", 544), group("Users", 545), group("Guests", 546)],
            next_rid: 1002,
        };

        Self {
            state: Mutex::new(state),
            op_delay: Duration::ZERO,
            query_delay: Duration::ZERO,
            elevated: true,
            interrupt_format: false,
        }
    }

    pub fn with_op_delay(mut self, delay: Duration) -> Self {
        self.op_delay = delay;
        self
    }

    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    /// Mutations fail with `PermissionDenied`, as for a non-admin caller.
    pub fn unprivileged(mut self) -> Self {
        self.elevated = false;
        self
    }

    /// Formats fail after wiping the file system.
    pub fn with_format_interruption(mut self) -> Self {
        self.interrupt_format = true;
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn require_elevation(&self, action: &str) -> CapResult<()> {
        if self.elevated {
            Ok(())
        } else {
            Err(CapError::PermissionDenied(format!("{} requires administrator rights", action)))
        }
    }

    async fn pause(&self) {
        if !self.op_delay.is_zero() {
            tokio::time::sleep(self.op_delay).await;
        }
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::seeded()
    }
}

#[async_trait::async_trait]
impl DeviceOps for SimulatedPlatform {
    async fn list(&self) -> CapResult<Vec<Device>> {
        Ok(self.state().devices.clone())
    }

    async fn find(&self, instance_id: &str) -> CapResult<Option<Device>> {
        Ok(self
            .state()
            .devices
            .iter()
            .find(|d| d.instance_id.eq_ignore_ascii_case(instance_id))
            .cloned())
    }

    async fn set_enabled(&self, instance_id: &str, enabled: bool) -> CapResult<()> {
        self.require_elevation("changing device state")?;
        let mut state = self.state();
        let device = state
            .devices
            .iter_mut()
            .find(|d| d.instance_id.eq_ignore_ascii_case(instance_id))
            .ok_or_else(|| CapError::NotFound(format!("device {}", instance_id)))?;
        device.status = if enabled { DeviceStatus::Ok } else { DeviceStatus::Disabled };
        Ok(())
    }
}

#[async_trait::async_trait]
impl StorageOps for SimulatedPlatform {
    async fn list_disks(&self) -> CapResult<Vec<Disk>> {
        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }
        Ok(self.state().disks.iter().map(|d| d.disk.clone()).collect())
    }

    async fn partitions(&self, disk_number: u32) -> CapResult<Vec<Partition>> {
        self.state()
            .disks
            .iter()
            .find(|d| d.disk.disk_number == disk_number)
            .map(|d| d.partitions.clone())
            .ok_or_else(|| CapError::NotFound(format!("disk {} does not exist", disk_number)))
    }

    async fn volume(&self, letter: char) -> CapResult<Option<Volume>> {
        Ok(self.state().volumes.iter().find(|v| v.letter == letter).cloned())
    }

    async fn optimize(&self, letter: char) -> CapResult<()> {
        self.require_elevation("optimizing a volume")?;
        if !self.state().volumes.iter().any(|v| v.letter == letter) {
            return Err(CapError::NotFound(format!("volume {}:", letter)));
        }
        self.pause().await;
        Ok(())
    }

    async fn format(&self, letter: char, fs: FileSystem) -> CapResult<()> {
        self.require_elevation("formatting a volume")?;
        if !self.state().volumes.iter().any(|v| v.letter == letter) {
            return Err(CapError::NotFound(format!("volume {}:", letter)));
        }
        self.pause().await;

        let mut state = self.state();
        let mount = format!("{}:", letter);
        let interrupted = self.interrupt_format;
        if let Some(v) = state.volumes.iter_mut().find(|v| v.letter == letter) {
            if interrupted {
                v.file_system = None;
            } else {
                v.file_system = Some(fs.as_str().to_string());
                v.size_remaining = v.size;
            }
        }
        if let Some(d) = state
            .disks
            .iter_mut()
            .find(|d| d.disk.mount_point.as_deref() == Some(mount.as_str()))
        {
            if interrupted {
                d.disk.file_system = None;
            } else {
                d.disk.file_system = Some(fs.as_str().to_string());
                d.disk.available_space = d.disk.total_space;
            }
        }
        if interrupted {
            return Err(CapError::Incomplete(format!(
                "format of {} stopped after the file system was erased",
                mount
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecycleBinOps for SimulatedPlatform {
    async fn size(&self) -> CapResult<u64> {
        Ok(self.state().recycle_bin.iter().sum())
    }

    async fn clear(&self) -> CapResult<()> {
        self.state().recycle_bin.clear();
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProcessOps for SimulatedPlatform {
    async fn list(&self) -> CapResult<Vec<Process>> {
        Ok(self.state().processes.iter().map(|p| p.process.clone()).collect())
    }

    async fn terminate(&self, pid: u32) -> CapResult<bool> {
        let mut state = self.state();
        let idx = state
            .processes
            .iter()
            .position(|p| p.process.pid == pid)
            .ok_or_else(|| CapError::NotFound(format!("no process with pid {}", pid)))?;
        if state.processes[idx].protected {
            return Ok(false);
        }
        state.processes.remove(idx);
        Ok(true)
    }
}

#[async_trait::async_trait]
impl AccountOps for SimulatedPlatform {
    async fn list_users(&self) -> CapResult<Vec<LocalUser>> {
        Ok(self.state().users.clone())
    }

    async fn list_groups(&self) -> CapResult<Vec<LocalGroup>> {
        Ok(self.state().groups.clone())
    }

    async fn find_user(&self, name: &str) -> CapResult<Option<LocalUser>> {
        Ok(self
            .state()
            .users
            .iter()
            .find(|u| u.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn create_user(&self, user: &NewUser) -> CapResult<()> {
        self.require_elevation("creating an account")?;
        let mut state = self.state();
        if state.users.iter().any(|u| u.name.eq_ignore_ascii_case(&user.user_name)) {
            return Err(CapError::AlreadyExists(format!("user {}", user.user_name)));
        }
        let rid = state.next_rid;
        state.next_rid += 1;
        state.users.push(LocalUser {
            name: user.user_name.clone(),
            full_name: user.full_name.clone().unwrap_or_default(),
            description: user.description.clone().unwrap_or_default(),
            enabled: true,
            sid: format!("{}-{}", MACHINE_SID, rid),
        });
        Ok(())
    }

    async fn delete_user(&self, name: &str) -> CapResult<()> {
        self.require_elevation("deleting an account")?;
        let mut state = self.state();
        let before = state.users.len();
        state.users.retain(|u| !u.name.eq_ignore_ascii_case(name));
        if state.users.len() == before {
            return Err(CapError::NotFound(format!("user {}", name)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SystemOps for SimulatedPlatform {
    async fn usage(&self) -> CapResult<SystemUsage> {
        let used: u64 = self.state().processes.iter().map(|p| p.process.memory).sum();
        Ok(SystemUsage {
            cpu_usage_percent: 3.5,
            ram_used_mb: used as f64 / (1024.0 * 1024.0),
            ram_total_mb: 16_384.0,
        })
    }

    async fn is_elevated(&self) -> bool {
        self.elevated
    }
}
