//! Platform implementations of the capability traits.
//!
//! - [`windows`]: PnP devices, storage, recycle bin and local accounts via
//!   PowerShell cmdlets
//! - [`processes`]: process listing/termination and host usage via sysinfo
//! - [`trash`]: freedesktop.org trash as the Unix recycle bin
//! - [`simulated`]: in-memory backend for tests and `--simulate`
//! - [`Unsupported`]: returns UNSUPPORTED/SKIP cleanly where the host has no
//!   equivalent

pub mod powershell;
pub mod processes;
pub mod simulated;
pub mod trash;
pub mod windows;

use crate::model::*;
use crate::traits::*;
use crate::types::current_os;

/// Capability stub for hosts without the corresponding OS facility. Never
/// panics.
pub struct Unsupported {
    area: &'static str,
}

impl Unsupported {
    pub fn new(area: &'static str) -> Self {
        Self { area }
    }

    fn err(&self) -> CapError {
        CapError::Unsupported(format!("{} management is not available on {}", self.area, current_os()))
    }
}

#[async_trait::async_trait]
impl DeviceOps for Unsupported {
    async fn list(&self) -> CapResult<Vec<Device>> {
        Err(self.err())
    }
    async fn find(&self, _instance_id: &str) -> CapResult<Option<Device>> {
        Err(self.err())
    }
    async fn set_enabled(&self, _instance_id: &str, _enabled: bool) -> CapResult<()> {
        Err(self.err())
    }
}

#[async_trait::async_trait]
impl StorageOps for Unsupported {
    async fn list_disks(&self) -> CapResult<Vec<Disk>> {
        Err(self.err())
    }
    async fn partitions(&self, _disk_number: u32) -> CapResult<Vec<Partition>> {
        Err(self.err())
    }
    async fn volume(&self, _letter: char) -> CapResult<Option<Volume>> {
        Err(self.err())
    }
    async fn optimize(&self, _letter: char) -> CapResult<()> {
        Err(self.err())
    }
    async fn format(&self, _letter: char, _fs: FileSystem) -> CapResult<()> {
        Err(self.err())
    }
}

#[async_trait::async_trait]
impl RecycleBinOps for Unsupported {
    async fn size(&self) -> CapResult<u64> {
        Err(self.err())
    }
    async fn clear(&self) -> CapResult<()> {
        Err(self.err())
    }
}

#[async_trait::async_trait]
impl AccountOps for Unsupported {
    async fn list_users(&self) -> CapResult<Vec<LocalUser>> {
        Err(self.err())
    }
    async fn list_groups(&self) -> CapResult<Vec<LocalGroup>> {
        Err(self.err())
    }
    async fn find_user(&self, _name: &str) -> CapResult<Option<LocalUser>> {
        Err(self.err())
    }
    async fn create_user(&self, _user: &NewUser) -> CapResult<()> {
        Err(self.err())
    }
    async fn delete_user(&self, _name: &str) -> CapResult<()> {
        Err(self.err())
    }
}
