use crate::model::*;

/// Result type for trait operations that may be unsupported.
pub type CapResult<T> = Result<T, CapError>;

#[derive(Debug, thiserror::Error)]
pub enum CapError {
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("dependency missing: {0}")]
    DependencyMissing(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A destructive operation started but did not run to completion.
    #[error("incomplete: {0}")]
    Incomplete(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait DeviceOps: Send + Sync {
    async fn list(&self) -> CapResult<Vec<Device>>;

    /// Look a device up by instance id, regardless of class filtering.
    async fn find(&self, instance_id: &str) -> CapResult<Option<Device>>;

    async fn set_enabled(&self, instance_id: &str, enabled: bool) -> CapResult<()>;
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait StorageOps: Send + Sync {
    async fn list_disks(&self) -> CapResult<Vec<Disk>>;

    /// Partitions of one disk; `NotFound` for an unknown disk number.
    async fn partitions(&self, disk_number: u32) -> CapResult<Vec<Partition>>;

    async fn volume(&self, letter: char) -> CapResult<Option<Volume>>;

    async fn optimize(&self, letter: char) -> CapResult<()>;

    async fn format(&self, letter: char, fs: FileSystem) -> CapResult<()>;
}

// ---------------------------------------------------------------------------
// Recycle bin
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait RecycleBinOps: Send + Sync {
    /// Total bytes held by recoverable items.
    async fn size(&self) -> CapResult<u64>;

    async fn clear(&self) -> CapResult<()>;
}

// ---------------------------------------------------------------------------
// Processes
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait ProcessOps: Send + Sync {
    async fn list(&self) -> CapResult<Vec<Process>>;

    /// `Ok(false)` when the OS refused; `Err(NotFound)` when there is no
    /// such pid.
    async fn terminate(&self, pid: u32) -> CapResult<bool>;
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait AccountOps: Send + Sync {
    async fn list_users(&self) -> CapResult<Vec<LocalUser>>;
    async fn list_groups(&self) -> CapResult<Vec<LocalGroup>>;
    async fn find_user(&self, name: &str) -> CapResult<Option<LocalUser>>;
    async fn create_user(&self, user: &NewUser) -> CapResult<()>;
    async fn delete_user(&self, name: &str) -> CapResult<()>;
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait SystemOps: Send + Sync {
    async fn usage(&self) -> CapResult<SystemUsage>;
    async fn is_elevated(&self) -> bool;
}
