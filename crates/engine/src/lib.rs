//! Engine crate – backend logic for the Windows administration tool.
//!
//! Devices, storage, recycle bin, processes and local accounts sit behind
//! capability traits, with PowerShell/sysinfo backends for the real host
//! and an in-memory backend for tests. The crate has no UI dependency, so
//! the same command surface serves the `adminctl` CLI, its daemon and any
//! desktop bridge.

pub mod commands;
pub mod config;
pub mod context;
pub mod doctor;
pub mod handlers;
pub mod locks;
pub mod model;
pub mod platform;
pub mod probes;
pub mod scenario;
pub mod traits;
pub mod types;
pub mod validate;

// Re-exports for convenience
pub use commands::{Command, CommandError, CommandRegistry};
pub use config::EngineConfig;
pub use context::AppContext;
pub use types::{CommandResult, ErrorCode, ErrorInfo, Status};
