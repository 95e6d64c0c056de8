//! Application context – holds capability trait objects, config and the
//! single-flight lock table.

use crate::config::EngineConfig;
use crate::locks::ResourceLocks;
use crate::platform::powershell::PowerShell;
use crate::platform::processes::{SysinfoProcesses, SysinfoSystem};
use crate::platform::simulated::SimulatedPlatform;
use crate::platform::trash::FreedesktopTrash;
use crate::platform::windows::{LocalAccounts, PnpDevices, PsStorage, ShellRecycleBin};
use crate::platform::Unsupported;
use crate::traits::*;
use std::sync::Arc;
use std::time::Duration;

/// Central context passed to all engine operations.
///
/// Holds trait-object capabilities so callers (CLI / desktop shell / tests)
/// can swap implementations (e.g. the simulated backend vs the real OS).
pub struct AppContext {
    devices: Arc<dyn DeviceOps>,
    storage: Arc<dyn StorageOps>,
    recycle_bin: Arc<dyn RecycleBinOps>,
    processes: Arc<dyn ProcessOps>,
    accounts: Arc<dyn AccountOps>,
    system: Arc<dyn SystemOps>,
    locks: ResourceLocks,
    pub config: EngineConfig,
}

impl AppContext {
    pub fn new(
        config: EngineConfig,
        devices: Arc<dyn DeviceOps>,
        storage: Arc<dyn StorageOps>,
        recycle_bin: Arc<dyn RecycleBinOps>,
        processes: Arc<dyn ProcessOps>,
        accounts: Arc<dyn AccountOps>,
        system: Arc<dyn SystemOps>,
    ) -> Self {
        Self {
            devices,
            storage,
            recycle_bin,
            processes,
            accounts,
            system,
            locks: ResourceLocks::new(),
            config,
        }
    }

    /// Create a context with the real implementations for this host.
    ///
    /// Windows gets the PowerShell backends; elsewhere devices, storage and
    /// accounts are reported as unsupported and the recycle bin maps to the
    /// freedesktop trash.
    pub fn default_platform(config: EngineConfig) -> Self {
        let ps = PowerShell::new(&config.shell);
        let processes = Arc::new(SysinfoProcesses::new(Duration::from_millis(
            config.processes.cpu_sample_ms,
        )));
        let system = Arc::new(SysinfoSystem::new(config.shell.program.clone()));

        let (devices, storage, recycle_bin, accounts): (
            Arc<dyn DeviceOps>,
            Arc<dyn StorageOps>,
            Arc<dyn RecycleBinOps>,
            Arc<dyn AccountOps>,
        ) = if cfg!(windows) {
            (
                Arc::new(PnpDevices::new(ps.clone(), config.devices.classes.clone())),
                Arc::new(PsStorage::new(ps.clone())),
                Arc::new(ShellRecycleBin::new(ps.clone())),
                Arc::new(LocalAccounts::new(ps)),
            )
        } else {
            let trash = config
                .recycle_bin
                .trash_dir
                .clone()
                .or_else(FreedesktopTrash::default_location);
            let recycle_bin: Arc<dyn RecycleBinOps> = match trash {
                Some(dir) => Arc::new(FreedesktopTrash::new(dir)),
                None => Arc::new(Unsupported::new("recycle bin")),
            };
            (
                Arc::new(Unsupported::new("device")),
                Arc::new(Unsupported::new("storage")),
                recycle_bin,
                Arc::new(Unsupported::new("account")),
            )
        };

        Self::new(config, devices, storage, recycle_bin, processes, accounts, system)
    }

    /// Create a context where every capability is served by `sim`.
    pub fn simulated(config: EngineConfig, sim: Arc<SimulatedPlatform>) -> Self {
        Self::new(
            config,
            sim.clone(),
            sim.clone(),
            sim.clone(),
            sim.clone(),
            sim.clone(),
            sim,
        )
    }

    /// Simulated context with default config and the seeded machine.
    pub fn default_simulated() -> Self {
        Self::simulated(EngineConfig::default(), Arc::new(SimulatedPlatform::seeded()))
    }

    pub fn devices(&self) -> &dyn DeviceOps {
        self.devices.as_ref()
    }

    pub fn storage(&self) -> &dyn StorageOps {
        self.storage.as_ref()
    }

    pub fn recycle_bin(&self) -> &dyn RecycleBinOps {
        self.recycle_bin.as_ref()
    }

    pub fn processes(&self) -> &dyn ProcessOps {
        self.processes.as_ref()
    }

    pub fn accounts(&self) -> &dyn AccountOps {
        self.accounts.as_ref()
    }

    pub fn system(&self) -> &dyn SystemOps {
        self.system.as_ref()
    }

    pub fn locks(&self) -> &ResourceLocks {
        &self.locks
    }
}
