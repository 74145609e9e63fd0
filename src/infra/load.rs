//! `sysinfo`-backed CPU load probe.

use std::sync::Mutex;

use sysinfo::System;

use crate::preview::{LoadProbe, LoadProbeError};
use crate::util::lock::mutex_lock;

const SOURCE: &str = "infra::load";

/// Reads global CPU utilisation through `sysinfo`.
///
/// Usage is computed between consecutive refreshes, so the first reading after
/// construction may be low; the monitor's TTL spaces later readings apart.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadProbe for SysinfoProbe {
    fn cpu_percent(&self) -> Result<f32, LoadProbeError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(LoadProbeError::Unsupported);
        }

        let mut system = mutex_lock(&self.system, SOURCE, "cpu_percent");
        system.refresh_cpu();

        if system.cpus().is_empty() {
            return Err(LoadProbeError::Probe("no CPUs reported".to_string()));
        }

        Ok(system.global_cpu_info().cpu_usage())
    }
}
