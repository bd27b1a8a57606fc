//! Resource-guard abstraction for the worker pool's "resources hot" check.
//!
//! The original source reaches into `psutil` directly; here that becomes a
//! trait the pool calls so tests can supply a deterministic double instead
//! of depending on real host load.

use sysinfo::System;

/// Host resource snapshot the pool consults before starting a task.
pub trait ResourceProbe: Send + Sync {
    /// Current overall CPU utilization, as a percentage `0..=100`.
    ///
    /// Measurement failures are best-effort: implementations should return
    /// `0.0` rather than propagate an error, so a probing failure never
    /// counts as "hot".
    fn cpu_percent(&self) -> f32;

    /// Number of running processes whose name contains `needle`.
    fn process_count(&self, needle: &str) -> usize;
}

/// Default probe backed by `sysinfo`.
pub struct SysinfoProbe {
    system: parking_lot::Mutex<System>,
}

impl SysinfoProbe {
    /// Build a probe with an initial system snapshot.
    #[must_use]
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_all();
        Self {
            system: parking_lot::Mutex::new(system),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysinfoProbe {
    fn cpu_percent(&self) -> f32 {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        system.global_cpu_usage()
    }

    fn process_count(&self, needle: &str) -> usize {
        let mut system = self.system.lock();
        system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
        system
            .processes()
            .values()
            .filter(|p| p.name().to_string_lossy().contains(needle))
            .count()
    }
}

/// Deterministic probe for tests: returns fixed values set by the caller.
pub struct MockProbe {
    cpu_percent: parking_lot::Mutex<f32>,
    process_count: parking_lot::Mutex<usize>,
}

impl MockProbe {
    /// Build a probe reporting the given fixed readings.
    #[must_use]
    pub fn new(cpu_percent: f32, process_count: usize) -> Self {
        Self {
            cpu_percent: parking_lot::Mutex::new(cpu_percent),
            process_count: parking_lot::Mutex::new(process_count),
        }
    }

    /// Update the reported CPU percentage.
    pub fn set_cpu_percent(&self, value: f32) {
        *self.cpu_percent.lock() = value;
    }

    /// Update the reported process count.
    pub fn set_process_count(&self, value: usize) {
        *self.process_count.lock() = value;
    }
}

impl ResourceProbe for MockProbe {
    fn cpu_percent(&self) -> f32 {
        *self.cpu_percent.lock()
    }

    fn process_count(&self, _needle: &str) -> usize {
        *self.process_count.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_probe_reports_fixed_values() {
        let probe = MockProbe::new(42.0, 3);
        assert!((probe.cpu_percent() - 42.0).abs() < f32::EPSILON);
        assert_eq!(probe.process_count("anything"), 3);
    }
}
