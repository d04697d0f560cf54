// System load sampling for the adaptive concurrency limit.

use sysinfo::{Pid, System};

/// One reading of system load
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadSample {
    /// Process CPU usage normalised to 0-100 across all cores
    pub cpu_percent: f32,
    /// Estimated memory available to new work, in bytes
    pub available_memory_bytes: u64,
}

/// Source of [`LoadSample`]s
#[cfg_attr(test, mockall::automock)]
pub trait LoadSampler: Send {
    fn sample(&mut self) -> LoadSample;
}

/// [`LoadSampler`] backed by `sysinfo`.
///
/// CPU usage is the process's CPU time over wall-clock time since the previous
/// sample, divided by the processor count. The first sample reads 0%.
pub struct SysinfoSampler {
    system: System,
    pid: Pid,
    cpu_count: usize,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let pid = Pid::from_u32(std::process::id());
        let mut system = System::new();
        system.refresh_process(pid);
        Self {
            system,
            pid,
            cpu_count: num_cpus::get().max(1),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadSampler for SysinfoSampler {
    fn sample(&mut self) -> LoadSample {
        self.system.refresh_process(self.pid);
        self.system.refresh_memory();

        let process_cpu = self
            .system
            .process(self.pid)
            .map(|process| process.cpu_usage())
            .unwrap_or(0.0);

        LoadSample {
            cpu_percent: (process_cpu / self.cpu_count as f32).clamp(0.0, 100.0),
            available_memory_bytes: self.system.available_memory(),
        }
    }
}
