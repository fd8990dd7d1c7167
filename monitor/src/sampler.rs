use sysinfo::{Pid, ProcessesToUpdate, System};

/// One on-demand reading of the target's OS-level counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterSample {
    /// Resident set / working set, in bytes.
    pub working_set: u64,
    /// Total virtual size, in bytes. sysinfo exposes no private-working-set
    /// counter, so this is the closest companion figure available.
    pub virtual_memory: u64,
    /// CPU usage in percent of one core since the previous sample.
    pub cpu_percent: f32,
}

/// Polling wrapper over the OS process table, scoped to a single pid per
/// call. The caller drives the cadence (the session driver ticks every two
/// seconds); CPU percentages are deltas between consecutive samples, so the
/// first reading after a launch reports 0.
pub struct PerfSampler {
    sys: System,
}

impl PerfSampler {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }

    /// Samples `pid`, or `None` once the process is gone from the table.
    pub fn sample(&mut self, pid: u32) -> Option<CounterSample> {
        let pid = Pid::from_u32(pid);
        self.sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
        let process = self.sys.process(pid)?;
        Some(CounterSample {
            working_set: process.memory(),
            virtual_memory: process.virtual_memory(),
            cpu_percent: process.cpu_usage(),
        })
    }
}
