//! Process memory readings for the segment store's pressure valve.

use parking_lot::Mutex;
use sysinfo::{Pid, System};

/// Source of the current process's resident memory.
pub trait MemoryGauge: Send + Sync {
    /// Resident set size in bytes, or `None` when it can not be read.
    fn resident_bytes(&self) -> Option<u64>;
}

/// [`MemoryGauge`] reading this process through `sysinfo`.
pub struct ProcessMemory {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl ProcessMemory {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("Cannot determine own pid, memory valve disabled: {}", e);
                None
            }
        };
        Self {
            pid,
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for ProcessMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGauge for ProcessMemory {
    fn resident_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(|p| p.memory())
    }
}

/// A gauge that always reports the same value.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedMemory(pub Option<u64>);

impl MemoryGauge for FixedMemory {
    fn resident_bytes(&self) -> Option<u64> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_memory_reads_something() {
        let gauge = ProcessMemory::new();
        if let Some(bytes) = gauge.resident_bytes() {
            assert!(bytes > 0);
        }
    }

    #[test]
    fn test_fixed_memory() {
        assert_eq!(FixedMemory(Some(42)).resident_bytes(), Some(42));
        assert_eq!(FixedMemory(None).resident_bytes(), None);
    }
}
