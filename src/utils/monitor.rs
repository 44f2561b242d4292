use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSnapshot {
    pub cpu_usage: f32,
    pub memory_mb: u64,
    pub peak_memory_mb: u64,
    pub elapsed: Duration,
}

#[cfg(feature = "cli")]
mod imp {
    use super::ResourceSnapshot;
    use std::sync::Mutex;
    use std::time::Instant;
    use sysinfo::{Pid, RefreshKind, System};

    pub(super) struct Probe {
        system: Mutex<System>,
        pid: Pid,
        peak_memory_mb: Mutex<u64>,
    }

    impl Probe {
        pub(super) fn new() -> Option<Self> {
            let pid = sysinfo::get_current_pid().ok()?;
            let mut system = System::new_with_specifics(RefreshKind::everything());
            system.refresh_all();

            Some(Self {
                system: Mutex::new(system),
                pid,
                peak_memory_mb: Mutex::new(0),
            })
        }

        pub(super) fn sample(&self, started: Instant) -> Option<ResourceSnapshot> {
            let mut system = self.system.lock().ok()?;
            system.refresh_all();
            let process = system.process(self.pid)?;
            let memory_mb = process.memory() / 1024 / 1024;

            let mut peak = self.peak_memory_mb.lock().ok()?;
            *peak = (*peak).max(memory_mb);

            Some(ResourceSnapshot {
                cpu_usage: process.cpu_usage(),
                memory_mb,
                peak_memory_mb: *peak,
                elapsed: started.elapsed(),
            })
        }
    }
}

#[cfg(not(feature = "cli"))]
mod imp {
    use super::ResourceSnapshot;
    use std::time::Instant;

    pub(super) struct Probe;

    impl Probe {
        pub(super) fn new() -> Option<Self> {
            None
        }

        pub(super) fn sample(&self, _started: Instant) -> Option<ResourceSnapshot> {
            None
        }
    }
}

/// 同步執行期間的 CPU / 記憶體觀測；未啟用時所有呼叫皆為 no-op
pub struct ResourceMonitor {
    probe: Option<imp::Probe>,
    started: Instant,
}

impl ResourceMonitor {
    pub fn new(enabled: bool) -> Self {
        let probe = if enabled { imp::Probe::new() } else { None };
        if enabled && probe.is_none() {
            tracing::warn!("Resource monitoring requested but not available on this build");
        }

        Self {
            probe,
            started: Instant::now(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.probe.is_some()
    }

    pub fn snapshot(&self) -> Option<ResourceSnapshot> {
        self.probe.as_ref()?.sample(self.started)
    }

    pub fn log_phase(&self, phase: &str) {
        if let Some(stats) = self.snapshot() {
            tracing::info!(
                "📊 {} - CPU: {:.1}%, Memory: {}MB, Peak: {}MB, Elapsed: {:?}",
                phase,
                stats.cpu_usage,
                stats.memory_mb,
                stats.peak_memory_mb,
                stats.elapsed
            );
        }
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_monitor_is_silent() {
        let monitor = ResourceMonitor::disabled();
        assert!(!monitor.is_enabled());
        assert!(monitor.snapshot().is_none());
        monitor.log_phase("noop");
    }
}
