//! Host resource sampling for model audit records

use parking_lot::Mutex;
use std::path::Path;
use suntrack_core::ports::HostProbe;
use suntrack_core::HostMetrics;
use sysinfo::{Disks, System};
use tracing::debug;

/// `sysinfo`-backed probe. Keeps one `System` alive so CPU usage is
/// measured between consecutive samples rather than from a cold start.
pub struct SysinfoProbe {
    sys: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        Self {
            sys: Mutex::new(sys),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for SysinfoProbe {
    fn sample(&self) -> HostMetrics {
        let (cpu_percent, memory_percent) = {
            let mut sys = self.sys.lock();
            sys.refresh_cpu_usage();
            sys.refresh_memory();
            let total = sys.total_memory();
            let memory = if total > 0 {
                (total - sys.available_memory().min(total)) as f32 / total as f32 * 100.0
            } else {
                0.0
            };
            (sys.global_cpu_info().cpu_usage(), memory)
        };

        let metrics = HostMetrics {
            cpu_percent,
            memory_percent,
            disk_percent: root_disk_percent(),
        };
        debug!(?metrics, "host metrics sampled");
        metrics
    }
}

/// Usage of the filesystem mounted at `/`, or of the first disk listed
fn root_disk_percent() -> f32 {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .find(|d| d.mount_point() == Path::new("/"))
        .or_else(|| disks.list().first());
    match disk {
        Some(d) if d.total_space() > 0 => {
            let used = d.total_space() - d.available_space().min(d.total_space());
            used as f32 / d.total_space() as f32 * 100.0
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_is_within_percent_range() {
        let probe = SysinfoProbe::new();
        let m = probe.sample();
        for value in [m.cpu_percent, m.memory_percent, m.disk_percent] {
            assert!((0.0..=100.0).contains(&value), "out of range: {value}");
        }
    }
}
