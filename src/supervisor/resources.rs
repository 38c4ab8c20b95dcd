//! Host resource sampling

use std::fs;
use std::io;
use std::path::PathBuf;

const DEFAULT_MEMINFO: &str = "/proc/meminfo";
const DEFAULT_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

/// One resource reading; recomputed every tick, never retained
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSnapshot {
    /// Used memory, percent of total
    pub memory_percent: f64,

    /// Primary thermal sensor in °C, `0.0` when absent
    pub cpu_temp: f64,

    pub within_limits: bool,
}

/// Raw host reads behind the monitor
pub trait ResourceProbe: Send + Sync {
    /// Used memory as a percentage of total memory
    fn memory_percent(&self) -> io::Result<f64>;

    /// Primary thermal sensor in °C, `None` when the host has none
    fn cpu_temp(&self) -> Option<f64>;
}

/// Linux probe reading procfs and sysfs
#[derive(Debug, Clone)]
pub struct ProcProbe {
    meminfo: PathBuf,
    thermal_zone: PathBuf,
}

impl ProcProbe {
    pub fn new() -> Self {
        Self::with_paths(DEFAULT_MEMINFO, DEFAULT_THERMAL_ZONE)
    }

    pub fn with_paths(meminfo: impl Into<PathBuf>, thermal_zone: impl Into<PathBuf>) -> Self {
        Self {
            meminfo: meminfo.into(),
            thermal_zone: thermal_zone.into(),
        }
    }
}

impl Default for ProcProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for ProcProbe {
    fn memory_percent(&self) -> io::Result<f64> {
        let content = fs::read_to_string(&self.meminfo)?;
        parse_meminfo(&content).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("no MemTotal in {}", self.meminfo.display()),
            )
        })
    }

    fn cpu_temp(&self) -> Option<f64> {
        let raw = fs::read_to_string(&self.thermal_zone).ok()?;
        let millidegrees: f64 = raw.trim().parse().ok()?;
        Some(millidegrees / 1000.0)
    }
}

/// Used memory percentage from `/proc/meminfo` content
///
/// Uses `MemAvailable` when present, else `MemFree + Buffers + Cached`.
pub fn parse_meminfo(content: &str) -> Option<f64> {
    let field = |name: &str| -> Option<f64> {
        content.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            rest.split_whitespace().next()?.parse::<f64>().ok()
        })
    };

    let total = field("MemTotal")?;
    if total <= 0.0 {
        return None;
    }

    let available = match field("MemAvailable") {
        Some(available) => available,
        None => field("MemFree")? + field("Buffers").unwrap_or(0.0) + field("Cached").unwrap_or(0.0),
    };

    let used = (total - available).max(0.0);
    Some(used / total * 100.0)
}

/// Samples the host against memory and temperature ceilings
pub struct ResourceMonitor {
    probe: Box<dyn ResourceProbe>,
    max_memory_percent: f64,
    max_temp: f64,
}

impl ResourceMonitor {
    pub fn new(probe: Box<dyn ResourceProbe>, max_memory_percent: f64, max_temp: f64) -> Self {
        Self {
            probe,
            max_memory_percent,
            max_temp,
        }
    }

    /// Takes one sample; never fails
    ///
    /// An unreadable memory figure counts as within limits, and a missing
    /// thermal sensor reads `0.0`.
    pub fn sample(&self) -> ResourceSnapshot {
        let (memory_percent, memory_ok) = match self.probe.memory_percent() {
            Ok(percent) => (percent, percent <= self.max_memory_percent),
            Err(e) => {
                tracing::warn!("Failed to read memory usage, assuming within limits: {}", e);
                (0.0, true)
            }
        };

        let cpu_temp = self.probe.cpu_temp().unwrap_or(0.0);
        let temp_ok = cpu_temp <= self.max_temp;

        ResourceSnapshot {
            memory_percent,
            cpu_temp,
            within_limits: memory_ok && temp_ok,
        }
    }
}
