//! Resource monitor for hosted instances.
//!
//! At a fixed interval the monitor samples CPU and resident memory of
//! every `Running` instance and kills the ones over a configured limit.
//! Instances that are still starting are left alone; engines load their
//! wads at full speed.
//!
//! Sampling goes through the [`UsageProbe`] trait. [`SysinfoProbe`] is the
//! real implementation.

use std::fmt;
use std::time::Duration;

use doomhost_instance::ServerRegistry;
use doomhost_protocol::ServerId;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, System};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// The `[monitor]` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Seconds between samples.
    pub interval_secs: u64,
    /// CPU limit in percent of one core. `None` disables the check.
    pub cpu_threshold: Option<f32>,
    /// Resident memory limit in MiB. `None` disables the check.
    pub memory_threshold_mb: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 5,
            cpu_threshold: None,
            memory_threshold_mb: None,
        }
    }
}

impl MonitorConfig {
    pub const MIN_INTERVAL_SECS: u64 = 1;

    /// Clamps out-of-range values:
    /// - `interval_secs` is raised to [`Self::MIN_INTERVAL_SECS`].
    /// - A non-positive or non-finite CPU threshold disables the CPU check.
    /// - A zero memory threshold disables the memory check.
    pub fn validated(mut self) -> Self {
        if self.interval_secs < Self::MIN_INTERVAL_SECS {
            warn!(
                interval_secs = self.interval_secs,
                min = Self::MIN_INTERVAL_SECS,
                "monitor interval too short, clamping"
            );
            self.interval_secs = Self::MIN_INTERVAL_SECS;
        }
        if let Some(cpu) = self.cpu_threshold {
            if !cpu.is_finite() || cpu <= 0.0 {
                warn!(cpu_threshold = cpu, "invalid cpu threshold, disabling cpu check");
                self.cpu_threshold = None;
            }
        }
        if self.memory_threshold_mb == Some(0) {
            warn!("memory threshold of 0 MiB, disabling memory check");
            self.memory_threshold_mb = None;
        }
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Returns the first limit `usage` exceeds. Memory is checked first.
    pub fn check(&self, usage: &Usage) -> Option<Violation> {
        if let Some(limit_mb) = self.memory_threshold_mb {
            if usage.memory_mb > limit_mb {
                return Some(Violation::Memory {
                    usage_mb: usage.memory_mb,
                    limit_mb,
                });
            }
        }
        if let Some(limit) = self.cpu_threshold {
            if usage.cpu_percent > limit {
                return Some(Violation::Cpu {
                    usage: usage.cpu_percent,
                    limit,
                });
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// One process sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Usage {
    pub cpu_percent: f32,
    pub memory_mb: u64,
}

/// A limit an instance went over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Violation {
    Cpu { usage: f32, limit: f32 },
    Memory { usage_mb: u64, limit_mb: u64 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu { usage, limit } => write!(f, "cpu {usage:.1}% over {limit:.1}%"),
            Self::Memory { usage_mb, limit_mb } => write!(f, "memory {usage_mb} MiB over {limit_mb} MiB"),
        }
    }
}

/// Source of per-process usage samples.
pub trait UsageProbe: Send + 'static {
    /// Takes a fresh snapshot. Called once per sweep.
    fn refresh(&mut self);

    /// Usage of `pid` in the latest snapshot, or `None` if it is gone.
    fn usage(&self, pid: u32) -> Option<Usage>;
}

/// [`UsageProbe`] backed by `sysinfo`.
///
/// CPU usage is measured between two refreshes, so the first sample of a
/// process reads as zero.
pub struct SysinfoProbe {
    system: System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self { system: System::new() }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageProbe for SysinfoProbe {
    fn refresh(&mut self) {
        self.system.refresh_all();
    }

    fn usage(&self, pid: u32) -> Option<Usage> {
        let process = self.system.process(Pid::from(pid as usize))?;
        Some(Usage {
            cpu_percent: process.cpu_usage(),
            memory_mb: process.memory() / 1024 / 1024,
        })
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Periodically kills instances that exceed their resource limits.
pub struct ResourceMonitor<P = SysinfoProbe> {
    config: MonitorConfig,
    registry: ServerRegistry,
    probe: P,
}

impl ResourceMonitor<SysinfoProbe> {
    pub fn new(config: MonitorConfig, registry: ServerRegistry) -> Self {
        Self::with_probe(config, registry, SysinfoProbe::new())
    }
}

impl<P: UsageProbe> ResourceMonitor<P> {
    pub fn with_probe(config: MonitorConfig, registry: ServerRegistry, probe: P) -> Self {
        Self {
            config: config.validated(),
            registry,
            probe,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Samples every running instance once and kills those over a limit.
    /// Returns the ids of the killed instances.
    pub async fn sweep(&mut self) -> Vec<ServerId> {
        self.probe.refresh();

        let mut killed = Vec::new();
        for handle in self.registry.handles() {
            if !handle.state().is_running() {
                continue;
            }
            let Some(pid) = handle.pid() else {
                continue;
            };
            let Some(usage) = self.probe.usage(pid) else {
                continue;
            };
            debug!(
                server_id = %handle.id(),
                port = handle.port(),
                cpu = usage.cpu_percent,
                memory_mb = usage.memory_mb,
                "instance usage"
            );

            if let Some(violation) = self.config.check(&usage) {
                warn!(server_id = %handle.id(), port = handle.port(), %violation, "instance over limit, killing");
                handle.kill().await;
                killed.push(handle.id().clone());
            }
        }
        killed
    }

    /// Sweeps at the configured interval, forever.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.config.interval_secs,
            cpu_threshold = ?self.config.cpu_threshold,
            memory_threshold_mb = ?self.config.memory_threshold_mb,
            "resource monitor running"
        );
        let mut ticker = time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }
}

/// Spawns the monitor task if it is enabled. Abort the returned handle to
/// stop it.
pub fn spawn_monitor(config: MonitorConfig, registry: ServerRegistry) -> Option<JoinHandle<()>> {
    if !config.enabled {
        debug!("resource monitor disabled");
        return None;
    }
    Some(tokio::spawn(ResourceMonitor::new(config, registry).run()))
}
