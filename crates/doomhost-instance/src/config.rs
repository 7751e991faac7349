//! Launch settings and the instance state machine.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LaunchSettings
// ---------------------------------------------------------------------------

/// Where the engine lives and how its command line is assembled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSettings {
    /// Engine binary.
    pub executable: PathBuf,

    /// Prefix prepended to every requested hostname.
    pub host_label: String,

    pub iwad_dir: PathBuf,
    pub wad_dir: PathBuf,
    pub cfg_dir: PathBuf,

    /// Loaded in front of the wad list when a request sets `data`.
    pub actors_file: String,
    pub data_file: String,

    /// Output line that means the engine is accepting players.
    pub ready_marker: String,
}

/// The line the engine prints once its UDP socket is up.
pub const DEFAULT_READY_MARKER: &str = "UDP Initialized.";

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("zandronum-server"),
            host_label: String::new(),
            iwad_dir: PathBuf::from("iwads"),
            wad_dir: PathBuf::from("wads"),
            cfg_dir: PathBuf::from("cfgs"),
            actors_file: "skulltag_actors.pk3".to_string(),
            data_file: "skulltag_data.pk3".to_string(),
            ready_marker: DEFAULT_READY_MARKER.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

/// Lifecycle of a hosted instance.
///
/// ```text
/// Starting ──ready line──→ Running ──exit / kill──→ Closed
///     └──────────exit / kill────────────────────────↗
/// ```
///
/// `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Starting,
    Running,
    Closed,
}

impl LifecycleState {
    pub fn is_starting(&self) -> bool {
        matches!(self, Self::Starting)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns `true` until the instance has closed.
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Closed)
    }

    /// Returns `true` if moving to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Starting, Self::Running) | (Self::Starting, Self::Closed) | (Self::Running, Self::Closed)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Why an instance reached [`LifecycleState::Closed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// The process exited before printing the ready marker.
    StartupFailed,
    /// The process exited on its own after becoming ready.
    Stopped,
    /// The process was terminated through [`kill`](crate::ServerHandle::kill).
    Killed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartupFailed => write!(f, "startup failed"),
            Self::Stopped => write!(f, "stopped"),
            Self::Killed => write!(f, "killed"),
        }
    }
}
