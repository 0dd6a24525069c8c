use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::Write,
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::InstallerError;

pub const DEFAULT_STATE_FILE: &str = "/tmp/absd-installer.json";
pub const DEFAULT_MOUNTPOINT: &str = "/mnt";

// ── Session state ─────────────────────────────────────────────────────────────

/// One fstab line in the making: where a partition gets mounted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FstabEntry {
    pub mount: String,
}

/// Everything the provisioning phase needs from the interactive phase.
/// Stored as JSON with sorted keys so consecutive saves diff cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    /// Disk or partition name → bootcode image.
    pub bootcode: BTreeMap<String, String>,
    /// Installation stages already completed.
    pub done: BTreeSet<String>,
    pub extra_packages: Vec<String>,
    /// Partition name → mount assignment.
    pub fstab: BTreeMap<String, FstabEntry>,
    /// Root the target system is assembled under.
    pub mountpoint: String,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            bootcode: BTreeMap::new(),
            done: BTreeSet::new(),
            extra_packages: Vec::new(),
            fstab: BTreeMap::new(),
            mountpoint: DEFAULT_MOUNTPOINT.to_string(),
        }
    }
}

impl Session {
    // ── Persistence ───────────────────────────────────────────────────────────

    /// Reads a saved session. A file that is missing or unreadable yields the
    /// defaults; one that exists but does not parse is `PersistStoreCorrupt`.
    pub fn load(path: &Path) -> Result<Self, InstallerError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                debug!("no session at {}: {}", path.display(), e);
                return Ok(Session::default());
            }
        };

        serde_json::from_str(&content).map_err(|source| InstallerError::PersistStoreCorrupt {
            path: path.display().to_string(),
            source,
        })
    }

    /// Writes the session with four-space indentation and a trailing newline.
    pub fn save(&self, path: &Path) -> Result<(), InstallerError> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser).map_err(std::io::Error::from)?;
        out.push(b'\n');

        let mut f = fs::File::create(path)?;
        f.write_all(&out)?;
        debug!("session saved to {}", path.display());
        Ok(())
    }

    // ── Stage markers ─────────────────────────────────────────────────────────

    pub fn is_done(&self, stage: &str) -> bool {
        self.done.contains(stage)
    }

    pub fn mark_done(&mut self, stage: &str) {
        self.done.insert(stage.to_string());
    }
}
