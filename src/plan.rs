//! Mount assignments and the order they have to be mounted in.

use std::{collections::BTreeMap, fmt};

use crate::{
    error::InstallerError,
    part::{Partition, Snapshot, Table},
    session::{FstabEntry, Session},
};

/// Mountpoint value meaning "write bootcode to this partition".
pub const BOOTCODE_SENTINEL: &str = "*bootcode";
/// Mountpoint value for swap partitions; not a directory.
pub const SWAP: &str = "swap";

const SUGGESTED_MOUNTS: [&str; 2] = ["/", "/home"];

/// One step of the mount plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub path: String,
    pub partition: String,
}

// ── Paths ─────────────────────────────────────────────────────────────────────

/// Collapses repeated separators and `.` segments. `..` is left for
/// validation to reject.
pub fn normalize(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    let joined = segments.join("/");
    if path.starts_with('/') {
        format!("/{}", joined)
    } else {
        joined
    }
}

fn check_mountpoint(path: &str) -> Result<(), InstallerError> {
    let invalid = |reason| InstallerError::InvalidMountpoint {
        path: path.to_string(),
        reason,
    };
    if path.is_empty() {
        return Err(invalid("empty string"));
    }
    if !path.starts_with('/') {
        return Err(invalid("not an absolute path"));
    }
    if path.contains("/../") || path.ends_with("/..") {
        return Err(invalid("contains a '..' segment"));
    }
    Ok(())
}

fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Length of the common leading run of path segments.
fn shared_components(a: &[&str], b: &[&str]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// `ancestor` has fewer segments and all of them lead `path`.
fn is_strict_ancestor(ancestor: &[&str], path: &[&str]) -> bool {
    ancestor.len() < path.len() && path.starts_with(ancestor)
}

/// Inserts `entry` so that every directory it lives under is mounted first
/// and every mount beneath it comes after.
fn insert_mountpoint(ordered: &mut Vec<MountEntry>, entry: MountEntry) {
    if entry.path == "/" {
        ordered.insert(0, entry);
        return;
    }

    let target = components(&entry.path);
    let mut best: Option<(usize, usize)> = None;
    for (idx, existing) in ordered.iter().enumerate() {
        let shared = shared_components(&components(&existing.path), &target);
        if shared > best.map_or(0, |(_, count)| count) {
            best = Some((idx, shared));
        }
    }

    let at = match best {
        Some((idx, _)) if is_strict_ancestor(&components(&ordered[idx].path), &target) => idx + 1,
        Some((idx, _)) => idx,
        // nothing in common: right after the root, if there is one
        None => usize::from(ordered.first().map_or(false, |e| e.path == "/")),
    };
    ordered.insert(at, entry);
}

/// Checks the fstab and returns its entries in a safe mount order.
///
/// Paths are normalised in place. Swap entries are not mounted and are skipped.
pub fn build_order(fstab: &mut BTreeMap<String, FstabEntry>) -> Result<Vec<MountEntry>, InstallerError> {
    for entry in fstab.values_mut() {
        if entry.mount != SWAP {
            entry.mount = normalize(&entry.mount);
        }
    }

    let mounts: Vec<(&String, &FstabEntry)> = fstab.iter().filter(|(_, e)| e.mount != SWAP).collect();

    let mut seen: Vec<&str> = Vec::new();
    for (_, entry) in &mounts {
        if seen.contains(&entry.mount.as_str()) {
            return Err(InstallerError::DuplicateMount(entry.mount.clone()));
        }
        seen.push(&entry.mount);
    }
    for (_, entry) in &mounts {
        check_mountpoint(&entry.mount)?;
    }

    let mut ordered: Vec<MountEntry> = Vec::new();
    for (partition, entry) in &mounts {
        insert_mountpoint(
            &mut ordered,
            MountEntry {
                path: entry.mount.clone(),
                partition: partition.to_string(),
            },
        );
    }
    Ok(ordered)
}

/// Partitions assigned as swap.
pub fn swap_devices(fstab: &BTreeMap<String, FstabEntry>) -> Vec<String> {
    fstab
        .iter()
        .filter(|(_, e)| e.mount == SWAP)
        .map(|(name, _)| name.clone())
        .collect()
}

// ── Assignments ───────────────────────────────────────────────────────────────

/// Uses `part` at `point`: a directory, `swap`, or the bootcode sentinel.
/// Clearing an assignment is [`unassign`], never an empty `point`.
pub fn assign(
    session: &mut Session,
    snapshot: &Snapshot,
    part: &Partition,
    point: &str,
) -> Result<(), InstallerError> {
    let point = point.trim();

    if point == BOOTCODE_SENTINEL {
        let code = snapshot.owner(part).scheme.partition_bootcode();
        set_bootcode(session, &part.name, code);
        return Ok(());
    }

    let mount = if point == SWAP {
        SWAP.to_string()
    } else {
        let path = normalize(point);
        check_mountpoint(&path)?;
        let taken = session
            .fstab
            .iter()
            .any(|(name, e)| name != &part.name && normalize(&e.mount) == path);
        if taken {
            return Err(InstallerError::DuplicateMount(path));
        }
        path
    };

    session.fstab.insert(part.name.clone(), FstabEntry { mount });
    Ok(())
}

/// Stops using a partition as mountpoint or bootcode target.
pub fn unassign(session: &mut Session, name: &str) {
    session.fstab.remove(name);
    session.bootcode.remove(name);
}

/// Sets or, with `None`/empty, clears the bootcode for a disk or partition.
pub fn set_bootcode(session: &mut Session, name: &str, code: Option<&str>) {
    match code.filter(|c| !c.is_empty()) {
        Some(code) => {
            session.bootcode.insert(name.to_string(), code.to_string());
        }
        None => {
            session.bootcode.remove(name);
        }
    }
}

// ── Usage / suggestions ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Usage {
    Pool(String),
    Mount(String),
    Bootcode(String),
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Usage::Pool(name) => write!(f, "zpool: {}", name),
            Usage::Mount(path) => write!(f, "mountpoint: {}", path),
            Usage::Bootcode(code) => write!(f, "bootcode: {}", code),
        }
    }
}

/// What a device is currently used for, if anything.
pub fn used_as(session: &Session, snapshot: &Snapshot, name: &str) -> Option<Usage> {
    if let Some(pool) = snapshot.pool_of(name) {
        return Some(Usage::Pool(pool.name.clone()));
    }
    if let Some(entry) = session.fstab.get(name) {
        return Some(Usage::Mount(entry.mount.clone()));
    }
    session
        .bootcode
        .get(name)
        .map(|code| Usage::Bootcode(code.clone()))
}

/// Default answer for the "use partition" prompt.
pub fn suggest_mountpoint(session: &Session, part: &Partition) -> String {
    match part.partype.as_str() {
        "freebsd-swap" => return SWAP.to_string(),
        "freebsd-boot" => return BOOTCODE_SENTINEL.to_string(),
        _ => {}
    }

    if let Some(entry) = session.fstab.get(&part.name) {
        return entry.mount.clone();
    }

    let in_use = |path: &str| session.fstab.values().any(|e| e.mount == path);
    if let Some(free) = SUGGESTED_MOUNTS.iter().find(|p| !in_use(p)) {
        return free.to_string();
    }

    // MBR slices are all plain "freebsd"; guess by size
    if part.partype == "freebsd" {
        if part.bytes() <= 8 << 20 {
            return BOOTCODE_SENTINEL.to_string();
        }
        if part.bytes() <= 9 << 30 {
            return SWAP.to_string();
        }
    }

    String::new()
}

pub fn suggest_disk_bootcode(table: &Table) -> Option<&'static str> {
    table.scheme.disk_bootcode()
}

pub fn suggest_part_bootcode(snapshot: &Snapshot, part: &Partition) -> Option<&'static str> {
    snapshot.owner(part).scheme.partition_bootcode()
}
