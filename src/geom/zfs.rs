use tracing::debug;

use crate::{cmd, error::InstallerError};

/// A ZFS pool together with every vdev beneath it, flattened depth-first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub name: String,
    pub children: Vec<String>,
}

impl Pool {
    pub fn contains(&self, device: &str) -> bool {
        self.children.iter().any(|c| c == device)
    }
}

/// Read-only access to pool state.
pub trait ZfsQuery {
    fn pools(&self) -> Result<Vec<Pool>, InstallerError>;
}

impl<T: ZfsQuery + ?Sized> ZfsQuery for &T {
    fn pools(&self) -> Result<Vec<Pool>, InstallerError> {
        (**self).pools()
    }
}

/// Reads pools through `zpool list`, one listing per pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct Zpool;

impl ZfsQuery for Zpool {
    fn pools(&self) -> Result<Vec<Pool>, InstallerError> {
        read_pools(cmd::run_capture)
    }
}

/// Lists pool names, then each pool's vdev tree on its own so that a pool
/// named like a grouping row (`cache`, `logs`…) cannot be mistaken for one.
fn read_pools<F>(capture: F) -> Result<Vec<Pool>, InstallerError>
where
    F: Fn(&str, &[&str]) -> Result<String, InstallerError>,
{
    let names = capture("zpool", &["list", "-H", "-o", "name"])?;

    let mut pools = Vec::new();
    for name in names.lines().map(str::trim).filter(|n| !n.is_empty()) {
        let listing = capture("zpool", &["list", "-vH", name])?;
        pools.push(parse_pool(name, &listing));
    }
    debug!("{} zpool(s) found", pools.len());
    Ok(pools)
}

// ── zpool list -vH <pool> parser ──────────────────────────────────────────────
//
//   tank	19.5G	1.2M	19.5G	-	-	0%	0%	1.00x	ONLINE	-
//   	mirror-0	19.5G	1.2M	19.5G	-	-	0%	0%	-	ONLINE
//   	  ada1p1	-	-	-	-	-	-	-	-	ONLINE
//   logs	-	-	-	-	-	-	-	-	-
//   	ada3p1	1G	0	1G	-	-	0%	0%	-	ONLINE
//
// The first row is the pool itself. Later flush-left rows group vdevs
// (logs, cache, spares…) and name no device.

pub fn parse_pool(name: &str, listing: &str) -> Pool {
    let children = listing
        .lines()
        .skip(1)
        .filter(|line| line.starts_with(char::is_whitespace))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect();

    Pool {
        name: name.to_string(),
        children,
    }
}
