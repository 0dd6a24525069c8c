use tracing::{debug, info, warn};

use crate::{
    error::InstallerError,
    geom::{GeomControl, PartRequest, PartVerb},
};

use super::model::{Scheme, Table};

// ── Type normalisation ────────────────────────────────────────────────────────

/// Maps a logical partition type onto what the scheme stores on disk.
///
/// Returns `None` when the text cannot name a gpart type at all.
pub fn normalize_type(scheme: &Scheme, ty: &str) -> Option<String> {
    let ty = ty.trim().to_ascii_lowercase();
    if ty.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return None;
    }

    let mapped = match scheme {
        Scheme::Gpt if ty.is_empty() || ty == "freebsd" => "freebsd-ufs",
        Scheme::Gpt if ty == "swap" => "freebsd-swap",
        Scheme::Mbr | Scheme::Ebr
            if ty.is_empty() || ty == "swap" || ty.starts_with("freebsd-") =>
        {
            "freebsd"
        }
        _ => return Some(ty),
    };
    Some(mapped.to_string())
}

// ── Uncommitted set ───────────────────────────────────────────────────────────

/// Targets with staged gpart changes, in the order they were first touched.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Uncommitted {
    names: Vec<String>,
}

impl Uncommitted {
    pub fn insert(&mut self, name: &str) {
        if !self.contains(name) {
            self.names.push(name.to_string());
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.names.retain(|n| n != name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Issues staged partitioning commands and tracks what still needs a commit.
///
/// Dropping an engine with pending changes undoes them, so a session that ends
/// by error or panic leaves the disks as it found them. Call [`Engine::commit_all`]
/// to keep the changes.
pub struct Engine<C: GeomControl> {
    control: C,
    pending: Uncommitted,
}

impl<C: GeomControl> Engine<C> {
    pub fn new(control: C) -> Self {
        Engine {
            control,
            pending: Uncommitted::default(),
        }
    }

    pub fn pending(&self) -> &Uncommitted {
        &self.pending
    }

    fn stage(&mut self, request: PartRequest) -> Result<(), InstallerError> {
        self.control.issue(&request)?;
        debug!("staged {} on {}", request.verb, request.target);
        self.pending.insert(&request.target);
        Ok(())
    }

    /// Creates a partition table with `scheme` on a bare device.
    pub fn create_table(&mut self, device: &str, scheme: &Scheme) -> Result<(), InstallerError> {
        self.stage(PartRequest::new(PartVerb::Create, device).param("scheme", scheme))
    }

    /// Destroys an empty partition table.
    pub fn destroy_table(&mut self, table: &Table) -> Result<(), InstallerError> {
        if !table.partitions.is_empty() {
            return Err(InstallerError::NonEmptyTable);
        }
        self.stage(PartRequest::new(PartVerb::Destroy, &table.name))
    }

    /// Adds a partition. Byte offsets are converted to sectors and the size is
    /// cut back so the partition never runs past `table.last`.
    ///
    /// The table itself is left untouched; reload the snapshot afterwards.
    pub fn create_partition(
        &mut self,
        table: &Table,
        label: &str,
        start_bytes: u64,
        size_bytes: u64,
        ty: &str,
    ) -> Result<(), InstallerError> {
        let mut request = PartRequest::new(PartVerb::Add, &table.name);
        if !label.is_empty() {
            request = request.param("label", label);
        }
        if !ty.is_empty() {
            let known =
                normalize_type(&table.scheme, ty).ok_or_else(|| InstallerError::InvalidType(ty.to_string()))?;
            request = request.param("type", known);
        }

        let (start, size) = sector_range(table, start_bytes, size_bytes)?;
        request = request.param("start", start).param("size", size);

        self.stage(request)
    }

    /// Deletes a partition by its slot index and drops it from `table`.
    pub fn delete_partition(&mut self, table: &mut Table, name: &str) -> Result<(), InstallerError> {
        let Some(index) = table.partition(name).map(|p| p.index) else {
            warn!("delete of unknown partition {} on {}", name, table.name);
            return Ok(());
        };

        self.stage(PartRequest::new(PartVerb::Delete, &table.name).param("index", index))?;
        table.remove(name);
        Ok(())
    }

    /// Makes the staged changes on `name` permanent.
    pub fn commit(&mut self, name: &str) -> Result<(), InstallerError> {
        self.finish(PartVerb::Commit, name)
    }

    /// Reverts the staged changes on `name`.
    pub fn undo(&mut self, name: &str) -> Result<(), InstallerError> {
        self.finish(PartVerb::Undo, name)
    }

    fn finish(&mut self, verb: PartVerb, name: &str) -> Result<(), InstallerError> {
        if !self.pending.contains(name) {
            return Ok(());
        }
        self.control.issue(&PartRequest::new(verb, name))?;
        info!("{} {}", verb, name);
        self.pending.remove(name);
        Ok(())
    }

    pub fn commit_all(&mut self) -> Result<(), InstallerError> {
        self.finish_all(PartVerb::Commit)
    }

    pub fn undo_all(&mut self) -> Result<(), InstallerError> {
        self.finish_all(PartVerb::Undo)
    }

    /// Runs `verb` over every pending target. A failing target stays pending and
    /// the first failure is returned once all targets were tried.
    fn finish_all(&mut self, verb: PartVerb) -> Result<(), InstallerError> {
        let mut first_err = None;
        for name in self.pending.names().to_vec() {
            if let Err(e) = self.finish(verb, &name) {
                warn!("{} {} failed: {}", verb, name, e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<C: GeomControl> Drop for Engine<C> {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        warn!(
            "rolling back uncommitted changes on {}",
            self.pending.names().join(", ")
        );
        if let Err(e) = self.undo_all() {
            warn!("rollback incomplete: {}", e);
        }
    }
}

/// Converts a byte range into `(start, size)` sectors inside `table`.
///
/// The size is rounded up by one sector to cover the truncated remainder, then
/// clamped to end exactly at `table.last`.
fn sector_range(table: &Table, start_bytes: u64, size_bytes: u64) -> Result<(u64, u64), InstallerError> {
    if table.sectorsize == 0 {
        return Err(InstallerError::UnknownGeometry(table.name.clone()));
    }
    let sectorsize = u64::from(table.sectorsize);

    let start = (start_bytes / sectorsize).max(table.first);
    if start > table.last {
        return Err(InstallerError::OutOfRange {
            start,
            last: table.last,
        });
    }

    let mut size = size_bytes / sectorsize + 1;
    if start + size > table.last {
        size = table.last - start + 1;
    }
    Ok((start, size))
}
