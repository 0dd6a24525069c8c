use std::fmt;

use crate::geom::Pool;

// ── Scheme ────────────────────────────────────────────────────────────────────

/// Partitioning format of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheme {
    Gpt,
    Mbr,
    Ebr,
    Other(String),
}

impl Scheme {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "GPT" => Scheme::Gpt,
            "MBR" => Scheme::Mbr,
            "EBR" => Scheme::Ebr,
            _ => Scheme::Other(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Scheme::Gpt => "GPT",
            Scheme::Mbr => "MBR",
            Scheme::Ebr => "EBR",
            Scheme::Other(s) => s,
        }
    }

    /// Bootcode written to the disk itself (`gpart bootcode -b`).
    pub fn disk_bootcode(&self) -> Option<&'static str> {
        match self {
            Scheme::Gpt => Some("/boot/pmbr"),
            Scheme::Mbr | Scheme::Ebr => Some("/boot/mbr"),
            Scheme::Other(_) => None,
        }
    }

    /// Bootcode written into a boot partition (`gpart bootcode -p`).
    pub fn partition_bootcode(&self) -> Option<&'static str> {
        match self {
            Scheme::Gpt => Some("/boot/gptboot"),
            Scheme::Mbr | Scheme::Ebr => Some("/boot/boot"),
            Scheme::Other(_) => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Table / Partition ─────────────────────────────────────────────────────────

/// Position of a table inside its `Snapshot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub owner: TableId,
    pub name: String,
    pub sectorsize: u32,
    pub partype: String,
    pub rawtype: Option<String>,
    /// First sector, inclusive.
    pub start: u64,
    /// Last sector, inclusive.
    pub end: u64,
    /// 1-based slot in the table; the key gpart deletes by.
    pub index: u32,
    pub label: Option<String>,
}

impl Partition {
    pub fn sectors(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn bytes(&self) -> u64 {
        self.sectors() * u64::from(self.sectorsize)
    }

    pub fn overlaps(&self, other: &Partition) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// A partition table hosted on a disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub id: TableId,
    pub name: String,
    pub scheme: Scheme,
    /// First addressable sector, inclusive.
    pub first: u64,
    /// Last addressable sector, inclusive.
    pub last: u64,
    /// Byte size of the underlying device.
    pub size: u64,
    pub sectorsize: u32,
    /// Sorted by `start`, never overlapping.
    pub partitions: Vec<Partition>,
}

impl Table {
    pub fn new(id: TableId, name: &str, scheme: Scheme, first: u64, last: u64) -> Self {
        Table {
            id,
            name: name.to_string(),
            scheme,
            first,
            last,
            size: 0,
            sectorsize: 0,
            partitions: Vec::new(),
        }
    }

    /// Inserts a partition while keeping the list sorted by physical position.
    pub fn insert(&mut self, part: Partition) {
        let at = self
            .partitions
            .iter()
            .position(|p| part.start < p.start)
            .unwrap_or(self.partitions.len());
        self.partitions.insert(at, part);
    }

    pub fn partition(&self, name: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.name == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Partition> {
        let at = self.partitions.iter().position(|p| p.name == name)?;
        Some(self.partitions.remove(at))
    }

    /// Gaps between `first`, the partitions and `last`, in sector order.
    pub fn free_regions(&self) -> Vec<FreeRegion> {
        let mut regions = Vec::new();
        let mut sector = self.first;
        for part in &self.partitions {
            if part.start > sector {
                regions.push(FreeRegion {
                    table: self.id,
                    start: sector,
                    length: part.start - sector,
                });
            }
            sector = sector.max(part.end + 1);
        }
        if sector <= self.last {
            regions.push(FreeRegion {
                table: self.id,
                start: sector,
                length: self.last - sector + 1,
            });
        }
        regions
    }
}

/// Unallocated run of sectors inside a table. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeRegion {
    pub table: TableId,
    pub start: u64,
    pub length: u64,
}

impl FreeRegion {
    pub fn end(&self) -> u64 {
        self.start + self.length - 1
    }
}

/// A device with no partition table that is not otherwise in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRef {
    pub name: String,
    pub mediasize: u64,
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// Everything the geometry provider saw in one pass.
/// Tables are an arena: `TableId(n)` is `tables[n]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub tables: Vec<Table>,
    pub unused: Vec<DeviceRef>,
    pub pools: Vec<Pool>,
}

impl Snapshot {
    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.0]
    }

    pub fn table_mut(&mut self, id: TableId) -> &mut Table {
        &mut self.tables[id.0]
    }

    #[cfg(test)]
    pub fn find_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Owning table of a partition.
    pub fn owner(&self, part: &Partition) -> &Table {
        self.table(part.owner)
    }

    pub fn pool_of(&self, device: &str) -> Option<&Pool> {
        self.pools.iter().find(|p| p.contains(device))
    }

    /// Flattened listing for the editor: each table, then its partitions and
    /// gaps in sector order; unused disks last.
    pub fn entries(&self) -> Vec<Entry> {
        let mut entries = Vec::new();
        for table in &self.tables {
            entries.push(Entry::Table(table.id));
            let mut free = table.free_regions().into_iter().peekable();
            for part in &table.partitions {
                while let Some(region) = free.next_if(|r| r.start < part.start) {
                    entries.push(Entry::Free(region));
                }
                entries.push(Entry::Partition {
                    table: table.id,
                    name: part.name.clone(),
                });
            }
            entries.extend(free.map(Entry::Free));
        }
        entries.extend(self.unused.iter().cloned().map(Entry::Disk));
        entries
    }
}

// ── Editor entries ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Table(TableId),
    Partition { table: TableId, name: String },
    Free(FreeRegion),
    Disk(DeviceRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    DestroyTable,
    TableBootcode,
    Use,
    Unuse,
    DeletePartition,
    PartitionBootcode,
    CreatePartition,
    SetupTable,
}

impl Entry {
    /// Actions offered for this kind of entry; the first is the default.
    pub fn actions(&self) -> &'static [Action] {
        match self {
            Entry::Table(_) => &[Action::DestroyTable, Action::TableBootcode],
            Entry::Partition { .. } => &[
                Action::Use,
                Action::Unuse,
                Action::DeletePartition,
                Action::PartitionBootcode,
            ],
            Entry::Free(_) => &[Action::CreatePartition],
            Entry::Disk(_) => &[Action::SetupTable],
        }
    }
}

impl Action {
    pub fn label(self) -> &'static str {
        match self {
            Action::DestroyTable => "Destroy Partition Table",
            Action::TableBootcode => "Choose Bootcode",
            Action::Use => "Use",
            Action::Unuse => "Don't use",
            Action::DeletePartition => "Delete Partition",
            Action::PartitionBootcode => "Choose Bootcode",
            Action::CreatePartition => "Create Partition",
            Action::SetupTable => "Setup Partition Table",
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn part(owner: TableId, index: u32, start: u64, end: u64) -> Partition {
        Partition {
            owner,
            name: format!("ada0p{}", index),
            sectorsize: 512,
            partype: "freebsd-ufs".to_string(),
            rawtype: None,
            start,
            end,
            index,
            label: None,
        }
    }

    pub(crate) fn table() -> Table {
        let mut t = Table::new(TableId(0), "ada0", Scheme::Gpt, 40, 41943006);
        t.sectorsize = 512;
        t.size = 21474836480;
        t
    }

    #[test]
    fn insert_keeps_partitions_sorted() {
        let mut t = table();
        t.insert(part(t.id, 3, 5000, 5999));
        t.insert(part(t.id, 1, 40, 1063));
        t.insert(part(t.id, 2, 1064, 4999));
        let starts: Vec<u64> = t.partitions.iter().map(|p| p.start).collect();
        assert_eq!(starts, vec![40, 1064, 5000]);
        for pair in t.partitions.windows(2) {
            assert!(!pair[0].overlaps(&pair[1]));
        }
    }

    #[test]
    fn partition_bytes_are_derived_from_sectors() {
        let p = part(TableId(0), 1, 40, 1063);
        assert_eq!(p.sectors(), 1024);
        assert_eq!(p.bytes(), 524288);
    }

    #[test]
    fn free_regions_of_empty_table_span_everything() {
        let t = table();
        let free = t.free_regions();
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].start, 40);
        assert_eq!(free[0].end(), 41943006);
    }

    #[test]
    fn free_regions_and_partitions_tile_the_table() {
        let mut t = table();
        t.insert(part(t.id, 1, 40, 1063));
        t.insert(part(t.id, 2, 2048, 4095));
        t.insert(part(t.id, 3, 4096, 8191));
        t.insert(part(t.id, 4, 10000, 41943006));

        let mut ranges: Vec<(u64, u64)> = t.partitions.iter().map(|p| (p.start, p.end)).collect();
        ranges.extend(t.free_regions().iter().map(|r| (r.start, r.end())));
        ranges.sort();

        let mut next = t.first;
        for (start, end) in ranges {
            assert_eq!(start, next, "gap or overlap before sector {}", start);
            next = end + 1;
        }
        assert_eq!(next, t.last + 1);
    }

    #[test]
    fn full_table_has_no_free_region() {
        let mut t = table();
        t.insert(part(t.id, 1, 40, 41943006));
        assert!(t.free_regions().is_empty());
    }

    #[test]
    fn entries_interleave_free_space_in_sector_order() {
        let mut t = table();
        t.insert(part(t.id, 1, 2048, 4095));
        let snap = Snapshot {
            tables: vec![t],
            unused: vec![DeviceRef {
                name: "ada1".to_string(),
                mediasize: 1 << 30,
            }],
            pools: Vec::new(),
        };

        let entries = snap.entries();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0], Entry::Table(TableId(0)));
        assert!(matches!(entries[1], Entry::Free(r) if r.start == 40 && r.length == 2008));
        assert!(matches!(&entries[2], Entry::Partition { name, .. } if name == "ada0p1"));
        assert!(matches!(entries[3], Entry::Free(r) if r.start == 4096));
        assert!(matches!(&entries[4], Entry::Disk(d) if d.name == "ada1"));
    }

    #[test]
    fn each_entry_kind_has_fixed_actions() {
        assert_eq!(Entry::Table(TableId(0)).actions()[0], Action::DestroyTable);
        let free = Entry::Free(FreeRegion {
            table: TableId(0),
            start: 0,
            length: 1,
        });
        assert_eq!(free.actions(), &[Action::CreatePartition]);
        let p = Entry::Partition {
            table: TableId(0),
            name: "ada0p1".into(),
        };
        assert!(p.actions().contains(&Action::DeletePartition));
    }

    #[test]
    fn scheme_names_and_bootcode() {
        assert_eq!(Scheme::from_name("gpt"), Scheme::Gpt);
        assert_eq!(Scheme::from_name("BSD"), Scheme::Other("BSD".into()));
        assert_eq!(Scheme::Gpt.disk_bootcode(), Some("/boot/pmbr"));
        assert_eq!(Scheme::Ebr.partition_bootcode(), Some("/boot/boot"));
        assert_eq!(Scheme::Other("BSD".into()).disk_bootcode(), None);
    }
}
