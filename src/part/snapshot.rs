use tracing::{debug, warn};

use crate::{
    error::InstallerError,
    geom::{
        mesh::{Geom, GeomClass, Provider},
        Mesh, Topology, ZfsQuery,
    },
};

use super::model::{DeviceRef, Partition, Scheme, Snapshot, Table, TableId};

/// Reads the current disk layout: partition tables, unused devices and pools.
///
/// Safe to call repeatedly; the editor calls it after every mutation. A missing
/// topology is fatal to the call, a missing ZFS subsystem only means no pools.
pub fn load(topology: &dyn Topology, zfs: &dyn ZfsQuery) -> Result<Snapshot, InstallerError> {
    let pools = zfs.pools().unwrap_or_else(|e| {
        warn!("zpool query failed, reporting no pools: {}", e);
        Vec::new()
    });

    let mesh = topology.mesh()?;
    let mut snapshot = from_mesh(&mesh);
    snapshot.pools = pools;

    // pool members are in use even when they carry no partition table
    let pools = &snapshot.pools;
    snapshot
        .unused
        .retain(|d| !pools.iter().any(|p| p.contains(&d.name)));

    debug!(
        "snapshot: {} table(s), {} unused device(s), {} pool(s)",
        snapshot.tables.len(),
        snapshot.unused.len(),
        snapshot.pools.len()
    );
    Ok(snapshot)
}

/// Builds tables and the unused-device list from a topology tree.
pub fn from_mesh(mesh: &Mesh) -> Snapshot {
    let mut snapshot = Snapshot::default();
    let mut used: Vec<String> = Vec::new();

    if let Some(part) = mesh.find_class("PART") {
        for geom in &part.geoms {
            used.push(geom.name.clone());
            let id = TableId(snapshot.tables.len());
            snapshot.tables.push(table_from_geom(id, geom));
        }
    }

    // RAID members and ELI-backed devices are consumed by their aggregate
    for class in &mesh.classes {
        load_class_used(class, &mut used);
    }

    for class in &mesh.classes {
        if class.name == "PART" {
            continue;
        }
        load_class_unused(class, &used, &mut snapshot.unused);
    }

    snapshot
}

fn table_from_geom(id: TableId, geom: &Geom) -> Table {
    let number = |key: &str| geom.attr(key).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);

    let scheme = Scheme::from_name(geom.attr("scheme").unwrap_or(""));
    let mut table = Table::new(id, &geom.name, scheme, number("first"), number("last"));

    if let Some(consumer) = geom.consumers.first() {
        table.size = consumer.mediasize;
        table.sectorsize = consumer.sectorsize;
    }

    for provider in &geom.providers {
        match partition_from_provider(id, provider) {
            Some(part) if table.partitions.iter().any(|p| p.overlaps(&part)) => {
                warn!("skipping {}: overlaps another partition", provider.name)
            }
            Some(part) => table.insert(part),
            None => warn!(
                "skipping {}: missing start/end/index attributes",
                provider.name
            ),
        }
    }
    table
}

fn partition_from_provider(owner: TableId, provider: &Provider) -> Option<Partition> {
    let number = |key: &str| provider.attr(key).and_then(|v| v.parse::<u64>().ok());
    let text = |key: &str| {
        provider
            .attr(key)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let start = number("start")?;
    let end = number("end")?;
    if end < start {
        return None;
    }

    Some(Partition {
        owner,
        name: provider.name.clone(),
        sectorsize: provider.sectorsize,
        partype: text("type").unwrap_or_default(),
        rawtype: text("rawtype"),
        start,
        end,
        index: u32::try_from(number("index")?).ok()?,
        label: text("label"),
    })
}

fn load_class_used(class: &GeomClass, used: &mut Vec<String>) {
    if class.name != "ELI" && !class.name.starts_with("RAID") {
        return;
    }
    for geom in &class.geoms {
        for consumer in &geom.consumers {
            used.push(consumer.name.clone());
        }
    }
}

/// Adds every provider nobody claimed yet. CD drives and anything with a slash
/// in its name (labels, partitions exposed by other classes) are masked.
fn load_class_unused(class: &GeomClass, used: &[String], unused: &mut Vec<DeviceRef>) {
    for geom in &class.geoms {
        for provider in &geom.providers {
            let name = &provider.name;
            if name.starts_with("cd") || name.contains('/') {
                continue;
            }
            if used.contains(name) || unused.iter().any(|d| &d.name == name) {
                continue;
            }
            unused.push(DeviceRef {
                name: name.clone(),
                mediasize: provider.mediasize,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{
        mesh::{parse_geom_list, tests as fixtures, GeomClass},
        Pool,
    };

    struct FixedTopology(Option<Mesh>);

    impl Topology for FixedTopology {
        fn mesh(&self) -> Result<Mesh, InstallerError> {
            self.0
                .clone()
                .ok_or_else(|| InstallerError::ProviderUnavailable("no geom".into()))
        }
    }

    struct FixedPools(Option<Vec<Pool>>);

    impl ZfsQuery for FixedPools {
        fn pools(&self) -> Result<Vec<Pool>, InstallerError> {
            self.0
                .clone()
                .ok_or_else(|| InstallerError::CommandNotFound("zpool".into()))
        }
    }

    fn class(name: &str, listing: &str) -> GeomClass {
        GeomClass {
            name: name.to_string(),
            geoms: parse_geom_list(listing),
        }
    }

    fn mesh() -> Mesh {
        Mesh {
            classes: vec![
                class("DISK", fixtures::DISK_LIST),
                class("PART", fixtures::PART_LIST),
                class("ELI", fixtures::ELI_LIST),
                class("LABEL", fixtures::LABEL_LIST),
            ],
        }
    }

    #[test]
    fn tables_come_from_part_class() {
        let snap = from_mesh(&mesh());
        assert_eq!(snap.tables.len(), 2);

        let ada0 = &snap.tables[0];
        assert_eq!(ada0.id, TableId(0));
        assert_eq!(ada0.scheme, Scheme::Gpt);
        assert_eq!((ada0.first, ada0.last), (40, 41943006));
        assert_eq!(ada0.size, 21474836480);
        assert_eq!(ada0.sectorsize, 512);

        let da0 = snap.find_table("da0").unwrap();
        assert_eq!(da0.scheme, Scheme::Mbr);
        assert!(da0.partitions.is_empty());
    }

    #[test]
    fn partitions_are_sorted_and_typed() {
        let snap = from_mesh(&mesh());
        let ada0 = &snap.tables[0];
        let names: Vec<&str> = ada0.partitions.iter().map(|p| p.name.as_str()).collect();
        // listed p1, p3, p2 by geom; stored by start sector
        assert_eq!(names, vec!["ada0p1", "ada0p2", "ada0p3"]);

        let p1 = &ada0.partitions[0];
        assert_eq!(p1.partype, "freebsd-boot");
        assert_eq!(p1.label.as_deref(), Some("gptboot0"));
        assert_eq!(p1.index, 1);
        assert_eq!(p1.owner, ada0.id);
        assert_eq!(snap.owner(p1).name, "ada0");

        // empty label attribute reads as no label
        assert_eq!(ada0.partitions[2].label, None);

        for pair in ada0.partitions.windows(2) {
            assert!(pair[0].start < pair[1].start);
            assert!(!pair[0].overlaps(&pair[1]));
        }
    }

    #[test]
    fn overlapping_records_are_dropped() {
        let listing = "\
Geom name: ada1
first: 40
last: 20971486
scheme: GPT
Providers:
1. Name: ada1p1
   Sectorsize: 4096
   start: 40
   end: 1063
   index: 1
   type: freebsd-ufs
2. Name: ada1p2
   Sectorsize: 4096
   start: 1000
   end: 2000
   index: 2
   type: freebsd-ufs
";
        let snap = from_mesh(&Mesh {
            classes: vec![class("PART", listing)],
        });
        let names: Vec<&str> = snap.tables[0].partitions.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["ada1p1"]);
    }

    #[test]
    fn unused_excludes_tables_aggregates_cds_and_labels() {
        let snap = from_mesh(&mesh());
        let names: Vec<&str> = snap.unused.iter().map(|d| d.name.as_str()).collect();
        // ada0/da0 hold tables, ada2 backs an ELI volume, cd0 is masked,
        // gpt/gptboot0 has a slash; ada2.eli itself is free for use
        assert_eq!(names, vec!["ada1", "ada3", "ada2.eli"]);
        assert_eq!(snap.unused[0].mediasize, 10737418240);
    }

    #[test]
    fn pool_members_are_not_unused() {
        let topo = FixedTopology(Some(mesh()));
        let zfs = FixedPools(Some(vec![Pool {
            name: "tank".into(),
            children: vec!["ada3".into()],
        }]));
        let snap = load(&topo, &zfs).unwrap();
        assert!(snap.unused.iter().all(|d| d.name != "ada3"));
        assert_eq!(snap.pool_of("ada3").map(|p| p.name.as_str()), Some("tank"));
    }

    #[test]
    fn zfs_failure_degrades_to_no_pools() {
        let topo = FixedTopology(Some(mesh()));
        let snap = load(&topo, &FixedPools(None)).unwrap();
        assert!(snap.pools.is_empty());
        assert_eq!(snap.tables.len(), 2);
    }

    #[test]
    fn missing_topology_is_provider_unavailable() {
        let err = load(&FixedTopology(None), &FixedPools(Some(vec![]))).unwrap_err();
        assert!(matches!(err, InstallerError::ProviderUnavailable(_)));
    }

    #[test]
    fn repeated_loads_are_identical() {
        let topo = FixedTopology(Some(mesh()));
        let zfs = FixedPools(Some(vec![]));
        assert_eq!(load(&topo, &zfs).unwrap(), load(&topo, &zfs).unwrap());
    }
}
