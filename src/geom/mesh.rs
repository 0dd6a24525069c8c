use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::{cmd, error::InstallerError};

// ── Data types ────────────────────────────────────────────────────────────────

/// Free-form `key: value` attributes attached to a geom, provider or consumer.
pub type Attrs = BTreeMap<String, String>;

/// A device exposed by a geom (a disk, a partition, a decrypted volume…).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provider {
    pub name: String,
    pub mediasize: u64,
    pub sectorsize: u32,
    pub attrs: Attrs,
}

/// The attachment of a geom to the provider it sits on.
/// `name` is the name of that underlying provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Consumer {
    pub name: String,
    pub mediasize: u64,
    pub sectorsize: u32,
    pub attrs: Attrs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Geom {
    pub name: String,
    pub attrs: Attrs,
    pub providers: Vec<Provider>,
    pub consumers: Vec<Consumer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeomClass {
    pub name: String,
    pub geoms: Vec<Geom>,
}

/// The whole device tree as seen at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mesh {
    pub classes: Vec<GeomClass>,
}

impl Mesh {
    pub fn find_class(&self, name: &str) -> Option<&GeomClass> {
        self.classes.iter().find(|c| c.name == name)
    }
}

fn attr<'a>(attrs: &'a Attrs, key: &str) -> Option<&'a str> {
    attrs.get(key).map(String::as_str)
}

impl Geom {
    pub fn attr(&self, key: &str) -> Option<&str> {
        attr(&self.attrs, key)
    }
}

impl Provider {
    pub fn attr(&self, key: &str) -> Option<&str> {
        attr(&self.attrs, key)
    }
}

// ── Query interface ───────────────────────────────────────────────────────────

/// Read access to the device topology.
pub trait Topology {
    /// Returns the full tree, or `ProviderUnavailable` when it cannot be read.
    fn mesh(&self) -> Result<Mesh, InstallerError>;
}

impl<T: Topology + ?Sized> Topology for &T {
    fn mesh(&self) -> Result<Mesh, InstallerError> {
        (**self).mesh()
    }
}

/// Reads the live topology through `sysctl kern.geom.conftxt` and `geom <class> list`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTopology;

impl Topology for SystemTopology {
    fn mesh(&self) -> Result<Mesh, InstallerError> {
        read_mesh(cmd::run_capture)
    }
}

/// Builds the tree from whatever `capture` returns for the sysctl and per-class
/// `geom` queries.
fn read_mesh<F>(capture: F) -> Result<Mesh, InstallerError>
where
    F: Fn(&str, &[&str]) -> Result<String, InstallerError>,
{
    let conftxt = capture("sysctl", &["-n", "kern.geom.conftxt"]).map_err(|e| match e {
        InstallerError::Interrupted => e,
        e => InstallerError::ProviderUnavailable(e.to_string()),
    })?;

    let mut mesh = Mesh::default();
    for name in class_names(&conftxt) {
        // classes such as ZFS::VDEV have no `geom` front end
        let listing = match capture("geom", &[&name.to_lowercase(), "list"]) {
            Ok(listing) => listing,
            Err(InstallerError::Interrupted) => return Err(InstallerError::Interrupted),
            Err(e) => {
                warn!("skipping geom class {}: {}", name, e);
                continue;
            }
        };
        let geoms = parse_geom_list(&listing);
        debug!("geom class {}: {} geom(s)", name, geoms.len());
        mesh.classes.push(GeomClass { name, geoms });
    }
    Ok(mesh)
}

// ── kern.geom.conftxt parser ──────────────────────────────────────────────────
//
// Each line looks like:   1 PART ada0p1 524288 512 i 1 o 20480 ty freebsd-boot

fn class_names(conftxt: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in conftxt.lines() {
        let Some(class) = line.split_whitespace().nth(1) else { continue };
        if !names.iter().any(|n| n == class) {
            names.push(class.to_string());
        }
    }
    names
}

// ── geom <class> list parser ──────────────────────────────────────────────────
//
//   Geom name: ada0
//   scheme: GPT
//   Providers:
//   1. Name: ada0p1
//      Mediasize: 524288 (512K)
//      type: freebsd-boot
//   Consumers:
//   1. Name: ada0
//      Mediasize: 21474836480 (20G)

#[derive(Clone, Copy)]
enum Section {
    Geom,
    Providers,
    Consumers,
}

/// Parses the textual listing of one geom class into its geoms.
pub fn parse_geom_list(text: &str) -> Vec<Geom> {
    let mut geoms: Vec<Geom> = Vec::new();
    let mut section = Section::Geom;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(name) = line.strip_prefix("Geom name:") {
            geoms.push(Geom {
                name: name.trim().to_string(),
                ..Geom::default()
            });
            section = Section::Geom;
            continue;
        }

        let Some(geom) = geoms.last_mut() else { continue };

        match line {
            "Providers:" => {
                section = Section::Providers;
                continue;
            }
            "Consumers:" => {
                section = Section::Consumers;
                continue;
            }
            _ => {}
        }

        if let Some(name) = entry_name(line) {
            match section {
                Section::Providers => geom.providers.push(Provider {
                    name,
                    ..Provider::default()
                }),
                Section::Consumers => geom.consumers.push(Consumer {
                    name,
                    ..Consumer::default()
                }),
                Section::Geom => {}
            }
            continue;
        }

        let Some((key, value)) = line.split_once(':') else { continue };
        let (key, value) = (key.trim(), value.trim());

        match section {
            Section::Geom => {
                geom.attrs.insert(key.to_string(), value.to_string());
            }
            Section::Providers => {
                if let Some(p) = geom.providers.last_mut() {
                    apply_field(&mut p.mediasize, &mut p.sectorsize, &mut p.attrs, key, value);
                }
            }
            Section::Consumers => {
                if let Some(c) = geom.consumers.last_mut() {
                    apply_field(&mut c.mediasize, &mut c.sectorsize, &mut c.attrs, key, value);
                }
            }
        }
    }

    geoms
}

/// Recognises `N. Name: foo` entry headers.
fn entry_name(line: &str) -> Option<String> {
    let (num, rest) = line.split_once(". Name:")?;
    if num.is_empty() || !num.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(rest.trim().to_string())
}

fn apply_field(mediasize: &mut u64, sectorsize: &mut u32, attrs: &mut Attrs, key: &str, value: &str) {
    // "Mediasize: 524288 (512K)" carries a human-readable echo after the number.
    let number = value.split_whitespace().next().unwrap_or("");
    match key {
        "Mediasize" => *mediasize = number.parse().unwrap_or(0),
        "Sectorsize" => *sectorsize = number.parse().unwrap_or(0),
        _ => {
            attrs.insert(key.to_string(), value.to_string());
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const PART_LIST: &str = "\
Geom name: ada0
modified: false
state: OK
fwheads: 16
fwsectors: 63
last: 41943006
first: 40
entries: 128
scheme: GPT
Providers:
1. Name: ada0p1
   Mediasize: 524288 (512K)
   Sectorsize: 512
   Stripesize: 0
   Stripeoffset: 20480
   Mode: r0w0e0
   efimedia: HD(1,GPT,5f3e1c2a-0000-11ee-8a3e-080027a1b2c3,0x28,0x400)
   rawuuid: 5f3e1c2a-0000-11ee-8a3e-080027a1b2c3
   rawtype: 83bd6b9d-7f41-11dc-be0b-001560b84f0f
   label: gptboot0
   length: 524288
   offset: 20480
   type: freebsd-boot
   index: 1
   end: 1063
   start: 40
2. Name: ada0p3
   Mediasize: 2147483648 (2.0G)
   Sectorsize: 512
   Mode: r0w0e0
   rawtype: 516e7cb5-6ecf-11d6-8ff8-00022d09712b
   label:
   type: freebsd-swap
   index: 3
   end: 5195815
   start: 1001512
2. Name: ada0p2
   Mediasize: 512000000 (488M)
   Sectorsize: 512
   Mode: r0w0e0
   rawtype: 516e7cb6-6ecf-11d6-8ff8-00022d09712b
   type: freebsd-ufs
   index: 2
   end: 1001063
   start: 1064
Consumers:
1. Name: ada0
   Mediasize: 21474836480 (20G)
   Sectorsize: 512
   Mode: r0w0e0

Geom name: da0
modified: true
last: 2097151
first: 1
scheme: MBR
Consumers:
1. Name: da0
   Mediasize: 1073741824 (1.0G)
   Sectorsize: 512
   Mode: r0w0e0
";

    pub(crate) const DISK_LIST: &str = "\
Geom name: ada0
Providers:
1. Name: ada0
   Mediasize: 21474836480 (20G)
   Sectorsize: 512
   Mode: r0w0e0
   descr: VBOX HARDDISK
   ident: VB1234
   fwsectors: 63
   fwheads: 16

Geom name: ada1
Providers:
1. Name: ada1
   Mediasize: 10737418240 (10G)
   Sectorsize: 4096
   Mode: r0w0e0

Geom name: da0
Providers:
1. Name: da0
   Mediasize: 1073741824 (1.0G)
   Sectorsize: 512

Geom name: ada2
Providers:
1. Name: ada2
   Mediasize: 10737418240 (10G)
   Sectorsize: 512

Geom name: ada3
Providers:
1. Name: ada3
   Mediasize: 10737418240 (10G)
   Sectorsize: 512

Geom name: cd0
Providers:
1. Name: cd0
   Mediasize: 0 (0B)
   Sectorsize: 2048
";

    pub(crate) const ELI_LIST: &str = "\
Geom name: ada2.eli
State: ACTIVE
EncryptionAlgorithm: AES-XTS
Providers:
1. Name: ada2.eli
   Mediasize: 10737414144 (10G)
   Sectorsize: 4096
Consumers:
1. Name: ada2
   Mediasize: 10737418240 (10G)
   Sectorsize: 512
";

    pub(crate) const LABEL_LIST: &str = "\
Geom name: ada0p1
Providers:
1. Name: gpt/gptboot0
   Mediasize: 524288 (512K)
   Sectorsize: 512
Consumers:
1. Name: ada0p1
   Mediasize: 524288 (512K)
   Sectorsize: 512
";

    #[test]
    fn parses_geoms_providers_and_consumers() {
        let geoms = parse_geom_list(PART_LIST);
        assert_eq!(geoms.len(), 2);

        let ada0 = &geoms[0];
        assert_eq!(ada0.name, "ada0");
        assert_eq!(ada0.attr("scheme"), Some("GPT"));
        assert_eq!(ada0.attr("first"), Some("40"));
        assert_eq!(ada0.providers.len(), 3);
        assert_eq!(ada0.consumers.len(), 1);

        let p1 = &ada0.providers[0];
        assert_eq!(p1.name, "ada0p1");
        assert_eq!(p1.mediasize, 524288);
        assert_eq!(p1.sectorsize, 512);
        assert_eq!(p1.attr("type"), Some("freebsd-boot"));
        assert_eq!(p1.attr("label"), Some("gptboot0"));
        // values containing ':' keep everything after the first one
        assert!(p1.attr("efimedia").unwrap().starts_with("HD(1,GPT,"));

        assert_eq!(ada0.consumers[0].name, "ada0");
        assert_eq!(ada0.consumers[0].mediasize, 21474836480);
    }

    #[test]
    fn geom_without_providers_still_parses() {
        let geoms = parse_geom_list(PART_LIST);
        let da0 = &geoms[1];
        assert_eq!(da0.name, "da0");
        assert_eq!(da0.attr("scheme"), Some("MBR"));
        assert!(da0.providers.is_empty());
        assert_eq!(da0.consumers[0].sectorsize, 512);
    }

    #[test]
    fn empty_attribute_value_is_kept() {
        let geoms = parse_geom_list(PART_LIST);
        assert_eq!(geoms[0].providers[1].attr("label"), Some(""));
    }

    #[test]
    fn garbage_before_first_geom_is_ignored() {
        let geoms = parse_geom_list("warning: something\n\nGeom name: x\nscheme: GPT\n");
        assert_eq!(geoms.len(), 1);
        assert_eq!(geoms[0].attr("scheme"), Some("GPT"));
    }

    #[test]
    fn class_names_are_unique_and_ordered() {
        let conftxt = "\
0 DISK ada0 21474836480 512 hd 16 sc 63
1 PART ada0p1 524288 512 i 1 o 20480 ty freebsd-boot
2 LABEL gpt/gptboot0 524288 512 i 0 o 0
1 PART ada0p2 512000000 512 i 2 o 544768 ty freebsd-ufs
0 DISK ada1 10737418240 4096 hd 16 sc 63
";
        assert_eq!(class_names(conftxt), vec!["DISK", "PART", "LABEL"]);
    }

    const CONFTXT: &str = "\
0 DISK ada0 21474836480 512 hd 16 sc 63
1 PART ada0p1 524288 512 i 1 o 20480 ty freebsd-boot
0 ZFS::VDEV zfs::vdev 0 0
";

    fn fake_capture(program: &str, args: &[&str]) -> Result<String, InstallerError> {
        match (program, args) {
            ("sysctl", _) => Ok(CONFTXT.to_string()),
            ("geom", ["disk", "list"]) => Ok(DISK_LIST.to_string()),
            ("geom", ["part", "list"]) => Ok(PART_LIST.to_string()),
            _ => Err(InstallerError::CommandFailed(program.to_string(), 1)),
        }
    }

    #[test]
    fn reads_every_listable_class() {
        let mesh = read_mesh(fake_capture).unwrap();
        let names: Vec<&str> = mesh.classes.iter().map(|c| c.name.as_str()).collect();
        // ZFS::VDEV has no listing and is skipped
        assert_eq!(names, vec!["DISK", "PART"]);
        assert_eq!(mesh.find_class("PART").unwrap().geoms.len(), 2);
    }

    #[test]
    fn unreadable_conftxt_is_provider_unavailable() {
        let err = read_mesh(|program, _| Err(InstallerError::CommandNotFound(program.to_string())))
            .unwrap_err();
        assert!(matches!(err, InstallerError::ProviderUnavailable(ref m) if m.contains("sysctl")));
    }

    #[test]
    fn interrupt_is_not_swallowed() {
        let err = read_mesh(|program, _| match program {
            "sysctl" => Ok(CONFTXT.to_string()),
            _ => Err(InstallerError::Interrupted),
        })
        .unwrap_err();
        assert!(matches!(err, InstallerError::Interrupted));
    }

    #[test]
    fn entry_header_requires_a_number() {
        assert_eq!(entry_name("1. Name: ada0p1"), Some("ada0p1".to_string()));
        assert_eq!(entry_name("12. Name: da0"), Some("da0".to_string()));
        assert_eq!(entry_name("x. Name: ada0"), None);
        assert_eq!(entry_name("Name: ada0"), None);
    }
}
