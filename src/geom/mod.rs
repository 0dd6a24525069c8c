//! Narrow interfaces to the system's disk topology, gpart and ZFS.

pub mod control;
pub mod mesh;
pub mod zfs;

pub use control::{GeomControl, Gpart, PartRequest, PartVerb};
pub use mesh::{Mesh, SystemTopology, Topology};
pub use zfs::{Pool, ZfsQuery, Zpool};
