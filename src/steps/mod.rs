pub mod mount;
pub mod partition;
