use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command '{0}' failed with exit code {1}")]
    CommandFailed(String, i32),

    #[error("Command '{0}' not found, is it installed?")]
    CommandNotFound(String),

    #[error("Installation cancelled by user")]
    Cancelled,

    #[error("Interrupted, uncommitted partition changes are rolled back")]
    Interrupted,

    #[error("This installer must be run as root")]
    NotRoot,

    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    // ── Disk geometry ─────────────────────────────────────────────────────────
    #[error("Disk topology unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("{0}")]
    GeomCommandFailed(String),

    #[error("Disk is not empty, remove partitions first!")]
    NonEmptyTable,

    #[error("invalid type: {0}")]
    InvalidType(String),

    #[error("invalid size: {0}")]
    InvalidSize(String),

    #[error("start sector {start} lies beyond the last usable sector {last}")]
    OutOfRange { start: u64, last: u64 },

    #[error("cannot determine the sector size of {0}")]
    UnknownGeometry(String),

    // ── Mount plan ────────────────────────────────────────────────────────────
    #[error("invalid mountpoint '{path}': {reason}")]
    InvalidMountpoint { path: String, reason: &'static str },

    #[error("duplicate fstab entry: {0}")]
    DuplicateMount(String),

    // ── Persisted state ───────────────────────────────────────────────────────
    #[error("state file {path} is malformed: {source}")]
    PersistStoreCorrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
