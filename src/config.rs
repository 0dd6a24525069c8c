use std::path::PathBuf;

use clap::Parser;

use crate::session::DEFAULT_STATE_FILE;

/// Disk partitioning and mount planning for an ArchBSD installation.
#[derive(Parser, Debug)]
#[command(name = "absd-installer", version)]
#[command(about = "Interactive disk setup for ArchBSD", long_about = None)]
pub struct Cli {
    /// Log commands instead of running them; nothing on disk changes
    #[arg(long)]
    pub dry_run: bool,

    /// Where the partition and mount choices are kept between runs
    #[arg(long, value_name = "PATH", default_value = DEFAULT_STATE_FILE)]
    pub state: PathBuf,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Settings resolved from the command line for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub dry_run: bool,
    pub state_file: PathBuf,
    pub verbosity: u8,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Config {
            dry_run: cli.dry_run,
            state_file: cli.state,
            verbosity: cli.verbose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::from(Cli::parse_from(["absd-installer"]));
        assert!(!config.dry_run);
        assert_eq!(config.state_file, PathBuf::from("/tmp/absd-installer.json"));
        assert_eq!(config.verbosity, 0);
    }

    #[test]
    fn flags() {
        let cli = Cli::parse_from(["absd-installer", "--dry-run", "-vv", "--state", "/root/plan.json"]);
        let config = Config::from(cli);
        assert!(config.dry_run);
        assert_eq!(config.state_file, PathBuf::from("/root/plan.json"));
        assert_eq!(config.verbosity, 2);
    }
}
