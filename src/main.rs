mod cmd;
mod config;
mod error;
mod geom;
mod logging;
mod part;
mod plan;
mod session;
mod steps;
mod ui;

use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use dialoguer::{Confirm, Select};
use tracing::warn;

use config::{Cli, Config};
use error::InstallerError;
use geom::Gpart;
use part::Engine;
use session::Session;

// ── Global dry-run flag ───────────────────────────────────────────────────────

/// When `true`, no mutating command is executed; it is logged and reported
/// as successful. Read-only queries still run.
pub static DRY_RUN: AtomicBool = AtomicBool::new(false);

#[inline]
pub fn is_dry_run() -> bool {
    DRY_RUN.load(Ordering::Relaxed)
}

// ── Termination signals ───────────────────────────────────────────────────────

/// Set by SIGINT, SIGHUP or SIGTERM and never cleared. The menu loops and
/// command runners turn it into `InstallerError::Interrupted`, so `run()`
/// returns and the engine's rollback runs.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_terminate(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    for signal in [libc::SIGINT, libc::SIGHUP, libc::SIGTERM] {
        // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
        unsafe {
            libc::signal(signal, on_terminate as extern "C" fn(libc::c_int) as libc::sighandler_t);
        }
    }
}

pub fn check_interrupted() -> Result<(), InstallerError> {
    if INTERRUPTED.load(Ordering::SeqCst) {
        return Err(InstallerError::Interrupted);
    }
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let config = Config::from(Cli::parse());
    logging::init(config.verbosity);
    DRY_RUN.store(config.dry_run, Ordering::Relaxed);
    install_signal_handlers();

    // run() returns before exit so the engine's rollback has happened
    if let Err(e) = run(&config) {
        println!();
        ui::print_error(&e.to_string());
        std::process::exit(1);
    }
}

const MENU: [&str; 5] = [
    "Partition editor",
    "Review mount plan",
    "Mount target filesystems",
    "Quit without saving",
    "Exit and save",
];

fn run(config: &Config) -> Result<(), InstallerError> {
    check_root()?;

    ui::print_banner();
    if is_dry_run() {
        ui::print_warning("DRY-RUN MODE: gpart, mount and swapon are only logged.");
    }

    let mut session = load_session(config)?;
    // uncommitted table changes are undone when this goes out of scope
    let mut engine = Engine::new(Gpart);

    loop {
        check_interrupted()?;
        println!();
        let choice = Select::new()
            .with_prompt("Main menu")
            .items(&MENU)
            .default(0)
            .interact()?;

        let result = match choice {
            0 => steps::partition::run(&mut engine, &mut session),
            1 => steps::mount::review(&mut session).map(|_| ()),
            2 => steps::mount::run(&mut session),
            3 => {
                if quit_without_saving(&mut engine)? {
                    return Ok(());
                }
                Ok(())
            }
            _ => {
                steps::partition::offer_commit(&mut engine)?;
                session.save(&config.state_file)?;
                ui::print_success(&format!("Plan saved to {}.", config.state_file.display()));
                return Ok(());
            }
        };

        match result {
            Ok(()) => {}
            Err(InstallerError::Cancelled) => ui::print_info("Cancelled."),
            Err(e @ (InstallerError::Prompt(_) | InstallerError::Io(_) | InstallerError::Interrupted)) => {
                return Err(e)
            }
            Err(e) => ui::print_error(&e.to_string()),
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Checks that the process is running as root (UID 0).
/// Skipped automatically in dry-run mode.
fn check_root() -> Result<(), InstallerError> {
    if is_dry_run() {
        return Ok(());
    }

    // SAFETY: geteuid has no preconditions and cannot fail.
    if unsafe { libc::geteuid() } != 0 {
        return Err(InstallerError::NotRoot);
    }
    Ok(())
}

/// A damaged state file is reported and replaced by a fresh plan.
fn load_session(config: &Config) -> Result<Session, InstallerError> {
    match Session::load(&config.state_file) {
        Ok(session) => Ok(session),
        Err(e @ InstallerError::PersistStoreCorrupt { .. }) => {
            warn!("{}", e);
            ui::print_warning(&format!("{}; starting with an empty plan.", e));
            Ok(Session::default())
        }
        Err(e) => Err(e),
    }
}

/// Returns `true` when the user really wants to leave.
fn quit_without_saving(engine: &mut Engine<Gpart>) -> Result<bool, InstallerError> {
    let pending = engine.pending().len();
    let prompt = if pending == 0 {
        "Quit without saving the plan?".to_string()
    } else {
        format!("Quit and undo {} uncommitted table change(s)?", pending)
    };

    if !Confirm::new().with_prompt(prompt).default(false).interact()? {
        return Ok(false);
    }

    if pending > 0 {
        engine.undo_all()?;
        ui::print_success("Uncommitted changes rolled back.");
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn termination_signal_becomes_an_error() {
        install_signal_handlers();
        assert!(check_interrupted().is_ok());

        // SAFETY: a handler is installed, so raising only sets the flag.
        unsafe {
            libc::raise(libc::SIGHUP);
        }
        assert!(matches!(check_interrupted(), Err(InstallerError::Interrupted)));

        INTERRUPTED.store(false, Ordering::SeqCst);
        for signal in [libc::SIGINT, libc::SIGHUP, libc::SIGTERM] {
            // SAFETY: restores the default disposition.
            unsafe {
                libc::signal(signal, libc::SIG_DFL);
            }
        }
    }
}
