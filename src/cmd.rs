use std::{
    io,
    process::{Command, Stdio},
};

use tracing::{debug, info};

use crate::{error::InstallerError, ui};

// ── Internal helpers ──────────────────────────────────────────────────────────

fn not_found_or_io(program: &str, err: io::Error) -> InstallerError {
    if err.kind() == io::ErrorKind::NotFound {
        InstallerError::CommandNotFound(program.to_string())
    } else {
        InstallerError::Io(err)
    }
}

fn print_captured_output(stdout: &[u8], stderr: &[u8]) {
    let out = String::from_utf8_lossy(stdout);
    let err = String::from_utf8_lossy(stderr);
    if !out.trim().is_empty() {
        eprintln!("{}", out.trim());
    }
    if !err.trim().is_empty() {
        eprintln!("{}", err.trim());
    }
}

fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Fire-and-forget: output is discarded and failure only logged.
pub fn run_best_effort(program: &str, args: &[&str]) {
    if crate::is_dry_run() {
        info!("dry-run: {}", command_line(program, args));
        return;
    }
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if !matches!(status, Ok(s) if s.success()) {
        debug!("ignored failure of {}", command_line(program, args));
    }
}

/// Runs a mutating command behind a spinner and prints `done_msg` on success.
/// On failure the captured output is shown and `CommandFailed` returned.
pub fn run_with_spinner(
    program: &str,
    args: &[&str],
    spin_msg: &str,
    done_msg: &str,
) -> Result<(), InstallerError> {
    if crate::is_dry_run() {
        info!("dry-run: {}", command_line(program, args));
        ui::print_success(&format!("{} (dry-run)", done_msg));
        return Ok(());
    }

    debug!("running: {}", command_line(program, args));
    let output = ui::with_spinner(spin_msg, || {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
    })
    .map_err(|e| not_found_or_io(program, e))?;
    crate::check_interrupted()?;

    if !output.status.success() {
        print_captured_output(&output.stdout, &output.stderr);
        return Err(InstallerError::CommandFailed(
            program.to_string(),
            output.status.code().unwrap_or(-1),
        ));
    }
    ui::print_success(done_msg);
    Ok(())
}

/// Run a read-only command, capture its stdout, and return it as a `String`.
/// Queries run even in dry-run mode since they never touch the disks.
pub fn run_capture(program: &str, args: &[&str]) -> Result<String, InstallerError> {
    debug!("querying: {}", command_line(program, args));
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| not_found_or_io(program, e))?;
    crate::check_interrupted()?;

    if !output.status.success() {
        let diag = String::from_utf8_lossy(&output.stderr);
        debug!("{} failed: {}", program, diag.trim());
        return Err(InstallerError::CommandFailed(
            program.to_string(),
            output.status.code().unwrap_or(-1),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a command whose failure text is meant for the user.
///
/// A non-zero exit becomes `GeomCommandFailed` carrying the tool's stderr verbatim,
/// falling back to the exit code when the tool printed nothing. Ignores the
/// interrupt flag, since rollback goes through here.
pub fn run_diagnostic(program: &str, args: &[&str]) -> Result<(), InstallerError> {
    if crate::is_dry_run() {
        info!("dry-run: {}", command_line(program, args));
        return Ok(());
    }

    debug!("running: {}", command_line(program, args));
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| not_found_or_io(program, e))?;

    if output.status.success() {
        return Ok(());
    }

    let diag = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if diag.is_empty() {
        return Err(InstallerError::GeomCommandFailed(format!(
            "{} exited with code {}",
            program,
            output.status.code().unwrap_or(-1)
        )));
    }
    Err(InstallerError::GeomCommandFailed(diag))
}
