use dialoguer::Confirm;

use crate::{
    cmd,
    error::InstallerError,
    plan::{self, MountEntry},
    session::Session,
    ui,
};

/// Marker recorded in `Session::done` once the target is mounted.
pub const STAGE: &str = "mount";

/// Prints the mount plan in the order it will be executed.
pub fn review(session: &mut Session) -> Result<Vec<MountEntry>, InstallerError> {
    let order = plan::build_order(&mut session.fstab)?;
    let swaps = plan::swap_devices(&session.fstab);

    if order.is_empty() && swaps.is_empty() {
        ui::print_warning("No partition has a mountpoint yet. Assign some in the partition editor.");
        return Ok(order);
    }

    let mut rows: Vec<(String, String)> = order
        .iter()
        .map(|e| (e.path.clone(), e.partition.clone()))
        .collect();
    rows.extend(swaps.into_iter().map(|name| (plan::SWAP.to_string(), name)));
    let rows: Vec<(&str, &str)> = rows.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    println!();
    ui::print_kv_box("Mount Plan", &rows);

    if !session.bootcode.is_empty() {
        let rows: Vec<(&str, &str)> = session
            .bootcode
            .iter()
            .map(|(name, code)| (name.as_str(), code.as_str()))
            .collect();
        ui::print_kv_box("Bootcode", &rows);
    }

    if order.first().map_or(true, |e| e.path != "/") {
        ui::print_warning("Nothing is mounted at / yet.");
    }
    Ok(order)
}

/// Mounts every planned filesystem under the session's target root, parents
/// first, then enables swap.
pub fn run(session: &mut Session) -> Result<(), InstallerError> {
    if session.is_done(STAGE) {
        ui::print_info(&format!("Target filesystems are already mounted under {}.", session.mountpoint));
        return Ok(());
    }

    let order = review(session)?;
    let swaps = plan::swap_devices(&session.fstab);
    if order.is_empty() && swaps.is_empty() {
        return Ok(());
    }

    println!();
    if !Confirm::new()
        .with_prompt(format!("Mount these under {}?", session.mountpoint))
        .default(true)
        .interact()?
    {
        return Err(InstallerError::Cancelled);
    }

    for entry in &order {
        let target = target_dir(&session.mountpoint, &entry.path);
        let device = format!("/dev/{}", entry.partition);

        cmd::run_with_spinner(
            "mkdir",
            &["-p", &target],
            &format!("Creating {}…", target),
            &format!("Directory {} ready.", target),
        )?;
        cmd::run_with_spinner(
            "mount",
            &[&device, &target],
            &format!("Mounting {} → {}…", device, target),
            &format!("{} mounted at {}.", device, target),
        )?;
    }

    for name in &swaps {
        let device = format!("/dev/{}", name);
        // may still be active from an earlier attempt
        cmd::run_best_effort("swapoff", &[&device]);
        cmd::run_with_spinner(
            "swapon",
            &[&device],
            &format!("Activating swap on {}…", device),
            &format!("Swap on {} activated.", device),
        )?;
    }

    session.mark_done(STAGE);
    Ok(())
}

/// Where a planned path lives under the target root.
fn target_dir(root: &str, path: &str) -> String {
    let root = root.trim_end_matches('/');
    if path == "/" {
        if root.is_empty() {
            "/".to_string()
        } else {
            root.to_string()
        }
    } else {
        format!("{}{}", root, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_placed_under_the_target_root() {
        assert_eq!(target_dir("/mnt", "/"), "/mnt");
        assert_eq!(target_dir("/mnt", "/var/log"), "/mnt/var/log");
        assert_eq!(target_dir("/mnt/", "/usr"), "/mnt/usr");
        assert_eq!(target_dir("/", "/"), "/");
        assert_eq!(target_dir("/", "/home"), "/home");
    }

    #[test]
    fn completed_stage_is_skipped() {
        let mut session = Session::default();
        session.mark_done(STAGE);
        // would otherwise prompt for confirmation
        run(&mut session).unwrap();
    }

    #[test]
    fn review_normalizes_and_orders() {
        let mut session = Session::default();
        for (name, mount) in [("ada0p4", "/var/log/"), ("ada0p2", "/"), ("ada0p3", "swap")] {
            session
                .fstab
                .insert(name.into(), crate::session::FstabEntry { mount: mount.into() });
        }
        let order = review(&mut session).unwrap();
        let paths: Vec<&str> = order.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/var/log"]);
        assert_eq!(session.fstab["ada0p4"].mount, "/var/log");
    }
}
