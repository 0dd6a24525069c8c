use console::style;
use dialoguer::{Confirm, Input, Select};

use crate::{
    error::InstallerError,
    geom::{GeomControl, SystemTopology, Zpool},
    part::{
        engine::normalize_type, snapshot, units, Action, DeviceRef, Engine, Entry, FreeRegion, Partition, Scheme,
        Snapshot, Table,
    },
    plan,
    session::Session,
    ui,
};

/// Interactive partition editor. Returns when the user picks "Done".
///
/// Every change is staged through `engine`; leaving the editor offers to commit.
pub fn run<C: GeomControl>(engine: &mut Engine<C>, session: &mut Session) -> Result<(), InstallerError> {
    ui::print_header("Partition Editor");
    ui::print_info("Changes stay pending until you commit them when leaving the editor.");

    loop {
        crate::check_interrupted()?;
        let mut snapshot = load_snapshot()?;
        let entries = snapshot.entries();

        let mut labels: Vec<String> = entries
            .iter()
            .map(|e| describe(e, &snapshot, session))
            .collect();
        labels.push(style("Done").bold().to_string());

        println!();
        let idx = Select::new()
            .with_prompt("Select a disk, partition or free space")
            .items(&labels)
            .default(0)
            .interact()?;
        let Some(entry) = entries.get(idx) else {
            break;
        };

        let actions = entry.actions();
        let mut action_labels: Vec<&str> = actions.iter().map(|a| a.label()).collect();
        action_labels.push("Back");

        let choice = Select::new()
            .with_prompt("Action")
            .items(&action_labels)
            .default(0)
            .interact()?;
        let Some(&action) = actions.get(choice) else {
            continue;
        };

        match apply(engine, session, &mut snapshot, entry, action) {
            Ok(()) => {}
            Err(InstallerError::Cancelled) => ui::print_info("Nothing changed."),
            Err(e @ (InstallerError::Prompt(_) | InstallerError::Io(_) | InstallerError::Interrupted)) => {
                return Err(e)
            }
            Err(e) => ui::print_error(&e.to_string()),
        }
    }

    offer_commit(engine)
}

/// Asks whether to commit pending changes. Declined changes are rolled back
/// when the installer exits.
pub fn offer_commit<C: GeomControl>(engine: &mut Engine<C>) -> Result<(), InstallerError> {
    if engine.pending().is_empty() {
        return Ok(());
    }

    let names = engine.pending().names().join(", ");
    println!();
    ui::print_warning(&format!("Uncommitted changes on: {}", names));

    if !Confirm::new()
        .with_prompt("Commit these changes to disk?")
        .default(false)
        .interact()?
    {
        ui::print_info("Changes left pending; they are undone if you quit without committing.");
        return Ok(());
    }

    ui::with_spinner("Committing partition tables…", || engine.commit_all())?;

    ui::print_success(&format!("Committed {}.", names));
    Ok(())
}

// ── Listing ───────────────────────────────────────────────────────────────────

fn load_snapshot() -> Result<Snapshot, InstallerError> {
    ui::with_spinner("Reading disk layout…", || snapshot::load(&SystemTopology, &Zpool))
}

fn describe(entry: &Entry, snapshot: &Snapshot, session: &Session) -> String {
    let usage = |name: &str| {
        plan::used_as(session, snapshot, name)
            .map(|u| format!("  [{}]", u))
            .unwrap_or_default()
    };

    match entry {
        Entry::Table(id) => {
            let table = snapshot.table(*id);
            format!(
                "{:<12} {:>8}  {}{}",
                style(&table.name).bold(),
                units::format(table.size, 1),
                table.scheme,
                usage(&table.name)
            )
        }
        Entry::Partition { table, name } => match snapshot.table(*table).partition(name) {
            Some(part) => format!(
                "  {:<10} {:>8}  {}{}{}",
                part.name,
                units::format(part.bytes(), 1),
                part.partype,
                part.label
                    .as_deref()
                    .map(|l| format!(" ({})", l))
                    .unwrap_or_default(),
                usage(&part.name)
            ),
            None => format!("  {}", name),
        },
        Entry::Free(region) => {
            let sectorsize = u64::from(snapshot.table(region.table).sectorsize);
            style(format!(
                "  {:<10} {:>8}  free",
                "-",
                units::format(region.length * sectorsize, 1)
            ))
            .dim()
            .to_string()
        }
        Entry::Disk(dev) => format!(
            "{:<12} {:>8}  no partition table{}",
            dev.name,
            units::format(dev.mediasize, 1),
            usage(&dev.name)
        ),
    }
}

// ── Actions ───────────────────────────────────────────────────────────────────

fn apply<C: GeomControl>(
    engine: &mut Engine<C>,
    session: &mut Session,
    snapshot: &mut Snapshot,
    entry: &Entry,
    action: Action,
) -> Result<(), InstallerError> {
    match (entry, action) {
        (Entry::Table(id), Action::DestroyTable) => destroy_table(engine, snapshot.table(*id)),
        (Entry::Table(id), Action::TableBootcode) => {
            let table = snapshot.table(*id);
            choose_bootcode(session, &table.name, plan::suggest_disk_bootcode(table))
        }
        (Entry::Partition { table, name }, Action::DeletePartition) => {
            delete_partition(engine, session, snapshot.table_mut(*table), name)
        }
        (Entry::Partition { table, name }, action) => {
            let Some(part) = snapshot.table(*table).partition(name) else {
                return Ok(());
            };
            match action {
                Action::Use => use_partition(session, snapshot, part),
                Action::Unuse => {
                    plan::unassign(session, name);
                    ui::print_success(&format!("{} is no longer used.", name));
                    Ok(())
                }
                Action::PartitionBootcode => {
                    choose_bootcode(session, name, plan::suggest_part_bootcode(snapshot, part))
                }
                _ => Ok(()),
            }
        }
        (Entry::Free(region), Action::CreatePartition) => {
            create_partition(engine, snapshot.table(region.table), region)
        }
        (Entry::Disk(dev), Action::SetupTable) => setup_table(engine, dev),
        _ => Ok(()),
    }
}

fn destroy_table<C: GeomControl>(engine: &mut Engine<C>, table: &Table) -> Result<(), InstallerError> {
    if !table.partitions.is_empty() {
        return Err(InstallerError::NonEmptyTable);
    }
    if !Confirm::new()
        .with_prompt(format!("Destroy the {} partition table on {}?", table.scheme, table.name))
        .default(false)
        .interact()?
    {
        return Err(InstallerError::Cancelled);
    }

    engine.destroy_table(table)?;
    ui::print_success(&format!("Partition table on {} destroyed (pending).", table.name));
    Ok(())
}

fn setup_table<C: GeomControl>(engine: &mut Engine<C>, dev: &DeviceRef) -> Result<(), InstallerError> {
    let schemes = [Scheme::Gpt, Scheme::Mbr];
    let labels = ["GPT  (recommended)", "MBR"];
    let idx = Select::new()
        .with_prompt(format!("Partition scheme for {}", dev.name))
        .items(&labels)
        .default(0)
        .interact()?;
    let scheme = &schemes[idx];

    if !Confirm::new()
        .with_prompt(format!("Create a {} table on {}?", scheme, dev.name))
        .default(true)
        .interact()?
    {
        return Err(InstallerError::Cancelled);
    }

    engine.create_table(&dev.name, scheme)?;
    ui::print_success(&format!("{} table created on {} (pending).", scheme, dev.name));
    Ok(())
}

fn create_partition<C: GeomControl>(
    engine: &mut Engine<C>,
    table: &Table,
    region: &FreeRegion,
) -> Result<(), InstallerError> {
    if table.sectorsize == 0 {
        return Err(InstallerError::UnknownGeometry(table.name.clone()));
    }
    let sectorsize = u64::from(table.sectorsize);
    let low = region.start * sectorsize;
    let high = (region.end() + 1) * sectorsize;

    let start_default = units::format(low, 1);
    let start_text: String = Input::new()
        .with_prompt("Start")
        .default(start_default.clone())
        .interact_text()?;
    let start = if start_text == start_default {
        low
    } else {
        units::parse(&start_text)?
    };
    let start = clamp_start(start, low, high, sectorsize);

    let size_default = units::format(high - start, 1);
    let size_text: String = Input::new()
        .with_prompt("Size")
        .default(size_default.clone())
        .interact_text()?;
    let size = if size_text == size_default {
        high - start
    } else {
        units::parse(&size_text)?
    };
    let size = clamp_size(size, start, high, sectorsize);

    let ty: String = Input::new()
        .with_prompt("Type")
        .default(normalize_type(&table.scheme, "").unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;

    let label: String = Input::new()
        .with_prompt("Label (optional)")
        .allow_empty(true)
        .interact_text()?;

    engine.create_partition(table, label.trim(), start, size, &ty)?;
    ui::print_success(&format!(
        "{} partition added to {} (pending).",
        units::format(size, 1),
        table.name
    ));
    Ok(())
}

/// Keeps a typed start inside the free region `[low, high)`.
fn clamp_start(start: u64, low: u64, high: u64, sectorsize: u64) -> u64 {
    start.clamp(low, high - sectorsize)
}

/// Keeps a typed size inside the free region. The engine rounds up by one
/// sector, so the largest size passed on leaves that sector free.
fn clamp_size(size: u64, start: u64, high: u64, sectorsize: u64) -> u64 {
    size.min(high - start - sectorsize)
}

fn delete_partition<C: GeomControl>(
    engine: &mut Engine<C>,
    session: &mut Session,
    table: &mut Table,
    name: &str,
) -> Result<(), InstallerError> {
    if !Confirm::new()
        .with_prompt(format!("Delete {}? Its data will be lost.", name))
        .default(false)
        .interact()?
    {
        return Err(InstallerError::Cancelled);
    }

    engine.delete_partition(table, name)?;
    plan::unassign(session, name);
    ui::print_success(&format!("{} deleted (pending).", name));
    Ok(())
}

fn use_partition(session: &mut Session, snapshot: &Snapshot, part: &Partition) -> Result<(), InstallerError> {
    let suggestion = plan::suggest_mountpoint(session, part);
    let mut input = Input::<String>::new()
        .with_prompt(format!("Use {} as (path, {} or {})", part.name, plan::SWAP, plan::BOOTCODE_SENTINEL))
        .allow_empty(true);
    if !suggestion.is_empty() {
        input = input.default(suggestion);
    }
    let point = input.interact_text()?;

    plan::assign(session, snapshot, part, &point)?;
    match plan::used_as(session, snapshot, &part.name) {
        Some(usage) => ui::print_success(&format!("{}: {}", part.name, usage)),
        None => ui::print_info(&format!("{} has no bootcode for its scheme.", part.name)),
    }
    Ok(())
}

fn choose_bootcode(session: &mut Session, name: &str, suggestion: Option<&str>) -> Result<(), InstallerError> {
    let current = session.bootcode.get(name).cloned();
    let mut input = Input::<String>::new()
        .with_prompt(format!("Bootcode for {} (empty for none)", name))
        .allow_empty(true);
    if let Some(code) = current.as_deref().or(suggestion) {
        input = input.default(code.to_string());
    }
    let code = input.interact_text()?;
    let code = code.trim();

    plan::set_bootcode(session, name, Some(code));
    if code.is_empty() {
        ui::print_info(&format!("No bootcode will be written to {}.", name));
    } else {
        ui::print_success(&format!("{} gets bootcode {}.", name, code));
    }
    Ok(())
}
