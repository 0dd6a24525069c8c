use console::{measure_text_width, pad_str, style, Alignment, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const RULE_WIDTH: usize = 56;

pub fn rule() {
    let width = (Term::stdout().size().1 as usize).clamp(40, RULE_WIDTH);
    println!("{}", style("─".repeat(width)).dim());
}

// ── Banner ────────────────────────────────────────────────────────────────────

pub fn print_banner() {
    let _ = Term::stdout().clear_screen();

    let logo = [
        r"    _             _     ____ ____  ____  ",
        r"   / \   _ __ ___| |__ | __ ) ___||  _ \ ",
        r"  / _ \ | '__/ __| '_ \|  _ \___ \| | | |",
        r" / ___ \| | | (__| | | | |_) |__) | |_| |",
        r"/_/   \_\_|  \___|_| |_|____/____/|____/ ",
    ];

    println!();
    for line in logo {
        println!("{}", style(line).cyan().bold());
    }
    println!(
        "\n   {}  {}\n",
        style("disk setup & mount plan").dim().italic(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim()
    );
    rule();
}

/// Section title with a cyan marker, followed by a rule.
pub fn print_header(title: &str) {
    println!();
    println!(
        "{} {}",
        style(" ▸ ").black().on_cyan().bold(),
        style(title).white().bold()
    );
    rule();
}

// ── Status lines ──────────────────────────────────────────────────────────────

pub fn print_success(msg: &str) {
    println!("  {}  {}", style("✓").green().bold(), style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("  {}  {}", style("→").blue().bold(), msg);
}

pub fn print_warning(msg: &str) {
    println!("  {}  {}", style("⚠").yellow().bold(), style(msg).yellow());
}

/// Goes to stderr.
pub fn print_error(msg: &str) {
    eprintln!("  {}  {}", style("✗").red().bold(), style(msg).red());
}

// ── Key/value box ─────────────────────────────────────────────────────────────

/// Renders rows inside a titled frame; the key column fits the widest key.
///
/// ```text
/// ┌─ Mount Plan ─────────────┐
/// │ /          ada0p2        │
/// │ /var       ada0p3        │
/// │ /var/log   ada0p4        │
/// └──────────────────────────┘
/// ```
pub fn print_kv_box(title: &str, rows: &[(&str, &str)]) {
    let key_width = rows.iter().map(|(k, _)| measure_text_width(k)).max().unwrap_or(0);
    let val_width = rows.iter().map(|(_, v)| measure_text_width(v)).max().unwrap_or(0);
    let inner = (key_width + val_width + 5).max(measure_text_width(title) + 4);

    let top = "─".repeat(inner - measure_text_width(title) - 3);
    println!("  ┌─ {} {}┐", style(title).white().bold(), style(top).dim());

    for (key, val) in rows {
        let line = format!(
            " {}   {}",
            style(pad_str(key, key_width, Alignment::Left, None)).dim(),
            style(*val).white().bold()
        );
        let fill = " ".repeat(inner.saturating_sub(key_width + measure_text_width(val) + 4));
        println!("  │{}{}│", line, fill);
    }

    println!("  └{}┘", style("─".repeat(inner)).dim());
}

// ── Spinner ───────────────────────────────────────────────────────────────────

/// A running braille spinner. Clear it with `finish_and_clear()`.
pub fn spinner(msg: impl Into<String>) -> ProgressBar {
    let style = ProgressStyle::with_template("  {spinner:.cyan.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);

    let pb = ProgressBar::new_spinner().with_style(style).with_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Runs `f` while a spinner shows `msg`.
pub fn with_spinner<T>(msg: &str, f: impl FnOnce() -> T) -> T {
    let pb = spinner(msg);
    let out = f();
    pb.finish_and_clear();
    out
}
