use tracing_subscriber::EnvFilter;

/// Default filter for a verbosity count; `RUST_LOG` overrides it.
fn directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "absd_installer=warn",
        1 => "absd_installer=info",
        _ => "absd_installer=debug",
    }
}

/// Sends tracing output to stderr so it never mixes with the prompts.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(verbosity)));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
