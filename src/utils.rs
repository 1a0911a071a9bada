/// Installs a `tracing` subscriber printing to stderr.
///
/// Filtering follows `RUST_LOG` and falls back to `info` for this crate.
/// Calling it more than once is harmless; later calls are ignored.
#[cfg(feature = "logging")]
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(concat!(env!("CARGO_PKG_NAME"), "=info")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

/// Renders script text with right-aligned line numbers, used when reporting
/// script failures.
pub(crate) fn number_lines(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let width = lines.len().max(1).to_string().len();

    let mut acc = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            acc.push('\n');
        }
        acc.push_str(&format!("{:>width$} | {}", i + 1, line, width = width));
    }
    acc
}
