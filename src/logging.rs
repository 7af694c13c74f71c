//! Tracing setup. Diagnostics go to stderr and are controlled with
//! `RUST_LOG`; user-facing output stays on plain `println!`/`eprintln!`.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskforge=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
