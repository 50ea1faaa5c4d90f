//! Tracing setup. The engine is headless/embedded, so unlike the teacher there is no
//! human-facing panic hook — a panic is allowed to unwind and is caught by the host's own
//! process supervision.

use tracing_subscriber::prelude::*;

pub fn init(verbosity: u8) {
    let default_directive = match verbosity {
        0 => "photoframe_engine=info",
        1 => "photoframe_engine=debug",
        _ => "photoframe_engine=trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(default_directive.parse().expect("directive is valid"))
        .with_env_var("PHOTOFRAME_LOG")
        .from_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}
