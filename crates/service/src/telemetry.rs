//! Tracing subscriber setup for the `grove` binary

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Variable holding an `EnvFilter` directive, e.g. `grove_core=debug`
pub const LOG_ENV: &str = "GROVE_LOG";

/// Filter directive for a `-v` count, falling back to `env` and then `warn`
///
/// Explicit `-v` flags win over the environment.
pub fn directive(verbosity: u8, env: Option<&str>) -> String {
    match (verbosity, env) {
        (0, Some(directive)) if !directive.trim().is_empty() => directive.to_string(),
        (0, _) => "warn".to_string(),
        (1, _) => "info".to_string(),
        (2, _) => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install a stderr formatter; a second call is a no-op
pub fn init(verbosity: u8) {
    let env = std::env::var(LOG_ENV).ok();
    let filter = EnvFilter::try_new(directive(verbosity, env.as_deref()))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}
