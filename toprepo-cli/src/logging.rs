//! Installs a `tracing-subscriber` `fmt` subscriber honoring `RUST_LOG`, the
//! way `radicle-git-ext`'s own instrumented call sites expect a binary
//! embedding the crate to set one up.

use tracing_subscriber::{fmt, EnvFilter};

/// `-v` bumps the default filter one level per repetition; `RUST_LOG` always
/// wins when set, so scripts can still get exactly what they ask for.
pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("git_toprepo={default_level}")));
    fmt().with_env_filter(filter).with_target(false).init();
}
