//! Tracing setup for the `bindle` binary.
//!
//! Every log line goes to stderr. Stdout belongs to command output: with
//! `--json` it carries exactly one JSON object and nothing else.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// `verbosity` maps the repeated `-v` flag: 0 is INFO, 1 is DEBUG, 2 or more
/// is TRACE. A `RUST_LOG` value takes precedence over the flag. With `json`
/// set, log lines are emitted as JSON objects for machine consumption.
///
/// # Panics
/// Panics if a subscriber is already installed.
pub fn init(verbosity: u8, json: bool) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"))
        .add_directive(format!("bindle={level}").parse().unwrap())
        .add_directive(level.into());

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
