//! Debug logging controlled by `HEDDLE_DEBUG`.
//!
//! Diagnostics never share the worker's stdout, which is reserved for
//! protocol lines. Output goes to stderr, or to `HEDDLE_DEBUG_FILE` when
//! set (timestamped, no ANSI).
//!
//! `HEDDLE_DEBUG` values:
//! - unset or empty: warnings only
//! - `1` or `true`: every crate module at debug
//! - comma-separated channels (`api,ipc`): named modules at debug

use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Translate a `HEDDLE_DEBUG` value into an `EnvFilter` directive string.
fn filter_directives(debug: &str) -> String {
    let debug = debug.trim();
    if debug.is_empty() {
        return "warn".to_string();
    }
    if debug == "1" || debug.eq_ignore_ascii_case("true") {
        return "warn,heddle=debug".to_string();
    }
    let mut directives = vec!["warn".to_string()];
    for channel in debug.split(',') {
        let channel = channel.trim();
        if channel.is_empty() {
            continue;
        }
        directives.push(format!("heddle::{channel}=debug"));
    }
    directives.join(",")
}

/// Initialize the tracing subscriber from the process environment.
///
/// Safe to call once per process; later calls are ignored by the registry.
pub fn init() {
    let debug = std::env::var("HEDDLE_DEBUG").unwrap_or_default();
    let filter = EnvFilter::new(filter_directives(&debug));

    if let Ok(path) = std::env::var("HEDDLE_DEBUG_FILE") {
        if !path.trim().is_empty() {
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    let _ = tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
                        .try_init();
                    return;
                }
                Err(err) => {
                    eprintln!("heddle: cannot open HEDDLE_DEBUG_FILE {path}: {err}");
                }
            }
        }
    }

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .compact(),
        )
        .try_init();
}
