//! Logging setup and step/debug helpers

use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. Safe to call more than once.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();
}

/// `[<RFC3339 timestamp>] [STEP] <step>`
pub fn format_step(step: &str) -> String {
    let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    format!("[{}] [STEP] {}", timestamp, step)
}

pub fn log_step(step: &str) {
    info!("{}", format_step(step));
}

pub fn debug_value<T: Serialize + ?Sized>(message: &str, data: Option<&T>) {
    match data.and_then(|d| serde_json::to_string_pretty(d).ok()) {
        Some(json) => debug!("[DEBUG] {} {}", message, json),
        None => debug!("[DEBUG] {}", message),
    }
}

/// Debug line with no payload
pub fn debug_msg(message: &str) {
    debug_value::<()>(message, None);
}
