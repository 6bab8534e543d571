//! Tracing bootstrap shared by pools and tests.
use std::any::Any;

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to `default_filter`.
/// Safe to call many times; only the first installation wins.
pub fn init_default_subscriber(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .try_init();
}

/// Best-effort rendering of a panic payload caught from a reactor step.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
