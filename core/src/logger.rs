use std::sync::atomic::{AtomicBool, Ordering};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    fmt::{format::Writer, time::FormatTime},
    EnvFilter,
};

static SHUTDOWN_STARTED: AtomicBool = AtomicBool::new(false);

/// UTC timestamps with millisecond precision; drops to bare seconds once
/// shutdown has started.
struct PipelineTimer;

impl FormatTime for PipelineTimer {
    fn format_time(&self, writer: &mut Writer<'_>) -> std::fmt::Result {
        let format = if SHUTDOWN_STARTED.load(Ordering::Relaxed) {
            "%H:%M:%S"
        } else {
            "%Y-%m-%dT%H:%M:%S%.3fZ"
        };
        write!(writer, "{}", chrono::Utc::now().format(format))
    }
}

/// Install the global tracing subscriber. `RUST_LOG` directives layer on
/// top of the given base level. Best-effort: a subscriber may already be
/// installed (test harnesses do this).
pub fn setup_logger(log_level: LevelFilter) {
    let filter = EnvFilter::from_default_env().add_directive(log_level.into());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(PipelineTimer)
        .with_target(false)
        .try_init();
}

pub fn setup_info_logger() {
    setup_logger(LevelFilter::INFO);
}

/// Flip log timestamps to the short shutdown format.
pub fn mark_shutdown_started() {
    SHUTDOWN_STARTED.store(true, Ordering::Relaxed);
}
