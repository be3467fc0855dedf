use std::time::Instant;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Setup logging for the library
///
/// Messages are written to stderr with the time elapsed since setup.
/// `log_level` is an [EnvFilter] directive such as `info` or
/// `petab=debug`; it is overridden by `RUST_LOG` when that is set.
///
/// Returns an error if a global subscriber was installed already.
pub fn setup_log(log_level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_lowercase()));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_timer(CompactTimestamp::new());

    Registry::default()
        .with(env_filter)
        .with(stderr_layer)
        .try_init()?;
    tracing::debug!("Logging is configured with level: {}", log_level);
    Ok(())
}

#[derive(Clone)]
struct CompactTimestamp {
    start: Instant,
}

impl CompactTimestamp {
    fn new() -> Self {
        CompactTimestamp {
            start: Instant::now(),
        }
    }
}

impl FormatTime for CompactTimestamp {
    fn format_time(&self, w: &mut Writer<'_>) -> Result<(), std::fmt::Error> {
        let elapsed = self.start.elapsed().as_secs();
        write!(
            w,
            "{:02}:{:02}:{:02}",
            elapsed / 3600,
            (elapsed / 60) % 60,
            elapsed % 60
        )
    }
}
