//! Small shared helpers: a grab bag of process/environment utilities that
//! don't deserve their own module, plus the logging bootstrap every
//! component's `main()` calls.

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;

/// Sets up `tracing`: stderr when running in the foreground (supervised
/// by the front end, or run by hand for debugging), a daily-rolling file
/// under `.conduit/` when daemonized. Verbosity raises the default
/// `EnvFilter` directive, so higher verbosity surfaces timing and
/// classification traces without the caller needing `RUST_LOG`.
pub fn register_tracing(component: &str, daemonized: bool, verbosity: u8) -> Result<Option<WorkerGuard>> {
    let default_directive = match verbosity {
        0 => format!("conduit={}", tracing::Level::WARN),
        1 => format!("conduit={}", tracing::Level::INFO),
        _ => format!("conduit={}", tracing::Level::TRACE),
    };
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_env(tracing_subscriber::EnvFilter::DEFAULT_ENV)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive.clone()))
    };

    if daemonized {
        std::fs::create_dir_all(crate::conduit_dir())?;
        let file_appender = tracing_appender::rolling::daily(
            crate::conduit_dir(),
            format!("{component}.log"),
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        tracing_subscriber::fmt()
            .with_writer(non_blocking)
            .with_env_filter(env_filter())
            .init();
        return Ok(Some(guard));
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter())
        .init();
    Ok(None)
}

/// Unique-enough sentinel token for one probe round trip: pid + a
/// monotonic counter, so concurrent probe generations (after a respawn)
/// never collide on a stale sentinel still buffered somewhere.
pub fn make_sentinel(counter: u64) -> String {
    format!("\u{1e}CONDUIT-SENTINEL-{}-{}\u{1e}", std::process::id(), counter)
}

pub fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_differ_by_counter() {
        assert_ne!(make_sentinel(1), make_sentinel(2));
    }
}
