//! Tracing setup and elapsed-time logging.

use std::time::Instant;

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Stopwatch logging one operation's duration when finished.
#[derive(Debug)]
pub struct ElapsedTimer {
    operation: &'static str,
    t_start: Instant,
}

impl ElapsedTimer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            t_start: Instant::now(),
        }
    }

    /// Milliseconds since start.
    pub fn elapsed_ms(&self) -> u64 {
        self.t_start.elapsed().as_millis() as u64
    }

    /// Log the elapsed time and return it in milliseconds.
    pub fn finish(self) -> u64 {
        let elapsed_ms = self.elapsed_ms();
        info!(operation = self.operation, elapsed_ms, "Elapsed time");
        elapsed_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_measures_monotonic_time() {
        init_tracing();
        let timer = ElapsedTimer::start("unit");
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.finish() >= 5);
    }
}
