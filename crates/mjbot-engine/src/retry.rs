use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, warn};

use crate::config::RetrySettings;

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling handler thread only.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Produces a line to log next to every failed attempt.
pub trait DiagnosticSource: Send + Sync {
    fn fetch(&self) -> Result<String>;
}

/// Exponential-backoff retry for calls to an unreliable remote API.
///
/// Attempt `i` (zero-based) that fails is followed by a sleep of
/// `initial_delay * 2^i` when attempts remain. Exhaustion returns the last
/// error unchanged. Nothing is deduplicated: a remote side that half-succeeded
/// before failing may end up with duplicate jobs.
#[derive(Clone)]
pub struct Retrier {
    max_attempts: usize,
    initial_delay: Duration,
    sleeper: Arc<dyn Sleeper>,
    diagnostics: Option<Arc<dyn DiagnosticSource>>,
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_INITIAL_DELAY)
    }
}

impl std::fmt::Debug for Retrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("diagnostics", &self.diagnostics.is_some())
            .finish()
    }
}

impl Retrier {
    pub fn new(max_attempts: usize, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            sleeper: Arc::new(ThreadSleeper),
            diagnostics: None,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(settings.max_attempts, settings.initial_delay())
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSource>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }

    pub fn run<T, F>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            match call() {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempts = attempt + 1, "remote call recovered");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %format!("{err:#}"),
                        "remote call failed"
                    );
                    self.log_diagnostic();
                    if attempt + 1 >= self.max_attempts {
                        return Err(err);
                    }
                    self.sleeper.sleep(self.delay_for(attempt));
                    attempt += 1;
                }
            }
        }
    }

    fn log_diagnostic(&self) {
        let Some(source) = &self.diagnostics else {
            return;
        };
        match source.fetch() {
            Ok(line) => error!("{line}"),
            Err(err) => error!("{err:#}"),
        }
    }
}
