//! Named stopwatches applied explicitly around the work worth measuring.
//!
//! ```
//! use compdesc::timing::Timer;
//!
//! let mut timer = Timer::new();
//! let sum = timer.time("sum", || (0..1000).sum::<u64>());
//! assert_eq!(sum, 499500);
//! assert!(timer.elapsed_of("sum").is_some());
//! ```
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::descriptors::{DescriptorError, Result};

const MAIN: &str = "main";

#[derive(Debug, Default, Clone)]
struct Span {
    started: Option<Instant>,
    total: Duration,
}

impl Span {
    fn elapsed(&self) -> Duration {
        self.total + self.started.map(|s| s.elapsed()).unwrap_or_default()
    }
}

/// A set of named accumulating stopwatches.
#[derive(Debug, Default, Clone)]
pub struct Timer {
    spans: BTreeMap<String, Span>,
}

impl Timer {
    /// Timer with no spans.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the span `name`.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the span is already running.
    pub fn start(&mut self, name: &str) -> Result<()> {
        let span = self.spans.entry(name.to_string()).or_default();
        if span.started.is_some() {
            return Err(DescriptorError::ConfigError(format!("timer <{name}> already started")));
        }
        span.started = Some(Instant::now());
        Ok(())
    }

    /// Stop the span `name` and return the length of this run.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the span is not running.
    pub fn stop(&mut self, name: &str) -> Result<Duration> {
        let started = self
            .spans
            .get_mut(name)
            .and_then(|span| span.started.take().map(|s| (span, s)));
        match started {
            Some((span, at)) => {
                let run = at.elapsed();
                span.total += run;
                Ok(run)
            }
            None => Err(DescriptorError::ConfigError(format!("timer <{name}> not started"))),
        }
    }

    /// Run `f` and add its duration to the span `name`.
    pub fn time<T>(&mut self, name: &str, f: impl FnOnce() -> T) -> T {
        let at = Instant::now();
        let out = f();
        self.spans.entry(name.to_string()).or_default().total += at.elapsed();
        out
    }

    /// The `main` span when present, otherwise the sum of all spans.
    pub fn elapsed(&self) -> Duration {
        match self.spans.get(MAIN) {
            Some(main) => main.elapsed(),
            None => self.spans.values().map(Span::elapsed).sum(),
        }
    }

    /// Accumulated duration of the span `name`.
    pub fn elapsed_of(&self, name: &str) -> Option<Duration> {
        self.spans.get(name).map(Span::elapsed)
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Total elapsed: {:?}", self.elapsed())?;
        let mut spans: Vec<(&String, Duration)> =
            self.spans.iter().map(|(k, v)| (k, v.elapsed())).collect();
        spans.sort_by(|a, b| b.1.cmp(&a.1));
        for (name, elapsed) in spans {
            write!(f, "\n  |- {name}: {elapsed:?}")?;
        }
        Ok(())
    }
}
