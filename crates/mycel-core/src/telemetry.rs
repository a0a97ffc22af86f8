// SPDX-License-Identifier: Apache-2.0
//! Tick diagnostics: parseable `[TICK n] key=value` lines.
//!
//! stdout belongs to the action byte stream, so diagnostics go to an
//! injected sink (stderr by default). Writes are best-effort; a broken
//! sink never disturbs the tick pipeline.

use std::fmt;
use std::io::{self, Write};

/// Recoverable-error counters surfaced through the stats inspector.
#[derive(Debug, Default, Clone, Copy)]
pub struct Counters {
    /// Allocations refused because the arena was full.
    pub capacity_exhausted: u64,
    /// Operations dropped because they referenced a dead id.
    pub invalid_vertex: u64,
    /// Snapshot write attempts that failed.
    pub snapshot_failures: u64,
}

/// Line-event emitter for per-tick diagnostics.
pub struct Telemetry {
    sink: Box<dyn Write + Send>,
    period: u64,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

impl Telemetry {
    /// Emits to stderr every `period` ticks (0 disables emission).
    pub fn stderr(period: u64) -> Self {
        Self {
            sink: Box::new(io::stderr()),
            period,
        }
    }

    /// Emits to an arbitrary sink; used by tests and embedders.
    pub fn with_sink(sink: Box<dyn Write + Send>, period: u64) -> Self {
        Self { sink, period }
    }

    /// Whether `tick` falls on the emission period.
    pub(crate) fn due(&self, tick: u64) -> bool {
        self.period != 0 && tick % self.period == 0
    }

    /// Writes one `[TICK n] ...` line. Errors are ignored; diagnostics
    /// are best-effort.
    pub(crate) fn line(&mut self, tick: u64, fields: fmt::Arguments<'_>) {
        let _ = writeln!(self.sink, "[TICK {tick}] {fields}");
        let _ = self.sink.flush();
    }
}
