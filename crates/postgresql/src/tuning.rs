//! Best-effort session tuning for the load window.
//!
//! Each setting is applied on its own. PostgreSQL refuses several of them at
//! session level (`fsync`, `shared_buffers`, `wal_buffers` need a server
//! restart or reload; `checkpoint_segments` no longer exists), and a refusal
//! only means that knob stays as it was. The load carries on regardless.
//!
//! Settings that did apply are recorded in a [`TuningGuard`] so they can be
//! reset once the load is over. They are session-scoped either way, so
//! closing the connection also discards them.

use crate::destination::Destination;
use tracing::{debug, info};

/// A `SET parameter = value` pair. `value` is inserted verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuningSetting {
    pub parameter: &'static str,
    pub value: &'static str,
}

impl TuningSetting {
    pub fn set_sql(&self) -> String {
        format!("SET {} = {}", self.parameter, self.value)
    }

    pub fn reset_sql(&self) -> String {
        format!("RESET {}", self.parameter)
    }
}

/// Settings tried before every load, in order.
pub const BULK_LOAD_TUNING: &[TuningSetting] = &[
    TuningSetting {
        parameter: "synchronous_commit",
        value: "OFF",
    },
    TuningSetting {
        parameter: "wal_buffers",
        value: "'128MB'",
    },
    TuningSetting {
        parameter: "checkpoint_segments",
        value: "64",
    },
    TuningSetting {
        parameter: "checkpoint_completion_target",
        value: "0.9",
    },
    TuningSetting {
        parameter: "maintenance_work_mem",
        value: "'1GB'",
    },
    TuningSetting {
        parameter: "work_mem",
        value: "'512MB'",
    },
    TuningSetting {
        parameter: "shared_buffers",
        value: "'512MB'",
    },
    TuningSetting {
        parameter: "effective_cache_size",
        value: "'2GB'",
    },
    TuningSetting {
        parameter: "fsync",
        value: "OFF",
    },
];

/// The settings a tuning pass actually changed.
#[must_use = "call `restore` once the load is over"]
#[derive(Debug, Default)]
pub struct TuningGuard {
    applied: Vec<TuningSetting>,
    skipped: usize,
}

impl TuningGuard {
    /// Settings that were accepted.
    pub fn applied(&self) -> &[TuningSetting] {
        &self.applied
    }

    /// Number of settings the destination refused.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Reset every applied setting to its session default. Failures are
    /// logged and ignored.
    pub async fn restore<D>(self, destination: &mut D)
    where
        D: Destination + ?Sized,
    {
        for setting in self.applied.iter().rev() {
            if let Err(e) = destination.execute(&setting.reset_sql()).await {
                debug!("Failed to reset {}: {}", setting.parameter, e);
            }
        }
        if !self.applied.is_empty() {
            info!("Restored {} session settings", self.applied.len());
        }
    }
}

/// Apply [`BULK_LOAD_TUNING`] to `destination`, skipping whatever it refuses.
pub async fn tune_for_bulk_load<D>(destination: &mut D) -> TuningGuard
where
    D: Destination + ?Sized,
{
    apply_settings(destination, BULK_LOAD_TUNING).await
}

pub(crate) async fn apply_settings<D>(destination: &mut D, settings: &[TuningSetting]) -> TuningGuard
where
    D: Destination + ?Sized,
{
    let mut guard = TuningGuard::default();

    for setting in settings {
        match destination.execute(&setting.set_sql()).await {
            Ok(()) => {
                debug!("Applied {} = {}", setting.parameter, setting.value);
                guard.applied.push(*setting);
            }
            Err(e) => {
                debug!("Skipped {}: {}", setting.parameter, e);
                guard.skipped += 1;
            }
        }
    }

    info!(
        "PostgreSQL session tuned for COPY ({} applied, {} skipped)",
        guard.applied.len(),
        guard.skipped
    );
    guard
}
