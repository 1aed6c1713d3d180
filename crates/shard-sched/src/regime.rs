//! Process-wide concurrency regime detection.
//!
//! The regime is a closed variant resolved once per process lifetime and
//! never changed at runtime. Embedders classify their server at startup and
//! call [`Regime::install`]; everything downstream consults the cached
//! value through the host it is bound to, never re-checks mid-task.

use std::sync::OnceLock;

use crate::SchedulerError;

static INSTALLED: OnceLock<Regime> = OnceLock::new();

/// Which concurrency model the server runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Regime {
    /// One thread owns all simulation state; work is tick-driven on that
    /// thread, with a detached worker pool for non-simulation work.
    Cooperative,
    /// Simulation space is partitioned into regions, each owned by one
    /// thread, plus a global coordinator thread and a worker pool.
    RegionSharded,
}

impl Regime {
    /// Install the detected regime for the process.
    ///
    /// Returns `false` if a regime was already installed (the first caller
    /// wins; the flag is never mutated afterwards).
    pub fn install(self) -> bool {
        INSTALLED.set(self).is_ok()
    }

    /// The installed regime, if any.
    #[must_use]
    pub fn installed() -> Option<Regime> {
        INSTALLED.get().copied()
    }

    /// The installed regime, or [`SchedulerError::UnsupportedEnvironment`]
    /// when the runtime was never classified.
    pub fn require() -> Result<Regime, SchedulerError> {
        Self::installed().ok_or(SchedulerError::UnsupportedEnvironment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test fn: the install flag is process-wide, so the whole sequence
    // must run in a fixed order.
    #[test]
    fn test_install_once() {
        assert_eq!(Regime::installed(), None);
        assert!(matches!(
            Regime::require(),
            Err(SchedulerError::UnsupportedEnvironment)
        ));

        assert!(Regime::RegionSharded.install());
        assert!(!Regime::Cooperative.install(), "first caller wins");
        assert_eq!(Regime::installed(), Some(Regime::RegionSharded));
        assert!(matches!(Regime::require(), Ok(Regime::RegionSharded)));
    }
}
