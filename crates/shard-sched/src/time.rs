//! Simulation time units and submission shapes.

/// The fixed discrete unit of simulation time, in both regimes.
pub type Ticks = u64;

/// Wall-clock length of one tick. Used when a tick count must be converted
/// for an execution context that is not tick-driven.
pub const TICK_MILLIS: u64 = 50;

/// A delay in whichever unit the target execution context understands.
///
/// Tick-driven contexts take [`Delay::Ticks`]; the region-sharded worker
/// pool is wall-clock driven and takes [`Delay::Millis`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delay {
    Ticks(Ticks),
    Millis(u64),
}

impl Delay {
    /// The delay as a tick count, rounding wall-clock delays up.
    #[must_use]
    pub const fn as_ticks(self) -> Ticks {
        match self {
            Delay::Ticks(t) => t,
            Delay::Millis(ms) => ms.div_ceil(TICK_MILLIS),
        }
    }

    /// The delay in milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        match self {
            Delay::Ticks(t) => t * TICK_MILLIS,
            Delay::Millis(ms) => ms,
        }
    }
}

/// One of the submission shapes every execution context supports.
///
/// "No delay specified" is a distinct state from "delay of zero"; absent
/// values never collapse into sentinel zeros.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schedule {
    /// Run as soon as the context is able.
    Immediate,
    /// Run once after a delay.
    Once(Delay),
    /// Run repeatedly: first after `initial`, then every `period`.
    FixedRate { initial: Delay, period: Delay },
}

impl Schedule {
    /// Whether this shape executes on a fixed period.
    #[must_use]
    pub const fn is_repeating(&self) -> bool {
        matches!(self, Schedule::FixedRate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_conversions() {
        assert_eq!(Delay::Ticks(20).as_millis(), 1000);
        assert_eq!(Delay::Millis(75).as_ticks(), 2);
        assert_eq!(Delay::Millis(1000).as_ticks(), 20);
    }

    #[test]
    fn test_repeating_shape() {
        assert!(!Schedule::Immediate.is_repeating());
        assert!(!Schedule::Once(Delay::Ticks(1)).is_repeating());
        assert!(
            Schedule::FixedRate {
                initial: Delay::Ticks(1),
                period: Delay::Ticks(1),
            }
            .is_repeating()
        );
    }
}
