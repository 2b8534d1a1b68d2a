//! Per-player resource limits.
//!
//! Two independent limits exist, both optional:
//!
//! - **CPU time per turn**, enforced in two stages: when the soft limit
//!   expires the player receives `SIGXCPU` as a warning; if it still has not
//!   answered by the hard limit it is killed. With no CPU limit the turn
//!   timer stays unarmed and players may think forever.
//! - **Memory**, applied as an address-space rlimit (`RLIMIT_AS`) before the
//!   player executable starts.
//!
//! Limits are built once before any player process exists:
//!
//! ```
//! use std::time::Duration;
//! use gammon_referee::limits::LimitsBuilder;
//!
//! let limits = LimitsBuilder::new()
//!     .with_turn_time(Duration::from_secs(2))
//!     .with_turn_time_hard(Duration::from_secs(3))
//!     .with_memory(512)
//!     .build()
//!     .unwrap();
//! ```

use std::{env, time::Duration};

use anyhow::bail;

/// Grace period added to the soft CPU limit when no hard limit is given.
const DEFAULT_GRACE: Duration = Duration::from_secs(1);

/// Two-stage per-turn CPU budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuLimit {
    pub(crate) soft: Duration,
    pub(crate) hard: Duration,
}

impl CpuLimit {
    /// Time between the soft warning and the hard kill.
    pub(crate) fn grace(&self) -> Duration {
        self.hard - self.soft
    }
}

/// Address-space ceiling in bytes (soft and hard rlimit values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLimit {
    pub(crate) soft: u64,
    pub(crate) hard: u64,
}

/// Resource limits applied to both players, built with [`LimitsBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Limits {
    pub(crate) cpu: Option<CpuLimit>,
    pub(crate) memory: Option<MemoryLimit>,
}

impl Limits {
    /// No limits at all: unbounded think time and memory.
    pub fn none() -> Limits {
        Limits::default()
    }

    /// Create a [`LimitsBuilder`].
    pub fn builder() -> LimitsBuilder {
        LimitsBuilder::new()
    }
}

/// Builder for [`Limits`]. All limits default to unlimited.
#[derive(Debug, Default)]
pub struct LimitsBuilder {
    turn_time: Option<Duration>,
    turn_time_hard: Option<Duration>,
    memory_mb: Option<u64>,
    memory_hard_mb: Option<u64>,
}

impl LimitsBuilder {
    /// Creates a new `LimitsBuilder` with every limit unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `LimitsBuilder` configured from environment variables.
    ///
    /// Read environment variables are:
    /// - `TURN_TIME_SECS` (u64): soft CPU time per turn in seconds
    /// - `TURN_TIME_HARD_SECS` (u64): hard CPU time per turn in seconds
    /// - `PLAYER_MEM_MB` (u64): soft memory ceiling in megabytes
    /// - `PLAYER_MEM_HARD_MB` (u64): hard memory ceiling in megabytes
    #[must_use]
    pub fn from_env() -> Self {
        fn parse_u64(var: &str) -> Option<u64> {
            env::var(var).ok()?.parse().ok()
        }

        LimitsBuilder {
            turn_time: parse_u64("TURN_TIME_SECS").map(Duration::from_secs),
            turn_time_hard: parse_u64("TURN_TIME_HARD_SECS").map(Duration::from_secs),
            memory_mb: parse_u64("PLAYER_MEM_MB"),
            memory_hard_mb: parse_u64("PLAYER_MEM_HARD_MB"),
        }
    }

    /// Sets the soft CPU time a player may spend on a single turn.
    #[must_use]
    pub fn with_turn_time(self, duration: Duration) -> Self {
        Self {
            turn_time: Some(duration),
            ..self
        }
    }

    /// Sets the hard CPU time per turn. Defaults to the soft limit plus one
    /// second of grace.
    #[must_use]
    pub fn with_turn_time_hard(self, duration: Duration) -> Self {
        Self {
            turn_time_hard: Some(duration),
            ..self
        }
    }

    /// Sets the soft memory ceiling per player (in MB).
    #[must_use]
    pub fn with_memory(self, megabytes: u64) -> Self {
        Self {
            memory_mb: Some(megabytes),
            ..self
        }
    }

    /// Sets the hard memory ceiling per player (in MB). Defaults to the soft
    /// ceiling.
    #[must_use]
    pub fn with_memory_hard(self, megabytes: u64) -> Self {
        Self {
            memory_hard_mb: Some(megabytes),
            ..self
        }
    }

    /// Consumes the builder and returns the constructed [`Limits`].
    ///
    /// # Errors
    ///
    /// Returns an error when the limits are contradictory: a hard limit
    /// below its soft counterpart, or a hard CPU limit without a soft one.
    pub fn build(self) -> anyhow::Result<Limits> {
        let cpu = match (self.turn_time, self.turn_time_hard) {
            (None, None) => None,
            (None, Some(_)) => bail!("a hard CPU limit requires a soft CPU limit"),
            (Some(soft), hard) => {
                let hard = hard.unwrap_or(soft + DEFAULT_GRACE);
                if hard < soft {
                    bail!(
                        "hard CPU limit ({hard:?}) is below the soft limit ({soft:?})"
                    );
                }
                Some(CpuLimit { soft, hard })
            }
        };

        let memory = match (self.memory_mb, self.memory_hard_mb) {
            (None, None) => None,
            (soft, hard) => {
                let soft = soft.or(hard).unwrap();
                let hard = hard.unwrap_or(soft);
                if hard < soft {
                    bail!("hard memory ceiling ({hard}MB) is below the soft ceiling ({soft}MB)");
                }
                Some(MemoryLimit {
                    soft: soft << 20,
                    hard: hard << 20,
                })
            }
        };

        Ok(Limits { cpu, memory })
    }
}

#[cfg(test)]
mod limits_tests {
    use super::*;

    #[test]
    fn unlimited_by_default() {
        let limits = LimitsBuilder::new().build().unwrap();
        assert_eq!(limits, Limits::none());
    }

    #[test]
    fn soft_cpu_gets_default_grace() {
        let limits = LimitsBuilder::new()
            .with_turn_time(Duration::from_secs(2))
            .build()
            .unwrap();
        let cpu = limits.cpu.unwrap();
        assert_eq!(cpu.soft, Duration::from_secs(2));
        assert_eq!(cpu.hard, Duration::from_secs(3));
        assert_eq!(cpu.grace(), Duration::from_secs(1));
    }

    #[test]
    fn contradictory_limits_are_rejected() {
        assert!(LimitsBuilder::new()
            .with_turn_time(Duration::from_secs(3))
            .with_turn_time_hard(Duration::from_secs(2))
            .build()
            .is_err());
        assert!(LimitsBuilder::new()
            .with_turn_time_hard(Duration::from_secs(2))
            .build()
            .is_err());
        assert!(LimitsBuilder::new()
            .with_memory(512)
            .with_memory_hard(256)
            .build()
            .is_err());
    }

    #[test]
    fn memory_is_converted_to_bytes() {
        let limits = LimitsBuilder::new().with_memory(64).build().unwrap();
        let memory = limits.memory.unwrap();
        assert_eq!(memory.soft, 64 << 20);
        assert_eq!(memory.hard, 64 << 20);
    }
}
