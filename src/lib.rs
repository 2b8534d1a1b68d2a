//! # Gammon Referee
//!
//! A sandboxed match supervisor for two backgammon-playing programs, running each
//! player as a separate OS process with per-turn CPU budgets and memory ceilings.
//!
//! It provides:
//! - Match execution and player lifecycle ([`MatchSupervisor`](crate::supervisor::MatchSupervisor))
//! - Game rules plugged in via the [`Rules`](crate::rules::Rules) trait
//! - Turn-exclusive scheduling: the player to move is the only one running, the
//!   other sits stopped under `SIGSTOP`
//! - Two-stage turn timeouts (`SIGXCPU` warning, then `SIGKILL`) and an
//!   address-space rlimit applied before the player starts
//!
//! Each player is an arbitrary executable talking a tiny pipe protocol; a crash,
//! timeout or garbled reply loses the match for the offender without taking the
//! supervisor down.
//!
//! # Documentation Overview
//!
//! - For the match lifecycle and the verdict taxonomy, see the [`supervisor`] module.
//! - For resource budgets and their environment variables, see
//!   [`LimitsBuilder`](crate::limits::LimitsBuilder).
//! - For supervisor behavior flags, see [`Configuration`](crate::config::Configuration).
//! - For the wire protocol and message formats, see the [`wire`] module.
//! - For the subprocess contract (descriptors, exit statuses), see the [`process`] module.
//!
//! # Usage Example
//!
//! Running a match between two player executables with a custom rules engine:
//!
//! ```no_run
//! # use gammon_referee::state::{GameState, Move, MultiMove};
//! # struct HouseRules;
//! # impl gammon_referee::rules::Rules for HouseRules {
//! #     fn check(&self, _state: &GameState, _mv: &Move) -> bool { true }
//! #     fn apply(&self, _state: &mut GameState, _mv: &Move) {}
//! #     fn apply_multi(&self, _state: &mut GameState, _mmove: &MultiMove) -> bool { true }
//! #     fn is_terminal(&self, _state: &GameState) -> bool { true }
//! #     fn winner(&self, _state: &GameState) -> i32 { 1 }
//! # }
//! use std::{process::exit, time::Duration};
//!
//! use gammon_referee::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     // Per-turn CPU budget and memory ceiling for both players
//!     let limits = LimitsBuilder::new()
//!         .with_turn_time(Duration::from_secs(2))
//!         .with_memory(512) // in MB
//!         .build()?;
//!
//!     let config = Configuration::from_env();
//!
//!     // Your rules engine implementing the Rules trait
//!     let rules = HouseRules;
//!
//!     let mut supervisor =
//!         MatchSupervisor::start("./players/alpha", "./players/beta", limits, config)?;
//!     let outcome = supervisor.run(&rules);
//!
//!     println!("{outcome}");
//!     exit(outcome.exit_code());
//! }
//! ```
//!
//! # Example Player
//!
//! Here’s a minimal player that communicates over the fixed descriptors and
//! always passes:
//!
//! ```no_run
//! use std::fs::File;
//! use std::os::fd::FromRawFd;
//!
//! use gammon_referee::process::{CHILD_MOVES_FD, CHILD_STATE_FD};
//! use gammon_referee::state::MultiMove;
//! use gammon_referee::wire::PlayerCodec;
//!
//! fn main() -> anyhow::Result<()> {
//!     // SAFETY: the supervisor binds these descriptors before the exec.
//!     let mut states = unsafe { File::from_raw_fd(CHILD_STATE_FD) };
//!     let mut moves = unsafe { File::from_raw_fd(CHILD_MOVES_FD) };
//!     let mut codec = PlayerCodec::new();
//!
//!     // Interaction loop: one state in, one move reply out
//!     loop {
//!         let state = codec.read_state(&mut states)?;
//!         let reply = MultiMove::pass(); // your engine goes here
//!         let _ = state;
//!         codec.send_moves(&mut moves, &reply)?;
//!     }
//! }
//! ```
//!
//! ## Player Requirements
//!
//! - Read state messages from descriptor 3, write move replies to descriptor 4
//! - Answer every state with exactly one move message (strict alternation)
//! - Messages are NUL-terminated ASCII, at most 512 bytes:
//!  * Supervisor -> Player : `<player> <d0>-<d1>: (<bar_above> <bar_below>) <off> | <p1> ... <p24>`
//!  * Player -> Supervisor : `<count> | (<from>,<roll>) ...`
#![warn(missing_docs)]

pub use anyhow;
pub mod config;
pub mod limits;
mod logger;
pub mod process;
pub mod rules;
mod scheduler;
pub mod state;
pub mod supervisor;
mod timer;
pub mod wire;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use gammon_referee::prelude::*;
/// ```
///
/// Includes:
/// - [`Configuration`](crate::config::Configuration)
/// - [`LimitsBuilder`](crate::limits::LimitsBuilder)
/// - [`MatchSupervisor`](crate::supervisor::MatchSupervisor) and its verdicts
/// - the [`Rules`](crate::rules::Rules) trait and the core game types
pub mod prelude {
    pub use crate::config::Configuration;
    pub use crate::limits::{Limits, LimitsBuilder};
    pub use crate::rules::Rules;
    pub use crate::state::{GameState, Move, MultiMove, Side};
    pub use crate::supervisor::{Fault, MatchOutcome, MatchSupervisor, WinKind};
}
