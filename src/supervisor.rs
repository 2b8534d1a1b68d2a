//! Match supervisor: owns both player processes and runs a game to a verdict.
//!
//! [`MatchSupervisor::start`] forks the two players (both start stopped) and
//! [`MatchSupervisor::run`] drives the ply loop: throw the dice, wake the
//! active player, exchange messages through the scheduler, validate and
//! apply the reply through the [`Rules`] implementation, hand the turn to
//! the opponent. The loop ends with a [`MatchOutcome`], either because the
//! rules declared the game over or because one player faulted.
//!
//! Whatever the verdict, both subprocesses are terminated before `run`
//! returns; no player outlives its match.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Configuration;
use crate::limits::Limits;
use crate::process::PlayerHandle;
use crate::rules::Rules;
use crate::scheduler::{TurnFailure, TurnScheduler};
use crate::state::{throw_dice, GameState, Side};
use crate::timer::TurnTimer;
use crate::wire::encode_moves;

/// How a finished game was won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinKind {
    /// Plain win: the loser has borne off at least one checker.
    Single,
    /// The loser has borne off nothing.
    Gammon,
    /// The loser has borne off nothing and still has checkers in the
    /// winner's home board or on the bar.
    Backgammon,
}

impl WinKind {
    fn from_magnitude(value: i32) -> WinKind {
        match value {
            1 => WinKind::Single,
            2 => WinKind::Gammon,
            _ => WinKind::Backgammon,
        }
    }
}

impl fmt::Display for WinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WinKind::Single => "single",
            WinKind::Gammon => "gammon",
            WinKind::Backgammon => "backgammon",
        })
    }
}

/// What a player did to lose the match outside the rules of the game.
#[derive(Debug, Error)]
pub enum Fault {
    /// The reply was well-formed but not a legal turn.
    #[error("played an illegal move")]
    IllegalMove,
    /// The player exited voluntarily in the middle of the match.
    #[error("left the game (exit status {status})")]
    LeftGame {
        /// The child's exit status.
        status: i32,
    },
    /// The player was terminated by a signal.
    #[error("got signal: {signal}")]
    Crash {
        /// Name of the terminating signal.
        signal: &'static str,
    },
    /// The player exhausted its hard CPU budget.
    #[error("exceeded its CPU limit")]
    Timeout,
    /// The player is alive but never answered usably.
    #[error("sent no move")]
    NoMove,
    /// The reply did not parse.
    #[error("broke the protocol: {0}")]
    Protocol(String),
}

/// Final verdict of a match.
#[derive(Debug)]
pub enum MatchOutcome {
    /// The game finished and one side won.
    Win {
        /// The winning side.
        side: Side,
        /// How it won.
        kind: WinKind,
    },
    /// The game finished without a winner.
    Draw,
    /// One player lost by fault (illegal move, crash, timeout, protocol).
    Fault {
        /// The offending side.
        side: Side,
        /// What it did.
        fault: Fault,
    },
    /// A player executable could not be started; a setup error, charged to
    /// the operator rather than to either player.
    ExecFailed {
        /// The side whose executable failed.
        side: Side,
    },
}

impl MatchOutcome {
    /// Process exit code summarizing the verdict:
    ///
    /// | code | meaning |
    /// |------|-----------------------------------------|
    /// | 1, 2 | below / above played an illegal move    |
    /// | 3, 4 | below / above crashed or timed out      |
    /// | 5    | a player could not be executed          |
    /// | 6    | above wins                              |
    /// | 7    | below wins                              |
    /// | 8    | draw                                    |
    pub fn exit_code(&self) -> i32 {
        match self {
            MatchOutcome::Fault {
                side,
                fault: Fault::IllegalMove,
            } => match side {
                Side::Below => 1,
                Side::Above => 2,
            },
            MatchOutcome::Fault { side, .. } => match side {
                Side::Below => 3,
                Side::Above => 4,
            },
            MatchOutcome::ExecFailed { .. } => 5,
            MatchOutcome::Win {
                side: Side::Above, ..
            } => 6,
            MatchOutcome::Win {
                side: Side::Below, ..
            } => 7,
            MatchOutcome::Draw => 8,
        }
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchOutcome::Win { side, kind } => write!(f, "{side} wins ({kind})"),
            MatchOutcome::Draw => write!(f, "draw"),
            MatchOutcome::Fault { side, fault } => write!(f, "{side} {fault}"),
            MatchOutcome::ExecFailed { side } => write!(f, "{side} could not be executed"),
        }
    }
}

/// Runs one match between two player executables.
#[derive(Debug)]
pub struct MatchSupervisor {
    // Indexed by Side::index(): 0 = below, 1 = above.
    players: [PlayerHandle; 2],
    scheduler: TurnScheduler,
    limits: Limits,
    config: Configuration,
}

impl MatchSupervisor {
    /// Fork both players, stopped, and prepare the turn machinery.
    ///
    /// # Errors
    ///
    /// Fails when a pipe, the fork itself or the timer thread cannot be
    /// created. A player executable that does not exist is *not* detected
    /// here (the failure happens after the exec, inside the child); it
    /// surfaces as [`MatchOutcome::ExecFailed`] on the first turn.
    pub fn start(
        below: impl AsRef<Path>,
        above: impl AsRef<Path>,
        limits: Limits,
        config: Configuration,
    ) -> anyhow::Result<MatchSupervisor> {
        if config.log {
            crate::logger::init_logger();
        }
        let timer = TurnTimer::spawn().context("could not start the turn timer")?;
        let below = PlayerHandle::spawn(&below, Side::Below, &limits, &config)
            .with_context(|| format!("unable to fork player '{}'", below.as_ref().display()))?;
        let above = PlayerHandle::spawn(&above, Side::Above, &limits, &config)
            .with_context(|| format!("unable to fork player '{}'", above.as_ref().display()))?;

        Ok(MatchSupervisor {
            players: [below, above],
            scheduler: TurnScheduler::new(timer),
            limits,
            config,
        })
    }

    /// Play the match to its end and terminate both players.
    pub fn run<R: Rules>(&mut self, rules: &R) -> MatchOutcome {
        let outcome = self.game_loop(rules);
        for player in &mut self.players {
            player.terminate();
        }
        if self.config.verbose {
            println!("\n{outcome}");
        }
        info!(%outcome, exit_code = outcome.exit_code(), "match finished");
        outcome
    }

    fn game_loop<R: Rules>(&mut self, rules: &R) -> MatchOutcome {
        let mut state = GameState::initial();
        let mut ply = 0u32;

        loop {
            ply += 1;
            state.dice = throw_dice();
            if ply == 1 {
                // Opening roll: one die each, doubles are re-thrown, the
                // higher die starts and the pair forms the first roll.
                while state.dice[0] == state.dice[1] {
                    state.dice = throw_dice();
                }
                state.active = if state.dice[0] > state.dice[1] {
                    Side::Below
                } else {
                    Side::Above
                };
            }

            let side = state.active;
            let player = &mut self.players[side.index()];
            if self.config.verbose {
                println!("\n== Ply {ply:2}: {side} '{}' ==", player.name());
            }
            debug!(ply, %side, dice = ?state.dice, "turn starts");

            match self.scheduler.play_turn(player, &state, self.limits.cpu) {
                Ok(mmove) => {
                    if self.config.verbose {
                        println!("{side} plays: {}", encode_moves(&mmove));
                    }
                    if !rules.apply_multi(&mut state, &mmove) {
                        return MatchOutcome::Fault {
                            side,
                            fault: Fault::IllegalMove,
                        };
                    }
                    debug_assert!(state.is_consistent());
                }
                Err(TurnFailure::ExecFailed) => return MatchOutcome::ExecFailed { side },
                Err(failure) => {
                    return MatchOutcome::Fault {
                        side,
                        fault: match failure {
                            TurnFailure::HardTimeout => Fault::Timeout,
                            TurnFailure::LeftGame { status } => Fault::LeftGame { status },
                            TurnFailure::Crashed { signal } => Fault::Crash { signal },
                            TurnFailure::NoMove => Fault::NoMove,
                            TurnFailure::Malformed(err) => Fault::Protocol(err.to_string()),
                            TurnFailure::ExecFailed => unreachable!("handled above"),
                        },
                    }
                }
            }

            if rules.is_terminal(&state) {
                let value = rules.winner(&state);
                return match Side::from_sign(value.signum() as i16) {
                    None => MatchOutcome::Draw,
                    Some(winner) => MatchOutcome::Win {
                        side: winner,
                        kind: WinKind::from_magnitude(value.abs()),
                    },
                };
            }
            state.active = side.opponent();
        }
    }
}
