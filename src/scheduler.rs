//! Runs one turn: resume, exchange messages, suspend, classify failures.
//!
//! The resume/suspend bracket around the message exchange is what keeps
//! exactly one player runnable at a time, and therefore what makes the turn
//! timer measure only the active player. Crash and timeout detection happen
//! asynchronously (timer thread, reaper thread), so after every failed or
//! short read the scheduler consults the hard-timeout marker and the exit
//! notification before blaming the protocol: a read that died under a
//! `SIGKILL` is a timeout, not a malformed message.

use std::time::Duration;

use nix::sys::wait::WaitStatus;
use thiserror::Error;
use tracing::warn;

use crate::limits::CpuLimit;
use crate::process::{PlayerHandle, EXEC_FAILED_STATUS};
use crate::state::{GameState, MultiMove};
use crate::timer::TurnTimer;
use crate::wire::{EngineCodec, WireError};

/// How long classification waits for the reaper's exit notification.
const EXIT_POLL: Duration = Duration::from_millis(100);

/// Why a turn produced no usable move. Ends the match.
#[derive(Debug, Error)]
pub enum TurnFailure {
    /// The player exhausted its hard CPU budget and was killed.
    #[error("exceeded its CPU limit")]
    HardTimeout,
    /// The player exited on its own while it was expected to play.
    #[error("left the game (exit status {status})")]
    LeftGame {
        /// The child's exit status.
        status: i32,
    },
    /// The player was terminated by a signal.
    #[error("got signal: {signal}")]
    Crashed {
        /// Name of the terminating signal.
        signal: &'static str,
    },
    /// The player image could never be executed; a configuration error, not
    /// a player fault.
    #[error("could not be executed")]
    ExecFailed,
    /// The player is alive but its reply never arrived or was unusable I/O-wise.
    #[error("sent no move")]
    NoMove,
    /// The player answered with a message that does not decode.
    #[error("broke the protocol: {0}")]
    Malformed(#[source] WireError),
}

/// Drives single turns on behalf of the supervisor.
#[derive(Debug)]
pub(crate) struct TurnScheduler {
    codec: EngineCodec,
    timer: TurnTimer,
}

impl TurnScheduler {
    pub(crate) fn new(timer: TurnTimer) -> TurnScheduler {
        TurnScheduler {
            codec: EngineCodec::new(),
            timer,
        }
    }

    /// Play one turn of `player`: resume it, send `state`, block for its
    /// reply, and suspend it again whatever happened in between.
    pub(crate) fn play_turn(
        &mut self,
        player: &mut PlayerHandle,
        state: &GameState,
        cpu: Option<CpuLimit>,
    ) -> Result<MultiMove, TurnFailure> {
        player.clear_timeout_flags();
        if let Some(cpu) = cpu {
            self.timer.arm(player, cpu);
        }

        let result = self.exchange(player, state);

        // Park the player again regardless of outcome. A dead child makes
        // this fail with ESRCH, which classification already covered.
        let _ = player.suspend();
        self.timer.disarm();
        result
    }

    fn exchange(
        &mut self,
        player: &mut PlayerHandle,
        state: &GameState,
    ) -> Result<MultiMove, TurnFailure> {
        if player.resume().is_err() {
            return Err(classify(player, None));
        }

        if let Err(err) = self.codec.send_state(player.state_pipe(), state) {
            return Err(classify(player, Some(err)));
        }
        if player.hard_timed_out() {
            return Err(TurnFailure::HardTimeout);
        }

        match self.codec.read_moves(player.moves_pipe()) {
            Err(err) => Err(classify(player, Some(err))),
            Ok(_) if player.hard_timed_out() => Err(TurnFailure::HardTimeout),
            Ok(mmove) => Ok(mmove),
        }
    }
}

/// Attribute a failed exchange to timeout, crash, exec failure or protocol.
fn classify(player: &mut PlayerHandle, wire: Option<WireError>) -> TurnFailure {
    if player.hard_timed_out() {
        return TurnFailure::HardTimeout;
    }

    if let Some(status) = player.poll_exit(EXIT_POLL) {
        return match status {
            WaitStatus::Exited(_, EXEC_FAILED_STATUS) => TurnFailure::ExecFailed,
            WaitStatus::Exited(_, status) => TurnFailure::LeftGame { status },
            WaitStatus::Signaled(_, signal, _) => {
                // The hard kill may have landed after the flag check above.
                if player.hard_timed_out() {
                    TurnFailure::HardTimeout
                } else {
                    TurnFailure::Crashed {
                        signal: signal.as_str(),
                    }
                }
            }
            other => {
                // Not a termination; nothing to attribute.
                warn!(player = %player.name(), ?other, "unexpected child state change");
                TurnFailure::NoMove
            }
        };
    }

    match wire {
        Some(err @ WireError::BadMoves(_))
        | Some(err @ WireError::MoveCountMismatch { .. })
        | Some(err @ WireError::BadState(_))
        | Some(err @ WireError::TooLong) => TurnFailure::Malformed(err),
        _ => TurnFailure::NoMove,
    }
}
