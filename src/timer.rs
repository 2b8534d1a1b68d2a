//! Two-stage per-turn CPU timer.
//!
//! One dedicated thread owns the timeout state machine for the whole match:
//! `IDLE -> ARMED_SOFT -> SOFT_TIMED_OUT -> ARMED_GRACE -> HARD_TIMED_OUT`.
//! The scheduler arms it with the active player at the start of a turn and
//! disarms it when the turn ends; since players never hold the turn
//! concurrently, at most one armed record exists at any instant.
//!
//! On the first expiry the player gets `SIGXCPU` as a warning and the timer
//! re-arms for the grace period; on the second it is killed outright and the
//! hard marker is set, which the scheduler reads to tell a timeout apart
//! from a crash. The thread never touches anything but the shared flags and
//! `kill`, so an expiry racing a finishing turn is harmless.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, error, warn};

use crate::limits::CpuLimit;
use crate::process::PlayerHandle;

/// Identifies the player whose turn currently owns the timer.
struct ArmedTurn {
    pid: Pid,
    name: String,
    cpu: CpuLimit,
    soft_flag: Arc<AtomicBool>,
    hard_flag: Arc<AtomicBool>,
}

enum TimerCmd {
    Arm(ArmedTurn),
    Disarm,
}

/// Handle to the timer thread. Dropping it shuts the thread down.
#[derive(Debug)]
pub(crate) struct TurnTimer {
    tx: Sender<TimerCmd>,
}

impl TurnTimer {
    /// Start the timer thread, initially idle.
    pub(crate) fn spawn() -> anyhow::Result<TurnTimer> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("turn-timer".to_owned())
            .spawn(move || timer_loop(rx))
            .map_err(anyhow::Error::from)?;
        Ok(TurnTimer { tx })
    }

    /// Arm the timer for `player`'s turn.
    pub(crate) fn arm(&self, player: &PlayerHandle, cpu: CpuLimit) {
        let (soft_flag, hard_flag) = player.timeout_flags();
        self.send(TimerCmd::Arm(ArmedTurn {
            pid: player.pid(),
            name: player.name().to_owned(),
            cpu,
            soft_flag,
            hard_flag,
        }));
    }

    /// Disarm the timer at the end of a turn. A no-op when idle.
    pub(crate) fn disarm(&self) {
        self.send(TimerCmd::Disarm);
    }

    fn send(&self, cmd: TimerCmd) {
        self.tx.send(cmd).expect("timer thread died");
    }
}

fn timer_loop(rx: Receiver<TimerCmd>) {
    loop {
        // Idle: wait for the next turn.
        let turn = match rx.recv() {
            Ok(TimerCmd::Arm(turn)) => turn,
            Ok(TimerCmd::Disarm) => continue,
            Err(_) => return,
        };

        // Armed with the soft limit.
        match rx.recv_timeout(turn.cpu.soft) {
            Ok(TimerCmd::Disarm) => continue,
            Ok(TimerCmd::Arm(_)) => {
                error!("timer armed while a turn is already armed");
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }
        turn.soft_flag.store(true, Ordering::SeqCst);
        debug!(player = %turn.name, "soft CPU limit exceeded, sending SIGXCPU");
        let _ = kill(turn.pid, Signal::SIGXCPU);

        // Re-armed for the grace period.
        match rx.recv_timeout(turn.cpu.grace()) {
            Ok(TimerCmd::Disarm) => continue,
            Ok(TimerCmd::Arm(_)) => {
                error!("timer armed while a turn is already armed");
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }
        turn.hard_flag.store(true, Ordering::SeqCst);
        let _ = kill(turn.pid, Signal::SIGKILL);
        warn!(player = %turn.name, "player timeout");

        // Hold until the owning turn is disarmed.
        match rx.recv() {
            Ok(_) => continue,
            Err(_) => return,
        }
    }
}
