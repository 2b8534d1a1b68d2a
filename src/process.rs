//! One player subprocess: creation, suspension and asynchronous exit events.
//!
//! A [`PlayerHandle`] owns the child's pid, the two pipe endpoints the
//! supervisor keeps, and the per-turn timeout flags shared with the turn
//! timer. The child is stopped (`SIGSTOP`) immediately after the fork and
//! toggled runnable exactly once per turn, so at most one player ever holds
//! the CPU.
//!
//! # Subprocess contract
//!
//! The player executable finds its two pipe ends on fixed descriptors —
//! [`CHILD_STATE_FD`] to read states from, [`CHILD_MOVES_FD`] to write moves
//! to — regardless of which side it plays. It is expected to loop: read one
//! state message, write back one move message. If the executable cannot be
//! started at all, the child exits with [`EXEC_FAILED_STATUS`], which the
//! supervisor reports as a configuration error rather than a player fault.
//!
//! Exit detection does not rely on a `SIGCHLD` handler: a reaper thread per
//! child blocks in `waitpid` and posts the final [`WaitStatus`] over a
//! channel, which [`PlayerHandle::poll_exit`] consumes.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execv, fork, pipe, ForkResult, Pid};
use tracing::{debug, instrument, warn};

use crate::config::Configuration;
use crate::limits::Limits;
use crate::state::Side;

/// Descriptor the player reads state messages from.
pub const CHILD_STATE_FD: i32 = 3;
/// Descriptor the player writes move messages to.
pub const CHILD_MOVES_FD: i32 = 4;
/// Exit status a child reports when the player image could not be executed.
pub const EXEC_FAILED_STATUS: i32 = 5;

/// How long termination waits for SIGTERM before escalating to SIGKILL.
const TERM_GRACE: Duration = Duration::from_millis(500);

/// Handle to one running (or already exited) player subprocess.
#[derive(Debug)]
pub struct PlayerHandle {
    pid: Pid,
    name: String,
    side: Side,
    to_player: File,
    from_player: File,
    soft_timeout: Arc<AtomicBool>,
    hard_timeout: Arc<AtomicBool>,
    events: Receiver<WaitStatus>,
    exit: Option<WaitStatus>,
}

impl PlayerHandle {
    /// Fork and exec `executable` as the player for `side`.
    ///
    /// The child closes the pipe ends it does not use, binds the remaining
    /// two to [`CHILD_STATE_FD`] and [`CHILD_MOVES_FD`], applies the memory
    /// ceiling and replaces its image; it starts out stopped and consumes no
    /// CPU until its first turn. Stdin and stdout are bound to `/dev/null`,
    /// stderr too unless the configuration passes it through.
    #[instrument(skip_all, fields(player = %executable.as_ref().display()))]
    pub fn spawn(
        executable: impl AsRef<Path>,
        side: Side,
        limits: &Limits,
        config: &Configuration,
    ) -> anyhow::Result<PlayerHandle> {
        let executable = executable.as_ref();
        let name = executable.display().to_string();
        let exe = CString::new(executable.as_os_str().as_bytes())
            .context("executable path contains a NUL byte")?;

        // Supervisor -> player and player -> supervisor.
        let (state_r, state_w) = pipe().context("could not create state pipe")?;
        let (moves_r, moves_w) = pipe().context("could not create moves pipe")?;
        let devnull = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/null")
            .context("could not open /dev/null")?;

        let memory = limits.memory;
        let silence_stderr = !config.player_stderr;

        match unsafe { fork() }.context("fork failed")? {
            ForkResult::Child => {
                // Only async-signal-safe calls between fork and exec: the
                // parent may be multi-threaded.
                unsafe {
                    libc::dup2(devnull.as_raw_fd(), 0);
                    libc::dup2(devnull.as_raw_fd(), 1);
                    if silence_stderr {
                        libc::dup2(devnull.as_raw_fd(), 2);
                    }

                    // Close the parent's ends.
                    libc::close(state_w.as_raw_fd());
                    libc::close(moves_r.as_raw_fd());

                    // Bind the child's ends to the fixed descriptors. The
                    // write end must not sit on CHILD_STATE_FD or the first
                    // dup2 would clobber it.
                    let mut moves_fd = moves_w.as_raw_fd();
                    if moves_fd == CHILD_STATE_FD {
                        moves_fd = libc::dup(moves_fd);
                    }
                    libc::dup2(state_r.as_raw_fd(), CHILD_STATE_FD);
                    libc::dup2(moves_fd, CHILD_MOVES_FD);
                }
                if let Some(memory) = memory {
                    let _ = setrlimit(Resource::RLIMIT_AS, memory.soft, memory.hard);
                }
                let _ = execv(&exe, &[exe.as_c_str()]);
                unsafe { libc::_exit(EXEC_FAILED_STATUS) }
            }
            ForkResult::Parent { child } => {
                // Stop the player until it is its turn.
                kill(child, Signal::SIGSTOP)
                    .with_context(|| format!("could not stop fresh player '{name}'"))?;

                // Close the child's ends.
                drop(state_r);
                drop(moves_w);

                let (tx, events) = mpsc::channel();
                thread::Builder::new()
                    .name(format!("reaper-{child}"))
                    .spawn(move || {
                        if let Ok(status) = waitpid(child, None) {
                            let _ = tx.send(status);
                        }
                    })
                    .context("could not spawn reaper thread")?;

                debug!(pid = child.as_raw(), %side, "player forked and stopped");

                Ok(PlayerHandle {
                    pid: child,
                    name,
                    side,
                    to_player: File::from(state_w),
                    from_player: File::from(moves_r),
                    soft_timeout: Arc::new(AtomicBool::new(false)),
                    hard_timeout: Arc::new(AtomicBool::new(false)),
                    events,
                    exit: None,
                })
            }
        }
    }

    /// Process id of the child.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Display name (the executable path as given).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The side this player plays.
    pub fn side(&self) -> Side {
        self.side
    }

    /// Make the player runnable for its turn.
    pub fn resume(&self) -> anyhow::Result<()> {
        kill(self.pid, Signal::SIGCONT)
            .with_context(|| format!("could not resume player '{}'", self.name))
    }

    /// Stop the player again after its turn.
    pub fn suspend(&self) -> anyhow::Result<()> {
        kill(self.pid, Signal::SIGSTOP)
            .with_context(|| format!("could not suspend player '{}'", self.name))
    }

    /// Pipe carrying state messages to the player.
    pub(crate) fn state_pipe(&mut self) -> &mut File {
        &mut self.to_player
    }

    /// Pipe carrying move messages from the player.
    pub(crate) fn moves_pipe(&mut self) -> &mut File {
        &mut self.from_player
    }

    /// Reset both timeout markers at the start of a turn.
    pub fn clear_timeout_flags(&self) {
        self.soft_timeout.store(false, Ordering::SeqCst);
        self.hard_timeout.store(false, Ordering::SeqCst);
    }

    /// True once the turn timer delivered the soft CPU warning.
    pub fn soft_timed_out(&self) -> bool {
        self.soft_timeout.load(Ordering::SeqCst)
    }

    /// True once the turn timer hard-killed the player.
    pub fn hard_timed_out(&self) -> bool {
        self.hard_timeout.load(Ordering::SeqCst)
    }

    /// Shared timeout markers handed to the turn timer when arming.
    pub(crate) fn timeout_flags(&self) -> (Arc<AtomicBool>, Arc<AtomicBool>) {
        (self.soft_timeout.clone(), self.hard_timeout.clone())
    }

    /// Final status of the child if it terminated, waiting up to `wait` for
    /// the reaper's notification. The result is cached; later calls are free.
    pub fn poll_exit(&mut self, wait: Duration) -> Option<WaitStatus> {
        if self.exit.is_none() {
            self.exit = self.events.recv_timeout(wait).ok();
        }
        self.exit
    }

    /// Terminate the child if it is still alive.
    ///
    /// A stopped process ignores `SIGTERM` until it runs again, so the child
    /// is woken first; if it has not exited after a grace period it is
    /// killed outright.
    pub fn terminate(&mut self) {
        if self.poll_exit(Duration::ZERO).is_some() {
            return;
        }
        let _ = kill(self.pid, Signal::SIGCONT);
        let _ = kill(self.pid, Signal::SIGTERM);
        if self.poll_exit(TERM_GRACE).is_none() {
            warn!(player = %self.name, "player ignored SIGTERM, killing");
            let _ = kill(self.pid, Signal::SIGKILL);
            let _ = self.poll_exit(Duration::from_secs(1));
        }
        debug!(player = %self.name, status = ?self.exit, "player terminated");
    }
}

impl Drop for PlayerHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod process_tests {
    use super::*;
    use std::io::{Read, Write};

    fn script_player(name: &str, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!(
            "gammon-referee-test-{}-{name}.sh",
            std::process::id()
        ));
        std::fs::write(&path, format!("#!/bin/bash\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// State letter from /proc/<pid>/stat ('T' = stopped, 'S'/'R' = runnable).
    #[cfg(target_os = "linux")]
    fn proc_state(pid: Pid) -> Option<char> {
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        stat.rsplit_once(')')?.1.trim_start().chars().next()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn child_starts_stopped_and_toggles_with_the_turn() {
        let script = script_player(
            "echoer",
            r#"while IFS= read -rd '' state <&3; do printf '0 |\x00' >&4; done"#,
        );
        let mut player = PlayerHandle::spawn(
            &script,
            Side::Below,
            &Limits::none(),
            &Configuration::new().with_verbose(false),
        )
        .unwrap();

        // Freshly spawned players hold no CPU.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(proc_state(player.pid()), Some('T'));

        player.resume().unwrap();
        player.state_pipe().write_all(b"hello\0").unwrap();
        let mut reply = [0u8; 16];
        let n = player.moves_pipe().read(&mut reply).unwrap();
        assert_eq!(&reply[..n], b"0 |\0");

        player.suspend().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(proc_state(player.pid()), Some('T'));

        player.terminate();
        assert!(matches!(
            player.poll_exit(Duration::ZERO),
            Some(WaitStatus::Signaled(_, Signal::SIGTERM, _))
        ));
        let _ = std::fs::remove_file(script);
    }

    #[test]
    fn voluntary_exit_is_reported_by_the_reaper() {
        let script = script_player("quitter", "exit 7");
        let mut player = PlayerHandle::spawn(
            &script,
            Side::Above,
            &Limits::none(),
            &Configuration::new().with_verbose(false),
        )
        .unwrap();

        player.resume().unwrap();
        let status = player.poll_exit(Duration::from_secs(2));
        assert!(matches!(status, Some(WaitStatus::Exited(_, 7))));
        // Cached: a second poll returns the same without waiting.
        assert_eq!(player.poll_exit(Duration::ZERO), status);
        let _ = std::fs::remove_file(script);
    }

    #[test]
    fn exec_failure_uses_the_reserved_status() {
        let mut player = PlayerHandle::spawn(
            "/nonexistent/player/binary",
            Side::Below,
            &Limits::none(),
            &Configuration::new().with_verbose(false),
        )
        .unwrap();

        player.resume().unwrap();
        assert!(matches!(
            player.poll_exit(Duration::from_secs(2)),
            Some(WaitStatus::Exited(_, EXEC_FAILED_STATUS))
        ));
    }

    #[test]
    fn timeout_flags_are_per_turn() {
        let script = script_player("idler", "sleep 30");
        let player = PlayerHandle::spawn(
            &script,
            Side::Below,
            &Limits::none(),
            &Configuration::new().with_verbose(false),
        )
        .unwrap();

        assert!(!player.soft_timed_out() && !player.hard_timed_out());
        let (soft, hard) = player.timeout_flags();
        soft.store(true, Ordering::SeqCst);
        hard.store(true, Ordering::SeqCst);
        assert!(player.soft_timed_out() && player.hard_timed_out());
        player.clear_timeout_flags();
        assert!(!player.soft_timed_out() && !player.hard_timed_out());
        let _ = std::fs::remove_file(script);
    }
}
