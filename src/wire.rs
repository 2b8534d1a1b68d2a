//! Line-oriented wire protocol between the supervisor and a player process.
//!
//! Messages are short NUL-terminated ASCII strings, never longer than
//! [`MESSAGE_MAX`] bytes and written with a single `write` so they stay
//! atomic on a pipe. Two message kinds exist:
//!
//! - state: `<player> <d0>-<d1>: (<bar_above> <bar_below>) <off> | <p1> … <p24>`
//! - moves: `<count> | (<from>,<roll>) …` with 0 to 4 pairs
//!
//! Each endpoint owns a codec for its role: the supervisor holds an
//! [`EngineCodec`] (sends states, reads moves), a player client holds a
//! [`PlayerCodec`] (reads states, sends moves). A codec tracks its last
//! action and panics when sends and reads stop alternating — that situation
//! means the two sides are out of sync, which is an integration bug and not
//! something a running match can recover from.

use std::io::{Read, Write};

use thiserror::Error;
use tracing::trace;

use crate::state::{GameState, Move, MultiMove, Side, MAX_MOVES, NUM_CHECKERS, POINTS, POS_OFF};

/// Maximum message size in bytes, terminating NUL included.
pub const MESSAGE_MAX: usize = 512;

/// A message could not be transferred or parsed.
#[derive(Debug, Error)]
pub enum WireError {
    /// Reading or writing the underlying pipe failed.
    #[error("message I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The peer closed its end of the pipe.
    #[error("peer closed the pipe")]
    Closed,
    /// The encoded message would not fit in [`MESSAGE_MAX`] bytes.
    #[error("message longer than {MESSAGE_MAX} bytes")]
    TooLong,
    /// A state message did not scan into exactly 30 numeric fields.
    #[error("malformed state message: {0}")]
    BadState(String),
    /// A move message declared a different number of moves than it contained.
    #[error("move message declares {declared} moves but holds {found}")]
    MoveCountMismatch {
        /// Count field at the start of the message.
        declared: usize,
        /// Number of `(from,roll)` pairs actually present.
        found: usize,
    },
    /// A move message could not be scanned at all.
    #[error("malformed move message: {0}")]
    BadMoves(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastAction {
    Init,
    Read,
    Send,
}

/// Supervisor-side codec: sends states, reads move replies.
#[derive(Debug)]
pub struct EngineCodec {
    last: LastAction,
}

impl Default for EngineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineCodec {
    /// A fresh codec; the first action must be a send.
    pub fn new() -> EngineCodec {
        EngineCodec {
            last: LastAction::Init,
        }
    }

    /// Serialize `state` and write it as one message.
    pub fn send_state<W: Write>(&mut self, to: &mut W, state: &GameState) -> Result<(), WireError> {
        assert!(
            self.last != LastAction::Send,
            "engine sent twice in a row: sends and reads must alternate strictly"
        );
        self.last = LastAction::Send;

        let msg = encode_state(state);
        trace!("> {msg}");
        write_message(to, &msg)
    }

    /// Block for the player's move reply and decode it.
    pub fn read_moves<R: Read>(&mut self, from: &mut R) -> Result<MultiMove, WireError> {
        assert!(
            self.last == LastAction::Send,
            "engine read without a preceding send: sends and reads must alternate strictly"
        );
        self.last = LastAction::Read;

        let msg = read_message(from)?;
        trace!("< {msg}");
        decode_moves(&msg)
    }
}

/// Player-side codec: reads states, sends move replies.
///
/// Meant for player clients written in Rust; the supervisor never holds one.
#[derive(Debug)]
pub struct PlayerCodec {
    last: LastAction,
}

impl Default for PlayerCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerCodec {
    /// A fresh codec; the first action must be a read.
    pub fn new() -> PlayerCodec {
        PlayerCodec {
            last: LastAction::Init,
        }
    }

    /// Block for the next state message and decode it.
    pub fn read_state<R: Read>(&mut self, from: &mut R) -> Result<GameState, WireError> {
        assert!(
            self.last != LastAction::Read,
            "player read twice in a row: sends and reads must alternate strictly"
        );
        self.last = LastAction::Read;

        let msg = read_message(from)?;
        decode_state(&msg)
    }

    /// Serialize a full turn and write it as one message.
    pub fn send_moves<W: Write>(&mut self, to: &mut W, mmove: &MultiMove) -> Result<(), WireError> {
        assert!(
            self.last == LastAction::Read,
            "player sent without a preceding read: sends and reads must alternate strictly"
        );
        self.last = LastAction::Send;

        write_message(to, &encode_moves(mmove))
    }
}

/// Render `state` in the wire format, without the terminating NUL.
pub fn encode_state(state: &GameState) -> String {
    let mut msg = format!(
        "{} {}-{}: ({} {}) {} |",
        state.active.sign(),
        state.dice[0],
        state.dice[1],
        state.bar(Side::Above),
        state.bar(Side::Below),
        state.board[POS_OFF],
    );
    for point in &state.board[1..=POINTS] {
        msg.push_str(&format!(" {point}"));
    }
    msg
}

/// Parse a state message. Exactly 30 numeric fields must scan.
pub fn decode_state(msg: &str) -> Result<GameState, WireError> {
    let bad = |what: &str| WireError::BadState(format!("{what} in {msg:?}"));

    let mut scan = Scanner::new(msg);
    let sign: i16 = scan.int().ok_or_else(|| bad("missing player"))?;
    let active = Side::from_sign(sign).ok_or_else(|| bad("player is not 1 or -1"))?;

    let d0: u16 = scan.int().ok_or_else(|| bad("missing first die"))?;
    scan.expect('-').ok_or_else(|| bad("missing '-'"))?;
    let d1: u16 = scan.int().ok_or_else(|| bad("missing second die"))?;
    scan.expect(':').ok_or_else(|| bad("missing ':'"))?;

    scan.expect('(').ok_or_else(|| bad("missing '('"))?;
    let bar_above: i16 = scan.int().ok_or_else(|| bad("missing above bar count"))?;
    let bar_below: i16 = scan.int().ok_or_else(|| bad("missing below bar count"))?;
    scan.expect(')').ok_or_else(|| bad("missing ')'"))?;
    for bar in [bar_above, bar_below] {
        if !(0..=NUM_CHECKERS).contains(&bar) {
            return Err(bad("bar count out of range"));
        }
    }

    let off: i16 = scan.int().ok_or_else(|| bad("missing off count"))?;
    scan.expect('|').ok_or_else(|| bad("missing '|'"))?;

    let mut state = GameState {
        active,
        dice: [
            u8::try_from(d0).map_err(|_| bad("die out of range"))?,
            u8::try_from(d1).map_err(|_| bad("die out of range"))?,
        ],
        board: [0; POINTS + 2],
    };
    state.board[POS_OFF] = off;
    state.set_bar(Side::Above, bar_above);
    state.set_bar(Side::Below, bar_below);
    for point in 1..=POINTS {
        state.board[point] = scan.int().ok_or_else(|| bad("missing point count"))?;
    }

    Ok(state)
}

/// Render a full turn in the wire format, without the terminating NUL.
pub fn encode_moves(mmove: &MultiMove) -> String {
    let mut msg = format!("{} |", mmove.len());
    for mv in mmove.moves() {
        msg.push_str(&format!(" ({},{})", mv.from, mv.roll));
    }
    msg
}

/// Parse a move message.
///
/// Succeeds only if the declared count equals the number of pairs found;
/// as with the state scanner, anything past the fourth pair is ignored.
pub fn decode_moves(msg: &str) -> Result<MultiMove, WireError> {
    let bad = |what: &str| WireError::BadMoves(format!("{what} in {msg:?}"));

    let mut scan = Scanner::new(msg);
    let declared: usize = scan.int().ok_or_else(|| bad("missing move count"))?;
    scan.expect('|').ok_or_else(|| bad("missing '|'"))?;

    let mut moves = Vec::new();
    for _ in 0..MAX_MOVES {
        let mut pair = scan.clone();
        if pair.expect('(').is_none() {
            break;
        }
        let from: u16 = match pair.int() {
            Some(v) => v,
            None => break,
        };
        if pair.expect(',').is_none() {
            break;
        }
        let roll: u16 = match pair.int() {
            Some(v) => v,
            None => break,
        };
        if pair.expect(')').is_none() {
            break;
        }
        scan = pair;
        moves.push(Move { from, roll });
    }

    if moves.len() != declared {
        return Err(WireError::MoveCountMismatch {
            declared,
            found: moves.len(),
        });
    }
    Ok(MultiMove::new(moves).expect("scanner yields at most MAX_MOVES moves"))
}

/// Write one NUL-terminated message with a single `write`.
fn write_message<W: Write>(to: &mut W, msg: &str) -> Result<(), WireError> {
    if msg.len() + 1 > MESSAGE_MAX {
        return Err(WireError::TooLong);
    }
    let mut buf = Vec::with_capacity(msg.len() + 1);
    buf.extend_from_slice(msg.as_bytes());
    buf.push(0);
    to.write_all(&buf)?;
    to.flush()?;
    Ok(())
}

/// Read one message. A message is written atomically by the peer, so a
/// single read returns it whole; the terminating NUL (and anything after
/// it) is stripped.
fn read_message<R: Read>(from: &mut R) -> Result<String, WireError> {
    let mut buf = [0u8; MESSAGE_MAX];
    let n = from.read(&mut buf)?;
    if n == 0 {
        return Err(WireError::Closed);
    }
    let end = buf[..n].iter().position(|b| *b == 0).unwrap_or(n);
    String::from_utf8(buf[..end].to_vec())
        .map_err(|_| WireError::BadMoves("message is not valid UTF-8".to_owned()))
}

/// Cursor over a message, whitespace-lenient like an `sscanf` format:
/// any run of spaces may separate tokens.
#[derive(Debug, Clone)]
struct Scanner<'a> {
    rest: &'a str,
}

impl<'a> Scanner<'a> {
    fn new(msg: &'a str) -> Scanner<'a> {
        Scanner { rest: msg }
    }

    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    /// Consume `token` if it is next, ignoring leading whitespace.
    fn expect(&mut self, token: char) -> Option<()> {
        self.skip_ws();
        self.rest = self.rest.strip_prefix(token)?;
        Some(())
    }

    /// Consume an optionally signed decimal integer.
    fn int<T: std::str::FromStr>(&mut self) -> Option<T> {
        self.skip_ws();
        let digits_start = usize::from(self.rest.starts_with('-'));
        let end = self.rest[digits_start..]
            .find(|c: char| !c.is_ascii_digit())
            .map(|i| i + digits_start)
            .unwrap_or(self.rest.len());
        let (number, rest) = self.rest.split_at(end);
        let value = number.parse().ok()?;
        self.rest = rest;
        Some(value)
    }
}

#[cfg(test)]
mod wire_tests {
    use super::*;
    use crate::state::POS_BAR;
    use rand::Rng;

    #[test]
    fn initial_state_message() {
        let state = GameState {
            dice: [3, 5],
            ..GameState::initial()
        };
        let msg = encode_state(&state);
        assert_eq!(
            msg,
            "1 3-5: (0 0) 0 | -2 0 0 0 0 5 0 3 0 0 0 -5 5 0 0 0 -3 0 -5 0 0 0 0 2"
        );
        assert_eq!(decode_state(&msg).unwrap(), state);
    }

    #[test]
    fn state_round_trip_random_boards() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let mut state = GameState {
                active: if rng.random_bool(0.5) {
                    Side::Below
                } else {
                    Side::Above
                },
                dice: [rng.random_range(1..=6), rng.random_range(1..=6)],
                board: [0; POINTS + 2],
            };
            // Scatter both players' checkers over points, bar and off.
            for side in [Side::Below, Side::Above] {
                let mut left = NUM_CHECKERS;
                while left > 0 {
                    let stack = rng.random_range(1..=left);
                    match rng.random_range(0..=POINTS + 1) {
                        0 => state.set_bar(side, state.bar(side) + stack),
                        p if p == POS_OFF => {
                            state.board[POS_OFF] += stack * side.sign();
                        }
                        p => {
                            // Points are single-owner; skip occupied ones.
                            if state.board[p] * side.sign() < 0 {
                                continue;
                            }
                            state.board[p] += stack * side.sign();
                        }
                    }
                    left -= stack;
                }
            }
            assert!(state.is_consistent());
            assert_eq!(decode_state(&encode_state(&state)).unwrap(), state);
        }
    }

    #[test]
    fn state_with_checkers_on_both_bars() {
        let mut state = GameState::initial();
        state.dice = [6, 6];
        state.active = Side::Above;
        state.board[24] = 0;
        state.set_bar(Side::Below, 2);
        state.board[1] = -1;
        state.set_bar(Side::Above, 1);
        assert_eq!(state.board[POS_BAR], 102);

        let msg = encode_state(&state);
        assert!(msg.starts_with("-1 6-6: (1 2) 0 |"));
        assert_eq!(decode_state(&msg).unwrap(), state);
    }

    #[test]
    fn state_decode_needs_all_thirty_fields() {
        let state = GameState {
            dice: [2, 4],
            ..GameState::initial()
        };
        let msg = encode_state(&state);
        let truncated = msg.rsplit_once(' ').unwrap().0;
        assert!(matches!(
            decode_state(truncated),
            Err(WireError::BadState(_))
        ));
        assert!(matches!(
            decode_state("7 2-4: (0 0) 0 | 1 2 3"),
            Err(WireError::BadState(_))
        ));
    }

    #[test]
    fn move_messages() {
        let mmove = MultiMove::new(vec![
            Move { from: 1, roll: 3 },
            Move { from: 12, roll: 5 },
        ])
        .unwrap();
        let msg = encode_moves(&mmove);
        assert_eq!(msg, "2 | (1,3) (12,5)");
        assert_eq!(decode_moves(&msg).unwrap(), mmove);

        assert_eq!(encode_moves(&MultiMove::pass()), "0 |");
        assert_eq!(decode_moves("0 |").unwrap(), MultiMove::pass());
    }

    #[test]
    fn move_count_must_match_pairs() {
        assert!(matches!(
            decode_moves("2 | (1,3)"),
            Err(WireError::MoveCountMismatch {
                declared: 2,
                found: 1
            })
        ));
        assert!(matches!(
            decode_moves("1 | (1,3) (12,5)"),
            Err(WireError::MoveCountMismatch {
                declared: 1,
                found: 2
            })
        ));
        // More moves than a turn can hold never parse.
        assert!(decode_moves("5 | (1,1) (2,1) (3,1) (4,1) (5,1)").is_err());
    }

    #[test]
    fn codecs_round_trip_over_a_buffer() {
        let state = GameState {
            dice: [6, 2],
            ..GameState::initial()
        };
        let mut engine = EngineCodec::new();
        let mut player = PlayerCodec::new();

        let mut to_player = Vec::new();
        engine.send_state(&mut to_player, &state).unwrap();
        assert_eq!(*to_player.last().unwrap(), 0);
        let seen = player.read_state(&mut to_player.as_slice()).unwrap();
        assert_eq!(seen, state);

        let reply = MultiMove::new(vec![Move { from: 24, roll: 6 }]).unwrap();
        let mut to_engine = Vec::new();
        player.send_moves(&mut to_engine, &reply).unwrap();
        let got = engine.read_moves(&mut to_engine.as_slice()).unwrap();
        assert_eq!(got, reply);
    }

    #[test]
    #[should_panic(expected = "alternate strictly")]
    fn engine_must_not_send_twice() {
        let state = GameState::initial();
        let mut engine = EngineCodec::new();
        let mut sink = Vec::new();
        engine.send_state(&mut sink, &state).unwrap();
        let _ = engine.send_state(&mut sink, &state);
    }

    #[test]
    #[should_panic(expected = "alternate strictly")]
    fn engine_must_not_read_first() {
        let mut engine = EngineCodec::new();
        let _ = engine.read_moves(&mut "0 |\0".as_bytes());
    }

    #[test]
    #[should_panic(expected = "alternate strictly")]
    fn player_must_not_read_twice() {
        let state = GameState::initial();
        let msg = {
            let mut buf = Vec::new();
            EngineCodec::new().send_state(&mut buf, &state).unwrap();
            buf
        };
        let mut player = PlayerCodec::new();
        player.read_state(&mut msg.as_slice()).unwrap();
        let _ = player.read_state(&mut msg.as_slice());
    }

    #[test]
    fn closed_pipe_is_reported() {
        let mut engine = EngineCodec::new();
        let mut empty: &[u8] = &[];
        engine.send_state(&mut Vec::new(), &GameState::initial()).unwrap();
        assert!(matches!(
            engine.read_moves(&mut empty),
            Err(WireError::Closed)
        ));
    }
}
