//! Game state, moves and board layout shared between the supervisor and players.
//!
//! The board is an array of 26 signed slots: slot 0 is the bar, slots 1..=24
//! are the points and slot 25 collects the borne-off checkers. Positive
//! counts belong to the player sitting below the board, negative counts to
//! the player sitting above. A point never holds checkers of both players at
//! the same time; the bar and the off slot are the two exceptions (see
//! [`GameState::bar`] and [`GameState::board`]).

use std::fmt;

use rand::Rng;

/// Number of actual points on the board.
pub const POINTS: usize = 24;
/// Initial number of checkers for each player.
pub const NUM_CHECKERS: i16 = 15;
/// Maximum number of elementary moves in one turn (doubles use each die twice).
pub const MAX_MOVES: usize = 4;
/// Board index of the bar.
pub const POS_BAR: usize = 0;
/// Board index of the off-board slot.
pub const POS_OFF: usize = POINTS + 1;

/// One of the two sides of the board.
///
/// `Below` is encoded as `1` on the wire and owns the positive checker
/// counts; `Above` is encoded as `-1` and owns the negative counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The player "sitting" below the board (positive counts, `P1`).
    Below,
    /// The player "sitting" above the board (negative counts, `P-1`).
    Above,
}

impl Side {
    /// Wire/board sign of this side.
    pub fn sign(self) -> i16 {
        match self {
            Side::Below => 1,
            Side::Above => -1,
        }
    }

    /// Inverse of [`Side::sign`].
    pub fn from_sign(sign: i16) -> Option<Side> {
        match sign {
            1 => Some(Side::Below),
            -1 => Some(Side::Above),
            _ => None,
        }
    }

    /// The other side.
    pub fn opponent(self) -> Side {
        match self {
            Side::Below => Side::Above,
            Side::Above => Side::Below,
        }
    }

    /// Stable index (0 = below, 1 = above), used to address per-player data.
    pub fn index(self) -> usize {
        match self {
            Side::Below => 0,
            Side::Above => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.sign())
    }
}

/// Full state of a running game: active side, current dice roll and board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    /// The side expected to move next.
    pub active: Side,
    /// Current roll. Both dice hold 1..=6 and may be equal (doubles).
    pub dice: [u8; 2],
    /// Bar, points 1..=24 and off slot, indexed by [`POS_BAR`]..=[`POS_OFF`].
    ///
    /// The bar slot packs both players' counts into one value: below's
    /// checkers live in the two low decimal digits, above's in the next two
    /// (decimal `103` = 3 below + 1 above). The off slot holds the signed
    /// sum of all borne-off checkers.
    pub board: [i16; POINTS + 2],
}

impl GameState {
    /// The standard opening position. Below moves first until the opening
    /// roll decides otherwise.
    pub fn initial() -> GameState {
        let mut board = [0i16; POINTS + 2];

        // Above's checkers
        board[1] = -2;
        board[17] = -3;
        board[12] = -5;
        board[19] = -5;

        // Below's checkers, mirrored
        board[POINTS + 1 - 1] = 2;
        board[POINTS + 1 - 17] = 3;
        board[POINTS + 1 - 12] = 5;
        board[POINTS + 1 - 19] = 5;

        GameState {
            active: Side::Below,
            dice: [0, 0],
            board,
        }
    }

    /// Number of checkers `side` currently has on the bar.
    pub fn bar(&self, side: Side) -> i16 {
        match side {
            Side::Below => self.board[POS_BAR] % 100,
            Side::Above => self.board[POS_BAR] / 100,
        }
    }

    /// Set the number of checkers `side` has on the bar without touching the
    /// opponent's count.
    pub fn set_bar(&mut self, side: Side, count: i16) {
        debug_assert!((0..=NUM_CHECKERS).contains(&count));
        let slot = &mut self.board[POS_BAR];
        *slot = match side {
            Side::Below => (*slot / 100) * 100 + count,
            Side::Above => count * 100 + *slot % 100,
        };
    }

    /// True if every checker of both players is accounted for: for each side,
    /// points + bar + off must sum to [`NUM_CHECKERS`].
    pub fn is_consistent(&self) -> bool {
        let mut below = self.bar(Side::Below);
        let mut above = self.bar(Side::Above);
        for point in &self.board[1..=POINTS] {
            if *point > 0 {
                below += point;
            } else {
                above -= point;
            }
        }
        let off_below = NUM_CHECKERS - below;
        let off_above = NUM_CHECKERS - above;
        (0..=NUM_CHECKERS).contains(&off_below)
            && (0..=NUM_CHECKERS).contains(&off_above)
            && self.board[POS_OFF] == off_below - off_above
    }
}

/// Throw the pair of dice for one ply.
pub fn throw_dice() -> [u8; 2] {
    let mut rng = rand::rng();
    [rng.random_range(1..=6), rng.random_range(1..=6)]
}

/// Move of a single checker: departure point and the die used.
///
/// `from` 0 means entering from the bar; `roll` must equal one of the two
/// dice of the current [`GameState`]. When bearing off, `from + roll` may
/// point beyond the off slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    /// Departure point (0 = bar, 1..=24 = point).
    pub from: u16,
    /// Die value used for this move.
    pub roll: u16,
}

/// A full turn: an ordered sequence of up to [`MAX_MOVES`] elementary moves.
///
/// An empty sequence is a valid "pass" turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MultiMove {
    moves: Vec<Move>,
}

impl MultiMove {
    /// The empty (pass) turn.
    pub fn pass() -> MultiMove {
        MultiMove::default()
    }

    /// Build a turn from elementary moves.
    ///
    /// # Errors
    /// Fails if more than [`MAX_MOVES`] moves are given.
    pub fn new(moves: Vec<Move>) -> anyhow::Result<MultiMove> {
        anyhow::ensure!(
            moves.len() <= MAX_MOVES,
            "a turn holds at most {MAX_MOVES} moves, got {}",
            moves.len()
        );
        Ok(MultiMove { moves })
    }

    /// Number of elementary moves in this turn.
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// True for a pass turn.
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// The elementary moves, in playing order.
    pub fn moves(&self) -> &[Move] {
        &self.moves
    }
}
