//! Interface to the rules engine consumed by the supervisor.
//!
//! The supervisor validates and applies moves, detects the end of the game
//! and scores it exclusively through this trait; it never inspects the board
//! itself. Bring your own implementation (or a recorded one for testing).

use crate::state::{GameState, Move, MultiMove};

/// Move legality, board mutation and scoring for one game variant.
pub trait Rules {
    /// Non-mutating legality check of a single move against the current
    /// board and dice.
    fn check(&self, state: &GameState, mv: &Move) -> bool;

    /// Apply a single move in place. The caller must have validated it with
    /// [`Rules::check`] first.
    fn apply(&self, state: &mut GameState, mv: &Move);

    /// Apply a full turn, all or nothing.
    ///
    /// Either every elementary move is legal, their combination satisfies
    /// the dice (each die used at most its allowed number of times, four
    /// uses on doubles) and `state` is fully updated, or nothing is applied
    /// and `state` is left untouched. The supervisor relies on this
    /// atomicity: a half-mutated state must never exist.
    fn apply_multi(&self, state: &mut GameState, mmove: &MultiMove) -> bool;

    /// True once the game is over.
    fn is_terminal(&self, state: &GameState) -> bool;

    /// Result of a finished game as a signed magnitude: the sign names the
    /// winning side (positive = below, negative = above), the absolute value
    /// the kind of win (1 plain, 2 gammon, 3 backgammon), 0 a draw.
    ///
    /// Only meaningful when [`Rules::is_terminal`] returned true.
    fn winner(&self, state: &GameState) -> i32;
}
