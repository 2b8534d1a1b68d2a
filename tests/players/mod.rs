//! Shared scaffolding: bash players written to the temp directory and a
//! rules stub that ends the game after a fixed number of plies.

use std::cell::Cell;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use gammon_referee::prelude::*;

/// Write a bash player into the temp directory and return its path.
pub fn script_player(name: &str, body: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "gammon-referee-match-{}-{name}.sh",
        std::process::id()
    ));
    std::fs::write(&path, format!("#!/bin/bash\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A player that answers every state with an immediate pass.
pub fn passer(name: &str) -> PathBuf {
    script_player(
        name,
        r#"while IFS= read -rd '' state <&3; do printf '0 |\x00' >&4; done"#,
    )
}

/// Accepts every reply and calls the game over after a fixed number of plies.
pub struct FixedLengthRules {
    plies: Cell<u32>,
    end_after: u32,
    verdict: i32,
}

impl FixedLengthRules {
    pub fn new(end_after: u32, verdict: i32) -> FixedLengthRules {
        FixedLengthRules {
            plies: Cell::new(0),
            end_after,
            verdict,
        }
    }
}

impl Rules for FixedLengthRules {
    fn check(&self, _state: &GameState, _mv: &Move) -> bool {
        true
    }

    fn apply(&self, _state: &mut GameState, _mv: &Move) {}

    fn apply_multi(&self, _state: &mut GameState, _mmove: &MultiMove) -> bool {
        self.plies.set(self.plies.get() + 1);
        true
    }

    fn is_terminal(&self, _state: &GameState) -> bool {
        self.plies.get() >= self.end_after
    }

    fn winner(&self, _state: &GameState) -> i32 {
        self.verdict
    }
}
