use std::collections::BTreeMap;
use std::fmt::Debug;

use anyhow::Result;
use thiserror::Error;

pub mod remove_one;

pub type PlayerId = usize;

// Final per-player values of a finished game, keyed by player id
pub type Results = BTreeMap<PlayerId, u32>;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("P{player} played illegal action {action} in phase {phase}: {reason}")]
    IllegalAction {
        player: PlayerId,
        phase: String,
        action: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown player P{0}")]
    UnknownPlayer(PlayerId),

    #[error("Game is over")]
    GameOver,

    #[error("State consistency violated: {0}")]
    Inconsistent(String),
}

// An immutable game state for n player games. Every transition produces a new
// state and leaves the old one untouched. Phases are either sequential (one
// current player) or simultaneous (every active player acts before anything is
// applied).
pub trait GameState: Clone {
    type Action: Clone + Debug + PartialEq;
    type View;

    fn player_count(&self) -> usize;

    fn round(&self) -> u32;

    fn phase_name(&self) -> String;

    // The single player who has to act now, or None if the current phase is
    // simultaneous.
    fn current_player(&self) -> Option<PlayerId>;

    fn is_eliminated(&self, player: PlayerId) -> bool;

    fn legal_actions(&self, player: PlayerId) -> Vec<Self::Action>;

    fn apply(&self, action: &Self::Action, player: PlayerId) -> Result<Self, GameError>;

    // Validate every action against this state first, then apply all of them
    // as one transition.
    fn apply_batch(&self, actions: &BTreeMap<PlayerId, Self::Action>) -> Result<Self, GameError>;

    fn is_terminal(&self) -> bool;

    fn results(&self) -> Results;

    fn view_for(&self, player: PlayerId) -> Self::View;
}

// Anything that can play a seat in a game. Only `decide` is required, the
// notification hooks are there for agents that track the table.
pub trait Agent<G: GameState> {
    fn name(&self) -> &str;

    fn decide(&mut self, view: &G::View) -> G::Action;

    fn observe(&mut self, _view: &G::View, _actor: PlayerId, _action: &G::Action) {}

    fn on_game_end(&mut self, _view: &G::View, _results: &Results) {}
}

// Winner by result value, ties going to the lower player id
pub fn winner(results: &Results) -> Option<PlayerId> {
    results
        .iter()
        .rev()
        .max_by_key(|(_, value)| **value)
        .map(|(&player, _)| player)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winner_prefers_lower_id_on_ties() {
        let results = Results::from([(0, 1004), (1, 12), (2, 1004)]);
        assert_eq!(winner(&results), Some(0));

        let results = Results::from([(0, 3), (1, 1010)]);
        assert_eq!(winner(&results), Some(1));

        assert_eq!(winner(&Results::new()), None);
    }

    #[test]
    fn test_illegal_action_message_has_context() {
        let err = GameError::IllegalAction {
            player: 3,
            phase: "choose".to_string(),
            action: "ChooseFinal { card: 9 }".to_string(),
            reason: "card 9 was not revealed".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("P3"));
        assert!(message.contains("choose"));
        assert!(message.contains("card 9"));
    }
}
