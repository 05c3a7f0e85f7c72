use super::{GameError, GameState, PlayerId, Results, Validate};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub mod agents;

pub type Card = u32;

// Added to the score of every player still in the game when it ends, so that
// survivors always rank above eliminated players
pub const SURVIVOR_BONUS: u32 = 1000;

const DEFAULT_ADVANCEMENT_ROUNDS: [u32; 5] = [3, 6, 9, 12, 18];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub n_players: usize,
    pub hand_size: u32,
    // Rounds after which a player is eliminated. The last one is the final
    // round and follows a different rule.
    pub advancement_rounds: Vec<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            n_players: 7,
            hand_size: 8,
            advancement_rounds: DEFAULT_ADVANCEMENT_ROUNDS.to_vec(),
        }
    }
}

impl Config {
    pub fn check(&self) -> Result<(), GameError> {
        let invalid = |message: String| Err(GameError::InvalidConfig(message));

        if self.n_players < 2 {
            return invalid(format!("Number of players ({}) must be at least 2", self.n_players));
        }

        if self.advancement_rounds.is_empty() {
            return invalid("Advancement rounds can not be empty".to_string());
        }

        if self.advancement_rounds[0] == 0 {
            return invalid("Advancement rounds start from round 1".to_string());
        }

        if !self.advancement_rounds.windows(2).all(|w| w[0] < w[1]) {
            return invalid(format!("Advancement rounds {:?} are not strictly ascending", self.advancement_rounds));
        }

        if self.hand_size < 3 {
            return invalid(format!("Hand size ({}) must be at least 3", self.hand_size));
        }

        let max_score = (self.hand_size as u64) * (self.hand_size as u64 + 1) / 2;
        if max_score >= SURVIVOR_BONUS as u64 {
            return invalid(format!("Hand size ({}) allows scores above the survivor bonus", self.hand_size));
        }

        // Every advancement round removes at most one player and the final one
        // only fires with exactly three left
        let max_players = self.advancement_rounds.len() + 2;
        if self.n_players > max_players {
            return invalid(format!(
                "{} advancement rounds can not bring {} players down to a final pair (max {})",
                self.advancement_rounds.len(), self.n_players, max_players
            ));
        }

        Ok(())
    }

    pub fn final_round(&self) -> u32 {
        self.advancement_rounds.last().copied().unwrap_or(0)
    }

    pub fn is_advancement_round(&self, round: u32) -> bool {
        self.advancement_rounds.contains(&round)
    }

    pub fn total_cards(&self) -> usize {
        self.n_players * self.hand_size as usize
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<()> {
        Ok(self.check()?)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Select,
    Choose,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Select => write!(f, "select"),
            Phase::Choose => write!(f, "choose"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub hand: BTreeSet<Card>,
    pub holding_box: Option<Card>,
    pub score: u32,
    pub victory_tokens: u32,
    pub eliminated: bool,
    pub last_victory_round: u32,
}

impl Player {
    fn new(id: PlayerId, hand_size: u32) -> Self {
        Self {
            id,
            hand: (1..=hand_size).collect(),
            holding_box: None,
            score: 0,
            victory_tokens: 0,
            eliminated: false,
            last_victory_round: 0,
        }
    }

    // Ordering used to find the leader on a regular advancement round
    fn leader_key(&self) -> (u32, u32, u32) {
        (self.score, self.victory_tokens, self.last_victory_round)
    }

    // Ordering used to find the trailing player on the final advancement round
    fn trailer_key(&self) -> (u32, u32, Reverse<u32>) {
        (self.score, self.victory_tokens, Reverse(self.last_victory_round))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    // Reveal two distinct cards from hand
    SelectCards { cards: [Card; 2] },
    // Commit to one of the two revealed cards
    ChooseFinal { card: Card },
}

impl Action {
    pub fn select(a: Card, b: Card) -> Self {
        Action::SelectCards { cards: [a.min(b), a.max(b)] }
    }

    pub fn choose(card: Card) -> Self {
        Action::ChooseFinal { card }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Action::SelectCards { .. } => Phase::Select,
            Action::ChooseFinal { .. } => Phase::Choose,
        }
    }

    // Check this action against the given state for the given player. This
    // is what makes an action legal, `State::legal_actions` enumerates exactly
    // the actions that pass here.
    pub fn validate(&self, state: &State, player: PlayerId) -> Result<(), GameError> {
        let Some(acting) = state.players.get(player) else {
            return Err(GameError::UnknownPlayer(player));
        };

        if state.is_terminal() {
            return Err(GameError::GameOver);
        }

        let illegal = |reason: String| GameError::IllegalAction {
            player,
            phase: state.phase.to_string(),
            action: self.to_string(),
            reason,
        };

        if acting.eliminated {
            return Err(illegal("player is eliminated".to_string()));
        }

        if self.phase() != state.phase {
            return Err(illegal(format!("not a {} action", state.phase)));
        }

        match *self {
            Action::SelectCards { cards: [a, b] } => {
                if a == b {
                    return Err(illegal(format!("card {} selected twice", a)));
                }

                let pool = state.selectable_cards(player);
                for card in [a, b] {
                    if !pool.contains(&card) {
                        return Err(illegal(format!("card {} is not in hand", card)));
                    }
                }
            },
            Action::ChooseFinal { card } => {
                match state.revealed.get(&player) {
                    Some(pair) if pair.contains(&card) => {},
                    _ => return Err(illegal(format!("card {} was not revealed", card))),
                }
            },
        }

        Ok(())
    }

    pub fn is_valid(&self, state: &State, player: PlayerId) -> bool {
        self.validate(state, player).is_ok()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::SelectCards { cards: [a, b] } => write!(f, "select({}, {})", a, b),
            Action::ChooseFinal { card } => write!(f, "choose({})", card),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub players: Vec<Player>,
    pub round: u32,
    pub phase: Phase,
    // Round scoped, cleared whenever the phase goes back to select
    pub revealed: BTreeMap<PlayerId, [Card; 2]>,
    pub final_choices: BTreeMap<PlayerId, Card>,
    // Winning cards, out of circulation for good
    pub discard_pile: Vec<Card>,
    pub config: Config,
}

// Find the lowest card that was submitted by exactly one player. Returns the
// submitter and the card.
pub fn round_winner(final_choices: &BTreeMap<PlayerId, Card>) -> Option<(PlayerId, Card)> {
    let mut counts: BTreeMap<Card, usize> = BTreeMap::new();
    for &card in final_choices.values() {
        *counts.entry(card).or_insert(0) += 1;
    }

    let winning_card = counts
        .into_iter()
        .find(|&(_, count)| count == 1)
        .map(|(card, _)| card)?;

    final_choices
        .iter()
        .find(|&(_, &card)| card == winning_card)
        .map(|(&player, &card)| (player, card))
}

impl State {
    pub fn new(config: Config) -> Result<Self, GameError> {
        config.check()?;

        Ok(State {
            players: (0..config.n_players).map(|i| Player::new(i, config.hand_size)).collect(),
            round: 1,
            phase: Phase::Select,
            revealed: BTreeMap::new(),
            final_choices: BTreeMap::new(),
            discard_pile: Vec::new(),
            config,
        })
    }

    pub fn active_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| !p.eliminated)
    }

    pub fn active_count(&self) -> usize {
        self.active_players().count()
    }

    // Cards the player may reveal right now. A player who already revealed
    // this round can take the pair back and reveal again.
    pub fn selectable_cards(&self, player: PlayerId) -> BTreeSet<Card> {
        let mut pool = match self.players.get(player) {
            Some(p) => p.hand.clone(),
            None => return BTreeSet::new(),
        };
        if let Some(pair) = self.revealed.get(&player) {
            pool.extend(pair.iter().copied());
        }
        pool
    }

    // Every card instance currently in the game. Final choices point into the
    // revealed pairs so they are not counted again.
    pub fn card_total(&self) -> usize {
        let held: usize = self.players
            .iter()
            .map(|p| p.hand.len() + p.holding_box.is_some() as usize)
            .sum();

        held + self.discard_pile.len() + 2 * self.revealed.len()
    }

    // Some active player can not reveal two cards anymore
    fn is_exhausted(&self) -> bool {
        self.phase == Phase::Select
            && self.active_players().any(|p| self.selectable_cards(p.id).len() < 2)
    }

    fn all_active_in<T>(&self, entries: &BTreeMap<PlayerId, T>) -> bool {
        self.active_players().all(|p| entries.contains_key(&p.id))
    }

    // Write an already validated action into the round maps without moving
    // the phase on
    fn record(&mut self, action: &Action, player: PlayerId) {
        match *action {
            Action::SelectCards { cards } => {
                let previous = self.revealed.insert(player, cards);
                let hand = &mut self.players[player].hand;
                if let Some(previous) = previous {
                    hand.extend(previous);
                }
                for card in cards {
                    hand.remove(&card);
                }
            },
            Action::ChooseFinal { card } => {
                self.final_choices.insert(player, card);
            },
        }
    }

    // Move to choose once every active player revealed, resolve the round
    // once every active player chose
    fn advance(self) -> State {
        match self.phase {
            Phase::Select if self.all_active_in(&self.revealed) => State { phase: Phase::Choose, ..self },
            Phase::Choose if self.all_active_in(&self.final_choices) => self.resolve_round(),
            _ => self,
        }
    }

    // Score the round, move the cards around, run eliminations if this is an
    // advancement round and start the next round.
    fn resolve_round(&self) -> State {
        let mut next = self.clone();
        let winner = round_winner(&self.final_choices);

        match winner {
            Some((winner_id, card)) => {
                let player = &mut next.players[winner_id];
                player.score += card;
                player.victory_tokens += 1;
                player.last_victory_round = self.round;
                log::debug!("Round {}: P{} wins with card {}", self.round, winner_id, card);
            },
            None => log::debug!("Round {}: no unique card, nothing discarded", self.round),
        }

        for (&player_id, &pair) in &self.revealed {
            let player = &mut next.players[player_id];

            let Some(&chosen) = self.final_choices.get(&player_id) else {
                player.hand.extend(pair);
                continue;
            };

            let unchosen = if pair[0] == chosen { pair[1] } else { pair[0] };
            player.hand.insert(unchosen);
            if let Some(held) = player.holding_box.take() {
                player.hand.insert(held);
            }

            if winner.map(|(winner_id, _)| winner_id) == Some(player_id) {
                next.discard_pile.push(chosen);
            } else {
                player.holding_box = Some(chosen);
            }
        }

        next.revealed.clear();
        next.final_choices.clear();
        next.phase = Phase::Select;

        if self.config.is_advancement_round(self.round) {
            if let Some(target) = next.elimination_target() {
                next.players[target].eliminated = true;
                log::debug!("Round {}: P{} eliminated, {} players left", self.round, target, next.active_count());
            }
        }

        next.round += 1;
        next
    }

    // Player to eliminate at the end of the current round. On regular
    // advancement rounds the leader goes out. On the final one, with exactly
    // three players left, the trailing player goes out. Ties go to the lower
    // player id.
    fn elimination_target(&self) -> Option<PlayerId> {
        let active: Vec<&Player> = self.active_players().collect();

        if self.round == self.config.final_round() {
            if active.len() != 3 {
                return None;
            }
            active.iter().min_by_key(|p| p.trailer_key()).map(|p| p.id)
        } else {
            if active.len() < 2 {
                return None;
            }
            active.iter().rev().max_by_key(|p| p.leader_key()).map(|p| p.id)
        }
    }
}

impl GameState for State {
    type Action = Action;
    type View = View;

    fn player_count(&self) -> usize {
        self.players.len()
    }

    fn round(&self) -> u32 {
        self.round
    }

    fn phase_name(&self) -> String {
        self.phase.to_string()
    }

    // Both phases are simultaneous
    fn current_player(&self) -> Option<PlayerId> {
        None
    }

    fn is_eliminated(&self, player: PlayerId) -> bool {
        self.players.get(player).map_or(true, |p| p.eliminated)
    }

    fn legal_actions(&self, player: PlayerId) -> Vec<Action> {
        if self.is_eliminated(player) || self.is_terminal() {
            return Vec::new();
        }

        match self.phase {
            Phase::Select => {
                let pool: Vec<Card> = self.selectable_cards(player).into_iter().collect();
                let mut actions = Vec::with_capacity(pool.len() * pool.len().saturating_sub(1) / 2);
                for (i, &a) in pool.iter().enumerate() {
                    for &b in &pool[i + 1..] {
                        actions.push(Action::select(a, b));
                    }
                }
                actions
            },
            Phase::Choose => match self.revealed.get(&player) {
                Some(pair) => pair.iter().map(|&card| Action::choose(card)).collect(),
                None => Vec::new(),
            },
        }
    }

    fn apply(&self, action: &Action, player: PlayerId) -> Result<State, GameError> {
        action.validate(self, player)?;

        let mut next = self.clone();
        next.record(action, player);
        Ok(next.advance())
    }

    fn apply_batch(&self, actions: &BTreeMap<PlayerId, Action>) -> Result<State, GameError> {
        if self.is_terminal() {
            return Err(GameError::GameOver);
        }

        for (&player, action) in actions {
            action.validate(self, player)?;
        }

        // Every action lands in the same phase, the phase moves on at most once
        let mut next = self.clone();
        for (&player, action) in actions {
            next.record(action, player);
        }
        Ok(next.advance())
    }

    fn is_terminal(&self) -> bool {
        let active = self.active_count();
        active < 2
            || (self.round > self.config.final_round() && active <= 2)
            || self.is_exhausted()
    }

    fn results(&self) -> Results {
        self.players
            .iter()
            .map(|p| {
                let value = if p.eliminated { p.score } else { SURVIVOR_BONUS + p.score };
                (p.id, value)
            })
            .collect()
    }

    // An unknown player gets the public table with an empty private part
    fn view_for(&self, player: PlayerId) -> View {
        let me = self.players.get(player);

        View {
            player,
            round: self.round,
            phase: self.phase,
            advancement_rounds: self.config.advancement_rounds.clone(),
            table: self.players
                .iter()
                .map(|p| PublicPlayer {
                    id: p.id,
                    score: p.score,
                    victory_tokens: p.victory_tokens,
                    eliminated: p.eliminated,
                })
                .collect(),
            revealed: self.revealed.clone(),
            discard_pile: self.discard_pile.clone(),
            hand: me.map(|p| p.hand.clone()).unwrap_or_default(),
            holding_box: me.and_then(|p| p.holding_box),
            score: me.map_or(0, |p| p.score),
            victory_tokens: me.map_or(0, |p| p.victory_tokens),
            legal_actions: self.legal_actions(player),
        }
    }
}

impl Validate for State {
    fn validate(&self) -> Result<()> {
        let expected = self.config.total_cards();
        let actual = self.card_total();
        if actual != expected {
            return Err(anyhow!("Card count mismatch: {} vs {}", actual, expected));
        }

        let hand_size = self.config.hand_size as usize;
        for p in &self.players {
            let revealed = self.revealed.get(&p.id);

            if p.hand.len() + p.holding_box.is_some() as usize > hand_size {
                return Err(anyhow!("P{} holds more than {} cards", p.id, hand_size));
            }

            let mut owned: Vec<Card> = p.hand.iter().copied().collect();
            owned.extend(p.holding_box);
            owned.extend(revealed.into_iter().flatten());
            let distinct: BTreeSet<Card> = owned.iter().copied().collect();
            if distinct.len() != owned.len() {
                return Err(anyhow!("P{} has the same card in two places", p.id));
            }
            if owned.iter().any(|&c| c == 0 || c > self.config.hand_size) {
                return Err(anyhow!("P{} has a card outside 1..={}", p.id, self.config.hand_size));
            }

            if p.eliminated && (revealed.is_some() || self.final_choices.contains_key(&p.id)) {
                return Err(anyhow!("Eliminated P{} has round entries", p.id));
            }
        }

        for (player, card) in &self.final_choices {
            match self.revealed.get(player) {
                Some(pair) if pair.contains(card) => {},
                _ => return Err(anyhow!("P{} chose card {} without revealing it", player, card)),
            }
        }

        if self.phase == Phase::Select && !self.final_choices.is_empty() {
            return Err(anyhow!("Final choices recorded during the select phase"));
        }

        Ok(())
    }
}

// Public record of a player, as every other player sees it
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PublicPlayer {
    pub id: PlayerId,
    pub score: u32,
    pub victory_tokens: u32,
    pub eliminated: bool,
}

// What one player is allowed to know about the state, plus what they are
// allowed to do in it. Other players' hands, holding boxes and final choices
// never show up here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct View {
    pub player: PlayerId,
    pub round: u32,
    pub phase: Phase,
    pub advancement_rounds: Vec<u32>,
    pub table: Vec<PublicPlayer>,
    pub revealed: BTreeMap<PlayerId, [Card; 2]>,
    pub discard_pile: Vec<Card>,
    pub hand: BTreeSet<Card>,
    pub holding_box: Option<Card>,
    pub score: u32,
    pub victory_tokens: u32,
    pub legal_actions: Vec<Action>,
}

impl View {
    pub fn my_revealed(&self) -> Option<[Card; 2]> {
        self.revealed.get(&self.player).copied()
    }

    pub fn active_opponents(&self) -> impl Iterator<Item = &PublicPlayer> {
        self.table.iter().filter(move |p| p.id != self.player && !p.eliminated)
    }
}
