use super::{Action, Card, Phase, State, View};
use crate::games::{Agent, PlayerId, Results};
use clap::ValueEnum;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Random,
    Greedy,
    Counter,
    Evaluator,
}

impl AgentKind {
    pub fn label(&self) -> &'static str {
        match self {
            AgentKind::Random => "Random",
            AgentKind::Greedy => "Greedy",
            AgentKind::Counter => "Counter",
            AgentKind::Evaluator => "Evaluator",
        }
    }

    // Seed is only used by agents that make random choices
    pub fn build(&self, name: String, seed: u64) -> Box<dyn Agent<State>> {
        match self {
            AgentKind::Random => Box::new(RandomAgent::new(name, seed)),
            AgentKind::Greedy => Box::new(GreedyAgent { name }),
            AgentKind::Counter => Box::new(CounterAgent::new(name)),
            AgentKind::Evaluator => Box::new(EvaluatorAgent { name }),
        }
    }
}

// Used only when a view carries no legal action, which the engine never asks
// for. Whatever comes back here gets rejected by validation.
fn fallback(view: &View) -> Action {
    view.legal_actions.first().copied().unwrap_or(Action::select(1, 2))
}

// Opponents whose currently revealed pair contains the card
fn revealed_by_opponents(view: &View, card: Card) -> usize {
    view.revealed
        .iter()
        .filter(|(&player, pair)| player != view.player && pair.contains(&card))
        .count()
}

pub struct RandomAgent {
    name: String,
    rng: ChaCha8Rng,
}

impl RandomAgent {
    pub fn new(name: String, seed: u64) -> Self {
        Self { name, rng: ChaCha8Rng::seed_from_u64(seed) }
    }
}

impl Agent<State> for RandomAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn decide(&mut self, view: &View) -> Action {
        match view.legal_actions.choose(&mut self.rng) {
            Some(&action) => action,
            None => fallback(view),
        }
    }
}

// Always goes for the lowest cards
pub struct GreedyAgent {
    name: String,
}

impl Agent<State> for GreedyAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn decide(&mut self, view: &View) -> Action {
        match view.phase {
            Phase::Select => {
                let mut cards = view.hand.iter();
                match (cards.next(), cards.next()) {
                    (Some(&a), Some(&b)) => Action::select(a, b),
                    _ => fallback(view),
                }
            },
            Phase::Choose => match view.my_revealed() {
                Some([a, b]) => Action::choose(a.min(b)),
                None => fallback(view),
            },
        }
    }
}

// Keeps track of the cards each opponent has revealed over the game and avoids
// cards that are likely to collide.
pub struct CounterAgent {
    name: String,
    seen: BTreeMap<PlayerId, BTreeSet<Card>>,
}

impl CounterAgent {
    pub fn new(name: String) -> Self {
        Self { name, seen: BTreeMap::new() }
    }

    fn win_chance(&self, view: &View, card: Card) -> f64 {
        let opponents: Vec<PlayerId> = view.active_opponents().map(|p| p.id).collect();

        let known = opponents
            .iter()
            .filter(|&&id| self.seen.get(&id).is_some_and(|cards| cards.contains(&card)))
            .count();
        let conflict = 0.3 * known as f64 + 0.5 * revealed_by_opponents(view, card) as f64;

        let base = 1.0 / card as f64;
        base * (1.0 - conflict / opponents.len().max(1) as f64)
    }

    fn by_chance(&self, view: &View, a: Card, b: Card) -> Ordering {
        self.win_chance(view, b)
            .partial_cmp(&self.win_chance(view, a))
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    }
}

impl Agent<State> for CounterAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn decide(&mut self, view: &View) -> Action {
        match view.phase {
            Phase::Select => {
                let mut cards: Vec<Card> = view.hand.iter().copied().collect();
                cards.sort_by(|&a, &b| self.by_chance(view, a, b));
                match cards[..] {
                    [a, b, ..] => Action::select(a, b),
                    _ => fallback(view),
                }
            },
            Phase::Choose => match view.my_revealed() {
                Some([a, b]) => {
                    let best = if self.by_chance(view, a, b) == Ordering::Greater { b } else { a };
                    Action::choose(best)
                },
                None => fallback(view),
            },
        }
    }

    fn observe(&mut self, view: &View, actor: PlayerId, action: &Action) {
        if actor == view.player {
            return;
        }

        if let Action::SelectCards { cards } = action {
            self.seen.entry(actor).or_default().extend(cards.iter().copied());
        }
    }

    fn on_game_end(&mut self, view: &View, results: &Results) {
        log::debug!("{} finished with {:?}, tracked {} opponents", self.name, results.get(&view.player), self.seen.len());
        self.seen.clear();
    }
}

// Reveals one low card to play next to a high decoy, then plays whichever of
// the two no opponent has revealed, lowest first.
pub struct EvaluatorAgent {
    name: String,
}

impl EvaluatorAgent {
    fn pair_value(low: Card, high: Card) -> f64 {
        1.0 / low as f64 - 0.5 / high as f64
    }
}

impl Agent<State> for EvaluatorAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn decide(&mut self, view: &View) -> Action {
        match view.phase {
            Phase::Select => view.legal_actions
                .iter()
                .copied()
                .filter_map(|action| match action {
                    Action::SelectCards { cards: [low, high] } => Some((action, Self::pair_value(low, high))),
                    Action::ChooseFinal { .. } => None,
                })
                .fold(None, |best: Option<(Action, f64)>, (action, value)| match best {
                    Some((_, best_value)) if best_value >= value => best,
                    _ => Some((action, value)),
                })
                .map(|(action, _)| action)
                .unwrap_or_else(|| fallback(view)),
            Phase::Choose => match view.my_revealed() {
                Some(pair) => {
                    let card = pair
                        .iter()
                        .copied()
                        .min_by_key(|&card| (revealed_by_opponents(view, card), card))
                        .unwrap_or(pair[0]);
                    Action::choose(card)
                },
                None => fallback(view),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::remove_one::Config;
    use crate::games::GameState;

    fn state(n_players: usize) -> State {
        State::new(Config { n_players, ..Config::default() }).unwrap()
    }

    fn decide_all(state: &State, agents: &mut [Box<dyn Agent<State>>]) -> BTreeMap<PlayerId, Action> {
        agents
            .iter_mut()
            .enumerate()
            .map(|(player, agent)| (player, agent.decide(&state.view_for(player))))
            .collect()
    }

    #[test]
    fn test_every_agent_plays_legal_actions() {
        for kind in [AgentKind::Random, AgentKind::Greedy, AgentKind::Counter, AgentKind::Evaluator] {
            let mut current = state(4);
            let mut agents: Vec<Box<dyn Agent<State>>> = (0..4)
                .map(|i| kind.build(format!("{}_{}", kind.label(), i), i as u64))
                .collect();

            for _ in 0..6 {
                let actions = decide_all(&current, &mut agents);
                for (&player, action) in &actions {
                    assert!(current.legal_actions(player).contains(action), "{:?} {:?}", kind, action);
                }
                current = current.apply_batch(&actions).unwrap();
            }
        }
    }

    #[test]
    fn test_greedy_plays_lowest() {
        let state = state(3);
        let mut agent = AgentKind::Greedy.build("Greedy".to_string(), 0);

        let action = agent.decide(&state.view_for(0));
        assert_eq!(action, Action::select(1, 2));

        let choosing = state
            .apply_batch(&BTreeMap::from([
                (0, Action::select(4, 6)),
                (1, Action::select(1, 2)),
                (2, Action::select(1, 2)),
            ]))
            .unwrap();
        assert_eq!(agent.decide(&choosing.view_for(0)), Action::choose(4));
    }

    #[test]
    fn test_random_is_reproducible() {
        let state = state(3);
        let view = state.view_for(1);

        let mut a = RandomAgent::new("a".to_string(), 11);
        let mut b = RandomAgent::new("b".to_string(), 11);
        let picks_a: Vec<Action> = (0..10).map(|_| a.decide(&view)).collect();
        let picks_b: Vec<Action> = (0..10).map(|_| b.decide(&view)).collect();
        assert_eq!(picks_a, picks_b);
    }

    #[test]
    fn test_counter_tracks_opponents() {
        let state = state(3);
        let mut agent = CounterAgent::new("Counter".to_string());
        let view = state.view_for(0);

        agent.observe(&view, 1, &Action::select(1, 2));
        agent.observe(&view, 2, &Action::select(1, 3));
        agent.observe(&view, 0, &Action::select(5, 6));
        agent.observe(&view, 2, &Action::choose(1));

        assert_eq!(agent.seen.len(), 2);
        assert_eq!(agent.seen[&2], BTreeSet::from([1, 3]));
        assert!(agent.win_chance(&view, 1) < 1.0);
        assert_eq!(agent.win_chance(&view, 4), 0.25);

        // Card 1 is known for both opponents, card 2 only for one
        assert_eq!(agent.decide(&view), Action::select(1, 2));

        agent.on_game_end(&view, &state.results());
        assert!(agent.seen.is_empty());
    }

    #[test]
    fn test_counter_avoids_revealed_collisions() {
        let state = state(2);
        let choosing = state
            .apply_batch(&BTreeMap::from([(0, Action::select(1, 2)), (1, Action::select(1, 5))]))
            .unwrap();

        let mut agent = CounterAgent::new("Counter".to_string());
        // Chance for 1 is (1 - 0.5) = 0.5, chance for 2 is 0.5 as well, lower card first
        assert_eq!(agent.decide(&choosing.view_for(0)), Action::choose(1));

        agent.observe(&state.view_for(0), 1, &Action::select(1, 5));
        // 1 is now known as well: 1 * (1 - 0.8) < 0.5
        assert_eq!(agent.decide(&choosing.view_for(0)), Action::choose(2));
    }

    #[test]
    fn test_evaluator() {
        let state = state(3);
        let mut agent = AgentKind::Evaluator.build("Evaluator".to_string(), 0);
        assert_eq!(agent.decide(&state.view_for(0)), Action::select(1, 8));

        let choosing = state
            .apply_batch(&BTreeMap::from([
                (0, Action::select(1, 8)),
                (1, Action::select(1, 5)),
                (2, Action::select(2, 3)),
            ]))
            .unwrap();
        // 1 collides with P1, 8 is free
        assert_eq!(agent.decide(&choosing.view_for(0)), Action::choose(8));
        assert_eq!(agent.decide(&choosing.view_for(2)), Action::choose(2));
    }
}
