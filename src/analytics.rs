use std::collections::BTreeMap;

use serde::Serialize;

use crate::engine::GameRecord;
use crate::games::remove_one::{round_winner, Action, Card, State};
use crate::games::PlayerId;

// How often a seat played the lower or the higher card of its revealed pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChoicePreference {
    pub low: u64,
    pub high: u64,
}

impl ChoicePreference {
    pub fn low_ratio(&self) -> f64 {
        let total = self.low + self.high;
        if total == 0 {
            return 0.0;
        }
        self.low as f64 / total as f64
    }

    fn merge(&mut self, other: &ChoicePreference) {
        self.low += other.low;
        self.high += other.high;
    }
}

fn count_into(histogram: &mut BTreeMap<Card, u64>, other: &BTreeMap<Card, u64>) {
    for (&card, &count) in other {
        *histogram.entry(card).or_insert(0) += count;
    }
}

// What happened in one finished game
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameStats {
    pub rounds: u32,
    pub winner: Option<PlayerId>,
    pub eliminations: Vec<(u32, PlayerId)>,
    // Winning card of every resolved round, None for ties
    pub round_winners: Vec<(u32, Option<Card>)>,
    // How often each card was revealed and how often it was the final choice
    pub selected_cards: BTreeMap<Card, u64>,
    pub final_choices: BTreeMap<Card, u64>,
    pub choice_preference: BTreeMap<PlayerId, ChoicePreference>,
}

impl GameStats {
    pub fn from_record(record: &GameRecord<State>) -> Self {
        // Last recorded action of each player per round is the one that counted
        let mut pairs: BTreeMap<(u32, PlayerId), [Card; 2]> = BTreeMap::new();
        let mut choices: BTreeMap<u32, BTreeMap<PlayerId, Card>> = BTreeMap::new();
        for entry in &record.history {
            match entry.action {
                Action::SelectCards { cards } => {
                    pairs.insert((entry.round, entry.player), cards);
                },
                Action::ChooseFinal { card } => {
                    choices.entry(entry.round).or_default().insert(entry.player, card);
                },
            }
        }

        let mut selected_cards = BTreeMap::new();
        for card in pairs.values().flatten() {
            *selected_cards.entry(*card).or_insert(0) += 1;
        }

        let mut final_choices = BTreeMap::new();
        let mut choice_preference: BTreeMap<PlayerId, ChoicePreference> = BTreeMap::new();
        for (&round, finals) in &choices {
            for (&player, &card) in finals {
                *final_choices.entry(card).or_insert(0) += 1;

                if let Some(pair) = pairs.get(&(round, player)) {
                    let preference = choice_preference.entry(player).or_default();
                    if card == pair[0].min(pair[1]) {
                        preference.low += 1;
                    } else {
                        preference.high += 1;
                    }
                }
            }
        }

        // A round only resolves once every active player has chosen, the last
        // round may have ended on card exhaustion before that
        let resolved = |round: u32| round < record.final_state.round;

        Self {
            rounds: record.rounds,
            winner: record.winner,
            eliminations: record.eliminations.clone(),
            round_winners: choices
                .iter()
                .filter(|(&round, _)| resolved(round))
                .map(|(&round, finals)| (round, round_winner(finals).map(|(_, card)| card)))
                .collect(),
            selected_cards,
            final_choices,
            choice_preference,
        }
    }
}

// Aggregate over many games
#[derive(Debug, Clone, Default, Serialize)]
pub struct Analytics {
    pub games: usize,
    pub total_rounds: u64,
    pub tied_rounds: u64,
    pub eliminations_by_round: BTreeMap<u32, u64>,
    pub winning_cards: BTreeMap<Card, u64>,
    pub selected_cards: BTreeMap<Card, u64>,
    pub final_choices: BTreeMap<Card, u64>,
    // Keyed by seat
    pub choice_preference: BTreeMap<PlayerId, ChoicePreference>,
}

impl Analytics {
    pub fn add(&mut self, stats: &GameStats) {
        self.games += 1;
        self.total_rounds += stats.rounds as u64;

        for &(round, _) in &stats.eliminations {
            *self.eliminations_by_round.entry(round).or_insert(0) += 1;
        }

        for &(_, card) in &stats.round_winners {
            match card {
                Some(card) => *self.winning_cards.entry(card).or_insert(0) += 1,
                None => self.tied_rounds += 1,
            }
        }

        count_into(&mut self.selected_cards, &stats.selected_cards);
        count_into(&mut self.final_choices, &stats.final_choices);
        for (&seat, preference) in &stats.choice_preference {
            self.choice_preference.entry(seat).or_default().merge(preference);
        }
    }

    pub fn mean_rounds(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        self.total_rounds as f64 / self.games as f64
    }

    pub fn report(&self) {
        println!("Games: {}, mean rounds: {:.2}, tied rounds: {}", self.games, self.mean_rounds(), self.tied_rounds);
        for (round, count) in &self.eliminations_by_round {
            println!("Eliminations in round {}: {}", round, count);
        }
        for (card, count) in &self.winning_cards {
            println!("Rounds won with card {}: {}", card, count);
        }
        for (card, selected) in &self.selected_cards {
            let chosen = self.final_choices.get(card).copied().unwrap_or(0);
            println!("Card {}: revealed {}, chosen {}", card, selected, chosen);
        }
        for (seat, preference) in &self.choice_preference {
            println!("P{} chose the lower card {:.1}% of the time", seat, preference.low_ratio() * 100.0);
        }
    }
}

impl<'a> FromIterator<&'a GameStats> for Analytics {
    fn from_iter<I: IntoIterator<Item = &'a GameStats>>(iter: I) -> Self {
        let mut analytics = Analytics::default();
        for stats in iter {
            analytics.add(stats);
        }
        analytics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::games::remove_one::agents::AgentKind;
    use crate::games::remove_one::Config;
    use crate::games::{Agent, GameState};

    fn play(kinds: &[AgentKind], seed: u64) -> GameRecord<State> {
        let agents: Vec<Box<dyn Agent<State>>> = kinds
            .iter()
            .enumerate()
            .map(|(i, kind)| kind.build(format!("{}_{}", kind.label(), i), seed + i as u64))
            .collect();
        let state = State::new(Config { n_players: kinds.len(), ..Config::default() }).unwrap();
        Engine::new(agents).run(state).unwrap()
    }

    #[test]
    fn test_stats_match_final_state() {
        let record = play(&[AgentKind::Random, AgentKind::Counter, AgentKind::Greedy, AgentKind::Random], 5);
        let stats = GameStats::from_record(&record);

        let won: u64 = stats.round_winners.iter().filter(|(_, card)| card.is_some()).count() as u64;
        let tokens: u32 = record.final_state.players.iter().map(|p| p.victory_tokens).sum();
        assert_eq!(won, tokens as u64);

        let mut discarded = record.final_state.discard_pile.clone();
        let mut winning: Vec<Card> = stats.round_winners.iter().filter_map(|&(_, card)| card).collect();
        discarded.sort();
        winning.sort();
        assert_eq!(discarded, winning);

        assert!(stats.round_winners.iter().all(|&(round, _)| round <= stats.rounds));
    }

    #[test]
    fn test_greedy_mirror_only_ties() {
        let record = play(&[AgentKind::Greedy, AgentKind::Greedy, AgentKind::Greedy], 0);
        let stats = GameStats::from_record(&record);

        assert!(record.final_state.is_terminal());
        assert!(stats.round_winners.iter().all(|(_, card)| card.is_none()));

        let analytics: Analytics = [&stats].into_iter().collect();
        assert_eq!(analytics.games, 1);
        assert!(analytics.winning_cards.is_empty());
        assert_eq!(analytics.tied_rounds, stats.round_winners.len() as u64);
        assert_eq!(analytics.eliminations_by_round.values().sum::<u64>(), stats.eliminations.len() as u64);
    }

    #[test]
    fn test_card_usage() {
        let record = play(&[AgentKind::Greedy, AgentKind::Greedy, AgentKind::Greedy], 0);
        let stats = GameStats::from_record(&record);

        let chosen = record.history.iter().filter(|r| matches!(r.action, Action::ChooseFinal { .. })).count() as u64;
        assert_eq!(stats.final_choices.values().sum::<u64>(), chosen);
        assert_eq!(stats.selected_cards.values().sum::<u64>(), 2 * chosen);

        // Round 1: everybody reveals 1 and 2 and plays the 1
        assert!(stats.final_choices[&1] >= 3);
        assert!(stats.selected_cards[&2] >= 3);

        // Greedy always plays the lower card
        for seat in 0..3 {
            let preference = stats.choice_preference[&seat];
            assert_eq!(preference.high, 0);
            assert!(preference.low > 0);
            assert_eq!(preference.low_ratio(), 1.0);
        }

        let analytics: Analytics = [&stats, &stats].into_iter().collect();
        assert_eq!(analytics.final_choices[&1], 2 * stats.final_choices[&1]);
        assert_eq!(analytics.selected_cards.values().sum::<u64>(), 4 * chosen);
        assert_eq!(analytics.choice_preference[&0].low, 2 * stats.choice_preference[&0].low);
    }
}
