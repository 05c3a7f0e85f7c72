use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_ELO: f64 = 1500.0;

pub const K_FACTOR: f64 = 32.0;

// Elo ratings for tournament entrants. A multiplayer game is scored as the
// winner beating every other participant, one pairing at a time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EloTracker {
    pub ratings: BTreeMap<String, f64>,
    pub games_played: BTreeMap<String, u32>,
}

impl EloTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rating(&self, name: &str) -> f64 {
        self.ratings.get(name).copied().unwrap_or(DEFAULT_ELO)
    }

    // Expected score of the first entrant against the second
    pub fn expected_score(&self, first: &str, second: &str) -> f64 {
        let r1 = self.rating(first);
        let r2 = self.rating(second);
        1.0 / (1.0 + 10.0_f64.powf((r2 - r1) / 400.0))
    }

    fn update_pair(&mut self, winner: &str, loser: &str) {
        let change = K_FACTOR * (1.0 - self.expected_score(winner, loser));

        let r1 = self.rating(winner);
        let r2 = self.rating(loser);
        self.ratings.insert(winner.to_string(), r1 + change);
        self.ratings.insert(loser.to_string(), r2 - change);
    }

    pub fn record_game(&mut self, winner: &str, others: &[&str]) {
        for loser in others.iter().filter(|&&name| name != winner) {
            self.update_pair(winner, loser);
        }

        for name in others.iter().copied().chain([winner]) {
            *self.games_played.entry(name.to_string()).or_insert(0) += 1;
        }
    }

    pub fn leaderboard(&self) -> Vec<(String, f64, u32)> {
        let mut entries: Vec<_> = self
            .ratings
            .iter()
            .map(|(name, &rating)| {
                let games = self.games_played.get(name).copied().unwrap_or(0);
                (name.clone(), rating, games)
            })
            .collect();
        entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        entries
    }

    pub fn print_leaderboard(&self) {
        println!("\n=== Elo Leaderboard ===");
        println!("{:<20} {:>8} {:>8}", "Agent", "Elo", "Games");
        println!("{}", "-".repeat(40));
        for (name, rating, games) in self.leaderboard() {
            println!("{:<20} {:>8.1} {:>8}", name, rating, games);
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_score() {
        let tracker = EloTracker::new();
        assert!((tracker.expected_score("a", "b") - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_winner_gains_from_every_loser() {
        let mut tracker = EloTracker::new();
        tracker.record_game("a", &["b", "c"]);

        // First pairing moves 16 points, second one slightly less since a is
        // now the favourite
        assert!((tracker.rating("b") - 1484.0).abs() < 1e-9);
        assert!(tracker.rating("c") < DEFAULT_ELO);
        assert!(tracker.rating("a") > DEFAULT_ELO + 16.0);

        let total: f64 = ["a", "b", "c"].iter().map(|n| tracker.rating(n)).sum();
        assert!((total - 3.0 * DEFAULT_ELO).abs() < 1e-9);

        assert_eq!(tracker.games_played["a"], 1);
        assert_eq!(tracker.games_played["c"], 1);
        assert_eq!(tracker.leaderboard()[0].0, "a");
    }
}
