use anyhow::{anyhow, Result};
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use serde::Serialize;

use crate::analytics::Analytics;
use crate::config::SimulationConfig;
use crate::elo::EloTracker;
use crate::games::remove_one::agents::AgentKind;
use crate::games::Validate;
use crate::profiler::Profiler;
use crate::simulation::{play_game, PlayedGame, Seat};

// All k sized subsets of 0..n in lexicographic order
pub fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    fn extend(start: usize, n: usize, k: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in start..n {
            current.push(i);
            extend(i + 1, n, k, current, out);
            current.pop();
        }
    }

    let mut out = Vec::new();
    if k <= n {
        extend(0, n, k, &mut Vec::with_capacity(k), &mut out);
    }
    out
}

pub fn entrants(pool: &[AgentKind]) -> Vec<Seat> {
    pool.iter()
        .enumerate()
        .map(|(i, &kind)| Seat { name: format!("{}_{}", kind.label(), i), kind })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntrantStats {
    pub name: String,
    pub games: u32,
    pub wins: u32,
    pub eliminations: u32,
    // Sum of raw scores, without the survivor bonus
    pub total_score: u64,
    pub total_result: u64,
}

impl EntrantStats {
    pub fn win_rate(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        self.wins as f64 / self.games as f64
    }

    pub fn mean_score(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        self.total_score as f64 / self.games as f64
    }

    pub fn mean_result(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        self.total_result as f64 / self.games as f64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TournamentResults {
    pub matchups: usize,
    pub games: usize,
    pub entrants: Vec<EntrantStats>,
    // head_to_head[a][b] counts the games entrant a won with b at the table
    pub head_to_head: Vec<Vec<u32>>,
    pub elo: EloTracker,
    pub analytics: Analytics,
    #[serde(skip)]
    pub profiler: Profiler,
}

impl TournamentResults {
    fn new(names: Vec<String>) -> Self {
        let n = names.len();
        Self {
            matchups: 0,
            games: 0,
            entrants: names.into_iter().map(|name| EntrantStats { name, ..Default::default() }).collect(),
            head_to_head: vec![vec![0; n]; n],
            elo: EloTracker::new(),
            analytics: Analytics::default(),
            profiler: Profiler::new(),
        }
    }

    // `table[seat]` is the entrant index sitting in that seat
    fn add(&mut self, table: &[usize], game: &PlayedGame) {
        self.games += 1;
        self.analytics.add(&game.stats);
        if let Some(profiler) = &game.profiler {
            self.profiler.merge(profiler);
        }

        for (seat, &entrant) in table.iter().enumerate() {
            let player = &game.record.final_state.players[seat];
            let stats = &mut self.entrants[entrant];
            stats.games += 1;
            stats.total_score += player.score as u64;
            stats.total_result += game.record.results.get(&seat).copied().unwrap_or(0) as u64;
            stats.eliminations += player.eliminated as u32;
        }

        let Some(winner_seat) = game.record.winner else {
            return;
        };
        let winner = table[winner_seat];
        self.entrants[winner].wins += 1;

        for &other in table.iter().filter(|&&e| e != winner) {
            self.head_to_head[winner][other] += 1;
        }

        let names: Vec<&str> = table.iter().map(|&e| self.entrants[e].name.as_str()).collect();
        self.elo.record_game(&self.entrants[winner].name, &names);
    }

    // Entrants ordered by wins, then by mean result
    pub fn standings(&self) -> Vec<&EntrantStats> {
        let mut standings: Vec<&EntrantStats> = self.entrants.iter().collect();
        standings.sort_by(|a, b| {
            b.wins
                .cmp(&a.wins)
                .then(b.total_result.cmp(&a.total_result))
        });
        standings
    }

    pub fn report(&self) {
        println!("{} games over {} matchups", self.games, self.matchups);
        println!(
            "{:<16} {:>6} {:>6} {:>8} {:>10} {:>11} {:>8}",
            "Agent", "Games", "Wins", "Win %", "Mean score", "Mean result", "Elim."
        );
        for stats in self.standings() {
            println!(
                "{:<16} {:>6} {:>6} {:>8.1} {:>10.2} {:>11.2} {:>8}",
                stats.name, stats.games, stats.wins, stats.win_rate() * 100.0,
                stats.mean_score(), stats.mean_result(), stats.eliminations
            );
        }

        println!("\nHead to head (row won with column at the table)");
        for (entrant, row) in self.entrants.iter().zip(&self.head_to_head) {
            let cells: Vec<String> = row.iter().map(|c| format!("{:>4}", c)).collect();
            println!("{:<16} {}", entrant.name, cells.join(""));
        }

        self.elo.print_leaderboard();
    }
}

// Plays `games_per_matchup` games for every combination of `n_players`
// entrants out of the pool. Seats rotate from one game of a matchup to the
// next. Game j overall runs on seed `seed + j`, games run in parallel and are
// folded into the results in order.
pub fn run_round_robin(config: &SimulationConfig) -> Result<TournamentResults> {
    config.validate()?;
    config.check_pool()?;

    let pool = entrants(&config.pool);
    let matchups = combinations(pool.len(), config.game.n_players);

    // Seat of each entrant at every table to play
    let tables: Vec<Vec<usize>> = matchups
        .iter()
        .flat_map(|matchup| {
            let k = matchup.len();
            (0..config.games_per_matchup).map(move |g| (0..k).map(|seat| matchup[(seat + g) % k]).collect::<Vec<usize>>())
        })
        .collect();

    log::info!(
        "Round robin over {} entrants: {} matchups, {} games",
        pool.len(), matchups.len(), tables.len()
    );

    let played: Vec<(Vec<usize>, PlayedGame)> = tables
        .into_par_iter()
        .enumerate()
        .map(|(job, table)| {
            let seats: Vec<Seat> = table.iter().map(|&e| pool[e].clone()).collect();
            let seed = config.seed.wrapping_add(job as u64);
            play_game(&config.game, &seats, job, seed, config.strict, config.profile)
                .map(|game| (table, game))
                .map_err(|err| anyhow!("Game {} (seed {}) failed: {}", job, seed, err))
        })
        .collect::<Result<_>>()?;

    let mut results = TournamentResults::new(pool.iter().map(|s| s.name.clone()).collect());
    results.matchups = matchups.len();
    for (table, game) in &played {
        results.add(table, game);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elo::DEFAULT_ELO;

    fn config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.game.n_players = 3;
        config.pool = vec![AgentKind::Random, AgentKind::Greedy, AgentKind::Counter, AgentKind::Evaluator];
        config.games_per_matchup = 3;
        config.seed = 17;
        config
    }

    #[test]
    fn test_combinations() {
        let combos = combinations(4, 2);
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0], vec![0, 1]);
        assert_eq!(combos[5], vec![2, 3]);

        assert_eq!(combinations(7, 7).len(), 1);
        assert_eq!(combinations(7, 3).len(), 35);
        assert!(combinations(2, 3).is_empty());
    }

    #[test]
    fn test_round_robin_totals() {
        let results = run_round_robin(&config()).unwrap();

        assert_eq!(results.matchups, 4);
        assert_eq!(results.games, 12);
        assert_eq!(results.analytics.games, 12);
        // Every entrant sits at 3 of the 4 tables
        assert!(results.entrants.iter().all(|e| e.games == 9));
        assert_eq!(results.entrants.iter().map(|e| e.wins).sum::<u32>(), 12);
        // Everybody except the winner of a game sits at the table with them
        assert_eq!(results.head_to_head.iter().flatten().sum::<u32>(), 24);
        assert!((0..4).all(|e| results.head_to_head[e][e] == 0));

        let total: f64 = results.elo.ratings.values().sum();
        assert!((total - 4.0 * DEFAULT_ELO).abs() < 1e-6);

        assert_eq!(results.standings()[0].wins, results.entrants.iter().map(|e| e.wins).max().unwrap());
    }

    #[test]
    fn test_round_robin_is_deterministic() {
        let a = run_round_robin(&config()).unwrap();
        let b = run_round_robin(&config()).unwrap();
        assert_eq!(a.entrants, b.entrants);
        assert_eq!(a.head_to_head, b.head_to_head);
        assert_eq!(a.elo.ratings, b.elo.ratings);
    }

    #[test]
    fn test_pool_too_small() {
        let mut config = config();
        config.pool = vec![AgentKind::Random, AgentKind::Greedy];
        assert!(run_round_robin(&config).is_err());
    }
}
