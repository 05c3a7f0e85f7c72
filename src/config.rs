use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::games::remove_one::agents::AgentKind;
use crate::games::remove_one::Config;
use crate::games::Validate;

// Everything a simulation or tournament run needs. Loaded from a JSON file,
// missing keys fall back to the defaults and command line flags override
// what is loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub game: Config,
    // One agent per seat for simulations
    pub lineup: Vec<AgentKind>,
    // Entrants for tournaments, every combination of n_players of them plays
    pub pool: Vec<AgentKind>,
    pub games: usize,
    pub games_per_matchup: usize,
    pub seed: u64,
    pub strict: bool,
    pub profile: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            game: Config::default(),
            lineup: vec![
                AgentKind::Greedy,
                AgentKind::Random,
                AgentKind::Random,
                AgentKind::Counter,
                AgentKind::Random,
                AgentKind::Random,
                AgentKind::Evaluator,
            ],
            pool: vec![
                AgentKind::Random,
                AgentKind::Random,
                AgentKind::Greedy,
                AgentKind::Greedy,
                AgentKind::Counter,
                AgentKind::Counter,
                AgentKind::Evaluator,
            ],
            games: 100,
            games_per_matchup: 10,
            seed: 0,
            strict: true,
            profile: false,
        }
    }
}

impl SimulationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    // Names for the simulation seats, `Kind_seat`
    pub fn seat_names(&self) -> Vec<String> {
        self.lineup.iter().enumerate().map(|(i, kind)| format!("{}_{}", kind.label(), i)).collect()
    }

    pub fn check_lineup(&self) -> Result<()> {
        if self.lineup.len() != self.game.n_players {
            return Err(anyhow!("Lineup has {} agents for {} players", self.lineup.len(), self.game.n_players));
        }
        Ok(())
    }

    pub fn check_pool(&self) -> Result<()> {
        if self.pool.len() < self.game.n_players {
            return Err(anyhow!("Pool of {} agents is too small for {} player games", self.pool.len(), self.game.n_players));
        }
        if self.games_per_matchup == 0 {
            return Err(anyhow!("Need at least one game per matchup"));
        }
        Ok(())
    }
}

impl Validate for SimulationConfig {
    fn validate(&self) -> Result<()> {
        self.game.validate().context("Invalid game configuration")?;
        if self.games == 0 {
            return Err(anyhow!("Need at least one game"));
        }
        Ok(())
    }
}
