use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use analytics::Analytics;
use config::SimulationConfig;
use games::remove_one::agents::AgentKind;
use games::Validate;
use profiler::Profiler;
use simulation::{GameLogLine, PlayedGame, Seat};

mod analytics;
mod config;
mod elo;
mod engine;
mod games;
mod profiler;
mod simulation;
mod tournament;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    // JSON run configuration, flags override what it sets
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Simulate {
        #[arg(short)]
        log_file: Option<PathBuf>,
        #[arg(short, long)]
        games: Option<usize>,
        // One agent per seat, comma separated
        #[arg(short, long, value_delimiter = ',')]
        agents: Vec<AgentKind>,
        #[arg(short, long)]
        seed: Option<u64>,
        #[arg(long)]
        profile: bool,
    },
    Tournament {
        #[arg(short, long, value_delimiter = ',')]
        pool: Vec<AgentKind>,
        #[arg(short = 'n', long)]
        players: Option<usize>,
        #[arg(short, long)]
        games_per_matchup: Option<usize>,
        #[arg(short, long)]
        seed: Option<u64>,
        #[arg(long)]
        profile: bool,
        // Results as pretty JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    // Play seeded games between random agents with every state checked
    Validate {
        #[arg(short, long, default_value_t = 20)]
        games: usize,
        #[arg(short, long)]
        seed: Option<u64>,
    },
}

fn write_play_log(games: &[PlayedGame], path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for game in games {
        jsonl::write(&mut writer, &GameLogLine::from(game))
            .map_err(|err| anyhow!("Failed to write game {} to {}: {:?}", game.game_id, path.display(), err))?;
    }
    writer.flush().with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}

fn report_profile<'a>(profilers: impl Iterator<Item = &'a Profiler>) {
    let mut total = Profiler::new();
    for profiler in profilers {
        total.merge(profiler);
    }

    if !total.is_empty() {
        println!("\nDecision times");
        total.report();
    }
}

fn simulate(config: &SimulationConfig, log_file: Option<&Path>) -> Result<()> {
    config.validate()?;
    config.check_lineup()?;

    let seats: Vec<Seat> = config.lineup
        .iter()
        .zip(config.seat_names())
        .map(|(&kind, name)| Seat { name, kind })
        .collect();

    let games = simulation::simulate(&config.game, &seats, config.games, config.seed, config.strict, config.profile)?;

    simulation::report(&games, &seats);
    let analytics: Analytics = games.iter().map(|g| &g.stats).collect();
    analytics.report();

    if config.profile {
        report_profile(games.iter().filter_map(|g| g.profiler.as_ref()));
    }

    if let Some(path) = log_file {
        write_play_log(&games, path)?;
        log::info!("Wrote {} games to {}", games.len(), path.display());
    }

    Ok(())
}

fn run_tournament(config: &SimulationConfig, output: Option<&Path>) -> Result<()> {
    let results = tournament::run_round_robin(config)?;

    results.report();
    results.analytics.report();
    if config.profile {
        report_profile(std::iter::once(&results.profiler));
    }

    if let Some(path) = output {
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &results)
            .with_context(|| format!("Failed to write results to {}", path.display()))?;
    }

    Ok(())
}

fn validate(config: &SimulationConfig, n_games: usize) -> Result<()> {
    config.game.validate()?;

    let seats: Vec<Seat> = (0..config.game.n_players)
        .map(|i| Seat { name: format!("Random_{}", i), kind: AgentKind::Random })
        .collect();

    let games = simulation::simulate(&config.game, &seats, n_games, config.seed, true, false)?;
    for game in &games {
        game.record.final_state
            .validate()
            .with_context(|| format!("Final state of game {} (seed {})", game.game_id, game.seed))?;
    }

    println!("{}/{} games passed every state check", games.len(), n_games);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = SimulationConfig::load_or_default(args.config.as_deref())?;

    match args.commands {
        Commands::Simulate { log_file, games, agents, seed, profile } => {
            if !agents.is_empty() {
                config.game.n_players = agents.len();
                config.lineup = agents;
            }
            config.games = games.unwrap_or(config.games);
            config.seed = seed.unwrap_or(config.seed);
            config.profile |= profile;
            simulate(&config, log_file.as_deref())
        },
        Commands::Tournament { pool, players, games_per_matchup, seed, profile, output } => {
            if !pool.is_empty() {
                config.pool = pool;
            }
            config.game.n_players = players.unwrap_or(config.game.n_players);
            config.games_per_matchup = games_per_matchup.unwrap_or(config.games_per_matchup);
            config.seed = seed.unwrap_or(config.seed);
            config.profile |= profile;
            run_tournament(&config, output.as_deref())
        },
        Commands::Validate { games, seed } => {
            config.seed = seed.unwrap_or(config.seed);
            validate(&config, games)
        },
    }
}
