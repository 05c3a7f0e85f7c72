use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use crate::games::{winner, Agent, GameError, GameState, PlayerId, Results, Validate};
use crate::profiler::Profiler;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord<A> {
    pub round: u32,
    pub player: PlayerId,
    pub action: A,
}

#[derive(Debug, Clone)]
pub struct GameRecord<G: GameState> {
    pub results: Results,
    pub winner: Option<PlayerId>,
    // Last round in which anyone acted
    pub rounds: u32,
    // (round, player) for every elimination in order
    pub eliminations: Vec<(u32, PlayerId)>,
    pub history: Vec<ActionRecord<G::Action>>,
    pub final_state: G,
}

// Runs one game with one agent per seat. Sequential phases ask the current
// player only. Simultaneous phases hand every active player a view of the same
// pre-transition state, collect all decisions and apply them as one batch.
pub struct Engine<G: GameState> {
    agents: Vec<Box<dyn Agent<G>>>,
    strict: bool,
    profiler: Option<Profiler>,
}

impl<G: GameState + Validate> Engine<G> {
    pub fn new(agents: Vec<Box<dyn Agent<G>>>) -> Self {
        Self { agents, strict: false, profiler: None }
    }

    // Validate every intermediate state, failing on the first inconsistency
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn profiled(mut self, profile: bool) -> Self {
        self.profiler = if profile { Some(Profiler::new()) } else { None };
        self
    }

    pub fn profiler(&self) -> Option<&Profiler> {
        self.profiler.as_ref()
    }

    pub fn into_profiler(self) -> Option<Profiler> {
        self.profiler
    }

    fn check(&self, state: &G) -> Result<(), GameError> {
        if self.strict {
            state.validate().map_err(|err| GameError::Inconsistent(err.to_string()))?;
        }
        Ok(())
    }

    fn decide(&mut self, player: PlayerId, view: &G::View) -> G::Action {
        let agent = &mut self.agents[player];

        let started = Instant::now();
        let action = agent.decide(view);
        if let Some(profiler) = self.profiler.as_mut() {
            profiler.record(agent.name(), started.elapsed());
        }

        action
    }

    // An action is accepted only if it is one of the legal actions the player
    // was offered
    fn check_legal(&self, state: &G, player: PlayerId, action: &G::Action) -> Result<(), GameError> {
        if state.legal_actions(player).contains(action) {
            return Ok(());
        }

        let err = match state.apply(action, player) {
            Err(err) => err,
            Ok(_) => GameError::IllegalAction {
                player,
                phase: state.phase_name(),
                action: format!("{:?}", action),
                reason: "not among the legal actions".to_string(),
            },
        };

        log::error!("{} (P{}) broke the protocol: {}", self.agents[player].name(), player, err);
        Err(err)
    }

    fn step(&mut self, state: &G) -> Result<(G, Vec<(PlayerId, G::Action)>), GameError> {
        if let Some(player) = state.current_player() {
            let view = state.view_for(player);
            let action = self.decide(player, &view);
            self.check_legal(state, player, &action)?;
            let next = state.apply(&action, player)?;
            return Ok((next, vec![(player, action)]));
        }

        // Every view is taken before anyone decides so no decision can leak
        // into another player's view
        let views: Vec<(PlayerId, G::View)> = (0..state.player_count())
            .filter(|&p| !state.is_eliminated(p))
            .map(|p| (p, state.view_for(p)))
            .collect();

        let mut actions = BTreeMap::new();
        for (player, view) in views {
            let action = self.decide(player, &view);
            self.check_legal(state, player, &action)?;
            actions.insert(player, action);
        }

        let next = state.apply_batch(&actions)?;
        Ok((next, actions.into_iter().collect()))
    }

    fn notify(&mut self, state: &G, taken: &[(PlayerId, G::Action)]) {
        for (player, agent) in self.agents.iter_mut().enumerate() {
            if state.is_eliminated(player) {
                continue;
            }

            let view = state.view_for(player);
            for (actor, action) in taken {
                agent.observe(&view, *actor, action);
            }
        }
    }

    pub fn run(&mut self, initial: G) -> Result<GameRecord<G>, GameError> {
        if self.agents.len() != initial.player_count() {
            return Err(GameError::InvalidConfig(format!(
                "{} agents for {} players", self.agents.len(), initial.player_count()
            )));
        }

        self.check(&initial)?;

        let mut state = initial;
        let mut history = Vec::new();
        let mut eliminations = Vec::new();

        while !state.is_terminal() {
            let round = state.round();
            let (next, taken) = self.step(&state)?;
            self.check(&next)?;

            for player in 0..next.player_count() {
                if next.is_eliminated(player) && !state.is_eliminated(player) {
                    log::debug!("P{} ({}) eliminated in round {}", player, self.agents[player].name(), round);
                    eliminations.push((round, player));
                }
            }

            self.notify(&next, &taken);
            history.extend(taken.into_iter().map(|(player, action)| ActionRecord { round, player, action }));
            state = next;
        }

        let results = state.results();
        for (player, agent) in self.agents.iter_mut().enumerate() {
            agent.on_game_end(&state.view_for(player), &results);
        }

        let winner = winner(&results);
        log::debug!("Game over after round {}, winner {:?}", state.round(), winner);

        Ok(GameRecord {
            winner,
            rounds: history.last().map_or(0, |r: &ActionRecord<G::Action>| r.round),
            results,
            eliminations,
            history,
            final_state: state,
        })
    }
}
