use chrono::{DateTime, Utc};
use futures_util::stream::{FuturesUnordered, StreamExt};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, Notify};

use super::deck::{Deck, DeckError};
use super::decision::{Cancelled, PromptContext, SeatProviders};
use super::night::{self, NightResult, ShadowTable};
use super::resolution;
use super::role::Role;
use super::view::GameSummary;
use super::SeatId;
use crate::config::PhaseDeadlines;
use crate::protocol::CENTER_CARD_COUNT;

/// Game phases. The only legal walk is straight down the list; anything
/// else is a programming error surfaced as [`EngineError::InvalidTransition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Night,
    Day,
    Voting,
    Resolution,
}

impl Phase {
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Setup => Some(Phase::Night),
            Phase::Night => Some(Phase::Day),
            Phase::Day => Some(Phase::Voting),
            Phase::Voting => Some(Phase::Resolution),
            Phase::Resolution => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Setup => "setup",
            Phase::Night => "night",
            Phase::Day => "day",
            Phase::Voting => "voting",
            Phase::Resolution => "resolution",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid phase transition {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },
    #[error(transparent)]
    Deck(#[from] DeckError),
    #[error("no decision provider bound for seat {0}")]
    MissingProvider(SeatId),
    #[error("game cancelled")]
    Cancelled(#[from] Cancelled),
}

/// One seat at the table, from the engine's point of view.
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub name: String,
    /// Seat was created as an AI member.
    pub is_ai: bool,
    /// Seat is currently driven by the AI provider (AI member, or a
    /// human under takeover).
    pub ai_controlled: bool,
    pub is_connected: bool,
    pub alive: bool,
    pub starting_role: Role,
    pub night_log: Vec<NightResult<SeatId>>,
    pub has_spoken: bool,
    pub ready_to_vote: bool,
    pub has_voted: bool,
}

/// A public day-phase statement, ordered by server arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub seat: SeatId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Seat description handed to the engine at start.
#[derive(Debug, Clone)]
pub struct SeatInit {
    pub seat: SeatId,
    pub name: String,
    pub is_ai: bool,
    pub is_connected: bool,
}

/// Events the engine hands to its room for translation and fan-out.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Started,
    PhaseChanged {
        phase: Phase,
        time_remaining_ms: Option<u64>,
    },
    NightResult {
        seat: SeatId,
        result: NightResult<SeatId>,
    },
    StatementMade {
        seat: SeatId,
        text: String,
        timestamp: DateTime<Utc>,
    },
    VotesRevealed {
        votes: BTreeMap<SeatId, SeatId>,
    },
    Eliminated {
        seats: Vec<SeatId>,
    },
    GameEnded {
        summary: GameSummary<SeatId>,
    },
}

/// Everything the engine owns for one game. Shared with the room (which
/// projects views and feeds day-phase input) behind one async mutex, so
/// all mutation is serialized.
#[derive(Debug)]
pub struct GameState {
    pub phase: Phase,
    pub deck: Deck,
    pub players: BTreeMap<SeatId, PlayerSlot>,
    pub shadow: ShadowTable,
    pub statements: Vec<Statement>,
    pub votes: Option<BTreeMap<SeatId, SeatId>>,
    pub summary: Option<GameSummary<SeatId>>,
    pub phase_deadline: Option<DateTime<Utc>>,
}

impl GameState {
    /// Validate, shuffle (honoring debug overrides), and deal.
    pub fn deal(
        seats: &[SeatInit],
        roles: &[Role],
        forced: &BTreeMap<SeatId, Role>,
    ) -> Result<Self, DeckError> {
        let seat_count = seats.len();
        if roles.len() != seat_count + CENTER_CARD_COUNT {
            return Err(DeckError::WrongRoleCount {
                seats: seat_count,
                expected: seat_count + CENTER_CARD_COUNT,
                got: roles.len(),
            });
        }

        let mut pool: Vec<Role> = roles.to_vec();
        let mut dealt: Vec<Option<Role>> = vec![None; seat_count];

        // Debug-only forced placements consume a matching card from the
        // pool before the shuffle.
        for (seat, role) in forced {
            if seat.index() >= seat_count {
                continue;
            }
            if let Some(at) = pool.iter().position(|r| r == role) {
                pool.remove(at);
                dealt[seat.index()] = Some(*role);
            }
        }

        let mut rng = rand::rng();
        pool.shuffle(&mut rng);

        let mut ordered: Vec<Role> = Vec::with_capacity(roles.len());
        let mut pool_iter = pool.into_iter();
        for slot in dealt {
            match slot {
                Some(role) => ordered.push(role),
                None => ordered.push(pool_iter.next().unwrap_or(Role::Villager)),
            }
        }
        ordered.extend(pool_iter);

        let deck = Deck::deal(&ordered, seat_count)?;

        let players = seats
            .iter()
            .map(|init| {
                let starting_role = deck
                    .starting_role_at(super::deck::CardPosition::Seat(init.seat.index()))
                    .unwrap_or(Role::Villager);
                (
                    init.seat,
                    PlayerSlot {
                        name: init.name.clone(),
                        is_ai: init.is_ai,
                        ai_controlled: init.is_ai,
                        is_connected: init.is_connected,
                        alive: true,
                        starting_role,
                        night_log: Vec::new(),
                        has_spoken: false,
                        ready_to_vote: false,
                        has_voted: false,
                    },
                )
            })
            .collect();

        Ok(Self {
            phase: Phase::Setup,
            deck,
            players,
            shadow: ShadowTable::new(),
            statements: Vec::new(),
            votes: None,
            summary: None,
            phase_deadline: None,
        })
    }

    fn transition(&mut self, to: Phase) -> Result<(), EngineError> {
        if self.phase.next() != Some(to) {
            return Err(EngineError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        tracing::info!(from = %self.phase, to = %to, "phase transition");
        self.phase = to;
        Ok(())
    }

    pub fn alive_seats(&self) -> BTreeSet<SeatId> {
        self.players
            .iter()
            .filter(|(_, p)| p.alive)
            .map(|(s, _)| *s)
            .collect()
    }

    /// Milliseconds until the current phase deadline, if one is armed.
    pub fn time_remaining_ms(&self) -> Option<u64> {
        let deadline = self.phase_deadline?;
        let remaining = deadline.signed_duration_since(Utc::now());
        Some(remaining.num_milliseconds().max(0) as u64)
    }

    /// All alive seats not under AI control are ready to vote.
    fn day_complete(&self) -> bool {
        self.players
            .values()
            .filter(|p| p.alive && !p.ai_controlled)
            .all(|p| p.ready_to_vote)
    }
}

/// Drives one game from deal to resolution. The room owns the other end
/// of the event channel and the shared state.
pub struct Engine {
    pub state: Arc<Mutex<GameState>>,
    pub providers: Arc<SeatProviders>,
    pub events: mpsc::UnboundedSender<EngineEvent>,
    pub deadlines: PhaseDeadlines,
    /// Poked by the room when day-phase readiness or AI control changes.
    pub day_wake: Arc<Notify>,
}

impl Engine {
    /// Run the game to completion. Internal failures end the game with
    /// an empty result instead of crossing the room boundary.
    pub async fn run(self) {
        match self.drive().await {
            Ok(()) => {}
            Err(EngineError::Cancelled(_)) => {
                tracing::info!("game cancelled before completion");
            }
            Err(err) => {
                tracing::error!(error = %err, "engine failed, terminating game without winners");
                let summary = {
                    let guard = self.state.lock().await;
                    GameSummary {
                        winning_teams: Vec::new(),
                        winners: Vec::new(),
                        eliminated: Vec::new(),
                        final_roles: BTreeMap::new(),
                        center_cards: guard.deck.center_roles(),
                        votes: BTreeMap::new(),
                    }
                };
                self.emit(EngineEvent::GameEnded { summary });
            }
        }
    }

    async fn drive(&self) -> Result<(), EngineError> {
        self.emit(EngineEvent::Started);

        // NIGHT
        {
            let mut guard = self.state.lock().await;
            guard.transition(Phase::Night)?;
        }
        self.emit(EngineEvent::PhaseChanged {
            phase: Phase::Night,
            time_remaining_ms: None,
        });

        let events = self.events.clone();
        night::run_night(
            &self.state,
            &self.providers,
            self.deadlines.night_action,
            move |seat, result| {
                let _ = events.send(EngineEvent::NightResult { seat, result });
            },
        )
        .await?;

        // DAY
        let day_deadline = {
            let mut guard = self.state.lock().await;
            guard.transition(Phase::Day)?;
            let deadline = Utc::now()
                + chrono::Duration::from_std(self.deadlines.day)
                    .unwrap_or_else(|_| chrono::Duration::seconds(300));
            guard.phase_deadline = Some(deadline);
            tokio::time::Instant::now() + self.deadlines.day
        };
        self.emit(EngineEvent::PhaseChanged {
            phase: Phase::Day,
            time_remaining_ms: Some(self.deadlines.day.as_millis() as u64),
        });

        self.ai_statements().await?;
        self.wait_for_day_end(day_deadline).await;

        // VOTING
        {
            let mut guard = self.state.lock().await;
            guard.transition(Phase::Voting)?;
            let deadline = Utc::now()
                + chrono::Duration::from_std(self.deadlines.vote)
                    .unwrap_or_else(|_| chrono::Duration::seconds(30));
            guard.phase_deadline = Some(deadline);
        }
        self.emit(EngineEvent::PhaseChanged {
            phase: Phase::Voting,
            time_remaining_ms: Some(self.deadlines.vote.as_millis() as u64),
        });

        let votes = self.collect_votes().await?;
        {
            let mut guard = self.state.lock().await;
            guard.votes = Some(votes.clone());
        }
        self.emit(EngineEvent::VotesRevealed {
            votes: votes.clone(),
        });

        // RESOLUTION
        let summary = {
            let mut guard = self.state.lock().await;
            guard.transition(Phase::Resolution)?;
            guard.phase_deadline = None;
            let alive = guard.alive_seats();
            let summary = resolution::summarize(&votes, &alive, &guard.deck, &guard.shadow);
            for seat in &summary.eliminated {
                if let Some(player) = guard.players.get_mut(seat) {
                    player.alive = false;
                }
            }
            guard.summary = Some(summary.clone());
            summary
        };

        self.emit(EngineEvent::PhaseChanged {
            phase: Phase::Resolution,
            time_remaining_ms: None,
        });
        self.emit(EngineEvent::Eliminated {
            seats: summary.eliminated.clone(),
        });
        self.emit(EngineEvent::GameEnded { summary });

        Ok(())
    }

    /// AI seats speak once, eagerly, at the top of the day.
    async fn ai_statements(&self) -> Result<(), EngineError> {
        let speakers: Vec<SeatId> = {
            let guard = self.state.lock().await;
            guard
                .players
                .iter()
                .filter(|(_, p)| p.alive && p.ai_controlled)
                .map(|(s, _)| *s)
                .collect()
        };

        for seat in speakers {
            let provider = self
                .providers
                .provider(seat)
                .ok_or(EngineError::MissingProvider(seat))?;
            let ctx = PromptContext {
                seat,
                deadline: self.deadlines.night_action,
            };
            let text = provider.make_statement(ctx).await?;
            if text.trim().is_empty() {
                continue;
            }
            let timestamp = Utc::now();
            {
                let mut guard = self.state.lock().await;
                guard.statements.push(Statement {
                    seat,
                    text: text.clone(),
                    timestamp,
                });
                if let Some(player) = guard.players.get_mut(&seat) {
                    player.has_spoken = true;
                }
            }
            self.emit(EngineEvent::StatementMade {
                seat,
                text,
                timestamp,
            });
        }
        Ok(())
    }

    /// Block until the day deadline elapses or every alive human is
    /// ready to vote.
    async fn wait_for_day_end(&self, deadline: tokio::time::Instant) {
        loop {
            let notified = self.day_wake.notified();
            tokio::pin!(notified);

            {
                let guard = self.state.lock().await;
                if guard.day_complete() {
                    return;
                }
            }

            tokio::select! {
                () = &mut notified => {}
                () = tokio::time::sleep_until(deadline) => return,
            }
        }
    }

    /// Prompt every alive seat in parallel under one shared deadline.
    /// Votes stay hidden until the full map is assembled.
    async fn collect_votes(&self) -> Result<BTreeMap<SeatId, SeatId>, EngineError> {
        let alive: Vec<SeatId> = {
            let guard = self.state.lock().await;
            guard.alive_seats().into_iter().collect()
        };

        let mut prompts = FuturesUnordered::new();
        for seat in &alive {
            let seat = *seat;
            let provider = self
                .providers
                .provider(seat)
                .ok_or(EngineError::MissingProvider(seat))?;
            let eligible: Vec<SeatId> = alive.iter().copied().filter(|s| *s != seat).collect();
            let ctx = PromptContext {
                seat,
                deadline: self.deadlines.vote,
            };
            prompts.push(async move {
                let choice = provider.vote(ctx, &eligible).await;
                (seat, eligible, choice)
            });
        }

        let mut votes = BTreeMap::new();
        while let Some((seat, eligible, choice)) = prompts.next().await {
            let target = match choice {
                Ok(target) if eligible.contains(&target) => target,
                Ok(stray) => {
                    tracing::warn!(%seat, %stray, "provider returned ineligible vote target, using first option");
                    match eligible.first() {
                        Some(first) => *first,
                        None => continue,
                    }
                }
                Err(c) => return Err(c.into()),
            };
            votes.insert(seat, target);
            let mut guard = self.state.lock().await;
            if let Some(player) = guard.players.get_mut(&seat) {
                player.has_voted = true;
            }
        }
        Ok(votes)
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::decision::{AiProvider, ProviderCell};
    use crate::game::view::project;
    use std::time::Duration;

    fn seat_inits(n: usize) -> Vec<SeatInit> {
        (0..n)
            .map(|i| SeatInit {
                seat: SeatId::from_index(i),
                name: format!("Bot {}", i + 1),
                is_ai: true,
                is_connected: false,
            })
            .collect()
    }

    fn ai_providers(n: usize) -> Arc<SeatProviders> {
        let cells = (0..n)
            .map(|i| {
                (
                    SeatId::from_index(i),
                    ProviderCell::new(AiProvider::new()),
                )
            })
            .collect();
        Arc::new(SeatProviders::new(cells))
    }

    fn fast_deadlines() -> PhaseDeadlines {
        PhaseDeadlines {
            night_action: Duration::from_millis(200),
            day: Duration::from_millis(50),
            vote: Duration::from_millis(200),
        }
    }

    fn basic_roles() -> Vec<Role> {
        vec![
            Role::Werewolf,
            Role::Seer,
            Role::Robber,
            Role::Troublemaker,
            Role::Villager,
            Role::Tanner,
        ]
    }

    #[test]
    fn phase_walk_is_linear() {
        assert_eq!(Phase::Setup.next(), Some(Phase::Night));
        assert_eq!(Phase::Night.next(), Some(Phase::Day));
        assert_eq!(Phase::Day.next(), Some(Phase::Voting));
        assert_eq!(Phase::Voting.next(), Some(Phase::Resolution));
        assert_eq!(Phase::Resolution.next(), None);
    }

    #[test]
    fn illegal_transition_is_rejected_without_corruption() {
        let mut state =
            GameState::deal(&seat_inits(3), &basic_roles(), &BTreeMap::new()).unwrap();
        let err = state.transition(Phase::Voting).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        assert_eq!(state.phase, Phase::Setup);
    }

    #[test]
    fn deal_conserves_the_role_multiset() {
        let roles = basic_roles();
        let state = GameState::deal(&seat_inits(3), &roles, &BTreeMap::new()).unwrap();
        let mut expected = roles.clone();
        expected.sort();
        assert_eq!(state.deck.role_multiset(), expected);
    }

    #[test]
    fn forced_roles_land_on_their_seats() {
        let forced: BTreeMap<SeatId, Role> = [
            (SeatId::from_index(0), Role::Werewolf),
            (SeatId::from_index(1), Role::Seer),
        ]
        .into();
        let state = GameState::deal(&seat_inits(3), &basic_roles(), &forced).unwrap();
        assert_eq!(
            state.players[&SeatId::from_index(0)].starting_role,
            Role::Werewolf
        );
        assert_eq!(
            state.players[&SeatId::from_index(1)].starting_role,
            Role::Seer
        );
        let mut expected = basic_roles();
        expected.sort();
        assert_eq!(state.deck.role_multiset(), expected);
    }

    #[test]
    fn deal_rejects_wrong_role_count() {
        let err = GameState::deal(&seat_inits(4), &basic_roles(), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, DeckError::WrongRoleCount { .. }));
    }

    async fn run_ai_game(
        n: usize,
        roles: Vec<Role>,
        forced: BTreeMap<SeatId, Role>,
    ) -> (Vec<EngineEvent>, Arc<Mutex<GameState>>) {
        let state = Arc::new(Mutex::new(
            GameState::deal(&seat_inits(n), &roles, &forced).unwrap(),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = Engine {
            state: state.clone(),
            providers: ai_providers(n),
            events: tx,
            deadlines: fast_deadlines(),
            day_wake: Arc::new(Notify::new()),
        };
        engine.run().await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (events, state)
    }

    #[tokio::test]
    async fn full_ai_game_reaches_resolution() {
        let (events, state) = run_ai_game(3, basic_roles(), BTreeMap::new()).await;

        assert!(matches!(events.first(), Some(EngineEvent::Started)));
        assert!(matches!(events.last(), Some(EngineEvent::GameEnded { .. })));

        // Phase changes arrive in diagram order.
        let phases: Vec<Phase> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::PhaseChanged { phase, .. } => Some(*phase),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![Phase::Night, Phase::Day, Phase::Voting, Phase::Resolution]
        );

        let guard = state.lock().await;
        assert_eq!(guard.phase, Phase::Resolution);
        assert!(guard.summary.is_some());
        assert!(guard.votes.is_some());
    }

    #[tokio::test]
    async fn ten_player_game_completes_with_strict_night_order() {
        let roles = vec![
            Role::Doppelganger,
            Role::Werewolf,
            Role::Werewolf,
            Role::Minion,
            Role::Mason,
            Role::Mason,
            Role::Seer,
            Role::Robber,
            Role::Troublemaker,
            Role::Drunk,
            Role::Insomniac,
            Role::Villager,
            Role::Hunter,
        ];
        let (events, state) = run_ai_game(10, roles, BTreeMap::new()).await;

        assert!(matches!(events.last(), Some(EngineEvent::GameEnded { .. })));

        // Night results arrive in wake order: map each result's acting
        // role back to its order and require a non-decreasing sequence,
        // with the doppelganger-insomniac wake (order 10) last.
        let orders: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::NightResult { result, .. } => Some(match result.role {
                    Role::Doppelganger if !result.viewings.is_empty() && result.copied.is_none() => {
                        10
                    }
                    role => role.wake_order().unwrap_or(0),
                }),
                _ => None,
            })
            .collect();
        let mut sorted = orders.clone();
        sorted.sort_unstable();
        assert_eq!(orders, sorted, "night results out of wake order: {orders:?}");

        // Card conservation end to end.
        let guard = state.lock().await;
        let mut expected = vec![
            Role::Doppelganger,
            Role::Werewolf,
            Role::Werewolf,
            Role::Minion,
            Role::Mason,
            Role::Mason,
            Role::Seer,
            Role::Robber,
            Role::Troublemaker,
            Role::Drunk,
            Role::Insomniac,
            Role::Villager,
            Role::Hunter,
        ];
        expected.sort();
        assert_eq!(guard.deck.role_multiset(), expected);
    }

    #[tokio::test]
    async fn every_seat_gets_a_view_and_views_hide_other_roles() {
        let (_events, state) = run_ai_game(3, basic_roles(), BTreeMap::new()).await;
        let guard = state.lock().await;

        for seat in guard.players.keys() {
            let view = project(&guard, *seat).unwrap();
            assert_eq!(view.me, *seat);
            assert_eq!(
                view.my_starting_role,
                guard.players[seat].starting_role
            );
            // The roster never carries role fields for other players;
            // whatever leaks would have to ride on SeatView, which has
            // no role-typed field by construction. Check the serialized
            // form to be safe.
            let json = serde_json::to_value(
                view.players
                    .iter()
                    .filter(|p| p.id != *seat)
                    .collect::<Vec<_>>(),
            )
            .unwrap();
            let text = json.to_string();
            assert!(!text.contains("role"), "roster leaked a role: {text}");
        }
    }

    #[tokio::test]
    async fn projection_is_idempotent() {
        let (_events, state) = run_ai_game(3, basic_roles(), BTreeMap::new()).await;
        let guard = state.lock().await;
        let seat = SeatId::from_index(0);
        let a = project(&guard, seat).unwrap();
        let b = project(&guard, seat).unwrap();
        assert_eq!(a, b);
    }
}
