use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::engine::{GameState, Phase};
use super::night::NightResult;
use super::role::{Role, Team};
use super::SeatId;
use crate::protocol::CENTER_CARD_COUNT;

/// Public roster entry as seen by every player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView<Id> {
    pub id: Id,
    pub name: String,
    pub is_ai: bool,
    pub is_connected: bool,
    pub is_alive: bool,
    pub has_spoken: bool,
    pub has_voted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementView<Id> {
    pub player_id: Id,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Final outcome broadcast in `gameEnd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary<Id: Ord> {
    pub winning_teams: Vec<Team>,
    pub winners: Vec<Id>,
    pub eliminated: Vec<Id>,
    pub final_roles: BTreeMap<Id, Role>,
    pub center_cards: [Role; CENTER_CARD_COUNT],
    pub votes: BTreeMap<Id, Id>,
}

impl<Id: Ord> GameSummary<Id> {
    /// Translate every id into another domain.
    pub fn map_ids<J: Ord>(self, f: &impl Fn(&Id) -> J) -> GameSummary<J> {
        GameSummary {
            winning_teams: self.winning_teams,
            winners: self.winners.iter().map(&f).collect(),
            eliminated: self.eliminated.iter().map(&f).collect(),
            final_roles: self
                .final_roles
                .iter()
                .map(|(id, role)| (f(id), *role))
                .collect(),
            center_cards: self.center_cards,
            votes: self.votes.iter().map(|(a, b)| (f(a), f(b))).collect(),
        }
    }
}

/// The sanitized per-player view. This is the single gate against role
/// leakage: every `gameState` that reaches a client was produced here.
///
/// Hidden until the matching phase closes: the vote map until votes are
/// revealed, and final roles / eliminations / winners until resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView<Id: Ord> {
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining_ms: Option<u64>,
    pub me: Id,
    pub my_starting_role: Role,
    pub my_night_results: Vec<NightResult<Id>>,
    pub players: Vec<SeatView<Id>>,
    pub statements: Vec<StatementView<Id>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<BTreeMap<Id, Id>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GameSummary<Id>>,
}

impl<Id: Ord> PlayerView<Id> {
    /// Translate every id into another domain.
    pub fn map_ids<J: Ord>(self, f: &impl Fn(&Id) -> J) -> PlayerView<J> {
        PlayerView {
            phase: self.phase,
            time_remaining_ms: self.time_remaining_ms,
            me: f(&self.me),
            my_starting_role: self.my_starting_role,
            my_night_results: self
                .my_night_results
                .into_iter()
                .map(|r| r.map_ids(&f))
                .collect(),
            players: self
                .players
                .into_iter()
                .map(|p| SeatView {
                    id: f(&p.id),
                    name: p.name,
                    is_ai: p.is_ai,
                    is_connected: p.is_connected,
                    is_alive: p.is_alive,
                    has_spoken: p.has_spoken,
                    has_voted: p.has_voted,
                })
                .collect(),
            statements: self
                .statements
                .into_iter()
                .map(|s| StatementView {
                    player_id: f(&s.player_id),
                    text: s.text,
                    timestamp: s.timestamp,
                })
                .collect(),
            votes: self
                .votes
                .map(|votes| votes.iter().map(|(a, b)| (f(a), f(b))).collect()),
            result: self.result.map(|r| r.map_ids(&f)),
        }
    }
}

/// Project the engine state into what one seat is allowed to see, at
/// this instant. Pure: projecting the same state twice yields the same
/// view.
pub fn project(state: &GameState, seat: SeatId) -> Option<PlayerView<SeatId>> {
    let me = state.players.get(&seat)?;

    let players = state
        .players
        .iter()
        .map(|(id, slot)| SeatView {
            id: *id,
            name: slot.name.clone(),
            is_ai: slot.is_ai,
            is_connected: slot.is_connected,
            is_alive: slot.alive,
            has_spoken: slot.has_spoken,
            has_voted: slot.has_voted,
        })
        .collect();

    let statements = state
        .statements
        .iter()
        .map(|s| StatementView {
            player_id: s.seat,
            text: s.text.clone(),
            timestamp: s.timestamp,
        })
        .collect();

    Some(PlayerView {
        phase: state.phase,
        time_remaining_ms: state.time_remaining_ms(),
        me: seat,
        my_starting_role: me.starting_role,
        my_night_results: me.night_log.clone(),
        players,
        statements,
        votes: state.votes.clone(),
        result: state.summary.clone(),
    })
}
