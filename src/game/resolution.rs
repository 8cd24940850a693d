use std::collections::{BTreeMap, BTreeSet};

use super::deck::{CardPosition, Deck};
use super::night::ShadowTable;
use super::role::{Role, Team};
use super::view::GameSummary;
use super::SeatId;

/// A full scatter: every alive player voted and every alive player
/// received exactly one vote. Nobody is eliminated.
pub fn is_full_scatter(votes: &BTreeMap<SeatId, SeatId>, alive: &BTreeSet<SeatId>) -> bool {
    if votes.len() != alive.len() {
        return false;
    }
    let mut counts: BTreeMap<SeatId, usize> = BTreeMap::new();
    for target in votes.values() {
        *counts.entry(*target).or_default() += 1;
    }
    alive.iter().all(|seat| counts.get(seat) == Some(&1))
}

/// Seats eliminated by the tally: everyone tied at the maximum vote
/// count, then one pass of the hunter chain. A hunter eliminated by the
/// chain does not re-fire.
pub fn eliminated_seats(
    votes: &BTreeMap<SeatId, SeatId>,
    alive: &BTreeSet<SeatId>,
    deck: &Deck,
) -> Vec<SeatId> {
    if is_full_scatter(votes, alive) {
        return Vec::new();
    }

    let mut counts: BTreeMap<SeatId, usize> = BTreeMap::new();
    for target in votes.values() {
        if alive.contains(target) {
            *counts.entry(*target).or_default() += 1;
        }
    }
    let Some(max) = counts.values().copied().max() else {
        return Vec::new();
    };

    let mut eliminated: Vec<SeatId> = counts
        .into_iter()
        .filter(|(_, n)| *n == max)
        .map(|(seat, _)| seat)
        .collect();

    // Hunter chain, applied once over the tally's victims. The hunter's
    // trigger keys on the current role at elimination time.
    let tally_victims = eliminated.clone();
    for seat in tally_victims {
        let is_hunter = deck
            .role_at(CardPosition::Seat(seat.index()))
            .map(|role| role == Role::Hunter)
            .unwrap_or(false);
        if !is_hunter {
            continue;
        }
        if let Some(target) = votes.get(&seat) {
            if !eliminated.contains(target) {
                tracing::debug!(hunter = %seat, %target, "hunter chain fired");
                eliminated.push(*target);
            }
        }
    }

    eliminated
}

/// The team a seat scores with: a doppelganger scores with the copied
/// role's team, everyone else with their current card's team.
pub fn effective_team(seat: SeatId, deck: &Deck, shadow: &ShadowTable) -> Team {
    if let Some(copied) = shadow.copied_role(seat) {
        return copied.team();
    }
    deck.role_at(CardPosition::Seat(seat.index()))
        .map(Role::team)
        .unwrap_or(Team::Village)
}

/// Evaluate the win conditions independently; several teams may win at
/// once, and a full scatter with no werewolves in play leaves the board
/// with no winner at all.
pub fn winning_teams(
    deck: &Deck,
    eliminated: &[SeatId],
    full_scatter: bool,
) -> Vec<Team> {
    let werewolf_exists = !deck.seats_with_current_role(Role::Werewolf).is_empty();
    let werewolf_eliminated = eliminated.iter().any(|seat| {
        deck.role_at(CardPosition::Seat(seat.index()))
            .map(|role| role == Role::Werewolf)
            .unwrap_or(false)
    });
    let tanner_eliminated = eliminated.iter().any(|seat| {
        deck.role_at(CardPosition::Seat(seat.index()))
            .map(|role| role == Role::Tanner)
            .unwrap_or(false)
    });

    let village_wins = (werewolf_exists && werewolf_eliminated)
        || (!werewolf_exists && eliminated.is_empty() && !full_scatter);
    let werewolf_wins = werewolf_exists && !werewolf_eliminated;

    let mut teams = Vec::new();
    if village_wins {
        teams.push(Team::Village);
    }
    if werewolf_wins {
        teams.push(Team::Werewolf);
    }
    if tanner_eliminated {
        teams.push(Team::Tanner);
    }
    teams
}

/// Run the whole resolution pipeline over the closed vote map.
pub fn summarize(
    votes: &BTreeMap<SeatId, SeatId>,
    alive: &BTreeSet<SeatId>,
    deck: &Deck,
    shadow: &ShadowTable,
) -> GameSummary<SeatId> {
    let full_scatter = is_full_scatter(votes, alive);
    let eliminated = eliminated_seats(votes, alive, deck);
    let teams = winning_teams(deck, &eliminated, full_scatter);

    let winners: Vec<SeatId> = alive
        .iter()
        .copied()
        .filter(|seat| teams.contains(&effective_team(*seat, deck, shadow)))
        .collect();

    let final_roles: BTreeMap<SeatId, Role> = (0..deck.seat_count())
        .filter_map(|index| {
            deck.role_at(CardPosition::Seat(index))
                .ok()
                .map(|role| (SeatId::from_index(index), role))
        })
        .collect();

    GameSummary {
        winning_teams: teams,
        winners,
        eliminated,
        final_roles,
        center_cards: deck.center_roles(),
        votes: votes.clone(),
    }
}
