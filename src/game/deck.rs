use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::role::Role;
use crate::protocol::CENTER_CARD_COUNT;

/// A card slot: either a player's seat (0-based) or one of the three
/// center slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "slot", content = "index")]
pub enum CardPosition {
    Seat(usize),
    Center(usize),
}

impl std::fmt::Display for CardPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CardPosition::Seat(i) => write!(f, "seat {i}"),
            CardPosition::Center(i) => write!(f, "center {i}"),
        }
    }
}

/// Audit record for one executed swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRecord {
    pub first: CardPosition,
    pub second: CardPosition,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeckError {
    #[error("card position {0} is out of range")]
    InvalidPosition(CardPosition),
    #[error("deck needs {expected} roles for {seats} seats, got {got}")]
    WrongRoleCount {
        seats: usize,
        expected: usize,
        got: usize,
    },
}

/// The authoritative card arrangement: one role per seat plus exactly
/// three center slots. The role multiset never changes over a game;
/// the only mutation is [`Deck::swap`].
#[derive(Debug, Clone)]
pub struct Deck {
    seats: Vec<Role>,
    center: [Role; CENTER_CARD_COUNT],
    starting_seats: Vec<Role>,
    starting_center: [Role; CENTER_CARD_COUNT],
    audit: Vec<SwapRecord>,
}

impl Deck {
    /// Build a deck from an already-shuffled role list: the first
    /// `seat_count` roles are dealt to seats in order, the remaining
    /// three go to the center.
    pub fn deal(roles: &[Role], seat_count: usize) -> Result<Self, DeckError> {
        let expected = seat_count + CENTER_CARD_COUNT;
        if roles.len() != expected {
            return Err(DeckError::WrongRoleCount {
                seats: seat_count,
                expected,
                got: roles.len(),
            });
        }

        let seats = roles[..seat_count].to_vec();
        let mut center = [Role::Villager; CENTER_CARD_COUNT];
        center.copy_from_slice(&roles[seat_count..]);

        Ok(Self {
            starting_seats: seats.clone(),
            starting_center: center,
            seats,
            center,
            audit: Vec::new(),
        })
    }

    pub fn seat_count(&self) -> usize {
        self.seats.len()
    }

    /// Current role at a position.
    pub fn role_at(&self, pos: CardPosition) -> Result<Role, DeckError> {
        match pos {
            CardPosition::Seat(i) => self.seats.get(i).copied(),
            CardPosition::Center(i) => self.center.get(i).copied(),
        }
        .ok_or(DeckError::InvalidPosition(pos))
    }

    /// Role at a position when the cards were dealt.
    pub fn starting_role_at(&self, pos: CardPosition) -> Result<Role, DeckError> {
        match pos {
            CardPosition::Seat(i) => self.starting_seats.get(i).copied(),
            CardPosition::Center(i) => self.starting_center.get(i).copied(),
        }
        .ok_or(DeckError::InvalidPosition(pos))
    }

    /// Exchange the roles at two positions atomically. A self-swap is a
    /// no-op that still produces an audit record.
    pub fn swap(&mut self, a: CardPosition, b: CardPosition) -> Result<SwapRecord, DeckError> {
        // Validate both positions before touching anything.
        let role_a = self.role_at(a)?;
        let role_b = self.role_at(b)?;

        if a != b {
            self.put(a, role_b);
            self.put(b, role_a);
        }

        let record = SwapRecord {
            first: a,
            second: b,
        };
        self.audit.push(record);
        tracing::debug!(first = %a, second = %b, "cards swapped");
        Ok(record)
    }

    fn put(&mut self, pos: CardPosition, role: Role) {
        match pos {
            CardPosition::Seat(i) => self.seats[i] = role,
            CardPosition::Center(i) => self.center[i] = role,
        }
    }

    /// Seats whose dealt role matches; drives night wake-ups.
    pub fn seats_with_starting_role(&self, role: Role) -> Vec<usize> {
        self.starting_seats
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == role)
            .map(|(i, _)| i)
            .collect()
    }

    /// Seats whose current role matches; drives resolution.
    pub fn seats_with_current_role(&self, role: Role) -> Vec<usize> {
        self.seats
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == role)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn seat_roles(&self) -> &[Role] {
        &self.seats
    }

    pub fn center_roles(&self) -> [Role; CENTER_CARD_COUNT] {
        self.center
    }

    pub fn audit(&self) -> &[SwapRecord] {
        &self.audit
    }

    /// Sorted multiset of every role in the deck; conserved across swaps.
    pub fn role_multiset(&self) -> Vec<Role> {
        let mut all: Vec<Role> = self.seats.iter().chain(self.center.iter()).copied().collect();
        all.sort();
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_deck() -> Deck {
        Deck::deal(
            &[
                Role::Werewolf,
                Role::Seer,
                Role::Villager,
                Role::Villager,
                Role::Robber,
                Role::Tanner,
            ],
            3,
        )
        .unwrap()
    }

    #[test]
    fn deal_splits_seats_and_center() {
        let deck = sample_deck();
        assert_eq!(deck.seat_count(), 3);
        assert_eq!(deck.role_at(CardPosition::Seat(0)).unwrap(), Role::Werewolf);
        assert_eq!(deck.role_at(CardPosition::Center(2)).unwrap(), Role::Tanner);
        assert_eq!(
            deck.center_roles(),
            [Role::Villager, Role::Robber, Role::Tanner]
        );
    }

    #[test]
    fn deal_rejects_wrong_role_count() {
        let err = Deck::deal(&[Role::Werewolf, Role::Seer], 3).unwrap_err();
        assert!(matches!(err, DeckError::WrongRoleCount { expected: 6, .. }));
    }

    #[test]
    fn swap_exchanges_and_audits() {
        let mut deck = sample_deck();
        let record = deck
            .swap(CardPosition::Seat(0), CardPosition::Seat(1))
            .unwrap();
        assert_eq!(record.first, CardPosition::Seat(0));
        assert_eq!(deck.role_at(CardPosition::Seat(0)).unwrap(), Role::Seer);
        assert_eq!(deck.role_at(CardPosition::Seat(1)).unwrap(), Role::Werewolf);
        assert_eq!(deck.audit().len(), 1);

        // Starting roles are a snapshot and survive the swap.
        assert_eq!(
            deck.starting_role_at(CardPosition::Seat(0)).unwrap(),
            Role::Werewolf
        );
    }

    #[test]
    fn double_swap_restores_the_deck() {
        let mut deck = sample_deck();
        let before = deck.seat_roles().to_vec();
        deck.swap(CardPosition::Seat(1), CardPosition::Center(0))
            .unwrap();
        deck.swap(CardPosition::Seat(1), CardPosition::Center(0))
            .unwrap();
        assert_eq!(deck.seat_roles(), before.as_slice());
        assert_eq!(deck.audit().len(), 2);
    }

    #[test]
    fn self_swap_is_a_noop() {
        let mut deck = sample_deck();
        let before = deck.seat_roles().to_vec();
        deck.swap(CardPosition::Seat(2), CardPosition::Seat(2))
            .unwrap();
        assert_eq!(deck.seat_roles(), before.as_slice());
    }

    #[test]
    fn swap_rejects_out_of_range_positions() {
        let mut deck = sample_deck();
        assert!(deck
            .swap(CardPosition::Seat(0), CardPosition::Seat(9))
            .is_err());
        assert!(deck
            .swap(CardPosition::Center(3), CardPosition::Seat(0))
            .is_err());
        // Nothing was mutated and nothing was audited.
        assert!(deck.audit().is_empty());
    }

    #[test]
    fn role_multiset_is_conserved_across_swaps() {
        let mut deck = sample_deck();
        let before = deck.role_multiset();
        deck.swap(CardPosition::Seat(0), CardPosition::Center(1))
            .unwrap();
        deck.swap(CardPosition::Seat(2), CardPosition::Seat(1))
            .unwrap();
        deck.swap(CardPosition::Center(0), CardPosition::Center(2))
            .unwrap();
        assert_eq!(deck.role_multiset(), before);
    }

    #[test]
    fn starting_role_lookups() {
        let mut deck = sample_deck();
        deck.swap(CardPosition::Seat(0), CardPosition::Seat(2))
            .unwrap();
        assert_eq!(deck.seats_with_starting_role(Role::Werewolf), vec![0]);
        assert_eq!(deck.seats_with_current_role(Role::Werewolf), vec![2]);
    }
}
