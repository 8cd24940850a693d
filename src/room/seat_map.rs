use std::collections::{BTreeMap, HashMap};

use crate::game::SeatId;
use crate::protocol::PlayerId;

/// Bi-directional mapping between room member ids (stable external
/// identity) and engine seat ids. Built once at game start; every engine
/// emission is translated member-ward and every inbound player reference
/// seat-ward through this table.
#[derive(Debug, Clone, Default)]
pub struct SeatMap {
    by_member: HashMap<PlayerId, SeatId>,
    by_seat: BTreeMap<SeatId, PlayerId>,
}

impl SeatMap {
    /// Assign seats `player-1..player-N` to members in the given order.
    pub fn assign(members: &[PlayerId]) -> Self {
        let mut map = Self::default();
        for (index, member) in members.iter().enumerate() {
            let seat = SeatId::from_index(index);
            map.by_member.insert(member.clone(), seat);
            map.by_seat.insert(seat, member.clone());
        }
        map
    }

    pub fn seat_for(&self, member: &PlayerId) -> Option<SeatId> {
        self.by_member.get(member).copied()
    }

    pub fn member_for(&self, seat: SeatId) -> Option<&PlayerId> {
        self.by_seat.get(&seat)
    }

    /// Member id for a seat, or the seat's wire form when the seat is
    /// somehow unmapped. Keeps translation total so projections never
    /// fail mid-broadcast.
    pub fn member_or_seat_string(&self, seat: SeatId) -> PlayerId {
        self.member_for(seat)
            .cloned()
            .unwrap_or_else(|| seat.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.by_seat.is_empty()
    }

    /// Wire-friendly form of the whole table, seat string to member id.
    pub fn as_wire_map(&self) -> BTreeMap<String, PlayerId> {
        self.by_seat
            .iter()
            .map(|(seat, member)| (seat.to_string(), member.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_is_bijective_in_join_order() {
        let members = vec!["alice".to_string(), "bob".to_string(), "carol".to_string()];
        let map = SeatMap::assign(&members);

        assert_eq!(map.seat_for(&"alice".to_string()), Some(SeatId::from_index(0)));
        assert_eq!(map.seat_for(&"carol".to_string()), Some(SeatId::from_index(2)));
        assert_eq!(
            map.member_for(SeatId::from_index(1)),
            Some(&"bob".to_string())
        );
        assert_eq!(map.seat_for(&"nobody".to_string()), None);

        let wire = map.as_wire_map();
        assert_eq!(wire["player-1"], "alice");
        assert_eq!(wire["player-3"], "carol");
    }
}
