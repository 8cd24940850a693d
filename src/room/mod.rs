// Rooms: lobby membership, the seat bi-map, the running game, and the
// directory that owns them all.

pub mod manager;
pub mod provider;
pub mod room;
pub mod seat_map;

pub use manager::{CreateRoomError, RoomManager};
pub use provider::HumanSeatProvider;
pub use room::{Member, Room, RoomError, RoomSettings};
pub use seat_map::SeatMap;
