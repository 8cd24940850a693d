use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side a role fights for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Village,
    Werewolf,
    Tanner,
}

/// The fixed role catalog. Metadata is static; behavior lives in the
/// night engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Doppelganger,
    Werewolf,
    Minion,
    Mason,
    Seer,
    Robber,
    Troublemaker,
    Drunk,
    Insomniac,
    Villager,
    Hunter,
    Tanner,
}

/// Wake order reserved for Doppelgangers who copied Insomniac; it runs
/// strictly after every ordinary night action.
pub const DOPPELGANGER_INSOMNIAC_ORDER: u8 = 10;

impl Role {
    pub const ALL: [Role; 12] = [
        Role::Doppelganger,
        Role::Werewolf,
        Role::Minion,
        Role::Mason,
        Role::Seer,
        Role::Robber,
        Role::Troublemaker,
        Role::Drunk,
        Role::Insomniac,
        Role::Villager,
        Role::Hunter,
        Role::Tanner,
    ];

    pub const fn team(self) -> Team {
        match self {
            Role::Werewolf | Role::Minion => Team::Werewolf,
            Role::Tanner => Team::Tanner,
            Role::Doppelganger
            | Role::Mason
            | Role::Seer
            | Role::Robber
            | Role::Troublemaker
            | Role::Drunk
            | Role::Insomniac
            | Role::Villager
            | Role::Hunter => Team::Village,
        }
    }

    /// Position in the strict night sequence, or `None` for roles that
    /// sleep through the night.
    pub const fn wake_order(self) -> Option<u8> {
        match self {
            Role::Doppelganger => Some(1),
            Role::Werewolf => Some(2),
            Role::Minion => Some(3),
            Role::Mason => Some(4),
            Role::Seer => Some(5),
            Role::Robber => Some(6),
            Role::Troublemaker => Some(7),
            Role::Drunk => Some(8),
            Role::Insomniac => Some(9),
            Role::Villager | Role::Hunter | Role::Tanner => None,
        }
    }

    /// The role that acts at a given ordinary wake order (1..=9).
    pub fn at_wake_order(order: u8) -> Option<Role> {
        Role::ALL
            .into_iter()
            .find(|role| role.wake_order() == Some(order))
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Role::Doppelganger => "Doppelganger",
            Role::Werewolf => "Werewolf",
            Role::Minion => "Minion",
            Role::Mason => "Mason",
            Role::Seer => "Seer",
            Role::Robber => "Robber",
            Role::Troublemaker => "Troublemaker",
            Role::Drunk => "Drunk",
            Role::Insomniac => "Insomniac",
            Role::Villager => "Villager",
            Role::Hunter => "Hunter",
            Role::Tanner => "Tanner",
        }
    }

    /// Lobby-facing description of the night action and win condition.
    pub const fn description(self) -> &'static str {
        match self {
            Role::Doppelganger => {
                "Looks at another player's card and becomes that role, acting on it immediately where applicable."
            }
            Role::Werewolf => {
                "Learns the other werewolves. A lone werewolf may look at one center card."
            }
            Role::Minion => {
                "Learns who the werewolves are. The werewolves do not learn the minion."
            }
            Role::Mason => "Learns the other masons.",
            Role::Seer => "Views another player's card, or two of the center cards.",
            Role::Robber => "Swaps cards with another player and looks at the new card.",
            Role::Troublemaker => "Swaps the cards of two other players without looking at them.",
            Role::Drunk => "Swaps with a center card without looking at it.",
            Role::Insomniac => "Looks at their own card at the end of the night.",
            Role::Villager => "Has no night action. Wins with the village.",
            Role::Hunter => "If eliminated, the player the hunter voted for is eliminated too.",
            Role::Tanner => "Wants to be eliminated. Wins alone if that happens.",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
