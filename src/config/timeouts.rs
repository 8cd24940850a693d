//! Per-phase deadlines derived from the room's timeout profile.

use std::time::Duration;

use crate::protocol::TimeoutProfile;

/// Concrete deadlines the engine arms for each suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDeadlines {
    /// Deadline for each individual night prompt.
    pub night_action: Duration,
    /// Overall day-phase length.
    pub day: Duration,
    /// Shared deadline for the simultaneous vote prompts.
    pub vote: Duration,
}

impl PhaseDeadlines {
    pub fn for_profile(profile: TimeoutProfile) -> Self {
        match profile {
            TimeoutProfile::Casual => Self {
                night_action: Duration::from_secs(30),
                day: Duration::from_secs(300),
                vote: Duration::from_secs(45),
            },
            TimeoutProfile::Competitive => Self {
                night_action: Duration::from_secs(15),
                day: Duration::from_secs(180),
                vote: Duration::from_secs(30),
            },
            TimeoutProfile::Tournament => Self {
                night_action: Duration::from_secs(10),
                day: Duration::from_secs(120),
                vote: Duration::from_secs(20),
            },
        }
    }
}
