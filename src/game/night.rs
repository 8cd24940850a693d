use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

use super::deck::{CardPosition, DeckError};
use super::decision::{Cancelled, DecisionProvider, PromptContext, SeatProviders, SeerMode};
use super::engine::GameState;
use super::role::{Role, DOPPELGANGER_INSOMNIAC_ORDER};
use super::SeatId;

/// Doppelganger copies, keyed by the copying seat. Populated at wake
/// order 1 and read through resolution.
#[derive(Debug, Clone, Default)]
pub struct ShadowTable {
    copies: BTreeMap<SeatId, Role>,
}

impl ShadowTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, seat: SeatId, copied: Role) {
        self.copies.insert(seat, copied);
    }

    pub fn copied_role(&self, seat: SeatId) -> Option<Role> {
        self.copies.get(&seat).copied()
    }

    /// Seats whose copy makes them wake (or be listed) with a group.
    pub fn seats_that_copied(&self, role: Role) -> Vec<SeatId> {
        self.copies
            .iter()
            .filter(|(_, r)| **r == role)
            .map(|(s, _)| *s)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SeatId, Role)> + '_ {
        self.copies.iter().map(|(s, r)| (*s, *r))
    }
}

/// A card reference inside a night observation, in whichever id domain
/// the observation currently lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "card", rename_all = "camelCase")]
pub enum CardRef<Id> {
    #[serde(rename_all = "camelCase")]
    Player { id: Id },
    #[serde(rename_all = "camelCase")]
    Center { index: usize },
}

impl<Id> CardRef<Id> {
    fn map_ids<J>(self, f: &impl Fn(&Id) -> J) -> CardRef<J> {
        match self {
            CardRef::Player { id } => CardRef::Player { id: f(&id) },
            CardRef::Center { index } => CardRef::Center { index },
        }
    }
}

/// One card the acting player got to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewing<Id> {
    #[serde(flatten)]
    pub card: CardRef<Id>,
    pub role: Role,
}

/// Record of a swap the acting player performed. Positions only; the
/// drunk and troublemaker must not learn what moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapNote<Id> {
    pub first: CardRef<Id>,
    pub second: CardRef<Id>,
}

/// "Copied from X, role Y" record for the doppelganger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopiedRole<Id> {
    pub from: Id,
    pub role: Role,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// The structured observation returned to exactly one player after their
/// night action. Append-only per player; frozen after the night phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(
    serialize = "Id: Serialize",
    deserialize = "Id: Deserialize<'de>"
))]
pub struct NightResult<Id> {
    /// Role whose action produced this observation.
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copied: Option<CopiedRole<Id>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub werewolves: Vec<Id>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masons: Vec<Id>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub viewings: Vec<Viewing<Id>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap: Option<SwapNote<Id>>,
    /// Set when the strategy failed and the turn was skipped.
    #[serde(default, skip_serializing_if = "is_false")]
    pub failed: bool,
}

impl<Id> NightResult<Id> {
    pub fn empty(role: Role) -> Self {
        Self {
            role,
            copied: None,
            werewolves: Vec::new(),
            masons: Vec::new(),
            viewings: Vec::new(),
            swap: None,
            failed: false,
        }
    }

    pub fn failed(role: Role) -> Self {
        Self {
            failed: true,
            ..Self::empty(role)
        }
    }

    /// Translate every id in the observation into another domain.
    pub fn map_ids<J>(self, f: &impl Fn(&Id) -> J) -> NightResult<J> {
        NightResult {
            role: self.role,
            copied: self.copied.map(|c| CopiedRole {
                from: f(&c.from),
                role: c.role,
            }),
            werewolves: self.werewolves.iter().map(&f).collect(),
            masons: self.masons.iter().map(&f).collect(),
            viewings: self
                .viewings
                .into_iter()
                .map(|v| Viewing {
                    card: v.card.map_ids(&f),
                    role: v.role,
                })
                .collect(),
            swap: self.swap.map(|s| SwapNote {
                first: s.first.map_ids(&f),
                second: s.second.map_ids(&f),
            }),
            failed: self.failed,
        }
    }
}

#[derive(Debug, Error)]
pub enum NightActionError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error(transparent)]
    Deck(#[from] DeckError),
    #[error("no decision provider bound for seat {0}")]
    MissingProvider(SeatId),
}

/// Drive the whole night: wake orders 1..=9 in strict sequence, then the
/// doppelganger-insomniac wake at order 10. Each seat's strategy runs to
/// completion before the next seat's, so later strategies observe
/// committed swaps. Results are appended to the acting seat's private
/// log and handed to `on_result` for immediate unicast delivery.
pub async fn run_night(
    state: &Mutex<GameState>,
    providers: &SeatProviders,
    prompt_deadline: Duration,
    mut on_result: impl FnMut(SeatId, NightResult<SeatId>),
) -> Result<(), Cancelled> {
    for order in 1..=9 {
        let Some(role) = Role::at_wake_order(order) else {
            continue;
        };
        let wakers: Vec<SeatId> = {
            let guard = state.lock().await;
            guard
                .deck
                .seats_with_starting_role(role)
                .into_iter()
                .map(SeatId::from_index)
                .collect()
        };

        for seat in wakers {
            let result = execute_action(state, providers, seat, role, prompt_deadline).await;
            let result = match result {
                Ok(result) => result,
                Err(NightActionError::Cancelled(c)) => return Err(c),
                Err(err) => {
                    tracing::warn!(%seat, %role, error = %err, "night action failed, skipping turn");
                    NightResult::failed(role)
                }
            };
            record_result(state, seat, result, &mut on_result).await;
        }
    }

    // Order 10: every doppelganger who copied the insomniac sees the role
    // now at their own seat, after all prior swaps.
    let late_wakers: Vec<SeatId> = {
        let guard = state.lock().await;
        guard.shadow.seats_that_copied(Role::Insomniac)
    };
    for seat in late_wakers {
        let result = {
            let guard = state.lock().await;
            match guard.deck.role_at(CardPosition::Seat(seat.index())) {
                Ok(role_seen) => {
                    let mut result = NightResult::empty(Role::Doppelganger);
                    result.viewings.push(Viewing {
                        card: CardRef::Player { id: seat },
                        role: role_seen,
                    });
                    result
                }
                Err(err) => {
                    tracing::warn!(%seat, error = %err, "doppelganger-insomniac wake failed");
                    NightResult::failed(Role::Doppelganger)
                }
            }
        };
        tracing::debug!(%seat, order = DOPPELGANGER_INSOMNIAC_ORDER, "late wake executed");
        record_result(state, seat, result, &mut on_result).await;
    }

    Ok(())
}

async fn record_result(
    state: &Mutex<GameState>,
    seat: SeatId,
    result: NightResult<SeatId>,
    on_result: &mut impl FnMut(SeatId, NightResult<SeatId>),
) {
    let mut guard = state.lock().await;
    if let Some(player) = guard.players.get_mut(&seat) {
        player.night_log.push(result.clone());
    }
    drop(guard);
    on_result(seat, result);
}

/// Execute one seat's action for `role`. Also used for the inline
/// execution of a doppelganger's copied role, with the doppelganger as
/// the acting seat.
async fn execute_action(
    state: &Mutex<GameState>,
    providers: &SeatProviders,
    seat: SeatId,
    role: Role,
    deadline: Duration,
) -> Result<NightResult<SeatId>, NightActionError> {
    let provider = providers
        .provider(seat)
        .ok_or(NightActionError::MissingProvider(seat))?;
    let ctx = PromptContext { seat, deadline };

    match role {
        Role::Doppelganger => doppelganger_action(state, seat, provider.as_ref(), ctx).await,
        Role::Werewolf => werewolf_action(state, seat, provider.as_ref(), ctx).await,
        Role::Minion => minion_action(state, seat).await,
        Role::Mason => mason_action(state, seat).await,
        Role::Seer => seer_action(state, seat, provider.as_ref(), ctx).await,
        Role::Robber => robber_action(state, seat, provider.as_ref(), ctx).await,
        Role::Troublemaker => troublemaker_action(state, seat, provider.as_ref(), ctx).await,
        Role::Drunk => drunk_action(state, seat, provider.as_ref(), ctx).await,
        Role::Insomniac => insomniac_action(state, seat).await,
        Role::Villager | Role::Hunter | Role::Tanner => Ok(NightResult::empty(role)),
    }
}

/// Everyone currently counted as a werewolf for wake-up purposes:
/// seats dealt a werewolf plus doppelgangers who copied one. Minions
/// (and doppelganger-minions) stay invisible here.
async fn werewolf_seats(state: &Mutex<GameState>) -> Vec<SeatId> {
    let guard = state.lock().await;
    let mut seats: Vec<SeatId> = guard
        .deck
        .seats_with_starting_role(Role::Werewolf)
        .into_iter()
        .map(SeatId::from_index)
        .collect();
    seats.extend(guard.shadow.seats_that_copied(Role::Werewolf));
    seats.sort();
    seats.dedup();
    seats
}

async fn other_seats(state: &Mutex<GameState>, seat: SeatId) -> Vec<SeatId> {
    let guard = state.lock().await;
    guard
        .players
        .keys()
        .copied()
        .filter(|s| *s != seat)
        .collect()
}

async fn doppelganger_action(
    state: &Mutex<GameState>,
    seat: SeatId,
    provider: &dyn DecisionProvider,
    ctx: PromptContext,
) -> Result<NightResult<SeatId>, NightActionError> {
    let options = other_seats(state, seat).await;
    let target = provider.select_player(ctx, &options).await?;

    // The copied role is the current role at the target's seat at order 1,
    // before any later swap can move it.
    let copied = {
        let mut guard = state.lock().await;
        let copied = guard.deck.role_at(CardPosition::Seat(target.index()))?;
        guard.shadow.record(seat, copied);
        copied
    };
    tracing::debug!(%seat, %target, copied = %copied, "doppelganger copied a role");

    let mut result = NightResult::empty(Role::Doppelganger);
    result.copied = Some(CopiedRole {
        from: target,
        role: copied,
    });

    // Copied roles with an immediate action run inline on behalf of the
    // doppelganger. A copied insomniac instead wakes at order 10, and a
    // copied werewolf or minion also joins the teammate sets through the
    // shadow table recorded above.
    let inline_result = match copied {
        Role::Werewolf => Some(werewolf_action(state, seat, provider, ctx).await?),
        Role::Minion => Some(minion_action(state, seat).await?),
        Role::Mason => Some(mason_action(state, seat).await?),
        Role::Seer => Some(seer_action(state, seat, provider, ctx).await?),
        Role::Robber => Some(robber_action(state, seat, provider, ctx).await?),
        Role::Troublemaker => Some(troublemaker_action(state, seat, provider, ctx).await?),
        Role::Drunk => Some(drunk_action(state, seat, provider, ctx).await?),
        Role::Insomniac
        | Role::Doppelganger
        | Role::Villager
        | Role::Hunter
        | Role::Tanner => None,
    };

    if let Some(inline_result) = inline_result {
        result.werewolves = inline_result.werewolves;
        result.masons = inline_result.masons;
        result.viewings = inline_result.viewings;
        result.swap = inline_result.swap;
    }

    Ok(result)
}

async fn werewolf_action(
    state: &Mutex<GameState>,
    seat: SeatId,
    provider: &dyn DecisionProvider,
    ctx: PromptContext,
) -> Result<NightResult<SeatId>, NightActionError> {
    let mut result = NightResult::empty(Role::Werewolf);
    let others: Vec<SeatId> = werewolf_seats(state)
        .await
        .into_iter()
        .filter(|s| *s != seat)
        .collect();

    if others.is_empty() {
        // Lone wolf: one center card as consolation.
        let picks = provider.select_center(ctx, 1).await?;
        let guard = state.lock().await;
        for index in picks {
            let role = guard.deck.role_at(CardPosition::Center(index))?;
            result.viewings.push(Viewing {
                card: CardRef::Center { index },
                role,
            });
        }
    } else {
        result.werewolves = others;
    }
    Ok(result)
}

async fn minion_action(
    state: &Mutex<GameState>,
    _seat: SeatId,
) -> Result<NightResult<SeatId>, NightActionError> {
    let mut result = NightResult::empty(Role::Minion);
    result.werewolves = werewolf_seats(state).await;
    Ok(result)
}

async fn mason_action(
    state: &Mutex<GameState>,
    seat: SeatId,
) -> Result<NightResult<SeatId>, NightActionError> {
    let mut result = NightResult::empty(Role::Mason);
    let guard = state.lock().await;
    let mut masons: Vec<SeatId> = guard
        .deck
        .seats_with_starting_role(Role::Mason)
        .into_iter()
        .map(SeatId::from_index)
        .collect();
    masons.extend(guard.shadow.seats_that_copied(Role::Mason));
    masons.sort();
    masons.dedup();
    result.masons = masons.into_iter().filter(|s| *s != seat).collect();
    Ok(result)
}

async fn seer_action(
    state: &Mutex<GameState>,
    seat: SeatId,
    provider: &dyn DecisionProvider,
    ctx: PromptContext,
) -> Result<NightResult<SeatId>, NightActionError> {
    let mut result = NightResult::empty(Role::Seer);
    match provider.seer_choice(ctx).await? {
        SeerMode::Player => {
            let options = other_seats(state, seat).await;
            let target = provider.select_player(ctx, &options).await?;
            let guard = state.lock().await;
            let role = guard.deck.role_at(CardPosition::Seat(target.index()))?;
            result.viewings.push(Viewing {
                card: CardRef::Player { id: target },
                role,
            });
        }
        SeerMode::Center => {
            let picks = provider.select_center(ctx, 2).await?;
            let guard = state.lock().await;
            for index in picks {
                let role = guard.deck.role_at(CardPosition::Center(index))?;
                result.viewings.push(Viewing {
                    card: CardRef::Center { index },
                    role,
                });
            }
        }
    }
    Ok(result)
}

async fn robber_action(
    state: &Mutex<GameState>,
    seat: SeatId,
    provider: &dyn DecisionProvider,
    ctx: PromptContext,
) -> Result<NightResult<SeatId>, NightActionError> {
    let mut result = NightResult::empty(Role::Robber);
    let options = other_seats(state, seat).await;
    let target = provider.select_player(ctx, &options).await?;

    let mut guard = state.lock().await;
    guard.deck.swap(
        CardPosition::Seat(seat.index()),
        CardPosition::Seat(target.index()),
    )?;
    let stolen = guard.deck.role_at(CardPosition::Seat(seat.index()))?;
    drop(guard);

    result.swap = Some(SwapNote {
        first: CardRef::Player { id: seat },
        second: CardRef::Player { id: target },
    });
    result.viewings.push(Viewing {
        card: CardRef::Player { id: seat },
        role: stolen,
    });
    Ok(result)
}

async fn troublemaker_action(
    state: &Mutex<GameState>,
    seat: SeatId,
    provider: &dyn DecisionProvider,
    ctx: PromptContext,
) -> Result<NightResult<SeatId>, NightActionError> {
    let mut result = NightResult::empty(Role::Troublemaker);
    let options = other_seats(state, seat).await;
    let (first, second) = provider.select_two_players(ctx, &options).await?;

    let mut guard = state.lock().await;
    guard.deck.swap(
        CardPosition::Seat(first.index()),
        CardPosition::Seat(second.index()),
    )?;
    drop(guard);

    result.swap = Some(SwapNote {
        first: CardRef::Player { id: first },
        second: CardRef::Player { id: second },
    });
    Ok(result)
}

async fn drunk_action(
    state: &Mutex<GameState>,
    seat: SeatId,
    provider: &dyn DecisionProvider,
    ctx: PromptContext,
) -> Result<NightResult<SeatId>, NightActionError> {
    let mut result = NightResult::empty(Role::Drunk);
    let picks = provider.select_center(ctx, 1).await?;
    let index = picks.first().copied().unwrap_or(0);

    let mut guard = state.lock().await;
    guard
        .deck
        .swap(CardPosition::Seat(seat.index()), CardPosition::Center(index))?;
    drop(guard);

    // No viewing: the drunk never learns the new role.
    result.swap = Some(SwapNote {
        first: CardRef::Player { id: seat },
        second: CardRef::Center { index },
    });
    Ok(result)
}

async fn insomniac_action(
    state: &Mutex<GameState>,
    seat: SeatId,
) -> Result<NightResult<SeatId>, NightActionError> {
    let mut result = NightResult::empty(Role::Insomniac);
    let guard = state.lock().await;
    let role = guard.deck.role_at(CardPosition::Seat(seat.index()))?;
    result.viewings.push(Viewing {
        card: CardRef::Player { id: seat },
        role,
    });
    Ok(result)
}
