use async_trait::async_trait;
use rand::RngExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

use super::SeatId;
use crate::protocol::{ActionAnswer, ActionPrompt, PlayerId, RequestId};

/// The seer's first decision: view a player's card or two center cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeerMode {
    Player,
    Center,
}

/// Terminal marker: the prompt's owner is gone (room shutdown). The
/// engine treats this as fatal for the running game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pending decision cancelled")]
pub struct Cancelled;

/// Everything a provider needs to know about one prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext {
    /// The seat being asked.
    pub seat: SeatId,
    /// How long the answer may take before the documented default applies.
    pub deadline: Duration,
}

/// The engine's port for asking "what does this seat choose". The engine
/// never knows whether a human, an AI seat, or a takeover fallback is on
/// the other side.
///
/// Deadline behavior is part of the contract: when the deadline elapses
/// the provider must return the documented default instead of an error.
/// Defaults: selections fall back to the first option(s), center picks to
/// the lowest indices, the seer choice to `Center`, the statement to an
/// empty string, and the vote to a uniformly random eligible target.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    async fn select_player(
        &self,
        ctx: PromptContext,
        options: &[SeatId],
    ) -> Result<SeatId, Cancelled>;

    async fn select_two_players(
        &self,
        ctx: PromptContext,
        options: &[SeatId],
    ) -> Result<(SeatId, SeatId), Cancelled>;

    async fn select_center(
        &self,
        ctx: PromptContext,
        count: usize,
    ) -> Result<Vec<usize>, Cancelled>;

    async fn seer_choice(&self, ctx: PromptContext) -> Result<SeerMode, Cancelled>;

    async fn make_statement(&self, ctx: PromptContext) -> Result<String, Cancelled>;

    async fn vote(&self, ctx: PromptContext, eligible: &[SeatId]) -> Result<SeatId, Cancelled>;
}

/// Atomically swappable provider slot for one seat. Swapping is how AI
/// takeover and reconnection change who answers without the engine
/// noticing.
pub struct ProviderCell {
    inner: RwLock<Arc<dyn DecisionProvider>>,
}

impl ProviderCell {
    pub fn new(provider: Arc<dyn DecisionProvider>) -> Self {
        Self {
            inner: RwLock::new(provider),
        }
    }

    pub fn get(&self) -> Arc<dyn DecisionProvider> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn swap(&self, provider: Arc<dyn DecisionProvider>) {
        *self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = provider;
    }
}

/// One provider cell per seat.
pub struct SeatProviders {
    cells: BTreeMap<SeatId, ProviderCell>,
}

impl SeatProviders {
    pub fn new(cells: BTreeMap<SeatId, ProviderCell>) -> Self {
        Self { cells }
    }

    /// Current provider for a seat. Seats are fixed at deal time, so a
    /// miss is a programming error; callers treat it as internal.
    pub fn provider(&self, seat: SeatId) -> Option<Arc<dyn DecisionProvider>> {
        self.cells.get(&seat).map(ProviderCell::get)
    }

    pub fn swap(&self, seat: SeatId, provider: Arc<dyn DecisionProvider>) {
        if let Some(cell) = self.cells.get(&seat) {
            cell.swap(provider);
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no pending decision with that request id")]
    UnknownRequest,
    #[error("answer does not match the offered options")]
    InvalidAnswer,
}

struct PendingEntry {
    member: PlayerId,
    prompt: ActionPrompt,
    tx: oneshot::Sender<ActionAnswer>,
}

/// Outstanding prompts awaiting an `actionResponse`. One entry per
/// request id; exactly one resolution (answer, timeout, takeover, or
/// cancel) removes it, so late and duplicate responses fall out as
/// [`ResolveError::UnknownRequest`].
#[derive(Default)]
pub struct PendingDecisions {
    inner: Mutex<HashMap<RequestId, PendingEntry>>,
}

impl PendingDecisions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prompt for a member and get the receiver its answer
    /// will arrive on.
    pub fn register(
        &self,
        request_id: RequestId,
        member: PlayerId,
        prompt: ActionPrompt,
    ) -> oneshot::Receiver<ActionAnswer> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        inner.insert(
            request_id,
            PendingEntry { member, prompt, tx },
        );
        rx
    }

    /// Resolve a pending prompt with a client answer. The responder must
    /// own the prompt, and the answer is validated against the stored
    /// prompt before it is forwarded.
    pub fn resolve(
        &self,
        request_id: RequestId,
        member: &PlayerId,
        answer: ActionAnswer,
    ) -> Result<(), ResolveError> {
        let mut inner = self.lock();
        let entry = inner.get(&request_id).ok_or(ResolveError::UnknownRequest)?;
        if entry.member != *member {
            // Do not leak that the request id exists for someone else.
            return Err(ResolveError::UnknownRequest);
        }
        if !answer_matches_prompt(&entry.prompt, &answer) {
            return Err(ResolveError::InvalidAnswer);
        }
        // Only remove once the answer is known-good; an invalid answer
        // leaves the prompt open for a retry.
        let entry = inner.remove(&request_id).ok_or(ResolveError::UnknownRequest)?;
        let _ = entry.tx.send(answer);
        Ok(())
    }

    /// Remove an entry without answering it (timeout path).
    pub fn take(&self, request_id: RequestId) -> bool {
        self.lock().remove(&request_id).is_some()
    }

    /// Resolve every outstanding prompt owned by a member with the
    /// prompt's default answer. Used by AI takeover. Returns the
    /// resolved request ids and the answers applied.
    pub fn resolve_defaults_for_member(&self, member: &PlayerId) -> Vec<(RequestId, ActionAnswer)> {
        let mut inner = self.lock();
        let ids: Vec<RequestId> = inner
            .iter()
            .filter(|(_, e)| &e.member == member)
            .map(|(id, _)| *id)
            .collect();

        let mut resolved = Vec::new();
        for id in ids {
            if let Some(entry) = inner.remove(&id) {
                let answer = entry.prompt.default_answer();
                let _ = entry.tx.send(answer.clone());
                resolved.push((id, answer));
            }
        }
        resolved
    }

    /// Drop every outstanding prompt; receivers observe closure and the
    /// providers surface [`Cancelled`].
    pub fn cancel_all(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RequestId, PendingEntry>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn answer_matches_prompt(prompt: &ActionPrompt, answer: &ActionAnswer) -> bool {
    match (prompt, answer) {
        (ActionPrompt::SelectPlayer { options }, ActionAnswer::Player { player_id }) => {
            options.contains(player_id)
        }
        (ActionPrompt::SelectTwoPlayers { options }, ActionAnswer::Players { player_ids }) => {
            player_ids.len() == 2
                && player_ids[0] != player_ids[1]
                && player_ids.iter().all(|id| options.contains(id))
        }
        (ActionPrompt::SelectCenter { count }, ActionAnswer::Center { indices }) => {
            indices.len() == *count
                && indices.iter().all(|i| *i < crate::protocol::CENTER_CARD_COUNT)
                && indices
                    .iter()
                    .enumerate()
                    .all(|(n, i)| !indices[..n].contains(i))
        }
        (ActionPrompt::SeerChoice, ActionAnswer::SeerMode { .. }) => true,
        (ActionPrompt::MakeStatement, ActionAnswer::Statement { text }) => !text.trim().is_empty(),
        (ActionPrompt::Vote { options }, ActionAnswer::Vote { target }) => options.contains(target),
        _ => false,
    }
}

/// Built-in random policy. Serves AI seats and post-takeover humans;
/// a smarter external policy can be swapped in through the same trait.
pub struct AiProvider {
    statements: &'static [&'static str],
}

impl Default for AiProvider {
    fn default() -> Self {
        Self {
            statements: &[
                "I'm just a villager, I saw nothing all night.",
                "Someone swapped cards, I can feel it.",
                "I trust nobody at this table.",
                "My card has not moved, I'm sure of it.",
                "Whoever talks the least is the wolf.",
                "I had a quiet night. Too quiet.",
            ],
        }
    }
}

impl AiProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn pick<T: Copy>(items: &[T]) -> Option<T> {
        if items.is_empty() {
            return None;
        }
        let mut rng = rand::rng();
        let idx = rng.random_range(0..items.len());
        items.get(idx).copied()
    }
}

#[async_trait]
impl DecisionProvider for AiProvider {
    async fn select_player(
        &self,
        _ctx: PromptContext,
        options: &[SeatId],
    ) -> Result<SeatId, Cancelled> {
        Self::pick(options).ok_or(Cancelled)
    }

    async fn select_two_players(
        &self,
        _ctx: PromptContext,
        options: &[SeatId],
    ) -> Result<(SeatId, SeatId), Cancelled> {
        if options.len() < 2 {
            return Err(Cancelled);
        }
        let mut rng = rand::rng();
        let first = rng.random_range(0..options.len());
        let mut second = rng.random_range(0..options.len() - 1);
        if second >= first {
            second += 1;
        }
        Ok((options[first], options[second]))
    }

    async fn select_center(
        &self,
        _ctx: PromptContext,
        count: usize,
    ) -> Result<Vec<usize>, Cancelled> {
        let mut indices: Vec<usize> = (0..crate::protocol::CENTER_CARD_COUNT).collect();
        let mut rng = rand::rng();
        // Partial Fisher-Yates: the first `count` entries end up random.
        for i in 0..count.min(indices.len()) {
            let j = rng.random_range(i..indices.len());
            indices.swap(i, j);
        }
        indices.truncate(count);
        Ok(indices)
    }

    async fn seer_choice(&self, _ctx: PromptContext) -> Result<SeerMode, Cancelled> {
        let mut rng = rand::rng();
        Ok(if rng.random_range(0..2) == 0 {
            SeerMode::Player
        } else {
            SeerMode::Center
        })
    }

    async fn make_statement(&self, _ctx: PromptContext) -> Result<String, Cancelled> {
        Ok(Self::pick(self.statements).unwrap_or("...").to_string())
    }

    async fn vote(&self, _ctx: PromptContext, eligible: &[SeatId]) -> Result<SeatId, Cancelled> {
        Self::pick(eligible).ok_or(Cancelled)
    }
}
