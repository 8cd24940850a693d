use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;

use super::room::Room;
use crate::game::decision::{Cancelled, DecisionProvider, PromptContext, SeerMode};
use crate::game::SeatId;
use crate::protocol::{ActionAnswer, ActionPrompt, PlayerId, RequestId};

/// Decision provider for a human-occupied seat: pushes `actionRequired`
/// over the member's channel and awaits the correlated `actionResponse`.
/// On deadline expiry it applies the prompt's documented default and
/// notifies the member with `actionTimeout`.
///
/// Holds the room weakly; a dropped room surfaces as [`Cancelled`],
/// which the engine treats as terminal.
pub struct HumanSeatProvider {
    room: Weak<Room>,
    member: PlayerId,
}

impl HumanSeatProvider {
    pub fn new(room: Weak<Room>, member: PlayerId) -> Arc<Self> {
        Arc::new(Self { room, member })
    }

    fn room(&self) -> Result<Arc<Room>, Cancelled> {
        self.room.upgrade().ok_or(Cancelled)
    }

    /// Issue the prompt, await the answer, and fall back to the default
    /// on timeout. Returns the room-domain answer.
    async fn ask(&self, ctx: PromptContext, prompt: ActionPrompt) -> Result<ActionAnswer, Cancelled> {
        let room = self.room()?;
        let (request_id, rx) = room
            .issue_prompt(&self.member, prompt.clone(), ctx.deadline)
            .await?;

        self.await_answer(&room, request_id, rx, ctx, prompt).await
    }

    async fn await_answer(
        &self,
        room: &Arc<Room>,
        request_id: RequestId,
        mut rx: oneshot::Receiver<ActionAnswer>,
        ctx: PromptContext,
        prompt: ActionPrompt,
    ) -> Result<ActionAnswer, Cancelled> {
        match tokio::time::timeout(ctx.deadline, &mut rx).await {
            Ok(Ok(answer)) => Ok(answer),
            // Sender dropped without an answer: the room cancelled us.
            Ok(Err(_)) => Err(Cancelled),
            Err(_elapsed) => {
                match room.expire_prompt(&self.member, request_id, &prompt).await {
                    Some(applied) => Ok(applied),
                    // Lost the race: something resolved the prompt right
                    // at the deadline. Prefer that answer if it made it.
                    None => match rx.try_recv() {
                        Ok(answer) => Ok(answer),
                        Err(_) => Err(Cancelled),
                    },
                }
            }
        }
    }

    async fn to_seat(&self, member: &PlayerId) -> Result<SeatId, Cancelled> {
        self.room()?.seat_of(member).await.ok_or(Cancelled)
    }

    async fn to_members(&self, room: &Arc<Room>, seats: &[SeatId]) -> Vec<PlayerId> {
        room.members_of(seats).await
    }
}

#[async_trait]
impl DecisionProvider for HumanSeatProvider {
    async fn select_player(
        &self,
        ctx: PromptContext,
        options: &[SeatId],
    ) -> Result<SeatId, Cancelled> {
        let room = self.room()?;
        let prompt = ActionPrompt::SelectPlayer {
            options: self.to_members(&room, options).await,
        };
        match self.ask(ctx, prompt).await? {
            ActionAnswer::Player { player_id } => self.to_seat(&player_id).await,
            _ => Err(Cancelled),
        }
    }

    async fn select_two_players(
        &self,
        ctx: PromptContext,
        options: &[SeatId],
    ) -> Result<(SeatId, SeatId), Cancelled> {
        let room = self.room()?;
        let prompt = ActionPrompt::SelectTwoPlayers {
            options: self.to_members(&room, options).await,
        };
        match self.ask(ctx, prompt).await? {
            ActionAnswer::Players { player_ids } if player_ids.len() == 2 => {
                let first = self.to_seat(&player_ids[0]).await?;
                let second = self.to_seat(&player_ids[1]).await?;
                Ok((first, second))
            }
            _ => Err(Cancelled),
        }
    }

    async fn select_center(
        &self,
        ctx: PromptContext,
        count: usize,
    ) -> Result<Vec<usize>, Cancelled> {
        match self.ask(ctx, ActionPrompt::SelectCenter { count }).await? {
            ActionAnswer::Center { indices } => Ok(indices),
            _ => Err(Cancelled),
        }
    }

    async fn seer_choice(&self, ctx: PromptContext) -> Result<SeerMode, Cancelled> {
        match self.ask(ctx, ActionPrompt::SeerChoice).await? {
            ActionAnswer::SeerMode { mode } => Ok(mode),
            _ => Err(Cancelled),
        }
    }

    async fn make_statement(&self, ctx: PromptContext) -> Result<String, Cancelled> {
        match self.ask(ctx, ActionPrompt::MakeStatement).await? {
            ActionAnswer::Statement { text } => Ok(text),
            _ => Err(Cancelled),
        }
    }

    async fn vote(&self, ctx: PromptContext, eligible: &[SeatId]) -> Result<SeatId, Cancelled> {
        let room = self.room()?;
        let prompt = ActionPrompt::Vote {
            options: self.to_members(&room, eligible).await,
        };
        match self.ask(ctx, prompt).await? {
            ActionAnswer::Vote { target } => self.to_seat(&target).await,
            _ => Err(Cancelled),
        }
    }
}
