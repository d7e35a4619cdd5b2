use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::tickets::model::{NewReply, NewTicket, Reply, Ticket, TicketFilter};

/// Infrastructure-level store failures. Domain outcomes (not found, guard
/// refused) are expressed through `Option` returns, not errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("stored row is inconsistent: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Guard evaluated atomically with `append_reply`.
#[derive(Debug, Clone, Copy)]
pub enum ReplyGuard {
    /// Agent reply: the ticket must be assigned to this agent and not closed.
    Assignee(Uuid),
    /// Customer reply: the ticket must be open, assigned, or in progress.
    OpenFamily,
}

/// The single shared mutable resource of the subsystem. Every conditional
/// method evaluates its guard and applies its mutation as one atomic step
/// against the record; two transitions on the same ticket can never both
/// observe stale pre-transition state.
///
/// Conditional methods return `Ok(None)` when the guard matched no record;
/// callers re-read to classify (missing vs wrong assignee vs wrong state).
/// Every committed transition bumps the ticket's `revision`, in the same
/// atomic step, so returned snapshots carry the commit order of the ticket.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Insert a new ticket with status `open`.
    async fn insert_ticket(
        &self,
        new: NewTicket,
        now: DateTime<Utc>,
    ) -> Result<Ticket, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Ticket>, StoreError>;

    /// Replies for a ticket ordered by `created_at`, ties broken by `seq`.
    async fn replies(&self, ticket_id: Uuid) -> Result<Vec<Reply>, StoreError>;

    /// Tickets newest-first, narrowed by the view filter.
    async fn list(&self, filter: TicketFilter) -> Result<Vec<Ticket>, StoreError>;

    /// Most recently created ticket for this channel whose status is in the
    /// open family. Closed tickets never match.
    async fn latest_open_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<Ticket>, StoreError>;

    /// Compare-and-swap claim: sets assignee and `assigned` status only if
    /// `assigned_to` is currently null. Exactly one of any set of concurrent
    /// calls for the same ticket can succeed.
    async fn claim_if_unassigned(
        &self,
        id: Uuid,
        agent_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError>;

    /// Atomically verify the guard, move the ticket to `in_progress`, bump
    /// `last_reply_at`, and insert the reply row. Reply timestamps are
    /// clamped to be non-decreasing within the ticket (replayed webhook
    /// deliveries may carry past timestamps).
    async fn append_reply(
        &self,
        ticket_id: Uuid,
        reply: NewReply,
        guard: ReplyGuard,
        now: DateTime<Utc>,
    ) -> Result<Option<(Ticket, Reply)>, StoreError>;

    /// Close, guarded by `assigned_to = agent_id AND status != closed`.
    async fn close_if_open(
        &self,
        id: Uuid,
        agent_id: Uuid,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError>;

    /// Reopen, guarded by `status = closed`. Restores `assigned` status with
    /// the retained assignee and clears the closing fields.
    async fn reopen_if_closed(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError>;

    /// Record that the outbound channel accepted a reply. Returns false when
    /// no reply row matched the id.
    async fn mark_reply_delivered(&self, reply_id: Uuid) -> Result<bool, StoreError>;

    /// Liveness probe for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}
