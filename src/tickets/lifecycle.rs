use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::tickets::error::TicketError;
use crate::tickets::events::{EventNotifier, TicketEvent};
use crate::tickets::model::{
    AgentContext, NewReply, NewTicket, Reply, Ticket, TicketFilter,
};
use crate::tickets::outbound::OutboundGateway;
use crate::tickets::store::{ReplyGuard, TicketStore};

/// Result of an agent `reply` transition. The ticket state change is
/// authoritative; a failed outbound delivery is only a warning.
#[derive(Debug)]
pub struct ReplyOutcome {
    pub ticket: Ticket,
    pub reply: Reply,
    pub delivery_warning: Option<String>,
}

/// State machine for `open -> assigned -> in_progress -> closed` plus the
/// privileged reopen. All mutation goes through the store's atomic
/// conditional operations; the engine classifies refusals and emits events
/// in commit order.
pub struct LifecycleEngine {
    store: Arc<dyn TicketStore>,
    notifier: Arc<dyn EventNotifier>,
    gateway: Arc<dyn OutboundGateway>,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn TicketStore>,
        notifier: Arc<dyn EventNotifier>,
        gateway: Arc<dyn OutboundGateway>,
    ) -> Self {
        Self { store, notifier, gateway }
    }

    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.store
    }

    /// `create` transition: new ticket, status `open`.
    pub async fn create(&self, new: NewTicket, now: DateTime<Utc>) -> Result<Ticket, TicketError> {
        if new.channel_id.trim().is_empty() {
            return Err(TicketError::Validation("channel_id must not be empty".into()));
        }
        let ticket = self.store.insert_ticket(new, now).await?;
        info!(ticket = %ticket.id, channel = %ticket.channel_id, "ticket created");
        self.notifier.emit(TicketEvent::NewTicket { ticket: ticket.clone() });
        Ok(ticket)
    }

    /// `reply` transition: the assignee answers the customer. The reply row
    /// commits before any delivery attempt; gateway failure downgrades to a
    /// warning on an otherwise successful call.
    pub async fn reply(
        &self,
        ticket_id: Uuid,
        agent: &AgentContext,
        body: String,
    ) -> Result<ReplyOutcome, TicketError> {
        if body.trim().is_empty() {
            return Err(TicketError::Validation("reply body must not be empty".into()));
        }

        let now = Utc::now();
        let appended = self
            .store
            .append_reply(
                ticket_id,
                NewReply::from_agent(agent.id, body.clone()),
                ReplyGuard::Assignee(agent.id),
                now,
            )
            .await?;
        let Some((ticket, mut reply)) = appended else {
            return Err(self.classify_refusal(ticket_id, Some(agent.id), "reply").await?);
        };
        info!(ticket = %ticket.id, agent = %agent.id, "agent reply recorded");

        let delivery_warning = match self.gateway.send(&ticket.channel_id, &body).await {
            Ok(()) => match self.store.mark_reply_delivered(reply.id).await {
                Ok(true) => {
                    reply.delivered = true;
                    None
                }
                Ok(false) => {
                    warn!(ticket = %ticket.id, reply = %reply.id,
                        "delivered but no reply row matched the id");
                    Some("delivery succeeded but was not recorded".to_string())
                }
                Err(e) => {
                    warn!(ticket = %ticket.id, reply = %reply.id, error = %e,
                        "delivered but failed to record delivery flag");
                    Some(format!("delivery succeeded but was not recorded: {}", e))
                }
            },
            Err(e) => {
                warn!(ticket = %ticket.id, reply = %reply.id, error = %e,
                    "outbound delivery failed; reply kept with delivered=false");
                Some(format!("delivery failed: {}", e))
            }
        };

        self.notifier.emit(TicketEvent::TicketReply {
            ticket: ticket.clone(),
            reply: reply.clone(),
        });
        Ok(ReplyOutcome { ticket, reply, delivery_warning })
    }

    /// `append_customer_reply` transition: inbound message attached to an
    /// open-family ticket. `occurred_at` may lie in the past for replayed
    /// webhook deliveries; the store clamps it.
    pub async fn append_customer_reply(
        &self,
        ticket_id: Uuid,
        body: String,
        occurred_at: DateTime<Utc>,
    ) -> Result<(Ticket, Reply), TicketError> {
        let appended = self
            .store
            .append_reply(
                ticket_id,
                NewReply::from_customer(body),
                ReplyGuard::OpenFamily,
                occurred_at,
            )
            .await?;
        let Some((ticket, reply)) = appended else {
            return Err(self
                .classify_refusal(ticket_id, None, "append_customer_reply")
                .await?);
        };
        info!(ticket = %ticket.id, "customer reply recorded");
        self.notifier.emit(TicketEvent::TicketReply {
            ticket: ticket.clone(),
            reply: reply.clone(),
        });
        Ok((ticket, reply))
    }

    /// `close` transition, guarded by assignee and non-closed status.
    pub async fn close(
        &self,
        ticket_id: Uuid,
        agent: &AgentContext,
        note: Option<String>,
    ) -> Result<Ticket, TicketError> {
        let now = Utc::now();
        let closed = self
            .store
            .close_if_open(ticket_id, agent.id, note, now)
            .await?;
        let Some(ticket) = closed else {
            return Err(self.classify_refusal(ticket_id, Some(agent.id), "close").await?);
        };
        info!(ticket = %ticket.id, agent = %agent.id, "ticket closed");
        self.notifier.emit(TicketEvent::TicketClosed { ticket: ticket.clone() });
        Ok(ticket)
    }

    /// `reopen` transition: admin only, closed tickets only. The assignee
    /// from before closure is retained.
    pub async fn reopen(
        &self,
        ticket_id: Uuid,
        agent: &AgentContext,
    ) -> Result<Ticket, TicketError> {
        if !agent.is_admin() {
            return Err(TicketError::forbidden(agent.id, "reopen", ticket_id));
        }
        let now = Utc::now();
        let reopened = self.store.reopen_if_closed(ticket_id, now).await?;
        let Some(ticket) = reopened else {
            return Err(match self.store.get(ticket_id).await? {
                None => TicketError::NotFound(ticket_id),
                Some(t) => TicketError::invalid_state(ticket_id, t.status, "reopen"),
            });
        };
        info!(ticket = %ticket.id, admin = %agent.id, "ticket reopened");
        self.notifier.emit(TicketEvent::TicketReopened { ticket: ticket.clone() });
        Ok(ticket)
    }

    /// Query interface: ticket plus its ordered replies.
    pub async fn get_with_replies(
        &self,
        ticket_id: Uuid,
    ) -> Result<(Ticket, Vec<Reply>), TicketError> {
        let ticket = self
            .store
            .get(ticket_id)
            .await?
            .ok_or(TicketError::NotFound(ticket_id))?;
        let replies = self.store.replies(ticket_id).await?;
        Ok((ticket, replies))
    }

    /// Query interface: ticket list, newest first.
    pub async fn list(&self, filter: TicketFilter) -> Result<Vec<Ticket>, TicketError> {
        Ok(self.store.list(filter).await?)
    }

    /// A guarded store operation matched no row. Re-read once to tell the
    /// caller which precondition actually failed.
    async fn classify_refusal(
        &self,
        ticket_id: Uuid,
        caller: Option<Uuid>,
        action: &'static str,
    ) -> Result<TicketError, TicketError> {
        let Some(ticket) = self.store.get(ticket_id).await? else {
            return Ok(TicketError::NotFound(ticket_id));
        };
        if let Some(agent_id) = caller {
            if ticket.assigned_to != Some(agent_id) {
                return Ok(TicketError::forbidden(agent_id, action, ticket_id));
            }
        }
        Ok(TicketError::invalid_state(ticket_id, ticket.status, action))
    }
}
