use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::tickets::model::{
    NewReply, NewTicket, Reply, Ticket, TicketFilter, TicketStatus,
};
use crate::tickets::store::{ReplyGuard, StoreError, TicketStore};

#[derive(Default)]
struct Inner {
    /// Insertion order preserved; doubles as the created_at tie-break.
    tickets: Vec<Ticket>,
    replies: Vec<Reply>,
    next_seq: i64,
}

/// In-memory ticket store. Every trait method is a single critical section
/// under one mutex, which makes each operation atomic and per-ticket
/// linearizable. Backs the test suite and credential-less local runs.
#[derive(Default)]
pub struct MemoryTicketStore {
    inner: Mutex<Inner>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn ticket_mut(&mut self, id: Uuid) -> Option<&mut Ticket> {
        self.tickets.iter_mut().find(|t| t.id == id)
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn insert_ticket(
        &self,
        new: NewTicket,
        now: DateTime<Utc>,
    ) -> Result<Ticket, StoreError> {
        let mut inner = self.inner.lock().await;
        let ticket = Ticket {
            id: Uuid::new_v4(),
            customer_name: new.customer_name,
            channel_id: new.channel_id,
            subject: new.subject,
            message: new.message,
            status: TicketStatus::Open,
            priority: new.priority,
            origin: new.origin,
            assigned_to: None,
            assigned_at: None,
            closed_by: None,
            closed_at: None,
            resolution_note: None,
            last_reply_at: None,
            revision: 1,
            created_at: now,
            updated_at: now,
        };
        inner.tickets.push(ticket.clone());
        Ok(ticket)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.tickets.iter().find(|t| t.id == id).cloned())
    }

    async fn replies(&self, ticket_id: Uuid) -> Result<Vec<Reply>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<Reply> = inner
            .replies
            .iter()
            .filter(|r| r.ticket_id == ticket_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.created_at, r.seq));
        Ok(rows)
    }

    async fn list(&self, filter: TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<Ticket> = inner
            .tickets
            .iter()
            .filter(|t| match filter {
                TicketFilter::All => true,
                TicketFilter::Open => t.status.is_open_family(),
                TicketFilter::AssignedTo(agent) => t.assigned_to == Some(agent),
            })
            .cloned()
            .collect();
        // Newest first; insertion order breaks created_at ties.
        rows.reverse();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn latest_open_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<Ticket>, StoreError> {
        let inner = self.inner.lock().await;
        let mut latest: Option<&Ticket> = None;
        for t in &inner.tickets {
            if t.channel_id == channel_id && t.status.is_open_family() {
                match latest {
                    Some(cur) if cur.created_at > t.created_at => {}
                    // Later insertion wins on equal created_at.
                    _ => latest = Some(t),
                }
            }
        }
        Ok(latest.cloned())
    }

    async fn claim_if_unassigned(
        &self,
        id: Uuid,
        agent_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(ticket) = inner.ticket_mut(id) else {
            return Ok(None);
        };
        if ticket.assigned_to.is_some() {
            return Ok(None);
        }
        ticket.assigned_to = Some(agent_id);
        ticket.assigned_at = Some(now);
        ticket.status = TicketStatus::Assigned;
        ticket.revision += 1;
        ticket.updated_at = ticket.updated_at.max(now);
        Ok(Some(ticket.clone()))
    }

    async fn append_reply(
        &self,
        ticket_id: Uuid,
        reply: NewReply,
        guard: ReplyGuard,
        now: DateTime<Utc>,
    ) -> Result<Option<(Ticket, Reply)>, StoreError> {
        let mut inner = self.inner.lock().await;
        let seq = inner.next_seq + 1;
        let Some(ticket) = inner.ticket_mut(ticket_id) else {
            return Ok(None);
        };
        let guard_holds = match guard {
            ReplyGuard::Assignee(agent_id) => {
                ticket.assigned_to == Some(agent_id) && ticket.status != TicketStatus::Closed
            }
            ReplyGuard::OpenFamily => ticket.status.is_open_family(),
        };
        if !guard_holds {
            return Ok(None);
        }

        // Clamp so reply timestamps never regress within the ticket.
        let effective = match ticket.last_reply_at {
            Some(last) => now.max(last),
            None => now,
        };
        ticket.status = TicketStatus::InProgress;
        ticket.last_reply_at = Some(effective);
        ticket.revision += 1;
        ticket.updated_at = ticket.updated_at.max(now);
        let snapshot = ticket.clone();

        let row = Reply {
            id: Uuid::new_v4(),
            ticket_id,
            agent_id: reply.agent_id,
            body: reply.body,
            from_customer: reply.from_customer,
            delivered: false,
            seq,
            created_at: effective,
        };
        inner.next_seq = seq;
        inner.replies.push(row.clone());
        Ok(Some((snapshot, row)))
    }

    async fn close_if_open(
        &self,
        id: Uuid,
        agent_id: Uuid,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(ticket) = inner.ticket_mut(id) else {
            return Ok(None);
        };
        if ticket.assigned_to != Some(agent_id) || ticket.status == TicketStatus::Closed {
            return Ok(None);
        }
        ticket.status = TicketStatus::Closed;
        ticket.closed_by = Some(agent_id);
        ticket.closed_at = Some(now);
        ticket.resolution_note = note;
        ticket.revision += 1;
        ticket.updated_at = ticket.updated_at.max(now);
        Ok(Some(ticket.clone()))
    }

    async fn reopen_if_closed(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(ticket) = inner.ticket_mut(id) else {
            return Ok(None);
        };
        if ticket.status != TicketStatus::Closed {
            return Ok(None);
        }
        ticket.status = TicketStatus::Assigned;
        ticket.closed_by = None;
        ticket.closed_at = None;
        ticket.resolution_note = None;
        ticket.revision += 1;
        ticket.updated_at = ticket.updated_at.max(now);
        Ok(Some(ticket.clone()))
    }

    async fn mark_reply_delivered(&self, reply_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.replies.iter_mut().find(|r| r.id == reply_id) {
            Some(reply) => {
                reply.delivered = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
