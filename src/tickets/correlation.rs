use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::tickets::error::TicketError;
use crate::tickets::lifecycle::LifecycleEngine;
use crate::tickets::model::{NewTicket, Reply, Ticket, TicketOrigin, TicketPriority};
use crate::tickets::store::TicketStore;

/// Subject lines derive from the opening message, truncated on a char
/// boundary.
const SUBJECT_MAX_CHARS: usize = 80;

/// Inbound message event as handed over by the webhook collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub channel_id: String,
    pub text: String,
    pub sender_name: String,
    /// May be in the past for replayed deliveries.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Accepted and logged, not stored: deliveries are at-least-once and
    /// duplicates are an accepted tradeoff.
    pub external_message_id: Option<String>,
}

/// How an inbound message was resolved.
#[derive(Debug)]
pub enum InboundOutcome {
    MatchedExisting { ticket: Ticket, reply: Reply },
    CreatedNew { ticket: Ticket },
}

impl InboundOutcome {
    pub fn ticket(&self) -> &Ticket {
        match self {
            InboundOutcome::MatchedExisting { ticket, .. } => ticket,
            InboundOutcome::CreatedNew { ticket } => ticket,
        }
    }
}

/// Maps an inbound customer message to a ticket: the most recently created
/// open-family ticket for the channel wins; otherwise a new ticket opens.
/// Safe to re-invoke with the same message content (upstream retries are
/// at-least-once; a duplicate shows up as a duplicate reply, never as a
/// half-applied mutation).
pub struct CorrelationResolver {
    store: Arc<dyn TicketStore>,
    engine: Arc<LifecycleEngine>,
}

impl CorrelationResolver {
    pub fn new(store: Arc<dyn TicketStore>, engine: Arc<LifecycleEngine>) -> Self {
        Self { store, engine }
    }

    pub async fn resolve_inbound(
        &self,
        msg: InboundMessage,
    ) -> Result<InboundOutcome, TicketError> {
        if msg.channel_id.trim().is_empty() {
            return Err(TicketError::Validation("channel_id must not be empty".into()));
        }
        if msg.text.trim().is_empty() {
            return Err(TicketError::Validation("message text must not be empty".into()));
        }

        let occurred_at = msg.occurred_at.unwrap_or_else(Utc::now);
        if let Some(ref external_id) = msg.external_message_id {
            info!(%external_id, channel = %msg.channel_id, "inbound message");
        }

        if let Some(existing) = self.store.latest_open_for_channel(&msg.channel_id).await? {
            match self
                .engine
                .append_customer_reply(existing.id, msg.text.clone(), occurred_at)
                .await
            {
                Ok((ticket, reply)) => {
                    return Ok(InboundOutcome::MatchedExisting { ticket, reply });
                }
                // The ticket closed between lookup and append. The append
                // mutated nothing, so falling through to create still makes
                // exactly one mutation for this message.
                Err(TicketError::InvalidState { .. }) | Err(TicketError::NotFound(_)) => {}
                Err(other) => return Err(other),
            }
        }

        let ticket = self
            .engine
            .create(
                NewTicket {
                    customer_name: msg.sender_name,
                    channel_id: msg.channel_id,
                    subject: derive_subject(&msg.text),
                    message: msg.text,
                    priority: TicketPriority::Medium,
                    origin: TicketOrigin::Channel,
                },
                occurred_at,
            )
            .await?;
        Ok(InboundOutcome::CreatedNew { ticket })
    }
}

pub(crate) fn derive_subject(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let mut subject: String = first_line.chars().take(SUBJECT_MAX_CHARS).collect();
    if first_line.chars().count() > SUBJECT_MAX_CHARS {
        subject.push('…');
    }
    subject
}
