use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::tickets::error::TicketError;
use crate::tickets::events::{EventNotifier, TicketEvent};
use crate::tickets::model::{AgentContext, Ticket};
use crate::tickets::store::TicketStore;

/// Arbitrates concurrent claims: at most one agent owns a ticket. The whole
/// decision rides on the store's compare-and-swap; there is no read-then-write
/// window for two agents to slip through.
pub struct AssignmentArbiter {
    store: Arc<dyn TicketStore>,
    notifier: Arc<dyn EventNotifier>,
}

impl AssignmentArbiter {
    pub fn new(store: Arc<dyn TicketStore>, notifier: Arc<dyn EventNotifier>) -> Self {
        Self { store, notifier }
    }

    /// `claim` transition. Exactly one of any set of concurrent calls for
    /// the same ticket succeeds; the rest get `AlreadyAssigned`.
    pub async fn claim(
        &self,
        ticket_id: Uuid,
        agent: &AgentContext,
    ) -> Result<Ticket, TicketError> {
        let now = Utc::now();
        match self.store.claim_if_unassigned(ticket_id, agent.id, now).await? {
            Some(ticket) => {
                info!(ticket = %ticket.id, agent = %agent.id, "ticket claimed");
                self.notifier
                    .emit(TicketEvent::TicketAssigned { ticket: ticket.clone() });
                Ok(ticket)
            }
            // Zero rows matched: either someone else holds it or it does not
            // exist. A re-read tells the two apart.
            None => match self.store.get(ticket_id).await? {
                Some(_) => Err(TicketError::AlreadyAssigned(ticket_id)),
                None => Err(TicketError::NotFound(ticket_id)),
            },
        }
    }
}
