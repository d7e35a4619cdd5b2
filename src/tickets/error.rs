use thiserror::Error;
use uuid::Uuid;

use crate::tickets::model::TicketStatus;
use crate::tickets::store::StoreError;

/// Errors from the ticket lifecycle core.
///
/// `StoreUnavailable` is the only transient variant: during inbound-message
/// resolution it propagates to the webhook caller unacknowledged so the
/// upstream channel redelivers. Everything else is terminal for the call.
#[derive(Debug, Error)]
pub enum TicketError {
    #[error("ticket not found: {0}")]
    NotFound(Uuid),

    #[error("agent {agent} may not {action} ticket {ticket}")]
    Forbidden {
        agent: Uuid,
        action: &'static str,
        ticket: Uuid,
    },

    #[error("ticket {ticket} is {status:?}; {action} is not legal from that state")]
    InvalidState {
        ticket: Uuid,
        status: TicketStatus,
        action: &'static str,
    },

    #[error("ticket {0} is already assigned")]
    AlreadyAssigned(Uuid),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("ticket store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl TicketError {
    pub fn forbidden(agent: Uuid, action: &'static str, ticket: Uuid) -> Self {
        TicketError::Forbidden { agent, action, ticket }
    }

    pub fn invalid_state(ticket: Uuid, status: TicketStatus, action: &'static str) -> Self {
        TicketError::InvalidState { ticket, status, action }
    }

    /// True when the caller should retry delivery (webhook redelivery path).
    pub fn is_transient(&self) -> bool {
        matches!(self, TicketError::StoreUnavailable(_))
    }
}
