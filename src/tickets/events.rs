use serde::Serialize;
use tokio::sync::broadcast;

use crate::tickets::model::{Reply, Ticket};

/// Lifecycle change notifications. Each carries the full post-transition
/// ticket snapshot (and the reply, where one was appended). Fan-out and
/// delivery are the subscriber's concern; the engine only emits.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TicketEvent {
    NewTicket { ticket: Ticket },
    TicketAssigned { ticket: Ticket },
    TicketReply { ticket: Ticket, reply: Reply },
    TicketClosed { ticket: Ticket },
    TicketReopened { ticket: Ticket },
}

impl TicketEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TicketEvent::NewTicket { .. } => "new_ticket",
            TicketEvent::TicketAssigned { .. } => "ticket_assigned",
            TicketEvent::TicketReply { .. } => "ticket_reply",
            TicketEvent::TicketClosed { .. } => "ticket_closed",
            TicketEvent::TicketReopened { .. } => "ticket_reopened",
        }
    }

    pub fn ticket(&self) -> &Ticket {
        match self {
            TicketEvent::NewTicket { ticket }
            | TicketEvent::TicketAssigned { ticket }
            | TicketEvent::TicketReply { ticket, .. }
            | TicketEvent::TicketClosed { ticket }
            | TicketEvent::TicketReopened { ticket } => ticket,
        }
    }
}

/// Abstract emission seam. Emission happens synchronously after the store
/// commit inside each engine call, but concurrent calls can still interleave
/// between commit and emit. The ticket snapshot's `revision` is the
/// authoritative per-ticket order: subscribers that care about it sort by
/// `event.ticket().revision`. Ordering across tickets is not guaranteed.
pub trait EventNotifier: Send + Sync {
    fn emit(&self, event: TicketEvent);
}

/// Production notifier backed by a tokio broadcast channel. Dashboards and
/// other observers subscribe; a send with no live receivers is not an error.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<TicketEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TicketEvent> {
        self.tx.subscribe()
    }
}

impl EventNotifier for BroadcastNotifier {
    fn emit(&self, event: TicketEvent) {
        tracing::debug!(event = event.name(), ticket = %event.ticket().id, "emitting ticket event");
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::model::{Ticket, TicketOrigin, TicketPriority, TicketStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn ticket() -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::new_v4(),
            customer_name: "Ada".into(),
            channel_id: "+15550001111".into(),
            subject: "order status".into(),
            message: "where is my order?".into(),
            status: TicketStatus::Open,
            priority: TicketPriority::Medium,
            origin: TicketOrigin::Channel,
            assigned_to: None,
            assigned_at: None,
            closed_by: None,
            closed_at: None,
            resolution_note: None,
            last_reply_at: None,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn events_tag_with_wire_names() {
        let event = TicketEvent::NewTicket { ticket: ticket() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "new_ticket");
        assert_eq!(event.name(), "new_ticket");

        let event = TicketEvent::TicketClosed { ticket: ticket() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "ticket_closed");
    }

    #[test]
    fn broadcast_reaches_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();
        notifier.emit(TicketEvent::NewTicket { ticket: ticket() });
        let got = rx.try_recv().unwrap();
        assert_eq!(got.name(), "new_ticket");
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let notifier = BroadcastNotifier::new(8);
        notifier.emit(TicketEvent::NewTicket { ticket: ticket() });
    }
}
