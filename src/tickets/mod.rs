//! Ticket lifecycle core: data model, store seam, correlation of inbound
//! messages, claim arbitration, and the lifecycle state machine.

pub mod assignment;
pub mod correlation;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod memory_store;
pub mod model;
pub mod outbound;
pub mod pg_store;
pub mod store;

pub use assignment::AssignmentArbiter;
pub use correlation::{CorrelationResolver, InboundMessage, InboundOutcome};
pub use error::TicketError;
pub use events::{BroadcastNotifier, EventNotifier, TicketEvent};
pub use lifecycle::{LifecycleEngine, ReplyOutcome};
pub use memory_store::MemoryTicketStore;
pub use model::{
    AgentContext, AgentRole, NewReply, NewTicket, Reply, Ticket, TicketFilter,
    TicketOrigin, TicketPriority, TicketStatus,
};
pub use outbound::{DeliveryError, NoopGateway, OutboundGateway, WhatsAppCloudGateway};
pub use pg_store::PgTicketStore;
pub use store::{ReplyGuard, StoreError, TicketStore};
