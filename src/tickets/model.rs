use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ticket lifecycle states. `Open` is initial; `Closed` is terminal except
/// for the privileged reopen transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Assigned,
    InProgress,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Assigned => "assigned",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(TicketStatus::Open),
            "assigned" => Some(TicketStatus::Assigned),
            "in_progress" => Some(TicketStatus::InProgress),
            "closed" => Some(TicketStatus::Closed),
            _ => None,
        }
    }

    /// States an inbound customer message may attach to. A closed ticket
    /// never matches; a new message after closure starts a new thread.
    pub fn is_open_family(&self) -> bool {
        matches!(
            self,
            TicketStatus::Open | TicketStatus::Assigned | TicketStatus::InProgress
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Medium => "medium",
            TicketPriority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(TicketPriority::Low),
            "medium" => Some(TicketPriority::Medium),
            "high" => Some(TicketPriority::High),
            _ => None,
        }
    }
}

impl Default for TicketPriority {
    fn default() -> Self {
        TicketPriority::Medium
    }
}

/// Whether the ticket was opened by an inbound channel message or created
/// manually from the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketOrigin {
    Channel,
    Manual,
}

impl TicketOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketOrigin::Channel => "channel",
            TicketOrigin::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "channel" => Some(TicketOrigin::Channel),
            "manual" => Some(TicketOrigin::Manual),
            _ => None,
        }
    }
}

/// One customer issue thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub customer_name: String,
    /// Customer messaging address (phone number). Stable for the ticket's
    /// lifetime; inbound messages correlate on it.
    pub channel_id: String,
    pub subject: String,
    pub message: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub origin: TicketOrigin,
    pub assigned_to: Option<Uuid>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub closed_by: Option<Uuid>,
    pub closed_at: Option<DateTime<Utc>>,
    pub resolution_note: Option<String>,
    pub last_reply_at: Option<DateTime<Utc>>,
    /// Per-ticket commit counter, bumped by the store inside every committed
    /// transition. Event snapshots carry it, so subscribers can order events
    /// for a ticket by the commit that produced them even when emissions
    /// interleave.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One message on a ticket's thread, in either direction. Exactly one of
/// `agent_id` present / `from_customer` true holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub body: String,
    pub from_customer: bool,
    pub delivered: bool,
    /// Insertion sequence, assigned by the store. Breaks ordering ties
    /// between replies with equal `created_at`.
    pub seq: i64,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to open a new ticket.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub customer_name: String,
    pub channel_id: String,
    pub subject: String,
    pub message: String,
    pub priority: TicketPriority,
    pub origin: TicketOrigin,
}

/// Fields needed to append a reply. `delivered` starts false; the engine
/// flips it after a successful gateway send.
#[derive(Debug, Clone)]
pub struct NewReply {
    pub agent_id: Option<Uuid>,
    pub body: String,
    pub from_customer: bool,
}

impl NewReply {
    pub fn from_agent(agent_id: Uuid, body: impl Into<String>) -> Self {
        Self { agent_id: Some(agent_id), body: body.into(), from_customer: false }
    }

    pub fn from_customer(body: impl Into<String>) -> Self {
        Self { agent_id: None, body: body.into(), from_customer: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Agent,
    Admin,
}

impl AgentRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "agent" => Some(AgentRole::Agent),
            "admin" => Some(AgentRole::Admin),
            _ => None,
        }
    }
}

/// Identity established by the upstream auth layer. The core never verifies
/// credentials; it only reads the id and role.
#[derive(Debug, Clone, Copy)]
pub struct AgentContext {
    pub id: Uuid,
    pub role: AgentRole,
}

impl AgentContext {
    pub fn agent(id: Uuid) -> Self {
        Self { id, role: AgentRole::Agent }
    }

    pub fn admin(id: Uuid) -> Self {
        Self { id, role: AgentRole::Admin }
    }

    pub fn is_admin(&self) -> bool {
        self.role == AgentRole::Admin
    }
}

/// List filters consumed by the ticket list views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketFilter {
    All,
    Open,
    AssignedTo(Uuid),
}
