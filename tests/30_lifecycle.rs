mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use waticket_api::tickets::{
    AgentContext, BroadcastNotifier, EventNotifier, LifecycleEngine, MemoryTicketStore,
    NewReply, NewTicket, NoopGateway, OutboundGateway, Reply, ReplyGuard, StoreError,
    Ticket, TicketError, TicketFilter, TicketOrigin, TicketPriority, TicketStatus,
    TicketStore,
};

/// Reply authorization: only the assignee may reply, and a refused attempt
/// changes nothing.
#[tokio::test]
async fn non_assignee_reply_is_forbidden_and_mutates_nothing() -> Result<()> {
    let h = common::Harness::new();
    let assignee = AgentContext::agent(Uuid::new_v4());
    let interloper = AgentContext::agent(Uuid::new_v4());

    let ticket_id = h.inbound("+15550001111", "help").await.ticket().id;
    h.arbiter.claim(ticket_id, &assignee).await?;

    let before = h.engine.get_with_replies(ticket_id).await?;
    let err = h
        .engine
        .reply(ticket_id, &interloper, "I got this".into())
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::Forbidden { .. }));

    let after = h.engine.get_with_replies(ticket_id).await?;
    assert_eq!(after.0.status, before.0.status);
    assert_eq!(after.0.updated_at, before.0.updated_at);
    assert_eq!(after.1.len(), before.1.len());
    Ok(())
}

#[tokio::test]
async fn assignee_reply_moves_ticket_in_progress() -> Result<()> {
    let h = common::Harness::new();
    let agent = AgentContext::agent(Uuid::new_v4());

    let ticket_id = h.inbound("+15550001111", "help").await.ticket().id;
    h.arbiter.claim(ticket_id, &agent).await?;

    let outcome = h.engine.reply(ticket_id, &agent, "on it".into()).await?;
    assert_eq!(outcome.ticket.status, TicketStatus::InProgress);
    assert_eq!(outcome.reply.agent_id, Some(agent.id));
    assert!(!outcome.reply.from_customer);
    assert!(outcome.ticket.last_reply_at.is_some());
    Ok(())
}

#[tokio::test]
async fn reply_on_closed_ticket_is_invalid_state() -> Result<()> {
    let h = common::Harness::new();
    let agent = AgentContext::agent(Uuid::new_v4());

    let ticket_id = h.inbound("+15550001111", "help").await.ticket().id;
    h.arbiter.claim(ticket_id, &agent).await?;
    h.engine.close(ticket_id, &agent, None).await?;

    let err = h
        .engine
        .reply(ticket_id, &agent, "too late".into())
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::InvalidState { .. }));
    Ok(())
}

#[tokio::test]
async fn close_by_non_assignee_is_forbidden() -> Result<()> {
    let h = common::Harness::new();
    let assignee = AgentContext::agent(Uuid::new_v4());
    let interloper = AgentContext::agent(Uuid::new_v4());

    let ticket_id = h.inbound("+15550001111", "help").await.ticket().id;
    h.arbiter.claim(ticket_id, &assignee).await?;

    let err = h
        .engine
        .close(ticket_id, &interloper, None)
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::Forbidden { .. }));

    let (ticket, _) = h.engine.get_with_replies(ticket_id).await?;
    assert_eq!(ticket.status, TicketStatus::Assigned);
    Ok(())
}

/// Close/reopen round-trip: reopen restores `assigned` with the original
/// assignee and clears the closing fields.
#[tokio::test]
async fn close_then_reopen_restores_assignment() -> Result<()> {
    let h = common::Harness::new();
    let agent = AgentContext::agent(Uuid::new_v4());
    let admin = AgentContext::admin(Uuid::new_v4());

    let ticket_id = h.inbound("+15550001111", "help").await.ticket().id;
    h.arbiter.claim(ticket_id, &agent).await?;

    let closed = h
        .engine
        .close(ticket_id, &agent, Some("duplicate of other ticket".into()))
        .await?;
    assert_eq!(closed.status, TicketStatus::Closed);
    assert_eq!(closed.closed_by, Some(agent.id));
    assert!(closed.closed_at.is_some());
    assert_eq!(closed.resolution_note.as_deref(), Some("duplicate of other ticket"));

    let reopened = h.engine.reopen(ticket_id, &admin).await?;
    assert_eq!(reopened.status, TicketStatus::Assigned);
    assert_eq!(reopened.assigned_to, Some(agent.id));
    assert!(reopened.closed_at.is_none());
    assert!(reopened.closed_by.is_none());
    assert!(reopened.resolution_note.is_none());
    Ok(())
}

#[tokio::test]
async fn reopen_requires_admin() -> Result<()> {
    let h = common::Harness::new();
    let agent = AgentContext::agent(Uuid::new_v4());

    let ticket_id = h.inbound("+15550001111", "help").await.ticket().id;
    h.arbiter.claim(ticket_id, &agent).await?;
    h.engine.close(ticket_id, &agent, None).await?;

    let err = h.engine.reopen(ticket_id, &agent).await.unwrap_err();
    assert!(matches!(err, TicketError::Forbidden { .. }));

    let (ticket, _) = h.engine.get_with_replies(ticket_id).await?;
    assert_eq!(ticket.status, TicketStatus::Closed);
    Ok(())
}

#[tokio::test]
async fn reopen_of_open_ticket_is_invalid_state() -> Result<()> {
    let h = common::Harness::new();
    let admin = AgentContext::admin(Uuid::new_v4());

    let ticket_id = h.inbound("+15550001111", "help").await.ticket().id;
    let err = h.engine.reopen(ticket_id, &admin).await.unwrap_err();
    assert!(matches!(err, TicketError::InvalidState { .. }));
    Ok(())
}

/// Events for one ticket arrive in the order its transitions committed.
#[tokio::test]
async fn events_follow_commit_order_per_ticket() -> Result<()> {
    let h = common::Harness::new();
    let agent = AgentContext::agent(Uuid::new_v4());
    let admin = AgentContext::admin(Uuid::new_v4());
    let mut rx = h.subscribe();

    let ticket_id = h.inbound("+15550001111", "help").await.ticket().id;
    h.arbiter.claim(ticket_id, &agent).await?;
    h.engine.reply(ticket_id, &agent, "looking".into()).await?;
    h.inbound("+15550001111", "thanks").await;
    h.engine.close(ticket_id, &agent, None).await?;
    h.engine.reopen(ticket_id, &admin).await?;

    let names: Vec<&str> = common::drain_events(&mut rx)
        .iter()
        .map(|e| e.name())
        .collect();
    assert_eq!(
        names,
        vec![
            "new_ticket",
            "ticket_assigned",
            "ticket_reply",
            "ticket_reply",
            "ticket_closed",
            "ticket_reopened",
        ]
    );
    Ok(())
}

/// Store wrapper that commits a reply and then stalls before returning, so a
/// later transition on the same ticket can return (and emit) first.
struct StalledReplyStore {
    inner: Arc<MemoryTicketStore>,
    delay: Duration,
}

#[async_trait]
impl TicketStore for StalledReplyStore {
    async fn insert_ticket(
        &self,
        new: NewTicket,
        now: DateTime<Utc>,
    ) -> Result<Ticket, StoreError> {
        self.inner.insert_ticket(new, now).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        self.inner.get(id).await
    }

    async fn replies(&self, ticket_id: Uuid) -> Result<Vec<Reply>, StoreError> {
        self.inner.replies(ticket_id).await
    }

    async fn list(&self, filter: TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        self.inner.list(filter).await
    }

    async fn latest_open_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<Ticket>, StoreError> {
        self.inner.latest_open_for_channel(channel_id).await
    }

    async fn claim_if_unassigned(
        &self,
        id: Uuid,
        agent_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        self.inner.claim_if_unassigned(id, agent_id, now).await
    }

    async fn append_reply(
        &self,
        ticket_id: Uuid,
        reply: NewReply,
        guard: ReplyGuard,
        now: DateTime<Utc>,
    ) -> Result<Option<(Ticket, Reply)>, StoreError> {
        let committed = self.inner.append_reply(ticket_id, reply, guard, now).await;
        tokio::time::sleep(self.delay).await;
        committed
    }

    async fn close_if_open(
        &self,
        id: Uuid,
        agent_id: Uuid,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        self.inner.close_if_open(id, agent_id, note, now).await
    }

    async fn reopen_if_closed(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        self.inner.reopen_if_closed(id, now).await
    }

    async fn mark_reply_delivered(&self, reply_id: Uuid) -> Result<bool, StoreError> {
        self.inner.mark_reply_delivered(reply_id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// Two transitions race on one ticket: the reply commits first but its call
/// stalls before returning, so the close returns and emits first. Revisions
/// on the event snapshots still recover the commit order.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn event_revisions_recover_commit_order_under_interleaving() -> Result<()> {
    let store: Arc<dyn TicketStore> = Arc::new(StalledReplyStore {
        inner: Arc::new(MemoryTicketStore::new()),
        delay: Duration::from_millis(200),
    });
    let notifier = Arc::new(BroadcastNotifier::new(16));
    let notifier_dyn: Arc<dyn EventNotifier> = notifier.clone();
    let gateway: Arc<dyn OutboundGateway> = Arc::new(NoopGateway);
    let engine = Arc::new(LifecycleEngine::new(store.clone(), notifier_dyn, gateway));
    let mut rx = notifier.subscribe();

    let agent = AgentContext::agent(Uuid::new_v4());
    let ticket = engine
        .create(
            NewTicket {
                customer_name: "Ada".into(),
                channel_id: "+15550001111".into(),
                subject: "help".into(),
                message: "help".into(),
                priority: TicketPriority::Medium,
                origin: TicketOrigin::Channel,
            },
            Utc::now(),
        )
        .await?;
    store
        .claim_if_unassigned(ticket.id, agent.id, Utc::now())
        .await?;

    let replying = tokio::spawn({
        let engine = engine.clone();
        async move { engine.reply(ticket.id, &agent, "on it".into()).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let closed = engine.close(ticket.id, &agent, None).await?;
    let replied = replying.await??;

    // The close committed strictly after the reply.
    assert!(closed.revision > replied.ticket.revision);

    // Whatever order the events arrived in, their revisions put them back
    // into commit order.
    let mut stamped: Vec<(i64, &'static str)> = common::drain_events(&mut rx)
        .iter()
        .map(|e| (e.ticket().revision, e.name()))
        .collect();
    stamped.sort_by_key(|(revision, _)| *revision);
    let names: Vec<&str> = stamped.iter().map(|(_, name)| *name).collect();
    assert_eq!(names, vec!["new_ticket", "ticket_reply", "ticket_closed"]);
    Ok(())
}
