use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::tickets::model::{
    NewReply, NewTicket, Reply, Ticket, TicketFilter, TicketOrigin, TicketPriority,
    TicketStatus,
};
use crate::tickets::store::{ReplyGuard, StoreError, TicketStore};

const TICKET_COLUMNS: &str = "id, customer_name, channel_id, subject, message, status, \
     priority, origin, assigned_to, assigned_at, closed_by, closed_at, resolution_note, \
     last_reply_at, revision, created_at, updated_at";

/// Postgres-backed ticket store. Every conditional transition is a single
/// guarded `UPDATE ... RETURNING`, so the guard and the mutation execute as
/// one atomic statement against the row.
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if absent. Idempotent; called at startup.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id UUID PRIMARY KEY,
                seq BIGSERIAL,
                customer_name TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                message TEXT NOT NULL,
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                origin TEXT NOT NULL,
                assigned_to UUID,
                assigned_at TIMESTAMPTZ,
                closed_by UUID,
                closed_at TIMESTAMPTZ,
                resolution_note TEXT,
                last_reply_at TIMESTAMPTZ,
                revision BIGINT NOT NULL DEFAULT 1,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS tickets_channel_idx \
             ON tickets (channel_id, created_at DESC, seq DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS replies (
                id UUID PRIMARY KEY,
                ticket_id UUID NOT NULL REFERENCES tickets(id),
                agent_id UUID,
                body TEXT NOT NULL,
                from_customer BOOLEAN NOT NULL,
                delivered BOOLEAN NOT NULL DEFAULT FALSE,
                seq BIGSERIAL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS replies_ticket_idx \
             ON replies (ticket_id, created_at, seq)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn ticket_from_row(row: &PgRow) -> Result<Ticket, StoreError> {
    let status: String = row.try_get("status")?;
    let priority: String = row.try_get("priority")?;
    let origin: String = row.try_get("origin")?;
    Ok(Ticket {
        id: row.try_get("id")?,
        customer_name: row.try_get("customer_name")?,
        channel_id: row.try_get("channel_id")?,
        subject: row.try_get("subject")?,
        message: row.try_get("message")?,
        status: TicketStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown ticket status '{}'", status)))?,
        priority: TicketPriority::parse(&priority)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown priority '{}'", priority)))?,
        origin: TicketOrigin::parse(&origin)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown origin '{}'", origin)))?,
        assigned_to: row.try_get("assigned_to")?,
        assigned_at: row.try_get("assigned_at")?,
        closed_by: row.try_get("closed_by")?,
        closed_at: row.try_get("closed_at")?,
        resolution_note: row.try_get("resolution_note")?,
        last_reply_at: row.try_get("last_reply_at")?,
        revision: row.try_get("revision")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn reply_from_row(row: &PgRow) -> Result<Reply, StoreError> {
    Ok(Reply {
        id: row.try_get("id")?,
        ticket_id: row.try_get("ticket_id")?,
        agent_id: row.try_get("agent_id")?,
        body: row.try_get("body")?,
        from_customer: row.try_get("from_customer")?,
        delivered: row.try_get("delivered")?,
        seq: row.try_get("seq")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn insert_ticket(
        &self,
        new: NewTicket,
        now: DateTime<Utc>,
    ) -> Result<Ticket, StoreError> {
        let sql = format!(
            "INSERT INTO tickets (id, customer_name, channel_id, subject, message, status, \
             priority, origin, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, 'open', $6, $7, $8, $8) \
             RETURNING {TICKET_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.customer_name)
            .bind(&new.channel_id)
            .bind(&new.subject)
            .bind(&new.message)
            .bind(new.priority.as_str())
            .bind(new.origin.as_str())
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        ticket_from_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    async fn replies(&self, ticket_id: Uuid) -> Result<Vec<Reply>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, ticket_id, agent_id, body, from_customer, delivered, seq, created_at \
             FROM replies WHERE ticket_id = $1 ORDER BY created_at ASC, seq ASC",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(reply_from_row).collect()
    }

    async fn list(&self, filter: TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        let where_clause = match filter {
            TicketFilter::All => "",
            TicketFilter::Open => "WHERE status <> 'closed'",
            TicketFilter::AssignedTo(_) => "WHERE assigned_to = $1",
        };
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets {where_clause} \
             ORDER BY created_at DESC, seq DESC"
        );
        let mut query = sqlx::query(&sql);
        if let TicketFilter::AssignedTo(agent) = filter {
            query = query.bind(agent);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(ticket_from_row).collect()
    }

    async fn latest_open_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<Ticket>, StoreError> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets \
             WHERE channel_id = $1 AND status IN ('open', 'assigned', 'in_progress') \
             ORDER BY created_at DESC, seq DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(channel_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    async fn claim_if_unassigned(
        &self,
        id: Uuid,
        agent_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        // The WHERE predicate is the compare half of the compare-and-swap:
        // two racing claims can never both match the unassigned row.
        let sql = format!(
            "UPDATE tickets SET assigned_to = $2, assigned_at = $3, status = 'assigned', \
             revision = revision + 1, updated_at = GREATEST(updated_at, $3) \
             WHERE id = $1 AND assigned_to IS NULL \
             RETURNING {TICKET_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(agent_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    async fn append_reply(
        &self,
        ticket_id: Uuid,
        reply: NewReply,
        guard: ReplyGuard,
        now: DateTime<Utc>,
    ) -> Result<Option<(Ticket, Reply)>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let update = match guard {
            ReplyGuard::Assignee(_) => format!(
                "UPDATE tickets SET status = 'in_progress', \
                 last_reply_at = GREATEST(COALESCE(last_reply_at, $2), $2), \
                 revision = revision + 1, updated_at = GREATEST(updated_at, $2) \
                 WHERE id = $1 AND assigned_to = $3 AND status <> 'closed' \
                 RETURNING {TICKET_COLUMNS}"
            ),
            ReplyGuard::OpenFamily => format!(
                "UPDATE tickets SET status = 'in_progress', \
                 last_reply_at = GREATEST(COALESCE(last_reply_at, $2), $2), \
                 revision = revision + 1, updated_at = GREATEST(updated_at, $2) \
                 WHERE id = $1 AND status IN ('open', 'assigned', 'in_progress') \
                 RETURNING {TICKET_COLUMNS}"
            ),
        };

        let mut query = sqlx::query(&update).bind(ticket_id).bind(now);
        if let ReplyGuard::Assignee(agent_id) = guard {
            query = query.bind(agent_id);
        }
        let Some(row) = query.fetch_optional(&mut *tx).await? else {
            return Ok(None);
        };
        let ticket = ticket_from_row(&row)?;

        // The clamped last_reply_at doubles as the reply's created_at, so
        // replies within a ticket stay monotonically non-decreasing.
        let effective = ticket
            .last_reply_at
            .ok_or_else(|| StoreError::Corrupt("last_reply_at missing after append".into()))?;

        let row = sqlx::query(
            "INSERT INTO replies (id, ticket_id, agent_id, body, from_customer, delivered, created_at) \
             VALUES ($1, $2, $3, $4, $5, FALSE, $6) \
             RETURNING id, ticket_id, agent_id, body, from_customer, delivered, seq, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(ticket_id)
        .bind(reply.agent_id)
        .bind(&reply.body)
        .bind(reply.from_customer)
        .bind(effective)
        .fetch_one(&mut *tx)
        .await?;
        let reply = reply_from_row(&row)?;

        tx.commit().await?;
        Ok(Some((ticket, reply)))
    }

    async fn close_if_open(
        &self,
        id: Uuid,
        agent_id: Uuid,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        let sql = format!(
            "UPDATE tickets SET status = 'closed', closed_by = $2, closed_at = $3, \
             resolution_note = $4, revision = revision + 1, \
             updated_at = GREATEST(updated_at, $3) \
             WHERE id = $1 AND assigned_to = $2 AND status <> 'closed' \
             RETURNING {TICKET_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(agent_id)
            .bind(now)
            .bind(note)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    async fn reopen_if_closed(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, StoreError> {
        let sql = format!(
            "UPDATE tickets SET status = 'assigned', closed_by = NULL, closed_at = NULL, \
             resolution_note = NULL, revision = revision + 1, \
             updated_at = GREATEST(updated_at, $2) \
             WHERE id = $1 AND status = 'closed' \
             RETURNING {TICKET_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    async fn mark_reply_delivered(&self, reply_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE replies SET delivered = TRUE WHERE id = $1")
            .bind(reply_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
