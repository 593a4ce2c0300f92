//! Postgres-backed stock store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation on `move_no`) | `23505` | `DuplicateMoveNo` |
//! | Database (other unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / Io / other | N/A | `Backend` |
//!
//! ## Locking
//!
//! `commit` runs in one transaction: the move row is updated with
//! `WHERE id = $1 AND version = $2` (zero rows means the CAS was lost), then
//! each touched balance row is locked `FOR UPDATE` in key order, so two
//! postings over overlapping keys cannot deadlock.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use stockflow_core::{AggregateRoot, ExpectedVersion, StockMoveId, UserId};
use stockflow_inventory::{
    BalanceDelta, BalanceKey, StockMove, StockMoveEvent, net_deltas, resulting_balance,
};

use super::{StockStore, StoreError, StoredMoveEvent};

/// Schema applied by [`PostgresStockStore::ensure_schema`].
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS stock_moves (
    id              UUID PRIMARY KEY,
    move_no         TEXT NOT NULL,
    move_type       TEXT NOT NULL,
    move_date       DATE NOT NULL,
    warehouse_from  UUID NULL,
    warehouse_to    UUID NULL,
    reference_type  TEXT NULL,
    reference_id    UUID NULL,
    status          TEXT NOT NULL,
    note            TEXT NULL,
    reject_reason   TEXT NULL,
    creator_id      UUID NOT NULL,
    approver_id     UUID NULL,
    submitted_at    TIMESTAMPTZ NULL,
    approved_at     TIMESTAMPTZ NULL,
    version         BIGINT NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT stock_moves_move_no_key UNIQUE (move_no)
);

CREATE TABLE IF NOT EXISTS stock_move_lines (
    id          UUID PRIMARY KEY,
    move_id     UUID NOT NULL REFERENCES stock_moves(id) ON DELETE CASCADE,
    line_no     INTEGER NOT NULL,
    product_id  UUID NOT NULL,
    quantity    NUMERIC NOT NULL,
    uom         TEXT NOT NULL,
    UNIQUE (move_id, line_no)
);

CREATE TABLE IF NOT EXISTS stock_balances (
    warehouse_id  UUID NOT NULL,
    product_id    UUID NOT NULL,
    quantity      NUMERIC NOT NULL DEFAULT 0,
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (warehouse_id, product_id)
);

CREATE TABLE IF NOT EXISTS stock_move_history (
    event_id         UUID PRIMARY KEY,
    move_id          UUID NOT NULL REFERENCES stock_moves(id) ON DELETE CASCADE,
    sequence_number  BIGINT NOT NULL,
    event_type       TEXT NOT NULL,
    actor_id         UUID NULL,
    occurred_at      TIMESTAMPTZ NOT NULL,
    payload          JSONB NOT NULL,
    UNIQUE (move_id, sequence_number)
);
"#;

const MOVE_NO_CONSTRAINT: &str = "stock_moves_move_no_key";

/// Postgres-backed stock store.
///
/// `Send + Sync`; all access goes through the SQLx pool.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create tables if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    #[instrument(
        skip(self, stock_move, events),
        fields(move_id = %stock_move.id_typed(), move_no = %stock_move.move_no()),
        err
    )]
    async fn insert_move(
        &self,
        stock_move: &StockMove,
        events: &[StockMoveEvent],
    ) -> Result<Vec<StoredMoveEvent>, StoreError> {
        let mut tx = self.begin().await?;

        let warehouses = stock_move.warehouses();
        sqlx::query(
            r#"
            INSERT INTO stock_moves (
                id, move_no, move_type, move_date, warehouse_from, warehouse_to,
                reference_type, reference_id, status, note, creator_id, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(stock_move.id_typed().as_uuid())
        .bind(stock_move.move_no().as_str())
        .bind(stock_move.move_type().as_str())
        .bind(stock_move.move_date())
        .bind(warehouses.from.map(uuid::Uuid::from))
        .bind(warehouses.to.map(uuid::Uuid::from))
        .bind(stock_move.reference_type().map(|r| r.as_str()))
        .bind(stock_move.reference_id())
        .bind(stock_move.status().as_str())
        .bind(stock_move.note())
        .bind(stock_move.creator_id().as_uuid())
        .bind(stock_move.version() as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation_on(&e, MOVE_NO_CONSTRAINT) {
                StoreError::DuplicateMoveNo(stock_move.move_no().to_string())
            } else {
                map_sqlx_error("insert_move", e)
            }
        })?;

        write_lines(&mut tx, stock_move).await?;
        let stored = StoredMoveEvent::stamp(stock_move.id_typed(), 0, events);
        write_history(&mut tx, &stored).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(stored)
    }

    #[instrument(skip(self), fields(move_id = %move_id), err)]
    async fn load_history(&self, move_id: StockMoveId) -> Result<Vec<StoredMoveEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, sequence_number, event_type, actor_id, occurred_at, payload
            FROM stock_move_history
            WHERE move_id = $1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(move_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_history", e))?;

        let mut history = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: serde_json::Value = get(&row, "payload")?;
            let event: StockMoveEvent = serde_json::from_value(payload)
                .map_err(|e| StoreError::Backend(format!("failed to deserialize history payload: {e}")))?;
            let sequence_number: i64 = get(&row, "sequence_number")?;
            let actor_id: Option<uuid::Uuid> = get(&row, "actor_id")?;

            history.push(StoredMoveEvent {
                event_id: get(&row, "event_id")?,
                move_id,
                sequence_number: sequence_number as u64,
                event_type: get(&row, "event_type")?,
                actor_id: actor_id.map(UserId::from_uuid),
                occurred_at: get(&row, "occurred_at")?,
                event,
            });
        }
        Ok(history)
    }

    #[instrument(
        skip(self, stock_move, events, deltas),
        fields(
            move_id = %stock_move.id_typed(),
            expected_version = ?expected_version,
            event_count = events.len(),
            delta_count = deltas.len()
        ),
        err
    )]
    async fn commit(
        &self,
        stock_move: &StockMove,
        expected_version: ExpectedVersion,
        events: &[StockMoveEvent],
        deltas: &[BalanceDelta],
        allow_negative: bool,
    ) -> Result<Vec<StoredMoveEvent>, StoreError> {
        let move_id = stock_move.id_typed();
        let current = stock_move
            .version()
            .checked_sub(events.len() as u64)
            .ok_or_else(|| StoreError::Backend("move version behind its own events".to_string()))?;
        if !expected_version.matches(current) {
            return Err(StoreError::Conflict(format!(
                "expected {expected_version:?}, move was handled at {current}"
            )));
        }

        let mut tx = self.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE stock_moves
            SET status = $3,
                reject_reason = $4,
                approver_id = $5,
                submitted_at = $6,
                approved_at = $7,
                version = $8,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(move_id.as_uuid())
        .bind(current as i64)
        .bind(stock_move.status().as_str())
        .bind(stock_move.reject_reason())
        .bind(stock_move.approver_id().map(uuid::Uuid::from))
        .bind(stock_move.submitted_at())
        .bind(stock_move.approved_at())
        .bind(stock_move.version() as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_move", e))?;

        if updated.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Conflict(format!(
                "stock move {move_id} is no longer at version {current}"
            )));
        }

        if events
            .iter()
            .any(|e| matches!(e, StockMoveEvent::LinesReplaced(_)))
        {
            sqlx::query("DELETE FROM stock_move_lines WHERE move_id = $1")
                .bind(move_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_lines", e))?;
            write_lines(&mut tx, stock_move).await?;
        }

        if let Err(err) = post_balances(&mut tx, deltas, allow_negative).await {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(err);
        }

        let stored = StoredMoveEvent::stamp(move_id, current, events);
        write_history(&mut tx, &stored).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(stored)
    }

    #[instrument(skip(self), fields(warehouse_id = %key.warehouse_id, product_id = %key.product_id), err)]
    async fn balance(&self, key: BalanceKey) -> Result<Decimal, StoreError> {
        let quantity: Option<Decimal> = sqlx::query_scalar(
            "SELECT quantity FROM stock_balances WHERE warehouse_id = $1 AND product_id = $2",
        )
        .bind(key.warehouse_id.as_uuid())
        .bind(key.product_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("balance", e))?;

        Ok(quantity.unwrap_or(Decimal::ZERO))
    }
}

async fn write_lines(
    tx: &mut Transaction<'_, Postgres>,
    stock_move: &StockMove,
) -> Result<(), StoreError> {
    for line in stock_move.lines() {
        sqlx::query(
            r#"
            INSERT INTO stock_move_lines (id, move_id, line_no, product_id, quantity, uom)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(stock_move.id_typed().as_uuid())
        .bind(line.line_no as i32)
        .bind(line.product_id.as_uuid())
        .bind(line.quantity)
        .bind(&line.uom)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_line", e))?;
    }
    Ok(())
}

async fn write_history(
    tx: &mut Transaction<'_, Postgres>,
    stored: &[StoredMoveEvent],
) -> Result<(), StoreError> {
    for entry in stored {
        let payload = serde_json::to_value(&entry.event)
            .map_err(|e| StoreError::Backend(format!("failed to serialize history payload: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO stock_move_history (
                event_id, move_id, sequence_number, event_type, actor_id, occurred_at, payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.event_id)
        .bind(entry.move_id.as_uuid())
        .bind(entry.sequence_number as i64)
        .bind(&entry.event_type)
        .bind(entry.actor_id.map(uuid::Uuid::from))
        .bind(entry.occurred_at)
        .bind(payload)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "history sequence {} already exists for move {}",
                    entry.sequence_number, entry.move_id
                ))
            } else {
                map_sqlx_error("insert_history", e)
            }
        })?;
    }
    Ok(())
}

/// Lock, check and update every touched balance row, in key order.
async fn post_balances(
    tx: &mut Transaction<'_, Postgres>,
    deltas: &[BalanceDelta],
    allow_negative: bool,
) -> Result<(), StoreError> {
    for (key, net) in net_deltas(deltas)? {
        sqlx::query(
            r#"
            INSERT INTO stock_balances (warehouse_id, product_id, quantity)
            VALUES ($1, $2, 0)
            ON CONFLICT (warehouse_id, product_id) DO NOTHING
            "#,
        )
        .bind(key.warehouse_id.as_uuid())
        .bind(key.product_id.as_uuid())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("ensure_balance_row", e))?;

        let current: Decimal = sqlx::query_scalar(
            r#"
            SELECT quantity FROM stock_balances
            WHERE warehouse_id = $1 AND product_id = $2
            FOR UPDATE
            "#,
        )
        .bind(key.warehouse_id.as_uuid())
        .bind(key.product_id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_balance", e))?;

        let next = resulting_balance(key, current, net, allow_negative)?;

        sqlx::query(
            r#"
            UPDATE stock_balances
            SET quantity = $3, updated_at = NOW()
            WHERE warehouse_id = $1 AND product_id = $2
            "#,
        )
        .bind(key.warehouse_id.as_uuid())
        .bind(key.product_id.as_uuid())
        .bind(next)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_balance", e))?;
    }
    Ok(())
}

fn get<'r, T>(row: &'r sqlx::postgres::PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to read {column}: {e}")))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

fn is_unique_violation_on(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}
