//! Stock move persistence: move state, approval history and balances.
//!
//! A commit is a single atomic unit: the move's version CAS, its history
//! rows, and (on approval) every balance delta either all land or none do.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryStockStore;
pub use postgres::{PostgresStockStore, SCHEMA};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use stockflow_core::{DomainError, ExpectedVersion, ProductId, StockMoveId, UserId, WarehouseId};
use stockflow_events::{Event, EventEnvelope};
use stockflow_inventory::{BalanceDelta, BalanceKey, StockMove, StockMoveEvent};

pub const AGGREGATE_TYPE: &str = "inventory.stock_move";

/// A persisted history entry for a move.
///
/// `sequence_number` equals the move version reached after the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMoveEvent {
    pub event_id: Uuid,
    pub move_id: StockMoveId,
    pub sequence_number: u64,
    pub event_type: String,
    pub actor_id: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
    pub event: StockMoveEvent,
}

impl StoredMoveEvent {
    /// Number `events` so they follow `current_version`.
    pub fn stamp(move_id: StockMoveId, current_version: u64, events: &[StockMoveEvent]) -> Vec<Self> {
        events
            .iter()
            .enumerate()
            .map(|(idx, event)| Self {
                event_id: Uuid::now_v7(),
                move_id,
                sequence_number: current_version + idx as u64 + 1,
                event_type: event.event_type().to_string(),
                actor_id: event.actor_id(),
                occurred_at: event.occurred_at(),
                event: event.clone(),
            })
            .collect()
    }

    /// Envelope for publication; the payload is the event as JSON.
    pub fn to_envelope(&self) -> Result<EventEnvelope<serde_json::Value>, serde_json::Error> {
        Ok(EventEnvelope::new(
            self.event_id,
            *self.move_id.as_uuid(),
            AGGREGATE_TYPE,
            self.sequence_number,
            self.event_type.clone(),
            self.occurred_at,
            serde_json::to_value(&self.event)?,
        ))
    }
}

/// Store operation error.
///
/// These are storage/concurrency outcomes; domain validation never gets this far.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Version CAS lost, or the move id already exists.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// Another move already holds this `move_no`.
    #[error("duplicate move_no: {0}")]
    DuplicateMoveNo(String),

    /// Posting would drive a balance negative; nothing was written.
    #[error(
        "insufficient stock for product {product_id} in warehouse {warehouse_id} \
         (available: {available}, requested: {requested})"
    )]
    InsufficientStock {
        warehouse_id: WarehouseId,
        product_id: ProductId,
        available: Decimal,
        requested: Decimal,
    },

    /// The posting itself is invalid (e.g. a balance would leave the representable range).
    #[error("posting rejected: {0}")]
    Rejected(String),

    #[error("stock move not found")]
    NotFound,

    /// Connection, serialization or other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<DomainError> for StoreError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InsufficientStock {
                warehouse_id,
                product_id,
                available,
                requested,
            } => StoreError::InsufficientStock {
                warehouse_id,
                product_id,
                available,
                requested,
            },
            DomainError::Conflict(msg) => StoreError::Conflict(msg),
            DomainError::Validation(msg) => StoreError::Rejected(msg),
            DomainError::NotFound => StoreError::NotFound,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Persistence for stock moves and balances.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Insert a freshly created move with its creation history.
    ///
    /// Fails with `DuplicateMoveNo` when the move number is taken.
    async fn insert_move(
        &self,
        stock_move: &StockMove,
        events: &[StockMoveEvent],
    ) -> Result<Vec<StoredMoveEvent>, StoreError>;

    /// Full history of a move, ordered by sequence number.
    ///
    /// Empty when the move does not exist.
    async fn load_history(&self, move_id: StockMoveId) -> Result<Vec<StoredMoveEvent>, StoreError>;

    /// Persist `stock_move` (already advanced by `events`) if the stored
    /// version still matches `expected_version`, appending history and
    /// posting `deltas` in the same atomic unit.
    async fn commit(
        &self,
        stock_move: &StockMove,
        expected_version: ExpectedVersion,
        events: &[StockMoveEvent],
        deltas: &[BalanceDelta],
        allow_negative: bool,
    ) -> Result<Vec<StoredMoveEvent>, StoreError>;

    /// Current balance; zero when no row exists.
    async fn balance(&self, key: BalanceKey) -> Result<Decimal, StoreError>;
}
