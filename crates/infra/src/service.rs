//! Stock move service (application-level orchestration).
//!
//! Every transition runs the same pipeline:
//!
//! ```text
//! load history → rehydrate → resolve branch → authorization gate
//!   → aggregate.handle → commit (version CAS + history + balances) → publish
//! ```
//!
//! The gate runs before the aggregate sees the command, and events are only
//! published once the commit has succeeded.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use stockflow_auth::{
    Actor, AuthorizationDecision, AuthzError, MoveAction, TransitionRequest, authorize_transition,
    explain_transition,
};
use stockflow_core::{
    Aggregate, AggregateRoot, BranchId, DomainError, ExpectedVersion, ProductId, StockMoveId,
    UserId, WarehouseId,
};
use stockflow_events::{EventBus, EventEnvelope};
use stockflow_inventory::{
    Approve, BalanceDelta, BalanceKey, CreateMove, MoveNo, MoveStatus, MoveType, NewLine,
    ReferenceType, Reject, ReplaceLines, StockMove, StockMoveCommand, StockMoveEvent, Submit,
    WarehouseRefs, assign_lines,
};

use crate::config::ServiceConfig;
use crate::store::{StockStore, StoreError, StoredMoveEvent};
use crate::warehouses::WarehouseDirectory;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Version CAS lost, or no unique move number could be allocated.
    #[error("conflict: {0}")]
    Conflict(String),
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
    #[error("not found")]
    NotFound,
    #[error("invalid identifier: {0}")]
    InvalidId(String),
    #[error("store error: {0}")]
    Store(StoreError),
    /// Publication failed after a successful commit (at-least-once; the change stands).
    #[error("publish failed: {0}")]
    Publish(String),
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::InvalidState(msg) => ServiceError::InvalidState(msg),
            DomainError::Forbidden(msg) => ServiceError::Forbidden(msg),
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::InsufficientStock {
                warehouse_id,
                product_id,
                available,
                requested,
            } => ServiceError::InsufficientStock {
                warehouse_id,
                product_id,
                available,
                requested,
            },
            DomainError::NotFound => ServiceError::NotFound,
            DomainError::InvalidId(msg) => ServiceError::InvalidId(msg),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::InsufficientStock {
                warehouse_id,
                product_id,
                available,
                requested,
            } => ServiceError::InsufficientStock {
                warehouse_id,
                product_id,
                available,
                requested,
            },
            StoreError::Rejected(msg) => ServiceError::Validation(msg),
            StoreError::NotFound => ServiceError::NotFound,
            other => ServiceError::Store(other),
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Forbidden(msg) => ServiceError::Forbidden(msg),
        }
    }
}

/// Input for [`StockMoveService::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStockMove {
    pub move_type: MoveType,
    /// Defaults to today (UTC).
    pub move_date: Option<NaiveDate>,
    pub warehouses: WarehouseRefs,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<Uuid>,
    pub note: Option<String>,
    pub lines: Vec<NewLine>,
}

/// One step of a move's approval history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveHistoryEntry {
    pub sequence_number: u64,
    pub event_type: String,
    pub status: MoveStatus,
    pub actor_id: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl From<&StoredMoveEvent> for MoveHistoryEntry {
    fn from(stored: &StoredMoveEvent) -> Self {
        let (status, reason) = match &stored.event {
            StockMoveEvent::Created(_) | StockMoveEvent::LinesReplaced(_) => (MoveStatus::Draft, None),
            StockMoveEvent::Submitted(_) => (MoveStatus::WaitingApproval, None),
            StockMoveEvent::Approved(_) => (MoveStatus::Posted, None),
            StockMoveEvent::Rejected(e) => (MoveStatus::Cancelled, Some(e.reason.clone())),
        };
        Self {
            sequence_number: stored.sequence_number,
            event_type: stored.event_type.clone(),
            status,
            actor_id: stored.actor_id,
            occurred_at: stored.occurred_at,
            reason,
        }
    }
}

type MoveNoGenerator = dyn Fn(MoveType, DateTime<Utc>) -> MoveNo + Send + Sync;

/// Application service for stock moves.
///
/// `B` is the bus committed events are published to.
pub struct StockMoveService<B> {
    store: Arc<dyn StockStore>,
    warehouses: Arc<dyn WarehouseDirectory>,
    bus: B,
    config: ServiceConfig,
    move_nos: Arc<MoveNoGenerator>,
}

impl<B> StockMoveService<B> {
    pub fn new(
        store: Arc<dyn StockStore>,
        warehouses: Arc<dyn WarehouseDirectory>,
        bus: B,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            warehouses,
            bus,
            config,
            move_nos: Arc::new(MoveNo::generate),
        }
    }

    /// Replace the move number generator (collision tests, fixtures).
    pub fn with_move_no_generator(
        mut self,
        generator: impl Fn(MoveType, DateTime<Utc>) -> MoveNo + Send + Sync + 'static,
    ) -> Self {
        self.move_nos = Arc::new(generator);
        self
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> StockMoveService<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Create a draft move owned by `actor`.
    ///
    /// Retries with a fresh move number when the generated one is taken.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.user_id, move_type = %input.move_type), err)]
    pub async fn create(&self, actor: &Actor, input: NewStockMove) -> Result<StockMove, ServiceError> {
        for warehouse_id in [input.warehouses.from, input.warehouses.to].into_iter().flatten() {
            self.branch_of(warehouse_id).await?;
        }

        let lines = assign_lines(input.lines);
        let attempts = self.config.move_no_max_attempts.max(1);

        for attempt in 1..=attempts {
            let now = Utc::now();
            let move_id = StockMoveId::new();
            let command = StockMoveCommand::Create(CreateMove {
                move_id,
                move_no: (self.move_nos)(input.move_type, now),
                move_type: input.move_type,
                move_date: input.move_date.unwrap_or_else(|| now.date_naive()),
                warehouses: input.warehouses,
                reference_type: input.reference_type,
                reference_id: input.reference_id,
                lines: lines.clone(),
                note: input.note.clone(),
                creator_id: actor.user_id,
                occurred_at: now,
            });

            let mut stock_move = StockMove::empty(move_id);
            let events = stock_move.handle(&command)?;
            for event in &events {
                stock_move.apply(event);
            }

            match self.store.insert_move(&stock_move, &events).await {
                Ok(stored) => {
                    info!(
                        move_id = %stock_move.id_typed(),
                        move_no = %stock_move.move_no(),
                        actor_id = %actor.user_id,
                        status = %stock_move.status(),
                        "stock move created"
                    );
                    self.publish(&stored)?;
                    return Ok(stock_move);
                }
                Err(StoreError::DuplicateMoveNo(move_no)) => {
                    warn!(%move_no, attempt, "move_no collision; regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Conflict(format!(
            "could not allocate a unique move_no after {attempts} attempt(s)"
        )))
    }

    /// Replace every line of a draft move.
    ///
    /// Not gated: any caller may edit a draft; only its creator can submit it.
    #[instrument(skip(self, lines), fields(move_id = %move_id), err)]
    pub async fn replace_lines(
        &self,
        move_id: StockMoveId,
        lines: Vec<NewLine>,
    ) -> Result<StockMove, ServiceError> {
        let lines = assign_lines(lines);
        self.execute(None, move_id, |_| {
            StockMoveCommand::ReplaceLines(ReplaceLines {
                move_id,
                lines,
                occurred_at: Utc::now(),
            })
        })
        .await
    }

    #[instrument(skip(self, actor), fields(move_id = %move_id, actor_id = %actor.user_id), err)]
    pub async fn submit(&self, actor: &Actor, move_id: StockMoveId) -> Result<StockMove, ServiceError> {
        self.execute(Some((actor, MoveAction::Submit)), move_id, |_| {
            StockMoveCommand::Submit(Submit {
                move_id,
                submitted_by: actor.user_id,
                occurred_at: Utc::now(),
            })
        })
        .await
    }

    /// Approve a waiting move and post its ledger effect atomically.
    #[instrument(skip(self, actor), fields(move_id = %move_id, actor_id = %actor.user_id), err)]
    pub async fn approve(&self, actor: &Actor, move_id: StockMoveId) -> Result<StockMove, ServiceError> {
        self.execute(Some((actor, MoveAction::Approve)), move_id, |_| {
            StockMoveCommand::Approve(Approve {
                move_id,
                approved_by: actor.user_id,
                occurred_at: Utc::now(),
            })
        })
        .await
    }

    #[instrument(skip(self, actor, reason), fields(move_id = %move_id, actor_id = %actor.user_id), err)]
    pub async fn reject(
        &self,
        actor: &Actor,
        move_id: StockMoveId,
        reason: &str,
    ) -> Result<StockMove, ServiceError> {
        self.execute(Some((actor, MoveAction::Reject)), move_id, |_| {
            StockMoveCommand::Reject(Reject {
                move_id,
                rejected_by: actor.user_id,
                reason: reason.to_string(),
                occurred_at: Utc::now(),
            })
        })
        .await
    }

    pub async fn get(&self, move_id: StockMoveId) -> Result<StockMove, ServiceError> {
        Ok(self.load(move_id).await?.0)
    }

    pub async fn history(&self, move_id: StockMoveId) -> Result<Vec<MoveHistoryEntry>, ServiceError> {
        let (_, history) = self.load(move_id).await?;
        Ok(history.iter().map(MoveHistoryEntry::from).collect())
    }

    pub async fn balance(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<Decimal, ServiceError> {
        Ok(self.store.balance(BalanceKey::new(warehouse_id, product_id)).await?)
    }

    /// Explain whether `actor` may perform `action` on the move, without doing it.
    pub async fn explain(
        &self,
        actor: &Actor,
        move_id: StockMoveId,
        action: MoveAction,
    ) -> Result<AuthorizationDecision, ServiceError> {
        let (stock_move, _) = self.load(move_id).await?;
        let request = self.transition_request(&stock_move, action).await?;
        Ok(explain_transition(actor, &request))
    }

    async fn load(&self, move_id: StockMoveId) -> Result<(StockMove, Vec<StoredMoveEvent>), ServiceError> {
        let history = self.store.load_history(move_id).await?;
        if history.is_empty() {
            return Err(ServiceError::NotFound);
        }

        // History must be contiguous from 1.
        for (idx, stored) in history.iter().enumerate() {
            let expected = idx as u64 + 1;
            if stored.sequence_number != expected {
                return Err(ServiceError::Store(StoreError::Backend(format!(
                    "history gap for move {move_id}: expected sequence {expected}, found {}",
                    stored.sequence_number
                ))));
            }
        }

        let stock_move = StockMove::from_history(move_id, history.iter().map(|s| &s.event));
        Ok((stock_move, history))
    }

    async fn branch_of(&self, warehouse_id: WarehouseId) -> Result<BranchId, ServiceError> {
        self.warehouses
            .branch_of(warehouse_id)
            .await?
            .ok_or_else(|| ServiceError::Validation(format!("unknown warehouse {warehouse_id}")))
    }

    async fn transition_request(
        &self,
        stock_move: &StockMove,
        action: MoveAction,
    ) -> Result<TransitionRequest, ServiceError> {
        let warehouse_id = stock_move.authorization_warehouse().ok_or_else(|| {
            ServiceError::Validation(format!(
                "{} move {} has no warehouse to authorize against",
                stock_move.move_type(),
                stock_move.move_no()
            ))
        })?;

        Ok(TransitionRequest {
            action,
            creator_id: stock_move.creator_id(),
            branch_id: self.branch_of(warehouse_id).await?,
        })
    }

    async fn execute(
        &self,
        gate: Option<(&Actor, MoveAction)>,
        move_id: StockMoveId,
        make_command: impl FnOnce(&StockMove) -> StockMoveCommand,
    ) -> Result<StockMove, ServiceError> {
        let (current, _) = self.load(move_id).await?;

        if let Some((actor, action)) = gate {
            let request = self.transition_request(&current, action).await?;
            authorize_transition(actor, &request)?;
        }

        let command = make_command(&current);
        let events = current.handle(&command)?;

        let mut next = current.clone();
        let mut deltas: Vec<BalanceDelta> = Vec::new();
        for event in &events {
            if let StockMoveEvent::Approved(approved) = event {
                deltas.extend(approved.deltas.iter().copied());
            }
            next.apply(event);
        }

        let allow_negative = self.config.negative_stock.permits_negative(next.move_type());
        let stored = self
            .store
            .commit(
                &next,
                ExpectedVersion::Exact(current.version()),
                &events,
                &deltas,
                allow_negative,
            )
            .await?;

        info!(
            move_id = %next.id_typed(),
            move_no = %next.move_no(),
            actor_id = %gate.map(|(a, _)| a.user_id.to_string()).unwrap_or_default(),
            status = %next.status(),
            version = next.version(),
            "stock move transitioned"
        );

        self.publish(&stored)?;
        Ok(next)
    }

    fn publish(&self, stored: &[StoredMoveEvent]) -> Result<(), ServiceError> {
        for entry in stored {
            let envelope = entry
                .to_envelope()
                .map_err(|e| ServiceError::Publish(e.to_string()))?;
            self.bus
                .publish(envelope)
                .map_err(|e| ServiceError::Publish(format!("{e:?}")))?;
        }
        Ok(())
    }
}
