use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rust_decimal::Decimal;

use stockflow_core::{AggregateRoot, ExpectedVersion, StockMoveId};
use stockflow_inventory::{BalanceDelta, BalanceKey, StockMove, StockMoveEvent, post_deltas};

use super::{StockStore, StoreError, StoredMoveEvent};

#[derive(Debug, Default)]
struct MoveRecord {
    version: u64,
    history: Vec<StoredMoveEvent>,
}

#[derive(Debug, Default)]
struct Inner {
    moves: HashMap<StockMoveId, MoveRecord>,
    move_nos: HashMap<String, StockMoveId>,
    balances: HashMap<BalanceKey, Decimal>,
}

/// In-memory stock store.
///
/// Intended for tests/dev. One lock guards moves and balances together, so
/// every commit is serialized and atomic.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    inner: RwLock<Inner>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a balance directly (tests/dev fixtures).
    pub fn set_balance(&self, key: BalanceKey, quantity: Decimal) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.balances.insert(key, quantity);
        Ok(())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

fn ensure_version_advance(
    stock_move: &StockMove,
    current: u64,
    events: &[StockMoveEvent],
) -> Result<(), StoreError> {
    let expected = current + events.len() as u64;
    if stock_move.version() != expected {
        return Err(StoreError::Backend(format!(
            "move version {} does not match stored version {current} plus {} event(s)",
            stock_move.version(),
            events.len()
        )));
    }
    Ok(())
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn insert_move(
        &self,
        stock_move: &StockMove,
        events: &[StockMoveEvent],
    ) -> Result<Vec<StoredMoveEvent>, StoreError> {
        let move_id = stock_move.id_typed();
        let move_no = stock_move.move_no().as_str().to_string();
        ensure_version_advance(stock_move, 0, events)?;

        let mut inner = self.write()?;
        if inner.moves.contains_key(&move_id) {
            return Err(StoreError::Conflict(format!("stock move {move_id} already exists")));
        }
        if inner.move_nos.contains_key(&move_no) {
            return Err(StoreError::DuplicateMoveNo(move_no));
        }

        let stored = StoredMoveEvent::stamp(move_id, 0, events);
        inner.move_nos.insert(move_no, move_id);
        inner.moves.insert(
            move_id,
            MoveRecord {
                version: stock_move.version(),
                history: stored.clone(),
            },
        );
        Ok(stored)
    }

    async fn load_history(&self, move_id: StockMoveId) -> Result<Vec<StoredMoveEvent>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .moves
            .get(&move_id)
            .map(|r| r.history.clone())
            .unwrap_or_default())
    }

    async fn commit(
        &self,
        stock_move: &StockMove,
        expected_version: ExpectedVersion,
        events: &[StockMoveEvent],
        deltas: &[BalanceDelta],
        allow_negative: bool,
    ) -> Result<Vec<StoredMoveEvent>, StoreError> {
        let move_id = stock_move.id_typed();
        let mut guard = self.write()?;
        let inner = &mut *guard;

        let record = inner.moves.get_mut(&move_id).ok_or(StoreError::NotFound)?;
        let current = record.version;
        expected_version.check(current)?;
        ensure_version_advance(stock_move, current, events)?;

        // Balances first: a shortfall must leave the move untouched too.
        post_deltas(&mut inner.balances, deltas, allow_negative)?;

        let stored = StoredMoveEvent::stamp(move_id, current, events);
        record.version = stock_move.version();
        record.history.extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn balance(&self, key: BalanceKey) -> Result<Decimal, StoreError> {
        let inner = self.read()?;
        Ok(inner.balances.get(&key).copied().unwrap_or(Decimal::ZERO))
    }
}
