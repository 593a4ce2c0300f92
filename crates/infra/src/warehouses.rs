//! Warehouse → branch resolution.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use stockflow_core::{BranchId, DomainError, WarehouseId};

/// Resolves the branch that owns a warehouse.
#[async_trait]
pub trait WarehouseDirectory: Send + Sync {
    /// `Ok(None)` when the warehouse is unknown.
    async fn branch_of(&self, warehouse_id: WarehouseId) -> Result<Option<BranchId>, DomainError>;
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryWarehouseDirectory {
    branches: RwLock<HashMap<WarehouseId, BranchId>>,
}

impl InMemoryWarehouseDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_warehouses(entries: impl IntoIterator<Item = (WarehouseId, BranchId)>) -> Self {
        Self {
            branches: RwLock::new(entries.into_iter().collect()),
        }
    }

    /// Parse `wh_uuid:branch_uuid,wh_uuid:branch_uuid,...` (the `WAREHOUSES` env format).
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let mut entries: Vec<(WarehouseId, BranchId)> = Vec::new();
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (warehouse, branch) = pair.split_once(':').ok_or_else(|| {
                DomainError::validation(format!("expected 'warehouse:branch', got '{pair}'"))
            })?;
            entries.push((warehouse.trim().parse()?, branch.trim().parse()?));
        }
        Ok(Self::with_warehouses(entries))
    }

    pub fn insert(&self, warehouse_id: WarehouseId, branch_id: BranchId) {
        if let Ok(mut map) = self.branches.write() {
            map.insert(warehouse_id, branch_id);
        }
    }
}

#[async_trait]
impl WarehouseDirectory for InMemoryWarehouseDirectory {
    async fn branch_of(&self, warehouse_id: WarehouseId) -> Result<Option<BranchId>, DomainError> {
        let map = self
            .branches
            .read()
            .map_err(|_| DomainError::invalid_state("warehouse directory lock poisoned"))?;
        Ok(map.get(&warehouse_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_env_format() {
        let (w1, b1) = (WarehouseId::new(), BranchId::new());
        let (w2, b2) = (WarehouseId::new(), BranchId::new());
        let dir = InMemoryWarehouseDirectory::parse(&format!("{w1}:{b1}, {w2}:{b2},")).unwrap();

        assert_eq!(dir.branch_of(w1).await.unwrap(), Some(b1));
        assert_eq!(dir.branch_of(w2).await.unwrap(), Some(b2));
        assert_eq!(dir.branch_of(WarehouseId::new()).await.unwrap(), None);
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(matches!(
            InMemoryWarehouseDirectory::parse("nonsense"),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            InMemoryWarehouseDirectory::parse("abc:def"),
            Err(DomainError::InvalidId(_))
        ));
    }
}
