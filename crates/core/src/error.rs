//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::id::{ProductId, WarehouseId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// illegal transitions, authorization, stock shortfalls). Infrastructure
/// concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (empty lines, bad quantity, missing warehouse, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested transition is not legal from the current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The actor's role or branch does not permit the action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Optimistic concurrency collision or duplicate unique key.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Posting would drive a balance below zero.
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

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
