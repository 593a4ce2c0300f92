use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use stockflow_core::{AggregateRoot, ProductId, WarehouseId};
use stockflow_infra::NewStockMove;
use stockflow_inventory::{MoveType, NewLine, ReferenceType, StockMove, WarehouseRefs};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub uom: String,
}

impl From<LineRequest> for NewLine {
    fn from(value: LineRequest) -> Self {
        NewLine::new(value.product_id, value.quantity, value.uom)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMoveRequest {
    pub move_type: MoveType,
    pub move_date: Option<NaiveDate>,
    pub warehouse_from_id: Option<WarehouseId>,
    pub warehouse_to_id: Option<WarehouseId>,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<Uuid>,
    pub note: Option<String>,
    pub lines: Vec<LineRequest>,
}

impl From<CreateMoveRequest> for NewStockMove {
    fn from(value: CreateMoveRequest) -> Self {
        NewStockMove {
            move_type: value.move_type,
            move_date: value.move_date,
            warehouses: WarehouseRefs::new(value.warehouse_from_id, value.warehouse_to_id),
            reference_type: value.reference_type,
            reference_id: value.reference_id,
            note: value.note,
            lines: value.lines.into_iter().map(NewLine::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReplaceLinesRequest {
    pub lines: Vec<LineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizationQuery {
    pub action: stockflow_auth::MoveAction,
}

// -------------------------
// Response mapping
// -------------------------

pub fn move_to_json(m: &StockMove) -> serde_json::Value {
    let warehouses = m.warehouses();
    json!({
        "id": m.id_typed(),
        "move_no": m.move_no(),
        "move_type": m.move_type(),
        "move_date": m.move_date(),
        "warehouse_from_id": warehouses.from,
        "warehouse_to_id": warehouses.to,
        "reference_type": m.reference_type(),
        "reference_id": m.reference_id(),
        "status": m.status(),
        "note": m.note(),
        "reject_reason": m.reject_reason(),
        "creator_id": m.creator_id(),
        "approver_id": m.approver_id(),
        "created_at": m.created_at(),
        "submitted_at": m.submitted_at(),
        "approved_at": m.approved_at(),
        "version": m.version(),
        "lines": m.lines().iter().map(|l| json!({
            "id": l.id,
            "line_no": l.line_no,
            "product_id": l.product_id,
            "quantity": l.quantity,
            "uom": l.uom,
        })).collect::<Vec<_>>(),
    })
}
