use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::{
    Aggregate, AggregateRoot, DomainError, StockMoveId, UserId, WarehouseId,
};
use stockflow_events::Event;

use crate::ledger::BalanceDelta;
use crate::line::{StockMoveLine, validate_lines};
use crate::move_no::MoveNo;
use crate::move_type::{MoveType, ReferenceType, WarehouseRefs};

/// Stock move approval lifecycle.
///
/// `draft → waiting_approval → posted | cancelled`; both end states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveStatus {
    Draft,
    WaitingApproval,
    Posted,
    Cancelled,
}

impl MoveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MoveStatus::Draft => "draft",
            MoveStatus::WaitingApproval => "waiting_approval",
            MoveStatus::Posted => "posted",
            MoveStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MoveStatus::Posted | MoveStatus::Cancelled)
    }
}

impl core::fmt::Display for MoveStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate root: StockMove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMove {
    id: StockMoveId,
    move_no: MoveNo,
    move_date: NaiveDate,
    move_type: MoveType,
    warehouses: WarehouseRefs,
    reference_type: Option<ReferenceType>,
    reference_id: Option<Uuid>,
    status: MoveStatus,
    note: Option<String>,
    reject_reason: Option<String>,
    creator_id: UserId,
    approver_id: Option<UserId>,
    created_at: Option<DateTime<Utc>>,
    submitted_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    lines: Vec<StockMoveLine>,
    version: u64,
    created: bool,
}

impl StockMove {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: StockMoveId) -> Self {
        Self {
            id,
            move_no: MoveNo::from_string(""),
            move_date: NaiveDate::default(),
            move_type: MoveType::Receipt,
            warehouses: WarehouseRefs::default(),
            reference_type: None,
            reference_id: None,
            status: MoveStatus::Draft,
            note: None,
            reject_reason: None,
            creator_id: UserId::from_uuid(Uuid::nil()),
            approver_id: None,
            created_at: None,
            submitted_at: None,
            approved_at: None,
            lines: Vec::new(),
            version: 0,
            created: false,
        }
    }

    /// Rebuild a move from its committed history.
    pub fn from_history<'a>(
        id: StockMoveId,
        events: impl IntoIterator<Item = &'a StockMoveEvent>,
    ) -> Self {
        let mut stock_move = Self::empty(id);
        for event in events {
            stock_move.apply(event);
        }
        stock_move
    }

    pub fn id_typed(&self) -> StockMoveId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn move_no(&self) -> &MoveNo {
        &self.move_no
    }

    pub fn move_date(&self) -> NaiveDate {
        self.move_date
    }

    pub fn move_type(&self) -> MoveType {
        self.move_type
    }

    pub fn warehouses(&self) -> WarehouseRefs {
        self.warehouses
    }

    pub fn reference_type(&self) -> Option<ReferenceType> {
        self.reference_type
    }

    pub fn reference_id(&self) -> Option<Uuid> {
        self.reference_id
    }

    pub fn status(&self) -> MoveStatus {
        self.status
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn reject_reason(&self) -> Option<&str> {
        self.reject_reason.as_deref()
    }

    pub fn creator_id(&self) -> UserId {
        self.creator_id
    }

    pub fn approver_id(&self) -> Option<UserId> {
        self.approver_id
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn lines(&self) -> &[StockMoveLine] {
        &self.lines
    }

    /// Warehouse whose branch authorizes transitions on this move.
    pub fn authorization_warehouse(&self) -> Option<WarehouseId> {
        self.move_type.authorization_warehouse(&self.warehouses)
    }
}

impl AggregateRoot for StockMove {
    type Id = StockMoveId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateMove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMove {
    pub move_id: StockMoveId,
    pub move_no: MoveNo,
    pub move_type: MoveType,
    pub move_date: NaiveDate,
    pub warehouses: WarehouseRefs,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<Uuid>,
    pub lines: Vec<StockMoveLine>,
    pub note: Option<String>,
    pub creator_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReplaceLines (draft only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceLines {
    pub move_id: StockMoveId,
    pub lines: Vec<StockMoveLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submit {
    pub move_id: StockMoveId,
    pub submitted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Approve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approve {
    pub move_id: StockMoveId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reject {
    pub move_id: StockMoveId,
    pub rejected_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockMoveCommand {
    Create(CreateMove),
    ReplaceLines(ReplaceLines),
    Submit(Submit),
    Approve(Approve),
    Reject(Reject),
}

/// Event: StockMoveCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoveCreated {
    pub move_id: StockMoveId,
    pub move_no: MoveNo,
    pub move_type: MoveType,
    pub move_date: NaiveDate,
    pub warehouses: WarehouseRefs,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<Uuid>,
    pub lines: Vec<StockMoveLine>,
    pub note: Option<String>,
    pub creator_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockMoveLinesReplaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoveLinesReplaced {
    pub move_id: StockMoveId,
    pub lines: Vec<StockMoveLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockMoveSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoveSubmitted {
    pub move_id: StockMoveId,
    pub submitted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockMoveApproved.
///
/// Carries the exact balance deltas posted to the ledger with this approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoveApproved {
    pub move_id: StockMoveId,
    pub approved_by: UserId,
    pub deltas: Vec<BalanceDelta>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockMoveRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoveRejected {
    pub move_id: StockMoveId,
    pub rejected_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockMoveEvent {
    Created(StockMoveCreated),
    LinesReplaced(StockMoveLinesReplaced),
    Submitted(StockMoveSubmitted),
    Approved(StockMoveApproved),
    Rejected(StockMoveRejected),
}

impl StockMoveEvent {
    pub fn move_id(&self) -> StockMoveId {
        match self {
            StockMoveEvent::Created(e) => e.move_id,
            StockMoveEvent::LinesReplaced(e) => e.move_id,
            StockMoveEvent::Submitted(e) => e.move_id,
            StockMoveEvent::Approved(e) => e.move_id,
            StockMoveEvent::Rejected(e) => e.move_id,
        }
    }

    /// The user responsible for this step, when the step has one.
    pub fn actor_id(&self) -> Option<UserId> {
        match self {
            StockMoveEvent::Created(e) => Some(e.creator_id),
            StockMoveEvent::LinesReplaced(_) => None,
            StockMoveEvent::Submitted(e) => Some(e.submitted_by),
            StockMoveEvent::Approved(e) => Some(e.approved_by),
            StockMoveEvent::Rejected(e) => Some(e.rejected_by),
        }
    }
}

impl Event for StockMoveEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockMoveEvent::Created(_) => "inventory.stock_move.created",
            StockMoveEvent::LinesReplaced(_) => "inventory.stock_move.lines_replaced",
            StockMoveEvent::Submitted(_) => "inventory.stock_move.submitted",
            StockMoveEvent::Approved(_) => "inventory.stock_move.approved",
            StockMoveEvent::Rejected(_) => "inventory.stock_move.rejected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockMoveEvent::Created(e) => e.occurred_at,
            StockMoveEvent::LinesReplaced(e) => e.occurred_at,
            StockMoveEvent::Submitted(e) => e.occurred_at,
            StockMoveEvent::Approved(e) => e.occurred_at,
            StockMoveEvent::Rejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockMove {
    type Command = StockMoveCommand;
    type Event = StockMoveEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockMoveEvent::Created(e) => {
                self.id = e.move_id;
                self.move_no = e.move_no.clone();
                self.move_type = e.move_type;
                self.move_date = e.move_date;
                self.warehouses = e.warehouses;
                self.reference_type = e.reference_type;
                self.reference_id = e.reference_id;
                self.lines = e.lines.clone();
                self.note = e.note.clone();
                self.creator_id = e.creator_id;
                self.status = MoveStatus::Draft;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            StockMoveEvent::LinesReplaced(e) => {
                self.lines = e.lines.clone();
            }
            StockMoveEvent::Submitted(e) => {
                self.status = MoveStatus::WaitingApproval;
                self.submitted_at = Some(e.occurred_at);
            }
            StockMoveEvent::Approved(e) => {
                self.status = MoveStatus::Posted;
                self.approver_id = Some(e.approved_by);
                self.approved_at = Some(e.occurred_at);
            }
            StockMoveEvent::Rejected(e) => {
                self.status = MoveStatus::Cancelled;
                self.reject_reason = Some(e.reason.clone());
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockMoveCommand::Create(cmd) => self.handle_create(cmd),
            StockMoveCommand::ReplaceLines(cmd) => self.handle_replace_lines(cmd),
            StockMoveCommand::Submit(cmd) => self.handle_submit(cmd),
            StockMoveCommand::Approve(cmd) => self.handle_approve(cmd),
            StockMoveCommand::Reject(cmd) => self.handle_reject(cmd),
        }
    }
}

impl StockMove {
    fn ensure_existing(&self, move_id: StockMoveId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != move_id {
            return Err(DomainError::validation("move_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: MoveStatus, action: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::invalid_state(format!(
                "cannot {action} stock move {} in status '{}' (expected '{}')",
                self.move_no, self.status, expected
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateMove) -> Result<Vec<StockMoveEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("stock move already exists"));
        }
        if cmd.move_no.as_str().trim().is_empty() {
            return Err(DomainError::validation("move_no cannot be empty"));
        }
        cmd.move_type.validate_warehouses(&cmd.warehouses)?;
        validate_lines(cmd.move_type, &cmd.lines)?;

        Ok(vec![StockMoveEvent::Created(StockMoveCreated {
            move_id: cmd.move_id,
            move_no: cmd.move_no.clone(),
            move_type: cmd.move_type,
            move_date: cmd.move_date,
            warehouses: cmd.warehouses,
            reference_type: cmd.reference_type,
            reference_id: cmd.reference_id,
            lines: cmd.lines.clone(),
            note: cmd.note.clone(),
            creator_id: cmd.creator_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_replace_lines(&self, cmd: &ReplaceLines) -> Result<Vec<StockMoveEvent>, DomainError> {
        self.ensure_existing(cmd.move_id)?;
        self.ensure_status(MoveStatus::Draft, "replace lines of")?;
        validate_lines(self.move_type, &cmd.lines)?;

        Ok(vec![StockMoveEvent::LinesReplaced(StockMoveLinesReplaced {
            move_id: cmd.move_id,
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &Submit) -> Result<Vec<StockMoveEvent>, DomainError> {
        self.ensure_existing(cmd.move_id)?;
        self.ensure_status(MoveStatus::Draft, "submit")?;

        // Re-validated here: a draft must still be postable when it leaves draft.
        self.move_type.validate_warehouses(&self.warehouses)?;
        validate_lines(self.move_type, &self.lines)?;

        Ok(vec![StockMoveEvent::Submitted(StockMoveSubmitted {
            move_id: cmd.move_id,
            submitted_by: cmd.submitted_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &Approve) -> Result<Vec<StockMoveEvent>, DomainError> {
        self.ensure_existing(cmd.move_id)?;
        self.ensure_status(MoveStatus::WaitingApproval, "approve")?;

        let deltas = self.move_type.ledger_deltas(&self.warehouses, &self.lines)?;

        Ok(vec![StockMoveEvent::Approved(StockMoveApproved {
            move_id: cmd.move_id,
            approved_by: cmd.approved_by,
            deltas,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &Reject) -> Result<Vec<StockMoveEvent>, DomainError> {
        self.ensure_existing(cmd.move_id)?;
        self.ensure_status(MoveStatus::WaitingApproval, "reject")?;

        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("a rejection reason is required"));
        }

        Ok(vec![StockMoveEvent::Rejected(StockMoveRejected {
            move_id: cmd.move_id,
            rejected_by: cmd.rejected_by,
            reason: reason.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
