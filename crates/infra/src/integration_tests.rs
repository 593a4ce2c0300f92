//! End-to-end flows through the service with in-memory store, directory and bus.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value as JsonValue;

use stockflow_auth::{Actor, DenialKind, MoveAction, Role};
use stockflow_core::{AggregateRoot, BranchId, ProductId, UserId, WarehouseId};
use stockflow_events::{EventBus, EventEnvelope, InMemoryEventBus};
use stockflow_inventory::{
    MoveNo, MoveStatus, MoveType, NegativeStockPolicy, NewLine, StockMove, WarehouseRefs,
};

use crate::config::ServiceConfig;
use crate::service::{NewStockMove, ServiceError, StockMoveService};
use crate::store::InMemoryStockStore;
use crate::warehouses::InMemoryWarehouseDirectory;

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

struct Fixture {
    service: Arc<StockMoveService<Bus>>,
    main: WarehouseId,
    spare: WarehouseId,
    remote: WarehouseId,
    product: ProductId,
    keeper: Actor,
    manager: Actor,
    remote_manager: Actor,
}

fn fixture_with(config: ServiceConfig) -> Fixture {
    let branch = BranchId::new();
    let remote_branch = BranchId::new();
    let (main, spare, remote) = (WarehouseId::new(), WarehouseId::new(), WarehouseId::new());

    let directory = InMemoryWarehouseDirectory::with_warehouses([
        (main, branch),
        (spare, branch),
        (remote, remote_branch),
    ]);

    let service = StockMoveService::new(
        Arc::new(InMemoryStockStore::new()),
        Arc::new(directory),
        Arc::new(InMemoryEventBus::new()),
        config,
    );

    Fixture {
        service: Arc::new(service),
        main,
        spare,
        remote,
        product: ProductId::new(),
        keeper: Actor::new(UserId::new(), branch, vec![Role::StockKeeper]),
        manager: Actor::new(UserId::new(), branch, vec![Role::WarehouseManager]),
        remote_manager: Actor::new(UserId::new(), remote_branch, vec![Role::WarehouseManager]),
    }
}

fn fixture() -> Fixture {
    fixture_with(ServiceConfig::default())
}

fn input(move_type: MoveType, from: Option<WarehouseId>, to: Option<WarehouseId>, lines: Vec<NewLine>) -> NewStockMove {
    NewStockMove {
        move_type,
        move_date: None,
        warehouses: WarehouseRefs::new(from, to),
        reference_type: None,
        reference_id: None,
        note: None,
        lines,
    }
}

impl Fixture {
    fn line(&self, qty: Decimal) -> Vec<NewLine> {
        vec![NewLine::new(self.product, qty, "pcs")]
    }

    async fn submitted(&self, move_type: MoveType, from: Option<WarehouseId>, to: Option<WarehouseId>, qty: Decimal) -> StockMove {
        let m = self
            .service
            .create(&self.keeper, input(move_type, from, to, self.line(qty)))
            .await
            .unwrap();
        self.service.submit(&self.keeper, m.id_typed()).await.unwrap()
    }

    async fn posted(&self, move_type: MoveType, from: Option<WarehouseId>, to: Option<WarehouseId>, qty: Decimal) -> StockMove {
        let m = self.submitted(move_type, from, to, qty).await;
        self.service.approve(&self.manager, m.id_typed()).await.unwrap()
    }

    async fn balance(&self, warehouse_id: WarehouseId) -> Decimal {
        self.service.balance(warehouse_id, self.product).await.unwrap()
    }
}

#[tokio::test]
async fn receipt_then_issue_round_trips_the_balance() {
    let f = fixture();

    let receipt = f.posted(MoveType::Receipt, None, Some(f.main), dec!(10)).await;
    assert_eq!(receipt.status(), MoveStatus::Posted);
    assert_eq!(receipt.approver_id(), Some(f.manager.user_id));
    assert_eq!(f.balance(f.main).await, dec!(10));

    f.posted(MoveType::Issue, Some(f.main), None, dec!(10)).await;
    assert_eq!(f.balance(f.main).await, Decimal::ZERO);
}

#[tokio::test]
async fn transfer_moves_stock_between_warehouses() {
    let f = fixture();
    f.posted(MoveType::Receipt, None, Some(f.main), dec!(8)).await;
    f.posted(MoveType::Transfer, Some(f.main), Some(f.spare), dec!(5)).await;

    assert_eq!(f.balance(f.main).await, dec!(3));
    assert_eq!(f.balance(f.spare).await, dec!(5));
}

#[tokio::test]
async fn insufficient_stock_leaves_move_waiting_and_balance_untouched() {
    let f = fixture();
    f.posted(MoveType::Receipt, None, Some(f.main), dec!(3)).await;

    let issue = f.submitted(MoveType::Issue, Some(f.main), None, dec!(5)).await;
    let err = f.service.approve(&f.manager, issue.id_typed()).await.unwrap_err();
    match err {
        ServiceError::InsufficientStock { available, requested, warehouse_id, .. } => {
            assert_eq!(available, dec!(3));
            assert_eq!(requested, dec!(5));
            assert_eq!(warehouse_id, f.main);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    let reloaded = f.service.get(issue.id_typed()).await.unwrap();
    assert_eq!(reloaded.status(), MoveStatus::WaitingApproval);
    assert_eq!(reloaded.version(), issue.version());
    assert_eq!(f.balance(f.main).await, dec!(3));
}

#[tokio::test]
async fn balance_overflow_is_rejected_and_the_store_stays_usable() {
    let f = fixture();
    f.posted(MoveType::Receipt, None, Some(f.main), Decimal::MAX).await;

    let receipt = f.submitted(MoveType::Receipt, None, Some(f.main), dec!(1)).await;
    let err = f.service.approve(&f.manager, receipt.id_typed()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(msg) if msg.contains("out of range")));

    let reloaded = f.service.get(receipt.id_typed()).await.unwrap();
    assert_eq!(reloaded.status(), MoveStatus::WaitingApproval);
    assert_eq!(f.balance(f.main).await, Decimal::MAX);

    f.posted(MoveType::Receipt, None, Some(f.spare), dec!(2)).await;
    assert_eq!(f.balance(f.spare).await, dec!(2));
}

#[tokio::test]
async fn negative_adjustments_follow_the_configured_policy() {
    let strict = fixture();
    let m = strict.submitted(MoveType::Adjustment, Some(strict.main), None, dec!(-2)).await;
    assert!(matches!(
        strict.service.approve(&strict.manager, m.id_typed()).await,
        Err(ServiceError::InsufficientStock { .. })
    ));

    let lenient = fixture_with(ServiceConfig {
        negative_stock: NegativeStockPolicy::AllowForAdjustments,
        ..ServiceConfig::default()
    });
    lenient.posted(MoveType::Adjustment, Some(lenient.main), None, dec!(-2)).await;
    assert_eq!(lenient.balance(lenient.main).await, dec!(-2));

    // The relaxation is for adjustments only.
    let issue = lenient.submitted(MoveType::Issue, Some(lenient.main), None, dec!(1)).await;
    assert!(matches!(
        lenient.service.approve(&lenient.manager, issue.id_typed()).await,
        Err(ServiceError::InsufficientStock { .. })
    ));
}

#[tokio::test]
async fn reject_requires_reason_and_records_it() {
    let f = fixture();
    let m = f.submitted(MoveType::Receipt, None, Some(f.main), dec!(1)).await;

    assert!(matches!(
        f.service.reject(&f.manager, m.id_typed(), "  ").await,
        Err(ServiceError::Validation(_))
    ));

    let rejected = f
        .service
        .reject(&f.manager, m.id_typed(), "wrong warehouse")
        .await
        .unwrap();
    assert_eq!(rejected.status(), MoveStatus::Cancelled);
    assert_eq!(rejected.reject_reason(), Some("wrong warehouse"));

    let history = f.service.history(m.id_typed()).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.status, MoveStatus::Cancelled);
    assert_eq!(last.reason.as_deref(), Some("wrong warehouse"));
    assert_eq!(last.actor_id, Some(f.manager.user_id));

    assert!(matches!(
        f.service.approve(&f.manager, m.id_typed()).await,
        Err(ServiceError::InvalidState(_))
    ));
    assert_eq!(f.balance(f.main).await, Decimal::ZERO);
}

#[tokio::test]
async fn transfer_into_the_same_warehouse_is_rejected_at_create() {
    let f = fixture();
    let err = f
        .service
        .create(&f.keeper, input(MoveType::Transfer, Some(f.main), Some(f.main), f.line(dec!(1))))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn unknown_warehouse_is_a_validation_error() {
    let f = fixture();
    let err = f
        .service
        .create(&f.keeper, input(MoveType::Receipt, None, Some(WarehouseId::new()), f.line(dec!(1))))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(msg) if msg.contains("unknown warehouse")));
}

#[tokio::test]
async fn gate_runs_before_the_state_machine() {
    let f = fixture();
    let m = f
        .service
        .create(&f.keeper, input(MoveType::Receipt, None, Some(f.main), f.line(dec!(1))))
        .await
        .unwrap();

    // Only the creator may submit, even another stock keeper of the branch.
    let other_keeper = Actor::new(UserId::new(), f.keeper.branch_id, vec![Role::StockKeeper]);
    assert!(matches!(
        f.service.submit(&other_keeper, m.id_typed()).await,
        Err(ServiceError::Forbidden(_))
    ));

    // A stock keeper cannot approve, even from draft where the transition is illegal anyway.
    assert!(matches!(
        f.service.approve(&f.keeper, m.id_typed()).await,
        Err(ServiceError::Forbidden(_))
    ));
    // An authorized manager gets the state error instead.
    assert!(matches!(
        f.service.approve(&f.manager, m.id_typed()).await,
        Err(ServiceError::InvalidState(_))
    ));

    f.service.submit(&f.keeper, m.id_typed()).await.unwrap();
    assert!(matches!(
        f.service.approve(&f.remote_manager, m.id_typed()).await,
        Err(ServiceError::Forbidden(_))
    ));

    let decision = f
        .service
        .explain(&f.remote_manager, m.id_typed(), MoveAction::Approve)
        .await
        .unwrap();
    assert!(!decision.granted);
    assert_eq!(decision.denial, Some(DenialKind::BranchMismatch));
}

#[tokio::test]
async fn receipts_authorize_against_the_destination_branch() {
    let f = fixture();
    let remote_keeper = Actor::new(UserId::new(), f.remote_manager.branch_id, vec![Role::StockKeeper]);
    let m = f
        .service
        .create(&remote_keeper, input(MoveType::Receipt, None, Some(f.remote), f.line(dec!(4))))
        .await
        .unwrap();
    f.service.submit(&remote_keeper, m.id_typed()).await.unwrap();

    assert!(matches!(
        f.service.approve(&f.manager, m.id_typed()).await,
        Err(ServiceError::Forbidden(_))
    ));
    f.service.approve(&f.remote_manager, m.id_typed()).await.unwrap();
    assert_eq!(f.balance(f.remote).await, dec!(4));
}

#[tokio::test]
async fn lines_can_only_be_replaced_in_draft() {
    let f = fixture();
    let m = f
        .service
        .create(&f.keeper, input(MoveType::Receipt, None, Some(f.main), f.line(dec!(1))))
        .await
        .unwrap();

    let replaced = f.service.replace_lines(m.id_typed(), f.line(dec!(7))).await.unwrap();
    assert_eq!(replaced.lines()[0].quantity, dec!(7));
    assert_eq!(replaced.version(), 2);

    assert!(matches!(
        f.service.replace_lines(m.id_typed(), Vec::new()).await,
        Err(ServiceError::Validation(_))
    ));

    f.service.submit(&f.keeper, m.id_typed()).await.unwrap();
    assert!(matches!(
        f.service.replace_lines(m.id_typed(), f.line(dec!(9))).await,
        Err(ServiceError::InvalidState(_))
    ));

    f.service.approve(&f.manager, m.id_typed()).await.unwrap();
    assert_eq!(f.balance(f.main).await, dec!(7));
}

#[tokio::test]
async fn any_caller_may_edit_a_draft_but_only_its_creator_submits() {
    let f = fixture();
    let m = f
        .service
        .create(&f.keeper, input(MoveType::Receipt, None, Some(f.main), f.line(dec!(1))))
        .await
        .unwrap();

    // Line edits carry no actor, so a manager of another branch is not stopped here.
    let edited = f.service.replace_lines(m.id_typed(), f.line(dec!(4))).await.unwrap();
    assert_eq!(edited.creator_id(), f.keeper.user_id);

    let err = f.service.submit(&f.remote_manager, m.id_typed()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let submitted = f.service.submit(&f.keeper, m.id_typed()).await.unwrap();
    assert_eq!(submitted.status(), MoveStatus::WaitingApproval);
    assert_eq!(submitted.lines()[0].quantity, dec!(4));
}

#[tokio::test]
async fn committed_events_are_published_in_order() {
    let f = fixture();
    let sub = f.service.bus().subscribe();

    let m = f.posted(MoveType::Receipt, None, Some(f.main), dec!(2)).await;

    let mut seen = Vec::new();
    let mut approved_payload = None;
    while let Ok(envelope) = sub.recv_timeout(Duration::from_millis(100)) {
        assert_eq!(envelope.aggregate_id(), *m.id_typed().as_uuid());
        seen.push((envelope.sequence_number(), envelope.event_type().to_string()));
        if envelope.event_type() == "inventory.stock_move.approved" {
            approved_payload = Some(envelope.payload().clone());
        }
    }
    assert_eq!(
        seen,
        vec![
            (1, "inventory.stock_move.created".to_string()),
            (2, "inventory.stock_move.submitted".to_string()),
            (3, "inventory.stock_move.approved".to_string()),
        ]
    );

    let payload = approved_payload.expect("approved event published");
    let deltas = payload["Approved"]["deltas"].as_array().unwrap();
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0]["quantity"], "2");
}

#[tokio::test]
async fn failed_transitions_publish_nothing() {
    let f = fixture();
    let m = f.submitted(MoveType::Issue, Some(f.main), None, dec!(1)).await;
    let sub = f.service.bus().subscribe();

    assert!(f.service.approve(&f.manager, m.id_typed()).await.is_err());
    assert!(sub.try_recv().is_err());
}

#[tokio::test]
async fn move_no_collisions_are_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let f = fixture();
    let service = StockMoveService::new(
        Arc::new(InMemoryStockStore::new()),
        Arc::new(InMemoryWarehouseDirectory::with_warehouses([(f.main, f.keeper.branch_id)])),
        Arc::new(InMemoryEventBus::<EventEnvelope<JsonValue>>::new()),
        ServiceConfig::default(),
    )
    .with_move_no_generator(move |_, _| {
        // The second create collides once, then gets a fresh number.
        let n = counter.fetch_add(1, Ordering::SeqCst);
        MoveNo::from_string(format!("RC-TEST-{}", if n < 2 { 0 } else { 1 }))
    });

    let first = service
        .create(&f.keeper, input(MoveType::Receipt, None, Some(f.main), f.line(dec!(1))))
        .await
        .unwrap();
    let second = service
        .create(&f.keeper, input(MoveType::Receipt, None, Some(f.main), f.line(dec!(1))))
        .await
        .unwrap();
    assert_eq!(first.move_no().as_str(), "RC-TEST-0");
    assert_eq!(second.move_no().as_str(), "RC-TEST-1");

    // Every attempt now collides.
    let err = service
        .create(&f.keeper, input(MoveType::Receipt, None, Some(f.main), f.line(dec!(1))))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 3 + ServiceConfig::default().move_no_max_attempts as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_post_exactly_once() {
    let f = fixture();
    let m = f.submitted(MoveType::Receipt, None, Some(f.main), dec!(10)).await;
    let move_id = m.id_typed();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = f.service.clone();
        let manager = f.manager.clone();
        handles.push(tokio::spawn(async move { service.approve(&manager, move_id).await }));
    }

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(ServiceError::InvalidState(_)) | Err(ServiceError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(f.balance(f.main).await, dec!(10));
    assert_eq!(f.service.get(move_id).await.unwrap().status(), MoveStatus::Posted);
}
