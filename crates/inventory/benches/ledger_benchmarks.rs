use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use rust_decimal::Decimal;
use stockflow_core::{Aggregate, ProductId, StockMoveId, UserId, WarehouseId};
use stockflow_inventory::{
    Approve, BalanceDelta, BalanceKey, CreateMove, MoveNo, MoveType, NewLine, StockMove,
    StockMoveCommand, Submit, WarehouseRefs, assign_lines, post_deltas,
};
use std::collections::HashMap;

fn seeded_book(keys: &[BalanceKey], qty: i64) -> HashMap<BalanceKey, Decimal> {
    keys.iter().map(|k| (*k, Decimal::from(qty))).collect()
}

fn bench_post_deltas(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_post_deltas");

    for line_count in [1usize, 10, 100, 1000].iter() {
        let warehouse_id = WarehouseId::new();
        let keys: Vec<BalanceKey> = (0..*line_count)
            .map(|_| BalanceKey::new(warehouse_id, ProductId::new()))
            .collect();
        let deltas: Vec<BalanceDelta> = keys
            .iter()
            .map(|k| BalanceDelta::new(k.warehouse_id, k.product_id, Decimal::from(-1)))
            .collect();

        group.throughput(Throughput::Elements(*line_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(line_count),
            line_count,
            |b, _| {
                let base = seeded_book(&keys, 1_000_000);
                b.iter(|| {
                    let mut book = base.clone();
                    post_deltas(&mut book, black_box(&deltas), false).unwrap();
                    black_box(book);
                });
            },
        );
    }

    group.finish();
}

fn bench_approval_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("stock_move_lifecycle");
    group.sample_size(500);

    let from = WarehouseId::new();
    let to = WarehouseId::new();
    let creator = UserId::new();
    let lines: Vec<NewLine> = (0..10)
        .map(|_| NewLine::new(ProductId::new(), Decimal::from(5), "pcs"))
        .collect();

    group.bench_function("transfer_create_submit_approve", |b| {
        b.iter(|| {
            let now = Utc::now();
            let move_id = StockMoveId::new();
            let mut stock_move = StockMove::empty(move_id);

            let commands = [
                StockMoveCommand::Create(CreateMove {
                    move_id,
                    move_no: MoveNo::generate(MoveType::Transfer, now),
                    move_type: MoveType::Transfer,
                    move_date: now.date_naive(),
                    warehouses: WarehouseRefs::new(Some(from), Some(to)),
                    reference_type: None,
                    reference_id: None,
                    lines: assign_lines(lines.clone()),
                    note: None,
                    creator_id: creator,
                    occurred_at: now,
                }),
                StockMoveCommand::Submit(Submit {
                    move_id,
                    submitted_by: creator,
                    occurred_at: now,
                }),
                StockMoveCommand::Approve(Approve {
                    move_id,
                    approved_by: UserId::new(),
                    occurred_at: now,
                }),
            ];

            for cmd in &commands {
                let events = stock_move.handle(cmd).unwrap();
                for e in &events {
                    stock_move.apply(e);
                }
            }
            black_box(stock_move);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_post_deltas, bench_approval_lifecycle);
criterion_main!(benches);
