//! # Tuition Ledger Benchmarks
//!
//! | Area | Operation |
//! |------|-----------|
//! | Position rules | `determine_position` over a package's segments |
//! | SQL layer | rendering a locked select to `$n` SQL |
//! | In-memory engine | one full `grant_segment` request |

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use entitlement_ledger::domain::position::determine_position;
use entitlement_ledger::sql::tables::STUDENT_PACKAGE_ORDER;
use entitlement_ledger::sql::{Predicate, RowLock, Select, SortOrder, Statement};
use entitlement_ledger::{
    EntitlementService, FixedTimeSource, GrantRequest, InMemoryDatabase, LedgerConfig,
    LedgerStores, RequestContext, StudentPackageOrder,
};
use shared_types::{TimeWindow, Timestamp};
use std::sync::Arc;

fn base() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// `n` back-to-back 30-day segments, the first one current.
fn segments(n: usize) -> Vec<StudentPackageOrder> {
    (0..n)
        .map(|i| {
            let start = base() + Duration::days(31 * i as i64);
            StudentPackageOrder {
                student_package_order_id: format!("seg-{}", i),
                student_package_id: "sp-1".into(),
                start_at: start,
                end_at: start + Duration::days(30),
                is_current_student_package: i == 0,
                ..Default::default()
            }
        })
        .collect()
}

fn bench_determine_position(c: &mut Criterion) {
    let mut group = c.benchmark_group("position");
    for n in [4usize, 32, 256] {
        let existing = segments(n);
        let start = base() + Duration::days(31 * n as i64);
        let candidate = TimeWindow::new(start, start + Duration::days(30)).unwrap();
        group.bench_with_input(BenchmarkId::new("determine_position", n), &existing, |b, s| {
            b.iter(|| determine_position(black_box(&candidate), None, black_box(s), base()))
        });
    }
    group.finish();
}

fn bench_render_select(c: &mut Criterion) {
    let stmt: Statement = Select::table(&STUDENT_PACKAGE_ORDER)
        .filter(Predicate::eq("student_package_id", "sp-1"))
        .filter(Predicate::Le("start_at", base().into()))
        .filter(Predicate::Ge("end_at", base().into()))
        .active()
        .order_by("start_at", SortOrder::Asc)
        .limit(1)
        .lock(RowLock::ForNoKeyUpdate)
        .into();
    c.bench_function("sql/render_locked_select", |b| b.iter(|| black_box(&stmt).to_sql()));
}

fn bench_grant_segment(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let clock = Arc::new(FixedTimeSource::new(base() + Duration::days(10)));
    let service = EntitlementService::new(
        LedgerStores::new(clock.clone(), &LedgerConfig::default()),
        clock,
    );
    let ctx = RequestContext::background();

    c.bench_function("engine/grant_segment_new_head", |b| {
        b.iter(|| {
            let db = InMemoryDatabase::new();
            let request = GrantRequest {
                student_id: "stu-1".into(),
                student_package_id: Some("sp-1".into()),
                order_id: "ord-1".into(),
                course_id: "c-1".into(),
                location_ids: vec!["loc-1".into()],
                start_at: base(),
                end_at: base() + Duration::days(30),
                flow: "bench".into(),
                ..Default::default()
            };
            rt.block_on(service.grant_segment(&ctx, &db, &request)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_determine_position,
    bench_render_select,
    bench_grant_segment
);
criterion_main!(benches);
