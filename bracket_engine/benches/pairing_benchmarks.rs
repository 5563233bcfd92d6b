use bracket_engine::bracket::{
    QualificationAttempt, QualifierTieBreaker, compute_round_winners, fold_pairs,
    qualifier::rank_attempts, seed_order,
};
use chrono::Utc;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::collections::HashMap;
use std::hint::black_box;

/// Helper to build a field of `n` entrants
fn field(n: i64) -> Vec<i64> {
    (1..=n).collect()
}

/// Helper to build `per_user` qualification attempts for `users` entrants
fn attempts(users: i64, per_user: i64) -> Vec<QualificationAttempt> {
    let now = Utc::now();
    (0..users * per_user)
        .map(|i| QualificationAttempt {
            id: i,
            tournament_id: 1,
            user_id: i % users + 1,
            score: (i * 7919) % 100,
            duration_secs: (i * 104_729) % 600,
            answers: serde_json::Value::Null,
            submitted_at: now,
        })
        .collect()
}

/// Benchmark fold pairing across bracket sizes
fn bench_fold_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold_pairs");
    for size in [4i64, 8, 16, 32, 33] {
        let entrants = field(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &entrants, |b, e| {
            b.iter(|| fold_pairs(black_box(e)));
        });
    }
    group.finish();
}

/// Benchmark seeding a fully ranked field
fn bench_seed_order(c: &mut Criterion) {
    let entrants = field(32);
    let ranks: HashMap<i64, u32> = entrants
        .iter()
        .rev()
        .enumerate()
        .map(|(i, user)| (*user, i as u32 + 1))
        .collect();

    c.bench_function("seed_order_32", |b| {
        b.iter(|| seed_order(black_box(&entrants), black_box(&ranks)));
    });
}

/// Benchmark qualifier ranking with several attempts per user
fn bench_rank_attempts(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank_attempts");
    for users in [16i64, 64, 256] {
        let all = attempts(users, 5);
        group.bench_with_input(BenchmarkId::from_parameter(users), &all, |b, a| {
            b.iter(|| rank_attempts(black_box(a), QualifierTieBreaker::Duration));
        });
    }
    group.finish();
}

/// Benchmark winner set computation for an empty round with byes
fn bench_round_winners(c: &mut Criterion) {
    let byes = field(16);
    c.bench_function("round_winners_byes_16", |b| {
        b.iter(|| compute_round_winners(black_box(&[]), black_box(&byes)));
    });
}

criterion_group!(
    benches,
    bench_fold_pairs,
    bench_seed_order,
    bench_rank_attempts,
    bench_round_winners
);
criterion_main!(benches);
