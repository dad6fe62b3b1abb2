// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{Duration, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use step_rally::models::{Participant, StepsData, SyncStatus};
use step_rally::services::leaderboard::{classify_row, rank_rows};

fn make_participant(i: usize) -> Participant {
    Participant {
        participant_id: format!("participant-{}", i),
        name: format!("Runner {}", i),
        email: format!("runner{}@example.test", i),
        photo_url: None,
        gender: None,
        google_tokens: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn make_steps(i: usize, now: chrono::DateTime<chrono::Utc>) -> StepsData {
    StepsData {
        participant_id: format!("participant-{}", i),
        steps: ((i * 997) % 20_000) as i64,
        daily_steps: Vec::new(),
        status: if i % 7 == 0 {
            SyncStatus::Refreshing
        } else {
            SyncStatus::Ready
        },
        error_message: None,
        token_expired: false,
        last_synced_at: Some(now - Duration::minutes((i % 45) as i64)),
        refresh_started_at: Some(now - Duration::seconds((i % 120) as i64)),
        daily_steps_updated_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn bench_classify_and_rank(c: &mut Criterion) {
    let now = Utc::now();
    let participants: Vec<Participant> = (0..1000).map(make_participant).collect();
    let metrics: Vec<StepsData> = (0..1000).map(|i| make_steps(i, now)).collect();
    let throttle = Duration::minutes(30);

    c.bench_function("classify_and_rank_1000", |b| {
        b.iter(|| {
            let rows: Vec<_> = participants
                .iter()
                .zip(metrics.iter())
                .map(|(p, m)| classify_row(p, Some(m), throttle, now).row)
                .collect();
            black_box(rank_rows(rows, 100))
        })
    });
}

criterion_group!(benches, bench_classify_and_rank);
criterion_main!(benches);
