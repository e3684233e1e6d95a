//! Benchmarks for the snapshot aggregation pipeline.

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rollcall_core::engine::{
    compose_report, compute_demographics, compute_engagement, compute_live_occupancy, find_divergences,
    SearchFilter,
};
use rollcall_core::model::{
    Activity, ActivityDraft, AttendanceLogEntry, EntryId, EventId, Location, Participant,
    ParticipantCategory,
};

const GROUPS: [&str; 6] = ["Oakview", "Grace Chapel", "Lakeside", "Hillcrest", "Riverbend", "St. Mark's"];

struct Fixture {
    activities: Vec<Activity>,
    participants: Vec<Participant>,
    ledger: Vec<AttendanceLogEntry>,
}

fn build_fixture(participants: usize, activities: usize, visits_per_participant: usize) -> Fixture {
    let event_id = EventId::new();
    let start = Utc::now();
    let activities: Vec<Activity> = (0..activities)
        .map(|i| ActivityDraft::new(format!("Activity {i:02}"), "Hall").into_activity(event_id))
        .collect();

    let mut roster = Vec::with_capacity(participants);
    let mut ledger = Vec::with_capacity(participants * visits_per_participant);
    let mut sequence = 0u64;

    for i in 0..participants {
        let category = if i % 8 == 0 { ParticipantCategory::Leader } else { ParticipantCategory::Student };
        let mut p = Participant::new(event_id, format!("Camper {i:05}"), GROUPS[i % GROUPS.len()], category, format!("QR-{i}"));

        for v in 0..visits_per_participant {
            sequence += 1;
            let activity = (v % 4 != 3).then(|| activities[(i + v) % activities.len()].id);
            ledger.push(AttendanceLogEntry {
                id: EntryId::new(),
                event_id,
                participant_id: p.id,
                activity_id: activity,
                timestamp: start + Duration::seconds(sequence as i64),
                sequence,
            });
            p.location = Location::from(activity);
        }
        roster.push(p);
    }

    Fixture {
        activities,
        participants: roster,
        ledger,
    }
}

fn bench_live_occupancy(c: &mut Criterion) {
    let mut group = c.benchmark_group("live_occupancy");
    for size in [100, 1_000, 10_000] {
        let fixture = build_fixture(size, 20, 1);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &fixture, |b, f| {
            b.iter(|| black_box(compute_live_occupancy(&f.participants, &f.activities)));
        });
    }
    group.finish();
}

fn bench_engagement(c: &mut Criterion) {
    let mut group = c.benchmark_group("engagement");
    for size in [1_000, 10_000] {
        let fixture = build_fixture(size, 20, 8);
        group.throughput(Throughput::Elements(fixture.ledger.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &fixture, |b, f| {
            b.iter(|| black_box(compute_engagement(&f.ledger, &f.activities)));
        });
    }
    group.finish();
}

fn bench_full_report(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_report");
    for size in [500, 5_000] {
        let fixture = build_fixture(size, 30, 6);
        let filter = SearchFilter::new("grace");
        group.bench_with_input(BenchmarkId::from_parameter(size), &fixture, |b, f| {
            b.iter(|| {
                let live = compute_live_occupancy(&f.participants, &f.activities);
                let engagement = compute_engagement(&f.ledger, &f.activities);
                let demographics = compute_demographics(&f.participants);
                black_box(compose_report(
                    &f.activities,
                    &f.participants,
                    &live,
                    &engagement,
                    &demographics,
                    &filter,
                ))
            });
        });
    }
    group.finish();
}

fn bench_divergence_scan(c: &mut Criterion) {
    let fixture = build_fixture(5_000, 30, 6);
    c.bench_function("find_divergences_5000", |b| {
        b.iter(|| black_box(find_divergences(&fixture.participants, &fixture.activities, &fixture.ledger)));
    });
}

criterion_group!(
    benches,
    bench_live_occupancy,
    bench_engagement,
    bench_full_report,
    bench_divergence_scan
);
criterion_main!(benches);
