#![allow(clippy::unwrap_used, missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ensemble_core::{CollaborationMode, TaskCategory};
use ensemble_orchestrator::{
    CacheConfig, CachedAnswer, Fingerprint, QualityScore, ResponseCache, TaskClassifier,
};

const PROMPT: &str = "Debug the failing login handler: the session token check throws \
    a null pointer exception after the last refactor of the auth module";

fn bench_classify(c: &mut Criterion) {
    let classifier = TaskClassifier::new();
    c.bench_function("classify", |b| {
        b.iter(|| classifier.classify(black_box(PROMPT), Some("rust service, staging")));
    });
}

fn bench_fingerprint(c: &mut Criterion) {
    c.bench_function("fingerprint", |b| {
        b.iter(|| {
            Fingerprint::compute(
                black_box(PROMPT),
                None,
                TaskCategory::Debugging,
                CollaborationMode::None,
            )
        });
    });
}

fn bench_near_duplicate_lookup(c: &mut Criterion) {
    let cache = ResponseCache::new(&CacheConfig::default()).unwrap();
    let quality = QualityScore {
        relevance: 1.0,
        completeness: 1.0,
        consistency: 1.0,
        composite: 1.0,
    };
    for i in 0..64 {
        let prompt = format!("{PROMPT} variant {i}");
        let query = cache.query(&prompt, None, TaskCategory::Debugging, CollaborationMode::None);
        cache.store(
            &query,
            CachedAnswer {
                text: format!("Answer {i}."),
                contributing_agents: vec!["a".into()],
                confidence: 0.9,
            },
            quality,
        );
    }
    let query = cache.query(
        &format!("{PROMPT} variant 999"),
        None,
        TaskCategory::Debugging,
        CollaborationMode::None,
    );
    c.bench_function("near_duplicate_lookup", |b| {
        b.iter(|| cache.lookup(black_box(&query)));
    });
}

criterion_group!(
    benches,
    bench_classify,
    bench_fingerprint,
    bench_near_duplicate_lookup
);
criterion_main!(benches);
