//! Property tests for the scoring engine
//!
//! Scoring is pure, so these run without a runtime: fixed inputs and a fixed
//! timestamp fully determine every score.

use chrono::{Duration, TimeZone, Utc};
use cortex::memory::scoring::{
    composite_score, cosine_similarity, recency_score, score_item, semantic_score,
};
use cortex::{AgentRole, ImportanceSignal, MemoryId, MemoryItem, MemoryTier};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn any_strategy() -> impl proptest::strategy::Strategy<Value = cortex::Strategy> {
    prop_oneof![
        Just(cortex::Strategy::Balanced),
        Just(cortex::Strategy::Recency),
        Just(cortex::Strategy::Importance),
    ]
}

fn any_signals() -> impl proptest::strategy::Strategy<Value = BTreeSet<ImportanceSignal>> {
    proptest::collection::btree_set(
        prop_oneof![
            Just(ImportanceSignal::UserExplicit),
            Just(ImportanceSignal::Decision),
            Just(ImportanceSignal::ErrorCorrection),
            Just(ImportanceSignal::Preference),
            Just(ImportanceSignal::Repetition),
        ],
        0..=5,
    )
}

fn item(signals: BTreeSet<ImportanceSignal>, embedding: Vec<f32>, age_hours: i64) -> MemoryItem {
    let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    MemoryItem {
        id: MemoryId::new(),
        content: "fixture".to_string(),
        embedding,
        tier: MemoryTier::Working,
        created_at: now - Duration::hours(age_hours),
        last_access: now - Duration::hours(age_hours),
        signals,
        owner: AgentRole::Brain,
    }
}

proptest! {
    /// Cosine similarity is symmetric and bounded in [-1, 1].
    #[test]
    fn cosine_symmetric_and_bounded(
        a in proptest::collection::vec(-10.0f32..10.0, 4),
        b in proptest::collection::vec(-10.0f32..10.0, 4),
    ) {
        let ab = cosine_similarity(&a, &b);
        let ba = cosine_similarity(&b, &a);
        prop_assert!((ab - ba).abs() < 1e-5);
        prop_assert!((-1.0 - 1e-5..=1.0 + 1e-5).contains(&ab));
    }

    /// The semantic component always lands in [0, 1].
    #[test]
    fn semantic_in_unit_interval(
        a in proptest::collection::vec(-10.0f32..10.0, 4),
        b in proptest::collection::vec(-10.0f32..10.0, 4),
    ) {
        let s = semantic_score(&a, &b);
        prop_assert!((-1e-5..=1.0 + 1e-5).contains(&s));
    }

    /// Recency strictly decreases with age and halves every 7 days.
    #[test]
    fn recency_decreasing_with_half_life(hours in 1i64..2000) {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let younger = recency_score(now - Duration::hours(hours), now);
        let older = recency_score(now - Duration::hours(hours + 1), now);
        prop_assert!(older < younger);

        let week_apart = recency_score(now - Duration::hours(hours) - Duration::days(7), now);
        prop_assert!((week_apart - younger / 2.0).abs() < 1e-5);
    }

    /// Importance is a capped sum: in [0, 1] for every signal subset, and
    /// monotone under adding signals.
    #[test]
    fn importance_capped_and_monotone(signals in any_signals()) {
        let base = item(signals.clone(), vec![1.0, 0.0], 0);
        prop_assert!((0.0..=1.0).contains(&base.importance()));

        let mut extended = signals;
        extended.insert(ImportanceSignal::UserExplicit);
        let bigger = item(extended, vec![1.0, 0.0], 0);
        prop_assert!(bigger.importance() >= base.importance());
    }

    /// Composite scores stay inside [0, 1] whenever components do.
    #[test]
    fn composite_in_unit_interval(
        semantic in 0.0f32..=1.0,
        recency in 0.0f32..=1.0,
        importance in 0.0f32..=1.0,
        strategy in any_strategy(),
    ) {
        let score = composite_score(semantic, recency, importance, strategy);
        prop_assert!((-1e-5..=1.0 + 1e-5).contains(&score));
    }

    /// For a fixed timestamp, scoring is a pure function of its inputs.
    #[test]
    fn scoring_is_deterministic(
        signals in any_signals(),
        query in proptest::collection::vec(-1.0f32..1.0, 2),
        age_hours in 0i64..1000,
        strategy in any_strategy(),
    ) {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let fixture = item(signals, vec![0.6, 0.8], age_hours);
        let first = score_item(&fixture, &query, strategy, now);
        let second = score_item(&fixture, &query, strategy, now);
        prop_assert_eq!(first.to_bits(), second.to_bits());
    }

    /// Older last-access never scores higher under the recency strategy when
    /// everything else is equal.
    #[test]
    fn recency_strategy_orders_by_age(young in 0i64..500, extra in 1i64..500) {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let query = vec![0.6, 0.8];
        let newer = item(BTreeSet::new(), vec![0.6, 0.8], young);
        let older = item(BTreeSet::new(), vec![0.6, 0.8], young + extra);
        let newer_score = score_item(&newer, &query, cortex::Strategy::Recency, now);
        let older_score = score_item(&older, &query, cortex::Strategy::Recency, now);
        prop_assert!(newer_score > older_score);
    }
}
