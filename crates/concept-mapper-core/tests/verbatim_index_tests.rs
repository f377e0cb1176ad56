//! Verbatim index build, merge and snapshot properties.

use std::collections::HashSet;

use concept_mapper_core::models::TermRecord;
use concept_mapper_core::terms::{batch_file_name, write_term_file};
use concept_mapper_core::verbatim::{
    build_pool, normalize_records, IndexBuilder, IndexSettings, IndexSnapshot, TermNormalizer,
    VerbatimIndex, VerbatimMapper,
};
use proptest::prelude::*;

const TERMS: &[&str] = &[
    "Liver disorder",
    "Liver-Disorders",
    "Disorder of liver",
    "Myocardial infarction",
    "Myocardial infarctions",
    "Heart attack",
    "Asthma",
    "Asthmatic bronchitis",
    "Prinzmetal's angina",
    "Prinzmetal angina",
];

const NAME_SUFFIXES: &[&str] = &["A", "B"];

fn record_strategy() -> impl Strategy<Value = TermRecord> {
    (1i64..8, prop::sample::select(TERMS), prop::sample::select(NAME_SUFFIXES))
        .prop_map(|(id, term, suffix)| TermRecord::new(id, term, format!("Concept {}{}", id, suffix)))
}

fn build(records: &[TermRecord]) -> VerbatimIndex {
    let pool = build_pool(2).unwrap();
    normalize_records(records, &TermNormalizer::new(), &pool, None).build()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_build_is_order_independent(
        (records, shuffled) in prop::collection::vec(record_strategy(), 0..30)
            .prop_flat_map(|records| (Just(records.clone()), Just(records).prop_shuffle()))
    ) {
        prop_assert_eq!(build(&records), build(&shuffled));
    }

    #[test]
    fn prop_split_merge_equals_whole(
        records in prop::collection::vec(record_strategy(), 0..30),
        split in 0usize..30,
    ) {
        let split = split.min(records.len());
        let pool = build_pool(2).unwrap();
        let normalizer = TermNormalizer::new();

        // Second half first, to mimic a worker finishing early.
        let mut merged = normalize_records(&records[split..], &normalizer, &pool, None);
        merged.merge(normalize_records(&records[..split], &normalizer, &pool, None));

        prop_assert_eq!(merged.build(), build(&records));
    }

    #[test]
    fn prop_buckets_have_distinct_concept_ids(records in prop::collection::vec(record_strategy(), 0..40)) {
        let index = build(&records);
        for (key, bucket) in index.iter() {
            let ids: HashSet<i64> = bucket.iter().map(|c| c.concept_id).collect();
            prop_assert_eq!(ids.len(), bucket.len(), "duplicate concept in bucket '{}'", key);
        }
    }

    #[test]
    fn prop_every_concept_is_retrievable(records in prop::collection::vec(record_strategy(), 1..30)) {
        let mapper = VerbatimMapper::build(&records, 2).unwrap();
        for record in &records {
            let hits = mapper.lookup(&record.term);
            prop_assert!(
                hits.iter().any(|c| c.concept_id == record.concept_id),
                "concept {} not found via '{}'", record.concept_id, record.term
            );
        }
    }
}

#[test]
fn test_variants_share_bucket() {
    let records = vec![
        TermRecord::new(1, "Liver disorder", "Liver disorder"),
        TermRecord::new(1, "Liver-Disorders", "Liver disorder"),
        TermRecord::new(2, "Prinzmetal's angina", "Prinzmetal angina"),
        TermRecord::new(2, "Prinzmetal angina", "Prinzmetal angina"),
    ];
    let index = build(&records);

    assert_eq!(index.len(), 2);
    assert_eq!(index.get("liver disorder").len(), 1);
    assert_eq!(index.get("prinzmetal angina").len(), 1);
}

#[test]
fn test_whole_builder_from_pairs() {
    let normalizer = TermNormalizer::new();
    let builder: IndexBuilder = TERMS
        .iter()
        .enumerate()
        .map(|(i, term)| {
            (
                normalizer.normalize(term),
                concept_mapper_core::Concept::new(i as i64, *term),
            )
        })
        .collect();
    let index = builder.build();

    // "Liver disorder"/"Liver-Disorders", infarction(s) and Prinzmetal variants collapse.
    assert_eq!(index.len(), TERMS.len() - 3);
}

#[test]
fn test_snapshot_reused_without_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let terms_folder = dir.path().join("terms");
    let records: Vec<TermRecord> = TERMS
        .iter()
        .enumerate()
        .map(|(i, term)| TermRecord::new(i as i64 + 1, *term, *term))
        .collect();
    write_term_file(&terms_folder.join(batch_file_name(1, 5)), &records[..5]).unwrap();
    write_term_file(&terms_folder.join(batch_file_name(6, 10)), &records[5..]).unwrap();

    let settings = IndexSettings {
        snapshot_file: dir.path().join("verbatim.bin"),
        terms_folder: terms_folder.clone(),
        max_cores: 0,
        show_progress: false,
    };

    let built = VerbatimMapper::load_or_build(&settings).unwrap();
    assert_eq!(built.index(), &build(&records));

    // Adding a new term file does not change a loaded snapshot.
    write_term_file(
        &terms_folder.join(batch_file_name(11, 11)),
        &[TermRecord::new(99, "Gout", "Gout")],
    )
    .unwrap();
    let loaded = VerbatimMapper::load_or_build(&settings).unwrap();
    assert!(loaded.lookup("gout").is_empty());

    let snapshot = IndexSnapshot::load(&settings.snapshot_file).unwrap();
    assert_eq!(snapshot.index, *built.index());
}
