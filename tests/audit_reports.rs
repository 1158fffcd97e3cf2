use std::fs;
use std::path::Path;

use tempfile::tempdir;

use instruct_corpus::apps::{run_audit, run_sample};
use instruct_corpus::audit::{ViolationKind, audit_corpus, check_sample_files, count_corpus};
use instruct_corpus::{AuditConfig, DarkBand, GroupingSpec, Manifest, StratifiedConfig, stratified_sample};

/// Writes `count` records per `(category, source)` entry, interleaved.
fn write_corpus(path: &Path, mix: &[(&str, &str, usize)]) {
    let mut body = String::new();
    let longest = mix.iter().map(|(_, _, count)| *count).max().unwrap_or(0);
    for i in 0..longest {
        for (category, source, count) in mix {
            if i < *count {
                body.push_str(&format!(
                    "{{\"text\":\"{category} passage {i} from {source}\",\"_category\":\"{category}\",\"_source\":\"{source}\"}}\n"
                ));
            }
        }
    }
    fs::write(path, body).unwrap();
}

#[test]
fn manifest_lists_categories_and_top_sources() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.jsonl");
    write_corpus(
        &corpus,
        &[("chat", "oasst", 30), ("code", "stack", 50), ("chat", "sharegpt", 20)],
    );
    let config = AuditConfig {
        top_sources: 2,
        ..AuditConfig::default()
    };
    let manifest = audit_corpus(&corpus, &config, Some(0.1)).unwrap();
    assert_eq!(manifest.total_examples, 100);
    let categories: Vec<(&str, u64)> = manifest
        .categories
        .iter()
        .map(|(k, v)| (k.as_str(), *v))
        .collect();
    assert_eq!(categories, vec![("chat", 50), ("code", 50)]);
    let sources: Vec<&str> = manifest.top_sources.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(sources, vec!["stack", "oasst"]);
    assert_eq!(manifest.deduplication_rate, Some(0.1));
}

#[test]
fn grouping_and_dark_ratio_reports() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.jsonl");
    write_corpus(
        &corpus,
        &[("horror", "books", 16), ("noir", "books", 16), ("code", "stack", 68)],
    );
    let groups = dir.path().join("groups.json");
    fs::write(&groups, r#"{"dark": ["horror", "noir"], "technical": ["code", "math"]}"#).unwrap();

    let counts = count_corpus(&corpus).unwrap();
    let report = GroupingSpec::from_path(&groups).unwrap().report(&counts.categories);
    assert_eq!(report.groups["dark"].count, 32);
    assert_eq!(report.groups["technical"].count, 68);
    assert_eq!(report.ungrouped.count, 0);
    let dark = report.dark.unwrap();
    assert!((dark.percent - 32.0).abs() < 1e-9);
    assert_eq!(dark.band, DarkBand::Strong);
}

#[test]
fn stratified_sample_passes_the_distribution_check() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.jsonl");
    write_corpus(
        &corpus,
        &[
            ("chat", "oasst", 2_000),
            ("code", "stack", 1_200),
            ("math", "gsm", 600),
            ("poetry", "gutenberg", 150),
            ("rare", "misc", 50),
        ],
    );
    let sample_path = dir.path().join("sample.jsonl");
    let sample = stratified_sample(&corpus, &sample_path, StratifiedConfig::new(400)).unwrap();
    assert_eq!(sample.total, 4_000);
    assert_eq!(sample.sampled, 400);
    assert!(sample.check.passed(), "{:?}", sample.check.violations);

    let report = check_sample_files(&corpus, &sample_path, &AuditConfig::default()).unwrap();
    assert!(report.passed(), "{:?}", report.violations);
    assert_eq!(report.sample_total, 400);
    assert!(report.rows.iter().any(|row| row.category == "poetry" && row.sample_count > 0));
}

#[test]
fn distribution_check_flags_a_skewed_sample() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.jsonl");
    write_corpus(&corpus, &[("chat", "a", 500), ("code", "b", 500)]);
    let skewed = dir.path().join("skewed.jsonl");
    write_corpus(&skewed, &[("chat", "a", 10)]);

    let report = check_sample_files(&corpus, &skewed, &AuditConfig::default()).unwrap();
    assert!(!report.passed());
    assert!(
        report
            .violations
            .iter()
            .any(|v| v.category == "code" && v.kind == ViolationKind::Missing)
    );
}

#[test]
fn audit_and_sample_clis_write_outputs() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.jsonl");
    write_corpus(&corpus, &[("chat", "oasst", 300), ("code", "stack", 100)]);
    let sample = dir.path().join("sample.jsonl");
    let args = vec![
        corpus.display().to_string(),
        sample.display().to_string(),
        "--size".to_string(),
        "200".to_string(),
    ];
    run_sample(args.into_iter()).unwrap();
    assert_eq!(fs::read_to_string(&sample).unwrap().lines().count(), 200);

    let groups = dir.path().join("groups.json");
    fs::write(&groups, r#"{"technical": ["code"]}"#).unwrap();
    let manifest_out = dir.path().join("manifest.json");
    let args = vec![
        corpus.display().to_string(),
        "--groups".to_string(),
        groups.display().to_string(),
        "--manifest-out".to_string(),
        manifest_out.display().to_string(),
        "--dedup-rate".to_string(),
        "0.25".to_string(),
        "--sample".to_string(),
        sample.display().to_string(),
    ];
    run_audit(args.into_iter()).unwrap();
    let manifest = Manifest::read(&manifest_out).unwrap();
    assert_eq!(manifest.total_examples, 400);
    assert_eq!(manifest.deduplication_rate, Some(0.25));
}
