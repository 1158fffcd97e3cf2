use std::fs;
use std::io::Cursor;
use std::path::Path;

use serde_json::Value;
use tempfile::tempdir;

use instruct_corpus::apps::run_merge;
use instruct_corpus::{
    CanonicalRecord, JsonlSink, Manifest, MergeConfig, MergeEngine, NormalizerConfig,
    SourceSpec,
};

fn engine(min_len: usize) -> MergeEngine {
    MergeEngine::new(MergeConfig {
        normalizer: NormalizerConfig { min_len },
    })
}

fn one_line(line: &str) -> Cursor<Vec<u8>> {
    Cursor::new(format!("{line}\n").into_bytes())
}

fn read_lines(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn field_mapping_variants_collapse_to_one_record() {
    let b30 = "B".repeat(30);
    let inputs = vec![
        (
            SourceSpec::new("alpaca.jsonl", "general", "alpaca"),
            one_line(&format!(r#"{{"instruction":"A","output":"{b30}"}}"#)),
        ),
        (
            SourceSpec::new("qa.jsonl", "qa", "squad"),
            one_line(&format!(r#"{{"question":"A","answer":"{b30}"}}"#)),
        ),
        (
            SourceSpec::new("completions.jsonl", "general", "openai"),
            one_line(&format!(r#"{{"prompt":"A","completion":"{b30}"}}"#)),
        ),
    ];
    // "A" + 30 chars is below the default threshold, so lower the knob.
    let mut out: Vec<CanonicalRecord> = Vec::new();
    let stats = engine(20).merge_readers(inputs, &mut out).unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].instruction.as_deref(), Some("A"));
    assert_eq!(out[0].output.as_deref(), Some(b30.as_str()));
    assert_eq!(out[0].source, "alpaca");
    assert_eq!(stats.unique, 1);
    assert_eq!(stats.duplicates, 2);
    let manifest = stats.manifest(100);
    let rate = manifest.deduplication_rate.unwrap();
    assert!((rate - 2.0 / 3.0).abs() < 1e-12);
}

#[test]
fn conversation_shape_maps_first_two_turns() {
    let r60 = "R".repeat(60);
    let mut out: Vec<CanonicalRecord> = Vec::new();
    MergeEngine::default()
        .merge_readers(
            vec![(
                SourceSpec::new("sharegpt.jsonl", "chat", "sharegpt"),
                one_line(&format!(
                    r#"{{"conversations":[{{"value":"Q"}},{{"value":"{r60}"}}]}}"#
                )),
            )],
            &mut out,
        )
        .unwrap();
    assert_eq!(
        out,
        vec![CanonicalRecord {
            instruction: Some("Q".into()),
            input: None,
            output: Some(r60),
            text: None,
            category: "chat".into(),
            source: "sharegpt".into(),
        }]
    );
}

#[test]
fn too_short_records_are_rejected() {
    let mut out: Vec<CanonicalRecord> = Vec::new();
    let stats = MergeEngine::default()
        .merge_readers(
            vec![(
                SourceSpec::new("tiny.jsonl", "general", "tiny"),
                one_line(r#"{"instruction":"hi","output":"ok"}"#),
            )],
            &mut out,
        )
        .unwrap();
    assert!(out.is_empty());
    assert_eq!(stats.per_source["tiny"].skipped_short, 1);
    assert_eq!(stats.total_loaded, 0);
    assert_eq!(stats.deduplication_rate(), 0.0);
}

#[test]
fn preference_pairs_keep_chosen_and_drop_rejected() {
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("corpus.jsonl");
    let line = format!(
        r#"{{"prompt":"P","chosen":"{}","rejected":"{}"}}"#,
        "G".repeat(60),
        "BAD".repeat(60)
    );
    let mut sink = JsonlSink::create(&out_path).unwrap();
    MergeEngine::default()
        .merge_readers(
            vec![(SourceSpec::new("hh.jsonl", "chat", "hh_rlhf"), one_line(&line))],
            &mut sink,
        )
        .unwrap();
    drop(sink);

    let written = fs::read_to_string(&out_path).unwrap();
    assert!(written.contains(&"G".repeat(60)));
    assert!(!written.contains("BAD"));
    let records = read_lines(&out_path);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["instruction"], "P");
}

#[test]
fn directory_sources_read_shards_in_path_order_with_shared_cap() {
    let dir = tempdir().unwrap();
    let shards = dir.path().join("shards");
    fs::create_dir_all(shards.join("nested")).unwrap();
    let body = |tag: &str| format!("{{\"text\":\"passage from shard {tag} with enough words\"}}\n");
    fs::write(shards.join("b.jsonl"), body("b")).unwrap();
    fs::write(shards.join("a.jsonl"), body("a")).unwrap();
    fs::write(shards.join("nested").join("c.json"), body("c")).unwrap();
    fs::write(shards.join("notes.txt"), body("ignored")).unwrap();

    let mut out: Vec<CanonicalRecord> = Vec::new();
    let stats = engine(10)
        .merge(
            &[SourceSpec::new(&shards, "web", "crawl").with_max_records(2)],
            &mut out,
        )
        .unwrap();
    let texts: Vec<&str> = out.iter().filter_map(|r| r.text.as_deref()).collect();
    assert_eq!(
        texts,
        vec![
            "passage from shard a with enough words",
            "passage from shard b with enough words"
        ]
    );
    let crawl = &stats.per_source["crawl"];
    assert_eq!(crawl.files, 2);
    assert!(crawl.truncated);
}

#[test]
fn repeated_source_id_keeps_separate_caps_for_each_path() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("first.jsonl");
    let second = dir.path().join("second.jsonl");
    let body = |tag: &str, n: usize| -> String {
        (1..=n)
            .map(|i| format!("{{\"text\":\"{tag} passage number {i} with enough words\"}}\n"))
            .collect()
    };
    fs::write(&first, body("first", 3)).unwrap();
    fs::write(&second, body("second", 2)).unwrap();

    let mut out: Vec<CanonicalRecord> = Vec::new();
    let stats = engine(10)
        .merge(
            &[
                SourceSpec::new(&first, "chat", "alpaca").with_max_records(2),
                SourceSpec::new(&second, "code", "alpaca").with_max_records(2),
            ],
            &mut out,
        )
        .unwrap();
    let per_category: Vec<&str> = out.iter().map(|r| r.category.as_str()).collect();
    assert_eq!(per_category, vec!["chat", "chat", "code", "code"]);
    assert_eq!(stats.unique, 4);
    assert_eq!(stats.per_source["alpaca"].retained, 4);
}

#[test]
fn merge_cli_reads_plan_and_writes_manifest() {
    let dir = tempdir().unwrap();
    let alpaca = dir.path().join("alpaca.jsonl");
    let dolly = dir.path().join("dolly.jsonl");
    let answer = "An answer long enough to pass the default length threshold.";
    fs::write(
        &alpaca,
        format!(
            "{{\"instruction\":\"One\",\"output\":\"{answer}\"}}\nnot json at all\n{{\"instruction\":\"Two\",\"output\":\"{answer}\"}}\n"
        ),
    )
    .unwrap();
    fs::write(
        &dolly,
        format!("{{\"question\":\"One\",\"answer\":\"{answer}\"}}\n"),
    )
    .unwrap();
    let plan = dir.path().join("plan.json");
    fs::write(
        &plan,
        serde_json::to_string(&vec![SourceSpec::new(&alpaca, "general", "alpaca")]).unwrap(),
    )
    .unwrap();
    let output = dir.path().join("out").join("corpus.jsonl");
    let manifest_path = dir.path().join("out").join("manifest.json");

    let args = vec![
        "--plan".to_string(),
        plan.display().to_string(),
        "--source".to_string(),
        format!("{},qa,dolly", dolly.display()),
        "--output".to_string(),
        output.display().to_string(),
        "--manifest".to_string(),
        manifest_path.display().to_string(),
    ];
    run_merge(args.into_iter()).unwrap();

    assert_eq!(read_lines(&output).len(), 2);
    let manifest = Manifest::read(&manifest_path).unwrap();
    assert_eq!(manifest.total_examples, 2);
    assert_eq!(manifest.category("general"), Some(2));
    assert_eq!(manifest.source("alpaca"), Some(2));
    assert!((manifest.deduplication_rate.unwrap() - 1.0 / 3.0).abs() < 1e-12);
}

#[test]
fn merge_cli_without_sources_fails() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("corpus.jsonl");
    let args = vec!["--output".to_string(), output.display().to_string()];
    assert!(run_merge(args.into_iter()).is_err());
}
