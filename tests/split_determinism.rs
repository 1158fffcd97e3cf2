use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tempfile::tempdir;

use instruct_corpus::apps::run_split;
use instruct_corpus::{SplitConfig, split_corpus};

fn write_corpus(path: &Path, records: usize) {
    let mut body = String::new();
    for i in 0..records {
        body.push_str(&format!(
            "{{\"instruction\":\"Task {i}\",\"output\":\"Answer {i}\",\"_category\":\"general\",\"_source\":\"synthetic\"}}\n"
        ));
    }
    fs::write(path, body).unwrap();
}

fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn deterministic_split_of_one_hundred_records() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.jsonl");
    write_corpus(&corpus, 100);
    let config = SplitConfig {
        train_ratio: 0.95,
        seed: 42,
    };

    let (train_a, val_a) = (dir.path().join("a_train.jsonl"), dir.path().join("a_val.jsonl"));
    let stats = split_corpus(&corpus, &train_a, &val_a, config).unwrap();
    assert_eq!(stats.total, 100);
    assert_eq!(stats.train, 95);
    assert_eq!(stats.validation, 5);
    assert_eq!(lines(&train_a).len(), 95);
    assert_eq!(lines(&val_a).len(), 5);

    let (train_b, val_b) = (dir.path().join("b_train.jsonl"), dir.path().join("b_val.jsonl"));
    split_corpus(&corpus, &train_b, &val_b, config).unwrap();
    assert_eq!(fs::read(&train_a).unwrap(), fs::read(&train_b).unwrap());
    assert_eq!(fs::read(&val_a).unwrap(), fs::read(&val_b).unwrap());
}

#[test]
fn split_is_total_and_disjoint_and_keeps_original_lines() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.jsonl");
    write_corpus(&corpus, 37);
    fs::write(
        &corpus,
        format!("{}\nnot a record\n", fs::read_to_string(&corpus).unwrap()),
    )
    .unwrap();
    let train = dir.path().join("train.jsonl");
    let val = dir.path().join("val.jsonl");
    let stats = split_corpus(&corpus, &train, &val, SplitConfig::default()).unwrap();
    assert_eq!(stats.malformed, 1);

    let original: HashSet<String> = lines(&corpus)
        .into_iter()
        .filter(|line| line.starts_with('{'))
        .collect();
    let train_lines: HashSet<String> = lines(&train).into_iter().collect();
    let val_lines: HashSet<String> = lines(&val).into_iter().collect();
    assert_eq!(train_lines.len() + val_lines.len(), original.len());
    assert!(train_lines.is_disjoint(&val_lines));
    let union: HashSet<String> = train_lines.union(&val_lines).cloned().collect();
    assert_eq!(union, original);
}

#[test]
fn different_seeds_produce_different_orders() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.jsonl");
    write_corpus(&corpus, 50);
    let run = |seed: u64, tag: &str| {
        let train = dir.path().join(format!("{tag}_train.jsonl"));
        let val = dir.path().join(format!("{tag}_val.jsonl"));
        split_corpus(
            &corpus,
            &train,
            &val,
            SplitConfig {
                train_ratio: 0.8,
                seed,
            },
        )
        .unwrap();
        lines(&train)
    };
    assert_ne!(run(1, "one"), run(2, "two"));
}

#[test]
fn split_cli_uses_positional_paths_and_flags() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.jsonl");
    write_corpus(&corpus, 10);
    let train = dir.path().join("train.jsonl");
    let val = dir.path().join("val.jsonl");
    let args = vec![
        corpus.display().to_string(),
        train.display().to_string(),
        val.display().to_string(),
        "--ratio".to_string(),
        "0.5".to_string(),
        "--seed".to_string(),
        "7".to_string(),
    ];
    run_split(args.into_iter()).unwrap();
    assert_eq!(lines(&train).len(), 5);
    assert_eq!(lines(&val).len(), 5);

    let bad = vec![
        corpus.display().to_string(),
        train.display().to_string(),
        val.display().to_string(),
        "--ratio".to_string(),
        "1.5".to_string(),
    ];
    assert!(run_split(bad.into_iter()).is_err());
}

#[test]
fn missing_corpus_is_an_error() {
    let dir = tempdir().unwrap();
    let result = split_corpus(
        &dir.path().join("absent.jsonl"),
        &dir.path().join("t.jsonl"),
        &dir.path().join("v.jsonl"),
        SplitConfig::default(),
    );
    assert!(result.is_err());
}
