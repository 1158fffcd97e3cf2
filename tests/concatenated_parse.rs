use std::fs;
use std::io::Cursor;

use tempfile::tempdir;

use instruct_corpus::apps::run_parse_concatenated;
use instruct_corpus::{CanonicalRecord, ConcatenatedParser, MergeEngine, SourceSpec};

#[test]
fn concatenated_parse_recovers_from_garbage() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("dump.json");
    let output = dir.path().join("dump.jsonl");
    fs::write(&input, r#"{"a":1}{"b":2}garbage{"c":3}"#).unwrap();

    let stats = ConcatenatedParser::new()
        .parse_file(&input, &output)
        .unwrap();
    assert_eq!(stats.objects, 3);
    assert_eq!(stats.recoveries, 1);
    let lines: Vec<String> = fs::read_to_string(&output)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(lines, vec![r#"{"a":1}"#, r#"{"b":2}"#, r#"{"c":3}"#]);
}

#[test]
fn parsed_output_feeds_the_merge_engine() {
    let passage = "A passage delivered as one of many back-to-back objects in a dump.";
    let mut dump = String::new();
    for i in 0..5 {
        dump.push_str(&format!("{{\"text\":\"{passage} #{i}\"}}"));
    }
    dump.push_str(&format!("{{\"text\":\"{passage} #0\"}}"));

    let mut lines = Vec::new();
    ConcatenatedParser::new()
        .with_chunk_size(16)
        .parse(Cursor::new(dump.into_bytes()), &mut lines)
        .unwrap();

    let mut out: Vec<CanonicalRecord> = Vec::new();
    let stats = MergeEngine::default()
        .merge_readers(
            vec![(
                SourceSpec::new("dump.jsonl", "web", "dump"),
                Cursor::new(lines),
            )],
            &mut out,
        )
        .unwrap();
    assert_eq!(out.len(), 5);
    assert_eq!(stats.duplicates, 1);
}

#[test]
fn cli_reports_missing_input_as_error() {
    let dir = tempdir().unwrap();
    let args = vec![
        dir.path().join("absent.json").display().to_string(),
        dir.path().join("out.jsonl").display().to_string(),
    ];
    assert!(run_parse_concatenated(args.into_iter()).is_err());
}

#[test]
fn cli_writes_one_object_per_line() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("dump.json");
    let output = dir.path().join("nested").join("dump.jsonl");
    fs::write(&input, "{\"x\": [1, 2]}\n\n{\"y\": {\"z\": null}}   ").unwrap();
    let args = vec![input.display().to_string(), output.display().to_string()];
    run_parse_concatenated(args.into_iter()).unwrap();
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "{\"x\":[1,2]}\n{\"y\":{\"z\":null}}\n"
    );
}
