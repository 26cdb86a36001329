//! Export tests: file naming, formats and spreadsheet-safe cells.

use std::fs;

use assert_fs::TempDir;
use assert_fs::prelude::*;
use regex::Regex;

use semantic_summary::{Engine, Entity, EntityId, ExportFormat, WordInfo, export_words};

fn words() -> Vec<WordInfo> {
    let engine = Engine::default();
    let net = engine.add_collection("net").unwrap();
    net.register_entity_set([
        (EntityId(1), Entity::new().with("label", "red car")),
        (EntityId(2), Entity::new().with("label", "red truck")),
        (EntityId(3), Entity::new().with("label", "@cmd truck")),
    ])
    .unwrap();
    let cloud = net.create_cloud(None, [EntityId(1), EntityId(2), EntityId(3)]).unwrap();
    cloud.set_min_word_occurrence(1).unwrap();
    cloud.set_net_weight_factor(0.0).unwrap();
    cloud.word_infos().unwrap().to_vec()
}

#[test]
fn file_name_carries_stem_and_timestamp() {
    let tmp = TempDir::new().unwrap();
    let path = export_words(&words(), tmp.path(), "kinases", ExportFormat::Csv).unwrap();
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    let re = Regex::new(r"^kinases_\d{8}_\d{6}_words\.csv$").unwrap();
    assert!(re.is_match(&name), "unexpected file name: {name}");
    assert_eq!(path.parent().unwrap(), tmp.path());
}

#[test]
fn path_separators_in_stem_are_replaced() {
    let tmp = TempDir::new().unwrap();
    let path = export_words(&words(), tmp.path(), "a/b", ExportFormat::Txt).unwrap();
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("a_b_"), "{name}");
    assert!(path.exists());
}

#[test]
fn csv_rows_follow_display_order() {
    let tmp = TempDir::new().unwrap();
    let words = words();
    let path = export_words(&words, tmp.path(), "cloud", ExportFormat::Csv).unwrap();

    let mut rdr = csv::Reader::from_path(&path).unwrap();
    let headers = rdr.headers().unwrap().clone();
    assert_eq!(&headers[0], "word");
    assert_eq!(&headers[5], "cluster");
    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), words.len());
    assert_eq!(&rows[0][0], "red");
    assert_eq!(&rows[0][1], "2");
}

#[test]
fn csv_neutralizes_formula_cells() {
    let tmp = TempDir::new().unwrap();
    let words = words();
    assert!(words.iter().any(|w| w.word == "@cmd"));
    let path = export_words(&words, tmp.path(), "cloud", ExportFormat::Csv).unwrap();
    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("'@cmd,"));
    assert!(!content.lines().any(|l| l.starts_with("@cmd")));
}

#[test]
fn tsv_uses_tabs() {
    let tmp = TempDir::new().unwrap();
    let path = export_words(&words(), tmp.path(), "cloud", ExportFormat::Tsv).unwrap();
    assert!(path.to_string_lossy().ends_with(".tsv"));
    let content = fs::read_to_string(&path).unwrap();
    assert!(
        content
            .lines()
            .next()
            .unwrap()
            .starts_with("word\tselected_count\t")
    );
}

#[test]
fn json_round_trips_word_infos() {
    let tmp = TempDir::new().unwrap();
    let words = words();
    let path = export_words(&words, tmp.path(), "cloud", ExportFormat::Json).unwrap();
    let back: Vec<WordInfo> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(back, words);
}

#[test]
fn txt_lists_one_word_per_line() {
    let tmp = TempDir::new().unwrap();
    let words = words();
    let path = export_words(&words, tmp.path(), "cloud", ExportFormat::Txt).unwrap();
    let file = tmp.child(path.file_name().unwrap());
    file.assert(predicates::str::starts_with("red: weight="));
    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), words.len());
}

#[test]
fn missing_directory_is_an_io_error() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("nope");
    let err = export_words(&words(), &missing, "cloud", ExportFormat::Txt).unwrap_err();
    assert!(matches!(err, semantic_summary::Error::Io(_)));
}
