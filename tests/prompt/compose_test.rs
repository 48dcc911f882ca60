//! Prompt composition.

use serde_json::{json, Value};

use mathpath::prompt::{
    compose_full_prompt, compose_prompt_with_history, ConversationHistory, PromptRules,
};
use mathpath::students::StudentRecord;

fn record(value: Value) -> StudentRecord {
    match StudentRecord::from_value("student@calpoly.edu", value) {
        Ok(record) => record,
        Err(err) => panic!("record should load: {err}"),
    }
}

fn sample_record() -> StudentRecord {
    record(json!({
        "person": {"first_name": "José", "last_name": "Núñez"},
        "applications": [
            {"program": "Mechanical Engineering", "plan": "BS", "status": "Admitted", "submission_date": "2024-11-30"}
        ],
        "documents": [{"type": "AP Scores"}],
        "events": [{"event_id": "m1", "title": "MAPE Online Session"}],
        "event_attendance": [{"event_id": "m1"}],
    }))
}

fn position(haystack: &str, needle: &str) -> usize {
    match haystack.find(needle) {
        Some(idx) => idx,
        None => panic!("prompt should contain {needle:?}"),
    }
}

#[test]
fn prompt_contains_question_and_program_verbatim() {
    let question = "Do my AP Calc BC scores let me skip MATH 141?";
    let prompt = compose_full_prompt(&sample_record(), question);
    assert!(prompt.contains(question));
    assert!(prompt.contains("Mechanical Engineering"));
}

#[test]
fn sections_appear_in_fixed_order() {
    let prompt = compose_full_prompt(&sample_record(), "When is MAPE?");
    let rules = position(&prompt, "IDENTITY AND BEHAVIOR RULES:");
    let summary = position(&prompt, "STUDENT RECORD SUMMARY:");
    let full = position(&prompt, "FULL STUDENT RECORD (JSON):");
    let question = position(&prompt, "STUDENT QUESTION:\nWhen is MAPE?");
    let closing = position(&prompt, "INSTRUCTIONS:\n");
    assert!(rules < summary);
    assert!(summary < full);
    assert!(full < question);
    assert!(question < closing);
    assert!(prompt.ends_with("End with a helpful closing statement."));
}

#[test]
fn summary_lines_reflect_record() {
    let prompt = compose_full_prompt(&sample_record(), "q");
    assert!(prompt.contains("  Name: José Núñez\n"));
    assert!(prompt.contains("  Plan: BS\n"));
    assert!(prompt.contains("  Status: Admitted\n"));
    assert!(prompt.contains("  SAT Received: No\n"));
    assert!(prompt.contains("  AP Scores Received: Yes\n"));
    assert!(prompt.contains("  MAPE Status: online"));
}

#[test]
fn full_record_is_pretty_printed_with_unicode() {
    let prompt = compose_full_prompt(&sample_record(), "q");
    assert!(prompt.contains("FULL STUDENT RECORD (JSON):\n{\n  \"person\": {\n    \"first_name\": \"José\""));
    assert!(!prompt.contains("\\u00e9"));
}

#[test]
fn empty_record_still_composes() {
    let prompt = compose_full_prompt(&record(json!({})), "Hello?");
    assert!(prompt.contains("  Name: Unknown\n"));
    assert!(prompt.contains("  Program: Unknown\n"));
    assert!(prompt.contains("FULL STUDENT RECORD (JSON):\n{}"));
}

#[test]
fn composition_is_deterministic() {
    let rec = sample_record();
    assert_eq!(
        compose_full_prompt(&rec, "same question"),
        compose_full_prompt(&rec, "same question")
    );
}

#[test]
fn injected_rules_replace_builtin() {
    let rules = PromptRules::new("test", "CUSTOM RULES ONLY");
    let prompt = compose_prompt_with_history(
        &rules,
        &sample_record(),
        "q",
        &ConversationHistory::new(),
    );
    assert!(prompt.starts_with("CUSTOM RULES ONLY\n\nSTUDENT RECORD SUMMARY:"));
    assert!(!prompt.contains("IDENTITY AND BEHAVIOR RULES:"));
}

#[test]
fn empty_history_matches_plain_composition() {
    let rec = sample_record();
    let with_history = compose_prompt_with_history(
        &PromptRules::builtin(),
        &rec,
        "q",
        &ConversationHistory::new(),
    );
    assert_eq!(with_history, compose_full_prompt(&rec, "q"));
    assert!(!with_history.contains("CONVERSATION SO FAR:"));
}

#[test]
fn history_sits_between_record_and_question() {
    let mut history = ConversationHistory::new();
    history.record_exchange("Did you get my AP scores?", "Yes, they are on file.");
    let prompt = compose_prompt_with_history(
        &PromptRules::builtin(),
        &sample_record(),
        "Where do I send them?",
        &history,
    );

    let full = position(&prompt, "FULL STUDENT RECORD (JSON):");
    let convo = position(
        &prompt,
        "CONVERSATION SO FAR:\nStudent: Did you get my AP scores?\nMathPath AI: Yes, they are on file.",
    );
    let question = position(&prompt, "STUDENT QUESTION:\nWhere do I send them?");
    assert!(full < convo);
    assert!(convo < question);
}

#[test]
fn rules_load_from_file_with_stem_version() {
    let dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(err) => panic!("should create temp dir: {err}"),
    };
    let path = dir.path().join("rules_2025_fall.txt");
    assert!(std::fs::write(&path, "FALL RULES").is_ok());
    let rules = match PromptRules::load(&path) {
        Ok(rules) => rules,
        Err(err) => panic!("rules should load: {err}"),
    };
    assert_eq!(rules.version(), "rules_2025_fall");
    assert_eq!(rules.text(), "FALL RULES");

    let blank = dir.path().join("blank.txt");
    assert!(std::fs::write(&blank, "  \n").is_ok());
    assert!(PromptRules::load(&blank).is_err());
}
