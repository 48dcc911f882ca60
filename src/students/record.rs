//! Typed, defaulting view over a loosely-shaped student record.
//!
//! The directory stores records as free-form JSON objects. Nothing below the
//! top level is trusted: every accessor here returns `None` or an empty
//! collection for a missing *or* mistyped field instead of failing, so the
//! rest of the crate never has to guess at shapes.

use serde_json::{Map, Value};

use super::StudentDataError;

/// A single student's record, read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentRecord {
    fields: Map<String, Value>,
}

/// The `person` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Person<'a> {
    /// Given name, if present and a string.
    pub first_name: Option<&'a str>,
    /// Family name, if present and a string.
    pub last_name: Option<&'a str>,
}

/// Ordering key of an application entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionDate<'a> {
    /// The entry has no `submission_date`; sorts as the empty string.
    Missing,
    /// A string date, compared lexicographically.
    Text(&'a str),
    /// The entry cannot take part in ordering (not an object, or a date of
    /// the wrong type).
    Unorderable,
}

/// One entry of the `applications` list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Application<'a> {
    raw: &'a Value,
}

impl<'a> Application<'a> {
    fn text(&self, key: &str) -> Option<&'a str> {
        self.raw
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Academic program, if present and non-empty.
    pub fn program(&self) -> Option<&'a str> {
        self.text("program")
    }

    /// Academic plan, if present and non-empty.
    pub fn plan(&self) -> Option<&'a str> {
        self.text("plan")
    }

    /// Application status, if present and non-empty.
    pub fn status(&self) -> Option<&'a str> {
        self.text("status")
    }

    /// Key used to find the latest application.
    ///
    /// A blank entry (`null`, `false`, `0`, `""`, `[]`) reads as an empty
    /// object and so has no date.
    pub fn submission_date(&self) -> SubmissionDate<'a> {
        if is_blank(self.raw) {
            return SubmissionDate::Missing;
        }
        let Some(obj) = self.raw.as_object() else {
            return SubmissionDate::Unorderable;
        };
        match obj.get("submission_date") {
            None => SubmissionDate::Missing,
            Some(Value::String(s)) => SubmissionDate::Text(s),
            Some(_) => SubmissionDate::Unorderable,
        }
    }
}

/// One entry of the `events` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event<'a> {
    /// Event identifier.
    pub event_id: &'a str,
    /// Event title; empty when missing or not a string.
    pub title: &'a str,
}

impl StudentRecord {
    /// Wrap a JSON object as a record.
    ///
    /// # Errors
    ///
    /// Returns [`StudentDataError::NotAnObject`] when `value` is not a JSON
    /// object. `label` names the record in the error message.
    pub fn from_value(label: &str, value: Value) -> Result<Self, StudentDataError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(StudentDataError::NotAnObject {
                what: format!("record for '{label}'"),
                found: json_kind(&other),
            }),
        }
    }

    /// An empty record; every derived field takes its default.
    pub fn empty() -> Self {
        Self { fields: Map::new() }
    }

    /// The record as it was loaded.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Pretty-printed JSON with two-space indentation and original key order.
    pub fn to_pretty_json(&self) -> String {
        // Serializing a `Map` of `Value`s cannot fail.
        serde_json::to_string_pretty(&self.fields).unwrap_or_else(|_| "{}".to_owned())
    }

    fn list(&self, key: &str) -> &[Value] {
        self.fields
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The `person` section; defaults when absent or not an object.
    pub fn person(&self) -> Person<'_> {
        let Some(person) = self.fields.get("person").and_then(Value::as_object) else {
            return Person::default();
        };
        Person {
            first_name: person.get("first_name").and_then(Value::as_str),
            last_name: person.get("last_name").and_then(Value::as_str),
        }
    }

    /// Every `applications` entry in original order, including malformed
    /// ones (those report [`SubmissionDate::Unorderable`]).
    pub fn applications(&self) -> Vec<Application<'_>> {
        self.list("applications")
            .iter()
            .map(|raw| Application { raw })
            .collect()
    }

    /// Document type strings, trimmed and lower-cased. Entries may be an
    /// object with a string `type` or a bare string; others are skipped.
    pub fn document_types(&self) -> Vec<String> {
        self.list("documents")
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.as_str()),
                Value::Object(obj) => obj.get("type").and_then(Value::as_str),
                _ => None,
            })
            .map(|t| t.trim().to_lowercase())
            .collect()
    }

    /// Events carrying a string `event_id`.
    pub fn events(&self) -> Vec<Event<'_>> {
        self.list("events")
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|obj| {
                let event_id = obj.get("event_id").and_then(Value::as_str)?;
                let title = obj.get("title").and_then(Value::as_str).unwrap_or_default();
                Some(Event { event_id, title })
            })
            .collect()
    }

    /// Event ids from `event_attendance`, in order. An attendance entry that
    /// is an object without a string `event_id` yields `None`; entries that
    /// are not objects are skipped.
    pub fn attended_event_ids(&self) -> Vec<Option<&str>> {
        self.list("event_attendance")
            .iter()
            .filter_map(Value::as_object)
            .map(|obj| obj.get("event_id").and_then(Value::as_str))
            .collect()
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(_) => false,
    }
}

pub(super) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
