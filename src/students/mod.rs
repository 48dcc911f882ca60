//! Student directory: the email-keyed JSON document of mock student records.
//!
//! Loading is strict about the top-level shape (an object of objects) and
//! fails once at startup. Everything inside a record is read leniently via
//! [`record::StudentRecord`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

pub mod record;

pub use record::StudentRecord;

/// Fatal errors raised while loading the student directory.
#[derive(Debug, thiserror::Error)]
pub enum StudentDataError {
    /// The file could not be read.
    #[error("could not read {}: {source}", path.display())]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid JSON.
    #[error("could not parse {}: {source}", path.display())]
    Parse {
        /// Path that failed.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },
    /// A value that must be an object was something else.
    #[error("{what} must be a JSON object, found {found}")]
    NotAnObject {
        /// What was being loaded.
        what: String,
        /// JSON kind actually found.
        found: &'static str,
    },
}

/// Sign-in lookup miss. Not fatal; the caller may retry another email.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("No student found for '{email}'.")]
pub struct LookupMiss {
    /// The normalized email that was looked up.
    pub email: String,
}

/// All known students, keyed by lower-cased email.
#[derive(Debug, Clone, Default)]
pub struct StudentDirectory {
    students: BTreeMap<String, StudentRecord>,
}

/// Trim and lower-case an email for lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl StudentDirectory {
    /// Load the directory from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`StudentDataError`] if the file cannot be read or parsed, or
    /// if it is not an object whose values are all objects.
    pub fn load(path: &Path) -> Result<Self, StudentDataError> {
        let contents = fs::read_to_string(path).map_err(|source| StudentDataError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value =
            serde_json::from_str(&contents).map_err(|source| StudentDataError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let directory = Self::from_value(value)?;
        info!(path = %path.display(), students = directory.len(), "student directory loaded");
        Ok(directory)
    }

    /// Build the directory from an already-parsed JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`StudentDataError::NotAnObject`] when the document or any of
    /// its values is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self, StudentDataError> {
        let entries = match value {
            Value::Object(entries) => entries,
            other => {
                return Err(StudentDataError::NotAnObject {
                    what: "student directory (keyed by email)".to_owned(),
                    found: record::json_kind(&other),
                })
            }
        };

        let mut students = BTreeMap::new();
        for (email, raw) in entries {
            let key = normalize_email(&email);
            let record = StudentRecord::from_value(&key, raw)?;
            students.insert(key, record);
        }
        Ok(Self { students })
    }

    /// Look up a student by email (case and surrounding whitespace ignored).
    ///
    /// # Errors
    ///
    /// Returns [`LookupMiss`] when no record matches.
    pub fn authenticate(&self, email: &str) -> Result<&StudentRecord, LookupMiss> {
        let key = normalize_email(email);
        match self.students.get(&key) {
            Some(record) => {
                debug!(email = %key, "student matched");
                Ok(record)
            }
            None => {
                debug!(email = %key, "no student matched");
                Err(LookupMiss { email: key })
            }
        }
    }

    /// Number of students loaded.
    pub fn len(&self) -> usize {
        self.students.len()
    }

    /// Whether the directory holds no students.
    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    /// One-line list of known emails, shown after a failed sign-in.
    pub fn sign_in_hint(&self) -> String {
        if self.is_empty() {
            return "No students are loaded.".to_owned();
        }
        format!(
            "Available test emails: {}",
            self.emails().collect::<Vec<_>>().join(", ")
        )
    }

    /// Known emails in sorted order.
    pub fn emails(&self) -> impl Iterator<Item = &str> {
        self.students.keys().map(String::as_str)
    }
}
