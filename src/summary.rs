//! Placement summary derived from a student record.
//!
//! [`derive_flags`] is total: any record, however incomplete, yields a fully
//! populated [`DerivedSummary`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::students::record::{Application, SubmissionDate};
use crate::students::StudentRecord;

/// Placeholder for any text field that could not be derived.
pub const UNKNOWN: &str = "Unknown";

const SAT_TYPES: [&str; 2] = ["sat", "sat score"];
const AP_TYPES: [&str; 3] = ["ap", "ap score", "ap scores"];
const TRANSCRIPT_TYPE: &str = "transcript";

/// How the student is signed up for the math placement exam.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MapeStatus {
    /// No MAPE session found in attendance.
    #[default]
    #[serde(rename = "not scheduled")]
    NotScheduled,
    /// Signed up for an online session.
    Online,
    /// Signed up for an in-person session.
    InPerson,
}

impl MapeStatus {
    /// Display label used in prompts.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotScheduled => "not scheduled",
            Self::Online => "online",
            Self::InPerson => "in-person",
        }
    }

    /// Classify one event title; `None` when it is not a MAPE session or
    /// carries no delivery marker.
    fn classify(title: &str) -> Option<Self> {
        let title = title.to_lowercase();
        if !title.contains("mape") {
            return None;
        }
        if title.contains("online") {
            Some(Self::Online)
        } else if title.contains("in-person") || title.contains("in person") {
            Some(Self::InPerson)
        } else {
            None
        }
    }
}

impl fmt::Display for MapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat, defaulted view of a student's placement status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedSummary {
    /// Full name, or [`UNKNOWN`].
    pub name: String,
    /// Program of the latest application, or [`UNKNOWN`].
    pub program: String,
    /// Plan of the latest application, or [`UNKNOWN`].
    pub plan: String,
    /// Status of the latest application, or [`UNKNOWN`].
    pub status: String,
    /// An SAT score report is on file.
    pub sat_received: bool,
    /// An AP score report is on file.
    pub ap_received: bool,
    /// A transcript is on file.
    pub transcript_received: bool,
    /// MAPE sign-up.
    pub mape_status: MapeStatus,
}

impl Default for DerivedSummary {
    fn default() -> Self {
        Self {
            name: UNKNOWN.to_owned(),
            program: UNKNOWN.to_owned(),
            plan: UNKNOWN.to_owned(),
            status: UNKNOWN.to_owned(),
            sat_received: false,
            ap_received: false,
            transcript_received: false,
            mape_status: MapeStatus::NotScheduled,
        }
    }
}

/// Derive the placement summary for `record`.
pub fn derive_flags(record: &StudentRecord) -> DerivedSummary {
    let name = full_name(record);

    let applications = record.applications();
    let latest = latest_application(&applications);
    let program = latest.and_then(Application::program).unwrap_or(UNKNOWN).to_owned();
    let plan = latest.and_then(Application::plan).unwrap_or(UNKNOWN).to_owned();
    let status = latest.and_then(Application::status).unwrap_or(UNKNOWN).to_owned();

    let doc_types: HashSet<String> = record.document_types().into_iter().collect();
    let sat_received = SAT_TYPES.iter().any(|t| doc_types.contains(*t));
    let ap_received = AP_TYPES.iter().any(|t| doc_types.contains(*t));
    let transcript_received = doc_types.contains(TRANSCRIPT_TYPE);

    DerivedSummary {
        name,
        program,
        plan,
        status,
        sat_received,
        ap_received,
        transcript_received,
        mape_status: mape_status(record),
    }
}

fn full_name(record: &StudentRecord) -> String {
    let person = record.person();
    let first = person.first_name.unwrap_or_default().trim();
    let last = person.last_name.unwrap_or_default().trim();
    let joined = format!("{first} {last}");
    let joined = joined.trim();
    if joined.is_empty() {
        UNKNOWN.to_owned()
    } else {
        joined.to_owned()
    }
}

/// The entry with the greatest `submission_date`; later entries win ties.
///
/// When any entry cannot be ordered the last entry in list order is used.
fn latest_application<'r, 'a>(applications: &'r [Application<'a>]) -> Option<&'r Application<'a>> {
    let mut keyed = Vec::with_capacity(applications.len());
    for app in applications {
        let key = match app.submission_date() {
            SubmissionDate::Missing => "",
            SubmissionDate::Text(date) => date,
            SubmissionDate::Unorderable => return applications.last(),
        };
        keyed.push((key, app));
    }
    // `max_by` returns the last of equal maxima.
    keyed
        .into_iter()
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, app)| app)
}

fn mape_status(record: &StudentRecord) -> MapeStatus {
    let titles: HashMap<&str, &str> = record
        .events()
        .into_iter()
        .map(|event| (event.event_id, event.title))
        .collect();

    record
        .attended_event_ids()
        .into_iter()
        .find_map(|event_id| {
            let title = event_id
                .and_then(|id| titles.get(id).copied())
                .unwrap_or_default();
            MapeStatus::classify(title)
        })
        .unwrap_or_default()
}
