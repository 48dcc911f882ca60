//! Prompt composition for the knowledge-base call.
//!
//! A composed prompt is, in order:
//!
//! 1. the persona and behaviour rules ([`PromptRules`])
//! 2. `STUDENT RECORD SUMMARY:` from [`derive_flags`]
//! 3. `FULL STUDENT RECORD (JSON):` pretty-printed
//! 4. `CONVERSATION SO FAR:` (only when there is history)
//! 5. `STUDENT QUESTION:`
//! 6. `INSTRUCTIONS:`
//!
//! Nothing is truncated. Keeping the record, rules and history inside the
//! model's context window is the caller's concern.

use std::fmt::Write as _;
use std::path::Path;

use crate::students::StudentRecord;
use crate::summary::{derive_flags, DerivedSummary};

/// Built-in rules text.
pub const BUILTIN_RULES: &str = include_str!("../prompts/rules_v1.txt");

/// Version tag of [`BUILTIN_RULES`].
pub const BUILTIN_RULES_VERSION: &str = "v1";

const CLOSING_INSTRUCTIONS: &str = "\
INSTRUCTIONS:
- Answer clearly and professionally using the student record data above.
- For personal status questions, rely on the exact data from the student record.
- For policy questions, use the Knowledge Base and cite sources.
- Always maintain the MathPath AI character and tone.
- Include appropriate citations for factual information.
- End with a helpful closing statement.";

/// The persona and behaviour rules placed at the top of every prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRules {
    version: String,
    text: String,
}

impl Default for PromptRules {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptRules {
    /// The rules shipped with the crate.
    pub fn builtin() -> Self {
        Self::new(BUILTIN_RULES_VERSION, BUILTIN_RULES)
    }

    /// Rules from explicit text.
    pub fn new(version: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            text: text.into(),
        }
    }

    /// Load rules from a text file. The version is the file stem.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is blank.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read prompt rules at {}: {e}", path.display()))?;
        if text.trim().is_empty() {
            anyhow::bail!("prompt rules at {} are empty", path.display());
        }
        let version = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "custom".to_owned());
        tracing::info!(path = %path.display(), version = %version, "loaded prompt rules");
        Ok(Self::new(version, text))
    }

    /// Version tag, logged with each request.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Rules text.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Who said a line in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    /// The signed-in student.
    Student,
    /// The assistant.
    Assistant,
}

/// One line of conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// Author of the line.
    pub speaker: Speaker,
    /// What was said.
    pub text: String,
}

/// Prior turns of a chat, owned by the caller and passed in by value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    /// An empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a question and the answer shown for it.
    pub fn record_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(Turn {
            speaker: Speaker::Student,
            text: question.into(),
        });
        self.turns.push(Turn {
            speaker: Speaker::Assistant,
            text: answer.into(),
        });
    }

    /// All turns, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Whether nothing has been said yet.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Render the summary as labelled lines.
pub fn render_summary(summary: &DerivedSummary) -> String {
    let yes_no = |b: bool| if b { "Yes" } else { "No" };
    let mut out = String::from("STUDENT RECORD SUMMARY:\n");
    let _ = writeln!(out, "  Name: {}", summary.name);
    let _ = writeln!(out, "  Program: {}", summary.program);
    let _ = writeln!(out, "  Plan: {}", summary.plan);
    let _ = writeln!(out, "  Status: {}", summary.status);
    let _ = writeln!(out, "  SAT Received: {}", yes_no(summary.sat_received));
    let _ = writeln!(out, "  AP Scores Received: {}", yes_no(summary.ap_received));
    let _ = writeln!(
        out,
        "  Transcript Received: {}",
        yes_no(summary.transcript_received)
    );
    let _ = write!(out, "  MAPE Status: {}", summary.mape_status);
    out
}

fn render_history(history: &ConversationHistory) -> String {
    let mut out = String::from("CONVERSATION SO FAR:");
    for turn in history.turns() {
        let who = match turn.speaker {
            Speaker::Student => "Student",
            Speaker::Assistant => "MathPath AI",
        };
        let _ = write!(out, "\n{who}: {}", turn.text);
    }
    out
}

/// Compose the prompt for `question` with explicit rules and history.
pub fn compose_prompt_with_history(
    rules: &PromptRules,
    record: &StudentRecord,
    question: &str,
    history: &ConversationHistory,
) -> String {
    let summary = derive_flags(record);

    let mut sections = vec![
        rules.text().trim_end().to_owned(),
        render_summary(&summary),
        format!("FULL STUDENT RECORD (JSON):\n{}", record.to_pretty_json()),
    ];
    if !history.is_empty() {
        sections.push(render_history(history));
    }
    sections.push(format!("STUDENT QUESTION:\n{question}"));
    sections.push(CLOSING_INSTRUCTIONS.to_owned());

    sections.join("\n\n")
}

/// Compose the prompt for `question` with the built-in rules and no history.
pub fn compose_full_prompt(record: &StudentRecord, question: &str) -> String {
    compose_prompt_with_history(
        &PromptRules::builtin(),
        record,
        question,
        &ConversationHistory::new(),
    )
}
