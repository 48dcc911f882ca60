//! End-to-end question handling with stand-in retrieval services.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use mathpath::assistant::{Assistant, ERROR_PREFIX};
use mathpath::citations::{CitationPolicy, DEFAULT_CANONICAL_URI};
use mathpath::prompt::{ConversationHistory, PromptRules};
use mathpath::retrieval::{RetrievalError, RetrievalResponse, RetrievalService};
use mathpath::students::StudentRecord;

/// Returns a fixed response and remembers every prompt it was sent.
struct CannedService {
    response: RetrievalResponse,
    prompts: Mutex<Vec<String>>,
}

impl CannedService {
    fn new(answer: Option<&str>, uris: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            response: RetrievalResponse {
                answer: answer.map(str::to_owned),
                citation_uris: uris.iter().map(|u| (*u).to_owned()).collect(),
            },
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        match self.prompts.lock() {
            Ok(prompts) => prompts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl RetrievalService for CannedService {
    async fn retrieve_and_generate(&self, prompt: &str) -> Result<RetrievalResponse, RetrievalError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_owned());
        }
        Ok(self.response.clone())
    }

    fn knowledge_base_id(&self) -> &str {
        "KBCANNED"
    }
}

/// Always fails the way an unreachable service would.
struct FailingService;

#[async_trait]
impl RetrievalService for FailingService {
    async fn retrieve_and_generate(&self, _prompt: &str) -> Result<RetrievalResponse, RetrievalError> {
        Err(RetrievalError::Unavailable("endpoint unreachable".to_owned()))
    }

    fn knowledge_base_id(&self) -> &str {
        "KBDOWN"
    }
}

fn assistant(service: Arc<dyn RetrievalService>) -> Assistant {
    Assistant::new(service, PromptRules::builtin(), CitationPolicy::default())
}

fn student() -> StudentRecord {
    let value = json!({
        "person": {"first_name": "Maya", "last_name": "Chen"},
        "applications": [{"program": "Biology", "plan": "BS", "status": "Admitted", "submission_date": "2024-10-01"}],
        "documents": ["SAT"],
    });
    match StudentRecord::from_value("maya@calpoly.edu", value) {
        Ok(record) => record,
        Err(err) => panic!("record should load: {err}"),
    }
}

#[tokio::test]
async fn answer_without_citations_is_returned_verbatim() {
    let service = CannedService::new(Some("Hi Maya!"), &[]);
    let out = assistant(service.clone())
        .process_user_question(&student(), "Hello")
        .await;
    assert_eq!(out, "Hi Maya!");

    let prompts = service.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("STUDENT QUESTION:\nHello"));
    assert!(prompts[0].contains("  Program: Biology\n"));
}

#[tokio::test]
async fn policy_question_gets_fallback_source() {
    let service = CannedService::new(Some("See the placement FAQ."), &[]);
    let out = assistant(service)
        .process_user_question(&student(), "What is the placement policy?")
        .await;
    assert_eq!(
        out,
        format!("See the placement FAQ.\n\n**Sources:**\n- [Math Placement KB]({DEFAULT_CANONICAL_URI})")
    );
}

#[tokio::test]
async fn citations_are_deduplicated_and_capped() {
    let service = CannedService::new(
        Some("Answer."),
        &[
            "s3://kb/a.pdf",
            "s3://kb/a.pdf",
            "s3://kb/b.pdf",
            "s3://kb/c.pdf",
            "s3://kb/d.pdf",
            "s3://kb/e.pdf",
            "s3://kb/f.pdf",
        ],
    );
    let out = assistant(service)
        .process_user_question(&student(), "Which classes?")
        .await;
    assert_eq!(out.matches("\n- ").count(), 5);
    assert_eq!(out.matches("s3://kb/a.pdf").count(), 1);
    assert!(!out.contains("s3://kb/f.pdf"));
}

#[tokio::test]
async fn missing_answer_uses_placeholder() {
    let service = CannedService::new(None, &[]);
    let out = assistant(service)
        .process_user_question(&student(), "Hello")
        .await;
    assert_eq!(out, "(No answer)");
}

#[tokio::test]
async fn service_failure_becomes_error_text() {
    let out = assistant(Arc::new(FailingService))
        .process_user_question(&student(), "What is MAPE?")
        .await;
    assert!(out.starts_with(ERROR_PREFIX));
    assert!(out.contains("endpoint unreachable"));
    assert!(!out.contains("**Sources:**"));
}

#[tokio::test]
async fn ask_returns_structured_result() {
    let service = CannedService::new(Some("A"), &["https://example.edu/x", "https://example.edu/x"]);
    let result = match assistant(service).ask("prompt", "hello").await {
        Ok(result) => result,
        Err(err) => panic!("ask should succeed: {err}"),
    };
    assert_eq!(result.answer, "A");
    assert_eq!(result.citations, vec!["https://example.edu/x"]);
}

#[tokio::test]
async fn follow_up_turn_carries_history() {
    let service = CannedService::new(Some("Yes."), &[]);
    let assistant = assistant(service.clone());
    let mut history = ConversationHistory::new();
    history.record_exchange("Did you get my SAT?", "Yes, it is on file.");

    let out = assistant
        .process_turn(&student(), "And my transcript?", &history)
        .await;
    assert_eq!(out, "Yes.");

    let prompts = service.prompts();
    assert!(prompts[0].contains("CONVERSATION SO FAR:\nStudent: Did you get my SAT?"));
    assert!(prompts[0].contains("STUDENT QUESTION:\nAnd my transcript?"));
}

#[test]
fn debug_output_names_knowledge_base() {
    let assistant = assistant(Arc::new(FailingService));
    let debug = format!("{assistant:?}");
    assert!(debug.contains("KBDOWN"));
    assert!(debug.contains("v1"));
}

#[test]
fn rules_accessor_reports_injected_version() {
    let assistant = Assistant::new(
        Arc::new(FailingService),
        PromptRules::new("fall_2025", "RULES"),
        CitationPolicy::default(),
    );
    assert_eq!(assistant.rules().version(), "fall_2025");
}

/// Shared in-memory sink for captured log lines.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut inner) = self.0.lock() {
            inner.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn answered_question_logs_prompt_size_in_bytes() {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(runtime) => runtime,
        Err(err) => panic!("runtime should build: {err}"),
    };

    let service = CannedService::new(Some("Hi."), &[]);
    let out = tracing::subscriber::with_default(subscriber, || {
        runtime.block_on(assistant(service).process_user_question(&student(), "Hello"))
    });
    assert_eq!(out, "Hi.");

    let logged = match buffer.0.lock() {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
    };
    assert!(logged.contains("question answered"));
    assert!(logged.contains("prompt_bytes="));
    assert!(!logged.contains("prompt_chars"));
}
