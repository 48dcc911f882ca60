//! Knowledge-base retrieval-and-generation boundary.
//!
//! Defines the [`RetrievalService`] trait, the wire types of the Bedrock
//! `RetrieveAndGenerate` operation, and the parsing that turns a response
//! into an answer plus raw citation URIs.
//!
//! One implementation is provided: [`bedrock::BedrockRetriever`], a SigV4
//! signed HTTPS client. Tests substitute their own implementations.

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::credentials::CredentialsError;

pub mod bedrock;
pub mod sigv4;

/// Answer text used when the service returns none.
pub const NO_ANSWER: &str = "(No answer)";

/// Metadata keys that may carry a document's source URI, in priority order.
const METADATA_SOURCE_KEYS: [&str; 2] = ["source", "x-amz-bedrock-kb-source-uri"];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by a retrieval service.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// HTTP transport failure.
    #[error("retrieval request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The service responded with an error status.
    #[error("retrieval service returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
    /// Response did not match the expected schema.
    #[error("retrieval response parse error: {0}")]
    Parse(String),
    /// No credentials were available to sign the request.
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    /// The request could not be signed.
    #[error(transparent)]
    Signing(#[from] sigv4::SigningError),
    /// The service cannot be used with the current configuration.
    #[error("retrieval service unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// `RetrieveAndGenerate` request body.
#[doc(hidden)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveAndGenerateRequest {
    /// Prompt text.
    pub input: RetrieveInput,
    /// Knowledge-base and model selection.
    pub retrieve_and_generate_configuration: RetrieveAndGenerateConfiguration,
}

/// Prompt wrapper.
#[doc(hidden)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrieveInput {
    /// Prompt text.
    pub text: String,
}

/// Retrieval configuration.
#[doc(hidden)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveAndGenerateConfiguration {
    /// Always `KNOWLEDGE_BASE`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Knowledge base and generation model.
    pub knowledge_base_configuration: KnowledgeBaseConfiguration,
}

/// Knowledge base and generation model.
#[doc(hidden)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseConfiguration {
    /// Knowledge-base identifier.
    pub knowledge_base_id: String,
    /// Generation model ARN.
    pub model_arn: String,
}

/// A read-only view of one `retrievedReferences` entry.
///
/// References are read field by field with `as_str`/`as_object`, so a
/// mistyped location or metadata block yields no URI instead of failing the
/// whole response.
#[doc(hidden)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievedReference<'a> {
    raw: &'a Value,
}

impl<'a> RetrievedReference<'a> {
    /// Wrap a raw reference value.
    pub fn new(raw: &'a Value) -> Self {
        Self { raw }
    }

    fn location_uri(&self, location_key: &str, uri_key: &str) -> Option<&'a str> {
        self.raw
            .get("location")?
            .get(location_key)?
            .get(uri_key)?
            .as_str()
            .filter(|u| !u.is_empty())
    }

    /// Source URI: `s3Location.uri`, then `webLocation.url`, then the
    /// the `source` and `x-amz-bedrock-kb-source-uri` metadata keys.
    pub fn source_uri(&self) -> Option<&'a str> {
        self.location_uri("s3Location", "uri")
            .or_else(|| self.location_uri("webLocation", "url"))
            .or_else(|| {
                let metadata = self.raw.get("metadata")?.as_object()?;
                METADATA_SOURCE_KEYS
                    .iter()
                    .filter_map(|key| metadata.get(*key).and_then(Value::as_str))
                    .find(|u| !u.is_empty())
            })
    }
}

/// Elements of `value` when it is an array; nothing otherwise.
fn array_items(value: Option<&Value>) -> &[Value] {
    value
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Parsed result
// ---------------------------------------------------------------------------

/// What a retrieval call produced, before citation policy is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalResponse {
    /// Generated answer; `None` when the service returned no text.
    pub answer: Option<String>,
    /// Source URIs in response order, possibly repeated.
    pub citation_uris: Vec<String>,
}

impl RetrievalResponse {
    /// The answer, or [`NO_ANSWER`].
    pub fn answer_or_placeholder(&self) -> &str {
        self.answer
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(NO_ANSWER)
    }
}

/// Answer plus the citations shown with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalResult {
    /// Generated answer text.
    pub answer: String,
    /// Unique citation URIs in first-seen order, at most
    /// [`crate::citations::MAX_CITATIONS`].
    pub citations: Vec<String>,
}

/// Build a request body.
#[doc(hidden)]
pub fn build_request(prompt: &str, knowledge_base_id: &str, model_arn: &str) -> RetrieveAndGenerateRequest {
    RetrieveAndGenerateRequest {
        input: RetrieveInput {
            text: prompt.to_owned(),
        },
        retrieve_and_generate_configuration: RetrieveAndGenerateConfiguration {
            kind: "KNOWLEDGE_BASE".to_owned(),
            knowledge_base_configuration: KnowledgeBaseConfiguration {
                knowledge_base_id: knowledge_base_id.to_owned(),
                model_arn: model_arn.to_owned(),
            },
        },
    }
}

/// Parse a response body.
///
/// Only the top level is strict. Anything below it is read leniently: a
/// mistyped `output` gives no answer and a malformed citation or reference
/// is skipped.
///
/// # Errors
///
/// Returns [`RetrievalError::Parse`] if the body is not a JSON object.
#[doc(hidden)]
pub fn parse_response(body: &str) -> Result<RetrievalResponse, RetrievalError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| RetrievalError::Parse(e.to_string()))?;
    let Some(resp) = value.as_object() else {
        return Err(RetrievalError::Parse(
            "response body is not a JSON object".to_owned(),
        ));
    };

    let answer = resp
        .get("output")
        .and_then(|output| output.get("text"))
        .and_then(Value::as_str)
        .map(str::to_owned);

    let citation_uris = array_items(resp.get("citations"))
        .iter()
        .flat_map(|citation| array_items(citation.get("retrievedReferences")))
        .filter_map(|raw| RetrievedReference::new(raw).source_uri())
        .map(str::to_owned)
        .collect();

    Ok(RetrievalResponse {
        answer,
        citation_uris,
    })
}

/// Generation model ARN for a model id; ARNs pass through unchanged.
pub fn model_arn(region: &str, model_id: &str) -> String {
    if model_id.starts_with("arn:") {
        model_id.to_owned()
    } else {
        format!("arn:aws:bedrock:{region}::foundation-model/{model_id}")
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Check HTTP response status and return body text or a structured error.
///
/// `known_secrets` are removed verbatim from an error body before the
/// pattern-based redaction runs.
///
/// # Errors
///
/// Returns `RetrievalError::Request` on transport failure,
/// `RetrievalError::HttpStatus` on non-2xx.
pub async fn check_http_response(
    response: reqwest::Response,
    known_secrets: &[String],
) -> Result<String, RetrievalError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(RetrievalError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body, known_secrets),
        });
    }
    Ok(body)
}

fn sanitize_http_error_body(raw: &str, known_secrets: &[String]) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for secret in known_secrets {
        if !secret.is_empty() {
            sanitized = sanitized.replace(secret.as_str(), "[REDACTED]");
        }
    }
    for pattern in [
        r"(?:AKIA|ASIA)[A-Z0-9]{16}",
        r"Credential=[^,\s]+",
        r"Signature=[0-9a-f]{64}",
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A retrieval-and-generation service bound to one knowledge base and model.
#[async_trait]
pub trait RetrievalService: Send + Sync {
    /// Run one retrieval-and-generation call for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError`] on transport, auth, or parse failure.
    async fn retrieve_and_generate(&self, prompt: &str) -> Result<RetrievalResponse, RetrievalError>;

    /// Knowledge base this service queries.
    fn knowledge_base_id(&self) -> &str;
}
