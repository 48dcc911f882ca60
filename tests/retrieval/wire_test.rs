//! RetrieveAndGenerate request/response wire format.

use serde_json::json;

use mathpath::retrieval::{build_request, parse_response, RetrievalError, NO_ANSWER};

#[test]
fn request_serializes_to_expected_shape() {
    let request = build_request(
        "PROMPT",
        "KB123",
        "arn:aws:bedrock:us-west-2::foundation-model/anthropic.claude-3-haiku-20240307-v1:0",
    );
    let value = match serde_json::to_value(&request) {
        Ok(value) => value,
        Err(err) => panic!("request should serialize: {err}"),
    };
    assert_eq!(
        value,
        json!({
            "input": {"text": "PROMPT"},
            "retrieveAndGenerateConfiguration": {
                "type": "KNOWLEDGE_BASE",
                "knowledgeBaseConfiguration": {
                    "knowledgeBaseId": "KB123",
                    "modelArn": "arn:aws:bedrock:us-west-2::foundation-model/anthropic.claude-3-haiku-20240307-v1:0"
                }
            }
        })
    );
}

#[test]
fn response_yields_answer_and_uris_in_order() {
    let body = json!({
        "output": {"text": "You can take MAPE online."},
        "sessionId": "abc",
        "citations": [
            {"generatedResponsePart": {"textResponsePart": {"text": "x"}},
             "retrievedReferences": [
                {"location": {"type": "S3", "s3Location": {"uri": "s3://kb/faq.pdf"}}},
                {"location": {"type": "WEB", "webLocation": {"url": "https://math.example.edu/mape"}}}
             ]},
            {"retrievedReferences": [
                {"location": {"s3Location": {"uri": "s3://kb/faq.pdf"}}}
            ]}
        ]
    })
    .to_string();
    let parsed = match parse_response(&body) {
        Ok(parsed) => parsed,
        Err(err) => panic!("response should parse: {err}"),
    };
    assert_eq!(parsed.answer.as_deref(), Some("You can take MAPE online."));
    assert_eq!(
        parsed.citation_uris,
        vec!["s3://kb/faq.pdf", "https://math.example.edu/mape", "s3://kb/faq.pdf"]
    );
}

#[test]
fn metadata_source_used_when_location_missing() {
    let body = json!({
        "output": {"text": "a"},
        "citations": [{"retrievedReferences": [
            {"metadata": {"source": "https://catalog.example.edu/math"}},
            {"metadata": {"x-amz-bedrock-kb-source-uri": "s3://kb/other.pdf"}},
            {"location": {"s3Location": {"uri": ""}}, "metadata": {"source": "https://fallback.example.edu"}},
            {"metadata": {"source": 42}},
            {}
        ]}]
    })
    .to_string();
    let parsed = match parse_response(&body) {
        Ok(parsed) => parsed,
        Err(err) => panic!("response should parse: {err}"),
    };
    assert_eq!(
        parsed.citation_uris,
        vec![
            "https://catalog.example.edu/math",
            "s3://kb/other.pdf",
            "https://fallback.example.edu"
        ]
    );
}

#[test]
fn structured_location_beats_metadata() {
    let body = json!({
        "citations": [{"retrievedReferences": [{
            "location": {"s3Location": {"uri": "s3://kb/primary.pdf"}},
            "metadata": {"source": "https://secondary.example.edu"}
        }]}]
    })
    .to_string();
    let parsed = match parse_response(&body) {
        Ok(parsed) => parsed,
        Err(err) => panic!("response should parse: {err}"),
    };
    assert_eq!(parsed.citation_uris, vec!["s3://kb/primary.pdf"]);
}

#[test]
fn missing_output_uses_placeholder() {
    let parsed = match parse_response("{}") {
        Ok(parsed) => parsed,
        Err(err) => panic!("empty object should parse: {err}"),
    };
    assert_eq!(parsed.answer, None);
    assert!(parsed.citation_uris.is_empty());
    assert_eq!(parsed.answer_or_placeholder(), NO_ANSWER);

    let parsed = match parse_response(r#"{"output": {"text": ""}}"#) {
        Ok(parsed) => parsed,
        Err(err) => panic!("empty text should parse: {err}"),
    };
    assert_eq!(parsed.answer_or_placeholder(), "(No answer)");
}

#[test]
fn non_json_body_is_parse_error() {
    assert!(matches!(
        parse_response("<html>oops</html>"),
        Err(RetrievalError::Parse(_))
    ));
}

#[test]
fn mistyped_s3_uri_keeps_answer() {
    let body = r#"{"output":{"text":"Valid answer."},"citations":[{"retrievedReferences":[{"location":{"s3Location":{"uri":5}}}]}]}"#;
    let parsed = match parse_response(body) {
        Ok(parsed) => parsed,
        Err(err) => panic!("mistyped uri should not fail the response: {err}"),
    };
    assert_eq!(parsed.answer.as_deref(), Some("Valid answer."));
    assert!(parsed.citation_uris.is_empty());
}

#[test]
fn non_object_metadata_is_skipped() {
    let body = json!({
        "output": {"text": "Valid answer."},
        "citations": [{"retrievedReferences": [
            {"metadata": "s3://x"},
            {"location": "S3", "metadata": {"source": "https://ok.example.edu"}}
        ]}]
    })
    .to_string();
    let parsed = match parse_response(&body) {
        Ok(parsed) => parsed,
        Err(err) => panic!("non-object metadata should not fail the response: {err}"),
    };
    assert_eq!(parsed.answer.as_deref(), Some("Valid answer."));
    assert_eq!(parsed.citation_uris, vec!["https://ok.example.edu"]);
}

#[test]
fn malformed_citation_containers_are_skipped() {
    let body = json!({
        "output": {"text": "Still here."},
        "citations": [
            "not a citation",
            {"retrievedReferences": {"location": {}}},
            {"retrievedReferences": [null, 7, {"location": {"webLocation": {"url": "https://web.example.edu"}}}]}
        ]
    })
    .to_string();
    let parsed = match parse_response(&body) {
        Ok(parsed) => parsed,
        Err(err) => panic!("response should parse: {err}"),
    };
    assert_eq!(parsed.answer.as_deref(), Some("Still here."));
    assert_eq!(parsed.citation_uris, vec!["https://web.example.edu"]);

    let parsed = match parse_response(r#"{"output":{"text":["x"]},"citations":"none"}"#) {
        Ok(parsed) => parsed,
        Err(err) => panic!("mistyped output should parse: {err}"),
    };
    assert_eq!(parsed.answer_or_placeholder(), NO_ANSWER);
}

#[test]
fn non_object_body_is_parse_error() {
    assert!(matches!(
        parse_response("[1, 2]"),
        Err(RetrievalError::Parse(_))
    ));
}
