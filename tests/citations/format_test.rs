//! Markdown "Sources" rendering.

use mathpath::citations::{format_answer, CitationPolicy, DEFAULT_CANONICAL_URI};

#[test]
fn no_citations_leaves_answer_untouched() {
    let policy = CitationPolicy::default();
    assert_eq!(format_answer("Hello.", &[], &policy), "Hello.");
}

#[test]
fn canonical_uri_gets_kb_label() {
    let policy = CitationPolicy::default();
    let out = format_answer("Answer.", &[DEFAULT_CANONICAL_URI.to_owned()], &policy);
    assert_eq!(
        out,
        format!("Answer.\n\n**Sources:**\n- [Math Placement KB]({DEFAULT_CANONICAL_URI})")
    );
}

#[test]
fn mixed_citations_render_in_order() {
    let policy = CitationPolicy::default();
    let citations = vec![
        "s3://kb-bucket/faq.pdf".to_owned(),
        "https://example.edu/page".to_owned(),
    ];
    let out = format_answer("A", &citations, &policy);
    assert_eq!(
        out,
        "A\n\n**Sources:**\n- s3://kb-bucket/faq.pdf\n- [Source](https://example.edu/page)"
    );
}

#[test]
fn sources_header_appears_once() {
    let policy = CitationPolicy::default();
    let citations: Vec<String> = (0..3)
        .map(|i| format!("https://example.edu/{i}"))
        .collect();
    let out = format_answer("A", &citations, &policy);
    assert_eq!(out.matches("**Sources:**").count(), 1);
    assert_eq!(out.matches("\n- ").count(), 3);
}
