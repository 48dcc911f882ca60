//! MathPath: a math placement guidance assistant.
//!
//! A student signs in by email, is matched to a record in the student
//! directory, and asks questions. Each question is answered by a Bedrock
//! knowledge base using a prompt that carries the student's record, and the
//! answer comes back with its source citations rendered as markdown.
//!
//! Pipeline per question:
//! [`summary::derive_flags`] → [`prompt::compose_full_prompt`] →
//! [`retrieval::RetrievalService`] → [`citations::format_answer`], driven by
//! [`assistant::Assistant::process_user_question`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod credentials;
pub mod logging;

pub mod students;
pub mod summary;

pub mod prompt;

pub mod citations;
pub mod retrieval;

pub mod assistant;
