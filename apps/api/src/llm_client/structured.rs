//! Structured completions: free-text LLM output turned into typed data.
//!
//! Every caller that expects JSON back from the model goes through
//! `complete_structured`. The model is asked to wrap its answer in a
//! triple-backtick fence; the first fenced block is taken, an optional `json`
//! language tag dropped, and the rest parsed strictly into `T`. Nothing is
//! rewritten textually. When parsing fails the model is sent its own output
//! back with a repair instruction, for at most `MAX_ATTEMPTS` calls in total.
//!
//! Outcomes:
//! - `Ok(T)`: parsed on some attempt.
//! - `Err(ExtractionFailed)`: attempts exhausted. Callers treat this as
//!   "nothing extracted for this unit" and carry on.
//! - `Err(Completion)`: the API itself failed. Fatal, propagate.
//!
//! A reply with no content (e.g. a content-filtered completion) is an
//! unparseable reply, not an API failure. It costs one attempt and the same
//! request is sent again.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::llm_client::prompts::{FENCED_JSON_INSTRUCTION, REPAIR_PROMPT_TEMPLATE};
use crate::llm_client::{ChatMessage, CompletionApi, CompletionRequest, LlmError, Role};

/// Total completion calls per unit of work: the first one plus two repairs.
pub const MAX_ATTEMPTS: u32 = 3;

const FENCE: &str = "```";
const LANGUAGE_TAG: &str = "json";
const SHAPE_PLACEHOLDER: &str = "response_shape";

#[derive(Debug, Error)]
pub enum ParseFailure {
    #[error("completion had no content")]
    EmptyReply,

    #[error("no fenced block found in completion")]
    DelimiterNotFound,

    #[error("fenced block does not hold the expected JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StructuredError {
    #[error("extraction failed after {attempts} attempts: {last_failure}")]
    ExtractionFailed {
        attempts: u32,
        last_failure: ParseFailure,
    },

    #[error(transparent)]
    Completion(#[from] LlmError),
}

/// A reply that may be a single object or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// One message of a structured prompt: role, template, and the values bound
/// into its `{placeholders}`. `{response_shape}` is always bound implicitly.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub role: Role,
    pub template: &'static str,
    pub bindings: Vec<(&'static str, String)>,
}

impl ExtractionRequest {
    pub fn system(template: &'static str) -> Self {
        Self {
            role: Role::System,
            template,
            bindings: Vec::new(),
        }
    }

    pub fn user(template: &'static str) -> Self {
        Self {
            role: Role::User,
            template,
            bindings: Vec::new(),
        }
    }

    pub fn bind(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.bindings.push((name, value.into()));
        self
    }

    fn render(&self, response_shape: &str) -> ChatMessage {
        let mut bindings: Vec<(&str, &str)> = self
            .bindings
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect();
        bindings.push((SHAPE_PLACEHOLDER, response_shape));
        ChatMessage {
            role: self.role,
            content: render_template(self.template, &bindings),
        }
    }
}

/// Builds the outbound requests of one structured exchange.
pub trait RequestBuilder: Send + Sync {
    /// Label used in log lines.
    fn label(&self) -> &str;
    fn initial_request(&self) -> CompletionRequest;
    fn repair_request(&self, malformed: &str) -> CompletionRequest;
}

/// The standard `RequestBuilder`: a list of templated messages plus a
/// description of the JSON shape the reply must have.
#[derive(Debug, Clone)]
pub struct StructuredPrompt {
    pub label: &'static str,
    pub response_shape: String,
    pub messages: Vec<ExtractionRequest>,
}

impl StructuredPrompt {
    pub fn new(label: &'static str, response_shape: impl Into<String>) -> Self {
        Self {
            label,
            response_shape: response_shape.into(),
            messages: Vec::new(),
        }
    }

    pub fn message(mut self, request: ExtractionRequest) -> Self {
        self.messages.push(request);
        self
    }
}

impl RequestBuilder for StructuredPrompt {
    fn label(&self) -> &str {
        self.label
    }

    fn initial_request(&self) -> CompletionRequest {
        let mut messages: Vec<ChatMessage> = self
            .messages
            .iter()
            .map(|m| m.render(&self.response_shape))
            .collect();
        let instruction = render_template(
            FENCED_JSON_INSTRUCTION,
            &[(SHAPE_PLACEHOLDER, self.response_shape.as_str())],
        );
        match messages.iter_mut().find(|m| m.role == Role::System) {
            Some(system) => {
                system.content.push_str("\n\n");
                system.content.push_str(&instruction);
            }
            None => messages.insert(0, ChatMessage::system(instruction)),
        }
        CompletionRequest::new(messages)
    }

    fn repair_request(&self, malformed: &str) -> CompletionRequest {
        let content = render_template(
            REPAIR_PROMPT_TEMPLATE,
            &[
                (SHAPE_PLACEHOLDER, self.response_shape.as_str()),
                ("malformed", malformed),
            ],
        );
        CompletionRequest::new(vec![ChatMessage::user(content)])
    }
}

/// Issues the initial request and parses the reply into `T`, running repair
/// round-trips on unparseable replies until `MAX_ATTEMPTS` calls were made.
pub async fn complete_structured<T: DeserializeOwned>(
    api: &dyn CompletionApi,
    builder: &dyn RequestBuilder,
) -> Result<T, StructuredError> {
    let mut request = builder.initial_request();
    let mut attempt = 1;

    loop {
        let raw = match api.complete(&request).await {
            Ok(raw) => raw,
            Err(LlmError::EmptyContent) => String::new(),
            Err(e) => return Err(e.into()),
        };

        match parse_completion::<T>(&raw) {
            Ok(value) => {
                if attempt > 1 {
                    info!("{}: reply repaired on attempt {}", builder.label(), attempt);
                }
                return Ok(value);
            }
            Err((failure, candidate)) => {
                warn!(
                    "{}: attempt {}/{} returned an unparseable reply: {}",
                    builder.label(),
                    attempt,
                    MAX_ATTEMPTS,
                    failure
                );
                if attempt >= MAX_ATTEMPTS {
                    return Err(StructuredError::ExtractionFailed {
                        attempts: attempt,
                        last_failure: failure,
                    });
                }
                if !candidate.is_empty() {
                    request = builder.repair_request(candidate);
                }
                attempt += 1;
            }
        }
    }
}

/// Parses one raw completion. On failure also returns the text to send back
/// for repair: the fenced payload when there was one, else the whole reply.
fn parse_completion<T: DeserializeOwned>(raw: &str) -> Result<T, (ParseFailure, &str)> {
    if raw.trim().is_empty() {
        return Err((ParseFailure::EmptyReply, ""));
    }
    let payload = fenced_payload(raw).map_err(|e| (e, raw.trim()))?;
    serde_json::from_str(payload).map_err(|e| (ParseFailure::InvalidJson(e), payload))
}

/// Returns the contents of the first fenced block, minus a leading `json` tag.
pub fn fenced_payload(raw: &str) -> Result<&str, ParseFailure> {
    let mut segments = raw.split(FENCE);
    segments.next();
    match (segments.next(), segments.next()) {
        (Some(inner), Some(_)) => {
            let inner = inner.strip_prefix(LANGUAGE_TAG).unwrap_or(inner);
            Ok(inner.trim())
        }
        _ => Err(ParseFailure::DelimiterNotFound),
    }
}

/// Single-pass `{name}` substitution. Unknown or unterminated braces are
/// copied through untouched, so JSON examples survive and bound values are
/// never re-expanded.
pub fn render_template(template: &str, bindings: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let bound = after.find('}').and_then(|close| {
            let name = &after[..close];
            bindings
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match bound {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
