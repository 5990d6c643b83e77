//! Tool handler trait — the interface every dialogue tool implements.
//!
//! Handlers receive validated arguments and exclusive access to the
//! session record, and report back through [`HandlerOutcome`] instead of
//! side-effecting callbacks: the engine interprets the outcome to decide
//! what enters the transcript and whether the node changes.

use async_trait::async_trait;
use serde_json::{Map, Value};

// ─────────────────────────────────────────────
// Arguments
// ─────────────────────────────────────────────

/// Parsed, schema-validated arguments handed to a handler.
#[derive(Clone, Debug, Default)]
pub struct ToolArgs {
    map: Map<String, Value>,
}

impl ToolArgs {
    /// Wrap a validated argument object.
    pub fn new(map: Map<String, Value>) -> Self {
        ToolArgs { map }
    }

    /// Raw access to an argument value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    /// Extract a required string argument.
    pub fn require_str(&self, key: &str) -> anyhow::Result<&str> {
        self.map
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Missing required parameter: {key}"))
    }

    /// Extract an optional string argument.
    pub fn optional_str(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(|v| v.as_str())
    }

    /// Extract a required non-negative integer argument.
    pub fn require_u32(&self, key: &str) -> anyhow::Result<u32> {
        self.map
            .get(key)
            .and_then(|v| v.as_u64())
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| anyhow::anyhow!("Missing or invalid integer parameter: {key}"))
    }

    /// Extract a required float argument (integers widen).
    pub fn require_f64(&self, key: &str) -> anyhow::Result<f64> {
        self.map
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| anyhow::anyhow!("Missing or invalid number parameter: {key}"))
    }

    /// Extract a string-array argument; absent means empty.
    pub fn str_array(&self, key: &str) -> Vec<String> {
        self.map
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Extract an object-array argument; absent means empty.
    pub fn object_array(&self, key: &str) -> Vec<&Map<String, Value>> {
        self.map
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_object()).collect())
            .unwrap_or_default()
    }
}

// ─────────────────────────────────────────────
// Outcome
// ─────────────────────────────────────────────

/// What a handler produced.
#[derive(Clone, Debug, PartialEq)]
pub enum HandlerOutcome {
    /// The tool succeeded. `response` (if any) is appended to the transcript
    /// as a system message; `transition_to` overrides the schema's declared
    /// target when set.
    Success {
        response: Option<String>,
        transition_to: Option<String>,
    },
    /// The tool failed recoverably. `response` is appended as a corrective
    /// system message and the node is unchanged.
    Failure { response: String },
}

impl HandlerOutcome {
    /// Success with a result message for the model.
    pub fn success(response: impl Into<String>) -> Self {
        HandlerOutcome::Success {
            response: Some(response.into()),
            transition_to: None,
        }
    }

    /// Success with nothing to add to the transcript.
    pub fn success_silent() -> Self {
        HandlerOutcome::Success {
            response: None,
            transition_to: None,
        }
    }

    /// Success that redirects the flow somewhere other than the schema's
    /// declared target.
    pub fn success_with_transition(response: impl Into<String>, target: &str) -> Self {
        HandlerOutcome::Success {
            response: Some(response.into()),
            transition_to: Some(target.to_string()),
        }
    }

    /// Recoverable failure with a corrective instruction.
    pub fn failure(response: impl Into<String>) -> Self {
        HandlerOutcome::Failure {
            response: response.into(),
        }
    }

    /// Whether this outcome blocks the transition.
    pub fn is_failure(&self) -> bool {
        matches!(self, HandlerOutcome::Failure { .. })
    }
}

// ─────────────────────────────────────────────
// Handler trait
// ─────────────────────────────────────────────

/// A dialogue tool implementation, generic over the session record type.
///
/// Handlers mutate the record only through the `&mut` they are given — the
/// engine owns the record for the session's lifetime and nothing else may
/// touch it. `Err` returns are caught at the dispatcher boundary and
/// converted into a generic failure outcome; they never end the session.
#[async_trait]
pub trait ToolHandler<R>: Send + Sync {
    async fn handle(&self, args: &ToolArgs, record: &mut R) -> anyhow::Result<HandlerOutcome>;
}
