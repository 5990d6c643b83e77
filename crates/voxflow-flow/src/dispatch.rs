//! Tool invocation dispatcher — resolves a model's tool-call request
//! against the current node, validates the arguments, runs the handler,
//! and converts every failure mode into a corrective system message.
//!
//! A request for a tool outside the current node's declared set is a
//! protocol violation by the model (stale or hallucinated tool); it is
//! rejected before the session record is touched and must never crash the
//! session.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use voxflow_core::types::ToolCallRequest;
use voxflow_core::utils::truncate_string;

use crate::graph::Node;
use crate::handler::{HandlerOutcome, ToolArgs, ToolHandler};

/// Generic corrective instruction for handler faults. The caller hears an
/// apology, never the underlying error.
const GENERIC_FAILURE: &str =
    "That request could not be completed. Apologize briefly to the caller and continue the conversation.";

/// Result of dispatching one tool-call request.
#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    /// The call succeeded. `transition_to` is the resolved target: the
    /// handler's override if it gave one, otherwise the schema's.
    Success {
        response: Option<String>,
        transition_to: Option<String>,
    },
    /// The call was rejected or failed recoverably. `correction` is a
    /// system-authored instruction; the node is unchanged.
    Rejected { correction: String },
}

/// Registry of tool handlers plus the dispatch logic, generic over the
/// session record type.
pub struct ToolInvocationDispatcher<R> {
    handlers: HashMap<String, Arc<dyn ToolHandler<R>>>,
}

impl<R: Send> ToolInvocationDispatcher<R> {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        ToolInvocationDispatcher {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler. Overwrites any previous handler with the same name.
    pub fn register(&mut self, name: &str, handler: Arc<dyn ToolHandler<R>>) {
        debug!(tool = name, "registered tool handler");
        self.handlers.insert(name.to_string(), handler);
    }

    /// Whether a handler is registered under `name`.
    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch one request against the current node's declared tool set.
    ///
    /// The request is consumed: it is resolved, validated, and executed
    /// exactly once. Tools with a transition but no registered handler
    /// dispatch as a pure transition.
    pub async fn dispatch(
        &self,
        request: ToolCallRequest,
        node: &Node,
        record: &mut R,
    ) -> DispatchOutcome {
        let schema = match node.find_tool(&request.name) {
            Some(s) => s,
            None => {
                warn!(
                    tool = %request.name,
                    node = %node.id,
                    "tool call outside the active set rejected"
                );
                return DispatchOutcome::Rejected {
                    correction: format!(
                        "The tool '{}' is not available right now. Continue the conversation \
                         using only the currently offered tools.",
                        request.name
                    ),
                };
            }
        };

        let args_map = match request.parse_arguments() {
            Ok(map) => map,
            Err(reason) => {
                warn!(tool = %request.name, reason = %reason, "malformed tool arguments");
                return DispatchOutcome::Rejected {
                    correction: format!(
                        "The arguments for '{}' could not be read ({reason}). \
                         Gather the details again and retry the call.",
                        request.name
                    ),
                };
            }
        };

        if let Err(reason) = schema.params.validate(&args_map) {
            debug!(tool = %request.name, reason = %reason, "argument validation failed");
            return DispatchOutcome::Rejected {
                correction: format!(
                    "The arguments for '{}' were invalid: {reason}. \
                     Ask the caller for the missing or corrected details, then call it again.",
                    request.name
                ),
            };
        }

        let handler = match self.handlers.get(&request.name) {
            Some(h) => h,
            None => {
                // Pure transition tool — nothing to execute
                return DispatchOutcome::Success {
                    response: None,
                    transition_to: schema.transition_to.clone(),
                };
            }
        };

        info!(
            tool = %request.name,
            call_id = %request.call_id,
            args = %truncate_string(&request.arguments, 120),
            "executing tool handler"
        );

        match handler.handle(&ToolArgs::new(args_map), record).await {
            Ok(HandlerOutcome::Success {
                response,
                transition_to,
            }) => DispatchOutcome::Success {
                response,
                transition_to: transition_to.or_else(|| schema.transition_to.clone()),
            },
            Ok(HandlerOutcome::Failure { response }) => {
                debug!(tool = %request.name, "handler reported failure");
                DispatchOutcome::Rejected {
                    correction: response,
                }
            }
            Err(e) => {
                warn!(tool = %request.name, error = %e, "handler fault");
                DispatchOutcome::Rejected {
                    correction: GENERIC_FAILURE.to_string(),
                }
            }
        }
    }
}

impl<R: Send> Default for ToolInvocationDispatcher<R> {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
