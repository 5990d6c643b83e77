//! Voxflow flow engine — the dialogue state machine.
//!
//! This crate contains:
//! - **graph**: static flow definition (nodes, typed tool schemas, actions)
//!   with construction-time validation
//! - **handler**: the tool handler trait and its outcome type
//! - **dispatch**: tool-call resolution, argument validation, and execution
//! - **actions**: pre/post node actions and the termination timer
//! - **engine**: the per-session state machine and run loop

pub mod actions;
pub mod dispatch;
pub mod engine;
pub mod graph;
pub mod handler;

pub use actions::{ActionExecutor, TerminationTimer};
pub use dispatch::{DispatchOutcome, ToolInvocationDispatcher};
pub use engine::{EngineError, EngineSettings, EngineState, FlowEngine};
pub use graph::{Action, FlowGraph, GraphError, Node, ParamField, ParamKind, ParamSpec, ToolSchema};
pub use handler::{HandlerOutcome, ToolArgs, ToolHandler};
