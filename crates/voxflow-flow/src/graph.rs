//! Flow graph — the static definition of a dialogue.
//!
//! A graph is a set of nodes, each declaring its entry messages, the tools
//! advertised while the conversation sits in that node, and the actions run
//! around entry and exit. Edges are implicit in each tool's transition
//! target. Nodes are immutable after construction; `FlowGraph::new`
//! validates the whole graph up front so nothing needs checking at call
//! time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;

use voxflow_core::types::ToolDefinition;

// ─────────────────────────────────────────────
// Actions
// ─────────────────────────────────────────────

/// A side-effecting action attached to a node.
///
/// Pre-actions run before the node's first LLM submission; post-actions run
/// after the node's final assistant utterance has been flushed downstream.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Emit a fixed utterance to the transport.
    Announce { text: String },
    /// Verify external readiness. Log-only: it does not block the flow.
    PreconditionCheck { name: String },
    /// Schedule session end after a grace delay, in whole seconds.
    Terminate { grace_secs: u64 },
}

impl Action {
    /// Convenience constructor for an announce action.
    pub fn announce(text: impl Into<String>) -> Self {
        Action::Announce { text: text.into() }
    }

    /// Convenience constructor for a precondition check.
    pub fn precondition_check(name: impl Into<String>) -> Self {
        Action::PreconditionCheck { name: name.into() }
    }

    /// Convenience constructor for a terminate action.
    pub fn terminate(grace_secs: u64) -> Self {
        Action::Terminate { grace_secs }
    }
}

// ─────────────────────────────────────────────
// Typed parameter descriptors
// ─────────────────────────────────────────────

/// The type of a single tool parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    /// String constrained to a fixed set of values.
    Enumeration(Vec<String>),
    /// Array of strings, optionally constrained to a fixed set.
    StringArray { allowed: Option<Vec<String>> },
    /// Array of objects whose named fields are all strings.
    ObjectArray { fields: Vec<String> },
}

/// One named, typed tool parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamField {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
}

impl ParamField {
    fn new(name: &str, kind: ParamKind, description: &str) -> Self {
        ParamField {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: false,
        }
    }

    pub fn string(name: &str, description: &str) -> Self {
        Self::new(name, ParamKind::String, description)
    }

    pub fn integer(name: &str, description: &str) -> Self {
        Self::new(name, ParamKind::Integer, description)
    }

    pub fn number(name: &str, description: &str) -> Self {
        Self::new(name, ParamKind::Number, description)
    }

    pub fn boolean(name: &str, description: &str) -> Self {
        Self::new(name, ParamKind::Boolean, description)
    }

    pub fn enumeration(name: &str, description: &str, values: &[&str]) -> Self {
        Self::new(
            name,
            ParamKind::Enumeration(values.iter().map(|v| v.to_string()).collect()),
            description,
        )
    }

    pub fn string_array(name: &str, description: &str, allowed: Option<&[&str]>) -> Self {
        Self::new(
            name,
            ParamKind::StringArray {
                allowed: allowed.map(|vs| vs.iter().map(|v| v.to_string()).collect()),
            },
            description,
        )
    }

    pub fn object_array(name: &str, description: &str, fields: &[&str]) -> Self {
        Self::new(
            name,
            ParamKind::ObjectArray {
                fields: fields.iter().map(|f| f.to_string()).collect(),
            },
            description,
        )
    }

    /// Mark this parameter as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// JSON-Schema fragment for this field.
    fn to_json_schema(&self) -> Value {
        let mut schema = match &self.kind {
            ParamKind::String => json!({ "type": "string" }),
            ParamKind::Integer => json!({ "type": "integer" }),
            ParamKind::Number => json!({ "type": "number" }),
            ParamKind::Boolean => json!({ "type": "boolean" }),
            ParamKind::Enumeration(values) => json!({ "type": "string", "enum": values }),
            ParamKind::StringArray { allowed } => match allowed {
                Some(values) => json!({
                    "type": "array",
                    "items": { "type": "string", "enum": values }
                }),
                None => json!({ "type": "array", "items": { "type": "string" } }),
            },
            ParamKind::ObjectArray { fields } => {
                let props: serde_json::Map<String, Value> = fields
                    .iter()
                    .map(|f| (f.clone(), json!({ "type": "string" })))
                    .collect();
                json!({
                    "type": "array",
                    "items": { "type": "object", "properties": props, "required": fields }
                })
            }
        };
        schema["description"] = Value::String(self.description.clone());
        schema
    }

    /// Check a provided value against this field's kind.
    fn check(&self, value: &Value) -> Result<(), String> {
        match &self.kind {
            ParamKind::String => {
                if !value.is_string() {
                    return Err(format!("'{}' must be a string", self.name));
                }
            }
            ParamKind::Integer => {
                if !value.is_i64() && !value.is_u64() {
                    return Err(format!("'{}' must be an integer", self.name));
                }
            }
            ParamKind::Number => {
                if !value.is_number() {
                    return Err(format!("'{}' must be a number", self.name));
                }
            }
            ParamKind::Boolean => {
                if !value.is_boolean() {
                    return Err(format!("'{}' must be a boolean", self.name));
                }
            }
            ParamKind::Enumeration(values) => {
                let s = value
                    .as_str()
                    .ok_or_else(|| format!("'{}' must be a string", self.name))?;
                if !values.iter().any(|v| v == s) {
                    return Err(format!(
                        "'{}' must be one of: {}",
                        self.name,
                        values.join(", ")
                    ));
                }
            }
            ParamKind::StringArray { allowed } => {
                let items = value
                    .as_array()
                    .ok_or_else(|| format!("'{}' must be an array", self.name))?;
                for item in items {
                    let s = item
                        .as_str()
                        .ok_or_else(|| format!("'{}' entries must be strings", self.name))?;
                    if let Some(values) = allowed {
                        if !values.iter().any(|v| v == s) {
                            return Err(format!(
                                "'{}' entry '{}' must be one of: {}",
                                self.name,
                                s,
                                values.join(", ")
                            ));
                        }
                    }
                }
            }
            ParamKind::ObjectArray { fields } => {
                let items = value
                    .as_array()
                    .ok_or_else(|| format!("'{}' must be an array", self.name))?;
                for item in items {
                    let obj = item
                        .as_object()
                        .ok_or_else(|| format!("'{}' entries must be objects", self.name))?;
                    for field in fields {
                        match obj.get(field) {
                            Some(v) if v.is_string() => {}
                            Some(_) => {
                                return Err(format!(
                                    "'{}' entry field '{}' must be a string",
                                    self.name, field
                                ))
                            }
                            None => {
                                return Err(format!(
                                    "'{}' entries must include '{}'",
                                    self.name, field
                                ))
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// The full parameter descriptor of a tool.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamSpec {
    pub fields: Vec<ParamField>,
}

impl ParamSpec {
    /// An empty spec (parameterless tool).
    pub fn empty() -> Self {
        ParamSpec::default()
    }

    /// Render the spec as a JSON-Schema object for the provider.
    pub fn to_json_schema(&self) -> Value {
        let props: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.to_json_schema()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();
        json!({ "type": "object", "properties": props, "required": required })
    }

    /// Validate an argument object against the spec.
    ///
    /// Unknown keys are tolerated (models pad their calls); missing required
    /// fields and type mismatches are not.
    pub fn validate(&self, args: &serde_json::Map<String, Value>) -> Result<(), String> {
        for field in &self.fields {
            match args.get(&field.name) {
                Some(value) => field.check(value)?,
                None if field.required => {
                    return Err(format!("missing required parameter '{}'", field.name))
                }
                None => {}
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Tool schemas
// ─────────────────────────────────────────────

/// A tool advertised by a node: name, description, typed parameters, and an
/// optional transition target. Tools without a target are "local" — their
/// handler runs but the conversation stays in the node.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub params: ParamSpec,
    pub transition_to: Option<String>,
}

impl ToolSchema {
    /// Create a parameterless local tool.
    pub fn new(name: &str, description: &str) -> Self {
        ToolSchema {
            name: name.to_string(),
            description: description.to_string(),
            params: ParamSpec::empty(),
            transition_to: None,
        }
    }

    /// Add a parameter (builder).
    pub fn param(mut self, field: ParamField) -> Self {
        self.params.fields.push(field);
        self
    }

    /// Declare the transition target (builder).
    pub fn transitions_to(mut self, node_id: &str) -> Self {
        self.transition_to = Some(node_id.to_string());
        self
    }

    /// The LLM-facing definition of this tool.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(&self.name, &self.description, self.params.to_json_schema())
    }
}

// ─────────────────────────────────────────────
// Nodes
// ─────────────────────────────────────────────

/// A single stage of the dialogue.
///
/// `role_messages` establish the persona and are appended only when the
/// session starts in this node; `task_messages` are appended on every
/// entry.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: String,
    role_messages: Vec<String>,
    task_messages: Vec<String>,
    pub tools: Vec<ToolSchema>,
    pub pre_actions: Vec<Action>,
    pub post_actions: Vec<Action>,
    /// Precomputed LLM-facing definitions; applying a node's tool set is an
    /// `Arc` swap. Populated by `FlowGraph::new`.
    definitions: Arc<[ToolDefinition]>,
}

impl Node {
    /// Create an empty node (builder).
    pub fn new(id: &str) -> Self {
        Node {
            id: id.to_string(),
            role_messages: Vec::new(),
            task_messages: Vec::new(),
            tools: Vec::new(),
            pre_actions: Vec::new(),
            post_actions: Vec::new(),
            definitions: Arc::from(Vec::new()),
        }
    }

    pub fn role_message(mut self, content: &str) -> Self {
        self.role_messages.push(content.to_string());
        self
    }

    pub fn task_message(mut self, content: &str) -> Self {
        self.task_messages.push(content.to_string());
        self
    }

    pub fn tool(mut self, schema: ToolSchema) -> Self {
        self.tools.push(schema);
        self
    }

    pub fn pre_action(mut self, action: Action) -> Self {
        self.pre_actions.push(action);
        self
    }

    pub fn post_action(mut self, action: Action) -> Self {
        self.post_actions.push(action);
        self
    }

    /// The persona messages appended when a session starts in this node.
    pub fn role_messages(&self) -> &[String] {
        &self.role_messages
    }

    /// The task messages appended on every entry into this node.
    pub fn task_messages(&self) -> &[String] {
        &self.task_messages
    }

    /// The precomputed LLM-facing tool definitions.
    pub fn tool_definitions(&self) -> Arc<[ToolDefinition]> {
        self.definitions.clone()
    }

    /// Whether this node is terminal (advertises no tools).
    pub fn is_terminal(&self) -> bool {
        self.tools.is_empty()
    }

    /// Find a declared tool by name.
    pub fn find_tool(&self, name: &str) -> Option<&ToolSchema> {
        self.tools.iter().find(|t| t.name == name)
    }
}

// ─────────────────────────────────────────────
// Graph
// ─────────────────────────────────────────────

/// Errors rejected at graph construction.
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("initial node '{0}' is not defined")]
    MissingInitial(String),
    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),
    #[error("node '{node}' declares duplicate tool '{tool}'")]
    DuplicateTool { node: String, tool: String },
    #[error("node '{node}' tool '{tool}' transitions to undefined node '{target}'")]
    DanglingTransition {
        node: String,
        tool: String,
        target: String,
    },
    #[error("node '{0}' is unreachable from the initial node")]
    Unreachable(String),
    #[error("terminal node '{0}' has no terminate post-action")]
    MissingTerminate(String),
    #[error("node '{0}' has a terminate action in its pre-actions")]
    TerminateInPreActions(String),
}

/// A validated, immutable dialogue graph.
#[derive(Debug)]
pub struct FlowGraph {
    initial: String,
    nodes: HashMap<String, Node>,
}

impl FlowGraph {
    /// Build and validate a graph.
    pub fn new(initial: &str, nodes: Vec<Node>) -> Result<Self, GraphError> {
        let mut map: HashMap<String, Node> = HashMap::new();
        for mut node in nodes {
            if map.contains_key(&node.id) {
                return Err(GraphError::DuplicateNode(node.id));
            }

            {
                let mut seen: HashSet<&str> = HashSet::new();
                for tool in &node.tools {
                    if !seen.insert(tool.name.as_str()) {
                        return Err(GraphError::DuplicateTool {
                            node: node.id.clone(),
                            tool: tool.name.clone(),
                        });
                    }
                }
            }

            if node
                .pre_actions
                .iter()
                .any(|a| matches!(a, Action::Terminate { .. }))
            {
                return Err(GraphError::TerminateInPreActions(node.id));
            }

            if node.is_terminal()
                && !node
                    .post_actions
                    .iter()
                    .any(|a| matches!(a, Action::Terminate { .. }))
            {
                return Err(GraphError::MissingTerminate(node.id));
            }

            node.definitions = Arc::from(
                node.tools
                    .iter()
                    .map(ToolSchema::to_definition)
                    .collect::<Vec<_>>(),
            );
            map.insert(node.id.clone(), node);
        }

        if !map.contains_key(initial) {
            return Err(GraphError::MissingInitial(initial.to_string()));
        }

        // Every declared transition target must exist
        for node in map.values() {
            for tool in &node.tools {
                if let Some(target) = &tool.transition_to {
                    if !map.contains_key(target) {
                        return Err(GraphError::DanglingTransition {
                            node: node.id.clone(),
                            tool: tool.name.clone(),
                            target: target.clone(),
                        });
                    }
                }
            }
        }

        // Every node must be reachable from the initial node via some
        // sequence of declared transitions
        let reachable = reachable_from(initial, &map);
        for id in map.keys() {
            if !reachable.contains(id.as_str()) {
                return Err(GraphError::Unreachable(id.clone()));
            }
        }

        Ok(FlowGraph {
            initial: initial.to_string(),
            nodes: map,
        })
    }

    /// The designated initial node id.
    pub fn initial(&self) -> &str {
        &self.initial
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Whether a node id names a terminal node.
    pub fn is_terminal(&self, id: &str) -> bool {
        self.nodes.get(id).map(Node::is_terminal).unwrap_or(false)
    }

    /// All node ids, sorted for determinism.
    pub fn node_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes (never true for a validated graph).
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// BFS over declared transition targets.
fn reachable_from<'a>(initial: &'a str, nodes: &'a HashMap<String, Node>) -> HashSet<&'a str> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    seen.insert(initial);
    queue.push_back(initial);

    while let Some(id) = queue.pop_front() {
        if let Some(node) = nodes.get(id) {
            for tool in &node.tools {
                if let Some(target) = &tool.transition_to {
                    if seen.insert(target.as_str()) {
                        queue.push_back(target.as_str());
                    }
                }
            }
        }
    }
    seen
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
