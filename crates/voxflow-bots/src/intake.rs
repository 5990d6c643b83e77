//! Patient intake flow — identity gate, then four collection stages.
//!
//! The session starts behind a birthday verification gate; a wrong answer
//! keeps the conversation in the gate with a corrective re-prompt. Once
//! verified, the flow walks through prescriptions, allergies, conditions,
//! and visit reasons, storing structured entries in the session record.
//! A weather lookup is available as a local tool in the gate node for the
//! small talk that tends to happen at the top of a call.

use std::sync::Arc;

use async_trait::async_trait;

use voxflow_flow::graph::{Action, FlowGraph, Node, ParamField, ToolSchema};
use voxflow_flow::handler::{HandlerOutcome, ToolArgs, ToolHandler};
use voxflow_flow::ToolInvocationDispatcher;

use crate::lookup::WeatherLookup;

/// Expected birthday used by the demo assistant.
pub const DEMO_BIRTHDAY: &str = "1983-01-01";

// ─────────────────────────────────────────────
// Session record
// ─────────────────────────────────────────────

/// One prescription entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Prescription {
    pub medication: String,
    pub dosage: String,
}

/// Everything collected during an intake session.
#[derive(Clone, Debug, Default)]
pub struct IntakeRecord {
    pub verified: bool,
    pub prescriptions: Vec<Prescription>,
    pub allergies: Vec<String>,
    pub conditions: Vec<String>,
    pub visit_reasons: Vec<String>,
}

// ─────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────

/// The identity gate: exact birthday match or the node doesn't change.
struct VerifyBirthdayHandler {
    expected: String,
}

#[async_trait]
impl ToolHandler<IntakeRecord> for VerifyBirthdayHandler {
    async fn handle(&self, args: &ToolArgs, record: &mut IntakeRecord) -> anyhow::Result<HandlerOutcome> {
        let birthday = args.require_str("birthday")?;
        if birthday == self.expected {
            record.verified = true;
            Ok(HandlerOutcome::success(
                "Identity confirmed. Thank the user for confirming their identity, then ask \
                 them to list their current prescriptions. Each prescription needs a \
                 medication name and a dosage; do not record unknown dosages.",
            ))
        } else {
            Ok(HandlerOutcome::failure(
                "The user provided an incorrect birthday. Ask them for their birthday \
                 again, and when they answer, call the verify_birthday function.",
            ))
        }
    }
}

/// Current weather for small talk. Local tool; failures become apologies.
struct GetWeatherHandler {
    lookup: WeatherLookup,
}

#[async_trait]
impl ToolHandler<IntakeRecord> for GetWeatherHandler {
    async fn handle(&self, args: &ToolArgs, _record: &mut IntakeRecord) -> anyhow::Result<HandlerOutcome> {
        let lat = args.require_f64("lat")?;
        let lon = args.require_f64("lon")?;

        match self.lookup.current(lat, lon).await {
            Some(report) => Ok(HandlerOutcome::success(report.spoken())),
            None => Ok(HandlerOutcome::failure(
                "The weather service is not responding. Apologize and offer to try again \
                 in a little while.",
            )),
        }
    }
}

/// Store the prescriptions list.
struct ListPrescriptionsHandler;

#[async_trait]
impl ToolHandler<IntakeRecord> for ListPrescriptionsHandler {
    async fn handle(&self, args: &ToolArgs, record: &mut IntakeRecord) -> anyhow::Result<HandlerOutcome> {
        for entry in args.object_array("prescriptions") {
            record.prescriptions.push(Prescription {
                medication: entry
                    .get("medication")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                dosage: entry
                    .get("dosage")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        Ok(HandlerOutcome::success_silent())
    }
}

/// Store a named list (allergies, conditions, visit reasons).
struct ListNamesHandler {
    key: &'static str,
    target: fn(&mut IntakeRecord) -> &mut Vec<String>,
}

#[async_trait]
impl ToolHandler<IntakeRecord> for ListNamesHandler {
    async fn handle(&self, args: &ToolArgs, record: &mut IntakeRecord) -> anyhow::Result<HandlerOutcome> {
        let names: Vec<String> = args
            .object_array(self.key)
            .iter()
            .filter_map(|entry| entry.get("name").and_then(|v| v.as_str()))
            .map(String::from)
            .collect();
        (self.target)(record).extend(names);
        Ok(HandlerOutcome::success_silent())
    }
}

// ─────────────────────────────────────────────
// Flow definition
// ─────────────────────────────────────────────

/// Build the intake flow graph. `grace_secs` is the goodbye grace delay.
pub fn intake_flow(grace_secs: u64) -> FlowGraph {
    FlowGraph::new(
        "start",
        vec![
            Node::new("start")
                .role_message(
                    "You are Jessica, a friendly and helpful assistant on a phone call, \
                     collecting intake information ahead of a doctor's visit. Keep your \
                     responses concise but warm, acknowledge what the user says before \
                     moving on, and never rush them. You can also answer weather questions: \
                     convert the city to coordinates yourself and use the get_weather \
                     function.",
                )
                .task_message(
                    "Warmly introduce yourself, explain that you need to verify the user's \
                     identity before collecting their information, and ask for their \
                     birthday. When they answer, call verify_birthday — in any format the \
                     user gives it, normalized to YYYY-MM-DD.",
                )
                .tool(
                    ToolSchema::new(
                        "verify_birthday",
                        "Verify the user has provided their correct birthday.",
                    )
                    .param(
                        ParamField::string("birthday", "The user's birthdate as YYYY-MM-DD")
                            .required(),
                    )
                    .transitions_to("prescriptions"),
                )
                .tool(
                    ToolSchema::new("get_weather", "Get the current weather using coordinates.")
                        .param(ParamField::number("lat", "Latitude of the location (-90 to 90)").required())
                        .param(ParamField::number("lon", "Longitude of the location (-180 to 180)").required()),
                ),
            Node::new("prescriptions")
                .task_message(
                    "Ask the user to list their current prescriptions, each with a medication \
                     name and a dosage. Once they have listed them (or said they have none), \
                     call list_prescriptions.",
                )
                .tool(
                    ToolSchema::new(
                        "list_prescriptions",
                        "Record the user's current prescription medications.",
                    )
                    .param(ParamField::object_array(
                        "prescriptions",
                        "The prescriptions, each with a medication name and dosage",
                        &["medication", "dosage"],
                    ))
                    .transitions_to("allergies"),
                ),
            Node::new("allergies")
                .task_message(
                    "Ask the user if they have any allergies. Once they have listed them or \
                     confirmed they have none, call list_allergies.",
                )
                .tool(
                    ToolSchema::new("list_allergies", "Record the user's allergies.")
                        .param(ParamField::object_array(
                            "allergies",
                            "The things the user is allergic to",
                            &["name"],
                        ))
                        .transitions_to("conditions"),
                ),
            Node::new("conditions")
                .task_message(
                    "Ask the user if they have any medical conditions the doctor should know \
                     about. Once they have answered, call list_conditions.",
                )
                .tool(
                    ToolSchema::new("list_conditions", "Record the user's medical conditions.")
                        .param(ParamField::object_array(
                            "conditions",
                            "The user's medical conditions",
                            &["name"],
                        ))
                        .transitions_to("visit_reasons"),
                ),
            Node::new("visit_reasons")
                .task_message(
                    "Finally, ask the user the reason for their doctor visit today. Once they \
                     answer, call list_visit_reasons.",
                )
                .tool(
                    ToolSchema::new("list_visit_reasons", "Record the reasons for today's visit.")
                        .param(ParamField::object_array(
                            "visit_reasons",
                            "The reasons for the visit",
                            &["name"],
                        ))
                        .transitions_to("end"),
                ),
            Node::new("end")
                .task_message("Now thank the user and end the conversation.")
                .post_action(Action::announce("Thanks for calling. Take care!"))
                .post_action(Action::terminate(grace_secs)),
        ],
    )
    .expect("intake flow graph is valid")
}

/// Register the intake flow's handlers.
pub fn intake_dispatcher(
    expected_birthday: &str,
    lookup: WeatherLookup,
) -> ToolInvocationDispatcher<IntakeRecord> {
    let mut dispatcher = ToolInvocationDispatcher::new();
    dispatcher.register(
        "verify_birthday",
        Arc::new(VerifyBirthdayHandler {
            expected: expected_birthday.to_string(),
        }),
    );
    dispatcher.register("get_weather", Arc::new(GetWeatherHandler { lookup }));
    dispatcher.register("list_prescriptions", Arc::new(ListPrescriptionsHandler));
    dispatcher.register(
        "list_allergies",
        Arc::new(ListNamesHandler {
            key: "allergies",
            target: |r| &mut r.allergies,
        }),
    );
    dispatcher.register(
        "list_conditions",
        Arc::new(ListNamesHandler {
            key: "conditions",
            target: |r| &mut r.conditions,
        }),
    );
    dispatcher.register(
        "list_visit_reasons",
        Arc::new(ListNamesHandler {
            key: "visit_reasons",
            target: |r| &mut r.visit_reasons,
        }),
    );
    dispatcher
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use voxflow_core::types::{Role, ToolCallRequest};
    use voxflow_flow::{EngineSettings, FlowEngine};

    fn make_engine() -> (
        FlowEngine<IntakeRecord>,
        mpsc::Receiver<voxflow_core::events::EngineEvent>,
    ) {
        let (tx, rx) = mpsc::channel(64);
        (
            FlowEngine::new(
                Arc::new(intake_flow(0)),
                intake_dispatcher(DEMO_BIRTHDAY, WeatherLookup::new(1)),
                IntakeRecord::default(),
                "intake-test",
                tx,
                EngineSettings::default(),
                None,
            ),
            rx,
        )
    }

    fn call(name: &str, args: &str) -> ToolCallRequest {
        ToolCallRequest::new("call_test", name, args)
    }

    #[test]
    fn test_flow_builds() {
        let flow = intake_flow(5);
        assert_eq!(flow.initial(), "start");
        assert!(flow.is_terminal("end"));
        assert_eq!(flow.len(), 6);
    }

    #[tokio::test]
    async fn test_gate_advertises_only_start_tools() {
        let (mut engine, _rx) = make_engine();
        engine.initialize().await.unwrap();

        let mut names: Vec<&str> = engine
            .context()
            .active_tools()
            .iter()
            .map(|d| d.function.name.as_str())
            .collect();
        names.sort_unstable();
        assert_eq!(names, vec!["get_weather", "verify_birthday"]);
    }

    #[tokio::test]
    async fn test_wrong_birthday_stays_in_gate() {
        let (mut engine, _rx) = make_engine();
        engine.initialize().await.unwrap();

        engine
            .handle_tool_call(call("verify_birthday", r#"{"birthday": "1990-06-15"}"#))
            .await
            .unwrap();

        assert_eq!(engine.current_node(), "start");
        assert!(!engine.record().verified);
        let last = engine.context().messages().last().unwrap();
        assert_eq!(last.role, Role::System);
        assert!(last.content.contains("incorrect birthday"));
    }

    #[tokio::test]
    async fn test_correct_birthday_opens_gate() {
        let (mut engine, _rx) = make_engine();
        engine.initialize().await.unwrap();

        engine
            .handle_tool_call(call("verify_birthday", r#"{"birthday": "1983-01-01"}"#))
            .await
            .unwrap();

        assert_eq!(engine.current_node(), "prescriptions");
        assert!(engine.record().verified);

        // The advertised set now equals exactly the prescriptions node's tools
        let names: Vec<&str> = engine
            .context()
            .active_tools()
            .iter()
            .map(|d| d.function.name.as_str())
            .collect();
        assert_eq!(names, vec!["list_prescriptions"]);
    }

    #[tokio::test]
    async fn test_collection_stages_store_entries() {
        let (mut engine, _rx) = make_engine();
        engine.initialize().await.unwrap();

        engine
            .handle_tool_call(call("verify_birthday", r#"{"birthday": "1983-01-01"}"#))
            .await
            .unwrap();
        engine
            .handle_tool_call(call(
                "list_prescriptions",
                r#"{"prescriptions": [{"medication": "lisinopril", "dosage": "10mg"}]}"#,
            ))
            .await
            .unwrap();
        engine
            .handle_tool_call(call("list_allergies", r#"{"allergies": [{"name": "peanuts"}]}"#))
            .await
            .unwrap();
        engine
            .handle_tool_call(call("list_conditions", r#"{"conditions": []}"#))
            .await
            .unwrap();
        engine
            .handle_tool_call(call(
                "list_visit_reasons",
                r#"{"visit_reasons": [{"name": "annual checkup"}]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(engine.current_node(), "end");
        let record = engine.record();
        assert_eq!(
            record.prescriptions,
            vec![Prescription {
                medication: "lisinopril".into(),
                dosage: "10mg".into()
            }]
        );
        assert_eq!(record.allergies, vec!["peanuts"]);
        assert!(record.conditions.is_empty());
        assert_eq!(record.visit_reasons, vec!["annual checkup"]);
    }

    #[tokio::test]
    async fn test_weather_failure_is_apology_not_crash() {
        // Port 1 refuses connections → lookup returns None → failure outcome
        let (tx, _rx) = mpsc::channel(64);
        let mut engine = FlowEngine::new(
            Arc::new(intake_flow(0)),
            intake_dispatcher(DEMO_BIRTHDAY, WeatherLookup::with_base_url("http://127.0.0.1:1", 1)),
            IntakeRecord::default(),
            "intake-weather",
            tx,
            EngineSettings::default(),
            None,
        );
        engine.initialize().await.unwrap();

        engine
            .handle_tool_call(call("get_weather", r#"{"lat": 51.5, "lon": -0.12}"#))
            .await
            .unwrap();

        assert_eq!(engine.current_node(), "start");
        let last = engine.context().messages().last().unwrap();
        assert!(last.content.contains("weather service"));
    }

    #[tokio::test]
    async fn test_collection_tool_not_callable_before_verification() {
        let (mut engine, _rx) = make_engine();
        engine.initialize().await.unwrap();

        engine
            .handle_tool_call(call(
                "list_prescriptions",
                r#"{"prescriptions": [{"medication": "x", "dosage": "1mg"}]}"#,
            ))
            .await
            .unwrap();

        // Rejected: the gate node doesn't advertise it, record untouched
        assert_eq!(engine.current_node(), "start");
        assert!(engine.record().prescriptions.is_empty());
        let last = engine.context().messages().last().unwrap();
        assert!(last.content.contains("not available"));
    }
}
