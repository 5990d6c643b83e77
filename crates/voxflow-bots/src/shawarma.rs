//! Shawarma ordering flow — a five-stage phone-order dialogue.
//!
//! Stages: greeting → order items → delivery details → confirmation →
//! goodbye. Confirmation can loop back to the start for revisions. The
//! goodbye node announces a fixed farewell and terminates the session
//! after a grace delay.

use std::sync::Arc;

use async_trait::async_trait;

use voxflow_flow::graph::{Action, FlowGraph, Node, ParamField, ToolSchema};
use voxflow_flow::handler::{HandlerOutcome, ToolArgs, ToolHandler};
use voxflow_flow::ToolInvocationDispatcher;

use crate::menu;
use crate::order::OrderBook;

// ─────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────

/// Read the menu back to the caller. Local tool, node unchanged.
struct GetMenuHandler;

#[async_trait]
impl ToolHandler<OrderBook> for GetMenuHandler {
    async fn handle(&self, _args: &ToolArgs, _record: &mut OrderBook) -> anyhow::Result<HandlerOutcome> {
        Ok(HandlerOutcome::success(format!(
            "Read the menu to the caller:\n{}",
            menu::menu_text()
        )))
    }
}

/// Record one sandwich line of the order.
struct SelectOrderHandler;

#[async_trait]
impl ToolHandler<OrderBook> for SelectOrderHandler {
    async fn handle(&self, args: &ToolArgs, record: &mut OrderBook) -> anyhow::Result<HandlerOutcome> {
        let item_type = args.require_str("item_type")?;
        let quantity = args.require_u32("quantity")?;
        let extras = args.str_array("extras");

        match record.add_item(item_type, quantity, extras) {
            Ok(item) => {
                let line_price = OrderBook::item_price(item);
                let name = menu::menu_item(&item.kind).map(|m| m.name).unwrap_or(item_type);
                let quantity = item.quantity;
                let total = record.total();
                Ok(HandlerOutcome::success(format!(
                    "Recorded {name} x{quantity} — {line_price} EGP. Order total so far: {total} EGP. \
                     Confirm the line with the caller, then collect the delivery details."
                )))
            }
            Err(e) => Ok(HandlerOutcome::failure(format!(
                "The item could not be added ({e}). Ask the caller to pick a sandwich \
                 from the menu and record it again."
            ))),
        }
    }
}

/// Record delivery address and phone number.
struct SetDeliveryHandler;

#[async_trait]
impl ToolHandler<OrderBook> for SetDeliveryHandler {
    async fn handle(&self, args: &ToolArgs, record: &mut OrderBook) -> anyhow::Result<HandlerOutcome> {
        let address = args.require_str("address")?;
        let phone = args.require_str("phone")?;
        let special = args.optional_str("special_instructions").map(String::from);

        if !looks_like_phone(phone) {
            return Ok(HandlerOutcome::failure(
                "The phone number does not look valid (expected 8 to 11 digits). \
                 Ask the caller to repeat their phone number, then record the details again.",
            ));
        }

        record.set_delivery_info(address, phone, special);
        let estimated = record.estimated_minutes();
        Ok(HandlerOutcome::success(format!(
            "Delivery details recorded. Address: {address}. Phone: {phone}. \
             Estimated delivery time: {estimated} minutes. \
             Now summarize the full order and ask the caller to confirm it."
        )))
    }
}

/// Confirm and place the order.
struct CompleteOrderHandler;

#[async_trait]
impl ToolHandler<OrderBook> for CompleteOrderHandler {
    async fn handle(&self, _args: &ToolArgs, record: &mut OrderBook) -> anyhow::Result<HandlerOutcome> {
        match record.finalize() {
            Ok(confirmation) => Ok(HandlerOutcome::success(format!(
                "Order placed.\n{}\nTell the caller the order was recorded and will arrive \
                 in about {} minutes.",
                confirmation.summary, confirmation.estimated_minutes
            ))),
            Err(e) => Ok(HandlerOutcome::failure(format!(
                "The order cannot be completed yet ({e}). Collect the missing details \
                 before confirming."
            ))),
        }
    }
}

/// The caller wants to change something; loop back to the start.
struct ReviseOrderHandler;

#[async_trait]
impl ToolHandler<OrderBook> for ReviseOrderHandler {
    async fn handle(&self, _args: &ToolArgs, _record: &mut OrderBook) -> anyhow::Result<HandlerOutcome> {
        Ok(HandlerOutcome::success(
            "The caller wants to change the order. Walk through it again from the top; \
             the items recorded so far are kept.",
        ))
    }
}

/// Loose phone sanity check: 8–11 digits, separators ignored.
fn looks_like_phone(raw: &str) -> bool {
    let digits = raw.chars().filter(|c| c.is_ascii_digit()).count();
    (8..=11).contains(&digits)
}

// ─────────────────────────────────────────────
// Flow definition
// ─────────────────────────────────────────────

/// Build the ordering flow graph. `grace_secs` is the goodbye grace delay.
pub fn shawarma_flow(grace_secs: u64) -> FlowGraph {
    FlowGraph::new(
        "start",
        vec![
            Node::new("start")
                .role_message(
                    "You are the order-taker for an Egyptian shawarma restaurant, on a phone \
                     call with a customer. Speak casually and keep every reply short and \
                     spontaneous, like a real call. Never read the menu unprompted and never \
                     assume what the caller wants. The call moves through stages: greeting, \
                     order items, delivery details, confirmation, goodbye. Use only the tools \
                     currently offered to you.",
                )
                .task_message(
                    "Open the call naturally and briefly, like \"Hello, Shawarma Baladna\". \
                     Wait for the caller. If they specifically ask about the menu, use \
                     get_menu; most callers start ordering right away — then use \
                     start_ordering.",
                )
                .pre_action(Action::precondition_check("kitchen"))
                .tool(ToolSchema::new(
                    "get_menu",
                    "Read out the available sandwiches and prices. Use only if the caller asks for the menu.",
                ))
                .tool(
                    ToolSchema::new(
                        "start_ordering",
                        "Move to taking the order without reading the full menu.",
                    )
                    .transitions_to("order_items"),
                ),
            Node::new("order_items")
                .task_message(
                    "Collect the order: sandwich type (chicken, meat, or mix), quantity, and \
                     any extras. Prices: chicken 65, meat 85, mix 75 EGP; extras: fries 25, \
                     cheese 10, garlic sauce 5, extra tahini 5 EGP. Don't rush the caller; \
                     confirm the line back before recording it with select_shawarma_order.",
                )
                .tool(
                    ToolSchema::new("select_shawarma_order", "Record one sandwich line of the order.")
                        .param(
                            ParamField::enumeration("item_type", "Sandwich type", menu::ITEM_KEYS)
                                .required(),
                        )
                        .param(ParamField::integer("quantity", "Number of sandwiches").required())
                        .param(ParamField::string_array(
                            "extras",
                            "Requested extras",
                            Some(menu::EXTRA_KEYS),
                        ))
                        .transitions_to("delivery_info"),
                )
                .tool(ToolSchema::new("get_menu", "Read out the menu again.")),
            Node::new("delivery_info")
                .task_message(
                    "Collect complete delivery details: full address (area, street, building, \
                     apartment) and a valid phone number, plus any special instructions. Vague \
                     addresses are not acceptable. Repeat both back to the caller, then record \
                     them with set_delivery_info.",
                )
                .tool(
                    ToolSchema::new("set_delivery_info", "Record the delivery details.")
                        .param(ParamField::string("address", "Full delivery address").required())
                        .param(ParamField::string("phone", "Contact phone number").required())
                        .param(ParamField::string(
                            "special_instructions",
                            "Special delivery instructions (optional)",
                        ))
                        .transitions_to("confirm"),
                ),
            Node::new("confirm")
                .task_message(
                    "Summarize the complete order: every item with extras, the total price, \
                     the address and phone number, and the estimated delivery time. Ask \
                     explicitly whether to confirm as-is (complete_order) or change something \
                     (revise_order).",
                )
                .tool(
                    ToolSchema::new("complete_order", "The caller confirms the order is correct.")
                        .transitions_to("end"),
                )
                .tool(
                    ToolSchema::new("revise_order", "The caller wants to change the order.")
                        .transitions_to("start"),
                ),
            Node::new("end")
                .task_message(
                    "Thank the caller, confirm the order was recorded and will arrive within \
                     the estimated time, and say you are ending the call now.",
                )
                .post_action(Action::announce("Thank you for your order. Goodbye!"))
                .post_action(Action::terminate(grace_secs)),
        ],
    )
    .expect("shawarma flow graph is valid")
}

/// Register the ordering flow's handlers.
pub fn shawarma_dispatcher() -> ToolInvocationDispatcher<OrderBook> {
    let mut dispatcher = ToolInvocationDispatcher::new();
    dispatcher.register("get_menu", Arc::new(GetMenuHandler));
    dispatcher.register("select_shawarma_order", Arc::new(SelectOrderHandler));
    dispatcher.register("set_delivery_info", Arc::new(SetDeliveryHandler));
    dispatcher.register("complete_order", Arc::new(CompleteOrderHandler));
    dispatcher.register("revise_order", Arc::new(ReviseOrderHandler));
    dispatcher
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
