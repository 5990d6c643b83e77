//! Order book — the session record for the shawarma ordering flow.
//!
//! One order per session, owned by the flow engine and mutated only
//! through dispatched tool handlers. Totals and delivery estimates are
//! computed on demand from the item list; nothing derived is cached.

use thiserror::Error;

use crate::menu;

/// Order-book operation failures.
#[derive(Debug, Error, PartialEq)]
pub enum OrderError {
    #[error("unknown menu item '{0}'")]
    UnknownItem(String),
    #[error("unknown extra '{0}'")]
    UnknownExtra(String),
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    #[error("the order has no items")]
    EmptyOrder,
    #[error("delivery information is incomplete")]
    MissingDeliveryInfo,
}

/// One line of the order.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderItem {
    pub kind: String,
    pub quantity: u32,
    pub extras: Vec<String>,
}

/// The accumulated order for one session.
#[derive(Clone, Debug, Default)]
pub struct OrderBook {
    items: Vec<OrderItem>,
    address: String,
    phone: String,
    special_instructions: Option<String>,
    delivery_notes: Option<String>,
}

/// Summary returned when an order is finalized.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderConfirmation {
    pub total: u32,
    pub estimated_minutes: u32,
    pub summary: String,
}

impl OrderBook {
    /// Create an empty order.
    pub fn new() -> Self {
        OrderBook::default()
    }

    /// Add a line to the order after validating the item kind and extras.
    pub fn add_item(
        &mut self,
        kind: &str,
        quantity: u32,
        extras: Vec<String>,
    ) -> Result<&OrderItem, OrderError> {
        if quantity == 0 {
            return Err(OrderError::ZeroQuantity);
        }
        if menu::menu_item(kind).is_none() {
            return Err(OrderError::UnknownItem(kind.to_string()));
        }
        for e in &extras {
            if menu::extra(e).is_none() {
                return Err(OrderError::UnknownExtra(e.clone()));
            }
        }

        self.items.push(OrderItem {
            kind: kind.to_string(),
            quantity,
            extras,
        });
        Ok(self.items.last().expect("just pushed"))
    }

    /// Price of one order line: base price × quantity, plus each extra once.
    pub fn item_price(item: &OrderItem) -> u32 {
        let base = menu::menu_item(&item.kind).map(|m| m.price).unwrap_or(0);
        let extras: u32 = item
            .extras
            .iter()
            .filter_map(|e| menu::extra(e).map(|x| x.price))
            .sum();
        base * item.quantity + extras
    }

    /// Running total across all lines.
    pub fn total(&self) -> u32 {
        self.items.iter().map(Self::item_price).sum()
    }

    /// The order lines so far.
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Record the delivery address and phone number.
    pub fn set_delivery_info(
        &mut self,
        address: &str,
        phone: &str,
        special_instructions: Option<String>,
    ) {
        self.address = address.to_string();
        self.phone = phone.to_string();
        if special_instructions.is_some() {
            self.special_instructions = special_instructions;
        }
    }

    /// Attach free-form delivery notes.
    pub fn add_delivery_notes(&mut self, notes: &str) {
        self.delivery_notes = Some(notes.to_string());
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn special_instructions(&self) -> Option<&str> {
        self.special_instructions.as_deref()
    }

    pub fn delivery_notes(&self) -> Option<&str> {
        self.delivery_notes.as_deref()
    }

    /// Estimated delivery time: 15 minutes base plus 5 per sandwich,
    /// 30 minutes when the order is still empty.
    pub fn estimated_minutes(&self) -> u32 {
        if self.items.is_empty() {
            return 30;
        }
        15 + 5 * self.items.iter().map(|i| i.quantity).sum::<u32>()
    }

    /// Human-readable summary of the order.
    pub fn summary(&self) -> String {
        if self.items.is_empty() {
            return "The order is empty.".to_string();
        }

        let mut parts = Vec::new();
        for item in &self.items {
            let name = menu::menu_item(&item.kind).map(|m| m.name).unwrap_or(&item.kind);
            let mut line = format!("{} x{}", name, item.quantity);
            if !item.extras.is_empty() {
                let extras: Vec<&str> = item
                    .extras
                    .iter()
                    .filter_map(|e| menu::extra(e).map(|x| x.name))
                    .collect();
                line.push_str(&format!(" with {}", extras.join(", ")));
            }
            line.push_str(&format!(" — {} EGP", Self::item_price(item)));
            parts.push(line);
        }
        parts.push(format!("Order total: {} EGP", self.total()));

        if !self.address.is_empty() {
            parts.push(format!("Address: {}", self.address));
        }
        if !self.phone.is_empty() {
            parts.push(format!("Phone: {}", self.phone));
        }
        if let Some(instructions) = &self.special_instructions {
            parts.push(format!("Special instructions: {}", instructions));
        }
        parts.push(format!(
            "Estimated delivery: {} minutes",
            self.estimated_minutes()
        ));

        parts.join("\n")
    }

    /// Finalize the order: items and delivery details must be present.
    pub fn finalize(&self) -> Result<OrderConfirmation, OrderError> {
        if self.items.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        if self.address.is_empty() || self.phone.is_empty() {
            return Err(OrderError::MissingDeliveryInfo);
        }
        Ok(OrderConfirmation {
            total: self.total(),
            estimated_minutes: self.estimated_minutes(),
            summary: self.summary(),
        })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_item_validates_kind() {
        let mut order = OrderBook::new();
        assert_eq!(
            order.add_item("falafel", 1, vec![]).unwrap_err(),
            OrderError::UnknownItem("falafel".into())
        );
        assert!(order.items().is_empty());
    }

    #[test]
    fn test_add_item_validates_extras() {
        let mut order = OrderBook::new();
        assert_eq!(
            order
                .add_item("chicken", 1, vec!["pickles".into()])
                .unwrap_err(),
            OrderError::UnknownExtra("pickles".into())
        );
    }

    #[test]
    fn test_add_item_rejects_zero_quantity() {
        let mut order = OrderBook::new();
        assert_eq!(
            order.add_item("chicken", 0, vec![]).unwrap_err(),
            OrderError::ZeroQuantity
        );
    }

    #[test]
    fn test_running_total_accumulates() {
        // Two beef shawarmas with extra cheese: 85*2 + 10 = 180
        let mut order = OrderBook::new();
        order.add_item("meat", 2, vec!["cheese".into()]).unwrap();
        assert_eq!(order.total(), 180);

        // One chicken raises the total to 245
        order.add_item("chicken", 1, vec![]).unwrap();
        assert_eq!(order.total(), 245);
    }

    #[test]
    fn test_item_price_counts_extras_once() {
        let mut order = OrderBook::new();
        let item = order
            .add_item("mix", 3, vec!["fries".into(), "garlic_sauce".into()])
            .unwrap();
        // 75*3 + 25 + 5
        assert_eq!(OrderBook::item_price(item), 255);
    }

    #[test]
    fn test_estimated_minutes() {
        let mut order = OrderBook::new();
        assert_eq!(order.estimated_minutes(), 30);

        order.add_item("chicken", 2, vec![]).unwrap();
        order.add_item("meat", 1, vec![]).unwrap();
        // 15 + 5*3
        assert_eq!(order.estimated_minutes(), 30);

        order.add_item("mix", 4, vec![]).unwrap();
        assert_eq!(order.estimated_minutes(), 50);
    }

    #[test]
    fn test_finalize_requires_items_and_delivery() {
        let mut order = OrderBook::new();
        assert_eq!(order.finalize().unwrap_err(), OrderError::EmptyOrder);

        order.add_item("chicken", 1, vec![]).unwrap();
        assert_eq!(order.finalize().unwrap_err(), OrderError::MissingDeliveryInfo);

        order.set_delivery_info("12 Nile St, apt 3", "0100000000", None);
        let confirmation = order.finalize().unwrap();
        assert_eq!(confirmation.total, 65);
        assert_eq!(confirmation.estimated_minutes, 20);
        assert!(confirmation.summary.contains("Chicken shawarma x1"));
    }

    #[test]
    fn test_summary_includes_delivery_details() {
        let mut order = OrderBook::new();
        order.add_item("meat", 2, vec!["cheese".into()]).unwrap();
        order.set_delivery_info("12 Nile St", "0100000000", Some("ring twice".into()));

        let summary = order.summary();
        assert!(summary.contains("Beef shawarma x2 with Extra cheese — 180 EGP"));
        assert!(summary.contains("Order total: 180 EGP"));
        assert!(summary.contains("Address: 12 Nile St"));
        assert!(summary.contains("Special instructions: ring twice"));
        assert!(summary.contains("Estimated delivery: 25 minutes"));
    }

    #[test]
    fn test_delivery_notes() {
        let mut order = OrderBook::new();
        assert!(order.delivery_notes().is_none());
        order.add_delivery_notes("gate code 1234");
        assert_eq!(order.delivery_notes(), Some("gate code 1234"));
    }

    #[test]
    fn test_replayed_add_is_same_delta() {
        // Identical calls on identical state produce identical deltas
        let mut a = OrderBook::new();
        let mut b = OrderBook::new();
        a.add_item("meat", 2, vec!["cheese".into()]).unwrap();
        b.add_item("meat", 2, vec!["cheese".into()]).unwrap();
        assert_eq!(a.items(), b.items());
        assert_eq!(a.total(), b.total());
    }
}
