//! The shawarma menu — static items and extras with prices.

/// A sandwich on the menu.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MenuItem {
    pub key: &'static str,
    pub name: &'static str,
    pub price: u32,
    pub description: &'static str,
}

/// An add-on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtraItem {
    pub key: &'static str,
    pub name: &'static str,
    pub price: u32,
}

/// The sandwich menu, in EGP.
pub const MENU: &[MenuItem] = &[
    MenuItem {
        key: "chicken",
        name: "Chicken shawarma",
        price: 65,
        description: "Charcoal-grilled chicken shawarma with tahini sauce and vegetables",
    },
    MenuItem {
        key: "meat",
        name: "Beef shawarma",
        price: 85,
        description: "Charcoal-grilled beef shawarma with tahini sauce and vegetables",
    },
    MenuItem {
        key: "mix",
        name: "Mixed shawarma",
        price: 75,
        description: "Mixed beef and chicken shawarma with tahini sauce and vegetables",
    },
];

/// Available extras, in EGP.
pub const EXTRAS: &[ExtraItem] = &[
    ExtraItem { key: "fries", name: "Fries", price: 25 },
    ExtraItem { key: "cheese", name: "Extra cheese", price: 10 },
    ExtraItem { key: "garlic_sauce", name: "Garlic sauce", price: 5 },
    ExtraItem { key: "tahini_extra", name: "Extra tahini", price: 5 },
];

/// Menu item keys, for tool schema enumerations.
pub const ITEM_KEYS: &[&str] = &["chicken", "meat", "mix"];

/// Extra keys, for tool schema enumerations.
pub const EXTRA_KEYS: &[&str] = &["fries", "cheese", "garlic_sauce", "tahini_extra"];

/// Look up a sandwich by key.
pub fn menu_item(key: &str) -> Option<&'static MenuItem> {
    MENU.iter().find(|m| m.key == key)
}

/// Look up an extra by key.
pub fn extra(key: &str) -> Option<&'static ExtraItem> {
    EXTRAS.iter().find(|e| e.key == key)
}

/// The menu rendered for the model to read out.
pub fn menu_text() -> String {
    let mut lines: Vec<String> = MENU
        .iter()
        .map(|m| format!("- {} ({} EGP): {}", m.name, m.price, m.description))
        .collect();
    lines.push("Extras:".to_string());
    for e in EXTRAS {
        lines.push(format!("- {} ({} EGP)", e.name, e.price));
    }
    lines.join("\n")
}
