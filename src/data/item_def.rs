use serde::{Deserialize, Serialize};

// ============================================================================
// Item Categories
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Material,
    Token,
    Consumable,
}

impl Default for ItemCategory {
    fn default() -> Self {
        ItemCategory::Material
    }
}

// ============================================================================
// Raw Item Definition (direct from TOML)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawItemDefinition {
    pub display_name: Option<String>,
    pub sprite: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub category: ItemCategory,
    pub max_stack: Option<i32>,
}

// ============================================================================
// Resolved Item Definition
// ============================================================================

#[derive(Debug, Clone)]
pub struct ItemDefinition {
    pub id: String,
    pub display_name: String,
    pub sprite: String,
    pub description: String,
    pub category: ItemCategory,
    pub max_stack: i32,
}

impl ItemDefinition {
    pub fn from_raw(id: &str, raw: &RawItemDefinition) -> Self {
        Self {
            id: id.to_string(),
            display_name: raw.display_name.clone()
                .unwrap_or_else(|| id.to_string()),
            sprite: raw.sprite.clone()
                .unwrap_or_else(|| format!("item_{}", id)),
            description: raw.description.clone()
                .unwrap_or_default(),
            category: raw.category,
            max_stack: raw.max_stack.unwrap_or(99),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_defaults() {
        let raw: RawItemDefinition = toml::from_str("").unwrap();
        let item = ItemDefinition::from_raw("maple_leaf", &raw);
        assert_eq!(item.display_name, "maple_leaf");
        assert_eq!(item.sprite, "item_maple_leaf");
        assert_eq!(item.category, ItemCategory::Material);
        assert_eq!(item.max_stack, 99);
    }

    #[test]
    fn test_from_raw_explicit_fields() {
        let raw: RawItemDefinition = toml::from_str(
            r#"
display_name = "Maple Leaf"
category = "token"
max_stack = 500
"#,
        )
        .unwrap();
        let item = ItemDefinition::from_raw("maple_leaf", &raw);
        assert_eq!(item.display_name, "Maple Leaf");
        assert_eq!(item.category, ItemCategory::Token);
        assert_eq!(item.max_stack, 500);
    }
}
