//! Barter Definition Structures
//!
//! Defines the data behind one NPC barter: which item converts into which,
//! at what rate, under what per-exchange cap, and the dialogue text shown at
//! each step of the conversation.

use serde::{Deserialize, Serialize};

/// A fixed-rate item exchange offered by an NPC.
///
/// Dialogue text fields may carry `{source}` / `{target}` tokens, replaced
/// with item display names when presented.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarterDefinition {
    pub id: String,
    /// Item the player surrenders.
    pub source_item: String,
    /// Item the player receives.
    pub target_item: String,
    /// Source units consumed per target unit granted.
    #[serde(default = "default_units_per_target")]
    pub units_per_target: i32,
    /// Most target units a single exchange may grant.
    #[serde(default = "default_max_per_exchange")]
    pub max_per_exchange: i32,
    pub greeting_text: String,
    /// Label of the single continuation option on the greeting.
    pub offer_option: String,
    pub prompt_text: String,
    pub insufficient_text: String,
    pub no_space_text: String,
    pub thanks_text: String,
    #[serde(default = "default_failed_text")]
    pub failed_text: String,
}

fn default_units_per_target() -> i32 {
    100
}

fn default_max_per_exchange() -> i32 {
    300
}

fn default_failed_text() -> String {
    "Something went wrong. Nothing was exchanged.".to_string()
}

impl BarterDefinition {
    /// Check internal consistency after parsing.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("barter id must not be empty".to_string());
        }
        if self.source_item.is_empty() || self.target_item.is_empty() {
            return Err(format!("barter '{}' must name both items", self.id));
        }
        if self.source_item == self.target_item {
            return Err(format!(
                "barter '{}' exchanges '{}' for itself",
                self.id, self.source_item
            ));
        }
        if self.units_per_target < 1 {
            return Err(format!(
                "barter '{}' has non-positive units_per_target",
                self.id
            ));
        }
        if self.max_per_exchange < 1 {
            return Err(format!(
                "barter '{}' has non-positive max_per_exchange",
                self.id
            ));
        }
        Ok(())
    }

    /// Most target units the given holdings allow, capped per exchange.
    pub fn max_for_quantity(&self, held: i32) -> i32 {
        (held / self.units_per_target).min(self.max_per_exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
id = "leaf_exchange"
source_item = "maple_leaf"
target_item = "leaf_token"
greeting_text = "Hello there."
offer_option = "Let's trade."
prompt_text = "How many?"
insufficient_text = "Not enough."
no_space_text = "No room."
thanks_text = "Thanks."
"#
    }

    #[test]
    fn test_parse_defaults() {
        let barter: BarterDefinition = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(barter.units_per_target, 100);
        assert_eq!(barter.max_per_exchange, 300);
        assert!(!barter.failed_text.is_empty());
        assert!(barter.validate().is_ok());
    }

    #[test]
    fn test_max_for_quantity() {
        let barter: BarterDefinition = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(barter.max_for_quantity(0), 0);
        assert_eq!(barter.max_for_quantity(99), 0);
        assert_eq!(barter.max_for_quantity(250), 2);
        assert_eq!(barter.max_for_quantity(40000), 300);
    }

    #[test]
    fn test_validate_rejects_self_exchange() {
        let mut barter: BarterDefinition = toml::from_str(minimal_toml()).unwrap();
        barter.target_item = "maple_leaf".to_string();
        assert!(barter.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_rate() {
        let mut barter: BarterDefinition = toml::from_str(minimal_toml()).unwrap();
        barter.units_per_target = 0;
        assert!(barter.validate().is_err());
    }
}
