use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use super::item_def::{ItemDefinition, RawItemDefinition};

/// Registry for all item definitions
pub struct ItemRegistry {
    items: HashMap<String, ItemDefinition>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
        }
    }

    /// Load all item definitions from a directory
    pub fn load_from_directory(&mut self, data_dir: &Path) -> Result<(), String> {
        let items_dir = data_dir.join("items");

        if !items_dir.exists() {
            warn!("Items directory does not exist: {:?}", items_dir);
            return Ok(());
        }

        let entries = std::fs::read_dir(&items_dir)
            .map_err(|e| format!("Failed to read items directory: {}", e))?;

        for entry in entries {
            let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
            let path = entry.path();

            if path.extension().map_or(false, |ext| ext == "toml") {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;

                // Parse as table of items
                let table: HashMap<String, RawItemDefinition> = toml::from_str(&content)
                    .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;

                for (id, raw) in table {
                    if self.items.contains_key(&id) {
                        warn!("Duplicate item ID '{}' in {:?}, overwriting", id, path);
                    }
                    let item = ItemDefinition::from_raw(&id, &raw);
                    self.items.insert(id, item);
                }
            }
        }

        info!("Loaded {} item definitions", self.items.len());

        Ok(())
    }

    /// Get an item definition by ID
    pub fn get(&self, id: &str) -> Option<&ItemDefinition> {
        self.items.get(id)
    }

    /// Display name for an item, falling back to the raw ID
    pub fn display_name(&self, id: &str) -> String {
        self.items
            .get(id)
            .map(|item| item.display_name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Check if an item exists
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    /// Get the number of loaded items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Generate item definitions message for client sync
    pub fn to_client_definitions(&self) -> crate::protocol::ServerMessage {
        use crate::protocol::ClientItemDef;

        let items: Vec<ClientItemDef> = self.items
            .values()
            .map(|item| ClientItemDef {
                id: item.id.clone(),
                display_name: item.display_name.clone(),
                sprite: item.sprite.clone(),
                category: format!("{:?}", item.category).to_lowercase(),
                max_stack: item.max_stack,
                description: item.description.clone(),
            })
            .collect();

        crate::protocol::ServerMessage::ItemDefinitions { items }
    }
}

impl Default for ItemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_directory() {
        let temp_dir = TempDir::new().unwrap();
        let items_dir = temp_dir.path().join("items");
        std::fs::create_dir_all(&items_dir).unwrap();

        std::fs::write(
            items_dir.join("trade_goods.toml"),
            r#"
[maple_leaf]
display_name = "Maple Leaf"
category = "material"

[leaf_token]
display_name = "Leaf Token"
category = "token"
max_stack = 300
"#,
        )
        .unwrap();

        let mut registry = ItemRegistry::new();
        registry.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("maple_leaf"));
        assert_eq!(registry.display_name("leaf_token"), "Leaf Token");
        assert_eq!(registry.display_name("unknown_item"), "unknown_item");
        assert_eq!(registry.get("leaf_token").unwrap().max_stack, 300);
    }
}
