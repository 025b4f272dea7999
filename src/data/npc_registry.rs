use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use super::npc_def::{NpcDefinition, RawNpcDefinition};

/// Registry for all NPC definitions
pub struct NpcRegistry {
    npcs: HashMap<String, NpcDefinition>,
}

impl NpcRegistry {
    pub fn new() -> Self {
        Self {
            npcs: HashMap::new(),
        }
    }

    /// Load all NPC definitions from a directory
    pub fn load_from_directory(&mut self, data_dir: &Path) -> Result<(), String> {
        let npcs_dir = data_dir.join("npcs");

        if !npcs_dir.exists() {
            warn!("NPCs directory does not exist: {:?}", npcs_dir);
            return Ok(());
        }

        let entries = std::fs::read_dir(&npcs_dir)
            .map_err(|e| format!("Failed to read npcs directory: {}", e))?;

        for entry in entries {
            let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
            let path = entry.path();

            if path.extension().map_or(false, |ext| ext == "toml") {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;

                // Parse as table of NPCs
                let table: HashMap<String, RawNpcDefinition> = toml::from_str(&content)
                    .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;

                for (id, raw) in table {
                    if self.npcs.contains_key(&id) {
                        warn!("Duplicate NPC ID '{}' in {:?}, overwriting", id, path);
                    }
                    let npc = NpcDefinition::from_raw(&id, &raw);
                    self.npcs.insert(id, npc);
                }
            }
        }

        info!("Loaded {} NPC definitions", self.npcs.len());

        Ok(())
    }

    /// Get an NPC definition by ID
    pub fn get(&self, id: &str) -> Option<&NpcDefinition> {
        self.npcs.get(id)
    }

    /// Get all NPC definitions
    pub fn all(&self) -> impl Iterator<Item = &NpcDefinition> {
        self.npcs.values()
    }

    /// Get the number of loaded NPCs
    pub fn len(&self) -> usize {
        self.npcs.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.npcs.is_empty()
    }
}

impl Default for NpcRegistry {
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
        let npcs_dir = temp_dir.path().join("npcs");
        std::fs::create_dir_all(&npcs_dir).unwrap();

        std::fs::write(
            npcs_dir.join("town.toml"),
            r#"
[leaf_trader]
display_name = "Rolly"
x = 12.0
y = 8.0
barter_id = "leaf_exchange"

[greeter]
display_name = "Maren"
chatter = "Welcome to the trade post."
"#,
        )
        .unwrap();

        let mut registry = NpcRegistry::new();
        registry.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(registry.len(), 2);
        let trader = registry.get("leaf_trader").unwrap();
        assert_eq!(trader.display_name, "Rolly");
        assert_eq!(trader.barter_id.as_deref(), Some("leaf_exchange"));
        let greeter = registry.get("greeter").unwrap();
        assert!(greeter.barter_id.is_none());
        assert!(greeter.chatter.is_some());
    }
}
