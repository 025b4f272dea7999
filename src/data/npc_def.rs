use serde::Deserialize;

// ============================================================================
// Raw NPC Definition (direct from TOML)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawNpcDefinition {
    pub display_name: Option<String>,
    pub sprite: Option<String>,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    /// Barter this NPC offers when interacted with
    pub barter_id: Option<String>,
    /// One-line reply for NPCs with nothing to trade
    pub chatter: Option<String>,
}

// ============================================================================
// Resolved NPC Definition
// ============================================================================

#[derive(Debug, Clone)]
pub struct NpcDefinition {
    pub id: String,
    pub display_name: String,
    pub sprite: String,
    pub x: f32,
    pub y: f32,
    pub barter_id: Option<String>,
    pub chatter: Option<String>,
}

impl NpcDefinition {
    pub fn from_raw(id: &str, raw: &RawNpcDefinition) -> Self {
        Self {
            id: id.to_string(),
            display_name: raw.display_name.clone()
                .unwrap_or_else(|| id.to_string()),
            sprite: raw.sprite.clone()
                .unwrap_or_else(|| format!("npc_{}", id)),
            x: raw.x,
            y: raw.y,
            barter_id: raw.barter_id.clone(),
            chatter: raw.chatter.clone(),
        }
    }
}
