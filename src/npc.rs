use serde::Serialize;

use crate::data::NpcDefinition;

// ============================================================================
// NPC Entity
// ============================================================================

/// How close a player must stand to talk to an NPC, in tiles
pub const INTERACT_RANGE: f32 = 2.5;

#[derive(Debug, Clone)]
pub struct Npc {
    pub id: String,
    pub name: String,
    pub sprite: String,
    pub x: f32,
    pub y: f32,
    /// Barter this NPC offers when interacted with
    pub barter_id: Option<String>,
    /// One-line reply for NPCs with nothing to trade
    pub chatter: Option<String>,
}

impl Npc {
    pub fn from_definition(def: &NpcDefinition) -> Self {
        Self {
            id: def.id.clone(),
            name: def.display_name.clone(),
            sprite: def.sprite.clone(),
            x: def.x,
            y: def.y,
            barter_id: def.barter_id.clone(),
            chatter: def.chatter.clone(),
        }
    }

    /// Check if a position is within interaction range
    pub fn is_near(&self, x: f32, y: f32) -> bool {
        let dx = self.x - x;
        let dy = self.y - y;
        (dx * dx + dy * dy).sqrt() <= INTERACT_RANGE
    }
}

// ============================================================================
// NPC Update (sent to client)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct NpcUpdate {
    pub id: String,
    pub name: String,
    pub sprite: String,
    pub x: f32,
    pub y: f32,
    pub can_trade: bool,
}

impl From<&Npc> for NpcUpdate {
    fn from(npc: &Npc) -> Self {
        Self {
            id: npc.id.clone(),
            name: npc.name.clone(),
            sprite: npc.sprite.clone(),
            x: npc.x,
            y: npc.y,
            can_trade: npc.barter_id.is_some(),
        }
    }
}
