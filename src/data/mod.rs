pub mod item_def;
pub mod item_registry;
pub mod npc_def;
pub mod npc_registry;

pub use item_def::{ItemCategory, ItemDefinition};
pub use item_registry::ItemRegistry;
pub use npc_def::NpcDefinition;
pub use npc_registry::NpcRegistry;
