use serde::Serialize;

use crate::data::ItemRegistry;

// ============================================================================
// Inventory
// ============================================================================

pub const INVENTORY_SIZE: usize = 20;

/// Stack limit used when an item has no registry entry
const DEFAULT_MAX_STACK: i32 = 99;

#[derive(Debug, Clone, Serialize)]
pub struct InventorySlot {
    pub item_id: String,
    pub quantity: i32,
}

impl InventorySlot {
    pub fn new(item_id: &str, quantity: i32) -> Self {
        Self {
            item_id: item_id.to_string(),
            quantity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Inventory {
    pub slots: Vec<Option<InventorySlot>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self {
            slots: vec![None; INVENTORY_SIZE],
        }
    }

    fn max_stack(item_id: &str, registry: &ItemRegistry) -> i32 {
        registry
            .get(item_id)
            .map(|def| def.max_stack)
            .unwrap_or(DEFAULT_MAX_STACK)
    }

    /// Total quantity of an item across all slots
    pub fn count_item(&self, item_id: &str) -> i32 {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| slot.item_id == item_id)
            .map(|slot| slot.quantity)
            .sum()
    }

    /// Check if `quantity` of an item would fit without dropping any
    pub fn has_space_for(&self, item_id: &str, quantity: i32, registry: &ItemRegistry) -> bool {
        if quantity <= 0 {
            return true;
        }

        let max_stack = Self::max_stack(item_id, registry);
        let mut room = 0;
        for slot in &self.slots {
            match slot {
                Some(s) if s.item_id == item_id => room += (max_stack - s.quantity).max(0),
                None => room += max_stack,
                Some(_) => {}
            }
            if room >= quantity {
                return true;
            }
        }
        false
    }

    /// Try to add an item to inventory. Returns the quantity that couldn't fit.
    pub fn add_item(&mut self, item_id: &str, mut quantity: i32, registry: &ItemRegistry) -> i32 {
        let max_stack = Self::max_stack(item_id, registry);

        // First, try to stack with existing items
        for slot in &mut self.slots {
            if quantity <= 0 {
                break;
            }
            if let Some(inv_slot) = slot {
                if inv_slot.item_id == item_id {
                    let can_add = max_stack - inv_slot.quantity;
                    if can_add > 0 {
                        let add = quantity.min(can_add);
                        inv_slot.quantity += add;
                        quantity -= add;
                    }
                }
            }
        }

        // Then, try to find empty slots for remaining quantity
        for slot in &mut self.slots {
            if quantity <= 0 {
                break;
            }
            if slot.is_none() {
                let add = quantity.min(max_stack);
                *slot = Some(InventorySlot::new(item_id, add));
                quantity -= add;
            }
        }

        quantity // Return what couldn't fit
    }

    /// Remove exactly `quantity` of an item, or fail without touching any slot.
    pub fn remove_item(&mut self, item_id: &str, quantity: i32) -> Result<(), String> {
        if quantity <= 0 {
            return Err(format!("Cannot remove {} of '{}'", quantity, item_id));
        }
        let held = self.count_item(item_id);
        if held < quantity {
            return Err(format!(
                "Not enough '{}': have {}, need {}",
                item_id, held, quantity
            ));
        }

        let mut remaining = quantity;
        for slot in &mut self.slots {
            if remaining <= 0 {
                break;
            }
            if let Some(inv_slot) = slot {
                if inv_slot.item_id == item_id {
                    let take = remaining.min(inv_slot.quantity);
                    inv_slot.quantity -= take;
                    remaining -= take;
                    if inv_slot.quantity <= 0 {
                        *slot = None;
                    }
                }
            }
        }

        Ok(())
    }

    /// Get inventory as a serializable update
    pub fn to_update(&self) -> Vec<InventorySlotUpdate> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                slot.as_ref().map(|s| InventorySlotUpdate {
                    slot: i as u8,
                    item_id: s.item_id.clone(),
                    quantity: s.quantity,
                })
            })
            .collect()
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InventorySlotUpdate {
    pub slot: u8,
    pub item_id: String,
    pub quantity: i32,
}
