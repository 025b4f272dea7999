/// Capabilities a conversation borrows from the session hosting it.
///
/// The room supplies a real implementation backed by the player's inventory
/// and unicast channel; controller tests supply a fake backed by a plain map.
/// All calls are synchronous: the controller runs to completion inside a
/// single player-input handler and holds no locks of its own.
pub trait ConversationHost {
    /// Display text with zero or more player-selectable continuations.
    /// Text may carry `{source}` / `{target}` item-name tokens; resolving
    /// them is the host's concern.
    fn present_message(&mut self, text: &str, options: &[String]);

    /// Ask the player for an integer in `[min, max]`. The next advance
    /// signal is expected to carry the chosen value.
    fn present_numeric_prompt(&mut self, text: &str, default: i32, min: i32, max: i32);

    /// Current held quantity of an item for this player.
    fn item_quantity(&self, item_id: &str) -> i32;

    /// Whether the player could receive `quantity` more of `item_id`.
    fn has_capacity(&self, item_id: &str, quantity: i32) -> bool;

    /// Add (`delta` > 0) or remove (`delta` < 0) item quantity. Must fail
    /// without partial effect when the change cannot be applied in full.
    fn mutate_item(&mut self, item_id: &str, delta: i32) -> Result<(), String>;

    /// End the interaction. The controller makes no further calls into the
    /// host after this.
    fn terminate(&mut self);
}
