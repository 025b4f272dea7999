//! Barter Dialogue
//!
//! Per-session conversation controllers for NPC barter exchanges. Each
//! controller owns its own phase, advances one step per player signal, and
//! performs at most one validated debit/credit pair before terminating.

pub mod controller;
pub mod host;

pub use controller::{ConversationController, ConversationPhase, ConversationSignal};
pub use host::ConversationHost;
