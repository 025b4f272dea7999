use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

use crate::barter::BarterRegistry;
use crate::data::{ItemRegistry, NpcRegistry};
use crate::dialogue::{ConversationController, ConversationHost, ConversationSignal};
use crate::item::Inventory;
use crate::npc::{Npc, NpcUpdate};
use crate::protocol::ServerMessage;

// ============================================================================
// Constants
// ============================================================================

const MAP_WIDTH: i32 = 32;
const MAP_HEIGHT: i32 = 32;

const SPAWN_X: i32 = 16;
const SPAWN_Y: i32 = 16;

// ============================================================================
// Player
// ============================================================================

#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub name: String,
    // Grid position (integer tile coordinates)
    pub x: i32,
    pub y: i32,
    pub active: bool, // Whether WebSocket is connected
    pub inventory: Inventory,
}

impl Player {
    pub fn new(id: &str, name: &str, spawn_x: i32, spawn_y: i32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            x: spawn_x,
            y: spawn_y,
            active: false,
            inventory: Inventory::new(),
        }
    }
}

// ============================================================================
// Active Conversations
// ============================================================================

/// A barter dialogue in progress, keyed by player id in the room.
struct ActiveConversation {
    controller: ConversationController,
    npc_id: String,
    npc_name: String,
    /// Item display names substituted for {source}/{target} text tokens
    source_name: String,
    target_name: String,
    started_at: DateTime<Utc>,
}

/// Bridges one conversation signal to a player's inventory and socket.
///
/// Presented messages are buffered in `outbound` and sent by the room after
/// the player lock is released.
struct RoomConversationHost<'a> {
    npc_id: &'a str,
    npc_name: &'a str,
    source_name: &'a str,
    target_name: &'a str,
    inventory: &'a mut Inventory,
    item_registry: &'a ItemRegistry,
    outbound: Vec<ServerMessage>,
    mutated: bool,
    terminated: bool,
}

impl RoomConversationHost<'_> {
    fn fill_tokens(&self, text: &str) -> String {
        text.replace("{source}", self.source_name)
            .replace("{target}", self.target_name)
    }
}

impl ConversationHost for RoomConversationHost<'_> {
    fn present_message(&mut self, text: &str, options: &[String]) {
        self.outbound.push(ServerMessage::ShowDialogue {
            npc_id: self.npc_id.to_string(),
            speaker: self.npc_name.to_string(),
            text: self.fill_tokens(text),
            options: options.to_vec(),
        });
    }

    fn present_numeric_prompt(&mut self, text: &str, default: i32, min: i32, max: i32) {
        self.outbound.push(ServerMessage::ShowNumericPrompt {
            npc_id: self.npc_id.to_string(),
            speaker: self.npc_name.to_string(),
            text: self.fill_tokens(text),
            default,
            min,
            max,
        });
    }

    fn item_quantity(&self, item_id: &str) -> i32 {
        self.inventory.count_item(item_id)
    }

    fn has_capacity(&self, item_id: &str, quantity: i32) -> bool {
        self.inventory.has_space_for(item_id, quantity, self.item_registry)
    }

    fn mutate_item(&mut self, item_id: &str, delta: i32) -> Result<(), String> {
        use std::cmp::Ordering;

        match delta.cmp(&0) {
            Ordering::Equal => Ok(()),
            Ordering::Less => {
                self.inventory.remove_item(item_id, -delta)?;
                self.mutated = true;
                Ok(())
            }
            Ordering::Greater => {
                if !self.inventory.has_space_for(item_id, delta, self.item_registry) {
                    return Err(format!("No room for {} x{}", item_id, delta));
                }
                let leftover = self.inventory.add_item(item_id, delta, self.item_registry);
                if leftover > 0 {
                    // Undo the partial add so the bag is left exactly as it was
                    let _ = self.inventory.remove_item(item_id, delta - leftover);
                    return Err(format!("No room for {} x{}", item_id, delta));
                }
                self.mutated = true;
                Ok(())
            }
        }
    }

    fn terminate(&mut self) {
        self.terminated = true;
    }
}

// ============================================================================
// Game Room
// ============================================================================

pub struct GameRoom {
    pub id: String,
    pub name: String,
    players: RwLock<HashMap<String, Player>>,
    npcs: RwLock<HashMap<String, Npc>>,
    /// At most one conversation per player
    conversations: RwLock<HashMap<String, ActiveConversation>>,
    /// Item definition registry
    item_registry: Arc<ItemRegistry>,
    /// Barter definition registry
    barter_registry: Arc<BarterRegistry>,
    broadcast_tx: broadcast::Sender<ServerMessage>,
    /// Per-player message senders for unicast (SECURITY: private inventory updates)
    player_senders: RwLock<HashMap<String, mpsc::Sender<Vec<u8>>>>,
}

impl GameRoom {
    pub fn new(
        name: &str,
        item_registry: Arc<ItemRegistry>,
        npc_registry: &NpcRegistry,
        barter_registry: Arc<BarterRegistry>,
    ) -> Self {
        let (tx, _) = broadcast::channel(256);

        let mut npcs = HashMap::new();
        for def in npc_registry.all() {
            let npc = Npc::from_definition(def);
            tracing::info!("Spawning NPC {} ({}) at ({}, {})", npc.name, npc.id, npc.x, npc.y);
            npcs.insert(npc.id.clone(), npc);
        }
        tracing::info!("Spawned {} NPCs", npcs.len());

        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            players: RwLock::new(HashMap::new()),
            npcs: RwLock::new(npcs),
            conversations: RwLock::new(HashMap::new()),
            item_registry,
            barter_registry,
            broadcast_tx: tx,
            player_senders: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.broadcast_tx.subscribe()
    }

    pub async fn broadcast(&self, msg: ServerMessage) {
        // Ignore send errors (no receivers)
        let _ = self.broadcast_tx.send(msg);
    }

    /// Register a player's message sender for unicast
    pub async fn register_player_sender(&self, player_id: &str, sender: mpsc::Sender<Vec<u8>>) {
        let mut senders = self.player_senders.write().await;
        senders.insert(player_id.to_string(), sender);
        tracing::debug!("Registered sender for player {}", player_id);
    }

    /// Unregister a player's message sender
    pub async fn unregister_player_sender(&self, player_id: &str) {
        let mut senders = self.player_senders.write().await;
        senders.remove(player_id);
        tracing::debug!("Unregistered sender for player {}", player_id);
    }

    /// Send a message to a specific player (unicast)
    /// SECURITY: Use this for private data like inventory updates
    pub async fn send_to_player(&self, player_id: &str, msg: ServerMessage) {
        use crate::protocol::encode_server_message;

        let senders = self.player_senders.read().await;
        if let Some(sender) = senders.get(player_id) {
            if let Ok(bytes) = encode_server_message(&msg) {
                if let Err(e) = sender.try_send(bytes) {
                    tracing::warn!("Failed to send unicast to {}: {}", player_id, e);
                }
            }
        } else {
            tracing::debug!("No sender registered for player {}", player_id);
        }
    }

    async fn send_notice(&self, player_id: &str, text: &str) {
        self.send_to_player(
            player_id,
            ServerMessage::Notice {
                message: text.to_string(),
            },
        )
        .await;
    }

    pub async fn reserve_player(&self, player_id: &str, name: &str) {
        let mut players = self.players.write().await;
        let player = Player::new(player_id, name, SPAWN_X, SPAWN_Y);
        players.insert(player_id.to_string(), player);
    }

    pub async fn activate_player(&self, player_id: &str) -> String {
        let mut players = self.players.write().await;
        if let Some(player) = players.get_mut(player_id) {
            player.active = true;
            return player.name.clone();
        }
        "Unknown".to_string()
    }

    pub async fn remove_player(&self, player_id: &str) {
        {
            let mut conversations = self.conversations.write().await;
            if conversations.remove(player_id).is_some() {
                tracing::debug!("Dropped active conversation for departing player {}", player_id);
            }
        }
        let mut players = self.players.write().await;
        players.remove(player_id);
    }

    /// Number of connected players
    pub async fn player_count(&self) -> usize {
        let players = self.players.read().await;
        players.values().filter(|p| p.active).count()
    }

    /// Spawn position of a player, if present
    pub async fn player_position(&self, player_id: &str) -> Option<(i32, i32)> {
        let players = self.players.read().await;
        players.get(player_id).map(|p| (p.x, p.y))
    }

    /// Connected players as (id, name, x, y), for syncing a new joiner
    pub async fn active_players(&self) -> Vec<(String, String, i32, i32)> {
        let players = self.players.read().await;
        players
            .values()
            .filter(|p| p.active)
            .map(|p| (p.id.clone(), p.name.clone(), p.x, p.y))
            .collect()
    }

    /// Every NPC in the room, for the connect handshake
    pub async fn npc_list(&self) -> Vec<NpcUpdate> {
        let npcs = self.npcs.read().await;
        npcs.values().map(NpcUpdate::from).collect()
    }

    // ========================================================================
    // Movement and Chat
    // ========================================================================

    pub async fn handle_move(&self, player_id: &str, dx: f32, dy: f32) {
        // Convert to a single grid step, no diagonal movement
        let (step_x, step_y) = if dx.abs() > dy.abs() {
            let sx = if dx > 0.1 {
                1
            } else if dx < -0.1 {
                -1
            } else {
                0
            };
            (sx, 0)
        } else if dy.abs() > 0.1 {
            let sy = if dy > 0.1 { 1 } else { -1 };
            (0, sy)
        } else {
            (0, 0)
        };

        if step_x == 0 && step_y == 0 {
            return;
        }

        let moved = {
            let mut players = self.players.write().await;
            match players.get_mut(player_id) {
                Some(player) if player.active => {
                    player.x = (player.x + step_x).clamp(0, MAP_WIDTH - 1);
                    player.y = (player.y + step_y).clamp(0, MAP_HEIGHT - 1);
                    Some((player.x, player.y))
                }
                _ => None,
            }
        };

        if let Some((x, y)) = moved {
            self.broadcast(ServerMessage::PlayerMoved {
                id: player_id.to_string(),
                x,
                y,
            })
            .await;
        }
    }

    pub async fn handle_chat(&self, player_id: &str, text: &str) {
        let sanitized = text.trim().chars().take(200).collect::<String>();
        if sanitized.is_empty() {
            return;
        }

        let players = self.players.read().await;
        if let Some(player) = players.get(player_id) {
            if !player.active {
                return;
            }
            let msg = ServerMessage::ChatMessage {
                sender_id: player_id.to_string(),
                sender_name: player.name.clone(),
                text: sanitized,
                timestamp: Utc::now().timestamp_millis() as u64,
            };
            drop(players); // Release lock before broadcast
            self.broadcast(msg).await;
        }
    }

    // ========================================================================
    // NPC Conversations
    // ========================================================================

    pub async fn handle_npc_interact(&self, player_id: &str, npc_id: &str) {
        // Get player position
        let (player_x, player_y) = {
            let players = self.players.read().await;
            match players.get(player_id) {
                Some(p) if p.active => (p.x, p.y),
                _ => return,
            }
        };

        // One conversation at a time; further interacts are ignored until
        // the current one closes
        {
            let conversations = self.conversations.read().await;
            if conversations.contains_key(player_id) {
                tracing::debug!(
                    "Player {} interacted while already in a conversation",
                    player_id
                );
                return;
            }
        }

        let npc = {
            let npcs = self.npcs.read().await;
            match npcs.get(npc_id) {
                Some(npc) => npc.clone(),
                None => {
                    tracing::warn!(
                        "Player {} tried to interact with unknown NPC {}",
                        player_id,
                        npc_id
                    );
                    return;
                }
            }
        };

        if !npc.is_near(player_x as f32, player_y as f32) {
            tracing::debug!("Player {} too far from NPC {} to interact", player_id, npc_id);
            return;
        }

        if let Some(ref barter_id) = npc.barter_id {
            let barter = match self.barter_registry.get(barter_id).await {
                Some(b) => b,
                None => {
                    tracing::error!("NPC {} references unknown barter '{}'", npc_id, barter_id);
                    self.send_notice(player_id, "They have nothing to trade right now.")
                        .await;
                    return;
                }
            };

            tracing::info!(
                "Player {} started barter '{}' with NPC {}",
                player_id,
                barter.id,
                npc_id
            );

            let convo = ActiveConversation {
                source_name: self.item_registry.display_name(&barter.source_item),
                target_name: self.item_registry.display_name(&barter.target_item),
                controller: ConversationController::new(barter),
                npc_id: npc.id.clone(),
                npc_name: npc.name.clone(),
                started_at: Utc::now(),
            };

            {
                let mut conversations = self.conversations.write().await;
                conversations.insert(player_id.to_string(), convo);
            }

            // The first advance presents the greeting
            self.drive_conversation(player_id, ConversationSignal::Advance { selection: None })
                .await;
        } else if let Some(ref line) = npc.chatter {
            self.send_to_player(
                player_id,
                ServerMessage::ShowDialogue {
                    npc_id: npc.id.clone(),
                    speaker: npc.name.clone(),
                    text: line.clone(),
                    options: Vec::new(),
                },
            )
            .await;
        }
    }

    pub async fn handle_dialogue_advance(&self, player_id: &str, selection: Option<i32>) {
        self.drive_conversation(player_id, ConversationSignal::Advance { selection })
            .await;
    }

    pub async fn handle_dialogue_cancel(&self, player_id: &str) {
        self.drive_conversation(player_id, ConversationSignal::Cancel)
            .await;
    }

    /// Feed one signal into a player's conversation and deliver the results.
    ///
    /// The conversation is taken out of the map while it runs, so a signal
    /// arriving for a player with no conversation (stale, duplicate, or after
    /// close) is simply dropped.
    async fn drive_conversation(&self, player_id: &str, signal: ConversationSignal) {
        let mut convo = {
            let mut conversations = self.conversations.write().await;
            match conversations.remove(player_id) {
                Some(c) => c,
                None => return,
            }
        };

        let (outbound, mutated_slots, terminated) = {
            let mut players = self.players.write().await;
            let player = match players.get_mut(player_id) {
                Some(p) if p.active => p,
                _ => {
                    tracing::debug!("Dropping conversation for missing player {}", player_id);
                    return;
                }
            };

            let mut host = RoomConversationHost {
                npc_id: &convo.npc_id,
                npc_name: &convo.npc_name,
                source_name: &convo.source_name,
                target_name: &convo.target_name,
                inventory: &mut player.inventory,
                item_registry: &self.item_registry,
                outbound: Vec::new(),
                mutated: false,
                terminated: false,
            };

            convo.controller.handle(signal, &mut host);

            let RoomConversationHost {
                outbound,
                mutated,
                terminated,
                ..
            } = host;
            let slots = if mutated {
                Some(player.inventory.to_update())
            } else {
                None
            };
            (outbound, slots, terminated)
        };

        for msg in outbound {
            self.send_to_player(player_id, msg).await;
        }

        if let Some(slots) = mutated_slots {
            self.send_to_player(
                player_id,
                ServerMessage::InventoryUpdate {
                    player_id: player_id.to_string(),
                    slots,
                },
            )
            .await;
        }

        if terminated {
            let elapsed = Utc::now() - convo.started_at;
            tracing::info!(
                "Barter '{}' conversation between {} and {} closed after {}ms",
                convo.controller.barter_id(),
                player_id,
                convo.npc_id,
                elapsed.num_milliseconds()
            );
            self.send_to_player(
                player_id,
                ServerMessage::DialogueClosed {
                    npc_id: convo.npc_id.clone(),
                },
            )
            .await;
        } else {
            tracing::debug!(
                "Player {} conversation now at {}",
                player_id,
                convo.controller.phase().as_str()
            );
            let mut conversations = self.conversations.write().await;
            conversations.insert(player_id.to_string(), convo);
        }
    }

    // ========================================================================
    // Admin Grants
    // ========================================================================

    /// Grant an item to one connected player by display name.
    /// Returns how many were actually added (inventory may be short on room).
    pub async fn give_item(
        &self,
        player_name: &str,
        item_id: &str,
        quantity: i32,
    ) -> Result<i32, String> {
        let (player_id, added, slots) = {
            let mut players = self.players.write().await;
            let player = players
                .values_mut()
                .find(|p| p.active && p.name.eq_ignore_ascii_case(player_name))
                .ok_or_else(|| format!("No online player named '{}'", player_name))?;
            let leftover = player.inventory.add_item(item_id, quantity, &self.item_registry);
            (
                player.id.clone(),
                quantity - leftover,
                player.inventory.to_update(),
            )
        };

        if added > 0 {
            self.send_to_player(
                &player_id,
                ServerMessage::InventoryUpdate {
                    player_id: player_id.clone(),
                    slots,
                },
            )
            .await;
            let name = self.item_registry.display_name(item_id);
            self.send_notice(&player_id, &format!("You received {} x{}.", name, added))
                .await;
        }
        Ok(added)
    }

    /// Grant an item to every connected player.
    /// Returns how many players received it.
    pub async fn give_item_to_all(&self, item_id: &str, quantity: i32) -> usize {
        let grants: Vec<(String, i32, Vec<crate::item::InventorySlotUpdate>)> = {
            let mut players = self.players.write().await;
            players
                .values_mut()
                .filter(|p| p.active)
                .map(|p| {
                    let leftover = p.inventory.add_item(item_id, quantity, &self.item_registry);
                    (p.id.clone(), quantity - leftover, p.inventory.to_update())
                })
                .collect()
        };

        let name = self.item_registry.display_name(item_id);
        let mut granted = 0;
        for (player_id, added, slots) in grants {
            if added > 0 {
                granted += 1;
                self.send_to_player(
                    &player_id,
                    ServerMessage::InventoryUpdate {
                        player_id: player_id.clone(),
                        slots,
                    },
                )
                .await;
                self.send_notice(&player_id, &format!("You received {} x{}.", name, added))
                    .await;
            }
        }
        granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barter::BarterRegistry;
    use tempfile::TempDir;

    fn write_data_files(dir: &std::path::Path) {
        std::fs::create_dir_all(dir.join("items")).unwrap();
        std::fs::create_dir_all(dir.join("npcs")).unwrap();
        std::fs::create_dir_all(dir.join("barters")).unwrap();

        std::fs::write(
            dir.join("items").join("trade_goods.toml"),
            r#"
[maple_leaf]
display_name = "Maple Leaf"

[leaf_token]
display_name = "Leaf Token"
category = "token"
"#,
        )
        .unwrap();

        std::fs::write(
            dir.join("npcs").join("town.toml"),
            r#"
[leaf_trader]
display_name = "Rolly"
x = 16.0
y = 15.0
barter_id = "leaf_exchange"

[greeter]
display_name = "Maren"
x = 16.0
y = 17.0
chatter = "Fine weather for trading."
"#,
        )
        .unwrap();

        std::fs::write(
            dir.join("barters").join("leaf_exchange.toml"),
            r#"
id = "leaf_exchange"
source_item = "maple_leaf"
target_item = "leaf_token"
greeting_text = "Got any {source}s for me?"
offer_option = "I want to trade."
prompt_text = "How many {target}s do you want?"
insufficient_text = "Come back with at least 100."
no_space_text = "Your pack has no room."
thanks_text = "Pleasure doing business."
"#,
        )
        .unwrap();
    }

    async fn test_room(dir: &std::path::Path) -> GameRoom {
        let mut item_registry = ItemRegistry::new();
        item_registry.load_from_directory(dir).unwrap();
        let mut npc_registry = NpcRegistry::new();
        npc_registry.load_from_directory(dir).unwrap();
        let barter_registry = Arc::new(BarterRegistry::new(dir));
        barter_registry.load_all().await.unwrap();

        GameRoom::new(
            "test_room",
            Arc::new(item_registry),
            &npc_registry,
            barter_registry,
        )
    }

    async fn join(room: &GameRoom, player_id: &str, name: &str) -> mpsc::Receiver<Vec<u8>> {
        room.reserve_player(player_id, name).await;
        room.activate_player(player_id).await;
        let (tx, rx) = mpsc::channel(64);
        room.register_player_sender(player_id, tx).await;
        rx
    }

    fn drain(rx: &mut mpsc::Receiver<Vec<u8>>) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        while let Ok(bytes) = rx.try_recv() {
            frames.push(bytes);
        }
        frames
    }

    fn frame_parts(bytes: &[u8]) -> (String, rmpv::Value) {
        let mut cursor = std::io::Cursor::new(bytes);
        let value = rmpv::decode::read_value(&mut cursor).unwrap();
        let array = value.as_array().unwrap();
        (
            array[1].as_str().unwrap().to_string(),
            array[2].clone(),
        )
    }

    fn frame_types(frames: &[Vec<u8>]) -> Vec<String> {
        frames.iter().map(|f| frame_parts(f).0).collect()
    }

    fn map_str(value: &rmpv::Value, key: &str) -> String {
        value
            .as_map()
            .unwrap()
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .and_then(|(_, v)| v.as_str())
            .unwrap()
            .to_string()
    }

    fn map_i64(value: &rmpv::Value, key: &str) -> i64 {
        value
            .as_map()
            .unwrap()
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .and_then(|(_, v)| v.as_i64())
            .unwrap()
    }

    #[tokio::test]
    async fn test_barter_conversation_full_exchange() {
        let temp_dir = TempDir::new().unwrap();
        write_data_files(temp_dir.path());
        let room = test_room(temp_dir.path()).await;
        let mut rx = join(&room, "p1", "Tester").await;

        room.give_item("Tester", "maple_leaf", 300).await.unwrap();
        drain(&mut rx); // inventory update + notice from the grant

        room.handle_npc_interact("p1", "leaf_trader").await;
        let frames = drain(&mut rx);
        assert_eq!(frame_types(&frames), vec!["showDialogue"]);
        let (_, greeting) = frame_parts(&frames[0]);
        // {source} resolved to the item display name
        assert_eq!(map_str(&greeting, "text"), "Got any Maple Leafs for me?");
        assert_eq!(map_str(&greeting, "speaker"), "Rolly");

        room.handle_dialogue_advance("p1", None).await;
        let frames = drain(&mut rx);
        assert_eq!(frame_types(&frames), vec!["showNumericPrompt"]);
        let (_, prompt) = frame_parts(&frames[0]);
        assert_eq!(map_i64(&prompt, "min"), 1);
        assert_eq!(map_i64(&prompt, "max"), 3);
        assert_eq!(map_i64(&prompt, "default"), 3);

        room.handle_dialogue_advance("p1", Some(3)).await;
        let frames = drain(&mut rx);
        assert_eq!(
            frame_types(&frames),
            vec!["showDialogue", "inventoryUpdate", "dialogueClosed"]
        );

        // All 300 leaves spent, 3 tokens held
        let (_, inventory) = frame_parts(&frames[1]);
        let slots = inventory
            .as_map()
            .unwrap()
            .iter()
            .find(|(k, _)| k.as_str() == Some("slots"))
            .map(|(_, v)| v.as_array().unwrap().clone())
            .unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(map_str(&slots[0], "item_id"), "leaf_token");
        assert_eq!(map_i64(&slots[0], "quantity"), 3);
    }

    #[tokio::test]
    async fn test_barter_rejected_without_enough_goods() {
        let temp_dir = TempDir::new().unwrap();
        write_data_files(temp_dir.path());
        let room = test_room(temp_dir.path()).await;
        let mut rx = join(&room, "p1", "Tester").await;

        room.give_item("Tester", "maple_leaf", 50).await.unwrap();
        drain(&mut rx);

        room.handle_npc_interact("p1", "leaf_trader").await;
        drain(&mut rx); // greeting

        room.handle_dialogue_advance("p1", None).await;
        let frames = drain(&mut rx);
        // Refusal message, then the dialogue closes; no prompt, no inventory change
        assert_eq!(frame_types(&frames), vec!["showDialogue", "dialogueClosed"]);
        let (_, refusal) = frame_parts(&frames[0]);
        assert_eq!(map_str(&refusal, "text"), "Come back with at least 100.");
    }

    #[tokio::test]
    async fn test_chatter_npc_speaks_without_conversation() {
        let temp_dir = TempDir::new().unwrap();
        write_data_files(temp_dir.path());
        let room = test_room(temp_dir.path()).await;
        let mut rx = join(&room, "p1", "Tester").await;

        room.handle_npc_interact("p1", "greeter").await;
        let frames = drain(&mut rx);
        assert_eq!(frame_types(&frames), vec!["showDialogue"]);
        let (_, line) = frame_parts(&frames[0]);
        assert_eq!(map_str(&line, "text"), "Fine weather for trading.");

        // No conversation was opened, so an advance goes nowhere
        room.handle_dialogue_advance("p1", None).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_drops_conversation() {
        let temp_dir = TempDir::new().unwrap();
        write_data_files(temp_dir.path());
        let room = test_room(temp_dir.path()).await;
        let mut rx = join(&room, "p1", "Tester").await;

        room.give_item("Tester", "maple_leaf", 300).await.unwrap();
        room.handle_npc_interact("p1", "leaf_trader").await;
        drain(&mut rx);

        room.remove_player("p1").await;

        room.handle_dialogue_advance("p1", Some(3)).await;
        assert!(drain(&mut rx).is_empty());
    }
}
