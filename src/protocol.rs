use serde::{Deserialize, Serialize};

use crate::npc::NpcUpdate;

// ============================================================================
// Client -> Server Messages
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "move")]
    Move { dx: f32, dy: f32 },

    #[serde(rename = "chat")]
    Chat { text: String },

    /// Interact with an NPC (start a conversation)
    #[serde(rename = "interact")]
    Interact { npc_id: String },

    /// Player continued their active conversation. The selection carries
    /// the number entered at a numeric prompt, when there was one.
    #[serde(rename = "dialogueAdvance")]
    DialogueAdvance { selection: Option<i32> },

    /// Player closed their active conversation
    #[serde(rename = "dialogueCancel")]
    DialogueCancel,
}

// ============================================================================
// Server -> Client Messages
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Welcome {
        player_id: String,
    },
    /// Sent on connect: all item definitions for client-side registry
    ItemDefinitions {
        items: Vec<ClientItemDef>,
    },
    /// Sent on connect: every NPC in the room
    NpcList {
        npcs: Vec<NpcUpdate>,
    },
    PlayerJoined {
        id: String,
        name: String,
        x: i32,
        y: i32,
    },
    PlayerLeft {
        id: String,
    },
    PlayerMoved {
        id: String,
        x: i32,
        y: i32,
    },
    ChatMessage {
        #[serde(rename = "senderId")]
        sender_id: String,
        #[serde(rename = "senderName")]
        sender_name: String,
        text: String,
        timestamp: u64,
    },
    /// Show a dialogue line with zero or more continuation options
    ShowDialogue {
        npc_id: String,
        speaker: String,
        text: String,
        options: Vec<String>,
    },
    /// Show a numeric entry prompt bounded to [min, max]
    ShowNumericPrompt {
        npc_id: String,
        speaker: String,
        text: String,
        default: i32,
        min: i32,
        max: i32,
    },
    /// Tell client to close the dialogue UI
    DialogueClosed {
        npc_id: String,
    },
    InventoryUpdate {
        player_id: String,
        slots: Vec<crate::item::InventorySlotUpdate>,
    },
    /// Out-of-band server notice shown in the chat log
    Notice {
        message: String,
    },
    Error {
        code: u32,
        message: String,
    },
}

/// Item definition for client-side registry
#[derive(Debug, Clone, Serialize)]
pub struct ClientItemDef {
    pub id: String,
    pub display_name: String,
    pub sprite: String,
    pub category: String, // "material", "token", "consumable"
    pub max_stack: i32,
    pub description: String,
}

impl ServerMessage {
    pub fn msg_type(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::ItemDefinitions { .. } => "itemDefinitions",
            ServerMessage::NpcList { .. } => "npcList",
            ServerMessage::PlayerJoined { .. } => "playerJoined",
            ServerMessage::PlayerLeft { .. } => "playerLeft",
            ServerMessage::PlayerMoved { .. } => "playerMoved",
            ServerMessage::ChatMessage { .. } => "chatMessage",
            ServerMessage::ShowDialogue { .. } => "showDialogue",
            ServerMessage::ShowNumericPrompt { .. } => "showNumericPrompt",
            ServerMessage::DialogueClosed { .. } => "dialogueClosed",
            ServerMessage::InventoryUpdate { .. } => "inventoryUpdate",
            ServerMessage::Notice { .. } => "notice",
            ServerMessage::Error { .. } => "error",
        }
    }
}

// ============================================================================
// Encoding/Decoding
// ============================================================================

/// Encode a server message to MessagePack format
/// Format: [13, "msg_type", {data}] (matching Colyseus ROOM_DATA protocol)
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, String> {
    use rmpv::Value;

    let msg_type = msg.msg_type();

    // Convert message to rmpv::Value
    let data = match msg {
        ServerMessage::Welcome { player_id } => {
            let mut map = Vec::new();
            map.push((
                Value::String("player_id".into()),
                Value::String(player_id.clone().into()),
            ));
            Value::Map(map)
        }
        ServerMessage::ItemDefinitions { items } => {
            let mut map = Vec::new();
            let item_values: Vec<Value> = items
                .iter()
                .map(|item| {
                    let mut imap = Vec::new();
                    imap.push((Value::String("id".into()), Value::String(item.id.clone().into())));
                    imap.push((
                        Value::String("display_name".into()),
                        Value::String(item.display_name.clone().into()),
                    ));
                    imap.push((
                        Value::String("sprite".into()),
                        Value::String(item.sprite.clone().into()),
                    ));
                    imap.push((
                        Value::String("category".into()),
                        Value::String(item.category.clone().into()),
                    ));
                    imap.push((
                        Value::String("max_stack".into()),
                        Value::Integer((item.max_stack as i64).into()),
                    ));
                    imap.push((
                        Value::String("description".into()),
                        Value::String(item.description.clone().into()),
                    ));
                    Value::Map(imap)
                })
                .collect();
            map.push((Value::String("items".into()), Value::Array(item_values)));
            Value::Map(map)
        }
        ServerMessage::NpcList { npcs } => {
            let mut map = Vec::new();
            let npc_values: Vec<Value> = npcs
                .iter()
                .map(|npc| {
                    let mut nmap = Vec::new();
                    nmap.push((Value::String("id".into()), Value::String(npc.id.clone().into())));
                    nmap.push((
                        Value::String("name".into()),
                        Value::String(npc.name.clone().into()),
                    ));
                    nmap.push((
                        Value::String("sprite".into()),
                        Value::String(npc.sprite.clone().into()),
                    ));
                    nmap.push((Value::String("x".into()), Value::F64(npc.x as f64)));
                    nmap.push((Value::String("y".into()), Value::F64(npc.y as f64)));
                    nmap.push((
                        Value::String("can_trade".into()),
                        Value::Boolean(npc.can_trade),
                    ));
                    Value::Map(nmap)
                })
                .collect();
            map.push((Value::String("npcs".into()), Value::Array(npc_values)));
            Value::Map(map)
        }
        ServerMessage::PlayerJoined { id, name, x, y } => {
            let mut map = Vec::new();
            map.push((Value::String("id".into()), Value::String(id.clone().into())));
            map.push((
                Value::String("name".into()),
                Value::String(name.clone().into()),
            ));
            map.push((Value::String("x".into()), Value::Integer((*x as i64).into())));
            map.push((Value::String("y".into()), Value::Integer((*y as i64).into())));
            Value::Map(map)
        }
        ServerMessage::PlayerLeft { id } => {
            let mut map = Vec::new();
            map.push((Value::String("id".into()), Value::String(id.clone().into())));
            Value::Map(map)
        }
        ServerMessage::PlayerMoved { id, x, y } => {
            let mut map = Vec::new();
            map.push((Value::String("id".into()), Value::String(id.clone().into())));
            map.push((Value::String("x".into()), Value::Integer((*x as i64).into())));
            map.push((Value::String("y".into()), Value::Integer((*y as i64).into())));
            Value::Map(map)
        }
        ServerMessage::ChatMessage {
            sender_id,
            sender_name,
            text,
            timestamp,
        } => {
            let mut map = Vec::new();
            map.push((
                Value::String("senderId".into()),
                Value::String(sender_id.clone().into()),
            ));
            map.push((
                Value::String("senderName".into()),
                Value::String(sender_name.clone().into()),
            ));
            map.push((
                Value::String("text".into()),
                Value::String(text.clone().into()),
            ));
            map.push((
                Value::String("timestamp".into()),
                Value::Integer((*timestamp).into()),
            ));
            Value::Map(map)
        }
        ServerMessage::ShowDialogue {
            npc_id,
            speaker,
            text,
            options,
        } => {
            let mut map = Vec::new();
            map.push((
                Value::String("npc_id".into()),
                Value::String(npc_id.clone().into()),
            ));
            map.push((
                Value::String("speaker".into()),
                Value::String(speaker.clone().into()),
            ));
            map.push((
                Value::String("text".into()),
                Value::String(text.clone().into()),
            ));
            let option_values: Vec<Value> = options
                .iter()
                .map(|o| Value::String(o.clone().into()))
                .collect();
            map.push((Value::String("options".into()), Value::Array(option_values)));
            Value::Map(map)
        }
        ServerMessage::ShowNumericPrompt {
            npc_id,
            speaker,
            text,
            default,
            min,
            max,
        } => {
            let mut map = Vec::new();
            map.push((
                Value::String("npc_id".into()),
                Value::String(npc_id.clone().into()),
            ));
            map.push((
                Value::String("speaker".into()),
                Value::String(speaker.clone().into()),
            ));
            map.push((
                Value::String("text".into()),
                Value::String(text.clone().into()),
            ));
            map.push((
                Value::String("default".into()),
                Value::Integer((*default as i64).into()),
            ));
            map.push((Value::String("min".into()), Value::Integer((*min as i64).into())));
            map.push((Value::String("max".into()), Value::Integer((*max as i64).into())));
            Value::Map(map)
        }
        ServerMessage::DialogueClosed { npc_id } => {
            let mut map = Vec::new();
            map.push((
                Value::String("npc_id".into()),
                Value::String(npc_id.clone().into()),
            ));
            Value::Map(map)
        }
        ServerMessage::InventoryUpdate { player_id, slots } => {
            let mut map = Vec::new();
            map.push((
                Value::String("player_id".into()),
                Value::String(player_id.clone().into()),
            ));
            let slot_values: Vec<Value> = slots
                .iter()
                .map(|s| {
                    let mut smap = Vec::new();
                    smap.push((
                        Value::String("slot".into()),
                        Value::Integer((s.slot as i64).into()),
                    ));
                    smap.push((
                        Value::String("item_id".into()),
                        Value::String(s.item_id.clone().into()),
                    ));
                    smap.push((
                        Value::String("quantity".into()),
                        Value::Integer((s.quantity as i64).into()),
                    ));
                    Value::Map(smap)
                })
                .collect();
            map.push((Value::String("slots".into()), Value::Array(slot_values)));
            Value::Map(map)
        }
        ServerMessage::Notice { message } => {
            let mut map = Vec::new();
            map.push((
                Value::String("message".into()),
                Value::String(message.clone().into()),
            ));
            Value::Map(map)
        }
        ServerMessage::Error { code, message } => {
            let mut map = Vec::new();
            map.push((
                Value::String("code".into()),
                Value::Integer((*code as i64).into()),
            ));
            map.push((
                Value::String("message".into()),
                Value::String(message.clone().into()),
            ));
            Value::Map(map)
        }
    };

    // Encode as [13, "msg_type", data] - matching Colyseus ROOM_DATA format
    let array = Value::Array(vec![
        Value::Integer(13.into()), // Protocol.RoomData
        Value::String(msg_type.into()),
        data,
    ]);

    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &array)
        .map_err(|e| format!("Failed to encode message: {}", e))?;

    Ok(buf)
}

/// Decode a client message from MessagePack format
/// Expected format: [13, "msg_type", {data}]
pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, String> {
    use rmpv::Value;
    use std::io::Cursor;

    let mut cursor = Cursor::new(data);
    let value = rmpv::decode::read_value(&mut cursor)
        .map_err(|e| format!("Failed to decode MessagePack: {}", e))?;

    let array = value
        .as_array()
        .ok_or("Expected array")?;

    if array.len() < 2 {
        return Err("Array too short".to_string());
    }

    let protocol = array[0]
        .as_u64()
        .ok_or("Protocol code must be integer")? as u8;

    if protocol != 13 {
        return Err(format!("Unexpected protocol code: {}", protocol));
    }

    let msg_type = array[1]
        .as_str()
        .ok_or("Message type must be string")?;

    let msg_data = if array.len() > 2 {
        &array[2]
    } else {
        &Value::Nil
    };

    match msg_type {
        "move" => {
            let dx = extract_f32(msg_data, "dx").unwrap_or(0.0);
            let dy = extract_f32(msg_data, "dy").unwrap_or(0.0);
            Ok(ClientMessage::Move { dx, dy })
        }
        "chat" => {
            let text = extract_string(msg_data, "text").unwrap_or_default();
            Ok(ClientMessage::Chat { text })
        }
        "interact" => {
            let npc_id = extract_string(msg_data, "npc_id").unwrap_or_default();
            Ok(ClientMessage::Interact { npc_id })
        }
        "dialogueAdvance" => {
            // Absent or non-numeric selection decodes as None; the
            // conversation decides what that means for its current step.
            let selection = extract_i32(msg_data, "selection");
            Ok(ClientMessage::DialogueAdvance { selection })
        }
        "dialogueCancel" => Ok(ClientMessage::DialogueCancel),
        _ => Err(format!("Unknown message type: {}", msg_type)),
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn extract_string(value: &rmpv::Value, key: &str) -> Option<String> {
    value.as_map().and_then(|map| {
        map.iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .and_then(|(_, v)| v.as_str().map(|s| s.to_string()))
    })
}

fn extract_f32(value: &rmpv::Value, key: &str) -> Option<f32> {
    value.as_map().and_then(|map| {
        map.iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .and_then(|(_, v)| {
                v.as_f64()
                    .map(|f| f as f32)
                    .or_else(|| v.as_i64().map(|i| i as f32))
                    .or_else(|| v.as_u64().map(|u| u as f32))
            })
    })
}

fn extract_i32(value: &rmpv::Value, key: &str) -> Option<i32> {
    value.as_map().and_then(|map| {
        map.iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .and_then(|(_, v)| {
                v.as_i64()
                    .map(|i| i as i32)
                    .or_else(|| v.as_u64().map(|u| u as i32))
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmpv::Value;

    fn encode_client_frame(msg_type: &str, data: Value) -> Vec<u8> {
        let array = Value::Array(vec![
            Value::Integer(13.into()),
            Value::String(msg_type.into()),
            data,
        ]);
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &array).unwrap();
        buf
    }

    #[test]
    fn test_decode_advance_with_selection() {
        let data = Value::Map(vec![(
            Value::String("selection".into()),
            Value::Integer(3.into()),
        )]);
        let buf = encode_client_frame("dialogueAdvance", data);

        match decode_client_message(&buf).unwrap() {
            ClientMessage::DialogueAdvance { selection } => assert_eq!(selection, Some(3)),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_advance_without_selection() {
        let buf = encode_client_frame("dialogueAdvance", Value::Map(vec![]));

        match decode_client_message(&buf).unwrap() {
            ClientMessage::DialogueAdvance { selection } => assert_eq!(selection, None),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_wrong_protocol_code() {
        let array = Value::Array(vec![
            Value::Integer(7.into()),
            Value::String("chat".into()),
            Value::Map(vec![]),
        ]);
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &array).unwrap();

        assert!(decode_client_message(&buf).is_err());
    }
}
