use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

mod barter;
mod data;
mod dialogue;
mod game;
mod item;
mod npc;
mod protocol;

use barter::BarterRegistry;
use data::{ItemRegistry, NpcRegistry};
use game::GameRoom;
use protocol::{ClientMessage, ServerMessage};

// ============================================================================
// App State
// ============================================================================

/// Session data for a player reserved through matchmaking
#[derive(Clone)]
struct GameSession {
    room_id: String,
    player_id: String,
    display_name: String,
}

#[derive(Clone)]
struct AppState {
    rooms: Arc<DashMap<String, Arc<GameRoom>>>,
    // Session ID -> GameSession
    sessions: Arc<DashMap<String, GameSession>>,
    matchmake_rate_limiter: RateLimiter,
    admin_rate_limiter: RateLimiter,
    // SECURITY: Signed session token generator
    token_signer: SessionTokenSigner,
    // Definition registries (loaded from TOML at startup)
    item_registry: Arc<ItemRegistry>,
    npc_registry: Arc<NpcRegistry>,
    barter_registry: Arc<BarterRegistry>,
}

impl AppState {
    async fn new() -> Self {
        let data_dir = std::path::Path::new("data");

        // Load item registry from TOML files
        let mut item_registry = ItemRegistry::new();
        if let Err(e) = item_registry.load_from_directory(data_dir) {
            error!("Failed to load item registry: {}", e);
        }

        // Load NPC registry from TOML files
        let mut npc_registry = NpcRegistry::new();
        if let Err(e) = npc_registry.load_from_directory(data_dir) {
            error!("Failed to load NPC registry: {}", e);
        }

        // Load barter registry from TOML files
        let barter_registry = Arc::new(BarterRegistry::new(data_dir));
        if let Err(e) = barter_registry.load_all().await {
            error!("Failed to load barter registry: {}", e);
        }

        // Start hot-reload watcher for barter files (dev mode)
        #[cfg(debug_assertions)]
        {
            match barter_registry.start_file_watcher() {
                Ok(mut rx) => {
                    // Spawn task to log reload events
                    tokio::spawn(async move {
                        while let Some(event) = rx.recv().await {
                            match event {
                                barter::HotReloadEvent::Reloaded(path) => {
                                    info!("Barter hot-reload: {}", path);
                                }
                                barter::HotReloadEvent::Error(e) => {
                                    error!("Barter hot-reload error: {}", e);
                                }
                            }
                        }
                    });
                    info!("Barter hot-reload enabled");
                }
                Err(e) => {
                    warn!("Failed to start barter hot-reload: {}", e);
                }
            }
        }

        Self {
            rooms: Arc::new(DashMap::new()),
            sessions: Arc::new(DashMap::new()),
            // Matchmaking: 20 attempts per 60 seconds per IP
            matchmake_rate_limiter: RateLimiter::new(20, 60),
            // Admin: 10 attempts per 60 seconds per IP
            admin_rate_limiter: RateLimiter::new(10, 60),
            // SECURITY: Token signer for session tokens
            token_signer: SessionTokenSigner::new(),
            item_registry: Arc::new(item_registry),
            npc_registry: Arc::new(npc_registry),
            barter_registry,
        }
    }

    fn get_or_create_room(&self, room_name: &str) -> Arc<GameRoom> {
        // Check if a room with this name already exists
        for room in self.rooms.iter() {
            if room.name == room_name {
                return room.clone();
            }
        }

        // Create new room and store by its UUID
        let room = Arc::new(GameRoom::new(
            room_name,
            self.item_registry.clone(),
            &self.npc_registry,
            self.barter_registry.clone(),
        ));
        self.rooms.insert(room.id.clone(), room.clone());
        room
    }
}

// ============================================================================
// Signed Session Tokens (Security Hardening)
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// Session token validity duration
const SESSION_TOKEN_EXPIRY_SECS: u64 = 300; // 5 minutes

/// Signed session token generator/validator
#[derive(Clone)]
struct SessionTokenSigner {
    /// Secret key for HMAC signing (generated at startup)
    secret: Vec<u8>,
}

impl SessionTokenSigner {
    fn new() -> Self {
        // Generate a random 32-byte secret at startup
        use rand::RngCore;
        let mut secret = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self { secret }
    }

    /// Create a signed session token
    /// Format: base64(session_id:room_id:expiry_ts:signature)
    fn create_token(&self, session_id: &str, room_id: &str) -> String {
        use base64::Engine;

        let expiry = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() + SESSION_TOKEN_EXPIRY_SECS;

        let payload = format!("{}:{}:{}", session_id, room_id, expiry);

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();

        let token_data = format!("{}:{}", payload, base64::engine::general_purpose::STANDARD.encode(signature));
        base64::engine::general_purpose::URL_SAFE.encode(token_data)
    }

    /// Validate a signed session token
    /// Returns Some((session_id, room_id)) if valid, None if invalid/expired
    fn validate_token(&self, token: &str) -> Option<(String, String)> {
        use base64::Engine;

        // Decode base64
        let token_data = base64::engine::general_purpose::URL_SAFE.decode(token).ok()?;
        let token_str = String::from_utf8(token_data).ok()?;

        // Parse: session_id:room_id:expiry:signature
        let parts: Vec<&str> = token_str.splitn(4, ':').collect();
        if parts.len() != 4 {
            return None;
        }

        let session_id = parts[0];
        let room_id = parts[1];
        let expiry: u64 = parts[2].parse().ok()?;
        let signature_b64 = parts[3];

        // Check expiry
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        if now > expiry {
            warn!("Session token expired: {} > {}", now, expiry);
            return None;
        }

        // Verify signature
        let payload = format!("{}:{}:{}", session_id, room_id, expiry);
        let expected_sig = base64::engine::general_purpose::STANDARD.decode(signature_b64).ok()?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());

        if mac.verify_slice(&expected_sig).is_err() {
            warn!("Session token signature invalid");
            return None;
        }

        Some((session_id.to_string(), room_id.to_string()))
    }
}

/// Rate limiter entry: (request_count, window_start_time)
type RateLimitEntry = (u32, std::time::Instant);

/// Simple IP-based rate limiter
#[derive(Clone)]
struct RateLimiter {
    /// IP -> (request_count, window_start)
    entries: Arc<DashMap<String, RateLimitEntry>>,
    /// Max requests per window
    max_requests: u32,
    /// Window duration
    window_duration: Duration,
}

impl RateLimiter {
    fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_requests,
            window_duration: Duration::from_secs(window_secs),
        }
    }

    /// Check if request is allowed. Returns true if allowed, false if rate limited.
    fn check(&self, ip: &str) -> bool {
        let now = std::time::Instant::now();

        let mut entry = self.entries.entry(ip.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        // Reset window if expired
        if now.duration_since(*window_start) > self.window_duration {
            *count = 0;
            *window_start = now;
        }

        // Check limit
        if *count >= self.max_requests {
            return false;
        }

        *count += 1;
        true
    }

    /// Record a failed attempt (for stricter limiting on failures)
    fn record_failure(&self, ip: &str) {
        let now = std::time::Instant::now();
        let mut entry = self.entries.entry(ip.to_string()).or_insert((0, now));
        let (count, _) = entry.value_mut();
        // Add extra penalty for failures
        *count = (*count).saturating_add(2);
    }
}

// ============================================================================
// HTTP Handlers - Matchmaking
// ============================================================================

#[derive(Deserialize)]
struct JoinOptions {
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Serialize)]
struct MatchmakeResponse {
    room: RoomInfo,
    /// Signed session token for WebSocket upgrade (expires in 5 minutes)
    #[serde(rename = "sessionToken")]
    session_token: String,
}

#[derive(Serialize)]
struct RoomInfo {
    #[serde(rename = "roomId")]
    room_id: String,
    name: String,
    clients: usize,
}

async fn matchmake_join_or_create(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(room_name): Path<String>,
    Json(options): Json<JoinOptions>,
) -> impl IntoResponse {
    let client_ip = addr.ip().to_string();

    if !state.matchmake_rate_limiter.check(&client_ip) {
        warn!("Rate limit exceeded for matchmaking from {}", client_ip);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": "Too many requests. Please try again later." }))
        ).into_response();
    }

    // Validate display name
    let display_name = options.display_name.trim().to_string();
    if display_name.len() < 2 {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Display name must be at least 2 characters" }))
        ).into_response();
    }
    if display_name.len() > 16 {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Display name must be at most 16 characters" }))
        ).into_response();
    }

    let room = state.get_or_create_room(&room_name);
    let room_id = room.id.clone();

    // Create a guest session for this player
    let session_id = Uuid::new_v4().to_string();
    let player_id = Uuid::new_v4().to_string();

    state.sessions.insert(
        session_id.clone(),
        GameSession {
            room_id: room_id.clone(),
            player_id: player_id.clone(),
            display_name: display_name.clone(),
        },
    );

    // Reserve a spawn slot; the player turns active on WebSocket connect
    room.reserve_player(&player_id, &display_name).await;

    let client_count = room.player_count().await;

    // Generate signed session token for WebSocket upgrade
    let session_token = state.token_signer.create_token(&session_id, &room_id);

    info!(
        "Matchmaking: room={}, player={} ({})",
        room_id, display_name, player_id
    );

    Json(MatchmakeResponse {
        room: RoomInfo {
            room_id,
            name: room_name,
            clients: client_count,
        },
        session_token,
    }).into_response()
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().timestamp_millis()
    }))
}

// ============================================================================
// HTTP Handlers - Admin
// ============================================================================

#[derive(Deserialize)]
struct GiveRequest {
    /// Target player display name; omitted means every connected player
    player: Option<String>,
    #[serde(rename = "itemId")]
    item_id: String,
    quantity: i32,
}

/// POST /admin/give - Grant items to connected players.
/// Requires the ADMIN_TOKEN environment variable as a bearer token.
async fn admin_give_item(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    Json(req): Json<GiveRequest>,
) -> impl IntoResponse {
    let client_ip = addr.ip().to_string();

    if !state.admin_rate_limiter.check(&client_ip) {
        warn!("Rate limit exceeded for admin give from {}", client_ip);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": "Too many requests. Please try again later." }))
        ).into_response();
    }

    let admin_token = match std::env::var("ADMIN_TOKEN") {
        Ok(token) if !token.is_empty() => token,
        _ => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": "Admin endpoint disabled (no ADMIN_TOKEN set)" }))
            ).into_response();
        }
    };

    let provided = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));
    if provided != Some(admin_token.as_str()) {
        state.admin_rate_limiter.record_failure(&client_ip);
        warn!("Admin give rejected: invalid token from {}", client_ip);
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid admin token" }))
        ).into_response();
    }

    if req.quantity <= 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Quantity must be positive" }))
        ).into_response();
    }
    if !state.item_registry.contains(&req.item_id) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": format!("Unknown item '{}'", req.item_id) }))
        ).into_response();
    }

    let rooms: Vec<Arc<GameRoom>> = state.rooms.iter().map(|r| r.value().clone()).collect();

    if let Some(player_name) = req.player.as_deref() {
        for room in rooms {
            if let Ok(added) = room.give_item(player_name, &req.item_id, req.quantity).await {
                info!(
                    "Admin grant: {} x{} to {} (room {})",
                    req.item_id, added, player_name, room.name
                );
                return Json(serde_json::json!({
                    "success": true,
                    "player": player_name,
                    "granted": added
                })).into_response();
            }
        }
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("No online player named '{}'", player_name) }))
        ).into_response()
    } else {
        let mut players = 0;
        for room in rooms {
            players += room.give_item_to_all(&req.item_id, req.quantity).await;
        }
        info!(
            "Admin grant: {} x{} to {} player(s)",
            req.item_id, req.quantity, players
        );
        Json(serde_json::json!({
            "success": true,
            "players": players,
            "granted": req.quantity
        })).into_response()
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

#[derive(Deserialize)]
struct WsQuery {
    /// Signed session token
    #[serde(rename = "sessionToken")]
    session_token: String,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // Validate signed session token
    let session_id = match state.token_signer.validate_token(&query.session_token) {
        Some((sid, rid)) => {
            if rid != room_id {
                warn!("WebSocket rejected: Token room_id mismatch ({} != {})", rid, room_id);
                return (StatusCode::FORBIDDEN, "Invalid session token: room mismatch").into_response();
            }
            sid
        }
        None => {
            warn!("WebSocket rejected: Invalid or expired session token");
            return (StatusCode::UNAUTHORIZED, "Invalid or expired session token").into_response();
        }
    };

    // Validate session exists in our store
    let session_data = state.sessions.get(&session_id).map(|s| s.clone());

    match session_data {
        Some(session) if session.room_id == room_id => {
            // Valid session, upgrade to WebSocket
            let player_id = session.player_id.clone();
            let display_name = session.display_name.clone();
            ws.on_upgrade(move |socket| {
                handle_socket(socket, state, room_id, player_id, session_id, display_name)
            })
        }
        _ => {
            warn!("Invalid session: {} for room {}", session_id, room_id);
            (StatusCode::FORBIDDEN, "Invalid session").into_response()
        }
    }
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    room_id: String,
    player_id: String,
    session_id: String,
    display_name: String,
) {
    let (mut sender, mut receiver) = socket.split();

    // Get the room
    let room = match state.rooms.get(&room_id) {
        Some(r) => r.clone(),
        None => {
            error!("Room not found: {}", room_id);
            return;
        }
    };

    // Activate the player
    let player_name = room.activate_player(&player_id).await;
    info!("Player {} ({}) connected to room {}", player_name, player_id, room_id);

    // Subscribe to room broadcasts
    let mut broadcast_rx = room.subscribe();

    // Send welcome message
    let welcome = ServerMessage::Welcome {
        player_id: player_id.clone(),
    };
    if let Ok(bytes) = protocol::encode_server_message(&welcome) {
        let _ = sender.send(Message::Binary(bytes)).await;
    }

    // Send item definitions
    let item_defs = state.item_registry.to_client_definitions();
    if let Ok(bytes) = protocol::encode_server_message(&item_defs) {
        let _ = sender.send(Message::Binary(bytes)).await;
    }

    // Send the NPC roster
    let npc_msg = ServerMessage::NpcList {
        npcs: room.npc_list().await,
    };
    if let Ok(bytes) = protocol::encode_server_message(&npc_msg) {
        let _ = sender.send(Message::Binary(bytes)).await;
    }

    // Send existing players to this client
    for (id, name, x, y) in room.active_players().await {
        if id != player_id {
            let msg = ServerMessage::PlayerJoined { id, name, x, y };
            if let Ok(bytes) = protocol::encode_server_message(&msg) {
                let _ = sender.send(Message::Binary(bytes)).await;
            }
        }
    }

    // Notify others about this player
    let (x, y) = room.player_position(&player_id).await.unwrap_or((0, 0));
    room.broadcast(ServerMessage::PlayerJoined {
        id: player_id.clone(),
        name: player_name.clone(),
        x,
        y,
    })
    .await;

    // Create channel for sending messages to this client
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(32);

    // SECURITY: Register this player's sender for unicast messages
    room.register_player_sender(&player_id, tx).await;

    // Spawn task to forward messages to WebSocket
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                // Handle direct messages to this client
                Some(msg) = rx.recv() => {
                    if sender.send(Message::Binary(msg)).await.is_err() {
                        break;
                    }
                }
                // Handle broadcast messages
                Ok(msg) = broadcast_rx.recv() => {
                    if let Ok(bytes) = protocol::encode_server_message(&msg) {
                        if sender.send(Message::Binary(bytes)).await.is_err() {
                            break;
                        }
                    }
                }
                else => break,
            }
        }
    });

    // Handle incoming messages
    let room_clone = room.clone();
    let player_id_clone = player_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    if let Err(e) = handle_client_message(&room_clone, &player_id_clone, &data).await {
                        warn!("Error handling message: {}", e);
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Player {} disconnected from room {}", display_name, room_id);

    // SECURITY: Unregister player sender before cleanup
    room.unregister_player_sender(&player_id).await;

    state.sessions.remove(&session_id);
    room.remove_player(&player_id).await;

    // Notify others
    room.broadcast(ServerMessage::PlayerLeft {
        id: player_id.clone(),
    })
    .await;
}

async fn handle_client_message(
    room: &GameRoom,
    player_id: &str,
    data: &[u8],
) -> Result<(), String> {
    let msg = protocol::decode_client_message(data)?;

    match msg {
        ClientMessage::Move { dx, dy } => {
            room.handle_move(player_id, dx, dy).await;
        }
        ClientMessage::Chat { text } => {
            room.handle_chat(player_id, &text).await;
        }
        ClientMessage::Interact { npc_id } => {
            room.handle_npc_interact(player_id, &npc_id).await;
        }
        ClientMessage::DialogueAdvance { selection } => {
            room.handle_dialogue_advance(player_id, selection).await;
        }
        ClientMessage::DialogueCancel => {
            room.handle_dialogue_cancel(player_id).await;
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tradepost_server=info".parse().unwrap()),
        )
        .init();

    let state = AppState::new().await;

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(health_check))
        // Matchmaking
        .route("/matchmake/joinOrCreate/:room", post(matchmake_join_or_create))
        // Admin
        .route("/admin/give", post(admin_give_item))
        // WebSocket
        .route("/:room_id", get(ws_handler))
        // In development, you may want CorsLayer::permissive()
        // For production, specify allowed origins explicitly
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS
                ])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::AUTHORIZATION
                ])
        )
        .with_state(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(2567);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Trade post server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await.unwrap();
}
