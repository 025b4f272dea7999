//! Barter Registry
//!
//! Loads and caches barter definitions from TOML files.
//! Supports hot-reloading during development.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::definition::BarterDefinition;

/// Registry for all barter definitions
pub struct BarterRegistry {
    /// Loaded barter definitions
    barters: RwLock<HashMap<String, Arc<BarterDefinition>>>,
    /// Directory holding barter TOML files
    data_dir: PathBuf,
}

impl BarterRegistry {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            barters: RwLock::new(HashMap::new()),
            data_dir: data_dir.join("barters"),
        }
    }

    /// Load all barter definitions from the data directory
    pub async fn load_all(&self) -> Result<(), String> {
        info!("Loading barters from {:?}", self.data_dir);

        if !self.data_dir.exists() {
            warn!("Barter directory does not exist: {:?}", self.data_dir);
            return Ok(());
        }

        let entries = std::fs::read_dir(&self.data_dir)
            .map_err(|e| format!("Failed to read directory {:?}: {}", self.data_dir, e))?;

        let mut loaded = HashMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
            let path = entry.path();

            if !path.extension().map_or(false, |ext| ext == "toml") {
                continue;
            }

            match Self::load_file(&path) {
                Ok(barter) => {
                    if loaded.contains_key(&barter.id) {
                        warn!("Duplicate barter id '{}' in {:?}, overwriting", barter.id, path);
                    }
                    loaded.insert(barter.id.clone(), Arc::new(barter));
                }
                Err(e) => {
                    warn!("Failed to load barter {:?}: {}", path, e);
                }
            }
        }

        info!("Loaded {} barter definitions", loaded.len());

        let mut barters = self.barters.write().await;
        *barters = loaded;

        Ok(())
    }

    /// Load a single barter file
    fn load_file(path: &Path) -> Result<BarterDefinition, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;

        let barter: BarterDefinition = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;

        barter.validate()?;
        Ok(barter)
    }

    /// Get a barter definition by id
    pub async fn get(&self, id: &str) -> Option<Arc<BarterDefinition>> {
        let barters = self.barters.read().await;
        barters.get(id).cloned()
    }

    /// Get count of loaded barters
    pub async fn count(&self) -> usize {
        self.barters.read().await.len()
    }

    /// Start file watcher for hot-reload
    /// Returns a channel receiver that signals when reloads occur
    pub fn start_file_watcher(
        self: &Arc<Self>,
    ) -> Result<tokio::sync::mpsc::Receiver<HotReloadEvent>, String> {
        use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
        use std::time::Duration;

        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let registry = Arc::clone(self);
        let data_dir = self.data_dir.clone();

        // notify is sync, so the watcher runs on its own thread. Capture the
        // runtime handle here so reloads can be spawned back onto it.
        let rt = tokio::runtime::Handle::current();

        std::thread::spawn(move || {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut watcher = match RecommendedWatcher::new(
                move |res: Result<notify::Event, notify::Error>| {
                    if let Ok(event) = res {
                        let _ = notify_tx.send(event);
                    }
                },
                Config::default().with_poll_interval(Duration::from_secs(1)),
            ) {
                Ok(w) => w,
                Err(e) => {
                    tracing::error!("Failed to create file watcher: {}", e);
                    return;
                }
            };

            if data_dir.exists() {
                if let Err(e) = watcher.watch(&data_dir, RecursiveMode::Recursive) {
                    tracing::error!("Failed to watch barter directory: {}", e);
                }
            }

            info!("Barter hot-reload watcher started for {:?}", data_dir);

            loop {
                match notify_rx.recv() {
                    Ok(event) => {
                        use notify::EventKind;
                        match event.kind {
                            EventKind::Modify(_) | EventKind::Create(_) => {
                                for path in &event.paths {
                                    let extension = path.extension()
                                        .and_then(|e| e.to_str())
                                        .unwrap_or("");

                                    if extension == "toml" {
                                        info!("Detected change in {:?}, triggering reload", path);

                                        let reg = Arc::clone(&registry);
                                        let tx = tx.clone();
                                        let path_clone = path.clone();

                                        rt.spawn(async move {
                                            if let Err(e) = reg.load_all().await {
                                                tracing::error!("Hot-reload failed: {}", e);
                                                let _ = tx.send(HotReloadEvent::Error(e)).await;
                                            } else {
                                                info!("Hot-reload completed successfully");
                                                let _ = tx.send(HotReloadEvent::Reloaded(
                                                    path_clone.to_string_lossy().to_string()
                                                )).await;
                                            }
                                        });
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                    Err(_) => {
                        // Channel closed, exit
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Events from the hot-reload watcher
#[derive(Debug, Clone)]
pub enum HotReloadEvent {
    /// A file was reloaded successfully
    Reloaded(String),
    /// An error occurred during reload
    Error(String),
}
