//! Player State Bridge
//!
//! Translates the flag/item/quest reads and writes issued by dialogue
//! conditions and actions into a persistence store, falling back to
//! in-memory state (lost on restart) when no store is configured.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};

/// Persisted dialogue position for one NPC
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NpcProgress {
    /// Last non-terminal node the player reached
    pub node_id: Option<String>,
    /// Content-controlled dialogue stage (see the `setNpcStage` action)
    pub stage: i64,
    /// Graph asset key the progress was recorded against
    pub graph_key: Option<String>,
}

/// Persistence collaborator for player state.
///
/// Injected into [`PlayerBridge`] at construction; implementations must not
/// panic on IO failure, they return `Err` and the bridge degrades.
#[async_trait]
pub trait PlayerStateStore: Send + Sync {
    async fn flag(&self, key: &str) -> Result<bool, String>;
    async fn set_flag(&self, key: &str, value: bool) -> Result<(), String>;

    async fn item_count(&self, item_id: &str) -> Result<i64, String>;
    async fn add_item(&self, item_id: &str, count: i64) -> Result<(), String>;

    async fn quest_stage(&self, quest_id: &str) -> Result<i64, String>;
    async fn set_quest_stage(&self, quest_id: &str, stage: i64) -> Result<(), String>;

    async fn npc_progress(&self, npc_key: &str) -> Result<Option<NpcProgress>, String>;
    async fn set_npc_progress(&self, npc_key: &str, progress: &NpcProgress)
    -> Result<(), String>;

    async fn npc_name(&self, npc_id: &str) -> Result<Option<String>, String>;
    async fn set_npc_name(&self, npc_id: &str, name: &str) -> Result<(), String>;
}

/// Events the bridge emits when it cannot write through a store
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// A display name was learned for an NPC but could not be persisted
    /// directly; an embedder may pick this up and store it.
    NpcNameLearned { npc_id: String, name: String },
}

/// In-memory fallback state
#[derive(Debug, Default)]
struct MemoryState {
    flags: HashMap<String, bool>,
    items: HashMap<String, i64>,
    quest_stages: HashMap<String, i64>,
    npc_progress: HashMap<String, NpcProgress>,
    npc_names: HashMap<String, String>,
}

/// The bridge between dialogue content and player state.
///
/// Reads prefer the configured store and degrade to defaults on error;
/// writes are fire-and-forget (a failed write logs a warning and is
/// dropped). Without a store everything lives in [`MemoryState`].
pub struct PlayerBridge {
    store: Option<Arc<dyn PlayerStateStore>>,
    memory: RwLock<MemoryState>,
    events: broadcast::Sender<PlayerEvent>,
}

impl PlayerBridge {
    pub fn new(store: Option<Arc<dyn PlayerStateStore>>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            store,
            memory: RwLock::new(MemoryState::default()),
            events,
        }
    }

    /// Bridge with no persistence collaborator; state is lost on restart.
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub async fn flag(&self, key: &str) -> bool {
        if let Some(store) = &self.store {
            return match store.flag(key).await {
                Ok(value) => value,
                Err(e) => {
                    warn!("Failed to read flag '{}': {}", key, e);
                    false
                }
            };
        }
        self.memory.read().await.flags.get(key).copied().unwrap_or(false)
    }

    pub async fn set_flag(&self, key: &str, value: bool) {
        if let Some(store) = &self.store {
            if let Err(e) = store.set_flag(key, value).await {
                warn!("Failed to write flag '{}': {}", key, e);
            }
            return;
        }
        self.memory.write().await.flags.insert(key.to_string(), value);
    }

    pub async fn item_count(&self, item_id: &str) -> i64 {
        if let Some(store) = &self.store {
            return match store.item_count(item_id).await {
                Ok(count) => count,
                Err(e) => {
                    warn!("Failed to read item count for '{}': {}", item_id, e);
                    0
                }
            };
        }
        self.memory.read().await.items.get(item_id).copied().unwrap_or(0)
    }

    pub async fn add_item(&self, item_id: &str, count: i64) {
        if let Some(store) = &self.store {
            if let Err(e) = store.add_item(item_id, count).await {
                warn!("Failed to add {}x '{}': {}", count, item_id, e);
            }
            return;
        }
        let mut memory = self.memory.write().await;
        let entry = memory.items.entry(item_id.to_string()).or_insert(0);
        *entry = (*entry + count).max(0);
    }

    pub async fn quest_stage(&self, quest_id: &str) -> i64 {
        if let Some(store) = &self.store {
            return match store.quest_stage(quest_id).await {
                Ok(stage) => stage,
                Err(e) => {
                    warn!("Failed to read quest stage for '{}': {}", quest_id, e);
                    0
                }
            };
        }
        self.memory.read().await.quest_stages.get(quest_id).copied().unwrap_or(0)
    }

    pub async fn set_quest_stage(&self, quest_id: &str, stage: i64) {
        if let Some(store) = &self.store {
            if let Err(e) = store.set_quest_stage(quest_id, stage).await {
                warn!("Failed to write quest stage for '{}': {}", quest_id, e);
            }
            return;
        }
        self.memory.write().await.quest_stages.insert(quest_id.to_string(), stage);
    }

    pub async fn npc_progress(&self, npc_key: &str) -> Option<NpcProgress> {
        if let Some(store) = &self.store {
            return match store.npc_progress(npc_key).await {
                Ok(progress) => progress,
                Err(e) => {
                    warn!("Failed to read progress for '{}': {}", npc_key, e);
                    None
                }
            };
        }
        self.memory.read().await.npc_progress.get(npc_key).cloned()
    }

    pub async fn set_npc_node(&self, npc_key: &str, node_id: &str) {
        self.update_progress(npc_key, |p| p.node_id = Some(node_id.to_string()))
            .await;
    }

    pub async fn set_npc_stage(&self, npc_key: &str, stage: i64) {
        self.update_progress(npc_key, |p| p.stage = stage).await;
    }

    pub async fn set_npc_graph_key(&self, npc_key: &str, graph_key: &str) {
        self.update_progress(npc_key, |p| p.graph_key = Some(graph_key.to_string()))
            .await;
    }

    async fn update_progress(&self, npc_key: &str, apply: impl FnOnce(&mut NpcProgress)) {
        if let Some(store) = &self.store {
            let mut progress = match store.npc_progress(npc_key).await {
                Ok(progress) => progress.unwrap_or_default(),
                Err(e) => {
                    warn!("Failed to read progress for '{}': {}", npc_key, e);
                    NpcProgress::default()
                }
            };
            apply(&mut progress);
            if let Err(e) = store.set_npc_progress(npc_key, &progress).await {
                warn!("Failed to write progress for '{}': {}", npc_key, e);
            }
            return;
        }
        let mut memory = self.memory.write().await;
        let progress = memory.npc_progress.entry(npc_key.to_string()).or_default();
        apply(progress);
    }

    pub async fn npc_name(&self, npc_id: &str) -> Option<String> {
        if let Some(store) = &self.store {
            return match store.npc_name(npc_id).await {
                Ok(name) => name,
                Err(e) => {
                    warn!("Failed to read display name for '{}': {}", npc_id, e);
                    None
                }
            };
        }
        self.memory.read().await.npc_names.get(npc_id).cloned()
    }

    /// Record a learned display name for an NPC.
    ///
    /// Writes through the store when one is configured. Without a store (or
    /// when the write fails) the name is broadcast as
    /// [`PlayerEvent::NpcNameLearned`] so an embedder can persist it; the
    /// in-memory copy keeps speaker resolution working for this run.
    pub async fn learn_npc_name(&self, npc_id: &str, name: &str) {
        if let Some(store) = &self.store {
            match store.set_npc_name(npc_id, name).await {
                Ok(()) => return,
                Err(e) => {
                    warn!("Failed to persist display name for '{}': {}", npc_id, e);
                }
            }
        }
        self.memory
            .write()
            .await
            .npc_names
            .insert(npc_id.to_string(), name.to_string());
        let delivered = self.events.send(PlayerEvent::NpcNameLearned {
            npc_id: npc_id.to_string(),
            name: name.to_string(),
        });
        if delivered.is_err() {
            debug!("No listener for learned NPC name '{}'", npc_id);
        }
    }
}
