//! Dialogue Graph Registry
//!
//! Loads, caches, and invalidates dialogue graphs from the data directory.
//! Graphs are locale-specific JSON assets named `"<npc_key>_<locale>.json"`.
//! Supports hot-reloading during authoring.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error, info};

use super::definition::Graph;

/// Registry for loaded dialogue graphs
pub struct GraphRegistry {
    /// Loaded graphs, keyed by graph key (`"<npc_key>_<locale>"`)
    graphs: DashMap<String, Arc<Graph>>,
    /// Directory holding the dialogue JSON assets
    dialogue_dir: PathBuf,
}

impl GraphRegistry {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            graphs: DashMap::new(),
            dialogue_dir: data_dir.join("dialogue"),
        }
    }

    fn asset_path(&self, graph_key: &str) -> PathBuf {
        self.dialogue_dir.join(format!("{}.json", graph_key))
    }

    /// Load a graph by key, serving from the cache when possible.
    pub fn load(&self, graph_key: &str) -> Result<Arc<Graph>, String> {
        if let Some(graph) = self.graphs.get(graph_key) {
            return Ok(graph.value().clone());
        }

        let path = self.asset_path(graph_key);
        if !path.exists() {
            return Err(format!("Graph asset not found: {:?}", path));
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        let graph = Graph::from_json(&content).map_err(|e| format!("{:?}: {}", path, e))?;

        info!("Loaded dialogue graph '{}' ({} nodes)", graph_key, graph.len());

        let graph = Arc::new(graph);
        self.graphs.insert(graph_key.to_string(), graph.clone());
        Ok(graph)
    }

    /// Resolve an NPC's graph against an ordered locale chain.
    ///
    /// Missing assets move silently to the next locale; a present but
    /// malformed asset is logged and skipped. Returns the graph key that
    /// won together with the graph, or None when every locale failed.
    pub fn resolve_for_npc(&self, npc_key: &str, locales: &[String]) -> Option<(String, Arc<Graph>)> {
        for locale in locales {
            let graph_key = format!("{}_{}", npc_key, locale);
            if !self.graphs.contains_key(&graph_key) && !self.asset_path(&graph_key).exists() {
                debug!("No dialogue asset for '{}'", graph_key);
                continue;
            }
            match self.load(&graph_key) {
                Ok(graph) => return Some((graph_key, graph)),
                Err(e) => error!("Failed to load dialogue graph: {}", e),
            }
        }
        None
    }

    /// Drop a cached graph so the next load re-reads it from disk.
    /// Sessions holding the old `Arc<Graph>` are unaffected.
    pub fn invalidate(&self, graph_key: &str) -> bool {
        self.graphs.remove(graph_key).is_some()
    }

    /// Get count of cached graphs
    pub fn loaded_count(&self) -> usize {
        self.graphs.len()
    }

    /// Start a file watcher that invalidates cached graphs when their
    /// assets change on disk. Returns a channel receiver reporting what
    /// was invalidated.
    pub fn start_file_watcher(
        self: &Arc<Self>,
    ) -> Result<tokio::sync::mpsc::Receiver<GraphReloadEvent>, String> {
        use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
        use std::time::Duration;

        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let registry = Arc::clone(self);
        let dialogue_dir = self.dialogue_dir.clone();

        if !dialogue_dir.exists() {
            return Err(format!("Dialogue directory does not exist: {:?}", dialogue_dir));
        }

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
                    error!("Failed to create dialogue watcher: {}", e);
                    return;
                }
            };

            if let Err(e) = watcher.watch(&dialogue_dir, RecursiveMode::NonRecursive) {
                error!("Failed to watch dialogue directory: {}", e);
                return;
            }

            info!("Dialogue hot-reload watcher started for {:?}", dialogue_dir);

            loop {
                match notify_rx.recv() {
                    Ok(event) => {
                        use notify::EventKind;
                        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                            continue;
                        }
                        for path in &event.paths {
                            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                                continue;
                            }
                            let Some(graph_key) = path.file_stem().and_then(|s| s.to_str())
                            else {
                                continue;
                            };
                            if registry.invalidate(graph_key) {
                                info!("Dialogue graph '{}' changed, cache invalidated", graph_key);
                                if tx
                                    .blocking_send(GraphReloadEvent::Invalidated(
                                        graph_key.to_string(),
                                    ))
                                    .is_err()
                                {
                                    return;
                                }
                            }
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
pub enum GraphReloadEvent {
    /// A cached graph was invalidated after its asset changed
    Invalidated(String),
}
