//! Echoes dialogue runner.
//!
//! Terminal driver for the dialogue engine: loads settings and graph
//! assets, opens the player database when one is configured, and plays
//! dialogue content interactively. Intended for narrative authors to walk
//! their graphs the way the game will.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

mod config;
mod db;
mod dialogue;
mod locale;
mod player;

use config::Settings;
use db::Database;
use dialogue::api::{Answer, AudioBus, DialogueLine, DialoguePresenter, MapTracker};
use dialogue::{DialogueEngine, GraphRegistry};
use player::{PlayerBridge, PlayerEvent, PlayerStateStore};

// ============================================================================
// Console collaborators
// ============================================================================

/// Prints dialogue lines and numbered answers to stdout
struct ConsolePresenter;

impl DialoguePresenter for ConsolePresenter {
    fn show_line(&self, line: &DialogueLine, answers: &[Answer]) {
        println!();
        println!("  {}: {}", line.speaker, line.text);
        for answer in answers {
            println!("    [{}] {}", answer.index, answer.text);
        }
        if answers.is_empty() {
            println!("    (no answers — 'stop' to leave)");
        }
    }

    fn hide(&self) {
        println!("  --- dialogue ended ---");
    }
}

/// Logs audio cues instead of playing them
struct ConsoleAudio;

impl AudioBus for ConsoleAudio {
    fn play_sfx(&self, name: &str) {
        info!("sfx: {}", name);
    }
    fn fade_in_bgm(&self, track: &str, seconds: f32) {
        info!("bgm fade-in: {} over {}s", track, seconds);
    }
    fn fade_out_bgm(&self, seconds: f32) {
        info!("bgm fade-out over {}s", seconds);
    }
}

/// Logs map marker changes
struct ConsoleMap;

impl MapTracker for ConsoleMap {
    fn add_marker(&self, marker_id: &str) {
        info!("map marker added: {}", marker_id);
    }
    fn remove_marker(&self, marker_id: &str) {
        info!("map marker removed: {}", marker_id);
    }
}

fn print_help() {
    println!("Commands:");
    println!("  talk <npc> [locale]   start or resume a dialogue");
    println!("  <number>              pick an answer");
    println!("  stop                  leave the current dialogue");
    println!("  help                  show this help");
    println!("  quit                  exit");
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("echoes_dialogue=info".parse().unwrap()),
        )
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "echoes.toml".to_string());
    let settings = Settings::load_or_default(Path::new(&config_path));

    // Open the player store when one is configured
    let store: Option<Arc<dyn PlayerStateStore>> = match &settings.database_url {
        Some(url) => match Database::new(url).await {
            Ok(db) => Some(Arc::new(db)),
            Err(e) => {
                error!("Failed to open database '{}': {}", url, e);
                warn!("Continuing with in-memory player state");
                None
            }
        },
        None => {
            info!("No database configured, player state is in-memory only");
            None
        }
    };

    let bridge = Arc::new(PlayerBridge::new(store));
    let graphs = Arc::new(GraphRegistry::new(&settings.data_dir));

    // Surface learned NPC names that could not be persisted directly
    let mut player_events = bridge.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = player_events.recv().await {
            match event {
                PlayerEvent::NpcNameLearned { npc_id, name } => {
                    info!("learned name for '{}': {}", npc_id, name);
                }
            }
        }
    });

    // Hot-reload dialogue graphs while authoring
    match graphs.start_file_watcher() {
        Ok(mut reloads) => {
            tokio::spawn(async move {
                while let Some(event) = reloads.recv().await {
                    let dialogue::GraphReloadEvent::Invalidated(graph_key) = event;
                    info!("'{}' will reload on next talk", graph_key);
                }
            });
        }
        Err(e) => warn!("Hot reload unavailable: {}", e),
    }

    let mut engine = DialogueEngine::new(graphs, bridge, Arc::new(ConsolePresenter))
        .with_audio(Arc::new(ConsoleAudio))
        .with_map_tracker(Arc::new(ConsoleMap))
        .with_locale(settings.locale.clone(), settings.fallback_locales.clone());

    println!("Echoes dialogue runner — data dir {:?}", settings.data_dir);
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let mut parts = input.split_whitespace();
        match parts.next() {
            Some("quit") | Some("exit") => break,
            Some("help") => print_help(),
            Some("stop") => engine.stop(),
            Some("talk") => match parts.next() {
                Some(npc_key) => {
                    let locale = parts.next();
                    if !engine.start_for(npc_key, locale).await {
                        println!("  {} has nothing to say.", npc_key);
                    }
                }
                None => println!("  usage: talk <npc> [locale]"),
            },
            Some(word) => match word.parse::<usize>() {
                Ok(index) if engine.is_active() => engine.choose(index).await,
                Ok(_) => println!("  no dialogue in progress — 'talk <npc>' first"),
                Err(_) => println!("  unknown command '{}' — 'help' for commands", word),
            },
            None => {}
        }
    }

    engine.stop();
    info!("Goodbye");
}
