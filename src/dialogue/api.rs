//! Dialogue Context and Collaborator Contracts
//!
//! Defines the context object handed to conditions and actions, the
//! per-session blackboard, and the interfaces the engine drives for
//! presentation and side effects.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::player::PlayerBridge;

/// Ephemeral per-session key/value scratch space.
///
/// Scoped to one `start`..`stop` session; never persisted.
#[derive(Debug, Default)]
pub struct Blackboard {
    values: HashMap<String, Value>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Context object passed to dialogue conditions and actions.
///
/// Provides the player-state bridge, the session blackboard, the side-effect
/// collaborators, and the key of the NPC the session belongs to.
pub struct DialogueContext<'a> {
    pub player: &'a PlayerBridge,
    pub blackboard: &'a mut Blackboard,
    pub audio: &'a dyn AudioBus,
    pub map: &'a dyn MapTracker,
    pub npc_key: &'a str,
    stop: bool,
}

impl<'a> DialogueContext<'a> {
    pub fn new(
        player: &'a PlayerBridge,
        blackboard: &'a mut Blackboard,
        audio: &'a dyn AudioBus,
        map: &'a dyn MapTracker,
        npc_key: &'a str,
    ) -> Self {
        Self {
            player,
            blackboard,
            audio,
            map,
            npc_key,
            stop: false,
        }
    }

    /// Ask the engine to end the session once the running action list
    /// finishes.
    pub fn request_stop(&mut self) {
        self.stop = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.stop
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

pub fn str_arg<'v>(args: &'v [Value], index: usize) -> Option<&'v str> {
    args.get(index).and_then(Value::as_str)
}

pub fn int_arg(args: &[Value], index: usize) -> Option<i64> {
    args.get(index).and_then(Value::as_i64)
}

pub fn bool_arg(args: &[Value], index: usize) -> Option<bool> {
    args.get(index).and_then(Value::as_bool)
}

pub fn float_arg(args: &[Value], index: usize) -> Option<f64> {
    args.get(index).and_then(Value::as_f64)
}

// ============================================================================
// Presentation contract
// ============================================================================

/// One beat of dialogue, ready for display. The speaker has any learned
/// display-name override already applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogueLine {
    pub node_id: String,
    pub speaker: String,
    pub text: String,
}

/// A selectable player answer. `index` addresses the filtered
/// passing-edge list and is what `choose` expects back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub index: usize,
    pub text: String,
}

/// UI collaborator the engine drives. Implementations render however they
/// like; the engine only ever calls these two methods.
pub trait DialoguePresenter: Send + Sync {
    fn show_line(&self, line: &DialogueLine, answers: &[Answer]);
    fn hide(&self);
}

/// Presenter that renders nothing
pub struct SilentPresenter;

impl DialoguePresenter for SilentPresenter {
    fn show_line(&self, _line: &DialogueLine, _answers: &[Answer]) {}
    fn hide(&self) {}
}

// ============================================================================
// Side-effect collaborators
// ============================================================================

/// Audio collaborator for the `playSfx` / `fadeInBgm` / `fadeOutBgm`
/// actions.
pub trait AudioBus: Send + Sync {
    fn play_sfx(&self, name: &str);
    fn fade_in_bgm(&self, track: &str, seconds: f32);
    fn fade_out_bgm(&self, seconds: f32);
}

/// Map collaborator for the `addMapMarker` / `removeMapMarker` actions.
pub trait MapTracker: Send + Sync {
    fn add_marker(&self, marker_id: &str);
    fn remove_marker(&self, marker_id: &str);
}

pub struct NullAudio;

impl AudioBus for NullAudio {
    fn play_sfx(&self, _name: &str) {}
    fn fade_in_bgm(&self, _track: &str, _seconds: f32) {}
    fn fade_out_bgm(&self, _seconds: f32) {}
}

pub struct NullMap;

impl MapTracker for NullMap {
    fn add_marker(&self, _marker_id: &str) {}
    fn remove_marker(&self, _marker_id: &str) {}
}
