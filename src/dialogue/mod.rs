//! Dialogue System Module
//!
//! Graph-driven NPC dialogue: JSON graphs with conditional branching,
//! name-keyed condition/action registries, locale-resolved assets, and
//! per-NPC persisted progress.

pub mod actions;
pub mod api;
pub mod conditions;
pub mod definition;
pub mod engine;
pub mod events;
pub mod registry;

pub use actions::{Action, ActionRegistry};
pub use api::{
    Answer, AudioBus, Blackboard, DialogueContext, DialogueLine, DialoguePresenter, MapTracker,
    NullAudio, NullMap, SilentPresenter,
};
pub use conditions::{Condition, ConditionRegistry};
pub use definition::{CondOp, Edge, Graph, Node, NodeKind};
pub use engine::DialogueEngine;
pub use events::DialogueEvent;
pub use registry::{GraphRegistry, GraphReloadEvent};
