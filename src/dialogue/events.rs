//! Dialogue Event Types
//!
//! Broadcast to observers as sessions start, present nodes, and stop.

use uuid::Uuid;

use super::api::{Answer, DialogueLine};

/// Events emitted over the engine's broadcast channel
#[derive(Debug, Clone)]
pub enum DialogueEvent {
    /// A session began for an NPC
    Started { session: Uuid, npc_key: String },

    /// A talk node is being presented with its passing answers
    Node {
        npc_key: String,
        line: DialogueLine,
        answers: Vec<Answer>,
    },

    /// The session ended (player choice, `end` node, or content error)
    Stopped { npc_key: String },
}

impl DialogueEvent {
    /// Get event type as string (for logging/debugging)
    pub fn event_type(&self) -> &'static str {
        match self {
            DialogueEvent::Started { .. } => "started",
            DialogueEvent::Node { .. } => "node",
            DialogueEvent::Stopped { .. } => "stopped",
        }
    }

    pub fn npc_key(&self) -> &str {
        match self {
            DialogueEvent::Started { npc_key, .. } => npc_key,
            DialogueEvent::Node { npc_key, .. } => npc_key,
            DialogueEvent::Stopped { npc_key } => npc_key,
        }
    }
}
