//! Action Registry
//!
//! Named effects run from node `onEnter`/`onExit` hooks and edge action
//! lists. Unknown names log and no-op; an action can request the session
//! to stop but cannot abort the rest of its list.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::api::{DialogueContext, bool_arg, float_arg, int_arg, str_arg};

/// A named effect over player state, the blackboard, and the side-effect
/// collaborators
#[async_trait]
pub trait Action: Send + Sync {
    async fn run(&self, ctx: &mut DialogueContext<'_>, args: &[Value]);
}

/// Registry of all known actions, keyed by content-facing name
pub struct ActionRegistry {
    entries: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in actions
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("setFlag", Arc::new(SetFlag));
        registry.register("giveItem", Arc::new(GiveItem));
        registry.register("setQuestStage", Arc::new(SetQuestStage));
        registry.register("setNpcStage", Arc::new(SetNpcStage));
        registry.register("playSfx", Arc::new(PlaySfx));
        registry.register("fadeInBgm", Arc::new(FadeInBgm));
        registry.register("fadeOutBgm", Arc::new(FadeOutBgm));
        registry.register("addMapMarker", Arc::new(AddMapMarker));
        registry.register("removeMapMarker", Arc::new(RemoveMapMarker));
        registry.register("endDialogue", Arc::new(EndDialogue));
        registry.register("learnNpcName", Arc::new(LearnNpcName));
        registry
    }

    pub fn register(&mut self, name: &str, action: Arc<dyn Action>) {
        if self.entries.insert(name.to_string(), action).is_some() {
            warn!("Action '{}' registered twice, overwriting", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Run an action by name. Unknown names log and no-op.
    pub async fn run(&self, name: &str, args: &[Value], ctx: &mut DialogueContext<'_>) {
        match self.entries.get(name) {
            Some(action) => action.run(ctx, args).await,
            None => warn!("Unknown dialogue action '{}', skipping", name),
        }
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ============================================================================
// Built-in actions
// ============================================================================

/// `setFlag(key, value = true)`
struct SetFlag;

#[async_trait]
impl Action for SetFlag {
    async fn run(&self, ctx: &mut DialogueContext<'_>, args: &[Value]) {
        let Some(key) = str_arg(args, 0) else {
            warn!("setFlag action is missing its key argument");
            return;
        };
        let value = bool_arg(args, 1).unwrap_or(true);
        ctx.player.set_flag(key, value).await;
    }
}

/// `giveItem(id, n = 1)` — negative n takes items (floored at zero)
struct GiveItem;

#[async_trait]
impl Action for GiveItem {
    async fn run(&self, ctx: &mut DialogueContext<'_>, args: &[Value]) {
        let Some(item_id) = str_arg(args, 0) else {
            warn!("giveItem action is missing its item argument");
            return;
        };
        let count = int_arg(args, 1).unwrap_or(1);
        ctx.player.add_item(item_id, count).await;
    }
}

/// `setQuestStage(questId, stage)`
struct SetQuestStage;

#[async_trait]
impl Action for SetQuestStage {
    async fn run(&self, ctx: &mut DialogueContext<'_>, args: &[Value]) {
        let (Some(quest_id), Some(stage)) = (str_arg(args, 0), int_arg(args, 1)) else {
            warn!("setQuestStage action needs a quest id and a stage");
            return;
        };
        ctx.player.set_quest_stage(quest_id, stage).await;
    }
}

/// `setNpcStage(stage)` — dialogue stage of the current session's NPC
struct SetNpcStage;

#[async_trait]
impl Action for SetNpcStage {
    async fn run(&self, ctx: &mut DialogueContext<'_>, args: &[Value]) {
        let Some(stage) = int_arg(args, 0) else {
            warn!("setNpcStage action needs a stage");
            return;
        };
        ctx.player.set_npc_stage(ctx.npc_key, stage).await;
    }
}

/// `playSfx(name)`
struct PlaySfx;

#[async_trait]
impl Action for PlaySfx {
    async fn run(&self, ctx: &mut DialogueContext<'_>, args: &[Value]) {
        let Some(name) = str_arg(args, 0) else {
            warn!("playSfx action is missing its sound argument");
            return;
        };
        ctx.audio.play_sfx(name);
    }
}

/// `fadeInBgm(track, seconds = 1)`
struct FadeInBgm;

#[async_trait]
impl Action for FadeInBgm {
    async fn run(&self, ctx: &mut DialogueContext<'_>, args: &[Value]) {
        let Some(track) = str_arg(args, 0) else {
            warn!("fadeInBgm action is missing its track argument");
            return;
        };
        let seconds = float_arg(args, 1).unwrap_or(1.0) as f32;
        ctx.audio.fade_in_bgm(track, seconds);
    }
}

/// `fadeOutBgm(seconds = 1)`
struct FadeOutBgm;

#[async_trait]
impl Action for FadeOutBgm {
    async fn run(&self, ctx: &mut DialogueContext<'_>, args: &[Value]) {
        let seconds = float_arg(args, 0).unwrap_or(1.0) as f32;
        ctx.audio.fade_out_bgm(seconds);
    }
}

/// `addMapMarker(id)`
struct AddMapMarker;

#[async_trait]
impl Action for AddMapMarker {
    async fn run(&self, ctx: &mut DialogueContext<'_>, args: &[Value]) {
        let Some(marker_id) = str_arg(args, 0) else {
            warn!("addMapMarker action is missing its marker argument");
            return;
        };
        ctx.map.add_marker(marker_id);
    }
}

/// `removeMapMarker(id)`
struct RemoveMapMarker;

#[async_trait]
impl Action for RemoveMapMarker {
    async fn run(&self, ctx: &mut DialogueContext<'_>, args: &[Value]) {
        let Some(marker_id) = str_arg(args, 0) else {
            warn!("removeMapMarker action is missing its marker argument");
            return;
        };
        ctx.map.remove_marker(marker_id);
    }
}

/// `endDialogue` — request the session to stop after the current list
struct EndDialogue;

#[async_trait]
impl Action for EndDialogue {
    async fn run(&self, ctx: &mut DialogueContext<'_>, _args: &[Value]) {
        ctx.request_stop();
    }
}

/// `learnNpcName(npcId, name)` — display-name override, with the bridge's
/// event fallback when no store is configured
struct LearnNpcName;

#[async_trait]
impl Action for LearnNpcName {
    async fn run(&self, ctx: &mut DialogueContext<'_>, args: &[Value]) {
        let (Some(npc_id), Some(name)) = (str_arg(args, 0), str_arg(args, 1)) else {
            warn!("learnNpcName action needs an npc id and a name");
            return;
        };
        ctx.player.learn_npc_name(npc_id, name).await;
    }
}
