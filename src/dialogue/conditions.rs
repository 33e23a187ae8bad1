//! Condition Registry
//!
//! Named predicates referenced by dialogue edges (`when` lists). Content
//! addresses conditions by name; unknown names log and evaluate to false
//! so broken narrative data degrades instead of crashing the session.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::api::{DialogueContext, int_arg, str_arg};

/// A named predicate over player state and the session blackboard
#[async_trait]
pub trait Condition: Send + Sync {
    async fn evaluate(&self, ctx: &mut DialogueContext<'_>, args: &[Value]) -> bool;
}

/// Registry of all known conditions, keyed by content-facing name
pub struct ConditionRegistry {
    entries: HashMap<String, Arc<dyn Condition>>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in conditions
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("flag", Arc::new(FlagSet));
        registry.register("notFlag", Arc::new(FlagClear));
        registry.register("hasItem", Arc::new(HasItem));
        registry.register("questStageAtLeast", Arc::new(QuestStageAtLeast));
        registry
    }

    pub fn register(&mut self, name: &str, condition: Arc<dyn Condition>) {
        if self.entries.insert(name.to_string(), condition).is_some() {
            warn!("Condition '{}' registered twice, overwriting", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Evaluate a condition by name. Unknown names log and yield false.
    pub async fn evaluate(
        &self,
        name: &str,
        args: &[Value],
        ctx: &mut DialogueContext<'_>,
    ) -> bool {
        match self.entries.get(name) {
            Some(condition) => condition.evaluate(ctx, args).await,
            None => {
                warn!("Unknown dialogue condition '{}', treating as false", name);
                false
            }
        }
    }
}

impl Default for ConditionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ============================================================================
// Built-in conditions
// ============================================================================

/// `flag(key)` — true when the named flag is set
struct FlagSet;

#[async_trait]
impl Condition for FlagSet {
    async fn evaluate(&self, ctx: &mut DialogueContext<'_>, args: &[Value]) -> bool {
        let Some(key) = str_arg(args, 0) else {
            warn!("flag condition is missing its key argument");
            return false;
        };
        ctx.player.flag(key).await
    }
}

/// `notFlag(key)` — true when the named flag is clear
struct FlagClear;

#[async_trait]
impl Condition for FlagClear {
    async fn evaluate(&self, ctx: &mut DialogueContext<'_>, args: &[Value]) -> bool {
        let Some(key) = str_arg(args, 0) else {
            warn!("notFlag condition is missing its key argument");
            return false;
        };
        !ctx.player.flag(key).await
    }
}

/// `hasItem(id, n = 1)` — true when the player holds at least n of the item
struct HasItem;

#[async_trait]
impl Condition for HasItem {
    async fn evaluate(&self, ctx: &mut DialogueContext<'_>, args: &[Value]) -> bool {
        let Some(item_id) = str_arg(args, 0) else {
            warn!("hasItem condition is missing its item argument");
            return false;
        };
        let required = int_arg(args, 1).unwrap_or(1);
        ctx.player.item_count(item_id).await >= required
    }
}

/// `questStageAtLeast(questId, stage)` — quest progress gate
struct QuestStageAtLeast;

#[async_trait]
impl Condition for QuestStageAtLeast {
    async fn evaluate(&self, ctx: &mut DialogueContext<'_>, args: &[Value]) -> bool {
        let (Some(quest_id), Some(stage)) = (str_arg(args, 0), int_arg(args, 1)) else {
            warn!("questStageAtLeast condition needs a quest id and a stage");
            return false;
        };
        ctx.player.quest_stage(quest_id).await >= stage
    }
}
