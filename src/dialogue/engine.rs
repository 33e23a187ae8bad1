//! Dialogue Engine
//!
//! The state machine that walks a dialogue graph: it evaluates edge
//! conditions, runs node and edge actions, persists per-NPC progress, and
//! drives the presenter. One engine owns at most one active session.
//!
//! Content failures never escape as errors: a missing node, a graph that
//! fails to load, or an unknown condition/action name logs and degrades
//! (the session stops or the effect is skipped).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::locale;
use crate::player::PlayerBridge;

use super::actions::ActionRegistry;
use super::api::{
    Answer, AudioBus, Blackboard, DialogueContext, DialogueLine, DialoguePresenter, MapTracker,
    NullAudio, NullMap,
};
use super::conditions::ConditionRegistry;
use super::definition::{ActionSpec, CondOp, CondSpec, Edge, Graph, Node, NodeKind};
use super::events::DialogueEvent;
use super::registry::GraphRegistry;

/// One active dialogue session
struct Session {
    id: Uuid,
    npc_key: String,
    graph: Arc<Graph>,
    current: Option<String>,
    blackboard: Blackboard,
    started_at: DateTime<Utc>,
}

/// Outcome of taking an edge
enum Transition {
    Next(String),
    Stop,
}

pub struct DialogueEngine {
    graphs: Arc<GraphRegistry>,
    player: Arc<PlayerBridge>,
    conditions: ConditionRegistry,
    actions: ActionRegistry,
    presenter: Arc<dyn DialoguePresenter>,
    audio: Arc<dyn AudioBus>,
    map: Arc<dyn MapTracker>,
    events: broadcast::Sender<DialogueEvent>,
    /// Configured locale preference; None defers to the environment
    locale: Option<String>,
    fallback_locales: Vec<String>,
    session: Option<Session>,
}

impl DialogueEngine {
    pub fn new(
        graphs: Arc<GraphRegistry>,
        player: Arc<PlayerBridge>,
        presenter: Arc<dyn DialoguePresenter>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            graphs,
            player,
            conditions: ConditionRegistry::with_builtins(),
            actions: ActionRegistry::with_builtins(),
            presenter,
            audio: Arc::new(NullAudio),
            map: Arc::new(NullMap),
            events,
            locale: None,
            fallback_locales: vec![locale::DEFAULT_LOCALE.to_string()],
            session: None,
        }
    }

    pub fn with_audio(mut self, audio: Arc<dyn AudioBus>) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_map_tracker(mut self, map: Arc<dyn MapTracker>) -> Self {
        self.map = map;
        self
    }

    pub fn with_locale(mut self, locale: Option<String>, fallbacks: Vec<String>) -> Self {
        self.locale = locale;
        self.fallback_locales = fallbacks;
        self
    }

    /// Registry accessors for custom content vocabulary
    pub fn conditions_mut(&mut self) -> &mut ConditionRegistry {
        &mut self.conditions
    }

    pub fn actions_mut(&mut self) -> &mut ActionRegistry {
        &mut self.actions
    }

    pub fn player(&self) -> &PlayerBridge {
        &self.player
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DialogueEvent> {
        self.events.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn npc_key(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.npc_key.as_str())
    }

    pub fn current_node_id(&self) -> Option<&str> {
        self.session.as_ref().and_then(|s| s.current.as_deref())
    }

    pub fn blackboard(&self) -> Option<&Blackboard> {
        self.session.as_ref().map(|s| &s.blackboard)
    }

    /// Start a dialogue with an NPC, resolving the graph asset through the
    /// locale chain and resuming from persisted progress.
    ///
    /// Returns false (after logging) when no graph could be loaded for any
    /// locale; no session is started in that case.
    pub async fn start_for(&mut self, npc_key: &str, locale: Option<&str>) -> bool {
        if self.session.is_some() {
            self.stop();
        }

        let primary = locale::detect(locale, self.locale.as_deref());
        let chain = locale::fallback_chain(&primary, &self.fallback_locales);
        let Some((graph_key, graph)) = self.graphs.resolve_for_npc(npc_key, &chain) else {
            error!(
                "No dialogue graph for '{}' (tried locales {:?})",
                npc_key, chain
            );
            return false;
        };

        self.player.set_npc_graph_key(npc_key, &graph_key).await;

        // Resume from the last persisted node, unless it is terminal or no
        // longer part of the graph.
        let resume = self
            .player
            .npc_progress(npc_key)
            .await
            .and_then(|p| p.node_id);
        let start_node = match resume {
            Some(node_id) => match graph.node(&node_id) {
                Some(node) if node.kind != NodeKind::End => Some(node_id),
                Some(_) => {
                    debug!(
                        "Persisted node '{}' for '{}' is terminal, restarting",
                        node_id, npc_key
                    );
                    None
                }
                None => {
                    warn!(
                        "Persisted node '{}' is no longer in '{}', restarting",
                        node_id, graph_key
                    );
                    None
                }
            },
            None => None,
        };

        self.start_with(npc_key, graph, start_node.as_deref()).await;
        true
    }

    /// Start a session on an already-loaded graph, from `start_id` or the
    /// graph's declared start.
    pub async fn start_with(&mut self, npc_key: &str, graph: Arc<Graph>, start_id: Option<&str>) {
        if self.session.is_some() {
            self.stop();
        }

        let start = start_id.unwrap_or_else(|| graph.start()).to_string();
        let session = Session {
            id: Uuid::new_v4(),
            npc_key: npc_key.to_string(),
            graph,
            current: None,
            blackboard: Blackboard::new(),
            started_at: Utc::now(),
        };

        info!("Dialogue session {} started for '{}'", session.id, npc_key);
        let _ = self.events.send(DialogueEvent::Started {
            session: session.id,
            npc_key: npc_key.to_string(),
        });

        self.session = Some(session);
        self.goto(&start).await;
    }

    /// Answer the currently-presented node with an index into its passing
    /// edge list. No-op while idle or when the index is out of range.
    pub async fn choose(&mut self, index: usize) {
        let Some((graph, current)) = self
            .session
            .as_ref()
            .map(|s| (s.graph.clone(), s.current.clone()))
        else {
            debug!("choose({}) ignored, no active dialogue", index);
            return;
        };
        let Some(current) = current else {
            return;
        };
        let Some(node) = graph.node(&current) else {
            return;
        };

        // Resolve against the same filtered edge list that was presented
        let mut passing: Vec<&Edge> = Vec::new();
        for edge in &node.outs {
            if self.check(&edge.when).await {
                passing.push(edge);
            }
        }
        let Some(&edge) = passing.get(index) else {
            debug!(
                "choose({}) out of range, node '{}' has {} passing answers",
                index,
                node.id,
                passing.len()
            );
            return;
        };

        match self.traverse(&node.on_exit, edge).await {
            Transition::Next(to) => self.goto(&to).await,
            Transition::Stop => self.stop(),
        }
    }

    /// End the session. Idempotent; clears the current node, hides the
    /// presenter, and emits `Stopped`.
    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.presenter.hide();
        let _ = self.events.send(DialogueEvent::Stopped {
            npc_key: session.npc_key.clone(),
        });
        debug!(
            "Dialogue session {} ended after {}s",
            session.id,
            (Utc::now() - session.started_at).num_seconds()
        );
    }

    /// Enter a node by id, following `auto` chains iteratively until a
    /// `talk` node presents or the session ends.
    async fn goto(&mut self, node_id: &str) {
        let Some(graph) = self.session.as_ref().map(|s| s.graph.clone()) else {
            return;
        };
        // Cyclic auto chains would otherwise never yield
        let hop_limit = graph.len().saturating_mul(2).max(8);
        let mut hops = 0usize;
        let mut next = node_id.to_string();

        loop {
            hops += 1;
            if hops > hop_limit {
                warn!("Auto-node chain exceeded {} hops, ending dialogue", hop_limit);
                self.stop();
                return;
            }

            let Some(node) = graph.node(&next) else {
                warn!("Dialogue node '{}' not found, ending dialogue", next);
                self.stop();
                return;
            };

            let npc_key = match self.session.as_mut() {
                Some(session) => {
                    session.current = Some(node.id.clone());
                    session.npc_key.clone()
                }
                None => return,
            };

            // Terminal nodes are never a resume point
            if node.kind != NodeKind::End {
                self.player.set_npc_node(&npc_key, &node.id).await;
            }

            if self.run_actions(&node.on_enter).await {
                self.stop();
                return;
            }

            match node.kind {
                NodeKind::End => {
                    let _ = self.run_actions(&node.on_exit).await;
                    self.stop();
                    return;
                }
                NodeKind::Auto => {
                    let mut taken = None;
                    for edge in &node.outs {
                        if self.check(&edge.when).await {
                            taken = Some(edge);
                            break;
                        }
                    }
                    let Some(edge) = taken else {
                        debug!("Auto node '{}' has no passing edge, ending dialogue", node.id);
                        self.stop();
                        return;
                    };
                    match self.traverse(&node.on_exit, edge).await {
                        Transition::Next(to) => {
                            next = to;
                        }
                        Transition::Stop => {
                            self.stop();
                            return;
                        }
                    }
                }
                NodeKind::Talk => {
                    self.present(node).await;
                    return;
                }
            }
        }
    }

    /// Present a talk node: filter its passing edges into answers, emit the
    /// node event, and hand off to the presenter.
    async fn present(&mut self, node: &Node) {
        let mut answers = Vec::new();
        for edge in &node.outs {
            if self.check(&edge.when).await {
                answers.push(Answer {
                    index: answers.len(),
                    text: edge.text.clone().unwrap_or_default(),
                });
            }
        }

        let Some(npc_key) = self.session.as_ref().map(|s| s.npc_key.clone()) else {
            return;
        };

        // Speaker falls back to the NPC key, with any learned display-name
        // override applied.
        let speaker_id = node.speaker.clone().unwrap_or_else(|| npc_key.clone());
        let speaker = self
            .player
            .npc_name(&speaker_id)
            .await
            .unwrap_or(speaker_id);

        let line = DialogueLine {
            node_id: node.id.clone(),
            speaker,
            text: node.text.clone().unwrap_or_default(),
        };

        let _ = self.events.send(DialogueEvent::Node {
            npc_key,
            line: line.clone(),
            answers: answers.clone(),
        });
        self.presenter.show_line(&line, &answers);
    }

    /// Take an edge: run the current node's `on_exit`, then the edge's
    /// actions. A requested stop or an edge without a target ends the
    /// session instead of transitioning.
    async fn traverse(&mut self, on_exit: &[ActionSpec], edge: &Edge) -> Transition {
        let mut stop = self.run_actions(on_exit).await;
        stop |= self.run_actions(&edge.actions).await;
        if stop {
            return Transition::Stop;
        }
        match &edge.to {
            Some(to) => Transition::Next(to.clone()),
            None => Transition::Stop,
        }
    }

    /// Run an action list to completion. Returns true when any action
    /// requested the session to stop.
    async fn run_actions(&mut self, specs: &[ActionSpec]) -> bool {
        if specs.is_empty() {
            return false;
        }
        let Some(session) = self.session.as_mut() else {
            return true;
        };
        let npc_key = session.npc_key.clone();
        let mut ctx = DialogueContext::new(
            &self.player,
            &mut session.blackboard,
            self.audio.as_ref(),
            self.map.as_ref(),
            &npc_key,
        );
        for spec in specs {
            self.actions.run(&spec.name, &spec.args, &mut ctx).await;
        }
        ctx.stop_requested()
    }

    /// Evaluate a `when` list. Empty lists pass. The list folds left to
    /// right; each entry joins with its own `op`, defaulting to the
    /// operator carried from the previous entry (initially `and`). Every
    /// condition is evaluated; there is no short-circuit.
    async fn check(&mut self, when: &[CondSpec]) -> bool {
        if when.is_empty() {
            return true;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let npc_key = session.npc_key.clone();
        let mut ctx = DialogueContext::new(
            &self.player,
            &mut session.blackboard,
            self.audio.as_ref(),
            self.map.as_ref(),
            &npc_key,
        );

        let mut result = true;
        let mut op = CondOp::And;
        for spec in when {
            if let Some(explicit) = spec.op {
                op = explicit;
            }
            let value = self
                .conditions
                .evaluate(&spec.name, &spec.args, &mut ctx)
                .await;
            result = match op {
                CondOp::And => result && value,
                CondOp::Or => result || value,
            };
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::actions::Action;
    use crate::dialogue::conditions::Condition;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Eq)]
    enum PresenterCall {
        Show {
            node_id: String,
            speaker: String,
            answers: Vec<String>,
        },
        Hide,
    }

    #[derive(Default)]
    struct RecordingPresenter {
        calls: Mutex<Vec<PresenterCall>>,
    }

    impl RecordingPresenter {
        fn take(&self) -> Vec<PresenterCall> {
            std::mem::take(&mut self.calls.lock().unwrap())
        }
    }

    impl DialoguePresenter for RecordingPresenter {
        fn show_line(&self, line: &DialogueLine, answers: &[Answer]) {
            self.calls.lock().unwrap().push(PresenterCall::Show {
                node_id: line.node_id.clone(),
                speaker: line.speaker.clone(),
                answers: answers.iter().map(|a| a.text.clone()).collect(),
            });
        }
        fn hide(&self) {
            self.calls.lock().unwrap().push(PresenterCall::Hide);
        }
    }

    fn graph_from(json: &str) -> Arc<Graph> {
        Arc::new(Graph::from_json(json).unwrap())
    }

    fn engine_at(data_dir: &Path) -> (DialogueEngine, Arc<RecordingPresenter>) {
        let graphs = Arc::new(GraphRegistry::new(data_dir));
        let player = Arc::new(PlayerBridge::in_memory());
        let presenter = Arc::new(RecordingPresenter::default());
        let engine = DialogueEngine::new(graphs, player, presenter.clone())
            .with_locale(Some("en-US".to_string()), vec!["en-US".to_string()]);
        (engine, presenter)
    }

    fn test_engine() -> (DialogueEngine, Arc<RecordingPresenter>) {
        engine_at(Path::new("no-data-dir"))
    }

    const TALK_END: &str = r#"{
        "start": "n1",
        "nodes": [
            {"id": "n1", "type": "talk", "text": "Hi",
             "outs": [{"to": "n2", "text": "Bye", "when": []}]},
            {"id": "n2", "type": "end"}
        ]
    }"#;

    #[tokio::test]
    async fn test_talk_to_end_scenario() {
        let (mut engine, presenter) = test_engine();
        let mut events = engine.subscribe();

        engine.start_with("npc", graph_from(TALK_END), None).await;
        assert!(engine.is_active());
        assert_eq!(engine.current_node_id(), Some("n1"));

        assert!(matches!(events.try_recv(), Ok(DialogueEvent::Started { .. })));
        match events.try_recv() {
            Ok(DialogueEvent::Node { line, answers, .. }) => {
                assert_eq!(line.node_id, "n1");
                assert_eq!(line.text, "Hi");
                assert_eq!(answers, vec![Answer { index: 0, text: "Bye".to_string() }]);
            }
            other => panic!("expected Node event, got {:?}", other),
        }

        engine.choose(0).await;
        assert!(!engine.is_active());
        assert!(matches!(events.try_recv(), Ok(DialogueEvent::Stopped { .. })));

        // Progress was recorded for the talk node but never for the end node
        let progress = engine.player().npc_progress("npc").await.unwrap();
        assert_eq!(progress.node_id.as_deref(), Some("n1"));

        let calls = presenter.take();
        assert_eq!(
            calls,
            vec![
                PresenterCall::Show {
                    node_id: "n1".to_string(),
                    speaker: "npc".to_string(),
                    answers: vec!["Bye".to_string()],
                },
                PresenterCall::Hide,
            ]
        );
    }

    #[tokio::test]
    async fn test_choose_out_of_range_is_noop() {
        let (mut engine, _presenter) = test_engine();
        engine.start_with("npc", graph_from(TALK_END), None).await;

        engine.choose(5).await;
        assert!(engine.is_active());
        assert_eq!(engine.current_node_id(), Some("n1"));
    }

    #[tokio::test]
    async fn test_choose_while_idle_is_noop() {
        let (mut engine, presenter) = test_engine();
        engine.choose(0).await;
        assert!(!engine.is_active());
        assert!(presenter.take().is_empty());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (mut engine, presenter) = test_engine();
        engine.start_with("npc", graph_from(TALK_END), None).await;

        engine.stop();
        engine.stop();

        let hides = presenter
            .take()
            .into_iter()
            .filter(|c| *c == PresenterCall::Hide)
            .count();
        assert_eq!(hides, 1);
    }

    #[tokio::test]
    async fn test_missing_start_node_stops_session() {
        let (mut engine, presenter) = test_engine();
        engine
            .start_with("npc", graph_from(TALK_END), Some("nope"))
            .await;
        assert!(!engine.is_active());
        assert_eq!(presenter.take(), vec![PresenterCall::Hide]);
    }

    #[tokio::test]
    async fn test_answers_filter_by_condition_and_renumber() {
        let graph = graph_from(
            r#"{
                "start": "n1",
                "nodes": [
                    {"id": "n1", "type": "talk", "text": "Hm",
                     "outs": [
                        {"to": "n2", "text": "Locked", "when": [{"name": "flag", "args": ["gate"]}]},
                        {"to": "n2", "text": "Open", "when": []}
                     ]},
                    {"id": "n2", "type": "end", "onExit": [{"name": "setFlag", "args": ["done"]}]}
                ]
            }"#,
        );
        let (mut engine, presenter) = test_engine();
        engine.start_with("npc", graph, None).await;

        match presenter.take().first() {
            Some(PresenterCall::Show { answers, .. }) => {
                assert_eq!(answers, &vec!["Open".to_string()]);
            }
            other => panic!("expected Show, got {:?}", other),
        }

        // Index 0 addresses the filtered list, i.e. the "Open" edge
        engine.choose(0).await;
        assert!(!engine.is_active());
        assert!(engine.player().flag("done").await);
    }

    #[tokio::test]
    async fn test_condition_fold_or_carry() {
        let graph = graph_from(
            r#"{
                "start": "n1",
                "nodes": [
                    {"id": "n1", "type": "talk", "text": "?",
                     "outs": [{"text": "Either",
                               "when": [{"name": "flag", "args": ["a"]},
                                        {"name": "flag", "args": ["b"], "op": "or"}]}]}
                ]
            }"#,
        );

        // flag(a)=false OR flag(b)=true passes
        let (mut engine, presenter) = test_engine();
        engine.player().set_flag("b", true).await;
        engine.start_with("npc", graph.clone(), None).await;
        match presenter.take().first() {
            Some(PresenterCall::Show { answers, .. }) => {
                assert_eq!(answers, &vec!["Either".to_string()]);
            }
            other => panic!("expected Show, got {:?}", other),
        }

        // Both false fails
        let (mut engine, presenter) = test_engine();
        engine.start_with("npc", graph, None).await;
        match presenter.take().first() {
            Some(PresenterCall::Show { answers, .. }) => assert!(answers.is_empty()),
            other => panic!("expected Show, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_carried_op_applies_to_later_entries() {
        // [flag(a), flag(b) op=or, flag(c)] folds as ((a OR b) OR c)
        let graph = graph_from(
            r#"{
                "start": "n1",
                "nodes": [
                    {"id": "n1", "type": "talk",
                     "outs": [{"text": "Any",
                               "when": [{"name": "flag", "args": ["a"]},
                                        {"name": "flag", "args": ["b"], "op": "or"},
                                        {"name": "flag", "args": ["c"]}]}]}
                ]
            }"#,
        );
        let (mut engine, presenter) = test_engine();
        engine.player().set_flag("c", true).await;
        engine.start_with("npc", graph, None).await;
        match presenter.take().first() {
            Some(PresenterCall::Show { answers, .. }) => {
                assert_eq!(answers, &vec!["Any".to_string()]);
            }
            other => panic!("expected Show, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_action_in_on_enter_still_presents() {
        let graph = graph_from(
            r#"{
                "start": "n1",
                "nodes": [
                    {"id": "n1", "type": "talk", "text": "Hi",
                     "onEnter": [{"name": "summonStorm", "args": []}],
                     "outs": []}
                ]
            }"#,
        );
        let (mut engine, presenter) = test_engine();
        engine.start_with("npc", graph, None).await;
        assert!(engine.is_active());
        assert!(matches!(
            presenter.take().first(),
            Some(PresenterCall::Show { .. })
        ));
    }

    #[tokio::test]
    async fn test_auto_node_follows_first_passing_edge() {
        let graph = graph_from(
            r#"{
                "start": "gate",
                "nodes": [
                    {"id": "gate", "type": "auto",
                     "outs": [
                        {"to": "locked", "when": [{"name": "flag", "args": ["gate_open"]}]},
                        {"to": "closed", "when": []}
                     ]},
                    {"id": "locked", "type": "talk", "text": "A"},
                    {"id": "closed", "type": "talk", "text": "B"}
                ]
            }"#,
        );
        let (mut engine, _presenter) = test_engine();
        engine.start_with("npc", graph.clone(), None).await;
        assert_eq!(engine.current_node_id(), Some("closed"));

        let (mut engine, _presenter) = test_engine();
        engine.player().set_flag("gate_open", true).await;
        engine.start_with("npc", graph, None).await;
        assert_eq!(engine.current_node_id(), Some("locked"));
    }

    #[tokio::test]
    async fn test_auto_node_with_no_passing_edge_stops() {
        let graph = graph_from(
            r#"{
                "start": "gate",
                "nodes": [
                    {"id": "gate", "type": "auto",
                     "outs": [{"to": "gate", "when": [{"name": "flag", "args": ["never"]}]}]}
                ]
            }"#,
        );
        let (mut engine, _presenter) = test_engine();
        engine.start_with("npc", graph, None).await;
        assert!(!engine.is_active());
    }

    #[tokio::test]
    async fn test_cyclic_auto_chain_is_capped() {
        let graph = graph_from(
            r#"{
                "start": "a",
                "nodes": [
                    {"id": "a", "type": "auto", "outs": [{"to": "b", "when": []}]},
                    {"id": "b", "type": "auto", "outs": [{"to": "a", "when": []}]}
                ]
            }"#,
        );
        let (mut engine, _presenter) = test_engine();
        engine.start_with("npc", graph, None).await;
        assert!(!engine.is_active());
    }

    #[tokio::test]
    async fn test_edge_actions_run_and_terminal_edge_stops() {
        let graph = graph_from(
            r#"{
                "start": "n1",
                "nodes": [
                    {"id": "n1", "type": "talk", "text": "Hi",
                     "onExit": [{"name": "setFlag", "args": ["left"]}],
                     "outs": [{"text": "Take it",
                               "actions": [{"name": "giveItem", "args": ["lantern_oil", 2]}]}]}
                ]
            }"#,
        );
        let (mut engine, _presenter) = test_engine();
        engine.start_with("npc", graph, None).await;
        engine.choose(0).await;

        assert!(!engine.is_active());
        assert!(engine.player().flag("left").await);
        assert_eq!(engine.player().item_count("lantern_oil").await, 2);
    }

    #[tokio::test]
    async fn test_end_dialogue_action_stops_but_finishes_its_list() {
        let graph = graph_from(
            r#"{
                "start": "n1",
                "nodes": [
                    {"id": "n1", "type": "talk", "text": "Hi",
                     "outs": [{"to": "n2", "text": "Go",
                               "actions": [{"name": "endDialogue", "args": []},
                                           {"name": "setFlag", "args": ["after"]}]}]},
                    {"id": "n2", "type": "talk", "text": "Never shown"}
                ]
            }"#,
        );
        let (mut engine, _presenter) = test_engine();
        engine.start_with("npc", graph, None).await;
        engine.choose(0).await;

        assert!(!engine.is_active());
        // The rest of the action list still ran, but no transition happened
        assert!(engine.player().flag("after").await);
        let progress = engine.player().npc_progress("npc").await.unwrap();
        assert_eq!(progress.node_id.as_deref(), Some("n1"));
    }

    #[tokio::test]
    async fn test_stop_requested_in_on_enter_skips_presentation() {
        let graph = graph_from(
            r#"{
                "start": "n1",
                "nodes": [
                    {"id": "n1", "type": "talk", "text": "Hi",
                     "onEnter": [{"name": "endDialogue", "args": []}]}
                ]
            }"#,
        );
        let (mut engine, presenter) = test_engine();
        engine.start_with("npc", graph, None).await;
        assert!(!engine.is_active());
        assert_eq!(presenter.take(), vec![PresenterCall::Hide]);
    }

    #[tokio::test]
    async fn test_speaker_display_name_override() {
        let graph = graph_from(
            r#"{
                "start": "n1",
                "nodes": [{"id": "n1", "type": "talk", "speaker": "keeper", "text": "..."}]
            }"#,
        );
        let (mut engine, presenter) = test_engine();
        engine.player().learn_npc_name("keeper", "Maren").await;
        engine.start_with("keeper", graph, None).await;

        match presenter.take().first() {
            Some(PresenterCall::Show { speaker, .. }) => assert_eq!(speaker, "Maren"),
            other => panic!("expected Show, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blackboard_backed_custom_vocabulary() {
        struct Remember;

        #[async_trait]
        impl Action for Remember {
            async fn run(&self, ctx: &mut DialogueContext<'_>, _args: &[Value]) {
                ctx.blackboard.set("asked", json!(true));
            }
        }

        struct Asked;

        #[async_trait]
        impl Condition for Asked {
            async fn evaluate(&self, ctx: &mut DialogueContext<'_>, _args: &[Value]) -> bool {
                ctx.blackboard.get("asked").and_then(Value::as_bool).unwrap_or(false)
            }
        }

        let graph = graph_from(
            r#"{
                "start": "n1",
                "nodes": [
                    {"id": "n1", "type": "talk", "text": "?",
                     "onEnter": [{"name": "remember", "args": []}],
                     "outs": [{"text": "Asked before", "when": [{"name": "asked", "args": []}]}]}
                ]
            }"#,
        );
        let (mut engine, presenter) = test_engine();
        engine.actions_mut().register("remember", Arc::new(Remember));
        engine.conditions_mut().register("asked", Arc::new(Asked));

        engine.start_with("npc", graph, None).await;
        match presenter.take().first() {
            Some(PresenterCall::Show { answers, .. }) => {
                assert_eq!(answers, &vec!["Asked before".to_string()]);
            }
            other => panic!("expected Show, got {:?}", other),
        }

        // Blackboard is session-scoped
        assert_eq!(engine.blackboard().map(|b| b.len()), Some(1));
        engine.stop();
        assert!(engine.blackboard().is_none());
    }

    // ------------------------------------------------------------------
    // Asset-backed sessions (start_for)
    // ------------------------------------------------------------------

    fn write_graph(dir: &Path, graph_key: &str, json: &str) {
        let dialogue_dir = dir.join("dialogue");
        std::fs::create_dir_all(&dialogue_dir).unwrap();
        std::fs::write(dialogue_dir.join(format!("{}.json", graph_key)), json).unwrap();
    }

    const THREE_STEP: &str = r#"{
        "start": "n1",
        "nodes": [
            {"id": "n1", "type": "talk", "text": "One",
             "outs": [{"to": "n2", "text": "Next"}]},
            {"id": "n2", "type": "talk", "text": "Two",
             "outs": [{"to": "n3", "text": "Done"}]},
            {"id": "n3", "type": "end"}
        ]
    }"#;

    #[tokio::test]
    async fn test_start_for_resumes_at_persisted_node() {
        let temp_dir = TempDir::new().unwrap();
        write_graph(temp_dir.path(), "keeper_en-US", THREE_STEP);
        let (mut engine, _presenter) = engine_at(temp_dir.path());

        assert!(engine.start_for("keeper", None).await);
        assert_eq!(engine.current_node_id(), Some("n1"));
        engine.choose(0).await;
        assert_eq!(engine.current_node_id(), Some("n2"));
        engine.stop();

        assert!(engine.start_for("keeper", None).await);
        assert_eq!(engine.current_node_id(), Some("n2"));

        let progress = engine.player().npc_progress("keeper").await.unwrap();
        assert_eq!(progress.graph_key.as_deref(), Some("keeper_en-US"));
    }

    #[tokio::test]
    async fn test_start_for_never_resumes_into_end_node() {
        let temp_dir = TempDir::new().unwrap();
        write_graph(temp_dir.path(), "keeper_en-US", THREE_STEP);
        let (mut engine, _presenter) = engine_at(temp_dir.path());

        // Simulate an externally-edited save pointing at the terminal node
        engine.player().set_npc_node("keeper", "n3").await;

        assert!(engine.start_for("keeper", None).await);
        assert_eq!(engine.current_node_id(), Some("n1"));
    }

    #[tokio::test]
    async fn test_start_for_discards_vanished_persisted_node() {
        let temp_dir = TempDir::new().unwrap();
        write_graph(temp_dir.path(), "keeper_en-US", THREE_STEP);
        let (mut engine, _presenter) = engine_at(temp_dir.path());

        engine.player().set_npc_node("keeper", "removed_node").await;

        assert!(engine.start_for("keeper", None).await);
        assert_eq!(engine.current_node_id(), Some("n1"));
    }

    #[tokio::test]
    async fn test_start_for_walks_locale_fallbacks() {
        let temp_dir = TempDir::new().unwrap();
        write_graph(temp_dir.path(), "keeper_en-US", THREE_STEP);
        let (mut engine, _presenter) = engine_at(temp_dir.path());

        // zh-CN asset is missing; the en-US fallback serves the session
        assert!(engine.start_for("keeper", Some("zh-CN")).await);
        let progress = engine.player().npc_progress("keeper").await.unwrap();
        assert_eq!(progress.graph_key.as_deref(), Some("keeper_en-US"));
    }

    #[tokio::test]
    async fn test_start_for_prefers_requested_locale() {
        let temp_dir = TempDir::new().unwrap();
        write_graph(temp_dir.path(), "keeper_en-US", THREE_STEP);
        write_graph(
            temp_dir.path(),
            "keeper_zh-CN",
            r#"{"start": "z1", "nodes": [{"id": "z1", "type": "talk", "text": "一"}]}"#,
        );
        let (mut engine, _presenter) = engine_at(temp_dir.path());

        assert!(engine.start_for("keeper", Some("zh-CN")).await);
        assert_eq!(engine.current_node_id(), Some("z1"));
    }

    #[tokio::test]
    async fn test_start_for_with_no_assets_never_starts() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("dialogue")).unwrap();
        let (mut engine, presenter) = engine_at(temp_dir.path());
        let mut events = engine.subscribe();

        assert!(!engine.start_for("keeper", None).await);
        assert!(!engine.is_active());
        assert!(events.try_recv().is_err());
        assert!(presenter.take().is_empty());
    }

    #[tokio::test]
    async fn test_start_for_replaces_active_session() {
        let temp_dir = TempDir::new().unwrap();
        write_graph(temp_dir.path(), "keeper_en-US", THREE_STEP);
        write_graph(temp_dir.path(), "ferryman_en-US", TALK_END);
        let (mut engine, _presenter) = engine_at(temp_dir.path());
        let mut events = engine.subscribe();

        assert!(engine.start_for("keeper", None).await);
        assert!(engine.start_for("ferryman", None).await);
        assert_eq!(engine.npc_key(), Some("ferryman"));

        let kinds: Vec<&'static str> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.event_type())
            .collect();
        assert_eq!(kinds, vec!["started", "node", "stopped", "started", "node"]);
    }
}
