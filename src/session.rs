//! A conversation over a file corpus.
//!
//! The session owns the corpus and the transcript. Each submission snapshots
//! the corpus, records the user turn plus a pending agent turn, then resolves
//! that same agent turn in place once the model has answered.

use crate::corpus::Corpus;
use crate::graph::{build_graph, DependencyGraph};
use crate::llm::backend::CompletionBackend;
use crate::llm::client::{Completion, CompletionClient};
use crate::llm::message::{build_parts, HistoryTurn};
use crate::llm::models::ModelProfile;
use crate::llm::parse::parse_response;
use crate::llm::prompts::SYSTEM_INSTRUCTION;
use crate::llm::repair::{RepairBudgets, RepairOrchestrator, RepairPhase, RepairProgress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub speaker: Speaker,
    /// Empty while the turn is pending
    pub visible_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_trace: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_pending: bool,
}

impl ConversationTurn {
    fn new(speaker: Speaker, visible_text: String, is_pending: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            speaker,
            visible_text,
            reasoning_trace: None,
            created_at: Utc::now(),
            is_pending,
        }
    }
}

/// Ordered conversation log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&ConversationTurn> {
        self.turns.iter().find(|t| t.id == id)
    }

    pub fn push_user(&mut self, text: &str) -> Uuid {
        let turn = ConversationTurn::new(Speaker::User, text.to_string(), false);
        let id = turn.id;
        self.turns.push(turn);
        id
    }

    /// Append an empty agent turn awaiting its answer.
    pub fn push_pending(&mut self) -> Uuid {
        let turn = ConversationTurn::new(Speaker::Agent, String::new(), true);
        let id = turn.id;
        self.turns.push(turn);
        id
    }

    /// Add a line of progress narrative to a pending turn's trace.
    /// Ignored once the turn is resolved.
    pub fn append_progress(&mut self, id: Uuid, line: &str) {
        let Some(turn) = self.pending_mut(id) else {
            return;
        };
        match turn.reasoning_trace.as_mut() {
            Some(trace) => {
                trace.push('\n');
                trace.push_str(line);
            }
            None => turn.reasoning_trace = Some(line.to_string()),
        }
    }

    /// Fill in a pending turn with its final content. Returns false when no
    /// pending turn has this id.
    pub fn resolve(&mut self, id: Uuid, visible_text: String, reasoning_trace: Option<String>) -> bool {
        let Some(turn) = self.pending_mut(id) else {
            return false;
        };
        turn.visible_text = visible_text;
        turn.reasoning_trace = reasoning_trace;
        turn.is_pending = false;
        true
    }

    /// Resolved turns replayed as model context.
    pub fn history(&self) -> Vec<HistoryTurn> {
        self.turns
            .iter()
            .filter(|t| !t.is_pending)
            .map(|t| match t.speaker {
                Speaker::User => HistoryTurn::user(t.visible_text.as_str()),
                Speaker::Agent => HistoryTurn::model(t.visible_text.as_str()),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    fn pending_mut(&mut self, id: Uuid) -> Option<&mut ConversationTurn> {
        self.turns.iter_mut().find(|t| t.id == id && t.is_pending)
    }
}

/// How a submission is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Single pass-through completion with conversation history
    Chat { profile: ModelProfile },
    /// Draft, verify and possibly refine
    Debug,
}

/// Narrates repair phases into the pending turn's trace.
struct TranscriptProgress<'a> {
    transcript: &'a mut Transcript,
    turn: Uuid,
}

impl RepairProgress for TranscriptProgress<'_> {
    fn phase_started(&mut self, phase: RepairPhase) {
        self.transcript
            .append_progress(self.turn, &format!("{}...", phase.describe()));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub corpus: Corpus,
    #[serde(default)]
    pub transcript: Transcript,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dependency graph of the current corpus.
    pub fn graph(&self) -> DependencyGraph {
        build_graph(self.corpus.files())
    }

    /// Answer `prompt` and return the resolved agent turn.
    ///
    /// Failures never surface as errors; they become the agent turn's text
    /// with no reasoning trace.
    pub async fn submit<B: CompletionBackend>(
        &mut self,
        client: &CompletionClient<B>,
        prompt: &str,
        mode: Mode,
        budgets: RepairBudgets,
    ) -> ConversationTurn {
        let snapshot = self.corpus.snapshot();
        let history = self.transcript.history();
        self.transcript.push_user(prompt);
        let pending = self.transcript.push_pending();

        let (visible, trace) = match mode {
            Mode::Chat { profile } => {
                let budget = match profile {
                    ModelProfile::Deep => budgets.full,
                    ModelProfile::Fast => 0,
                };
                let parts = build_parts(&snapshot, prompt);
                match client
                    .complete(SYSTEM_INSTRUCTION, &history, parts, profile, budget)
                    .await
                {
                    Completion::Text(raw) => {
                        let parsed = parse_response(&raw);
                        (parsed.visible, parsed.trace)
                    }
                    Completion::Failed(message) => (message, None),
                }
            }
            Mode::Debug => {
                let mut progress = TranscriptProgress {
                    transcript: &mut self.transcript,
                    turn: pending,
                };
                let outcome = RepairOrchestrator::new(client, budgets)
                    .repair(prompt, &snapshot, &mut progress)
                    .await;
                (outcome.visible, outcome.trace)
            }
        };

        self.transcript.resolve(pending, visible.clone(), trace.clone());
        match self.transcript.get(pending) {
            Some(turn) => turn.clone(),
            None => ConversationTurn {
                visible_text: visible,
                reasoning_trace: trace,
                ..ConversationTurn::new(Speaker::Agent, String::new(), false)
            },
        }
    }
}
