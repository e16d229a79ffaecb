//! Draft → verify → refine repair loop.
//!
//! Flow: Deep model drafts → same model simulates the draft as QA → on a
//! failed simulation, one full rewrite. There is exactly one verification;
//! the rewrite is never re-verified.

use super::backend::CompletionBackend;
use super::client::{Completion, CompletionClient};
use super::message::{build_parts, HistoryTurn, MessagePart};
use super::models::ModelProfile;
use super::parse::{parse_response, ParsedResponse};
use super::prompts::{
    refine_prompt, repair_section, verification_section, verify_prompt, STATUS_VERIFIED,
    SYSTEM_INSTRUCTION,
};
use crate::corpus::FileRecord;

/// Default reasoning budget for draft and refine
pub const DEFAULT_THINKING_BUDGET: u32 = 32768;
/// Default reduced budget for the verification pass
pub const DEFAULT_VERIFY_THINKING_BUDGET: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairPhase {
    Draft,
    Verify,
    Refine,
}

impl RepairPhase {
    pub fn describe(&self) -> &'static str {
        match self {
            RepairPhase::Draft => "Drafting a solution",
            RepairPhase::Verify => "Simulating the draft",
            RepairPhase::Refine => "Verification failed, rewriting",
        }
    }
}

/// Terminal state of a repair run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairState {
    /// The draft passed verification
    Verified,
    /// The draft failed verification and was rewritten
    Repaired,
    /// A completion call failed; the visible text is the error message
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub visible: String,
    /// Draft, verification and repair traces rendered as one narrative
    pub trace: Option<String>,
    pub state: RepairState,
}

impl RepairOutcome {
    fn failed(message: String) -> Self {
        Self {
            visible: message,
            trace: None,
            state: RepairState::Failed,
        }
    }
}

/// Observer notified as each phase starts, e.g. to narrate progress while a
/// turn is still pending.
pub trait RepairProgress {
    fn phase_started(&mut self, _phase: RepairPhase) {}
}

impl RepairProgress for () {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairBudgets {
    /// Draft and refine
    pub full: u32,
    pub verify: u32,
}

impl Default for RepairBudgets {
    fn default() -> Self {
        Self {
            full: DEFAULT_THINKING_BUDGET,
            verify: DEFAULT_VERIFY_THINKING_BUDGET,
        }
    }
}

/// Whether a verifier reply counts as a pass.
///
/// A plain substring check: any reply mentioning the marker passes.
pub fn is_verified(verify_text: &str) -> bool {
    verify_text.contains(STATUS_VERIFIED)
}

/// Runs the repair loop on top of a [`CompletionClient`].
///
/// Not re-entrant: callers run one repair at a time per session.
pub struct RepairOrchestrator<'a, B> {
    client: &'a CompletionClient<B>,
    budgets: RepairBudgets,
}

impl<'a, B: CompletionBackend> RepairOrchestrator<'a, B> {
    pub fn new(client: &'a CompletionClient<B>, budgets: RepairBudgets) -> Self {
        Self { client, budgets }
    }

    pub async fn repair<P: RepairProgress>(
        &self,
        request: &str,
        files: &[FileRecord],
        progress: &mut P,
    ) -> RepairOutcome {
        // Phase 1: draft
        progress.phase_started(RepairPhase::Draft);
        tracing::info!(files = files.len(), "repair: drafting");
        let draft = match self
            .call(&[], build_parts(files, request), self.budgets.full)
            .await
        {
            Ok(parsed) => parsed,
            Err(message) => return RepairOutcome::failed(message),
        };

        // Phase 2: verify
        progress.phase_started(RepairPhase::Verify);
        tracing::info!("repair: verifying draft");
        let verify_request = verify_prompt(request, &draft.visible);
        let mut history = vec![
            HistoryTurn::user(request),
            HistoryTurn::model(draft.visible.as_str()),
        ];
        let verify = match self
            .call(
                &history,
                vec![MessagePart::text(verify_request.as_str())],
                self.budgets.verify,
            )
            .await
        {
            Ok(parsed) => parsed,
            Err(message) => return RepairOutcome::failed(message),
        };

        // Phase 3: decide
        if is_verified(&verify.visible) {
            tracing::info!("repair: draft verified");
            let trace = join_sections([
                draft.trace,
                Some(verification_section(verify.trace.as_deref(), true, None)),
            ]);
            return RepairOutcome {
                visible: draft.visible,
                trace,
                state: RepairState::Verified,
            };
        }

        // Phase 4: refine
        progress.phase_started(RepairPhase::Refine);
        tracing::info!("repair: verification failed, refining");
        history.push(HistoryTurn::user(verify_request));
        history.push(HistoryTurn::model(verify.visible.as_str()));
        let fix = match self
            .call(
                &history,
                vec![MessagePart::text(refine_prompt(&verify.visible))],
                self.budgets.full,
            )
            .await
        {
            Ok(parsed) => parsed,
            Err(message) => return RepairOutcome::failed(message),
        };

        let trace = join_sections([
            draft.trace,
            Some(verification_section(
                verify.trace.as_deref(),
                false,
                Some(&verify.visible),
            )),
            Some(repair_section(fix.trace.as_deref())),
        ]);
        RepairOutcome {
            visible: fix.visible,
            trace,
            state: RepairState::Repaired,
        }
    }

    /// One deep-profile completion, parsed. `Err` carries the failure text.
    async fn call(
        &self,
        history: &[HistoryTurn],
        parts: Vec<MessagePart>,
        thinking_budget: u32,
    ) -> Result<ParsedResponse, String> {
        match self
            .client
            .complete(
                SYSTEM_INSTRUCTION,
                history,
                parts,
                ModelProfile::Deep,
                thinking_budget,
            )
            .await
        {
            Completion::Text(raw) => Ok(parse_response(&raw)),
            Completion::Failed(message) => Err(message),
        }
    }
}

fn join_sections<const N: usize>(sections: [Option<String>; N]) -> Option<String> {
    let parts: Vec<String> = sections
        .into_iter()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}
