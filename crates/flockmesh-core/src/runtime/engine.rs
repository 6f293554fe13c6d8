// crates/flockmesh-core/src/runtime/engine.rs
// ============================================================================
// Module: Run Lifecycle Engine
// Description: Run acceptance, planning, evaluation, approvals, and cancel.
// Purpose: Drive the revision-guarded run state machine over the store seams.
// Dependencies: crate::core, crate::interfaces, crate::policy, crate::runtime
// ============================================================================

//! ## Overview
//! The run engine is the single canonical path for run mutation. Every
//! external mutation (approve, reject, cancel) is compare-and-set on the
//! run's revision at the storage layer; the engine never trusts an in-memory
//! copy. Events and audits are appended in handler order so the ledger's
//! insertion order equals observation order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::ActionIntent;
use crate::core::ActionIntentId;
use crate::core::ActorId;
use crate::core::AgentId;
use crate::core::AgentProfile;
use crate::core::ApprovalProgress;
use crate::core::DecisionId;
use crate::core::DecisionKind;
use crate::core::IntentTarget;
use crate::core::PlaybookCatalog;
use crate::core::PlaybookId;
use crate::core::ProfileName;
use crate::core::RunId;
use crate::core::RunRecord;
use crate::core::RunStatus;
use crate::core::RunTrigger;
use crate::core::StepId;
use crate::core::Timestamp;
use crate::core::WorkspaceId;
use crate::core::audit_event;
use crate::core::event_name;
use crate::core::push_reason;
use crate::core::reason;
use crate::interfaces::LedgerError;
use crate::interfaces::StateStore;
use crate::interfaces::StoreError;
use crate::policy::PolicyContext;
use crate::policy::PolicyLibrary;
use crate::policy::evaluate_intent;
use crate::runtime::idempotency::IdempotencyCache;
use crate::runtime::ids::mint_id;
use crate::runtime::ids::planned_idempotency_key;
use crate::runtime::recorder::Recorder;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Profile names requested for the policy lattice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestedProfiles {
    /// Requested org profile.
    pub org: Option<ProfileName>,
    /// Requested workspace profile.
    pub workspace: Option<ProfileName>,
    /// Requested agent profile.
    pub agent: Option<ProfileName>,
    /// Requested run-override profile.
    pub run_override: Option<ProfileName>,
}

/// Request to create a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRunRequest {
    /// Workspace the run executes in.
    pub workspace_id: WorkspaceId,
    /// Agent executing the run.
    pub agent_id: AgentId,
    /// Playbook to expand.
    pub playbook_id: PlaybookId,
    /// Trigger that started the run.
    pub trigger: RunTrigger,
    /// Requested lattice profiles.
    pub profiles: RequestedProfiles,
}

/// Request to resolve one approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    /// Intent whose escalation is being resolved.
    pub action_intent_id: ActionIntentId,
    /// True to approve, false to reject.
    pub approve: bool,
    /// Actor resolving the approval.
    pub approved_by: ActorId,
    /// Revision the caller observed.
    pub expected_revision: u64,
}

/// Request to cancel a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    /// Actor cancelling the run.
    pub cancelled_by: ActorId,
    /// Revision the caller observed.
    pub expected_revision: u64,
}

/// State reached by an approval resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// Approval recorded; more approvers are still required.
    WaitingMoreApprovals,
    /// Escalation fully approved; the intent executed.
    Approved,
    /// Escalation rejected; the run failed.
    Rejected,
}

/// Outcome of an approval resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalOutcome {
    /// Resolution state.
    pub state: ResolutionState,
    /// Run record after the write.
    pub run: RunRecord,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Run engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Agent does not exist.
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    /// Run does not exist.
    #[error("run not found: {0}")]
    RunNotFound(String),
    /// Intent does not exist on the run.
    #[error("action intent not found: {0}")]
    IntentNotFound(String),
    /// Intent has no open escalation.
    #[error("action intent has no open escalation: {0}")]
    NotEscalated(String),
    /// Agent workspace does not match the run workspace.
    #[error("agent workspace '{agent_workspace}' does not match run workspace '{run_workspace}'")]
    WorkspaceMismatch {
        /// Workspace on the agent profile.
        agent_workspace: String,
        /// Workspace requested for the run.
        run_workspace: String,
    },
    /// Body actor claim does not match the authenticated actor.
    #[error("actor claim does not match the authenticated actor")]
    ActorClaimMismatch,
    /// Run is not waiting for approvals.
    #[error("run is not waiting for approval (status {0:?})")]
    NotWaitingApproval(RunStatus),
    /// Run is in a terminal status.
    #[error("run is terminal (status {0:?})")]
    TerminalRun(RunStatus),
    /// Optimistic concurrency check failed.
    #[error("revision conflict: expected {expected}, current {current}")]
    RevisionConflict {
        /// Revision the caller expected.
        expected: u64,
        /// Revision currently persisted.
        current: u64,
    },
    /// State store fault.
    #[error(transparent)]
    Store(StoreError),
    /// Ledger fault.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::RevisionConflict { expected, current } => Self::RevisionConflict {
                expected,
                current,
            },
            other => Self::Store(other),
        }
    }
}

// ============================================================================
// SECTION: Lattice Fallbacks
// ============================================================================

/// Fallback profile names used when neither the request nor the agent
/// provides a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatticeFallbacks {
    /// Org-layer fallback.
    pub org: ProfileName,
    /// Workspace-layer fallback.
    pub workspace: ProfileName,
    /// Agent-layer fallback.
    pub agent: ProfileName,
}

impl Default for LatticeFallbacks {
    fn default() -> Self {
        Self {
            org: ProfileName::new("org_default_safe"),
            workspace: ProfileName::new("workspace_ops_cn"),
            agent: ProfileName::new("agent_ops_assistant"),
        }
    }
}

// ============================================================================
// SECTION: Run Engine
// ============================================================================

/// Run lifecycle engine over the store, ledger, and policy library seams.
#[derive(Clone)]
pub struct RunEngine {
    /// Authoritative state store.
    store: Arc<dyn StateStore>,
    /// Ledger recorder.
    recorder: Recorder,
    /// Policy profile library.
    library: Arc<PolicyLibrary>,
    /// Playbook template catalog.
    playbooks: Arc<PlaybookCatalog>,
    /// Idempotency cache for intent execution.
    idempotency: IdempotencyCache,
    /// Lattice fallback profiles.
    fallbacks: LatticeFallbacks,
}

impl RunEngine {
    /// Creates a run engine over the given seams.
    #[must_use]
    pub fn new(
        store: Arc<dyn StateStore>,
        recorder: Recorder,
        library: Arc<PolicyLibrary>,
        playbooks: Arc<PlaybookCatalog>,
        fallbacks: LatticeFallbacks,
    ) -> Self {
        let idempotency = IdempotencyCache::new(Arc::clone(&store));
        Self {
            store,
            recorder,
            library,
            playbooks,
            idempotency,
            fallbacks,
        }
    }

    /// Returns the policy library backing this engine.
    #[must_use]
    pub fn library(&self) -> Arc<PolicyLibrary> {
        Arc::clone(&self.library)
    }

    /// Returns the idempotency cache backing this engine.
    #[must_use]
    pub fn idempotency(&self) -> &IdempotencyCache {
        &self.idempotency
    }

    /// Loads a run by id.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RunNotFound`] when absent and store faults
    /// otherwise.
    pub fn get_run(&self, run_id: &RunId) -> Result<RunRecord, EngineError> {
        self.store
            .load_run(run_id)?
            .ok_or_else(|| EngineError::RunNotFound(run_id.as_str().to_string()))
    }

    /// Accepts a run: validates scope, plans intents, evaluates policy,
    /// derives the initial status, and persists at revision 1.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] for unknown agents, scope mismatches, claim
    /// mismatches, and store or ledger faults.
    pub fn create_run(
        &self,
        request: &CreateRunRequest,
        authenticated_actor: &ActorId,
        now: Timestamp,
    ) -> Result<RunRecord, EngineError> {
        let agent = self
            .store
            .load_agent(&request.agent_id)?
            .ok_or_else(|| EngineError::AgentNotFound(request.agent_id.as_str().to_string()))?;
        if agent.workspace_id != request.workspace_id {
            return Err(EngineError::WorkspaceMismatch {
                agent_workspace: agent.workspace_id.as_str().to_string(),
                run_workspace: request.workspace_id.as_str().to_string(),
            });
        }
        if &request.trigger.actor_id != authenticated_actor {
            return Err(EngineError::ActorClaimMismatch);
        }

        let run_id = RunId::new(mint_id("run_"));
        let mut run = RunRecord {
            id: run_id.clone(),
            workspace_id: request.workspace_id.clone(),
            agent_id: request.agent_id.clone(),
            playbook_id: request.playbook_id.clone(),
            trigger: request.trigger.clone(),
            status: RunStatus::Accepted,
            revision: 1,
            action_intents: Vec::new(),
            policy_decisions: Vec::new(),
            approval_state: std::collections::BTreeMap::new(),
            started_at: now,
            ended_at: None,
        };

        self.recorder.event(
            &run_id,
            event_name::RUN_CREATED,
            json!({
                "run_id": run_id.as_str(),
                "workspace_id": run.workspace_id.as_str(),
                "agent_id": run.agent_id.as_str(),
                "playbook_id": run.playbook_id.as_str(),
            }),
            now,
        )?;
        self.recorder.audit(
            &run_id,
            audit_event::RUN_CREATED,
            request.trigger.actor_id.clone(),
            &serde_json::to_value(&run).unwrap_or(Value::Null),
            None,
            Value::Null,
            now,
        )?;

        // Plan: expand the playbook template into concrete intents.
        let template = self.playbooks.template_for(&request.playbook_id);
        for step in &template.steps {
            let step_id = StepId::new(step.step_id.clone());
            let idempotency_key = step
                .side_effect
                .is_mutation()
                .then(|| planned_idempotency_key(&run_id, &step_id));
            let intent = ActionIntent {
                id: ActionIntentId::new(mint_id("act_")),
                run_id: run_id.clone(),
                step_id,
                connector_binding_id: None,
                capability: crate::core::CapabilityName::new(step.capability.clone()),
                side_effect: step.side_effect,
                risk_hint: step.risk_hint.clone(),
                parameters: step.parameters.clone(),
                target: IntentTarget {
                    surface: step.surface.clone(),
                    connector_hints: None,
                },
                idempotency_key,
            };
            self.recorder.audit(
                &run_id,
                audit_event::ACTION_PLANNED,
                request.trigger.actor_id.clone(),
                &serde_json::to_value(&intent).unwrap_or(Value::Null),
                None,
                Value::Null,
                now,
            )?;
            run.action_intents.push(intent);
        }

        // Evaluate every intent against the resolved lattice.
        let context = self.resolve_policy_context(&agent, &request.profiles);
        for intent in &run.action_intents {
            let decision = evaluate_intent(
                DecisionId::new(mint_id("pol_")),
                intent,
                &context,
                self.library.as_ref(),
                now,
            );
            self.recorder.audit(
                &run_id,
                audit_event::POLICY_EVALUATED,
                request.trigger.actor_id.clone(),
                &serde_json::to_value(&decision).unwrap_or(Value::Null),
                Some(decision.id.clone()),
                Value::Null,
                now,
            )?;
            run.policy_decisions.push(decision);
        }

        self.derive_initial_status(&mut run, &request.trigger.actor_id, now)?;

        let revision = self.store.save_run(&run, None)?;
        run.revision = revision;
        Ok(run)
    }

    /// Derives the post-evaluation status and emits the matching ledger
    /// entries.
    fn derive_initial_status(
        &self,
        run: &mut RunRecord,
        actor: &ActorId,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        let denied: Vec<DecisionId> = run
            .policy_decisions
            .iter()
            .filter(|decision| decision.decision == DecisionKind::Deny)
            .map(|decision| decision.id.clone())
            .collect();
        if !denied.is_empty() {
            for decision in &run.policy_decisions {
                if decision.decision == DecisionKind::Deny {
                    self.recorder.audit(
                        &run.id,
                        audit_event::ACTION_DENIED,
                        actor.clone(),
                        &json!({
                            "action_intent_id": decision.action_intent_id.as_str(),
                            "reason_codes": decision.reason_codes,
                        }),
                        Some(decision.id.clone()),
                        Value::Null,
                        now,
                    )?;
                }
            }
            run.status = RunStatus::Failed;
            run.ended_at = Some(now);
            self.recorder.event(
                &run.id,
                event_name::RUN_FAILED,
                json!({"run_id": run.id.as_str(), "denied_decisions": denied.len()}),
                now,
            )?;
            self.recorder.audit(
                &run.id,
                audit_event::RUN_FAILED,
                actor.clone(),
                &json!({"run_id": run.id.as_str()}),
                None,
                Value::Null,
                now,
            )?;
            return Ok(());
        }

        let escalations: Vec<&crate::core::PolicyDecisionRecord> = run
            .policy_decisions
            .iter()
            .filter(|decision| decision.is_escalate())
            .collect();
        if !escalations.is_empty() {
            for decision in &escalations {
                run.approval_state.insert(
                    decision.action_intent_id.clone(),
                    ApprovalProgress {
                        decision_id: decision.id.clone(),
                        required_approvals: decision.required_approvals,
                        approved_by: Vec::new(),
                    },
                );
                self.recorder.audit(
                    &run.id,
                    audit_event::APPROVAL_REQUESTED,
                    actor.clone(),
                    &json!({
                        "action_intent_id": decision.action_intent_id.as_str(),
                        "required_approvals": decision.required_approvals,
                    }),
                    Some(decision.id.clone()),
                    Value::Null,
                    now,
                )?;
            }
            run.status = RunStatus::WaitingApproval;
            return Ok(());
        }

        // All allow: execute and complete.
        run.status = RunStatus::Running;
        let allowed = run.allowed_intent_ids();
        for intent_id in &allowed {
            self.execute_intent(run, intent_id, actor, now)?;
        }
        run.status = RunStatus::Completed;
        run.ended_at = Some(now);
        self.recorder.event(
            &run.id,
            event_name::RUN_COMPLETED,
            json!({"run_id": run.id.as_str(), "executed": allowed.len()}),
            now,
        )?;
        self.recorder.audit(
            &run.id,
            audit_event::RUN_COMPLETED,
            actor.clone(),
            &json!({"run_id": run.id.as_str()}),
            None,
            Value::Null,
            now,
        )?;
        Ok(())
    }

    /// Executes one allowed intent through the idempotency cache and emits
    /// execution entries.
    fn execute_intent(
        &self,
        run: &RunRecord,
        intent_id: &ActionIntentId,
        actor: &ActorId,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        let intent = run
            .intent(intent_id)
            .ok_or_else(|| EngineError::IntentNotFound(intent_id.as_str().to_string()))?;
        let decision_ref = run.latest_decision(intent_id).map(|decision| decision.id.clone());
        let produce = || {
            json!({
                "action_intent_id": intent.id.as_str(),
                "capability": intent.capability.as_str(),
                "step_id": intent.step_id.as_str(),
                "status": "ok",
                "executed_at": now.to_rfc3339(),
            })
        };
        let (payload, deduped) = match &intent.idempotency_key {
            Some(key) => {
                let outcome = self.idempotency.execute(key, &run.id, now, produce)?;
                (outcome.payload, outcome.deduped)
            }
            None => (produce(), false),
        };
        let name = if deduped {
            event_name::ACTION_EXECUTED_DEDUPED
        } else {
            event_name::ACTION_EXECUTED
        };
        self.recorder.event(
            &run.id,
            name,
            json!({
                "action_intent_id": intent.id.as_str(),
                "payload": payload,
            }),
            now,
        )?;
        self.recorder.audit(
            &run.id,
            audit_event::ACTION_EXECUTED,
            actor.clone(),
            &payload,
            decision_ref,
            json!({"deduped": deduped}),
            now,
        )?;
        Ok(())
    }

    /// Resolves one approval: approve toward allow or reject toward failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RevisionConflict`] when the expected revision is
    /// stale, plus the scope and state errors described on [`EngineError`].
    pub fn resolve_approval(
        &self,
        run_id: &RunId,
        request: &ApprovalRequest,
        authenticated_actor: &ActorId,
        now: Timestamp,
    ) -> Result<ApprovalOutcome, EngineError> {
        let mut run = self.get_run(run_id)?;
        if run.status != RunStatus::WaitingApproval {
            return Err(EngineError::NotWaitingApproval(run.status));
        }
        if &request.approved_by != authenticated_actor {
            return Err(EngineError::ActorClaimMismatch);
        }
        if request.expected_revision != run.revision {
            return Err(EngineError::RevisionConflict {
                expected: request.expected_revision,
                current: run.revision,
            });
        }
        let progress = run
            .approval_state
            .get(&request.action_intent_id)
            .cloned()
            .ok_or_else(|| {
                EngineError::NotEscalated(request.action_intent_id.as_str().to_string())
            })?;

        if request.approve {
            self.apply_approval(&mut run, request, &progress, now)
        } else {
            self.apply_rejection(&mut run, request, &progress, now)
        }
    }

    /// Applies an approval vote, executing the intent once satisfied.
    fn apply_approval(
        &self,
        run: &mut RunRecord,
        request: &ApprovalRequest,
        progress: &ApprovalProgress,
        now: Timestamp,
    ) -> Result<ApprovalOutcome, EngineError> {
        let mut progress = progress.clone();
        if !progress.approved_by.contains(&request.approved_by) {
            progress.approved_by.push(request.approved_by.clone());
        }

        if progress.remaining() > 0 {
            run.approval_state.insert(request.action_intent_id.clone(), progress.clone());
            let revision = self.store.save_run(run, Some(request.expected_revision))?;
            run.revision = revision;
            self.recorder.audit(
                &run.id,
                audit_event::APPROVAL_RESOLVED,
                request.approved_by.clone(),
                &json!({
                    "action_intent_id": request.action_intent_id.as_str(),
                    "state": "waiting_more_approvals",
                    "approvals_remaining": progress.remaining(),
                }),
                Some(progress.decision_id.clone()),
                Value::Null,
                now,
            )?;
            return Ok(ApprovalOutcome {
                state: ResolutionState::WaitingMoreApprovals,
                run: run.clone(),
            });
        }

        // Fully satisfied: flip the decision to allow and execute.
        if let Some(decision) = run
            .policy_decisions
            .iter_mut()
            .find(|decision| decision.id == progress.decision_id)
        {
            decision.decision = DecisionKind::Allow;
            push_reason(&mut decision.reason_codes, reason::APPROVAL_RESOLVED_ALLOW);
        }
        run.approval_state.remove(&request.action_intent_id);
        let run_complete = !run.has_open_escalations();
        if run_complete {
            run.status = RunStatus::Completed;
            run.ended_at = Some(now);
        }
        let revision = self.store.save_run(run, Some(request.expected_revision))?;
        run.revision = revision;

        self.recorder.audit(
            &run.id,
            audit_event::APPROVAL_RESOLVED,
            request.approved_by.clone(),
            &json!({
                "action_intent_id": request.action_intent_id.as_str(),
                "state": "approved",
            }),
            Some(progress.decision_id.clone()),
            Value::Null,
            now,
        )?;
        self.execute_intent(run, &request.action_intent_id, &request.approved_by, now)?;
        if run_complete {
            self.recorder.event(
                &run.id,
                event_name::RUN_COMPLETED,
                json!({"run_id": run.id.as_str()}),
                now,
            )?;
            self.recorder.audit(
                &run.id,
                audit_event::RUN_COMPLETED,
                request.approved_by.clone(),
                &json!({"run_id": run.id.as_str()}),
                None,
                Value::Null,
                now,
            )?;
        }
        Ok(ApprovalOutcome {
            state: ResolutionState::Approved,
            run: run.clone(),
        })
    }

    /// Applies a rejection: the decision becomes a deny and the run fails
    /// immediately, even when other escalations are still pending.
    fn apply_rejection(
        &self,
        run: &mut RunRecord,
        request: &ApprovalRequest,
        progress: &ApprovalProgress,
        now: Timestamp,
    ) -> Result<ApprovalOutcome, EngineError> {
        if let Some(decision) = run
            .policy_decisions
            .iter_mut()
            .find(|decision| decision.id == progress.decision_id)
        {
            decision.decision = DecisionKind::Deny;
            push_reason(&mut decision.reason_codes, reason::APPROVAL_RESOLVED_DENY);
        }
        run.status = RunStatus::Failed;
        run.ended_at = Some(now);
        run.approval_state.clear();
        let revision = self.store.save_run(run, Some(request.expected_revision))?;
        run.revision = revision;

        self.recorder.audit(
            &run.id,
            audit_event::APPROVAL_RESOLVED,
            request.approved_by.clone(),
            &json!({
                "action_intent_id": request.action_intent_id.as_str(),
                "state": "rejected",
            }),
            Some(progress.decision_id.clone()),
            Value::Null,
            now,
        )?;
        self.recorder.audit(
            &run.id,
            audit_event::ACTION_DENIED,
            request.approved_by.clone(),
            &json!({"action_intent_id": request.action_intent_id.as_str()}),
            Some(progress.decision_id.clone()),
            Value::Null,
            now,
        )?;
        self.recorder.event(
            &run.id,
            event_name::RUN_FAILED,
            json!({"run_id": run.id.as_str(), "rejected_by": request.approved_by.as_str()}),
            now,
        )?;
        self.recorder.audit(
            &run.id,
            audit_event::RUN_FAILED,
            request.approved_by.clone(),
            &json!({"run_id": run.id.as_str()}),
            None,
            Value::Null,
            now,
        )?;
        Ok(ApprovalOutcome {
            state: ResolutionState::Rejected,
            run: run.clone(),
        })
    }

    /// Cancels a non-terminal run.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::TerminalRun`] for terminal runs,
    /// [`EngineError::RevisionConflict`] for stale revisions, plus store and
    /// ledger faults.
    pub fn cancel_run(
        &self,
        run_id: &RunId,
        request: &CancelRequest,
        authenticated_actor: &ActorId,
        now: Timestamp,
    ) -> Result<RunRecord, EngineError> {
        let mut run = self.get_run(run_id)?;
        if run.status.is_terminal() {
            return Err(EngineError::TerminalRun(run.status));
        }
        if &request.cancelled_by != authenticated_actor {
            return Err(EngineError::ActorClaimMismatch);
        }
        if request.expected_revision != run.revision {
            return Err(EngineError::RevisionConflict {
                expected: request.expected_revision,
                current: run.revision,
            });
        }
        run.status = RunStatus::Cancelled;
        run.ended_at = Some(now);
        run.approval_state.clear();
        let revision = self.store.save_run(&run, Some(request.expected_revision))?;
        run.revision = revision;

        self.recorder.event(
            &run.id,
            event_name::RUN_CANCELLED,
            json!({"run_id": run.id.as_str(), "cancelled_by": request.cancelled_by.as_str()}),
            now,
        )?;
        self.recorder.audit(
            &run.id,
            audit_event::RUN_CANCELLED,
            request.cancelled_by.clone(),
            &json!({"run_id": run.id.as_str()}),
            None,
            Value::Null,
            now,
        )?;
        Ok(run)
    }

    /// Resolves the policy lattice for a run request.
    ///
    /// Each of org/workspace/agent takes the first of the requested name, the
    /// agent's default profile, and the configured fallback that exists in
    /// the library; the run override is taken only when it exists.
    #[must_use]
    pub fn resolve_policy_context(
        &self,
        agent: &AgentProfile,
        requested: &RequestedProfiles,
    ) -> PolicyContext {
        let agent_default = agent.default_policy_profile.clone();
        let pick = |requested: &Option<ProfileName>, fallback: &ProfileName| -> ProfileName {
            let candidates = [
                requested.clone(),
                Some(agent_default.clone()),
                Some(fallback.clone()),
            ];
            candidates
                .iter()
                .flatten()
                .find(|name| self.library.contains(name))
                .cloned()
                .unwrap_or_else(|| fallback.clone())
        };
        let run_override = requested
            .run_override
            .clone()
            .filter(|name| self.library.contains(name));
        PolicyContext {
            org: pick(&requested.org, &self.fallbacks.org),
            workspace: pick(&requested.workspace, &self.fallbacks.workspace),
            agent: pick(&requested.agent, &self.fallbacks.agent),
            run_override,
        }
    }
}
