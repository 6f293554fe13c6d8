// crates/flockmesh-core/src/runtime/guard.rs
// ============================================================================
// Module: Connector Invocation Guard
// Description: Fail-closed pipeline in front of connector adapters.
// Purpose: Validate scope, consult allowlists and policy, rate-limit, and retry.
// Dependencies: crate::core, crate::interfaces, crate::policy, crate::runtime, tokio
// ============================================================================

//! ## Overview
//! Every adapter invoke passes the full guard pipeline: manifest, adapter
//! registration, run scope, binding scope, MCP allowlist, policy evaluation,
//! idempotency, rate limiting, and a bounded retry loop. Refusals synthesize
//! a policy-shaped deny decision carrying `safety.fail_closed` so downstream
//! tooling sees a uniform shape on every path. Simulation runs the scope
//! checks and the adapter's `simulate` with a deadline, writing no state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::ActionIntent;
use crate::core::ActionIntentId;
use crate::core::ActorId;
use crate::core::AgentId;
use crate::core::BindingId;
use crate::core::CapabilityName;
use crate::core::ConnectorId;
use crate::core::ConnectorManifest;
use crate::core::ConnectorProtocol;
use crate::core::IdempotencyKey;
use crate::core::IntentTarget;
use crate::core::PolicyDecisionRecord;
use crate::core::RiskHint;
use crate::core::RunId;
use crate::core::RunRecord;
use crate::core::SideEffect;
use crate::core::StepId;
use crate::core::Timestamp;
use crate::core::WorkspaceId;
use crate::core::audit_event;
use crate::core::event_name;
use crate::core::reason;
use crate::interfaces::AdapterError;
use crate::interfaces::AdapterRequest;
use crate::interfaces::ConnectorAdapter;
use crate::interfaces::LedgerError;
use crate::interfaces::StateStore;
use crate::interfaces::StoreError;
use crate::policy::PolicyContext;
use crate::policy::PolicyLibrary;
use crate::policy::evaluate_intent;
use crate::policy::fail_closed;
use crate::runtime::allowlist::AllowlistVerdict;
use crate::runtime::allowlist::McpAllowlist;
use crate::runtime::allowlist::McpInvokeScope;
use crate::runtime::engine::LatticeFallbacks;
use crate::runtime::idempotency::IdempotencyCache;
use crate::runtime::ids::mint_id;
use crate::runtime::rate_limit::RateLimitDecision;
use crate::runtime::rate_limit::SlidingWindowLimiter;
use crate::runtime::recorder::Recorder;
use crate::runtime::retry::AdapterFault;
use crate::runtime::retry::RetryPolicy;
use crate::runtime::retry::should_retry;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Step identifier used for guard-transient intents.
const INVOKE_STEP_ID: &str = "connector_invoke";

/// Request to invoke or simulate a connector capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeRequest {
    /// Connector the request targets.
    pub connector_id: ConnectorId,
    /// Run the invoke belongs to.
    pub run_id: RunId,
    /// Workspace claimed by the caller; must match the run.
    pub workspace_id: WorkspaceId,
    /// Agent claimed by the caller; must match the run.
    pub agent_id: AgentId,
    /// Binding exercised by the invoke.
    pub binding_id: BindingId,
    /// Capability being exercised.
    pub capability: CapabilityName,
    /// Side-effect class.
    pub side_effect: SideEffect,
    /// Declared risk hint.
    pub risk_hint: RiskHint,
    /// Capability parameters; MCP invokes carry `tool_name` here.
    pub parameters: Value,
    /// Target surface and hints.
    pub target: IntentTarget,
    /// Idempotency key for mutations.
    pub idempotency_key: Option<IdempotencyKey>,
    /// Actor initiating the invoke.
    pub initiated_by: ActorId,
}

/// Successful invoke result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeSuccess {
    /// Adapter (or cached) payload.
    pub payload: Value,
    /// True when served from the idempotency cache.
    pub deduped: bool,
    /// Allow decision produced by the policy engine.
    pub decision: PolicyDecisionRecord,
}

/// Successful simulation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulateSuccess {
    /// Adapter simulation payload.
    pub payload: Value,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Guard refusals and faults.
#[derive(Debug, Error)]
pub enum GuardError {
    /// No manifest for the connector.
    #[error("no manifest for connector: {0}")]
    ManifestNotFound(String),
    /// No adapter registered for the connector.
    #[error("no adapter registered for connector: {0}")]
    AdapterNotRegistered(String),
    /// Run does not exist.
    #[error("run not found: {0}")]
    RunNotFound(String),
    /// Binding does not exist.
    #[error("binding not found: {0}")]
    BindingNotFound(String),
    /// Invoke scope does not match the run.
    #[error("invoke scope mismatch: {0}")]
    RunScopeMismatch(String),
    /// Binding scope does not match the invoke.
    #[error("binding scope mismatch: {0}")]
    BindingScopeMismatch(String),
    /// Binding refuses the capability.
    #[error("binding refused: {0}")]
    BindingRefused(String),
    /// MCP allowlist blocked the invoke.
    #[error("mcp allowlist blocked the invoke")]
    AllowlistBlocked {
        /// Synthesized fail-closed deny decision.
        decision: Box<PolicyDecisionRecord>,
    },
    /// Policy engine denied the invoke.
    #[error("policy denied the invoke")]
    PolicyDenied {
        /// Deny decision from the policy engine.
        decision: Box<PolicyDecisionRecord>,
    },
    /// Policy engine escalated the invoke; invokes have no approval path.
    #[error("policy escalated the invoke")]
    PolicyEscalated {
        /// Escalate decision from the policy engine.
        decision: Box<PolicyDecisionRecord>,
    },
    /// Rate limiter denied the invoke.
    #[error("invoke rate limited; retry after {retry_after_ms} ms")]
    RateLimited {
        /// Milliseconds until capacity frees up.
        retry_after_ms: u64,
        /// Synthesized fail-closed deny decision.
        decision: Box<PolicyDecisionRecord>,
    },
    /// Adapter failed after retry exhaustion.
    #[error("adapter failed after retries")]
    AdapterFailed {
        /// Classified fault.
        fault: AdapterFault,
        /// Synthesized fail-closed deny decision.
        decision: Box<PolicyDecisionRecord>,
    },
    /// Adapter refused a simulation for capability reasons.
    #[error("adapter capability error: {0}")]
    SimulateCapability(String),
    /// Adapter simulation timed out.
    #[error("adapter simulation timed out")]
    SimulateTimeout,
    /// Adapter simulation failed at runtime.
    #[error("adapter simulation failed: {0}")]
    SimulateFailed(String),
    /// State store fault.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Ledger fault.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Connector invocation guard.
pub struct ConnectorGuard {
    /// Authoritative state store.
    store: Arc<dyn StateStore>,
    /// Ledger recorder.
    recorder: Recorder,
    /// Policy profile library.
    library: Arc<PolicyLibrary>,
    /// Connector manifest catalog.
    manifests: Arc<BTreeMap<String, ConnectorManifest>>,
    /// Registered adapter implementations by connector id.
    adapters: Arc<BTreeMap<String, Arc<dyn ConnectorAdapter>>>,
    /// MCP allowlist.
    allowlist: McpAllowlist,
    /// Rate limiter.
    limiter: Arc<SlidingWindowLimiter>,
    /// Idempotency cache shared with the run engine.
    idempotency: IdempotencyCache,
    /// Retry policy for adapter faults.
    retry: RetryPolicy,
    /// Adapter deadline in milliseconds.
    adapter_timeout_ms: u64,
    /// Lattice fallback profiles.
    fallbacks: LatticeFallbacks,
}

impl ConnectorGuard {
    /// Creates a guard over the given seams.
    #[allow(clippy::too_many_arguments, reason = "The guard fronts this many seams.")]
    #[must_use]
    pub fn new(
        store: Arc<dyn StateStore>,
        recorder: Recorder,
        library: Arc<PolicyLibrary>,
        manifests: Arc<BTreeMap<String, ConnectorManifest>>,
        adapters: Arc<BTreeMap<String, Arc<dyn ConnectorAdapter>>>,
        allowlist: McpAllowlist,
        limiter: Arc<SlidingWindowLimiter>,
        idempotency: IdempotencyCache,
        retry: RetryPolicy,
        adapter_timeout_ms: u64,
        fallbacks: LatticeFallbacks,
    ) -> Self {
        Self {
            store,
            recorder,
            library,
            manifests,
            adapters,
            allowlist,
            limiter,
            idempotency,
            retry: retry.clamped(),
            adapter_timeout_ms,
            fallbacks,
        }
    }

    /// Runs the invoke pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError`] for every refusal; refusals past the scope
    /// checks carry a synthesized fail-closed deny decision.
    pub async fn invoke(
        &self,
        request: &InvokeRequest,
        now: Timestamp,
    ) -> Result<InvokeSuccess, GuardError> {
        let (manifest, adapter, run) = self.admit(request)?;
        let context = self.policy_context_for(&run)?;
        let intent = transient_intent(request);

        // MCP gateway invokes pass the tool allowlist before policy.
        if manifest.protocol == ConnectorProtocol::Mcp {
            let tool_name = request.parameters.get("tool_name").and_then(Value::as_str);
            let verdict = self.allowlist.evaluate(&McpInvokeScope {
                workspace_id: &request.workspace_id,
                agent_id: &request.agent_id,
                tool_name,
                side_effect: request.side_effect,
                risk_tier: request.risk_hint.tier(),
            });
            if let AllowlistVerdict::Blocked { reason: code } = verdict {
                let decision = self.synthesize_deny(&intent, &context, code, now);
                self.audit_blocked(request, &decision, code, now)?;
                return Err(GuardError::AllowlistBlocked {
                    decision: Box::new(decision),
                });
            }
        }

        // Policy evaluation on a transient intent.
        let decision = evaluate_intent(
            crate::core::DecisionId::new(mint_id("pol_")),
            &intent,
            &context,
            self.library.as_ref(),
            now,
        );
        self.recorder.audit(
            &request.run_id,
            audit_event::POLICY_EVALUATED,
            request.initiated_by.clone(),
            &serde_json::to_value(&decision).unwrap_or(Value::Null),
            Some(decision.id.clone()),
            Value::Null,
            now,
        )?;
        self.recorder.audit(
            &request.run_id,
            audit_event::CONNECTOR_INVOKE_REQUESTED,
            request.initiated_by.clone(),
            &json!({
                "connector_id": request.connector_id.as_str(),
                "capability": request.capability.as_str(),
                "binding_id": request.binding_id.as_str(),
            }),
            Some(decision.id.clone()),
            Value::Null,
            now,
        )?;
        match decision.decision {
            crate::core::DecisionKind::Allow => {}
            crate::core::DecisionKind::Deny => {
                self.audit_blocked(request, &decision, "policy.deny", now)?;
                return Err(GuardError::PolicyDenied {
                    decision: Box::new(decision),
                });
            }
            crate::core::DecisionKind::Escalate => {
                self.audit_blocked(request, &decision, "policy.escalate", now)?;
                return Err(GuardError::PolicyEscalated {
                    decision: Box::new(decision),
                });
            }
        }

        // Idempotency cache: serve previous payloads without touching the
        // adapter or the rate limiter.
        if let Some(key) = &request.idempotency_key {
            if let Some(payload) = self.idempotency.lookup(key)? {
                self.recorder.event(
                    &request.run_id,
                    event_name::ACTION_EXECUTED_DEDUPED,
                    json!({
                        "action_intent_id": intent.id.as_str(),
                        "payload": payload,
                    }),
                    now,
                )?;
                self.recorder.audit(
                    &request.run_id,
                    audit_event::ACTION_EXECUTED,
                    request.initiated_by.clone(),
                    &payload,
                    Some(decision.id.clone()),
                    json!({"deduped": true}),
                    now,
                )?;
                return Ok(InvokeSuccess {
                    payload,
                    deduped: true,
                    decision,
                });
            }
        }

        // Rate limiter.
        if let RateLimitDecision::Limited { retry_after_ms } =
            self.limiter.check(&request.workspace_id, &request.connector_id, now)
        {
            let limited = self.synthesize_deny(
                &intent,
                &context,
                reason::CONNECTOR_RATE_LIMITED,
                now,
            );
            self.recorder.audit(
                &request.run_id,
                audit_event::CONNECTOR_INVOKE_RATE_LIMITED,
                request.initiated_by.clone(),
                &json!({
                    "connector_id": request.connector_id.as_str(),
                    "retry_after_ms": retry_after_ms,
                }),
                Some(limited.id.clone()),
                Value::Null,
                now,
            )?;
            return Err(GuardError::RateLimited {
                retry_after_ms,
                decision: Box::new(limited),
            });
        }

        // Adapter retry loop.
        let adapter_request = adapter_request(request);
        let mut attempt: u32 = 1;
        let fault = loop {
            let call = tokio::time::timeout(
                Duration::from_millis(self.adapter_timeout_ms),
                adapter.invoke(&adapter_request),
            );
            let fault = match call.await {
                Ok(Ok(payload)) => {
                    return self.finish_invoke(request, &intent, decision, payload, now).await;
                }
                Ok(Err(AdapterError::Capability(_) | AdapterError::Runtime(_))) => {
                    AdapterFault::Error
                }
                Err(_) => AdapterFault::Timeout,
            };
            if should_retry(
                &self.retry,
                attempt,
                request.side_effect,
                request.idempotency_key.as_ref(),
            ) {
                let delay_ms = self.retry.delay_ms(attempt);
                self.recorder.audit(
                    &request.run_id,
                    audit_event::CONNECTOR_INVOKE_RETRY,
                    request.initiated_by.clone(),
                    &json!({
                        "connector_id": request.connector_id.as_str(),
                        "attempt": attempt,
                        "next_attempt": attempt + 1,
                        "delay_ms": delay_ms,
                        "decision": "retry",
                    }),
                    None,
                    Value::Null,
                    now,
                )?;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
                continue;
            }
            break fault;
        };

        let denied = self.synthesize_deny(&intent, &context, fault.code(), now);
        let audit_type = match fault {
            AdapterFault::Timeout => audit_event::CONNECTOR_INVOKE_TIMEOUT,
            AdapterFault::Error => audit_event::CONNECTOR_INVOKE_ERROR,
        };
        self.recorder.audit(
            &request.run_id,
            audit_type,
            request.initiated_by.clone(),
            &json!({
                "connector_id": request.connector_id.as_str(),
                "attempts": attempt,
            }),
            Some(denied.id.clone()),
            Value::Null,
            now,
        )?;
        Err(GuardError::AdapterFailed {
            fault,
            decision: Box::new(denied),
        })
    }

    /// Runs the simulate pipeline: scope checks plus a timed `simulate` call,
    /// with no state writes.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError`] for scope refusals, capability errors, and
    /// timeouts.
    pub async fn simulate(
        &self,
        request: &InvokeRequest,
        now: Timestamp,
    ) -> Result<SimulateSuccess, GuardError> {
        let (manifest, adapter, _run) = self.admit(request)?;
        if manifest.protocol == ConnectorProtocol::Mcp {
            let tool_name = request.parameters.get("tool_name").and_then(Value::as_str);
            let verdict = self.allowlist.evaluate(&McpInvokeScope {
                workspace_id: &request.workspace_id,
                agent_id: &request.agent_id,
                tool_name,
                side_effect: request.side_effect,
                risk_tier: request.risk_hint.tier(),
            });
            if let AllowlistVerdict::Blocked { reason: code } = verdict {
                let context = self.policy_context_for_ids(&request.agent_id)?;
                let intent = transient_intent(request);
                let decision = self.synthesize_deny(&intent, &context, code, now);
                return Err(GuardError::AllowlistBlocked {
                    decision: Box::new(decision),
                });
            }
        }
        let adapter_request = adapter_request(request);
        let call = tokio::time::timeout(
            Duration::from_millis(self.adapter_timeout_ms),
            adapter.simulate(&adapter_request),
        );
        match call.await {
            Ok(Ok(payload)) => Ok(SimulateSuccess { payload }),
            Ok(Err(AdapterError::Capability(message))) => {
                Err(GuardError::SimulateCapability(message))
            }
            Ok(Err(AdapterError::Runtime(message))) => Err(GuardError::SimulateFailed(message)),
            Err(_) => Err(GuardError::SimulateTimeout),
        }
    }

    /// Admits a request through manifest, adapter, run, and binding checks.
    fn admit(
        &self,
        request: &InvokeRequest,
    ) -> Result<(&ConnectorManifest, Arc<dyn ConnectorAdapter>, RunRecord), GuardError> {
        let manifest = self
            .manifests
            .get(request.connector_id.as_str())
            .ok_or_else(|| GuardError::ManifestNotFound(request.connector_id.as_str().to_string()))?;
        let adapter = self
            .adapters
            .get(request.connector_id.as_str())
            .cloned()
            .ok_or_else(|| {
                GuardError::AdapterNotRegistered(request.connector_id.as_str().to_string())
            })?;
        let run = self
            .store
            .load_run(&request.run_id)?
            .ok_or_else(|| GuardError::RunNotFound(request.run_id.as_str().to_string()))?;
        if run.workspace_id != request.workspace_id {
            return Err(GuardError::RunScopeMismatch(format!(
                "run workspace '{}' does not match invoke workspace '{}'",
                run.workspace_id.as_str(),
                request.workspace_id.as_str()
            )));
        }
        if run.agent_id != request.agent_id {
            return Err(GuardError::RunScopeMismatch(format!(
                "run agent '{}' does not match invoke agent '{}'",
                run.agent_id.as_str(),
                request.agent_id.as_str()
            )));
        }
        let binding = self
            .store
            .load_binding(&request.binding_id)?
            .ok_or_else(|| GuardError::BindingNotFound(request.binding_id.as_str().to_string()))?;
        if binding.connector_id != request.connector_id {
            return Err(GuardError::BindingScopeMismatch(format!(
                "binding connector '{}' does not match invoke connector '{}'",
                binding.connector_id.as_str(),
                request.connector_id.as_str()
            )));
        }
        if binding.workspace_id != request.workspace_id {
            return Err(GuardError::BindingScopeMismatch(format!(
                "binding workspace '{}' does not match invoke workspace '{}'",
                binding.workspace_id.as_str(),
                request.workspace_id.as_str()
            )));
        }
        if let Some(agent_id) = &binding.agent_id {
            if agent_id != &request.agent_id {
                return Err(GuardError::BindingScopeMismatch(format!(
                    "binding agent '{}' does not match invoke agent '{}'",
                    agent_id.as_str(),
                    request.agent_id.as_str()
                )));
            }
        }
        if !binding.is_active() {
            return Err(GuardError::BindingRefused("binding is not active".to_string()));
        }
        if !binding.grants(&request.capability) {
            return Err(GuardError::BindingRefused(format!(
                "capability '{}' is not in binding scopes",
                request.capability.as_str()
            )));
        }
        if !manifest.capabilities.contains(&request.capability) {
            return Err(GuardError::BindingRefused(format!(
                "capability '{}' is not in manifest capabilities",
                request.capability.as_str()
            )));
        }
        Ok((manifest, adapter, run))
    }

    /// Completes a successful invoke: records idempotency, emits entries.
    async fn finish_invoke(
        &self,
        request: &InvokeRequest,
        intent: &ActionIntent,
        decision: PolicyDecisionRecord,
        payload: Value,
        now: Timestamp,
    ) -> Result<InvokeSuccess, GuardError> {
        if let Some(key) = &request.idempotency_key {
            self.idempotency.record(key, &request.run_id, &payload, now)?;
        }
        self.recorder.event(
            &request.run_id,
            event_name::CONNECTOR_INVOKED,
            json!({
                "action_intent_id": intent.id.as_str(),
                "connector_id": request.connector_id.as_str(),
                "capability": request.capability.as_str(),
                "payload": payload,
            }),
            now,
        )?;
        self.recorder.audit(
            &request.run_id,
            audit_event::CONNECTOR_INVOKE_EXECUTED,
            request.initiated_by.clone(),
            &payload,
            Some(decision.id.clone()),
            json!({"deduped": false}),
            now,
        )?;
        Ok(InvokeSuccess {
            payload,
            deduped: false,
            decision,
        })
    }

    /// Emits the `connector.invoke.blocked` audit entry.
    fn audit_blocked(
        &self,
        request: &InvokeRequest,
        decision: &PolicyDecisionRecord,
        code: &str,
        now: Timestamp,
    ) -> Result<(), GuardError> {
        self.recorder.audit(
            &request.run_id,
            audit_event::CONNECTOR_INVOKE_BLOCKED,
            request.initiated_by.clone(),
            &json!({
                "connector_id": request.connector_id.as_str(),
                "capability": request.capability.as_str(),
                "blocked_by": code,
            }),
            Some(decision.id.clone()),
            Value::Null,
            now,
        )?;
        Ok(())
    }

    /// Synthesizes a fail-closed deny decision for a guard refusal.
    fn synthesize_deny(
        &self,
        intent: &ActionIntent,
        context: &PolicyContext,
        code: &str,
        now: Timestamp,
    ) -> PolicyDecisionRecord {
        fail_closed(
            crate::core::DecisionId::new(mint_id("pol_")),
            intent,
            context,
            code,
            now,
        )
    }

    /// Resolves the policy context from the run's agent profile.
    fn policy_context_for(&self, run: &RunRecord) -> Result<PolicyContext, GuardError> {
        self.policy_context_for_ids(&run.agent_id)
    }

    /// Resolves the policy context from an agent id.
    fn policy_context_for_ids(&self, agent_id: &AgentId) -> Result<PolicyContext, GuardError> {
        let agent_default = self
            .store
            .load_agent(agent_id)?
            .map(|agent| agent.default_policy_profile);
        let pick = |fallback: &crate::core::ProfileName| -> crate::core::ProfileName {
            agent_default
                .iter()
                .chain(std::iter::once(fallback))
                .find(|name| self.library.contains(name))
                .cloned()
                .unwrap_or_else(|| fallback.clone())
        };
        Ok(PolicyContext {
            org: pick(&self.fallbacks.org),
            workspace: pick(&self.fallbacks.workspace),
            agent: pick(&self.fallbacks.agent),
            run_override: None,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the transient intent evaluated for an invoke.
fn transient_intent(request: &InvokeRequest) -> ActionIntent {
    ActionIntent {
        id: ActionIntentId::new(mint_id("act_")),
        run_id: request.run_id.clone(),
        step_id: StepId::new(INVOKE_STEP_ID),
        connector_binding_id: Some(request.binding_id.clone()),
        capability: request.capability.clone(),
        side_effect: request.side_effect,
        risk_hint: request.risk_hint.clone(),
        parameters: request.parameters.clone(),
        target: request.target.clone(),
        idempotency_key: request.idempotency_key.clone(),
    }
}

/// Builds the adapter request for an invoke.
fn adapter_request(request: &InvokeRequest) -> AdapterRequest {
    AdapterRequest {
        connector_id: request.connector_id.clone(),
        capability: request.capability.clone(),
        parameters: request.parameters.clone(),
        target: request.target.clone(),
        workspace_id: request.workspace_id.clone(),
        agent_id: request.agent_id.clone(),
        run_id: request.run_id.clone(),
        idempotency_key: request.idempotency_key.clone(),
    }
}
