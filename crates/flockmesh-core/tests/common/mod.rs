// crates/flockmesh-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Fixtures
// Description: Shared fixtures for control-plane integration tests.
// ============================================================================
//! ## Overview
//! Builds engines, guards, and catalogs over the in-memory backends with the
//! default profile lattice installed.

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test fixtures are shared across suites; not every suite uses every helper."
)]

use std::collections::BTreeMap;
use std::sync::Arc;

use flockmesh_core::AgentId;
use flockmesh_core::AgentProfile;
use flockmesh_core::AgentStatus;
use flockmesh_core::ActorId;
use flockmesh_core::BindingId;
use flockmesh_core::BindingRiskProfile;
use flockmesh_core::BindingStatus;
use flockmesh_core::CapabilityName;
use flockmesh_core::ConnectorBinding;
use flockmesh_core::ConnectorId;
use flockmesh_core::DecisionKind;
use flockmesh_core::PlaybookCatalog;
use flockmesh_core::PolicyProfile;
use flockmesh_core::ProfileName;
use flockmesh_core::LedgerStore;
use flockmesh_core::ProfileRule;
use flockmesh_core::StateStore;
use flockmesh_core::Timestamp;
use flockmesh_core::WorkspaceId;
use flockmesh_core::policy::PolicyLibrary;
use flockmesh_core::runtime::InMemoryLedgerStore;
use flockmesh_core::runtime::InMemoryStateStore;
use flockmesh_core::runtime::LatticeFallbacks;
use flockmesh_core::runtime::Recorder;
use flockmesh_core::runtime::RunEngine;

/// Workspace used across scenarios.
pub const WORKSPACE: &str = "wsp_mindverse_cn";
/// Agent used across scenarios.
pub const AGENT: &str = "agt_ops_assistant_01";
/// Actor used across scenarios.
pub const ACTOR: &str = "usr_ops_lead_01";

/// Returns a fixed timestamp for deterministic tests.
pub fn t0() -> Timestamp {
    Timestamp::parse("2026-03-01T08:00:00Z").unwrap()
}

/// Builds a profile whose wildcard rule carries the given decision.
pub fn wildcard_profile(name: &str, decision: DecisionKind, approvals: Option<u32>) -> PolicyProfile {
    let mut rules = BTreeMap::new();
    rules.insert(
        CapabilityName::new("*"),
        ProfileRule {
            decision,
            required_approvals: approvals,
        },
    );
    PolicyProfile {
        name: ProfileName::new(name),
        rules,
    }
}

/// Builds the default permissive lattice library.
pub fn default_library() -> Arc<PolicyLibrary> {
    let library = PolicyLibrary::new();
    library.install(wildcard_profile("org_default_safe", DecisionKind::Allow, None));
    library.install(wildcard_profile("workspace_ops_cn", DecisionKind::Allow, None));
    library.install(wildcard_profile("agent_ops_assistant", DecisionKind::Allow, None));
    Arc::new(library)
}

/// Builds the ops agent profile.
pub fn ops_agent() -> AgentProfile {
    AgentProfile {
        id: AgentId::new(AGENT),
        workspace_id: WorkspaceId::new(WORKSPACE),
        role: "ops_assistant".to_string(),
        owners: vec![ActorId::new(ACTOR)],
        name: "Ops Assistant".to_string(),
        model_policy: serde_json::json!({}),
        default_policy_profile: ProfileName::new("agent_ops_assistant"),
        status: AgentStatus::Active,
        metadata: serde_json::json!({}),
        created_at: t0(),
        updated_at: t0(),
    }
}

/// Builds the Feishu binding used by S1/S4-style scenarios.
pub fn feishu_binding() -> ConnectorBinding {
    ConnectorBinding {
        id: BindingId::new("cnb_feishu_ops"),
        workspace_id: WorkspaceId::new(WORKSPACE),
        agent_id: Some(AgentId::new(AGENT)),
        connector_id: ConnectorId::new("con_feishu_official"),
        scopes: [CapabilityName::new("message.send")].into_iter().collect(),
        auth_ref: "sec_feishu_bot_token".to_string(),
        risk_profile: BindingRiskProfile::Standard,
        status: BindingStatus::Active,
    }
}

/// Engine fixture over in-memory backends.
pub struct EngineFixture {
    /// Shared state store.
    pub store: Arc<InMemoryStateStore>,
    /// Shared ledger.
    pub ledger: Arc<InMemoryLedgerStore>,
    /// Policy library.
    pub library: Arc<PolicyLibrary>,
    /// Run engine under test.
    pub engine: RunEngine,
}

/// Builds an engine fixture with the ops agent and Feishu binding persisted.
pub fn engine_fixture() -> EngineFixture {
    let store = Arc::new(InMemoryStateStore::new());
    let ledger = Arc::new(InMemoryLedgerStore::new());
    let library = default_library();
    let engine = RunEngine::new(
        Arc::clone(&store) as Arc<dyn StateStore>,
        Recorder::new(Arc::clone(&ledger) as Arc<dyn LedgerStore>),
        Arc::clone(&library),
        Arc::new(PlaybookCatalog::builtin()),
        LatticeFallbacks::default(),
    );
    store.save_agent(&ops_agent()).unwrap();
    store.save_binding(&feishu_binding()).unwrap();
    EngineFixture {
        store,
        ledger,
        library,
        engine,
    }
}
