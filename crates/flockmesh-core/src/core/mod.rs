// crates/flockmesh-core/src/core/mod.rs
// ============================================================================
// Module: Flockmesh Core Model
// Description: Canonical data model for the control plane.
// Purpose: Re-export the record types shared across runtime and boundaries.
// Dependencies: crate::core submodules
// ============================================================================

//! ## Overview
//! The core model is the vocabulary of the control plane: identifiers,
//! timestamps, hashing and signing primitives, and the persisted record
//! shapes for agents, bindings, manifests, intents, decisions, runs,
//! profiles, and ledger entries.

/// Agent profile records.
pub mod agent;
/// Connector binding records.
pub mod binding;
/// Policy decision records and reason codes.
pub mod decision;
/// Canonical JSON hashing.
pub mod hashing;
/// Typed identifiers and boundary validators.
pub mod identifiers;
/// Action intents and risk tiers.
pub mod intent;
/// Dual-ledger record shapes.
pub mod ledger;
/// Attested connector manifests.
pub mod manifest;
/// Policy patch records and history entries.
pub mod patch;
/// Playbook templates.
pub mod playbook;
/// Policy profiles, documents, and the compiler.
pub mod profile;
/// Run records and lifecycle status.
pub mod run;
/// Export signing.
pub mod signing;
/// RFC-3339 timestamps.
pub mod time;

pub use agent::AgentProfile;
pub use agent::AgentStatus;
pub use binding::BindingRiskProfile;
pub use binding::BindingStatus;
pub use binding::ConnectorBinding;
pub use decision::DecisionKind;
pub use decision::PolicyDecisionRecord;
pub use decision::PolicySource;
pub use decision::PolicyTrace;
pub use decision::TraceContribution;
pub use decision::push_reason;
pub use decision::reason;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::canonical_json_bytes;
pub use hashing::hash_bytes;
pub use hashing::hash_canonical_json;
pub use identifiers::ActionIntentId;
pub use identifiers::ActorId;
pub use identifiers::AgentId;
pub use identifiers::AuditId;
pub use identifiers::BindingId;
pub use identifiers::CapabilityName;
pub use identifiers::ConnectorId;
pub use identifiers::DecisionId;
pub use identifiers::EventId;
pub use identifiers::IdempotencyKey;
pub use identifiers::IdentifierError;
pub use identifiers::PatchId;
pub use identifiers::PlaybookId;
pub use identifiers::ProfileName;
pub use identifiers::RunId;
pub use identifiers::SigningKeyId;
pub use identifiers::StepId;
pub use identifiers::WorkspaceId;
pub use intent::ActionIntent;
pub use intent::IntentTarget;
pub use intent::RiskHint;
pub use intent::RiskTier;
pub use intent::SideEffect;
pub use ledger::AuditActor;
pub use ledger::AuditActorKind;
pub use ledger::AuditRecord;
pub use ledger::EventRecord;
pub use ledger::LedgerPage;
pub use ledger::PageRequest;
pub use ledger::audit_event;
pub use ledger::event_name;
pub use manifest::ConnectorManifest;
pub use manifest::ConnectorProtocol;
pub use manifest::ManifestAttestation;
pub use manifest::ManifestError;
pub use manifest::TrustLevel;
pub use patch::ChangeKind;
pub use patch::PatchChange;
pub use patch::PatchHistoryEntry;
pub use patch::PatchOperation;
pub use patch::PatchRule;
pub use patch::PatchSummary;
pub use patch::SimulatedDecision;
pub use patch::SimulationPreview;
pub use playbook::PlaybookCatalog;
pub use playbook::PlaybookTemplate;
pub use playbook::StepTemplate;
pub use profile::PolicyProfile;
pub use profile::ProfileDocument;
pub use profile::ProfileError;
pub use profile::ProfileRule;
pub use profile::compile_profile;
pub use run::ApprovalProgress;
pub use run::RunRecord;
pub use run::RunStatus;
pub use run::RunTrigger;
pub use run::TriggerKind;
pub use signing::ExportSignature;
pub use signing::SigningError;
pub use signing::SigningKeyRing;
pub use time::Timestamp;
