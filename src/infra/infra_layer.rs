// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "audit/sqlite_audit_store.rs"]
pub mod audit;

#[path = "evidence/file_evidence_store.rs"]
pub mod evidence;
