// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "antispam/mod.rs"]
pub mod antispam;

#[path = "audit/audit_service.rs"]
pub mod audit;

#[path = "evidence/evidence_store.rs"]
pub mod evidence;
