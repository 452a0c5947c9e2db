// Core anti-spam module - pure detection logic and engine state.
// The Discord layer translates verdicts into moderation actions.

pub mod activity_window;
pub mod antispam_models;
pub mod classifier;
pub mod fingerprint;
pub mod spam_engine;

pub use antispam_models::*;
pub use spam_engine::*;
