// Discord layer - commands and event handlers.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "antispam/mod.rs"]
pub mod antispam;

// Re-export command types for convenience
pub use commands::antispam::{Data, Error};
