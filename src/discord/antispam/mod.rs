// Discord adapters for the anti-spam workflow.

pub mod embeds;
pub mod remediation;
pub mod review;
pub mod spam_handler;
