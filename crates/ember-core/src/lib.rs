pub mod alert;
pub mod error;
pub mod escalation;
pub mod events;
pub mod ids;
pub mod incident;
pub mod rule;
pub mod severity;
pub mod signal;
