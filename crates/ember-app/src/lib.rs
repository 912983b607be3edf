pub mod batching;
pub mod clock;
pub mod context;
pub mod error;
pub mod escalation;
pub mod incident_service;
pub mod incident_store;
pub mod pipeline;
pub mod retry;
pub mod rule_engine;
pub mod rule_service;
pub mod scheduler;

#[cfg(test)]
mod mocks;
