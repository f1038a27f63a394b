//! gradewise-core: Homework evaluation pipeline and feedback workflow.
//!
//! This crate holds the data model, the per-answer evaluators, the
//! resilience layer guarding external AI services, and the orchestration
//! that turns submissions into reviewable feedback. Concrete service clients
//! live in `gradewise-providers`.

pub mod analytics;
pub mod batch;
pub mod breaker;
pub mod confidence;
pub mod error;
pub mod evaluators;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod resilience;
pub mod store;
pub mod traits;
pub mod workflow;
