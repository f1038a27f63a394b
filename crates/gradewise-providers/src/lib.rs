//! gradewise-providers: External service clients for the evaluation pipeline.
//!
//! Implements the `gradewise-core` service traits over HTTP: OpenAI and
//! Anthropic text generation, Azure Speech pronunciation assessment, and a
//! plain HTTP object store. Also hosts configuration loading, tracing setup,
//! and in-process mocks.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod mock;
pub mod openai;
pub mod speech;
pub mod storage;
pub mod telemetry;

pub use config::{load_config, load_config_from, GeneratorConfig, GradewiseConfig};
pub use error::ProviderError;
pub use telemetry::init_tracing;

/// System prompt shared by the text generators.
pub(crate) const SYSTEM_PROMPT: &str = "You are an experienced English teacher giving concise, \
encouraging feedback on student homework. Follow the requested response format exactly.";
