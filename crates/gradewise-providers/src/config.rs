//! Pipeline configuration and service factories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use gradewise_core::batch::BatchConfig;
use gradewise_core::breaker::{BreakerConfig, BreakerRegistry};
use gradewise_core::evaluators::EvaluatorSet;
use gradewise_core::resilience::RetryPolicy;
use gradewise_core::traits::{ObjectStore, PronunciationAssessor, TextGenerator};
use gradewise_core::workflow::WorkflowConfig;

use crate::anthropic::AnthropicGenerator;
use crate::openai::OpenAiGenerator;
use crate::speech::{AzureSpeechAssessor, DEFAULT_REGION};
use crate::storage::HttpObjectStore;

pub const OPENAI_KEY_VAR: &str = "GRADEWISE_OPENAI_KEY";
pub const ANTHROPIC_KEY_VAR: &str = "GRADEWISE_ANTHROPIC_KEY";
pub const SPEECH_KEY_VAR: &str = "GRADEWISE_SPEECH_KEY";

/// Text-generation backend.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GeneratorConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

impl std::fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratorConfig::OpenAI {
                api_key: _,
                model,
                base_url,
                org_id,
                timeout_secs,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("model", model)
                .field("base_url", base_url)
                .field("org_id", org_id)
                .field("timeout_secs", timeout_secs)
                .finish(),
            GeneratorConfig::Anthropic {
                api_key: _,
                model,
                base_url,
                timeout_secs,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("model", model)
                .field("base_url", base_url)
                .field("timeout_secs", timeout_secs)
                .finish(),
        }
    }
}

/// Pronunciation-assessment service.
#[derive(Clone, Serialize, Deserialize)]
pub struct AssessorConfig {
    pub api_key: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl std::fmt::Debug for AssessorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssessorConfig")
            .field("api_key", &"***")
            .field("region", &self.region)
            .field("language", &self.language)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

/// Where recordings are fetched from.
#[derive(Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub base_url: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl std::fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreConfig")
            .field("base_url", &self.base_url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Top-level gradewise configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GradewiseConfig {
    pub generator: Option<GeneratorConfig>,
    pub assessor: Option<AssessorConfig>,
    pub object_store: Option<ObjectStoreConfig>,
    pub retry: RetryPolicy,
    /// Breaker thresholds applied to every dependency.
    pub breaker: BreakerConfig,
    /// Per-dependency thresholds, keyed by dependency name.
    pub breaker_overrides: HashMap<String, BreakerConfig>,
    pub batch: BatchConfig,
    pub workflow: WorkflowConfig,
}

impl GradewiseConfig {
    /// Breaker registry with the configured defaults and overrides.
    pub fn breaker_registry(&self) -> BreakerRegistry {
        self.breaker_overrides.iter().fold(
            BreakerRegistry::new(self.breaker.clone()),
            |registry, (dependency, config)| registry.with_override(dependency, config.clone()),
        )
    }

    /// The standard evaluators wired to the configured services.
    pub fn evaluator_set(&self, registry: &BreakerRegistry) -> Result<EvaluatorSet> {
        let generator = self
            .generator
            .as_ref()
            .context("no [generator] configured")?;
        let assessor = self.assessor.as_ref().context("no [assessor] configured")?;
        let object_store = self
            .object_store
            .as_ref()
            .context("no [object_store] configured")?;

        Ok(EvaluatorSet::standard(
            create_assessor(assessor)?,
            create_generator(generator)?,
            create_object_store(object_store)?,
            registry,
            self.retry.clone(),
        ))
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut from = 0;
    while let Some(offset) = result[from..].find("${") {
        let start = from + offset;
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
        from = start + value.len();
    }
    result
}

fn resolve_opt(value: &mut Option<String>) {
    if let Some(v) = value {
        *v = resolve_env_vars(v);
    }
}

impl GeneratorConfig {
    fn resolve(&mut self) {
        match self {
            GeneratorConfig::OpenAI {
                api_key,
                model,
                base_url,
                org_id,
                ..
            } => {
                *api_key = resolve_env_vars(api_key);
                resolve_opt(model);
                resolve_opt(base_url);
                resolve_opt(org_id);
            }
            GeneratorConfig::Anthropic {
                api_key,
                model,
                base_url,
                ..
            } => {
                *api_key = resolve_env_vars(api_key);
                resolve_opt(model);
                resolve_opt(base_url);
            }
        }
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `gradewise.toml` in the current directory
/// 2. `~/.config/gradewise/config.toml`
///
/// Environment variable overrides: `GRADEWISE_OPENAI_KEY`,
/// `GRADEWISE_ANTHROPIC_KEY`, `GRADEWISE_SPEECH_KEY`.
pub fn load_config() -> Result<GradewiseConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<GradewiseConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("gradewise.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => GradewiseConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    resolve_config(&mut config);
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<GradewiseConfig> {
    Ok(toml::from_str(content)?)
}

/// Apply key overrides. A generator key only fills a generator of the same
/// kind; with no generator configured, the OpenAI key takes precedence.
fn apply_env_overrides(config: &mut GradewiseConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(key) = var(OPENAI_KEY_VAR) {
        match &mut config.generator {
            Some(GeneratorConfig::OpenAI { api_key, .. }) => *api_key = key,
            Some(GeneratorConfig::Anthropic { .. }) => {}
            None => {
                config.generator = Some(GeneratorConfig::OpenAI {
                    api_key: key,
                    model: None,
                    base_url: None,
                    org_id: None,
                    timeout_secs: None,
                })
            }
        }
    }

    if let Some(key) = var(ANTHROPIC_KEY_VAR) {
        match &mut config.generator {
            Some(GeneratorConfig::Anthropic { api_key, .. }) => *api_key = key,
            Some(GeneratorConfig::OpenAI { .. }) => {}
            None => {
                config.generator = Some(GeneratorConfig::Anthropic {
                    api_key: key,
                    model: None,
                    base_url: None,
                    timeout_secs: None,
                })
            }
        }
    }

    if let Some(key) = var(SPEECH_KEY_VAR) {
        match &mut config.assessor {
            Some(assessor) => assessor.api_key = key,
            None => {
                config.assessor = Some(AssessorConfig {
                    api_key: key,
                    region: default_region(),
                    language: None,
                    base_url: None,
                    timeout_secs: None,
                })
            }
        }
    }
}

fn resolve_config(config: &mut GradewiseConfig) {
    if let Some(generator) = &mut config.generator {
        generator.resolve();
    }
    if let Some(assessor) = &mut config.assessor {
        assessor.api_key = resolve_env_vars(&assessor.api_key);
        assessor.region = resolve_env_vars(&assessor.region);
        resolve_opt(&mut assessor.base_url);
    }
    if let Some(store) = &mut config.object_store {
        store.base_url = resolve_env_vars(&store.base_url);
        resolve_opt(&mut store.bearer_token);
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("gradewise"))
}

/// Create a text generator from its configuration.
pub fn create_generator(config: &GeneratorConfig) -> Result<Arc<dyn TextGenerator>> {
    match config {
        GeneratorConfig::OpenAI {
            api_key,
            model,
            base_url,
            org_id,
            timeout_secs,
        } => Ok(Arc::new(OpenAiGenerator::new(
            api_key,
            model.clone(),
            base_url.clone(),
            org_id.clone(),
            *timeout_secs,
        )?)),
        GeneratorConfig::Anthropic {
            api_key,
            model,
            base_url,
            timeout_secs,
        } => Ok(Arc::new(AnthropicGenerator::new(
            api_key,
            model.clone(),
            base_url.clone(),
            *timeout_secs,
        )?)),
    }
}

pub fn create_assessor(config: &AssessorConfig) -> Result<Arc<dyn PronunciationAssessor>> {
    Ok(Arc::new(AzureSpeechAssessor::new(
        &config.api_key,
        &config.region,
        config.language.clone(),
        config.base_url.clone(),
        config.timeout_secs,
    )?))
}

pub fn create_object_store(config: &ObjectStoreConfig) -> Result<Arc<dyn ObjectStore>> {
    Ok(Arc::new(HttpObjectStore::new(
        &config.base_url,
        config.bearer_token.clone(),
        config.timeout_secs,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradewise_core::breaker::CircuitState;
    use gradewise_core::model::AnswerType;

    const FULL: &str = r#"
[generator]
type = "anthropic"
api_key = "sk-ant"
model = "claude-3-5-haiku-latest"

[assessor]
api_key = "speech"
region = "westeurope"

[object_store]
base_url = "https://files.example.com/homework"

[retry]
max_retries = 5

[breaker]
failure_threshold = 4

[breaker_overrides.text-generation]
failure_threshold = 2
reset_timeout_ms = 1000

[batch]
parallelism = 8

[workflow]
review_confidence_threshold = 50
"#;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_GRADEWISE_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_GRADEWISE_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_GRADEWISE_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${_GRADEWISE_UNSET_VAR}"), "");
        assert_eq!(resolve_env_vars("open ${brace"), "open ${brace");
        std::env::remove_var("_GRADEWISE_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = GradewiseConfig::default();
        assert!(config.generator.is_none());
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.batch.parallelism, 4);
        assert_eq!(config.workflow.review_confidence_threshold, 60);
    }

    #[test]
    fn parse_full_config() {
        let config = parse_config(FULL).unwrap();
        assert!(matches!(
            config.generator,
            Some(GeneratorConfig::Anthropic { ref model, .. }) if model.as_deref() == Some("claude-3-5-haiku-latest")
        ));
        assert_eq!(config.assessor.as_ref().unwrap().region, "westeurope");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.breaker.failure_threshold, 4);
        assert_eq!(config.breaker.reset_timeout_ms, 60_000);
        assert_eq!(config.batch.parallelism, 8);
        assert_eq!(config.workflow.review_confidence_threshold, 50);

        let registry = config.breaker_registry();
        assert_eq!(registry.breaker("text-generation").config().failure_threshold, 2);
        assert_eq!(registry.breaker("object-store").config().failure_threshold, 4);
        assert_eq!(
            registry.breaker("object-store").state(),
            CircuitState::Closed
        );
    }

    #[test]
    fn debug_masks_secrets() {
        let config = parse_config(FULL).unwrap();
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-ant"));
        assert!(!printed.contains("\"speech\""));
        assert!(printed.contains("***"));
    }

    #[test]
    fn env_overrides_fill_matching_sections() {
        let mut config = parse_config(FULL).unwrap();
        apply_env_overrides(&mut config, |name| match name {
            ANTHROPIC_KEY_VAR => Some("from-env".into()),
            OPENAI_KEY_VAR => Some("ignored".into()),
            SPEECH_KEY_VAR => Some("speech-env".into()),
            _ => None,
        });
        assert!(matches!(
            config.generator,
            Some(GeneratorConfig::Anthropic { ref api_key, .. }) if api_key == "from-env"
        ));
        assert_eq!(config.assessor.unwrap().api_key, "speech-env");

        let mut empty = GradewiseConfig::default();
        apply_env_overrides(&mut empty, |name| {
            (name == OPENAI_KEY_VAR).then(|| "sk-openai".to_string())
        });
        assert!(matches!(empty.generator, Some(GeneratorConfig::OpenAI { .. })));
        assert!(empty.assessor.is_none());
    }

    #[test]
    fn load_from_file_resolves_references() {
        std::env::set_var("_GRADEWISE_STORE_TOKEN", "tok-123");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gradewise.toml");
        std::fs::write(
            &path,
            r#"
[object_store]
base_url = "https://files.example.com"
bearer_token = "${_GRADEWISE_STORE_TOKEN}"
"#,
        )
        .unwrap();

        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(
            config.object_store.unwrap().bearer_token.as_deref(),
            Some("tok-123")
        );
        std::env::remove_var("_GRADEWISE_STORE_TOKEN");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_config_from(Some(Path::new("/nonexistent/gradewise.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[retry\nmax_retries = ").unwrap();
        let err = load_config_from(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("broken.toml"));
    }

    #[test]
    fn evaluator_set_needs_every_service() {
        let registry = BreakerRegistry::default();
        let err = GradewiseConfig::default()
            .evaluator_set(&registry)
            .err().unwrap();
        assert!(err.to_string().contains("[generator]"));

        let config = parse_config(FULL).unwrap();
        let evaluators = config.evaluator_set(&config.breaker_registry()).unwrap();
        for kind in [AnswerType::Audio, AnswerType::Text, AnswerType::Choice] {
            assert!(evaluators.get(kind).is_some());
        }
    }
}
