//! Builds a [`RunService`] from resolved configuration: PostgreSQL
//! collaborators for state and publication, HTTP clients for generation and
//! reference lookup.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use lectio_core::RunService;
use lectio_core::citation::HttpReferenceLookup;
use lectio_core::llm::anthropic::AnthropicGenerator;
use lectio_core::llm::{CompletionRequest, LlmError, TextGenerator};
use lectio_core::orchestrator::Pipeline;
use lectio_core::store::{PgPublisher, PgReferenceCache, PgRunStore};

use crate::config::LectioConfig;

/// What a command needs from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Starts runs; generation credentials are required up front.
    Generate,
    /// Reads or cancels existing runs; works without an API key.
    Inspect,
}

pub fn build_service(config: &LectioConfig, pool: &PgPool, access: Access) -> Result<RunService> {
    let llm = AnthropicGenerator::from_env(
        &config.api_key_env,
        config.model.clone(),
        config.llm_base_url.clone(),
    );
    let llm: Arc<dyn TextGenerator> = match (llm, access) {
        (Ok(generator), _) => Arc::new(generator),
        (Err(e), Access::Inspect) => {
            tracing::debug!(error = %e, "text generation unavailable; inspecting runs only");
            Arc::new(Unconfigured(e))
        }
        (Err(e), Access::Generate) => {
            return Err(e).with_context(|| {
                format!("cannot configure text generation (API key from ${})", config.api_key_env)
            });
        }
    };
    let lookup = HttpReferenceLookup::new(&config.reference_base_url, config.pipeline.reference_timeout)?;

    tracing::debug!(model = %config.model, references = %config.reference_base_url, ?access, "pipeline configured");

    Ok(RunService::new(Pipeline::new(
        llm,
        Arc::new(lookup),
        Arc::new(PgReferenceCache::new(pool.clone())),
        Arc::new(PgRunStore::new(pool.clone())),
        Arc::new(PgPublisher::new(pool.clone())),
        config.pipeline.clone(),
    )))
}

/// Stands in for the generator when credentials are missing. Every call
/// fails with the original configuration error.
struct Unconfigured(LlmError);

#[async_trait]
impl TextGenerator for Unconfigured {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
        Err(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use sqlx::postgres::PgPoolOptions;

    use super::*;

    const UNSET_KEY_VAR: &str = "LECTIO_TEST_KEY_THAT_IS_NEVER_SET";

    fn config_without_key() -> LectioConfig {
        let _lock = crate::test_util::lock_env();
        let mut config = LectioConfig::resolve_with(Some("postgresql://localhost:5432/lectio"), None);
        config.api_key_env = UNSET_KEY_VAR.to_string();
        config
    }

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgresql://localhost:5432/lectio")
            .unwrap()
    }

    #[tokio::test]
    async fn inspecting_runs_needs_no_api_key() {
        let service = build_service(&config_without_key(), &lazy_pool(), Access::Inspect);
        assert!(service.is_ok());
    }

    #[tokio::test]
    async fn generating_requires_the_api_key() {
        let err = build_service(&config_without_key(), &lazy_pool(), Access::Generate)
            .err()
            .expect("generation without a key should fail");
        assert!(format!("{err:#}").contains(UNSET_KEY_VAR), "got: {err:#}");
    }

    #[tokio::test]
    async fn unconfigured_generator_reports_the_setup_error() {
        let generator = Unconfigured(LlmError::Misconfiguration("no key".to_string()));
        let request = CompletionRequest {
            system: None,
            prompt: "p".to_string(),
            max_tokens: 1,
            temperature: 0.0,
        };
        assert_eq!(
            generator.complete(&request).await,
            Err(LlmError::Misconfiguration("no key".to_string()))
        );
    }
}
