//! Scripture reference validation with a TTL cache and stale fallback.
//!
//! Lookup order for one reference:
//!
//! 1. normalize; text that is not a reference is reported invalid
//! 2. fresh cache hit: return it
//! 3. otherwise ask the upstream service and write the answer through
//! 4. upstream failure: serve the expired entry if there is one, else
//!    report the reference as unavailable (never cached)

pub mod lookup;
pub mod normalize;

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use lectio_db::models::ReferenceValidation;

use crate::config::PipelineConfig;
use crate::store::ReferenceCache;

pub use lookup::{HttpReferenceLookup, LookupError, LookupOutcome, ReferenceLookup};
pub use normalize::normalize_reference;

/// Where a validation result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSource {
    /// Fresh cache entry; no upstream call was made.
    Cache,
    /// Upstream answered and the cache was refreshed.
    Upstream,
    /// Upstream failed; an expired cache entry was served unchanged.
    StaleCache,
    /// Upstream failed and nothing was cached.
    Unavailable,
    /// The text could not be read as a reference.
    Malformed,
}

/// Outcome of validating one reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCheck {
    /// The reference as it appeared in the content.
    pub original: String,
    pub source: CheckSource,
    pub validation: ReferenceValidation,
}

impl ReferenceCheck {
    pub fn is_valid(&self) -> bool {
        self.validation.is_valid
    }
}

/// Aggregate of a validation batch, attached to the run result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceReport {
    pub valid: usize,
    pub invalid: usize,
    pub unavailable: usize,
    pub stale_served: usize,
    pub checks: Vec<ReferenceCheck>,
}

impl ReferenceReport {
    pub fn from_checks(checks: Vec<ReferenceCheck>) -> Self {
        let mut report = Self::default();
        for check in &checks {
            match check.source {
                CheckSource::Unavailable => report.unavailable += 1,
                _ if check.is_valid() => report.valid += 1,
                _ => report.invalid += 1,
            }
            if check.source == CheckSource::StaleCache {
                report.stale_served += 1;
            }
        }
        report.checks = checks;
        report
    }

    /// References confirmed invalid by the upstream service or the parser.
    pub fn invalid_references(&self) -> impl Iterator<Item = &str> {
        self.checks
            .iter()
            .filter(|c| c.source != CheckSource::Unavailable && !c.is_valid())
            .map(|c| c.original.as_str())
    }
}

/// Validates references against an upstream service through a shared cache.
pub struct CitationValidator {
    lookup: Arc<dyn ReferenceLookup>,
    cache: Arc<dyn ReferenceCache>,
    config: PipelineConfig,
}

impl CitationValidator {
    pub fn new(lookup: Arc<dyn ReferenceLookup>, cache: Arc<dyn ReferenceCache>, config: PipelineConfig) -> Self {
        Self { lookup, cache, config }
    }

    /// Validate one reference. Never fails; degraded answers are tagged by
    /// [`CheckSource`].
    pub async fn validate(&self, reference: &str) -> ReferenceCheck {
        let now = Utc::now();
        let Some(key) = normalize_reference(reference) else {
            tracing::warn!(reference, "not a scripture reference");
            return ReferenceCheck {
                original: reference.to_string(),
                source: CheckSource::Malformed,
                validation: ReferenceValidation {
                    reference: reference.trim().to_string(),
                    is_valid: false,
                    resolved_text: None,
                    upstream_error: Some("not a scripture reference".to_string()),
                    validated_at: now,
                    expires_at: now,
                },
            };
        };

        let cached = match self.cache.get(&key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(reference = %key, error = %e, "reference cache read failed");
                None
            }
        };
        if let Some(entry) = cached.as_ref().filter(|e| e.is_fresh(now)) {
            tracing::debug!(reference = %key, "reference cache hit");
            return self.check(reference, CheckSource::Cache, entry.clone());
        }

        let answer = match tokio::time::timeout(self.config.reference_timeout, self.lookup.lookup(&key)).await {
            Ok(answer) => answer,
            Err(_) => Err(LookupError::Timeout),
        };

        match answer {
            Ok(outcome) => {
                let validation = ReferenceValidation {
                    reference: key.clone(),
                    is_valid: outcome.ok,
                    resolved_text: outcome.text,
                    upstream_error: None,
                    validated_at: now,
                    expires_at: now + self.ttl(),
                };
                if let Err(e) = self.cache.put(&validation).await {
                    tracing::warn!(reference = %key, error = %e, "reference cache write failed");
                }
                if !validation.is_valid {
                    tracing::warn!(reference = %key, "reference rejected by upstream");
                }
                self.check(reference, CheckSource::Upstream, validation)
            }
            Err(error) => match cached {
                Some(stale) => {
                    tracing::warn!(reference = %key, %error, "upstream failed, serving stale cache entry");
                    self.check(reference, CheckSource::StaleCache, stale)
                }
                None => {
                    tracing::warn!(reference = %key, %error, "upstream failed, reference left unvalidated");
                    self.check(
                        reference,
                        CheckSource::Unavailable,
                        ReferenceValidation {
                            reference: key,
                            is_valid: false,
                            resolved_text: None,
                            upstream_error: Some(error.to_string()),
                            validated_at: now,
                            expires_at: now,
                        },
                    )
                }
            },
        }
    }

    /// Validate many references in fixed-size groups. Groups run one after
    /// another with a pause between them; references within a group run
    /// concurrently. Results are in input order.
    pub async fn validate_batch(&self, references: &[String]) -> Vec<ReferenceCheck> {
        let group_size = self.config.reference_batch_size.max(1);
        let mut checks = Vec::with_capacity(references.len());

        for (i, group) in references.chunks(group_size).enumerate() {
            if i > 0 && !self.config.reference_batch_delay.is_zero() {
                tokio::time::sleep(self.config.reference_batch_delay).await;
            }
            checks.extend(join_all(group.iter().map(|r| self.validate(r))).await);
        }
        checks
    }

    fn check(&self, original: &str, source: CheckSource, validation: ReferenceValidation) -> ReferenceCheck {
        ReferenceCheck {
            original: original.to_string(),
            source,
            validation,
        }
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.reference_ttl).unwrap_or(chrono::Duration::days(7))
    }
}
