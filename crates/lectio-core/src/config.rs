//! Tunables for one pipeline instance.

use std::time::Duration;

/// Sampling parameters for one kind of generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallBudget {
    /// Wall time allowed for the call before it counts as failed.
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Configuration shared by every component of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Width of the day-generation worker pool.
    pub day_concurrency: usize,
    /// Pause inserted between day-generation batches.
    pub batch_pause: Duration,
    pub planning: CallBudget,
    pub content: CallBudget,
    pub review: CallBudget,
    /// Number of references validated concurrently per group.
    pub reference_batch_size: usize,
    /// Pause inserted between reference groups.
    pub reference_batch_delay: Duration,
    /// Timeout for one upstream reference lookup.
    pub reference_timeout: Duration,
    /// How long a cached reference validation stays fresh.
    pub reference_ttl: Duration,
    /// Run the quality review phase.
    pub review_enabled: bool,
    /// Publication is withheld when the share of fallback days exceeds this.
    pub max_fallback_ratio: f64,
    /// Demote a day to fallback when it omits more optional fields than this.
    /// `None` tolerates any number of omissions.
    pub max_omitted_optional_fields: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            day_concurrency: 3,
            batch_pause: Duration::from_secs(1),
            planning: CallBudget {
                timeout: Duration::from_secs(120),
                max_tokens: 4096,
                temperature: 0.7,
            },
            content: CallBudget {
                timeout: Duration::from_secs(300),
                max_tokens: 8192,
                temperature: 0.7,
            },
            review: CallBudget {
                timeout: Duration::from_secs(120),
                max_tokens: 2048,
                temperature: 0.2,
            },
            reference_batch_size: 5,
            reference_batch_delay: Duration::from_millis(500),
            reference_timeout: Duration::from_secs(15),
            reference_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            review_enabled: true,
            max_fallback_ratio: 0.3,
            max_omitted_optional_fields: None,
        }
    }
}

impl PipelineConfig {
    /// A configuration with all pacing delays removed. Used by tests and
    /// dry runs against in-memory collaborators.
    pub fn without_delays(mut self) -> Self {
        self.batch_pause = Duration::ZERO;
        self.reference_batch_delay = Duration::ZERO;
        self
    }
}
