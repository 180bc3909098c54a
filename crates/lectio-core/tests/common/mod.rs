//! Scripted collaborators for pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use lectio_core::citation::{LookupError, LookupOutcome, ReferenceLookup};
use lectio_core::config::{CallBudget, PipelineConfig};
use lectio_core::llm::{CompletionRequest, LlmError, TextGenerator};
use lectio_core::orchestrator::Pipeline;
use lectio_core::request::NewGenerationRequest;
use lectio_core::store::{MemoryPublisher, MemoryReferenceCache, MemoryRunStore};
use lectio_core::RunService;

// ===========================================================================
// Text generator
// ===========================================================================

/// Answers planning, content and review prompts from a script.
///
/// Prompts are routed on their opening line: `Plan a ...`, `Write day N of
/// ...` and `Review day N ...`.
pub struct ScriptedGenerator {
    plan: Option<String>,
    stalled_days: HashSet<u32>,
    failing_days: HashSet<u32>,
    noisy_content: bool,
    review: String,
    content_delay: Duration,
    prompts: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedGenerator {
    /// A generator whose plan has `days` outlines.
    pub fn with_days(days: u32) -> Self {
        Self::with_plan(plan_json(days, |day| format!("Psalms {day}")))
    }

    pub fn with_plan(plan: String) -> Self {
        Self {
            plan: Some(plan),
            stalled_days: HashSet::new(),
            failing_days: HashSet::new(),
            noisy_content: false,
            review: approved_review(),
            content_delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Planning calls fail with a transport error.
    pub fn without_plan() -> Self {
        Self {
            plan: None,
            ..Self::with_days(1)
        }
    }

    /// Content calls for these days never answer.
    pub fn stall_days(mut self, days: &[u32]) -> Self {
        self.stalled_days.extend(days);
        self
    }

    /// Content calls for these days fail immediately.
    pub fn fail_days(mut self, days: &[u32]) -> Self {
        self.failing_days.extend(days);
        self
    }

    /// Wrap content responses in fences, prose and comments.
    pub fn noisy(mut self) -> Self {
        self.noisy_content = true;
        self
    }

    pub fn review_with(mut self, review: serde_json::Value) -> Self {
        self.review = review.to_string();
        self
    }

    pub fn content_delay(mut self, delay: Duration) -> Self {
        self.content_delay = delay;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn content_prompt(&self, day: u32) -> Option<String> {
        let prefix = format!("Write day {day} of");
        self.prompts().into_iter().find(|p| p.starts_with(&prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.prompts().iter().filter(|p| p.starts_with(prefix)).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn content(&self, day: u32, prompt: &str) -> Result<String, LlmError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let answer = self.content_answer(day, prompt).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        answer
    }

    async fn content_answer(&self, day: u32, prompt: &str) -> Result<String, LlmError> {
        if self.stalled_days.contains(&day) {
            std::future::pending::<()>().await;
        }
        if !self.content_delay.is_zero() {
            tokio::time::sleep(self.content_delay).await;
        }
        if self.failing_days.contains(&day) {
            return Err(LlmError::Transport(format!("connection reset on day {day}")));
        }
        let reference = prompt
            .lines()
            .find_map(|l| l.strip_prefix("- Focus passage: "))
            .map(str::to_string)
            .unwrap_or_else(|| format!("Psalms {day}"));
        let body = content_json(day, &reference);
        if self.noisy_content {
            Ok(format!(
                "Here is the content you asked for:\n```json\n// day {day}\n{}\n```\nLet me know if you need changes.",
                body.replacen("\"closing_focus\"", "/* closing */ \"closing_focus\"", 1)
            ))
        } else {
            Ok(body)
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let prompt = request.prompt.as_str();
        if prompt.starts_with("Plan a ") {
            return self
                .plan
                .clone()
                .ok_or_else(|| LlmError::Transport("planning endpoint unavailable".to_string()));
        }
        if let Some(day) = leading_day(prompt, "Write day ") {
            return self.content(day, prompt).await;
        }
        if prompt.starts_with("Review day ") {
            return Ok(self.review.clone());
        }
        Err(LlmError::Misconfiguration(format!(
            "unexpected prompt: {}",
            prompt.lines().next().unwrap_or_default()
        )))
    }
}

fn leading_day(prompt: &str, prefix: &str) -> Option<u32> {
    let rest = prompt.strip_prefix(prefix)?;
    rest.split_whitespace().next()?.parse().ok()
}

pub fn plan_json(days: u32, focus: impl Fn(u32) -> String) -> String {
    let outlines: Vec<serde_json::Value> = (1..=days)
        .map(|day| {
            json!({
                "day_number": day,
                "title": format!("Day {day} title"),
                "theme": "Trust",
                "focus_reference": focus(day),
                "learning_objective": "Learn to trust",
                "key_points": ["Point one", "Point two"],
            })
        })
        .collect();
    json!({
        "title": "Trusting God",
        "theme": "Trust",
        "description": "A study on trust.",
        "days": outlines,
    })
    .to_string()
}

pub fn content_json(day: u32, reference: &str) -> String {
    json!({
        "day_number": day,
        "title": format!("Day {day} content"),
        "scripture_passages": [
            { "reference": reference, "verses": ["In the beginning..."] }
        ],
        "teaching": format!("Teaching for day {day}."),
        "discussion_questions": ["What stands out?"],
        "reflection_prompt": "Reflect on it.",
        "application_points": ["Apply it."],
        "closing_focus": "Close in prayer.",
    })
    .to_string()
}

pub fn approved_review() -> String {
    json!({
        "approved": true,
        "quality_tier": "good",
        "concerns": [],
        "strengths": ["Clear teaching"],
    })
    .to_string()
}

// ===========================================================================
// Reference lookup
// ===========================================================================

/// Accepts every reference except the listed ones; can be switched off.
#[derive(Default)]
pub struct StaticLookup {
    invalid: HashSet<String>,
    down: bool,
    calls: AtomicUsize,
}

impl StaticLookup {
    pub fn rejecting(references: &[&str]) -> Self {
        Self {
            invalid: references.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn down() -> Self {
        Self {
            down: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReferenceLookup for StaticLookup {
    async fn lookup(&self, reference: &str) -> Result<LookupOutcome, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down {
            return Err(LookupError::Unavailable("503 Service Unavailable".to_string()));
        }
        let ok = !self.invalid.contains(reference);
        Ok(LookupOutcome {
            ok,
            text: ok.then(|| format!("text of {reference}")),
        })
    }
}

// ===========================================================================
// Wiring
// ===========================================================================

/// Fast configuration: no pauses, short call budgets.
pub fn test_config() -> PipelineConfig {
    let budget = CallBudget {
        timeout: Duration::from_millis(300),
        max_tokens: 1024,
        temperature: 0.0,
    };
    PipelineConfig {
        planning: budget,
        content: budget,
        review: budget,
        reference_timeout: Duration::from_millis(300),
        ..PipelineConfig::default()
    }
    .without_delays()
}

pub struct Harness {
    pub llm: Arc<ScriptedGenerator>,
    pub lookup: Arc<StaticLookup>,
    pub cache: Arc<MemoryReferenceCache>,
    pub store: Arc<MemoryRunStore>,
    pub publisher: Arc<MemoryPublisher>,
    pub service: RunService,
}

impl Harness {
    pub fn new(llm: ScriptedGenerator) -> Self {
        Self::with(llm, StaticLookup::default(), test_config())
    }

    pub fn with(llm: ScriptedGenerator, lookup: StaticLookup, config: PipelineConfig) -> Self {
        let llm = Arc::new(llm);
        let lookup = Arc::new(lookup);
        let cache = Arc::new(MemoryReferenceCache::new());
        let store = Arc::new(MemoryRunStore::new());
        let publisher = Arc::new(MemoryPublisher::new());
        let pipeline = Pipeline::new(
            llm.clone(),
            lookup.clone(),
            cache.clone(),
            store.clone(),
            publisher.clone(),
            config,
        );
        Self {
            llm,
            lookup,
            cache,
            store,
            publisher,
            service: RunService::new(pipeline),
        }
    }
}

pub fn request(title: &str, days: i32, style: &str) -> NewGenerationRequest {
    NewGenerationRequest {
        owner_id: "owner-1".to_string(),
        title: title.to_string(),
        brief: format!("A study called {title}"),
        duration_days: days,
        style: Some(style.to_string()),
        difficulty: None,
        audience: None,
        special_instructions: None,
    }
}
