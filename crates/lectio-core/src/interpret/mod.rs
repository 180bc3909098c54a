//! Structured-record extraction from free-form completions.
//!
//! A completion is run through an ordered list of [`RepairTier`]s, each more
//! aggressive than the last. After every tier the text is parsed and the
//! result validated against the target [`Schema`]; the first tier that
//! yields a schema-valid record wins. A record that parses but fails
//! validation counts as a failed attempt.

pub mod repair;

use std::fmt;

use serde::de::DeserializeOwned;
use thiserror::Error;

/// A record type the interpreter can extract.
pub trait Schema: DeserializeOwned {
    /// Name used in logs and errors.
    const NAME: &'static str;

    /// Semantic checks beyond what deserialization enforces.
    fn validate(&self) -> Result<(), SchemaViolation>;
}

/// A parsed record broke a schema rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct SchemaViolation {
    pub field: String,
    pub message: String,
}

impl SchemaViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Repair strategies, in the order they are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairTier {
    /// Whitespace trimmed and code fences removed.
    Verbatim,
    /// Comments and trailing commas removed.
    StripComments,
    /// Elision markers removed.
    CollapseElisions,
    /// Largest bracket-balanced substring, cleaned by the earlier tiers.
    LargestBalanced,
}

impl RepairTier {
    pub const ALL: [RepairTier; 4] = [
        Self::Verbatim,
        Self::StripComments,
        Self::CollapseElisions,
        Self::LargestBalanced,
    ];
}

impl fmt::Display for RepairTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Verbatim => "verbatim",
            Self::StripComments => "strip_comments",
            Self::CollapseElisions => "collapse_elisions",
            Self::LargestBalanced => "largest_balanced",
        };
        f.write_str(s)
    }
}

/// Why one tier did not produce a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierFailure {
    pub tier: RepairTier,
    pub reason: String,
}

impl fmt::Display for TierFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tier, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpretError {
    /// Every repair tier was exhausted.
    #[error("unparsable {schema} response ({})", join_failures(.attempts))]
    Unparsable {
        schema: &'static str,
        attempts: Vec<TierFailure>,
    },
}

fn join_failures(attempts: &[TierFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Extract a schema-valid `T` from raw completion text.
pub fn extract<T: Schema>(raw: &str) -> Result<T, InterpretError> {
    let mut attempts = Vec::new();

    let verbatim = repair::strip_fences(raw);
    let stripped = repair::strip_comments(&verbatim);
    let collapsed = repair::collapse_elisions(&stripped);
    let mut previous: Option<&str> = None;

    for (tier, text) in [
        (RepairTier::Verbatim, verbatim.as_str()),
        (RepairTier::StripComments, stripped.as_str()),
        (RepairTier::CollapseElisions, collapsed.as_str()),
    ] {
        if previous == Some(text) {
            attempts.push(TierFailure {
                tier,
                reason: "no change".to_string(),
            });
            continue;
        }
        previous = Some(text);
        match parse_checked::<T>(text) {
            Ok(record) => {
                log_recovery(tier, T::NAME);
                return Ok(record);
            }
            Err(reason) => attempts.push(TierFailure { tier, reason }),
        }
    }

    let candidates = repair::balanced_candidates(&verbatim);
    if candidates.is_empty() {
        attempts.push(TierFailure {
            tier: RepairTier::LargestBalanced,
            reason: "no bracket-balanced payload found".to_string(),
        });
    }
    let mut last_reason = None;
    for candidate in candidates {
        let cleaned = repair::collapse_elisions(&repair::strip_comments(candidate));
        match parse_checked::<T>(&cleaned) {
            Ok(record) => {
                log_recovery(RepairTier::LargestBalanced, T::NAME);
                return Ok(record);
            }
            Err(reason) => last_reason = Some(reason),
        }
    }
    if let Some(reason) = last_reason {
        attempts.push(TierFailure {
            tier: RepairTier::LargestBalanced,
            reason,
        });
    }

    tracing::warn!(schema = T::NAME, attempts = attempts.len(), "response unparsable after all repair tiers");
    Err(InterpretError::Unparsable {
        schema: T::NAME,
        attempts,
    })
}

fn parse_checked<T: Schema>(text: &str) -> Result<T, String> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("syntax: {e}"))?;
    let record: T = serde_json::from_value(value).map_err(|e| format!("shape: {e}"))?;
    record.validate().map_err(|e| format!("schema: {e}"))?;
    Ok(record)
}

fn log_recovery(tier: RepairTier, schema: &str) {
    if tier == RepairTier::Verbatim {
        tracing::debug!(schema, "response parsed without repair");
    } else {
        tracing::info!(schema, %tier, "response recovered by repair tier");
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pair {
        name: String,
        items: Vec<u32>,
    }

    impl Schema for Pair {
        const NAME: &'static str = "pair";

        fn validate(&self) -> Result<(), SchemaViolation> {
            if self.items.is_empty() {
                return Err(SchemaViolation::new("items", "must not be empty"));
            }
            Ok(())
        }
    }

    #[test]
    fn clean_json_parses_verbatim() {
        let pair: Pair = extract(r#"{"name": "a", "items": [1]}"#).unwrap();
        assert_eq!(pair.items, vec![1]);
    }

    #[test]
    fn commented_json_is_repaired() {
        let raw = "```json\n{\n  \"name\": \"a\", // label\n  \"items\": [1, 2,],\n}\n```";
        let pair: Pair = extract(raw).unwrap();
        assert_eq!(pair.items, vec![1, 2]);
    }

    #[test]
    fn elided_json_is_repaired() {
        let raw = r#"{"name": "a", "items": [1, 2, ... and 5 more]}"#;
        let pair: Pair = extract(raw).unwrap();
        assert_eq!(pair.items, vec![1, 2]);
    }

    #[test]
    fn prose_wrapped_json_is_located() {
        let raw = "Here is the record you asked for: {\"name\": \"a\", \"items\": [3]} Let me know!";
        let pair: Pair = extract(raw).unwrap();
        assert_eq!(pair.name, "a");
    }

    #[test]
    fn schema_failure_moves_to_the_next_candidate() {
        let raw = r#"Draft: {"name": "a much longer draft name", "items": []} Final: {"name": "a", "items": [7]}"#;
        let pair: Pair = extract(raw).unwrap();
        assert_eq!(pair.items, vec![7]);
    }

    #[test]
    fn schema_invalid_everywhere_is_unparsable() {
        let err = extract::<Pair>(r#"{"name": "a", "items": []}"#).unwrap_err();
        let InterpretError::Unparsable { schema, attempts } = err;
        assert_eq!(schema, "pair");
        assert!(attempts.iter().any(|a| a.reason.starts_with("schema:")));
    }

    #[test]
    fn text_without_structure_is_unparsable() {
        let err = extract::<Pair>("I'm sorry, I cannot produce that.").unwrap_err();
        let InterpretError::Unparsable { attempts, .. } = err;
        assert_eq!(attempts.last().unwrap().tier, RepairTier::LargestBalanced);
        assert!(err_message_mentions_every_tier(&attempts));
    }

    fn err_message_mentions_every_tier(attempts: &[TierFailure]) -> bool {
        RepairTier::ALL
            .iter()
            .all(|tier| attempts.iter().any(|a| a.tier == *tier))
    }
}
