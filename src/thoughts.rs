//! Thought batches: validation, normalization and kind summaries.
//!
//! A batch is all-or-nothing: every violation across every thought is
//! collected, and a single bad thought rejects the whole batch.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::HiveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThoughtKind {
    Goal,
    Plan,
    Action,
    Observation,
    Reflection,
    Decision,
}

impl ThoughtKind {
    /// Summary order.
    pub const ALL: [ThoughtKind; 6] = [
        Self::Goal,
        Self::Plan,
        Self::Action,
        Self::Observation,
        Self::Reflection,
        Self::Decision,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Goal => "goal",
            Self::Plan => "plan",
            Self::Action => "action",
            Self::Observation => "observation",
            Self::Reflection => "reflection",
            Self::Decision => "decision",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == raw)
    }
}

/// What the thought's author wants the search to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Explore,
    Design,
    Balance,
    #[serde(other)]
    Unknown,
}

/// The evolution operation a thought asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Scan,
    Mutate,
    Crossover,
    Evaluate,
    Archive,
    #[serde(other)]
    Unknown,
}

/// A reasoning step as received from a caller, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thought {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Explicit script override, relative to the hive root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_script: Option<String>,
}

/// A thought that passed validation, with id, timestamp and tidy content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedThought {
    pub id: String,
    pub kind: ThoughtKind,
    pub content: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_script: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedThoughts {
    pub steps: Vec<ValidatedThought>,
    /// e.g. "goal:1 | action:2"
    pub summary: String,
}

/// Lists every problem with a single thought. Empty means valid.
pub fn validate_thought(thought: &Thought) -> Vec<String> {
    let mut errors = Vec::new();
    let kind = thought.kind.as_deref().filter(|k| !k.is_empty());

    if kind.is_none() {
        errors.push("kind is required".to_string());
    }
    if thought
        .content
        .as_deref()
        .map_or(true, |c| c.trim().is_empty())
    {
        errors.push("content is required".to_string());
    }
    if let Some(kind) = kind {
        if ThoughtKind::parse(kind).is_none() {
            errors.push(format!("invalid kind: {kind}"));
        }
    }
    errors
}

/// Collapses runs of whitespace to one space and trims the ends.
pub fn format_content(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Validates and normalizes a whole batch.
///
/// Fails with every violation, each prefixed by the thought's index.
/// An empty batch is rejected: there is nothing to dispatch.
pub fn process_thoughts(thoughts: &[Thought]) -> Result<ProcessedThoughts, HiveError> {
    if thoughts.is_empty() {
        return Err(HiveError::Validation(vec![
            "at least one thought is required".to_string(),
        ]));
    }

    let mut errors = Vec::new();
    for (i, thought) in thoughts.iter().enumerate() {
        errors.extend(
            validate_thought(thought)
                .into_iter()
                .map(|e| format!("thought {i}: {e}")),
        );
    }
    if !errors.is_empty() {
        return Err(HiveError::Validation(errors));
    }

    let now = Utc::now().timestamp_millis();
    let steps: Vec<ValidatedThought> = thoughts
        .iter()
        .filter_map(|t| normalize(t, now))
        .collect();
    let summary = build_summary(&steps);

    Ok(ProcessedThoughts { steps, summary })
}

/// Returns None only for thoughts that would have failed validation.
fn normalize(thought: &Thought, now: i64) -> Option<ValidatedThought> {
    let kind = ThoughtKind::parse(thought.kind.as_deref()?)?;
    Some(ValidatedThought {
        id: thought
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()),
        kind,
        content: format_content(thought.content.as_deref()?),
        timestamp: thought.timestamp.unwrap_or(now),
        metadata: thought.metadata.clone(),
        intent: thought.intent,
        action: thought.action,
        target_script: thought.target_script.clone(),
    })
}

fn build_summary(steps: &[ValidatedThought]) -> String {
    let mut counts: HashMap<ThoughtKind, usize> = HashMap::new();
    for step in steps {
        *counts.entry(step.kind).or_default() += 1;
    }
    ThoughtKind::ALL
        .into_iter()
        .filter_map(|k| counts.get(&k).map(|n| format!("{}:{n}", k.as_str())))
        .collect::<Vec<_>>()
        .join(" | ")
}
