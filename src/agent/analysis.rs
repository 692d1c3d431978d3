//! Structured output of keyword analysis agents

use crate::llm::{ModelError, ResponseFormat};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One verdict the model returns for an accepted keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Evaluation {
    /// The keyword being evaluated.
    pub keyword: String,
    /// The reason for inclusion or exclusion.
    pub reason: String,
}

impl Evaluation {
    pub fn new(keyword: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            reason: reason.into(),
        }
    }
}

/// A model's analysis of one chunk of keywords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChunkAnalysis {
    /// Detailed statement of target audience analysis and relevant characteristics.
    #[serde(default)]
    pub audience_analysis: String,
    /// List of valuable keywords and reasons.
    pub valuable_keywords: Vec<Evaluation>,
}

impl ChunkAnalysis {
    /// Schema sent to the model so it replies with a `ChunkAnalysis`.
    pub fn response_format() -> ResponseFormat {
        let schema = schemars::schema_for!(ChunkAnalysis);
        ResponseFormat {
            name: "chunk_analysis".to_string(),
            schema: serde_json::to_value(&schema).unwrap_or_default(),
        }
    }

    /// Parse a model reply into an analysis.
    ///
    /// Tolerates replies wrapped in code fences or surrounded by prose.
    pub fn parse(text: &str) -> Result<Self, ModelError> {
        let value = extract_json(text).ok_or_else(|| {
            ModelError::ParseError(format!(
                "no JSON object in model reply: {}",
                text.chars().take(200).collect::<String>()
            ))
        })?;
        serde_json::from_value(value)
            .map_err(|e| ModelError::ParseError(format!("reply does not match chunk analysis schema: {e}")))
    }
}

/// Find the analysis object in a chat reply.
///
/// Endpoints that honour `response_format` return the object bare. Ones that
/// ignore it tend to fence it or wrap it in commentary, so the fenced block and
/// then the outermost braces are tried too. Only objects count: a bare keyword
/// array or a quoted string is not an analysis.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();

    let as_object = |candidate: &str| {
        serde_json::from_str::<serde_json::Value>(candidate.trim())
            .ok()
            .filter(|v| v.is_object())
    };

    if let Some(v) = as_object(trimmed) {
        return Some(v);
    }

    let fenced = if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        after.find("```").map(|end| &after[..end])
    } else if let Some(start) = trimmed.find("```\n") {
        let after = &trimmed[start + 4..];
        after.find("```").map(|end| &after[..end])
    } else {
        None
    };
    if let Some(v) = fenced.and_then(as_object) {
        return Some(v);
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => as_object(&trimmed[start..=end]),
        _ => None,
    }
}

/// Build a reply in the shape a keyword analysis agent returns.
///
/// Used to script [`MockModel`](crate::llm::MockModel) replies.
pub fn analysis_reply(evaluations: &[(&str, &str)]) -> String {
    let analysis = ChunkAnalysis {
        audience_analysis: "mock audience".to_string(),
        valuable_keywords: evaluations
            .iter()
            .map(|(k, r)| Evaluation::new(*k, *r))
            .collect(),
    };
    serde_json::to_string(&analysis).unwrap_or_default()
}
