//! Decision Oracle contract and response parsing
//!
//! The oracle is asked for a structured JSON decision. Models occasionally
//! wrap the object in markdown code fences despite instructions, so parsing
//! strips an optional fence before deserializing. A response that still does
//! not parse is a `DecisionParseError` carrying the raw text; the cycle logs
//! it and skips the iteration instead of retrying inline.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Trade direction recommended by the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
    NoPosition,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
            Direction::NoPosition => write!(f, "NO_POSITION"),
        }
    }
}

/// Errors raised by the oracle transport
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Oracle rejected request (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Oracle returned no completion choices")]
    EmptyResponse,
}

/// Language-model completion capability
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Send the instruction prompt and serialized market snapshot, return
    /// the raw completion text.
    async fn complete(&self, system_prompt: &str, user_payload: &str)
        -> Result<String, OracleError>;
}

/// A parsed trading decision, numeric fields still unclamped
#[derive(Debug, Clone)]
pub struct OracleDecision {
    pub direction: Direction,
    pub position_size_fraction: f64,
    pub leverage: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub reasoning: String,
}

/// Raised when the oracle response cannot be interpreted as a decision
#[derive(Debug, Error)]
#[error("unparseable oracle response: {reason}")]
pub struct DecisionParseError {
    pub reason: String,
    /// Raw response text, kept for the analysis record
    pub raw: String,
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    direction: Option<String>,
    #[serde(default)]
    recommended_position_size: f64,
    #[serde(default = "default_leverage")]
    recommended_leverage: f64,
    #[serde(default = "default_exit_pct")]
    stop_loss_percentage: f64,
    #[serde(default = "default_exit_pct")]
    take_profit_percentage: f64,
    reasoning: Option<String>,
}

fn default_leverage() -> f64 {
    1.0
}

fn default_exit_pct() -> f64 {
    0.005
}

/// Strip a markdown code fence (``` or ```json) wrapping the payload, if any
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.split_once("```json").map(|(_, r)| r) {
        rest.split("```").next().unwrap_or(rest).trim()
    } else if let Some(rest) = trimmed.split_once("```").map(|(_, r)| r) {
        rest.split("```").next().unwrap_or(rest).trim()
    } else {
        trimmed
    }
}

/// Parse the oracle's raw text into a decision
pub fn parse_decision(raw: &str) -> Result<OracleDecision, DecisionParseError> {
    let body = strip_code_fence(raw);

    let parsed: RawDecision =
        serde_json::from_str(body).map_err(|e| DecisionParseError {
            reason: e.to_string(),
            raw: raw.to_string(),
        })?;

    let direction = match parsed.direction.as_deref() {
        None => Direction::NoPosition,
        Some(s) => match s.to_uppercase().as_str() {
            "LONG" => Direction::Long,
            "SHORT" => Direction::Short,
            "NO_POSITION" => Direction::NoPosition,
            other => {
                return Err(DecisionParseError {
                    reason: format!("unknown direction: {}", other),
                    raw: raw.to_string(),
                })
            }
        },
    };

    Ok(OracleDecision {
        direction,
        position_size_fraction: parsed.recommended_position_size,
        leverage: parsed.recommended_leverage,
        stop_loss_pct: parsed.stop_loss_percentage,
        take_profit_pct: parsed.take_profit_percentage,
        reasoning: parsed
            .reasoning
            .unwrap_or_else(|| "No reasoning provided".to_string()),
    })
}
