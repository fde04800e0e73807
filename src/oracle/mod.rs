//! Scoring oracle: the external completion service that judges free-form and
//! image submissions and writes hints.
//!
//! The oracle only produces text. [`score`] turns that text into a
//! [`Verdict`], failing closed to a score of 0 when the reply cannot be parsed.

pub mod mock;
pub mod openai;
pub mod prompt;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use prompt::{Verdict, hint_prompt, parse_verdict, scoring_prompt};

/// Errors that can occur when calling the oracle.
/// Every variant is fatal for the evaluation in progress; no retries happen here.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    /// The API returned a non-2xx response.
    #[error("oracle API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The request did not complete in time.
    #[error("oracle request timed out after {0}s")]
    Timeout(u64),

    /// Transport level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The response body lacked required fields (e.g. `choices`).
    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),
}

/// A single completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OraclePrompt {
    pub system: String,
    pub user: String,
    /// Image the model should look at alongside the text.
    pub image_url: Option<String>,
}

/// An external text/vision completion service.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the raw completion text for the prompt.
    async fn complete(&self, prompt: &OraclePrompt) -> Result<String, OracleError>;
}

/// Runs the prompt through the oracle within `timeout` and parses the verdict.
///
/// Transport, HTTP and timeout failures are errors. A reply that arrives but
/// cannot be parsed is not: it scores 0.
pub async fn score(
    oracle: &dyn ScoringOracle,
    prompt: &OraclePrompt,
    timeout: Duration,
) -> Result<Verdict, OracleError> {
    let raw = complete_within(oracle, prompt, timeout).await?;
    Ok(parse_verdict(&raw))
}

/// Bounded completion call.
pub async fn complete_within(
    oracle: &dyn ScoringOracle,
    prompt: &OraclePrompt,
    timeout: Duration,
) -> Result<String, OracleError> {
    match tokio::time::timeout(timeout, oracle.complete(prompt)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(oracle = oracle.name(), "oracle call exceeded {:?}", timeout);
            Err(OracleError::Timeout(timeout.as_secs()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::mock::MockOracle;

    fn prompt() -> OraclePrompt {
        OraclePrompt {
            system: "judge".to_string(),
            user: "answer".to_string(),
            image_url: None,
        }
    }

    #[tokio::test]
    async fn score_parses_reply() {
        let oracle = MockOracle::with_fixed_response("Score: 7\n\nExplanation: Close enough.");
        let verdict = score(&oracle, &prompt(), Duration::from_secs(5)).await.unwrap();
        assert_eq!(verdict.score, 7);
        assert_eq!(verdict.explanation, "Close enough.");
    }

    #[tokio::test]
    async fn garbage_reply_scores_zero_instead_of_failing() {
        let oracle = MockOracle::with_fixed_response("I'd rather not say.");
        let verdict = score(&oracle, &prompt(), Duration::from_secs(5)).await.unwrap();
        assert_eq!(verdict.score, 0);
    }

    #[tokio::test]
    async fn upstream_error_propagates() {
        let oracle = MockOracle::failing(OracleError::Api {
            status: 502,
            message: "bad gateway".to_string(),
        });
        let err = score(&oracle, &prompt(), Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, OracleError::Api { status: 502, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_oracle_times_out() {
        let oracle = MockOracle::with_fixed_response("Score: 10").with_delay(Duration::from_secs(60));
        let err = score(&oracle, &prompt(), Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, OracleError::Timeout(2)));
    }
}
